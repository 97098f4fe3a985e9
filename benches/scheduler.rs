//! Benchmark for least-loaded share placement
//!
//! Target: 10K scheduling decisions/sec over a 100-host fleet

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use share_control_plane::domain::*;
use share_control_plane::{
    ControlPlaneMetrics, Envelope, HostStateRegistry, MemoryLedger, Result, SchedulerConfig,
    SimpleScheduler,
};
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Dispatch sink that drops every message
struct NullRpc;

#[async_trait]
impl ShareRpc for NullRpc {
    async fn cast(&self, _host: &str, _envelope: Envelope) -> Result<()> {
        Ok(())
    }
}

fn fleet(rt: &Runtime, hosts: usize) -> Arc<MemoryLedger> {
    let ledger = MemoryLedger::new("share");
    let admin = RequestContext::admin();
    rt.block_on(async {
        for i in 0..hosts {
            let _ = ledger
                .service_create(
                    &admin,
                    NewService {
                        host: format!("host-{:03}", i),
                        topic: "share".to_string(),
                        availability_zone: "nova".to_string(),
                    },
                )
                .await;
        }
    });
    ledger
}

fn bench_schedule_create_share(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler");
    group.throughput(Throughput::Elements(1));

    let rt = Runtime::new().unwrap();
    let ledger = fleet(&rt, 100);
    let metrics = ControlPlaneMetrics::new().unwrap();
    let scheduler = SimpleScheduler::new(
        SchedulerConfig {
            max_gigabytes: u64::MAX / 2,
            ..Default::default()
        },
        ledger.clone(),
        Arc::new(NullRpc),
        HostStateRegistry::new(),
        metrics,
    );
    let ctx = RequestContext::new("bench-user", "bench-project");

    group.bench_function("schedule_create_share_100_hosts", |b| {
        b.iter(|| {
            rt.block_on(async {
                let share = ledger
                    .share_create(&ctx, NewShare::new("bench-project", "bench-user", 1, ShareProtocol::Nfs))
                    .await
                    .unwrap();
                let host = scheduler
                    .schedule_create_share(
                        &ctx,
                        RequestSpec::for_share(&share),
                        FilterProperties::default(),
                    )
                    .await
                    .unwrap();
                black_box(host);
            })
        });
    });

    group.finish();
}

fn bench_sorted_services(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler");

    let rt = Runtime::new().unwrap();
    let ledger = fleet(&rt, 1000);
    let admin = RequestContext::admin();

    group.bench_function("service_get_all_share_sorted_1000_hosts", |b| {
        b.iter(|| {
            let services = rt
                .block_on(ledger.service_get_all_share_sorted(&admin))
                .unwrap();
            black_box(services.len());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_schedule_create_share, bench_sorted_services);
criterion_main!(benches);
