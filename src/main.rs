//! Share Control Plane
//!
//! Runs the share service of one host: the status ledger, quota engine and
//! network allocator, the configured backend driver, and the share manager
//! consuming this host's dispatch queue.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                         share-control-plane (host)                          │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌───────────────┐   ┌───────────────────┐   ┌──────────────────────────┐   │
//! │  │  Message Bus  │──▶│   Share Worker    │──▶│      Share Manager       │   │
//! │  │ (host queue)  │   │ (ordered, 1 task) │   │  (lifecycle operations)  │   │
//! │  └───────────────┘   └───────────────────┘   └────────────┬─────────────┘   │
//! │                                                           │                 │
//! │  ┌───────────────────┐  ┌──────────────┐  ┌───────────────┴─────────────┐   │
//! │  │  Periodic Tasks   │  │ Health/Metrics│ │  Ledger · Quota · Network   │   │
//! │  │ heartbeat, report │  │   servers    │  │  Backend Driver             │   │
//! │  └───────────────────┘  └──────────────┘  └─────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use share_control_plane::domain::{NewService, RequestContext, StatusLedger};
use share_control_plane::{
    CidrAllocator, ControlPlaneMetrics, DriverFactory, Error, HostStateRegistry, ManagerDeps,
    MemoryLedger, MessageBus, PeriodicTasks, QuotaEngine, Result, ServiceConfig, ShareManager,
    ShareWorker,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Share Control Plane - share scheduling and lifecycle management
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, short, env = "SHARE_CONFIG")]
    config: Option<PathBuf>,

    /// Host name this share service registers under
    #[arg(long, env = "SHARE_HOST")]
    host: Option<String>,

    /// Availability zone of this host
    #[arg(long, env = "SHARE_AVAILABILITY_ZONE")]
    availability_zone: Option<String>,

    /// Backend driver (memory, glusterfs)
    #[arg(long, env = "SHARE_DRIVER")]
    driver: Option<String>,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Give up on driver setup after this many seconds of transient failures
    #[arg(long, env = "SETUP_RETRY_SECS", default_value = "300")]
    setup_retry_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    /// Configuration file merged with command line overrides
    fn service_config(&self) -> anyhow::Result<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => ServiceConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => ServiceConfig::default(),
        };
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(zone) = &self.availability_zone {
            config.availability_zone = zone.clone();
        }
        if let Some(driver) = &self.driver {
            config.driver.backend = driver.clone();
        }
        Ok(config)
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let config = args.service_config()?;

    info!("Starting Share Control Plane");
    info!("  Version: {}", share_control_plane::VERSION);
    info!("  Host: {}", config.host);
    info!("  Availability zone: {}", config.availability_zone);
    info!("  Driver: {}", config.driver.backend);

    let metrics = ControlPlaneMetrics::new()?;
    let ledger = MemoryLedger::new(config.scheduler.share_topic.clone());
    let quota = QuotaEngine::new(config.quota.clone());
    let allocator = CidrAllocator::new(config.network.clone(), ledger.clone())
        .context("building network allocator")?;
    let driver = DriverFactory::create(&config.driver).context("building share driver")?;
    let host_states = HostStateRegistry::with_metrics(metrics.clone());
    let bus = MessageBus::new(config.scheduler.share_topic.clone(), config.queue_capacity);

    let manager = ShareManager::new(
        config.host.clone(),
        ManagerDeps {
            ledger: ledger.clone(),
            quota: quota.clone(),
            network_allocator: allocator,
            driver,
            publisher: host_states.clone(),
            metrics: metrics.clone(),
        },
    );

    let admin = RequestContext::admin();
    let service = ledger
        .service_create(
            &admin,
            NewService {
                host: config.host.clone(),
                topic: config.scheduler.share_topic.clone(),
                availability_zone: config.availability_zone.clone(),
            },
        )
        .await?;
    info!(service_id = %service.id, "Share service registered");

    let ready = Arc::new(AtomicBool::new(false));
    let shutdown = CancellationToken::new();

    // Start health server
    let health_addr = args.health_addr.clone();
    let health_ready = ready.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, health_ready).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    let server_metrics = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, server_metrics).await {
            error!("Metrics server error: {}", e);
        }
    });

    init_host_with_retry(&manager, Duration::from_secs(args.setup_retry_secs)).await?;
    ready.store(true, Ordering::SeqCst);

    let receiver = bus.register(&config.host);
    let worker = tokio::spawn(ShareWorker::new(manager.clone(), receiver, shutdown.clone()).run());

    let periodic = PeriodicTasks::new(
        config.periodic.clone(),
        manager.clone(),
        ledger.clone(),
        service.id.clone(),
    )
    .with_quota(quota.clone())
    .with_host_states(host_states.clone());
    let periodic = tokio::spawn(periodic.run(shutdown.clone()));

    info!(topic = %bus.topic(), "Share service running");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    info!("Shutdown requested");
    ready.store(false, Ordering::SeqCst);
    shutdown.cancel();
    bus.unregister(&config.host);

    let (worker, periodic) = futures::future::join(worker, periodic).await;
    match worker {
        Ok(handled) => info!(handled, "Share worker finished"),
        Err(e) => warn!(error = %e, "Share worker task failed"),
    }
    if let Err(e) = periodic {
        warn!(error = %e, "Periodic task failed");
    }

    info!("Share service shutdown complete");
    Ok(())
}

/// Run driver setup and share re-export, retrying transient failures
async fn init_host_with_retry(manager: &Arc<ShareManager>, max_elapsed: Duration) -> Result<()> {
    let policy = backoff::ExponentialBackoff {
        max_elapsed_time: Some(max_elapsed),
        ..Default::default()
    };

    backoff::future::retry(policy, || {
        let manager = manager.clone();
        async move {
            manager.init_host().await.map_err(|e| {
                if e.is_transient() {
                    warn!(error = %e, "Share host initialization failed, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        }
    })
    .await
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    if let Ok(directive) = "hyper=warn".parse() {
        filter = filter.add_directive(directive);
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

fn text_response(status: hyper::StatusCode, body: impl Into<hyper::Body>) -> hyper::Response<hyper::Body> {
    let mut response = hyper::Response::new(body.into());
    *response.status_mut() = status;
    response
}

async fn run_health_server(addr: &str, ready: Arc<AtomicBool>) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let ready = ready.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let ready = ready.load(Ordering::SeqCst);
                async move {
                    let response = match req.uri().path() {
                        "/healthz" | "/livez" => text_response(StatusCode::OK, "ok"),
                        "/readyz" if ready => text_response(StatusCode::OK, "ok"),
                        "/readyz" => text_response(StatusCode::SERVICE_UNAVAILABLE, "not ready"),
                        _ => text_response(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid health server address: {}", e))
    })?;

    info!("Health server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str, metrics: Arc<ControlPlaneMetrics>) -> Result<()> {
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => match metrics.encode() {
                            Ok((content_type, buffer)) => {
                                let mut response = text_response(StatusCode::OK, buffer);
                                if let Ok(value) = HeaderValue::from_str(&content_type) {
                                    response.headers_mut().insert(CONTENT_TYPE, value);
                                }
                                response
                            }
                            Err(e) => {
                                text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                            }
                        },
                        _ => text_response(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid metrics server address: {}", e))
    })?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
