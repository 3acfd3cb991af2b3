//! Ceph Operator
//!
//! Runs the `CephCluster` controller, the validating admission webhook, and
//! the health and metrics endpoints until interrupted.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ceph_operator::controller::{self, DEFAULT_CLEANUP_SERVICE_ACCOUNT};
use ceph_operator::{
    all_crds, webhook, AuthtoolKeyGenerator, ClusterServices, ControllerContext, Error,
    KubeJobRunner, KubeResourceClient, Metrics, OperatorConfig, ResourceClient, Result,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Ceph Operator - reconciles ceph.rook.io custom resources
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Namespace the operator runs in
    #[arg(long, env = "POD_NAMESPACE", default_value = "rook-ceph")]
    namespace: String,

    /// Only watch this namespace (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    watch_namespace: Option<String>,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Admission webhook bind address
    #[arg(long, env = "WEBHOOK_ADDR", default_value = "0.0.0.0:9443")]
    webhook_addr: String,

    /// Do not serve the admission webhook
    #[arg(long, env = "ROOK_DISABLE_ADMISSION_CONTROLLER")]
    disable_webhook: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Print every CRD as YAML and exit
    #[arg(long)]
    print_crds: bool,

    /// Use host networking for clusters on the default network provider
    #[arg(long, env = "ROOK_ENFORCE_HOST_NETWORK")]
    enforce_host_network: bool,

    /// Image for canary and cleanup jobs
    #[arg(long, env = "ROOK_OPERATOR_IMAGE", default_value = "rook/ceph:master")]
    image: String,

    /// Service account of cleanup jobs
    #[arg(long, env = "ROOK_CLEANUP_SERVICE_ACCOUNT", default_value = DEFAULT_CLEANUP_SERVICE_ACCOUNT)]
    cleanup_service_account: String,

    /// Key generation helper
    #[arg(long, env = "CEPH_AUTHTOOL", default_value = "ceph-authtool")]
    authtool: PathBuf,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_crds {
        return print_crds();
    }

    init_logging(&args);

    info!("Starting Ceph Operator");
    info!("  Version: {}", ceph_operator::VERSION);
    info!("  Namespace: {}", args.namespace);
    info!("  Watching: {}", args.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Enforce host network: {}", args.enforce_host_network);

    let shutdown = CancellationToken::new();
    let ready = Arc::new(AtomicBool::new(false));

    let client = kube::Client::try_default().await?;
    let resources: Arc<dyn ResourceClient> = Arc::new(KubeResourceClient::new(client.clone()));
    let services = ClusterServices::new(
        resources.clone(),
        Arc::new(AuthtoolKeyGenerator::new(&args.authtool)),
        Arc::new(KubeJobRunner::new(client.clone(), resources)),
    );

    let metrics = Metrics::new()?;
    metrics.register(prometheus::default_registry())?;

    let config = OperatorConfig {
        operator_namespace: args.namespace.clone(),
        watch_namespace: args.watch_namespace.clone(),
        image: args.image.clone(),
        cleanup_service_account: args.cleanup_service_account.clone(),
        enforce_host_network: args.enforce_host_network,
        log_level: args.log_level.to_uppercase(),
        ..Default::default()
    };
    let ctx = Arc::new(ControllerContext::new(
        client,
        config,
        services,
        metrics,
        shutdown.clone(),
    ));

    // Start health server
    let health_addr = parse_addr(&args.health_addr, "health")?;
    let health_ready = ready.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(health_addr, health_ready).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = parse_addr(&args.metrics_addr, "metrics")?;
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(metrics_addr).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Start admission webhook
    if !args.disable_webhook {
        let webhook_addr = parse_addr(&args.webhook_addr, "webhook")?;
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = webhook::run_webhook_server(webhook_addr, token).await {
                error!("Webhook server error: {}", e);
            }
        });
    }

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, shutting down");
        }
        signal.cancel();
    });

    ready.store(true, Ordering::SeqCst);
    controller::run(ctx).await?;

    info!("Operator shutdown complete");
    Ok(())
}

fn parse_addr(addr: &str, what: &str) -> Result<SocketAddr> {
    addr.parse()
        .map_err(|e| Error::Configuration(format!("Invalid {} address {:?}: {}", what, addr, e)))
}

fn print_crds() -> Result<()> {
    for crd in all_crds() {
        println!("---");
        print!("{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
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

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},hyper=warn,kube=info,tower=warn,tower_http=info,axum=info",
            level
        ))
    });

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

async fn run_health_server(addr: SocketAddr, ready: Arc<AtomicBool>) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let ready = ready.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let ready = ready.load(Ordering::SeqCst);
                async move {
                    let mut response = Response::new(Body::from("ok"));
                    match req.uri().path() {
                        "/healthz" | "/livez" => {}
                        "/readyz" if ready => {}
                        "/readyz" => {
                            *response.body_mut() = Body::from("not ready");
                            *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
                        }
                        _ => {
                            *response.body_mut() = Body::from("not found");
                            *response.status_mut() = StatusCode::NOT_FOUND;
                        }
                    }
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

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

async fn run_metrics_server(addr: SocketAddr) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};
    use prometheus::{Encoder, TextEncoder};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let mut response = Response::new(Body::empty());
            if req.uri().path() != "/metrics" {
                *response.body_mut() = Body::from("not found");
                *response.status_mut() = StatusCode::NOT_FOUND;
                return Ok::<_, std::convert::Infallible>(response);
            }

            let encoder = TextEncoder::new();
            let mut buffer = Vec::new();
            match encoder.encode(&prometheus::gather(), &mut buffer) {
                Ok(()) => {
                    if let Ok(content_type) = encoder.format_type().parse() {
                        response
                            .headers_mut()
                            .insert(hyper::header::CONTENT_TYPE, content_type);
                    }
                    *response.body_mut() = Body::from(buffer);
                }
                Err(e) => {
                    error!("Failed to encode metrics: {}", e);
                    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                }
            }
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
