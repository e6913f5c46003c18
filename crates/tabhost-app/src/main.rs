mod cli;

use std::process::ExitCode;
use std::time::Duration;

use tabhost_common::ConfigError;
use tabhost_config::TabHostConfig;
use tabhost_host::{
    serve_lines, FixedGeometry, HeadlessEngine, HeadlessOptions, HostHandle, HostService,
    VisibilityTree, WindowSession,
};
use tracing_subscriber::EnvFilter;

/// Boundary calls waiting for the host loop before senders are held back.
const HOST_CALL_QUEUE: usize = 64;

fn load_config(args: &cli::Args) -> Result<TabHostConfig, ConfigError> {
    match &args.config {
        Some(path) => {
            let config = tabhost_config::load_from_path(path)?;
            tabhost_config::validation::validate(&config)?;
            Ok(config)
        }
        None => tabhost_config::load_config(),
    }
}

/// Logs go to stderr; stdout carries the boundary protocol.
fn init_logging(directive: &str) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(
                directive
                    .parse()
                    .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into()),
            ),
        )
        .init();
}

fn build_host(config: &TabHostConfig) -> (HostService, HostHandle) {
    let engine = HeadlessEngine::new(HeadlessOptions {
        load_latency: Duration::from_millis(u64::from(config.surface.headless_load_ms)),
        bounds_supported: true,
    });
    let session = WindowSession::new(
        config,
        Box::new(engine.factory()),
        Box::new(VisibilityTree::new()),
        Box::new(FixedGeometry {
            width: config.window.width,
            height: config.window.height,
        }),
    );
    HostService::new(session, HOST_CALL_QUEUE)
}

async fn serve(config: TabHostConfig) -> std::io::Result<()> {
    let (service, handle) = build_host(&config);
    let host_loop = tokio::task::spawn_local(service.run());

    let served = serve_lines(tokio::io::stdin(), tokio::io::stdout(), handle).await;

    // The last handle is gone; the loop closes every tab and returns.
    if let Err(e) = host_loop.await {
        tracing::error!("host loop panicked: {e}");
    }
    served
}

fn main() -> ExitCode {
    let args = cli::parse();

    let loaded = load_config(&args);
    let config_level = loaded
        .as_ref()
        .map(|c| c.logging.level.as_str())
        .unwrap_or("info");
    init_logging(args.log_level.as_deref().unwrap_or(config_level));

    tracing::info!("tabhost v{} starting...", env!("CARGO_PKG_VERSION"));
    if let Some(ref path) = args.config {
        tracing::info!("Using config override: {}", path.display());
    }
    let config = loaded.unwrap_or_else(|e| {
        tracing::warn!("Config load failed, using defaults: {e}");
        TabHostConfig::default()
    });

    if args.print_config {
        println!("{}", tabhost_config::config_to_json(&config));
        return ExitCode::SUCCESS;
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let local = tokio::task::LocalSet::new();
    let result = local.block_on(&runtime, serve(config));
    match result {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Boundary I/O failed: {e}");
            ExitCode::FAILURE
        }
    }
}
