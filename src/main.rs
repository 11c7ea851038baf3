use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use trackrec::cli::Cli;
use trackrec::config::resolve_config_path;
use trackrec::session::{forward_interrupts, spawn_status_file_writer};
use trackrec::{
    create_router, AppState, Config, FfmpegEncoder, MprisSource, PipeWireCli, RouteController,
    SeenTrackRegistry, Supervisor,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(resolve_config_path);
    let mut cfg = Config::load(config_path.as_deref())?;
    cli.apply(&mut cfg);
    cfg.validate()?;

    let session_config = cfg.session_config()?;
    let output_dir = session_config.recorder.output_dir.clone();

    info!("trackrec v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }
    info!("Output directory: {}", output_dir.display());
    info!(
        "Player: '{}', target: '{}', min {}s, FLAC level {}, listen={}, dedupe={}, follow={}",
        cfg.player.selector,
        cfg.routing.target,
        cfg.recorder.min_seconds,
        cfg.recorder.compression_level,
        cfg.routing.listen,
        cfg.recorder.dedupe,
        cfg.follow.enabled
    );

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let registry = match cfg.index_file()? {
        Some(index) => SeenTrackRegistry::with_index_file(index)?,
        None => SeenTrackRegistry::new(),
    };

    let source = MprisSource::connect()
        .await
        .context("Failed to connect to the D-Bus session bus")?;
    let routes = RouteController::new(Arc::new(PipeWireCli::new()), cfg.routing.sink_name.clone());
    let encoder = FfmpegEncoder::new(cfg.recorder.compression_level);

    let mut supervisor = Supervisor::new(
        session_config,
        Arc::new(source),
        routes,
        Arc::new(encoder),
        registry,
    );

    forward_interrupts(supervisor.events());

    if let Some(path) = &cfg.status.status_file {
        let path = PathBuf::from(shellexpand::tilde(path).as_ref());
        info!("Writing status to {}", path.display());
        spawn_status_file_writer(&supervisor.status(), path);
    }

    if let Some(bind) = &cfg.status.http_bind {
        let listener = tokio::net::TcpListener::bind(bind)
            .await
            .with_context(|| format!("Failed to bind status API on {}", bind))?;
        let app = create_router(AppState::new(supervisor.status()));

        info!("Status API listening on http://{}", bind);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Status API stopped: {}", e);
            }
        });
    }

    supervisor
        .run()
        .await
        .context("Recorder stopped with an error")?;

    Ok(())
}
