use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use proctop::aggregate::{AggregationStage, LiveFilter};
use proctop::collectors::{os, run_sampling_loop, source::ProcfsSource, Pipeline};
use proctop::config::{load_config_with_precedence, AppConfig};
use proctop::logging::init_tracing;
use proctop::render::TextRenderer;
use proctop::sink::{board::GaugeBoard, log::LogSink, FanoutSink};
use proctop::top::TopEngine;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "proctop", version, about = "Per-command CPU and memory usage from /proc")]
struct Cli {
    #[arg(short, long, env = "PROCTOP_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long)]
    interval_secs: Option<u64>,
    /// Ranked commands reported per tick, 0 for all
    #[arg(long)]
    top_n: Option<usize>,
    #[arg(long, value_enum)]
    live_filter: Option<LiveFilter>,
    #[arg(long)]
    status_port: Option<u16>,
    #[arg(long, action = ArgAction::SetTrue)]
    enable_networking: bool,
    /// Do not print the ranked table every tick
    #[arg(long, action = ArgAction::SetTrue)]
    quiet: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sample until interrupted (default)
    Run,
    /// Take two readings one interval apart and print the ranking
    Once,
    /// Print the effective configuration as TOML
    Config,
}

impl Cli {
    fn apply(&self, cfg: &mut AppConfig) {
        if let Some(n) = self.interval_secs {
            cfg.common.interval_secs = n;
        }
        if let Some(n) = self.top_n {
            cfg.sampler.top_n = n;
        }
        if let Some(f) = self.live_filter {
            cfg.sampler.live_filter = f;
        }
        if let Some(p) = self.status_port {
            cfg.status.port = Some(p);
        }
        if self.enable_networking {
            cfg.networking.enabled = true;
        }
        if self.quiet {
            cfg.sampler.render = false;
        }
    }
}

fn build_stage(cfg: &AppConfig) -> AggregationStage {
    AggregationStage::new(
        cfg.sampler.live_filter,
        cfg.sampler.noise_floor_percent,
        cfg.sampler.top_n,
    )
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = load_config_with_precedence(cli.config.as_ref())?;
    cli.apply(&mut cfg);
    cfg.validate()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&cfg).context("rendering config")?);
            Ok(())
        }
        Commands::Once => {
            let _guard = init_tracing(&cfg)?;
            once(&cfg).await
        }
        Commands::Run => {
            let _guard = init_tracing(&cfg)?;
            run(cfg).await
        }
    }
}

async fn once(cfg: &AppConfig) -> Result<()> {
    let engine = TopEngine::new(ProcfsSource::new()).context("reading total system memory")?;
    let mut pipeline = Pipeline::new(engine, build_stage(cfg), FanoutSink::new())
        .with_renderer(TextRenderer::stdout().with_cpu_summary(true));
    pipeline.prime()?;
    tokio::time::sleep(cfg.interval()).await;
    pipeline.tick()?;
    Ok(())
}

async fn run(cfg: AppConfig) -> Result<()> {
    let host = os::collect();
    info!(
        host = ?host.host_name,
        kernel = ?host.kernel_version,
        os = ?host.os_version,
        interval_secs = cfg.common.interval_secs,
        top_n = cfg.sampler.top_n,
        live_filter = ?cfg.sampler.live_filter,
        "starting proctop"
    );

    let engine = TopEngine::new(ProcfsSource::new()).context("reading total system memory")?;
    let board = GaugeBoard::new();
    #[allow(unused_mut)]
    let mut sinks = FanoutSink::new().with(LogSink::default()).with(board.clone());

    #[cfg(feature = "status")]
    if let Some(port) = cfg.status.port {
        proctop::transport::status::spawn_status_server(port, board.clone()).await?;
    }

    #[cfg(feature = "networking")]
    let push_task = if cfg.networking.enabled {
        let (tx, handle) = proctop::transport::push::spawn_push_task(&cfg.networking).await?;
        sinks = sinks.with(proctop::sink::push::PushSink::new(
            cfg.common.instance_id.clone(),
            host.host_name.clone(),
            cfg.common.max_event_bytes,
            tx,
        ));
        Some(handle)
    } else {
        None
    };

    let mut pipeline = Pipeline::new(engine, build_stage(&cfg), sinks);
    if cfg.sampler.render {
        pipeline = pipeline.with_renderer(TextRenderer::stdout());
    }

    let pipeline = run_sampling_loop(pipeline, cfg.interval(), shutdown_signal()).await;
    // releases the push sender so the exporter drains and exits
    drop(pipeline);

    #[cfg(feature = "networking")]
    if let Some(handle) = push_task {
        let wait = std::time::Duration::from_secs(10);
        if tokio::time::timeout(wait, handle).await.is_err() {
            warn!("push exporter did not drain before exit");
        }
    }
    info!("proctop stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = ?e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let term = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!(error = ?e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let term = std::future::pending::<()>();
    tokio::select! {
        _ = ctrl_c => {}
        _ = term => {}
    }
}
