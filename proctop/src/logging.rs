use crate::config::AppConfig;
use anyhow::{Context, Result};
use std::{fs, path::Path};
use tracing_appender::non_blocking::WorkerGuard;

/// JSON logs to stdout, or to `output.file_path` when `output.mode = "file"`. The returned
/// guard must live as long as logging is needed.
pub fn init_tracing(cfg: &AppConfig) -> Result<Option<WorkerGuard>> {
    let env_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,proctop=info".into());
    if cfg.output.mode == "file" {
        if let Some(path) = &cfg.output.file_path {
            let dir = path.parent().unwrap_or(Path::new("."));
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            let file_name = path
                .file_name()
                .with_context(|| format!("log path {} has no file name", path.display()))?;
            let (nb, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(nb)
                .json()
                .flatten_event(true)
                .init();
            return Ok(Some(guard));
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .init();
    Ok(None)
}
