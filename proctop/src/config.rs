use crate::aggregate::LiveFilter;
use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf, time::Duration};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub common: Common,
    pub sampler: Sampler,
    pub output: Output,
    pub networking: Networking,
    pub status: Status,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Common {
    pub instance_id: String,
    pub interval_secs: u64,
    pub max_event_bytes: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Sampler {
    /// Ranked entries forwarded per tick; 0 forwards all of them.
    pub top_n: usize,
    /// Processes below this CPU percent are left out of their command group.
    pub noise_floor_percent: f64,
    pub live_filter: LiveFilter,
    /// Print the ranked table to stdout every tick.
    pub render: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub mode: String,
    pub file_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Networking {
    pub enabled: bool,
    pub endpoint: String,
    pub batch_max_bytes: usize,
    pub flush_interval_ms: u64,
    pub queue_dir: PathBuf,
    pub queue_max_bytes: u64,
    pub ca_cert: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub compression: String,
    pub retry_budget: usize,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Status {
    pub port: Option<u16>,
}

fn data_dir() -> PathBuf {
    ProjectDirs::from("io", "proctop", "proctop")
        .map(|p| p.data_dir().to_path_buf())
        .unwrap_or_else(|| "./data".into())
}

impl Default for Common {
    fn default() -> Self {
        Self {
            instance_id: "proctop-default".into(),
            interval_secs: 5,
            max_event_bytes: 128 * 1024,
        }
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self {
            top_n: 10,
            noise_floor_percent: 0.5,
            live_filter: LiveFilter::ExcludeTerminatedAndStopped,
            render: true,
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self {
            mode: "stdout".into(),
            file_path: Some(data_dir().join("logs").join("proctop.jsonl")),
        }
    }
}

impl Default for Networking {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://127.0.0.1:8443/ingest".into(),
            batch_max_bytes: 512 * 1024,
            flush_interval_ms: 3000,
            queue_dir: data_dir().join("queue"),
            queue_max_bytes: 50 * 1024 * 1024,
            ca_cert: None,
            client_cert: None,
            client_key: None,
            compression: "zstd".into(),
            retry_budget: 8,
        }
    }
}

impl AppConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.common.interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.common.interval_secs == 0 {
            bail!("common.interval_secs must be at least 1");
        }
        let floor = self.sampler.noise_floor_percent;
        if !floor.is_finite() || floor < 0.0 {
            bail!("sampler.noise_floor_percent must be a non-negative number, got {floor}");
        }
        if self.networking.enabled && self.networking.endpoint.trim().is_empty() {
            bail!("networking.endpoint is required when networking is enabled");
        }
        Ok(())
    }
}

fn read_file(p: &PathBuf) -> Result<AppConfig> {
    let s = fs::read_to_string(p).with_context(|| format!("reading config file {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parsing config TOML {}", p.display()))
}

/// Defaults, then the TOML file (`--config` or `PROCTOP_CONFIG`), then `PROCTOP_*` overrides.
/// CLI flags are applied by the caller on top of this.
pub fn load_config_with_precedence(cli: Option<&PathBuf>) -> Result<AppConfig> {
    let path = cli
        .cloned()
        .or_else(|| env::var("PROCTOP_CONFIG").ok().map(PathBuf::from));
    let mut cfg = match path {
        Some(p) if p.exists() => read_file(&p)?,
        _ => AppConfig::default(),
    };
    apply_env(&mut cfg, |k| env::var(k).ok())?;
    Ok(cfg)
}

fn apply_env(cfg: &mut AppConfig, get: impl Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(v) = get("PROCTOP_INTERVAL_SECS") {
        cfg.common.interval_secs = v
            .parse()
            .with_context(|| format!("PROCTOP_INTERVAL_SECS={v}"))?;
    }
    if let Some(v) = get("PROCTOP_TOP_N") {
        cfg.sampler.top_n = v.parse().with_context(|| format!("PROCTOP_TOP_N={v}"))?;
    }
    if let Some(v) = get("PROCTOP_LIVE_FILTER") {
        cfg.sampler.live_filter = match v.as_str() {
            "excludeTerminatedAndStopped" | "exclude-terminated-and-stopped" => {
                LiveFilter::ExcludeTerminatedAndStopped
            }
            "onlyRunning" | "only-running" => LiveFilter::OnlyRunning,
            other => bail!("PROCTOP_LIVE_FILTER: unknown filter {other:?}"),
        };
    }
    if let Some(v) = get("PROCTOP_ENABLE_NETWORKING") {
        cfg.networking.enabled = v == "1" || v.eq_ignore_ascii_case("true");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.interval(), Duration::from_secs(5));
        assert_eq!(cfg.sampler.top_n, 10);
        assert_eq!(cfg.sampler.live_filter, LiveFilter::ExcludeTerminatedAndStopped);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [sampler]
            top_n = 0
            live_filter = "onlyRunning"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.sampler.top_n, 0);
        assert_eq!(cfg.sampler.live_filter, LiveFilter::OnlyRunning);
        assert_eq!(cfg.sampler.noise_floor_percent, 0.5);
        assert_eq!(cfg.common.interval_secs, 5);
    }

    #[test]
    fn default_round_trips_through_toml() {
        let text = toml::to_string(&AppConfig::default()).unwrap();
        let back: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.common.instance_id, "proctop-default");
        assert_eq!(back.networking.compression, "zstd");
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("PROCTOP_INTERVAL_SECS", "2"),
            ("PROCTOP_TOP_N", "3"),
            ("PROCTOP_LIVE_FILTER", "only-running"),
            ("PROCTOP_ENABLE_NETWORKING", "TRUE"),
        ]);
        let mut cfg = AppConfig::default();
        apply_env(&mut cfg, |k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.common.interval_secs, 2);
        assert_eq!(cfg.sampler.top_n, 3);
        assert_eq!(cfg.sampler.live_filter, LiveFilter::OnlyRunning);
        assert!(cfg.networking.enabled);
    }

    #[test]
    fn bad_values_are_rejected() {
        let mut cfg = AppConfig::default();
        let unknown_filter = |k: &str| (k == "PROCTOP_LIVE_FILTER").then(|| "all".to_string());
        assert!(apply_env(&mut cfg, unknown_filter).is_err());

        cfg.common.interval_secs = 0;
        assert!(cfg.validate().is_err());
        cfg.common.interval_secs = 1;
        cfg.sampler.noise_floor_percent = f64::NAN;
        assert!(cfg.validate().is_err());
    }
}
