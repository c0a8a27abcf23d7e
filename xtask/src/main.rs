use anyhow::Result;
use clap::{Parser, Subcommand};
use proctop::config::AppConfig;
use std::{fs, path::PathBuf};

#[derive(Parser, Debug)]
#[command(name = "xtask")]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the sample configuration to configs/proctop.toml
    SampleConfig {
        #[arg(long, default_value = "configs/proctop.toml")]
        out: PathBuf,
    },
    /// Run fmt+clippy
    Lint,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Commands::SampleConfig { out } => {
            if let Some(dir) = out.parent() {
                fs::create_dir_all(dir)?;
            }
            fs::write(&out, render_sample()?)?;
            println!("Wrote {}", out.display());
        }
        Commands::Lint => {
            run("cargo", &["fmt", "--all"])?;
            run("cargo", &["clippy", "--all-targets", "--all-features", "--", "-Dwarnings"])?;
        }
    }
    Ok(())
}

const SAMPLE_HEADER: &str = "\
# Generated by `cargo xtask sample-config`. Paths are relative to the working directory;
# the built-in defaults place them under the platform data directory instead.
# sampler.live_filter: excludeTerminatedAndStopped | onlyRunning

";

/// Defaults with portable relative paths in place of the per-user data directory.
fn sample_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.output.file_path = Some(PathBuf::from("./data/logs/proctop.jsonl"));
    cfg.networking.queue_dir = PathBuf::from("./data/queue");
    cfg
}

fn render_sample() -> Result<String> {
    Ok(format!("{SAMPLE_HEADER}{}", toml::to_string_pretty(&sample_config())?))
}

fn run(cmd: &str, args: &[&str]) -> Result<()> {
    println!("+ {} {}", cmd, args.join(" "));
    let st = std::process::Command::new(cmd).args(args).status()?;
    if !st.success() {
        anyhow::bail!("{cmd} failed with {st}")
    }
    Ok(())
}
