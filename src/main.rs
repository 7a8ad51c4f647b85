//! ULD Scanner - stabilized code recognition for unit load device labels
//!
//! Gates camera frames, reads container codes out of recognizer text and
//! votes them into one stable estimate.

mod capture;
mod vision;
mod analysis;
mod scanner;
mod config;
mod shared;
mod app;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::analysis::CodeReader;
use crate::app::ScannerApp;
use crate::capture::{load_replay, ImageDirSource, DEFAULT_FRAME_PERIOD_MS};
use crate::config::AppConfig;
use crate::scanner::{run_replay, Scanner};
use crate::shared::{Clock, ManualClock, ScanStatus, ScanUpdate, SharedScanState, SystemClock};
use crate::vision::Region;

/// ULD Scanner - live-feed OCR stabilizer for ULD codes
#[derive(Parser, Debug)]
#[command(name = "uld-scanner")]
#[command(about = "Frame gating, code validation and confidence voting for ULD labels")]
struct Args {
    /// Config file (defaults to the per-user config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show how a piece of recognizer text would be read
    Check {
        /// Raw recognizer text
        text: String,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Run a recorded session in virtual time
    Replay {
        /// JSON-lines replay file
        file: PathBuf,
        /// Region of interest as x,y,width,height
        #[arg(long, value_parser = parse_region)]
        region: Option<Region>,
        /// Print one JSON object per update
        #[arg(long)]
        json: bool,
    },
    /// Scan a directory of frames live, answering from a replay script
    Scan {
        /// Directory of frame images
        #[arg(long)]
        frames: PathBuf,
        /// Replay file supplying the recognizer answers per frame
        #[arg(long)]
        script: PathBuf,
        /// Milliseconds between frames
        #[arg(long, default_value_t = DEFAULT_FRAME_PERIOD_MS)]
        period_ms: u64,
        /// Region of interest as x,y,width,height
        #[arg(long, value_parser = parse_region)]
        region: Option<Region>,
        /// Print one JSON object per update
        #[arg(long)]
        json: bool,
    },
    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (config_path, config) = resolve_config(args.config, config::default_config_path)?;

    // Initialize logging; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if config_path.is_none() {
        warn!("No per-user config directory available, using default configuration");
    }

    match args.command {
        Command::Check { text, json } => run_check(&config, &text, json),
        Command::Replay { file, region, json } => run_replay_file(with_region(config, region)?, &file, json).await,
        Command::Scan {
            frames,
            script,
            period_ms,
            region,
            json,
        } => run_scan(with_region(config, region)?, &frames, &script, period_ms, json).await,
        Command::Config { action } => run_config(action, &config, config_path.as_deref()),
    }
}

/// Find and load the configuration.
///
/// An explicit `--config` file must exist. Otherwise the per-user file is
/// used when present, and defaults apply when it is missing or the platform
/// has no config directory at all.
fn resolve_config(
    explicit: Option<PathBuf>,
    default_path: impl FnOnce() -> Result<PathBuf>,
) -> Result<(Option<PathBuf>, AppConfig)> {
    let (path, explicit) = match explicit {
        Some(path) => (path, true),
        None => match default_path() {
            Ok(path) => (path, false),
            Err(_) => return Ok((None, AppConfig::default())),
        },
    };
    let config = load_or_default_config(&path, explicit)?;
    Ok((Some(path), config))
}

/// Load configuration from file, or fall back to defaults when it does not exist
fn load_or_default_config(path: &Path, explicit: bool) -> Result<AppConfig> {
    if path.exists() {
        return config::load_config(path);
    }
    if explicit {
        anyhow::bail!("Config file {} does not exist", path.display());
    }
    Ok(AppConfig::default())
}

fn with_region(mut config: AppConfig, region: Option<Region>) -> Result<AppConfig> {
    if region.is_some() {
        config.region = region;
    }
    Ok(config.validated()?)
}

fn parse_region(value: &str) -> Result<Region, String> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid region {:?}: {}", value, e))?;
    match parts.as_slice() {
        [x, y, width, height] => Ok(Region::new(*x, *y, *width, *height)),
        _ => Err(format!("region {:?} must be x,y,width,height", value)),
    }
}

fn run_check(config: &AppConfig, text: &str, json: bool) -> Result<()> {
    let reader = CodeReader::new(config.vocabulary.validator(), config.scan.candidate_strategy);
    let reports = reader.inspect(text);
    let reading = reader.read(text);

    if json {
        let output = serde_json::json!({
            "text": text,
            "code": reading.as_ref().map(|r| r.code.as_str()),
            "corrected": reading.as_ref().map(|r| r.corrected),
            "candidates": reports,
        });
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if reports.is_empty() {
        println!("No code-shaped candidates in {:?}", text);
    }
    for report in &reports {
        match report.rejection {
            None => println!("{}: valid", report.candidate),
            Some(rejection) => {
                println!("{}: rejected, {}", report.candidate, rejection);
                println!(
                    "  corrected {} is {}",
                    report.corrected,
                    if report.corrected_valid { "valid" } else { "still invalid" }
                );
                if let Some((prefix, distance)) = &report.nearest_prefix {
                    println!("  nearest prefix {} (distance {})", prefix, distance);
                }
                if let Some((suffix, distance)) = &report.nearest_suffix {
                    println!("  nearest suffix {} (distance {})", suffix, distance);
                }
            }
        }
    }
    match reading {
        Some(reading) => println!(
            "Read: {}{} (type {}, serial {}, owner {})",
            reading.code,
            if reading.corrected { " (corrected)" } else { "" },
            reading.code.prefix(),
            reading.code.serial(),
            reading.code.suffix()
        ),
        None => println!("Read: nothing"),
    }
    Ok(())
}

async fn run_replay_file(config: AppConfig, file: &Path, json: bool) -> Result<()> {
    let (mut source, engine) = load_replay(file)?.into_parts();
    info!("Replaying {} frames from {}", source.remaining(), file.display());

    let clock = ManualClock::new(0);
    let engine = Arc::new(engine.with_clock(clock.clone()));
    let mut scanner = Scanner::new(&config, engine.clone(), Arc::new(clock.clone()));
    let mut state = SharedScanState::new();

    run_replay(&mut scanner, &mut source, &clock, |update| {
        state.apply(&update);
        print_update(&update, json);
    })
    .await?;
    info!("Replay done after {}ms of virtual time, {} recognizer calls", clock.now_ms(), engine.calls());

    if !json {
        print_summary(&state);
    }
    Ok(())
}

async fn run_scan(config: AppConfig, frames: &Path, script: &Path, period_ms: u64, json: bool) -> Result<()> {
    let source = ImageDirSource::open(frames, period_ms)?;
    info!("Scanning {} frames every {}ms", source.remaining(), period_ms);
    let (_, engine) = load_replay(script)?.into_parts();
    let engine = Arc::new(engine);

    let mut app = ScannerApp::new(config);

    // Printer thread, ends when the app drops its sender
    let updates = app.updates.clone();
    let printer = std::thread::spawn(move || {
        for update in updates.iter() {
            print_update(&update, json);
        }
    });

    app.start_live(
        source,
        engine.clone(),
        Arc::new(SystemClock::new()),
        Duration::from_millis(period_ms.max(1)),
    )?;

    tokio::select! {
        result = app.wait() => { result?; }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping scan");
            app.shutdown().await?;
        }
    }

    info!(
        "Scan stopped after {} recognizer calls (at most {} at once)",
        engine.calls(),
        engine.max_concurrent()
    );
    let state = app.shared_state.read().clone();
    drop(app);
    printer
        .join()
        .map_err(|_| anyhow::anyhow!("Printer thread panicked"))?;

    if !json {
        print_summary(&state);
    }
    Ok(())
}

fn run_config(action: ConfigAction, config: &AppConfig, path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Init { force } => {
            let Some(path) = path else {
                anyhow::bail!("No per-user config directory on this platform, pass --config <FILE>");
            };
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            config::save_config(&AppConfig::default(), path)?;
            println!("Wrote default configuration to {}", path.display());
        }
        ConfigAction::Show => {
            let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
            match path {
                Some(path) => println!("# {}", path.display()),
                None => println!("# built-in defaults"),
            }
            print!("{}", content);
        }
    }
    Ok(())
}

fn print_update(update: &ScanUpdate, json: bool) {
    if json {
        match serde_json::to_string(update) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::error!("Failed to serialize update: {}", e),
        }
        return;
    }

    let detail = match &update.status {
        ScanStatus::Admitted { job_id } => format!(" job {}", job_id),
        ScanStatus::NoCandidate { text } => format!(" {:?}", text),
        ScanStatus::Validated { code, corrected } => {
            format!(" {}{}", code, if *corrected { " (corrected)" } else { "" })
        }
        ScanStatus::RecognitionFailed { error } => format!(" {}", error),
        ScanStatus::Busy | ScanStatus::TooSoon | ScanStatus::OutOfFocus => String::new(),
    };
    println!(
        "[{:>7}ms] frame {:>5} {:<18}{} | estimate: {}",
        update.at_ms,
        update.frame_seq,
        update.status.label(),
        detail,
        update.estimate.as_ref().map(|c| c.as_str()).unwrap_or("-")
    );
}

fn print_summary(state: &SharedScanState) {
    let c = &state.counters;
    println!(
        "Recognized {} frames: {} validated, {} without code, {} failed",
        c.completed(),
        c.validated,
        c.no_candidate,
        c.failed
    );
    println!(
        "Skipped {} frames: {} busy, {} too soon, {} out of focus",
        c.rejected(),
        c.busy,
        c.too_soon,
        c.out_of_focus
    );
    match &state.estimate {
        Some(code) => println!("Final estimate: {}", code),
        None => println!("Final estimate: none"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_region() {
        assert_eq!(parse_region("10, 20,300,40"), Ok(Region::new(10, 20, 300, 40)));
        assert!(parse_region("10,20,300").is_err());
        assert!(parse_region("a,b,c,d").is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let args = Args::try_parse_from(["uld-scanner", "replay", "session.jsonl", "--json"]).unwrap();
        assert!(matches!(args.command, Command::Replay { json: true, region: None, .. }));

        let args = Args::try_parse_from(["uld-scanner", "--config", "c.toml", "config", "init", "--force"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("c.toml")));
        assert!(matches!(args.command, Command::Config { action: ConfigAction::Init { force: true } }));

        assert!(Args::try_parse_from(["uld-scanner", "scan", "--frames", "dir"]).is_err());
    }

    #[test]
    fn test_config_defaults_without_config_dir() {
        let (path, config) = resolve_config(None, || Err(anyhow::anyhow!("no home directory"))).unwrap();
        assert!(path.is_none());
        assert_eq!(config.scan.interval_ms, AppConfig::default().scan.interval_ms);

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("config.toml");
        let (path, _) = resolve_config(None, || Ok(missing.clone())).unwrap();
        assert_eq!(path.as_deref(), Some(missing.as_path()));

        assert!(resolve_config(Some(dir.path().join("other.toml")), || unreachable!()).is_err());
    }

    #[test]
    fn test_config_init_needs_a_path() {
        assert!(run_config(ConfigAction::Init { force: false }, &AppConfig::default(), None).is_err());
        assert!(run_config(ConfigAction::Show, &AppConfig::default(), None).is_ok());
    }

    #[test]
    fn test_with_region_rejects_empty() {
        assert!(with_region(AppConfig::default(), Some(Region::new(0, 0, 0, 10))).is_err());
        let config = with_region(AppConfig::default(), Some(Region::new(1, 2, 3, 4))).unwrap();
        assert_eq!(config.region, Some(Region::new(1, 2, 3, 4)));
    }
}
