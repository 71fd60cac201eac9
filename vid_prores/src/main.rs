use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

use vid_prores::config::{config_path, Config};
use vid_prores::conversion_api::{
    convert_all, print_probe_report, probe_candidates, ToolSettings,
};
use vid_prores::discovery::find_candidates;

#[derive(Parser)]
#[command(name = "vid-prores")]
#[command(version, about = "Batch converter to Apple ProRes (422 HQ)", long_about = None)]
struct Cli {
    /// Directory to scan for input files
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    /// Convert without asking for confirmation
    #[arg(short, long)]
    yes: bool,

    /// Override and persist the target bits per macroblock
    #[arg(long, value_name = "N")]
    bits_per_mb: Option<u32>,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let _ = shared_utils::logging::init_logging(
        "vid_prores",
        shared_utils::logging::LogConfig::default().with_level(level),
    );

    // The interrupt trigger runs on its own thread: kill whatever process
    // is active and let the orchestrator stop after the current file.
    ctrlc::set_handler(|| {
        shared_utils::request_cancel();
        match shared_utils::kill_active() {
            Some(status) => info!(code = ?status.code(), "🛑 Interrupt: active conversion killed"),
            None => info!("🛑 Interrupt: no active conversion, stopping"),
        }
    })
    .context("Failed to install interrupt handler")?;

    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    if which::which("ffprobe").is_err() {
        bail!("ffprobe not found in PATH: install ffmpeg to get both tools");
    }
    if which::which("ffmpeg").is_err() {
        bail!("ffmpeg not found in PATH");
    }

    let config = load_config(&cli)?;
    info!(
        "⚙️  bits_per_mb={} input_formats={}",
        config.bits_per_mb,
        config.input_formats.join(",")
    );

    let dir = cli
        .dir
        .canonicalize()
        .with_context(|| format!("Input directory not accessible: {}", cli.dir.display()))?;
    info!("📂 Scanning {}", dir.display());

    let candidates = find_candidates(&dir, &config.input_formats);
    if candidates.is_empty() {
        info!(
            "No matching files found (accepted extensions: {})",
            config.input_formats.join(", ")
        );
        return Ok(());
    }
    info!("📂 Found {} candidate file(s)", candidates.len());

    let settings = ToolSettings::new(config.bits_per_mb);
    let mut files = probe_candidates(&settings, &dir, candidates)
        .context("Probe step failed, aborting run")?;

    print_probe_report(&files);

    let eligible = files.iter().filter(|f| f.valid).count();
    if eligible == 0 {
        info!("No files are eligible for conversion");
        return Ok(());
    }

    if !cli.yes && !confirm(eligible)? {
        info!("Aborted by user");
        return Ok(());
    }

    let start = Instant::now();
    let batch = convert_all(&settings, &dir, &mut files)?;
    shared_utils::print_summary_report(&batch, start.elapsed(), "ProRes Conversion");

    if shared_utils::cancel_requested() {
        info!("Run stopped after operator cancellation");
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let path = config_path().context("Could not determine the per-user config directory")?;
    let mut config = Config::load_or_init(&path);

    if let Some(bits) = cli.bits_per_mb {
        if bits == 0 {
            bail!("--bits-per-mb must be positive");
        }
        config.bits_per_mb = bits;
        if let Err(e) = config.save_to(&path) {
            warn!(error = %e, "could not persist --bits-per-mb override");
        }
    }
    Ok(config)
}

fn confirm(eligible: usize) -> Result<bool> {
    print!("Convert {eligible} file(s) to ProRes? [y/N] ");
    std::io::stdout().flush().context("Failed to flush stdout")?;

    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    let answer = answer.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}
