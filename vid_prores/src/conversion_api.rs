//! Conversion orchestration: probe → report → convert, one file at a time.
//!
//! Per-file lifecycle: `Discovered -> Probed(ok|failed) -> [Converting ->
//! Converted|Failed]`. Only files that probed cleanly are converted;
//! a failed probe is terminal for that file and the run continues. The
//! prober or encoder being unlaunchable aborts the whole run instead.
//!
//! Conversions run sequentially by design; a probe is read-only and cheap
//! enough that parallelizing it has never been worth the complexity here.

use crate::discovery::derive_output_name;
use anyhow::{Context, Result};
use shared_utils::ffprobe::{probe_streams, ProbeError};
use shared_utils::process::{SpawnError, ToolProcess};
use shared_utils::progress::{create_conversion_bar, extract_frame_count, percent, LineBuffer};
use shared_utils::report::BatchResult;
use shared_utils::{cancel_requested, clear_active, set_active};
use std::collections::VecDeque;
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// ProRes 422 HQ.
pub const PRORES_PROFILE: &str = "3";
pub const PRORES_VENDOR: &str = "apl0";
pub const PRORES_PIX_FMT: &str = "yuv422p10le";
pub const TARGET_EXTENSION: &str = "mov";

const STDERR_TAIL_LINES: usize = 50;

/// External tool invocation settings. The program names are configurable
/// so tests can substitute mock tools.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub ffmpeg_program: String,
    pub ffprobe_program: String,
    pub bits_per_mb: u32,
}

impl ToolSettings {
    pub fn new(bits_per_mb: u32) -> Self {
        Self {
            ffmpeg_program: "ffmpeg".to_string(),
            ffprobe_program: "ffprobe".to_string(),
            bits_per_mb,
        }
    }
}

/// One discovered file and everything the probe step learned about it.
#[derive(Debug, Clone)]
pub struct VideoFileInfo {
    pub filename: String,
    /// Assigned once, just before conversion starts.
    pub output_name: Option<String>,
    pub codec_name: Option<String>,
    pub frame_count: Option<u64>,
    /// True only when the probe succeeded, the codec resolved and the
    /// frame count is strictly positive.
    pub valid: bool,
}

impl VideoFileInfo {
    pub fn new(filename: String) -> Self {
        Self {
            filename,
            output_name: None,
            codec_name: None,
            frame_count: None,
            valid: false,
        }
    }
}

#[derive(Debug)]
pub enum FileOutcome {
    Converted { output: String },
    Failed { reason: String },
}

/// Probe every candidate. A file failing to probe only invalidates that
/// file; the prober executable being missing aborts the run.
pub fn probe_candidates(
    settings: &ToolSettings,
    dir: &Path,
    names: Vec<String>,
) -> Result<Vec<VideoFileInfo>, ProbeError> {
    let mut files = Vec::with_capacity(names.len());
    for name in names {
        let mut file = VideoFileInfo::new(name);
        match probe_streams(&settings.ffprobe_program, &dir.join(&file.filename)) {
            Ok(probe) => {
                file.codec_name = probe.codec_name;
                file.frame_count = probe.frame_count;
                file.valid = file.codec_name.is_some()
                    && matches!(file.frame_count, Some(frames) if frames > 0);
            }
            Err(e @ ProbeError::ToolMissing(_)) => return Err(e),
            Err(e) => {
                warn!(file = %file.filename, error = %e, "probe failed, file excluded");
            }
        }
        files.push(file);
    }
    Ok(files)
}

pub fn print_probe_report(files: &[VideoFileInfo]) {
    println!();
    println!("📋 Probe results:");
    for file in files {
        if file.valid {
            println!(
                "   ✅ {} ({}, {} frames)",
                file.filename,
                file.codec_name.as_deref().unwrap_or("?"),
                file.frame_count.unwrap_or(0),
            );
        } else {
            println!("   ❌ {} (probe failed or metadata missing, skipped)", file.filename);
        }
    }
    println!();
}

/// Convert one probed file. Returns `Err` only when the encoder itself
/// cannot be launched, which is fatal to the run; a non-zero encoder exit
/// is a per-file `FileOutcome::Failed`.
pub fn convert_file(
    settings: &ToolSettings,
    dir: &Path,
    file: &mut VideoFileInfo,
) -> Result<FileOutcome, SpawnError> {
    let total_frames = match (file.valid, file.frame_count) {
        (true, Some(frames)) if frames > 0 => frames,
        _ => {
            return Ok(FileOutcome::Failed {
                reason: "file is not eligible for conversion".to_string(),
            })
        }
    };

    let output = derive_output_name(dir, &file.filename, TARGET_EXTENSION);
    file.output_name = Some(output.clone());

    let mut cmd = Command::new(&settings.ffmpeg_program);
    cmd.arg("-i")
        .arg(&file.filename)
        .args(["-c:v", "prores_ks"])
        .args(["-profile:v", PRORES_PROFILE])
        .args(["-vendor", PRORES_VENDOR])
        .args(["-bits_per_mb", &settings.bits_per_mb.to_string()])
        .args(["-pix_fmt", PRORES_PIX_FMT])
        .arg("-y")
        .arg(&output);

    let bar = create_conversion_bar(&file.filename);
    let tail: Arc<Mutex<VecDeque<String>>> = Arc::new(Mutex::new(VecDeque::new()));

    // ffmpeg keeps its status line and all diagnostics on stderr; progress
    // lines feed the bar, everything else is kept for error reporting.
    let on_stderr = {
        let bar = bar.clone();
        let tail = Arc::clone(&tail);
        let mut lines = LineBuffer::new();
        move |chunk: &[u8]| {
            for line in lines.push(chunk) {
                match extract_frame_count(&line) {
                    Some(frame) => bar.set_position(percent(frame, total_frames)),
                    None => {
                        let mut tail = tail.lock().unwrap_or_else(|e| e.into_inner());
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                }
            }
        }
    };

    let proc = ToolProcess::spawn(cmd, Some(dir), |_| {}, on_stderr)?;

    // Park a weak handle so the interrupt trigger can reach this process;
    // cleared again once the exit status has been consumed.
    set_active(&proc);
    let status = proc.wait();
    clear_active();

    bar.finish_and_clear();

    if status.success() {
        Ok(FileOutcome::Converted { output })
    } else {
        let tail = tail.lock().unwrap_or_else(|e| e.into_inner());
        let reason = match status.code() {
            Some(code) => format!("encoder exited {code}: {}", format_encoder_error(&tail)),
            None => "encoder aborted (killed)".to_string(),
        };
        Ok(FileOutcome::Failed { reason })
    }
}

/// Drive the whole batch. Invalid files are skipped, conversion failures
/// are counted and the run moves on; after an operator cancellation the
/// run stops instead of starting the next file.
pub fn convert_all(
    settings: &ToolSettings,
    dir: &Path,
    files: &mut [VideoFileInfo],
) -> Result<BatchResult> {
    let mut batch = BatchResult::new();

    for file in files.iter_mut() {
        if cancel_requested() {
            info!("🛑 Cancellation requested, stopping before the next file");
            break;
        }
        if !file.valid {
            batch.skip();
            continue;
        }

        info!("🎬 Converting {}", file.filename);
        let outcome = convert_file(settings, dir, file)
            .with_context(|| format!("cannot launch encoder '{}'", settings.ffmpeg_program))?;

        match outcome {
            FileOutcome::Converted { output } => {
                info!("✅ {} → {}", file.filename, output);
                batch.success();
            }
            FileOutcome::Failed { reason } => {
                info!("❌ {} → FAILED ({})", file.filename, reason);
                batch.fail(dir.join(&file.filename), reason);
            }
        }
    }

    Ok(batch)
}

/// Most meaningful line from the collected stderr tail: prefer an explicit
/// error line, fall back to the last non-empty one.
fn format_encoder_error(tail: &VecDeque<String>) -> String {
    if let Some(line) = tail
        .iter()
        .rev()
        .find(|line| line.contains("Error") || line.contains("error"))
    {
        return line.trim().to_string();
    }
    tail.iter()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| "unknown encoder error".to_string())
}
