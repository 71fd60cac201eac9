//! Shared utilities for the vid-prores tool.
//!
//! - External process supervision with live output streaming
//! - Signal-safe cancellation of the active process
//! - ffmpeg progress extraction
//! - FFprobe wrapper for the probe step
//! - Logging setup and batch reporting

pub mod cancel;
pub mod ffprobe;
pub mod logging;
pub mod process;
pub mod progress;
pub mod report;

pub use cancel::{cancel_requested, clear_active, kill_active, request_cancel, set_active};
pub use ffprobe::{is_ffprobe_available, probe_streams, ProbeError, ProbeInfo};
pub use process::{SpawnError, ToolProcess, EXIT_POLL_INTERVAL};
pub use progress::{create_conversion_bar, extract_frame_count, percent, LineBuffer};
pub use report::{print_summary_report, BatchResult};
