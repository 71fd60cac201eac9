//! Batch conversion of videos in a directory to Apple ProRes.
//!
//! The binary is a thin clap front-end; everything it drives lives here so
//! the probe/convert pipeline is testable as a library.

pub mod config;
pub mod conversion_api;
pub mod discovery;

pub use config::{config_path, Config, DEFAULT_BITS_PER_MB};
pub use conversion_api::{
    convert_all, convert_file, print_probe_report, probe_candidates, FileOutcome, ToolSettings,
    VideoFileInfo, TARGET_EXTENSION,
};
pub use discovery::{derive_output_name, extension_of, find_candidates};
