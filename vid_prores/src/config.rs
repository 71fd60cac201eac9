//! Persisted user configuration.
//!
//! A small JSON document in the per-user config directory holding the
//! target bitrate and the accepted input extensions. Both fields are
//! validated independently on load: an invalid field silently reverts to
//! its default while a valid sibling is still applied, but *either* field
//! failing marks the whole load as unsuccessful, which triggers an
//! immediate re-save of the merged document. A malformed config is never
//! fatal.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_BITS_PER_MB: u32 = 600;
pub const DEFAULT_INPUT_FORMAT: &str = "mp4";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Target bits per macroblock handed to the encoder. Always positive.
    pub bits_per_mb: u32,
    /// Accepted input extensions: lowercase, no leading dot, never empty.
    pub input_formats: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bits_per_mb: DEFAULT_BITS_PER_MB,
            input_formats: vec![DEFAULT_INPUT_FORMAT.to_string()],
        }
    }
}

/// Loose mirror of the on-disk document; field validation happens per
/// field, not through serde failing the whole struct.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    bits_per_mb: Option<u32>,
    input_formats: Option<Vec<String>>,
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("vid_prores").join("config.json"))
}

impl Config {
    /// Read the document at `path`. The returned flag is `true` only when
    /// the file existed, parsed, and every field validated; any other
    /// outcome yields a default-merged config and `false`.
    pub fn load_from(path: &Path) -> (Self, bool) {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => return (Self::default(), false),
        };

        let raw: RawConfig = match serde_json::from_str(&text) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config is not valid JSON, using defaults");
                return (Self::default(), false);
            }
        };

        let mut ok = true;
        let mut config = Self::default();

        match raw.bits_per_mb {
            Some(bits) if bits > 0 => config.bits_per_mb = bits,
            _ => {
                warn!("config field bits_per_mb missing or non-positive, using default");
                ok = false;
            }
        }

        match raw.input_formats.and_then(normalize_formats) {
            Some(formats) => config.input_formats = formats,
            None => {
                warn!("config field input_formats missing or empty, using default");
                ok = false;
            }
        }

        (config, ok)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Load the document, rewriting it with the default-merged values
    /// whenever the load was not fully successful (including a missing
    /// file, which is created with defaults).
    pub fn load_or_init(path: &Path) -> Self {
        let (config, ok) = Self::load_from(path);
        if !ok {
            info!(path = %path.display(), "rewriting configuration with merged defaults");
            if let Err(e) = config.save_to(path) {
                warn!(error = %e, "could not rewrite config, continuing with in-memory values");
            }
        }
        config
    }
}

/// Lowercase, strip a leading dot, drop empties; `None` when nothing
/// usable remains.
fn normalize_formats(formats: Vec<String>) -> Option<Vec<String>> {
    let normalized: Vec<String> = formats
        .iter()
        .map(|f| f.trim().trim_start_matches('.').to_lowercase())
        .filter(|f| !f.is_empty())
        .collect();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}
