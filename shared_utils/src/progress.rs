//! Progress extraction from encoder output.
//!
//! ffmpeg reports encoding progress on stderr as a status line it keeps
//! rewriting in place (`frame=  120 fps= 30 q=11.0 size= ...`, terminated
//! with `\r`). [`extract_frame_count`] pulls the frame counter out of one
//! such line; banner and warning lines simply carry no signal, which is not
//! an error. [`LineBuffer`] turns the raw byte chunks delivered by the
//! process pump into complete lines, treating `\r` and `\n` both as
//! terminators.

use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use std::sync::OnceLock;

fn frame_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"frame=\s*(\d+)").expect("valid frame regex"))
}

/// Search `line` for a `frame=` token followed by optional spaces and a run
/// of decimal digits. `None` means "no signal", not failure.
pub fn extract_frame_count(line: &str) -> Option<u64> {
    frame_regex()
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|digits| digits.as_str().parse::<u64>().ok())
}

/// Percent complete from a frame counter against a known total.
/// `total_frames` is validated strictly positive at probe time; the result
/// is capped at 100 because ffmpeg can emit a frame count slightly past the
/// probed total on the final flush.
pub fn percent(frame: u64, total_frames: u64) -> u64 {
    debug_assert!(total_frames > 0);
    (frame.saturating_mul(100) / total_frames.max(1)).min(100)
}

/// Reassembles complete output lines from arbitrary byte chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every line completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            match byte {
                b'\n' | b'\r' => {
                    if !self.pending.is_empty() {
                        lines.push(String::from_utf8_lossy(&self.pending).into_owned());
                        self.pending.clear();
                    }
                }
                _ => self.pending.push(byte),
            }
        }
        lines
    }

    /// Whatever is left after the stream ends without a final terminator.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(line)
    }
}

/// Percent bar for one file conversion.
pub fn create_conversion_bar(filename: &str) -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .expect("valid progress template")
            .progress_chars("█▓░"),
    );
    bar.set_prefix(filename.to_string());
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_frame_count_from_status_line() {
        let line = "frame=  120 fps= 30 q=11.0 size=    2048kB time=00:00:04.00 bitrate=4194.3kbits/s";
        assert_eq!(extract_frame_count(line), Some(120));
    }

    #[test]
    fn line_without_token_yields_no_signal() {
        assert_eq!(extract_frame_count("Stream #0:0: Video: h264"), None);
        assert_eq!(extract_frame_count(""), None);
    }

    #[test]
    fn bare_token_without_digits_yields_no_signal() {
        assert_eq!(extract_frame_count("frame="), None);
        assert_eq!(extract_frame_count("frame=   "), None);
        assert_eq!(extract_frame_count("frame= fps=30"), None);
    }

    #[test]
    fn token_mid_line_is_found() {
        assert_eq!(extract_frame_count("  ... frame=7 ..."), Some(7));
    }

    #[test]
    fn percent_is_capped_at_100() {
        assert_eq!(percent(0, 300), 0);
        assert_eq!(percent(150, 300), 50);
        assert_eq!(percent(300, 300), 100);
        assert_eq!(percent(305, 300), 100);
    }

    #[test]
    fn percent_saturates_on_absurd_frame_counts() {
        assert_eq!(percent(u64::MAX, 300), 100);
        assert_eq!(percent(u64::MAX, 1), 100);
    }

    #[test]
    fn line_buffer_splits_on_cr_and_lf() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"frame=  1").is_empty());
        assert_eq!(buf.push(b"0 fps=30\rframe="), vec!["frame=  10 fps=30".to_string()]);
        assert_eq!(buf.push(b"20\nrest"), vec!["frame=20".to_string()]);
        assert_eq!(buf.finish(), Some("rest".to_string()));
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn line_buffer_ignores_blank_lines() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"\r\n\r\n").is_empty());
        assert_eq!(buf.push(b"x\r\n"), vec!["x".to_string()]);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn any_status_line_round_trips_its_frame_count(
            frame in 0u64..10_000_000,
            pad in 0usize..6
        ) {
            let line = format!("frame={}{} fps= 30 q=11.0", " ".repeat(pad), frame);
            prop_assert_eq!(extract_frame_count(&line), Some(frame));
        }

        #[test]
        fn chunking_never_changes_the_extracted_lines(
            text in "[a-z0-9= \r\n]{0,200}",
            split in 0usize..200
        ) {
            let bytes = text.as_bytes();
            let split = split.min(bytes.len());

            let mut whole = LineBuffer::new();
            let mut all_at_once = whole.push(bytes);
            all_at_once.extend(whole.finish());

            let mut chunked = LineBuffer::new();
            let mut piecewise = chunked.push(&bytes[..split]);
            piecewise.extend(chunked.push(&bytes[split..]));
            piecewise.extend(chunked.finish());

            prop_assert_eq!(all_at_once, piecewise);
        }
    }
}
