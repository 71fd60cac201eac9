//! FFprobe wrapper.
//!
//! One read-only inspection per file: codec name and frame count, taken from
//! the first entry of the `streams` array of ffprobe's JSON output. The
//! prober being unlaunchable is a different condition from a file failing to
//! probe; the former aborts the whole run, the latter only invalidates the
//! file.

use serde_json::Value;
use std::io;
use std::path::Path;
use std::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The prober executable itself is missing or cannot be launched.
    /// Fatal to the entire run.
    #[error("prober not available: {0}")]
    ToolMissing(String),
    /// ffprobe ran but exited non-zero for this file. Local to the file.
    #[error("probe failed for {file} (exit code: {code:?})")]
    Failed { file: String, code: Option<i32> },
    /// ffprobe produced output that is not a JSON document. Local.
    #[error("unparseable probe output for {file}: {reason}")]
    Parse { file: String, reason: String },
}

/// Raw metadata from one probe. Fields stay `None` when the probe output
/// does not carry them; validity is decided by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeInfo {
    pub codec_name: Option<String>,
    pub frame_count: Option<u64>,
}

pub fn is_ffprobe_available() -> bool {
    which::which("ffprobe").is_ok()
}

/// Run `program` (normally `ffprobe`) against `path` and extract stream
/// metadata from its stdout.
pub fn probe_streams(program: &str, path: &Path) -> Result<ProbeInfo, ProbeError> {
    let file = path.display().to_string();

    let output = Command::new(program)
        .args(["-v", "error", "-print_format", "json", "-show_streams", "--"])
        .arg(path)
        .output()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ProbeError::ToolMissing(program.to_string()),
            _ => ProbeError::ToolMissing(format!("{program}: {e}")),
        })?;

    if !output.status.success() {
        return Err(ProbeError::Failed {
            file,
            code: output.status.code(),
        });
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout), &file)
}

/// Parse one ffprobe JSON document. `codec_name` is a plain string;
/// `nb_frames` arrives as a string of decimal digits.
pub fn parse_probe_output(json_str: &str, file: &str) -> Result<ProbeInfo, ProbeError> {
    let json: Value = serde_json::from_str(json_str).map_err(|e| ProbeError::Parse {
        file: file.to_string(),
        reason: e.to_string(),
    })?;

    let first_stream = json["streams"].get(0).cloned().unwrap_or(Value::Null);

    let codec_name = first_stream["codec_name"].as_str().map(|s| s.to_string());
    let frame_count = first_stream["nb_frames"]
        .as_str()
        .and_then(|s| s.parse::<u64>().ok());

    Ok(ProbeInfo {
        codec_name,
        frame_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codec_and_frame_count() {
        let json = r#"{"streams":[{"codec_name":"h264","nb_frames":"300","width":1920}]}"#;
        let info = parse_probe_output(json, "a.mp4").expect("valid json");
        assert_eq!(info.codec_name.as_deref(), Some("h264"));
        assert_eq!(info.frame_count, Some(300));
    }

    #[test]
    fn only_the_first_stream_is_consulted() {
        let json = r#"{"streams":[
            {"codec_name":"h264","nb_frames":"300"},
            {"codec_name":"aac","nb_frames":"9999"}
        ]}"#;
        let info = parse_probe_output(json, "a.mp4").expect("valid json");
        assert_eq!(info.codec_name.as_deref(), Some("h264"));
        assert_eq!(info.frame_count, Some(300));
    }

    #[test]
    fn missing_fields_stay_none() {
        let info = parse_probe_output(r#"{"streams":[{"width":640}]}"#, "a.mp4").expect("json");
        assert_eq!(info, ProbeInfo::default());

        let info = parse_probe_output(r#"{"streams":[]}"#, "a.mp4").expect("json");
        assert_eq!(info, ProbeInfo::default());

        let info = parse_probe_output(r#"{}"#, "a.mp4").expect("json");
        assert_eq!(info, ProbeInfo::default());
    }

    #[test]
    fn non_numeric_nb_frames_is_dropped() {
        let json = r#"{"streams":[{"codec_name":"h264","nb_frames":"N/A"}]}"#;
        let info = parse_probe_output(json, "a.mp4").expect("json");
        assert_eq!(info.codec_name.as_deref(), Some("h264"));
        assert_eq!(info.frame_count, None);
    }

    #[test]
    fn garbage_output_is_a_parse_error() {
        let err = parse_probe_output("not json at all", "a.mp4").unwrap_err();
        assert!(matches!(err, ProbeError::Parse { .. }));
    }

    #[cfg(unix)]
    mod with_mock_prober {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &Path, body: &str) -> std::path::PathBuf {
            let path = dir.join("fake_ffprobe");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
            let mut perms = std::fs::metadata(&path).expect("metadata").permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).expect("chmod");
            path
        }

        #[test]
        fn mock_prober_end_to_end() {
            let dir = tempfile::tempdir().expect("tempdir");
            let prober = script(
                dir.path(),
                r#"echo '{"streams":[{"codec_name":"h264","nb_frames":"300"}]}'"#,
            );

            let info = probe_streams(prober.to_str().expect("utf8"), Path::new("a.mp4"))
                .expect("probe");
            assert_eq!(info.codec_name.as_deref(), Some("h264"));
            assert_eq!(info.frame_count, Some(300));
        }

        #[test]
        fn failing_probe_is_local_not_fatal() {
            let dir = tempfile::tempdir().expect("tempdir");
            let prober = script(dir.path(), "exit 1");

            let err = probe_streams(prober.to_str().expect("utf8"), Path::new("c.mp4"))
                .unwrap_err();
            assert!(matches!(err, ProbeError::Failed { code: Some(1), .. }));
        }

        #[test]
        fn missing_prober_is_fatal_tool_error() {
            let err = probe_streams("no-such-prober-9181", Path::new("a.mp4")).unwrap_err();
            assert!(matches!(err, ProbeError::ToolMissing(_)));
        }
    }
}
