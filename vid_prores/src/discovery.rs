//! Candidate discovery and output naming.
//!
//! Lists the working directory (no recursion), filters by the configured
//! input extensions, and derives collision-free destination names.

use std::path::Path;
use walkdir::WalkDir;

/// Lowercased extension of `name`; empty when there is no dot or the dot
/// is the final character.
pub fn extension_of(name: &str) -> String {
    match name.rfind('.') {
        Some(idx) if idx < name.len() - 1 => name[idx + 1..].to_lowercase(),
        _ => String::new(),
    }
}

fn stem_of(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx < name.len() - 1 => &name[..idx],
        _ => name,
    }
}

/// File names (not paths) directly inside `dir` whose extension matches one
/// of `extensions` (case-insensitively). Sorted for stable reporting.
pub fn find_candidates(dir: &Path, extensions: &[String]) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.file_name().to_str().map(|s| s.to_string()))
        .filter(|name| {
            let ext = extension_of(name);
            !ext.is_empty() && extensions.iter().any(|e| e == &ext)
        })
        .collect();
    files.sort();
    files
}

/// Destination name for `filename`: strip the extension, append
/// `_converted`, use `target_ext`. When that name is already taken in
/// `dir`, append `_1`, `_2` and so on, picking the first unused suffix.
/// Repeated runs therefore never reuse or overwrite a prior output.
pub fn derive_output_name(dir: &Path, filename: &str, target_ext: &str) -> String {
    let base = format!("{}_converted", stem_of(filename));

    let plain = format!("{base}.{target_ext}");
    if !dir.join(&plain).exists() {
        return plain;
    }
    let mut n = 1u32;
    loop {
        let candidate = format!("{base}_{n}.{target_ext}");
        if !dir.join(&candidate).exists() {
            return candidate;
        }
        n += 1;
    }
}
