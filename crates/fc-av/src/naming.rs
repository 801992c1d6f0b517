//! Collision-free output paths.

use std::path::{Path, PathBuf};

use fc_core::Error;

/// Upper bound on numbered suffixes tried before giving up.
const MAX_SUFFIX: u32 = 10_000;

/// Pick `dir/<stem>.<ext>`, or the first of `<stem>_1.<ext>`, `<stem>_2.<ext>`,
/// ... that does not exist yet.
///
/// Existence is checked at call time only; the encoder is run with `-y`.
pub fn resolve_output_path(input: &Path, dir: &Path, extension: &str) -> fc_core::Result<PathBuf> {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            Error::Validation(format!("input {} has no file name", input.display()))
        })?;
    let extension = extension.trim_start_matches('.');

    let candidate = dir.join(format!("{stem}.{extension}"));
    if !candidate.exists() {
        return Ok(candidate);
    }

    for n in 1..=MAX_SUFFIX {
        let candidate = dir.join(format!("{stem}_{n}.{extension}"));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(Error::Validation(format!(
        "no free output name for {stem} in {}",
        dir.display()
    )))
}
