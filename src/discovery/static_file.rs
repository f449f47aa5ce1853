use crate::error::{DelegateError, Result};
use crate::output::{parse_manifest, BuildDescription};
use std::path::Path;
use tracing::debug;

/// Reads a previously generated trigger manifest.
///
/// `Ok(None)` when the file does not exist; a file that exists but does
/// not parse is an error, never silently skipped.
pub async fn detect_from_yaml(path: &Path) -> Result<Option<BuildDescription>> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no static trigger manifest");
            return Ok(None);
        }
        Err(e) => return Err(DelegateError::io(path, e)),
    };

    debug!(path = %path.display(), "found static trigger manifest");
    parse_manifest(&text, &path.display().to_string()).map(Some)
}
