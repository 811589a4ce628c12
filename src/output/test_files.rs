// Playwright test files extracted from Generate artifacts

use crate::error::Result;
use crate::pipeline::{test_source, TestKind};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Where the test file of a kind is written
pub fn test_file_path(output_dir: &Path, kind: TestKind) -> PathBuf {
    output_dir.join(kind.file_name())
}

/// Write `<kind>.spec.ts` from the first fenced code block of an artifact,
/// or from the whole artifact when it has no fence
pub async fn write_test_file(
    output_dir: &Path,
    kind: TestKind,
    artifact_text: &str,
) -> Result<PathBuf> {
    fs::create_dir_all(output_dir).await?;
    let path = test_file_path(output_dir, kind);
    let source = test_source(artifact_text);
    fs::write(&path, &source).await?;
    debug!(path = %path.display(), bytes = source.len(), "wrote test file");
    Ok(path)
}
