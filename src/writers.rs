//! Output writers for documents and downloaded resources

use crate::error::{Error, Result};
use crate::node::Node;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

/// Persists generated bytes
#[async_trait]
pub trait Writer: Send + Sync {
    /// Write `bytes` as `name` under the relative directory `path`
    async fn write(&self, name: &str, path: &str, bytes: &[u8], node: Option<&Node>) -> Result<()>;
}

/// Writes files below a root directory
///
/// Targets must stay inside the root: `path` may only hold plain directory
/// names (`.` and empty segments are ignored) and `name` must be a single file
/// name. Anything else is rejected before the filesystem is touched.
#[derive(Clone, Debug)]
pub struct FsWriter {
    root: PathBuf,
}

impl FsWriter {
    /// Writer rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn target(&self, name: &str, path: &str) -> Result<PathBuf> {
        let mut target = self.root.clone();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(segment) => target.push(segment),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(Error::Other(format!(
                        "refusing to write {name}: directory {path:?} leaves the output root"
                    )));
                }
            }
        }

        let mut name_components = Path::new(name).components();
        match (name_components.next(), name_components.next()) {
            (Some(Component::Normal(file)), None) => target.push(file),
            _ => {
                return Err(Error::Other(format!(
                    "refusing to write {name:?}: not a plain file name"
                )));
            }
        }
        Ok(target)
    }
}

#[async_trait]
impl Writer for FsWriter {
    async fn write(&self, name: &str, path: &str, bytes: &[u8], _node: Option<&Node>) -> Result<()> {
        let target = self.target(name, path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        tracing::debug!(path = %target.display(), bytes = bytes.len(), "file written");
        Ok(())
    }
}

/// One write recorded by a [`DryRunWriter`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedWrite {
    /// Relative directory
    pub path: String,
    /// File name
    pub name: String,
    /// Content length in bytes
    pub len: usize,
}

/// Records writes in memory instead of touching the filesystem
#[derive(Debug, Default)]
pub struct DryRunWriter {
    writes: Mutex<Vec<RecordedWrite>>,
}

impl DryRunWriter {
    /// Empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes recorded so far, in call order
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Writer for DryRunWriter {
    async fn write(&self, name: &str, path: &str, bytes: &[u8], _node: Option<&Node>) -> Result<()> {
        tracing::info!(path, name, bytes = bytes.len(), "dry run: skipping write");
        self.writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedWrite {
                path: path.to_string(),
                name: name.to_string(),
                len: bytes.len(),
            });
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn fs_writer_creates_directories() {
        let dir = TempDir::new().unwrap();
        let writer = FsWriter::new(dir.path());

        writer
            .write("index.md", "docs/guides", b"# Guides", None)
            .await
            .unwrap();

        let written = std::fs::read(dir.path().join("docs/guides/index.md")).unwrap();
        assert_eq!(written, b"# Guides");
    }

    #[tokio::test]
    async fn fs_writer_writes_empty_container_documents() {
        let dir = TempDir::new().unwrap();
        let writer = FsWriter::new(dir.path());

        writer.write("_index.md", "", &[], None).await.unwrap();

        let meta = std::fs::metadata(dir.path().join("_index.md")).unwrap();
        assert_eq!(meta.len(), 0);
    }

    #[tokio::test]
    async fn fs_writer_rejects_targets_outside_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("out");
        let writer = FsWriter::new(&root);

        for (name, path) in [
            ("escaped.txt", "../.."),
            ("escaped.txt", "images/../../.."),
            ("escaped.txt", "/tmp"),
            ("../escaped.txt", "images"),
            ("a/b.txt", ""),
            ("..", ""),
            ("", "images"),
        ] {
            let err = writer.write(name, path, b"x", None).await.unwrap_err();
            assert!(matches!(err, Error::Other(_)), "{name:?} in {path:?}: {err}");
        }

        assert!(!dir.path().join("escaped.txt").exists());
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn fs_writer_ignores_current_dir_segments() {
        let dir = TempDir::new().unwrap();
        let writer = FsWriter::new(dir.path());

        writer.write("logo.png", "./images/.", b"png", None).await.unwrap();

        assert!(dir.path().join("images/logo.png").exists());
    }

    #[tokio::test]
    async fn dry_run_writer_records_in_order() {
        let writer = DryRunWriter::new();
        writer.write("a.md", "x", b"abc", None).await.unwrap();
        writer.write("b.png", "__resources", b"", None).await.unwrap();

        let writes = writer.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].name, "a.md");
        assert_eq!(writes[0].len, 3);
        assert_eq!(writes[1].path, "__resources");
    }
}
