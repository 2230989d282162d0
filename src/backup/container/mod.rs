//! Compressed container abstraction.
//!
//! The archiver and the combiner only speak [`ContainerFormat`] and
//! [`ContainerWriter`], so the on-disk format can change without touching
//! the backup pipeline.

pub mod tar;
pub mod zip;

use crate::backup::container::tar::{TarContainer, TarContainerWriter};
use crate::backup::container::zip::{ZipContainer, ZipContainerWriter};
use crate::backup::file_ext::FileExtProvider;
use crate::backup::result_error::result::Result;
use derive_more::From;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use validator::{Validate, ValidationErrors};

/// An open container being filled with entries.
///
/// Nothing is visible at the target path until [`ContainerWriter::finish`]
/// succeeds; dropping an unfinished writer discards the partial output.
pub trait ContainerWriter {
    /// Adds the content of the file at `src` under the entry name `name`.
    fn add_file(&mut self, src: &Path, name: &Path) -> Result<()>;

    /// Records `name` as an empty directory entry, copying metadata from `src`.
    fn add_dir(&mut self, src: &Path, name: &Path) -> Result<()>;

    /// Finalizes the container and moves it to its target path.
    fn finish(self) -> Result<PathBuf>;
}

pub trait ContainerFormat: FileExtProvider {
    type Writer: ContainerWriter;

    /// Opens a new container that will land at `path` once finished.
    fn create(&self, path: &Path) -> Result<Self::Writer>;

    /// Reads the container at `path` and counts its entries.
    ///
    /// Fails if the container cannot be opened or decoded.
    fn entry_count(&self, path: &Path) -> Result<usize>;
}

/// Container format picked by configuration. ZIP unless told otherwise.
///
/// ```yaml
/// format: tar
/// compressor:
///   compressor_type: xz
/// ```
#[derive(Clone, Debug, From, Serialize, Deserialize)]
#[serde(tag = "format")]
#[serde(rename_all = "snake_case")]
pub enum ArchiveContainer {
    Zip(ZipContainer),
    Tar(TarContainer),
}

impl Default for ArchiveContainer {
    fn default() -> Self {
        ArchiveContainer::Zip(ZipContainer::default())
    }
}

impl Validate for ArchiveContainer {
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        match self {
            ArchiveContainer::Zip(_) => Ok(()),
            ArchiveContainer::Tar(tar) => tar.validate(),
        }
    }
}

impl FileExtProvider for ArchiveContainer {
    fn file_ext(&self) -> Option<Arc<str>> {
        match self {
            ArchiveContainer::Zip(zip) => zip.file_ext(),
            ArchiveContainer::Tar(tar) => tar.file_ext(),
        }
    }
}

impl ContainerFormat for ArchiveContainer {
    type Writer = ArchiveContainerWriter;

    fn create(&self, path: &Path) -> Result<ArchiveContainerWriter> {
        match self {
            ArchiveContainer::Zip(zip) => zip.create(path).map(Into::into),
            ArchiveContainer::Tar(tar) => tar.create(path).map(Into::into),
        }
    }

    fn entry_count(&self, path: &Path) -> Result<usize> {
        match self {
            ArchiveContainer::Zip(zip) => zip.entry_count(path),
            ArchiveContainer::Tar(tar) => tar.entry_count(path),
        }
    }
}

#[derive(From)]
pub enum ArchiveContainerWriter {
    Zip(ZipContainerWriter),
    Tar(TarContainerWriter),
}

impl ContainerWriter for ArchiveContainerWriter {
    fn add_file(&mut self, src: &Path, name: &Path) -> Result<()> {
        match self {
            ArchiveContainerWriter::Zip(w) => w.add_file(src, name),
            ArchiveContainerWriter::Tar(w) => w.add_file(src, name),
        }
    }

    fn add_dir(&mut self, src: &Path, name: &Path) -> Result<()> {
        match self {
            ArchiveContainerWriter::Zip(w) => w.add_dir(src, name),
            ArchiveContainerWriter::Tar(w) => w.add_dir(src, name),
        }
    }

    fn finish(self) -> Result<PathBuf> {
        match self {
            ArchiveContainerWriter::Zip(w) => w.finish(),
            ArchiveContainerWriter::Tar(w) => w.finish(),
        }
    }
}

/// Temporary file next to `path` that a finished container is persisted from.
///
/// Dropping it before then removes it.
pub(crate) fn pending_file(path: &Path) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let prefix = path
        .file_name()
        .map(|n| format!("{}.", n.to_string_lossy()))
        .unwrap_or_default();
    let tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tracing::debug!("Writing container {:?} through {:?}", path, tmp.path());
    Ok(tmp)
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_is_zip() {
        let container = ArchiveContainer::default();
        assert!(matches!(container, ArchiveContainer::Zip(_)));
        assert_eq!(container.file_ext().as_deref(), Some("zip"));
    }

    #[test]
    fn test_parse_formats() {
        let zip: ArchiveContainer = serde_yml::from_str("format: zip\n").unwrap();
        assert_eq!(zip.file_ext().as_deref(), Some("zip"));

        let tar: ArchiveContainer = serde_yml::from_str(
            "format: tar\ncompressor:\n  compressor_type: xz\n  level: 2\n",
        )
        .unwrap();
        assert_eq!(tar.file_ext().as_deref(), Some("tar.xz"));
        assert!(tar.validate().is_ok());

        let bad: ArchiveContainer = serde_yml::from_str(
            "format: tar\ncompressor:\n  compressor_type: xz\n  level: 12\n",
        )
        .unwrap();
        assert!(bad.validate().is_err());

        assert!(serde_yml::from_str::<ArchiveContainer>("format: rar\n").is_err());
    }

    #[test]
    fn test_both_formats_write_and_count() {
        let formats = [
            ArchiveContainer::default(),
            ArchiveContainer::Tar(TarContainer::default()),
        ];
        for container in formats {
            let dir = TempDir::new().unwrap();
            let src = dir.path().join("a.txt");
            std::fs::write(&src, "hello").unwrap();
            let out = dir.path().join("out");

            let mut writer = container.create(&out).unwrap();
            writer.add_file(&src, Path::new("a.txt")).unwrap();
            writer.add_dir(dir.path(), Path::new("b")).unwrap();
            assert_eq!(writer.finish().unwrap(), out);
            assert_eq!(container.entry_count(&out).unwrap(), 2);
        }
    }

    #[test]
    fn test_pending_file_lives_next_to_target() {
        let dir = TempDir::new().unwrap();
        let tmp = pending_file(&dir.path().join("full.zip")).unwrap();
        assert_eq!(tmp.path().parent(), Some(dir.path()));
        let name = tmp.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("full.zip.") && name.ends_with(".tmp"));
        drop(tmp);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
