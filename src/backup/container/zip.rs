use crate::backup::container::{pending_file, ContainerFormat, ContainerWriter};
use crate::backup::file_ext::FileExtProvider;
use crate::backup::finish::Finish;
use crate::backup::result_error::result::Result;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

static ZIP_FILE_EXT: OnceLock<Arc<str>> = OnceLock::new();

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZipCompression {
    Stored,
    #[default]
    Deflated,
}

impl From<ZipCompression> for CompressionMethod {
    fn from(value: ZipCompression) -> Self {
        match value {
            ZipCompression::Stored => CompressionMethod::Stored,
            ZipCompression::Deflated => CompressionMethod::Deflated,
        }
    }
}

/// ZIP container, entries compressed one by one.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZipContainer {
    #[serde(default)]
    compression: ZipCompression,
}

impl ZipContainer {
    pub fn new(compression: ZipCompression) -> Self {
        Self { compression }
    }
}

impl FileExtProvider for ZipContainer {
    fn file_ext(&self) -> Option<Arc<str>> {
        Some(ZIP_FILE_EXT.get_or_init(|| "zip".into()).clone())
    }
}

impl ContainerFormat for ZipContainer {
    type Writer = ZipContainerWriter;

    fn create(&self, path: &Path) -> Result<ZipContainerWriter> {
        let tmp = pending_file(path)?;
        Ok(ZipContainerWriter {
            zip: ZipWriter::new(BufWriter::new(tmp)),
            options: SimpleFileOptions::default().compression_method(self.compression.into()),
            path: path.to_path_buf(),
            entry_count: 0,
        })
    }

    fn entry_count(&self, path: &Path) -> Result<usize> {
        let archive = ZipArchive::new(BufReader::new(File::open(path)?))?;
        Ok(archive.len())
    }
}

pub struct ZipContainerWriter {
    zip: ZipWriter<BufWriter<NamedTempFile>>,
    options: SimpleFileOptions,
    path: PathBuf,
    entry_count: usize,
}

/// ZIP entry names always use `/`, whatever the platform separator is.
fn entry_name(name: &Path) -> String {
    name.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .join("/")
}

impl ZipContainerWriter {
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }
}

impl ContainerWriter for ZipContainerWriter {
    fn add_file(&mut self, src: &Path, name: &Path) -> Result<()> {
        let mut file = File::open(src)?;
        let large = file.metadata()?.len() >= u64::from(u32::MAX);
        self.zip
            .start_file(entry_name(name), self.options.large_file(large))?;
        std::io::copy(&mut file, &mut self.zip)?;
        self.entry_count += 1;
        Ok(())
    }

    fn add_dir(&mut self, _src: &Path, name: &Path) -> Result<()> {
        self.zip.add_directory(entry_name(name), self.options)?;
        self.entry_count += 1;
        Ok(())
    }

    fn finish(self) -> Result<PathBuf> {
        let tmp = self.zip.finish()?.finish()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        tracing::debug!(
            "Finished container {:?} with {} entries",
            self.path,
            self.entry_count
        );
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_entry_names_use_forward_slash() {
        assert_eq!(entry_name(Path::new("a/b/c.txt")), "a/b/c.txt");
        assert_eq!(entry_name(Path::new("./a")), "a");
    }

    #[test]
    fn test_write_then_read_back() {
        for compression in [ZipCompression::Stored, ZipCompression::Deflated] {
            let dir = TempDir::new().unwrap();
            let src = dir.path().join("a.txt");
            std::fs::write(&src, "hello hello hello").unwrap();
            let out = dir.path().join("out.zip");
            let container = ZipContainer::new(compression);

            let mut writer = container.create(&out).unwrap();
            writer.add_dir(dir.path(), Path::new("b")).unwrap();
            writer.add_file(&src, Path::new("b/a.txt")).unwrap();
            assert_eq!(writer.entry_count(), 2);
            assert!(!out.exists());
            assert_eq!(writer.finish().unwrap(), out);

            assert_eq!(container.entry_count(&out).unwrap(), 2);
            let mut archive = ZipArchive::new(File::open(&out).unwrap()).unwrap();
            assert!(archive.by_name("b/").unwrap().is_dir());
            let mut content = String::new();
            archive
                .by_name("b/a.txt")
                .unwrap()
                .read_to_string(&mut content)
                .unwrap();
            assert_eq!(content, "hello hello hello");
        }
    }

    #[test]
    fn test_dropped_writer_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.zip");
        {
            let _writer = ZipContainer::default().create(&out).unwrap();
        }
        assert!(!out.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_empty_container_has_no_entries() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("empty.zip");
        ZipContainer::default().create(&out).unwrap().finish().unwrap();
        assert_eq!(ZipContainer::default().entry_count(&out).unwrap(), 0);
    }

    #[test]
    fn test_garbage_is_not_readable() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("garbage.zip");
        std::fs::write(&out, "definitely not a zip").unwrap();
        assert!(ZipContainer::default().entry_count(&out).is_err());
    }
}
