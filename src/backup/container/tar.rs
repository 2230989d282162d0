use crate::backup::compress::{Compressor, CompressorBuilder, CompressorConfig};
use crate::backup::container::{pending_file, ContainerFormat, ContainerWriter};
use crate::backup::file_ext::FileExtProvider;
use crate::backup::finish::Finish;
use crate::backup::result_error::result::Result;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tempfile::NamedTempFile;
use validator::{Validate, ValidationErrors};

static TAR_FILE_EXT: OnceLock<Arc<str>> = OnceLock::new();

type TarSink = BufWriter<Compressor<BufWriter<NamedTempFile>>>;

/// TAR container piped through the configured compressor.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TarContainer {
    #[serde(default)]
    compressor: CompressorConfig,
}

impl TarContainer {
    pub fn new(compressor: CompressorConfig) -> Self {
        Self { compressor }
    }

    pub fn compressor(&self) -> &CompressorConfig {
        &self.compressor
    }
}

impl Validate for TarContainer {
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        self.compressor.validate()
    }
}

impl FileExtProvider for TarContainer {
    fn file_ext(&self) -> Option<Arc<str>> {
        Some(
            std::iter::once(TAR_FILE_EXT.get_or_init(|| "tar".into()).clone())
                .chain(self.compressor.file_ext())
                .join(".")
                .into(),
        )
    }
}

impl ContainerFormat for TarContainer {
    type Writer = TarContainerWriter;

    fn create(&self, path: &Path) -> Result<TarContainerWriter> {
        let tmp = pending_file(path)?;
        let sink = self
            .compressor
            .build_compressor(BufWriter::new(tmp))
            .map(BufWriter::new)?;
        let mut builder = tar::Builder::new(sink);
        builder.follow_symlinks(true);

        Ok(TarContainerWriter {
            builder,
            path: path.to_path_buf(),
            entry_count: 0,
        })
    }

    fn entry_count(&self, path: &Path) -> Result<usize> {
        let reader = self
            .compressor
            .build_decompressor(BufReader::new(File::open(path)?));
        let mut archive = tar::Archive::new(reader);
        let mut count = 0;
        for entry in archive.entries()? {
            entry?;
            count += 1;
        }
        Ok(count)
    }
}

pub struct TarContainerWriter {
    builder: tar::Builder<TarSink>,
    path: PathBuf,
    entry_count: usize,
}

impl TarContainerWriter {
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }
}

impl ContainerWriter for TarContainerWriter {
    fn add_file(&mut self, src: &Path, name: &Path) -> Result<()> {
        self.builder.append_path_with_name(src, name)?;
        self.entry_count += 1;
        Ok(())
    }

    fn add_dir(&mut self, src: &Path, name: &Path) -> Result<()> {
        self.builder.append_dir(name, src)?;
        self.entry_count += 1;
        Ok(())
    }

    fn finish(self) -> Result<PathBuf> {
        let tmp = self
            .builder
            .into_inner()?
            .finish()?
            .finish()?
            .finish()?;
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
