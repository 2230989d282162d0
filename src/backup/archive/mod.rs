pub mod walkdir_globset;

use crate::backup::container::{ContainerFormat, ContainerWriter};
use crate::backup::function_path;
use crate::backup::log_sink::LogSink;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::WithDebugObjectAndFnName;
use dyn_iter::DynIter;
use function_name::named;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A single file or directory to put into an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Where the content is read from.
    pub src: Arc<Path>,
    /// Entry name inside the archive, relative.
    pub dst: Arc<Path>,
    /// Directories are stored as empty directory entries.
    pub is_dir: bool,
}

impl ArchiveEntry {
    pub fn file<A: Into<Arc<Path>>, B: Into<Arc<Path>>>(src: A, dst: B) -> ArchiveEntry {
        Self {
            src: src.into(),
            dst: dst.into(),
            is_dir: false,
        }
    }

    pub fn dir<A: Into<Arc<Path>>, B: Into<Arc<Path>>>(src: A, dst: B) -> ArchiveEntry {
        Self {
            src: src.into(),
            dst: dst.into(),
            is_dir: true,
        }
    }
}

/// Anything that can enumerate the entries of an archive.
///
/// Each item is a `Result` so that one unreadable entry does not hide the
/// others.
pub trait ArchiveEntryIterable {
    fn archive_entry_iterator<'a>(&self) -> Result<DynIter<'a, Result<ArchiveEntry>>>;
}

/// Outcome of a content archive that got finalized.
#[derive(Debug)]
pub struct ContentArchive {
    pub path: PathBuf,
    pub added: usize,
    pub skipped: usize,
    /// Entries that could not be read or added, if any.
    pub non_fatal_error: Option<Error>,
}

/// Writes every entry of `source` into a new container at `path`.
///
/// Entries that fail are logged and left out. The call fails with
/// [`Error::ArchiveCreateError`] when the source cannot be enumerated or the
/// container cannot be opened, and with [`Error::ArchiveWriteError`] when the
/// container cannot be finalized.
#[named]
pub fn create_content_archive<S, C, L>(
    source: &S,
    container: &C,
    path: &Path,
    log: &L,
) -> Result<ContentArchive>
where
    S: ArchiveEntryIterable + ?Sized,
    C: ContainerFormat,
    L: LogSink,
{
    let create_error = |e: Error| Error::ArchiveCreateError {
        path: path.to_path_buf(),
        source: Box::new(e),
    };
    let entries = source.archive_entry_iterator().map_err(create_error)?;
    let mut writer = container.create(path).map_err(create_error)?;

    let mut added = 0usize;
    let mut errors = vec![];
    for entry in entries {
        let res = entry.and_then(|entry| {
            let written = if entry.is_dir {
                writer.add_dir(&entry.src, &entry.dst)
            } else {
                writer.add_file(&entry.src, &entry.dst)
            };
            written.with_debug_object_and_fn_name(entry, function_path!())
        });
        match res {
            Ok(_) => added += 1,
            Err(e) => {
                tracing::warn!("Ignoring entry: {e}");
                log.error(format!("Skipped entry while archiving files: {e}"));
                errors.push(e);
            }
        }
    }

    let write_error = |e: Error| Error::ArchiveWriteError {
        path: path.to_path_buf(),
        source: Box::new(e),
    };
    let path = writer.finish().map_err(write_error)?;
    if !path.exists() {
        return Err(write_error(Error::VerifyMissing(path)));
    }

    tracing::info!(
        "Archived {} entries into {:?} ({} skipped)",
        added,
        path,
        errors.len()
    );
    Ok(ContentArchive {
        path,
        added,
        skipped: errors.len(),
        non_fatal_error: convert_error_vec(errors).err(),
    })
}
