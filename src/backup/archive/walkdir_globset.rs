use crate::backup::archive::{ArchiveEntry, ArchiveEntryIterable};
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithDebugObjectAndFnName;

use bon::Builder;
use derive_more::{Display, From};
use dyn_iter::{DynIter, IntoDynIterator};
use function_name::named;
use getset::Getters;
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize};
use walkdir::{DirEntry, WalkDir};

use std::fmt::Formatter;
use std::path::{Path, PathBuf};
use std::result;

/// The content tree to archive.
///
/// Walks `src_dir` in file name order and yields every directory and file
/// below it. Entries matching one of the `exclude` globs (relative to
/// `src_dir`) are pruned together with their subtree, and so are the
/// `skip_dirs`, which is how the backup output never ends up inside itself.
#[derive(Clone, Debug, Builder, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct ContentTreeSource {
    #[builder(into)]
    src_dir: PathBuf,
    #[builder(default, into)]
    exclude: Vec<CustomDeserializedGlob>,
    #[builder(default, into)]
    skip_dirs: Vec<PathBuf>,
}

/// A glob pattern deserialized from a plain string.
///
/// `*` never crosses a `/`; use `**` to match across directories.
#[derive(Clone, Debug, From, Display, Serialize, PartialEq, Eq, Getters)]
#[serde(transparent)]
#[getset(get = "pub")]
pub struct CustomDeserializedGlob {
    glob: Glob,
}

impl CustomDeserializedGlob {
    pub fn new<S: AsRef<str>>(pattern: S) -> Result<Self> {
        Ok(GlobBuilder::new(pattern.as_ref())
            .literal_separator(true)
            .build()?
            .into())
    }
}

struct CustomGlobVisitor;

impl Visitor<'_> for CustomGlobVisitor {
    type Value = CustomDeserializedGlob;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a glob pattern")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        GlobBuilder::new(v)
            .literal_separator(true)
            .build()
            .map(CustomDeserializedGlob::from)
            .map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for CustomDeserializedGlob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_str(CustomGlobVisitor)
    }
}

impl ArchiveEntryIterable for ContentTreeSource {
    #[named]
    fn archive_entry_iterator<'a>(&self) -> Result<DynIter<'a, Result<ArchiveEntry>>> {
        if !self.src_dir.is_dir() {
            tracing::error!(
                "Content directory does not exist or is not a directory: {:?}",
                self.src_dir
            );
            return Err(Error::from(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{:?} is not a directory", self.src_dir),
            )));
        }

        let root = self.src_dir.canonicalize()?;
        let mut exclude = GlobSetBuilder::new();
        self.exclude.iter().for_each(|g| {
            exclude.add(g.glob.clone());
        });
        let exclude = exclude.build()?;
        let skip_dirs: Vec<PathBuf> = self
            .skip_dirs
            .iter()
            .filter_map(|d| match d.canonicalize() {
                Ok(d) => Some(d),
                Err(e) => {
                    tracing::debug!("Not skipping {:?}, cannot resolve it: {}", d, e);
                    None
                }
            })
            .filter(|d| d.starts_with(&root))
            .collect();

        tracing::info!(
            "Scanning {:?} with {} exclude patterns, skipping {:?}",
            root,
            self.exclude.len(),
            skip_dirs
        );

        let filter_root = root.clone();
        let entries = WalkDir::new(&root)
            .follow_links(true)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |de| keep_dir_entry(de, &filter_root, &exclude, &skip_dirs))
            .filter_map(move |res| {
                let entry = match res {
                    Ok(de) => to_archive_entry(de, &root)?,
                    Err(e) => Err(e.into()),
                };
                Some(entry.with_debug_object_and_fn_name(root.clone(), function_path!()))
            });

        Ok(entries.into_dyn_iter())
    }
}

/// Links are followed, so directories and links are judged by where they
/// really are: anything resolving outside `root` or into a skipped directory
/// is pruned.
fn keep_dir_entry(de: &DirEntry, root: &Path, exclude: &GlobSet, skip_dirs: &[PathBuf]) -> bool {
    let path = de.path();
    if de.path_is_symlink() || de.file_type().is_dir() {
        if let Ok(real) = path.canonicalize() {
            if !real.starts_with(root) {
                tracing::debug!("Skipping {:?}, resolves outside {:?}", path, root);
                return false;
            }
            if skip_dirs.iter().any(|d| real.starts_with(d)) {
                tracing::debug!("Skipping backup output directory {:?}", path);
                return false;
            }
        }
    }
    match path.strip_prefix(root) {
        Ok(relative) if exclude.is_match(relative) => {
            tracing::debug!("Skipping {:?}, matched exclude pattern", path);
            false
        }
        _ => true,
    }
}

fn to_archive_entry(de: DirEntry, root: &Path) -> Option<Result<ArchiveEntry>> {
    let is_dir = de.file_type().is_dir();
    if !is_dir && !de.file_type().is_file() {
        tracing::trace!("Skipping {:?}, not a file or directory", de.path());
        return None;
    }
    let src = de.into_path();
    let res = src
        .strip_prefix(root)
        .map(Path::to_path_buf)
        .map_err(Error::from)
        .map(|dst| {
            let entry = if is_dir {
                ArchiveEntry::dir(src.clone(), dst)
            } else {
                ArchiveEntry::file(src.clone(), dst)
            };
            tracing::trace!("Including {:?} -> {:?}", entry.src, entry.dst);
            entry
        });
    Some(res)
}
