use crate::backup::container::ContainerFormat;
use std::path::Path;

/// Checks that `path` holds a readable container with at least one entry.
///
/// Never modifies the archive.
pub fn verify_archive<C: ContainerFormat>(container: &C, path: &Path) -> bool {
    match container.entry_count(path) {
        Ok(0) => {
            tracing::warn!("Archive {:?} has no entries", path);
            false
        }
        Ok(count) => {
            tracing::debug!("Archive {:?} holds {} entries", path, count);
            true
        }
        Err(e) => {
            tracing::warn!("Archive {:?} is not readable: {}", path, e);
            false
        }
    }
}
