use crate::backup::container::{ContainerFormat, ContainerWriter};
use crate::backup::log_sink::LogSink;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use std::path::{Path, PathBuf};

/// Bundles the dump and the content archive into one container at `path`.
///
/// Inputs are stored under their file names. Once the combined container is
/// in place both inputs are removed; failing to remove them is only logged.
/// On any failure the inputs are left untouched.
pub fn combine_archives<C: ContainerFormat, L: LogSink>(
    dump: &Path,
    content: &Path,
    container: &C,
    path: &Path,
    log: &L,
) -> Result<PathBuf> {
    let inputs = [dump, content];
    if let Some(missing) = inputs.iter().find(|p| !p.is_file()) {
        return Err(Error::MissingInput(missing.to_path_buf()));
    }
    let names = inputs
        .iter()
        .map(|p| {
            p.file_name()
                .map(PathBuf::from)
                .ok_or_else(|| Error::MissingInput(p.to_path_buf()))
        })
        .collect::<Result<Vec<_>>>()?;
    if names.first() == names.last() {
        return Err(Error::NameCollision(dump.to_path_buf(), content.to_path_buf()));
    }

    let combine_error = |e: Error| Error::CombineError {
        path: path.to_path_buf(),
        source: Box::new(e),
    };
    let mut writer = container.create(path).map_err(combine_error)?;
    for (input, name) in inputs.iter().zip(&names) {
        writer
            .add_file(input, name)
            .with_msg(format!("Adding {input:?}"))
            .map_err(combine_error)?;
    }
    let path = writer.finish().map_err(combine_error)?;
    if !path.exists() {
        return Err(Error::VerifyMissing(path));
    }
    tracing::info!("Combined {:?} and {:?} into {:?}", dump, content, path);

    for input in inputs {
        if let Err(e) = std::fs::remove_file(input) {
            tracing::warn!("Cannot remove intermediate file {:?}: {}", input, e);
            log.error(format!("Cannot remove intermediate file {input:?}: {e}"));
        }
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::container::broken::BrokenFinish;
    use crate::backup::container::tar::TarContainer;
    use crate::backup::log_sink::MemoryLogSink;
    use std::io::Read;
    use tempfile::TempDir;

    fn inputs(dir: &Path) -> (PathBuf, PathBuf) {
        let dump = dir.join("db-backup-2024-01-02-03-04-05.sql");
        let content = dir.join("wp-content-backup-2024-01-02-03-04-05.tar");
        std::fs::write(&dump, "CREATE TABLE t (a);\n").unwrap();
        std::fs::write(&content, vec![7u8; 1024]).unwrap();
        (dump, content)
    }

    #[test]
    fn test_combine_stores_both_and_removes_inputs() {
        let dir = TempDir::new().unwrap();
        let (dump, content) = inputs(dir.path());
        let out = dir.path().join("full-backup-2024-01-02-03-04-05.tar");
        let log = MemoryLogSink::default();

        let path =
            combine_archives(&dump, &content, &TarContainer::default(), &out, &log).unwrap();
        assert_eq!(path, out);
        assert!(!dump.exists());
        assert!(!content.exists());
        assert!(log.records().is_empty());

        let mut archive = tar::Archive::new(std::fs::File::open(&out).unwrap());
        let mut names = vec![];
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let mut body = vec![];
            entry.read_to_end(&mut body).unwrap();
            names.push((entry.path().unwrap().to_string_lossy().to_string(), body.len()));
        }
        assert_eq!(
            names,
            vec![
                ("db-backup-2024-01-02-03-04-05.sql".to_string(), 20),
                ("wp-content-backup-2024-01-02-03-04-05.tar".to_string(), 1024),
            ]
        );
    }

    #[test]
    fn test_missing_dump_keeps_content_archive() {
        let dir = TempDir::new().unwrap();
        let (dump, content) = inputs(dir.path());
        std::fs::remove_file(&dump).unwrap();
        let out = dir.path().join("full.tar");

        let err = combine_archives(
            &dump,
            &content,
            &TarContainer::default(),
            &out,
            &MemoryLogSink::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingInput(p) if p == dump));
        assert!(content.exists());
        assert!(!out.exists());
    }

    #[test]
    fn test_same_file_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let a = dir.path().join("backup.bin");
        let b = other.path().join("backup.bin");
        std::fs::write(&a, "a").unwrap();
        std::fs::write(&b, "b").unwrap();

        let err = combine_archives(
            &a,
            &b,
            &TarContainer::default(),
            &dir.path().join("full.tar"),
            &MemoryLogSink::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::NameCollision(..)));
        assert!(a.exists() && b.exists());
    }

    #[test]
    fn test_unopenable_output_is_combine_error() {
        let dir = TempDir::new().unwrap();
        let (dump, content) = inputs(dir.path());

        let err = combine_archives(
            &dump,
            &content,
            &TarContainer::default(),
            &dir.path().join("missing/full.tar"),
            &MemoryLogSink::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::CombineError { .. }));
        assert!(dump.exists() && content.exists());
    }

    #[test]
    fn test_failed_finish_keeps_inputs() {
        let dir = TempDir::new().unwrap();
        let (dump, content) = inputs(dir.path());
        let out = dir.path().join("full.bin");

        let err = combine_archives(
            &dump,
            &content,
            &BrokenFinish::Fails,
            &out,
            &MemoryLogSink::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::CombineError { path, .. } if path == out));
        assert!(dump.exists() && content.exists());
    }

    #[test]
    fn test_missing_output_is_verify_missing() {
        let dir = TempDir::new().unwrap();
        let (dump, content) = inputs(dir.path());
        let out = dir.path().join("full.bin");
        let log = MemoryLogSink::default();

        let err =
            combine_archives(&dump, &content, &BrokenFinish::Vanishes, &out, &log).unwrap_err();
        assert!(matches!(err, Error::VerifyMissing(p) if p == out));
        assert!(dump.exists() && content.exists());
        assert!(log.records().is_empty());
    }
}
