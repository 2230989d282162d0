use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use itertools::Itertools;
use std::fmt::Debug;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Rusqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    LiblzmaStream(#[from] liblzma::stream::Error),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
    #[error(transparent)]
    Glob(#[from] globset::Error),
    #[error(transparent)]
    StripPrefix(#[from] std::path::StripPrefixError),

    #[error("no tables found")]
    NoTablesFound,
    #[error("cannot write dump file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot finalize dump file {path:?}: {source}")]
    DumpIncomplete {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot create archive {path:?}:\n{}", indent::indent_all_with("  ", source.to_string()))]
    ArchiveCreateError { path: PathBuf, source: Box<Error> },
    #[error("cannot finalize archive {path:?}:\n{}", indent::indent_all_with("  ", source.to_string()))]
    ArchiveWriteError { path: PathBuf, source: Box<Error> },
    #[error("input {0:?} does not exist")]
    MissingInput(PathBuf),
    #[error("inputs {0:?} and {1:?} share the same file name")]
    NameCollision(PathBuf, PathBuf),
    #[error("cannot combine into {path:?}:\n{}", indent::indent_all_with("  ", source.to_string()))]
    CombineError { path: PathBuf, source: Box<Error> },
    #[error("archive {0:?} is missing after finalization")]
    VerifyMissing(PathBuf),
    #[error("archive {0:?} is empty or not readable")]
    InvalidArchive(PathBuf),

    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{:?} {} failed:\n{}", obj_debug, fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithDebugObjAndFnName {
        error: Box<Error>,
        obj_debug: Box<dyn Debug + Send>,
        fn_name: String,
    },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

impl<S: Into<String>, O: Debug + Send + 'static> WithDebugObjectAndFnName<S, O> for Error {
    fn with_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self {
        Error::WithDebugObjAndFnName {
            error: Box::new(self),
            obj_debug: Box::new(obj),
            fn_name: fn_name.into(),
        }
    }
}

impl<S: Into<String>> WithMsg<S> for Error {
    fn with_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl From<Vec<Error>> for Error {
    fn from(errors: Vec<Error>) -> Self {
        Self::LotsOfError(errors.into_iter().flat_map(Error::into_iter).collect_vec())
    }
}

impl Error {
    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(Error::into_iter)),
            e => Box::new(std::iter::once(e)),
        }
    }

    pub fn chain(self, other: Error) -> Error {
        Error::LotsOfError(self.into_iter().chain(other.into_iter()).collect_vec())
    }

    /// Strips context wrappers down to the error that caused the failure.
    pub fn root(&self) -> &Error {
        match self {
            Error::WithMsg { error, .. } | Error::WithDebugObjAndFnName { error, .. } => {
                error.root()
            }
            Error::ArchiveCreateError { source, .. }
            | Error::ArchiveWriteError { source, .. }
            | Error::CombineError { source, .. } => source.root(),
            e => e,
        }
    }
}
