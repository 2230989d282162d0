use liblzma::write::XzEncoder;
use std::fs::File;
use std::io::{BufWriter, Error, IntoInnerError, Write};

/// Flushes trailing state (stream footers, buffers) and hands back the inner writer.
pub trait Finish<O> {
    fn finish(self) -> Result<O, Error>;
}

impl<W: Write> Finish<W> for XzEncoder<W> {
    fn finish(self) -> Result<W, Error> {
        self.finish()
    }
}

impl<W: Write> Finish<W> for BufWriter<W> {
    fn finish(self) -> Result<W, Error> {
        self.into_inner().map_err(IntoInnerError::into_error)
    }
}

impl Finish<File> for File {
    /// Makes sure the bytes hit the disk before the file gets renamed into place.
    fn finish(self) -> Result<File, Error> {
        self.sync_all()?;
        Ok(self)
    }
}
