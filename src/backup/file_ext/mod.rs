use std::sync::Arc;

/// Supplies the file extension (without leading dot) of whatever it describes.
pub trait FileExtProvider {
    fn file_ext(&self) -> Option<Arc<str>>;
}
