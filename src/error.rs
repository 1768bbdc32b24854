use std::fmt;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    /// The input is not a ZIP container.
    InvalidEpub(String),
    /// A required archive entry is absent, even after percent-decoding its path.
    MissingEntry(String),
    /// `META-INF/container.xml` does not name a package document.
    MalformedContainer(String),
    /// An image could not be decoded or embedded. Absorbed per block.
    Image(String),
    InvalidGeometry(String),
}

impl Error {
    /// True for the failures that mean the file itself could not be read,
    /// i.e. nothing was produced.
    pub fn is_fatal_read(&self) -> bool {
        matches!(
            self,
            Error::InvalidEpub(_) | Error::MissingEntry(_) | Error::MalformedContainer(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::InvalidEpub(msg) => write!(f, "invalid EPUB: {msg}"),
            Error::MissingEntry(path) => write!(f, "missing archive entry: {path}"),
            Error::MalformedContainer(msg) => write!(f, "malformed container.xml: {msg}"),
            Error::Image(msg) => write!(f, "image error: {msg}"),
            Error::InvalidGeometry(msg) => write!(f, "invalid page geometry: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Image(e.to_string())
    }
}
