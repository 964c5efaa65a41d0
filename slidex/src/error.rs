use std::{io, path::PathBuf};

pub type Result<T> = std::result::Result<T, Error>;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Everything that can stop a run. All variants carry enough context (locator, path)
/// to be understood without the logs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not connect to '{locator}'")]
    UnreachableSource {
        locator: String,
        #[source]
        source: BoxError,
    },

    #[error("'{locator}' replied with status {status}")]
    BadStatus { locator: String, status: u16 },

    #[error("the scheme of '{locator}' is not supported")]
    UnsupportedScheme { locator: String },

    #[error("'{locator}' sent more than the announced {total} bytes")]
    Oversized { locator: String, total: u64 },

    #[error("chunks must be at least one byte")]
    InvalidChunkSize,

    #[error("failed while transferring from '{locator}'")]
    Transfer {
        locator: String,
        #[source]
        source: io::Error,
    },

    #[error("could not open the video at '{path}'")]
    UnreadableMedia {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("failed to decode the video at '{path}'")]
    Decode {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("failed to write '{path}'")]
    WriteError {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("no slides named '{base}_<index>' found in '{dir}'")]
    NoSlidesFound { dir: PathBuf, base: String },

    #[error("the index of the slide '{path}' could not be parsed")]
    MalformedFilename { path: PathBuf },

    #[error("failed to read the image '{path}'")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to create the document")]
    Pdf(#[from] lopdf::Error),

    #[error("io error when '{context}'")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("interrupted")]
    Interrupted,
}

impl Error {
    pub fn io(context: impl ToString, source: io::Error) -> Self {
        Self::Io {
            context: context.to_string(),
            source,
        }
    }

    pub fn write(
        path: impl Into<PathBuf>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::WriteError {
            path: path.into(),
            source: source.into(),
        }
    }
}
