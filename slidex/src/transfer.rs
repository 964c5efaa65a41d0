//! Streams bytes from a remote or local source into a local file, chunk by chunk.

use std::{
    fmt,
    fs::File,
    io::{self, Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use slidex_common::{
    bin_common::termination::Cookie,
    utils::{fsutils::PartialFile, percent::Percent64, time::Every},
};
use url::Url;

use crate::error::{Error, Result};

/// The largest chunk read at once by default.
pub const CHUNK_SIZE: usize = 65565;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a video comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Locator {
    Remote(Url),
    Local(PathBuf),
}

impl Locator {
    /// URIs with a network scheme are remote, `file://` URIs and everything that doesn't
    /// look like a URI are local paths.
    pub fn parse(s: &str) -> Result<Self> {
        const NETWORK: [&str; 4] = ["http", "https", "ftp", "ftps"];

        match Url::parse(s) {
            Ok(url) if NETWORK.contains(&url.scheme()) => {
                if url.host().is_none() {
                    return Err(Error::UnreachableSource {
                        locator: s.to_string(),
                        source: "the URI has no host".into(),
                    });
                }
                Ok(Self::Remote(url))
            }
            Ok(url) if url.scheme() == "file" => {
                url.to_file_path()
                    .map(Self::Local)
                    .map_err(|()| Error::UnreachableSource {
                        locator: s.to_string(),
                        source: "not a valid file URI".into(),
                    })
            }
            Err(e)
                if NETWORK
                    .iter()
                    .any(|scheme| s.starts_with(&format!("{scheme}://"))) =>
            {
                Err(Error::UnreachableSource {
                    locator: s.to_string(),
                    source: Box::new(e),
                })
            }
            _ => Ok(Self::Local(PathBuf::from(s))),
        }
    }

    /// The extension of the last path segment, if it has one.
    pub fn extension(&self) -> Option<String> {
        let path = match self {
            Self::Remote(url) => Path::new(url.path_segments()?.last()?).to_owned(),
            Self::Local(path) => path.clone(),
        };
        path.extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .map(|ext| ext.to_string())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(url) => write!(f, "{url}"),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

pub enum Chunk {
    Data(Vec<u8>),
    EndOfStream,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Progress {
    /// In `[0, 1]`
    Fraction(f64),
    Indeterminate,
}

/// An open source together with how much has been read from it.
pub struct Session {
    locator: String,
    total: Option<u64>,
    transferred: u64,
    reader: Box<dyn Read + Send>,
}

impl Session {
    pub fn open(locator: &Locator) -> Result<Self> {
        match locator {
            Locator::Remote(url) => match url.scheme() {
                "http" | "https" => Self::open_http(url),
                _ => Err(Error::UnsupportedScheme {
                    locator: locator.to_string(),
                }),
            },
            Locator::Local(path) => Self::open_file(path),
        }
    }

    fn open_http(url: &Url) -> Result<Self> {
        let unreachable = |e: reqwest::Error| Error::UnreachableSource {
            locator: url.to_string(),
            source: Box::new(e),
        };

        let client = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None)
            .build()
            .map_err(unreachable)?;

        log::debug!("Requesting {url}");
        let response = client.get(url.clone()).send().map_err(unreachable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::BadStatus {
                locator: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total = response.content_length();
        log::debug!("{url} answered with {status}, the length is {total:?}");
        Ok(Self::from_reader(url.to_string(), response, total))
    }

    fn open_file(path: &Path) -> Result<Self> {
        let unreachable = |e: io::Error| Error::UnreachableSource {
            locator: path.display().to_string(),
            source: Box::new(e),
        };

        let file = File::open(path).map_err(unreachable)?;
        let total = file.metadata().map_err(unreachable)?.len();
        Ok(Self::from_reader(path.display().to_string(), file, Some(total)))
    }

    /// A session around anything readable. `total` is the number of bytes `reader` is
    /// expected to produce, if known.
    pub fn from_reader(
        locator: impl Into<String>,
        reader: impl Read + Send + 'static,
        total: Option<u64>,
    ) -> Self {
        Self {
            locator: locator.into(),
            total,
            transferred: 0,
            reader: Box::new(reader),
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    /// Reads at most `max_bytes`. Never returns an empty `Data`.
    pub fn read_chunk(&mut self, max_bytes: usize) -> Result<Chunk> {
        if max_bytes == 0 {
            return Err(Error::InvalidChunkSize);
        }

        let mut buf = vec![0; max_bytes];
        let read = loop {
            match self.reader.read(&mut buf) {
                Ok(read) => break read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.transfer_error(e)),
            }
        };

        if read == 0 {
            return match self.total {
                Some(total) if self.transferred < total => {
                    Err(self.transfer_error(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "the stream ended after {} of {total} bytes",
                            self.transferred
                        ),
                    )))
                }
                _ => Ok(Chunk::EndOfStream),
            };
        }

        let transferred = self.transferred + read as u64;
        if let Some(total) = self.total {
            if transferred > total {
                return Err(Error::Oversized {
                    locator: self.locator.clone(),
                    total,
                });
            }
        }
        self.transferred = transferred;

        buf.truncate(read);
        Ok(Chunk::Data(buf))
    }

    pub fn progress(&self) -> Progress {
        match self.total {
            Some(0) => Progress::Fraction(1.0),
            Some(total) => Progress::Fraction(self.transferred as f64 / total as f64),
            None => Progress::Indeterminate,
        }
    }

    fn transfer_error(&self, source: io::Error) -> Error {
        Error::Transfer {
            locator: self.locator.clone(),
            source,
        }
    }

    fn log_progress(&self) {
        match self.progress() {
            Progress::Fraction(fraction) => match Percent64::from_fraction(fraction) {
                Ok(percent) => log::info!("Downloaded {percent}"),
                Err(_) => log::info!("Downloaded {} bytes", self.transferred),
            },
            Progress::Indeterminate => {
                log::info!("Downloaded {} bytes", self.transferred)
            }
        }
    }
}

/// Writes everything from `session` into `dest`. `dest` only appears once all bytes
/// have been written; on failure or interruption nothing is left behind.
pub fn download(
    mut session: Session,
    dest: impl AsRef<Path>,
    chunk_size: usize,
    cookie: &Cookie,
) -> Result<PathBuf> {
    let dest = dest.as_ref();
    let partial =
        PartialFile::new(dest).map_err(|e| Error::io("creating the download file", e))?;
    let mut file =
        File::create(partial.path()).map_err(|e| Error::write(partial.path(), e))?;

    log::info!(
        "Downloading {} to {}",
        session.locator(),
        partial.target().display()
    );

    let mut log_every = Every::new(Duration::from_secs(1));
    loop {
        if cookie.is_terminating() {
            log::warn!("Termination signal received, abandoning the download");
            return Err(Error::Interrupted);
        }

        match session.read_chunk(chunk_size)? {
            Chunk::Data(data) => file
                .write_all(&data)
                .map_err(|e| Error::write(partial.path(), e))?,
            Chunk::EndOfStream => break,
        }

        log_every.perform(|| session.log_progress());
    }

    file.sync_all()
        .map_err(|e| Error::write(partial.path(), e))?;
    drop(file);

    session.log_progress();
    let done = partial
        .commit()
        .map_err(|e| Error::write(dest, e))?;
    log::info!("Downloaded {} bytes", session.transferred());
    Ok(done)
}
