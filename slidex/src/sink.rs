use std::{fs, path::PathBuf};

use image::ImageFormat;
use slidex_common::utils::fsutils::{all_files, PartialFile};

use crate::{
    error::{Error, Result},
    frame_source::{FrameSample, PlaybackIndex},
};

pub const SLIDE_EXTENSION: &str = "jpg";

/// The file name of a persisted slide: `{base}_{index}.jpg`. This is the only place
/// that formats or parses it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlideName<'a> {
    pub base: &'a str,
    pub index: PlaybackIndex,
}

impl<'a> SlideName<'a> {
    pub fn new(base: &'a str, index: PlaybackIndex) -> Self {
        Self { base, index }
    }

    pub fn file_name(&self) -> String {
        format!("{}_{}.{}", self.base, self.index, SLIDE_EXTENSION)
    }

    /// `None` if `file_name` isn't a slide of `base` at all, an error if it looks like
    /// one but the index isn't a number.
    pub fn parse(base: &'a str, file_name: &str) -> Option<std::result::Result<Self, ()>> {
        let index = file_name
            .strip_prefix(base)?
            .strip_prefix('_')?
            .strip_suffix(SLIDE_EXTENSION)?
            .strip_suffix('.')?;

        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return Some(Err(()));
        }
        Some(
            index
                .parse()
                .map(|index| Self::new(base, PlaybackIndex(index)))
                .map_err(|_| ()),
        )
    }
}

/// Writes slides as images into one directory.
pub struct SlideSink {
    dir: PathBuf,
    base: String,
}

impl SlideSink {
    pub fn new(dir: impl Into<PathBuf>, base: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base: base.into(),
        }
    }

    /// Removes the slides an earlier run left in the directory. Files that only look
    /// like slides are left alone. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let files: Vec<PathBuf> = all_files(&self.dir)
            .map_err(|e| Error::io(format!("listing {}", self.dir.display()), e))?;

        let mut removed = 0;
        for path in files {
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if let Some(Ok(_)) = SlideName::parse(&self.base, file_name) {
                log::debug!("Removing the old slide {}", path.display());
                fs::remove_file(&path)
                    .map_err(|e| Error::io(format!("removing {}", path.display()), e))?;
                removed += 1;
            }
        }

        if removed > 0 {
            log::info!(
                "Removed {removed} slides of an earlier run from {}",
                self.dir.display()
            );
        }
        Ok(removed)
    }

    pub fn path_of(&self, index: PlaybackIndex) -> PathBuf {
        self.dir.join(SlideName::new(&self.base, index).file_name())
    }

    /// The file only shows up under its real name once it is completely written.
    pub fn persist(&self, slide: &FrameSample) -> Result<PathBuf> {
        let path = self.path_of(slide.index);
        let partial = PartialFile::new(&path).map_err(|e| Error::write(&path, e))?;

        slide
            .image
            .save_with_format(partial.path(), ImageFormat::Jpeg)
            .map_err(|e| Error::write(&path, e))?;
        let path = partial.commit().map_err(|e| Error::write(&path, e))?;

        log::info!("Saved slide {}", path.display());
        Ok(path)
    }
}
