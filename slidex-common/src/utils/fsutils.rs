use std::{
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
};

/// Collects all files in the given directory, does not walk it recursively.
pub fn all_files<R>(folder: impl AsRef<Path>) -> io::Result<R>
where
    R: FromIterator<PathBuf>,
{
    fs::read_dir(folder)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect()
}

/// Try to read the file, return None if it doesn't exist
pub fn read_optional_file(path: impl AsRef<Path>) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
        Ok(s) => Ok(Some(s)),
    }
}

/// Removes the file, it is not an error if it didn't exist. Returns whether something
/// was removed.
pub fn remove_if_exists(path: impl AsRef<Path>) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// The path with ".part" appended to its filename. The path must refer to something
/// that has a filename.
pub fn part_path(path: impl AsRef<Path>) -> io::Result<PathBuf> {
    let path = path.as_ref();
    let mut new_file_name: OsString = path
        .file_name()
        .ok_or(io::ErrorKind::InvalidInput)?
        .to_owned();
    new_file_name.push(".part");
    Ok(path.with_file_name(new_file_name))
}

/// A file that is written next to its real location and only moved there on `commit`.
/// Anything that is dropped without being committed gets removed, so a file at the real
/// location is always complete.
#[derive(Debug)]
pub struct PartialFile {
    part: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl PartialFile {
    pub fn new(target: impl Into<PathBuf>) -> io::Result<Self> {
        let target = target.into();
        let part = part_path(&target)?;
        Ok(Self {
            part,
            target,
            committed: false,
        })
    }

    /// Where to write the content
    pub fn path(&self) -> &Path {
        &self.part
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn commit(mut self) -> io::Result<PathBuf> {
        fs::rename(&self.part, &self.target)?;
        self.committed = true;
        Ok(self.target.clone())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match remove_if_exists(&self.part) {
            Ok(true) => log::debug!("Removed the incomplete file {}", self.part.display()),
            Ok(false) => (),
            Err(e) => log::error!(
                "Failed to remove the incomplete file {}: {e}",
                self.part.display()
            ),
        }
    }
}
