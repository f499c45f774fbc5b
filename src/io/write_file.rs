use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::BlazeLogError;

/// Append-only log file. Owns the descriptor; closed on drop.
pub struct WriteOnlyFile {
    file: File,
    path: PathBuf,
}

impl WriteOnlyFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BlazeLogError> {
        let file = Self::open_append(path.as_ref())?;
        debug!("opened log file {:?}", path.as_ref());
        Ok(WriteOnlyFile {
            file,
            path: path.as_ref().to_path_buf(),
        })
    }

    fn open_append(path: &Path) -> Result<File, BlazeLogError> {
        OpenOptions::new()
            .write(true)
            .append(true)
            .create(true)
            .mode(0o644)
            .open(path)
            .map_err(|e| {
                BlazeLogError::file_open_failed(e, &format!("opening log file {path:?}"))
            })
    }

    /// Close the current descriptor and open the path fresh. The descriptor
    /// is only replaced on success; on failure the old one stays usable.
    pub fn reopen(&mut self) -> Result<(), BlazeLogError> {
        let file = Self::open_append(&self.path)?;
        self.file = file;
        debug!("reopened log file {:?}", self.path);
        Ok(())
    }

    pub fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsRawFd for WriteOnlyFile {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}
