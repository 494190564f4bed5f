//! One-direction pipe channels between the parent and its workers.

use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, OwnedFd, RawFd};

use nix::unistd;

use crate::error::{PftError, Result};

/// A unidirectional byte channel created by `pipe(2)`.
///
/// Both endpoints start out owned by this value. During worker spawn the
/// parent keeps exactly one endpoint and closes the other; the child rebinds
/// the opposite endpoint onto a standard descriptor before exec. Each
/// endpoint is closed at most once: a close on an already-closed endpoint is
/// a no-op.
pub struct PipePair {
    read: Option<OwnedFd>,
    write: Option<OwnedFd>,
}

impl PipePair {
    /// Create a fresh pipe with both endpoints open.
    pub fn create() -> Result<Self> {
        let (read, write) = unistd::pipe().map_err(PftError::PipeCreate)?;
        Ok(Self {
            read: Some(read),
            write: Some(write),
        })
    }

    /// Borrow the read endpoint, if still open.
    pub fn read_fd(&self) -> Option<BorrowedFd<'_>> {
        self.read.as_ref().map(AsFd::as_fd)
    }

    /// Borrow the write endpoint, if still open.
    pub fn write_fd(&self) -> Option<BorrowedFd<'_>> {
        self.write.as_ref().map(AsFd::as_fd)
    }

    /// Raw read endpoint, for use between fork and exec.
    pub(crate) fn read_raw(&self) -> Option<RawFd> {
        self.read.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Raw write endpoint, for use between fork and exec.
    pub(crate) fn write_raw(&self) -> Option<RawFd> {
        self.write.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Close the read endpoint, reporting the kernel's verdict.
    pub fn close_read(&mut self) -> Result<()> {
        close_endpoint(&mut self.read)
    }

    /// Close the write endpoint, reporting the kernel's verdict.
    pub fn close_write(&mut self) -> Result<()> {
        close_endpoint(&mut self.write)
    }
}

fn close_endpoint(slot: &mut Option<OwnedFd>) -> Result<()> {
    match slot.take() {
        Some(fd) => unistd::close(fd.into_raw_fd()).map_err(PftError::Close),
        None => Ok(()),
    }
}
