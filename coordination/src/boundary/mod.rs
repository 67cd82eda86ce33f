//! Collaborator boundaries: the checker that finds issues, the fixers that
//! propose patches and the file boundary through which every mutation goes.
//!
//! The core only ever talks to these traits. Concrete process- and
//! network-backed implementations live in the binary; filesystem access is
//! provided here by [`FsFileBoundary`].

pub mod checker;
pub mod files;
pub mod fixer;

pub use checker::{CheckScope, Checker, CheckerError};
pub use files::{FileBoundary, FileBoundaryError, FsFileBoundary, WriteOutcome, BACKUP_SUFFIX};
pub use fixer::{FixProposal, Fixer, FixerError};

#[cfg(test)]
pub use files::MockFileBoundary;
