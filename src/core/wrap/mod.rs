// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Device-node file wrapper registry
//!
//! The registry intercepts file descriptors that refer to well-known device
//! nodes (`/dev/nvhost-gr3d`, `/dev/nvmap`, ...) so that later operations on
//! them can be handled by a wrapper instead of the real device.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 Files                       │
//! ├─────────────────────────────────────────────┤
//! │  table: Vec<FileTableEntry>  (append-only)  │
//! │    "/dev/nvmap"       → open_fn             │
//! │    "/dev/nvhost-gr3d" → open_fn             │
//! │                                             │
//! │  files: Vec<File>            (open handles) │
//! │    fd 5, dups [9, -, -, ...] → FileOps      │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Handle lifecycle
//!
//! Unopened → Open → (Duplicated)* → Closing → Released
//!
//! A handle carries two kinds of references: its primary descriptor and up
//! to [`MAX_DUP_FDS`] duplicates. `release` runs exactly once, when the last
//! of them is closed, regardless of the order they are closed in.
//!
//! # Pass-through
//!
//! Every lookup-style entry point returns `None` for descriptors and paths
//! the registry does not know about. Callers treat `None` as "not
//! intercepted" and fall through to the real system call.

pub mod hexdump;
#[cfg(test)]
mod tests;

use crate::core::config::Options;
use crate::core::error::{GrateError, Result};
use std::fmt;
use std::io;
use std::os::fd::RawFd;

/// Number of duplicate descriptors tracked per handle
pub const MAX_DUP_FDS: usize = 8;

/// Operations implemented by a wrapped file
///
/// Everything except `release` defaults to "unsupported".
pub trait FileOps {
    /// Called once when the last descriptor referring to the file closes
    fn release(&mut self, _path: &str) {}

    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::ErrorKind::Unsupported.into())
    }

    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::ErrorKind::Unsupported.into())
    }

    /// Handle a device control request; `arg` is the request payload
    fn ioctl(&mut self, _request: u64, _arg: &mut [u8]) -> io::Result<i32> {
        Err(io::ErrorKind::Unsupported.into())
    }
}

/// Constructor for a wrapped file
///
/// Receives the opened path and descriptor; an error means the path matched
/// but the wrapper could not be set up.
pub type OpenFn = Box<dyn Fn(&str, RawFd) -> io::Result<Box<dyn FileOps>>>;

/// Registered (path, constructor) pair
struct FileTableEntry {
    path: String,
    open: OpenFn,
}

/// Intercepted file handle
pub struct File {
    path: String,
    fd: Option<RawFd>,
    dup_fds: [Option<RawFd>; MAX_DUP_FDS],
    ops: Box<dyn FileOps>,
}

impl File {
    /// Path the file was opened with
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Primary descriptor, `None` once it has been closed
    pub fn fd(&self) -> Option<RawFd> {
        self.fd
    }

    /// Occupied duplicate descriptor slots
    pub fn dup_fds(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.dup_fds.iter().flatten().copied()
    }

    /// Whether `fd` refers to this file
    pub fn matches(&self, fd: RawFd) -> bool {
        self.fd == Some(fd) || self.dup_fds.contains(&Some(fd))
    }

    /// Track `fd` as a duplicate of this file
    ///
    /// # Errors
    ///
    /// `GrateError::SlotExhaustion` if every slot is occupied. Existing
    /// slots are left untouched and `fd` is not tracked.
    pub fn duplicate(&mut self, fd: RawFd) -> Result<()> {
        match self.dup_fds.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                log::debug!("duplicating {}", self.path);
                *slot = Some(fd);
                Ok(())
            }
            None => {
                log::warn!("out of FD slots");
                Err(GrateError::SlotExhaustion {
                    path: self.path.clone(),
                    capacity: MAX_DUP_FDS,
                })
            }
        }
    }

    /// Access the wrapper implementation
    pub fn ops(&mut self) -> &mut dyn FileOps {
        self.ops.as_mut()
    }

    fn is_unreferenced(&self) -> bool {
        self.fd.is_none() && self.dup_fds.iter().all(Option::is_none)
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("path", &self.path)
            .field("fd", &self.fd)
            .field("dup_fds", &self.dup_fds)
            .finish()
    }
}

/// Registry of wrapper constructors and open wrapped files
///
/// The registry is an explicit object: callers own it and pass it to every
/// place that intercepts file operations. Mutation needs `&mut`, so access
/// is serialized by the borrow checker.
pub struct Files {
    table: Vec<FileTableEntry>,
    files: Vec<File>,
    verbose: bool,
}

impl Files {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            table: Vec::new(),
            files: Vec::new(),
            verbose: false,
        }
    }

    /// Create an empty registry with verbosity taken from `options`
    pub fn with_options(options: &Options) -> Self {
        Self {
            verbose: options.verbose,
            ..Self::new()
        }
    }

    /// Log pattern misses (off by default)
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Register a constructor for `path`
    ///
    /// Entries are never de-duplicated; lookups use the first match.
    pub fn register<F>(&mut self, path: &str, open: F)
    where
        F: Fn(&str, RawFd) -> io::Result<Box<dyn FileOps>> + 'static,
    {
        self.table.push(FileTableEntry {
            path: path.to_string(),
            open: Box::new(open),
        });
    }

    /// Register a static table of constructors, in order
    pub fn register_table(&mut self, table: &[(&str, fn(&str, RawFd) -> io::Result<Box<dyn FileOps>>)]) {
        for &(path, open) in table {
            self.register(path, open);
        }
    }

    /// Number of registered patterns
    pub fn patterns(&self) -> usize {
        self.table.len()
    }

    /// Number of open wrapped files
    pub fn open_files(&self) -> usize {
        self.files.len()
    }

    /// Wrap a freshly opened descriptor
    ///
    /// Returns `None` when no pattern matches `path` (pass through) or when
    /// the matching constructor fails; neither case touches the registry.
    pub fn open(&mut self, path: &str, fd: RawFd) -> Option<&mut File> {
        let Some(entry) = self.table.iter().find(|entry| entry.path == path) else {
            if self.verbose {
                log::debug!("no wrapper for file `{}'", path);
            }
            return None;
        };

        let ops = match (entry.open)(path, fd) {
            Ok(ops) => ops,
            Err(e) => {
                log::warn!("failed to wrap `{}': {}", path, e);
                return None;
            }
        };

        log::debug!("wrapping `{}' as fd {}", path, fd);

        self.files.push(File {
            path: path.to_string(),
            fd: Some(fd),
            dup_fds: [None; MAX_DUP_FDS],
            ops,
        });

        self.files.last_mut()
    }

    /// Find the file a descriptor (primary or duplicate) refers to
    pub fn lookup(&self, fd: RawFd) -> Option<&File> {
        self.files.iter().find(|file| file.matches(fd))
    }

    /// Mutable variant of [`lookup`](Self::lookup)
    pub fn lookup_mut(&mut self, fd: RawFd) -> Option<&mut File> {
        self.files.iter_mut().find(|file| file.matches(fd))
    }

    /// Find the first open file with exactly this path
    pub fn find(&self, path: &str) -> Option<&File> {
        self.files.iter().find(|file| file.path == path)
    }

    /// Track `new_fd` as a duplicate of the file `fd` refers to
    ///
    /// # Errors
    ///
    /// `GrateError::UnknownFd` if `fd` is not wrapped,
    /// `GrateError::SlotExhaustion` if the file has no free slot.
    pub fn dup(&mut self, fd: RawFd, new_fd: RawFd) -> Result<()> {
        self.lookup_mut(fd)
            .ok_or(GrateError::UnknownFd(fd))?
            .duplicate(new_fd)
    }

    /// Close a descriptor
    ///
    /// Clears the primary or duplicate slot holding `fd`. When that was the
    /// last reference, the file is removed and released. Returns whether
    /// `fd` belonged to a wrapped file.
    pub fn close(&mut self, fd: RawFd) -> bool {
        let Some(index) = self.files.iter().position(|file| file.matches(fd)) else {
            return false;
        };

        let file = &mut self.files[index];

        if file.fd == Some(fd) {
            file.fd = None;
        } else if let Some(slot) = file.dup_fds.iter_mut().find(|slot| **slot == Some(fd)) {
            *slot = None;
        }

        if file.is_unreferenced() {
            let mut file = self.files.remove(index);
            log::debug!("closing {}", file.path);
            file.ops.release(&file.path);
        }

        true
    }

    /// Forward a read to the wrapper for `fd`, `None` if not intercepted
    pub fn read(&mut self, fd: RawFd, buf: &mut [u8]) -> Option<io::Result<usize>> {
        self.lookup_mut(fd).map(|file| file.ops.read(buf))
    }

    /// Forward a write to the wrapper for `fd`, `None` if not intercepted
    pub fn write(&mut self, fd: RawFd, buf: &[u8]) -> Option<io::Result<usize>> {
        let verbose = self.verbose;
        let file = self.lookup_mut(fd)?;

        if verbose {
            log::debug!(
                "write({}):\n{}",
                file.path,
                hexdump::hexdump(hexdump::DumpPrefix::Offset, "  ", buf, 16, true)
            );
        }

        Some(file.ops.write(buf))
    }

    /// Forward a control request to the wrapper for `fd`, `None` if not
    /// intercepted
    pub fn ioctl(&mut self, fd: RawFd, request: u64, arg: &mut [u8]) -> Option<io::Result<i32>> {
        self.lookup_mut(fd).map(|file| file.ops.ioctl(request, arg))
    }
}

impl Default for Files {
    fn default() -> Self {
        Self::new()
    }
}
