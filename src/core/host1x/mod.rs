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

//! Host1x device provider
//!
//! Host1x is the DMA/command front end that owns every GPU-visible memory
//! allocation on Tegra. The rest of the crate only talks to it through the
//! [`Host1x`] trait:
//!
//! | Operation        | Purpose                                         |
//! |------------------|-------------------------------------------------|
//! | `bo_create`      | Allocate a backing object                       |
//! | `bo_mmap`        | Map the backing object into the process         |
//! | `bo_invalidate`  | Flush a CPU-written range to the device         |
//! | `bo_free`        | Release the backing object                      |
//!
//! The kernel wire protocol behind a real device is not part of this crate.
//! [`SoftHost1x`] implements the trait in process memory so the harness can
//! run headless and be tested.

mod soft;

pub use soft::SoftHost1x;

use crate::core::error::Result;
use std::fmt;
use std::ptr::NonNull;

/// Device-side identifier of a backing allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoHandle(pub u32);

impl fmt::Display for BoHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bo#{}", self.0)
    }
}

/// Backing-store provider for buffer objects
///
/// All methods take `&self`; implementations keep their bookkeeping behind
/// interior mutability since handles to the device are shared by every
/// buffer object allocated from it.
///
/// # Safety
///
/// `bo_mmap` hands out a raw pointer that buffer objects turn into slices.
/// Implementors must guarantee that the returned pointer is valid for reads
/// and writes of the full size passed to `bo_create` and stays valid (and
/// does not move) until `bo_free` is called for the same handle.
pub unsafe trait Host1x {
    /// Allocate a backing object of at least `size` bytes
    fn bo_create(&self, size: usize, align: usize) -> Result<BoHandle>;

    /// Map a backing object, returning the address of its first byte
    ///
    /// Mapping is idempotent: repeated calls return the same address and
    /// the mapping persists until the object is freed.
    fn bo_mmap(&self, bo: BoHandle) -> Result<NonNull<u8>>;

    /// Make `size` bytes starting at `offset` visible to the device
    fn bo_invalidate(&self, bo: BoHandle, offset: usize, size: usize) -> Result<()>;

    /// Release a backing object
    fn bo_free(&self, bo: BoHandle);
}
