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

//! In-process Host1x implementation
//!
//! Backing objects are zero-filled heap allocations. The device keeps
//! counters of live objects and bytes, records every invalidate request and
//! can be told to run out of memory or to fail mappings, which is what the
//! lifecycle tests rely on.

use super::{BoHandle, Host1x};
use crate::core::error::{GrateError, Result};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::ptr::NonNull;

/// One backing allocation
///
/// Storage is a leaked boxed slice; its address is stable until drop.
struct SoftBo {
    ptr: NonNull<u8>,
    len: usize,
}

impl SoftBo {
    /// Allocate `size` zeroed bytes; `None` when the allocator refuses
    fn new(size: usize) -> Option<Self> {
        let mut storage = Vec::new();
        storage.try_reserve_exact(size).ok()?;
        storage.resize(size, 0u8);

        let storage = storage.into_boxed_slice();
        let len = storage.len();
        let ptr = NonNull::from(Box::leak(storage)).cast::<u8>();
        Some(Self { ptr, len })
    }
}

impl Drop for SoftBo {
    fn drop(&mut self) {
        // SAFETY: ptr/len come from Box::into_raw in SoftBo::new and are
        // released exactly once, here.
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                self.ptr.as_ptr(),
                self.len,
            )));
        }
    }
}

/// Software Host1x device backed by process memory
///
/// # Example
///
/// ```
/// use grate::core::host1x::{Host1x, SoftHost1x};
///
/// let host1x = SoftHost1x::new();
/// let bo = host1x.bo_create(64, 2).unwrap();
/// assert_eq!(host1x.live_objects(), 1);
///
/// host1x.bo_free(bo);
/// assert_eq!(host1x.live_objects(), 0);
/// ```
pub struct SoftHost1x {
    objects: RefCell<BTreeMap<BoHandle, SoftBo>>,
    next_handle: Cell<u32>,
    allocated: Cell<usize>,
    memory_limit: Cell<Option<usize>>,
    fail_mmap: Cell<bool>,
    invalidations: RefCell<Vec<(BoHandle, usize, usize)>>,
}

impl SoftHost1x {
    /// Create a device with unlimited memory
    pub fn new() -> Self {
        Self {
            objects: RefCell::new(BTreeMap::new()),
            next_handle: Cell::new(1),
            allocated: Cell::new(0),
            memory_limit: Cell::new(None),
            fail_mmap: Cell::new(false),
            invalidations: RefCell::new(Vec::new()),
        }
    }

    /// Create a device that refuses allocations beyond `limit` live bytes
    pub fn with_memory_limit(limit: usize) -> Self {
        let host1x = Self::new();
        host1x.memory_limit.set(Some(limit));
        host1x
    }

    /// Change the live-byte limit (`None` removes it)
    pub fn set_memory_limit(&self, limit: Option<usize>) {
        self.memory_limit.set(limit);
    }

    /// Make every subsequent `bo_mmap` fail
    pub fn set_mmap_failure(&self, fail: bool) {
        self.fail_mmap.set(fail);
    }

    /// Number of backing objects currently allocated
    pub fn live_objects(&self) -> usize {
        self.objects.borrow().len()
    }

    /// Number of bytes currently allocated
    pub fn allocated_bytes(&self) -> usize {
        self.allocated.get()
    }

    /// Every invalidate request seen so far as `(handle, offset, size)`
    pub fn invalidations(&self) -> Vec<(BoHandle, usize, usize)> {
        self.invalidations.borrow().clone()
    }
}

impl Default for SoftHost1x {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: mapped addresses point into SoftBo storage, which is allocated once
// per handle, never resized or moved, and only released in bo_free (or when
// the device itself is dropped).
unsafe impl Host1x for SoftHost1x {
    fn bo_create(&self, size: usize, align: usize) -> Result<BoHandle> {
        if size == 0 {
            return Err(GrateError::Allocation {
                size,
                reason: "zero-sized allocation".to_string(),
            });
        }

        let align = align.max(1);
        let aligned = size
            .checked_next_multiple_of(align)
            .ok_or_else(|| GrateError::Allocation {
                size,
                reason: format!("size overflows when aligned to {} bytes", align),
            })?;

        if let Some(limit) = self.memory_limit.get() {
            let in_use = self.allocated.get().checked_add(aligned);
            if in_use.is_none_or(|in_use| in_use > limit) {
                return Err(GrateError::Allocation {
                    size,
                    reason: format!(
                        "out of memory ({} of {} bytes in use)",
                        self.allocated.get(),
                        limit
                    ),
                });
            }
        }

        let storage = SoftBo::new(aligned).ok_or_else(|| GrateError::Allocation {
            size,
            reason: format!("host allocator refused {} bytes", aligned),
        })?;

        let handle = BoHandle(self.next_handle.get());
        self.next_handle.set(handle.0.wrapping_add(1));

        self.objects.borrow_mut().insert(handle, storage);
        self.allocated.set(self.allocated.get().saturating_add(aligned));

        log::trace!("host1x: created {} ({} bytes)", handle, aligned);

        Ok(handle)
    }

    fn bo_mmap(&self, bo: BoHandle) -> Result<NonNull<u8>> {
        if self.fail_mmap.get() {
            return Err(GrateError::Map(format!("mmap of {} refused", bo)));
        }

        self.objects
            .borrow()
            .get(&bo)
            .map(|obj| obj.ptr)
            .ok_or_else(|| GrateError::Map(format!("{} is not allocated", bo)))
    }

    fn bo_invalidate(&self, bo: BoHandle, offset: usize, size: usize) -> Result<()> {
        let objects = self.objects.borrow();
        let obj = objects
            .get(&bo)
            .ok_or_else(|| GrateError::Map(format!("{} is not allocated", bo)))?;

        let end = offset.checked_add(size).filter(|&end| end <= obj.len);
        if end.is_none() {
            return Err(GrateError::Range {
                offset: offset.saturating_add(size),
                size: obj.len,
            });
        }

        self.invalidations.borrow_mut().push((bo, offset, size));
        Ok(())
    }

    fn bo_free(&self, bo: BoHandle) {
        match self.objects.borrow_mut().remove(&bo) {
            Some(obj) => {
                self.allocated.set(self.allocated.get() - obj.len);
                log::trace!("host1x: freed {}", bo);
            }
            None => log::warn!("host1x: free of unknown {}", bo),
        }
    }
}
