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

//! Buffer objects
//!
//! A buffer object (BO) is a device-visible memory allocation that the 3D
//! engine reads vertex data, indices and uniforms from and renders into.
//!
//! # Ownership
//!
//! The device allocation is held by a reference-counted backing store.
//! Every [`BufferObject`] is a view `[offset, offset + size)` into one
//! backing store:
//!
//! ```text
//!  backing store (Rc)   ┌──────────────────────────────────────┐
//!                       │ 0                                 N │
//!                       └──────────────────────────────────────┘
//!  parent                [offset = 0, size = N               )
//!  parent.wrap(k)                  [offset = k, size = N - k )
//! ```
//!
//! Wrapping never copies data. A wrap keeps the backing store alive, so
//! freeing the parent first is harmless: the device allocation is released
//! when the last view is dropped.
//!
//! # Mapping
//!
//! [`BufferObject::map`] returns a [`BoMapping`] guard that dereferences to
//! the bytes of the view. The device mapping itself persists for the life
//! of the allocation; only one guard may be live per backing store at a
//! time, so two views can never hand out aliasing mutable slices.


use crate::core::error::{GrateError, Result};
use crate::core::host1x::{BoHandle, Host1x};
use bitflags::bitflags;
use std::cell::Cell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::rc::Rc;

/// Alignment requested from the device for every allocation
const BO_ALIGNMENT: usize = 2;

bitflags! {
    /// Allocation hints
    ///
    /// Recorded on the buffer object and reported in diagnostics. The
    /// software device allocates every object the same way.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BoFlags: u32 {
        /// CPU access goes through the cache
        const CACHED = 1 << 0;
        /// Object holds pixel data for a render target
        const RENDER_TARGET = 1 << 1;
    }
}

/// Reference-counted device allocation shared by a BO and its wraps
struct Backing {
    host1x: Rc<dyn Host1x>,
    handle: BoHandle,
    size: usize,
    mapped: Cell<bool>,
}

impl Drop for Backing {
    fn drop(&mut self) {
        log::debug!("Releasing {} ({} bytes)", self.handle, self.size);
        self.host1x.bo_free(self.handle);
    }
}

/// View over a device allocation
///
/// Cloning a buffer object is equivalent to `wrap(0)`: the clone shares the
/// backing store and covers the same range.
#[derive(Clone)]
pub struct BufferObject {
    backing: Rc<Backing>,
    offset: usize,
    size: usize,
    flags: BoFlags,
}

impl BufferObject {
    /// Allocate a buffer object of `size` bytes
    ///
    /// Content is whatever the device hands out; the software device
    /// zero-fills, real hardware gives no guarantee.
    ///
    /// # Errors
    ///
    /// `GrateError::Allocation` if the device cannot provide the memory.
    pub fn create(host1x: &Rc<dyn Host1x>, size: usize, flags: BoFlags) -> Result<Self> {
        let handle = host1x.bo_create(size, BO_ALIGNMENT)?;

        log::debug!("Created {} ({} bytes, {:?})", handle, size, flags);

        Ok(Self {
            backing: Rc::new(Backing {
                host1x: Rc::clone(host1x),
                handle,
                size,
                mapped: Cell::new(false),
            }),
            offset: 0,
            size,
            flags,
        })
    }

    /// Allocate a buffer object and fill it with `data`
    ///
    /// The written range is invalidated so the device sees it, and the
    /// temporary mapping is released before returning.
    ///
    /// # Errors
    ///
    /// `GrateError::Allocation` or `GrateError::Map`; a failed mapping
    /// releases the fresh allocation.
    pub fn create_from_data(host1x: &Rc<dyn Host1x>, flags: BoFlags, data: &[u8]) -> Result<Self> {
        let bo = Self::create(host1x, data.len(), flags)?;

        {
            let mut map = bo.map()?;
            map.copy_from_slice(data);
        }

        bo.invalidate(data.len())?;

        Ok(bo)
    }

    /// Create an alias over `[offset, size)` of this buffer object
    ///
    /// # Errors
    ///
    /// `GrateError::Range` if `offset >= size`.
    pub fn wrap(&self, offset: usize) -> Result<Self> {
        if offset >= self.size {
            return Err(GrateError::Range {
                offset,
                size: self.size,
            });
        }

        Ok(Self {
            backing: Rc::clone(&self.backing),
            offset: self.offset + offset,
            size: self.size - offset,
            flags: self.flags,
        })
    }

    /// Map the buffer object into the process
    ///
    /// The returned guard covers exactly `size` bytes starting at this
    /// view's offset.
    ///
    /// Only one guard may be live per backing store, across the parent and
    /// all of its wraps and clones. Mapping a parent and one of its wraps at
    /// the same time therefore fails; copy through a single mapping or drop
    /// the first guard before mapping the other view. Once a guard is
    /// dropped the object can be mapped again and sees the same bytes.
    ///
    /// # Errors
    ///
    /// `GrateError::Map` if the device mapping fails or if another view
    /// of the same backing store is currently mapped.
    pub fn map(&self) -> Result<BoMapping<'_>> {
        if self.backing.mapped.get() {
            return Err(GrateError::Map(format!(
                "{} is already mapped",
                self.backing.handle
            )));
        }

        let base = self.backing.host1x.bo_mmap(self.backing.handle).map_err(|e| {
            log::error!("Failed to mmap BO: {}", e);
            e
        })?;

        // SAFETY: the Host1x contract guarantees `base` is valid for
        // `backing.size` bytes, and `offset + size <= backing.size` holds
        // for every view.
        let ptr = unsafe { NonNull::new_unchecked(base.as_ptr().add(self.offset)) };

        self.backing.mapped.set(true);

        Ok(BoMapping {
            bo: self,
            ptr,
            len: self.size,
        })
    }

    /// Release a mapping obtained from [`map`](Self::map)
    ///
    /// The device mapping persists; wraps of this object stay valid.
    pub fn unmap(&self, mapping: BoMapping<'_>) {
        drop(mapping);
    }

    /// Flush the first `size` bytes of this view to the device
    ///
    /// `size` is clamped to the size of the view.
    pub fn invalidate(&self, size: usize) -> Result<()> {
        let size = size.min(self.size);
        self.backing
            .host1x
            .bo_invalidate(self.backing.handle, self.offset, size)
    }

    /// Drop this view
    ///
    /// The device allocation is released once no other view (parent, wrap
    /// or clone) refers to it.
    pub fn free(self) {
        drop(self);
    }

    /// Size of this view in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Byte offset of this view inside the backing allocation
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Allocation hints
    pub fn flags(&self) -> BoFlags {
        self.flags
    }

    /// Device handle of the backing allocation
    pub fn handle(&self) -> BoHandle {
        self.backing.handle
    }

    /// Size of the whole backing allocation
    pub fn backing_size(&self) -> usize {
        self.backing.size
    }

    /// Whether both views alias the same backing allocation
    pub fn shares_backing_with(&self, other: &BufferObject) -> bool {
        Rc::ptr_eq(&self.backing, &other.backing)
    }

    /// Whether a mapping guard for this backing store is live
    pub fn is_mapped(&self) -> bool {
        self.backing.mapped.get()
    }
}

impl fmt::Debug for BufferObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferObject")
            .field("handle", &self.backing.handle)
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("flags", &self.flags)
            .finish()
    }
}

/// Mapped view of a buffer object
///
/// Dereferences to the bytes of the view. Dropping the guard releases the
/// exclusive mapping claim on the backing store.
pub struct BoMapping<'a> {
    bo: &'a BufferObject,
    ptr: NonNull<u8>,
    len: usize,
}

impl BoMapping<'_> {
    /// Read a little-endian 32-bit word at byte offset `offset`
    pub fn read_u32(&self, offset: usize) -> Option<u32> {
        let bytes = self.get(offset..offset.checked_add(4)?)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl Deref for BoMapping<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: ptr/len describe the mapped view (see BufferObject::map)
        // and the backing store is kept alive by the borrowed BufferObject.
        // The `mapped` flag guarantees this is the only live guard.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for BoMapping<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: see Deref; the guard is the unique accessor.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for BoMapping<'_> {
    fn drop(&mut self) {
        self.bo.backing.mapped.set(false);
    }
}
