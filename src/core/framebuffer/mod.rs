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

//! Framebuffers
//!
//! A framebuffer holds one pixel buffer (single buffered) or two (double
//! buffered). The front buffer is the one eligible for presentation; the
//! back buffer, when present, is the one rendered into.
//!
//! ```text
//!   single buffered          double buffered
//!   ┌───────┐                ┌───────┐   swap()   ┌───────┐
//!   │ front │ ← draw+show    │ front │ ← show ◄──►│ back  │ ← draw
//!   └───────┘                └───────┘            └───────┘
//! ```
//!
//! Swapping exchanges the two pixel buffers without touching pixel data.

mod pixelbuffer;

pub use pixelbuffer::{PixelBuffer, PixelBufferLayout, PixelFormat};

use crate::core::bo::BoMapping;
use crate::core::error::{GrateError, Result};
use crate::core::host1x::Host1x;
use bitflags::bitflags;
use std::path::Path;
use std::rc::Rc;

bitflags! {
    /// Framebuffer creation flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FramebufferFlags: u32 {
        /// Allocate a back buffer in addition to the front buffer
        const DOUBLE_BUFFERED = 1 << 0;
    }
}

/// Single- or double-buffered render target
#[derive(Debug)]
pub struct Framebuffer {
    front: PixelBuffer,
    back: Option<PixelBuffer>,
}

impl Framebuffer {
    /// Create a framebuffer
    ///
    /// The back buffer is only allocated with
    /// `FramebufferFlags::DOUBLE_BUFFERED`. Creation is atomic: if the back
    /// buffer cannot be allocated the front buffer is released again.
    ///
    /// # Example
    ///
    /// ```
    /// use std::rc::Rc;
    /// use grate::core::framebuffer::*;
    /// use grate::core::host1x::{Host1x, SoftHost1x};
    ///
    /// let host1x: Rc<dyn Host1x> = Rc::new(SoftHost1x::new());
    /// let fb = Framebuffer::create(
    ///     &host1x,
    ///     64,
    ///     64,
    ///     PixelFormat::Rgba8888,
    ///     PixelBufferLayout::Linear,
    ///     FramebufferFlags::DOUBLE_BUFFERED,
    /// )
    /// .unwrap();
    /// assert!(fb.is_double_buffered());
    /// ```
    pub fn create(
        host1x: &Rc<dyn Host1x>,
        width: u32,
        height: u32,
        format: PixelFormat,
        layout: PixelBufferLayout,
        flags: FramebufferFlags,
    ) -> Result<Self> {
        let front = PixelBuffer::create(host1x, width, height, format, layout)?;

        let back = if flags.contains(FramebufferFlags::DOUBLE_BUFFERED) {
            match PixelBuffer::create(host1x, width, height, format, layout) {
                Ok(back) => Some(back),
                Err(e) => {
                    log::error!("Failed to allocate back buffer: {}", e);
                    // `front` is dropped here, releasing its allocation
                    return Err(e);
                }
            }
        } else {
            None
        };

        log::debug!(
            "Created {}-buffered {}x{} framebuffer",
            if back.is_some() { "double" } else { "single" },
            width,
            height
        );

        Ok(Self { front, back })
    }

    pub fn width(&self) -> u32 {
        self.front.width()
    }

    pub fn height(&self) -> u32 {
        self.front.height()
    }

    pub fn format(&self) -> PixelFormat {
        self.front.format()
    }

    pub fn layout(&self) -> PixelBufferLayout {
        self.front.layout()
    }

    pub fn is_double_buffered(&self) -> bool {
        self.back.is_some()
    }

    /// Buffer currently eligible for presentation
    pub fn front(&self) -> &PixelBuffer {
        &self.front
    }

    /// Back buffer, if double buffered
    pub fn back(&self) -> Option<&PixelBuffer> {
        self.back.as_ref()
    }

    /// Buffer that rendering goes to: back if present, otherwise front
    pub fn draw_pixbuf(&self) -> &PixelBuffer {
        self.back.as_ref().unwrap_or(&self.front)
    }

    /// Exchange front and back buffers
    ///
    /// No-op for single-buffered framebuffers.
    pub fn swap(&mut self) {
        if let Some(back) = self.back.as_mut() {
            std::mem::swap(&mut self.front, back);
        }
    }

    /// Map the pixel data of the front (`front == true`) or back buffer
    ///
    /// # Errors
    ///
    /// `GrateError::Map` if the back buffer is requested on a
    /// single-buffered framebuffer or if mapping fails.
    pub fn data(&self, front: bool) -> Result<BoMapping<'_>> {
        let pixbuf = if front {
            &self.front
        } else {
            self.back.as_ref().ok_or_else(|| {
                log::error!("failed to get framebuffer's bo");
                GrateError::Map("framebuffer has no back buffer".to_string())
            })?
        };

        pixbuf.bo().map().map_err(|e| {
            log::error!("failed to mmap framebuffer's bo");
            e
        })
    }

    /// Save the buffer that is not being displayed
    ///
    /// That is the back buffer when double buffered, the front buffer
    /// otherwise.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.draw_pixbuf().save(path)
    }
}
