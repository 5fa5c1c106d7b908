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

//! Pixel buffers
//!
//! A pixel buffer is one render surface: a buffer object plus the format
//! and layout needed to address individual pixels in it.
//!
//! # Layouts
//!
//! - `Linear`: rows of `pitch` bytes, top to bottom.
//! - `Tiled16x16`: the surface is cut into 16×16 pixel tiles. Tiles are
//!   stored row-major, and pixels inside a tile are stored row-major, so
//!   pixel (0, 0) is always the first pixel in memory. Width and height
//!   are padded to a multiple of 16.

use crate::core::bo::{BoFlags, BufferObject};
use crate::core::error::{GrateError, Result};
use crate::core::host1x::Host1x;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::rc::Rc;

/// Pixel formats the harness renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 32-bit, bytes R, G, B, A in memory order
    Rgba8888,
    /// 32-bit, bytes B, G, R, A in memory order
    Bgra8888,
    /// 16-bit, 5-6-5 with red in the high bits
    Rgb565,
}

impl PixelFormat {
    /// Bytes occupied by one pixel
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8888 | PixelFormat::Bgra8888 => 4,
            PixelFormat::Rgb565 => 2,
        }
    }

    /// Pack a floating-point RGBA color into this format's raw value
    ///
    /// Components are clamped to [0, 1] and rounded to the nearest step.
    ///
    /// # Example
    ///
    /// ```
    /// use grate::core::framebuffer::PixelFormat;
    ///
    /// assert_eq!(PixelFormat::Rgba8888.pack([1.0, 0.0, 0.0, 1.0]), 0xFF0000FF);
    /// assert_eq!(PixelFormat::Rgb565.pack([0.0, 1.0, 0.0, 1.0]), 0x07E0);
    /// ```
    pub fn pack(self, rgba: [f32; 4]) -> u32 {
        let [r, g, b, a] = rgba.map(unorm8);

        match self {
            PixelFormat::Rgba8888 => u32::from_le_bytes([r, g, b, a]),
            PixelFormat::Bgra8888 => u32::from_le_bytes([b, g, r, a]),
            PixelFormat::Rgb565 => {
                let r5 = (r as u32 * 31 + 127) / 255;
                let g6 = (g as u32 * 63 + 127) / 255;
                let b5 = (b as u32 * 31 + 127) / 255;
                (r5 << 11) | (g6 << 5) | b5
            }
        }
    }

    /// Convert a raw value of this format to RGBA8 bytes
    pub fn to_rgba8(self, raw: u32) -> [u8; 4] {
        match self {
            PixelFormat::Rgba8888 => raw.to_le_bytes(),
            PixelFormat::Bgra8888 => {
                let [b, g, r, a] = raw.to_le_bytes();
                [r, g, b, a]
            }
            PixelFormat::Rgb565 => {
                let r5 = (raw >> 11) & 0x1F;
                let g6 = (raw >> 5) & 0x3F;
                let b5 = raw & 0x1F;
                [
                    ((r5 * 255 + 15) / 31) as u8,
                    ((g6 * 255 + 31) / 63) as u8,
                    ((b5 * 255 + 15) / 31) as u8,
                    0xFF,
                ]
            }
        }
    }

    /// Store a raw value at the start of `bytes`
    #[inline]
    pub(crate) fn store(self, bytes: &mut [u8], raw: u32) {
        let bpp = self.bytes_per_pixel();
        bytes[..bpp].copy_from_slice(&raw.to_le_bytes()[..bpp]);
    }

    /// Load a raw value from the start of `bytes`
    #[inline]
    pub(crate) fn load(self, bytes: &[u8]) -> u32 {
        let mut word = [0u8; 4];
        let bpp = self.bytes_per_pixel();
        word[..bpp].copy_from_slice(&bytes[..bpp]);
        u32::from_le_bytes(word)
    }
}

/// Round a [0, 1] float to an 8-bit unsigned normalized value
#[inline]
fn unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Memory layout of a pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelBufferLayout {
    Linear,
    Tiled16x16,
}

/// One render surface backed by a buffer object
///
/// Cloning shares the underlying buffer object.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    layout: PixelBufferLayout,
    /// Bytes per row of pixels (padded width for tiled layouts)
    pitch: usize,
    bo: BufferObject,
}

impl PixelBuffer {
    /// Tile edge length in pixels for tiled layouts
    pub const TILE_SIZE: u32 = 16;

    /// Allocate a pixel buffer
    ///
    /// # Errors
    ///
    /// `GrateError::Allocation` if the dimensions are zero or the device is
    /// out of memory.
    pub fn create(
        host1x: &Rc<dyn Host1x>,
        width: u32,
        height: u32,
        format: PixelFormat,
        layout: PixelBufferLayout,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(GrateError::Allocation {
                size: 0,
                reason: format!("invalid pixel buffer size {}x{}", width, height),
            });
        }

        let (pitch, size) = Self::storage_size(width, height, format, layout).ok_or_else(|| {
            GrateError::Allocation {
                size: usize::MAX,
                reason: format!("pixel buffer size {}x{} overflows", width, height),
            }
        })?;
        let bo = BufferObject::create(host1x, size, BoFlags::RENDER_TARGET)?;

        log::debug!(
            "Created {}x{} {:?} {:?} pixel buffer (pitch {}, {} bytes)",
            width,
            height,
            format,
            layout,
            pitch,
            size
        );

        Ok(Self {
            width,
            height,
            format,
            layout,
            pitch,
            bo,
        })
    }

    /// Row pitch and total byte size, `None` on overflow
    fn storage_size(
        width: u32,
        height: u32,
        format: PixelFormat,
        layout: PixelBufferLayout,
    ) -> Option<(usize, usize)> {
        let (padded_width, padded_height) = match layout {
            PixelBufferLayout::Linear => (width, height),
            PixelBufferLayout::Tiled16x16 => (
                width.checked_next_multiple_of(Self::TILE_SIZE)?,
                height.checked_next_multiple_of(Self::TILE_SIZE)?,
            ),
        };

        let pitch = usize::try_from(padded_width)
            .ok()?
            .checked_mul(format.bytes_per_pixel())?;
        let size = pitch.checked_mul(usize::try_from(padded_height).ok()?)?;

        Some((pitch, size))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn layout(&self) -> PixelBufferLayout {
        self.layout
    }

    pub fn pitch(&self) -> usize {
        self.pitch
    }

    /// Buffer object holding the pixels
    pub fn bo(&self) -> &BufferObject {
        &self.bo
    }

    /// Byte offset of pixel (x, y) inside the buffer object
    ///
    /// Coordinates must be inside the surface.
    pub fn pixel_offset(&self, x: u32, y: u32) -> usize {
        let bpp = self.format.bytes_per_pixel();

        match self.layout {
            PixelBufferLayout::Linear => y as usize * self.pitch + x as usize * bpp,
            PixelBufferLayout::Tiled16x16 => {
                let tile = Self::TILE_SIZE as usize;
                let tiles_per_row = self.pitch / (tile * bpp);
                let (x, y) = (x as usize, y as usize);

                let tile_index = (y / tile) * tiles_per_row + (x / tile);
                let in_tile = (y % tile) * tile + (x % tile);

                (tile_index * tile * tile + in_tile) * bpp
            }
        }
    }

    fn check_bounds(&self, x: u32, y: u32) -> Result<()> {
        if x >= self.width || y >= self.height {
            return Err(GrateError::PixelOutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    /// Read the raw value of pixel (x, y)
    pub fn read_pixel(&self, x: u32, y: u32) -> Result<u32> {
        self.check_bounds(x, y)?;
        let map = self.bo.map()?;
        Ok(self.format.load(&map[self.pixel_offset(x, y)..]))
    }

    /// Write the raw value of pixel (x, y)
    pub fn write_pixel(&self, x: u32, y: u32, raw: u32) -> Result<()> {
        self.check_bounds(x, y)?;
        let offset = self.pixel_offset(x, y);
        {
            let mut map = self.bo.map()?;
            self.format.store(&mut map[offset..], raw);
        }
        self.bo.invalidate(self.bo.size())
    }

    /// Fill the whole surface with one color
    pub fn clear(&self, rgba: [f32; 4]) -> Result<()> {
        let raw = self.format.pack(rgba);
        let bpp = self.format.bytes_per_pixel();

        {
            let mut map = self.bo.map()?;
            for pixel in map.chunks_exact_mut(bpp) {
                self.format.store(pixel, raw);
            }
        }

        log::debug!("Cleared pixel buffer to 0x{:08X}", raw);

        self.bo.invalidate(self.bo.size())
    }

    /// Convert the surface to linear RGBA8, row-major, top row first
    pub fn to_rgba8(&self) -> Result<Vec<u8>> {
        let map = self.bo.map()?;
        let mut rgba = Vec::with_capacity(self.width as usize * self.height as usize * 4);

        for y in 0..self.height {
            for x in 0..self.width {
                let raw = self.format.load(&map[self.pixel_offset(x, y)..]);
                rgba.extend_from_slice(&self.format.to_rgba8(raw));
            }
        }

        Ok(rgba)
    }

    /// Write the surface to an image file (format chosen by extension)
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let rgba = self.to_rgba8()?;

        let image = image::RgbaImage::from_raw(self.width, self.height, rgba).ok_or_else(|| {
            GrateError::Map(format!("pixel data does not cover {}x{}", self.width, self.height))
        })?;
        image.save(path)?;

        log::info!("Saved {}x{} framebuffer to {}", self.width, self.height, path.display());

        Ok(())
    }
}
