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

//! Software Rasterizer
//!
//! Converts window-space triangles into pixels of a mapped pixel buffer.
//!
//! # Algorithm
//!
//! Half-space (edge function) rasterization:
//!
//! 1. Normalize the winding so the signed area is positive
//! 2. Intersect the triangle's bounding box with the clip rectangle
//! 3. Evaluate the three edge functions at every pixel center
//! 4. Pixels on a shared edge belong to the triangle for which that edge is
//!    a top or left edge, so adjacent triangles never touch a pixel twice
//! 5. The normalized edge functions are the barycentric weights used to
//!    interpolate the vertex colors (Gouraud shading)
//!
//! # References
//!
//! - [Scratchapixel: Rasterization](https://www.scratchapixel.com/lessons/3d-basic-rendering/rasterization-practical-implementation)
//! - [Direct3D rasterization rules](https://learn.microsoft.com/en-us/windows/win32/direct3d11/d3d10-graphics-programming-guide-rasterizer-stage-rules)

use crate::core::framebuffer::PixelBuffer;

/// Window-space vertex with an RGBA color
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
    pub color: [f32; 4],
}

impl Vertex {
    pub fn new(x: f32, y: f32, color: [f32; 4]) -> Self {
        Self { x, y, color }
    }
}

/// Mapped pixel data of a render target
pub struct Surface<'a> {
    pixbuf: &'a PixelBuffer,
    data: &'a mut [u8],
}

impl<'a> Surface<'a> {
    /// Wrap the mapped bytes of `pixbuf`
    pub fn new(pixbuf: &'a PixelBuffer, data: &'a mut [u8]) -> Self {
        Self { pixbuf, data }
    }

    pub fn width(&self) -> u32 {
        self.pixbuf.width()
    }

    pub fn height(&self) -> u32 {
        self.pixbuf.height()
    }

    #[inline(always)]
    fn write_pixel(&mut self, x: u32, y: u32, rgba: [f32; 4]) {
        let format = self.pixbuf.format();
        let offset = self.pixbuf.pixel_offset(x, y);
        format.store(&mut self.data[offset..], format.pack(rgba));
    }
}

/// Triangle rasterizer with a clip rectangle
///
/// # Examples
///
/// ```
/// use grate::core::gr3d::{Rasterizer, Vertex};
///
/// let mut rasterizer = Rasterizer::new();
/// rasterizer.set_clip_rect(0, 0, 15, 15);
/// assert_eq!(rasterizer.clip_rect(), (0, 0, 15, 15));
///
/// let v = Vertex::new(0.0, 0.0, [1.0, 0.0, 0.0, 1.0]);
/// assert_eq!(v.color[0], 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct Rasterizer {
    /// Format: (left, top, right, bottom), all inclusive
    clip_rect: (i32, i32, i32, i32),
}

impl Rasterizer {
    /// Create a rasterizer that clips to nothing but the surface itself
    pub fn new() -> Self {
        Self {
            clip_rect: (0, 0, i32::MAX, i32::MAX),
        }
    }

    /// Set the clipping rectangle
    ///
    /// Coordinates are inclusive. A rectangle with `right < left` or
    /// `bottom < top` clips everything away.
    ///
    /// # Arguments
    ///
    /// * `left` - Left edge X coordinate
    /// * `top` - Top edge Y coordinate
    /// * `right` - Right edge X coordinate
    /// * `bottom` - Bottom edge Y coordinate
    pub fn set_clip_rect(&mut self, left: i32, top: i32, right: i32, bottom: i32) {
        self.clip_rect = (left, top, right, bottom);
    }

    pub fn clip_rect(&self) -> (i32, i32, i32, i32) {
        self.clip_rect
    }

    /// Rasterize a Gouraud-shaded triangle
    ///
    /// Pixels are clipped to the clip rectangle and to the surface.
    ///
    /// # Returns
    ///
    /// Number of pixels written
    pub fn draw_gradient_triangle(&self, surface: &mut Surface<'_>, vertices: [Vertex; 3]) -> usize {
        let [v0, mut v1, mut v2] = vertices;

        let mut area = edge(&v0, &v1, v2.x, v2.y);
        if area == 0.0 || !area.is_finite() {
            log::trace!("Skipping degenerate triangle");
            return 0;
        }
        if area < 0.0 {
            std::mem::swap(&mut v1, &mut v2);
            area = -area;
        }

        let Some((x_min, y_min, x_max, y_max)) = self.bounds(surface, &[v0, v1, v2]) else {
            return 0;
        };

        let bias0 = is_top_left(&v1, &v2);
        let bias1 = is_top_left(&v2, &v0);
        let bias2 = is_top_left(&v0, &v1);

        let mut written = 0;

        for y in y_min..=y_max {
            let py = y as f32 + 0.5;

            for x in x_min..=x_max {
                let px = x as f32 + 0.5;

                let w0 = edge(&v1, &v2, px, py);
                let w1 = edge(&v2, &v0, px, py);
                let w2 = edge(&v0, &v1, px, py);

                if !covers(w0, bias0) || !covers(w1, bias1) || !covers(w2, bias2) {
                    continue;
                }

                let (l0, l1, l2) = (w0 / area, w1 / area, w2 / area);
                let color = std::array::from_fn(|i| l0 * v0.color[i] + l1 * v1.color[i] + l2 * v2.color[i]);

                surface.write_pixel(x, y, color);
                written += 1;
            }
        }

        log::trace!(
            "Rasterized triangle ({:.1}, {:.1}), ({:.1}, {:.1}), ({:.1}, {:.1}): {} pixels",
            v0.x,
            v0.y,
            v1.x,
            v1.y,
            v2.x,
            v2.y,
            written
        );

        written
    }

    /// Pixel rectangle to scan: bounding box ∩ clip rectangle ∩ surface
    fn bounds(&self, surface: &Surface<'_>, vertices: &[Vertex; 3]) -> Option<(u32, u32, u32, u32)> {
        let (left, top, right, bottom) = self.clip_rect;

        let min_x = vertices.iter().map(|v| v.x).fold(f32::INFINITY, f32::min);
        let max_x = vertices.iter().map(|v| v.x).fold(f32::NEG_INFINITY, f32::max);
        let min_y = vertices.iter().map(|v| v.y).fold(f32::INFINITY, f32::min);
        let max_y = vertices.iter().map(|v| v.y).fold(f32::NEG_INFINITY, f32::max);

        // Float to int casts saturate, so huge coordinates are fine here
        let x0 = (min_x.floor() as i64).max(left as i64).max(0);
        let y0 = (min_y.floor() as i64).max(top as i64).max(0);
        let x1 = (max_x.ceil() as i64)
            .min(right as i64)
            .min(surface.width() as i64 - 1);
        let y1 = (max_y.ceil() as i64)
            .min(bottom as i64)
            .min(surface.height() as i64 - 1);

        if x0 > x1 || y0 > y1 {
            return None;
        }

        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }
}

impl Default for Rasterizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Signed doubled area of (a, b, p); positive when p lies to the inside of
/// a → b for a triangle with positive area
#[inline(always)]
fn edge(a: &Vertex, b: &Vertex, px: f32, py: f32) -> f32 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

/// Top edge (horizontal, pointing right) or left edge (pointing up) in
/// y-down window space
#[inline(always)]
fn is_top_left(a: &Vertex, b: &Vertex) -> bool {
    (a.y == b.y && b.x > a.x) || b.y < a.y
}

#[inline(always)]
fn covers(w: f32, top_left: bool) -> bool {
    w > 0.0 || (w == 0.0 && top_left)
}
