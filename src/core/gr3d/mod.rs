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

//! 3D submission context
//!
//! `Context3d` collects everything a draw call needs: the bound program,
//! raster state, vertex attribute pointers, render targets and uniform
//! values. [`Context3d::draw_elements`] then runs the software pipeline:
//!
//! ```text
//! index BO ──► fetch ──► NDC ──► viewport ──► cull ──► rasterize ──► render targets
//!              (position, color)  (x_w, y_w)          (per enabled slot)
//! ```
//!
//! The pipeline is pass-through: the program's instruction words are not
//! executed. The `"position"` attribute is used as the clip-space position
//! and the `"color"` attribute, when present, as the vertex color.

mod rasterizer;
#[cfg(test)]
mod tests;

pub use rasterizer::{Rasterizer, Surface, Vertex};

use crate::core::bo::BufferObject;
use crate::core::error::{GrateError, Result, ShaderError};
use crate::core::framebuffer::PixelBuffer;
use crate::core::shader::Program;
use std::rc::Rc;

/// Number of vertex attribute slots
pub const MAX_ATTRIBUTES: usize = 16;

/// Number of render target slots
pub const MAX_RENDER_TARGETS: usize = 16;

/// Vertex uniform file size in floats (256 vec4 registers)
pub const VS_UNIFORMS: usize = 256 * 4;

/// Fragment uniform file size in floats
pub const FS_UNIFORMS: usize = 64;

/// Color used when the program has no enabled `"color"` attribute
const DEFAULT_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

/// Which faces are discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullFace {
    #[default]
    None,
    Front,
    Back,
}

/// Primitive assembly mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

/// Index element size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    U8,
    U16,
    U32,
}

impl IndexMode {
    pub fn bytes(self) -> usize {
        match self {
            IndexMode::U8 => 1,
            IndexMode::U16 => 2,
            IndexMode::U32 => 4,
        }
    }

    fn read(self, bytes: &[u8]) -> u32 {
        match self {
            IndexMode::U8 => bytes[0] as u32,
            IndexMode::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as u32,
            IndexMode::U32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }
}

/// Scissor rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scissor {
    pub x: u32,
    pub width: u32,
    pub y: u32,
    pub height: u32,
}

/// Fixed-function raster state
///
/// Only the viewport, culling and scissor fields change what the software
/// pipeline draws. The rest is recorded for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterState {
    pub depth_range: (f32, f32),
    pub dither: u32,
    pub point_params: u32,
    pub point_size: f32,
    pub line_params: u32,
    pub line_width: f32,
    pub viewport_bias: [f32; 3],
    pub viewport_scale: [f32; 3],
    pub guardband: bool,
    pub front_cw: bool,
    pub cull_face: CullFace,
    pub scissor: Scissor,
    /// (min s, max s, min t, max t)
    pub point_coord_range: [f32; 4],
    /// (units, factor)
    pub polygon_offset: (f32, f32),
    pub provoking_vtx_last: bool,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            depth_range: (0.0, 1.0),
            dither: 0,
            point_params: 0,
            point_size: 1.0,
            line_params: 0,
            line_width: 1.0,
            viewport_bias: [0.0; 3],
            viewport_scale: [0.0; 3],
            guardband: false,
            front_cw: false,
            cull_face: CullFace::None,
            scissor: Scissor {
                x: 0,
                width: 4096,
                y: 0,
                height: 4096,
            },
            point_coord_range: [0.0, 1.0, 0.0, 1.0],
            polygon_offset: (0.0, 0.0),
            provoking_vtx_last: false,
        }
    }
}

/// Float vertex attribute pointer
#[derive(Debug, Clone)]
struct AttribPointer {
    /// Components per vertex, 1 to 4
    size: u32,
    bo: BufferObject,
}

#[derive(Debug, Clone)]
struct RenderTarget {
    pixbuf: PixelBuffer,
    enabled: bool,
}

/// 3D context: program, state, attributes, render targets and uniforms
#[derive(Debug)]
pub struct Context3d {
    program: Option<Rc<Program>>,
    state: RasterState,
    attribs: [Option<AttribPointer>; MAX_ATTRIBUTES],
    attrib_enabled: [bool; MAX_ATTRIBUTES],
    render_targets: [Option<RenderTarget>; MAX_RENDER_TARGETS],
    vs_uniforms: Vec<f32>,
    fs_uniforms: Vec<f32>,
    rasterizer: Rasterizer,
}

impl Context3d {
    pub fn new() -> Self {
        Self {
            program: None,
            state: RasterState::default(),
            attribs: Default::default(),
            attrib_enabled: [false; MAX_ATTRIBUTES],
            render_targets: Default::default(),
            vs_uniforms: vec![0.0; VS_UNIFORMS],
            fs_uniforms: vec![0.0; FS_UNIFORMS],
            rasterizer: Rasterizer::new(),
        }
    }

    pub fn bind_program(&mut self, program: Rc<Program>) {
        self.program = Some(program);
    }

    pub fn program(&self) -> Option<&Rc<Program>> {
        self.program.as_ref()
    }

    pub fn state(&self) -> &RasterState {
        &self.state
    }

    // Raster state

    pub fn set_depth_range(&mut self, near: f32, far: f32) {
        self.state.depth_range = (near, far);
    }

    pub fn set_dither(&mut self, dither: u32) {
        self.state.dither = dither;
    }

    pub fn set_point_params(&mut self, params: u32) {
        self.state.point_params = params;
    }

    pub fn set_point_size(&mut self, size: f32) {
        self.state.point_size = size;
    }

    pub fn set_line_params(&mut self, params: u32) {
        self.state.line_params = params;
    }

    pub fn set_line_width(&mut self, width: f32) {
        self.state.line_width = width;
    }

    pub fn set_viewport_bias(&mut self, x: f32, y: f32, z: f32) {
        self.state.viewport_bias = [x, y, z];
    }

    pub fn set_viewport_scale(&mut self, x: f32, y: f32, z: f32) {
        self.state.viewport_scale = [x, y, z];
    }

    pub fn use_guardband(&mut self, enabled: bool) {
        self.state.guardband = enabled;
    }

    /// Whether clockwise triangles (in NDC) are front facing
    pub fn set_front_direction_is_cw(&mut self, cw: bool) {
        self.state.front_cw = cw;
    }

    pub fn set_cull_face(&mut self, cull_face: CullFace) {
        self.state.cull_face = cull_face;
    }

    pub fn set_scissor(&mut self, x: u32, width: u32, y: u32, height: u32) {
        self.state.scissor = Scissor { x, width, y, height };
    }

    pub fn set_point_coord_range(&mut self, min_s: f32, max_s: f32, min_t: f32, max_t: f32) {
        self.state.point_coord_range = [min_s, max_s, min_t, max_t];
    }

    pub fn set_polygon_offset(&mut self, units: f32, factor: f32) {
        self.state.polygon_offset = (units, factor);
    }

    pub fn set_provoking_vtx_last(&mut self, last: bool) {
        self.state.provoking_vtx_last = last;
    }

    // Vertex attributes

    /// Point attribute `location` at tightly packed 32-bit floats in `bo`
    ///
    /// # Errors
    ///
    /// `GrateError::InvalidLocation` for a location outside the attribute
    /// slots, `GrateError::Draw` for a component count outside 1..=4.
    pub fn vertex_attrib_float_pointer(&mut self, location: u32, size: u32, bo: BufferObject) -> Result<()> {
        let slot = attrib_slot(location)?;

        if !(1..=4).contains(&size) {
            return Err(GrateError::Draw(format!(
                "invalid attribute size {} for location {}",
                size, location
            )));
        }

        self.attribs[slot] = Some(AttribPointer { size, bo });
        Ok(())
    }

    pub fn enable_vertex_attrib_array(&mut self, location: u32) -> Result<()> {
        self.attrib_enabled[attrib_slot(location)?] = true;
        Ok(())
    }

    pub fn disable_vertex_attrib_array(&mut self, location: u32) -> Result<()> {
        self.attrib_enabled[attrib_slot(location)?] = false;
        Ok(())
    }

    // Render targets

    /// Bind a pixel buffer to render target `slot`
    ///
    /// Returns the pixel buffer previously bound to the slot. A rebound slot
    /// keeps its enable state.
    pub fn bind_render_target(&mut self, slot: u32, pixbuf: PixelBuffer) -> Result<Option<PixelBuffer>> {
        let index = target_slot(slot)?;
        let enabled = self.render_targets[index]
            .as_ref()
            .is_some_and(|target| target.enabled);

        let previous = self.render_targets[index].replace(RenderTarget { pixbuf, enabled });
        Ok(previous.map(|target| target.pixbuf))
    }

    /// Enable drawing into render target `slot`
    ///
    /// # Errors
    ///
    /// `GrateError::Draw` if nothing is bound to the slot.
    pub fn enable_render_target(&mut self, slot: u32) -> Result<()> {
        let index = target_slot(slot)?;
        match self.render_targets[index].as_mut() {
            Some(target) => {
                target.enabled = true;
                Ok(())
            }
            None => Err(GrateError::Draw(format!("render target {} is not bound", slot))),
        }
    }

    pub fn disable_render_target(&mut self, slot: u32) -> Result<()> {
        if let Some(target) = self.render_targets[target_slot(slot)?].as_mut() {
            target.enabled = false;
        }
        Ok(())
    }

    pub fn render_target(&self, slot: u32) -> Option<&PixelBuffer> {
        self.render_targets
            .get(slot as usize)?
            .as_ref()
            .map(|target| &target.pixbuf)
    }

    // Uniforms

    /// Store `values` starting at vec4 register `location`
    pub fn set_vertex_uniform(&mut self, location: u32, values: &[f32]) -> Result<()> {
        let start = location as usize * 4;
        store_uniform(&mut self.vs_uniforms, "vertex uniform", location, start, values)
    }

    /// Store `values` starting at scalar slot `location`
    pub fn set_fragment_uniform(&mut self, location: u32, values: &[f32]) -> Result<()> {
        store_uniform(&mut self.fs_uniforms, "fragment uniform", location, location as usize, values)
    }

    pub fn vs_uniforms(&self) -> &[f32] {
        &self.vs_uniforms
    }

    pub fn fs_uniforms(&self) -> &[f32] {
        &self.fs_uniforms
    }

    // Drawing

    /// Draw indexed primitives
    ///
    /// # Arguments
    ///
    /// * `primitive` - Primitive type; only triangles are supported
    /// * `index_bo` - Buffer object holding the indices
    /// * `index_mode` - Size of one index
    /// * `count` - Number of indices to read
    ///
    /// # Errors
    ///
    /// - `GrateError::Draw` for unsupported primitives, a missing program,
    ///   a missing position attribute or out-of-range indices
    /// - `GrateError::Shader(ShaderError::NotLinked)` if the program has not
    ///   been linked
    /// - `GrateError::Map` if a buffer cannot be mapped
    pub fn draw_elements(
        &mut self,
        primitive: PrimitiveType,
        index_bo: &BufferObject,
        index_mode: IndexMode,
        count: usize,
    ) -> Result<()> {
        if primitive != PrimitiveType::Triangles {
            return Err(GrateError::Draw(format!("unsupported primitive {:?}", primitive)));
        }

        let program = self
            .program
            .clone()
            .ok_or_else(|| GrateError::Draw("no program bound".to_string()))?;
        if !program.is_linked() {
            return Err(ShaderError::NotLinked.into());
        }

        let positions = match program.attribute_location("position") {
            Some(location) => self.fetch_attribute(location)?,
            None => None,
        }
        .ok_or_else(|| GrateError::Draw("no enabled \"position\" attribute".to_string()))?;

        let colors = match program.attribute_location("color") {
            Some(location) => self.fetch_attribute(location)?,
            None => None,
        };

        let indices = read_indices(index_bo, index_mode, count)?;

        let mut vertices = Vec::with_capacity(indices.len());
        for &index in &indices {
            let i = index as usize;
            let position = positions.get(i).ok_or_else(|| {
                GrateError::Draw(format!("index {} beyond {} vertices", index, positions.len()))
            })?;
            let color = match &colors {
                Some(colors) => *colors.get(i).ok_or_else(|| {
                    GrateError::Draw(format!("index {} beyond {} colors", index, colors.len()))
                })?,
                None => DEFAULT_COLOR,
            };
            vertices.push(self.to_window(*position, color));
        }

        let triangles: Vec<[Vertex; 3]> = vertices
            .chunks_exact(3)
            .filter_map(|tri| {
                let tri = [tri[0]?, tri[1]?, tri[2]?];
                (!self.is_culled(&tri)).then_some(tri)
            })
            .collect();

        self.update_clip_rect();

        log::debug!(
            "draw_elements: {} indices, {} triangles after culling",
            indices.len(),
            triangles.len()
        );

        for (slot, target) in self.render_targets.iter().enumerate() {
            let Some(target) = target.as_ref().filter(|target| target.enabled) else {
                continue;
            };

            let pixbuf = &target.pixbuf;
            let mut written = 0;
            {
                let mut map = pixbuf.bo().map()?;
                let mut surface = Surface::new(pixbuf, &mut map);
                for tri in &triangles {
                    written += self.rasterizer.draw_gradient_triangle(&mut surface, *tri);
                }
            }
            pixbuf.bo().invalidate(pixbuf.bo().size())?;

            log::trace!("render target {}: {} pixels written", slot, written);
        }

        Ok(())
    }

    /// Read an enabled attribute as vec4s, `None` if the slot is disabled
    fn fetch_attribute(&self, location: u32) -> Result<Option<Vec<[f32; 4]>>> {
        let slot = attrib_slot(location)?;
        if !self.attrib_enabled[slot] {
            return Ok(None);
        }

        let pointer = self.attribs[slot].as_ref().ok_or_else(|| {
            GrateError::Draw(format!("attribute {} enabled without a pointer", location))
        })?;

        let map = pointer.bo.map()?;
        let stride = pointer.size as usize * 4;

        let values = map
            .chunks_exact(stride)
            .map(|vertex| {
                let mut value = [0.0, 0.0, 0.0, 1.0];
                for (component, bytes) in value.iter_mut().zip(vertex.chunks_exact(4)) {
                    *component = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                }
                value
            })
            .collect();

        Ok(Some(values))
    }

    /// Clip space → window space; `None` when w is zero
    fn to_window(&self, position: [f32; 4], color: [f32; 4]) -> Option<Vertex> {
        let [x, y, _, w] = position;
        if w == 0.0 {
            return None;
        }

        let (x, y) = (x / w, y / w);
        let [sx, sy, _] = self.state.viewport_scale;
        let [bx, by, _] = self.state.viewport_bias;

        Some(Vertex::new(
            (x + 1.0) * sx / 2.0 + bx,
            (1.0 - y) * sy / 2.0 + by,
            color,
        ))
    }

    fn is_culled(&self, tri: &[Vertex; 3]) -> bool {
        if self.state.cull_face == CullFace::None {
            return false;
        }

        // Window space is y-down, so a negative area is counter-clockwise
        // in NDC
        let area = (tri[1].x - tri[0].x) * (tri[2].y - tri[0].y)
            - (tri[2].x - tri[0].x) * (tri[1].y - tri[0].y);
        let ccw = area < 0.0;
        let front = ccw != self.state.front_cw;

        match self.state.cull_face {
            CullFace::None => false,
            CullFace::Front => front,
            CullFace::Back => !front,
        }
    }

    fn update_clip_rect(&mut self) {
        let Scissor { x, width, y, height } = self.state.scissor;
        let clamp = |v: u64| v.min(i32::MAX as u64) as i32;

        self.rasterizer.set_clip_rect(
            clamp(x as u64),
            clamp(y as u64),
            clamp(x as u64 + width as u64) - 1,
            clamp(y as u64 + height as u64) - 1,
        );
    }
}

impl Default for Context3d {
    fn default() -> Self {
        Self::new()
    }
}

fn attrib_slot(location: u32) -> Result<usize> {
    if (location as usize) < MAX_ATTRIBUTES {
        Ok(location as usize)
    } else {
        Err(GrateError::InvalidLocation {
            kind: "attribute",
            location,
        })
    }
}

fn target_slot(slot: u32) -> Result<usize> {
    if (slot as usize) < MAX_RENDER_TARGETS {
        Ok(slot as usize)
    } else {
        Err(GrateError::InvalidLocation {
            kind: "render target",
            location: slot,
        })
    }
}

fn store_uniform(
    file: &mut [f32],
    kind: &'static str,
    location: u32,
    start: usize,
    values: &[f32],
) -> Result<()> {
    let end = start + values.len();
    if end > file.len() {
        return Err(GrateError::InvalidLocation { kind, location });
    }

    file[start..end].copy_from_slice(values);
    Ok(())
}

fn read_indices(bo: &BufferObject, mode: IndexMode, count: usize) -> Result<Vec<u32>> {
    let needed = count * mode.bytes();
    if needed > bo.size() {
        return Err(GrateError::Draw(format!(
            "{} indices need {} bytes, index buffer has {}",
            count,
            needed,
            bo.size()
        )));
    }

    let map = bo.map()?;
    Ok(map[..needed]
        .chunks_exact(mode.bytes())
        .map(|bytes| mode.read(bytes))
        .collect())
}
