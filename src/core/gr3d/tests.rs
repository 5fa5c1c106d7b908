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

//! 3D context tests

use super::*;
use crate::core::bo::BoFlags;
use crate::core::framebuffer::{PixelBufferLayout, PixelFormat};
use crate::core::host1x::{Host1x, SoftHost1x};
use crate::core::shader::{Shader, ShaderKind};

const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
const GREEN: [f32; 4] = [0.0, 1.0, 0.0, 1.0];
const BLUE: [f32; 4] = [0.0, 0.0, 1.0, 1.0];

const QUAD: [f32; 16] = [
    -1.0, 1.0, 0.0, 1.0, //
    -1.0, -1.0, 0.0, 1.0, //
    1.0, 1.0, 0.0, 1.0, //
    1.0, -1.0, 0.0, 1.0,
];

const QUAD_INDICES: [u16; 6] = [0, 1, 2, 1, 2, 3];

struct Fixture {
    host1x: Rc<dyn Host1x>,
    ctx: Context3d,
    target: PixelBuffer,
}

fn float_bo(host1x: &Rc<dyn Host1x>, values: &[f32]) -> BufferObject {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    BufferObject::create_from_data(host1x, BoFlags::empty(), &bytes).unwrap()
}

fn index_bo(host1x: &Rc<dyn Host1x>, indices: &[u16]) -> BufferObject {
    let bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
    BufferObject::create_from_data(host1x, BoFlags::empty(), &bytes).unwrap()
}

fn program(attributes: &str) -> Rc<Program> {
    let vs = Shader::parse_str(ShaderKind::Vertex, "vs", &format!(".attributes\n{}\n.asm\n0x0\n", attributes)).unwrap();
    let fs = Shader::parse_str(ShaderKind::Fragment, "fs", ".asm\n0x0\n").unwrap();
    let linker = Shader::parse_str(ShaderKind::Linker, "lnk", ".asm\n0x0\n").unwrap();

    let mut program = Program::new(vs, fs, linker).unwrap();
    program.link();
    Rc::new(program)
}

/// Context drawing a colored quad into a `size`×`size` linear target
fn fixture(size: u32) -> Fixture {
    let host1x: Rc<dyn Host1x> = Rc::new(SoftHost1x::new());
    let target = PixelBuffer::create(&host1x, size, size, PixelFormat::Rgba8888, PixelBufferLayout::Linear).unwrap();

    let mut ctx = Context3d::new();
    ctx.bind_program(program("[0] = \"position\";\n[1] = \"color\";"));
    ctx.set_viewport_bias(0.0, 0.0, 0.5);
    ctx.set_viewport_scale(size as f32, size as f32, 0.5);
    ctx.set_scissor(0, size, 0, size);

    ctx.vertex_attrib_float_pointer(0, 4, float_bo(&host1x, &QUAD)).unwrap();
    ctx.enable_vertex_attrib_array(0).unwrap();

    let colors: Vec<f32> = [RED, GREEN, BLUE, RED].concat();
    ctx.vertex_attrib_float_pointer(1, 4, float_bo(&host1x, &colors)).unwrap();
    ctx.enable_vertex_attrib_array(1).unwrap();

    ctx.bind_render_target(1, target.clone()).unwrap();
    ctx.enable_render_target(1).unwrap();

    Fixture { host1x, ctx, target }
}

fn draw_quad(f: &mut Fixture) -> Result<()> {
    let indices = index_bo(&f.host1x, &QUAD_INDICES);
    f.ctx
        .draw_elements(PrimitiveType::Triangles, &indices, IndexMode::U16, QUAD_INDICES.len())
}

fn covered_pixels(pixbuf: &PixelBuffer) -> usize {
    pixbuf
        .to_rgba8()
        .unwrap()
        .chunks_exact(4)
        .filter(|px| px[3] != 0)
        .count()
}

#[test]
fn test_default_state() {
    let ctx = Context3d::new();
    let state = ctx.state();

    assert_eq!(state.cull_face, CullFace::None);
    assert_eq!(state.depth_range, (0.0, 1.0));
    assert!(ctx.program().is_none());
    assert!(ctx.vs_uniforms().iter().all(|&v| v == 0.0));
    assert_eq!(ctx.fs_uniforms().len(), FS_UNIFORMS);
}

#[test]
fn test_state_setters() {
    let mut ctx = Context3d::new();
    ctx.set_depth_range(0.25, 0.75);
    ctx.set_dither(0x779);
    ctx.set_point_params(0x1401);
    ctx.set_point_size(2.0);
    ctx.set_line_params(0x2);
    ctx.set_line_width(3.0);
    ctx.use_guardband(true);
    ctx.set_front_direction_is_cw(true);
    ctx.set_cull_face(CullFace::Back);
    ctx.set_point_coord_range(0.0, 1.0, 0.0, 0.5);
    ctx.set_polygon_offset(1.0, 2.0);
    ctx.set_provoking_vtx_last(true);

    let state = ctx.state();
    assert_eq!(state.depth_range, (0.25, 0.75));
    assert_eq!(state.dither, 0x779);
    assert_eq!(state.point_params, 0x1401);
    assert_eq!(state.point_size, 2.0);
    assert_eq!(state.line_params, 0x2);
    assert_eq!(state.line_width, 3.0);
    assert!(state.guardband);
    assert!(state.front_cw);
    assert_eq!(state.cull_face, CullFace::Back);
    assert_eq!(state.point_coord_range, [0.0, 1.0, 0.0, 0.5]);
    assert_eq!(state.polygon_offset, (1.0, 2.0));
    assert!(state.provoking_vtx_last);
}

#[test]
fn test_quad_covers_target() {
    let mut f = fixture(32);
    draw_quad(&mut f).unwrap();

    assert_eq!(covered_pixels(&f.target), 32 * 32);
}

#[test]
fn test_top_left_pixel_is_nearly_red() {
    let mut f = fixture(256);
    draw_quad(&mut f).unwrap();

    assert_eq!(f.target.read_pixel(0, 0).unwrap(), 0xFF0000FE);
}

#[test]
fn test_draw_without_color_attribute_uses_white() {
    let mut f = fixture(16);
    f.ctx.bind_program(program("[0] = \"position\";"));
    draw_quad(&mut f).unwrap();

    assert_eq!(f.target.read_pixel(5, 5).unwrap(), 0xFFFFFFFF);
}

#[test]
fn test_disabled_color_attribute_uses_white() {
    let mut f = fixture(16);
    f.ctx.disable_vertex_attrib_array(1).unwrap();
    draw_quad(&mut f).unwrap();

    assert_eq!(f.target.read_pixel(8, 8).unwrap(), 0xFFFFFFFF);
}

#[test]
fn test_back_face_culling() {
    // Triangle (0, 1, 2) is counter-clockwise, (1, 2, 3) clockwise
    let mut f = fixture(16);
    f.ctx.set_cull_face(CullFace::Back);
    draw_quad(&mut f).unwrap();

    // Only the upper-left half survives
    assert_ne!(f.target.read_pixel(1, 1).unwrap(), 0);
    assert_eq!(f.target.read_pixel(14, 14).unwrap(), 0);
}

#[test]
fn test_front_face_culling() {
    let mut f = fixture(16);
    f.ctx.set_cull_face(CullFace::Front);
    draw_quad(&mut f).unwrap();

    assert_eq!(f.target.read_pixel(1, 1).unwrap(), 0);
    assert_ne!(f.target.read_pixel(14, 14).unwrap(), 0);
}

#[test]
fn test_front_direction_flips_culling() {
    let mut f = fixture(16);
    f.ctx.set_front_direction_is_cw(true);
    f.ctx.set_cull_face(CullFace::Back);
    draw_quad(&mut f).unwrap();

    assert_eq!(f.target.read_pixel(1, 1).unwrap(), 0);
    assert_ne!(f.target.read_pixel(14, 14).unwrap(), 0);
}

#[test]
fn test_scissor_limits_drawing() {
    let mut f = fixture(16);
    f.ctx.set_scissor(4, 4, 8, 2);
    draw_quad(&mut f).unwrap();

    assert_eq!(covered_pixels(&f.target), 4 * 2);
    assert_ne!(f.target.read_pixel(4, 8).unwrap(), 0);
    assert_eq!(f.target.read_pixel(3, 8).unwrap(), 0);
    assert_eq!(f.target.read_pixel(4, 10).unwrap(), 0);
}

#[test]
fn test_zero_scissor_draws_nothing() {
    let mut f = fixture(16);
    f.ctx.set_scissor(0, 0, 0, 0);
    draw_quad(&mut f).unwrap();

    assert_eq!(covered_pixels(&f.target), 0);
}

#[test]
fn test_disabled_render_target_untouched() {
    let mut f = fixture(16);
    f.ctx.disable_render_target(1).unwrap();
    draw_quad(&mut f).unwrap();

    assert_eq!(covered_pixels(&f.target), 0);
}

#[test]
fn test_multiple_render_targets() {
    let mut f = fixture(16);
    let second =
        PixelBuffer::create(&f.host1x, 16, 16, PixelFormat::Bgra8888, PixelBufferLayout::Tiled16x16).unwrap();
    f.ctx.bind_render_target(3, second.clone()).unwrap();
    f.ctx.enable_render_target(3).unwrap();
    draw_quad(&mut f).unwrap();

    assert_eq!(covered_pixels(&f.target), 16 * 16);
    assert_eq!(covered_pixels(&second), 16 * 16);
    assert_eq!(f.target.to_rgba8().unwrap(), second.to_rgba8().unwrap());
}

#[test]
fn test_bind_render_target_returns_previous() {
    let mut f = fixture(16);
    let replacement =
        PixelBuffer::create(&f.host1x, 16, 16, PixelFormat::Rgba8888, PixelBufferLayout::Linear).unwrap();

    let previous = f.ctx.bind_render_target(1, replacement.clone()).unwrap().unwrap();
    assert_eq!(previous.bo().handle(), f.target.bo().handle());
    assert_eq!(f.ctx.render_target(1).unwrap().bo().handle(), replacement.bo().handle());

    // The slot stays enabled after rebinding
    draw_quad(&mut f).unwrap();
    assert_eq!(covered_pixels(&replacement), 16 * 16);
    assert_eq!(covered_pixels(&f.target), 0);
}

#[test]
fn test_render_target_slot_errors() {
    let mut ctx = Context3d::new();

    assert!(matches!(ctx.enable_render_target(2), Err(GrateError::Draw(_))));
    assert!(matches!(
        ctx.enable_render_target(16),
        Err(GrateError::InvalidLocation { location: 16, .. })
    ));
    assert!(ctx.render_target(40).is_none());
}

#[test]
fn test_u8_and_u32_indices() {
    for (mode, bytes) in [
        (IndexMode::U8, QUAD_INDICES.iter().map(|&i| i as u8).collect::<Vec<u8>>()),
        (
            IndexMode::U32,
            QUAD_INDICES
                .iter()
                .flat_map(|&i| (i as u32).to_le_bytes())
                .collect(),
        ),
    ] {
        let mut f = fixture(16);
        let indices = BufferObject::create_from_data(&f.host1x, BoFlags::empty(), &bytes).unwrap();
        f.ctx
            .draw_elements(PrimitiveType::Triangles, &indices, mode, 6)
            .unwrap();

        assert_eq!(covered_pixels(&f.target), 16 * 16, "{:?}", mode);
    }
}

#[test]
fn test_non_triangle_primitive_rejected() {
    let mut f = fixture(16);
    let indices = index_bo(&f.host1x, &QUAD_INDICES);

    for primitive in [PrimitiveType::Points, PrimitiveType::Lines, PrimitiveType::TriangleStrip] {
        assert!(matches!(
            f.ctx.draw_elements(primitive, &indices, IndexMode::U16, 6),
            Err(GrateError::Draw(_))
        ));
    }
}

#[test]
fn test_draw_requires_linked_program() {
    let mut f = fixture(16);

    let vs = Shader::parse_str(ShaderKind::Vertex, "vs", ".attributes\n[0] = \"position\";\n").unwrap();
    let fs = Shader::parse_str(ShaderKind::Fragment, "fs", "").unwrap();
    let linker = Shader::parse_str(ShaderKind::Linker, "lnk", "").unwrap();
    f.ctx.bind_program(Rc::new(Program::new(vs, fs, linker).unwrap()));

    assert!(matches!(
        draw_quad(&mut f),
        Err(GrateError::Shader(ShaderError::NotLinked))
    ));
}

#[test]
fn test_draw_requires_program_and_position() {
    let host1x: Rc<dyn Host1x> = Rc::new(SoftHost1x::new());
    let indices = index_bo(&host1x, &QUAD_INDICES);

    let mut ctx = Context3d::new();
    assert!(matches!(
        ctx.draw_elements(PrimitiveType::Triangles, &indices, IndexMode::U16, 6),
        Err(GrateError::Draw(_))
    ));

    ctx.bind_program(program("[3] = \"color\";"));
    assert!(matches!(
        ctx.draw_elements(PrimitiveType::Triangles, &indices, IndexMode::U16, 6),
        Err(GrateError::Draw(_))
    ));
}

#[test]
fn test_index_beyond_vertices() {
    let mut f = fixture(16);
    let indices = index_bo(&f.host1x, &[0, 1, 9]);

    assert!(matches!(
        f.ctx
            .draw_elements(PrimitiveType::Triangles, &indices, IndexMode::U16, 3),
        Err(GrateError::Draw(_))
    ));
}

#[test]
fn test_index_count_beyond_buffer() {
    let mut f = fixture(16);
    let indices = index_bo(&f.host1x, &QUAD_INDICES);

    assert!(matches!(
        f.ctx
            .draw_elements(PrimitiveType::Triangles, &indices, IndexMode::U16, 7),
        Err(GrateError::Draw(_))
    ));
}

#[test]
fn test_attribute_pointer_validation() {
    let host1x: Rc<dyn Host1x> = Rc::new(SoftHost1x::new());
    let bo = float_bo(&host1x, &QUAD);
    let mut ctx = Context3d::new();

    assert!(matches!(
        ctx.vertex_attrib_float_pointer(16, 4, bo.clone()),
        Err(GrateError::InvalidLocation { kind: "attribute", .. })
    ));
    assert!(matches!(
        ctx.vertex_attrib_float_pointer(0, 5, bo.clone()),
        Err(GrateError::Draw(_))
    ));
    assert!(ctx.vertex_attrib_float_pointer(0, 2, bo).is_ok());
    assert!(ctx.enable_vertex_attrib_array(17).is_err());
}

#[test]
fn test_enabled_attribute_without_pointer() {
    let mut f = fixture(16);
    f.ctx.bind_program(program("[0] = \"position\";\n[5] = \"color\";"));
    f.ctx.enable_vertex_attrib_array(5).unwrap();

    assert!(matches!(draw_quad(&mut f), Err(GrateError::Draw(_))));
}

#[test]
fn test_two_component_positions() {
    let mut f = fixture(16);
    let xy: Vec<f32> = QUAD.chunks_exact(4).flat_map(|v| [v[0], v[1]]).collect();
    f.ctx
        .vertex_attrib_float_pointer(0, 2, float_bo(&f.host1x, &xy))
        .unwrap();
    draw_quad(&mut f).unwrap();

    assert_eq!(covered_pixels(&f.target), 16 * 16);
}

#[test]
fn test_vertex_uniforms() {
    let mut ctx = Context3d::new();
    ctx.set_vertex_uniform(2, &[1.0, 2.0, 3.0, 4.0]).unwrap();

    assert_eq!(&ctx.vs_uniforms()[8..12], &[1.0, 2.0, 3.0, 4.0]);
    assert!(ctx.set_vertex_uniform(255, &[0.0; 4]).is_ok());
    assert!(matches!(
        ctx.set_vertex_uniform(256, &[0.0; 4]),
        Err(GrateError::InvalidLocation { location: 256, .. })
    ));
}

#[test]
fn test_fragment_uniforms() {
    let mut ctx = Context3d::new();
    ctx.set_fragment_uniform(7, &[0.5]).unwrap();

    assert_eq!(ctx.fs_uniforms()[7], 0.5);
    assert!(ctx.set_fragment_uniform(63, &[1.0]).is_ok());
    assert!(ctx.set_fragment_uniform(63, &[1.0, 2.0]).is_err());
}

#[test]
fn test_draw_leaves_buffers_unmapped() {
    let mut f = fixture(16);
    draw_quad(&mut f).unwrap();

    assert!(!f.target.bo().is_mapped());
    draw_quad(&mut f).unwrap();
}
