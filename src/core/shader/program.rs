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

//! Linked vertex + fragment + linker programs

use super::{Shader, ShaderKind};
use crate::core::error::ShaderError;

/// Words in the vertex constant file (256 vec4 registers)
pub const VS_CONSTANTS: usize = 256 * 4;

/// Words in the fragment constant file
pub const FS_CONSTANTS: usize = 32;

/// A complete program
///
/// Constant files are zero until [`link`](Program::link) lays the shaders'
/// constants out in them.
#[derive(Debug, Clone)]
pub struct Program {
    vs: Shader,
    fs: Shader,
    linker: Shader,
    vs_constants: Vec<u32>,
    fs_constants: Vec<u32>,
    linked: bool,
}

impl Program {
    /// Combine three shaders into a program
    ///
    /// # Errors
    ///
    /// `ShaderError::WrongKind` if a shader is passed in the wrong position.
    pub fn new(vs: Shader, fs: Shader, linker: Shader) -> Result<Self, ShaderError> {
        for (shader, expected) in [
            (&vs, ShaderKind::Vertex),
            (&fs, ShaderKind::Fragment),
            (&linker, ShaderKind::Linker),
        ] {
            if shader.kind() != expected {
                return Err(ShaderError::WrongKind {
                    expected,
                    found: shader.kind(),
                });
            }
        }

        Ok(Self {
            vs,
            fs,
            linker,
            vs_constants: vec![0; VS_CONSTANTS],
            fs_constants: vec![0; FS_CONSTANTS],
            linked: false,
        })
    }

    /// Fill the constant files from the shaders' `.constants` sections
    pub fn link(&mut self) {
        self.vs_constants.fill(0);
        self.fs_constants.fill(0);

        // Indices were bounds-checked when the shaders were parsed
        for (&index, &word) in self.vs.constants() {
            self.vs_constants[index as usize] = word;
        }
        for (&index, &word) in self.fs.constants() {
            self.fs_constants[index as usize] = word;
        }

        self.linked = true;

        log::debug!(
            "Linked program: {} vertex, {} fragment, {} linker words",
            self.vs.words().len(),
            self.fs.words().len(),
            self.linker.words().len()
        );
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }

    pub fn vs(&self) -> &Shader {
        &self.vs
    }

    pub fn fs(&self) -> &Shader {
        &self.fs
    }

    pub fn linker(&self) -> &Shader {
        &self.linker
    }

    /// Vertex constant file, [`VS_CONSTANTS`] words
    pub fn vs_constants(&self) -> &[u32] {
        &self.vs_constants
    }

    /// Fragment constant file, [`FS_CONSTANTS`] words
    pub fn fs_constants(&self) -> &[u32] {
        &self.fs_constants
    }

    /// Location of a vertex attribute by name
    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        find_location(self.vs.attributes().iter(), name)
    }

    /// vec4 register of a vertex uniform by name
    pub fn vertex_uniform_location(&self, name: &str) -> Option<u32> {
        find_location(self.vs.uniforms().iter(), name)
    }

    /// Scalar slot of a fragment uniform by name
    pub fn fragment_uniform_location(&self, name: &str) -> Option<u32> {
        find_location(self.fs.uniforms().iter(), name)
    }
}

/// Lowest index bound to `name`
fn find_location<'a>(mut entries: impl Iterator<Item = (&'a u32, &'a String)>, name: &str) -> Option<u32> {
    entries.find(|(_, entry)| *entry == name).map(|(&index, _)| index)
}
