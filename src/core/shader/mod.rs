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

//! Shader assembly
//!
//! Shaders are read from a fixed-format text file made of sections:
//!
//! ```text
//! // vertex shader
//! .attributes
//!     [0] = "position";
//!     [1] = "color";
//!
//! .exports
//!     [0] = "position";
//!     [7] = "color";
//!
//! .uniforms
//!     [0] = "mvp";
//!
//! .constants
//!     [4] = 0x3F800000;
//!     [5] = 0.5;
//!
//! .asm
//!     0x001F9C6C 0x0000000D 0x8106C083 0x60417FF8
//! ```
//!
//! `//` and `#` start a comment. Which sections are accepted depends on the
//! shader kind:
//!
//! | Section       | Vertex      | Fragment   | Linker |
//! |---------------|-------------|------------|--------|
//! | `.attributes` | 16 entries  | -          | -      |
//! | `.exports`    | 16 entries  | -          | -      |
//! | `.uniforms`   | 256 vec4    | 64 scalar  | -      |
//! | `.constants`  | 1024 words  | 32 words   | -      |
//! | `.asm`        | yes         | yes        | yes    |
//!
//! Instruction words are carried verbatim; nothing here decodes them.

mod program;

pub use program::{Program, FS_CONSTANTS, VS_CONSTANTS};

use crate::core::error::ShaderError;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Which pipeline stage a shader belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderKind {
    Vertex,
    Fragment,
    Linker,
}

impl fmt::Display for ShaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderKind::Vertex => "vertex",
            ShaderKind::Fragment => "fragment",
            ShaderKind::Linker => "linker",
        })
    }
}

/// Section of a shader source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Attributes,
    Exports,
    Uniforms,
    Constants,
    Asm,
}

impl Section {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            ".attributes" => Some(Section::Attributes),
            ".exports" => Some(Section::Exports),
            ".uniforms" => Some(Section::Uniforms),
            ".constants" => Some(Section::Constants),
            ".asm" => Some(Section::Asm),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Section::Attributes => "attributes",
            Section::Exports => "exports",
            Section::Uniforms => "uniforms",
            Section::Constants => "constants",
            Section::Asm => "asm",
        }
    }

    /// Number of indices the section accepts for `kind`, `None` if the
    /// section is not allowed at all
    fn limit(self, kind: ShaderKind) -> Option<u32> {
        match (kind, self) {
            (_, Section::Asm) => Some(u32::MAX),
            (ShaderKind::Vertex, Section::Attributes | Section::Exports) => Some(16),
            (ShaderKind::Vertex, Section::Uniforms) => Some(256),
            (ShaderKind::Vertex, Section::Constants) => Some(VS_CONSTANTS as u32),
            (ShaderKind::Fragment, Section::Uniforms) => Some(64),
            (ShaderKind::Fragment, Section::Constants) => Some(FS_CONSTANTS as u32),
            _ => None,
        }
    }
}

/// Parsed shader
#[derive(Debug, Clone, PartialEq)]
pub struct Shader {
    kind: ShaderKind,
    words: Vec<u32>,
    attributes: BTreeMap<u32, String>,
    exports: BTreeMap<u32, String>,
    uniforms: BTreeMap<u32, String>,
    constants: BTreeMap<u32, u32>,
}

impl Shader {
    /// Parse shader source text
    ///
    /// # Arguments
    ///
    /// * `kind` - Stage the source is for; decides which sections are legal
    /// * `path` - Name used in error messages
    /// * `source` - Shader source text
    ///
    /// # Example
    ///
    /// ```
    /// use grate::core::shader::{Shader, ShaderKind};
    ///
    /// let fs = Shader::parse_str(ShaderKind::Fragment, "fs.txt", ".asm\n0x1 0x2\n").unwrap();
    /// assert_eq!(fs.words(), &[1, 2]);
    /// ```
    pub fn parse_str(kind: ShaderKind, path: &str, source: &str) -> Result<Self, ShaderError> {
        let mut shader = Shader {
            kind,
            words: Vec::new(),
            attributes: BTreeMap::new(),
            exports: BTreeMap::new(),
            uniforms: BTreeMap::new(),
            constants: BTreeMap::new(),
        };

        let mut section: Option<Section> = None;

        for (number, raw) in source.lines().enumerate() {
            let line_no = number + 1;
            let line = strip_comment(raw).trim();

            if line.is_empty() {
                continue;
            }

            let syntax = |message: String| ShaderError::Syntax {
                path: path.to_string(),
                line: line_no,
                message,
            };

            if line.starts_with('.') {
                let next = Section::from_name(line).ok_or_else(|| ShaderError::UnknownSection {
                    name: line.to_string(),
                    line: line_no,
                })?;

                if next.limit(kind).is_none() {
                    return Err(syntax(format!(
                        "section `{}' is not allowed in a {} shader",
                        line, kind
                    )));
                }

                section = Some(next);
                continue;
            }

            let Some(current) = section else {
                return Err(syntax("statement outside of a section".to_string()));
            };

            if current == Section::Asm {
                for token in line.split(|c: char| c.is_whitespace() || c == ',' || c == ';') {
                    if token.is_empty() {
                        continue;
                    }
                    let word = parse_hex(token)
                        .ok_or_else(|| syntax(format!("invalid instruction word `{}'", token)))?;
                    shader.words.push(word);
                }
                continue;
            }

            let (index, value) = parse_entry(line).map_err(syntax)?;
            let limit = current.limit(kind).unwrap_or(0);

            if index >= limit {
                return Err(ShaderError::IndexOutOfRange {
                    section: current.name(),
                    index,
                    limit,
                });
            }

            let duplicate = match current {
                Section::Constants => {
                    let word = parse_constant(value)
                        .ok_or_else(|| syntax(format!("invalid constant `{}'", value)))?;
                    shader.constants.insert(index, word).is_some()
                }
                names => {
                    let name = parse_name(value)
                        .ok_or_else(|| syntax(format!("expected a quoted name, got `{}'", value)))?;
                    let table = match names {
                        Section::Attributes => &mut shader.attributes,
                        Section::Exports => &mut shader.exports,
                        _ => &mut shader.uniforms,
                    };
                    table.insert(index, name.to_string()).is_some()
                }
            };

            if duplicate {
                return Err(syntax(format!("index {} defined twice", index)));
            }
        }

        log::debug!(
            "Parsed {} shader {}: {} words, {} attributes, {} uniforms, {} constants",
            kind,
            path,
            shader.words.len(),
            shader.attributes.len(),
            shader.uniforms.len(),
            shader.constants.len()
        );

        Ok(shader)
    }

    /// Parse a shader source file of the given kind
    pub fn parse_file<P: AsRef<Path>>(kind: ShaderKind, path: P) -> Result<Self, ShaderError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ShaderError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::parse_str(kind, &path.display().to_string(), &source)
    }

    pub fn parse_vertex_asm_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ShaderError> {
        Self::parse_file(ShaderKind::Vertex, path)
    }

    pub fn parse_fragment_asm_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ShaderError> {
        Self::parse_file(ShaderKind::Fragment, path)
    }

    pub fn parse_linker_asm_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ShaderError> {
        Self::parse_file(ShaderKind::Linker, path)
    }

    pub fn kind(&self) -> ShaderKind {
        self.kind
    }

    /// Instruction words in program order
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Input attributes, by location
    pub fn attributes(&self) -> &BTreeMap<u32, String> {
        &self.attributes
    }

    /// Exported varyings, by slot
    pub fn exports(&self) -> &BTreeMap<u32, String> {
        &self.exports
    }

    /// Uniforms, by location
    pub fn uniforms(&self) -> &BTreeMap<u32, String> {
        &self.uniforms
    }

    /// Constant words, by index
    pub fn constants(&self) -> &BTreeMap<u32, u32> {
        &self.constants
    }

    /// Word listing of the program, one instruction word per line
    pub fn disasm(&self) -> String {
        let mut out = String::new();

        for (index, word) in self.words.iter().enumerate() {
            out.push_str(&format!("{:04}: 0x{:08X}\n", index, word));
        }

        out
    }
}

/// Cut a line at the first `//` or `#` that is not inside quotes
fn strip_comment(line: &str) -> &str {
    let mut quoted = false;
    let bytes = line.as_bytes();

    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'"' => quoted = !quoted,
            b'#' if !quoted => return &line[..i],
            b'/' if !quoted && bytes.get(i + 1) == Some(&b'/') => return &line[..i],
            _ => {}
        }
    }

    line
}

/// Split `[N] = value;` into index and value text
fn parse_entry(line: &str) -> Result<(u32, &str), String> {
    let rest = line
        .strip_prefix('[')
        .ok_or_else(|| format!("expected `[index] = value', got `{}'", line))?;
    let (index, rest) = rest
        .split_once(']')
        .ok_or_else(|| "missing `]'".to_string())?;
    let index = index
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid index `{}'", index.trim()))?;
    let value = rest
        .trim_start()
        .strip_prefix('=')
        .ok_or_else(|| "missing `='".to_string())?;
    let value = value.trim();
    let value = value.strip_suffix(';').unwrap_or(value).trim_end();

    Ok((index, value))
}

fn parse_name(value: &str) -> Option<&str> {
    let name = value.strip_prefix('"')?.strip_suffix('"')?;
    (!name.is_empty() && !name.contains('"')).then_some(name)
}

fn parse_hex(token: &str) -> Option<u32> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u32::from_str_radix(digits, 16).ok()
}

/// Hex constants are raw words; anything else is read as a float
fn parse_constant(value: &str) -> Option<u32> {
    if value.starts_with("0x") || value.starts_with("0X") {
        return parse_hex(value);
    }
    value.parse::<f32>().ok().map(f32::to_bits)
}
