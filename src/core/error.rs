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

/// Driver and harness error types
use thiserror::Error;

/// Result type for grate operations
pub type Result<T> = std::result::Result<T, GrateError>;

/// Main error type for the driver shim and the test harness
#[derive(Error, Debug)]
pub enum GrateError {
    #[error("Failed to allocate {size}-byte buffer object: {reason}")]
    Allocation { size: usize, reason: String },

    #[error("Failed to map buffer object: {0}")]
    Map(String),

    #[error("Wrap offset {offset} out of range for {size}-byte buffer object")]
    Range { offset: usize, size: usize },

    #[error("Pixel ({x}, {y}) outside {width}x{height} surface")]
    PixelOutOfBounds { x: u32, y: u32, width: u32, height: u32 },

    #[error("Invalid {kind} location {location}")]
    InvalidLocation { kind: &'static str, location: u32 },

    #[error("Out of FD slots for `{path}' (capacity {capacity})")]
    SlotExhaustion { path: String, capacity: usize },

    #[error("No wrapped file for fd {0}")]
    UnknownFd(i32),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Shader error: {0}")]
    Shader(#[from] ShaderError),

    #[error("Draw error: {0}")]
    Draw(String),

    #[error("No framebuffer bound")]
    NoFramebuffer,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image export error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Report error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Shader assembly errors
#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("{path}:{line}: {message}")]
    Syntax {
        path: String,
        line: usize,
        message: String,
    },

    #[error("Unknown section `{name}' at line {line}")]
    UnknownSection { name: String, line: usize },

    #[error("Index {index} out of range in section `{section}' (limit {limit})")]
    IndexOutOfRange {
        section: &'static str,
        index: u32,
        limit: u32,
    },

    #[error("Expected {expected} shader, got {found} shader")]
    WrongKind {
        expected: crate::core::shader::ShaderKind,
        found: crate::core::shader::ShaderKind,
    },

    #[error("Program is not linked")]
    NotLinked,

    #[error("Failed to read `{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
