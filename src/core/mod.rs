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

//! Core driver components
//!
//! This module contains the driver shim and the harness built on top of it:
//! - Host1x device provider (buffer allocation and mapping)
//! - Buffer objects
//! - Framebuffers and pixel buffers
//! - 3D submission context with a software pipeline
//! - Shader assembly and program linking
//! - Device-node file wrapper registry
//! - Chip identification
//! - Vertex shader assembly test driver

pub mod bo;
pub mod chip;
pub mod config;
pub mod error;
pub mod framebuffer;
pub mod gr3d;
pub mod grate;
pub mod host1x;
pub mod shader;
pub mod wrap;

// Re-export commonly used types
pub use bo::{BoFlags, BoMapping, BufferObject};
pub use chip::ChipId;
pub use config::Options;
pub use error::{GrateError, Result, ShaderError};
pub use framebuffer::{Framebuffer, FramebufferFlags, PixelBuffer, PixelBufferLayout, PixelFormat};
pub use gr3d::Context3d;
pub use grate::Grate;
pub use host1x::{Host1x, SoftHost1x};
pub use wrap::Files;
