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

//! Harness options
//!
//! Options come from the command line, optionally layered over a TOML file:
//!
//! ```toml
//! fullscreen = false
//! vsync = true
//! width = 512
//! height = 512
//! verbose = false
//! ```
//!
//! Keys that are left out keep their defaults.

use crate::core::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default output width in pixels
pub const DEFAULT_WIDTH: u32 = 256;

/// Default output height in pixels
pub const DEFAULT_HEIGHT: u32 = 256;

/// Output and diagnostics options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Use the whole display instead of an overlay
    pub fullscreen: bool,
    /// Synchronize presentation to vertical blanking
    pub vsync: bool,
    /// Overlay position
    pub x: u32,
    pub y: u32,
    /// Output size; replaced by the display resolution when presenting
    /// without an overlay
    pub width: u32,
    pub height: u32,
    /// Enables hexdumps and debug-level diagnostics
    pub verbose: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            fullscreen: false,
            vsync: false,
            x: 0,
            y: 0,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            verbose: false,
        }
    }
}

impl Options {
    /// Parse options from TOML text
    ///
    /// # Example
    ///
    /// ```
    /// use grate::core::config::Options;
    ///
    /// let options = Options::from_toml_str("vsync = true\nwidth = 512").unwrap();
    /// assert!(options.vsync);
    /// assert_eq!(options.width, 512);
    /// assert_eq!(options.height, 256);
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load options from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let options = Self::from_toml_str(&text)?;

        log::debug!("Loaded options from {}: {:?}", path.display(), options);

        Ok(options)
    }
}
