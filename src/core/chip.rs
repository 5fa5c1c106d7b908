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

//! SoC generation detection
//!
//! The chip id is read once from the first sysfs node that exists and
//! cached for the lifetime of the resolver.

use std::cell::OnceCell;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Sysfs nodes that expose the chip id, in probe order
pub const CHIP_ID_PATHS: [&str; 3] = [
    "/sys/module/tegra_fuse/parameters/tegra_chip_id",
    "/sys/module/fuse/parameters/tegra_chip_id",
    "/sys/devices/soc0/soc_id",
];

/// SoC generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipId {
    Tegra20,
    Tegra30,
    Tegra114,
    Unknown,
}

impl ChipId {
    /// Map a raw chip id value to a generation
    pub fn from_raw(id: u32) -> Self {
        match id {
            0x20 => ChipId::Tegra20,
            0x30 => ChipId::Tegra30,
            0x35 => ChipId::Tegra114,
            _ => ChipId::Unknown,
        }
    }
}

impl fmt::Display for ChipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChipId::Tegra20 => "Tegra20",
            ChipId::Tegra30 => "Tegra30",
            ChipId::Tegra114 => "Tegra114",
            ChipId::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Memoizing chip id lookup
#[derive(Debug)]
pub struct ChipIdResolver {
    paths: Vec<PathBuf>,
    cached: OnceCell<ChipId>,
}

impl ChipIdResolver {
    /// Resolver probing the standard sysfs nodes
    pub fn new() -> Self {
        Self::with_paths(CHIP_ID_PATHS)
    }

    /// Resolver probing a custom list of files, in order
    pub fn with_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            cached: OnceCell::new(),
        }
    }

    /// Chip generation, probing the filesystem on first call only
    ///
    /// The first readable file decides; its contents are parsed as a
    /// decimal integer. When no file can be read the result is
    /// `ChipId::Unknown`, which is cached like any other answer.
    pub fn resolve(&self) -> ChipId {
        *self.cached.get_or_init(|| {
            let id = self
                .paths
                .iter()
                .find_map(|path| read_chip_id(path))
                .unwrap_or_else(|| {
                    log::error!("failed to identify SoC version");
                    ChipId::Unknown
                });

            log::debug!("SoC version: {}", id);
            id
        })
    }
}

impl Default for ChipIdResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Read one chip id file, `None` if it cannot be read
fn read_chip_id(path: &Path) -> Option<ChipId> {
    let contents = fs::read_to_string(path).ok()?;

    let raw = parse_decimal(&contents).unwrap_or_else(|| {
        log::warn!("failed to parse chip id from {}", path.display());
        0
    });

    Some(ChipId::from_raw(raw))
}

/// Parse the leading decimal integer of `text`, skipping leading whitespace
fn parse_decimal(text: &str) -> Option<u32> {
    let text = text.trim_start();
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());

    text[..end].parse().ok()
}
