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

//! Custom assertions for framebuffer checks

use grate::core::framebuffer::PixelBuffer;

/// Assert a pixel of `pixbuf` has the expected packed value
#[allow(dead_code)]
pub fn assert_pixel(pixbuf: &PixelBuffer, x: u32, y: u32, expected: u32) {
    let actual = pixbuf.read_pixel(x, y).expect("Failed to read pixel");
    assert_eq!(
        actual, expected,
        "Pixel at ({}, {}) mismatch: expected 0x{:08X}, got 0x{:08X}",
        x, y, expected, actual
    );
}
