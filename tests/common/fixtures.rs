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

//! Test fixtures for shader test scenarios

use std::path::PathBuf;
use std::rc::Rc;

use grate::core::asm_test::AsmTest;
use grate::core::config::Options;
use grate::core::grate::Grate;
use grate::core::host1x::{Host1x, SoftHost1x};

/// Directory holding the sample shaders
pub fn asm_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("asm")
}

/// Headless context on a fresh software host
pub fn create_grate() -> Grate {
    let host1x: Rc<dyn Host1x> = Rc::new(SoftHost1x::new());
    Grate::init(Options::default(), host1x)
}

/// Pass-through test that skips dumps and presentation
pub fn passthrough_test() -> AsmTest {
    let dir = asm_dir();
    let mut test = AsmTest::new(
        dir.join("passthrough.vs.asm"),
        dir.join("passthrough.fs.asm"),
        dir.join("passthrough.lnk.asm"),
    );
    test.test_only = true;
    test
}

/// Write a shader source to `dir/name` and return the path
#[allow(dead_code)]
pub fn write_shader(dir: &std::path::Path, name: &str, source: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, source).expect("Failed to write shader");
    path
}
