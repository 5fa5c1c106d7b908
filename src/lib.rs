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

//! Tegra 3D engine conformance harness and userspace driver shim
//!
//! This library provides the pieces a shader conformance test needs to drive
//! the Tegra 3D engine: buffer objects, framebuffers, the device-node file
//! wrapper registry, chip identification and a 3D submission context.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use grate::core::bo::{BoFlags, BufferObject};
//! use grate::core::host1x::{Host1x, SoftHost1x};
//!
//! let host1x: Rc<dyn Host1x> = Rc::new(SoftHost1x::new());
//! let bo = BufferObject::create_from_data(&host1x, BoFlags::empty(), &[1, 2, 3, 4]).unwrap();
//!
//! let tail = bo.wrap(2).unwrap();
//! assert_eq!(&tail.map().unwrap()[..], &[3, 4]);
//! ```

pub mod core;
