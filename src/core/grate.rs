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

//! Grate context
//!
//! `Grate` ties the pieces together: it owns the device, the options, the
//! bound framebuffer and clear color, an optional presenter and the cached
//! chip id.
//!
//! # Presentation
//!
//! With a presenter, [`Grate::swap_buffers`] shows the bound framebuffer in
//! an overlay (windowed) or on the whole display (fullscreen, or when the
//! presenter has no overlay support). Without one the harness is headless
//! and the framebuffer is written to `test.png` instead.

use crate::core::bo::{BoFlags, BufferObject};
use crate::core::chip::{ChipId, ChipIdResolver};
use crate::core::config::Options;
use crate::core::error::{GrateError, Result};
use crate::core::framebuffer::Framebuffer;
use crate::core::host1x::Host1x;
use crate::core::wrap::Files;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// File written by `swap_buffers` when there is no presenter
pub const HEADLESS_OUTPUT: &str = "test.png";

/// On-screen output
pub trait Presenter {
    /// Display resolution in pixels
    fn resolution(&self) -> (u32, u32);

    /// Whether the presenter can show a framebuffer in a window-sized
    /// overlay
    fn supports_overlay(&self) -> bool {
        false
    }

    /// Show `fb` in an overlay at (x, y) with the given size
    fn show_overlay(&mut self, fb: &Framebuffer, x: u32, y: u32, width: u32, height: u32, vsync: bool) -> Result<()>;

    /// Show `fb` on the whole display
    fn show_display(&mut self, fb: &Framebuffer, vsync: bool) -> Result<()>;

    /// Block until the user presses a key
    fn wait_for_key(&mut self) -> Result<()> {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(())
    }

    /// Poll for a key press without blocking
    fn key_pressed(&mut self) -> bool {
        false
    }
}

/// Harness context
pub struct Grate {
    host1x: Rc<dyn Host1x>,
    options: Options,
    presenter: Option<Box<dyn Presenter>>,
    overlay: bool,
    fb: Option<Framebuffer>,
    clear_color: [f32; 4],
    chip: ChipIdResolver,
    files: Files,
    headless_output: PathBuf,
}

impl Grate {
    /// Create a headless context
    ///
    /// # Example
    ///
    /// ```
    /// use std::rc::Rc;
    /// use grate::core::{Grate, Options, SoftHost1x};
    ///
    /// let grate = Grate::init(Options::default(), Rc::new(SoftHost1x::new()));
    /// assert!(!grate.has_presenter());
    /// assert_eq!(grate.options().width, 256);
    /// ```
    pub fn init(options: Options, host1x: Rc<dyn Host1x>) -> Self {
        log::debug!("Initializing headless grate context");

        Self {
            host1x,
            files: Files::with_options(&options),
            options,
            presenter: None,
            overlay: false,
            fb: None,
            clear_color: [0.0; 4],
            chip: ChipIdResolver::new(),
            headless_output: PathBuf::from(HEADLESS_OUTPUT),
        }
    }

    /// Create a context that presents through `presenter`
    ///
    /// An overlay is used unless fullscreen output is requested or the
    /// presenter cannot do overlays. Without an overlay the output size
    /// becomes the display resolution.
    pub fn with_presenter(mut options: Options, host1x: Rc<dyn Host1x>, presenter: Box<dyn Presenter>) -> Self {
        let overlay = !options.fullscreen && presenter.supports_overlay();

        if !overlay {
            (options.width, options.height) = presenter.resolution();
        }

        log::debug!(
            "Presenting {}x{} via {}",
            options.width,
            options.height,
            if overlay { "overlay" } else { "display" }
        );

        Self {
            presenter: Some(presenter),
            overlay,
            ..Self::init(options, host1x)
        }
    }

    /// Replace the chip id resolver
    pub fn with_chip_resolver(mut self, resolver: ChipIdResolver) -> Self {
        self.chip = resolver;
        self
    }

    pub fn host1x(&self) -> &Rc<dyn Host1x> {
        &self.host1x
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Device-node wrapper registry, verbose when `options.verbose` is set
    pub fn files(&self) -> &Files {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut Files {
        &mut self.files
    }

    pub fn has_presenter(&self) -> bool {
        self.presenter.is_some()
    }

    /// Whether presentation goes through an overlay
    pub fn uses_overlay(&self) -> bool {
        self.overlay
    }

    /// Set the color used by [`clear`](Self::clear)
    pub fn clear_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32) {
        self.clear_color = [red, green, blue, alpha];
    }

    /// Fill the bound framebuffer's draw buffer with the clear color
    pub fn clear(&mut self) -> Result<()> {
        let fb = self.fb.as_ref().ok_or(GrateError::NoFramebuffer)?;
        fb.draw_pixbuf().clear(self.clear_color)
    }

    /// Bind `fb`, returning the previously bound framebuffer
    pub fn bind_framebuffer(&mut self, fb: Framebuffer) -> Option<Framebuffer> {
        self.fb.replace(fb)
    }

    /// Unbind and return the bound framebuffer
    pub fn unbind_framebuffer(&mut self) -> Option<Framebuffer> {
        self.fb.take()
    }

    pub fn framebuffer(&self) -> Result<&Framebuffer> {
        self.fb.as_ref().ok_or(GrateError::NoFramebuffer)
    }

    pub fn framebuffer_mut(&mut self) -> Result<&mut Framebuffer> {
        self.fb.as_mut().ok_or(GrateError::NoFramebuffer)
    }

    /// Wait for submitted work. Draws complete synchronously.
    pub fn flush(&mut self) {}

    /// Present the bound framebuffer
    ///
    /// Overlay or display output when a presenter is attached, otherwise
    /// the framebuffer is saved to the headless output file.
    pub fn swap_buffers(&mut self) -> Result<()> {
        let fb = self.fb.as_ref().ok_or(GrateError::NoFramebuffer)?;

        match self.presenter.as_mut() {
            Some(presenter) if self.overlay => presenter.show_overlay(
                fb,
                self.options.x,
                self.options.y,
                self.options.width,
                self.options.height,
                self.options.vsync,
            ),
            Some(presenter) => presenter.show_display(fb, self.options.vsync),
            None => fb.save(&self.headless_output),
        }
    }

    /// Change where headless output is written
    pub fn set_headless_output<P: AsRef<Path>>(&mut self, path: P) {
        self.headless_output = path.as_ref().to_path_buf();
    }

    pub fn headless_output(&self) -> &Path {
        &self.headless_output
    }

    /// Block until a key press; returns at once when headless
    pub fn wait_for_key(&mut self) -> Result<()> {
        match self.presenter.as_mut() {
            Some(presenter) => presenter.wait_for_key(),
            None => Ok(()),
        }
    }

    /// Poll for a key press; always true when headless
    pub fn key_pressed(&mut self) -> bool {
        match self.presenter.as_mut() {
            Some(presenter) => presenter.key_pressed(),
            None => true,
        }
    }

    /// SoC generation, probed once
    pub fn chip_id(&self) -> ChipId {
        self.chip.resolve()
    }

    /// Upload raw bytes into a new buffer object
    pub fn create_attrib_bo_from_data(&self, data: &[u8]) -> Result<BufferObject> {
        BufferObject::create_from_data(&self.host1x, BoFlags::empty(), data)
    }

    /// Upload 32-bit floats (little endian) into a new buffer object
    pub fn create_attrib_bo_from_floats(&self, values: &[f32]) -> Result<BufferObject> {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.create_attrib_bo_from_data(&bytes)
    }

    /// Upload 16-bit indices (little endian) into a new buffer object
    pub fn create_index_bo_from_u16(&self, indices: &[u16]) -> Result<BufferObject> {
        let bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
        self.create_attrib_bo_from_data(&bytes)
    }
}
