// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::path::PathBuf;

mod vertex;

pub use vertex::{vertices_from_floats, PayloadError, Vertex, FLOATS_PER_VERTEX};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Everything a backend needs to build its one static draw.
#[derive(Clone, Debug)]
pub struct RenderDesc {
    pub vertices: Vec<Vertex>,
    pub clear_color: [f32; 3],
    /// Directory holding `vert.spv` / `frag.spv`; `None` uses the built-in shaders.
    pub shader_dir: Option<PathBuf>,
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        desc: &RenderDesc,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Called when the platform reports a window size change.
    fn resize(&mut self, size: RenderSize) -> Result<()>;
    fn ready_to_draw(&self) -> bool;
    fn render(&mut self) -> Result<()>;
    fn set_clear_color(&mut self, rgb: [f32; 3]);
}
