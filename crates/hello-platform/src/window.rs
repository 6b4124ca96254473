// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use tracing::info;
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowConfig {
    pub title: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Hello".to_owned(),
            x: 20,
            y: 20,
            width: 500,
            height: 500,
        }
    }
}

pub fn create_window(event_loop: &ActiveEventLoop, cfg: &WindowConfig) -> Result<Window> {
    let attrs = Window::default_attributes()
        .with_title(cfg.title.clone())
        .with_position(PhysicalPosition::new(cfg.x, cfg.y))
        .with_inner_size(PhysicalSize::new(cfg.width, cfg.height));
    let window = event_loop
        .create_window(attrs)
        .with_context(|| format!("could not create window \"{}\"", cfg.title))?;
    info!(
        "window \"{}\" created at {},{} ({}x{})",
        cfg.title, cfg.x, cfg.y, cfg.width, cfg.height
    );
    Ok(window)
}
