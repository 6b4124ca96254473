// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Window creation and input plumbing on top of winit.

pub use winit;

mod input;
mod window;

pub use input::{
    key_from_code, mouse_button_from, InputEvent, Key, MouseButton, WindowEventHandler,
    WindowState,
};
pub use window::{create_window, WindowConfig};
