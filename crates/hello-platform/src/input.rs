// SPDX-License-Identifier: CEPL-1.0
use tracing::debug;
use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Escape,
    Up,
    Down,
    Left,
    Right,
    Space,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
}

pub fn key_from_code(code: KeyCode) -> Option<Key> {
    Some(match code {
        KeyCode::Escape => Key::Escape,
        KeyCode::ArrowUp => Key::Up,
        KeyCode::ArrowDown => Key::Down,
        KeyCode::ArrowLeft => Key::Left,
        KeyCode::ArrowRight => Key::Right,
        KeyCode::Space => Key::Space,
        _ => return None,
    })
}

pub fn mouse_button_from(button: winit::event::MouseButton) -> Option<MouseButton> {
    match button {
        winit::event::MouseButton::Left => Some(MouseButton::Left),
        winit::event::MouseButton::Right => Some(MouseButton::Right),
        _ => None,
    }
}

/// Callbacks for input. Every method defaults to doing nothing.
pub trait WindowEventHandler {
    fn on_key_down(&mut self, _key: Key) {}
    fn on_key_up(&mut self, _key: Key) {}
    fn on_mouse_button_down(&mut self, _button: MouseButton, _x: i32, _y: i32) {}
    fn on_mouse_button_up(&mut self, _button: MouseButton, _x: i32, _y: i32) {}
}

/// Platform-neutral form of the window events the engine reacts to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputEvent {
    KeyDown(Key),
    KeyUp(Key),
    MouseDown(MouseButton),
    MouseUp(MouseButton),
    CursorMoved { x: f64, y: f64 },
    Resized { width: u32, height: u32 },
    CloseRequested,
}

/// Close and resize flags plus the registered handlers for one window.
#[derive(Default)]
pub struct WindowState {
    handlers: Vec<Box<dyn WindowEventHandler>>,
    cursor: (i32, i32),
    size: (u32, u32),
    close_requested: bool,
    resize_requested: bool,
}

impl WindowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&mut self, handler: Box<dyn WindowEventHandler>) {
        self.handlers.push(handler);
    }

    pub fn is_close_requested(&self) -> bool {
        self.close_requested
    }

    /// Edge-triggered: true once per batch of resizes, then false until the
    /// next one.
    pub fn is_resize_requested(&mut self) -> bool {
        std::mem::take(&mut self.resize_requested)
    }

    /// Last size reported by the platform.
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn cursor(&self) -> (i32, i32) {
        self.cursor
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        let translated = match event {
            WindowEvent::CloseRequested => Some(InputEvent::CloseRequested),
            WindowEvent::Resized(size) => Some(InputEvent::Resized {
                width: size.width,
                height: size.height,
            }),
            WindowEvent::CursorMoved { position, .. } => Some(InputEvent::CursorMoved {
                x: position.x,
                y: position.y,
            }),
            WindowEvent::MouseInput { state, button, .. } => {
                mouse_button_from(*button).map(|b| match state {
                    ElementState::Pressed => InputEvent::MouseDown(b),
                    ElementState::Released => InputEvent::MouseUp(b),
                })
            }
            WindowEvent::KeyboardInput { event, .. } if !event.repeat => match event.physical_key
            {
                PhysicalKey::Code(code) => key_from_code(code).map(|k| match event.state {
                    ElementState::Pressed => InputEvent::KeyDown(k),
                    ElementState::Released => InputEvent::KeyUp(k),
                }),
                PhysicalKey::Unidentified(_) => None,
            },
            _ => None,
        };
        if let Some(e) = translated {
            self.dispatch(e);
        }
    }

    pub fn dispatch(&mut self, event: InputEvent) {
        match event {
            InputEvent::CloseRequested => {
                debug!("close requested");
                self.close_requested = true;
            }
            InputEvent::Resized { width, height } => {
                self.size = (width, height);
                self.resize_requested = true;
            }
            InputEvent::CursorMoved { x, y } => {
                self.cursor = (x as i32, y as i32);
            }
            InputEvent::KeyDown(k) => self.handlers.iter_mut().for_each(|h| h.on_key_down(k)),
            InputEvent::KeyUp(k) => self.handlers.iter_mut().for_each(|h| h.on_key_up(k)),
            InputEvent::MouseDown(b) => {
                let (x, y) = self.cursor;
                self.handlers
                    .iter_mut()
                    .for_each(|h| h.on_mouse_button_down(b, x, y));
            }
            InputEvent::MouseUp(b) => {
                let (x, y) = self.cursor;
                self.handlers
                    .iter_mut()
                    .for_each(|h| h.on_mouse_button_up(b, x, y));
            }
        }
    }
}
