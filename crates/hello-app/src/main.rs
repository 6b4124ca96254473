// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::{Context, Result};
use clap::Parser;
use hello_core::init_tracing;
use hello_platform::{create_window, MouseButton, WindowConfig, WindowEventHandler, WindowState};
use hello_render::{RenderDesc, RenderSize, Renderer};
use hello_render_vk::VkRenderer;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info};

use hello_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

mod config;

/// How long the loop sleeps while there is nothing to draw.
const IDLE_WAIT: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(long, default_value = "hello.toml")]
    config: PathBuf,
    /// Window title, overrides the configuration
    #[arg(long)]
    title: Option<String>,
}

struct ClickLogger;

impl WindowEventHandler for ClickLogger {
    fn on_mouse_button_down(&mut self, button: MouseButton, x: i32, y: i32) {
        if button == MouseButton::Left {
            info!("left button down at {x} {y}");
        }
    }
}

// Field order: the renderer must go before the window it draws into.
struct App<R: Renderer> {
    renderer: Option<R>,
    window: Option<Window>,
    state: WindowState,
    window_cfg: WindowConfig,
    desc: RenderDesc,
    fatal: Option<anyhow::Error>,
    frames: u32,
    last_fps_instant: Instant,
}

impl<R: Renderer> App<R> {
    fn new(window_cfg: WindowConfig, desc: RenderDesc) -> Self {
        let mut state = WindowState::new();
        state.add_handler(Box::new(ClickLogger));
        App {
            renderer: None,
            window: None,
            state,
            window_cfg,
            desc,
            fatal: None,
            frames: 0,
            last_fps_instant: Instant::now(),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = create_window(event_loop, &self.window_cfg)?;
        let size = window.inner_size();
        let renderer = R::new(
            &window,
            &window,
            RenderSize {
                width: size.width,
                height: size.height,
            },
            &self.desc,
        )
        .context("renderer initialization failed")?;
        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    /// One loop iteration: service a pending resize, then draw if possible.
    /// Returns whether a frame was drawn.
    fn step(&mut self) -> Result<bool> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(false);
        };
        if self.state.is_resize_requested() {
            let (width, height) = self.state.size();
            renderer.resize(RenderSize { width, height })?;
        }
        if !renderer.ready_to_draw() {
            return Ok(false);
        }
        renderer.render()?;
        Ok(true)
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }
}

impl<R: Renderer> ApplicationHandler for App<R> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            error!("{e:#}");
            self.fatal = Some(e);
            self.shutdown(event_loop);
        }
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }
        self.state.handle_window_event(&event);
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_close_requested() {
            info!("close requested");
            self.shutdown(event_loop);
            return;
        }

        match self.step() {
            Ok(true) => {
                self.frames = self.frames.saturating_add(1);
                event_loop.set_control_flow(ControlFlow::Poll);
            }
            Ok(false) => {
                event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + IDLE_WAIT));
            }
            Err(e) => {
                error!("stopping: {e:#}");
                self.fatal = Some(e);
                self.shutdown(event_loop);
                return;
            }
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            if self.frames > 0 {
                info!("fps ~ {}", self.frames);
            }
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let cfg = config::load_cfg(&args.config);
    let mut window_cfg = WindowConfig::from(&cfg.window);
    if let Some(title) = args.title {
        window_cfg.title = title;
    }
    let desc = cfg
        .render
        .to_desc()
        .with_context(|| format!("invalid vertex data in {}", args.config.display()))?;

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::<VkRenderer>::new(window_cfg, desc);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
