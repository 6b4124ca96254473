// SPDX-License-Identifier: CEPL-1.0
//! Draws on a real device into a real window. Needs a Vulkan driver and an
//! X11 display; run with `cargo test -- --ignored`.
#![cfg(all(unix, not(target_os = "macos")))]

use hello_render::{vertices_from_floats, RenderDesc, RenderSize, Renderer};
use hello_render_vk::VkRenderer;
use winit::dpi::PhysicalSize;
use winit::event_loop::EventLoop;
use winit::platform::x11::EventLoopBuilderExtX11;
use winit::window::Window;

#[rustfmt::skip]
const TRIANGLE: [f32; 24] = [
     0.0, -0.5, 0.0, 1.0,   1.0, 0.0, 0.0, 1.0,
     0.5,  0.5, 0.0, 1.0,   0.0, 1.0, 0.0, 1.0,
    -0.5,  0.5, 0.0, 1.0,   0.0, 0.0, 1.0, 1.0,
];

#[test]
#[ignore = "needs a Vulkan device and a display"]
#[allow(deprecated)]
fn triangle_survives_resize_cycle() {
    hello_core::init_tracing();

    let event_loop = EventLoop::builder().with_any_thread(true).build().unwrap();
    let window = event_loop
        .create_window(
            Window::default_attributes()
                .with_title("e2e")
                .with_inner_size(PhysicalSize::new(500, 500)),
        )
        .unwrap();

    let desc = RenderDesc {
        vertices: vertices_from_floats(&TRIANGLE).unwrap(),
        clear_color: [0.0, 0.3, 0.4],
        shader_dir: None,
    };
    let full = RenderSize {
        width: 500,
        height: 500,
    };
    let mut r = VkRenderer::new(&window, &window, full, &desc).unwrap();
    assert!(r.ready_to_draw());
    assert_eq!(r.vertex_count(), 4);

    r.render().unwrap();
    r.wait_idle().unwrap();
    assert!(r.slot_fence_signaled(0).unwrap());

    for _ in 0..5 {
        r.render().unwrap();
    }

    let recreations = r.recreation_count();
    let vertex_buffer = r.vertex_buffer();

    // X11 surfaces report the window's own extent, so a 0x0 hint on a mapped
    // window still rebuilds a full chain. The paused branch is covered by
    // the swap chain manager's unit tests.

    r.resize(RenderSize {
        width: 0,
        height: 0,
    })
    .unwrap();
    r.resize(full).unwrap();
    assert_eq!(r.recreation_count(), recreations + 2);

    assert!(r.ready_to_draw());
    for _ in 0..5 {
        r.render().unwrap();
    }
    assert_eq!(r.vertex_buffer(), vertex_buffer);
    r.wait_idle().unwrap();
}
