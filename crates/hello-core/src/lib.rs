// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use glam::Mat4;
use std::path::Path;

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}

/// Reads a whole file into memory.
///
/// I/O errors are logged and reported as an empty buffer, so callers must
/// treat an empty result as a failure.
pub fn read_binary_file(path: impl AsRef<Path>) -> Vec<u8> {
    let path = path.as_ref();
    match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("could not open \"{}\": {e}", path.display());
            Vec::new()
        }
    }
}

/// Decoded pixels, always 8-bit RGBA, row-major from the top-left.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Image {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Decodes an image file (PNG and the other formats `image` knows) into
/// RGBA8. Failures are logged and reported as `None`.
pub fn read_image(path: impl AsRef<Path>) -> Option<Image> {
    let path = path.as_ref();
    let decoded = image::ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(image::ImageError::IoError)
        .and_then(|r| r.decode());
    match decoded {
        Ok(img) => {
            let rgba = img.to_rgba8();
            Some(Image {
                width: rgba.width(),
                height: rgba.height(),
                data: rgba.into_raw(),
            })
        }
        Err(e) => {
            tracing::warn!("could not read image \"{}\": {e}", path.display());
            None
        }
    }
}

/// Orthographic projection for Vulkan clip space: `top` maps to y = -1,
/// `bottom` to y = 1, and view depth `-near..-far` to `0..1`.
pub fn orthographic_projection(
    left: f32,
    right: f32,
    top: f32,
    bottom: f32,
    near: f32,
    far: f32,
) -> Mat4 {
    // glam's y axis points up; swapping the edges flips it for Vulkan.
    Mat4::orthographic_rh(left, right, top, bottom, near, far)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn reads_existing_file() {
        let path = std::env::temp_dir().join(format!("hello-core-read-{}.bin", std::process::id()));
        std::fs::write(&path, [1u8, 2, 3, 4]).unwrap();
        assert_eq!(read_binary_file(&path), vec![1, 2, 3, 4]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_is_empty() {
        let path = std::env::temp_dir().join("hello-core-definitely-missing.spv");
        assert!(read_binary_file(path).is_empty());
    }

    #[test]
    fn init_tracing_twice_is_harmless() {
        init_tracing();
        init_tracing();
    }

    #[test]
    fn png_decodes_to_rgba8() {
        let path = std::env::temp_dir().join(format!("hello-core-img-{}.png", std::process::id()));
        let rgb = image::RgbImage::from_raw(2, 1, vec![255, 0, 0, 0, 0, 255]).unwrap();
        rgb.save(&path).unwrap();

        let img = read_image(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!((img.width, img.height), (2, 1));
        assert_eq!(img.size(), 8);
        assert_eq!(img.data, [255, 0, 0, 255, 0, 0, 255, 255]);
    }

    #[test]
    fn unreadable_images_are_none() {
        assert!(read_image(std::env::temp_dir().join("hello-core-missing.png")).is_none());

        let path = std::env::temp_dir().join(format!("hello-core-junk-{}.png", std::process::id()));
        std::fs::write(&path, b"not an image").unwrap();
        let img = read_image(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(img.is_none());
    }

    #[test]
    fn ortho_maps_box_corners() {
        let m = orthographic_projection(0.0, 800.0, 0.0, 600.0, 0.0, 1.0);
        let cases = [
            (Vec3::new(0.0, 0.0, 0.0), Vec3::new(-1.0, -1.0, 0.0)),
            (Vec3::new(800.0, 600.0, -1.0), Vec3::new(1.0, 1.0, 1.0)),
            (Vec3::new(400.0, 300.0, -0.5), Vec3::new(0.0, 0.0, 0.5)),
        ];
        for (point, want) in cases {
            let got = m.project_point3(point);
            assert!(got.abs_diff_eq(want, 1e-6), "{point} -> {got}, want {want}");
        }
        assert!((m.x_axis.x - 2.0 / 800.0).abs() < 1e-9);
        assert!((m.y_axis.y - 2.0 / 600.0).abs() < 1e-9);
    }
}
