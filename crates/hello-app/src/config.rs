// SPDX-License-Identifier: CEPL-1.0
use hello_platform::WindowConfig;
use hello_render::{vertices_from_floats, PayloadError, RenderDesc};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderCfg,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        let WindowConfig {
            title,
            x,
            y,
            width,
            height,
        } = WindowConfig::default();
        Self {
            title,
            x,
            y,
            width,
            height,
        }
    }
}

impl From<&WindowCfg> for WindowConfig {
    fn from(w: &WindowCfg) -> Self {
        WindowConfig {
            title: w.title.clone(),
            x: w.x,
            y: w.y,
            width: w.width,
            height: w.height,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 3],
    /// Interleaved position (x, y, z, w) and color (r, g, b, a) per vertex.
    pub vertices: Vec<f32>,
    pub shader_dir: Option<PathBuf>,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            vertices: default_vertices(),
            shader_dir: None,
        }
    }
}

impl RenderCfg {
    pub fn to_desc(&self) -> Result<RenderDesc, PayloadError> {
        Ok(RenderDesc {
            vertices: vertices_from_floats(&self.vertices)?,
            clear_color: self.clear_color,
            shader_dir: self.shader_dir.clone(),
        })
    }
}

fn default_clear() -> [f32; 3] {
    [0.0, 0.3, 0.4]
}

#[rustfmt::skip]
fn default_vertices() -> Vec<f32> {
    vec![
        -0.7, -0.7, 0.0, 1.0,   1.0, 0.0, 0.0, 1.0,
        -0.7,  0.7, 0.0, 1.0,   0.0, 1.0, 0.0, 1.0,
         0.7, -0.7, 0.0, 1.0,   0.0, 0.0, 1.0, 1.0,
         0.7,  0.7, 0.0, 1.0,   0.3, 0.3, 0.3, 1.0,
    ]
}

pub fn parse_cfg(s: &str) -> Result<AppCfg, toml::de::Error> {
    toml::from_str(s)
}

pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => parse_cfg(&s).unwrap_or_else(|e| {
            warn!("{} is malformed, using defaults: {e}", path.display());
            AppCfg::default()
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("{} not found, using defaults", path.display());
            AppCfg::default()
        }
        Err(e) => {
            warn!("could not read {}, using defaults: {e}", path.display());
            AppCfg::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = parse_cfg("").unwrap();
        assert_eq!(cfg, AppCfg::default());
        assert_eq!(cfg.window.title, "Hello");
        assert_eq!((cfg.window.x, cfg.window.y), (20, 20));
        assert_eq!((cfg.window.width, cfg.window.height), (500, 500));
        assert_eq!(cfg.render.clear_color, [0.0, 0.3, 0.4]);
        assert_eq!(cfg.render.to_desc().unwrap().vertices.len(), 4);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse_cfg(
            r#"
            [window]
            title = "Triangle"
            width = 800

            [render]
            clear_color = [1.0, 1.0, 1.0]
            vertices = [
                0.0, -0.5, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0,
                0.5,  0.5, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0,
               -0.5,  0.5, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0,
            ]
            shader_dir = "shaders"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.window.title, "Triangle");
        assert_eq!(cfg.window.width, 800);
        assert_eq!(cfg.window.height, 500);

        let desc = cfg.render.to_desc().unwrap();
        assert_eq!(desc.vertices.len(), 3);
        assert_eq!(desc.clear_color, [1.0, 1.0, 1.0]);
        assert_eq!(desc.shader_dir.as_deref(), Some(Path::new("shaders")));

        let w = WindowConfig::from(&cfg.window);
        assert_eq!(w.title, "Triangle");
        assert_eq!(w.x, 20);
    }

    #[test]
    fn bad_vertex_payload_is_rejected() {
        let cfg = parse_cfg("[render]\nvertices = [1.0, 2.0, 3.0]").unwrap();
        assert_eq!(cfg.render.to_desc().unwrap_err(), PayloadError::Stride(3));

        let cfg = parse_cfg("[render]\nvertices = []").unwrap();
        assert_eq!(cfg.render.to_desc().unwrap_err(), PayloadError::Empty);
    }

    #[test]
    fn malformed_or_missing_file_falls_back() {
        assert!(parse_cfg("[window]\nwidth = \"wide\"").is_err());

        let dir = std::env::temp_dir();
        let missing = dir.join("hello-app-definitely-missing.toml");
        assert_eq!(load_cfg(&missing), AppCfg::default());

        let bad = dir.join(format!("hello-app-bad-{}.toml", std::process::id()));
        fs::write(&bad, "[render\nclear_color = ").unwrap();
        let cfg = load_cfg(&bad);
        fs::remove_file(&bad).ok();
        assert_eq!(cfg, AppCfg::default());
    }
}
