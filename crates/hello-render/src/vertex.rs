// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use thiserror::Error;

/// Position (vec4) followed by color (vec4).
pub const FLOATS_PER_VERTEX: usize = 8;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec4,
    pub color: Vec4,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("vertex payload is empty")]
    Empty,
    #[error("vertex payload has {0} floats, expected a multiple of {FLOATS_PER_VERTEX}")]
    Stride(usize),
}

/// Splits a flat, interleaved float array into vertices.
pub fn vertices_from_floats(data: &[f32]) -> Result<Vec<Vertex>, PayloadError> {
    if data.is_empty() {
        return Err(PayloadError::Empty);
    }
    if data.len() % FLOATS_PER_VERTEX != 0 {
        return Err(PayloadError::Stride(data.len()));
    }
    Ok(data
        .chunks_exact(FLOATS_PER_VERTEX)
        .map(|c| Vertex {
            position: Vec4::from_slice(&c[..4]),
            color: Vec4::from_slice(&c[4..]),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_eight_packed_floats() {
        assert_eq!(std::mem::size_of::<Vertex>(), FLOATS_PER_VERTEX * 4);
    }

    #[test]
    fn splits_interleaved_triangle() {
        let data = [
            0.0, -0.5, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, //
            0.5, 0.5, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, //
            -0.5, 0.5, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0,
        ];
        let v = vertices_from_floats(&data).unwrap();
        assert_eq!(v.len(), 3);
        assert_eq!(v[1].position, Vec4::new(0.5, 0.5, 0.0, 1.0));
        assert_eq!(v[2].color, Vec4::new(0.0, 0.0, 1.0, 1.0));

        let bytes: &[u8] = bytemuck::cast_slice(&v);
        let back: &[f32] = bytemuck::cast_slice(bytes);
        assert_eq!(back, &data[..]);
    }

    #[test]
    fn rejects_bad_payloads() {
        assert_eq!(vertices_from_floats(&[]), Err(PayloadError::Empty));
        assert_eq!(vertices_from_floats(&[0.0; 12]), Err(PayloadError::Stride(12)));
    }
}
