//! Static full-viewport quad shared by every backend.

/// Vertices drawn per frame: two triangles, no index buffer.
pub const QUAD_VERTEX_COUNT: u32 = 6;

/// Shader attribute location of the position stream.
pub const POSITION_LOCATION: u32 = 0;
/// Shader attribute location of the texture-coordinate stream.
pub const TEX_COORD_LOCATION: u32 = 1;

/// Clip-space positions covering `[-1, 1]²`.
pub const QUAD_POSITIONS: [[f32; 2]; 6] = [
    [-1.0, -1.0],
    [1.0, -1.0],
    [-1.0, 1.0],
    [-1.0, 1.0],
    [1.0, -1.0],
    [1.0, 1.0],
];

/// Texture coordinates flipped vertically so image row 0 lands at the top.
pub const QUAD_TEX_COORDS: [[f32; 2]; 6] = [
    [0.0, 1.0],
    [1.0, 1.0],
    [0.0, 0.0],
    [0.0, 0.0],
    [1.0, 1.0],
    [1.0, 0.0],
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tex_coords_flip_clip_space_vertically() {
        for (position, tex_coord) in QUAD_POSITIONS.iter().zip(QUAD_TEX_COORDS.iter()) {
            let u = (position[0] + 1.0) * 0.5;
            let v = (1.0 - position[1]) * 0.5;
            assert_eq!([u, v], *tex_coord);
        }
    }

    #[test]
    fn quad_is_two_triangles() {
        assert_eq!(QUAD_POSITIONS.len(), QUAD_VERTEX_COUNT as usize);
        assert_eq!(QUAD_TEX_COORDS.len(), QUAD_VERTEX_COUNT as usize);
    }
}
