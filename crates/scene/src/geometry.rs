//! Static meshes. Uploaded once and shared read-only by every frame.

/// Unit cube: 8 shared corners, 36 counter-clockwise indices.
pub struct CubeMesh {
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u16>,
}

/// Triangle read through the resource table. Entries are padded to 16 bytes
/// so they match the stride of a `vec3` storage array.
pub struct TriangleMesh {
    pub positions: Vec<[f32; 4]>,
    pub colors: Vec<[f32; 4]>,
}

impl TriangleMesh {
    pub fn vertex_count(&self) -> u32 {
        self.positions.len() as u32
    }
}

pub fn cube_mesh() -> CubeMesh {
    let s = 0.5_f32;
    #[rustfmt::skip]
    let positions = vec![
        [-s, -s,  s],
        [ s, -s,  s],
        [ s,  s,  s],
        [-s,  s,  s],

        [-s, -s, -s],
        [-s,  s, -s],
        [ s,  s, -s],
        [ s, -s, -s],
    ];
    #[rustfmt::skip]
    let indices: Vec<u16> = vec![
        0, 1, 2,  2, 3, 0, // front
        1, 7, 6,  6, 2, 1, // right
        7, 4, 5,  5, 6, 7, // back
        4, 0, 3,  3, 5, 4, // left
        3, 2, 6,  6, 5, 3, // top
        4, 7, 1,  1, 0, 4, // bottom
    ];
    CubeMesh { positions, indices }
}

pub fn triangle_mesh() -> TriangleMesh {
    TriangleMesh {
        positions: vec![
            [-0.8, 0.8, 0.0, 1.0],
            [0.0, -0.8, 0.0, 1.0],
            [0.8, 0.8, 0.0, 1.0],
        ],
        colors: vec![
            [1.0, 0.3, 0.2, 1.0],
            [0.8, 1.0, 0.0, 1.0],
            [0.8, 0.0, 1.0, 1.0],
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
        [
            a[1] * b[2] - a[2] * b[1],
            a[2] * b[0] - a[0] * b[2],
            a[0] * b[1] - a[1] * b[0],
        ]
    }

    fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
        [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
    }

    #[test]
    fn cube_indices_are_in_range() {
        let cube = cube_mesh();
        assert_eq!(cube.indices.len(), 36);
        assert!(cube.indices.iter().all(|&i| (i as usize) < cube.positions.len()));
    }

    #[test]
    fn cube_faces_wind_counter_clockwise_outward() {
        let cube = cube_mesh();
        for tri in cube.indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|k| cube.positions[tri[k] as usize]);
            let n = cross(sub(b, a), sub(c, a));
            let centroid = [
                (a[0] + b[0] + c[0]) / 3.0,
                (a[1] + b[1] + c[1]) / 3.0,
                (a[2] + b[2] + c[2]) / 3.0,
            ];
            let outward = n[0] * centroid[0] + n[1] * centroid[1] + n[2] * centroid[2];
            assert!(outward > 0.0, "triangle {tri:?} faces inward");
        }
    }

    #[test]
    fn triangle_streams_agree() {
        let tri = triangle_mesh();
        assert_eq!(tri.vertex_count(), 3);
        assert_eq!(tri.colors.len(), tri.positions.len());
    }
}
