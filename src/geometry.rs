use std::collections::HashMap;

use glam::{Mat3, Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when geometry is handed to a layout it cannot fill.
#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("geometry has no tangents; call compute_tangents first")]
    MissingTangents,
    #[error("geometry must be indexed")]
    NotIndexed,
}

/// Vertex layouts understood by the renderer's pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexLayout {
    /// `position.xyz`, `normal.xyz`.
    PositionNormal,
    /// `position.xyz`, `normal.xyz`, `tangent.xyzw`.
    PositionNormalTangent,
}

impl VertexLayout {
    pub fn floats_per_vertex(self) -> usize {
        match self {
            VertexLayout::PositionNormal => 6,
            VertexLayout::PositionNormalTangent => 10,
        }
    }
}

/// Triangle mesh data. An empty `indices` list means every three vertices
/// form a triangle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// Tangent in `xyz`, handedness in `w`.
    pub tangents: Vec<Vec4>,
    pub indices: Vec<u32>,
}

const ICOSAHEDRON_INDICES: [[usize; 3]; 20] = [
    [0, 11, 5],
    [0, 5, 1],
    [0, 1, 7],
    [0, 7, 10],
    [0, 10, 11],
    [1, 5, 9],
    [5, 11, 4],
    [11, 10, 2],
    [10, 7, 6],
    [7, 1, 8],
    [3, 9, 4],
    [3, 4, 2],
    [3, 2, 6],
    [3, 6, 8],
    [3, 8, 9],
    [4, 9, 5],
    [2, 4, 11],
    [6, 2, 10],
    [8, 6, 7],
    [9, 8, 1],
];

fn icosahedron_corners() -> [Vec3; 12] {
    let t = (1.0 + 5.0f32.sqrt()) / 2.0;
    [
        Vec3::new(-1.0, t, 0.0),
        Vec3::new(1.0, t, 0.0),
        Vec3::new(-1.0, -t, 0.0),
        Vec3::new(1.0, -t, 0.0),
        Vec3::new(0.0, -1.0, t),
        Vec3::new(0.0, 1.0, t),
        Vec3::new(0.0, -1.0, -t),
        Vec3::new(0.0, 1.0, -t),
        Vec3::new(t, 0.0, -1.0),
        Vec3::new(t, 0.0, 1.0),
        Vec3::new(-t, 0.0, -1.0),
        Vec3::new(-t, 0.0, 1.0),
    ]
}

impl Geometry {
    /// Subdivided icosahedron projected onto a sphere of `radius`.
    ///
    /// Each of the 20 faces is split into `(detail + 1)^2` triangles. The
    /// result is non-indexed: vertices on shared edges are duplicated, exactly
    /// like a face-by-face polyhedron generator emits them.
    pub fn icosahedron(radius: f32, detail: u32) -> Self {
        let corners = icosahedron_corners();
        let cols = detail as usize + 1;
        let mut positions = Vec::with_capacity(20 * cols * cols * 3);

        for [a, b, c] in ICOSAHEDRON_INDICES {
            subdivide_face(corners[a], corners[b], corners[c], cols, &mut positions);
        }

        for position in &mut positions {
            *position = position.normalize() * radius;
        }
        let normals = positions.iter().map(|p| p.normalize()).collect();

        Self {
            positions,
            normals,
            tangents: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Flat plane in the XY plane facing +Z, centred on the origin.
    pub fn plane(width: f32, height: f32, width_segments: u32, height_segments: u32) -> Self {
        let grid_x = width_segments.max(1);
        let grid_y = height_segments.max(1);
        let segment_width = width / grid_x as f32;
        let segment_height = height / grid_y as f32;

        let mut positions = Vec::new();
        let mut normals = Vec::new();
        for iy in 0..=grid_y {
            let y = iy as f32 * segment_height - height / 2.0;
            for ix in 0..=grid_x {
                let x = ix as f32 * segment_width - width / 2.0;
                positions.push(Vec3::new(x, -y, 0.0));
                normals.push(Vec3::Z);
            }
        }

        let mut indices = Vec::new();
        let row = grid_x + 1;
        for iy in 0..grid_y {
            for ix in 0..grid_x {
                let a = ix + row * iy;
                let b = ix + row * (iy + 1);
                let c = (ix + 1) + row * (iy + 1);
                let d = (ix + 1) + row * iy;
                indices.extend_from_slice(&[a, b, d, b, c, d]);
            }
        }

        Self {
            positions,
            normals,
            tangents: Vec::new(),
            indices,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        if self.indices.is_empty() {
            self.positions.len() / 3
        } else {
            self.indices.len() / 3
        }
    }

    pub fn is_indexed(&self) -> bool {
        !self.indices.is_empty()
    }

    /// Collapses vertices whose position and normal agree within `tolerance`
    /// into one shared vertex and returns the indexed result.
    ///
    /// Candidates are bucketed on a grid of `tolerance` sized cells and
    /// compared against the neighbouring cells too, so two copies of a point
    /// that straddle a cell boundary still merge.
    pub fn merge_vertices(&self, tolerance: f32) -> Self {
        let tolerance = tolerance.max(f32::EPSILON);
        let source_indices: Vec<u32> = if self.indices.is_empty() {
            (0..self.positions.len() as u32).collect()
        } else {
            self.indices.clone()
        };

        let mut grid: HashMap<[i64; 3], Vec<u32>> = HashMap::new();
        let mut remap: Vec<Option<u32>> = vec![None; self.positions.len()];
        let mut merged = Geometry::default();
        let has_tangents = self.tangents.len() == self.positions.len();

        for (source, position) in self.positions.iter().enumerate() {
            let normal = self.normals.get(source).copied().unwrap_or(Vec3::ZERO);
            let cell = grid_cell(*position, tolerance);

            let existing = neighbour_cells(cell).find_map(|neighbour| {
                grid.get(&neighbour)?.iter().copied().find(|&candidate| {
                    let candidate = candidate as usize;
                    merged.positions[candidate].distance(*position) <= tolerance
                        && merged.normals[candidate].distance(normal) <= tolerance
                })
            });

            let target = match existing {
                Some(index) => index,
                None => {
                    let index = merged.positions.len() as u32;
                    merged.positions.push(*position);
                    merged.normals.push(normal);
                    if has_tangents {
                        merged.tangents.push(self.tangents[source]);
                    }
                    grid.entry(cell).or_default().push(index);
                    index
                }
            };
            remap[source] = Some(target);
        }

        merged.indices = source_indices
            .iter()
            .filter_map(|&index| remap.get(index as usize).copied().flatten())
            .collect();
        merged
    }

    /// Builds a per-vertex tangent basis orthogonal to each normal.
    ///
    /// Tangents follow the longitude direction of a spherical parameterisation
    /// (`up x normal`), falling back to the X axis near the poles. The basis is
    /// seamless, which the finite-difference normal rebuild depends on.
    pub fn compute_tangents(&mut self) {
        self.tangents = self
            .normals
            .iter()
            .map(|normal| {
                let reference = if normal.y.abs() > 0.999 { Vec3::X } else { Vec3::Y };
                let tangent = reference.cross(*normal);
                let tangent = (tangent - *normal * normal.dot(tangent)).normalize_or_zero();
                tangent.extend(1.0)
            })
            .collect();
    }

    /// Applies an affine transform to positions, normals and tangents.
    pub fn transformed(&self, transform: Mat4) -> Self {
        let normal_matrix = Mat3::from_mat4(transform).inverse().transpose();
        Self {
            positions: self
                .positions
                .iter()
                .map(|p| transform.transform_point3(*p))
                .collect(),
            normals: self
                .normals
                .iter()
                .map(|n| (normal_matrix * *n).normalize_or_zero())
                .collect(),
            tangents: self
                .tangents
                .iter()
                .map(|t| {
                    transform
                        .transform_vector3(t.truncate())
                        .normalize_or_zero()
                        .extend(t.w)
                })
                .collect(),
            indices: self.indices.clone(),
        }
    }

    /// Interleaves vertex attributes for upload.
    pub fn vertex_data(&self, layout: VertexLayout) -> Result<Vec<f32>, GeometryError> {
        if layout == VertexLayout::PositionNormalTangent
            && self.tangents.len() != self.positions.len()
        {
            return Err(GeometryError::MissingTangents);
        }
        let mut data = Vec::with_capacity(self.positions.len() * layout.floats_per_vertex());
        for (index, position) in self.positions.iter().enumerate() {
            let normal = self.normals.get(index).copied().unwrap_or(Vec3::Y);
            data.extend_from_slice(&position.to_array());
            data.extend_from_slice(&normal.to_array());
            if layout == VertexLayout::PositionNormalTangent {
                data.extend_from_slice(&self.tangents[index].to_array());
            }
        }
        Ok(data)
    }

    pub fn index_data(&self) -> Result<&[u32], GeometryError> {
        if self.indices.is_empty() {
            return Err(GeometryError::NotIndexed);
        }
        Ok(&self.indices)
    }
}

fn subdivide_face(a: Vec3, b: Vec3, c: Vec3, cols: usize, out: &mut Vec<Vec3>) {
    let mut rows: Vec<Vec<Vec3>> = Vec::with_capacity(cols + 1);
    for i in 0..=cols {
        let t = i as f32 / cols as f32;
        let aj = a.lerp(c, t);
        let bj = b.lerp(c, t);
        let count = cols - i;
        let row = (0..=count)
            .map(|j| {
                if j == 0 && i == cols {
                    aj
                } else {
                    aj.lerp(bj, j as f32 / count as f32)
                }
            })
            .collect();
        rows.push(row);
    }

    for i in 0..cols {
        for j in 0..(2 * (cols - i) - 1) {
            let k = j / 2;
            if j % 2 == 0 {
                out.extend_from_slice(&[rows[i][k + 1], rows[i + 1][k], rows[i][k]]);
            } else {
                out.extend_from_slice(&[rows[i][k + 1], rows[i + 1][k + 1], rows[i + 1][k]]);
            }
        }
    }
}

fn grid_cell(position: Vec3, tolerance: f32) -> [i64; 3] {
    let scaled = position / tolerance;
    [
        scaled.x.floor() as i64,
        scaled.y.floor() as i64,
        scaled.z.floor() as i64,
    ]
}

fn neighbour_cells(cell: [i64; 3]) -> impl Iterator<Item = [i64; 3]> {
    (-1..=1).flat_map(move |dx| {
        (-1..=1).flat_map(move |dy| {
            (-1..=1).map(move |dz| [cell[0] + dx, cell[1] + dy, cell[2] + dz])
        })
    })
}
