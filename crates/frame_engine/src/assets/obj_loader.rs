//! Wavefront OBJ loading into deduplicated mesh build data
//!
//! Parsing is delegated to `tobj`, which yields flat attribute arrays and
//! separate position/normal/texcoord index streams per model. Every index
//! triple is assembled into a [`Vertex`] and the resulting stream is
//! deduplicated by [`MeshBuilder::from_vertex_stream`].

use std::io::BufRead;
use std::path::Path;

use crate::assets::MeshError;
use crate::render::mesh::{MeshBuilder, Vertex};

/// Color of vertices without a color entry
const DEFAULT_COLOR: [f32; 3] = [1.0, 1.0, 1.0];

/// Flat attribute arrays of one parsed model
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjAttributes<'a> {
    /// xyz per position
    pub positions: &'a [f32],
    /// rgb per position, may be shorter than `positions` or empty
    pub colors: &'a [f32],
    /// xyz per normal
    pub normals: &'a [f32],
    /// uv per texture coordinate
    pub texcoords: &'a [f32],
}

/// Indices of one face corner into the attribute arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexTriple {
    /// Position index
    pub vertex: Option<u32>,
    /// Normal index
    pub normal: Option<u32>,
    /// Texture coordinate index
    pub texcoord: Option<u32>,
}

/// Build one vertex from a face corner
///
/// Absent indices leave the matching fields zero. The color is looked up
/// with the position index: for `ci = 3 * vi + 2` the color is
/// `colors[ci - 2..=ci]` when `ci` is in range, else white. A corner
/// without a position gets neither a position nor a color.
pub fn assemble_vertex(attributes: &ObjAttributes<'_>, index: IndexTriple) -> Vertex {
    let mut vertex = Vertex::default();

    if let Some(vi) = index.vertex {
        let base = 3 * vi as usize;
        vertex.position = read3(attributes.positions, base);

        let color_index = base + 2;
        vertex.color = if color_index < attributes.colors.len() {
            read3(attributes.colors, color_index - 2)
        } else {
            DEFAULT_COLOR
        };
    }

    if let Some(ni) = index.normal {
        vertex.normal = read3(attributes.normals, 3 * ni as usize);
    }

    if let Some(ti) = index.texcoord {
        let base = 2 * ti as usize;
        if let Some(uv) = attributes.texcoords.get(base..base + 2) {
            vertex.uv = [uv[0], uv[1]];
        }
    }

    vertex
}

fn read3(values: &[f32], base: usize) -> [f32; 3] {
    values
        .get(base..base + 3)
        .map_or([0.0; 3], |v| [v[0], v[1], v[2]])
}

/// OBJ loader producing [`MeshBuilder`] data
pub struct ObjLoader;

impl ObjLoader {
    fn load_options() -> tobj::LoadOptions {
        tobj::LoadOptions {
            triangulate: true,
            single_index: false,
            ignore_points: true,
            ignore_lines: true,
            ..Default::default()
        }
    }

    /// Load and deduplicate an OBJ file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<MeshBuilder, MeshError> {
        let path = path.as_ref();
        let (models, _materials) = tobj::load_obj(path, &Self::load_options())?;
        let builder = Self::build(&models)?;

        log::debug!(
            "Parsed {}: {} models, {} unique vertices, {} indices",
            path.display(),
            models.len(),
            builder.vertices.len(),
            builder.indices.len()
        );
        Ok(builder)
    }

    /// Load and deduplicate OBJ text from a reader; material libraries are ignored
    pub fn load_from_reader<R: BufRead>(reader: &mut R) -> Result<MeshBuilder, MeshError> {
        let (models, _materials) =
            tobj::load_obj_buf(reader, &Self::load_options(), |_| Ok(Default::default()))?;
        Self::build(&models)
    }

    fn build(models: &[tobj::Model]) -> Result<MeshBuilder, MeshError> {
        let stream = models.iter().flat_map(|model| {
            let mesh = &model.mesh;
            let attributes = ObjAttributes {
                positions: &mesh.positions,
                colors: &mesh.vertex_color,
                normals: &mesh.normals,
                texcoords: &mesh.texcoords,
            };

            (0..mesh.indices.len()).map(move |corner| {
                let index = IndexTriple {
                    vertex: mesh.indices.get(corner).copied(),
                    normal: mesh.normal_indices.get(corner).copied(),
                    texcoord: mesh.texcoord_indices.get(corner).copied(),
                };
                assemble_vertex(&attributes, index)
            })
        });

        let builder = MeshBuilder::from_vertex_stream(stream);
        if builder.indices.is_empty() {
            return Err(MeshError::NoGeometry);
        }
        Ok(builder)
    }
}
