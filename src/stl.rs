use std::{
    collections::HashMap,
    io::Write,
    path::Path,
};

use nalgebra::Vector3;

use crate::{error::EmbedfemError, mesh::TriangleMesh};

/// Vertices closer than this are merged while reading
pub const VERTEX_SNAP_TOLERANCE: f64 = 1e-10;

const BINARY_HEADER_LEN: usize = 80;
const BINARY_FACET_LEN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StlFormat {
    Ascii,
    Binary,
}

#[derive(Clone, Copy)]
enum FacetParseState {
    Limbo,
    Facet,
    Loop,
}

/// Merges coincident vertices while a mesh is being read
struct VertexWelder {
    indices: HashMap<[i64; 3], usize>,
}

impl VertexWelder {
    fn new() -> VertexWelder {
        VertexWelder {
            indices: HashMap::new(),
        }
    }

    fn insert(&mut self, mesh: &mut TriangleMesh, vertex: Vector3<f64>) -> usize {
        let key = [
            (vertex.x / VERTEX_SNAP_TOLERANCE).round() as i64,
            (vertex.y / VERTEX_SNAP_TOLERANCE).round() as i64,
            (vertex.z / VERTEX_SNAP_TOLERANCE).round() as i64,
        ];
        *self
            .indices
            .entry(key)
            .or_insert_with(|| mesh.add_vertex(vertex))
    }
}

fn parse_vector<'a, I>(tokens: I, line_number: usize, filename: &str) -> Result<Vector3<f64>, EmbedfemError>
where
    I: Iterator<Item = &'a str>,
{
    let values: Vec<f64> = tokens
        .map(|t| t.parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|err| {
            EmbedfemError::Mesh(format!(
                "Non-float value in {filename} at line {line_number}: {err}"
            ))
        })?;

    if values.len() != 3 {
        return Err(EmbedfemError::Mesh(format!(
            "Expected 3 components in {filename} at line {line_number}, found {}",
            values.len()
        )));
    }

    Ok(Vector3::new(values[0], values[1], values[2]))
}

/// Parses the text of an ASCII STL file
///
/// # Arguments
/// * `contents` - The file contents
/// * `filename` - Used in error messages
fn parse_ascii(contents: &str, filename: &str) -> Result<TriangleMesh, EmbedfemError> {
    let mut mesh = TriangleMesh::new();
    let mut welder = VertexWelder::new();

    let mut state = FacetParseState::Limbo;
    let mut normal = Vector3::zeros();
    let mut corners: Vec<usize> = Vec::with_capacity(3);

    for (i, line) in contents.lines().enumerate() {
        let line_number = i + 1;
        let mut tokens = line.split_whitespace();
        let keyword = match tokens.next() {
            Some(k) => k,
            None => continue,
        };

        match (state, keyword) {
            (FacetParseState::Limbo, "solid") | (FacetParseState::Limbo, "endsolid") => continue,
            (FacetParseState::Limbo, "facet") => {
                if tokens.next() != Some("normal") {
                    return Err(EmbedfemError::Mesh(format!(
                        "Missing normal in {filename} at line {line_number}"
                    )));
                }
                normal = parse_vector(tokens, line_number, filename)?;
                state = FacetParseState::Facet;
            }
            (FacetParseState::Facet, "outer") => {
                corners.clear();
                state = FacetParseState::Loop;
            }
            (FacetParseState::Loop, "vertex") => {
                let vertex = parse_vector(tokens, line_number, filename)?;
                corners.push(welder.insert(&mut mesh, vertex));
            }
            (FacetParseState::Loop, "endloop") => {
                if corners.len() != 3 {
                    return Err(EmbedfemError::Mesh(format!(
                        "Facet ending at line {line_number} in {filename} has {} vertices. Only triangles are supported",
                        corners.len()
                    )));
                }
                mesh.add_triangle([corners[0], corners[1], corners[2]], normal)?;
                state = FacetParseState::Facet;
            }
            (FacetParseState::Facet, "endfacet") => state = FacetParseState::Limbo,
            _ => {
                return Err(EmbedfemError::Mesh(format!(
                    "Unexpected '{keyword}' in {filename} at line {line_number}"
                )))
            }
        }
    }

    Ok(mesh)
}

fn read_f32_triplet(bytes: &[u8]) -> Vector3<f64> {
    let component = |i: usize| {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[4 * i..4 * i + 4]);
        f32::from_le_bytes(raw) as f64
    };
    Vector3::new(component(0), component(1), component(2))
}

fn binary_facet_count(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < BINARY_HEADER_LEN + 4 {
        return None;
    }
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[BINARY_HEADER_LEN..BINARY_HEADER_LEN + 4]);
    let count = u32::from_le_bytes(raw) as usize;

    if bytes.len() == BINARY_HEADER_LEN + 4 + count * BINARY_FACET_LEN {
        Some(count)
    } else {
        None
    }
}

fn parse_binary(bytes: &[u8], count: usize) -> Result<TriangleMesh, EmbedfemError> {
    let mut mesh = TriangleMesh::new();
    let mut welder = VertexWelder::new();

    for facet in bytes[BINARY_HEADER_LEN + 4..]
        .chunks_exact(BINARY_FACET_LEN)
        .take(count)
    {
        let normal = read_f32_triplet(&facet[0..12]);
        let a = welder.insert(&mut mesh, read_f32_triplet(&facet[12..24]));
        let b = welder.insert(&mut mesh, read_f32_triplet(&facet[24..36]));
        let c = welder.insert(&mut mesh, read_f32_triplet(&facet[36..48]));
        mesh.add_triangle([a, b, c], normal)?;
    }

    Ok(mesh)
}

/// Reads a triangle mesh from an ASCII or binary STL file
///
/// # Arguments
/// * `path` - The path to the STL file
///
/// # Returns
/// The mesh with coincident vertices merged
pub fn read_stl<P: AsRef<Path>>(path: P) -> Result<TriangleMesh, EmbedfemError> {
    let path = path.as_ref();
    let filename = path.display().to_string();

    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(err) => {
            return Err(EmbedfemError::Input(format!(
                "Unable to open stl file {filename}: {err}"
            )))
        }
    };

    let mesh = if let Some(count) = binary_facet_count(&bytes) {
        parse_binary(&bytes, count)?
    } else if bytes.starts_with(b"solid") {
        let contents = String::from_utf8_lossy(&bytes);
        parse_ascii(&contents, &filename)?
    } else {
        return Err(EmbedfemError::Mesh(format!(
            "{filename} is neither an ASCII nor a binary stl file"
        )));
    };

    log::debug!(
        "read {} triangles and {} vertices from {}",
        mesh.num_triangles(),
        mesh.num_vertices(),
        filename
    );

    Ok(mesh)
}

/// Serializes a mesh into STL bytes
pub fn encode_stl(mesh: &TriangleMesh, format: StlFormat) -> Vec<u8> {
    match format {
        StlFormat::Ascii => {
            let mut out = String::from("solid embedfem\n");
            for id in 0..mesh.num_triangles() {
                let n = mesh.normal(id);
                out.push_str(&format!("facet normal {} {} {}\nouter loop\n", n.x, n.y, n.z));
                for p in mesh.corners(id) {
                    out.push_str(&format!("vertex {} {} {}\n", p.x, p.y, p.z));
                }
                out.push_str("endloop\nendfacet\n");
            }
            out.push_str("endsolid embedfem\n");
            out.into_bytes()
        }
        StlFormat::Binary => {
            let mut out =
                Vec::with_capacity(BINARY_HEADER_LEN + 4 + mesh.num_triangles() * BINARY_FACET_LEN);
            let mut header = [b' '; BINARY_HEADER_LEN];
            header[..16].copy_from_slice(b"FileType: Binary");
            out.extend_from_slice(&header);
            out.extend_from_slice(&(mesh.num_triangles() as u32).to_le_bytes());

            for id in 0..mesh.num_triangles() {
                let [p1, p2, p3] = mesh.corners(id);
                for v in [mesh.normal(id), p1, p2, p3] {
                    for c in v.iter() {
                        out.extend_from_slice(&(*c as f32).to_le_bytes());
                    }
                }
                out.extend_from_slice(&[0u8; 2]);
            }
            out
        }
    }
}

/// Writes a triangle mesh to an STL file
///
/// # Arguments
/// * `mesh` - The mesh to write
/// * `path` - The output path
/// * `format` - ASCII or binary
pub fn write_stl<P: AsRef<Path>>(
    mesh: &TriangleMesh,
    path: P,
    format: StlFormat,
) -> Result<(), EmbedfemError> {
    let path = path.as_ref();

    let mut file = match std::fs::File::create(path) {
        Ok(f) => f,
        Err(err) => {
            return Err(EmbedfemError::Mesh(format!(
                "Failed to create {}: {err}",
                path.display()
            )))
        }
    };

    if let Err(err) = file.write_all(&encode_stl(mesh, format)) {
        return Err(EmbedfemError::Mesh(format!(
            "Failed to write {}: {err}",
            path.display()
        )));
    }

    log::debug!(
        "wrote {} triangles to {}",
        mesh.num_triangles(),
        path.display()
    );

    Ok(())
}
