/// Wavefront OBJ parser for positions, vertex normals, triangle and quad faces.
///
/// Layer: **Geometry input**
/// Not a complete OBJ implementation: texture coordinates, materials and
/// groups are ignored, and every object in the file lands in one model.
/// Faces are triangulated into an index buffer, and normals end up indexed by
/// vertex (the last face to touch a vertex decides its normal).
use std::io::{BufReader, Read};

use tracing::{debug, warn};

use crate::error::{ModelError, ModelResult};
use crate::geometry::{calculate_normal, vertex_at, Accumulator, Vec3};
use crate::model::{Model, ModelFormat};
use crate::text::{parse_vec3, read_line_lossy};
use crate::INPUT_BUFFER_SIZE;

/// Quads split along the 0-2 diagonal.
const TRIANGLE: &[[usize; 3]] = &[[0, 1, 2]];
const QUAD: &[[usize; 3]] = &[[0, 1, 2], [0, 2, 3]];

/// Scan up to four integers out of a face token such as `12/7/3` without
/// allocating.
///
/// Digits accumulate into the current value; any other character stores the
/// current value (or `-1` when there is none) into the next slot. Slots that
/// are never written stay `-1`, so `"12//34"` gives `[12, -1, 34, -1]`.
/// Values past the fourth are dropped.
pub fn parse_ints(token: &str) -> [i32; 4] {
    let mut ints = [-1; 4];
    let mut slot = 0;
    let mut current: Option<i32> = None;

    for b in token.bytes() {
        if b.is_ascii_digit() {
            let d = (b - b'0') as i32;
            current = Some(current.map_or(d, |c| c.saturating_mul(10).saturating_add(d)));
        } else {
            if slot < ints.len() {
                ints[slot] = current.unwrap_or(-1);
            }
            slot += 1;
            current = None;
        }
    }
    if let (Some(c), true) = (current, slot < ints.len()) {
        ints[slot] = c;
    }
    ints
}

/// Parse state threaded through the line loop.
#[derive(Default)]
struct ObjBuilder {
    vertices: Vec<f32>,
    acc: Accumulator,
    normal_pool: Vec<Vec3>,
    indices: Vec<u32>,
    /// Normal pool index for each entry of `indices`.
    normal_indices: Vec<usize>,
    skipped_faces: usize,
}

impl ObjBuilder {
    fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    fn add_vertex(&mut self, v: Vec3) {
        v.push_to(&mut self.vertices);
        self.acc = self.acc.push(v);
    }

    fn add_face<'a, I>(&mut self, tokens: I) -> ModelResult<()>
    where
        I: Iterator<Item = &'a str>,
    {
        let mut scanned = [[-1i32; 4]; 4];
        let mut len = 0;
        for token in tokens {
            if len < scanned.len() {
                scanned[len] = parse_ints(token);
            }
            len += 1;
        }
        let pattern = match len {
            3 => TRIANGLE,
            4 => QUAD,
            _ => {
                self.skipped_faces += 1;
                return Ok(());
            }
        };

        let mut corners = [0usize; 4];
        let mut normals = [0usize; 4];
        // presence of a normal index is decided by the first corner
        let explicit_normals = scanned[0][2] != -1;

        for (k, ints) in scanned[..len].iter().enumerate() {
            corners[k] = self.resolve_vertex(ints[0])?;
            if explicit_normals {
                normals[k] = one_based(ints[2])
                    .ok_or_else(|| ModelError::invalid(format!("bad normal index {}", ints[2])))?;
            }
        }

        for tri in pattern {
            for &k in tri {
                self.indices.push(corners[k] as u32);
            }
            if explicit_normals {
                self.normal_indices.extend(tri.iter().map(|&k| normals[k]));
            } else {
                let n = self.face_normal(corners[tri[0]], corners[tri[1]], corners[tri[2]])?;
                self.normal_pool.push(n);
                let fresh = self.normal_pool.len() - 1;
                self.normal_indices.extend([fresh; 3]);
            }
        }
        Ok(())
    }

    fn resolve_vertex(&self, raw: i32) -> ModelResult<usize> {
        one_based(raw)
            .filter(|&i| i < self.vertex_count())
            .ok_or_else(|| {
                ModelError::invalid(format!(
                    "face vertex index {raw} out of range (vertex count = {})",
                    self.vertex_count()
                ))
            })
    }

    fn face_normal(&self, a: usize, b: usize, c: usize) -> ModelResult<Vec3> {
        match (
            vertex_at(&self.vertices, a),
            vertex_at(&self.vertices, b),
            vertex_at(&self.vertices, c),
        ) {
            (Some(a), Some(b), Some(c)) => Ok(calculate_normal(a, b, c)),
            _ => Err(ModelError::invalid("face references a missing vertex")),
        }
    }

    /// Scatter pooled normals into a buffer aligned with the vertex buffer.
    fn vertex_normals(&self) -> ModelResult<Vec<f32>> {
        let mut normals = vec![0.0; self.vertices.len()];
        for (&vi, &ni) in self.indices.iter().zip(&self.normal_indices) {
            let n = self.normal_pool.get(ni).ok_or_else(|| {
                ModelError::invalid(format!(
                    "normal index {} out of range (normal count = {})",
                    ni + 1,
                    self.normal_pool.len()
                ))
            })?;
            let base = vi as usize * 3;
            normals[base..base + 3].copy_from_slice(&n.to_array());
        }
        Ok(normals)
    }

    fn finish(self) -> ModelResult<Model> {
        if self.skipped_faces > 0 {
            warn!("skipped {} OBJ faces with more than 4 corners", self.skipped_faces);
        }
        if self.indices.is_empty() {
            return Err(ModelError::invalid("OBJ has no triangle or quad faces"));
        }
        let normals = self.vertex_normals()?;
        debug!(
            "OBJ: {} vertices, {} triangles, {} pooled normals",
            self.vertex_count(),
            self.indices.len() / 3,
            self.normal_pool.len()
        );
        Model::new(
            ModelFormat::Obj,
            self.vertices,
            Some(normals),
            Some(self.indices),
            self.acc,
        )
    }
}

/// 1-based file index to 0-based; `None` for anything below 1.
fn one_based(raw: i32) -> Option<usize> {
    usize::try_from(raw).ok()?.checked_sub(1)
}

/// Parse an OBJ stream.
pub fn parse_obj<R: Read>(reader: R) -> ModelResult<Model> {
    let mut reader = BufReader::with_capacity(INPUT_BUFFER_SIZE, reader);
    let mut builder = ObjBuilder::default();
    let mut buf = Vec::new();
    let mut line_no = 0;

    while let Some(line) = read_line_lossy(&mut reader, &mut buf)? {
        line_no += 1;
        let mut tokens = line.split_whitespace();
        let result = match tokens.next() {
            Some("v") => parse_vec3(tokens).map(|v| builder.add_vertex(v)),
            Some("vn") => parse_vec3(tokens).map(|n| builder.normal_pool.push(n)),
            Some("f") => builder.add_face(tokens),
            _ => Ok(()),
        };
        result.map_err(|ModelError::InvalidModel(reason)| {
            ModelError::invalid(format!("line {line_no}: {reason}"))
        })?;
    }

    builder.finish()
}
