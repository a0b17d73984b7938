/// Stereolithography (STL) parser covering the binary and ASCII encodings.
///
/// Layer: **Geometry input**
/// Produces a flat, non-indexed triangle list with one normal per vertex.
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

use tracing::debug;

use crate::binary::{read_record, read_u32_le, read_vec3_le};
use crate::error::{ModelError, ModelResult};
use crate::geometry::{calculate_normal, vertex_at, Accumulator};
use crate::model::{Model, ModelFormat};
use crate::text::{parse_vec3, read_line_lossy};
use crate::INPUT_BUFFER_SIZE;

const HEADER_SIZE: usize = 80;
const RECORD_SIZE: usize = 50;
const ASCII_TEST_SIZE: u64 = 256;
/// Corrupt triangle counts beyond this are rejected instead of allocated.
const MAX_VERTICES: u64 = 10_000_000;

/// Detect the sub-format and parse an STL stream.
///
/// The first bytes are inspected and the stream is rewound before parsing.
pub fn parse_stl<R: Read + Seek>(reader: &mut R) -> ModelResult<Model> {
    let start = reader.stream_position()?;
    let mut probe = Vec::with_capacity(ASCII_TEST_SIZE as usize);
    reader.by_ref().take(ASCII_TEST_SIZE).read_to_end(&mut probe)?;
    reader.seek(SeekFrom::Start(start))?;

    if is_text_format(&probe) {
        debug!("STL looks like ASCII");
        parse_ascii_stl(BufReader::with_capacity(INPUT_BUFFER_SIZE, reader))
    } else {
        debug!("STL looks like binary");
        parse_binary_stl(&mut BufReader::with_capacity(INPUT_BUFFER_SIZE, reader))
    }
}

/// ASCII STL mentions all of `solid`, `facet` and `vertex` early on. Binary
/// headers often start with "solid" too, so one keyword is not enough.
pub fn is_text_format(probe: &[u8]) -> bool {
    let text = String::from_utf8_lossy(probe);
    text.contains("solid") && text.contains("facet") && text.contains("vertex")
}

fn parse_ascii_stl<B: BufRead>(mut reader: B) -> ModelResult<Model> {
    let mut vertices = Vec::new();
    let mut normals = Vec::new();
    let mut acc = Accumulator::new();
    let mut buf = Vec::new();
    let mut i = 0;

    while let Some(text) = read_line_lossy(&mut reader, &mut buf)? {
        i += 1;
        let line = text.trim();
        if let Some(rest) = line.strip_prefix("facet") {
            let rest = rest.trim_start();
            let rest = rest.strip_prefix("normal").unwrap_or(rest);
            let normal = parse_vec3(rest.split_whitespace()).map_err(|e| at_line(e, i))?;
            // one facet normal for each of its three vertices
            for _ in 0..3 {
                normal.push_to(&mut normals);
            }
        } else if let Some(rest) = line.strip_prefix("vertex") {
            let v = parse_vec3(rest.split_whitespace()).map_err(|e| at_line(e, i))?;
            v.push_to(&mut vertices);
            acc = acc.push(v);
        }
    }

    if normals.len() != vertices.len() {
        return Err(ModelError::invalid(format!(
            "ASCII STL has {} facet normals for {} vertices",
            normals.len() / 9,
            vertices.len() / 3
        )));
    }
    debug!("ASCII STL: {} vertices", vertices.len() / 3);
    Model::new(ModelFormat::Stl, vertices, Some(normals), None, acc)
}

fn at_line(e: ModelError, line: usize) -> ModelError {
    let ModelError::InvalidModel(reason) = e;
    ModelError::invalid(format!("line {line}: {reason}"))
}

fn parse_binary_stl<R: Read>(reader: &mut R) -> ModelResult<Model> {
    let mut header = [0u8; HEADER_SIZE + 4];
    read_record(reader, &mut header)?;
    let tri_count = read_u32_le(&header, HEADER_SIZE) as u64;
    let vertex_count = tri_count * 3;
    if vertex_count == 0 || vertex_count > MAX_VERTICES {
        return Err(ModelError::invalid(format!(
            "binary STL declares {tri_count} triangles"
        )));
    }

    let floats = vertex_count as usize * 3;
    let mut vertices = Vec::with_capacity(floats);
    let mut normals = Vec::with_capacity(floats);
    let mut acc = Accumulator::new();
    let mut have_normals = false;
    let mut record = [0u8; RECORD_SIZE];

    for _ in 0..tri_count {
        read_record(reader, &mut record)?;
        let normal = read_vec3_le(&record, 0);
        have_normals |= !normal.is_zero();
        for _ in 0..3 {
            normal.push_to(&mut normals);
        }
        // trailing 2-byte attribute field is ignored
        for k in 0..3 {
            let v = read_vec3_le(&record, 12 + 12 * k);
            v.push_to(&mut vertices);
            acc = acc.push(v);
        }
    }

    if !have_normals {
        debug!("binary STL has only zero normals, synthesizing from faces");
        normals = synthesize_normals(&vertices);
    }
    debug!("binary STL: {tri_count} triangles");
    Model::new(ModelFormat::Stl, vertices, Some(normals), None, acc)
}

/// One face normal per consecutive vertex triple, repeated for each of its vertices.
pub fn synthesize_normals(vertices: &[f32]) -> Vec<f32> {
    let mut normals = Vec::with_capacity(vertices.len());
    for tri in vertices.chunks_exact(9) {
        let (a, b, c) = match (vertex_at(tri, 0), vertex_at(tri, 1), vertex_at(tri, 2)) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => break,
        };
        let n = calculate_normal(a, b, c);
        for _ in 0..3 {
            n.push_to(&mut normals);
        }
    }
    normals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vec3;
    use std::io::Cursor;

    fn binary_stl(tris: &[(Vec3, [Vec3; 3])]) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_SIZE];
        data.extend_from_slice(&(tris.len() as u32).to_le_bytes());
        for (normal, verts) in tris {
            for v in std::iter::once(normal).chain(verts.iter()) {
                for c in v.to_array() {
                    data.extend_from_slice(&c.to_le_bytes());
                }
            }
            data.extend_from_slice(&[0, 0]);
        }
        data
    }

    fn unit_tri() -> [Vec3; 3] {
        [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn test_binary_stl_single_triangle() {
        let data = binary_stl(&[(Vec3::new(0.0, 0.0, 1.0), unit_tri())]);
        let model = parse_stl(&mut Cursor::new(data)).unwrap();
        assert_eq!(model.vertex_count(), 3);
        assert_eq!(model.vertices()[3], 1.0);
        assert_eq!(model.normals().unwrap(), &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_binary_stl_zero_normals_are_synthesized() {
        let second = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::new(0.0, 0.0, 2.0),
        ];
        let data = binary_stl(&[(Vec3::ZERO, unit_tri()), (Vec3::ZERO, second)]);
        let model = parse_stl(&mut Cursor::new(data)).unwrap();
        let normals = model.normals().unwrap();
        assert_eq!(&normals[..9], &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
        assert_eq!(&normals[9..12], &[4.0, 0.0, 0.0]);
    }

    #[test]
    fn test_binary_stl_keeps_zero_normal_when_others_present() {
        let data = binary_stl(&[
            (Vec3::ZERO, unit_tri()),
            (Vec3::new(0.0, 0.0, -1.0), unit_tri()),
        ]);
        let model = parse_stl(&mut Cursor::new(data)).unwrap();
        let normals = model.normals().unwrap();
        assert!(normals[..9].iter().all(|&c| c == 0.0));
        assert_eq!(normals[11], -1.0);
    }

    #[test]
    fn test_binary_stl_rejects_zero_count() {
        let data = binary_stl(&[]);
        assert!(parse_stl(&mut Cursor::new(data)).is_err());
    }

    #[test]
    fn test_binary_stl_rejects_insane_count() {
        let mut data = vec![0u8; HEADER_SIZE];
        data.extend_from_slice(&4_000_000u32.to_le_bytes());
        let err = parse_stl(&mut Cursor::new(data)).unwrap_err();
        assert!(err.to_string().contains("4000000"));
    }

    #[test]
    fn test_binary_stl_truncated() {
        let mut data = binary_stl(&[(Vec3::ZERO, unit_tri()), (Vec3::ZERO, unit_tri())]);
        data.truncate(data.len() - 20);
        assert!(parse_stl(&mut Cursor::new(data)).is_err());
    }

    #[test]
    fn test_binary_header_starting_with_solid() {
        let mut data = binary_stl(&[(Vec3::new(0.0, 0.0, 1.0), unit_tri())]);
        data[..5].copy_from_slice(b"solid");
        let model = parse_stl(&mut Cursor::new(data)).unwrap();
        assert_eq!(model.vertex_count(), 3);
    }

    #[test]
    fn test_ascii_stl() {
        let stl = b"solid test
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 0 0
      vertex 0 1 0
    endloop
  endfacet
  facet normal 0 0 -1
    outer loop
      vertex   0 0 0
      vertex\t0 1 0
      vertex 1 0 0
    endloop
  endfacet
endsolid test";
        let model = parse_stl(&mut Cursor::new(&stl[..])).unwrap();
        assert_eq!(model.vertex_count(), 6);
        assert_eq!(model.vertices()[3], 1.0);
        assert_eq!(model.normals().unwrap()[17], -1.0);
        assert_eq!(model.bounds().max, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_ascii_stl_bad_number() {
        let stl = b"solid t\nfacet normal 0 0 1\nouter loop\nvertex 0 0 zero\nvertex 1 0 0\nvertex 0 1 0\nendloop\nendfacet\nendsolid";
        let err = parse_stl(&mut Cursor::new(&stl[..])).unwrap_err();
        assert!(err.to_string().contains("line 4"));
    }

    #[test]
    fn test_ascii_stl_latin1_solid_name() {
        let stl = b"solid pi\xe8ce\nfacet normal 0 0 1\nouter loop\nvertex 0 0 0\nvertex 1 0 0\nvertex 0 1 0\nendloop\nendfacet\nendsolid pi\xe8ce";
        let model = parse_stl(&mut Cursor::new(&stl[..])).unwrap();
        assert_eq!(model.vertex_count(), 3);
        assert_eq!(model.normals().unwrap()[2], 1.0);
    }

    #[test]
    fn test_ascii_stl_missing_vertex() {
        let stl = b"solid t\nfacet normal 0 0 1\nouter loop\nvertex 0 0 0\nvertex 1 0 0\nendloop\nendfacet\nendsolid";
        assert!(parse_stl(&mut Cursor::new(&stl[..])).is_err());
    }

    #[test]
    fn test_sniff_does_not_consume() {
        let stl = b"solid x\nfacet normal 0 0 1\nouter loop\nvertex 0 0 0\nvertex 1 0 0\nvertex 0 1 0\nendloop\nendfacet\nendsolid";
        let mut cursor = Cursor::new(&stl[..]);
        parse_stl(&mut cursor).unwrap();
        assert!(is_text_format(stl));
        assert!(!is_text_format(b"solid binary header"));
    }
}
