/// PLY parser that reads vertex positions only (point clouds).
///
/// Layer: **Geometry input**
/// The header is always ASCII. Only the `vertex` element is read; faces,
/// colors and other elements are ignored, so the model has no normals and no
/// index buffer.
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

use tracing::{debug, warn};

use crate::binary::{read_f32, read_record, ByteOrder};
use crate::error::{ModelError, ModelResult};
use crate::geometry::{Accumulator, Vec3};
use crate::model::{Model, ModelFormat};
use crate::text::{parse_f32, read_line_lossy};
use crate::INPUT_BUFFER_SIZE;

/// How far into the file the binary body offset is searched for.
const HEADER_SCAN_SIZE: u64 = 0x100000;
const END_HEADER: &[u8] = b"end_header";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Ascii,
    Binary(ByteOrder),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// Scalar type name, or `list` for list properties.
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlyHeader {
    pub encoding: Encoding,
    pub vertex_count: i64,
    /// Properties declared for the `vertex` element, in order.
    pub vertex_properties: Vec<Property>,
}

/// Where x, y and z live inside one vertex record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexLayout {
    pub stride: usize,
    pub offsets: [usize; 3],
}

impl VertexLayout {
    /// Three packed floats and nothing else.
    pub const PACKED_XYZ: Self = Self {
        stride: 12,
        offsets: [0, 4, 8],
    };
}

fn scalar_size(kind: &str) -> Option<usize> {
    match kind {
        "char" | "uchar" | "int8" | "uint8" => Some(1),
        "short" | "ushort" | "int16" | "uint16" => Some(2),
        "int" | "uint" | "float" | "int32" | "uint32" | "float32" => Some(4),
        "double" | "float64" => Some(8),
        _ => None,
    }
}

impl PlyHeader {
    fn position_of(&self, axis: &str) -> Option<usize> {
        self.vertex_properties.iter().position(|p| p.name == axis)
    }

    /// Token columns of x, y, z in an ASCII vertex line.
    pub fn text_columns(&self) -> ModelResult<[usize; 3]> {
        if self.vertex_properties.is_empty() {
            return Ok([0, 1, 2]);
        }
        let mut cols = [0; 3];
        for (col, axis) in cols.iter_mut().zip(["x", "y", "z"]) {
            *col = self
                .position_of(axis)
                .ok_or_else(|| ModelError::invalid(format!("vertex has no '{axis}' property")))?;
        }
        Ok(cols)
    }

    /// Record layout for binary bodies. x, y and z must be 32-bit floats.
    pub fn binary_layout(&self) -> ModelResult<VertexLayout> {
        if self.vertex_properties.is_empty() {
            return Ok(VertexLayout::PACKED_XYZ);
        }
        let mut stride = 0;
        let mut offsets = [None; 3];
        for p in &self.vertex_properties {
            let size = scalar_size(&p.kind).ok_or_else(|| {
                ModelError::invalid(format!(
                    "unsupported vertex property type '{}' for '{}'",
                    p.kind, p.name
                ))
            })?;
            if let Some(axis) = ["x", "y", "z"].iter().position(|a| *a == p.name) {
                if size != 4 || !p.kind.starts_with("float") {
                    return Err(ModelError::invalid(format!(
                        "vertex '{}' must be float, got '{}'",
                        p.name, p.kind
                    )));
                }
                offsets[axis] = Some(stride);
            }
            stride += size;
        }
        match offsets {
            [Some(x), Some(y), Some(z)] => Ok(VertexLayout {
                stride,
                offsets: [x, y, z],
            }),
            _ => Err(ModelError::invalid("vertex element lacks x, y or z")),
        }
    }
}

/// Read header lines up to and including `end_header`.
pub fn read_header<B: BufRead>(reader: &mut B) -> ModelResult<PlyHeader> {
    let mut header = PlyHeader {
        encoding: Encoding::Ascii,
        vertex_count: 0,
        vertex_properties: Vec::new(),
    };
    let mut current_element = String::new();
    let mut buf = Vec::new();
    let mut first = true;

    loop {
        let line = read_line_lossy(reader, &mut buf)?
            .ok_or_else(|| ModelError::invalid("PLY header has no end_header"))?;
        let trimmed = line.trim();
        if first && trimmed != "ply" {
            warn!("PLY header does not start with the 'ply' magic line");
        }
        first = false;

        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        if trimmed.starts_with("format ") {
            if trimmed.contains("binary") {
                let order = if trimmed.contains("big_endian") {
                    ByteOrder::BigEndian
                } else {
                    ByteOrder::LittleEndian
                };
                header.encoding = Encoding::Binary(order);
            }
        } else if trimmed.starts_with("element ") {
            current_element = tokens.get(1).copied().unwrap_or_default().to_string();
            if current_element == "vertex" {
                let count = tokens
                    .get(2)
                    .ok_or_else(|| ModelError::invalid("element vertex has no count"))?;
                header.vertex_count = count
                    .parse()
                    .map_err(|_| ModelError::invalid(format!("bad vertex count '{count}'")))?;
            }
        } else if trimmed.starts_with("property ") && current_element == "vertex" {
            if let (Some(kind), Some(name)) = (tokens.get(1), tokens.last()) {
                header.vertex_properties.push(Property {
                    kind: kind.to_string(),
                    name: name.to_string(),
                });
            }
        } else if trimmed.starts_with("end_header") {
            return Ok(header);
        }
    }
}

/// Parse a PLY stream into a point-cloud model.
pub fn parse_ply<R: Read + Seek>(reader: &mut R) -> ModelResult<Model> {
    let start = reader.stream_position()?;
    let mut reader = BufReader::with_capacity(INPUT_BUFFER_SIZE, reader);
    let header = read_header(&mut reader)?;
    if header.vertex_count <= 0 {
        return Err(ModelError::invalid(format!(
            "PLY declares {} vertices",
            header.vertex_count
        )));
    }
    let count = usize::try_from(header.vertex_count)
        .map_err(|_| ModelError::invalid("PLY vertex count too large"))?;
    debug!("PLY: {count} vertices, {:?} body", header.encoding);

    let (vertices, acc) = match header.encoding {
        Encoding::Ascii => read_vertices_text(&mut reader, count, header.text_columns()?)?,
        Encoding::Binary(order) => {
            let layout = header.binary_layout()?;
            reader.seek(SeekFrom::Start(start))?;
            let body = find_body_offset(&mut reader)?;
            reader.seek(SeekFrom::Start(start + body))?;
            read_vertices_binary(&mut reader, count, layout, order)?
        }
    };
    Model::new(ModelFormat::Ply, vertices, None, None, acc)
}

/// Byte offset just past the `end_header` line, found by scanning the first
/// 1 MiB of the file as raw bytes.
fn find_body_offset<R: Read>(reader: &mut R) -> ModelResult<u64> {
    let mut probe = Vec::new();
    reader.take(HEADER_SCAN_SIZE).read_to_end(&mut probe)?;
    let pos = probe
        .windows(END_HEADER.len())
        .position(|w| w == END_HEADER)
        .ok_or_else(|| ModelError::invalid("end_header not found in first 1 MiB"))?;
    let mut offset = pos + END_HEADER.len();
    if probe.get(offset) == Some(&b'\r') {
        offset += 1;
    }
    if probe.get(offset) == Some(&b'\n') {
        offset += 1;
    }
    Ok(offset as u64)
}

fn read_vertices_text<B: BufRead>(
    reader: &mut B,
    count: usize,
    cols: [usize; 3],
) -> ModelResult<(Vec<f32>, Accumulator)> {
    let mut vertices = Vec::with_capacity(count.min(1 << 20) * 3);
    let mut acc = Accumulator::new();
    let mut buf = Vec::new();

    for i in 0..count {
        let line = read_line_lossy(reader, &mut buf)?.ok_or_else(|| {
            ModelError::invalid(format!("expected {count} vertices, found {i}"))
        })?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let coord = |c: usize| -> ModelResult<f32> {
            let token = tokens.get(c).ok_or_else(|| {
                ModelError::invalid(format!("vertex {i} has {} values", tokens.len()))
            })?;
            parse_f32(token)
        };
        let v = Vec3::new(coord(cols[0])?, coord(cols[1])?, coord(cols[2])?);
        v.push_to(&mut vertices);
        acc = acc.push(v);
    }
    Ok((vertices, acc))
}

fn read_vertices_binary<R: Read>(
    reader: &mut R,
    count: usize,
    layout: VertexLayout,
    order: ByteOrder,
) -> ModelResult<(Vec<f32>, Accumulator)> {
    let mut vertices = Vec::with_capacity(count.min(1 << 20) * 3);
    let mut acc = Accumulator::new();
    let mut record = vec![0u8; layout.stride];
    let [ox, oy, oz] = layout.offsets;

    for _ in 0..count {
        read_record(reader, &mut record)?;
        let v = Vec3::new(
            read_f32(&record, ox, order),
            read_f32(&record, oy, order),
            read_f32(&record, oz, order),
        );
        v.push_to(&mut vertices);
        acc = acc.push(v);
    }
    Ok((vertices, acc))
}
