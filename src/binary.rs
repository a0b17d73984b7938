/// Binary primitive reader: fixed-width little/big-endian words from byte windows.
///
/// Callers slice records out of the stream first (`read_record`) and then
/// decode fields at fixed offsets, so the decoders themselves never fail.
use std::io::Read;

use crate::error::ModelResult;
use crate::geometry::Vec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    LittleEndian,
    BigEndian,
}

fn word(data: &[u8], offset: usize) -> [u8; 4] {
    [
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ]
}

pub fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(word(data, offset))
}

pub fn read_f32_le(data: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes(word(data, offset))
}

pub fn read_f32(data: &[u8], offset: usize, order: ByteOrder) -> f32 {
    match order {
        ByteOrder::LittleEndian => f32::from_le_bytes(word(data, offset)),
        ByteOrder::BigEndian => f32::from_be_bytes(word(data, offset)),
    }
}

/// Three consecutive little-endian floats starting at `offset`.
pub fn read_vec3_le(data: &[u8], offset: usize) -> Vec3 {
    Vec3::new(
        read_f32_le(data, offset),
        read_f32_le(data, offset + 4),
        read_f32_le(data, offset + 8),
    )
}

/// Fill `buf` completely from `reader`. A short read is an invalid model.
pub fn read_record<R: Read>(reader: &mut R, buf: &mut [u8]) -> ModelResult<()> {
    reader.read_exact(buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use std::io::Cursor;

    #[test]
    fn test_read_u32_le() {
        let data = [0x01, 0x02, 0x00, 0x00, 0xff];
        assert_eq!(read_u32_le(&data, 0), 0x0201);
        assert_eq!(read_u32_le(&[0xff, 0xff, 0xff, 0xff], 0), u32::MAX);
    }

    #[test]
    fn test_read_f32_both_orders() {
        let le = 2.5f32.to_le_bytes();
        let be = 2.5f32.to_be_bytes();
        assert_eq!(read_f32(&le, 0, ByteOrder::LittleEndian), 2.5);
        assert_eq!(read_f32(&be, 0, ByteOrder::BigEndian), 2.5);
    }

    #[test]
    fn test_read_vec3_at_offset() {
        let mut data = vec![0u8; 4];
        for v in [1.0f32, -2.0, 3.5] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(read_vec3_le(&data, 4), Vec3::new(1.0, -2.0, 3.5));
    }

    #[test]
    fn test_short_record_is_invalid() {
        let mut cursor = Cursor::new(vec![0u8; 10]);
        let mut buf = [0u8; 12];
        let err = read_record(&mut cursor, &mut buf).unwrap_err();
        assert!(matches!(err, ModelError::InvalidModel(_)));
    }
}
