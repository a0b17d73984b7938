/// Whitespace-token helpers shared by the line-oriented parsers.
use std::borrow::Cow;
use std::io::BufRead;

use crate::error::{ModelError, ModelResult};
use crate::geometry::Vec3;

/// Read one line into `buf` and decode it, replacing invalid UTF-8 with
/// U+FFFD. The `\n` or `\r\n` terminator is stripped. `None` at end of stream.
pub fn read_line_lossy<'b, B: BufRead>(
    reader: &mut B,
    buf: &'b mut Vec<u8>,
) -> ModelResult<Option<Cow<'b, str>>> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(buf)))
}

pub fn parse_f32(token: &str) -> ModelResult<f32> {
    token
        .parse::<f32>()
        .map_err(|e| ModelError::invalid(format!("bad number '{token}': {e}")))
}

/// Parse the first three tokens as x, y, z. Extra tokens are ignored.
pub fn parse_vec3<'a, I>(mut tokens: I) -> ModelResult<Vec3>
where
    I: Iterator<Item = &'a str>,
{
    let mut next = || {
        tokens
            .next()
            .ok_or_else(|| ModelError::invalid("expected 3 coordinates"))
            .and_then(parse_f32)
    };
    let x = next()?;
    let y = next()?;
    let z = next()?;
    Ok(Vec3::new(x, y, z))
}
