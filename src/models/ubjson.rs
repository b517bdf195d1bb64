//! Universal Binary JSON decoder.
//!
//! The booster's binary model save is UBJSON with strongly typed, counted
//! arrays (`[$d#L<n>...`). Decoding into a `serde_json::Value` lets the
//! binary and text saves share one document schema. Numbers are big-endian.

use crate::error::LoadError;
use serde_json::{Map, Number, Value};
use std::fmt::Display;

const MAX_DEPTH: usize = 128;

/// Decode one UBJSON document
pub fn decode(bytes: &[u8]) -> Result<Value, LoadError> {
    let mut reader = Reader { bytes, pos: 0 };
    let value = reader.value(0)?;

    while let Some(b) = reader.peek() {
        if b != b'N' {
            return Err(reader.error("trailing data after document"));
        }
        reader.pos += 1;
    }
    Ok(value)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn error(&self, msg: impl Display) -> LoadError {
        LoadError::CorruptModel(format!("ubjson at byte {}: {}", self.pos, msg))
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], LoadError> {
        if n > self.remaining() {
            return Err(self.error("unexpected end of data"));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn fixed<const N: usize>(&mut self) -> Result<[u8; N], LoadError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn byte(&mut self) -> Result<u8, LoadError> {
        Ok(self.take(1)?[0])
    }

    /// Next type marker, skipping no-ops
    fn marker(&mut self) -> Result<u8, LoadError> {
        loop {
            let m = self.byte()?;
            if m != b'N' {
                return Ok(m);
            }
        }
    }

    fn value(&mut self, depth: usize) -> Result<Value, LoadError> {
        let marker = self.marker()?;
        self.typed_value(marker, depth)
    }

    fn typed_value(&mut self, marker: u8, depth: usize) -> Result<Value, LoadError> {
        match marker {
            b'Z' => Ok(Value::Null),
            b'T' => Ok(Value::Bool(true)),
            b'F' => Ok(Value::Bool(false)),
            b'i' | b'U' | b'I' | b'l' | b'L' => Ok(Value::from(self.integer(marker)?)),
            b'd' => Ok(float(f32::from_be_bytes(self.fixed()?) as f64)),
            b'D' => Ok(float(f64::from_be_bytes(self.fixed()?))),
            b'C' => Ok(Value::String(char::from(self.byte()?).to_string())),
            b'S' => Ok(Value::String(self.string()?)),
            b'H' => {
                let digits = self.string()?;
                digits
                    .parse::<Number>()
                    .map(Value::Number)
                    .map_err(|_| self.error(format_args!("invalid high-precision number '{}'", digits)))
            }
            b'[' => self.array(depth + 1),
            b'{' => self.object(depth + 1),
            other => Err(self.error(format_args!("unknown type marker 0x{:02x}", other))),
        }
    }

    fn integer(&mut self, marker: u8) -> Result<i64, LoadError> {
        Ok(match marker {
            b'i' => i8::from_be_bytes(self.fixed()?) as i64,
            b'U' => u8::from_be_bytes(self.fixed()?) as i64,
            b'I' => i16::from_be_bytes(self.fixed()?) as i64,
            b'l' => i32::from_be_bytes(self.fixed()?) as i64,
            b'L' => i64::from_be_bytes(self.fixed()?),
            other => {
                return Err(self.error(format_args!("expected integer marker, found 0x{:02x}", other)))
            }
        })
    }

    fn length(&mut self) -> Result<usize, LoadError> {
        let marker = self.marker()?;
        let n = self.integer(marker)?;
        usize::try_from(n).map_err(|_| self.error(format_args!("negative length {}", n)))
    }

    fn string(&mut self) -> Result<String, LoadError> {
        let len = self.length()?;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| self.error("string is not valid UTF-8"))
    }

    /// Optional `$<type>` and `#<count>` following a container opener
    fn container_header(&mut self) -> Result<(Option<u8>, Option<usize>), LoadError> {
        let mut element = None;
        if self.peek() == Some(b'$') {
            self.pos += 1;
            element = Some(self.byte()?);
            if self.peek() != Some(b'#') {
                return Err(self.error("typed container without a count"));
            }
        }

        let mut count = None;
        if self.peek() == Some(b'#') {
            self.pos += 1;
            let n = self.length()?;
            // Zero-width element types are the only ones that can outnumber the bytes left.
            let zero_width = matches!(element, Some(b'Z' | b'T' | b'F' | b'N'));
            if !zero_width && n > self.remaining() {
                return Err(self.error(format_args!("count {} exceeds remaining data", n)));
            }
            count = Some(n);
        }
        Ok((element, count))
    }

    fn element(&mut self, element: Option<u8>, depth: usize) -> Result<Value, LoadError> {
        match element {
            Some(marker) => self.typed_value(marker, depth),
            None => self.value(depth),
        }
    }

    fn array(&mut self, depth: usize) -> Result<Value, LoadError> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        let (element, count) = self.container_header()?;

        let mut items = Vec::new();
        match count {
            Some(n) => {
                items.reserve(n.min(self.remaining()));
                for _ in 0..n {
                    items.push(self.element(element, depth)?);
                }
            }
            None => loop {
                let marker = self.marker()?;
                if marker == b']' {
                    break;
                }
                items.push(self.typed_value(marker, depth)?);
            },
        }
        Ok(Value::Array(items))
    }

    fn object(&mut self, depth: usize) -> Result<Value, LoadError> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        let (element, count) = self.container_header()?;

        let mut map = Map::new();
        match count {
            Some(n) => {
                for _ in 0..n {
                    let key = self.string()?;
                    let value = self.element(element, depth)?;
                    map.insert(key, value);
                }
            }
            // Keys carry no type marker, only their length.
            None => loop {
                match self.peek() {
                    Some(b'}') => {
                        self.pos += 1;
                        break;
                    }
                    Some(b'N') => {
                        self.pos += 1;
                        continue;
                    }
                    _ => {}
                }
                let key = self.string()?;
                let value = self.value(depth)?;
                map.insert(key, value);
            },
        }
        Ok(Value::Object(map))
    }
}

fn float(x: f64) -> Value {
    Number::from_f64(x).map(Value::Number).unwrap_or(Value::Null)
}

/// Plain (untyped, uncounted) encoder for building fixtures
#[cfg(test)]
pub(crate) fn encode(value: &Value) -> Vec<u8> {
    fn write_len(out: &mut Vec<u8>, n: usize) {
        out.push(b'L');
        out.extend_from_slice(&(n as i64).to_be_bytes());
    }

    fn write(out: &mut Vec<u8>, value: &Value) {
        match value {
            Value::Null => out.push(b'Z'),
            Value::Bool(b) => out.push(if *b { b'T' } else { b'F' }),
            Value::Number(n) => match n.as_i64() {
                Some(i) => {
                    out.push(b'L');
                    out.extend_from_slice(&i.to_be_bytes());
                }
                None => {
                    out.push(b'D');
                    out.extend_from_slice(&n.as_f64().unwrap_or(0.0).to_be_bytes());
                }
            },
            Value::String(s) => {
                out.push(b'S');
                write_len(out, s.len());
                out.extend_from_slice(s.as_bytes());
            }
            Value::Array(items) => {
                out.push(b'[');
                for item in items {
                    write(out, item);
                }
                out.push(b']');
            }
            Value::Object(map) => {
                out.push(b'{');
                for (key, item) in map {
                    write_len(out, key.len());
                    out.extend_from_slice(key.as_bytes());
                    write(out, item);
                }
                out.push(b'}');
            }
        }
    }

    let mut out = Vec::new();
    write(&mut out, value);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(out: &mut Vec<u8>, name: &str) {
        out.push(b'U');
        out.push(name.len() as u8);
        out.extend_from_slice(name.as_bytes());
    }

    #[test]
    fn test_scalars_and_plain_containers() {
        let doc = json!({
            "name": "binary:logistic",
            "flags": [true, false, null],
            "count": 300,
            "negative": -7,
            "ratio": 0.25,
            "nested": {"empty": [], "deep": {"x": "y"}}
        });

        assert_eq!(decode(&encode(&doc)).unwrap(), doc);
    }

    #[test]
    fn test_small_integer_markers_and_noops() {
        let bytes = [b'N', b'[', b'i', 0xFF, b'N', b'U', 0xC8, b'I', 0x01, 0x00, b'l', 0xFF, 0xFF, 0xFF, 0xFE, b']', b'N'];
        assert_eq!(decode(&bytes).unwrap(), json!([-1, 200, 256, -2]));
    }

    #[test]
    fn test_typed_counted_arrays() {
        let mut bytes = vec![b'{'];
        key(&mut bytes, "split_conditions");
        bytes.extend_from_slice(&[b'[', b'$', b'd', b'#', b'i', 2]);
        bytes.extend_from_slice(&0.5f32.to_be_bytes());
        bytes.extend_from_slice(&(-1.25f32).to_be_bytes());
        key(&mut bytes, "left_children");
        bytes.extend_from_slice(&[b'[', b'$', b'l', b'#', b'L']);
        bytes.extend_from_slice(&2i64.to_be_bytes());
        bytes.extend_from_slice(&1i32.to_be_bytes());
        bytes.extend_from_slice(&(-1i32).to_be_bytes());
        key(&mut bytes, "default_left");
        bytes.extend_from_slice(&[b'[', b'$', b'U', b'#', b'U', 3, 0, 1, 0]);
        key(&mut bytes, "base_score");
        bytes.extend_from_slice(&[b'S', b'U', 4]);
        bytes.extend_from_slice(b"5E-1");
        bytes.push(b'}');

        assert_eq!(
            decode(&bytes).unwrap(),
            json!({
                "split_conditions": [0.5, -1.25],
                "left_children": [1, -1],
                "default_left": [0, 1, 0],
                "base_score": "5E-1"
            })
        );
    }

    #[test]
    fn test_counted_object() {
        let mut bytes = vec![b'{', b'#', b'U', 1];
        key(&mut bytes, "trees");
        bytes.extend_from_slice(&[b'[', b']']);
        assert_eq!(decode(&bytes).unwrap(), json!({"trees": []}));
    }

    #[test]
    fn test_rejects_truncated_and_unknown_input() {
        let truncated = [b'[', b'$', b'd', b'#', b'U', 4, 0, 0];
        assert!(matches!(decode(&truncated), Err(LoadError::CorruptModel(_))));

        assert!(matches!(decode(b"{"), Err(LoadError::CorruptModel(_))));
        assert_eq!(decode(b"{}").unwrap(), json!({}));
        assert!(matches!(decode(&[b'[', b'Q', b']']), Err(LoadError::CorruptModel(_))));
        assert!(matches!(decode(&[b'T', b'T']), Err(LoadError::CorruptModel(_))));
    }
}
