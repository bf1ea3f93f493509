//! Packed structure layouts
//!
//! A layout is an ordered list of named fields. Each field is a fixed-width
//! little-endian number or a nested layout; there is never padding between
//! fields. Encoding and decoding walk the list generically, so a typed
//! struct only has to say how it maps to and from the flattened value list.

use crate::error::CodecError;
use std::fmt;

/// Numeric encoding of one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// IEEE-754 single precision
    F32,
    U16,
    U8,
    /// Nested layout, concatenated in place
    Struct(&'static StructLayout),
}

impl FieldKind {
    pub const fn width(&self) -> usize {
        match self {
            Self::F32 => 4,
            Self::U16 => 2,
            Self::U8 => 1,
            Self::Struct(layout) => layout.width(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn f32(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::F32,
        }
    }

    pub const fn u16(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::U16,
        }
    }

    pub const fn u8(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::U8,
        }
    }

    pub const fn nested(name: &'static str, layout: &'static StructLayout) -> Self {
        Self {
            name,
            kind: FieldKind::Struct(layout),
        }
    }
}

/// One scalar of a flattened structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    F32(f32),
    U16(u16),
    U8(u8),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::F32(v) => write!(f, "{:.3}", v),
            Self::U16(v) => write!(f, "{}", v),
            Self::U8(v) => write!(f, "{}", v),
        }
    }
}

/// Named, ordered field list
#[derive(Debug, PartialEq, Eq)]
pub struct StructLayout {
    pub name: &'static str,
    pub fields: &'static [Field],
}

impl StructLayout {
    /// Encoded width in bytes (sum of field widths, recursively)
    pub const fn width(&self) -> usize {
        let mut total = 0;
        let mut i = 0;
        while i < self.fields.len() {
            total += self.fields[i].kind.width();
            i += 1;
        }
        total
    }

    /// Number of scalars after flattening
    pub fn scalar_count(&self) -> usize {
        self.fields
            .iter()
            .map(|field| match field.kind {
                FieldKind::Struct(inner) => inner.scalar_count(),
                _ => 1,
            })
            .sum()
    }

    /// Dotted paths of every scalar, in encoding order (e.g. `sensors.acc.x`)
    pub fn field_paths(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.scalar_count());
        self.collect_paths("", &mut out);
        out
    }

    fn collect_paths(&self, prefix: &str, out: &mut Vec<String>) {
        for field in self.fields {
            let path = if prefix.is_empty() {
                field.name.to_string()
            } else {
                format!("{}.{}", prefix, field.name)
            };
            match field.kind {
                FieldKind::Struct(inner) => inner.collect_paths(&path, out),
                _ => out.push(path),
            }
        }
    }

    /// Decode the leading `width()` bytes into flattened values
    ///
    /// Trailing bytes are ignored.
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<Value>, CodecError> {
        let needed = self.width();
        if bytes.len() < needed {
            return Err(CodecError::TruncatedPayload {
                layout: self.name,
                needed,
                available: bytes.len(),
            });
        }

        let mut values = Vec::with_capacity(self.scalar_count());
        let mut offset = 0;
        self.decode_fields(bytes, &mut offset, &mut values);
        Ok(values)
    }

    // Caller guarantees bytes.len() >= width()
    fn decode_fields(&self, bytes: &[u8], offset: &mut usize, values: &mut Vec<Value>) {
        for field in self.fields {
            let at = *offset;
            match field.kind {
                FieldKind::F32 => values.push(Value::F32(f32::from_le_bytes([
                    bytes[at],
                    bytes[at + 1],
                    bytes[at + 2],
                    bytes[at + 3],
                ]))),
                FieldKind::U16 => {
                    values.push(Value::U16(u16::from_le_bytes([bytes[at], bytes[at + 1]])))
                }
                FieldKind::U8 => values.push(Value::U8(bytes[at])),
                FieldKind::Struct(inner) => {
                    inner.decode_fields(bytes, offset, values);
                    continue;
                }
            }
            *offset += field.kind.width();
        }
    }

    /// Encode flattened values, checking count and kinds against the layout
    pub fn encode(&self, values: &[Value]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(self.width());
        let mut rest = values;
        self.encode_fields(&mut rest, &mut out)?;
        if !rest.is_empty() {
            return Err(CodecError::Malformed(format!(
                "{}: {} extra values",
                self.name,
                rest.len()
            )));
        }
        Ok(out)
    }

    fn encode_fields<'v>(
        &self,
        rest: &mut &'v [Value],
        out: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        for field in self.fields {
            if let FieldKind::Struct(inner) = field.kind {
                inner.encode_fields(rest, out)?;
                continue;
            }

            let current: &'v [Value] = *rest;
            let Some((value, tail)) = current.split_first() else {
                return Err(CodecError::Malformed(format!(
                    "{}: missing value for {}",
                    self.name, field.name
                )));
            };
            match (field.kind, value) {
                (FieldKind::F32, Value::F32(v)) => out.extend_from_slice(&v.to_le_bytes()),
                (FieldKind::U16, Value::U16(v)) => out.extend_from_slice(&v.to_le_bytes()),
                (FieldKind::U8, Value::U8(v)) => out.push(*v),
                _ => {
                    return Err(CodecError::Malformed(format!(
                        "{}: wrong value kind for {}",
                        self.name, field.name
                    )))
                }
            }
            *rest = tail;
        }
        Ok(())
    }
}

/// Cursor over flattened values, used by `Packed::from_values`
pub struct Values<'a> {
    layout: &'static str,
    values: &'a [Value],
}

impl<'a> Values<'a> {
    pub fn new(layout: &'static str, values: &'a [Value]) -> Self {
        Self { layout, values }
    }

    fn next(&mut self) -> Result<Value, CodecError> {
        let (first, rest) = self.values.split_first().ok_or_else(|| {
            CodecError::Malformed(format!("{}: fewer values than fields", self.layout))
        })?;
        self.values = rest;
        Ok(*first)
    }

    fn mismatch(&self, expected: &str) -> CodecError {
        CodecError::Malformed(format!("{}: expected {} value", self.layout, expected))
    }

    pub fn f32(&mut self) -> Result<f32, CodecError> {
        match self.next()? {
            Value::F32(v) => Ok(v),
            _ => Err(self.mismatch("f32")),
        }
    }

    pub fn u16(&mut self) -> Result<u16, CodecError> {
        match self.next()? {
            Value::U16(v) => Ok(v),
            _ => Err(self.mismatch("u16")),
        }
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        match self.next()? {
            Value::U8(v) => Ok(v),
            _ => Err(self.mismatch("u8")),
        }
    }
}

/// Typed struct with a packed layout
pub trait Packed: Sized {
    const LAYOUT: &'static StructLayout;

    /// Append this struct's scalars in layout order
    fn push_values(&self, out: &mut Vec<Value>);

    /// Rebuild from scalars in layout order
    fn from_values(values: &mut Values<'_>) -> Result<Self, CodecError>;

    fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut values = Vec::with_capacity(Self::LAYOUT.scalar_count());
        self.push_values(&mut values);
        Self::LAYOUT.encode(&values)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let values = Self::LAYOUT.decode(bytes)?;
        Self::from_values(&mut Values::new(Self::LAYOUT.name, &values))
    }
}
