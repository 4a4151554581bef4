//! Type definitions (`wireType`) exchanged on a gob stream.

use super::GobError;
use super::primitive::{ByteReader, FieldWriter, put_int, put_uint};

/// Gob type identifier. Negative on the wire when introducing a definition.
pub type TypeId = i64;

/// Ids predefined by every gob implementation.
pub mod builtin {
    use super::TypeId;

    pub const BOOL: TypeId = 1;
    pub const INT: TypeId = 2;
    pub const UINT: TypeId = 3;
    pub const FLOAT: TypeId = 4;
    pub const BYTES: TypeId = 5;
    pub const STRING: TypeId = 6;
    pub const COMPLEX: TypeId = 7;
    pub const INTERFACE: TypeId = 8;
}

/// First id available for user-defined types.
pub const FIRST_USER_ID: TypeId = 65;

/// One field of a struct definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub id: TypeId,
}

/// A user-defined type as described by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireType {
    Array { name: String, elem: TypeId, len: i64 },
    Slice { name: String, elem: TypeId },
    Struct { name: String, fields: Vec<FieldDef> },
    Map { name: String, key: TypeId, elem: TypeId },
    /// `GobEncoder`, `BinaryMarshaler` or `TextMarshaler` implementations.
    /// Their values travel as opaque byte strings.
    Opaque { name: String },
}

// Field numbers of Go's `wireType` struct.
const ARRAY_T: usize = 0;
const SLICE_T: usize = 1;
const STRUCT_T: usize = 2;
const MAP_T: usize = 3;
const GOB_ENCODER_T: usize = 4;
const BINARY_MARSHALER_T: usize = 5;
const TEXT_MARSHALER_T: usize = 6;

impl WireType {
    pub fn name(&self) -> &str {
        match self {
            Self::Array { name, .. }
            | Self::Slice { name, .. }
            | Self::Struct { name, .. }
            | Self::Map { name, .. }
            | Self::Opaque { name } => name,
        }
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<Self, GobError> {
        let mut wire = None;
        read_fields(r, |r, index| {
            wire = Some(match index {
                ARRAY_T => {
                    let (mut name, mut elem, mut len) = (String::new(), 0, 0);
                    read_fields(r, |r, index| {
                        match index {
                            0 => name = read_common(r)?.0,
                            1 => elem = r.read_int()?,
                            2 => len = r.read_int()?,
                            _ => return Err(out_of_range(index)),
                        }
                        Ok(())
                    })?;
                    Self::Array { name, elem, len }
                }
                SLICE_T => {
                    let (mut name, mut elem) = (String::new(), 0);
                    read_fields(r, |r, index| {
                        match index {
                            0 => name = read_common(r)?.0,
                            1 => elem = r.read_int()?,
                            _ => return Err(out_of_range(index)),
                        }
                        Ok(())
                    })?;
                    Self::Slice { name, elem }
                }
                STRUCT_T => {
                    let (mut name, mut fields) = (String::new(), Vec::new());
                    read_fields(r, |r, index| {
                        match index {
                            0 => name = read_common(r)?.0,
                            1 => {
                                let count = r.read_len()?;
                                fields.reserve(count);
                                for _ in 0..count {
                                    fields.push(read_field_def(r)?);
                                }
                            }
                            _ => return Err(out_of_range(index)),
                        }
                        Ok(())
                    })?;
                    Self::Struct { name, fields }
                }
                MAP_T => {
                    let (mut name, mut key, mut elem) = (String::new(), 0, 0);
                    read_fields(r, |r, index| {
                        match index {
                            0 => name = read_common(r)?.0,
                            1 => key = r.read_int()?,
                            2 => elem = r.read_int()?,
                            _ => return Err(out_of_range(index)),
                        }
                        Ok(())
                    })?;
                    Self::Map { name, key, elem }
                }
                GOB_ENCODER_T | BINARY_MARSHALER_T | TEXT_MARSHALER_T => {
                    let mut name = String::new();
                    read_fields(r, |r, index| {
                        match index {
                            0 => name = read_common(r)?.0,
                            _ => return Err(out_of_range(index)),
                        }
                        Ok(())
                    })?;
                    Self::Opaque { name }
                }
                _ => return Err(out_of_range(index)),
            });
            Ok(())
        })?;
        wire.ok_or_else(|| GobError::Corrupt("empty type definition".to_owned()))
    }

    pub(crate) fn encode(&self, id: TypeId, out: &mut Vec<u8>) {
        let mut wire = FieldWriter::new(out);
        match self {
            Self::Array { name, elem, len } => {
                let mut array = FieldWriter::new(wire.field(ARRAY_T));
                write_common(array.field(0), name, id);
                put_int(array.field(1), *elem);
                if *len != 0 {
                    put_int(array.field(2), *len);
                }
                array.finish();
            }
            Self::Slice { name, elem } => {
                let mut slice = FieldWriter::new(wire.field(SLICE_T));
                write_common(slice.field(0), name, id);
                put_int(slice.field(1), *elem);
                slice.finish();
            }
            Self::Struct { name, fields } => {
                let mut st = FieldWriter::new(wire.field(STRUCT_T));
                write_common(st.field(0), name, id);
                if !fields.is_empty() {
                    let buf = st.field(1);
                    put_uint(buf, fields.len() as u64);
                    for field in fields {
                        let mut def = FieldWriter::new(&mut *buf);
                        write_string(def.field(0), &field.name);
                        put_int(def.field(1), field.id);
                        def.finish();
                    }
                }
                st.finish();
            }
            Self::Map { name, key, elem } => {
                let mut map = FieldWriter::new(wire.field(MAP_T));
                write_common(map.field(0), name, id);
                put_int(map.field(1), *key);
                put_int(map.field(2), *elem);
                map.finish();
            }
            Self::Opaque { name } => {
                let mut opaque = FieldWriter::new(wire.field(GOB_ENCODER_T));
                write_common(opaque.field(0), name, id);
                opaque.finish();
            }
        }
        wire.finish();
    }
}

/// Walks the fields of an encoded struct, handing each field index to `f`.
pub(crate) fn read_fields<F>(r: &mut ByteReader<'_>, mut f: F) -> Result<(), GobError>
where
    F: FnMut(&mut ByteReader<'_>, usize) -> Result<(), GobError>,
{
    let mut field: u64 = 0;
    loop {
        let delta = r.read_uint()?;
        if delta == 0 {
            return Ok(());
        }
        field = field
            .checked_add(delta)
            .ok_or_else(|| GobError::Corrupt("field delta overflow".to_owned()))?;
        let index = usize::try_from(field - 1)
            .map_err(|_| GobError::Corrupt("field index overflow".to_owned()))?;
        f(r, index)?;
    }
}

fn out_of_range(index: usize) -> GobError {
    GobError::Corrupt(format!("unexpected field {index} in type definition"))
}

/// `CommonType { Name string; Id typeId }`
fn read_common(r: &mut ByteReader<'_>) -> Result<(String, TypeId), GobError> {
    let (mut name, mut id) = (String::new(), 0);
    read_fields(r, |r, index| {
        match index {
            0 => name = r.read_string()?,
            1 => id = r.read_int()?,
            _ => return Err(out_of_range(index)),
        }
        Ok(())
    })?;
    Ok((name, id))
}

/// `fieldType { Name string; Id typeId }`
fn read_field_def(r: &mut ByteReader<'_>) -> Result<FieldDef, GobError> {
    let (mut name, mut id) = (String::new(), 0);
    read_fields(r, |r, index| {
        match index {
            0 => name = r.read_string()?,
            1 => id = r.read_int()?,
            _ => return Err(out_of_range(index)),
        }
        Ok(())
    })?;
    Ok(FieldDef { name, id })
}

fn write_common(out: &mut Vec<u8>, name: &str, id: TypeId) {
    let mut common = FieldWriter::new(out);
    if !name.is_empty() {
        write_string(common.field(0), name);
    }
    put_int(common.field(1), id);
    common.finish();
}

fn write_string(out: &mut Vec<u8>, value: &str) {
    put_uint(out, value.len() as u64);
    out.extend_from_slice(value.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Type definition for `struct Point { X, Y int }` as produced by Go,
    /// without the message length and type id prefix.
    const POINT_DEFINITION: &[u8] = &[
        0x03, 0x01, 0x01, 0x05, b'P', b'o', b'i', b'n', b't', 0x01, 0xff, 0x82, 0x00, 0x01, 0x02,
        0x01, 0x01, b'X', 0x01, 0x04, 0x00, 0x01, 0x01, b'Y', 0x01, 0x04, 0x00, 0x00, 0x00,
    ];

    fn point() -> WireType {
        WireType::Struct {
            name: "Point".to_owned(),
            fields: vec![
                FieldDef { name: "X".to_owned(), id: builtin::INT },
                FieldDef { name: "Y".to_owned(), id: builtin::INT },
            ],
        }
    }

    #[test]
    fn decodes_go_struct_definition() {
        let mut reader = ByteReader::new(POINT_DEFINITION);
        let wire = WireType::decode(&mut reader).unwrap();
        assert_eq!(wire, point());
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn encodes_struct_definition_like_go() {
        let mut out = Vec::new();
        point().encode(65, &mut out);
        assert_eq!(out, POINT_DEFINITION);
    }

    #[test]
    fn slice_definition_survives_decoding() {
        let slice = WireType::Slice { name: "[]Point".to_owned(), elem: 65 };
        let mut out = Vec::new();
        slice.encode(66, &mut out);
        let decoded = WireType::decode(&mut ByteReader::new(&out)).unwrap();
        assert_eq!(decoded, slice);
    }

    #[test]
    fn unknown_wire_type_field_is_corrupt() {
        // Delta 8 points at wireType field 7, which does not exist.
        let mut reader = ByteReader::new(&[0x08, 0x00]);
        assert!(matches!(WireType::decode(&mut reader), Err(GobError::Corrupt(_))));
    }
}
