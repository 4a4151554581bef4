use std::collections::HashMap;

use super::GobError;
use super::primitive::ByteReader;
use super::types::{FieldDef, TypeId, WireType, builtin, read_fields};
use super::value::Value;

/// Decoding half of a gob stream.
///
/// Remembers every type definition the peer has sent so later value
/// messages can refer to them by id.
#[derive(Debug, Default)]
pub struct Decoder {
    types: HashMap<TypeId, WireType>,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes one message body (the bytes after the length prefix).
    ///
    /// Returns `Ok(None)` for type definitions, which are recorded, and
    /// `Ok(Some(value))` for value messages.
    pub fn decode_message(&mut self, body: &[u8]) -> Result<Option<Value>, GobError> {
        let mut r = ByteReader::new(body);
        let id = r.read_int()?;
        if id < 0 {
            let id = -id;
            let wire = WireType::decode(&mut r)?;
            if self.types.contains_key(&id) {
                return Err(GobError::DuplicateType(id));
            }
            tracing::trace!(id, name = wire.name(), "received gob type definition");
            self.types.insert(id, wire);
            return Ok(None);
        }
        if id == 0 {
            return Err(GobError::Corrupt("type id 0".to_owned()));
        }
        self.decode_top(id, &mut r).map(Some)
    }

    /// Decodes every message of a complete framed stream held in memory.
    pub fn decode_stream(&mut self, stream: &[u8]) -> Result<Vec<Value>, GobError> {
        let mut r = ByteReader::new(stream);
        let mut values = Vec::new();
        while r.remaining() > 0 {
            let len = r.read_len()?;
            if let Some(value) = self.decode_message(r.read_bytes(len)?)? {
                values.push(value);
            }
        }
        Ok(values)
    }

    /// A top-level value: structs are sent bare, everything else as a
    /// singleton field with delta zero.
    fn decode_top(&self, id: TypeId, r: &mut ByteReader<'_>) -> Result<Value, GobError> {
        if let Some(WireType::Struct { fields, .. }) = self.types.get(&id) {
            return self.decode_struct(id, fields, r);
        }
        if r.read_uint()? != 0 {
            return Err(GobError::Corrupt("non-zero delta for singleton".to_owned()));
        }
        self.decode_value(id, r)
    }

    fn decode_value(&self, id: TypeId, r: &mut ByteReader<'_>) -> Result<Value, GobError> {
        let value = match id {
            builtin::BOOL => Value::Bool(r.read_uint()? != 0),
            builtin::INT => Value::Int(r.read_int()?),
            builtin::UINT => Value::Uint(r.read_uint()?),
            builtin::FLOAT => Value::Float(r.read_float()?),
            builtin::BYTES => Value::Bytes(r.read_byte_slice()?),
            builtin::STRING => Value::String(r.read_string()?),
            builtin::COMPLEX => Value::Complex(r.read_float()?, r.read_float()?),
            builtin::INTERFACE => self.decode_interface(r)?,
            _ => match self.types.get(&id).ok_or(GobError::UnknownType(id))? {
                WireType::Array { elem, len, .. } => {
                    let count = r.read_len()?;
                    if i64::try_from(count).ok() != Some(*len) {
                        return Err(GobError::Corrupt(format!(
                            "array length {count} does not match declared {len}"
                        )));
                    }
                    Value::Array(self.decode_items(*elem, count, r)?)
                }
                WireType::Slice { elem, .. } => {
                    let count = r.read_len()?;
                    Value::Slice(self.decode_items(*elem, count, r)?)
                }
                WireType::Map { key, elem, .. } => {
                    let count = r.read_len()?;
                    let mut entries = Vec::with_capacity(count);
                    for _ in 0..count {
                        let k = self.decode_value(*key, r)?;
                        let v = self.decode_value(*elem, r)?;
                        entries.push((k, v));
                    }
                    Value::Map(entries)
                }
                WireType::Struct { fields, .. } => self.decode_struct(id, fields, r)?,
                WireType::Opaque { .. } => Value::Opaque(r.read_byte_slice()?),
            },
        };
        Ok(value)
    }

    /// `count` has already been checked against the remaining bytes, and
    /// every element occupies at least one byte.
    fn decode_items(
        &self,
        elem: TypeId,
        count: usize,
        r: &mut ByteReader<'_>,
    ) -> Result<Vec<Value>, GobError> {
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(self.decode_value(elem, r)?);
        }
        Ok(items)
    }

    fn decode_struct(
        &self,
        id: TypeId,
        fields: &[FieldDef],
        r: &mut ByteReader<'_>,
    ) -> Result<Value, GobError> {
        let mut values = Vec::new();
        read_fields(r, |r, index| {
            let def = fields.get(index).ok_or(GobError::FieldOutOfRange {
                type_id: id,
                field: index as u64,
            })?;
            values.push((def.name.clone(), self.decode_value(def.id, r)?));
            Ok(())
        })?;
        Ok(Value::Struct(values))
    }

    /// Interface values carry the registered concrete type name, its id and
    /// a length-prefixed top-level encoding of the value.
    fn decode_interface(&self, r: &mut ByteReader<'_>) -> Result<Value, GobError> {
        let name = r.read_string()?;
        if name.is_empty() {
            return Ok(Value::Interface(None));
        }
        let id = r.read_int()?;
        let len = r.read_len()?;
        let mut inner = ByteReader::new(r.read_bytes(len)?);
        let value = self.decode_top(id, &mut inner)?;
        Ok(Value::Interface(Some(Box::new((name, value)))))
    }
}
