use std::collections::HashMap;

use super::GobError;
use super::primitive::{FieldWriter, put_bytes, put_float, put_int, put_uint};
use super::types::{FIRST_USER_ID, FieldDef, TypeId, WireType, builtin};
use super::value::{GobEncode, Shape, Value};

/// Encoding half of a gob stream.
///
/// Type definitions are written the first time a type is seen and never
/// again, so one `Encoder` must be used for the lifetime of a connection.
#[derive(Debug)]
pub struct Encoder {
    sent: HashMap<String, TypeId>,
    next_id: TypeId,
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            sent: HashMap::new(),
            next_id: FIRST_USER_ID,
        }
    }

    /// Appends the framed messages for `value` (any pending type
    /// definitions followed by the value itself) to `out`.
    pub fn encode<T: GobEncode>(&mut self, value: &T, out: &mut Vec<u8>) -> Result<(), GobError> {
        let shape = T::shape();
        let id = self.define(&shape, out);

        let mut body = Vec::new();
        put_int(&mut body, id);
        if !matches!(shape, Shape::Struct { .. }) {
            // Non-struct values travel as a singleton field.
            put_uint(&mut body, 0);
        }
        encode_value(&shape, &value.to_value(), &mut body)?;
        frame(&body, out);
        Ok(())
    }

    /// Returns the id for `shape`, writing definitions for it and any types
    /// it references that have not been sent yet.
    fn define(&mut self, shape: &Shape, out: &mut Vec<u8>) -> TypeId {
        let wire = match shape {
            Shape::Bool => return builtin::BOOL,
            Shape::Int => return builtin::INT,
            Shape::Uint => return builtin::UINT,
            Shape::Float => return builtin::FLOAT,
            Shape::Bytes => return builtin::BYTES,
            Shape::String => return builtin::STRING,
            _ if self.sent.contains_key(&shape.key()) => return self.sent[&shape.key()],
            Shape::Slice(elem) => WireType::Slice {
                name: shape.key(),
                elem: self.define(elem, out),
            },
            Shape::Struct { name, fields } => WireType::Struct {
                name: (*name).to_owned(),
                fields: fields
                    .iter()
                    .map(|(field, shape)| FieldDef {
                        name: (*field).to_owned(),
                        id: self.define(shape, out),
                    })
                    .collect(),
            },
        };

        let id = self.next_id;
        self.next_id += 1;
        self.sent.insert(shape.key(), id);
        tracing::trace!(id, name = wire.name(), "sending gob type definition");

        let mut body = Vec::new();
        put_int(&mut body, -id);
        wire.encode(id, &mut body);
        frame(&body, out);
        id
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

fn frame(body: &[u8], out: &mut Vec<u8>) {
    put_uint(out, body.len() as u64);
    out.extend_from_slice(body);
}

fn encode_value(shape: &Shape, value: &Value, out: &mut Vec<u8>) -> Result<(), GobError> {
    match (shape, value) {
        (Shape::Bool, Value::Bool(b)) => put_uint(out, u64::from(*b)),
        (Shape::Int, Value::Int(i)) => put_int(out, *i),
        (Shape::Uint, Value::Uint(u)) => put_uint(out, *u),
        (Shape::Float, Value::Float(f)) => put_float(out, *f),
        (Shape::Bytes, Value::Bytes(b)) => put_bytes(out, b),
        (Shape::String, Value::String(s)) => put_bytes(out, s.as_bytes()),
        (Shape::Slice(elem), Value::Slice(items)) => {
            put_uint(out, items.len() as u64);
            for item in items {
                encode_value(elem, item, out)?;
            }
        }
        (Shape::Struct { name, fields }, Value::Struct(values)) => {
            if fields.len() != values.len() {
                return Err(GobError::ShapeMismatch((*name).to_owned()));
            }
            let mut writer = FieldWriter::new(out);
            for (index, ((field, field_shape), (value_name, value))) in
                fields.iter().zip(values).enumerate()
            {
                if field != value_name {
                    return Err(GobError::ShapeMismatch(format!("{name}.{field}")));
                }
                let always_sent = matches!(field_shape, Shape::Struct { .. }) && *value != Value::Nil;
                if !always_sent && value.is_zero() {
                    continue;
                }
                encode_value(field_shape, value, writer.field(index))?;
            }
            writer.finish();
        }
        (shape, _) => return Err(GobError::ShapeMismatch(shape.key())),
    }
    Ok(())
}
