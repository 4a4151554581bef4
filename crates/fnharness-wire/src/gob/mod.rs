//! Go `encoding/gob` stream format.
//!
//! A gob stream is a sequence of length-prefixed messages. Each message
//! starts with a signed type id: a negative id introduces a type definition
//! for `-id`, a positive id carries a value of that (previously defined or
//! builtin) type. The encoding is structural, so decoding produces a
//! dynamic [`Value`] tree whose struct fields are matched by name when
//! converted into concrete types through [`GobDecode`].
//!
//! ```text
//! message := uint(len) int(type_id) (wire_type | value)
//! struct  := (uint(field_delta) field_value)* uint(0)
//! ```

mod decode;
mod encode;
mod primitive;
mod types;
mod value;

pub use decode::Decoder;
pub use encode::Encoder;
pub use primitive::length_prefix_width;
pub use types::{FieldDef, FIRST_USER_ID, TypeId, WireType, builtin};
pub use value::{Fields, GobDecode, GobEncode, Shape, Value};

/// Errors raised while encoding or decoding a gob stream.
#[derive(Debug, thiserror::Error)]
pub enum GobError {
    /// The message ended in the middle of a value.
    #[error("unexpected end of gob message")]
    UnexpectedEof,

    /// An unsigned integer declared more than eight bytes.
    #[error("gob integer overflows 64 bits")]
    IntegerOverflow,

    /// A string field did not hold valid UTF-8.
    #[error("gob string is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A value referenced a type id that was never defined on the stream.
    #[error("unknown gob type id {0}")]
    UnknownType(TypeId),

    /// The peer defined the same type id twice on one stream.
    #[error("duplicate definition for gob type id {0}")]
    DuplicateType(TypeId),

    /// A struct field delta pointed past the end of the struct definition.
    #[error("field {field} out of range for gob type id {type_id}")]
    FieldOutOfRange { type_id: TypeId, field: u64 },

    /// Structurally invalid data.
    #[error("corrupt gob data: {0}")]
    Corrupt(String),

    /// A decoded value did not have the shape the receiving type expects.
    #[error("gob type mismatch for {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A value handed to the encoder did not match its declared shape.
    #[error("value does not match encoder shape for {0}")]
    ShapeMismatch(String),
}
