//! Dynamic values and the traits that map Rust types onto them.

use super::GobError;

/// A decoded (or to-be-encoded) gob value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Complex(f64, f64),
    Bytes(Vec<u8>),
    String(String),
    Slice(Vec<Value>),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    /// Transmitted fields only, in field order.
    Struct(Vec<(String, Value)>),
    /// Interface value: concrete type name and value, or `None` for nil.
    Interface(Option<Box<(String, Value)>>),
    /// Payload of a type with its own binary encoding.
    Opaque(Vec<u8>),
    /// A nil pointer. Never transmitted.
    Nil,
}

impl Value {
    /// Short kind label used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Uint(_) => "uint",
            Self::Float(_) => "float",
            Self::Complex(..) => "complex",
            Self::Bytes(_) => "bytes",
            Self::String(_) => "string",
            Self::Slice(_) => "slice",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
            Self::Struct(_) => "struct",
            Self::Interface(_) => "interface",
            Self::Opaque(_) => "opaque",
            Self::Nil => "nil",
        }
    }

    /// Whether gob omits this value when it appears as a struct field.
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Bool(b) => !b,
            Self::Int(i) => *i == 0,
            Self::Uint(u) => *u == 0,
            Self::Float(f) => *f == 0.0,
            Self::Complex(re, im) => *re == 0.0 && *im == 0.0,
            Self::Bytes(b) | Self::Opaque(b) => b.is_empty(),
            Self::String(s) => s.is_empty(),
            Self::Slice(items) => items.is_empty(),
            Self::Map(entries) => entries.is_empty(),
            Self::Interface(inner) => inner.is_none(),
            Self::Nil => true,
            Self::Array(_) | Self::Struct(_) => false,
        }
    }
}

/// Static description of an encodable type.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Bool,
    Int,
    Uint,
    Float,
    Bytes,
    String,
    Slice(Box<Shape>),
    Struct {
        name: &'static str,
        fields: Vec<(&'static str, Shape)>,
    },
}

impl Shape {
    /// Key identifying the type on one stream.
    pub(crate) fn key(&self) -> String {
        match self {
            Self::Bool => "bool".to_owned(),
            Self::Int => "int".to_owned(),
            Self::Uint => "uint".to_owned(),
            Self::Float => "float".to_owned(),
            Self::Bytes => "[]byte".to_owned(),
            Self::String => "string".to_owned(),
            Self::Slice(elem) => format!("[]{}", elem.key()),
            Self::Struct { name, .. } => (*name).to_owned(),
        }
    }
}

/// Types that can be written to a gob stream.
pub trait GobEncode {
    fn shape() -> Shape;
    fn to_value(&self) -> Value;
}

/// Types that can be built from a decoded gob value.
pub trait GobDecode: Sized {
    fn from_value(value: Value) -> Result<Self, GobError>;
}

/// Name-indexed view over a decoded struct.
///
/// Accessors remove the field they read and fall back to the zero value for
/// fields the sender omitted, mirroring gob's zero-value elision. Fields the
/// receiver never asks for are ignored.
#[derive(Debug)]
pub struct Fields {
    type_name: &'static str,
    fields: Vec<(String, Value)>,
}

impl Fields {
    pub fn new(type_name: &'static str, value: Value) -> Result<Self, GobError> {
        match value {
            Value::Struct(fields) => Ok(Self { type_name, fields }),
            other => Err(mismatch(type_name.to_owned(), "struct", &other)),
        }
    }

    pub fn take(&mut self, name: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(field, _)| field == name)?;
        Some(self.fields.swap_remove(pos).1)
    }

    pub fn string(&mut self, name: &str) -> Result<String, GobError> {
        match self.take(name) {
            None => Ok(String::new()),
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(mismatch(self.context(name), "string", &other)),
        }
    }

    pub fn bytes(&mut self, name: &str) -> Result<Vec<u8>, GobError> {
        match self.take(name) {
            None => Ok(Vec::new()),
            Some(Value::Bytes(b)) => Ok(b),
            Some(other) => Err(mismatch(self.context(name), "bytes", &other)),
        }
    }

    pub fn int(&mut self, name: &str) -> Result<i64, GobError> {
        match self.take(name) {
            None => Ok(0),
            Some(Value::Int(i)) => Ok(i),
            Some(other) => Err(mismatch(self.context(name), "int", &other)),
        }
    }

    pub fn uint(&mut self, name: &str) -> Result<u64, GobError> {
        match self.take(name) {
            None => Ok(0),
            Some(Value::Uint(u)) => Ok(u),
            Some(other) => Err(mismatch(self.context(name), "uint", &other)),
        }
    }

    pub fn bool(&mut self, name: &str) -> Result<bool, GobError> {
        match self.take(name) {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(b),
            Some(other) => Err(mismatch(self.context(name), "bool", &other)),
        }
    }

    /// Nested struct or pointer-to-struct field; `None` when omitted.
    pub fn nested<T: GobDecode>(&mut self, name: &str) -> Result<Option<T>, GobError> {
        self.take(name).map(T::from_value).transpose()
    }

    pub fn list<T: GobDecode>(&mut self, name: &str) -> Result<Vec<T>, GobError> {
        match self.take(name) {
            None => Ok(Vec::new()),
            Some(Value::Slice(items) | Value::Array(items)) => {
                items.into_iter().map(T::from_value).collect()
            }
            Some(other) => Err(mismatch(self.context(name), "slice", &other)),
        }
    }

    fn context(&self, field: &str) -> String {
        format!("{}.{}", self.type_name, field)
    }
}

fn mismatch(context: String, expected: &'static str, found: &Value) -> GobError {
    GobError::TypeMismatch {
        context,
        expected,
        found: found.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_default_to_zero() {
        let mut fields = Fields::new("T", Value::Struct(vec![])).unwrap();
        assert_eq!(fields.string("Name").unwrap(), "");
        assert_eq!(fields.int("Line").unwrap(), 0);
        assert!(fields.bytes("Payload").unwrap().is_empty());
        assert!(!fields.bool("Flag").unwrap());
    }

    #[test]
    fn wrong_kind_reports_field_path() {
        let value = Value::Struct(vec![("Line".to_owned(), Value::String("five".to_owned()))]);
        let mut fields = Fields::new("StackFrame", value).unwrap();
        let err = fields.int("Line").unwrap_err();
        assert_eq!(
            err.to_string(),
            "gob type mismatch for StackFrame.Line: expected int, found string"
        );
    }

    #[test]
    fn non_struct_is_rejected() {
        assert!(Fields::new("T", Value::Int(3)).is_err());
    }

    #[test]
    fn zero_values() {
        assert!(Value::Nil.is_zero());
        assert!(Value::Bytes(vec![]).is_zero());
        assert!(!Value::Struct(vec![]).is_zero());
        assert!(!Value::Int(-1).is_zero());
    }
}
