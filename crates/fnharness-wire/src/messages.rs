//! Request and response types of the `Function` RPC service.
//!
//! Field names are part of the contract: gob matches struct fields by name,
//! so they must match the Go definitions exactly.

use crate::gob::{Fields, GobDecode, GobEncode, GobError, Shape, Value};

/// Liveness check method.
pub const PING_METHOD: &str = "Function.Ping";
/// Invocation method.
pub const INVOKE_METHOD: &str = "Function.Invoke";

fn string(value: &str) -> Value {
    Value::String(value.to_owned())
}

fn field(name: &str, value: Value) -> (String, Value) {
    (name.to_owned(), value)
}

// ---------------------------------------------------------------------------
// Ping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PingRequest;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PingResponse;

impl GobEncode for PingRequest {
    fn shape() -> Shape {
        Shape::Struct { name: "PingRequest", fields: vec![] }
    }

    fn to_value(&self) -> Value {
        Value::Struct(vec![])
    }
}

impl GobDecode for PingRequest {
    fn from_value(value: Value) -> Result<Self, GobError> {
        Fields::new("PingRequest", value).map(|_| Self)
    }
}

impl GobEncode for PingResponse {
    fn shape() -> Shape {
        Shape::Struct { name: "PingResponse", fields: vec![] }
    }

    fn to_value(&self) -> Value {
        Value::Struct(vec![])
    }
}

impl GobDecode for PingResponse {
    fn from_value(value: Value) -> Result<Self, GobError> {
        Fields::new("PingResponse", value).map(|_| Self)
    }
}

// ---------------------------------------------------------------------------
// Invoke request
// ---------------------------------------------------------------------------

/// Absolute point in time as seconds and nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i64,
}

impl GobEncode for Timestamp {
    fn shape() -> Shape {
        Shape::Struct {
            name: "InvokeRequest_Timestamp",
            fields: vec![("Seconds", Shape::Int), ("Nanos", Shape::Int)],
        }
    }

    fn to_value(&self) -> Value {
        Value::Struct(vec![
            field("Seconds", Value::Int(self.seconds)),
            field("Nanos", Value::Int(self.nanos)),
        ])
    }
}

impl GobDecode for Timestamp {
    fn from_value(value: Value) -> Result<Self, GobError> {
        let mut fields = Fields::new("InvokeRequest_Timestamp", value)?;
        Ok(Self {
            seconds: fields.int("Seconds")?,
            nanos: fields.int("Nanos")?,
        })
    }
}

/// Arguments of `Function.Invoke`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvokeRequest {
    pub payload: Vec<u8>,
    pub request_id: String,
    pub trace_id: String,
    pub deadline: Timestamp,
    pub invoked_function_arn: String,
    pub cognito_identity_id: String,
    pub cognito_identity_pool_id: String,
    /// Serialized client context; absent when empty.
    pub client_context: Vec<u8>,
}

impl GobEncode for InvokeRequest {
    fn shape() -> Shape {
        Shape::Struct {
            name: "InvokeRequest",
            fields: vec![
                ("Payload", Shape::Bytes),
                ("RequestId", Shape::String),
                ("XAmznTraceId", Shape::String),
                ("Deadline", Timestamp::shape()),
                ("InvokedFunctionArn", Shape::String),
                ("CognitoIdentityId", Shape::String),
                ("CognitoIdentityPoolId", Shape::String),
                ("ClientContext", Shape::Bytes),
            ],
        }
    }

    fn to_value(&self) -> Value {
        Value::Struct(vec![
            field("Payload", Value::Bytes(self.payload.clone())),
            field("RequestId", string(&self.request_id)),
            field("XAmznTraceId", string(&self.trace_id)),
            field("Deadline", self.deadline.to_value()),
            field("InvokedFunctionArn", string(&self.invoked_function_arn)),
            field("CognitoIdentityId", string(&self.cognito_identity_id)),
            field("CognitoIdentityPoolId", string(&self.cognito_identity_pool_id)),
            field("ClientContext", Value::Bytes(self.client_context.clone())),
        ])
    }
}

impl GobDecode for InvokeRequest {
    fn from_value(value: Value) -> Result<Self, GobError> {
        let mut fields = Fields::new("InvokeRequest", value)?;
        Ok(Self {
            payload: fields.bytes("Payload")?,
            request_id: fields.string("RequestId")?,
            trace_id: fields.string("XAmznTraceId")?,
            deadline: fields.nested("Deadline")?.unwrap_or_default(),
            invoked_function_arn: fields.string("InvokedFunctionArn")?,
            cognito_identity_id: fields.string("CognitoIdentityId")?,
            cognito_identity_pool_id: fields.string("CognitoIdentityPoolId")?,
            client_context: fields.bytes("ClientContext")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Invoke response
// ---------------------------------------------------------------------------

/// One frame of the stack trace attached to a function error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackFrame {
    pub path: String,
    pub line: i32,
    pub label: String,
}

impl GobEncode for StackFrame {
    fn shape() -> Shape {
        Shape::Struct {
            name: "InvokeResponse_Error_StackFrame",
            fields: vec![
                ("Path", Shape::String),
                ("Line", Shape::Int),
                ("Label", Shape::String),
            ],
        }
    }

    fn to_value(&self) -> Value {
        Value::Struct(vec![
            field("Path", string(&self.path)),
            field("Line", Value::Int(i64::from(self.line))),
            field("Label", string(&self.label)),
        ])
    }
}

impl GobDecode for StackFrame {
    fn from_value(value: Value) -> Result<Self, GobError> {
        let mut fields = Fields::new("InvokeResponse_Error_StackFrame", value)?;
        let line = fields.int("Line")?;
        Ok(Self {
            path: fields.string("Path")?,
            line: i32::try_from(line)
                .map_err(|_| GobError::Corrupt(format!("stack frame line {line} overflows int32")))?,
            label: fields.string("Label")?,
        })
    }
}

/// Error reported by the function itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvokeError {
    pub message: String,
    pub error_type: String,
    pub stack_trace: Vec<StackFrame>,
    pub should_exit: bool,
}

impl GobEncode for InvokeError {
    fn shape() -> Shape {
        Shape::Struct {
            name: "InvokeResponse_Error",
            fields: vec![
                ("Message", Shape::String),
                ("Type", Shape::String),
                ("StackTrace", Shape::Slice(Box::new(StackFrame::shape()))),
                ("ShouldExit", Shape::Bool),
            ],
        }
    }

    fn to_value(&self) -> Value {
        Value::Struct(vec![
            field("Message", string(&self.message)),
            field("Type", string(&self.error_type)),
            field(
                "StackTrace",
                Value::Slice(self.stack_trace.iter().map(StackFrame::to_value).collect()),
            ),
            field("ShouldExit", Value::Bool(self.should_exit)),
        ])
    }
}

impl GobDecode for InvokeError {
    fn from_value(value: Value) -> Result<Self, GobError> {
        let mut fields = Fields::new("InvokeResponse_Error", value)?;
        Ok(Self {
            message: fields.string("Message")?,
            error_type: fields.string("Type")?,
            stack_trace: fields.list("StackTrace")?,
            should_exit: fields.bool("ShouldExit")?,
        })
    }
}

/// Reply of `Function.Invoke`: a payload, or an error when `error` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvokeResponse {
    pub payload: Vec<u8>,
    pub error: Option<InvokeError>,
}

impl GobEncode for InvokeResponse {
    fn shape() -> Shape {
        Shape::Struct {
            name: "InvokeResponse",
            fields: vec![("Payload", Shape::Bytes), ("Error", InvokeError::shape())],
        }
    }

    fn to_value(&self) -> Value {
        Value::Struct(vec![
            field("Payload", Value::Bytes(self.payload.clone())),
            field(
                "Error",
                self.error.as_ref().map_or(Value::Nil, InvokeError::to_value),
            ),
        ])
    }
}

impl GobDecode for InvokeResponse {
    fn from_value(value: Value) -> Result<Self, GobError> {
        let mut fields = Fields::new("InvokeResponse", value)?;
        Ok(Self {
            payload: fields.bytes("Payload")?,
            error: fields.nested("Error")?,
        })
    }
}
