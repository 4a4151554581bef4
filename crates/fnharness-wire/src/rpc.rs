//! Go `net/rpc` framing over a gob stream.
//!
//! Every call is a `Request` header followed by the argument value; every
//! reply is a `Response` header followed by the result value. When the
//! server reports an error in the header, the body is an empty placeholder
//! struct that the client reads and discards.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::gob::{
    Decoder, Encoder, Fields, GobDecode, GobEncode, GobError, Shape, Value, length_prefix_width,
};

/// Largest message accepted from a peer (matches Go's limit on 64-bit
/// platforms).
const MAX_MESSAGE_LEN: u64 = 1 << 30;

/// Errors raised by the RPC layer.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,

    /// Reading from or writing to the transport failed.
    #[error("transport i/o failed")]
    Io(#[from] std::io::Error),

    /// A message could not be encoded or decoded.
    #[error("malformed rpc message")]
    Gob(#[from] GobError),

    /// A message length exceeded [`MAX_MESSAGE_LEN`].
    #[error("rpc message of {0} bytes exceeds limit")]
    TooLarge(u64),

    /// The reply did not belong to the outstanding call.
    #[error("reply sequence {got} does not match call sequence {expected}")]
    SequenceMismatch { expected: u64, got: u64 },

    /// The server answered the call with an error string.
    #[error("{method} failed: {message}")]
    Remote { method: String, message: String },
}

impl RpcError {
    /// Whether the connection can no longer be used.
    ///
    /// A [`RpcError::Remote`] reply leaves the stream in sync; every other
    /// error does not.
    pub fn is_transport(&self) -> bool {
        !matches!(self, Self::Remote { .. })
    }
}

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

/// `net/rpc` request header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub service_method: String,
    pub seq: u64,
}

/// `net/rpc` response header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub service_method: String,
    pub seq: u64,
    pub error: String,
}

impl GobEncode for Request {
    fn shape() -> Shape {
        Shape::Struct {
            name: "Request",
            fields: vec![("ServiceMethod", Shape::String), ("Seq", Shape::Uint)],
        }
    }

    fn to_value(&self) -> Value {
        Value::Struct(vec![
            ("ServiceMethod".to_owned(), Value::String(self.service_method.clone())),
            ("Seq".to_owned(), Value::Uint(self.seq)),
        ])
    }
}

impl GobDecode for Request {
    fn from_value(value: Value) -> Result<Self, GobError> {
        let mut fields = Fields::new("Request", value)?;
        Ok(Self {
            service_method: fields.string("ServiceMethod")?,
            seq: fields.uint("Seq")?,
        })
    }
}

impl GobEncode for Response {
    fn shape() -> Shape {
        Shape::Struct {
            name: "Response",
            fields: vec![
                ("ServiceMethod", Shape::String),
                ("Seq", Shape::Uint),
                ("Error", Shape::String),
            ],
        }
    }

    fn to_value(&self) -> Value {
        Value::Struct(vec![
            ("ServiceMethod".to_owned(), Value::String(self.service_method.clone())),
            ("Seq".to_owned(), Value::Uint(self.seq)),
            ("Error".to_owned(), Value::String(self.error.clone())),
        ])
    }
}

impl GobDecode for Response {
    fn from_value(value: Value) -> Result<Self, GobError> {
        let mut fields = Fields::new("Response", value)?;
        Ok(Self {
            service_method: fields.string("ServiceMethod")?,
            seq: fields.uint("Seq")?,
            error: fields.string("Error")?,
        })
    }
}

/// Body sent alongside an error response.
struct InvalidRequest;

impl GobEncode for InvalidRequest {
    fn shape() -> Shape {
        Shape::Struct { name: "invalidRequest", fields: vec![] }
    }

    fn to_value(&self) -> Value {
        Value::Struct(vec![])
    }
}

// ---------------------------------------------------------------------------
// Framed stream
// ---------------------------------------------------------------------------

/// A bidirectional gob stream: one encoder and one decoder per connection.
struct GobStream<S> {
    io: BufStream<S>,
    encoder: Encoder,
    decoder: Decoder,
}

impl<S: AsyncRead + AsyncWrite + Unpin> GobStream<S> {
    fn new(io: S) -> Self {
        Self {
            io: BufStream::new(io),
            encoder: Encoder::new(),
            decoder: Decoder::new(),
        }
    }

    /// Writes a header and body as one flush.
    async fn send<H: GobEncode, B: GobEncode>(
        &mut self,
        header: &H,
        body: &B,
    ) -> Result<(), RpcError> {
        let mut buf = Vec::new();
        self.encoder.encode(header, &mut buf)?;
        self.encoder.encode(body, &mut buf)?;
        self.io.write_all(&buf).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Reads the next value, consuming any type definitions before it.
    ///
    /// Returns `Ok(None)` if the peer closed the connection cleanly before
    /// the first byte of a message.
    async fn recv_value(&mut self) -> Result<Option<Value>, RpcError> {
        loop {
            let Some(body) = self.read_message().await? else {
                return Ok(None);
            };
            if let Some(value) = self.decoder.decode_message(&body)? {
                return Ok(Some(value));
            }
        }
    }

    async fn recv<T: GobDecode>(&mut self) -> Result<T, RpcError> {
        let value = self.recv_value().await?.ok_or(RpcError::Closed)?;
        Ok(T::from_value(value)?)
    }

    async fn read_message(&mut self) -> Result<Option<Vec<u8>>, RpcError> {
        let first = match self.io.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let len = match length_prefix_width(first)? {
            0 => u64::from(first),
            width => {
                let mut bytes = [0u8; 8];
                self.io.read_exact(&mut bytes[8 - width..]).await.map_err(eof_is_closed)?;
                u64::from_be_bytes(bytes)
            }
        };
        if len > MAX_MESSAGE_LEN {
            return Err(RpcError::TooLarge(len));
        }
        let mut body = vec![0u8; len as usize];
        self.io.read_exact(&mut body).await.map_err(eof_is_closed)?;
        Ok(Some(body))
    }
}

fn eof_is_closed(e: std::io::Error) -> RpcError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        RpcError::Closed
    } else {
        RpcError::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Synchronous-call `net/rpc` client: one outstanding call at a time.
pub struct Client<S> {
    stream: GobStream<S>,
    seq: u64,
}

impl Client<TcpStream> {
    /// Opens a TCP connection to an RPC server.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, RpcError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<S> {
    pub fn new(io: S) -> Self {
        Self {
            stream: GobStream::new(io),
            seq: 0,
        }
    }

    /// Calls `method` with `args` and waits for the reply.
    pub async fn call<A, R>(&mut self, method: &str, args: &A) -> Result<R, RpcError>
    where
        A: GobEncode,
        R: GobDecode,
    {
        let seq = self.seq;
        self.seq += 1;

        let request = Request {
            service_method: method.to_owned(),
            seq,
        };
        self.stream.send(&request, args).await?;

        let header: Response = self.stream.recv().await?;
        if header.seq != seq {
            return Err(RpcError::SequenceMismatch {
                expected: seq,
                got: header.seq,
            });
        }
        if !header.error.is_empty() {
            self.stream.recv_value().await?.ok_or(RpcError::Closed)?;
            return Err(RpcError::Remote {
                method: method.to_owned(),
                message: header.error,
            });
        }
        self.stream.recv().await
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Server side of one `net/rpc` connection.
pub struct ServerConn<S> {
    stream: GobStream<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ServerConn<S> {
    pub fn new(io: S) -> Self {
        Self {
            stream: GobStream::new(io),
        }
    }

    /// Next request header, or `None` once the client hangs up.
    pub async fn read_request(&mut self) -> Result<Option<Request>, RpcError> {
        match self.stream.recv_value().await? {
            Some(value) => Ok(Some(Request::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn read_body<T: GobDecode>(&mut self) -> Result<T, RpcError> {
        self.stream.recv().await
    }

    /// Reads and drops a request body the server does not understand.
    pub async fn discard_body(&mut self) -> Result<(), RpcError> {
        self.stream.recv_value().await?.ok_or(RpcError::Closed)?;
        Ok(())
    }

    pub async fn reply<T: GobEncode>(&mut self, request: &Request, body: &T) -> Result<(), RpcError> {
        let header = Response {
            service_method: request.service_method.clone(),
            seq: request.seq,
            error: String::new(),
        };
        self.stream.send(&header, body).await
    }

    pub async fn reply_error(&mut self, request: &Request, message: &str) -> Result<(), RpcError> {
        let header = Response {
            service_method: request.service_method.clone(),
            seq: request.seq,
            error: message.to_owned(),
        };
        self.stream.send(&header, &InvalidRequest).await
    }
}
