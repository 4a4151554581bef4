use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use fnharness_wire::{Client, RpcError};
use fnharness_wire::messages::{
    INVOKE_METHOD, InvokeError, InvokeRequest, InvokeResponse, Timestamp,
};
use tokio::io::{AsyncRead, AsyncWrite};

/// Request id sent with the single invocation of a run.
pub const REQUEST_ID: &str = "0";

/// What the function made of the invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    Success(Vec<u8>),
    FunctionError(InvokeError),
}

impl From<InvokeResponse> for InvocationOutcome {
    /// A populated error wins over any payload sent alongside it.
    fn from(response: InvokeResponse) -> Self {
        match response.error {
            Some(error) => Self::FunctionError(error),
            None => Self::Success(response.payload),
        }
    }
}

/// Absolute deadline `window` after `now`, clamped to the latest
/// representable instant.
pub fn deadline_from(now: DateTime<Utc>, window: Duration) -> Timestamp {
    let deadline = TimeDelta::from_std(window)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    Timestamp {
        seconds: deadline.timestamp(),
        nanos: i64::from(deadline.timestamp_subsec_nanos()),
    }
}

/// Builds the invocation request. Every correlation field other than the
/// request id is left empty.
pub fn build_request(payload: Vec<u8>, deadline: Timestamp) -> InvokeRequest {
    InvokeRequest {
        payload,
        request_id: REQUEST_ID.to_owned(),
        deadline,
        ..InvokeRequest::default()
    }
}

/// Issues exactly one `Function.Invoke` call.
pub async fn invoke<S>(
    client: &mut Client<S>,
    request: &InvokeRequest,
) -> Result<InvocationOutcome, RpcError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tracing::debug!(
        payload_len = request.payload.len(),
        deadline = request.deadline.seconds,
        "invoking function"
    );
    let response: InvokeResponse = client.call(INVOKE_METHOD, request).await?;
    Ok(response.into())
}
