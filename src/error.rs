//! Unified client error model and fault translation.
//! This module provides the single structured error type surfaced by every
//! fallible driver operation, along with the translator that folds transport
//! failures, non-2xx statuses and remote fault payloads into it.

use serde::Deserialize;
use thiserror::Error;

/// Last observed transport outcome for a request, kept on the session so the
/// translator and callers can distinguish "server said no" from "wire died".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportStatus {
    pub code: u16,
    pub reason: String,
}

impl TransportStatus {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self { code, reason: reason.into() }
    }
}

/// Coarse split used by callers deciding whether a retry even makes sense.
/// The driver itself never retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The failure happened on this side of the wire (or on the wire itself).
    ClientLocal,
    /// The server processed the request and rejected it.
    Remote,
}

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Connect/DNS/timeout/IO failure before a well-formed response arrived.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Application-level fault reported by the server, at any HTTP status.
    #[error("remote fault {code}: {message}")]
    Remote { code: i64, message: String, stack_trace: Option<String> },

    /// A wire literal could not be decoded as the requested target type.
    #[error("cannot convert {literal:?} to {target}")]
    TypeConversion { literal: String, target: &'static str },

    /// Cooperative abort of a blob transfer.
    #[error("transfer cancelled")]
    Cancelled,

    /// Response shape did not match the protocol contract.
    #[error("protocol violation: {message}")]
    Protocol { message: String },

    /// The session was closed; the request was rejected without a network call.
    #[error("connection is closed")]
    Closed,

    /// Navigation or value access on a closed cursor.
    #[error("cursor is closed")]
    CursorClosed,

    /// Value access with the cursor before the first row or past the last.
    #[error("no current row")]
    NoCurrentRow,

    /// Column name lookup failed, including the case-insensitive fallback.
    #[error("column not found: {name}")]
    ColumnNotFound { name: String },

    /// Capability the protocol does not offer on this connection.
    #[error("operation not supported: {operation}")]
    Unsupported { operation: String },
}

impl ClientError {
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        ClientError::Transport { message: msg.into() }
    }

    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        ClientError::Protocol { message: msg.into() }
    }

    pub fn conversion(literal: impl Into<String>, target: &'static str) -> Self {
        ClientError::TypeConversion { literal: literal.into(), target }
    }

    pub fn unsupported<S: Into<String>>(operation: S) -> Self {
        ClientError::Unsupported { operation: operation.into() }
    }

    /// Machine-readable code: the remote fault id, or 0 for anything local.
    pub fn code(&self) -> i64 {
        match self {
            ClientError::Remote { code, .. } => *code,
            _ => 0,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ClientError::Remote { .. } => ErrorCategory::Remote,
            _ => ErrorCategory::ClientLocal,
        }
    }

    pub fn stack_trace(&self) -> Option<&str> {
        match self {
            ClientError::Remote { stack_trace, .. } => stack_trace.as_deref(),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Transport { message: err.to_string() }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        // Everything reqwest raises itself is wire-level: DNS, connect,
        // timeout, TLS, or a truncated body. Status handling happens before
        // this conversion ever runs.
        ClientError::Transport { message: err.to_string() }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Fault payload the server embeds in a response body when a call fails.
/// The same shape appears under non-2xx statuses and, for calls where failure
/// must not change HTTP semantics, under a 200.
#[derive(Debug, Deserialize)]
struct FaultBody {
    status: String,
    #[serde(default)]
    error_id: i64,
    #[serde(default)]
    error_message: String,
    #[serde(default)]
    stack_trace: Option<String>,
}

/// Try to read a remote fault out of a decoded response body.
pub fn fault_in_body(body: &[u8]) -> Option<ClientError> {
    let fault: FaultBody = serde_json::from_slice(body).ok()?;
    if fault.status.eq_ignore_ascii_case("fail") {
        Some(ClientError::Remote {
            code: fault.error_id,
            message: fault.error_message,
            stack_trace: fault.stack_trace,
        })
    } else {
        None
    }
}

/// Same check against an already-parsed JSON value (used by the materializer,
/// which has the header in hand).
pub fn fault_in_value(value: &serde_json::Value) -> Option<ClientError> {
    if value.get("status").and_then(|s| s.as_str()).map(|s| s.eq_ignore_ascii_case("fail"))
        != Some(true)
    {
        return None;
    }
    Some(ClientError::Remote {
        code: value.get("error_id").and_then(|v| v.as_i64()).unwrap_or(0),
        message: value
            .get("error_message")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        stack_trace: value
            .get("stack_trace")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
    })
}

/// Classify one completed exchange. Returns `None` when the outcome is a
/// genuine success and the body may be handed onward.
///
/// Three disjoint shapes map to an error:
/// 1. a fault payload in the body, at any status (remote fault);
/// 2. a non-2xx status without a parseable fault (defensive protocol error);
/// 3. transport failures never reach here - they convert via `From` before a
///    status exists.
pub fn translate(status: &TransportStatus, body: &[u8]) -> Option<ClientError> {
    if let Some(fault) = fault_in_body(body) {
        return Some(fault);
    }
    if !(200..300).contains(&status.code) {
        return Some(ClientError::Protocol {
            message: format!("HTTP {} {}", status.code, status.reason),
        });
    }
    None
}
