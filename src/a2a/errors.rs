//! A2A error codes.
//!
//! Codes follow JSON-RPC 2.0 conventions:
//! - -32700 to -32600: standard JSON-RPC errors
//! - -32099 to -32000: protocol-specific server errors

use serde::{Deserialize, Serialize};

use crate::jsonrpc::RpcError;

/// Error codes a peer may return in a JSON-RPC error object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum A2AErrorCode {
    JsonParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,

    TaskNotFound = -32001,
    TaskNotCancelable = -32002,
    PushNotificationNotSupported = -32003,
    UnsupportedOperation = -32004,
    ContentTypeNotSupported = -32005,
    InvalidAgentResponse = -32006,
    AuthenticatedExtendedCardNotConfigured = -32007,
}

impl A2AErrorCode {
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            -32700 => Self::JsonParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::InternalError,
            -32001 => Self::TaskNotFound,
            -32002 => Self::TaskNotCancelable,
            -32003 => Self::PushNotificationNotSupported,
            -32004 => Self::UnsupportedOperation,
            -32005 => Self::ContentTypeNotSupported,
            -32006 => Self::InvalidAgentResponse,
            -32007 => Self::AuthenticatedExtendedCardNotConfigured,
            _ => return None,
        })
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            Self::JsonParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::TaskNotFound => "Task not found",
            Self::TaskNotCancelable => "Task not cancelable",
            Self::PushNotificationNotSupported => "Push Notification is not supported",
            Self::UnsupportedOperation => "This operation is not supported",
            Self::ContentTypeNotSupported => "Incompatible content types",
            Self::InvalidAgentResponse => "Invalid agent response",
            Self::AuthenticatedExtendedCardNotConfigured => {
                "Authenticated Extended Card is not configured"
            }
        }
    }
}

/// Human-readable description of a peer-reported error.
pub fn describe(error: &RpcError) -> String {
    match A2AErrorCode::from_code(error.code) {
        Some(code) if error.message.is_empty() => {
            format!("{} ({})", code.default_message(), error.code)
        }
        Some(code) => format!("{}: {} ({})", code.default_message(), error.message, error.code),
        None => error.to_string(),
    }
}
