//! Wire format spoken with the runtime.
//!
//! `POST /invoke` with an [`InvocationWire`] body; the runtime answers with
//! an [`InvocationReply`] echoing the invocation id.

use crate::error::{RelayError, Result};
use crate::invocation::{InvocationId, InvocationRequest, ModuleSource};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationWire {
    pub invocation_id: InvocationId,
    pub module_source: ModuleSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_identifier: Option<String>,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl From<&InvocationRequest> for InvocationWire {
    fn from(request: &InvocationRequest) -> Self {
        Self {
            invocation_id: request.id,
            module_source: request.module_source.clone(),
            export_identifier: request.export.clone(),
            args: request.args.clone(),
        }
    }
}

/// Error payload of a failed invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Response body for one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationReply {
    pub invocation_id: InvocationId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

impl InvocationReply {
    pub fn ok(invocation_id: InvocationId, result: Value) -> Self {
        Self {
            invocation_id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(invocation_id: InvocationId, message: impl Into<String>, stack: Option<String>) -> Self {
        Self {
            invocation_id,
            success: false,
            result: None,
            error: Some(RemoteError {
                message: message.into(),
                stack,
            }),
        }
    }

    /// Turn the reply into the invocation outcome.
    pub fn into_result(self) -> Result<Value> {
        if self.success {
            return Ok(self.result.unwrap_or(Value::Null));
        }
        match self.error {
            Some(RemoteError { message, stack }) => {
                Err(RelayError::RemoteExecution { message, stack })
            }
            None => Err(RelayError::Protocol {
                message: "failed reply carries no error payload".to_string(),
            }),
        }
    }
}
