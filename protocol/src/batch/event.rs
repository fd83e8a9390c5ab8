//! The per-batch outcome event.
//!
//! ```json
//! {"batchId":"<host txid>","responses":[
//!   {"id":"t1","status":200,"payload":"1500"},
//!   {"id":"t2","status":500,"error":"insufficient balance: ..."}
//! ]}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LedgerError, LedgerResult};
use crate::stub::{STATUS_ERROR, STATUS_OK};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub id: String,
    pub status: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResponse {
    pub fn success(id: &str, payload: &[u8]) -> Self {
        let payload = if payload.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(payload).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(payload).into_owned())
            }))
        };
        Self {
            id: id.to_string(),
            status: STATUS_OK,
            payload,
            error: None,
        }
    }

    pub fn failure(id: &str, error: &LedgerError) -> Self {
        Self {
            id: id.to_string(),
            status: STATUS_ERROR,
            payload: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEvent {
    pub batch_id: String,
    pub responses: Vec<TaskResponse>,
}

impl BatchEvent {
    pub fn to_bytes(&self) -> LedgerResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| LedgerError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> LedgerResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn failed(&self) -> usize {
        self.responses.iter().filter(|r| !r.is_ok()).count()
    }
}
