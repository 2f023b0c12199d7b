//! Wire types for the 3D application's control channel (NDJSON over TCP).
//!
//! The channel's contract is intentionally small: a `ping` for liveness,
//! `execute_code` to run a script body against the current scene state, and a
//! dedicated `render` trigger. One JSON object per line in each direction.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Ping,
    ExecuteCode { params: CodeParams },
    Render { params: RenderParams },
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeParams {
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderParams {
    pub path: String,
}

impl Request {
    pub fn execute_code(code: impl Into<String>) -> Self {
        Request::ExecuteCode {
            params: CodeParams { code: code.into() },
        }
    }

    pub fn render(path: impl Into<String>) -> Self {
        Request::Render {
            params: RenderParams { path: path.into() },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    Error,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub status: Status,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Response {
    /// Map an `error` status to an `Err` carrying the application's message
    /// verbatim; the channel reports failures as raw text only.
    pub fn into_result(self) -> anyhow::Result<Option<serde_json::Value>> {
        match self.status {
            Status::Ok => Ok(self.result),
            Status::Error => anyhow::bail!(
                "{}",
                self.message.unwrap_or_else(|| "unspecified remote error".to_string())
            ),
        }
    }
}
