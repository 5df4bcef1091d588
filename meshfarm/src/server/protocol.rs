//! Line-delimited JSON wire protocol.
//!
//! One request object per line:
//!
//! ```text
//! {"type": "build_single", "params": {"entry_id": "fox", "tier": "mobile"}}
//! {"type": "job_status", "params": {"job_id": "job-7"}}
//! ```
//!
//! and exactly one response object per request:
//!
//! ```text
//! {"status": "success", "result": {...}, "message": null}
//! {"status": "error", "result": null, "message": "Unknown job id 'job-99'"}
//! ```

use crate::catalog::VisualizationMode;
use crate::jobs::JobId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors in the request itself, reported back to the client.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The line is not a JSON request envelope.
    #[error("Malformed request: {0}")]
    Malformed(String),

    /// The `type` is not one the server handles.
    #[error("Unknown request type '{0}'")]
    UnknownType(String),

    /// The params do not fit the request type.
    #[error("Invalid params for '{kind}': {reason}")]
    InvalidParams { kind: &'static str, reason: String },

    /// The line exceeded the frame limit.
    #[error("Request exceeds {0} bytes")]
    TooLong(usize),

    /// No job with this id is known.
    #[error("Unknown job id '{0}'")]
    UnknownJob(JobId),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    params: Value,
}

#[derive(Deserialize)]
struct BuildSingleParams {
    entry_id: String,
    tier: String,
    #[serde(default)]
    mode: VisualizationMode,
}

#[derive(Deserialize, Default)]
struct BuildAllParams {
    #[serde(default)]
    entry_id: Option<String>,
    #[serde(default)]
    mode: Option<VisualizationMode>,
}

#[derive(Deserialize)]
struct JobStatusParams {
    job_id: JobId,
}

/// A request the server understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Build one (entry, tier, mode).
    BuildSingle {
        entry_id: String,
        tier: String,
        mode: VisualizationMode,
    },
    /// Build every tier of one entry, or of the whole catalog.
    BuildAll {
        entry_id: Option<String>,
        mode: Option<VisualizationMode>,
    },
    /// Poll a job by id.
    JobStatus { job_id: JobId },
    /// Liveness and counters.
    HealthCheck,
    /// Catalog contents.
    ListEntries,
}

impl Request {
    /// Wire names of every request type.
    pub const TYPES: [&'static str; 5] = [
        "build_single",
        "build_all",
        "job_status",
        "health_check",
        "list_entries",
    ];

    /// Parses one request line.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(line).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        match envelope.kind.as_str() {
            "build_single" => {
                let p: BuildSingleParams = params("build_single", envelope.params)?;
                Ok(Self::BuildSingle {
                    entry_id: p.entry_id,
                    tier: p.tier,
                    mode: p.mode,
                })
            }
            "build_all" => {
                let p: BuildAllParams = if envelope.params.is_null() {
                    BuildAllParams::default()
                } else {
                    params("build_all", envelope.params)?
                };
                Ok(Self::BuildAll {
                    entry_id: p.entry_id,
                    mode: p.mode,
                })
            }
            "job_status" => {
                let p: JobStatusParams = params("job_status", envelope.params)?;
                Ok(Self::JobStatus { job_id: p.job_id })
            }
            "health_check" => Ok(Self::HealthCheck),
            "list_entries" => Ok(Self::ListEntries),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }

    /// Wire name of this request's type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BuildSingle { .. } => "build_single",
            Self::BuildAll { .. } => "build_all",
            Self::JobStatus { .. } => "job_status",
            Self::HealthCheck => "health_check",
            Self::ListEntries => "list_entries",
        }
    }

    /// Returns true for requests that run builds.
    pub fn is_build(&self) -> bool {
        matches!(self, Self::BuildSingle { .. } | Self::BuildAll { .. })
    }
}

fn params<T: DeserializeOwned>(kind: &'static str, value: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidParams {
        kind,
        reason: e.to_string(),
    })
}

/// Outcome tag of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// One response line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: ResponseStatus,
    pub result: Option<Value>,
    pub message: Option<String>,
}

impl Response {
    pub fn success(result: Value) -> Self {
        Self {
            status: ResponseStatus::Success,
            result: Some(result),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            result: None,
            message: Some(message.into()),
        }
    }

    /// Error carrying a structured result, such as a failed job.
    pub fn error_with(message: impl Into<String>, result: Value) -> Self {
        Self {
            status: ResponseStatus::Error,
            result: Some(result),
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// Serializes the response as one line, without the terminator.
    pub fn to_line(&self) -> String {
        match serde_json::to_string(self) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode response");
                r#"{"status":"error","result":null,"message":"Failed to encode response"}"#
                    .to_string()
            }
        }
    }
}

impl From<ProtocolError> for Response {
    fn from(e: ProtocolError) -> Self {
        Self::error(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_build_single_defaults_mode() {
        let request =
            Request::parse(r#"{"type":"build_single","params":{"entry_id":"fox","tier":"mobile"}}"#)
                .unwrap();
        assert_eq!(
            request,
            Request::BuildSingle {
                entry_id: "fox".into(),
                tier: "mobile".into(),
                mode: VisualizationMode::Normal,
            }
        );
        assert!(request.is_build());
    }

    #[test]
    fn test_parse_build_all_without_params() {
        assert_eq!(
            Request::parse(r#"{"type":"build_all"}"#).unwrap(),
            Request::BuildAll {
                entry_id: None,
                mode: None
            }
        );
        assert_eq!(
            Request::parse(r#"{"type":"build_all","params":{"entry_id":"owl","mode":"xray"}}"#)
                .unwrap(),
            Request::BuildAll {
                entry_id: Some("owl".into()),
                mode: Some(VisualizationMode::Xray)
            }
        );
    }

    #[test]
    fn test_parse_status_and_health() {
        assert_eq!(
            Request::parse(r#"{"type":"job_status","params":{"job_id":"job-3"}}"#).unwrap(),
            Request::JobStatus {
                job_id: JobId::new("job-3")
            }
        );
        assert_eq!(
            Request::parse(r#"{"type":"health_check","params":{}}"#).unwrap(),
            Request::HealthCheck
        );
        assert_eq!(
            Request::parse(r#"{"type":"list_entries"}"#).unwrap(),
            Request::ListEntries
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Request::parse("not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            Request::parse(r#"{"params":{}}"#),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            Request::parse(r#"{"type":"reboot"}"#),
            Err(ProtocolError::UnknownType(t)) if t == "reboot"
        ));
        assert!(matches!(
            Request::parse(r#"{"type":"build_single","params":{"entry_id":"fox"}}"#),
            Err(ProtocolError::InvalidParams { kind: "build_single", .. })
        ));
        assert!(matches!(
            Request::parse(
                r#"{"type":"build_single","params":{"entry_id":"fox","tier":"mobile","mode":"sepia"}}"#
            ),
            Err(ProtocolError::InvalidParams { .. })
        ));
        assert!(matches!(
            Request::parse(r#"{"type":"job_status"}"#),
            Err(ProtocolError::InvalidParams { kind: "job_status", .. })
        ));
    }

    #[test]
    fn test_response_shape() {
        let line = Response::success(json!({"ok": true})).to_line();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["result"]["ok"], true);
        assert!(value["message"].is_null());

        let line = Response::from(ProtocolError::UnknownJob(JobId::new("job-9"))).to_line();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["status"], "error");
        assert!(value["result"].is_null());
        assert_eq!(value["message"], "Unknown job id 'job-9'");
    }
}
