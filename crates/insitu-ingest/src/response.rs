//! Caller-facing ingestion results
//!
//! The status codes follow HTTP semantics so a front door can forward them
//! unchanged.

use crate::error::IngestError;
use crate::verifier::ChecksumOutcome;
use http::StatusCode;
use serde::{Serialize, Serializer};

pub const MSG_INGESTED: &str = "ingested";
pub const MSG_INGESTED_UNVERIFIED: &str = "ingested, different sha512";
pub const MSG_ACCEPTED: &str = "ingesting. Not waiting.";
pub const MSG_FAILED: &str = "failed to ingest to parquet";
pub const MSG_ALREADY_INGESTED: &str = "unable to ingest file as it is already ingested";
pub const MSG_REPLACE_MISSING: &str = "unable to replace file as it is new";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ResponseBody {
    fn message(message: &str) -> Self {
        Self {
            message: message.to_string(),
            job_id: None,
            cause: None,
            details: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestResponse {
    #[serde(serialize_with = "serialize_status")]
    pub status: StatusCode,
    #[serde(flatten)]
    pub body: ResponseBody,
}

fn serialize_status<S: Serializer>(status: &StatusCode, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u16(status.as_u16())
}

impl IngestResponse {
    /// 201 when the checksum matched, 203 with the cause otherwise
    pub fn ingested(job_id: &str, outcome: &ChecksumOutcome) -> Self {
        if outcome.verified {
            Self {
                status: StatusCode::CREATED,
                body: ResponseBody {
                    job_id: Some(job_id.to_string()),
                    ..ResponseBody::message(MSG_INGESTED)
                },
            }
        } else {
            Self {
                status: StatusCode::NON_AUTHORITATIVE_INFORMATION,
                body: ResponseBody {
                    job_id: Some(job_id.to_string()),
                    cause: Some(outcome.cause.clone()),
                    ..ResponseBody::message(MSG_INGESTED_UNVERIFIED)
                },
            }
        }
    }

    /// 204: the remaining work continues in the background
    pub fn accepted(job_id: &str) -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            body: ResponseBody {
                job_id: Some(job_id.to_string()),
                ..ResponseBody::message(MSG_ACCEPTED)
            },
        }
    }

    /// 500 for every failure, including the pre-transfer rejections
    pub fn failed(err: &IngestError) -> Self {
        let body = match err {
            IngestError::Conflict(_) => ResponseBody::message(MSG_ALREADY_INGESTED),
            IngestError::NotFoundForReplace(_) => ResponseBody::message(MSG_REPLACE_MISSING),
            other => ResponseBody {
                details: Some(other.to_string()),
                ..ResponseBody::message(MSG_FAILED)
            },
        };
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({ "status": self.status.as_u16(), "message": self.body.message })
        })
    }
}
