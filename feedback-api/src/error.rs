use anyhow::{anyhow, Context};
use serde_json::json;

use crate::{CommentId, EMPTY_FIELD_MESSAGE};

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Name and/or message cannot be empty (empty {0})")]
    EmptyField(String),

    #[error("Comment not found {0:?}")]
    NotFound(CommentId),

    /// The request could not be decoded
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl Error {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::EmptyField(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "error": msg,
                "type": "unknown",
            }),
            Error::EmptyField(field) => json!({
                "error": EMPTY_FIELD_MESSAGE,
                "type": "empty-field",
                "field": field,
            }),
            Error::NotFound(id) => json!({
                "error": "comment not found",
                "type": "not-found",
                "id": id,
            }),
            Error::BadRequest(msg) => json!({
                "error": msg,
                "type": "bad-request",
            }),
        })
        .expect("serializing error")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(String::from(
                    data.get("error").and_then(|msg| msg.as_str()).unwrap_or(""),
                )),
                "empty-field" => Error::EmptyField(String::from(
                    data.get("field")
                        .and_then(|f| f.as_str())
                        .ok_or_else(|| anyhow!("error is an empty field without a field name"))?,
                )),
                "not-found" => Error::NotFound(CommentId(
                    data.get("id")
                        .and_then(|id| id.as_i64())
                        .ok_or_else(|| anyhow!("error is a not-found without a proper id"))?,
                )),
                "bad-request" => Error::BadRequest(String::from(
                    data.get("error").and_then(|msg| msg.as_str()).unwrap_or(""),
                )),
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}
