use chrono::{SecondsFormat, SubsecRound, Utc};

mod error;
pub use error::Error;

pub type Time = chrono::DateTime<Utc>;

/// Message shown when a submission has an empty name or message
pub const EMPTY_FIELD_MESSAGE: &str = "Name and/or message cannot be empty";

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub i64);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub name: String,
    pub message: String,
    pub created: Time,
}

impl Comment {
    /// Newest comments first, as they are presented to users
    pub fn sort_newest_first(comments: &mut [Comment]) {
        comments.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub name: String,
    pub message: String,
}

impl NewComment {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> NewComment {
        NewComment {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        validate_non_empty("name", &self.name)?;
        validate_non_empty("message", &self.message)?;
        Ok(())
    }
}

fn validate_non_empty(field: &str, value: &str) -> Result<(), Error> {
    match value.trim().is_empty() {
        true => Err(Error::EmptyField(String::from(field))),
        false => Ok(()),
    }
}

/// Answer to a successful comment creation
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CreatedComment {
    pub id: CommentId,
}

/// Body of a `GET /getComment` request
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct GetComment {
    pub id: CommentId,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Current time, at the precision comments are stored with
pub fn now() -> Time {
    Utc::now().trunc_subsecs(3)
}

pub fn format_time(t: &Time) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_time(s: &str) -> anyhow::Result<Time> {
    Ok(chrono::DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}
