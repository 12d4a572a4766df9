//! Error taxonomy for the feed core.
//!
//! Binding failures are absorbed by the coordinator and turned into
//! observable state; only loading/config paths hand these back to callers.

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("media binding failed for index {index} ({url}): {reason}")]
    MediaBinding {
        index: usize,
        url: String,
        reason: String,
    },

    #[error("index {index} out of range (feed has {len} items)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invalid media URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("feed is empty")]
    EmptyFeed,

    #[error("duplicate feed item id: {0}")]
    DuplicateId(uuid::Uuid),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FeedError {
    pub fn kind(&self) -> &'static str {
        match self {
            FeedError::MediaBinding { .. } => "media_binding",
            FeedError::IndexOutOfRange { .. } => "index_out_of_range",
            FeedError::InvalidUrl(_) => "invalid_url",
            FeedError::EmptyFeed => "empty_feed",
            FeedError::DuplicateId(_) => "duplicate_id",
            FeedError::Json(_) => "json",
            FeedError::Io(_) => "io",
        }
    }
}

impl Serialize for FeedError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("FeedError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

pub type FeedResult<T> = Result<T, FeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_carries_kind_and_message() {
        let err = FeedError::IndexOutOfRange { index: 9, len: 5 };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "index_out_of_range");
        assert_eq!(json["message"], "index 9 out of range (feed has 5 items)");
    }
}
