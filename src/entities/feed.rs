//! Feed catalog: the ordered, immutable list of clips the viewer swipes through.
//!
//! Items are identified by `id`; everything downstream addresses them by
//! position index.

use std::collections::HashSet;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::{FeedError, FeedResult};

/// Decorative per-clip data rendered by the UI collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayMetadata {
    pub username: String,
    pub caption: String,
    pub likes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub media_url: Url,
    #[serde(default)]
    pub metadata: DisplayMetadata,
}

impl FeedItem {
    pub fn new(media_url: Url, metadata: DisplayMetadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            media_url,
            metadata,
        }
    }
}

/// Ordered feed. Built once at load time and shared read-only (`Arc<Feed>`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feed {
    items: Vec<FeedItem>,
}

impl Feed {
    /// Build a feed, rejecting duplicate ids.
    pub fn new(items: Vec<FeedItem>) -> FeedResult<Self> {
        let mut seen = HashSet::with_capacity(items.len());
        for item in &items {
            if !seen.insert(item.id) {
                return Err(FeedError::DuplicateId(item.id));
            }
        }
        Ok(Self { items })
    }

    /// Parse a JSON array of items.
    pub fn from_json(json: &str) -> FeedResult<Self> {
        let items: Vec<FeedItem> = serde_json::from_str(json)?;
        Self::new(items)
    }

    /// Load a JSON catalog from disk. An empty catalog is an error here,
    /// because there is nothing to play.
    pub fn load(path: &Path) -> FeedResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let feed = Self::from_json(&content)?;
        if feed.is_empty() {
            return Err(FeedError::EmptyFeed);
        }
        info!("Loaded feed: {} items from {}", feed.len(), path.display());
        Ok(feed)
    }

    /// Synthesize `count` items under `base` (`{base}/clip-{n}.mp4`).
    pub fn synthetic(base: &Url, count: usize) -> FeedResult<Self> {
        let items = (0..count)
            .map(|n| {
                let url = base.join(&format!("clip-{}.mp4", n))?;
                Ok(FeedItem::new(
                    url,
                    DisplayMetadata {
                        username: format!("@user{}", n + 1),
                        caption: format!("Clip #{}", n + 1),
                        likes: 0,
                    },
                ))
            })
            .collect::<FeedResult<Vec<_>>>()?;
        Self::new(items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FeedItem> {
        self.items.get(index)
    }

    pub fn url_of(&self, index: usize) -> Option<&Url> {
        self.items.get(index).map(|item| &item.media_url)
    }

    /// Like [`get`](Self::get), but out of range is an error.
    pub fn item(&self, index: usize) -> FeedResult<&FeedItem> {
        self.items.get(index).ok_or_else(|| FeedError::IndexOutOfRange {
            index,
            len: self.items.len(),
        })
    }

    /// Position of the item with `id`, if present.
    pub fn position_of(&self, id: Uuid) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://cdn.example.com/clips/").unwrap()
    }

    #[test]
    fn test_synthetic_feed() {
        let feed = Feed::synthetic(&base(), 3).unwrap();
        assert_eq!(feed.len(), 3);
        assert_eq!(
            feed.url_of(2).unwrap().as_str(),
            "https://cdn.example.com/clips/clip-2.mp4"
        );
        assert!(feed.url_of(3).is_none());
        assert!(matches!(
            feed.item(3),
            Err(FeedError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_from_json_defaults_metadata_and_id() {
        let feed = Feed::from_json(
            r#"[{"media_url": "https://cdn.example.com/a.mp4"},
                {"media_url": "https://cdn.example.com/b.mp4",
                 "metadata": {"username": "@b", "likes": 7}}]"#,
        )
        .unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed.get(0).unwrap().metadata, DisplayMetadata::default());
        assert_eq!(feed.get(1).unwrap().metadata.likes, 7);
        assert_ne!(feed.get(0).unwrap().id, feed.get(1).unwrap().id);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let item = FeedItem::new(base(), DisplayMetadata::default());
        let err = Feed::new(vec![item.clone(), item]).unwrap_err();
        assert!(matches!(err, FeedError::DuplicateId(_)));
    }

    #[test]
    fn test_bad_url_is_json_error() {
        let err = Feed::from_json(r#"[{"media_url": "not a url"}]"#).unwrap_err();
        assert!(matches!(err, FeedError::Json(_)));
    }

    #[test]
    fn test_position_of() {
        let feed = Feed::synthetic(&base(), 4).unwrap();
        let id = feed.get(3).unwrap().id;
        assert_eq!(feed.position_of(id), Some(3));
        assert_eq!(feed.position_of(Uuid::new_v4()), None);
    }
}
