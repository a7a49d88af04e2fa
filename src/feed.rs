use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

pub type ItemId = u32;

const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "webm", "mov", "m4v", "mkv"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("feed is empty")]
    Empty,
    #[error("duplicate feed item id {0}")]
    DuplicateId(ItemId),
    #[error("feed item {0} has no media url")]
    MissingMedia(ItemId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    /// Infers the kind from the extension of the URL path. Query strings and
    /// fragments are ignored; plain file paths work too.
    pub fn from_url(raw: &str) -> Self {
        let trimmed = raw.trim();
        let path = match Url::parse(trimmed) {
            Ok(url) => url.path().to_string(),
            Err(_) => trimmed
                .split(|c: char| c == '?' || c == '#')
                .next()
                .unwrap_or_default()
                .to_string(),
        };
        let extension = Path::new(&path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match extension {
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => MediaKind::Video,
            _ => MediaKind::Image,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Image => "image",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub id: ItemId,
    pub media_url: String,
    pub kind: MediaKind,
    pub author: String,
    pub caption: String,
    pub likes: String,
}

impl FeedItem {
    pub fn new(id: ItemId, media_url: &str, author: &str, caption: &str, likes: &str) -> Self {
        Self {
            id,
            media_url: media_url.trim().to_string(),
            kind: MediaKind::from_url(media_url),
            author: author.to_string(),
            caption: caption.to_string(),
            likes: likes.to_string(),
        }
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FeedEntry {
    id: ItemId,
    media_url: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    caption: String,
    #[serde(default)]
    likes: String,
}

impl From<FeedEntry> for FeedItem {
    fn from(entry: FeedEntry) -> Self {
        FeedItem::new(
            entry.id,
            &entry.media_url,
            &entry.author,
            &entry.caption,
            &entry.likes,
        )
    }
}

pub trait FeedService {
    fn load_feed(&self) -> Result<Vec<FeedItem>>;
}

#[derive(Default)]
pub struct StaticFeedService;

impl FeedService for StaticFeedService {
    fn load_feed(&self) -> Result<Vec<FeedItem>> {
        let items = builtin_reels();
        validate(&items)?;
        Ok(items)
    }
}

pub struct FileFeedService {
    path: PathBuf,
}

impl FileFeedService {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl FeedService for FileFeedService {
    fn load_feed(&self) -> Result<Vec<FeedItem>> {
        let data = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read feed file at {}", self.path.display()))?;
        let entries: Vec<FeedEntry> = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse feed file at {}", self.path.display()))?;
        let items: Vec<FeedItem> = entries.into_iter().map(FeedItem::from).collect();
        validate(&items).with_context(|| format!("invalid feed {}", self.path.display()))?;
        Ok(items)
    }
}

pub fn validate(items: &[FeedItem]) -> Result<(), FeedError> {
    if items.is_empty() {
        return Err(FeedError::Empty);
    }
    let mut seen = HashSet::new();
    for item in items {
        if !seen.insert(item.id) {
            return Err(FeedError::DuplicateId(item.id));
        }
        if item.media_url.is_empty() {
            return Err(FeedError::MissingMedia(item.id));
        }
    }
    Ok(())
}

pub fn builtin_reels() -> Vec<FeedItem> {
    vec![
        FeedItem::new(
            1,
            "https://i.imgur.com/jg6HwrR.gif",
            "aisyahnrln",
            "Trees, fogs, and mountains 🌲🌫️",
            "1.3K",
        ),
        FeedItem::new(
            2,
            "https://i.imgur.com/Wr0K3RI.mp4",
            "forest.walks",
            "Nature heals 🍃🌿",
            "964",
        ),
        FeedItem::new(
            3,
            "https://i.imgur.com/ik1KYPE.mp4",
            "animal",
            "Chasing ",
            "2.1K",
        ),
        FeedItem::new(
            4,
            "https://i.imgur.com/XTOB93W.mp4",
            "urbanvibes",
            "Japan mountains",
            "786",
        ),
        FeedItem::new(
            5,
            "https://i.imgur.com/4A3UV8Z.mp4",
            "pizza",
            "City lights & Pizza 🌃🍸",
            "786",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn infers_kind_from_extension() {
        assert_eq!(
            MediaKind::from_url("https://i.imgur.com/Wr0K3RI.mp4"),
            MediaKind::Video
        );
        assert_eq!(
            MediaKind::from_url("https://i.imgur.com/jg6HwrR.gif"),
            MediaKind::Image
        );
        assert_eq!(
            MediaKind::from_url("https://cdn.test/clip.WEBM?token=abc#t=3"),
            MediaKind::Video
        );
        assert_eq!(MediaKind::from_url("/home/me/clips/a.mov"), MediaKind::Video);
        assert_eq!(MediaKind::from_url("clips/a.mp4?x=1"), MediaKind::Video);
        assert_eq!(MediaKind::from_url("https://cdn.test/video"), MediaKind::Image);
    }

    #[test]
    fn builtin_feed_is_valid_and_ordered() {
        let items = StaticFeedService.load_feed().unwrap();
        let ids: Vec<ItemId> = items.iter().map(|item| item.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(items[0].kind, MediaKind::Image);
        assert!(items[1..].iter().all(FeedItem::is_video));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let items = vec![
            FeedItem::new(1, "a.mp4", "a", "", "1"),
            FeedItem::new(1, "b.mp4", "b", "", "2"),
        ];
        assert_eq!(validate(&items), Err(FeedError::DuplicateId(1)));
        assert_eq!(validate(&[]), Err(FeedError::Empty));
    }

    #[test]
    fn loads_feed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feed.yaml");
        fs::write(
            &path,
            "- id: 7\n  media_url: https://cdn.test/one.mp4\n  author: someone\n  caption: hi\n  likes: \"12\"\n- id: 9\n  media_url: https://cdn.test/two.png\n",
        )
        .unwrap();
        let items = FileFeedService::new(path).load_feed().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].kind, MediaKind::Video);
        assert_eq!(items[1].kind, MediaKind::Image);
        assert_eq!(items[1].author, "");
    }

    #[test]
    fn feed_file_with_blank_media_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feed.yaml");
        fs::write(&path, "- id: 1\n  media_url: \"  \"\n").unwrap();
        let err = FileFeedService::new(path).load_feed().unwrap_err();
        assert_eq!(
            err.downcast_ref::<FeedError>(),
            Some(&FeedError::MissingMedia(1))
        );
    }
}
