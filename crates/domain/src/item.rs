//! Clipboard items — one row per capture event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Broad classification of captured clipboard content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Url,
    Image,
    File,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Url => "url",
            Self::Image => "image",
            Self::File => "file",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "url" => Some(Self::Url),
            "image" => Some(Self::Image),
            "file" => Some(Self::File),
            _ => None,
        }
    }

    /// Sniff a content type from raw clipboard text.
    ///
    /// URLs win over file paths; image detection is extension-based since
    /// binary payloads never reach the core (the capture adapter writes
    /// screenshots to disk and passes a path).
    pub fn detect(content: &str) -> Self {
        let trimmed = content.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Self::Url;
        }
        let looks_like_path = (trimmed.starts_with('/') || trimmed.starts_with("~/"))
            && !trimmed.contains('\n');
        if looks_like_path {
            const IMAGE_EXT: [&str; 5] = [".png", ".jpg", ".jpeg", ".gif", ".webp"];
            let lower = trimmed.to_lowercase();
            if IMAGE_EXT.iter().any(|ext| lower.ends_with(ext)) {
                return Self::Image;
            }
            return Self::File;
        }
        Self::Text
    }
}

/// Context the capture adapter observed alongside the clipboard change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureContext {
    pub source_app: Option<String>,
    pub window_title: Option<String>,
    pub surrounding_text: Option<String>,
    pub screenshot_path: Option<String>,
}

/// A captured clipboard event with its contextual metadata.
///
/// Created once by the capture gateway; only `tags` and `analysis` are
/// mutated afterwards (by workflow results), and only atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipboardItem {
    pub id: Uuid,
    pub content: String,
    pub content_type: ContentType,
    pub timestamp: DateTime<Utc>,
    pub source_app: Option<String>,
    pub window_title: Option<String>,
    pub screenshot_path: Option<String>,
    pub surrounding_text: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub analysis: Option<serde_json::Value>,
}

impl ClipboardItem {
    /// Build a new item from raw content and capture context.
    pub fn new(content: String, context: CaptureContext) -> Self {
        let content_type = ContentType::detect(&content);
        Self {
            id: Uuid::new_v4(),
            content,
            content_type,
            timestamp: Utc::now(),
            source_app: context.source_app,
            window_title: context.window_title,
            screenshot_path: context.screenshot_path,
            surrounding_text: context.surrounding_text,
            tags: Vec::new(),
            analysis: None,
        }
    }
}

/// Normalize a tag: lowercase, trimmed, inner whitespace collapsed to `-`.
pub fn normalize_tag(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}
