//! Request and result types shared by the resize engine and the HTTP layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content address of a resized image.
///
/// Derived from the source URL and the requested dimensions, so two requests
/// for the same URL at the same size always map to the same cache entry and
/// the same in-flight marker.
///
/// # Examples
///
/// ```
/// use imgresize::model::ImageKey;
///
/// let a = ImageKey::derive("https://example.com/cat.jpg", 200, 0);
/// let b = ImageKey::derive("https://example.com/cat.jpg", 200, 0);
/// assert_eq!(a, b);
/// assert_eq!(a.as_str().len(), 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageKey(String);

impl ImageKey {
    /// Hashes `"{url},{width},{height}"` with SHA-256 and hex-encodes the digest.
    pub fn derive(url: &str, width: u32, height: u32) -> Self {
        let digest = Sha256::digest(format!("{url},{width},{height}").as_bytes());
        Self(hex::encode(digest))
    }

    /// Returns the hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ImageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ImageKey {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

/// A batch of source URLs sharing one target size.
///
/// A zero `width` or `height` means "derive this side from the other one,
/// keeping the source aspect ratio".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeRequest {
    pub urls: Vec<String>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

impl ResizeRequest {
    /// Builds a request for `urls`, all resized to `width` × `height`.
    pub fn new(urls: impl IntoIterator<Item = impl Into<String>>, width: u32, height: u32) -> Self {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            width,
            height,
        }
    }

    /// Parses a request from a JSON body.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// Per-URL result status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeStatus {
    Success,
    Enqueued,
    Failure,
}

/// Outcome for one URL of a [`ResizeRequest`], reported in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeOutcome {
    pub id: ImageKey,
    pub result: ResizeStatus,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResizeOutcome {
    /// The image is in the cache; `cached` tells whether it already was.
    pub fn success(id: ImageKey, cached: bool) -> Self {
        Self {
            id,
            result: ResizeStatus::Success,
            cached,
            error: None,
        }
    }

    /// A background resize for the image is queued or already running.
    pub fn enqueued(id: ImageKey) -> Self {
        Self {
            id,
            result: ResizeStatus::Enqueued,
            cached: false,
            error: None,
        }
    }

    /// The image could not be resized; `error` becomes the reported reason.
    pub fn failure(id: ImageKey, error: impl fmt::Display) -> Self {
        Self {
            id,
            result: ResizeStatus::Failure,
            cached: false,
            error: Some(error.to_string()),
        }
    }
}
