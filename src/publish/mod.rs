//! Publishing reports to social platforms.
//!
//! Every platform implements [`Publisher`]. [`publish_all`] walks the
//! configured publishers in order; a failure on one platform is logged and
//! recorded but never stops the others.

pub mod bluesky;
pub mod mastodon;
pub mod twitter;

use crate::config::Config;
use crate::report::{chunk_report, truncate_chars};
use async_trait::async_trait;
use std::path::Path;

pub use bluesky::BlueskyPublisher;
pub use mastodon::MastodonPublisher;
pub use twitter::TwitterPublisher;

/// Publisher error types.
#[derive(Debug)]
pub enum PublishError {
    /// Missing credentials or unusable client settings
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Platform returned an error response
    Server { status: u16, message: String },
    /// Unexpected response body
    Serialization(String),
    /// Reading the image failed
    Io(String),
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishError::Config(msg) => write!(f, "Publisher config error: {msg}"),
            PublishError::Network(msg) => write!(f, "Publisher network error: {msg}"),
            PublishError::Server { status, message } => {
                write!(f, "Publisher server error ({status}): {message}")
            }
            PublishError::Serialization(msg) => write!(f, "Publisher serialization error: {msg}"),
            PublishError::Io(msg) => write!(f, "Publisher IO error: {msg}"),
        }
    }
}

impl std::error::Error for PublishError {}

/// Identifier of a published post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRef {
    /// Tweet id, status id, or at:// URI
    pub id: String,
    /// Content hash, for platforms that address posts by (uri, cid)
    pub cid: Option<String>,
}

impl PostRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cid: None,
        }
    }
}

impl std::fmt::Display for PostRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

/// Thread position of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRef {
    /// First post of the thread
    pub root: PostRef,
    /// Post being replied to
    pub parent: PostRef,
}

/// A single post.
#[derive(Debug, Clone, Copy, Default)]
pub struct Post<'a> {
    pub text: &'a str,
    pub image: Option<&'a Path>,
    pub alt_text: Option<&'a str>,
    pub reply_to: Option<&'a ReplyRef>,
}

/// A destination platform.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &str;

    /// Maximum post length in characters.
    fn char_limit(&self) -> usize;

    /// Maximum image description length in characters.
    fn alt_text_limit(&self) -> usize;

    async fn publish(&self, post: Post<'_>) -> Result<PostRef, PublishError>;
}

/// Result of publishing to one platform.
#[derive(Debug)]
pub struct PublishOutcome {
    pub platform: String,
    /// Posts created, in thread order
    pub posted: Vec<PostRef>,
    pub error: Option<PublishError>,
}

impl PublishOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Text and image description for one run.
#[derive(Debug, Clone)]
pub struct Publication<'a> {
    /// Post body, chunked per platform
    pub text: &'a str,
    /// Image description, truncated per platform
    pub alt_text: &'a str,
    pub image: Option<&'a Path>,
    /// Budget used for chunking when lower than the platform limit
    pub chunk_limit: usize,
    /// Post the remaining chunks as replies
    pub thread_replies: bool,
}

/// Publish to every platform in order.
pub async fn publish_all(
    publishers: &[Box<dyn Publisher>],
    publication: &Publication<'_>,
) -> Vec<PublishOutcome> {
    let mut outcomes = Vec::with_capacity(publishers.len());

    for publisher in publishers {
        let outcome = publish_one(publisher.as_ref(), publication).await;
        match &outcome.error {
            None => tracing::info!(
                platform = %outcome.platform,
                posts = outcome.posted.len(),
                first = %outcome.posted.first().map(|p| p.id.as_str()).unwrap_or("-"),
                "published report"
            ),
            Some(e) => tracing::error!(platform = %outcome.platform, "publish failed: {e}"),
        }
        outcomes.push(outcome);
    }

    outcomes
}

/// Positions of the chunks longer than `limit` characters.
///
/// Chunks balance line counts, not characters, so one can exceed the budget
/// it was cut for.
pub fn oversized_chunks(chunks: &[String], limit: usize) -> Vec<usize> {
    chunks
        .iter()
        .enumerate()
        .filter(|(_, c)| c.chars().count() > limit)
        .map(|(i, _)| i)
        .collect()
}

async fn publish_one(publisher: &dyn Publisher, publication: &Publication<'_>) -> PublishOutcome {
    let limit = publication.chunk_limit.min(publisher.char_limit());
    let chunks = chunk_report(publication.text, limit);
    for i in oversized_chunks(&chunks, publisher.char_limit()) {
        tracing::warn!(
            platform = publisher.name(),
            chunk = i,
            chars = chunks[i].chars().count(),
            limit = publisher.char_limit(),
            "chunk exceeds platform limit, the post may be rejected"
        );
    }
    let alt_text = truncate_chars(publication.alt_text, publisher.alt_text_limit());

    let mut outcome = PublishOutcome {
        platform: publisher.name().to_string(),
        posted: Vec::new(),
        error: None,
    };

    let Some((first, rest)) = chunks.split_first() else {
        return outcome;
    };

    let head = Post {
        text: first,
        image: publication.image,
        alt_text: publication.image.map(|_| alt_text.as_str()),
        reply_to: None,
    };
    let root = match publisher.publish(head).await {
        Ok(root) => root,
        Err(e) => {
            outcome.error = Some(e);
            return outcome;
        }
    };
    outcome.posted.push(root.clone());

    if !publication.thread_replies {
        return outcome;
    }

    let mut parent = root.clone();
    for chunk in rest {
        let reply = ReplyRef {
            root: root.clone(),
            parent: parent.clone(),
        };
        let post = Post {
            text: chunk,
            reply_to: Some(&reply),
            ..Post::default()
        };
        match publisher.publish(post).await {
            Ok(id) => {
                outcome.posted.push(id.clone());
                parent = id;
            }
            Err(e) => {
                outcome.error = Some(e);
                break;
            }
        }
    }

    outcome
}

/// Build the publishers that have credentials, primary platform first.
pub fn publishers_from_config(config: &Config) -> Vec<Box<dyn Publisher>> {
    let mut publishers: Vec<Box<dyn Publisher>> = Vec::new();

    if let Some(ref twitter) = config.publish.twitter {
        match TwitterPublisher::new(twitter.clone()) {
            Ok(p) => publishers.push(Box::new(p)),
            Err(e) => tracing::warn!("Twitter disabled: {e}"),
        }
    }
    if let Some(ref bluesky) = config.publish.bluesky {
        match BlueskyPublisher::new(bluesky.clone()) {
            Ok(p) => publishers.push(Box::new(p)),
            Err(e) => tracing::warn!("Bluesky disabled: {e}"),
        }
    }
    if let Some(ref mastodon) = config.publish.mastodon {
        match MastodonPublisher::new(mastodon.clone()) {
            Ok(p) => publishers.push(Box::new(p)),
            Err(e) => tracing::warn!("Mastodon disabled: {e}"),
        }
    }

    publishers
}

/// Shared HTTP client settings for publishers.
pub(crate) fn http_client() -> Result<reqwest::Client, PublishError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|e| PublishError::Config(e.to_string()))
}

/// Turn a non-success response into [`PublishError::Server`].
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, PublishError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(PublishError::Server {
        status: status.as_u16(),
        message,
    })
}

/// Read the image to attach.
pub(crate) async fn read_image(path: &Path) -> Result<Vec<u8>, PublishError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| PublishError::Io(format!("{path:?}: {e}")))
}
