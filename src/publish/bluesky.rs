//! Bluesky (AT Protocol) publisher.
//!
//! Logs in once per publisher with a handle and app password, then creates
//! `app.bsky.feed.post` records in the account's repo.

use crate::config::BlueskyConfig;
use crate::publish::{
    check_status, http_client, read_image, Post, PostRef, PublishError, Publisher, ReplyRef,
};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::OnceCell;

const CHAR_LIMIT: usize = 300;
const ALT_TEXT_LIMIT: usize = 2000;
const POST_COLLECTION: &str = "app.bsky.feed.post";

#[derive(Debug, Serialize)]
struct CreateSession<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_jwt: String,
    did: String,
}

#[derive(Debug, Deserialize)]
struct UploadedBlob {
    blob: Value,
}

#[derive(Debug, Deserialize)]
struct CreatedRecord {
    uri: String,
    cid: String,
}

/// Byte ranges of `#hashtags`, as rich-text facets.
fn hashtag_facets(text: &str) -> Vec<Value> {
    let mut facets = Vec::new();
    let mut start = None;

    let boundary = |c: char| c.is_whitespace() || (c.is_ascii_punctuation() && c != '_');

    for (i, c) in text.char_indices().chain(std::iter::once((text.len(), ' '))) {
        match start {
            Some(s) if boundary(c) => {
                let tag = &text[s + 1..i];
                if !tag.is_empty() {
                    facets.push(json!({
                        "index": { "byteStart": s, "byteEnd": i },
                        "features": [{ "$type": "app.bsky.richtext.facet#tag", "tag": tag }],
                    }));
                }
                start = None;
            }
            _ => {}
        }
        if c == '#' && start.is_none() {
            let preceded_by_boundary = text[..i].chars().next_back().map_or(true, char::is_whitespace);
            if preceded_by_boundary {
                start = Some(i);
            }
        }
    }

    facets
}

fn strong_ref(post: &PostRef) -> Value {
    json!({ "uri": post.id, "cid": post.cid.clone().unwrap_or_default() })
}

fn post_record(text: &str, embed: Option<Value>, reply: Option<&ReplyRef>) -> Value {
    let mut record = json!({
        "$type": POST_COLLECTION,
        "text": text,
        "createdAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "langs": ["es"],
    });
    let facets = hashtag_facets(text);
    if !facets.is_empty() {
        record["facets"] = Value::Array(facets);
    }
    if let Some(embed) = embed {
        record["embed"] = embed;
    }
    if let Some(reply) = reply {
        record["reply"] = json!({
            "root": strong_ref(&reply.root),
            "parent": strong_ref(&reply.parent),
        });
    }
    record
}

/// Posts to a Bluesky PDS.
pub struct BlueskyPublisher {
    config: BlueskyConfig,
    client: reqwest::Client,
    session: OnceCell<Session>,
}

impl BlueskyPublisher {
    pub fn new(config: BlueskyConfig) -> Result<Self, PublishError> {
        if config.handle.is_empty() || config.app_password.is_empty() {
            return Err(PublishError::Config(
                "bluesky handle and app_password are required".to_string(),
            ));
        }
        Ok(Self {
            config,
            client: http_client()?,
            session: OnceCell::new(),
        })
    }

    fn xrpc(&self, method: &str) -> String {
        format!(
            "{}/xrpc/{}",
            self.config.pds_url.trim_end_matches('/'),
            method
        )
    }

    async fn session(&self) -> Result<&Session, PublishError> {
        self.session
            .get_or_try_init(|| async {
                let response = self
                    .client
                    .post(self.xrpc("com.atproto.server.createSession"))
                    .json(&CreateSession {
                        identifier: &self.config.handle,
                        password: &self.config.app_password,
                    })
                    .send()
                    .await
                    .map_err(|e| PublishError::Network(e.to_string()))?;

                check_status(response)
                    .await?
                    .json::<Session>()
                    .await
                    .map_err(|e| PublishError::Serialization(e.to_string()))
            })
            .await
    }

    async fn upload_blob(
        &self,
        session: &Session,
        image: &std::path::Path,
    ) -> Result<Value, PublishError> {
        let bytes = read_image(image).await?;
        let response = self
            .client
            .post(self.xrpc("com.atproto.repo.uploadBlob"))
            .bearer_auth(&session.access_jwt)
            .header("Content-Type", "image/png")
            .body(bytes)
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        let uploaded: UploadedBlob = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PublishError::Serialization(e.to_string()))?;
        Ok(uploaded.blob)
    }
}

#[async_trait]
impl Publisher for BlueskyPublisher {
    fn name(&self) -> &str {
        "bluesky"
    }

    fn char_limit(&self) -> usize {
        CHAR_LIMIT
    }

    fn alt_text_limit(&self) -> usize {
        ALT_TEXT_LIMIT
    }

    async fn publish(&self, post: Post<'_>) -> Result<PostRef, PublishError> {
        let session = self.session().await?;

        let embed = match post.image {
            Some(image) => match self.upload_blob(session, image).await {
                Ok(blob) => Some(json!({
                    "$type": "app.bsky.embed.images",
                    "images": [{ "alt": post.alt_text.unwrap_or_default(), "image": blob }],
                })),
                Err(e) => {
                    tracing::warn!("Bluesky image upload failed, posting text only: {e}");
                    None
                }
            },
            None => None,
        };

        let body = json!({
            "repo": session.did,
            "collection": POST_COLLECTION,
            "record": post_record(post.text, embed, post.reply_to),
        });
        let response = self
            .client
            .post(self.xrpc("com.atproto.repo.createRecord"))
            .bearer_auth(&session.access_jwt)
            .json(&body)
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        let created: CreatedRecord = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PublishError::Serialization(e.to_string()))?;
        Ok(PostRef {
            id: created.uri,
            cid: Some(created.cid),
        })
    }
}
