//! X (Twitter) API v2 publisher. Primary platform.

use crate::config::TwitterConfig;
use crate::publish::{
    check_status, http_client, read_image, Post, PostRef, PublishError, Publisher,
};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

const CHAR_LIMIT: usize = 280;
const ALT_TEXT_LIMIT: usize = 1000;

#[derive(Debug, Serialize)]
struct CreateTweet<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<TweetMedia>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<TweetReply<'a>>,
}

#[derive(Debug, Serialize)]
struct TweetMedia {
    media_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct TweetReply<'a> {
    in_reply_to_tweet_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

/// Posts tweets with an OAuth2 user-context access token.
pub struct TwitterPublisher {
    config: TwitterConfig,
    client: reqwest::Client,
}

impl TwitterPublisher {
    pub fn new(config: TwitterConfig) -> Result<Self, PublishError> {
        if config.access_token.is_empty() {
            return Err(PublishError::Config("twitter access_token is required".to_string()));
        }
        Ok(Self {
            config,
            client: http_client()?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn upload_media(&self, image: &std::path::Path) -> Result<String, PublishError> {
        let bytes = read_image(image).await?;
        let part = Part::bytes(bytes)
            .file_name("screen.png")
            .mime_str("image/png")
            .map_err(|e| PublishError::Config(e.to_string()))?;
        let form = Form::new()
            .part("media", part)
            .text("media_category", "tweet_image");

        let response = self
            .client
            .post(self.url("/2/media/upload"))
            .bearer_auth(&self.config.access_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        let uploaded: DataEnvelope<IdOnly> = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PublishError::Serialization(e.to_string()))?;
        Ok(uploaded.data.id)
    }

    async fn set_alt_text(&self, media_id: &str, alt_text: &str) -> Result<(), PublishError> {
        let body = serde_json::json!({
            "id": media_id,
            "metadata": { "alt_text": { "text": alt_text } },
        });
        let response = self
            .client
            .post(self.url("/2/media/metadata"))
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;
        check_status(response).await?;
        Ok(())
    }

    /// Upload the image and its description; failures drop the image only.
    async fn attach(&self, post: &Post<'_>) -> Option<String> {
        let image = post.image?;
        let media_id = match self.upload_media(image).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("Twitter media upload failed, posting text only: {e}");
                return None;
            }
        };
        if let Some(alt) = post.alt_text.filter(|a| !a.is_empty()) {
            if let Err(e) = self.set_alt_text(&media_id, alt).await {
                tracing::warn!("Twitter alt text failed: {e}");
            }
        }
        Some(media_id)
    }
}

#[async_trait]
impl Publisher for TwitterPublisher {
    fn name(&self) -> &str {
        "twitter"
    }

    fn char_limit(&self) -> usize {
        CHAR_LIMIT
    }

    fn alt_text_limit(&self) -> usize {
        ALT_TEXT_LIMIT
    }

    async fn publish(&self, post: Post<'_>) -> Result<PostRef, PublishError> {
        let media = self.attach(&post).await.map(|id| TweetMedia {
            media_ids: vec![id],
        });
        let body = CreateTweet {
            text: post.text,
            media,
            reply: post.reply_to.map(|r| TweetReply {
                in_reply_to_tweet_id: &r.parent.id,
            }),
        };

        let response = self
            .client
            .post(self.url("/2/tweets"))
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        let created: DataEnvelope<IdOnly> = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PublishError::Serialization(e.to_string()))?;
        Ok(PostRef::new(created.data.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::ReplyRef;

    #[test]
    fn test_requires_token() {
        assert!(matches!(
            TwitterPublisher::new(TwitterConfig::default()),
            Err(PublishError::Config(_))
        ));
    }

    #[test]
    fn test_reply_body() {
        let reply = ReplyRef {
            root: PostRef::new("1"),
            parent: PostRef::new("2"),
        };
        let body = CreateTweet {
            text: "hola",
            media: None,
            reply: Some(TweetReply {
                in_reply_to_tweet_id: &reply.parent.id,
            }),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"text": "hola", "reply": {"in_reply_to_tweet_id": "2"}})
        );
    }
}
