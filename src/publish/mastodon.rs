//! Mastodon publisher.

use crate::config::MastodonConfig;
use crate::publish::{
    check_status, http_client, read_image, Post, PostRef, PublishError, Publisher,
};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

const CHAR_LIMIT: usize = 500;
const ALT_TEXT_LIMIT: usize = 1500;

#[derive(Debug, Serialize)]
struct CreateStatus<'a> {
    status: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    media_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    in_reply_to_id: Option<&'a str>,
    language: &'static str,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

/// Posts statuses to a Mastodon instance with an access token.
pub struct MastodonPublisher {
    config: MastodonConfig,
    client: reqwest::Client,
}

impl MastodonPublisher {
    pub fn new(config: MastodonConfig) -> Result<Self, PublishError> {
        if config.access_token.is_empty() {
            return Err(PublishError::Config("mastodon access_token is required".to_string()));
        }
        Ok(Self {
            config,
            client: http_client()?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.instance_url.trim_end_matches('/'), path)
    }

    async fn upload_media(
        &self,
        image: &std::path::Path,
        description: Option<&str>,
    ) -> Result<String, PublishError> {
        let bytes = read_image(image).await?;
        let part = Part::bytes(bytes)
            .file_name("screen.png")
            .mime_str("image/png")
            .map_err(|e| PublishError::Config(e.to_string()))?;
        let mut form = Form::new().part("file", part);
        if let Some(description) = description {
            form = form.text("description", description.to_string());
        }

        let response = self
            .client
            .post(self.url("/api/v2/media"))
            .bearer_auth(&self.config.access_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        let media: IdOnly = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PublishError::Serialization(e.to_string()))?;
        Ok(media.id)
    }
}

#[async_trait]
impl Publisher for MastodonPublisher {
    fn name(&self) -> &str {
        "mastodon"
    }

    fn char_limit(&self) -> usize {
        CHAR_LIMIT
    }

    fn alt_text_limit(&self) -> usize {
        ALT_TEXT_LIMIT
    }

    async fn publish(&self, post: Post<'_>) -> Result<PostRef, PublishError> {
        let mut media_ids = Vec::new();
        if let Some(image) = post.image {
            match self.upload_media(image, post.alt_text).await {
                Ok(id) => media_ids.push(id),
                Err(e) => tracing::warn!("Mastodon media upload failed, posting text only: {e}"),
            }
        }

        let body = CreateStatus {
            status: post.text,
            media_ids,
            in_reply_to_id: post.reply_to.map(|r| r.parent.id.as_str()),
            language: "es",
        };

        let response = self
            .client
            .post(self.url("/api/v1/statuses"))
            .bearer_auth(&self.config.access_token)
            .header("Idempotency-Key", uuid::Uuid::new_v4().to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        let status: IdOnly = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PublishError::Serialization(e.to_string()))?;
        Ok(PostRef::new(status.id))
    }
}
