//! Instagram posts and accounts via the Graph API.

use super::{ContentFetcher, SourceMetadata, SourceType};
use crate::config::InstagramSettings;
use crate::error::{AvatarError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

const POST_FIELDS: &str = "id,caption,media_type,permalink,timestamp,like_count,comments_count,username";
const ACCOUNT_FIELDS: &str = "id,username,name,biography,followers_count,media_count";
const MEDIA_FIELDS: &str = "id,caption,timestamp,permalink";

/// Parse Graph API timestamps such as `2024-01-15T10:00:00+0000`.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let ts = value.as_str()?;
    DateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_rfc3339(ts))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn copy_fields(json: &Value, keys: &[&str]) -> serde_json::Map<String, Value> {
    keys.iter()
        .filter_map(|k| {
            let value = &json[*k];
            (!value.is_null()).then(|| (k.to_string(), value.clone()))
        })
        .collect()
}

/// Message of a Graph API error body, or the raw body when it is not JSON.
fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => json["error"]["message"]
            .as_str()
            .unwrap_or("unknown error")
            .to_string(),
        Err(_) if body.trim().is_empty() => "empty response".to_string(),
        Err(_) => body.trim().chars().take(200).collect(),
    }
}

/// Instagram Graph API client.
pub struct InstagramFetcher {
    client: reqwest::Client,
    base_url: String,
    api_version: String,
    access_token: String,
    /// Posts read when building an account's text.
    max_items: usize,
}

impl InstagramFetcher {
    /// Create a fetcher. Fails with `NotConfigured` when no access token is available.
    pub fn new(settings: &InstagramSettings, timeout_seconds: u64) -> Result<Self> {
        let access_token = settings
            .resolve_access_token()
            .ok_or_else(|| AvatarError::NotConfigured("Instagram access token".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_version: settings.api_version.clone(),
            access_token,
            max_items: settings.max_items,
        })
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let base = format!("{}/{}/{}", self.base_url, self.api_version, path);
        let params = params
            .iter()
            .copied()
            .chain(std::iter::once(("access_token", self.access_token.as_str())));
        Url::parse_with_params(&base, params)
            .map_err(|e| AvatarError::Config(format!("Invalid Instagram API URL {}: {}", base, e)))
    }

    #[instrument(skip(self, params))]
    async fn get_json(&self, path: &str, params: &[(&str, &str)]) -> Result<Value> {
        let url = self.endpoint(path, params)?;
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = api_error_message(&text);
            return Err(if status == reqwest::StatusCode::NOT_FOUND {
                AvatarError::ContentNotFound(format!("Instagram object {}: {}", path, message))
            } else {
                AvatarError::ContentSource(format!("Instagram API error ({}): {}", status, message))
            });
        }

        Ok(response.json().await?)
    }

    async fn media(&self, account_id: &str, limit: usize) -> Result<Vec<Value>> {
        let limit = limit.to_string();
        let body = self
            .get_json(
                &format!("{}/media", account_id),
                &[("fields", MEDIA_FIELDS), ("limit", &limit)],
            )
            .await?;

        Ok(body["data"].as_array().cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ContentFetcher for InstagramFetcher {
    fn supports(&self, source_type: SourceType) -> bool {
        matches!(source_type, SourceType::InstagramPost | SourceType::InstagramAccount)
    }

    async fn get_text(&self, source_type: SourceType, source_id: &str) -> Result<String> {
        match source_type {
            SourceType::InstagramPost => {
                let post = self.get_json(source_id, &[("fields", "caption")]).await?;
                Ok(post["caption"].as_str().unwrap_or_default().to_string())
            }
            SourceType::InstagramAccount => {
                let account = self.get_json(source_id, &[("fields", "biography")]).await?;
                let mut parts: Vec<String> = account["biography"]
                    .as_str()
                    .map(|b| b.to_string())
                    .into_iter()
                    .collect();

                let posts = self.media(source_id, self.max_items).await?;
                parts.extend(
                    posts
                        .iter()
                        .filter_map(|p| p["caption"].as_str())
                        .map(|c| c.to_string()),
                );
                Ok(parts.join("\n"))
            }
            other => Err(AvatarError::InvalidInput(format!(
                "Instagram fetcher cannot handle {}",
                other
            ))),
        }
    }

    async fn get_metadata(&self, source_type: SourceType, source_id: &str) -> Result<SourceMetadata> {
        match source_type {
            SourceType::InstagramPost => {
                let post = self.get_json(source_id, &[("fields", POST_FIELDS)]).await?;
                let title = post["username"]
                    .as_str()
                    .map(|u| format!("Instagram post by @{}", u))
                    .unwrap_or_else(|| format!("Instagram post {}", source_id));

                Ok(SourceMetadata {
                    title,
                    url: post["permalink"].as_str().map(|s| s.to_string()),
                    published_at: parse_timestamp(&post["timestamp"]),
                    extra: copy_fields(&post, &["media_type", "like_count", "comments_count", "username"]),
                })
            }
            SourceType::InstagramAccount => {
                let account = self.get_json(source_id, &[("fields", ACCOUNT_FIELDS)]).await?;
                let username = account["username"].as_str().unwrap_or(source_id);
                let title = account["name"]
                    .as_str()
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| format!("@{}", username));

                Ok(SourceMetadata {
                    title,
                    url: Some(format!("https://www.instagram.com/{}/", username)),
                    published_at: None,
                    extra: copy_fields(&account, &["username", "followers_count", "media_count"]),
                })
            }
            other => Err(AvatarError::InvalidInput(format!(
                "Instagram fetcher cannot handle {}",
                other
            ))),
        }
    }

    async fn list_items(&self, source_type: SourceType, source_id: &str, limit: usize) -> Result<Vec<String>> {
        if source_type != SourceType::InstagramAccount {
            return Err(AvatarError::InvalidInput(format!("{} is not a collection", source_type)));
        }

        let ids: Vec<String> = self
            .media(source_id, limit)
            .await?
            .iter()
            .filter_map(|p| p["id"].as_str().map(|s| s.to_string()))
            .take(limit)
            .collect();

        debug!("Found {} posts", ids.len());
        Ok(ids)
    }
}
