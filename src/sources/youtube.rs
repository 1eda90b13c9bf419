//! YouTube content via yt-dlp.

use super::{ContentFetcher, SourceMetadata, SourceType};
use crate::config::YoutubeSettings;
use crate::error::{AvatarError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, instrument, warn};

static VIDEO_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?:
            (?:https?://)?
            (?:www\.|m\.)?
            (?:youtube\.com/watch\?(?:.*&)?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/shorts/|youtube\.com/v/)
            ([a-zA-Z0-9_-]{11})
        )
        |
        ^([a-zA-Z0-9_-]{11})$
    ",
    )
    .expect("Invalid regex")
});

static CHANNEL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^UC[a-zA-Z0-9_-]{22}$").expect("Invalid regex"));

static VTT_TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("Invalid regex"));

/// Extract an 11-character video ID from a URL or bare ID.
pub fn extract_video_id(input: &str) -> Option<String> {
    let caps = VIDEO_ID.captures(input.trim())?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// Resolve a channel handle, channel ID, or URL to the channel's videos URL.
pub fn channel_url(input: &str) -> String {
    let input = input.trim();
    if input.starts_with("http://") || input.starts_with("https://") {
        input.to_string()
    } else if let Some(handle) = input.strip_prefix('@') {
        format!("https://www.youtube.com/@{}/videos", handle)
    } else if CHANNEL_ID.is_match(input) {
        format!("https://www.youtube.com/channel/{}/videos", input)
    } else {
        format!("https://www.youtube.com/@{}/videos", input)
    }
}

fn video_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

/// Convert a WebVTT subtitle file into plain transcript text.
///
/// Cue timings, cue identifiers, header blocks, and inline tags are dropped.
/// Consecutive duplicate lines, which auto-generated captions repeat as
/// they roll, are collapsed.
pub fn parse_vtt(vtt: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut in_header = true;
    let mut skipping_block = false;

    for raw in vtt.lines() {
        let line = raw.trim();

        if in_header {
            if line.is_empty() {
                in_header = false;
            }
            continue;
        }

        if line.is_empty() {
            skipping_block = false;
            continue;
        }
        if skipping_block {
            continue;
        }
        if line.starts_with("NOTE") || line.starts_with("STYLE") || line.starts_with("REGION") {
            skipping_block = true;
            continue;
        }
        if line.contains("-->") || line.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }

        let text = VTT_TAGS
            .replace_all(line, "")
            .replace("&nbsp;", " ")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&");
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        if lines.last().map(String::as_str) == Some(text) {
            continue;
        }
        lines.push(text.to_string());
    }

    lines.join("\n")
}

fn parse_upload_date(json: &Value) -> Option<DateTime<Utc>> {
    let date_str = json["upload_date"].as_str()?;
    NaiveDate::parse_from_str(date_str, "%Y%m%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn copy_fields(json: &Value, keys: &[&str]) -> serde_json::Map<String, Value> {
    keys.iter()
        .filter_map(|k| {
            let value = &json[*k];
            (!value.is_null()).then(|| (k.to_string(), value.clone()))
        })
        .collect()
}

/// yt-dlp arguments for a flat listing of a channel's first `limit` videos.
fn channel_args<'a>(url: &'a str, limit: &'a str) -> [&'a str; 6] {
    [
        "--dump-single-json",
        "--flat-playlist",
        "--no-warnings",
        "--playlist-end",
        limit,
        url,
    ]
}

/// YouTube videos and channels.
pub struct YoutubeFetcher {
    subtitle_languages: String,
    /// Videos listed when building a channel's text.
    max_items: usize,
}

impl YoutubeFetcher {
    pub fn new(settings: &YoutubeSettings) -> Self {
        Self {
            subtitle_languages: settings.subtitle_languages.clone(),
            max_items: settings.max_items,
        }
    }

    fn video_id(&self, input: &str) -> Result<String> {
        extract_video_id(input)
            .ok_or_else(|| AvatarError::InvalidInput(format!("Invalid YouTube video ID or URL: {}", input)))
    }

    async fn run_ytdlp(&self, args: &[&str]) -> Result<String> {
        let output = tokio::process::Command::new("yt-dlp")
            .args(args)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    AvatarError::ToolNotFound("yt-dlp".to_string())
                } else {
                    AvatarError::ContentSource(format!("Failed to run yt-dlp: {}", e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AvatarError::ContentNotFound(format!(
                "yt-dlp could not fetch {}: {}",
                args.last().copied().unwrap_or_default(),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn video_json(&self, video_id: &str) -> Result<Value> {
        let url = video_url(video_id);
        let stdout = self
            .run_ytdlp(&["--dump-json", "--skip-download", "--no-warnings", &url])
            .await?;
        serde_json::from_str(&stdout)
            .map_err(|e| AvatarError::ContentSource(format!("Failed to parse yt-dlp output: {}", e)))
    }

    async fn channel_json(&self, channel: &str, limit: usize) -> Result<Value> {
        let url = channel_url(channel);
        let limit = limit.to_string();
        let stdout = self.run_ytdlp(&channel_args(&url, &limit)).await?;
        serde_json::from_str(&stdout)
            .map_err(|e| AvatarError::ContentSource(format!("Failed to parse yt-dlp output: {}", e)))
    }

    /// Download subtitles for a video and return the transcript, if any exist.
    #[instrument(skip(self))]
    async fn fetch_transcript(&self, video_id: &str) -> Result<Option<String>> {
        let dir = tempfile::tempdir()?;
        let template = dir.path().join("%(id)s.%(ext)s");
        let template = template.to_string_lossy();
        let url = video_url(video_id);

        self.run_ytdlp(&[
            "--skip-download",
            "--write-subs",
            "--write-auto-subs",
            "--sub-langs",
            &self.subtitle_languages,
            "--sub-format",
            "vtt",
            "--no-warnings",
            "-o",
            &template,
            &url,
        ])
        .await?;

        let Some(path) = first_vtt(dir.path())? else {
            return Ok(None);
        };
        debug!("Parsing subtitles from {}", path.display());

        let vtt = tokio::fs::read_to_string(&path).await?;
        let transcript = parse_vtt(&vtt);
        Ok((!transcript.is_empty()).then_some(transcript))
    }
}

fn first_vtt(dir: &Path) -> Result<Option<std::path::PathBuf>> {
    let mut candidates: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "vtt"))
        .collect();
    candidates.sort();
    Ok(candidates.into_iter().next())
}

#[async_trait]
impl ContentFetcher for YoutubeFetcher {
    fn supports(&self, source_type: SourceType) -> bool {
        matches!(source_type, SourceType::YoutubeVideo | SourceType::YoutubeChannel)
    }

    async fn get_text(&self, source_type: SourceType, source_id: &str) -> Result<String> {
        match source_type {
            SourceType::YoutubeVideo => {
                let video_id = self.video_id(source_id)?;
                if let Some(transcript) = self.fetch_transcript(&video_id).await? {
                    return Ok(transcript);
                }

                warn!("No subtitles for {}, falling back to description", video_id);
                let json = self.video_json(&video_id).await?;
                json["description"]
                    .as_str()
                    .filter(|d| !d.trim().is_empty())
                    .map(|d| d.to_string())
                    .ok_or_else(|| {
                        AvatarError::ContentSource(format!(
                            "No transcript or description available for {}",
                            video_id
                        ))
                    })
            }
            SourceType::YoutubeChannel => {
                let json = self.channel_json(source_id, self.max_items).await?;
                let mut parts = Vec::new();
                if let Some(description) = json["description"].as_str() {
                    parts.push(description.to_string());
                }
                if let Some(entries) = json["entries"].as_array() {
                    parts.extend(
                        entries
                            .iter()
                            .filter_map(|e| e["title"].as_str())
                            .map(|t| t.to_string()),
                    );
                }
                Ok(parts.join("\n"))
            }
            other => Err(AvatarError::InvalidInput(format!(
                "YouTube fetcher cannot handle {}",
                other
            ))),
        }
    }

    async fn get_metadata(&self, source_type: SourceType, source_id: &str) -> Result<SourceMetadata> {
        match source_type {
            SourceType::YoutubeVideo => {
                let video_id = self.video_id(source_id)?;
                let json = self.video_json(&video_id).await?;

                let mut extra = copy_fields(
                    &json,
                    &["view_count", "like_count", "comment_count", "duration", "tags"],
                );
                if let Some(channel) = json["channel"].as_str().or_else(|| json["uploader"].as_str()) {
                    extra.insert("channel".to_string(), Value::String(channel.to_string()));
                }

                Ok(SourceMetadata {
                    title: json["title"].as_str().unwrap_or("Unknown Title").to_string(),
                    url: Some(video_url(&video_id)),
                    published_at: parse_upload_date(&json),
                    extra,
                })
            }
            SourceType::YoutubeChannel => {
                let json = self.channel_json(source_id, 1).await?;
                let title = json["channel"]
                    .as_str()
                    .or_else(|| json["title"].as_str())
                    .or_else(|| json["uploader"].as_str())
                    .unwrap_or(source_id)
                    .to_string();

                Ok(SourceMetadata {
                    title,
                    url: Some(channel_url(source_id)),
                    published_at: None,
                    extra: copy_fields(&json, &["channel_id", "channel_follower_count", "playlist_count"]),
                })
            }
            other => Err(AvatarError::InvalidInput(format!(
                "YouTube fetcher cannot handle {}",
                other
            ))),
        }
    }

    #[instrument(skip(self))]
    async fn list_items(&self, source_type: SourceType, source_id: &str, limit: usize) -> Result<Vec<String>> {
        if source_type != SourceType::YoutubeChannel {
            return Err(AvatarError::InvalidInput(format!("{} is not a collection", source_type)));
        }

        let json = self.channel_json(source_id, limit).await?;
        let ids: Vec<String> = json["entries"]
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| e["id"].as_str().or_else(|| e["url"].as_str()))
                    .filter_map(extract_video_id)
                    .take(limit)
                    .collect()
            })
            .unwrap_or_default();

        debug!("Found {} videos", ids.len());
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_video_id() {
        for input in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
            "dQw4w9WgXcQ",
        ] {
            assert_eq!(extract_video_id(input), Some("dQw4w9WgXcQ".to_string()), "{}", input);
        }

        assert_eq!(extract_video_id("not a video"), None);
        assert_eq!(extract_video_id("https://example.com/watch?v=abc"), None);
    }

    #[test]
    fn test_channel_url() {
        assert_eq!(channel_url("@creator"), "https://www.youtube.com/@creator/videos");
        assert_eq!(
            channel_url("UCabcdefghijklmnopqrstuv"),
            "https://www.youtube.com/channel/UCabcdefghijklmnopqrstuv/videos"
        );
        assert_eq!(
            channel_url("https://www.youtube.com/@creator"),
            "https://www.youtube.com/@creator"
        );
    }

    #[test]
    fn test_parse_vtt() {
        let vtt = "WEBVTT\nKind: captions\nLanguage: en\n\n\
                   NOTE generated by a tool\nsecond note line\n\n\
                   1\n00:00:00.000 --> 00:00:02.000\nHello <c>and</c> welcome\n\n\
                   00:00:02.000 --> 00:00:04.000 align:start position:0%\nHello and welcome\nto the show &amp; more\n\n\
                   00:00:04.000 --> 00:00:06.000\n<00:00:04.500><c>today</c>\n";

        assert_eq!(parse_vtt(vtt), "Hello and welcome\nto the show & more\ntoday");
    }

    #[test]
    fn test_parse_vtt_header_only() {
        assert_eq!(parse_vtt("WEBVTT\n"), "");
        assert_eq!(parse_vtt(""), "");
    }

    #[test]
    fn test_upload_date() {
        let json = serde_json::json!({ "upload_date": "20240115" });
        let date = parse_upload_date(&json).unwrap();
        assert_eq!(date.to_rfc3339(), "2024-01-15T00:00:00+00:00");

        assert!(parse_upload_date(&serde_json::json!({ "upload_date": "2024" })).is_none());
    }

    #[test]
    fn test_supports() {
        let fetcher = YoutubeFetcher::new(&YoutubeSettings::default());
        assert!(fetcher.supports(SourceType::YoutubeVideo));
        assert!(fetcher.supports(SourceType::YoutubeChannel));
        assert!(!fetcher.supports(SourceType::InstagramPost));
    }

    #[test]
    fn test_channel_listing_uses_max_items() {
        let settings = YoutubeSettings {
            max_items: 3,
            ..YoutubeSettings::default()
        };
        let fetcher = YoutubeFetcher::new(&settings);
        assert_eq!(fetcher.max_items, 3);

        let url = channel_url("@maya");
        let limit = fetcher.max_items.to_string();
        let args = channel_args(&url, &limit);
        assert_eq!(&args[3..], ["--playlist-end", "3", "https://www.youtube.com/@maya/videos"]);
    }
}
