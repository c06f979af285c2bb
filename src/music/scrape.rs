//! Reads the player response embedded in a YouTube watch page.

use crate::music::reference::{watch_url, BROWSER_USER_AGENT};
use serde::Deserialize;
use std::time::Duration;

const PLAYER_RESPONSE_MARKER: &str = "ytInitialPlayerResponse";

#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedStream {
    pub title: Option<String>,
    pub url: String,
    pub duration: Option<Duration>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    playability_status: Option<PlayabilityStatus>,
    streaming_data: Option<StreamingData>,
    video_details: Option<VideoDetails>,
}

#[derive(Deserialize)]
struct PlayabilityStatus {
    status: String,
    reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamingData {
    #[serde(default)]
    adaptive_formats: Vec<Format>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Format {
    url: Option<String>,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    bitrate: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoDetails {
    title: Option<String>,
    length_seconds: Option<String>,
}

pub async fn scrape_watch_page(
    http: &reqwest::Client,
    video_id: &str,
    timeout: Duration,
) -> anyhow::Result<ScrapedStream> {
    let page = http
        .get(watch_url(video_id))
        .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
        .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    parse_watch_page(&page)
}

pub fn parse_watch_page(page: &str) -> anyhow::Result<ScrapedStream> {
    let marker = page
        .find(PLAYER_RESPONSE_MARKER)
        .ok_or_else(|| anyhow::anyhow!("watch page has no player response"))?;
    let after = &page[marker + PLAYER_RESPONSE_MARKER.len()..];
    let start = after
        .find('{')
        .ok_or_else(|| anyhow::anyhow!("player response is not an object"))?;

    // The object is followed by more script; parse exactly one JSON value.
    let response: PlayerResponse = serde_json::Deserializer::from_str(&after[start..])
        .into_iter::<PlayerResponse>()
        .next()
        .ok_or_else(|| anyhow::anyhow!("player response is empty"))??;

    if let Some(status) = &response.playability_status {
        if status.status != "OK" {
            anyhow::bail!(
                "video not playable ({}): {}",
                status.status,
                status.reason.as_deref().unwrap_or("no reason given")
            );
        }
    }

    let url = response
        .streaming_data
        .map(|data| data.adaptive_formats)
        .unwrap_or_default()
        .into_iter()
        .filter(|f| f.mime_type.starts_with("audio/"))
        // Formats behind a signature cipher need the player script to decode
        .filter_map(|f| f.url.map(|url| (f.bitrate, url)))
        .max_by_key(|(bitrate, _)| *bitrate)
        .map(|(_, url)| url)
        .ok_or_else(|| anyhow::anyhow!("no directly playable audio format on watch page"))?;

    let (title, duration) = match response.video_details {
        Some(details) => (
            details.title,
            details
                .length_seconds
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs),
        ),
        None => (None, None),
    };

    Ok(ScrapedStream {
        title,
        url,
        duration,
    })
}
