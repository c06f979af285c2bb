//! Open-source YouTube front-ends that expose direct stream addresses.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorKind {
    Piped,
    Invidious,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorProvider {
    pub kind: MirrorKind,
    pub base_url: String,
}

/// A stream picked from a mirror response.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorStream {
    pub title: Option<String>,
    pub url: String,
    pub duration: Option<Duration>,
}

impl MirrorProvider {
    pub fn endpoint(&self, video_id: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        match self.kind {
            MirrorKind::Piped => format!("{}/streams/{}", base, video_id),
            MirrorKind::Invidious => format!("{}/api/v1/videos/{}", base, video_id),
        }
    }

    pub async fn fetch(
        &self,
        http: &reqwest::Client,
        video_id: &str,
        timeout: Duration,
    ) -> anyhow::Result<MirrorStream> {
        let body = http
            .get(self.endpoint(video_id))
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        match self.kind {
            MirrorKind::Piped => parse_piped(&body),
            MirrorKind::Invidious => parse_invidious(&body),
        }
    }
}

/// Queries providers in random order until one of them yields an audio stream.
pub async fn fetch_from_any(
    http: &reqwest::Client,
    providers: &[MirrorProvider],
    video_id: &str,
    timeout: Duration,
) -> anyhow::Result<MirrorStream> {
    if providers.is_empty() {
        anyhow::bail!("no mirror providers configured");
    }

    let mut order: Vec<&MirrorProvider> = providers.iter().collect();
    order.shuffle(&mut rand::rng());

    for provider in &order {
        match provider.fetch(http, video_id, timeout).await {
            Ok(stream) => {
                debug!("Mirror {} resolved {}", provider.base_url, video_id);
                return Ok(stream);
            }
            Err(e) => warn!("Mirror {} failed for {}: {}", provider.base_url, video_id, e),
        }
    }

    anyhow::bail!("all {} mirror providers failed", order.len())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipedStreams {
    title: Option<String>,
    duration: Option<u64>,
    #[serde(default)]
    audio_streams: Vec<PipedAudioStream>,
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipedAudioStream {
    url: Option<String>,
    #[serde(default)]
    bitrate: u64,
}

pub fn parse_piped(body: &str) -> anyhow::Result<MirrorStream> {
    let response: PipedStreams = serde_json::from_str(body)?;
    if let Some(error) = response.error {
        anyhow::bail!("piped error: {}", error);
    }

    let best = response
        .audio_streams
        .into_iter()
        .filter_map(|s| s.url.map(|url| (s.bitrate, url)))
        .max_by_key(|(bitrate, _)| *bitrate)
        .ok_or_else(|| anyhow::anyhow!("piped response has no audio streams"))?;

    Ok(MirrorStream {
        title: response.title,
        url: best.1,
        duration: response.duration.map(Duration::from_secs),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvidiousVideo {
    title: Option<String>,
    length_seconds: Option<u64>,
    #[serde(default)]
    adaptive_formats: Vec<InvidiousFormat>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct InvidiousFormat {
    url: Option<String>,
    #[serde(rename = "type", default)]
    mime_type: String,
    bitrate: Option<Bitrate>,
}

/// Invidious reports bitrates as strings on some versions and numbers on others.
#[derive(Deserialize)]
#[serde(untagged)]
enum Bitrate {
    Number(u64),
    Text(String),
}

impl Bitrate {
    fn value(&self) -> u64 {
        match self {
            Bitrate::Number(n) => *n,
            Bitrate::Text(s) => s.trim().parse().unwrap_or(0),
        }
    }
}

pub fn parse_invidious(body: &str) -> anyhow::Result<MirrorStream> {
    let response: InvidiousVideo = serde_json::from_str(body)?;
    if let Some(error) = response.error {
        anyhow::bail!("invidious error: {}", error);
    }

    let best = response
        .adaptive_formats
        .into_iter()
        .filter(|f| f.mime_type.starts_with("audio/"))
        .filter_map(|f| {
            let bitrate = f.bitrate.as_ref().map(Bitrate::value).unwrap_or(0);
            f.url.map(|url| (bitrate, url))
        })
        .max_by_key(|(bitrate, _)| *bitrate)
        .ok_or_else(|| anyhow::anyhow!("invidious response has no audio formats"))?;

    Ok(MirrorStream {
        title: response.title,
        url: best.1,
        duration: response.length_seconds.map(Duration::from_secs),
    })
}
