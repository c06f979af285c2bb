//! The fallback chain that turns a queued track into something songbird can play.
//!
//! Each strategy is independent and unreliable. They are tried in order and the
//! first success wins; every failure is logged and the chain moves on. Remote
//! results are cached per video id so a track queued now is not resolved twice.

use crate::cache::StreamCache;
use crate::config::Config;
use crate::music::mirrors::{self, MirrorProvider};
use crate::music::reference::PendingTrack;
use crate::music::scrape;
use crate::music::ytdlp::YtDlp;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum StreamSource {
    Remote(String),
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStream {
    pub title: String,
    pub source: StreamSource,
    pub duration: Option<Duration>,
    /// Name of the strategy that produced the stream.
    pub resolved_by: &'static str,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{0} cannot handle this track")]
    Unsupported(&'static str),
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
    #[error("could not resolve an audio stream ({})", format_attempts(.0))]
    Exhausted(Vec<StrategyFailure>),
}

#[derive(Debug)]
pub struct StrategyFailure {
    pub strategy: &'static str,
    pub reason: String,
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.reason)
    }
}

fn format_attempts(attempts: &[StrategyFailure]) -> String {
    if attempts.is_empty() {
        return "no strategies configured".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[async_trait]
pub trait ResolveStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn resolve(&self, track: &PendingTrack) -> Result<ResolvedStream, ResolveError>;
}

pub struct ResolutionChain {
    strategies: Vec<Arc<dyn ResolveStrategy>>,
    cache: StreamCache,
}

impl ResolutionChain {
    pub fn new(strategies: Vec<Arc<dyn ResolveStrategy>>, cache: StreamCache) -> Self {
        Self { strategies, cache }
    }

    /// The production order: extractor, mirrors, scraping, then download.
    pub fn from_config(config: &Config, http: reqwest::Client, cache: StreamCache) -> Self {
        let ytdlp = YtDlp::new(&config.ytdlp_path, config.youtube_cookies.clone());
        let strategies: Vec<Arc<dyn ResolveStrategy>> = vec![
            Arc::new(ExtractorStrategy {
                ytdlp: ytdlp.clone(),
            }),
            Arc::new(MirrorStrategy {
                http: http.clone(),
                providers: config.mirror_providers.clone(),
                timeout: config.mirror_timeout,
            }),
            Arc::new(ScrapeStrategy {
                http,
                timeout: config.mirror_timeout,
            }),
            Arc::new(DownloadStrategy {
                ytdlp,
                dir: PathBuf::from(&config.youtube_download_dir),
            }),
        ];
        Self::new(strategies, cache)
    }

    pub async fn resolve(&self, track: &PendingTrack) -> Result<ResolvedStream, ResolveError> {
        if let Some(id) = &track.video_id {
            if let Some(cached) = self.cache.get(id) {
                debug!("Stream cache hit for {}", id);
                return Ok(cached);
            }
        }

        let mut failures = Vec::new();
        for strategy in &self.strategies {
            match strategy.resolve(track).await {
                Ok(stream) => {
                    info!(
                        "Resolved '{}' via {} after {} failed attempt(s)",
                        stream.title,
                        strategy.name(),
                        failures.len()
                    );
                    if let (Some(id), StreamSource::Remote(_)) = (&track.video_id, &stream.source) {
                        self.cache.insert(id, stream.clone());
                    }
                    return Ok(stream);
                }
                Err(ResolveError::Unsupported(name)) => {
                    debug!("Skipping {} for {}", name, track.url);
                    failures.push(StrategyFailure {
                        strategy: strategy.name(),
                        reason: "not applicable".to_string(),
                    });
                }
                Err(e) => {
                    warn!("Strategy {} failed for {}: {}", strategy.name(), track.url, e);
                    failures.push(StrategyFailure {
                        strategy: strategy.name(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Err(ResolveError::Exhausted(failures))
    }
}

fn title_or(fetched: Option<String>, track: &PendingTrack) -> String {
    fetched
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| track.title.clone())
}

/// General-purpose media extraction through yt-dlp.
pub struct ExtractorStrategy {
    ytdlp: YtDlp,
}

#[async_trait]
impl ResolveStrategy for ExtractorStrategy {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn resolve(&self, track: &PendingTrack) -> Result<ResolvedStream, ResolveError> {
        let info = self.ytdlp.extract(&track.url).await?;
        let url = info
            .url
            .ok_or_else(|| anyhow::anyhow!("Could not extract audio URL from video"))?;
        Ok(ResolvedStream {
            title: title_or(info.title, track),
            source: StreamSource::Remote(url),
            duration: info
                .duration
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok()),
            resolved_by: self.name(),
        })
    }
}

/// Piped and Invidious instances, tried in random order.
pub struct MirrorStrategy {
    http: reqwest::Client,
    providers: Vec<MirrorProvider>,
    timeout: Duration,
}

#[async_trait]
impl ResolveStrategy for MirrorStrategy {
    fn name(&self) -> &'static str {
        "mirrors"
    }

    async fn resolve(&self, track: &PendingTrack) -> Result<ResolvedStream, ResolveError> {
        let video_id = track
            .video_id
            .as_deref()
            .ok_or(ResolveError::Unsupported(self.name()))?;
        let stream =
            mirrors::fetch_from_any(&self.http, &self.providers, video_id, self.timeout).await?;
        Ok(ResolvedStream {
            title: title_or(stream.title, track),
            source: StreamSource::Remote(stream.url),
            duration: stream.duration,
            resolved_by: self.name(),
        })
    }
}

/// Raw watch page scraping.
pub struct ScrapeStrategy {
    http: reqwest::Client,
    timeout: Duration,
}

#[async_trait]
impl ResolveStrategy for ScrapeStrategy {
    fn name(&self) -> &'static str {
        "scrape"
    }

    async fn resolve(&self, track: &PendingTrack) -> Result<ResolvedStream, ResolveError> {
        let video_id = track
            .video_id
            .as_deref()
            .ok_or(ResolveError::Unsupported(self.name()))?;
        let stream = scrape::scrape_watch_page(&self.http, video_id, self.timeout).await?;
        Ok(ResolvedStream {
            title: title_or(stream.title, track),
            source: StreamSource::Remote(stream.url),
            duration: stream.duration,
            resolved_by: self.name(),
        })
    }
}

/// Last resort: download the audio and play it from disk.
pub struct DownloadStrategy {
    ytdlp: YtDlp,
    dir: PathBuf,
}

#[async_trait]
impl ResolveStrategy for DownloadStrategy {
    fn name(&self) -> &'static str {
        "download"
    }

    async fn resolve(&self, track: &PendingTrack) -> Result<ResolvedStream, ResolveError> {
        let path = self.ytdlp.download(&track.url, &self.dir).await?;
        Ok(ResolvedStream {
            title: track.title.clone(),
            source: StreamSource::File(path),
            duration: None,
            resolved_by: self.name(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Strategy double that replays a fixed outcome and counts calls.
    pub(crate) struct FakeStrategy {
        pub name: &'static str,
        pub outcome: Result<StreamSource, &'static str>,
        pub calls: AtomicUsize,
    }

    impl FakeStrategy {
        pub(crate) fn ok(name: &'static str, source: StreamSource) -> Arc<Self> {
            Arc::new(Self {
                name,
                outcome: Ok(source),
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn failing(name: &'static str, reason: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                outcome: Err(reason),
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResolveStrategy for FakeStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn resolve(&self, track: &PendingTrack) -> Result<ResolvedStream, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.outcome {
                Ok(source) => Ok(ResolvedStream {
                    title: format!("{} via {}", track.title, self.name),
                    source: source.clone(),
                    duration: None,
                    resolved_by: self.name,
                }),
                Err("unsupported") => Err(ResolveError::Unsupported(self.name)),
                Err(reason) => Err(anyhow::anyhow!(*reason).into()),
            }
        }
    }

    fn remote(url: &str) -> StreamSource {
        StreamSource::Remote(url.to_string())
    }

    fn track() -> PendingTrack {
        PendingTrack::from_video_id("dQw4w9WgXcQ", "Song")
    }

    fn cache() -> StreamCache {
        StreamCache::new(16, Duration::from_secs(3600))
    }

    fn chain(strategies: &[&Arc<FakeStrategy>]) -> ResolutionChain {
        let strategies = strategies
            .iter()
            .map(|s| (*s).clone() as Arc<dyn ResolveStrategy>)
            .collect();
        ResolutionChain::new(strategies, cache())
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let first = FakeStrategy::failing("first", "timed out");
        let second = FakeStrategy::ok("second", remote("https://a"));
        let third = FakeStrategy::ok("third", remote("https://b"));
        let chain = chain(&[&first, &second, &third]);

        let stream = chain.resolve(&track()).await.unwrap();
        assert_eq!(stream.resolved_by, "second");
        assert_eq!(stream.source, remote("https://a"));
        assert_eq!(first.calls(), 1);
        assert_eq!(third.calls(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_lists_every_failure() {
        let chain = chain(&[
            &FakeStrategy::failing("a", "boom"),
            &FakeStrategy::failing("b", "unsupported"),
            &FakeStrategy::failing("c", "403 Forbidden"),
        ]);

        let err = chain.resolve(&track()).await.unwrap_err();
        let ResolveError::Exhausted(failures) = &err else {
            panic!("expected exhaustion, got {err:?}");
        };
        assert_eq!(failures.len(), 3);
        assert_eq!(failures[1].reason, "not applicable");
        let message = err.to_string();
        assert!(message.contains("a: boom"));
        assert!(message.contains("c: 403 Forbidden"));
    }

    #[tokio::test]
    async fn test_remote_results_are_cached_by_video_id() {
        let strategy = FakeStrategy::ok("only", remote("https://a"));
        let chain = chain(&[&strategy]);

        chain.resolve(&track()).await.unwrap();
        let again = chain.resolve(&track()).await.unwrap();
        assert_eq!(again.resolved_by, "only");
        assert_eq!(strategy.calls(), 1);
    }

    #[tokio::test]
    async fn test_local_files_are_not_cached() {
        let strategy = FakeStrategy::ok("download", StreamSource::File(PathBuf::from("/tmp/a.mp3")));
        let chain = chain(&[&strategy]);

        chain.resolve(&track()).await.unwrap();
        chain.resolve(&track()).await.unwrap();
        assert_eq!(strategy.calls(), 2);
    }

    #[tokio::test]
    async fn test_tracks_without_id_skip_cache() {
        let strategy = FakeStrategy::ok("only", remote("https://a"));
        let chain = chain(&[&strategy]);
        let track = PendingTrack::new("https://soundcloud.com/a/b", "Cloud");

        chain.resolve(&track).await.unwrap();
        chain.resolve(&track).await.unwrap();
        assert_eq!(strategy.calls(), 2);
    }

    #[tokio::test]
    async fn test_mirror_and_scrape_need_video_id() {
        let http = reqwest::Client::new();
        let track = PendingTrack::new("https://soundcloud.com/a/b", "Cloud");

        let mirror = MirrorStrategy {
            http: http.clone(),
            providers: Vec::new(),
            timeout: Duration::from_secs(1),
        };
        assert!(matches!(
            mirror.resolve(&track).await,
            Err(ResolveError::Unsupported("mirrors"))
        ));

        let scrape = ScrapeStrategy {
            http,
            timeout: Duration::from_secs(1),
        };
        assert!(matches!(
            scrape.resolve(&track).await,
            Err(ResolveError::Unsupported("scrape"))
        ));
    }

    #[test]
    fn test_empty_chain_message() {
        let err = ResolveError::Exhausted(Vec::new());
        assert!(err.to_string().contains("no strategies configured"));
    }
}
