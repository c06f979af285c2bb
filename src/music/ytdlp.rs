//! Thin async wrapper over the `yt-dlp` binary.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: String,
    cookies: Option<String>,
}

/// The fields of `yt-dlp -J` output that playback needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub duration: Option<f64>,
    pub webpage_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SearchEntry {
    pub id: String,
    pub title: Option<String>,
    pub duration_string: Option<String>,
}

impl SearchEntry {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Unknown Title")
    }

    pub fn display_duration(&self) -> &str {
        self.duration_string.as_deref().unwrap_or("Unknown Duration")
    }
}

#[derive(Deserialize)]
struct SearchOutput {
    #[serde(default)]
    entries: Vec<SearchEntry>,
}

impl YtDlp {
    pub fn new(binary: impl Into<String>, cookies: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            cookies,
        }
    }

    /// Extracts metadata and a direct audio stream address without downloading.
    #[instrument(level = "debug", skip(self))]
    pub async fn extract(&self, url: &str) -> anyhow::Result<ExtractedInfo> {
        let stdout = self
            .run(&[
                "-J",
                "-f",
                "bestaudio/best",
                "--no-playlist",
                "--no-warnings",
                "--ignore-config",
                url,
            ])
            .await?;
        parse_extract_output(&stdout)
    }

    /// Flat search; failures are logged and produce no results.
    #[instrument(level = "debug", skip(self))]
    pub async fn search(&self, query: &str, limit: u8) -> Vec<SearchEntry> {
        let uri = format!("ytsearch{}:{}", limit.max(1), query);
        match self
            .run(&[
                "-J",
                "--flat-playlist",
                "--no-warnings",
                "--ignore-config",
                &uri,
            ])
            .await
            .and_then(|stdout| parse_search_output(&stdout))
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Search error for '{}': {}", query, e);
                Vec::new()
            }
        }
    }

    /// Downloads the audio track into `dir`, converted to mp3, and returns the file path.
    #[instrument(level = "debug", skip(self))]
    pub async fn download(&self, url: &str, dir: &Path) -> anyhow::Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let template = dir.join("%(id)s.%(ext)s");
        let template = template.to_string_lossy();

        let stdout = self
            .run(&[
                "-f",
                "bestaudio/best",
                "-x",
                "--audio-format",
                "mp3",
                "--audio-quality",
                "192K",
                "--no-playlist",
                "--no-warnings",
                "--ignore-config",
                "--no-progress",
                "-o",
                &template,
                "--print",
                "after_move:filepath",
                url,
            ])
            .await?;

        let path = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .map(PathBuf::from)
            .ok_or_else(|| anyhow::anyhow!("yt-dlp did not report a downloaded file"))?;

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            anyhow::bail!("downloaded file {} is missing", path.display());
        }
        Ok(path)
    }

    async fn run(&self, args: &[&str]) -> anyhow::Result<String> {
        let mut command = Command::new(&self.binary);
        if let Some(cookies) = &self.cookies {
            command.arg("--cookies").arg(cookies);
        }
        command.args(args).stdin(Stdio::null());

        debug!("Running {} {:?}", self.binary, args);
        let output = command.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("no error output");
            anyhow::bail!("yt-dlp exited with {}: {}", output.status, reason.trim());
        }

        Ok(String::from_utf8(output.stdout)?)
    }
}

pub fn parse_extract_output(stdout: &str) -> anyhow::Result<ExtractedInfo> {
    let info: ExtractedInfo = serde_json::from_str(stdout)?;
    if info.url.is_none() {
        anyhow::bail!("Could not extract audio URL from video");
    }
    Ok(info)
}

pub fn parse_search_output(stdout: &str) -> anyhow::Result<Vec<SearchEntry>> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    let output: SearchOutput = serde_json::from_str(stdout)?;
    Ok(output.entries)
}
