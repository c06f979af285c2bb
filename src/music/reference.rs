//! Classification of user-supplied song references.
//!
//! A reference is either a Spotify track link (turned into a search term, since
//! Spotify audio is not streamable), any other URL (handed to the resolution
//! chain as-is), or free text to search for.

use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

/// Browser user agent for pages that hide their metadata from bots.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

const SPOTIFY_FALLBACK_TERM: &str = "spotify song";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackReference {
    Spotify { url: String, track_id: String },
    Url(String),
    Search(String),
}

impl TrackReference {
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        let Ok(url) = Url::parse(input) else {
            return Some(Self::Search(input.to_string()));
        };
        if !matches!(url.scheme(), "http" | "https" | "ftp") || url.host_str().is_none() {
            return Some(Self::Search(input.to_string()));
        }

        if is_spotify_host(&url) {
            let mut segments = url.path_segments().into_iter().flatten();
            // Localised links look like /intl-pt/track/<id>
            let track_id = segments
                .by_ref()
                .skip_while(|s| *s != "track")
                .nth(1)
                .filter(|id| !id.is_empty());
            if let Some(track_id) = track_id {
                return Some(Self::Spotify {
                    url: input.to_string(),
                    track_id: track_id.to_string(),
                });
            }
        }

        Some(Self::Url(input.to_string()))
    }
}

fn is_spotify_host(url: &Url) -> bool {
    url.host_str()
        .map(|h| h == "spotify.com" || h.ends_with(".spotify.com"))
        .unwrap_or(false)
}

/// A track waiting in (or taken from) a guild queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTrack {
    /// Page the track was requested from; what the extractor is given.
    pub url: String,
    /// External identifier used as the stream cache key.
    pub video_id: Option<String>,
    pub title: String,
}

impl PendingTrack {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        let url = url.into();
        let video_id = youtube_video_id(&url);
        Self {
            url,
            video_id,
            title: title.into(),
        }
    }

    pub fn from_video_id(video_id: &str, title: impl Into<String>) -> Self {
        Self {
            url: watch_url(video_id),
            video_id: Some(video_id.to_string()),
            title: title.into(),
        }
    }
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

/// Extracts the 11 character video id from the common YouTube link shapes.
pub fn youtube_video_id(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?.trim_start_matches("www.");

    let candidate = if host == "youtu.be" {
        url.path_segments()?.next().map(str::to_string)
    } else if host == "youtube.com" || host.ends_with(".youtube.com") {
        let mut segments = url.path_segments()?;
        match segments.next() {
            Some("watch") => url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned()),
            Some("shorts" | "embed" | "live" | "v") => segments.next().map(str::to_string),
            _ => None,
        }
    } else {
        None
    };

    candidate.filter(|id| is_video_id(id))
}

fn is_video_id(id: &str) -> bool {
    id.len() == 11
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Turns a Spotify track link into something worth searching for.
///
/// The page title is tried first; when the page can't be read the URL slug is
/// used, and as a last resort a generic term.
pub async fn spotify_search_term(http: &reqwest::Client, url: &str) -> String {
    match fetch_page_title(http, url).await {
        Ok(Some(title)) => {
            if let Some(term) = clean_spotify_title(&title) {
                return term;
            }
        }
        Ok(None) => debug!("Spotify page {} had no usable title", url),
        Err(e) => warn!("Error extracting Spotify title from {}: {}", url, e),
    }

    spotify_slug_term(url).unwrap_or_else(|| SPOTIFY_FALLBACK_TERM.to_string())
}

async fn fetch_page_title(http: &reqwest::Client, url: &str) -> anyhow::Result<Option<String>> {
    let body = http
        .get(url)
        .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(extract_html_title(&body))
}

/// Text of the document's `<title>`, whitespace collapsed and entities decoded.
pub fn extract_html_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    let title = document.select(&selector).next()?;
    let text = title
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

/// "Song - song and lyrics by Artist | Spotify" becomes "Song Artist".
pub fn clean_spotify_title(title: &str) -> Option<String> {
    if !title.contains("Spotify") {
        return None;
    }

    let mut cleaned = title.trim().to_string();
    for suffix in ["| Spotify", "- Spotify"] {
        if let Some(stripped) = cleaned.strip_suffix(suffix) {
            cleaned = stripped.trim_end().to_string();
        }
    }
    for infix in [" - song and lyrics by ", " - song by ", " - single by "] {
        cleaned = cleaned.replace(infix, " ");
    }
    let cleaned = cleaned.trim().trim_end_matches(['-', '|']).trim().to_string();

    (!cleaned.is_empty() && cleaned != "Spotify").then_some(cleaned)
}

fn spotify_slug_term(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let last = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    // Bare base62 track ids carry no searchable information.
    if last.len() == 22 && last.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    let term = last.replace(['-', '_'], " ");
    let term = term.trim();
    (!term.is_empty()).then(|| term.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference_kinds() {
        assert_eq!(
            TrackReference::parse("  never gonna give you up "),
            Some(TrackReference::Search("never gonna give you up".to_string()))
        );
        assert_eq!(
            TrackReference::parse("https://youtu.be/dQw4w9WgXcQ"),
            Some(TrackReference::Url("https://youtu.be/dQw4w9WgXcQ".to_string()))
        );
        assert_eq!(
            TrackReference::parse("https://open.spotify.com/intl-pt/track/4cOdK2wGLETKBW3PvgPWqT?si=abc"),
            Some(TrackReference::Spotify {
                url: "https://open.spotify.com/intl-pt/track/4cOdK2wGLETKBW3PvgPWqT?si=abc".to_string(),
                track_id: "4cOdK2wGLETKBW3PvgPWqT".to_string(),
            })
        );
        assert_eq!(TrackReference::parse("   "), None);
    }

    #[test]
    fn test_non_track_spotify_link_is_plain_url() {
        let link = "https://open.spotify.com/album/1DFixLWuPkv3KT3TnV35m3";
        assert_eq!(
            TrackReference::parse(link),
            Some(TrackReference::Url(link.to_string()))
        );
    }

    #[test]
    fn test_schemes_outside_http_are_search_terms() {
        assert_eq!(
            TrackReference::parse("mailto:someone@example.com"),
            Some(TrackReference::Search("mailto:someone@example.com".to_string()))
        );
    }

    #[test]
    fn test_youtube_video_id_shapes() {
        let id = Some("dQw4w9WgXcQ".to_string());
        assert_eq!(youtube_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42"), id);
        assert_eq!(youtube_video_id("https://youtu.be/dQw4w9WgXcQ?si=x"), id);
        assert_eq!(youtube_video_id("https://m.youtube.com/shorts/dQw4w9WgXcQ"), id);
        assert_eq!(youtube_video_id("https://music.youtube.com/watch?v=dQw4w9WgXcQ"), id);
        assert_eq!(youtube_video_id("https://www.youtube.com/embed/dQw4w9WgXcQ"), id);
        assert_eq!(youtube_video_id("https://www.youtube.com/watch?v=short"), None);
        assert_eq!(youtube_video_id("https://soundcloud.com/artist/track"), None);
    }

    #[test]
    fn test_clean_spotify_title() {
        assert_eq!(
            clean_spotify_title("Blinding Lights - song and lyrics by The Weeknd | Spotify"),
            Some("Blinding Lights The Weeknd".to_string())
        );
        assert_eq!(
            clean_spotify_title("Aquarela | Spotify"),
            Some("Aquarela".to_string())
        );
        assert_eq!(clean_spotify_title("Spotify"), None);
        assert_eq!(clean_spotify_title("Some other page"), None);
    }

    #[test]
    fn test_extract_html_title_decodes_entities() {
        let html = "<html><head><title data-x=\"1\">Rock &amp; Roll | Spotify</title></head></html>";
        assert_eq!(
            extract_html_title(html),
            Some("Rock & Roll | Spotify".to_string())
        );
        assert_eq!(extract_html_title("<html></html>"), None);
    }

    #[test]
    fn test_extract_html_title_numeric_entities() {
        let html = "<title>Don&#8217;t Stop &#x2014; Live | Spotify</title>";
        assert_eq!(
            extract_html_title(html),
            Some("Don\u{2019}t Stop \u{2014} Live | Spotify".to_string())
        );

        // Decoded once: an escaped ampersand stays literal text
        let html = "<title>  Tom &amp;lt;3\n  Jerry </title>";
        assert_eq!(extract_html_title(html), Some("Tom &lt;3 Jerry".to_string()));
    }

    #[test]
    fn test_spotify_slug_term() {
        assert_eq!(
            spotify_slug_term("https://open.spotify.com/track/4cOdK2wGLETKBW3PvgPWqT"),
            None
        );
        assert_eq!(
            spotify_slug_term("https://open.spotify.com/track/some-song_name"),
            Some("some song name".to_string())
        );
    }

    #[test]
    fn test_pending_track_keys_on_video_id() {
        let track = PendingTrack::new("https://youtu.be/dQw4w9WgXcQ", "Rick");
        assert_eq!(track.video_id.as_deref(), Some("dQw4w9WgXcQ"));

        let track = PendingTrack::from_video_id("dQw4w9WgXcQ", "Rick");
        assert_eq!(track.url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    }
}
