//! Usage: Request filter (URI prefix + resource type) deciding which requests get intercepted.

use crate::shared::error::AppResult;
use serde::{Deserialize, Serialize};

/// Class of resource the content view is loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceContext {
    /// Matches every resource type. Only meaningful on a filter.
    All,
    Document,
    Stylesheet,
    Image,
    Media,
    Font,
    Script,
    XmlHttpRequest,
    Fetch,
    TextTrack,
    EventSource,
    Websocket,
    Manifest,
    Other,
}

impl Default for ResourceContext {
    fn default() -> Self {
        Self::XmlHttpRequest
    }
}

impl ResourceContext {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Document => "document",
            Self::Stylesheet => "stylesheet",
            Self::Image => "image",
            Self::Media => "media",
            Self::Font => "font",
            Self::Script => "script",
            Self::XmlHttpRequest => "xml_http_request",
            Self::Fetch => "fetch",
            Self::TextTrack => "text_track",
            Self::EventSource => "event_source",
            Self::Websocket => "websocket",
            Self::Manifest => "manifest",
            Self::Other => "other",
        }
    }

    /// Maps a `Sec-Fetch-Dest` request header value onto a resource type.
    ///
    /// Browsers report both `fetch()` and `XMLHttpRequest` as `empty`; those map to
    /// [`ResourceContext::Fetch`], which an `XmlHttpRequest` filter also accepts.
    pub fn from_fetch_dest(dest: &str) -> Self {
        match dest.trim().to_ascii_lowercase().as_str() {
            "document" | "iframe" | "frame" => Self::Document,
            "style" => Self::Stylesheet,
            "image" => Self::Image,
            "audio" | "video" => Self::Media,
            "font" => Self::Font,
            "script" | "worker" | "sharedworker" | "serviceworker" => Self::Script,
            "track" => Self::TextTrack,
            "manifest" => Self::Manifest,
            "empty" => Self::Fetch,
            _ => Self::Other,
        }
    }

    fn accepts(self, actual: ResourceContext) -> bool {
        match self {
            Self::All => true,
            // Programmatic requests: the two APIs are indistinguishable on the wire.
            Self::XmlHttpRequest | Self::Fetch => {
                matches!(actual, Self::XmlHttpRequest | Self::Fetch)
            }
            expected => expected == actual,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFilter {
    uri_prefix: String,
    context: ResourceContext,
}

impl RequestFilter {
    /// Builds a filter from a prefix such as `https://graph.microsoft.com` or the
    /// wildcard form `https://graph.microsoft.com/*`.
    pub fn new(pattern: &str, context: ResourceContext) -> AppResult<Self> {
        let trimmed = pattern.trim();
        let prefix = trimmed.strip_suffix('*').unwrap_or(trimmed);
        if prefix.is_empty() {
            return Err("SEC_INVALID_INPUT: request filter prefix is empty"
                .to_string()
                .into());
        }

        let url = reqwest::Url::parse(prefix)
            .map_err(|e| format!("SEC_INVALID_INPUT: invalid request filter prefix {prefix}: {e}"))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(format!(
                "SEC_INVALID_INPUT: request filter prefix must be an http(s) url: {prefix}"
            )
            .into());
        }

        Ok(Self {
            uri_prefix: prefix.to_string(),
            context,
        })
    }

    pub fn uri_prefix(&self) -> &str {
        &self.uri_prefix
    }

    pub fn context(&self) -> ResourceContext {
        self.context
    }

    pub fn matches(&self, uri: &str, context: ResourceContext) -> bool {
        self.context.accepts(context) && self.matches_uri(uri)
    }

    fn matches_uri(&self, uri: &str) -> bool {
        let prefix = self.uri_prefix.as_str();
        let Some(head) = uri.get(..prefix.len()) else {
            return false;
        };
        if !head.eq_ignore_ascii_case(prefix) {
            return false;
        }
        if prefix.ends_with('/') {
            return true;
        }

        // `https://graph.microsoft.com` must not match `https://graph.microsoft.com.evil`.
        let rest = &uri[prefix.len()..];
        rest.is_empty() || rest.starts_with(['/', '?', '#'])
    }
}
