//! Usage: Content-view response built from a forwarded HTTP response.

use reqwest::header::HeaderMap;
use std::io::Cursor;

/// Response handed back to the content view for an intercepted request.
///
/// The body is a seekable buffer positioned at offset 0; it can be taken exactly once.
#[derive(Debug)]
pub struct WebResourceResponse {
    status: u16,
    reason_phrase: String,
    headers: String,
    content: Cursor<Vec<u8>>,
}

impl WebResourceResponse {
    pub fn new(
        status: u16,
        reason_phrase: impl Into<String>,
        headers: impl Into<String>,
        content: Cursor<Vec<u8>>,
    ) -> Self {
        Self {
            status,
            reason_phrase: reason_phrase.into(),
            headers: headers.into(),
            content,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason_phrase(&self) -> &str {
        &self.reason_phrase
    }

    /// Serialized `Name: value` lines separated by CRLF.
    pub fn headers(&self) -> &str {
        &self.headers
    }

    pub fn header_pairs(&self) -> Vec<(String, String)> {
        parse_header_blob(&self.headers)
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.header_pairs()
            .into_iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    pub fn content_position(&self) -> u64 {
        self.content.position()
    }

    pub fn content_len(&self) -> usize {
        self.content.get_ref().len()
    }

    pub fn into_content(self) -> Cursor<Vec<u8>> {
        self.content
    }

    pub fn into_parts(self) -> (u16, String, String, Cursor<Vec<u8>>) {
        (self.status, self.reason_phrase, self.headers, self.content)
    }
}

pub(crate) fn serialize_headers(headers: &HeaderMap) -> String {
    let mut out = String::new();
    for (name, value) in headers {
        out.push_str(name.as_str());
        out.push_str(": ");
        out.push_str(&String::from_utf8_lossy(value.as_bytes()));
        out.push_str("\r\n");
    }
    out
}

pub(crate) fn parse_header_blob(blob: &str) -> Vec<(String, String)> {
    blob.lines()
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}
