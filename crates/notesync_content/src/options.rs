//! Transcoder options.

use serde::{Deserialize, Serialize};

/// Settings that shape the local HTML produced by the transcoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeOptions {
    /// Base URL for browsable versions of cross-note links.
    pub web_host: String,
    /// Hosts of highlight services whose quoted citations become callouts.
    pub highlight_hosts: Vec<String>,
}

impl TranscodeOptions {
    /// Creates options with the given web host and the default highlight hosts.
    pub fn new(web_host: impl Into<String>) -> Self {
        Self {
            web_host: web_host.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Sets the highlight service hosts.
    pub fn with_highlight_hosts(mut self, hosts: Vec<String>) -> Self {
        self.highlight_hosts = hosts;
        self
    }

    /// Returns true if `url` points at a configured highlight service.
    pub fn is_highlight_url(&self, url: &str) -> bool {
        let Some(rest) = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
        else {
            return false;
        };
        let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
        let host = host.strip_prefix("www.").unwrap_or(host);
        self.highlight_hosts
            .iter()
            .any(|h| host.eq_ignore_ascii_case(h))
    }
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            web_host: "https://www.evernote.com".into(),
            highlight_hosts: vec!["readwise.io".into()],
        }
    }
}
