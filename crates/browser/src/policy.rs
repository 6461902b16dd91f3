//! URL access policy for navigation-class actions.
//!
//! Navigation targets are checked against an optional allowlist and a
//! denylist before the browser is asked to load them. A violation is a fatal
//! task error, not a recoverable action failure.

use url::Url;

use crate::BrowserError;

/// Host-based allow/deny policy.
///
/// An empty allowlist permits every host not on the denylist. List entries
/// match the host exactly or as a parent domain (`example.com` matches
/// `docs.example.com`).
#[derive(Clone, Debug, Default)]
pub struct UrlPolicy {
    allowed_hosts: Vec<String>,
    denied_hosts: Vec<String>,
}

impl UrlPolicy {
    /// Policy that allows everything.
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn with_allowed(mut self, hosts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_hosts
            .extend(hosts.into_iter().map(|h| h.into().to_ascii_lowercase()));
        self
    }

    pub fn with_denied(mut self, hosts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.denied_hosts
            .extend(hosts.into_iter().map(|h| h.into().to_ascii_lowercase()));
        self
    }

    /// Check a navigation target. `Err(BrowserError::UrlNotAllowed)` on
    /// violation or unparseable URL.
    pub fn check(&self, raw_url: &str) -> Result<(), BrowserError> {
        let url = Url::parse(raw_url)
            .map_err(|_| BrowserError::UrlNotAllowed(format!("unparseable URL: {raw_url}")))?;

        match url.scheme() {
            "http" | "https" | "about" => {}
            other => {
                return Err(BrowserError::UrlNotAllowed(format!(
                    "scheme '{other}' is not allowed: {raw_url}"
                )))
            }
        }

        let host = url.host_str().unwrap_or("").to_ascii_lowercase();
        if self.denied_hosts.iter().any(|d| host_matches(&host, d)) {
            return Err(BrowserError::UrlNotAllowed(format!(
                "host '{host}' is denied by policy"
            )));
        }

        if !self.allowed_hosts.is_empty()
            && !self.allowed_hosts.iter().any(|a| host_matches(&host, a))
        {
            return Err(BrowserError::UrlNotAllowed(format!(
                "host '{host}' is not on the allowlist"
            )));
        }

        Ok(())
    }
}

fn host_matches(host: &str, pattern: &str) -> bool {
    host == pattern || host.ends_with(&format!(".{pattern}"))
}
