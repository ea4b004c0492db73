//! Key expressions used by the relay link and node status.
//!
//! ```text
//! <prefix>/<dest>/<src>          relay frame from node <src> to node <dest>
//! <prefix>/<self>/*              inbox of node <self>
//! <prefix>/@/status/<node>       node status announcements
//! ```

/// Default prefix for relay frames.
pub const RELAY_PREFIX: &str = "meterlink/relay";

/// Returns true when `chunk` can be used as a single key expression chunk.
///
/// Node identifiers end up as one chunk, so they must not contain `/` or any
/// of the zenoh wildcard / verbatim markers.
pub fn is_valid_chunk(chunk: &str) -> bool {
    !chunk.is_empty()
        && !chunk
            .chars()
            .any(|c| matches!(c, '/' | '*' | '$' | '#' | '?' | '@') || c.is_whitespace())
}

/// Builder for relay key expressions under one prefix.
#[derive(Debug, Clone)]
pub struct RelayKeys {
    prefix: String,
}

impl RelayKeys {
    /// Create a builder for the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix: String = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    /// The prefix this builder was created with.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key a frame from `src` to `dest` is published on.
    ///
    /// # Example
    /// ```
    /// use meterlink_common::keyexpr::RelayKeys;
    ///
    /// let keys = RelayKeys::new("meterlink/relay");
    /// assert_eq!(keys.frame_key("panel", "meter"), "meterlink/relay/panel/meter");
    /// ```
    pub fn frame_key(&self, dest: &str, src: &str) -> String {
        format!("{}/{}/{}", self.prefix, dest, src)
    }

    /// Wildcard matching every frame addressed to `node`.
    pub fn inbox_wildcard(&self, node: &str) -> String {
        format!("{}/{}/*", self.prefix, node)
    }

    /// Key the node status is published on.
    pub fn status_key(&self, node: &str) -> String {
        format!("{}/@/status/{}", self.prefix, node)
    }

    /// Split a frame key into its destination and source chunks.
    ///
    /// Returns `None` when the key is not under this prefix or does not have
    /// exactly two trailing chunks.
    pub fn parse_frame_key<'a>(&self, key: &'a str) -> Option<ParsedFrameKey<'a>> {
        let rest = key.strip_prefix(self.prefix.as_str())?.strip_prefix('/')?;
        let (dest, src) = rest.split_once('/')?;

        if !is_valid_chunk(dest) || !is_valid_chunk(src) {
            return None;
        }

        Some(ParsedFrameKey { dest, src })
    }
}

impl Default for RelayKeys {
    fn default() -> Self {
        Self::new(RELAY_PREFIX)
    }
}

/// Components of a relay frame key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrameKey<'a> {
    pub dest: &'a str,
    pub src: &'a str,
}
