//! Service extensions advertised by the remote server in its EHLO reply.

use std::collections::HashMap;

use super::response::Response;

/// Extensions advertised by a server, keyed by upper-cased keyword.
///
/// The first line of an EHLO reply is the server's greeting and carries no
/// extension; every following line is `KEYWORD [params]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions(HashMap<String, String>);

impl Extensions {
    /// Parses the extensions out of a successful EHLO reply.
    #[must_use]
    pub fn from_ehlo(response: &Response) -> Self {
        let extensions = response
            .lines
            .iter()
            .skip(1)
            .filter_map(|line| {
                let line = line.trim();
                let (keyword, params) = line.split_once(' ').unwrap_or((line, ""));
                (!keyword.is_empty())
                    .then(|| (keyword.to_ascii_uppercase(), params.trim().to_string()))
            })
            .collect();

        Self(extensions)
    }

    /// Returns `true` if the server advertised `keyword`.
    #[must_use]
    pub fn has(&self, keyword: &str) -> bool {
        self.0.contains_key(&keyword.to_ascii_uppercase())
    }

    /// Returns the parameters the server advertised along with `keyword`.
    #[must_use]
    pub fn get(&self, keyword: &str) -> Option<&str> {
        self.0.get(&keyword.to_ascii_uppercase()).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
