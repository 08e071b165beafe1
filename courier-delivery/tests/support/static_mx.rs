//! Table-driven [`MxLookup`] used in place of DNS.

use std::collections::HashMap;

use async_trait::async_trait;
use courier_delivery::{LookupErrorKind, MxLookup, MxLookupError, MxRecord};

/// Answers MX queries from a fixed map; unknown domains are "no such host".
#[derive(Debug, Default, Clone)]
pub struct StaticMxLookup {
    answers: HashMap<String, Result<Vec<MxRecord>, MxLookupError>>,
}

impl StaticMxLookup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `domain` with these `(host, preference)` records
    #[must_use]
    pub fn with_mx(mut self, domain: &str, records: &[(&str, u16)]) -> Self {
        let records = records
            .iter()
            .map(|(host, preference)| MxRecord::new(*host, *preference))
            .collect();
        self.answers.insert(domain.to_string(), Ok(records));
        self
    }

    /// Fail lookups of `domain` with an error of `kind`
    #[must_use]
    pub fn with_error(mut self, domain: &str, kind: LookupErrorKind, message: &str) -> Self {
        self.answers
            .insert(domain.to_string(), Err(MxLookupError::new(kind, message)));
        self
    }
}

#[async_trait]
impl MxLookup for StaticMxLookup {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, MxLookupError> {
        self.answers.get(domain).cloned().unwrap_or_else(|| {
            Err(MxLookupError::new(
                LookupErrorKind::NoSuchHost,
                "no such host (test)",
            ))
        })
    }
}
