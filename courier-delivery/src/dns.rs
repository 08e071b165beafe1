//! MX resolution for outbound delivery.
//!
//! Turns a recipient domain into the ordered list of hosts to try, following
//! RFC 5321 section 5.1:
//!
//! - The domain is converted to its ASCII (IDNA) form first; a name that
//!   cannot be converted, or that breaks DNS length limits, is rejected
//!   without a query
//! - MX records are sorted by preference (stable), deduplicated and capped at
//!   [`MAX_MX_HOSTS`]
//! - A domain with no MX records ("no such host") is its own mail host
//!
//! The actual query goes through the [`MxLookup`] trait so tests, and
//! deployments with unusual DNS setups, can swap it out.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use hickory_resolver::{
    ResolveError, TokioResolver,
    config::{ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
    proto::rr::Name,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::CourierConfig;

/// Most hosts tried for a single delivery.
pub const MAX_MX_HOSTS: usize = 5;

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Longest domain kept verbatim in error messages.
const MAX_REPORTED_LEN: usize = 80;

/// One MX record as returned by the lookup backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxRecord {
    pub host: String,
    /// Lower is preferred.
    pub preference: u16,
}

impl MxRecord {
    #[must_use]
    pub fn new(host: impl Into<String>, preference: u16) -> Self {
        Self {
            host: host.into(),
            preference,
        }
    }
}

/// How a failed lookup should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupErrorKind {
    /// Timeout, SERVFAIL and the like; asking again later may work.
    Temporary,
    /// The domain has no MX records.
    NoSuchHost,
    /// Anything else. Treated as a permanent routing failure.
    Other,
}

/// A failed MX lookup, as reported by an [`MxLookup`] backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct MxLookupError {
    pub kind: LookupErrorKind,
    pub message: String,
}

impl MxLookupError {
    #[must_use]
    pub fn new(kind: LookupErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.kind == LookupErrorKind::Temporary
    }
}

/// Backend that answers MX queries.
#[async_trait]
pub trait MxLookup: Send + Sync {
    /// Returns the MX records for `domain`, which is always in ASCII form.
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, MxLookupError>;
}

/// Errors from resolving a recipient domain.
#[derive(Debug, Error)]
pub enum DnsError {
    /// The domain cannot be looked up at all.
    #[error("invalid domain {domain:?}: {reason}")]
    InvalidDomain { domain: String, reason: String },

    /// The lookup backend failed.
    #[error("MX lookup for {domain} failed: {source}")]
    Lookup {
        domain: String,
        #[source]
        source: MxLookupError,
    },
}

impl DnsError {
    /// Returns `true` unless the backend flagged the failure as temporary.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::InvalidDomain { .. } => true,
            Self::Lookup { source, .. } => !source.is_temporary(),
        }
    }

    fn invalid(domain: &str, reason: impl Into<String>) -> Self {
        let domain = if domain.len() > MAX_REPORTED_LEN {
            let mut shortened: String = domain.chars().take(MAX_REPORTED_LEN).collect();
            shortened.push_str("...");
            shortened
        } else {
            domain.to_string()
        };

        Self::InvalidDomain {
            domain,
            reason: reason.into(),
        }
    }
}

/// Resolves recipient domains into candidate hosts.
///
/// Holds no state besides the backend, so the same answer from the backend
/// always produces the same host list.
#[derive(Clone)]
pub struct Resolver {
    lookup: Arc<dyn MxLookup>,
    timeout: Duration,
}

impl Resolver {
    /// Creates a resolver that gives up on `lookup` after `timeout`.
    #[must_use]
    pub fn new(lookup: Arc<dyn MxLookup>, timeout: Duration) -> Self {
        Self { lookup, timeout }
    }

    /// Returns the hosts to try for `domain`, best first.
    ///
    /// An empty list means the domain answered with no usable MX records.
    ///
    /// # Errors
    ///
    /// Returns `DnsError::InvalidDomain` for names that cannot be queried,
    /// and `DnsError::Lookup` when the backend fails with anything but "no
    /// such host". Check [`DnsError::is_permanent`] to decide whether to
    /// retry.
    pub async fn lookup_mxs(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        self.lookup_mxs_within(domain, self.timeout).await
    }

    /// Like [`Resolver::lookup_mxs`], but gives up after `limit` if that is
    /// shorter than the resolver's own timeout.
    ///
    /// # Errors
    ///
    /// As for [`Resolver::lookup_mxs`].
    #[tracing::instrument(level = "debug", skip(self, domain), fields(domain = %domain.chars().take(MAX_REPORTED_LEN).collect::<String>()))]
    pub async fn lookup_mxs_within(
        &self,
        domain: &str,
        limit: Duration,
    ) -> Result<Vec<String>, DnsError> {
        let domain = to_ascii(domain)?;
        let limit = limit.min(self.timeout);

        let answer = tokio::time::timeout(limit, self.lookup.lookup_mx(&domain))
            .await
            .unwrap_or_else(|_| {
                Err(MxLookupError::new(
                    LookupErrorKind::Temporary,
                    format!("timed out after {limit:?}"),
                ))
            });

        let mut records = match answer {
            Ok(records) => records,
            Err(err) if err.kind == LookupErrorKind::NoSuchHost => {
                debug!("No MX records for {domain}, using the domain itself: {err}");
                return Ok(vec![domain]);
            }
            Err(source) => {
                warn!(temporary = source.is_temporary(), "MX lookup failed for {domain}: {source}");
                return Err(DnsError::Lookup { domain, source });
            }
        };

        records.sort_by_key(|record| record.preference);

        let mut hosts = Vec::with_capacity(MAX_MX_HOSTS.min(records.len()));
        for record in records {
            // A lone "." is a null MX: the domain accepts no mail.
            let host = record.host.trim_end_matches('.').to_ascii_lowercase();
            if host.is_empty() || hosts.contains(&host) {
                continue;
            }

            hosts.push(host);
            if hosts.len() == MAX_MX_HOSTS {
                break;
            }
        }

        debug!("Resolved {} MX host(s) for {domain}: {hosts:?}", hosts.len());
        Ok(hosts)
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Converts `domain` to the ASCII form used on the wire and in DNS.
pub(crate) fn to_ascii(domain: &str) -> Result<String, DnsError> {
    // Reject absurd input before doing any IDNA work on it.
    if domain.len() > MAX_DOMAIN_LEN * 4 {
        return Err(DnsError::invalid(domain, "domain name too long"));
    }

    let ascii = idna::domain_to_ascii(domain).map_err(|e| DnsError::invalid(domain, e.to_string()))?;
    let name = ascii.strip_suffix('.').unwrap_or(&ascii);

    if name.is_empty() {
        return Err(DnsError::invalid(domain, "empty domain"));
    }
    if name.len() > MAX_DOMAIN_LEN {
        return Err(DnsError::invalid(domain, "domain name too long"));
    }
    for label in name.split('.') {
        if label.is_empty() {
            return Err(DnsError::invalid(domain, "empty label"));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(DnsError::invalid(domain, "label too long"));
        }
    }

    Ok(name.to_string())
}

/// [`MxLookup`] over the system resolver configuration, using hickory.
#[derive(Debug)]
pub struct HickoryMxLookup {
    resolver: TokioResolver,
}

impl HickoryMxLookup {
    /// Creates a lookup backend from the system DNS configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the system DNS configuration cannot be loaded.
    pub fn new(timeout: Duration) -> Result<Self, ResolveError> {
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;

        let resolver = TokioResolver::builder(TokioConnectionProvider::default())?
            .with_options(opts)
            .build();

        Ok(Self { resolver })
    }

    /// Creates a lookup backend using the courier's DNS timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the system DNS configuration cannot be loaded.
    pub fn from_config(config: &CourierConfig) -> Result<Self, ResolveError> {
        Self::new(config.dns_timeout())
    }

    /// Creates a lookup backend with an explicit resolver configuration.
    #[must_use]
    pub fn with_resolver_config(resolver_config: ResolverConfig, opts: ResolverOpts) -> Self {
        let resolver =
            TokioResolver::builder_with_config(resolver_config, TokioConnectionProvider::default())
                .with_options(opts)
                .build();

        Self { resolver }
    }
}

#[async_trait]
impl MxLookup for HickoryMxLookup {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, MxLookupError> {
        let name = Name::from_ascii(domain)
            .map_err(|e| MxLookupError::new(LookupErrorKind::Other, e.to_string()))?;

        match self.resolver.mx_lookup(name).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|mx| MxRecord::new(mx.exchange().to_ascii(), mx.preference()))
                .collect()),
            Err(err) if err.is_nx_domain() || err.is_no_records_found() => Err(
                MxLookupError::new(LookupErrorKind::NoSuchHost, err.to_string()),
            ),
            Err(err) => Err(MxLookupError::new(
                LookupErrorKind::Temporary,
                err.to_string(),
            )),
        }
    }
}
