//! Per-domain record of the security level seen on outgoing connections.
//!
//! Once a domain has been reached over TLS, a later delivery that can only
//! manage plain text (or an unverified certificate) is refused and retried,
//! which stops an attacker on the path from silently stripping STARTTLS.

use std::{
    fmt, fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Security of an established outgoing connection, weakest first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum SecLevel {
    #[default]
    Plain,
    /// TLS with a certificate that was not verified.
    TlsInsecure,
    /// TLS with a verified certificate.
    TlsSecure,
}

impl SecLevel {
    /// The next level to try when negotiating this one fails.
    #[must_use]
    pub const fn downgrade(self) -> Option<Self> {
        match self {
            Self::TlsSecure => Some(Self::TlsInsecure),
            Self::TlsInsecure => Some(Self::Plain),
            Self::Plain => None,
        }
    }
}

impl fmt::Display for SecLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "PLAIN",
            Self::TlsInsecure => "TLS_INSECURE",
            Self::TlsSecure => "TLS_SECURE",
        })
    }
}

/// Shared store consulted after TLS negotiation with a domain's host.
pub trait DomainInfo: Send + Sync {
    /// Reports that `level` was reached with `domain`.
    ///
    /// Returns `false` if that is lower than what the domain achieved
    /// before; the caller must then abandon the connection. Otherwise the
    /// level is recorded, if higher, and `true` is returned.
    fn outgoing_sec_level(&self, domain: &str, level: SecLevel) -> bool;
}

#[derive(Debug, Serialize, Deserialize)]
struct DomainRecord {
    outgoing_sec_level: SecLevel,
}

/// Concurrent [`DomainInfo`] implementation, optionally persisted as one RON
/// file per domain.
#[derive(Debug, Default)]
pub struct DomainInfoStore {
    levels: DashMap<String, SecLevel>,
    dir: Option<PathBuf>,
}

impl DomainInfoStore {
    /// Creates an in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a store backed by `dir`, loading every `<domain>.ron` in it.
    ///
    /// Files that cannot be read or parsed are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` cannot be created or listed.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let levels = DashMap::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "ron") {
                continue;
            }
            let Some(domain) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            match load(&path) {
                Ok(record) => {
                    levels.insert(domain.to_string(), record.outgoing_sec_level);
                }
                Err(err) => warn!("Skipping domain info {}: {err}", path.display()),
            }
        }

        debug!("Loaded domain info for {} domain(s) from {}", levels.len(), dir.display());

        Ok(Self {
            levels,
            dir: Some(dir),
        })
    }

    /// The highest level recorded for `domain`, if any.
    #[must_use]
    pub fn level(&self, domain: &str) -> Option<SecLevel> {
        self.levels
            .get(&domain.to_ascii_lowercase())
            .map(|level| *level)
    }

    fn persist(&self, domain: &str, level: SecLevel) {
        let Some(dir) = &self.dir else {
            return;
        };
        if !is_safe_file_name(domain) {
            debug!("Not persisting domain info for {domain:?}");
            return;
        }

        let record = DomainRecord {
            outgoing_sec_level: level,
        };
        if let Err(err) = store(dir, domain, &record) {
            warn!("Failed to persist domain info for {domain}: {err}");
        }
    }
}

impl DomainInfo for DomainInfoStore {
    fn outgoing_sec_level(&self, domain: &str, level: SecLevel) -> bool {
        let domain = domain.to_ascii_lowercase();

        let mut known = self.levels.entry(domain.clone()).or_default();
        if level < *known {
            warn!(%domain, "Security level check failed ({level} < {})", *known);
            return false;
        }
        if level == *known {
            return true;
        }

        debug!(%domain, "Security level raised {} -> {level}", *known);
        *known = level;

        // Still holding the entry, so a slower writer cannot store a lower level.
        self.persist(&domain, level);
        drop(known);
        true
    }
}

fn load(path: &Path) -> io::Result<DomainRecord> {
    let contents = fs::read_to_string(path)?;
    ron::from_str(&contents).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn store(dir: &Path, domain: &str, record: &DomainRecord) -> io::Result<()> {
    let contents = ron::ser::to_string_pretty(record, ron::ser::PrettyConfig::default())
        .map_err(io::Error::other)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.persist(dir.join(format!("{domain}.ron")))
        .map_err(|e| e.error)?;
    Ok(())
}

fn is_safe_file_name(domain: &str) -> bool {
    !domain.is_empty()
        && !domain.starts_with('.')
        && domain
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.' || b == b'_')
}
