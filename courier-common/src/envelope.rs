//! Envelope and address helpers for a single outbound delivery.
//!
//! Addresses are handled as plain `local@domain` strings: by the time a
//! message reaches the courier it has already been accepted and normalised
//! by the inbound side, so no RFC 5322 parsing happens here.

use std::borrow::Cow;

/// The null reverse-path, used for bounces.
pub const NULL_SENDER: &str = "<>";

/// One envelope handed to a courier: sender, a single recipient and the raw
/// message bytes.
///
/// The courier never mutates an envelope; it only borrows it for the
/// duration of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub data: &'a [u8],
}

impl<'a> Envelope<'a> {
    #[must_use]
    pub const fn new(from: &'a str, to: &'a str, data: &'a [u8]) -> Self {
        Self { from, to, data }
    }

    /// The domain of the recipient, if the recipient has one.
    #[must_use]
    pub fn recipient_domain(&self) -> Option<&'a str> {
        domain_of(self.to)
    }

    /// The sender as it should appear inside `MAIL FROM:<..>`.
    ///
    /// The null sender is written as `<>` by callers but travels as an empty
    /// path on the wire.
    #[must_use]
    pub fn reverse_path(&self) -> &'a str {
        if self.from == NULL_SENDER {
            ""
        } else {
            self.from
        }
    }
}

/// Splits an address into its local part and domain at the last `@`.
///
/// Addresses without a domain return the whole input as the local part and
/// an empty domain.
#[must_use]
pub fn split(address: &str) -> (&str, &str) {
    address
        .rsplit_once('@')
        .map_or((address, ""), |(user, domain)| (user, domain))
}

/// Returns the domain of `address`, or `None` if it has no `@` or the domain
/// part is empty.
#[must_use]
pub fn domain_of(address: &str) -> Option<&str> {
    match split(address) {
        (_, "") => None,
        (_, domain) => Some(domain),
    }
}

/// Returns `address` with its domain part replaced by `domain`.
#[must_use]
pub fn with_domain<'a>(address: &'a str, domain: &str) -> Cow<'a, str> {
    let (user, current) = split(address);
    if current == domain {
        Cow::Borrowed(address)
    } else {
        Cow::Owned(format!("{user}@{domain}"))
    }
}
