//! Outbound delivery of one envelope to one recipient domain.
//!
//! This crate provides:
//! - MX resolution with IDNA handling, a host cap and the implicit
//!   address-record fallback ([`Resolver`])
//! - The SMTP protocol driver run against each candidate host, including
//!   opportunistic STARTTLS and the per-domain security level check
//! - Host fallback and the permanent/temporary classification handed back
//!   to the queue ([`SmtpCourier`], [`DeliveryError`])

mod config;
mod courier;
mod dns;
mod domain_info;
mod error;
mod smtp_transaction;

pub use config::CourierConfig;
pub use courier::{Courier, SmtpCourier};
pub use dns::{
    DnsError, HickoryMxLookup, LookupErrorKind, MAX_MX_HOSTS, MxLookup, MxLookupError, MxRecord,
    Resolver,
};
pub use domain_info::{DomainInfo, DomainInfoStore, SecLevel};
pub use error::{DeliveryError, Phase, PermanentError, Rejection, TemporaryError};
