//! Delivery of one envelope across a domain's MX hosts.

use std::sync::Arc;

use async_trait::async_trait;
use courier_common::{Envelope, tracing};
use courier_smtp::client::Deadline;

use crate::{
    CourierConfig, DomainInfo, MxLookup, Resolver, dns,
    error::{DeliveryError, PermanentError},
    smtp_transaction::SmtpTransaction,
};

/// Something that can deliver an envelope, as seen by the queue.
#[async_trait]
pub trait Courier: Send + Sync {
    /// Delivers `data` from `from` to the single recipient `to`.
    ///
    /// # Errors
    ///
    /// A [`DeliveryError::Permanent`] means the message should be bounced,
    /// a [`DeliveryError::Temporary`] that it should be retried later.
    async fn deliver(&self, from: &str, to: &str, data: &[u8]) -> Result<(), DeliveryError>;
}

/// Delivers mail over SMTP to the recipient domain's MX hosts.
///
/// Hosts are tried one at a time, best preference first. The first success
/// ends the delivery, and so does the first permanent failure: a 5xx from
/// one of a domain's MX hosts is taken as the domain's answer.
///
/// The whole delivery, MX lookup included, runs under one
/// [`CourierConfig::total_timeout`].
pub struct SmtpCourier {
    config: CourierConfig,
    resolver: Resolver,
    domain_info: Arc<dyn DomainInfo>,
}

impl SmtpCourier {
    #[must_use]
    pub fn new(
        config: CourierConfig,
        mx_lookup: Arc<dyn MxLookup>,
        domain_info: Arc<dyn DomainInfo>,
    ) -> Self {
        let resolver = Resolver::new(mx_lookup, config.total_timeout());

        Self {
            config,
            resolver,
            domain_info,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &CourierConfig {
        &self.config
    }
}

#[async_trait]
impl Courier for SmtpCourier {
    #[tracing::instrument(level = "info", skip(self, data), fields(size = data.len()))]
    async fn deliver(&self, from: &str, to: &str, data: &[u8]) -> Result<(), DeliveryError> {
        let deadline = Deadline::after(self.config.total_timeout());
        let envelope = Envelope::new(from, to, data);

        let domain = envelope
            .recipient_domain()
            .ok_or_else(|| PermanentError::InvalidAddress(to.to_string()))?;

        let hosts = self
            .resolver
            .lookup_mxs_within(domain, deadline.remaining())
            .await?;
        if hosts.is_empty() {
            return Err(PermanentError::NoMailServers(domain.to_string()).into());
        }

        // Security history is keyed on the same ASCII form that was resolved.
        let domain = dns::to_ascii(domain)?;
        let mut last_error = None;

        for host in &hosts {
            if deadline.is_expired() && last_error.is_some() {
                tracing::info!(%host, "Delivery deadline passed, not trying remaining hosts");
                break;
            }

            let transaction = SmtpTransaction::new(
                envelope,
                &domain,
                host,
                &self.config,
                &*self.domain_info,
                deadline,
            );

            match transaction.execute().await {
                Ok(()) => {
                    tracing::info!(%host, "Delivered");
                    return Ok(());
                }
                Err(err) if err.is_permanent() => {
                    tracing::warn!(%host, error = %err, permanent = true, "Delivery failed");
                    return Err(err);
                }
                Err(err) => {
                    tracing::info!(%host, error = %err, permanent = false, "Delivery failed, trying next host");
                    last_error = Some(err);
                }
            }
        }

        tracing::warn!(%domain, "All MXs returned transient failures");
        Err(last_error.unwrap_or_else(|| PermanentError::NoMailServers(domain).into()))
    }
}
