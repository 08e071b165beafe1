//! SMTP transaction execution against a single host.
//!
//! One [`SmtpTransaction`] delivers one envelope to one MX host:
//! - Reads the greeting and introduces itself (EHLO, falling back to HELO)
//! - Negotiates STARTTLS when offered, stepping down from verified TLS to
//!   unverified TLS to plain text on failure, reconnecting each time
//! - Checks the negotiated security against the domain's history
//! - Sends MAIL FROM and RCPT TO, then DATA and the message
//! - Sends QUIT
//!
//! All of this, reconnects included, runs under the delivery's [`Deadline`].

use courier_common::{Envelope, envelope, tracing};
use courier_smtp::client::{ClientError, Deadline, Response, SmtpClient};

use crate::{
    CourierConfig, DomainInfo, SecLevel,
    error::{DeliveryError, Phase, Rejection, TemporaryError},
};

/// Code used for envelope addresses the server cannot be sent.
const UNSENDABLE_ADDRESS: u16 = 599;

/// Why a single connection attempt ended.
enum Failure {
    /// TLS could not be negotiated at the requested level; a lower one may
    /// still work.
    Tls(DeliveryError),
    /// The delivery failed; trying again on this host is pointless.
    Delivery(DeliveryError),
}

impl From<DeliveryError> for Failure {
    fn from(error: DeliveryError) -> Self {
        Self::Delivery(error)
    }
}

impl From<ClientError> for Failure {
    fn from(error: ClientError) -> Self {
        Self::Delivery(error.into())
    }
}

impl From<Rejection> for Failure {
    fn from(rejection: Rejection) -> Self {
        Self::Delivery(rejection.into())
    }
}

/// A single SMTP delivery to one host.
pub struct SmtpTransaction<'a> {
    envelope: Envelope<'a>,
    /// Recipient domain, used as the key for the security level check.
    domain: &'a str,
    host: &'a str,
    config: &'a CourierConfig,
    domain_info: &'a dyn DomainInfo,
    deadline: Deadline,
}

impl<'a> SmtpTransaction<'a> {
    pub fn new(
        envelope: Envelope<'a>,
        domain: &'a str,
        host: &'a str,
        config: &'a CourierConfig,
        domain_info: &'a dyn DomainInfo,
        deadline: Deadline,
    ) -> Self {
        Self {
            envelope,
            domain,
            host,
            config,
            domain_info,
            deadline,
        }
    }

    /// Runs the transaction to completion.
    ///
    /// # Errors
    ///
    /// Returns the classified failure; see [`DeliveryError`].
    #[tracing::instrument(level = "debug", skip(self), fields(host = %self.host, domain = %self.domain))]
    pub async fn execute(self) -> Result<(), DeliveryError> {
        let mut level = if self.config.opportunistic_tls {
            SecLevel::TlsSecure
        } else {
            SecLevel::Plain
        };

        loop {
            match self.attempt(level).await {
                Ok(()) => return Ok(()),
                Err(Failure::Delivery(err)) => return Err(err),
                Err(Failure::Tls(err)) => match level.downgrade() {
                    Some(lower) => {
                        tracing::info!(
                            host = %self.host,
                            error = %err,
                            "TLS negotiation failed at {level}, reconnecting for {lower}"
                        );
                        level = lower;
                    }
                    None => return Err(err),
                },
            }
        }
    }

    /// One connection to the host, trying STARTTLS at `tls` unless that is
    /// [`SecLevel::Plain`].
    async fn attempt(&self, tls: SecLevel) -> Result<(), Failure> {
        let mut client = SmtpClient::connect(
            self.host,
            self.config.port,
            self.deadline,
            self.config.dial_timeout(),
        )
        .await?;

        let greeting = client.read_greeting().await?;
        if !greeting.is_success() {
            return Err(Rejection::from_response(Phase::Greeting, &greeting).into());
        }

        self.hello(&mut client).await?;

        let mut level = SecLevel::Plain;
        if tls != SecLevel::Plain && client.extensions().has("STARTTLS") {
            match client.starttls(tls == SecLevel::TlsSecure).await {
                Ok(response) if response.is_success() => {}
                Ok(response) => {
                    return Err(Failure::Tls(
                        Rejection::from_response(Phase::StartTls, &response).into(),
                    ));
                }
                Err(err) if err.is_timeout() => return Err(err.into()),
                Err(err) => return Err(Failure::Tls(err.into())),
            }

            self.hello(&mut client).await?;
            level = tls;
        }

        if !self.domain_info.outgoing_sec_level(self.domain, level) {
            return Err(DeliveryError::from(TemporaryError::SecurityLevel(level)).into());
        }
        tracing::debug!(host = %self.host, "Connected at security level {level}");

        self.send_mail(&mut client).await?;
        Ok(())
    }

    /// EHLO, or HELO if the server does not understand EHLO.
    async fn hello(&self, client: &mut SmtpClient) -> Result<(), DeliveryError> {
        let identity = &self.config.hello_domain;

        let ehlo = client.ehlo(identity).await?;
        if ehlo.is_success() {
            return Ok(());
        }

        let helo = client.helo(identity).await?;
        if helo.is_success() {
            tracing::debug!(host = %self.host, "EHLO refused ({}), continuing after HELO", ehlo.code);
            return Ok(());
        }

        Err(Rejection::from_response(Phase::Ehlo, &ehlo).into())
    }

    /// The mail transaction proper: MAIL, RCPT, DATA, the message and QUIT.
    async fn send_mail(&self, client: &mut SmtpClient) -> Result<(), DeliveryError> {
        let smtputf8 = client.extensions().has("SMTPUTF8");

        let from = prepare_address(self.envelope.reverse_path(), smtputf8)
            .map_err(|reason| Rejection::new(Phase::MailRcpt, UNSENDABLE_ADDRESS, reason))?;
        let to = prepare_address(self.envelope.to, smtputf8)
            .map_err(|reason| Rejection::new(Phase::MailRcpt, UNSENDABLE_ADDRESS, reason))?;

        let mut params = Vec::new();
        if client.extensions().has("8BITMIME") {
            params.push("BODY=8BITMIME");
        }
        if smtputf8 && !(from.is_ascii() && to.is_ascii()) {
            params.push("SMTPUTF8");
        }

        // RCPT goes out even if MAIL was refused: some servers only explain
        // the refusal in the RCPT reply. The first refusal is reported.
        let mail = client.mail_from(&from, &params).await?;
        let rcpt = match client.rcpt_to(&to).await {
            Ok(rcpt) => Some(rcpt),
            Err(_) if !mail.is_success() => None,
            Err(err) => return Err(err.into()),
        };
        if let Some(rejected) = first_refusal(&mail, rcpt.as_ref()) {
            return Err(Rejection::from_response(Phase::MailRcpt, rejected).into());
        }

        let data = client.data().await?;
        if !data.is_intermediate() {
            return Err(Rejection::from_response(Phase::Data, &data).into());
        }

        let closing = client.send_data(self.envelope.data).await?;
        if !closing.is_success() {
            return Err(Rejection::from_response(Phase::DataClosing, &closing).into());
        }

        tracing::info!(host = %self.host, "Message accepted: {} {}", closing.code, closing.message());

        if let Err(err) = client.quit().await {
            tracing::debug!(host = %self.host, "QUIT failed after delivery: {err}");
        }

        Ok(())
    }
}

fn first_refusal<'r>(mail: &'r Response, rcpt: Option<&'r Response>) -> Option<&'r Response> {
    if mail.is_success() {
        rcpt.filter(|rcpt| !rcpt.is_success())
    } else {
        Some(mail)
    }
}

/// Makes `address` sendable to a server with or without SMTPUTF8.
///
/// ASCII addresses, and any address when the server speaks SMTPUTF8, pass
/// through. Otherwise the domain is IDNA-encoded; a non-ASCII local part
/// cannot be sent at all.
fn prepare_address(address: &str, smtputf8: bool) -> Result<String, String> {
    if smtputf8 || address.is_ascii() {
        return Ok(address.to_string());
    }

    let (user, domain) = envelope::split(address);
    if !user.is_ascii() {
        return Err(format!(
            "local part of {address:?} is not ASCII and the server does not support SMTPUTF8"
        ));
    }

    let ascii = idna::domain_to_ascii(domain)
        .map_err(|e| format!("cannot convert domain of {address:?} to ASCII: {e}"))?;

    Ok(envelope::with_domain(address, &ascii).into_owned())
}
