//! Courier configuration.

use std::time::Duration;

use serde::Deserialize;

/// Settings for outbound SMTP delivery.
///
/// Every field has a default, so an empty RON document `()` is a valid
/// configuration:
///
/// ```ron
/// (
///     hello_domain: "mail.example.com",
///     total_timeout_secs: 300,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CourierConfig {
    /// Identity sent in EHLO and HELO (default: `localhost`)
    #[serde(default = "default_hello_domain")]
    pub hello_domain: String,

    /// Remote SMTP port (default: 25)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Wall-clock limit for one host session, including reconnects for the
    /// TLS fallback (default: 600)
    #[serde(default = "default_total_timeout_secs")]
    pub total_timeout_secs: u64,

    /// Limit for a single TCP connect, within the session limit (default: 60)
    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,

    /// DNS query timeout (default: 5)
    #[serde(default = "default_dns_timeout_secs")]
    pub dns_timeout_secs: u64,

    /// Try STARTTLS when the server advertises it (default: true)
    #[serde(default = "default_opportunistic_tls")]
    pub opportunistic_tls: bool,
}

fn default_hello_domain() -> String {
    "localhost".to_string()
}

const fn default_port() -> u16 {
    25
}

const fn default_total_timeout_secs() -> u64 {
    600 // 10 minutes
}

const fn default_dial_timeout_secs() -> u64 {
    60
}

const fn default_dns_timeout_secs() -> u64 {
    5
}

const fn default_opportunistic_tls() -> bool {
    true
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            hello_domain: default_hello_domain(),
            port: default_port(),
            total_timeout_secs: default_total_timeout_secs(),
            dial_timeout_secs: default_dial_timeout_secs(),
            dns_timeout_secs: default_dns_timeout_secs(),
            opportunistic_tls: default_opportunistic_tls(),
        }
    }
}

impl CourierConfig {
    #[must_use]
    pub fn with_hello_domain(mut self, hello_domain: impl Into<String>) -> Self {
        self.hello_domain = hello_domain.into();
        self
    }

    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub const fn with_total_timeout_secs(mut self, secs: u64) -> Self {
        self.total_timeout_secs = secs;
        self
    }

    #[must_use]
    pub const fn with_dial_timeout_secs(mut self, secs: u64) -> Self {
        self.dial_timeout_secs = secs;
        self
    }

    #[must_use]
    pub const fn with_opportunistic_tls(mut self, enabled: bool) -> Self {
        self.opportunistic_tls = enabled;
        self
    }

    #[must_use]
    pub const fn total_timeout(&self) -> Duration {
        Duration::from_secs(self.total_timeout_secs)
    }

    #[must_use]
    pub const fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    #[must_use]
    pub const fn dns_timeout(&self) -> Duration {
        Duration::from_secs(self.dns_timeout_secs)
    }
}
