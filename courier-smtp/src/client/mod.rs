//! Outbound SMTP client.
//!
//! [`SmtpClient`] speaks one session with one remote server: greeting,
//! EHLO/HELO, STARTTLS, the mail transaction and QUIT. It only moves bytes
//! and parses replies; deciding what a reply means for a delivery is left
//! to the caller.
//!
//! Every network operation runs under a [`Deadline`] fixed when the session
//! starts, so a slow peer cannot stretch the session past its budget one
//! reply at a time.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use courier_smtp::client::{Deadline, SmtpClient};
//!
//! # async fn example() -> courier_smtp::client::Result<()> {
//! let deadline = Deadline::after(Duration::from_secs(600));
//! let mut client = SmtpClient::connect("mx.example.com", 25, deadline, Duration::from_secs(60)).await?;
//!
//! client.read_greeting().await?;
//! client.ehlo("mail.example.org").await?;
//! if client.extensions().has("STARTTLS") {
//!     client.starttls(true).await?;
//!     client.ehlo("mail.example.org").await?;
//! }
//! # Ok(())
//! # }
//! ```

#[allow(clippy::module_inception)]
mod client;
mod data;
mod deadline;
mod error;
mod extensions;
mod response;
mod tls;

pub use client::SmtpClient;
pub use data::encode as encode_data;
pub use deadline::Deadline;
pub use error::{ClientError, Result};
pub use extensions::Extensions;
pub use response::{Response, ResponseLine, is_permanent_code};
