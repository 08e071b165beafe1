//! Test support utilities for delivery tests
//!
//! A scriptable SMTP server and an MX lookup that answers from a fixed table
//! instead of DNS.
#![allow(dead_code)]

pub mod mock_server;
pub mod static_mx;

pub use mock_server::{MockSmtpServer, SmtpCommand};
pub use static_mx::StaticMxLookup;
