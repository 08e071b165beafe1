//! Wire tracing and subscriber setup.
//!
//! Every line exchanged with a remote server is logged inside an `outgoing`
//! or `incoming` span carrying the peer's `host:port`, so the traffic of one
//! delivery can be told apart when it walks through several MX hosts.

use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

/// Target prefix shared by every courier crate.
pub const TARGET_PREFIX: &str = "courier";

#[macro_export]
macro_rules! log {
    ($level:expr, $direction:expr, peer = $peer:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $direction, peer = %$peer);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};

    ($level:expr, $direction:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $direction);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

/// Lines written to the remote peer.
#[macro_export]
macro_rules! outgoing {
    (peer = $peer:expr, level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", peer = $peer, $($msg),*)
    };

    (peer = $peer:expr, $($msg:expr),*) => {
        $crate::outgoing!(peer = $peer, level = TRACE, $($msg),*)
    };
}

/// Lines read from the remote peer.
#[macro_export]
macro_rules! incoming {
    (peer = $peer:expr, level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "incoming", peer = $peer, $($msg),*)
    };

    (peer = $peer:expr, $($msg:expr),*) => {
        $crate::incoming!(peer = $peer, level = TRACE, $($msg),*)
    };
}

/// Session bookkeeping that is neither sent nor received: dialing, TLS.
#[macro_export]
macro_rules! internal {
    (peer = $peer:expr, level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", peer = $peer, $($msg),*)
    };

    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

/// Parses a `LOG_LEVEL` value, falling back to `default` when it is absent
/// or not a level.
fn level_from(value: Option<&str>, default: LevelFilter) -> LevelFilter {
    value.map_or(default, |level| {
        LevelFilter::from_str(level.trim()).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

/// Installs the process-wide subscriber.
///
/// The level is read from `LOG_LEVEL`; only `courier*` targets are printed.
/// Calling this more than once is harmless, the first subscriber wins.
pub fn init() {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    let level = level_from(std::env::var("LOG_LEVEL").ok().as_deref(), default);

    let _ = tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with(TARGET_PREFIX)
                })),
        )
        .try_init();
}
