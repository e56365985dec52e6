//! Logging bootstrap.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install a fmt subscriber filtered by `directive` (e.g. `info`,
/// `conductor=debug`).
///
/// An unparsable directive falls back to `info`. Returns `false` when a
/// global subscriber was already installed, which makes repeated calls
/// harmless.
pub fn init_tracing(directive: &str) -> bool {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|err| {
        eprintln!("invalid log directive '{}' ({}); defaulting to info", directive, err);
        EnvFilter::new("info")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        init_tracing("debug");
        assert!(!init_tracing("not a [valid directive"));
    }
}
