//! Process-wide tracing setup.

use tracing_subscriber::EnvFilter;

/// Install a stderr `fmt` subscriber.
///
/// `RUST_LOG`, when set, wins over `level`. Safe to call more than once; only
/// the first call installs a subscriber.
pub fn init(level: &str) {
    // The library and the `plan-critic` binary share the `plan_critic` target.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("plan_critic={level},warn")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
