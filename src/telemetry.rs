use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt};

/// Initialize the tracing subscriber once per process.
///
/// Semantic warnings (undefined identifiers, unresolved modules, skipped
/// constructs) flow through `tracing::warn!`; the default filter keeps them
/// visible without drowning queries in analysis chatter. Override with
/// `RUST_LOG` as usual.
pub fn init_tracing() {
    static INIT: OnceLock<()> = OnceLock::new();

    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("verileak=warn"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
