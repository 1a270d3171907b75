//! tracing-subscriber setup for the host binary.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a fmt subscriber filtered by `filter` (a level or directive list).
///
/// Falls back to `info` if the filter does not parse. `RUST_LOG` has already
/// been folded into the config by the loader.
pub fn init(filter: &str) -> Result<()> {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|e| {
        eprintln!("invalid log filter {:?} ({}), using info", filter, e);
        EnvFilter::new("info")
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()?;

    Ok(())
}
