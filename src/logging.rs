use tracing_subscriber::EnvFilter;

pub const ENV_LOG_FILTER: &str = "GOLDENBERRY_LOG";

/// Install a fmt subscriber for the process.
///
/// Filter precedence: explicit argument, `GOLDENBERRY_LOG`, `RUST_LOG`, then
/// `info`. Calling this more than once is harmless; later calls are ignored.
pub fn init(filter: Option<&str>) {
    let env_filter = filter
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_env(ENV_LOG_FILTER).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_does_not_panic() {
        init(Some("debug"));
        init(None);
        tracing::debug!("logging initialised twice");
    }
}
