use tracing_subscriber::EnvFilter;

/// Log to stderr so stdout stays clean for JSON output.
///
/// Filter comes from `RUST_LOG`, defaulting to `warn`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_twice_keeps_the_first_subscriber() {
        super::init();
        super::init();
        tracing::warn!("still logging");
    }
}
