/// Initialize tracing/logging for the application.
///
/// Output goes to stderr: stdout of the `run` command carries the readiness
/// marker the harness waits for.
pub fn init(default_level: &str) {
    let lvl = match default_level.to_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warn" | "warning" => tracing::Level::WARN,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    };

    // try_init so tests and the harness can call this repeatedly
    let _ = tracing_subscriber::fmt()
        .with_max_level(lvl)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Level to pass to [`init`] given a `--verbose` flag and the configured level.
pub fn level_for(verbose: bool, configured: &str) -> &str {
    if verbose { "debug" } else { configured }
}
