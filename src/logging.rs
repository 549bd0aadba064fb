use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global subscriber. `RUST_LOG` wins over `level`; `format` is `pretty` or `json`.
/// Calling it twice is harmless.
pub fn init(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let result = match format {
        "json" => fmt().json().with_env_filter(filter).try_init(),
        _ => fmt().with_env_filter(filter).with_target(false).try_init(),
    };
    // Tests and embedding binaries may have installed one already.
    let _ = result;
}
