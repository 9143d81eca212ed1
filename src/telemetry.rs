use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Used when `RUST_LOG` is unset. Sign-in events from this crate stay at
/// debug so claim narrowing is visible; the HTTP stack is kept quiet.
pub const DEFAULT_FILTER: &str = "info,gallery_auth=debug,actix_web=info,actix_server=warn,awc=warn,h2=warn";

pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_ansi(false)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        let filter = EnvFilter::try_new(DEFAULT_FILTER).unwrap();

        let rendered = filter.to_string().to_lowercase();
        assert!(rendered.contains("gallery_auth=debug"));
        assert!(rendered.contains("awc=warn"));
    }
}
