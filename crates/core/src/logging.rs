//! Logging
//!
//! Structured logging via `tracing-subscriber`, either human-readable text or
//! JSON, selected at runtime. All output goes to stderr so stdout stays free
//! for command results.

use anyhow::Result;
use std::{io, sync::Once};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Initialize the logging system.
///
/// Safe to call more than once; only the first call installs a subscriber.
///
/// ## Environment Variables
///
/// * `BERTH_LOG_FORMAT` - "json" for JSON output, anything else for text
/// * `BERTH_LOG` - filter directive, takes precedence over `RUST_LOG`
/// * `BERTH_LOG_SPAN_EVENTS` - comma or pipe separated span events
///   (`new`, `close`, `enter`, `exit`, `active`, `full`, `none`)
pub fn init(format: Option<&str>) -> Result<()> {
    INIT.call_once(|| {
        let filter = create_env_filter();

        let env_format = std::env::var("BERTH_LOG_FORMAT").ok();
        let effective_format = format.or(env_format.as_deref()).unwrap_or("text");
        let span_events = span_events_for_format(effective_format);

        match effective_format {
            "json" => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .json()
                            .with_target(true)
                            .with_span_events(span_events)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .with_target(true)
                            .with_span_events(span_events)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
        }

        tracing::debug!("Logging initialized with format: {}", effective_format);
    });

    Ok(())
}

fn create_env_filter() -> EnvFilter {
    match std::env::var("BERTH_LOG") {
        Ok(spec) => parse_filter(&spec),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

fn parse_filter(spec: &str) -> EnvFilter {
    EnvFilter::try_new(spec).unwrap_or_else(|_| {
        // Subscriber isn't installed yet, so this can only go to stderr directly.
        eprintln!("Invalid BERTH_LOG specification '{}', using 'info'", spec);
        EnvFilter::new("info")
    })
}

fn span_events_for_format(format: &str) -> fmt::format::FmtSpan {
    match std::env::var("BERTH_LOG_SPAN_EVENTS") {
        Ok(raw) => parse_span_events(&raw),
        Err(_) => match format {
            "json" => fmt::format::FmtSpan::NEW | fmt::format::FmtSpan::CLOSE,
            _ => fmt::format::FmtSpan::NONE,
        },
    }
}

fn parse_span_events(raw: &str) -> fmt::format::FmtSpan {
    use fmt::format::FmtSpan;

    let mut acc = FmtSpan::NONE;
    for token in raw.split(&[',', '|'][..]).map(|t| t.trim().to_lowercase()) {
        acc |= match token.as_str() {
            "new" => FmtSpan::NEW,
            "close" => FmtSpan::CLOSE,
            "enter" => FmtSpan::ENTER,
            "exit" => FmtSpan::EXIT,
            "active" => FmtSpan::ACTIVE,
            "full" => FmtSpan::FULL,
            _ => FmtSpan::NONE,
        };
    }
    acc
}

/// Check if logging has been initialized
pub fn is_initialized() -> bool {
    INIT.is_completed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_init_multiple_calls_safe() {
        let _guard = TEST_MUTEX.lock().unwrap();

        assert!(init(None).is_ok());
        assert!(init(Some("json")).is_ok());
        assert!(init(Some("invalid")).is_ok());
        assert!(is_initialized());
    }

    #[test]
    fn test_parse_span_events() {
        use fmt::format::FmtSpan;

        assert_eq!(parse_span_events("new,close"), FmtSpan::NEW | FmtSpan::CLOSE);
        assert_eq!(parse_span_events(" ENTER | exit "), FmtSpan::ENTER | FmtSpan::EXIT);
        assert_eq!(parse_span_events("bogus"), FmtSpan::NONE);
        assert_eq!(parse_span_events("full"), FmtSpan::FULL);
    }

    #[test]
    fn test_parse_filter_falls_back() {
        // Neither call may panic; the invalid one degrades to "info".
        let _ = parse_filter("berth_core=debug");
        let _ = parse_filter("invalid_spec_@@[");
    }
}
