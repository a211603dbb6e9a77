//! Log output: JSON lines (one object per line) or the plain formatter.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub struct StructuredLogger;

impl StructuredLogger {
    /// Install the global subscriber. RUST_LOG wins over `default_level`.
    /// Panics if a subscriber is already installed.
    pub fn init(json: bool, default_level: &str) {
        if !Self::try_init(json, default_level) {
            panic!("a global tracing subscriber is already installed");
        }
    }

    /// Like [`init`](Self::init), but returns false instead of panicking when
    /// a subscriber already exists.
    pub fn try_init(json: bool, default_level: &str) -> bool {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        if json {
            let fmt = tracing_subscriber::fmt::layer()
                .json()
                .with_span_events(FmtSpan::NONE)
                .with_writer(std::io::stdout);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt)
                .try_init()
                .is_ok()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
                .try_init()
                .is_ok()
        }
    }
}
