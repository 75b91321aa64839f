//! Tracing subscriber setup shared by the binaries.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. `-v` gives DEBUG, `-vv` TRACE, `-q` errors only.
/// `RUST_LOG` directives are honored as well.
pub fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["hoststat", "hoststatd"] {
        if let Ok(directive) = format!("{target}={level}").parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
