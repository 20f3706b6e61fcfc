//! crosspost CLI - multi-channel publication dispatcher
//!
//! Binary name: `crosspost`

use std::process;

mod cli;

use cli::handlers::{dispatch, format_error};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli::build_cli().get_matches();

    if let Err(err) = dispatch(&matches).await {
        #[allow(clippy::print_stderr)]
        {
            eprintln!("Error: {}", format_error(&err));
        }

        let code = err
            .downcast_ref::<crosspost_core::Error>()
            .map_or(1, crosspost_core::Error::exit_code);

        #[allow(clippy::exit)]
        process::exit(code);
    }
}
