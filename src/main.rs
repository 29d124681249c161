//! Main entry point for descrambler CLI

use anyhow::Context;
use clap::Parser;
use descrambler::cli::{load_script, Args, OutputFormatter, VerbosityLevel};
use descrambler::core::Decoder;
use descrambler::utils::resolve_stream_url;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbosity_level());

    info!("Starting descrambler with args: {:?}", args);

    let formatter = OutputFormatter::new(args.verbosity_level());

    let script = load_script(&args.script)
        .with_context(|| format!("failed to read {}", args.script.display()))?;
    debug!("Loaded {} bytes of player script", script.len());

    let decoder = Decoder::new().with_options(args.decoder_options());
    let state = match decoder.build(&script) {
        Ok(state) => state,
        Err(e) => {
            formatter.error(&format!("could not extract the signature program: {}", e));
            return Err(e.into());
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&*state)?);
        return Ok(());
    }

    formatter.print_state_summary(&state);

    for cipher in &args.signatures {
        formatter.print_decoded("signature", cipher, &state.decode_signature(cipher));
    }
    for value in &args.n_values {
        formatter.print_decoded("n", value, &state.decode_transform(value));
    }

    if args.wants_stream_url() {
        let url = resolve_stream_url(
            &state,
            args.stream_url.as_deref(),
            args.signature_cipher.as_deref(),
        )?;
        println!("{}", url);
    }

    formatter.success("done");
    Ok(())
}

/// Initialize logging system
fn init_logging(verbosity: VerbosityLevel) {
    // RUST_LOG wins over the verbosity flags
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(verbosity.log_filter()));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}
