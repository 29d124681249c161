//! Command line argument parsing

use crate::core::DecoderOptions;
use crate::platform::MAX_REPLAY_ITERATIONS;
use clap::Parser;
use std::path::PathBuf;

/// Descrambler - extract and replay player script transforms
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Locally saved player script
    pub script: PathBuf,

    /// Scrambled signature to decode (repeatable)
    #[arg(short = 's', long = "signature", value_name = "CIPHER")]
    pub signatures: Vec<String>,

    /// n parameter value to transform (repeatable)
    #[arg(short = 'n', long = "n-param", value_name = "VALUE")]
    pub n_values: Vec<String>,

    /// Stream URL whose n parameter should be rewritten
    #[arg(long, value_name = "URL")]
    pub stream_url: Option<String>,

    /// signatureCipher query to resolve into a stream URL
    #[arg(long, value_name = "QUERY")]
    pub signature_cipher: Option<String>,

    /// Upper bound on switch replay iterations
    #[arg(long, value_name = "N", default_value_t = MAX_REPLAY_ITERATIONS)]
    pub max_replay_iterations: usize,

    /// Print the extracted programs as JSON
    #[arg(long)]
    pub json: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet output (only errors)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Decoder options selected on the command line
    pub fn decoder_options(&self) -> DecoderOptions {
        DecoderOptions {
            max_replay_iterations: self.max_replay_iterations,
        }
    }

    /// Check if a stream URL should be assembled
    pub fn wants_stream_url(&self) -> bool {
        self.stream_url.is_some() || self.signature_cipher.is_some()
    }

    /// Get output verbosity level
    pub fn verbosity_level(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

/// Output verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbosityLevel {
    /// Quiet (only errors)
    Quiet,
    /// Normal
    Normal,
    /// Verbose (debug info)
    Verbose,
}

impl VerbosityLevel {
    /// Default log filter when `RUST_LOG` is unset
    pub fn log_filter(&self) -> &'static str {
        match self {
            VerbosityLevel::Quiet => "error",
            VerbosityLevel::Normal => "warn",
            VerbosityLevel::Verbose => "debug",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let args = Args::try_parse_from(["descrambler", "player.js"]).unwrap();
        assert_eq!(args.script, PathBuf::from("player.js"));
        assert!(args.signatures.is_empty());
        assert!(args.n_values.is_empty());
        assert_eq!(args.max_replay_iterations, 256);
        assert!(!args.json);
        assert!(!args.wants_stream_url());
        assert_eq!(args.verbosity_level(), VerbosityLevel::Normal);
    }

    #[test]
    fn test_parse_repeated_values() {
        let args = Args::try_parse_from([
            "descrambler",
            "player.js",
            "-s",
            "abc",
            "--signature",
            "def",
            "-n",
            "xyz",
            "--max-replay-iterations",
            "64",
            "--json",
        ])
        .unwrap();
        assert_eq!(args.signatures, vec!["abc", "def"]);
        assert_eq!(args.n_values, vec!["xyz"]);
        assert_eq!(args.decoder_options().max_replay_iterations, 64);
        assert!(args.json);
    }

    #[test]
    fn test_parse_stream_url() {
        let args = Args::try_parse_from([
            "descrambler",
            "player.js",
            "--stream-url",
            "https://r1.example.com/videoplayback?n=abc",
        ])
        .unwrap();
        assert!(args.wants_stream_url());
    }

    #[test]
    fn test_args_verbosity_level() {
        let args = Args::try_parse_from(["descrambler", "player.js", "-q"]).unwrap();
        assert_eq!(args.verbosity_level(), VerbosityLevel::Quiet);

        let args = Args::try_parse_from(["descrambler", "player.js", "-v"]).unwrap();
        assert_eq!(args.verbosity_level(), VerbosityLevel::Verbose);
        assert_eq!(args.verbosity_level().log_filter(), "debug");
    }

    #[test]
    fn test_missing_script_is_rejected() {
        assert!(Args::try_parse_from(["descrambler"]).is_err());
    }
}
