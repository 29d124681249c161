//! Output formatting

use crate::cli::args::VerbosityLevel;
use crate::core::{DecoderState, ProgramSlot};
use crate::error::DescrambleError;
use colored::Colorize;
use std::fs;
use std::path::Path;

/// Output formatter for descrambler
pub struct OutputFormatter {
    verbosity: VerbosityLevel,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self { verbosity }
    }

    /// Print info message
    pub fn info(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            println!("{} {}", "info:".cyan().bold(), message);
        }
    }

    /// Print success message
    pub fn success(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            println!("{} {}", "ok:".green().bold(), message);
        }
    }

    /// Print warning message
    pub fn warning(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            eprintln!("{} {}", "warning:".yellow().bold(), message);
        }
    }

    /// Print error message
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "error:".red().bold(), message);
    }

    /// Print debug message
    pub fn debug(&self, message: &str) {
        if self.verbosity == VerbosityLevel::Verbose {
            println!("{} {}", "debug:".dimmed(), message);
        }
    }

    /// Print what was extracted from the script
    pub fn print_state_summary(&self, state: &DecoderState) {
        if self.verbosity == VerbosityLevel::Quiet {
            return;
        }

        for line in state_summary(state) {
            self.info(&line);
        }
        if let ProgramSlot::Unavailable { reason } = &state.transform {
            self.warning(&format!("n-parameter transform unavailable: {}", reason));
        }
    }

    /// Print one decoded value. Quiet mode prints the bare output.
    pub fn print_decoded(&self, label: &str, input: &str, output: &str) {
        if self.verbosity == VerbosityLevel::Quiet {
            println!("{}", output);
        } else {
            println!("{} {} {} {}", label.bold(), input, "->".dimmed(), output.green());
        }
    }
}

/// Summary lines describing a decoder state
pub fn state_summary(state: &DecoderState) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(signature) = &state.signature {
        let names: Vec<String> = signature
            .operations()
            .iter()
            .map(|op| format!("{:?}", op))
            .collect();
        lines.push(format!(
            "signature: {} operations [{}]",
            names.len(),
            names.join(", ")
        ));
    }

    if let Some(transform) = state.transform.as_ready() {
        lines.push(format!(
            "n transform: {} elements, {} copy slots, {} actions",
            transform.elements().len(),
            transform.copy_slots().len(),
            transform.actions().len()
        ));
    }

    lines
}

/// Read a locally saved player script
pub fn load_script(path: &Path) -> Result<String, DescrambleError> {
    Ok(fs::read_to_string(path)?)
}
