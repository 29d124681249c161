//! # descrambler
//!
//! Extracts the signature and n-parameter transforms from a video platform
//! player script and replays them without executing the script.
//!
//! ## Features
//!
//! - Signature program resolution from the helper object and its driver
//! - Closed-world parsing of the n-parameter transform array
//! - Bounded replay of switch-driven table builders
//! - Atomic publication of rebuilt programs
//!
//! ## Example
//!
//! ```rust,no_run
//! use descrambler::Decoder;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let script = std::fs::read_to_string("player.js")?;
//!     let decoder = Decoder::new();
//!     decoder.build(&script)?;
//!
//!     println!("{}", decoder.decode_signature("AOq0QJ8wRAIg"));
//!     println!("{}", decoder.decode_transform("Gq8ePzLk_2Qm1aZ"));
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod core;
pub mod error;
pub mod platform;
pub mod utils;

// Re-export main types
pub use crate::core::{Decoder, DecoderOptions, DecoderState, ProgramSlot};
pub use error::DescrambleError;
pub use platform::{SignatureProgram, TransformProgram};

/// Result type alias for descrambler operations
pub type Result<T> = std::result::Result<T, DescrambleError>;
