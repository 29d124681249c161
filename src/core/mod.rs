//! Core functionality for descrambler

pub mod decoder;

pub use decoder::*;
