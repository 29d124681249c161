//! Utility functions for descrambler

pub mod url;

pub use self::url::*;
