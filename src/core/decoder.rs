//! Decoder facade
//!
//! A [`Decoder`] owns the programs extracted from one player script. Builds
//! produce a complete [`DecoderState`] first and publish it in a single
//! write, so readers always see a signature program and a transform program
//! taken from the same script.

use crate::error::DescrambleError;
use crate::platform::{ElementGrammar, SignatureProgram, TransformProgram, MAX_REPLAY_ITERATIONS};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Decoder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecoderOptions {
    /// Upper bound on switch replay iterations
    pub max_replay_iterations: usize,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            max_replay_iterations: MAX_REPLAY_ITERATIONS,
        }
    }
}

/// A program that may have failed to extract
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProgramSlot<T> {
    Ready(T),
    Unavailable { reason: String },
}

impl<T> ProgramSlot<T> {
    pub fn as_ready(&self) -> Option<&T> {
        match self {
            ProgramSlot::Ready(program) => Some(program),
            ProgramSlot::Unavailable { .. } => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ProgramSlot::Ready(_))
    }
}

/// Programs extracted from one script
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecoderState {
    pub signature: Option<SignatureProgram>,
    pub transform: ProgramSlot<TransformProgram>,
}

impl Default for DecoderState {
    fn default() -> Self {
        Self {
            signature: None,
            transform: ProgramSlot::Unavailable {
                reason: "no script loaded".to_string(),
            },
        }
    }
}

impl DecoderState {
    /// Extract both programs from `script`.
    ///
    /// Signature failures are returned. Transform failures leave the
    /// transform unavailable and only log a warning.
    pub fn build(script: &str, options: &DecoderOptions) -> Result<Self, DescrambleError> {
        let signature = SignatureProgram::resolve(script)?;

        let transform = ElementGrammar::with_max_replay_iterations(options.max_replay_iterations)
            .and_then(|grammar| TransformProgram::extract(script, &grammar));
        let transform = match transform {
            Ok(program) => ProgramSlot::Ready(program),
            Err(e) => {
                warn!("n-parameter transform unavailable: {}", e);
                ProgramSlot::Unavailable {
                    reason: e.to_string(),
                }
            }
        };

        Ok(Self {
            signature: Some(signature),
            transform,
        })
    }

    /// Decode a signature cipher, or return it unchanged without a program
    pub fn decode_signature(&self, cipher: &str) -> String {
        match &self.signature {
            Some(program) => program.apply(cipher),
            None => cipher.to_string(),
        }
    }

    /// Transform an `n` value, or return it unchanged without a program
    pub fn decode_transform(&self, value: &str) -> String {
        match &self.transform {
            ProgramSlot::Ready(program) => program.apply(value),
            ProgramSlot::Unavailable { .. } => value.to_string(),
        }
    }
}

/// Shared decoder
#[derive(Debug)]
pub struct Decoder {
    options: DecoderOptions,
    state: RwLock<Arc<DecoderState>>,
}

impl Decoder {
    /// Create a decoder with no programs loaded
    pub fn new() -> Self {
        Self {
            options: DecoderOptions::default(),
            state: RwLock::new(Arc::new(DecoderState::default())),
        }
    }

    pub fn with_options(mut self, options: DecoderOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the switch replay bound
    pub fn with_max_replay_iterations(mut self, max_iterations: usize) -> Self {
        self.options.max_replay_iterations = max_iterations;
        self
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    /// Rebuild from `script` and publish the result.
    ///
    /// On failure the previously published state stays in place.
    pub fn build(&self, script: &str) -> Result<Arc<DecoderState>, DescrambleError> {
        let state = Arc::new(DecoderState::build(script, &self.options)?);

        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&state);
        info!(
            "Published decoder state: {} signature operations, transform {}",
            state.signature.as_ref().map_or(0, |p| p.operations().len()),
            if state.transform.is_ready() { "ready" } else { "unavailable" }
        );

        Ok(state)
    }

    /// Currently published state
    pub fn snapshot(&self) -> Arc<DecoderState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn decode_signature(&self, cipher: &str) -> String {
        self.snapshot().decode_signature(cipher)
    }

    pub fn decode_transform(&self, value: &str) -> String {
        let output = self.snapshot().decode_transform(value);
        debug!("Transformed n parameter: {} -> {}", value, output);
        output
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYER: &str = include_str!("../platform/fixtures/player.js");
    const SIGNATURE_ONLY: &str = r#"var Xy={Ab:function(a){a.reverse()}};var f=function(a){a=a.split("");Xy.Ab(a,0);return a.join("")};"#;

    #[test]
    fn test_decoder_creation() {
        let decoder = Decoder::new();
        assert_eq!(decoder.options().max_replay_iterations, 256);
    }

    #[test]
    fn test_decoder_with_options() {
        let decoder = Decoder::new().with_max_replay_iterations(16);
        assert_eq!(decoder.options().max_replay_iterations, 16);

        let decoder = Decoder::new().with_options(DecoderOptions {
            max_replay_iterations: 1024,
        });
        assert_eq!(decoder.options().max_replay_iterations, 1024);
    }

    #[test]
    fn test_identity_before_build() {
        let decoder = Decoder::new();
        assert_eq!(decoder.decode_signature("abc"), "abc");
        assert_eq!(decoder.decode_transform("xyz"), "xyz");
        assert!(decoder.snapshot().signature.is_none());
    }

    #[test]
    fn test_build_fixture() {
        let decoder = Decoder::new();
        decoder.build(PLAYER).unwrap();
        assert_eq!(
            decoder.decode_signature("abcdefghijklmnopqrstuvwxyz0123456789ABCDEFGHIJ"),
            "IHaFEDJBA9876543210zyxwvutsrqponmlkjihgfedc"
        );
        assert_eq!(decoder.decode_transform("Gq8ePzLk_2Qm1aZ"), "puGfEYsZzdoGTU");
    }

    #[test]
    fn test_missing_transform_is_not_an_error() {
        let decoder = Decoder::new();
        let state = decoder.build(SIGNATURE_ONLY).unwrap();
        assert!(!state.transform.is_ready());
        assert_eq!(decoder.decode_signature("abc"), "cba");
        assert_eq!(decoder.decode_transform("abc"), "abc");
    }

    #[test]
    fn test_failed_build_keeps_previous_state() {
        let decoder = Decoder::new();
        decoder.build(PLAYER).unwrap();
        let before = decoder.snapshot();

        let err = decoder.build("var nothing=1;").unwrap_err();
        assert!(err.is_extraction_error());
        assert!(Arc::ptr_eq(&before, &decoder.snapshot()));
        assert_eq!(decoder.decode_transform("abcdefghijkl"), "caSPdjj1fi8");
    }

    #[test]
    fn test_failed_first_build_stays_identity() {
        let decoder = Decoder::new();
        assert!(decoder.build("").is_err());
        assert_eq!(decoder.decode_signature("abc"), "abc");
    }

    #[test]
    fn test_snapshots_are_consistent() {
        let decoder = Decoder::new();
        decoder.build(PLAYER).unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..20 {
                    let script = if i % 2 == 0 { SIGNATURE_ONLY } else { PLAYER };
                    decoder.build(script).unwrap();
                }
            });
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        let state = decoder.snapshot();
                        let operations = state.signature.as_ref().map_or(0, |p| p.operations().len());
                        // five operations come only from the full script
                        assert_eq!(operations == 5, state.transform.is_ready());
                    }
                });
            }
        });
    }

    #[test]
    fn test_decoder_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Decoder>();
    }

    #[test]
    fn test_state_serializes() {
        let state = DecoderState::build(SIGNATURE_ONLY, &DecoderOptions::default()).unwrap();
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["signature"]["operations"][0]["op"], "reverse");
        assert_eq!(json["transform"]["status"], "unavailable");
    }
}
