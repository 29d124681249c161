//! Signature scrambling rules and their replay
//!
//! The player script keeps a helper object whose members each wrap one array
//! primitive, plus a driver that splits the cipher, calls those members in a
//! fixed order and joins the result. Resolution reads both into a flat list
//! of operations which can then be applied without the script.

use crate::error::DescrambleError;
use crate::platform::patterns::{js_key, js_property, js_string, unquote, JS_EMPTY_STRING, JS_VARIABLE};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

const REVERSE_SHAPE: &str = r":function\(a\)\{(?:return )?a\.reverse\(\)\}";
const SLICE_SHAPE: &str = r":function\(a,b\)\{return a\.slice\(b\)\}";
const SPLICE_SHAPE: &str = r":function\(a,b\)\{a\.splice\(0,b\)\}";
const SWAP_SHAPE: &str = r":function\(a,b\)\{var c=a\[0\];a\[0\]=a\[b(?:%a\.length)?\];a\[b(?:%a\.length)?\]=c(?:;return a)?\}";

/// One step of the signature program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "op", content = "arg", rename_all = "snake_case")]
pub enum SignatureOperation {
    Reverse,
    /// Drop the first `n` characters
    Slice(usize),
    /// Drop the first `n` characters in place
    Splice(usize),
    /// Exchange the first character with the one at `n % len`
    Swap(usize),
}

/// Member shape, before its call site supplies the argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Reverse,
    Slice,
    Splice,
    Swap,
}

impl Shape {
    fn with_arg(self, n: usize) -> SignatureOperation {
        match self {
            Shape::Reverse => SignatureOperation::Reverse,
            Shape::Slice => SignatureOperation::Slice(n),
            Shape::Splice => SignatureOperation::Splice(n),
            Shape::Swap => SignatureOperation::Swap(n),
        }
    }
}

/// Ordered signature operations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SignatureProgram {
    operations: Vec<SignatureOperation>,
}

impl SignatureProgram {
    pub fn new(operations: Vec<SignatureOperation>) -> Self {
        Self { operations }
    }

    /// Resolve the helper object and its driver from `script`
    pub fn resolve(script: &str) -> Result<Self, DescrambleError> {
        let shapes = format!(
            "(?:{}|{}|{}|{})",
            REVERSE_SHAPE, SLICE_SHAPE, SPLICE_SHAPE, SWAP_SHAPE
        );
        let object_regex = Regex::new(&format!(
            r"var (?P<object>{var})=\{{(?P<members>(?:{key}{shapes},?\r?\n?)+)\}};",
            var = JS_VARIABLE,
            key = js_key(),
            shapes = shapes,
        ))?;

        let caps = object_regex.captures(script).ok_or_else(|| {
            DescrambleError::Extraction("signature helper object not found".to_string())
        })?;
        let object = caps.name("object").map_or("", |m| m.as_str());
        let members = caps.name("members").map_or("", |m| m.as_str());
        let bindings = bind_members(members)?;
        debug!("Found signature helper object {} with {} members", object, bindings.len());

        let driver_regex = Regex::new(&format!(
            r"function(?: {var})?\(a\)\{{a=a\.split\({empty}\);\s*(?P<calls>(?:(?:a=)?{var}{prop}\(a,\d+\);\s*)*)return a\.join\({empty}\)\}}",
            var = JS_VARIABLE,
            prop = js_property(),
            empty = JS_EMPTY_STRING,
        ))?;
        let calls = driver_regex
            .captures(script)
            .and_then(|caps| caps.name("calls"))
            .map(|m| m.as_str())
            .ok_or_else(|| {
                DescrambleError::Extraction("signature driver function not found".to_string())
            })?;

        let call_regex = Regex::new(&format!(
            r"(?:a=)?(?P<object>{var})(?:\.(?P<member>{var})|\[(?P<quoted>{string})\])\(a,(?P<arg>\d+)\)",
            var = JS_VARIABLE,
            string = js_string(),
        ))?;

        let mut operations = Vec::new();
        for call in call_regex.captures_iter(calls) {
            let target = call.name("object").map_or("", |m| m.as_str());
            if target != object {
                return Err(DescrambleError::Extraction(format!(
                    "signature driver calls {} instead of {}",
                    target, object
                )));
            }

            let member = match (call.name("member"), call.name("quoted")) {
                (Some(m), _) => m.as_str(),
                (None, Some(m)) => unquote(m.as_str()),
                (None, None) => "",
            };
            let shape = bindings.get(member).ok_or_else(|| {
                DescrambleError::Extraction(format!("unbound signature member {}", member))
            })?;
            operations.push(shape.with_arg(call["arg"].parse()?));
        }

        debug!("Resolved {} signature operations", operations.len());
        Ok(Self::new(operations))
    }

    pub fn operations(&self) -> &[SignatureOperation] {
        &self.operations
    }

    /// Apply every operation, in order, to `cipher`
    pub fn apply(&self, cipher: &str) -> String {
        let mut chars: Vec<char> = cipher.chars().collect();

        for op in &self.operations {
            match *op {
                SignatureOperation::Reverse => chars.reverse(),
                SignatureOperation::Slice(n) | SignatureOperation::Splice(n) => {
                    chars.drain(..n.min(chars.len()));
                }
                SignatureOperation::Swap(n) => {
                    if !chars.is_empty() {
                        let idx = n % chars.len();
                        chars.swap(0, idx);
                    }
                }
            }
        }

        chars.into_iter().collect()
    }
}

/// Map each obfuscated member name to the shape of its body
fn bind_members(members: &str) -> Result<HashMap<String, Shape>, DescrambleError> {
    let member_regex = Regex::new(&format!(
        "(?P<key>{key})(?:(?P<reverse>{})|(?P<slice>{})|(?P<splice>{})|(?P<swap>{}))",
        REVERSE_SHAPE,
        SLICE_SHAPE,
        SPLICE_SHAPE,
        SWAP_SHAPE,
        key = js_key(),
    ))?;

    let mut bindings = HashMap::new();
    for caps in member_regex.captures_iter(members) {
        let shape = if caps.name("reverse").is_some() {
            Shape::Reverse
        } else if caps.name("slice").is_some() {
            Shape::Slice
        } else if caps.name("splice").is_some() {
            Shape::Splice
        } else {
            Shape::Swap
        };
        bindings.insert(unquote(&caps["key"]).to_string(), shape);
    }

    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYER: &str = include_str!("fixtures/player.js");

    #[test]
    fn test_resolve_fixture() {
        let program = SignatureProgram::resolve(PLAYER).unwrap();
        assert_eq!(
            program.operations(),
            &[
                SignatureOperation::Swap(42),
                SignatureOperation::Splice(2),
                SignatureOperation::Reverse,
                SignatureOperation::Swap(7),
                SignatureOperation::Slice(1),
            ]
        );
    }

    #[test]
    fn test_fixture_outputs() {
        let program = SignatureProgram::resolve(PLAYER).unwrap();
        assert_eq!(
            program.apply("abcdefghijklmnopqrstuvwxyz0123456789ABCDEFGHIJ"),
            "IHaFEDJBA9876543210zyxwvutsrqponmlkjihgfedc"
        );
        assert_eq!(
            program.apply("AOq0QJ8wRAIgXx_signature_test_value_1234567890abc"),
            "ba098Ac54321_eulav_tset_erutangis_xXgIARw8JQ0q"
        );
        assert_eq!(program.apply(""), "");
    }

    #[test]
    fn test_apply_reverse() {
        let program = SignatureProgram::new(vec![SignatureOperation::Reverse]);
        assert_eq!(program.apply("abcdef"), "fedcba");
    }

    #[test]
    fn test_apply_swap() {
        let program = SignatureProgram::new(vec![SignatureOperation::Swap(3)]);
        assert_eq!(program.apply("abcdefgh"), "dbcaefgh");
        let program = SignatureProgram::new(vec![SignatureOperation::Swap(11)]);
        assert_eq!(program.apply("abcdefgh"), "dbcaefgh");
    }

    #[test]
    fn test_apply_splice_and_slice() {
        let splice = SignatureProgram::new(vec![SignatureOperation::Splice(2)]);
        let slice = SignatureProgram::new(vec![SignatureOperation::Slice(2)]);
        assert_eq!(splice.apply("abcdefgh"), "cdefgh");
        assert_eq!(slice.apply("abcdefgh"), "cdefgh");
        assert_eq!(slice.apply("a"), "");
    }

    #[test]
    fn test_quoted_members_and_return_forms() {
        let script = concat!(
            r#"var $q={"x1":function(a){return a.reverse()},"#,
            r#"'y2':function(a,b){var c=a[0];a[0]=a[b];a[b]=c;return a}};"#,
            r#"function Sg(a){a=a.split('');$q["y2"](a,1);a=$q.x1(a,9);return a.join('')}"#,
        );
        let program = SignatureProgram::resolve(script).unwrap();
        assert_eq!(
            program.operations(),
            &[SignatureOperation::Swap(1), SignatureOperation::Reverse]
        );
        assert_eq!(program.apply("abc"), "cab");
    }

    #[test]
    fn test_missing_object_is_fatal() {
        let err = SignatureProgram::resolve("var x=1;").unwrap_err();
        assert!(err.is_extraction_error());
    }

    #[test]
    fn test_missing_driver_is_fatal() {
        let err = SignatureProgram::resolve("var Xy={Ab:function(a){a.reverse()}};").unwrap_err();
        assert!(err.is_extraction_error());
    }

    #[test]
    fn test_unbound_member_is_fatal() {
        let script = r#"var Xy={Ab:function(a){a.reverse()}};var f=function(a){a=a.split("");Xy.Zz(a,3);return a.join("")};"#;
        let err = SignatureProgram::resolve(script).unwrap_err();
        assert!(err.is_extraction_error());
    }

    #[test]
    fn test_foreign_object_is_fatal() {
        let script = r#"var Xy={Ab:function(a){a.reverse()}};var f=function(a){a=a.split("");Qq.Ab(a,3);return a.join("")};"#;
        let err = SignatureProgram::resolve(script).unwrap_err();
        assert!(err.is_extraction_error());
    }
}
