//! Element grammar for the n-parameter array literal.
//!
//! The catalog is an ordered table of `(pattern, builder)` rules. The first
//! rule matching at a position wins, and every matched fragment becomes a
//! value from a closed set. Text no rule accepts is rejected.

use crate::error::DescrambleError;
use crate::platform::patterns::{unquote, JS_DOUBLE_QUOTE_STRING, JS_SINGLE_QUOTE_STRING, JS_VARIABLE};
use crate::platform::switch_vm::{self, SubstitutionTable, MAX_REPLAY_ITERATIONS};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

const REMOVE_AT: &str = r"function\(d,e\)\{e=\(e%d\.length\+d\.length\)%d\.length;d\.splice\(e,1\)\}";
const SWAP: &str = r"function\(d,e\)\{e=\(e%d\.length\+d\.length\)%d\.length;var f=d\[0\];d\[0\]=d\[e\];d\[e\]=f\}";
const PUSH: &str = r"function\(d,e\)\{d\.push\(e\)\}";
const REVERSE_LOOP: &str = r"function\(d\)\{for\(var e=d\.length;e;\)d\.push\(d\.splice\(--e,1\)\[0\]\)\}";
const REVERSE: &str = r"function\(d\)\{d\.reverse\(\)\}";
const ROTATE_SPLICE: &str = r"function\(d,e\)\{e=\(e%d\.length\+d\.length\)%d\.length;d\.splice\(-e\)\.reverse\(\)\.forEach\(function\(f\)\{d\.unshift\(f\)\}\)\}";
const SWAP_SPLICE: &str = r"function\(d,e\)\{e=\(e%d\.length\+d\.length\)%d\.length;d\.splice\(0,1,d\.splice\(e,1,d\[0\]\)\[0\]\)\}";
const ROTATE_LOOP: &str = r"function\(d,e\)\{for\(e=\(e%d\.length\+d\.length\)%d\.length;e--;\)d\.unshift\(d\.pop\(\)\)\}";
const SUBSTITUTE_WITH: &str = r#"function\(d,e,f\)\{var (?:k|h)=f\.length;d\.forEach\(function\(l,m,n\)\{this\.push\(n\[m\]=f\[\(f\.indexOf\(l\)-f\.indexOf\(this\[m\]\)\+m\+(?:k|h)--\)%f\.length\]\)\},e\.split\((?:''|"")\)\)\}"#;

const SUBSTITUTE_TAIL: &str = r#"d\.forEach\(function\(l,m,n\)\{this\.push\(n\[m\]=h\[\(h\.indexOf\(l\)-h\.indexOf\(this\[m\]\)\+m-32\+f--\)%h\.length\]\)\},e\.split\((?:''|"")\)\)\}"#;
const SUBSTITUTE_BRACED_HEAD: &str = r"function\(d,e\)\{for\(var f=64,h=\[\];\+\+f-h\.length-32;\)\{switch\(f\)\{";
const SUBSTITUTE_BRACED_FOOT: &str = r"\}h\.push\(String\.fromCharCode\(f\)\)\}";
const SUBSTITUTE_BARE_HEAD: &str = r"function\(d,e\)\{for\(var f=64,h=\[\];\+\+f-h\.length-32;\)switch\(f\)\{";
const ALPHABET_BRACED_HEAD: &str = r"function\(\)\{for\(var d=64,e=\[\];\+\+d-e\.length-32;\)\{switch\(d\)\{";
const ALPHABET_BRACED_FOOT: &str = r"\}e\.push\(String\.fromCharCode\(d\)\)\}return e\}";
const ALPHABET_BARE_HEAD: &str = r"function\(\)\{for\(var d=64,e=\[\];\+\+d-e\.length-32;\)switch\(d\)\{";
const ALPHABET_BARE_FOOT: &str = r"\}return e\}";

const SWITCH_BODY: &str = r"[\s\S]*?";

const EXPONENT_NUMBER: &str = r"-?\d+[eE]\d+";
const NUMBER: &str = r"-?\d+";
const LINE_BREAK: &str = r"\r?\n";

/// Identifiers an array literal may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VariableRef {
    /// `a`, the raw input string
    SelfInput,
    /// `b`, the input split into characters
    SplitInput,
    /// `c`, the array itself
    SelfArray,
    Null,
}

impl VariableRef {
    pub fn from_identifier(name: &str) -> Result<Self, DescrambleError> {
        match name {
            "a" => Ok(VariableRef::SelfInput),
            "b" => Ok(VariableRef::SplitInput),
            "c" => Ok(VariableRef::SelfArray),
            "null" => Ok(VariableRef::Null),
            other => Err(DescrambleError::UnknownVariable(other.to_string())),
        }
    }
}

/// Known array mutation primitives
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Primitive {
    /// `(d, e)`: remove `d[e mod len]`
    RemoveAt,
    /// `(d, e)`: swap `d[0]` and `d[e mod len]`
    Swap,
    /// `(d, e)`: the same swap written with nested splices
    SwapSplice,
    /// `(d, e)`: append `e`
    Push,
    /// `(d)`: reverse by repeated splice and push
    ReverseLoop,
    /// `(d)`: reverse
    Reverse,
    /// `(d, e)`: rotate right by `e mod len` with splice and unshift
    RotateSplice,
    /// `(d, e)`: rotate right by `e mod len` with pop and unshift
    RotateLoop,
    /// `(d, e)`: remap `d` against key `e` through a replayed table
    Substitute(Arc<SubstitutionTable>),
    /// `()`: return a copy of a replayed table
    Alphabet(Arc<SubstitutionTable>),
    /// `(d, e, f)`: remap `d` against key `e` through the table `f`
    SubstituteWith,
}

impl Primitive {
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::RemoveAt => "remove_at",
            Primitive::Swap => "swap",
            Primitive::SwapSplice => "swap_splice",
            Primitive::Push => "push",
            Primitive::ReverseLoop => "reverse_loop",
            Primitive::Reverse => "reverse",
            Primitive::RotateSplice => "rotate_splice",
            Primitive::RotateLoop => "rotate_loop",
            Primitive::Substitute(_) => "substitute",
            Primitive::Alphabet(_) => "alphabet",
            Primitive::SubstituteWith => "substitute_with",
        }
    }

    /// Number of arguments the primitive reads
    pub fn arity(&self) -> usize {
        match self {
            Primitive::Alphabet(_) => 0,
            Primitive::ReverseLoop | Primitive::Reverse => 1,
            Primitive::SubstituteWith => 3,
            _ => 2,
        }
    }
}

/// One value of the array literal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ArrayElement {
    Number(i64),
    String(String),
    Variable(VariableRef),
    Function(Primitive),
}

type Builder = Box<dyn Fn(&str) -> Result<Option<ArrayElement>, DescrambleError> + Send + Sync>;

struct ElementRule {
    name: &'static str,
    pattern: String,
    build: Builder,
}

impl ElementRule {
    fn fixed(name: &'static str, pattern: &str, primitive: Primitive) -> Self {
        Self {
            name,
            pattern: pattern.to_string(),
            build: Box::new(move |_| Ok(Some(ArrayElement::Function(primitive.clone())))),
        }
    }

    fn switch(
        name: &'static str,
        head: &str,
        foot: &str,
        append_after_switch: bool,
        alphabet: bool,
        max_iterations: usize,
    ) -> Result<Self, DescrambleError> {
        let body = Regex::new(&format!("^{}(?P<body>{}){}$", head, SWITCH_BODY, foot))?;
        Ok(Self {
            name,
            pattern: format!("{}{}{}", head, SWITCH_BODY, foot),
            build: Box::new(move |fragment| {
                let caps = body
                    .captures(fragment)
                    .ok_or_else(|| DescrambleError::mismatch(0, fragment))?;
                let table = Arc::new(switch_vm::replay_body(
                    &caps["body"],
                    append_after_switch,
                    max_iterations,
                )?);
                let primitive = if alphabet {
                    Primitive::Alphabet(table)
                } else {
                    Primitive::Substitute(table)
                };
                Ok(Some(ArrayElement::Function(primitive)))
            }),
        })
    }

    fn value(
        name: &'static str,
        pattern: &str,
        build: impl Fn(&str) -> Result<Option<ArrayElement>, DescrambleError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            pattern: pattern.to_string(),
            build: Box::new(build),
        }
    }
}

/// Ordered rule catalog with its compiled matcher
pub struct ElementGrammar {
    rules: Vec<ElementRule>,
    matcher: Regex,
}

impl ElementGrammar {
    /// Create the catalog with the default replay bound
    pub fn new() -> Result<Self, DescrambleError> {
        Self::with_max_replay_iterations(MAX_REPLAY_ITERATIONS)
    }

    /// Create the catalog, bounding every embedded switch replay
    pub fn with_max_replay_iterations(max_iterations: usize) -> Result<Self, DescrambleError> {
        let substitute_bare_foot = format!(r"\}}{}", SUBSTITUTE_TAIL);
        let substitute_braced_foot = format!("{}{}", SUBSTITUTE_BRACED_FOOT, SUBSTITUTE_TAIL);

        let rules = vec![
            ElementRule::fixed("remove_at", REMOVE_AT, Primitive::RemoveAt),
            ElementRule::fixed("swap", SWAP, Primitive::Swap),
            ElementRule::fixed("push", PUSH, Primitive::Push),
            ElementRule::fixed("reverse_loop", REVERSE_LOOP, Primitive::ReverseLoop),
            ElementRule::fixed("reverse", REVERSE, Primitive::Reverse),
            ElementRule::fixed("rotate_splice", ROTATE_SPLICE, Primitive::RotateSplice),
            ElementRule::fixed("swap_splice", SWAP_SPLICE, Primitive::SwapSplice),
            ElementRule::switch(
                "substitute_braced",
                SUBSTITUTE_BRACED_HEAD,
                &substitute_braced_foot,
                true,
                false,
                max_iterations,
            )?,
            ElementRule::switch(
                "substitute_bare",
                SUBSTITUTE_BARE_HEAD,
                &substitute_bare_foot,
                false,
                false,
                max_iterations,
            )?,
            ElementRule::switch(
                "alphabet_braced",
                ALPHABET_BRACED_HEAD,
                ALPHABET_BRACED_FOOT,
                true,
                true,
                max_iterations,
            )?,
            ElementRule::switch(
                "alphabet_bare",
                ALPHABET_BARE_HEAD,
                ALPHABET_BARE_FOOT,
                false,
                true,
                max_iterations,
            )?,
            ElementRule::fixed("rotate_loop", ROTATE_LOOP, Primitive::RotateLoop),
            ElementRule::fixed("substitute_with", SUBSTITUTE_WITH, Primitive::SubstituteWith),
            ElementRule::value("exponent_number", EXPONENT_NUMBER, parse_exponent_number),
            ElementRule::value("number", NUMBER, |text| {
                Ok(Some(ArrayElement::Number(text.parse()?)))
            }),
            ElementRule::value("variable", JS_VARIABLE, |text| {
                Ok(Some(ArrayElement::Variable(VariableRef::from_identifier(text)?)))
            }),
            ElementRule::value("single_quote_string", JS_SINGLE_QUOTE_STRING, |text| {
                Ok(Some(ArrayElement::String(unquote(text).to_string())))
            }),
            ElementRule::value("double_quote_string", JS_DOUBLE_QUOTE_STRING, |text| {
                Ok(Some(ArrayElement::String(unquote(text).to_string())))
            }),
            ElementRule::value("line_break", LINE_BREAK, |_| Ok(None)),
        ];

        let alternation = rules
            .iter()
            .map(|rule| format!("({})", rule.pattern))
            .collect::<Vec<_>>()
            .join("|");
        let matcher = Regex::new(&alternation)?;

        Ok(Self { rules, matcher })
    }

    /// Names of the catalog rules in priority order
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name).collect()
    }

    /// Parse the body of an array literal into its elements, in order
    pub fn parse_array(&self, body: &str) -> Result<Vec<ArrayElement>, DescrambleError> {
        let mut elements = Vec::new();
        let mut cursor = 0;

        for caps in self.matcher.captures_iter(body) {
            let Some(whole) = caps.get(0) else { continue };
            check_separators(&body[cursor..whole.start()], cursor)?;
            cursor = whole.end();

            if let Some(element) = self.build_match(&caps, whole.start())? {
                elements.push(element);
            }
        }
        check_separators(&body[cursor..], cursor)?;

        Ok(elements)
    }

    /// Classify one complete fragment. `Ok(None)` means a separator-only match.
    pub fn classify(&self, fragment: &str) -> Result<Option<ArrayElement>, DescrambleError> {
        let caps = self
            .matcher
            .captures(fragment)
            .filter(|caps| caps.get(0).is_some_and(|m| m.start() == 0 && m.end() == fragment.len()))
            .ok_or_else(|| DescrambleError::mismatch(0, fragment))?;
        self.build_match(&caps, 0)
    }

    fn build_match(
        &self,
        caps: &regex::Captures<'_>,
        offset: usize,
    ) -> Result<Option<ArrayElement>, DescrambleError> {
        for (index, rule) in self.rules.iter().enumerate() {
            if let Some(m) = caps.get(index + 1) {
                return (rule.build)(m.as_str());
            }
        }
        let text = caps.get(0).map_or("", |m| m.as_str());
        Err(DescrambleError::mismatch(offset, text))
    }
}

impl fmt::Debug for ElementGrammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementGrammar")
            .field("rules", &self.rule_names())
            .finish()
    }
}

fn check_separators(gap: &str, offset: usize) -> Result<(), DescrambleError> {
    match gap.find(|c: char| c != ',' && !c.is_whitespace()) {
        Some(at) => Err(DescrambleError::mismatch(offset + at, &gap[at..])),
        None => Ok(()),
    }
}

fn parse_exponent_number(text: &str) -> Result<Option<ArrayElement>, DescrambleError> {
    let (mantissa, exponent) = text
        .split_once(['e', 'E'])
        .ok_or_else(|| DescrambleError::mismatch(0, text))?;
    let mantissa: i64 = mantissa.parse()?;
    let exponent: u32 = exponent.parse()?;

    10_i64
        .checked_pow(exponent)
        .and_then(|scale| mantissa.checked_mul(scale))
        .map(|value| Some(ArrayElement::Number(value)))
        .ok_or_else(|| DescrambleError::mismatch(0, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grammar() -> ElementGrammar {
        ElementGrammar::new().unwrap()
    }

    #[test]
    fn test_catalog_order() {
        let names = grammar().rule_names();
        assert_eq!(names.len(), 19);
        assert_eq!(names[0], "remove_at");
        assert_eq!(names[13], "exponent_number");
        assert_eq!(names[14], "number");
        assert_eq!(names[18], "line_break");
    }

    #[test]
    fn test_classify_fixed_primitives() {
        let grammar = grammar();
        let cases = [
            ("function(d){d.reverse()}", Primitive::Reverse),
            ("function(d,e){d.push(e)}", Primitive::Push),
            ("function(d,e){e=(e%d.length+d.length)%d.length;d.splice(e,1)}", Primitive::RemoveAt),
            (
                "function(d,e){for(e=(e%d.length+d.length)%d.length;e--;)d.unshift(d.pop())}",
                Primitive::RotateLoop,
            ),
            (
                "function(d){for(var e=d.length;e;)d.push(d.splice(--e,1)[0])}",
                Primitive::ReverseLoop,
            ),
            (
                "function(d,e,f){var k=f.length;d.forEach(function(l,m,n){this.push(n[m]=f[(f.indexOf(l)-f.indexOf(this[m])+m+k--)%f.length])},e.split(\"\"))}",
                Primitive::SubstituteWith,
            ),
        ];

        for (fragment, expected) in cases {
            assert_eq!(
                grammar.classify(fragment).unwrap(),
                Some(ArrayElement::Function(expected)),
                "fragment: {}",
                fragment
            );
        }
    }

    #[test]
    fn test_classify_switch_alphabet() {
        let fragment = "function(){for(var d=64,e=[];++d-e.length-32;)switch(d){case 58:d=96;continue;case 91:d=44;break;case 65:d=47;continue;case 46:d=153;case 123:d-=58;default:e.push(String.fromCharCode(d))}return e}";
        match grammar().classify(fragment).unwrap() {
            Some(ArrayElement::Function(Primitive::Alphabet(table))) => {
                assert_eq!(table.len(), 64);
                assert!(table.as_string().starts_with("0123456789abc"));
            }
            other => panic!("unexpected element: {:?}", other),
        }
    }

    #[test]
    fn test_classify_switch_substitute_bare() {
        let fragment = r#"function(d,e){for(var f=64,h=[];++f-h.length-32;)switch(f){case 58:f=96;continue;case 91:f=44;break;case 65:f=47;continue;case 46:f=153;case 123:f-=58;default:h.push(String.fromCharCode(f))}d.forEach(function(l,m,n){this.push(n[m]=h[(h.indexOf(l)-h.indexOf(this[m])+m-32+f--)%h.length])},e.split(""))}"#;
        match grammar().classify(fragment).unwrap() {
            Some(ArrayElement::Function(Primitive::Substitute(table))) => {
                assert_eq!(
                    table.as_string(),
                    "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ-_"
                );
                assert_eq!(table.counter(), 96);
            }
            other => panic!("unexpected element: {:?}", other),
        }
    }

    #[test]
    fn test_classify_switch_alphabet_braced() {
        let fragment = "function(){for(var d=64,e=[];++d-e.length-32;){switch(d){case 58:d-=14;case 91:case 92:case 93:continue;case 123:d=47;case 94:case 95:case 96:continue;case 46:d=95}e.push(String.fromCharCode(d))}return e}";
        match grammar().classify(fragment).unwrap() {
            Some(ArrayElement::Function(Primitive::Alphabet(table))) => {
                assert_eq!(
                    table.as_string(),
                    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_"
                );
            }
            other => panic!("unexpected element: {:?}", other),
        }
    }

    #[test]
    fn test_parse_array_values() {
        let elements = grammar()
            .parse_array("-1287,\"ZhA5\",b,null,'k_x9',2E1,\nfunction(d){d.reverse()},a,c")
            .unwrap();
        assert_eq!(
            elements,
            vec![
                ArrayElement::Number(-1287),
                ArrayElement::String("ZhA5".to_string()),
                ArrayElement::Variable(VariableRef::SplitInput),
                ArrayElement::Variable(VariableRef::Null),
                ArrayElement::String("k_x9".to_string()),
                ArrayElement::Number(20),
                ArrayElement::Function(Primitive::Reverse),
                ArrayElement::Variable(VariableRef::SelfInput),
                ArrayElement::Variable(VariableRef::SelfArray),
            ]
        );
    }

    #[test]
    fn test_unknown_variable_is_rejected() {
        let err = grammar().parse_array("1,zz,2").unwrap_err();
        assert!(matches!(err, DescrambleError::UnknownVariable(ref name) if name == "zz"));
    }

    #[test]
    fn test_unknown_function_shape_is_rejected() {
        let err = grammar().parse_array("function(d){d.sort()}").unwrap_err();
        assert!(err.is_build_error());
    }

    #[test]
    fn test_stray_text_is_rejected() {
        let err = grammar().parse_array("1,+,2").unwrap_err();
        assert!(matches!(err, DescrambleError::GrammarMismatch { offset: 2, .. }));
    }

    #[test]
    fn test_exponent_overflow_is_rejected() {
        assert!(grammar().classify("9E30").is_err());
        assert_eq!(
            grammar().classify("-3e2").unwrap(),
            Some(ArrayElement::Number(-300))
        );
    }

    #[test]
    fn test_line_break_yields_no_value() {
        assert_eq!(grammar().classify("\n").unwrap(), None);
    }

    #[test]
    fn test_primitive_arity() {
        assert_eq!(Primitive::Reverse.arity(), 1);
        assert_eq!(Primitive::SubstituteWith.arity(), 3);
        assert_eq!(Primitive::Swap.arity(), 2);
        assert_eq!(Primitive::Swap.name(), "swap");
    }
}
