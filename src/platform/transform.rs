//! Extraction of the n-parameter transform into a structural model

use crate::error::DescrambleError;
use crate::platform::grammar::{ArrayElement, ElementGrammar};
use crate::platform::patterns::{js_capturing_string, JS_EMPTY_STRING, JS_VARIABLE};
use crate::platform::runtime;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

const COPY_PATTERN: &str = r"c\[(?P<slot>\d+)\]=c[;,]";
const ACTION_PATTERN: &str = r"c\[(?P<target>\d+)\]\((?P<args>(?:c\[\d+\](?:\(\))?,?)*)\)";
const ARG_PATTERN: &str = r"c\[(?P<source>\d+)\](?P<invoke>\(\))?";

/// One argument of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActionArg {
    pub source: usize,
    /// Call the slot with no arguments and pass the result
    pub invoke_first: bool,
}

/// One invocation of the function held at `target`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub target: usize,
    pub args: Vec<ActionArg>,
}

/// Structural model of the n-parameter transform
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformProgram {
    elements: Vec<ArrayElement>,
    copy_slots: BTreeSet<usize>,
    actions: Vec<Action>,
    fallback: String,
}

impl TransformProgram {
    /// Assemble a program, checking every referenced index against `elements`
    pub fn new(
        elements: Vec<ArrayElement>,
        copy_slots: BTreeSet<usize>,
        actions: Vec<Action>,
        fallback: impl Into<String>,
    ) -> Result<Self, DescrambleError> {
        let len = elements.len();
        let check = |index: usize| {
            if index < len {
                Ok(())
            } else {
                Err(DescrambleError::IndexOutOfBounds { index, len })
            }
        };

        for &slot in &copy_slots {
            check(slot)?;
        }
        for action in &actions {
            check(action.target)?;
            for arg in &action.args {
                check(arg.source)?;
            }
        }

        Ok(Self {
            elements,
            copy_slots,
            actions,
            fallback: fallback.into(),
        })
    }

    /// Locate the transform driver in `script` and build its model
    pub fn extract(script: &str, grammar: &ElementGrammar) -> Result<Self, DescrambleError> {
        let driver = Regex::new(&format!(
            concat!(
                r"function(?: {var})?\(a\)\{{var b=a\.split\({empty}\),c=\[(?P<array>[\s\S]*?)\];\s*",
                r"(?P<copies>(?:c\[\d+\]=c[;,])*?)\s*",
                r"try\{{(?P<actions>[\s\S]*?)\}}catch\(d\)\{{return{fallback}\+a\}}\s*",
                r"return b\.join\({empty}\)\}}"
            ),
            var = JS_VARIABLE,
            empty = JS_EMPTY_STRING,
            fallback = js_capturing_string("fallback"),
        ))?;

        let caps = driver.captures(script).ok_or_else(|| {
            DescrambleError::Extraction("n-parameter transform function not found".to_string())
        })?;
        let array = caps.name("array").map_or("", |m| m.as_str());
        let copies = caps.name("copies").map_or("", |m| m.as_str());
        let actions = caps.name("actions").map_or("", |m| m.as_str());
        let fallback = caps
            .name("fallback_double")
            .or_else(|| caps.name("fallback_single"))
            .map_or("", |m| m.as_str());

        let elements = grammar.parse_array(array)?;
        let copy_slots = parse_copies(copies)?;
        let actions = parse_actions(actions)?;
        debug!(
            "Extracted n-parameter transform: {} elements, {} copy slots, {} actions",
            elements.len(),
            copy_slots.len(),
            actions.len()
        );

        Self::new(elements, copy_slots, actions, fallback)
    }

    pub fn elements(&self) -> &[ArrayElement] {
        &self.elements
    }

    pub fn copy_slots(&self) -> &BTreeSet<usize> {
        &self.copy_slots
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Run the transform over `input`. Runtime failures yield
    /// `fallback + input`.
    pub fn apply(&self, input: &str) -> String {
        match runtime::execute(self, input) {
            Ok(output) => output,
            Err(e) => {
                debug!("n-parameter transform failed, using fallback: {}", e);
                format!("{}{}", self.fallback, input)
            }
        }
    }
}

fn parse_copies(text: &str) -> Result<BTreeSet<usize>, DescrambleError> {
    let matcher = Regex::new(COPY_PATTERN)?;
    let mut slots = BTreeSet::new();
    for caps in matcher.captures_iter(text) {
        slots.insert(caps["slot"].parse()?);
    }
    Ok(slots)
}

fn parse_actions(text: &str) -> Result<Vec<Action>, DescrambleError> {
    let matcher = Regex::new(ACTION_PATTERN)?;
    let arg_matcher = Regex::new(ARG_PATTERN)?;
    let mut actions = Vec::new();
    let mut cursor = 0;

    for caps in matcher.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        check_separators(&text[cursor..whole.start()], cursor)?;
        cursor = whole.end();

        let args = arg_matcher
            .captures_iter(&caps["args"])
            .map(|arg| {
                Ok(ActionArg {
                    source: arg["source"].parse()?,
                    invoke_first: arg.name("invoke").is_some(),
                })
            })
            .collect::<Result<Vec<_>, DescrambleError>>()?;

        actions.push(Action {
            target: caps["target"].parse()?,
            args,
        });
    }
    check_separators(&text[cursor..], cursor)?;

    Ok(actions)
}

fn check_separators(gap: &str, offset: usize) -> Result<(), DescrambleError> {
    match gap.find(|c: char| c != ',' && c != ';' && !c.is_whitespace()) {
        Some(at) => Err(DescrambleError::mismatch(offset + at, &gap[at..])),
        None => Ok(()),
    }
}
