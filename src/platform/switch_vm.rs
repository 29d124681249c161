//! Replay of the `for(...;++f-h.length-32;) switch(f){...}` loops that build
//! the n-parameter substitution tables.
//!
//! The switch body is never evaluated as script. It is tokenized into a small
//! instruction set and replayed as a finite-state loop over one counter and
//! one growing table.

use crate::error::DescrambleError;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

/// Default bound on replay iterations
pub const MAX_REPLAY_ITERATIONS: usize = 256;

/// Counter value the loop starts from
const COUNTER_START: i64 = 64;

/// Offset applied in the loop condition and in the closure index
const COUNTER_BIAS: i64 = 32;

const INSTRUCTION_PATTERN: &str = concat!(
    r"(?P<case>case\s*(?P<value>-?\d+)\s*:)",
    r"|(?P<default>default\s*:)",
    r"|(?P<counter>[fd](?P<op>-=|\+=|=)(?P<amount>-?\d+))",
    r"|(?P<append>h\.push\(String\.fromCharCode\(f\)\)|e\.push\(String\.fromCharCode\(d\)\))",
    r"|(?P<continue>continue)",
    r"|(?P<break>break)",
);

/// Counter mutation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CounterOp {
    Assign,
    Add,
    Subtract,
}

impl CounterOp {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "=" => Some(CounterOp::Assign),
            "+=" => Some(CounterOp::Add),
            "-=" => Some(CounterOp::Subtract),
            _ => None,
        }
    }

    fn apply(self, counter: i64, amount: i64) -> i64 {
        match self {
            CounterOp::Assign => amount,
            CounterOp::Add => counter.wrapping_add(amount),
            CounterOp::Subtract => counter.wrapping_sub(amount),
        }
    }
}

/// One statement of a switch body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Instruction {
    Case(i64),
    Default,
    Counter(CounterOp, i64),
    Append,
    Continue,
    Break,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Fallthrough,
    Break,
    Continue,
}

/// Ordered character table produced by a replay, with the loop counter it
/// finished on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubstitutionTable {
    chars: Vec<char>,
    counter: i64,
}

impl SubstitutionTable {
    pub fn new(chars: Vec<char>, counter: i64) -> Self {
        Self { chars, counter }
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    /// Counter value the replay loop finished on
    pub fn counter(&self) -> i64 {
        self.counter
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn as_string(&self) -> String {
        self.chars.iter().collect()
    }

    /// Remap `target` against `key` the way the closure-mode loop does
    pub fn substitute(
        &self,
        target: &[Option<char>],
        key: &str,
    ) -> Result<Vec<char>, DescrambleError> {
        substitute(target, key, &self.chars, self.counter, -COUNTER_BIAS)
    }
}

/// Outcome of one replay
#[derive(Debug, Clone)]
pub struct Replay {
    pub table: SubstitutionTable,
    pub iterations: usize,
    /// Loop was cut by the iteration bound rather than its own condition
    pub exhausted: bool,
}

/// Tokenize a switch body into instructions.
///
/// Only whitespace and `;` may appear between recognized statements.
pub fn parse_switch_body(body: &str) -> Result<Vec<Instruction>, DescrambleError> {
    let matcher = Regex::new(INSTRUCTION_PATTERN)?;
    let mut program = Vec::new();
    let mut cursor = 0;

    for caps in matcher.captures_iter(body) {
        let Some(whole) = caps.get(0) else { continue };
        check_gap(&body[cursor..whole.start()], cursor)?;
        cursor = whole.end();

        let instruction = if let Some(value) = caps.name("value") {
            Instruction::Case(value.as_str().parse()?)
        } else if caps.name("default").is_some() {
            Instruction::Default
        } else if let (Some(op), Some(amount)) = (caps.name("op"), caps.name("amount")) {
            let op = CounterOp::parse(op.as_str())
                .ok_or_else(|| DescrambleError::mismatch(whole.start(), whole.as_str()))?;
            Instruction::Counter(op, amount.as_str().parse()?)
        } else if caps.name("append").is_some() {
            Instruction::Append
        } else if caps.name("continue").is_some() {
            Instruction::Continue
        } else if caps.name("break").is_some() {
            Instruction::Break
        } else {
            return Err(DescrambleError::mismatch(whole.start(), whole.as_str()));
        };
        program.push(instruction);
    }
    check_gap(&body[cursor..], cursor)?;

    Ok(program)
}

fn check_gap(gap: &str, offset: usize) -> Result<(), DescrambleError> {
    match gap.find(|c: char| c != ';' && !c.is_whitespace()) {
        Some(at) => Err(DescrambleError::mismatch(offset + at, &gap[at..])),
        None => Ok(()),
    }
}

/// Replay a parsed switch program.
///
/// `append_after_switch` selects the loop shape that appends the counter's
/// character after the switch statement unless the iteration `continue`d.
pub fn replay(program: &[Instruction], append_after_switch: bool, max_iterations: usize) -> Replay {
    let default_entry = program
        .iter()
        .position(|instruction| *instruction == Instruction::Default)
        .map(|at| at + 1);

    let mut counter = COUNTER_START;
    let mut table: Vec<char> = Vec::new();
    let mut iterations = 0;
    let mut exhausted = false;

    loop {
        counter = counter.wrapping_add(1);
        if counter.wrapping_sub(table.len() as i64).wrapping_sub(COUNTER_BIAS) == 0 {
            break;
        }
        iterations += 1;
        if iterations >= max_iterations {
            exhausted = true;
            break;
        }

        let entry = program
            .iter()
            .position(|instruction| *instruction == Instruction::Case(counter))
            .map(|at| at + 1)
            .or(default_entry);
        let flow = match entry {
            Some(at) => run_from(&program[at..], &mut counter, &mut table),
            None => Flow::Fallthrough,
        };

        if append_after_switch && flow != Flow::Continue {
            table.push(char_code(counter));
        }
    }

    Replay {
        table: SubstitutionTable::new(table, counter),
        iterations,
        exhausted,
    }
}

fn run_from(instructions: &[Instruction], counter: &mut i64, table: &mut Vec<char>) -> Flow {
    for instruction in instructions {
        match *instruction {
            Instruction::Case(_) | Instruction::Default => {}
            Instruction::Counter(op, amount) => *counter = op.apply(*counter, amount),
            Instruction::Append => table.push(char_code(*counter)),
            Instruction::Continue => return Flow::Continue,
            Instruction::Break => return Flow::Break,
        }
    }
    Flow::Fallthrough
}

/// Parse and replay a switch body, logging when the iteration bound was hit
pub fn replay_body(
    body: &str,
    append_after_switch: bool,
    max_iterations: usize,
) -> Result<SubstitutionTable, DescrambleError> {
    let program = parse_switch_body(body)?;
    let replay = replay(&program, append_after_switch, max_iterations);

    if replay.exhausted {
        warn!(
            "Switch replay stopped after {} iterations with {} table entries",
            replay.iterations,
            replay.table.len()
        );
    } else {
        debug!(
            "Switch replay produced {} entries in {} iterations",
            replay.table.len(),
            replay.iterations
        );
    }

    Ok(replay.table)
}

/// `String.fromCharCode` on a single counter value
fn char_code(counter: i64) -> char {
    let unit = counter.rem_euclid(0x10000) as u32;
    char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER)
}

/// Position-dependent remapping shared by the substitution primitives.
///
/// For position `m` holding `l`, the output is
/// `table[(idx(l) - idx(key[m]) + m + bias + k) % table.len()]` where `k`
/// starts at `start` and drops by one per position. Each output is appended
/// to the key buffer, so positions past the original key read earlier
/// outputs. Values missing from the table index as -1.
pub fn substitute(
    target: &[Option<char>],
    key: &str,
    table: &[char],
    start: i64,
    bias: i64,
) -> Result<Vec<char>, DescrambleError> {
    if table.is_empty() {
        return Err(DescrambleError::RuntimeAction(
            "substitution over an empty table".to_string(),
        ));
    }

    let position = |value: Option<char>| -> i64 {
        value
            .and_then(|c| table.iter().position(|t| *t == c))
            .map_or(-1, |at| at as i64)
    };
    let modulus = table.len() as i64;
    let mut key: Vec<char> = key.chars().collect();
    let mut countdown = start;
    let mut output = Vec::with_capacity(target.len());

    for (m, value) in target.iter().enumerate() {
        let index = position(*value)
            .wrapping_sub(position(key.get(m).copied()))
            .wrapping_add(m as i64)
            .wrapping_add(bias)
            .wrapping_add(countdown)
            % modulus;
        countdown = countdown.wrapping_sub(1);
        if index < 0 {
            return Err(DescrambleError::RuntimeAction(format!(
                "substitution index {} out of range at position {}",
                index, m
            )));
        }
        let c = table[index as usize];
        output.push(c);
        key.push(c);
    }

    Ok(output)
}
