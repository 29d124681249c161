//! Per-call execution of a transform program.
//!
//! Every call builds its own slot array and character array. Copy slots and
//! `c` references share the slot array itself, so primitives can reorder the
//! functions they are called through. Both arrays are emptied when the call
//! ends, which drops those self references.

use crate::error::DescrambleError;
use crate::platform::grammar::{ArrayElement, Primitive, VariableRef};
use crate::platform::switch_vm;
use crate::platform::transform::{Action, TransformProgram};
use std::cell::RefCell;
use std::rc::Rc;

type Array = Rc<RefCell<Vec<Value>>>;

/// Runtime value held in a slot
#[derive(Debug, Clone)]
pub(crate) enum Value {
    Null,
    Number(i64),
    Str(String),
    Array(Array),
    Function(Primitive),
}

impl Value {
    fn new_array(values: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(values)))
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Function(_) => "function",
        }
    }

    /// Single character held by the value, if any
    fn as_char(&self) -> Option<char> {
        match self {
            Value::Str(text) => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(c),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

fn char_value(c: char) -> Value {
    Value::Str(c.to_string())
}

/// The two arrays of one call
struct Frame {
    chars: Array,
    slots: Array,
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.slots.borrow_mut().clear();
        self.chars.borrow_mut().clear();
    }
}

impl Frame {
    fn new(program: &TransformProgram, input: &str) -> Self {
        let chars: Array = Rc::new(RefCell::new(input.chars().map(char_value).collect()));
        let slots: Array = Rc::new(RefCell::new(Vec::with_capacity(program.elements().len())));

        {
            let mut values = slots.borrow_mut();
            for element in program.elements() {
                values.push(match element {
                    ArrayElement::Number(n) => Value::Number(*n),
                    ArrayElement::String(text) => Value::Str(text.clone()),
                    ArrayElement::Variable(VariableRef::SelfInput) => Value::Str(input.to_string()),
                    ArrayElement::Variable(VariableRef::SplitInput) => Value::Array(chars.clone()),
                    ArrayElement::Variable(VariableRef::SelfArray) => Value::Array(slots.clone()),
                    ArrayElement::Variable(VariableRef::Null) => Value::Null,
                    ArrayElement::Function(primitive) => Value::Function(primitive.clone()),
                });
            }
            for &slot in program.copy_slots() {
                values[slot] = Value::Array(slots.clone());
            }
        }

        Self { chars, slots }
    }

    fn slot(&self, index: usize) -> Result<Value, DescrambleError> {
        self.slots.borrow().get(index).cloned().ok_or_else(|| {
            DescrambleError::RuntimeAction(format!("slot {} no longer exists", index))
        })
    }

    fn run(&self, action: &Action) -> Result<(), DescrambleError> {
        let mut args = Vec::with_capacity(action.args.len());
        for arg in &action.args {
            let value = self.slot(arg.source)?;
            args.push(if arg.invoke_first {
                call(&value, &[])?.unwrap_or(Value::Null)
            } else {
                value
            });
        }

        let target = self.slot(action.target)?;
        call(&target, &args)?;
        Ok(())
    }

    fn join(&self) -> Result<String, DescrambleError> {
        let mut output = String::new();
        for value in self.chars.borrow().iter() {
            match value {
                Value::Str(text) => output.push_str(text),
                Value::Number(n) => output.push_str(&n.to_string()),
                Value::Null => {}
                other => {
                    return Err(DescrambleError::RuntimeAction(format!(
                        "cannot join a {} value",
                        other.kind()
                    )))
                }
            }
        }
        Ok(output)
    }
}

/// Execute `program` over `input`, failing on the first broken action
pub(crate) fn execute(program: &TransformProgram, input: &str) -> Result<String, DescrambleError> {
    let frame = Frame::new(program, input);
    for action in program.actions() {
        frame.run(action)?;
    }
    frame.join()
}

fn call(callee: &Value, args: &[Value]) -> Result<Option<Value>, DescrambleError> {
    match callee {
        Value::Function(primitive) => invoke(primitive, args),
        other => Err(DescrambleError::RuntimeAction(format!(
            "{} value is not callable",
            other.kind()
        ))),
    }
}

fn invoke(primitive: &Primitive, args: &[Value]) -> Result<Option<Value>, DescrambleError> {
    match primitive {
        Primitive::RemoveAt => {
            let (array, n) = (array_arg(args, 0)?, number_arg(args, 1)?);
            let mut values = array.borrow_mut();
            if let Some(index) = wrap_index(n, values.len()) {
                values.remove(index);
            }
        }
        Primitive::Swap | Primitive::SwapSplice => {
            let (array, n) = (array_arg(args, 0)?, number_arg(args, 1)?);
            let mut values = array.borrow_mut();
            match wrap_index(n, values.len()) {
                Some(index) => values.swap(0, index),
                // `d[0]=d[NaN]` leaves a single undefined element
                None => values.push(Value::Null),
            }
        }
        Primitive::Push => {
            let (array, value) = (array_arg(args, 0)?, arg(args, 1)?);
            array.borrow_mut().push(value.clone());
        }
        Primitive::Reverse | Primitive::ReverseLoop => {
            array_arg(args, 0)?.borrow_mut().reverse();
        }
        Primitive::RotateSplice | Primitive::RotateLoop => {
            let (array, n) = (array_arg(args, 0)?, number_arg(args, 1)?);
            let mut values = array.borrow_mut();
            if let Some(by) = wrap_index(n, values.len()) {
                values.rotate_right(by);
            }
        }
        Primitive::Substitute(table) => {
            let (array, key) = (array_arg(args, 0)?, string_arg(args, 1)?);
            remap(array, |target| table.substitute(target, key))?;
        }
        Primitive::SubstituteWith => {
            let (array, key) = (array_arg(args, 0)?, string_arg(args, 1)?);
            let table = array_arg(args, 2)?
                .borrow()
                .iter()
                .map(|value| {
                    value.as_char().ok_or_else(|| {
                        DescrambleError::RuntimeAction(format!(
                            "substitution table holds a {} value",
                            value.kind()
                        ))
                    })
                })
                .collect::<Result<Vec<char>, _>>()?;
            let start = table.len() as i64;
            remap(array, |target| switch_vm::substitute(target, key, &table, start, 0))?;
        }
        Primitive::Alphabet(table) => {
            let values = table.chars().iter().copied().map(char_value).collect();
            return Ok(Some(Value::new_array(values)));
        }
    }
    Ok(None)
}

/// Apply a substitution to `array` in place
fn remap(
    array: &Array,
    substitute: impl FnOnce(&[Option<char>]) -> Result<Vec<char>, DescrambleError>,
) -> Result<(), DescrambleError> {
    let target: Vec<Option<char>> = array.borrow().iter().map(Value::as_char).collect();
    let output = substitute(&target)?;
    let mut values = array.borrow_mut();
    for (slot, c) in values.iter_mut().zip(output) {
        *slot = char_value(c);
    }
    Ok(())
}

/// `(n % len + len) % len`, or `None` for an empty array
fn wrap_index(n: i64, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    Some(n.rem_euclid(len as i64) as usize)
}

fn arg(args: &[Value], index: usize) -> Result<&Value, DescrambleError> {
    args.get(index).ok_or_else(|| {
        DescrambleError::RuntimeAction(format!("missing argument {}", index))
    })
}

fn array_arg(args: &[Value], index: usize) -> Result<&Array, DescrambleError> {
    match arg(args, index)? {
        Value::Array(array) => Ok(array),
        other => Err(DescrambleError::RuntimeAction(format!(
            "argument {} is a {}, expected an array",
            index,
            other.kind()
        ))),
    }
}

fn number_arg(args: &[Value], index: usize) -> Result<i64, DescrambleError> {
    match arg(args, index)? {
        Value::Number(n) => Ok(*n),
        other => Err(DescrambleError::RuntimeAction(format!(
            "argument {} is a {}, expected a number",
            index,
            other.kind()
        ))),
    }
}

fn string_arg(args: &[Value], index: usize) -> Result<&str, DescrambleError> {
    match arg(args, index)? {
        Value::Str(text) => Ok(text),
        other => Err(DescrambleError::RuntimeAction(format!(
            "argument {} is a {}, expected a string",
            index,
            other.kind()
        ))),
    }
}
