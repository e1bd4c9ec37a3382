//SPDX-License-Identifier: MPL-2.0

/*!
Values crossing the scripting host boundary.

[`Value`] is plain data and may travel between threads.  [`HostFunction`] is a script
callable; it is bound to the host thread and is deliberately `!Send`, so the compiler
rejects any attempt to invoke one from a worker.
*/

use std::fmt::{Debug, Formatter};
use std::rc::Rc;

use crate::error::Error;

/// A script value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value.  A promise resolved with `Empty` is resolved with no arguments.
    #[default]
    Empty,
    Bool(bool),
    Int(i32),
    Double(f64),
    String(String),
    Array(Vec<Value>),
}

impl Value {
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

/**
A callable owned by the scripting host.

Invoking it can fail, as script may throw.
*/
#[derive(Clone)]
pub struct HostFunction(Rc<dyn Fn(&[Value]) -> Result<(), Error>>);

impl HostFunction {
    pub fn new<F: Fn(&[Value]) -> Result<(), Error> + 'static>(f: F) -> Self {
        HostFunction(Rc::new(f))
    }

    pub fn invoke(&self, args: &[Value]) -> Result<(), Error> {
        (self.0)(args)
    }
}

impl Debug for HostFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFunction").finish_non_exhaustive()
    }
}

/// An argument as script passed it: some value, or a function.
#[derive(Debug, Clone)]
pub enum ScriptArg {
    Value(Value),
    Function(HostFunction),
}

impl ScriptArg {
    /// The callable, or [`Error::InvalidArgument`] when script passed a non-function.
    pub fn as_function(&self) -> Result<&HostFunction, Error> {
        match self {
            ScriptArg::Function(f) => Ok(f),
            ScriptArg::Value(v) => Err(Error::invalid_argument(format!("expected a function, got {v:?}"))),
        }
    }
}

impl From<HostFunction> for ScriptArg {
    fn from(value: HostFunction) -> Self {
        ScriptArg::Function(value)
    }
}

impl From<Value> for ScriptArg {
    fn from(value: Value) -> Self {
        ScriptArg::Value(value)
    }
}
