//! Closed operation sets.
//!
//! Each endpoint declares the functions it exposes as an enum implementing
//! [`Procedure`]. A caller turns a variant into a method name plus ordered
//! arguments; a callee rebuilds the variant from an incoming call, so an
//! unknown method or ill-typed arguments are rejected before any handler runs.

use crate::codec::Codec;
use crate::error::ProtocolError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// An enumerated set of remotely callable operations.
pub trait Procedure: Sized + Send + 'static {
    /// Wire name of the operation.
    fn method(&self) -> &'static str;

    /// Encodes the operation's arguments in call order.
    fn into_args(self) -> Result<Vec<Value>, ProtocolError>;

    /// Rebuilds an operation from an incoming call.
    fn from_call(method: &str, args: Vec<Value>) -> Result<Self, ProtocolError>;
}

/// Positional argument reader for [`Procedure::from_call`].
///
/// Missing trailing arguments read as `null`; surplus arguments are ignored.
pub struct Args {
    method: String,
    position: usize,
    values: std::vec::IntoIter<Value>,
}

impl Args {
    pub fn new(method: &str, args: Vec<Value>) -> Self {
        Self {
            method: method.to_string(),
            position: 0,
            values: args.into_iter(),
        }
    }

    /// Reads the next argument as `T`.
    pub fn next<T: DeserializeOwned>(&mut self) -> Result<T, ProtocolError> {
        let position = self.position;
        self.position += 1;
        let value = self.values.next().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidArgs {
            method: self.method.clone(),
            reason: format!("argument {}: {}", position, e),
        })
    }

    /// Reads the next argument, substituting `T::default()` for `null`.
    pub fn next_or_default<T: DeserializeOwned + Default>(&mut self) -> Result<T, ProtocolError> {
        Ok(self.next::<Option<T>>()?.unwrap_or_default())
    }
}

/// Encodes one argument.
pub fn arg<T: Serialize>(value: &T) -> Result<Value, ProtocolError> {
    Codec::to_value(value)
}

/// Function table with no entries.
///
/// Used by cores that only make calls and never serve any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoProcedures {}

impl Procedure for NoProcedures {
    fn method(&self) -> &'static str {
        match *self {}
    }

    fn into_args(self) -> Result<Vec<Value>, ProtocolError> {
        match self {}
    }

    fn from_call(method: &str, _args: Vec<Value>) -> Result<Self, ProtocolError> {
        Err(ProtocolError::UnknownMethod(method.to_string()))
    }
}
