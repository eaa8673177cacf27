//! Rules and the closed action set a chain evaluates.

use std::sync::Arc;

use crate::error::TransformError;
use crate::field::{Field, Value};

pub type TransformFn = Arc<dyn Fn(Value) -> Result<Value, TransformError> + Send + Sync>;
pub type PredicateFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// The closed set of rewrite actions. A tagged variant rather than a
/// runtime-dispatched object, per the design notes.
#[derive(Clone)]
pub enum Action {
    Accept,
    Drop,
    Log,
    Replace(Value),
    Append(Value),
    Remove,
    Transform(TransformFn),
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Accept => write!(f, "Accept"),
            Action::Drop => write!(f, "Drop"),
            Action::Log => write!(f, "Log"),
            Action::Replace(v) => write!(f, "Replace({v:?})"),
            Action::Append(v) => write!(f, "Append({v:?})"),
            Action::Remove => write!(f, "Remove"),
            Action::Transform(_) => write!(f, "Transform(<fn>)"),
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Text(s) => write!(f, "Text({s:?})"),
            Value::Status(s) => write!(f, "Status({s})"),
            Value::Bytes(b) => write!(f, "Bytes[{} bytes]", b.len()),
        }
    }
}

/// A single rewrite rule: the field it targets, the action to apply, and
/// an optional guard evaluated against the field's current value.
#[derive(Clone)]
pub struct Rule {
    pub field: Field,
    pub action: Action,
    pub predicate: Option<PredicateFn>,
}

impl Rule {
    pub fn new(field: Field, action: Action) -> Self {
        Self {
            field,
            action,
            predicate: None,
        }
    }

    pub fn when(mut self, predicate: PredicateFn) -> Self {
        self.predicate = Some(predicate);
        self
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("field", &self.field)
            .field("action", &self.action)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}
