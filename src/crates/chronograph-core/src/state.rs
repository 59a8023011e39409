//! Channel reducers
//!
//! Every channel declares exactly one [`Reducer`]: a pure, named merge
//! function `reduce(current, update) -> merged`. When several writes target the
//! same channel in one superstep they are folded through it one at a time, in
//! write order, starting from the channel's committed value (`None` when the
//! channel has never been written).
//!
//! | Reducer | Behavior |
//! |---------|----------|
//! | [`OverwriteReducer`] | the update replaces the current value |
//! | [`AppendReducer`] | arrays are concatenated; a scalar update is pushed |
//! | [`AddMessagesReducer`] | like append, but an entry whose `"id"` matches an existing entry replaces it in place |
//! | [`BinaryOperatorReducer`] | arbitrary binary operator, e.g. [`BinaryOperatorReducer::sum`] |
//!
//! Reducers must be deterministic. Replaying a lineage re-folds the recorded
//! writes through the same reducers and must reproduce every stored channel map.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Reducer error: {0}")]
    ReducerError(String),
}

pub type Result<T> = std::result::Result<T, StateError>;

/// Merge function of a channel
pub trait Reducer: Send + Sync {
    /// Fold `update` into `current`. `current` is `None` until the first write.
    fn reduce(&self, current: Option<&Value>, update: Value) -> Result<Value>;

    /// Stable name, recorded in logs and debug output
    fn name(&self) -> &str;
}

/// Last write wins
#[derive(Debug, Clone, Copy, Default)]
pub struct OverwriteReducer;

impl Reducer for OverwriteReducer {
    fn reduce(&self, _current: Option<&Value>, update: Value) -> Result<Value> {
        Ok(update)
    }

    fn name(&self) -> &str {
        "overwrite"
    }
}

/// Ordered sequence; writes are concatenated
#[derive(Debug, Clone, Copy, Default)]
pub struct AppendReducer;

impl Reducer for AppendReducer {
    fn reduce(&self, current: Option<&Value>, update: Value) -> Result<Value> {
        let mut result = match current {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(other) => {
                return Err(StateError::ReducerError(format!(
                    "append requires an array, channel holds {}",
                    type_name(other)
                )))
            }
        };
        match update {
            Value::Array(items) => result.extend(items),
            single => result.push(single),
        }
        Ok(Value::Array(result))
    }

    fn name(&self) -> &str {
        "append"
    }
}

/// Message list keyed by `"id"`.
///
/// Entries without an id, or with an id not yet present, are appended. An
/// entry whose id is already present replaces that entry at its position,
/// which is how an earlier turn is edited during time travel. Ids are never
/// generated here, so folding the same writes twice yields the same list.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddMessagesReducer;

impl Reducer for AddMessagesReducer {
    fn reduce(&self, current: Option<&Value>, update: Value) -> Result<Value> {
        let mut messages = match current {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(other) => {
                return Err(StateError::ReducerError(format!(
                    "add_messages requires an array, channel holds {}",
                    type_name(other)
                )))
            }
        };
        let incoming = match update {
            Value::Array(items) => items,
            single => vec![single],
        };

        for message in incoming {
            let existing = message
                .get("id")
                .filter(|id| !id.is_null())
                .and_then(|id| messages.iter().position(|m| m.get("id") == Some(id)));
            match existing {
                Some(index) => messages[index] = message,
                None => messages.push(message),
            }
        }
        Ok(Value::Array(messages))
    }

    fn name(&self) -> &str {
        "add_messages"
    }
}

/// Binary operator signature for [`BinaryOperatorReducer`]
pub type BinaryOperatorFn = Arc<dyn Fn(&Value, &Value) -> Result<Value> + Send + Sync>;

/// Accumulator over an arbitrary binary operator.
///
/// The first write to an empty channel is taken as-is; later writes are
/// combined as `op(current, update)`.
#[derive(Clone)]
pub struct BinaryOperatorReducer {
    name: String,
    op: BinaryOperatorFn,
}

impl BinaryOperatorReducer {
    pub fn new<F>(name: impl Into<String>, op: F) -> Self
    where
        F: Fn(&Value, &Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            op: Arc::new(op),
        }
    }

    /// Numeric addition; integers stay integers
    pub fn sum() -> Self {
        Self::new("sum", |a, b| match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                    x.checked_add(y).map(Value::from).ok_or_else(|| {
                        StateError::ReducerError(format!("sum overflows i64: {x} + {y}"))
                    })
                } else {
                    let total = x.as_f64().unwrap_or(0.0) + y.as_f64().unwrap_or(0.0);
                    serde_json::Number::from_f64(total)
                        .map(Value::Number)
                        .ok_or_else(|| StateError::ReducerError(format!("sum is not finite: {total}")))
                }
            }
            _ => Err(StateError::ReducerError(format!(
                "sum requires numbers, got {} and {}",
                type_name(a),
                type_name(b)
            ))),
        })
    }
}

impl fmt::Debug for BinaryOperatorReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryOperatorReducer")
            .field("name", &self.name)
            .field("op", &"<function>")
            .finish()
    }
}

impl Reducer for BinaryOperatorReducer {
    fn reduce(&self, current: Option<&Value>, update: Value) -> Result<Value> {
        match current {
            None | Some(Value::Null) => Ok(update),
            Some(current) => (self.op)(current, &update),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
