//! Field-level diffing helpers shared by the resource planners.

use std::collections::HashMap;
use std::hash::Hash;

use serde::Serialize;
use serde_json::{Map, Value};

/// Builds a partial update payload out of managed fields.
///
/// A field is emitted only when the caller manages it (desired is `Some`)
/// and its value differs from the current one, which keeps every `update`
/// operation minimal.
#[derive(Debug, Default)]
pub struct PayloadDiff {
    fields: Map<String, Value>,
}

impl PayloadDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare with `PartialEq` and serialize the desired value on mismatch.
    pub fn field<T>(mut self, key: &str, desired: Option<&T>, current: &T) -> Self
    where
        T: Serialize + PartialEq + ?Sized,
    {
        if let Some(want) = desired
            && want != current
        {
            self.fields.insert(key.to_string(), to_value(want));
        }
        self
    }

    /// Compare with `PartialEq` but emit a caller-supplied wire value on
    /// mismatch. Used where the wire representation differs from the
    /// compared one (e.g. tag lists stored as a comma-joined string).
    pub fn field_as<T>(mut self, key: &str, desired: Option<&T>, current: &T, wire: Value) -> Self
    where
        T: PartialEq + ?Sized,
    {
        if let Some(want) = desired
            && want != current
        {
            self.fields.insert(key.to_string(), wire);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The partial payload, or `None` when nothing differs.
    pub fn into_payload(self) -> Option<Value> {
        if self.fields.is_empty() {
            None
        } else {
            Some(Value::Object(self.fields))
        }
    }
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Result of matching a desired sub-resource list against the current one.
pub struct ListMatch<'d, 'c, D, C> {
    /// Desired entries paired with the current entry sharing their key.
    pub matched: Vec<(&'d D, &'c C)>,
    /// Desired entries with no current counterpart (to create).
    pub missing: Vec<&'d D>,
    /// Current entries no desired entry claims (to delete when the list is
    /// fully managed, otherwise left untouched).
    pub leftover: Vec<&'c C>,
}

/// Match sub-resources by natural key, independent of position.
///
/// Reordering entries therefore never creates or deletes anything; only
/// key membership and value fields matter.
pub fn match_by_key<'d, 'c, D, C, K>(
    desired: &'d [D],
    current: &'c [C],
    desired_key: impl Fn(&D) -> K,
    current_key: impl Fn(&C) -> K,
) -> ListMatch<'d, 'c, D, C>
where
    K: Eq + Hash,
{
    let mut by_key: HashMap<K, &C> = current.iter().map(|c| (current_key(c), c)).collect();

    let mut matched = Vec::new();
    let mut missing = Vec::new();
    for d in desired {
        match by_key.remove(&desired_key(d)) {
            Some(c) => matched.push((d, c)),
            None => missing.push(d),
        }
    }

    // Preserve the cluster's ordering for the leftovers.
    let claimed: Vec<&C> = matched.iter().map(|(_, c)| *c).collect();
    let leftover = current
        .iter()
        .filter(|c| !claimed.iter().any(|m| std::ptr::eq(*m, *c)))
        .collect();

    ListMatch {
        matched,
        missing,
        leftover,
    }
}
