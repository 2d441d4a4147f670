//! Last-seen values of properties whose meaning is unknown.
//!
//! Purely diagnostic: the ledger lets the log point at a mystery property
//! the moment it changes, which is how its meaning usually gets worked out.

use std::collections::HashMap;

use crate::property::{DecodedValue, PropertyCode};

/// Result of recording a mystery value.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    First,
    Unchanged,
    /// Holds the previous value.
    Changed(DecodedValue),
}

#[derive(Debug, Default)]
pub struct MysteryLedger {
    seen: HashMap<PropertyCode, DecodedValue>,
}

impl MysteryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, code: PropertyCode, value: DecodedValue) -> Observation {
        match self.seen.insert(code, value.clone()) {
            None => Observation::First,
            Some(previous) if previous == value => Observation::Unchanged,
            Some(previous) => Observation::Changed(previous),
        }
    }

    pub fn get(&self, code: PropertyCode) -> Option<&DecodedValue> {
        self.seen.get(&code)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
