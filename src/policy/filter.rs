//! Ordered chain of accept/reject predicates.

use std::sync::Arc;

use crate::entry::Fields;
use crate::levels::Level;

/// A predicate over (level, message, fields). Returning `false` rejects the
/// message; the first rejection short-circuits the chain.
pub type FilterFn = dyn Fn(Level, &str, Option<&Fields>) -> bool + Send + Sync;

#[derive(Default)]
pub(crate) struct FilterChain {
    filters: Vec<(String, Arc<FilterFn>)>,
}

impl FilterChain {
    /// Register a named filter at the end of the chain. Re-using a name
    /// replaces the existing filter in place.
    pub(crate) fn add(&mut self, name: &str, filter: Arc<FilterFn>) {
        if let Some(slot) = self.filters.iter_mut().find(|(n, _)| n == name) {
            slot.1 = filter;
        } else {
            self.filters.push((name.to_string(), filter));
        }
    }

    /// Remove a filter by name. Returns whether it existed.
    pub(crate) fn remove(&mut self, name: &str) -> bool {
        let before = self.filters.len();
        self.filters.retain(|(n, _)| n != name);
        self.filters.len() != before
    }

    pub(crate) fn clear(&mut self) {
        self.filters.clear();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub(crate) fn accepts(&self, level: Level, message: &str, fields: Option<&Fields>) -> bool {
        self.filters
            .iter()
            .all(|(_, filter)| filter(level, message, fields))
    }
}
