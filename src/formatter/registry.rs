use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::{array, number, string};

/// A formatter: receives the accumulated value and the call's arguments.
pub type FormatterFn = Arc<dyn Fn(&Value, &[Value]) -> Value + Send + Sync>;

/// Registry of formatters, looked up by name at render time.
#[derive(Clone, Default)]
pub struct Formatters {
    formatters: HashMap<String, FormatterFn>,
}

impl Formatters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the string, number and array formatters.
    pub fn with_builtins() -> Self {
        let mut formatters = Self::new();
        string::register(&mut formatters);
        number::register(&mut formatters);
        array::register(&mut formatters);
        formatters
    }

    /// Register (or replace) a formatter.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&Value, &[Value]) -> Value + Send + Sync + 'static,
    {
        self.formatters.insert(name.into(), Arc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<&FormatterFn> {
        self.formatters.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.formatters.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.formatters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formatters.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.formatters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Closest registered name to `name`, if any is close enough to be a typo.
    pub fn suggest(&self, name: &str) -> Option<String> {
        let wanted = name.to_lowercase();
        let limit = (wanted.chars().count() / 3).max(2);
        self.names()
            .into_iter()
            .map(|candidate| (edit_distance(&wanted, &candidate.to_lowercase()), candidate))
            .filter(|(distance, _)| *distance <= limit)
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, candidate)| candidate.to_string())
    }
}

impl fmt::Debug for Formatters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Formatters")
            .field("names", &self.names())
            .finish()
    }
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != *cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
