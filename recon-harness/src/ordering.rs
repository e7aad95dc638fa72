//! Stage ordering policy.
//!
//! Stages read files written by earlier stages, so the suite runs them in a
//! fixed, declared order. The order is an explicit value owned by the suite
//! definition rather than a global comparator.

use crate::errors::ConfigError;
use std::cmp::Ordering;
use std::collections::HashMap;

/// A declared total order over stage names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOrder {
    /// Names in declaration order (duplicates kept as declared).
    names: Vec<String>,
    /// First declared position of each name.
    positions: HashMap<String, usize>,
}

impl StageOrder {
    /// Creates an order from names listed in dependency-respecting sequence.
    ///
    /// A name declared more than once keeps its first position.
    #[must_use]
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut positions = HashMap::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            positions.entry(name.clone()).or_insert(idx);
        }
        Self { names, positions }
    }

    /// Returns the declared names.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Returns the number of distinct registered names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true if no names are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Returns true if the name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// Returns the position of a registered name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownStage`] for a name not in the order.
    pub fn position(&self, name: &str) -> Result<usize, ConfigError> {
        self.positions
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::unknown_stage(name))
    }

    /// Three-way comparison of two stage names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownStage`] if either name is unregistered.
    pub fn compare(&self, a: &str, b: &str) -> Result<Ordering, ConfigError> {
        let pa = self.position(a)?;
        let pb = self.position(b)?;
        Ok(pa.cmp(&pb))
    }

    /// Returns true if `a` must run strictly before `b`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownStage`] if either name is unregistered.
    pub fn precedes(&self, a: &str, b: &str) -> Result<bool, ConfigError> {
        Ok(self.compare(a, b)? == Ordering::Less)
    }

    /// Sorts a set of stage names into execution order.
    ///
    /// Every name is checked before sorting, so an unknown name fails the
    /// whole call instead of landing in an arbitrary slot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownStage`] for the first unregistered name.
    pub fn sort<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<String>, ConfigError> {
        let mut keyed = names
            .iter()
            .map(|n| self.position(n.as_ref()).map(|p| (p, n.as_ref().to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        keyed.sort_by_key(|(p, _)| *p);
        Ok(keyed.into_iter().map(|(_, n)| n).collect())
    }

    /// Checks that every consumed stage is registered and runs first.
    ///
    /// `edges` yields `(stage, inputs)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownStage`] or [`ConfigError::OrderViolation`].
    pub fn validate_dependencies<'a, I, D>(&self, edges: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (&'a str, D)>,
        D: IntoIterator<Item = &'a str>,
    {
        for (stage, inputs) in edges {
            let stage_pos = self.position(stage)?;
            for input in inputs {
                if self.position(input)? >= stage_pos {
                    return Err(ConfigError::OrderViolation {
                        stage: stage.to_string(),
                        input: input.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
