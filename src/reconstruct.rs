use crate::joiner::{should_insert_space_with, MathParity};

/// Owns the accumulated answer for one stream session.
///
/// The accumulator only grows: it is never reset or truncated.
#[derive(Debug, Default)]
pub struct Reconstructor {
    accumulator: String,
    parity: MathParity,
}

impl Reconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `fragment`, inserting a separating space when the joiner asks
    /// for one. Returns the new accumulator, or `None` for an empty fragment.
    pub fn append(&mut self, fragment: &str) -> Option<&str> {
        if fragment.is_empty() {
            return None;
        }
        if should_insert_space_with(&self.parity, &self.accumulator, fragment) {
            self.accumulator.push(' ');
            self.parity.push_str(" ");
        }
        self.accumulator.push_str(fragment);
        self.parity.push_str(fragment);
        Some(&self.accumulator)
    }

    pub fn as_str(&self) -> &str {
        &self.accumulator
    }

    pub fn len(&self) -> usize {
        self.accumulator.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accumulator.is_empty()
    }

    pub fn into_string(self) -> String {
        self.accumulator
    }
}
