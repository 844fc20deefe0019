//! Positional placeholder generation.

/// Produces `$1, $2, ...` placeholders for one top-level statement build.
///
/// Every embedded fragment must be rendered with the same generator as its
/// parent so that numbering stays contiguous across the whole statement.
#[derive(Debug, Clone)]
pub struct ParamGenerator {
    next: usize,
}

impl Default for ParamGenerator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl ParamGenerator {
    /// Start numbering at `$1`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start numbering at `$start`.
    pub fn starting_at(start: usize) -> Self {
        Self { next: start }
    }

    /// Return the placeholder for the current count and advance.
    pub fn next(&mut self) -> String {
        let n = self.next;
        self.next += 1;
        format!("${n}")
    }

    /// Number of the placeholder the next call will return.
    pub fn peek(&self) -> usize {
        self.next
    }
}
