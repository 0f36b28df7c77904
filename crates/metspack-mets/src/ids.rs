/// Hands out document-unique element identifiers of the form `prefix_N`.
///
/// One generator belongs to one manifest under construction. Starting every
/// dissemination from a fresh (or [`reset`](Self::reset)) generator makes the
/// ids, and therefore the serialized bytes, reproducible for unchanged input.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    next: u32,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.next = 1;
    }

    pub fn next_id(&mut self, prefix: &str) -> String {
        let id = format!("{prefix}_{}", self.next);
        self.next += 1;
        id
    }
}
