//! Local FIFO buffer of pending job items

use std::collections::VecDeque;

use serde_json::Value;

/// Ordered buffer of job items pulled from the server but not yet handled.
///
/// Items are opaque to the batch; delivery order is preserved across
/// appends.
#[derive(Debug, Default)]
pub struct Batch {
    items: VecDeque<Value>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delivered item list to the tail, preserving order
    pub fn assign(&mut self, items: Vec<Value>) {
        self.items.extend(items);
    }

    /// Remove and return the head item, or `None` when empty
    pub fn next(&mut self) -> Option<Value> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fifo_across_assigns() {
        let mut batch = Batch::new();
        batch.assign(vec![json!("a"), json!("b")]);
        batch.assign(vec![json!("c")]);

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.next(), Some(json!("a")));
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.next(), Some(json!("b")));
        assert_eq!(batch.next(), Some(json!("c")));
        assert_eq!(batch.len(), 0);
    }

    #[test]
    fn next_on_empty_is_none() {
        let mut batch = Batch::new();
        assert_eq!(batch.next(), None);
        assert!(batch.is_empty());
    }
}
