use std::collections::HashMap;

use super::Block;

/// Per-block scratch space mapping stage output names to blocks.
///
/// Owned by a single run; cleared before every block. Writing an existing
/// key replaces the previous block.
#[derive(Debug, Default)]
pub struct BlockBuffer {
    store: HashMap<String, Block>,
}

impl BlockBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, block: Block) {
        self.store.insert(key.into(), block);
    }

    pub fn get(&self, key: &str) -> Option<&Block> {
        self.store.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.store.clear();
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.store.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn block(value: f64) -> Block {
        Block::from_samples(vec![value], 1.0, Utc::now()).unwrap()
    }

    #[test]
    fn test_last_write_wins() {
        let mut buffer = BlockBuffer::new();
        buffer.set("x", block(1.0));
        buffer.set("x", block(2.0));

        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.get("x").unwrap().values()[[0, 0]], 2.0);
    }

    #[test]
    fn test_clear() {
        let mut buffer = BlockBuffer::new();
        buffer.set("x", block(1.0));
        buffer.clear();

        assert!(buffer.is_empty());
        assert!(!buffer.contains("x"));
    }
}
