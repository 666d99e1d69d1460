// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Deferred statement pool for `#pooled` / `#pool`.
//!
//! A `#pooled` line is captured with its surrounding scope and replayed
//! when a `#pool` directive flushes the queue, so pooled data lands
//! wherever the flush point is while still seeing the symbols that were
//! visible at capture time.

use crate::core::scope::ScopeStack;
use crate::core::tokenizer::Token;

pub struct PooledLine {
    pub tokens: Vec<Token>,
    pub scope: ScopeStack,
}

#[derive(Default)]
pub struct PoolQueue {
    lines: Vec<PooledLine>,
}

impl PoolQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tokens: Vec<Token>, scope: ScopeStack) {
        self.lines.push(PooledLine { tokens, scope });
    }

    /// Take every queued line, in capture order.
    pub fn drain(&mut self) -> Vec<PooledLine> {
        std::mem::take(&mut self.lines)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tokenizer::Tokenizer;

    #[test]
    fn drain_preserves_capture_order_and_empties_the_queue() {
        let mut queue = PoolQueue::new();
        let scope = ScopeStack::new_base();
        queue.push(Tokenizer::new("t.event").tokenize_line("BYTE 1", 1), scope.clone());
        queue.push(Tokenizer::new("t.event").tokenize_line("BYTE 2", 2), scope);
        assert_eq!(queue.len(), 2);

        let lines = queue.drain();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].tokens[1].text, "1");
        assert_eq!(lines[1].tokens[1].text, "2");
        assert!(queue.is_empty());
    }

    #[test]
    fn pooled_line_keeps_its_captured_scope() {
        let mut queue = PoolQueue::new();
        let outer = ScopeStack::new_base();
        let inner = outer.push();
        inner.add_symbol("Local", 7);
        queue.push(Tokenizer::new("t.event").tokenize_line("BYTE Local", 1), inner);

        let line = queue.drain().pop().unwrap();
        assert!(line.scope.is_defined("Local"));
        assert!(!outer.is_defined("Local"));
    }
}
