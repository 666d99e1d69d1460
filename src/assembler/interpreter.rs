// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Interpreter state: write cursor, protected regions, overflow episodes
//! and the accumulated line nodes.

use crate::assembler::lines::LineNode;
use crate::assembler::raws::RawLayout;
use crate::assembler::AsmConfig;
use crate::core::expr::{BinaryOp, Expr};
use crate::core::location::Location;
use crate::core::report::Log;

/// Add the base address when `v` is a valid offset; out-of-range values
/// pass through unchanged. Total, never fails.
pub fn convert_to_address(config: &AsmConfig, v: i64) -> i64 {
    if (0..config.maximum_binary_size).contains(&v) {
        v + config.base_address
    } else {
        v
    }
}

/// Subtract the base address when `v` is a valid address; out-of-range
/// values pass through unchanged. Total, never fails.
pub fn convert_to_offset(config: &AsmConfig, v: i64) -> i64 {
    if v >= config.base_address && v <= config.base_address + config.maximum_binary_size {
        v - config.base_address
    } else {
        v
    }
}

struct ProtectedRegion {
    start: i64,
    length: i64,
    location: Location,
}

pub struct Interpreter {
    config: AsmConfig,
    current_offset: i64,
    offset_initialized: bool,
    diagnosed_overflow: bool,
    past_offsets: Vec<(i64, bool)>,
    protected: Vec<ProtectedRegion>,
    nodes: Vec<LineNode>,
}

impl Interpreter {
    pub fn new(config: AsmConfig) -> Self {
        Self {
            config,
            current_offset: 0,
            offset_initialized: false,
            diagnosed_overflow: false,
            past_offsets: Vec::new(),
            protected: Vec::new(),
            nodes: Vec::new(),
        }
    }

    pub fn current_offset(&self) -> i64 {
        self.current_offset
    }

    pub fn current_address(&self) -> i64 {
        convert_to_address(&self.config, self.current_offset)
    }

    pub fn offset_initialized(&self) -> bool {
        self.offset_initialized
    }

    pub fn nodes(&self) -> &[LineNode] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<LineNode> {
        self.nodes
    }

    /// `ORG target`: set the write cursor. The target may be an address or
    /// a plain offset. An out-of-range target leaves the cursor unchanged.
    pub fn handle_org(&mut self, target: i64, location: &Location, log: &mut Log) {
        let offset = convert_to_offset(&self.config, target);
        if (0..=self.config.maximum_binary_size).contains(&offset) {
            self.current_offset = offset;
            self.offset_initialized = true;
            self.diagnosed_overflow = false;
        } else {
            log.error(
                Some(location),
                format!("ORG target 0x{target:X} is outside the output image"),
            );
        }
    }

    pub fn handle_push(&mut self) {
        self.past_offsets
            .push((self.current_offset, self.offset_initialized));
    }

    /// `POP`: restore the cursor saved by the matching PUSH. Unmatched POP
    /// logs one error and changes nothing.
    pub fn handle_pop(&mut self, location: &Location, log: &mut Log) {
        match self.past_offsets.pop() {
            Some((offset, initialized)) => {
                self.current_offset = offset;
                self.offset_initialized = initialized;
            }
            None => log.error(Some(location), "POP without matching PUSH"),
        }
    }

    /// `ASSERT expr`: boolean expressions fail on zero, arithmetic ones on
    /// a negative value. A failing `X - CURRENTOFFSET` guard is softened
    /// to a warning, since it only trips on an address/offset unit
    /// mismatch rather than a real size overrun.
    pub fn handle_assert(&mut self, expr: &Expr, value: i64, location: &Location, log: &mut Log) {
        if expr.is_boolean() {
            if value == 0 {
                log.error(Some(location), "Assertion failed");
            }
        } else if value < 0 {
            let message = format!("Assertion failed with value {value}");
            if is_offset_guard(expr) {
                log.warning(Some(location), message);
            } else {
                log.error(Some(location), message);
            }
        }
    }

    /// `PROTECT begin [end]`: record a region that later writes may not
    /// touch. Without `end` the region covers four bytes.
    pub fn handle_protect(
        &mut self,
        begin: i64,
        end: Option<i64>,
        location: &Location,
        log: &mut Log,
    ) {
        let start = convert_to_offset(&self.config, begin);
        let length = match end {
            Some(end) => {
                let end = convert_to_offset(&self.config, end);
                if end <= start {
                    log.error(
                        Some(location),
                        format!("PROTECT region ends at 0x{end:X}, before its start 0x{start:X}"),
                    );
                    return;
                }
                end - start
            }
            None => 4,
        };
        self.protected.push(ProtectedRegion {
            start,
            length,
            location: location.clone(),
        });
    }

    /// `ALIGN amount [offset]`: advance the cursor to the next position
    /// congruent to `offset mod amount`.
    pub fn handle_align(
        &mut self,
        amount: i64,
        offset: Option<i64>,
        location: &Location,
        log: &mut Log,
    ) {
        if amount <= 0 {
            log.error(
                Some(location),
                format!("ALIGN amount must be positive, got {amount}"),
            );
            return;
        }
        let target = offset.unwrap_or(0).rem_euclid(amount);
        let advance = (target - self.current_offset).rem_euclid(amount);
        let aligned = self.current_offset + advance;
        if aligned > self.config.maximum_binary_size {
            self.diagnose_overflow(location, log);
            self.current_offset = self.config.maximum_binary_size;
        } else {
            self.current_offset = aligned;
        }
    }

    /// `FILL amount [value]`: emit `amount` copies of the fill byte.
    pub fn handle_fill(
        &mut self,
        amount: i64,
        value: Option<i64>,
        location: &Location,
        log: &mut Log,
    ) {
        if amount <= 0 {
            log.error(
                Some(location),
                format!("FILL amount must be positive, got {amount}"),
            );
            return;
        }
        if amount > self.config.maximum_binary_size {
            self.diagnose_overflow(location, log);
            return;
        }
        let byte = (value.unwrap_or(0) & 0xFF) as u8;
        self.handle_data(vec![byte; amount as usize], location, log);
    }

    /// Verbatim bytes (incbin payloads, encoded strings, FILL).
    pub fn handle_data(&mut self, bytes: Vec<u8>, location: &Location, log: &mut Log) {
        if let Some(offset) = self.check_write_bytes(location, bytes.len() as i64, log) {
            self.nodes.push(LineNode::Data {
                offset: offset as usize,
                bytes,
                location: location.clone(),
            });
        }
    }

    /// A raw instruction statement. Parameters stay as expressions until
    /// render time.
    pub fn handle_raw(
        &mut self,
        layout: RawLayout,
        params: Vec<Expr>,
        location: &Location,
        log: &mut Log,
    ) {
        let alignment = layout.alignment.max(1) as i64;
        if self.current_offset % alignment != 0 {
            log.error(
                Some(location),
                format!(
                    "{} requires {}-byte alignment, current offset is 0x{:X}",
                    layout.name, alignment, self.current_offset
                ),
            );
            return;
        }
        if let Some(offset) = self.check_write_bytes(location, layout.byte_size as i64, log) {
            self.nodes.push(LineNode::Raw {
                offset: offset as usize,
                layout,
                params,
                location: location.clone(),
            });
        }
    }

    /// Structural end-of-input checks.
    pub fn end_of_input(&mut self, log: &mut Log) {
        if !self.past_offsets.is_empty() {
            log.error(
                None,
                format!(
                    "{} PUSH without matching POP at end of input",
                    self.past_offsets.len()
                ),
            );
            self.past_offsets.clear();
        }
    }

    /// All byte-reserving paths funnel through here. Returns the offset to
    /// write at, or `None` when the write was refused (overflow).
    fn check_write_bytes(&mut self, location: &Location, length: i64, log: &mut Log) -> Option<i64> {
        if !self.offset_initialized {
            log.warning(
                Some(location),
                "Writing before any ORG directive; offset starts at 0",
            );
        }
        let offset = self.current_offset;
        for region in &self.protected {
            if offset < region.start + region.length && region.start < offset + length {
                log.error(
                    Some(location),
                    format!(
                        "Write at 0x{offset:X}..0x{:X} intersects protected region 0x{:X}..0x{:X}",
                        offset + length,
                        region.start,
                        region.start + region.length
                    ),
                );
                log.note(Some(&region.location), "region protected here");
            }
        }
        if offset + length > self.config.maximum_binary_size {
            self.diagnose_overflow(location, log);
            self.current_offset = self.config.maximum_binary_size;
            return None;
        }
        self.current_offset = offset + length;
        Some(offset)
    }

    /// One diagnostic per contiguous overflow episode; a valid ORG resets
    /// the episode.
    fn diagnose_overflow(&mut self, location: &Location, log: &mut Log) {
        if !self.diagnosed_overflow {
            log.error(
                Some(location),
                format!(
                    "Write past the maximum binary size 0x{:X}",
                    self.config.maximum_binary_size
                ),
            );
            self.diagnosed_overflow = true;
        }
    }
}

/// Structural match for `X - CURRENTOFFSET` style assertions, which the
/// assert handler softens to warnings.
fn is_offset_guard(expr: &Expr) -> bool {
    match expr {
        Expr::Paren(inner, _) => is_offset_guard(inner),
        Expr::Binary {
            op: BinaryOp::Subtract,
            right,
            ..
        } => {
            let mut node = right.as_ref();
            while let Expr::Paren(inner, _) = node {
                node = inner;
            }
            matches!(node, Expr::Identifier(name, _, _) if name == "CURRENTOFFSET")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scope::ScopeStack;
    use std::rc::Rc;

    fn loc() -> Location {
        Location::new(Rc::from("t.event"), 1, 1)
    }

    fn interp() -> Interpreter {
        Interpreter::new(AsmConfig::default())
    }

    #[test]
    fn address_offset_conversion_round_trips_in_range() {
        let config = AsmConfig::default();
        for v in [0, 1, 0x100, 0x01FF_FFFF] {
            assert_eq!(convert_to_offset(&config, convert_to_address(&config, v)), v);
        }
        // Out of range either way is a pass-through.
        assert_eq!(convert_to_address(&config, -1), -1);
        assert_eq!(convert_to_address(&config, 0x0200_0000), 0x0200_0000);
        assert_eq!(convert_to_offset(&config, 0x100), 0x100);
    }

    #[test]
    fn org_accepts_addresses_and_offsets() {
        let mut i = interp();
        let mut log = Log::new();
        i.handle_org(0x0800_0000, &loc(), &mut log);
        assert_eq!(i.current_offset(), 0);
        assert!(i.offset_initialized());
        i.handle_org(0x40, &loc(), &mut log);
        assert_eq!(i.current_offset(), 0x40);
        assert!(!log.has_errored());

        // Invalid target: error, cursor unchanged.
        i.handle_org(-5, &loc(), &mut log);
        assert_eq!(i.current_offset(), 0x40);
        assert!(log.has_errored());
    }

    #[test]
    fn push_pop_restores_cursor_state_exactly() {
        let mut i = interp();
        let mut log = Log::new();
        i.handle_org(0x10, &loc(), &mut log);
        i.handle_push();
        i.handle_org(0x100, &loc(), &mut log);
        i.handle_push();
        i.handle_org(0x200, &loc(), &mut log);
        i.handle_pop(&loc(), &mut log);
        assert_eq!(i.current_offset(), 0x100);
        i.handle_pop(&loc(), &mut log);
        assert_eq!(i.current_offset(), 0x10);
        assert!(!log.has_errored());

        // Unmatched POP: one error, no state change.
        i.handle_pop(&loc(), &mut log);
        assert_eq!(i.current_offset(), 0x10);
        assert_eq!(log.error_count(), 1);
    }

    #[test]
    fn open_push_is_reported_at_end_of_input() {
        let mut i = interp();
        let mut log = Log::new();
        i.handle_push();
        i.end_of_input(&mut log);
        assert_eq!(log.error_count(), 1);
    }

    #[test]
    fn consecutive_writes_advance_by_the_sum_of_sizes() {
        let mut i = interp();
        let mut log = Log::new();
        i.handle_org(0, &loc(), &mut log);
        i.handle_data(vec![0; 3], &loc(), &mut log);
        i.handle_data(vec![0; 5], &loc(), &mut log);
        assert_eq!(i.current_offset(), 8);
        assert_eq!(i.nodes().len(), 2);
        assert_eq!(i.nodes()[1].offset(), 3);
    }

    #[test]
    fn protected_region_overlap_is_reported_per_write() {
        let mut i = interp();
        let mut log = Log::new();
        i.handle_protect(0x0800_0000, Some(0x0800_0004), &loc(), &mut log);
        i.handle_org(0, &loc(), &mut log);
        i.handle_data(vec![0; 4], &loc(), &mut log);
        assert_eq!(log.error_count(), 1);
        // The write still happened.
        assert_eq!(i.nodes().len(), 1);

        // A second overlapping write reports again.
        i.handle_org(2, &loc(), &mut log);
        i.handle_data(vec![0; 4], &loc(), &mut log);
        assert_eq!(log.error_count(), 2);
    }

    #[test]
    fn protect_with_inverted_bounds_is_an_error() {
        let mut i = interp();
        let mut log = Log::new();
        i.handle_protect(0x0800_0010, Some(0x0800_0010), &loc(), &mut log);
        assert!(log.has_errored());
    }

    #[test]
    fn overflow_is_diagnosed_once_per_episode() {
        let mut i = Interpreter::new(AsmConfig {
            maximum_binary_size: 0x10,
            ..AsmConfig::default()
        });
        let mut log = Log::new();
        i.handle_org(0x0C, &loc(), &mut log);
        i.handle_data(vec![0; 8], &loc(), &mut log);
        i.handle_data(vec![0; 8], &loc(), &mut log);
        assert_eq!(log.error_count(), 1, "one error per overflow episode");
        assert_eq!(i.current_offset(), 0x10);
        assert!(i.nodes().is_empty());

        // A valid ORG closes the episode; the next overflow reports again.
        i.handle_org(0x0C, &loc(), &mut log);
        i.handle_data(vec![0; 8], &loc(), &mut log);
        assert_eq!(log.error_count(), 2);
    }

    #[test]
    fn align_advances_to_congruent_offset() {
        let mut i = interp();
        let mut log = Log::new();
        i.handle_org(5, &loc(), &mut log);
        i.handle_align(4, None, &loc(), &mut log);
        assert_eq!(i.current_offset(), 8);
        i.handle_align(4, Some(2), &loc(), &mut log);
        assert_eq!(i.current_offset(), 10);
        // Already aligned: no movement.
        i.handle_align(2, None, &loc(), &mut log);
        assert_eq!(i.current_offset(), 10);
        i.handle_align(0, None, &loc(), &mut log);
        assert!(log.has_errored());
    }

    #[test]
    fn misaligned_raw_is_dropped_with_an_error() {
        use crate::assembler::raws::RawRegistry;
        let mut i = interp();
        let mut log = Log::new();
        i.handle_org(1, &loc(), &mut log);
        let layout = RawRegistry::with_builtins().lookup("WORD", 1).unwrap();
        i.handle_raw(layout, vec![Expr::Number(1, loc())], &loc(), &mut log);
        assert!(log.has_errored());
        assert!(i.nodes().is_empty());
        assert_eq!(i.current_offset(), 1);
    }

    #[test]
    fn assert_classification_and_softening() {
        let scope = ScopeStack::new_base();
        let l = loc();
        let boolean = Expr::Binary {
            op: BinaryOp::Equal,
            left: Box::new(Expr::Number(1, l.clone())),
            right: Box::new(Expr::Number(2, l.clone())),
            location: l.clone(),
        };
        let mut i = interp();
        let mut log = Log::new();
        i.handle_assert(&boolean, 0, &l, &mut log);
        assert_eq!(log.error_count(), 1);

        let arith = Expr::Binary {
            op: BinaryOp::Subtract,
            left: Box::new(Expr::Number(1, l.clone())),
            right: Box::new(Expr::Number(2, l.clone())),
            location: l.clone(),
        };
        let mut log = Log::new();
        i.handle_assert(&arith, -1, &l, &mut log);
        assert_eq!(log.error_count(), 1);

        // X - CURRENTOFFSET softens to a warning.
        let guard = Expr::Binary {
            op: BinaryOp::Subtract,
            left: Box::new(Expr::Number(0x100, l.clone())),
            right: Box::new(Expr::Identifier(
                "CURRENTOFFSET".to_string(),
                scope,
                l.clone(),
            )),
            location: l.clone(),
        };
        let mut log = Log::new();
        i.handle_assert(&guard, -1, &l, &mut log);
        assert_eq!(log.error_count(), 0);
        assert_eq!(log.warning_count(), 1);

        // Passing asserts stay silent.
        let mut log = Log::new();
        i.handle_assert(&boolean, 1, &l, &mut log);
        i.handle_assert(&arith, 5, &l, &mut log);
        assert_eq!(log.diagnostics().len(), 0);
    }

    #[test]
    fn writing_before_org_warns() {
        let mut i = interp();
        let mut log = Log::new();
        i.handle_data(vec![1], &loc(), &mut log);
        assert_eq!(log.warning_count(), 1);
        assert_eq!(i.nodes().len(), 1);
    }
}
