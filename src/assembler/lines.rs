// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Line nodes: byte-producing units with a recorded offset.
//!
//! A node's size is fixed when it is produced; its parameter values may
//! stay unresolved until the final resolution pass, which is what makes
//! forward references work.

use crate::assembler::interpreter::convert_to_address;
use crate::assembler::raws::{self, RawLayout};
use crate::assembler::AsmConfig;
use crate::core::expr::Expr;
use crate::core::location::Location;
use crate::core::report::Log;
use crate::core::scope::{evaluate, EvalContext, Phase};

pub enum LineNode {
    /// Literal bytes, already fully resolved.
    Data {
        offset: usize,
        bytes: Vec<u8>,
        location: Location,
    },
    /// A raw instruction whose parameters resolve at render time.
    Raw {
        offset: usize,
        layout: RawLayout,
        params: Vec<Expr>,
        location: Location,
    },
}

impl LineNode {
    pub fn offset(&self) -> usize {
        match self {
            LineNode::Data { offset, .. } | LineNode::Raw { offset, .. } => *offset,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            LineNode::Data { bytes, .. } => bytes.len(),
            LineNode::Raw { layout, .. } => layout.byte_size,
        }
    }

    pub fn location(&self) -> &Location {
        match self {
            LineNode::Data { location, .. } | LineNode::Raw { location, .. } => location,
        }
    }

    /// Resolve remaining parameters at `Final` phase and produce the
    /// node's bytes. Returns `None` when any parameter failed to resolve.
    /// No output happens here; the caller decides whether the whole run
    /// was clean enough to write anything at all.
    pub fn resolve(&self, config: &AsmConfig, log: &mut Log) -> Option<Vec<u8>> {
        match self {
            LineNode::Data { bytes, .. } => Some(bytes.clone()),
            LineNode::Raw {
                offset,
                layout,
                params,
                ..
            } => {
                // CURRENTOFFSET inside a parameter means this node's own
                // offset, not wherever the cursor ended up.
                let ctx = EvalContext {
                    current_offset: Some(*offset as i64),
                };
                let mut values = Vec::with_capacity(params.len());
                for (field, param) in layout.fields.iter().zip(params) {
                    let value = match evaluate(param, Phase::Final, &ctx) {
                        Ok(value) => value,
                        Err(err) => {
                            let location = err.location.as_ref().unwrap_or(param.location());
                            log.error(Some(location), err.message.clone());
                            return None;
                        }
                    };
                    let value = if field.is_pointer {
                        convert_to_address(config, value)
                    } else {
                        value
                    };
                    if !raws::value_fits(field.width_bits, value) {
                        log.warning(
                            Some(param.location()),
                            format!(
                                "Value {value} does not fit in {} bits; truncating",
                                field.width_bits
                            ),
                        );
                    }
                    values.push(value);
                }
                Some(raws::encode(layout, &values))
            }
        }
    }
}
