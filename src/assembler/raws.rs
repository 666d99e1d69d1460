// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Raw instruction layouts and bit-level encoding.
//!
//! A raw is a named binary template: total byte size, required alignment,
//! and a list of bit fields filled from statement parameters. Lookup is by
//! `(name, argument count)`. Repeatable raws (the built-in data directives)
//! generate a layout sized to the argument count on the fly.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct RawField {
    pub name: String,
    /// Bit position counted from byte 0, bit 0 (little-endian).
    pub position_bits: u32,
    pub width_bits: u32,
    /// Pointer fields get the base address added at render time.
    pub is_pointer: bool,
}

#[derive(Debug, Clone)]
pub struct FixedBits {
    pub position_bits: u32,
    pub width_bits: u32,
    pub value: u64,
}

#[derive(Debug, Clone)]
pub struct RawLayout {
    pub name: String,
    pub byte_size: usize,
    pub alignment: usize,
    pub fields: Vec<RawField>,
    pub fixed_bits: Vec<FixedBits>,
}

#[derive(Debug, Clone)]
struct RepeatableRaw {
    unit_size: usize,
    alignment: usize,
    is_pointer: bool,
}

/// Registry of raw templates, seeded with the built-in data directives.
pub struct RawRegistry {
    fixed: HashMap<(String, usize), RawLayout>,
    repeatable: HashMap<String, RepeatableRaw>,
}

impl Default for RawRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl RawRegistry {
    pub fn empty() -> Self {
        Self {
            fixed: HashMap::new(),
            repeatable: HashMap::new(),
        }
    }

    /// Registry with `BYTE`, `SHORT`, `WORD` and `POIN` pre-registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register_repeatable("BYTE", 1, 1, false);
        registry.register_repeatable("SHORT", 2, 2, false);
        registry.register_repeatable("WORD", 4, 4, false);
        registry.register_repeatable("POIN", 4, 4, true);
        registry
    }

    pub fn register_repeatable(
        &mut self,
        name: &str,
        unit_size: usize,
        alignment: usize,
        is_pointer: bool,
    ) {
        self.repeatable.insert(
            name.to_string(),
            RepeatableRaw {
                unit_size,
                alignment,
                is_pointer,
            },
        );
    }

    pub fn register_fixed(&mut self, layout: RawLayout) {
        self.fixed
            .insert((layout.name.clone(), layout.fields.len()), layout);
    }

    /// True when `name` names a raw at any arity.
    pub fn has_name(&self, name: &str) -> bool {
        self.repeatable.contains_key(name) || self.fixed.keys().any(|(n, _)| n == name)
    }

    /// Merge raw templates from a JSON array.
    ///
    /// Each entry names a raw. An entry with a `"unit"` key registers a
    /// repeatable raw; otherwise `"size"` and `"fields"` describe a fixed
    /// layout. Positions and widths are in bits.
    pub fn load_json(&mut self, text: &str) -> Result<(), String> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|err| err.to_string())?;
        let entries = value.as_array().ok_or("expected a top-level array")?;
        for entry in entries {
            let name = entry["name"]
                .as_str()
                .ok_or("entry without a \"name\" string")?;
            if let Some(unit) = entry.get("unit") {
                let unit = unit
                    .as_u64()
                    .ok_or_else(|| format!("{name}: \"unit\" must be a number"))?;
                let alignment = entry["alignment"].as_u64().unwrap_or(unit);
                let is_pointer = entry["pointer"].as_bool().unwrap_or(false);
                self.register_repeatable(name, unit as usize, alignment as usize, is_pointer);
                continue;
            }
            let byte_size = entry["size"]
                .as_u64()
                .ok_or_else(|| format!("{name}: missing \"size\""))? as usize;
            let alignment = entry["alignment"].as_u64().unwrap_or(1) as usize;
            let mut fields = Vec::new();
            if let Some(list) = entry["fields"].as_array() {
                for (ix, field) in list.iter().enumerate() {
                    fields.push(RawField {
                        name: field["name"]
                            .as_str()
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("arg{ix}")),
                        position_bits: field["position"]
                            .as_u64()
                            .ok_or_else(|| format!("{name}: field without \"position\""))?
                            as u32,
                        width_bits: field["width"]
                            .as_u64()
                            .ok_or_else(|| format!("{name}: field without \"width\""))?
                            as u32,
                        is_pointer: field["pointer"].as_bool().unwrap_or(false),
                    });
                }
            }
            let mut fixed_bits = Vec::new();
            if let Some(list) = entry["fixed"].as_array() {
                for fixed in list {
                    fixed_bits.push(FixedBits {
                        position_bits: fixed["position"]
                            .as_u64()
                            .ok_or_else(|| format!("{name}: fixed without \"position\""))?
                            as u32,
                        width_bits: fixed["width"]
                            .as_u64()
                            .ok_or_else(|| format!("{name}: fixed without \"width\""))?
                            as u32,
                        value: fixed["value"]
                            .as_u64()
                            .ok_or_else(|| format!("{name}: fixed without \"value\""))?,
                    });
                }
            }
            self.register_fixed(RawLayout {
                name: name.to_string(),
                byte_size,
                alignment,
                fields,
                fixed_bits,
            });
        }
        Ok(())
    }

    /// Resolve the layout for `name` with `argc` arguments.
    pub fn lookup(&self, name: &str, argc: usize) -> Option<RawLayout> {
        if let Some(layout) = self.fixed.get(&(name.to_string(), argc)) {
            return Some(layout.clone());
        }
        let raw = self.repeatable.get(name)?;
        if argc == 0 {
            return None;
        }
        let unit_bits = (raw.unit_size * 8) as u32;
        let fields = (0..argc)
            .map(|ix| RawField {
                name: format!("arg{ix}"),
                position_bits: ix as u32 * unit_bits,
                width_bits: unit_bits,
                is_pointer: raw.is_pointer,
            })
            .collect();
        Some(RawLayout {
            name: name.to_string(),
            byte_size: raw.unit_size * argc,
            alignment: raw.alignment,
            fields,
            fixed_bits: Vec::new(),
        })
    }
}

/// True when `value` is representable in a `width`-bit field, allowing
/// negative values in two's complement.
pub fn value_fits(width_bits: u32, value: i64) -> bool {
    if width_bits >= 64 {
        return true;
    }
    if value >= 0 {
        value < (1i64 << width_bits)
    } else {
        value >= -(1i64 << (width_bits - 1))
    }
}

/// Pack field values into the layout's byte buffer, little-endian bit
/// order. Values are masked to their field width; range checking is the
/// caller's concern.
pub fn encode(layout: &RawLayout, values: &[i64]) -> Vec<u8> {
    let mut buf = vec![0u8; layout.byte_size];
    for fixed in &layout.fixed_bits {
        place_bits(&mut buf, fixed.position_bits, fixed.width_bits, fixed.value);
    }
    for (field, value) in layout.fields.iter().zip(values) {
        place_bits(
            &mut buf,
            field.position_bits,
            field.width_bits,
            *value as u64,
        );
    }
    buf
}

fn place_bits(buf: &mut [u8], position: u32, width: u32, value: u64) {
    for bit in 0..width {
        if (value >> bit) & 1 == 1 {
            let abs = (position + bit) as usize;
            if abs / 8 < buf.len() {
                buf[abs / 8] |= 1 << (abs % 8);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeatable_lookup_scales_with_argument_count() {
        let registry = RawRegistry::with_builtins();
        let layout = registry.lookup("BYTE", 3).unwrap();
        assert_eq!(layout.byte_size, 3);
        assert_eq!(layout.alignment, 1);
        let positions: Vec<u32> = layout.fields.iter().map(|f| f.position_bits).collect();
        assert_eq!(positions, vec![0, 8, 16]);

        assert!(registry.lookup("BYTE", 0).is_none());
        assert!(registry.lookup("NOPE", 1).is_none());
    }

    #[test]
    fn word_encodes_little_endian() {
        let registry = RawRegistry::with_builtins();
        let layout = registry.lookup("WORD", 1).unwrap();
        assert_eq!(encode(&layout, &[0x0800_0000]), vec![0x00, 0x00, 0x00, 0x08]);
        let layout = registry.lookup("SHORT", 2).unwrap();
        assert_eq!(encode(&layout, &[0x1234, 0xBEEF]), vec![0x34, 0x12, 0xEF, 0xBE]);
    }

    #[test]
    fn poin_fields_are_pointers() {
        let registry = RawRegistry::with_builtins();
        let layout = registry.lookup("POIN", 2).unwrap();
        assert!(layout.fields.iter().all(|f| f.is_pointer));
        let layout = registry.lookup("WORD", 2).unwrap();
        assert!(layout.fields.iter().all(|f| !f.is_pointer));
    }

    #[test]
    fn fixed_layout_wins_over_repeatable() {
        let mut registry = RawRegistry::with_builtins();
        registry.register_fixed(RawLayout {
            name: "JUMP".to_string(),
            byte_size: 2,
            alignment: 2,
            fields: vec![RawField {
                name: "target".to_string(),
                position_bits: 0,
                width_bits: 11,
                is_pointer: false,
            }],
            fixed_bits: vec![FixedBits {
                position_bits: 11,
                width_bits: 5,
                value: 0b11100,
            }],
        });
        let layout = registry.lookup("JUMP", 1).unwrap();
        let bytes = encode(&layout, &[0x123]);
        // 0b11100_10100100011 little-endian.
        assert_eq!(bytes, vec![0x23, 0xE1]);
    }

    #[test]
    fn sub_byte_fields_pack_without_overlap() {
        let layout = RawLayout {
            name: "NIB".to_string(),
            byte_size: 1,
            alignment: 1,
            fields: vec![
                RawField {
                    name: "lo".to_string(),
                    position_bits: 0,
                    width_bits: 4,
                    is_pointer: false,
                },
                RawField {
                    name: "hi".to_string(),
                    position_bits: 4,
                    width_bits: 4,
                    is_pointer: false,
                },
            ],
            fixed_bits: Vec::new(),
        };
        assert_eq!(encode(&layout, &[0xA, 0x5]), vec![0x5A]);
        // Values are masked to field width.
        assert_eq!(encode(&layout, &[0x1A, 0x5]), vec![0x5A]);
    }

    #[test]
    fn json_templates_merge_over_builtins() {
        let mut registry = RawRegistry::with_builtins();
        registry
            .load_json(
                r#"[
                    {"name": "DWORD", "unit": 8, "alignment": 4},
                    {"name": "JUMP", "size": 2, "alignment": 2,
                     "fields": [{"name": "target", "position": 0, "width": 11}],
                     "fixed": [{"position": 11, "width": 5, "value": 28}]}
                ]"#,
            )
            .unwrap();
        let dword = registry.lookup("DWORD", 2).unwrap();
        assert_eq!(dword.byte_size, 16);
        assert_eq!(dword.alignment, 4);
        let jump = registry.lookup("JUMP", 1).unwrap();
        assert_eq!(encode(&jump, &[0x123]), vec![0x23, 0xE1]);
        // Builtins survive the merge.
        assert!(registry.lookup("BYTE", 1).is_some());
    }

    #[test]
    fn malformed_json_template_is_rejected() {
        let mut registry = RawRegistry::empty();
        assert!(registry.load_json("{}").is_err());
        assert!(registry
            .load_json(r#"[{"name": "X"}]"#)
            .unwrap_err()
            .contains("size"));
        assert!(registry.load_json("not json").is_err());
    }

    #[test]
    fn value_fits_handles_signed_ranges() {
        assert!(value_fits(8, 255));
        assert!(!value_fits(8, 256));
        assert!(value_fits(8, -128));
        assert!(!value_fits(8, -129));
        assert!(value_fits(64, i64::MIN));
    }
}
