// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Text encoding tables for string-literal parameters.
//!
//! Encodings are byte tables loaded with `#inctbl` (`XX=c` lines mapping a
//! hex byte sequence to a character). `ascii` is always present.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    UnknownEncoding(String),
    UnmappableChar { encoding: String, ch: char },
}

impl std::fmt::Display for EncodingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodingError::UnknownEncoding(name) => write!(f, "Unknown encoding: {name}"),
            EncodingError::UnmappableChar { encoding, ch } => {
                write!(f, "Character {ch:?} is not representable in {encoding}")
            }
        }
    }
}

impl std::error::Error for EncodingError {}

enum Table {
    Ascii,
    Map(HashMap<char, Vec<u8>>),
}

pub struct EncodingRegistry {
    tables: HashMap<String, Table>,
}

impl Default for EncodingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodingRegistry {
    pub fn new() -> Self {
        let mut tables = HashMap::new();
        tables.insert("ascii".to_string(), Table::Ascii);
        Self { tables }
    }

    pub fn default_encoding(&self) -> &'static str {
        "ascii"
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_ascii_lowercase())
    }

    /// Register a table from `XX=c` lines. Multi-byte sequences are
    /// written as consecutive hex pairs (`XXYY=c`). Blank lines and `//`
    /// comments are skipped. Returns the malformed line on failure.
    pub fn load_table(&mut self, name: &str, text: &str) -> Result<(), String> {
        let mut map = HashMap::new();
        for (ix, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            let parsed = (|| {
                let (hex, rest) = line.split_once('=')?;
                let hex = hex.trim();
                if hex.is_empty() || hex.len() % 2 != 0 {
                    return None;
                }
                let mut bytes = Vec::with_capacity(hex.len() / 2);
                for pair in 0..hex.len() / 2 {
                    let byte = u8::from_str_radix(&hex[pair * 2..pair * 2 + 2], 16).ok()?;
                    bytes.push(byte);
                }
                let ch = rest.chars().next()?;
                Some((ch, bytes))
            })();
            match parsed {
                Some((ch, bytes)) => {
                    map.insert(ch, bytes);
                }
                None => return Err(format!("line {}: {line}", ix + 1)),
            }
        }
        self.tables
            .insert(name.to_ascii_lowercase(), Table::Map(map));
        Ok(())
    }

    /// Encode a string. Unknown encodings and unencodable characters are
    /// errors; the caller decides the fallback (typically zero bytes).
    pub fn encode(&self, input: &str, encoding: &str) -> Result<Vec<u8>, EncodingError> {
        let table = self
            .tables
            .get(&encoding.to_ascii_lowercase())
            .ok_or_else(|| EncodingError::UnknownEncoding(encoding.to_string()))?;
        let mut out = Vec::with_capacity(input.len());
        for ch in input.chars() {
            match table {
                Table::Ascii => {
                    if ch as u32 <= 0x7F {
                        out.push(ch as u8);
                    } else {
                        return Err(EncodingError::UnmappableChar {
                            encoding: encoding.to_string(),
                            ch,
                        });
                    }
                }
                Table::Map(map) => match map.get(&ch) {
                    Some(bytes) => out.extend_from_slice(bytes),
                    None => {
                        return Err(EncodingError::UnmappableChar {
                            encoding: encoding.to_string(),
                            ch,
                        });
                    }
                },
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_identity_for_7bit_input() {
        let registry = EncodingRegistry::new();
        assert_eq!(registry.encode("Az09", "ascii").unwrap(), b"Az09".to_vec());
        assert_eq!(registry.encode("Az09", "ASCII").unwrap(), b"Az09".to_vec());
    }

    #[test]
    fn ascii_rejects_wide_characters() {
        let registry = EncodingRegistry::new();
        let err = registry.encode("é", "ascii").unwrap_err();
        assert!(matches!(err, EncodingError::UnmappableChar { .. }));
    }

    #[test]
    fn unknown_encoding_is_an_error() {
        let registry = EncodingRegistry::new();
        assert_eq!(
            registry.encode("x", "shiftjis").unwrap_err(),
            EncodingError::UnknownEncoding("shiftjis".to_string())
        );
    }

    #[test]
    fn loaded_table_maps_characters_to_byte_sequences() {
        let mut registry = EncodingRegistry::new();
        registry
            .load_table("game", "41=A\n8142=B\n\n// comment\n20= ")
            .unwrap();
        assert!(registry.is_known("game"));
        assert_eq!(
            registry.encode("AB A", "game").unwrap(),
            vec![0x41, 0x81, 0x42, 0x20, 0x41]
        );
        let err = registry.encode("C", "game").unwrap_err();
        assert!(matches!(err, EncodingError::UnmappableChar { .. }));
    }

    #[test]
    fn malformed_table_line_reports_line_number() {
        let mut registry = EncodingRegistry::new();
        let err = registry.load_table("bad", "41=A\nnothex=B").unwrap_err();
        assert!(err.starts_with("line 2:"));
        // A failed load must not register the table.
        assert!(!registry.is_known("bad"));
    }
}
