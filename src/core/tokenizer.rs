// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// Tokenizer for event script source.

use std::rc::Rc;

use crate::core::location::Location;

/// Longest accepted identifier; the overflow tail becomes an `Error` token.
pub const MAX_IDENTIFIER_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Number,
    String,
    Identifier,
    /// Identifier immediately followed by `(` with no whitespace.
    MaybeMacro,
    /// `#`-prefixed directive name (text carries the name without `#`).
    Directive,
    Newline,
    Error,
    Comma,
    Colon,
    /// `:=`
    Assign,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Tilde,
    Not,
    Ampersand,
    Pipe,
    Caret,
    LogicalAnd,
    LogicalOr,
    ShiftLeft,
    ShiftRight,
    UnsignedShiftRight,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Coalesce,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub location: Location,
    pub text: String,
}

impl Token {
    pub fn new(kind: TokenKind, location: Location, text: impl Into<String>) -> Self {
        Self {
            kind,
            location,
            text: text.into(),
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

/// Directives whose first argument is lexed as a bare path up to whitespace.
fn takes_path_argument(directive: &str) -> bool {
    matches!(
        directive,
        "include" | "incbin" | "inctbl" | "inctext" | "incext"
    )
}

/// Line-oriented tokenizer.
///
/// Block comment nesting depth carries across lines, so an input ending in
/// the middle of a `/* */` comment is tokenizer-state carry rather than an
/// error by itself. Backslash-continued lines are joined by suppressing the
/// `Newline` token between them.
pub struct Tokenizer {
    file: Rc<str>,
    comment_depth: usize,
    path_mode: bool,
}

impl Tokenizer {
    pub fn new(file: &str) -> Self {
        Self {
            file: Rc::from(file),
            comment_depth: 0,
            path_mode: false,
        }
    }

    pub fn file(&self) -> Rc<str> {
        self.file.clone()
    }

    /// Tokenize a whole source text. Every logical line's token run ends in
    /// exactly one `Newline` token.
    pub fn tokenize(&mut self, text: &str) -> Vec<Token> {
        let mut out = Vec::new();
        let mut line_num: u32 = 1;
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let continued = self.comment_depth == 0 && line.ends_with('\\');
            let body = if continued {
                &line[..line.len() - 1]
            } else {
                line
            };
            self.scan_line(body, line_num, &mut out);
            if !continued && self.comment_depth == 0 {
                let col = line.len() + 1;
                out.push(Token::new(
                    TokenKind::Newline,
                    Location::new(self.file.clone(), line_num, col),
                    "",
                ));
            }
            line_num += 1;
        }
        out
    }

    /// Tokenize a single logical line. Used when macro bodies or pooled
    /// statements are re-lexed independently of the main stream.
    pub fn tokenize_line(&mut self, line: &str, line_num: u32) -> Vec<Token> {
        let mut out = Vec::new();
        self.scan_line(line, line_num, &mut out);
        out.push(Token::new(
            TokenKind::Newline,
            Location::new(self.file.clone(), line_num, line.len() + 1),
            "",
        ));
        out
    }

    fn scan_line(&mut self, line: &str, line_num: u32, out: &mut Vec<Token>) {
        let bytes = line.as_bytes();
        let mut ix = 0;

        while ix < bytes.len() {
            if self.comment_depth > 0 {
                // Inside a block comment; scan for nesting changes.
                if bytes[ix] == b'*' && bytes.get(ix + 1) == Some(&b'/') {
                    self.comment_depth -= 1;
                    ix += 2;
                } else if bytes[ix] == b'/' && bytes.get(ix + 1) == Some(&b'*') {
                    self.comment_depth += 1;
                    ix += 2;
                } else {
                    ix += 1;
                }
                continue;
            }

            let c = bytes[ix];
            if c == b' ' || c == b'\t' {
                ix += 1;
                continue;
            }
            if c == b'/' && bytes.get(ix + 1) == Some(&b'/') {
                break;
            }
            if c == b'/' && bytes.get(ix + 1) == Some(&b'*') {
                self.comment_depth = 1;
                ix += 2;
                continue;
            }

            let loc = Location::new(self.file.clone(), line_num, ix + 1);

            if self.path_mode {
                self.path_mode = false;
                if c != b'"' {
                    let start = ix;
                    while ix < bytes.len() && bytes[ix] != b' ' && bytes[ix] != b'\t' {
                        ix += 1;
                    }
                    out.push(Token::new(TokenKind::String, loc, &line[start..ix]));
                    continue;
                }
                // Quoted paths fall through to normal string scanning.
            }

            if c == b'"' {
                ix = self.scan_string(line, ix, loc, out);
                continue;
            }
            if c.is_ascii_digit() || c == b'$' {
                ix = scan_number(line, ix, loc, out);
                continue;
            }
            if c.is_ascii_alphabetic() || c == b'_' {
                ix = scan_identifier(line, ix, loc, out);
                continue;
            }
            if c == b'#' {
                let start = ix + 1;
                let mut end = start;
                while end < bytes.len() && is_ident_byte(bytes[end]) {
                    end += 1;
                }
                let name = &line[start..end];
                if takes_path_argument(name) {
                    self.path_mode = true;
                }
                out.push(Token::new(TokenKind::Directive, loc, name));
                ix = end;
                continue;
            }
            if c == b';' {
                out.push(Token::new(TokenKind::Newline, loc, ";"));
                ix += 1;
                continue;
            }
            if !c.is_ascii() {
                // Non-ASCII starts no token outside a string; record the
                // whole character so the slice stays on a char boundary.
                let width = line[ix..].chars().next().map_or(1, char::len_utf8);
                out.push(Token::new(TokenKind::Error, loc, &line[ix..ix + width]));
                ix += width;
                continue;
            }

            // Two-character operators are matched greedily before
            // single-character ones.
            let next = bytes.get(ix + 1).copied().unwrap_or(0);
            let third = bytes.get(ix + 2).copied().unwrap_or(0);
            let (kind, len) = match (c, next, third) {
                (b'>', b'>', b'>') => (TokenKind::UnsignedShiftRight, 3),
                (b'&', b'&', _) => (TokenKind::LogicalAnd, 2),
                (b'|', b'|', _) => (TokenKind::LogicalOr, 2),
                (b'<', b'<', _) => (TokenKind::ShiftLeft, 2),
                (b'>', b'>', _) => (TokenKind::ShiftRight, 2),
                (b'=', b'=', _) => (TokenKind::Equal, 2),
                (b'!', b'=', _) => (TokenKind::NotEqual, 2),
                (b'<', b'=', _) => (TokenKind::LessEqual, 2),
                (b'>', b'=', _) => (TokenKind::GreaterEqual, 2),
                (b'?', b'?', _) => (TokenKind::Coalesce, 2),
                (b':', b'=', _) => (TokenKind::Assign, 2),
                (b',', _, _) => (TokenKind::Comma, 1),
                (b':', _, _) => (TokenKind::Colon, 1),
                (b'(', _, _) => (TokenKind::LeftParen, 1),
                (b')', _, _) => (TokenKind::RightParen, 1),
                (b'[', _, _) => (TokenKind::LeftBracket, 1),
                (b']', _, _) => (TokenKind::RightBracket, 1),
                (b'{', _, _) => (TokenKind::LeftBrace, 1),
                (b'}', _, _) => (TokenKind::RightBrace, 1),
                (b'+', _, _) => (TokenKind::Plus, 1),
                (b'-', _, _) => (TokenKind::Minus, 1),
                (b'*', _, _) => (TokenKind::Star, 1),
                (b'/', _, _) => (TokenKind::Slash, 1),
                (b'%', _, _) => (TokenKind::Percent, 1),
                (b'~', _, _) => (TokenKind::Tilde, 1),
                (b'!', _, _) => (TokenKind::Not, 1),
                (b'&', _, _) => (TokenKind::Ampersand, 1),
                (b'|', _, _) => (TokenKind::Pipe, 1),
                (b'^', _, _) => (TokenKind::Caret, 1),
                (b'<', _, _) => (TokenKind::Less, 1),
                (b'>', _, _) => (TokenKind::Greater, 1),
                _ => (TokenKind::Error, 1),
            };
            out.push(Token::new(kind, loc, &line[ix..ix + len]));
            ix += len;
        }
        // A path argument never spans a line end.
        self.path_mode = false;
    }

    fn scan_string(
        &mut self,
        line: &str,
        start: usize,
        loc: Location,
        out: &mut Vec<Token>,
    ) -> usize {
        let mut text = String::new();
        let mut terminated = false;
        let mut end = line.len();
        let mut chars = line[start + 1..].char_indices();
        while let Some((off, c)) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some((_, escaped)) => text.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    }),
                    None => text.push('\\'),
                }
                continue;
            }
            if c == '"' {
                terminated = true;
                end = start + 1 + off + 1;
                break;
            }
            text.push(c);
        }
        if terminated {
            out.push(Token::new(TokenKind::String, loc, text));
        } else {
            out.push(Token::new(TokenKind::Error, loc, text));
        }
        end
    }
}

fn is_ident_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

fn scan_number(line: &str, start: usize, loc: Location, out: &mut Vec<Token>) -> usize {
    let bytes = line.as_bytes();
    let mut ix = start;
    if bytes[ix] == b'$' {
        ix += 1;
        while ix < bytes.len() && bytes[ix].is_ascii_hexdigit() {
            ix += 1;
        }
    } else {
        // Alphanumeric run; base classification happens during parsing so
        // that 0x / trailing-b spellings keep their literal text.
        while ix < bytes.len() && bytes[ix].is_ascii_alphanumeric() {
            ix += 1;
        }
    }
    out.push(Token::new(TokenKind::Number, loc, &line[start..ix]));
    ix
}

fn scan_identifier(line: &str, start: usize, loc: Location, out: &mut Vec<Token>) -> usize {
    let bytes = line.as_bytes();
    let mut ix = start;
    while ix < bytes.len() && is_ident_byte(bytes[ix]) {
        ix += 1;
    }
    let full = &line[start..ix];
    if full.len() > MAX_IDENTIFIER_LEN {
        let head_end = start + MAX_IDENTIFIER_LEN;
        out.push(Token::new(
            TokenKind::Identifier,
            loc.clone(),
            &line[start..head_end],
        ));
        let tail_loc = Location::new(loc.file.clone(), loc.line, head_end + 1);
        out.push(Token::new(TokenKind::Error, tail_loc, &line[head_end..ix]));
        return ix;
    }
    let kind = if bytes.get(ix) == Some(&b'(') {
        TokenKind::MaybeMacro
    } else {
        TokenKind::Identifier
    };
    out.push(Token::new(kind, loc, full));
    ix
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        Tokenizer::new("t.event")
            .tokenize(text)
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn every_line_ends_in_newline() {
        let tokens = Tokenizer::new("t.event").tokenize("BYTE 1\nBYTE 2");
        let newlines = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Newline)
            .count();
        assert_eq!(newlines, 2);
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Newline);
    }

    #[test]
    fn semicolon_separates_statements() {
        assert_eq!(
            kinds("BYTE 1; BYTE 2"),
            vec![
                TokenKind::Identifier,
                TokenKind::Number,
                TokenKind::Newline,
                TokenKind::Identifier,
                TokenKind::Number,
                TokenKind::Newline,
            ]
        );
    }

    #[test]
    fn two_char_operators_are_greedy() {
        assert_eq!(
            kinds("a << b >> c >>> d"),
            vec![
                TokenKind::Identifier,
                TokenKind::ShiftLeft,
                TokenKind::Identifier,
                TokenKind::ShiftRight,
                TokenKind::Identifier,
                TokenKind::UnsignedShiftRight,
                TokenKind::Identifier,
                TokenKind::Newline,
            ]
        );
    }

    #[test]
    fn assign_vs_label_colon() {
        assert_eq!(
            kinds("x := 1"),
            vec![
                TokenKind::Identifier,
                TokenKind::Assign,
                TokenKind::Number,
                TokenKind::Newline,
            ]
        );
        assert_eq!(
            kinds("lbl:"),
            vec![TokenKind::Identifier, TokenKind::Colon, TokenKind::Newline]
        );
    }

    #[test]
    fn maybe_macro_requires_adjacent_paren() {
        assert_eq!(
            kinds("Foo(1)"),
            vec![
                TokenKind::MaybeMacro,
                TokenKind::LeftParen,
                TokenKind::Number,
                TokenKind::RightParen,
                TokenKind::Newline,
            ]
        );
        assert_eq!(
            kinds("Foo (1)"),
            vec![
                TokenKind::Identifier,
                TokenKind::LeftParen,
                TokenKind::Number,
                TokenKind::RightParen,
                TokenKind::Newline,
            ]
        );
    }

    #[test]
    fn nested_block_comments_carry_across_lines() {
        let tokens = Tokenizer::new("t.event").tokenize("BYTE /* a /* b */ still */ 1\nBYTE 2");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Identifier,
                TokenKind::Number,
                TokenKind::Newline,
                TokenKind::Identifier,
                TokenKind::Number,
                TokenKind::Newline,
            ]
        );

        // Comment left open at end of line: no Newline emitted, no error.
        let mut tk = Tokenizer::new("t.event");
        let tokens = tk.tokenize("BYTE 1 /* open\nstill comment */ BYTE 2");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Identifier,
                TokenKind::Number,
                TokenKind::Identifier,
                TokenKind::Number,
                TokenKind::Newline,
            ]
        );
    }

    #[test]
    fn backslash_continuation_joins_logical_lines() {
        let tokens = Tokenizer::new("t.event").tokenize("BYTE 1 \\\n2 3");
        let newlines = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Newline)
            .count();
        assert_eq!(newlines, 1);
        assert_eq!(tokens[2].location.line, 2);
    }

    #[test]
    fn unterminated_string_is_error_token() {
        let tokens = Tokenizer::new("t.event").tokenize("\"abc");
        assert_eq!(tokens[0].kind, TokenKind::Error);
        assert_eq!(tokens[0].text, "abc");
    }

    #[test]
    fn long_identifier_splits_off_error_tail() {
        let name = "a".repeat(MAX_IDENTIFIER_LEN + 5);
        let tokens = Tokenizer::new("t.event").tokenize(&name);
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].text.len(), MAX_IDENTIFIER_LEN);
        assert_eq!(tokens[1].kind, TokenKind::Error);
        assert_eq!(tokens[1].text.len(), 5);
    }

    #[test]
    fn include_directive_enters_path_mode() {
        let tokens = Tokenizer::new("t.event").tokenize("#include sub/defs.event");
        assert_eq!(tokens[0].kind, TokenKind::Directive);
        assert_eq!(tokens[0].text, "include");
        assert_eq!(tokens[1].kind, TokenKind::String);
        assert_eq!(tokens[1].text, "sub/defs.event");
    }

    #[test]
    fn non_ascii_character_is_an_error_token() {
        let tokens = Tokenizer::new("t.event").tokenize("BYTE 1 é");
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].kind, TokenKind::Number);
        assert_eq!(tokens[2].kind, TokenKind::Error);
        assert_eq!(tokens[2].text, "é");
        assert_eq!(tokens[3].kind, TokenKind::Newline);
    }

    #[test]
    fn strings_keep_multibyte_characters_intact() {
        let tokens = Tokenizer::new("t.event").tokenize("\"Aé漢\" BYTE");
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].text, "Aé漢");
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
    }

    #[test]
    fn path_mode_does_not_leak_to_the_next_line() {
        let tokens = Tokenizer::new("t.event").tokenize("#include\nBYTE 1");
        assert_eq!(tokens[0].kind, TokenKind::Directive);
        assert_eq!(tokens[1].kind, TokenKind::Newline);
        assert_eq!(tokens[2].kind, TokenKind::Identifier);
        assert_eq!(tokens[2].text, "BYTE");
    }

    #[test]
    fn dollar_and_hex_literals_keep_text() {
        let tokens = Tokenizer::new("t.event").tokenize("$FF 0x10 101b 42");
        let texts: Vec<&str> = tokens[..4].iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["$FF", "0x10", "101b", "42"]);
        assert!(tokens[..4].iter().all(|t| t.kind == TokenKind::Number));
    }
}
