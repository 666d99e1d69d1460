// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! The assembly engine: statement loop, directive dispatch and the glue
//! between the core pipeline and the interpreter.
//!
//! One engine instance assembles one input (plus its includes) into an
//! ordered list of line nodes, then [`Engine::finalize`] renders them into
//! an output sink. Errors never stop the statement loop; they are logged
//! and the cursor resynchronizes to the next statement.

use std::fs;
use std::path::{Path, PathBuf};

use crate::assembler::directives::{parse_define, ConditionalStack, Define};
use crate::assembler::file_search::FileSearcher;
use crate::assembler::interpreter::{convert_to_address, Interpreter};
use crate::assembler::output::OutputSink;
use crate::assembler::pool::PoolQueue;
use crate::assembler::raws::RawRegistry;
use crate::assembler::text_encoding::EncodingRegistry;
use crate::assembler::AsmConfig;
use crate::core::cursor::TokenCursor;
use crate::core::expr::Expr;
use crate::core::location::Location;
use crate::core::macros::MacroRegistry;
use crate::core::parser::{Param, Parser};
use crate::core::report::Log;
use crate::core::scope::{evaluate, AddOutcome, EvalContext, Phase, ScopeStack};
use crate::core::tokenizer::{Token, TokenKind, Tokenizer};

pub struct Engine {
    config: AsmConfig,
    macros: MacroRegistry,
    raws: RawRegistry,
    encodings: EncodingRegistry,
    searcher: FileSearcher,
    log: Log,
    scope: ScopeStack,
    interpreter: Interpreter,
    conditionals: ConditionalStack,
    pool: PoolQueue,
    file_stack: Vec<PathBuf>,
    current_encoding: String,
}

impl Engine {
    pub fn new(config: AsmConfig) -> Self {
        let log = Log::new()
            .with_warnings_as_errors(config.warnings_as_errors)
            .with_debug(config.debug_log);
        let searcher = FileSearcher::new(config.distribution_dir.clone());
        let interpreter = Interpreter::new(config.clone());
        let encodings = EncodingRegistry::new();
        let current_encoding = encodings.default_encoding().to_string();
        Self {
            config,
            macros: MacroRegistry::new(),
            raws: RawRegistry::with_builtins(),
            encodings,
            searcher,
            log,
            scope: ScopeStack::new_base(),
            interpreter,
            conditionals: ConditionalStack::new(),
            pool: PoolQueue::new(),
            file_stack: Vec::new(),
            current_encoding,
        }
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    pub fn raws_mut(&mut self) -> &mut RawRegistry {
        &mut self.raws
    }

    /// Assemble a file from disk, then run the end-of-input checks.
    pub fn assemble_file(&mut self, path: &Path) {
        match fs::read_to_string(path) {
            Ok(text) => self.assemble_source(&path.to_string_lossy(), &text),
            Err(err) => self.log.error(
                None,
                format!("Could not read {}: {err}", path.display()),
            ),
        }
    }

    /// Assemble a complete source text, then run the end-of-input checks.
    pub fn assemble_source(&mut self, file: &str, text: &str) {
        self.file_stack.push(PathBuf::from(file));
        let tokens = Tokenizer::new(file).tokenize(text);
        let mut cursor = TokenCursor::from_tokens(tokens);
        self.process(&mut cursor);
        self.file_stack.pop();
        self.end_of_input();
    }

    /// Run the final resolution pass over every line node, then write and
    /// commit. An error anywhere in the run, including this pass, leaves
    /// the sink untouched. Returns whether the commit happened.
    pub fn finalize(&mut self, sink: &mut dyn OutputSink) -> bool {
        let mut resolved = Vec::new();
        for node in self.interpreter.nodes() {
            if let Some(bytes) = node.resolve(&self.config, &mut self.log) {
                resolved.push((node.offset(), bytes));
            }
        }
        if self.log.has_errored() {
            return false;
        }
        for (offset, bytes) in resolved {
            sink.write(offset, &bytes);
        }
        if let Err(err) = sink.commit() {
            self.log.error(None, format!("Could not write output: {err}"));
            return false;
        }
        true
    }

    fn process(&mut self, cursor: &mut TokenCursor) {
        while let Some(token) = cursor.next() {
            self.statement(token, cursor);
        }
    }

    fn statement(&mut self, head: Token, cursor: &mut TokenCursor) {
        match head.kind {
            TokenKind::Newline => {}
            TokenKind::Directive => self.directive(head, cursor),
            _ if !self.conditionals.included() => cursor.skip_to_newline(),
            TokenKind::LeftBrace => {
                self.scope = self.scope.push();
            }
            TokenKind::RightBrace => match self.scope.pop() {
                Some(parent) => self.scope = parent,
                None => self.log.error(Some(&head.location), "Unmatched closing brace"),
            },
            TokenKind::Error => {
                self.log.error(
                    Some(&head.location),
                    format!("Unrecognized input: {:?}", head.text),
                );
                cursor.skip_to_newline();
            }
            TokenKind::Identifier | TokenKind::MaybeMacro => self.code_statement(head, cursor),
            _ => {
                self.log.error(
                    Some(&head.location),
                    format!("Unexpected {:?} at start of statement", head.kind),
                );
                cursor.skip_to_newline();
            }
        }
    }

    fn code_statement(&mut self, head: Token, cursor: &mut TokenCursor) {
        // Expand statement-head macros first; the expansion output becomes
        // the statement.
        let parser = Parser::new(&self.macros);
        match parser.try_expand(&head, cursor) {
            Ok(true) => {
                if let Some(next) = cursor.next() {
                    self.statement(next, cursor);
                }
                return;
            }
            Ok(false) => {}
            Err(err) => {
                self.log.error(Some(&err.location), err.message);
                cursor.skip_to_newline();
                return;
            }
        }

        if head.kind == TokenKind::Identifier {
            match cursor.peek_kind() {
                Some(TokenKind::Colon) => {
                    cursor.next();
                    self.define_label(&head);
                    // A statement may follow the label on the same line.
                    if let Some(next) = cursor.next() {
                        self.statement(next, cursor);
                    }
                    return;
                }
                Some(TokenKind::Assign) => {
                    cursor.next();
                    self.assignment(&head, cursor);
                    return;
                }
                _ => {}
            }
        }

        match head.text.as_str() {
            "ORG" => {
                if let Some(target) = self.eval_expression(cursor) {
                    self.interpreter.handle_org(target, &head.location, &mut self.log);
                }
                self.end_statement(cursor);
            }
            "PUSH" => {
                self.interpreter.handle_push();
                self.end_statement(cursor);
            }
            "POP" => {
                self.interpreter.handle_pop(&head.location, &mut self.log);
                self.end_statement(cursor);
            }
            "ASSERT" => {
                self.assert_statement(&head, cursor);
                self.end_statement(cursor);
            }
            "PROTECT" => {
                if let Some(args) = self.eval_arguments(&head, cursor, 1, 2) {
                    self.interpreter.handle_protect(
                        args[0],
                        args.get(1).copied(),
                        &head.location,
                        &mut self.log,
                    );
                }
                self.end_statement(cursor);
            }
            "ALIGN" => {
                if let Some(args) = self.eval_arguments(&head, cursor, 1, 2) {
                    self.interpreter.handle_align(
                        args[0],
                        args.get(1).copied(),
                        &head.location,
                        &mut self.log,
                    );
                }
                self.end_statement(cursor);
            }
            "FILL" => {
                if let Some(args) = self.eval_arguments(&head, cursor, 1, 2) {
                    self.interpreter.handle_fill(
                        args[0],
                        args.get(1).copied(),
                        &head.location,
                        &mut self.log,
                    );
                }
                self.end_statement(cursor);
            }
            _ => self.raw_statement(head, cursor),
        }
    }

    fn define_label(&mut self, name: &Token) {
        let address = convert_to_address(&self.config, self.interpreter.current_offset());
        if self.scope.add_symbol(&name.text, address) == AddOutcome::AlreadyDefined {
            self.log.warning(
                Some(&name.location),
                format!("Redefinition of {}; keeping the first value", name.text),
            );
        }
    }

    /// `name := expr`. Evaluated at `Early` phase; an expression that does
    /// not resolve yet is stored deferred and retried on reference.
    fn assignment(&mut self, name: &Token, cursor: &mut TokenCursor) {
        let parser = Parser::new(&self.macros);
        let expr = match parser.parse_expression(cursor, &self.scope, &mut self.log) {
            Ok(expr) => expr,
            Err(err) => {
                self.log.error(Some(&err.location), err.message);
                cursor.skip_to_newline();
                return;
            }
        };
        let outcome = match evaluate(&expr, Phase::Early, &self.eval_ctx()) {
            Ok(value) => self.scope.add_symbol(&name.text, value),
            Err(_) => self.scope.add_deferred(&name.text, expr),
        };
        if outcome == AddOutcome::AlreadyDefined {
            self.log.warning(
                Some(&name.location),
                format!("Redefinition of {}; keeping the first value", name.text),
            );
        }
        self.end_statement(cursor);
    }

    fn assert_statement(&mut self, head: &Token, cursor: &mut TokenCursor) {
        let parser = Parser::new(&self.macros);
        let expr = match parser.parse_expression(cursor, &self.scope, &mut self.log) {
            Ok(expr) => expr,
            Err(err) => {
                self.log.error(Some(&err.location), err.message);
                resync(cursor);
                return;
            }
        };
        match evaluate(&expr, Phase::Immediate, &self.eval_ctx()) {
            Ok(value) => {
                self.interpreter
                    .handle_assert(&expr, value, &head.location, &mut self.log)
            }
            Err(err) => {
                let location = err.location.as_ref().unwrap_or(&head.location);
                self.log.error(Some(location), err.message.clone());
            }
        }
    }

    fn raw_statement(&mut self, head: Token, cursor: &mut TokenCursor) {
        let name = head.text.clone();
        if !self.raws.has_name(&name) {
            self.log.error(
                Some(&head.location),
                format!("Unrecognized code: {name}"),
            );
            cursor.skip_to_newline();
            return;
        }

        let parser = Parser::new(&self.macros);
        let params = match parser.parse_param_list(cursor, &self.scope, &mut self.log) {
            Ok(params) => params,
            Err(err) => {
                self.log.error(Some(&err.location), err.message);
                cursor.skip_to_newline();
                return;
            }
        };

        let mut exprs: Vec<Expr> = Vec::new();
        for param in params {
            match param {
                Param::Atom(expr) => exprs.push(expr),
                Param::List(items, _) => exprs.extend(items),
                Param::StringLiteral(text, location) => {
                    let byte_sized = self
                        .raws
                        .lookup(&name, 1)
                        .map(|layout| layout.byte_size == 1)
                        .unwrap_or(false);
                    if !byte_sized {
                        self.log.error(
                            Some(&location),
                            format!("{name} does not take string parameters"),
                        );
                        continue;
                    }
                    match self.encodings.encode(&text, &self.current_encoding) {
                        Ok(bytes) => exprs.extend(
                            bytes
                                .into_iter()
                                .map(|b| Expr::Number(b as i64, location.clone())),
                        ),
                        // Zero bytes on encoding failure; assembly continues.
                        Err(err) => self.log.error(Some(&location), err.to_string()),
                    }
                }
            }
        }

        match self.raws.lookup(&name, exprs.len()) {
            Some(layout) => {
                self.interpreter
                    .handle_raw(layout, exprs, &head.location, &mut self.log)
            }
            None => self.log.error(
                Some(&head.location),
                format!(
                    "Incorrect number of parameters to {name}: {}",
                    exprs.len()
                ),
            ),
        }
        self.end_statement(cursor);
    }

    fn directive(&mut self, token: Token, cursor: &mut TokenCursor) {
        match token.text.as_str() {
            // The conditional family runs in every inclusion state; it is
            // what tracks the state in the first place.
            "ifdef" | "ifndef" => self.directive_ifdef(&token, cursor),
            "if" => self.directive_if(cursor),
            "else" => {
                if let Err(message) = self.conditionals.invert() {
                    self.log.error(Some(&token.location), message);
                }
                self.end_statement(cursor);
            }
            "endif" => {
                if let Err(message) = self.conditionals.pop() {
                    self.log.error(Some(&token.location), message);
                }
                self.end_statement(cursor);
            }
            // Everything else requires inclusion: skipped without any side
            // effect while excluded.
            _ if !self.conditionals.included() => cursor.skip_to_newline(),
            "define" => self.directive_define(&token, cursor),
            "undef" => self.directive_undef(cursor),
            "include" => self.directive_include(&token, cursor),
            "incbin" => self.directive_incbin(&token, cursor),
            "inctbl" => self.directive_inctbl(&token, cursor),
            "inctext" => self.directive_tool(&token, cursor, true),
            "incext" => self.directive_tool(&token, cursor, false),
            "pool" => {
                self.end_statement(cursor);
                self.flush_pool(&token.location);
            }
            "pooled" => {
                let tokens = collect_line(cursor, true);
                self.pool.push(tokens, self.scope.clone());
            }
            other => {
                self.log.error(
                    Some(&token.location),
                    format!("Unknown directive: #{other}"),
                );
                cursor.skip_to_newline();
            }
        }
    }

    fn directive_ifdef(&mut self, token: &Token, cursor: &mut TokenCursor) {
        if !self.conditionals.included() {
            self.conditionals.push_suppressed();
            cursor.skip_to_newline();
            return;
        }
        let condition = match cursor.peek_kind() {
            Some(TokenKind::Identifier) | Some(TokenKind::MaybeMacro) => {
                let name = cursor.next().unwrap();
                self.macros.is_defined(&name.text)
            }
            _ => {
                self.log.error(
                    Some(&token.location),
                    format!("Expected a name after #{}", token.text),
                );
                false
            }
        };
        let negate = token.text == "ifndef";
        self.conditionals.push(condition != negate);
        self.end_statement(cursor);
    }

    fn directive_if(&mut self, cursor: &mut TokenCursor) {
        if !self.conditionals.included() {
            self.conditionals.push_suppressed();
            cursor.skip_to_newline();
            return;
        }
        match self.eval_expression(cursor) {
            Some(value) => self.conditionals.push(value != 0),
            None => self.conditionals.push(false),
        }
        self.end_statement(cursor);
    }

    fn directive_define(&mut self, token: &Token, cursor: &mut TokenCursor) {
        let tokens = collect_line(cursor, true);
        match parse_define(&tokens, &token.location) {
            Ok(Define::Definition(def)) => {
                let name = def.name.clone();
                if !self.macros.add_definition(def) {
                    self.redefinition_warning(&name, &token.location);
                }
            }
            Ok(Define::Macro(def)) => {
                let key = def.key();
                if !self.macros.add_macro(def) {
                    self.redefinition_warning(&key, &token.location);
                }
            }
            Err((message, location)) => self.log.error(Some(&location), message),
        }
    }

    fn redefinition_warning(&mut self, name: &str, location: &Location) {
        self.log.warning(
            Some(location),
            format!("Redefinition of {name}; keeping the first definition"),
        );
    }

    fn directive_undef(&mut self, cursor: &mut TokenCursor) {
        match cursor.peek_kind() {
            Some(TokenKind::Identifier) | Some(TokenKind::MaybeMacro) => {
                let name = cursor.next().unwrap();
                if !self.macros.undefine(&name.text) {
                    self.log.warning(
                        Some(&name.location),
                        format!("{} was not defined", name.text),
                    );
                }
            }
            _ => self.log.error(None, "Expected a name after #undef"),
        }
        self.end_statement(cursor);
    }

    fn directive_include(&mut self, token: &Token, cursor: &mut TokenCursor) {
        let Some(path) = self.path_argument(token, cursor) else {
            return;
        };
        if self.file_stack.contains(&path) {
            self.log.error(
                Some(&token.location),
                format!("Recursive include of {}", path.display()),
            );
            self.end_statement(cursor);
            return;
        }
        match fs::read_to_string(&path) {
            Ok(text) => {
                let name = path.to_string_lossy().to_string();
                self.file_stack.push(path);
                let tokens = Tokenizer::new(&name).tokenize(&text);
                let mut sub = TokenCursor::from_tokens(tokens);
                self.process(&mut sub);
                self.file_stack.pop();
            }
            Err(err) => self.log.error(
                Some(&token.location),
                format!("Could not read {}: {err}", path.display()),
            ),
        }
        self.end_statement(cursor);
    }

    fn directive_incbin(&mut self, token: &Token, cursor: &mut TokenCursor) {
        let Some(path) = self.path_argument(token, cursor) else {
            return;
        };
        match fs::read(&path) {
            Ok(bytes) => self
                .interpreter
                .handle_data(bytes, &token.location, &mut self.log),
            Err(err) => self.log.error(
                Some(&token.location),
                format!("Could not read {}: {err}", path.display()),
            ),
        }
        self.end_statement(cursor);
    }

    /// `#inctbl path [name]`: load an encoding table and make it the active
    /// encoding. The table name defaults to the file stem.
    fn directive_inctbl(&mut self, token: &Token, cursor: &mut TokenCursor) {
        let Some(path) = self.path_argument(token, cursor) else {
            return;
        };
        let name = match cursor.peek_kind() {
            Some(TokenKind::Identifier) => cursor.next().unwrap().text,
            _ => path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "table".to_string()),
        };
        match fs::read_to_string(&path) {
            Ok(text) => match self.encodings.load_table(&name, &text) {
                Ok(()) => self.current_encoding = name,
                Err(err) => self.log.error(
                    Some(&token.location),
                    format!("Bad encoding table {}: {err}", path.display()),
                ),
            },
            Err(err) => self.log.error(
                Some(&token.location),
                format!("Could not read {}: {err}", path.display()),
            ),
        }
        self.end_statement(cursor);
    }

    /// `#inctext tool args…` splices the tool's stdout as source text;
    /// `#incext tool args…` emits it as binary data.
    fn directive_tool(&mut self, token: &Token, cursor: &mut TokenCursor, as_text: bool) {
        let tool = match cursor.peek_kind() {
            Some(TokenKind::String) => cursor.next().unwrap(),
            _ => {
                self.log.error(
                    Some(&token.location),
                    format!("Expected a tool name after #{}", token.text),
                );
                cursor.skip_to_newline();
                return;
            }
        };
        let args: Vec<String> = collect_line(cursor, false)
            .into_iter()
            .map(|t| t.text)
            .collect();
        let including = self
            .file_stack
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("."));
        match self.searcher.run_tool(&including, &tool.text, &args) {
            Ok(stdout) if as_text => {
                let source = String::from_utf8_lossy(&stdout);
                let file = format!("<{}:{}>", token.text, tool.text);
                let tokens = Tokenizer::new(&file).tokenize(&source);
                cursor.prepend(tokens);
            }
            Ok(stdout) => {
                self.interpreter
                    .handle_data(stdout, &token.location, &mut self.log)
            }
            Err(message) => self.log.error(Some(&token.location), message),
        }
    }

    /// Replay every queued `#pooled` line at the flush point, each with its
    /// captured scope.
    fn flush_pool(&mut self, location: &Location) {
        for line in self.pool.drain() {
            let saved = std::mem::replace(&mut self.scope, line.scope);
            let mut tokens = line.tokens;
            tokens.push(Token::new(TokenKind::Newline, location.clone(), ""));
            let mut sub = TokenCursor::from_tokens(tokens);
            self.process(&mut sub);
            self.scope = saved;
        }
    }

    fn path_argument(&mut self, token: &Token, cursor: &mut TokenCursor) -> Option<PathBuf> {
        let request = match cursor.peek_kind() {
            Some(TokenKind::String) => cursor.next().unwrap(),
            _ => {
                self.log.error(
                    Some(&token.location),
                    format!("Expected a path after #{}", token.text),
                );
                cursor.skip_to_newline();
                return None;
            }
        };
        let including = self
            .file_stack
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("."));
        match self.searcher.find(&including, &request.text) {
            Some(path) => Some(path),
            None => {
                self.log.error(
                    Some(&request.location),
                    format!("Could not find file: {}", request.text),
                );
                cursor.skip_to_newline();
                None
            }
        }
    }

    /// Parse and immediately evaluate one expression. Logs and returns
    /// `None` on either failure.
    fn eval_expression(&mut self, cursor: &mut TokenCursor) -> Option<i64> {
        let parser = Parser::new(&self.macros);
        let expr = match parser.parse_expression(cursor, &self.scope, &mut self.log) {
            Ok(expr) => expr,
            Err(err) => {
                self.log.error(Some(&err.location), err.message);
                resync(cursor);
                return None;
            }
        };
        match evaluate(&expr, Phase::Immediate, &self.eval_ctx()) {
            Ok(value) => Some(value),
            Err(err) => {
                let location = err.location.as_ref().unwrap_or(expr.location());
                self.log.error(Some(location), err.message.clone());
                None
            }
        }
    }

    /// Parse a parameter list of plain expressions and evaluate each one
    /// immediately. Checks the argument count against `[min, max]`.
    fn eval_arguments(
        &mut self,
        head: &Token,
        cursor: &mut TokenCursor,
        min: usize,
        max: usize,
    ) -> Option<Vec<i64>> {
        let parser = Parser::new(&self.macros);
        let params = match parser.parse_param_list(cursor, &self.scope, &mut self.log) {
            Ok(params) => params,
            Err(err) => {
                self.log.error(Some(&err.location), err.message);
                resync(cursor);
                return None;
            }
        };
        if params.len() < min || params.len() > max {
            self.log.error(
                Some(&head.location),
                format!(
                    "Incorrect number of parameters to {}: {}",
                    head.text,
                    params.len()
                ),
            );
            return None;
        }
        let mut values = Vec::with_capacity(params.len());
        for param in &params {
            let Param::Atom(expr) = param else {
                self.log.error(
                    Some(param.location()),
                    format!("{} takes plain numeric parameters", head.text),
                );
                return None;
            };
            match evaluate(expr, Phase::Immediate, &self.eval_ctx()) {
                Ok(value) => values.push(value),
                Err(err) => {
                    let location = err.location.as_ref().unwrap_or(expr.location());
                    self.log.error(Some(location), err.message.clone());
                    return None;
                }
            }
        }
        Some(values)
    }

    fn eval_ctx(&self) -> EvalContext {
        EvalContext {
            current_offset: Some(self.interpreter.current_offset()),
        }
    }

    /// Consume the statement-ending newline; anything else before it is a
    /// trailing-garbage error.
    fn end_statement(&mut self, cursor: &mut TokenCursor) {
        match cursor.peek() {
            Some(token) if token.kind == TokenKind::Newline => {
                cursor.next();
            }
            None => {}
            Some(token) => {
                self.log.error(
                    Some(&token.location),
                    format!("Expected end of statement, found {:?}", token.kind),
                );
                cursor.skip_to_newline();
            }
        }
    }

    /// Structural checks, reported once when the whole input is consumed.
    fn end_of_input(&mut self) {
        if !self.conditionals.is_empty() {
            self.log.error(
                None,
                format!(
                    "{} conditional block(s) left open at end of input",
                    self.conditionals.depth()
                ),
            );
            self.conditionals = ConditionalStack::new();
        }
        if self.scope.depth() > 1 {
            self.log.error(None, "Unclosed block scope at end of input");
            while let Some(parent) = self.scope.pop() {
                self.scope = parent;
            }
        }
        if !self.pool.is_empty() {
            self.log.error(
                None,
                format!(
                    "{} pooled line(s) never flushed with #pool",
                    self.pool.len()
                ),
            );
            self.pool.drain();
        }
        self.interpreter.end_of_input(&mut self.log);
    }
}

/// Drop tokens up to, but not including, the statement terminator. Error
/// paths whose caller still runs the end-of-statement check use this so
/// the check finds the newline where it expects it instead of eating the
/// next line's first token.
fn resync(cursor: &mut TokenCursor) {
    while !matches!(cursor.peek_kind(), None | Some(TokenKind::Newline)) {
        cursor.next();
    }
}

/// Collect tokens up to the statement-ending newline, consuming it.
///
/// With `physical_only`, `;` separators (newline tokens whose text is `";"`)
/// are kept in the collected run; this is how multi-statement `#define`
/// bodies and `#pooled` lines survive to their replay site.
fn collect_line(cursor: &mut TokenCursor, physical_only: bool) -> Vec<Token> {
    let mut out = Vec::new();
    while let Some(token) = cursor.next() {
        if token.kind == TokenKind::Newline {
            if physical_only && token.text == ";" {
                out.push(token);
                continue;
            }
            break;
        }
        out.push(token);
    }
    out
}
