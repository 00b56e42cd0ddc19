// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Implements the lexer for the whitespace separated patch language.
//!
//! Tokens are everything between whitespace. A `#` at the start of a token
//! comments out the rest of the line. Sources can be stacked, which is how
//! included patch files are spliced into the token stream.

use std::rc::Rc;

use super::span::{LineMap, Location};

/// A single word of a patch, together with where it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub location: Location,
    /// Byte offset of the token in its source, needed for rewinding.
    offset: usize,
}

impl Token {
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

struct Source {
    name: Rc<str>,
    text: String,
    lines: LineMap,
    /// Byte-offset of the next character that would be read
    offset: usize,
}

impl Source {
    fn new(name: &str, text: String) -> Self {
        Self {
            name: name.into(),
            lines: LineMap::new(&text),
            text,
            offset: 0,
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.text[self.offset..].chars().next()
    }

    fn next_char(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.offset += ch.len_utf8();
        Some(ch)
    }

    fn skip_while<P: Fn(char) -> bool>(&mut self, predicate: P) {
        while let Some(ch) = self.peek_char() {
            if predicate(ch) {
                self.next_char();
            } else {
                break;
            }
        }
    }

    fn skip_to_next_line(&mut self) {
        while let Some(ch) = self.next_char() {
            if ch == '\n' {
                break;
            }
        }
    }

    fn location(&self, offset: usize) -> Location {
        Location {
            source: Rc::clone(&self.name),
            pos: self.lines.offset_to_pos(&self.text, offset),
        }
    }

    /// Indentify the next token
    fn next_token(&mut self) -> Option<Token> {
        loop {
            self.skip_while(char::is_whitespace);
            match self.peek_char()? {
                // Line comments
                '#' => self.skip_to_next_line(),
                _ => break,
            }
        }
        let start = self.offset;
        self.skip_while(|ch| !ch.is_whitespace());
        Some(Token {
            text: self.text[start..self.offset].to_owned(),
            location: self.location(start),
            offset: start,
        })
    }
}

/// A stream of tokens with one token of lookahead.
pub struct TokenStream {
    /// Stack of sources, the last one is read from first.
    sources: Vec<Source>,
    /// A token that was peeked at or put back, always from the topmost source.
    lookahead: Option<Token>,
}

impl TokenStream {
    pub fn new(name: &str, text: impl Into<String>) -> Self {
        Self {
            sources: vec![Source::new(name, text.into())],
            lookahead: None,
        }
    }

    /// Continue reading from `text` until it is exhausted, then resume the current source.
    pub fn include(&mut self, name: &str, text: impl Into<String>) {
        self.unread_lookahead();
        self.sources.push(Source::new(name, text.into()));
    }

    /// Number of sources currently being read, one plus the nesting of includes.
    pub fn depth(&self) -> usize {
        self.sources.len()
    }

    pub fn next(&mut self) -> Option<Token> {
        if let Some(token) = self.lookahead.take() {
            return Some(token);
        }
        while let Some(source) = self.sources.last_mut() {
            if let Some(token) = source.next_token() {
                return Some(token);
            }
            // Keep the outermost source around for location reporting
            if self.sources.len() == 1 {
                break;
            }
            self.sources.pop();
        }
        None
    }

    pub fn peek(&mut self) -> Option<&Token> {
        if self.lookahead.is_none() {
            self.lookahead = self.next();
        }
        self.lookahead.as_ref()
    }

    /// Return a token to the stream, so that it is produced by the next call to `next`.
    ///
    /// Only one token of lookahead is supported.
    pub fn putback(&mut self, token: Token) {
        debug_assert!(self.lookahead.is_none(), "only one token can be put back");
        self.lookahead = Some(token);
    }

    /// Consume the next token if it equals `expected`.
    /// Otherwise, the stream is left unchanged and `false` is returned.
    pub fn eat(&mut self, expected: &str) -> bool {
        match self.peek() {
            Some(token) if token.text == expected => {
                self.lookahead = None;
                true
            }
            _ => false,
        }
    }

    /// Consume the raw text up to the end of the current line, without the line break.
    pub fn rest_of_line(&mut self) -> String {
        self.unread_lookahead();
        match self.sources.last_mut() {
            Some(source) => {
                let start = source.offset;
                source.skip_while(|ch| ch != '\n');
                let line = source.text[start..source.offset].trim().to_owned();
                source.next_char();
                line
            }
            None => String::new(),
        }
    }

    /// Consume the raw text up to the `}` matching an already consumed `{`.
    ///
    /// Nested braces are kept in the result, the closing brace itself is dropped.
    /// Returns `None` if the current source ends first.
    pub fn raw_block(&mut self) -> Option<String> {
        self.unread_lookahead();
        let source = self.sources.last_mut()?;
        let start = source.offset;
        let mut depth = 0usize;
        while let Some(token) = source.next_token() {
            match token.as_str() {
                "{" => depth += 1,
                "}" if depth == 0 => return Some(source.text[start..token.offset].to_owned()),
                "}" => depth -= 1,
                _ => {}
            }
        }
        None
    }

    /// True if no more tokens are left in any source.
    pub fn is_exhausted(&mut self) -> bool {
        self.peek().is_none()
    }

    /// Location of the next character to be read, used for end-of-input diagnostics.
    pub fn location(&self) -> Location {
        if let Some(token) = &self.lookahead {
            return token.location.clone();
        }
        match self.sources.last() {
            Some(source) => source.location(source.offset),
            None => Location {
                source: "<empty>".into(),
                pos: super::span::Pos { line: 1, column: 1 },
            },
        }
    }

    fn unread_lookahead(&mut self) {
        if let Some(token) = self.lookahead.take() {
            if let Some(source) = self.sources.last_mut() {
                source.offset = token.offset;
            }
        }
    }
}
