//! Tokenizer for the pipeline script subset
//!
//! Produces identifiers, numbers, strings, punctuation and newline tokens with
//! byte offsets into the source, so later stages can slice verbatim text.
//! Comments and a leading shebang line are skipped.

use crate::errors::LexError;

/// Multi-character operators, longest first
const OPERATORS: &[&str] = &[
    "==~", "<=>", "..<", "**=", "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "->", "?.", "?:",
    "*.", "..", "=~", "++", "--", "+=", "-=", "*=", "/=", "%=", "**", "<<", ">>", "::",
];

const SINGLE_PUNCT: &str = "{}()[],:;.=+-*/%!?<>&|^~@\\";

/// Token category
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword
    Ident(String),
    /// String literal; `interpolated` when it contains `$` substitutions
    Str {
        /// Unescaped content
        value: String,
        /// Double-quoted string with `${...}` or `$name`
        interpolated: bool,
    },
    /// Integer or decimal literal, as written
    Number(String),
    /// Operator or punctuation
    Punct(&'static str),
    /// End of line
    Newline,
    /// End of input
    Eof,
}

/// Token with its source span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Category and payload
    pub kind: TokenKind,
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    /// 1-based line
    pub line: usize,
    /// 1-based column
    pub column: usize,
}

impl Token {
    /// Returns true if this is the given punctuation
    #[must_use]
    pub fn is_punct(&self, punct: &str) -> bool {
        matches!(&self.kind, TokenKind::Punct(p) if *p == punct)
    }

    /// Identifier text, if this is an identifier
    #[must_use]
    pub fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Returns true for newline and `;`
    #[must_use]
    pub fn is_separator(&self) -> bool {
        matches!(self.kind, TokenKind::Newline) || self.is_punct(";")
    }
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
}

/// Splits source text into tokens, ending with [`TokenKind::Eof`]
///
/// # Errors
///
/// Returns a [`LexError`] for unterminated strings or comments and for
/// characters outside the accepted syntax.
pub fn tokenize(src: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer {
        src,
        pos: 0,
        line: 1,
        column: 1,
        tokens: Vec::new(),
    };
    lexer.skip_shebang();
    lexer.run()?;
    Ok(lexer.tokens)
}

impl Lexer<'_> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(offset)
    }

    fn rest(&self) -> &str {
        &self.src[self.pos..]
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn push(&mut self, kind: TokenKind, start: usize, line: usize, column: usize) {
        self.tokens.push(Token {
            kind,
            start,
            end: self.pos,
            line,
            column,
        });
    }

    fn skip_shebang(&mut self) {
        if self.rest().starts_with("#!") {
            while let Some(ch) = self.peek() {
                if ch == '\n' {
                    break;
                }
                self.bump();
            }
        }
    }

    fn run(&mut self) -> Result<(), LexError> {
        while let Some(ch) = self.peek() {
            let (start, line, column) = (self.pos, self.line, self.column);
            match ch {
                '\n' => {
                    self.bump();
                    self.push(TokenKind::Newline, start, line, column);
                }
                c if c.is_whitespace() => {
                    self.bump();
                }
                '\\' if self.peek_at(1) == Some('\n') => {
                    // line continuation
                    self.bump();
                    self.bump();
                }
                '/' if self.rest().starts_with("//") => self.line_comment(),
                '/' if self.rest().starts_with("/*") => self.block_comment(line, column)?,
                '\'' | '"' => self.string(ch, line, column)?,
                c if c.is_ascii_digit() => self.number(start, line, column),
                c if c.is_alphabetic() || c == '_' || c == '$' => self.ident(start, line, column),
                _ => self.punct(ch, start, line, column)?,
            }
        }
        let end = self.pos;
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            start: end,
            end,
            line: self.line,
            column: self.column,
        });
        Ok(())
    }

    fn line_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn block_comment(&mut self, line: usize, column: usize) -> Result<(), LexError> {
        self.bump();
        self.bump();
        loop {
            if self.rest().starts_with("*/") {
                self.bump();
                self.bump();
                return Ok(());
            }
            if self.bump().is_none() {
                return Err(LexError::UnterminatedComment { line, column });
            }
        }
    }

    fn number(&mut self, start: usize, line: usize, column: usize) {
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
            self.bump();
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E'))
            && self
                .peek_at(1)
                .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '+')
        {
            self.bump();
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        let text = self.src[start..self.pos].replace('_', "");
        // Groovy type suffixes
        if matches!(self.peek(), Some('L' | 'l' | 'G' | 'g' | 'D' | 'd' | 'F' | 'f')) {
            self.bump();
        }
        self.push(TokenKind::Number(text), start, line, column);
    }

    fn ident(&mut self, start: usize, line: usize, column: usize) {
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
        {
            self.bump();
        }
        let name = self.src[start..self.pos].to_string();
        self.push(TokenKind::Ident(name), start, line, column);
    }

    fn punct(&mut self, ch: char, start: usize, line: usize, column: usize) -> Result<(), LexError> {
        if let Some(op) = OPERATORS.iter().find(|op| self.rest().starts_with(**op)) {
            for _ in 0..op.len() {
                self.bump();
            }
            self.push(TokenKind::Punct(*op), start, line, column);
            return Ok(());
        }
        if let Some(idx) = SINGLE_PUNCT.find(ch) {
            self.bump();
            let punct = &SINGLE_PUNCT[idx..idx + 1];
            self.push(TokenKind::Punct(punct), start, line, column);
            return Ok(());
        }
        Err(LexError::UnexpectedCharacter { ch, line, column })
    }

    fn string(&mut self, quote: char, line: usize, column: usize) -> Result<(), LexError> {
        let start = self.pos;
        let triple = if quote == '"' { "\"\"\"" } else { "'''" };
        let is_triple = self.rest().starts_with(triple);
        let width = if is_triple { 3 } else { 1 };
        for _ in 0..width {
            self.bump();
        }

        let mut value = String::new();
        let mut interpolated = false;
        loop {
            if is_triple && self.rest().starts_with(triple) {
                for _ in 0..3 {
                    self.bump();
                }
                break;
            }
            let Some(ch) = self.bump() else {
                return Err(LexError::UnterminatedString { line, column });
            };
            match ch {
                c if c == quote && !is_triple => break,
                '\n' if !is_triple => return Err(LexError::UnterminatedString { line, column }),
                '\\' => {
                    let Some(escaped) = self.bump() else {
                        return Err(LexError::UnterminatedString { line, column });
                    };
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        'b' => value.push('\u{8}'),
                        'f' => value.push('\u{c}'),
                        '\n' => {}
                        'u' => {
                            let hex: String = (0..4).filter_map(|_| self.bump()).collect();
                            match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                                Some(c) => value.push(c),
                                None => {
                                    value.push_str("\\u");
                                    value.push_str(&hex);
                                }
                            }
                        }
                        other => value.push(other),
                    }
                }
                '$' if quote == '"'
                    && self
                        .peek()
                        .is_some_and(|c| c == '{' || c.is_alphabetic() || c == '_') =>
                {
                    interpolated = true;
                    value.push('$');
                }
                other => value.push(other),
            }
        }
        self.push(TokenKind::Str { value, interpolated }, start, line, column);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            kinds("echo 'hi'\n"),
            vec![
                TokenKind::Ident("echo".into()),
                TokenKind::Str {
                    value: "hi".into(),
                    interpolated: false
                },
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_interpolation_detected() {
        let tokens = kinds(r#""plain" "${x}" "$y" '$z'"#);
        let flags: Vec<bool> = tokens
            .iter()
            .filter_map(|k| match k {
                TokenKind::Str { interpolated, .. } => Some(*interpolated),
                _ => None,
            })
            .collect();
        assert_eq!(flags, vec![false, true, true, false]);
    }

    #[test]
    fn test_escaped_dollar_is_constant() {
        let tokens = kinds(r#""cost \$5""#);
        assert_eq!(
            tokens[0],
            TokenKind::Str {
                value: "cost $5".into(),
                interpolated: false
            }
        );
    }

    #[test]
    fn test_triple_quoted_string() {
        let tokens = kinds("'''a\nb'''");
        assert_eq!(
            tokens[0],
            TokenKind::Str {
                value: "a\nb".into(),
                interpolated: false
            }
        );
    }

    #[test]
    fn test_comments_and_shebang_skipped() {
        let tokens = kinds("#!/usr/bin/env groovy\n// c\n/* multi\nline */x");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Newline,
                TokenKind::Newline,
                TokenKind::Ident("x".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_numbers_and_operators() {
        assert_eq!(
            kinds("a == 1.5 && b"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Punct("=="),
                TokenKind::Number("1.5".into()),
                TokenKind::Punct("&&"),
                TokenKind::Ident("b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_token_positions() {
        let tokens = tokenize("x\n  y").unwrap();
        assert_eq!((tokens[2].line, tokens[2].column), (2, 3));
        assert_eq!(tokens[2].start, 4);
    }

    #[test]
    fn test_lex_errors() {
        assert_eq!(
            tokenize("echo 'oops").unwrap_err(),
            LexError::UnterminatedString { line: 1, column: 6 }
        );
        assert!(matches!(
            tokenize("/* never closed").unwrap_err(),
            LexError::UnterminatedComment { .. }
        ));
        assert!(matches!(
            tokenize("a # b").unwrap_err(),
            LexError::UnexpectedCharacter { ch: '#', .. }
        ));
    }
}
