//! Host syntax tree reader
//!
//! Turns the token stream into statements: assignments, method calls (with
//! parenthesised or command-style arguments and an optional trailing closure)
//! and everything else kept as verbatim text. Closures keep their raw source
//! so opaque blocks can be preserved exactly. The reader is tolerant: the
//! only hard failures are unbalanced brackets.

use super::lexer::{Token, TokenKind};
use crate::ast::SourceLocation;
use thiserror::Error;

/// Unbalanced bracket; stops parsing of the script
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ReadError {
    /// Description
    pub message: String,
    /// Line of the offending token
    pub line: usize,
    /// Column of the offending token
    pub column: usize,
}

impl ReadError {
    /// Location of the failure
    #[must_use]
    pub fn location(&self) -> SourceLocation {
        SourceLocation::script(self.line, self.column)
    }
}

/// Statement of a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// What was recognised
    pub kind: StatementKind,
    /// Verbatim source of the statement
    pub text: String,
    /// Position of the first token
    pub location: SourceLocation,
}

/// Statement shapes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    /// `target = value`
    Assignment {
        /// Assigned name
        target: String,
        /// Right-hand side
        value: Expr,
    },
    /// Method call
    Call(Call),
    /// Anything else
    Other,
}

/// Method call with arguments and optional trailing closure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Method name
    pub name: String,
    /// Arguments in order
    pub args: Vec<Arg>,
    /// Trailing closure
    pub closure: Option<Closure>,
    /// Whether the arguments were written in parentheses
    pub parenthesized: bool,
    /// Position of the method name
    pub location: SourceLocation,
}

/// Argument, optionally named
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arg {
    /// `name:` prefix
    pub name: Option<String>,
    /// Argument expression
    pub value: Expr,
    /// Position of the argument
    pub location: SourceLocation,
}

/// `{ ... }` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closure {
    /// Source between the braces
    pub raw: String,
    /// Statements of the body, after any `params ->` header
    pub statements: Vec<Statement>,
    /// Whether the closure declares parameters
    pub has_params: bool,
    /// Position of the opening brace
    pub location: SourceLocation,
}

/// Expression with its verbatim text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    /// What was recognised
    pub kind: ExprKind,
    /// Verbatim source
    pub text: String,
    /// Position of the first token
    pub location: SourceLocation,
}

/// Expression shapes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    /// Constant string
    Str(String),
    /// String with `$` interpolation
    GString,
    /// Numeric literal text
    Number(String),
    /// `true` or `false`
    Bool(bool),
    /// `null`
    Null,
    /// Bare identifier
    Ident(String),
    /// `[a, b]`
    List(Vec<Expr>),
    /// `[k: v]`
    Map(Vec<Arg>),
    /// `{ ... }`
    Closure(Closure),
    /// Nested call
    Call(Box<Call>),
    /// Any other balanced token run
    Other,
}

const NO_MATCH: usize = usize::MAX;

struct Reader<'a> {
    src: &'a str,
    tokens: &'a [Token],
    matching: Vec<usize>,
    pos: usize,
    end: usize,
}

/// Reads the statements of a whole script
///
/// # Errors
///
/// Returns a [`ReadError`] if brackets are unbalanced.
pub fn read(src: &str, tokens: &[Token]) -> Result<Vec<Statement>, ReadError> {
    let matching = match_brackets(tokens)?;
    let end = tokens
        .iter()
        .position(|t| t.kind == TokenKind::Eof)
        .unwrap_or(tokens.len());
    let mut reader = Reader {
        src,
        tokens,
        matching,
        pos: 0,
        end,
    };
    Ok(reader.statements())
}

fn closing_for(open: &str) -> &'static str {
    match open {
        "(" => ")",
        "[" => "]",
        _ => "}",
    }
}

fn match_brackets(tokens: &[Token]) -> Result<Vec<usize>, ReadError> {
    let mut matching = vec![NO_MATCH; tokens.len()];
    let mut stack: Vec<(usize, &'static str)> = Vec::new();
    for (idx, token) in tokens.iter().enumerate() {
        let TokenKind::Punct(p) = &token.kind else {
            continue;
        };
        let p: &'static str = *p;
        match p {
            "(" | "[" | "{" => stack.push((idx, p)),
            ")" | "]" | "}" => match stack.pop() {
                Some((open, kind)) if closing_for(kind) == p => {
                    matching[open] = idx;
                    matching[idx] = open;
                }
                Some((open, kind)) => {
                    let opener = &tokens[open];
                    return Err(ReadError {
                        message: format!(
                            "Unexpected '{p}', expected '{}' to close '{kind}' at line {}, column {}",
                            closing_for(kind),
                            opener.line,
                            opener.column
                        ),
                        line: token.line,
                        column: token.column,
                    });
                }
                None => {
                    return Err(ReadError {
                        message: format!("Unexpected '{p}'"),
                        line: token.line,
                        column: token.column,
                    });
                }
            },
            _ => {}
        }
    }
    if let Some((open, kind)) = stack.pop() {
        let token = &tokens[open];
        return Err(ReadError {
            message: format!("Unclosed '{kind}'"),
            line: token.line,
            column: token.column,
        });
    }
    Ok(matching)
}

impl Reader<'_> {
    fn tok(&self) -> Option<&Token> {
        (self.pos < self.end).then(|| &self.tokens[self.pos])
    }

    fn tok_at(&self, idx: usize) -> Option<&Token> {
        (idx < self.end).then(|| &self.tokens[idx])
    }

    fn location_at(&self, idx: usize) -> SourceLocation {
        let token = &self.tokens[idx.min(self.tokens.len().saturating_sub(1))];
        SourceLocation::script(token.line, token.column)
    }

    fn slice(&self, from: usize, to: usize) -> String {
        if to <= from {
            return String::new();
        }
        let start = self.tokens[from].start;
        let end = self.tokens[to - 1].end;
        self.src[start..end].to_string()
    }

    fn skip_newlines(&mut self) {
        while self
            .tok()
            .is_some_and(|t| matches!(t.kind, TokenKind::Newline))
        {
            self.pos += 1;
        }
    }

    fn skip_separators(&mut self) {
        while self.tok().is_some_and(Token::is_separator) {
            self.pos += 1;
        }
    }

    /// Jumps over a bracketed group starting at the current token
    fn skip_token(&mut self) {
        let jump = self.matching[self.pos];
        let is_open = self
            .tok()
            .is_some_and(|t| t.is_punct("(") || t.is_punct("[") || t.is_punct("{"));
        if is_open && jump != NO_MATCH {
            self.pos = jump + 1;
        } else {
            self.pos += 1;
        }
    }

    /// A newline continues the statement after a binary operator or before
    /// a member access on the next line.
    fn newline_continues(&self) -> bool {
        let prev_is_operator = self.pos > 0
            && matches!(&self.tokens[self.pos - 1].kind,
                TokenKind::Punct(p) if !matches!(*p, ")" | "]" | "}" | ";"));
        if prev_is_operator {
            return true;
        }
        let mut idx = self.pos;
        while self
            .tok_at(idx)
            .is_some_and(|t| matches!(t.kind, TokenKind::Newline))
        {
            idx += 1;
        }
        self.tok_at(idx)
            .is_some_and(|t| t.is_punct(".") || t.is_punct("?.") || t.is_punct("*."))
    }

    fn at_statement_end(&self) -> bool {
        match self.tok() {
            None => true,
            Some(t) if t.is_punct(";") || t.kind == TokenKind::Eof => true,
            Some(t) if t.kind == TokenKind::Newline => !self.newline_continues(),
            _ => false,
        }
    }

    fn at_expr_end(&self, group: bool) -> bool {
        match self.tok() {
            None => true,
            Some(t) if t.is_punct(",") => true,
            Some(_) if group => false,
            Some(_) => self.at_statement_end(),
        }
    }

    fn statements(&mut self) -> Vec<Statement> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            if self.tok().is_none_or(|t| t.kind == TokenKind::Eof) {
                break;
            }
            let before = self.pos;
            statements.push(self.statement());
            if self.pos == before {
                self.pos += 1;
            }
        }
        statements
    }

    fn consume_statement_rest(&mut self) {
        while !self.at_statement_end() {
            self.skip_token();
        }
    }

    fn statement(&mut self) -> Statement {
        let start = self.pos;
        let location = self.location_at(start);
        let kind = self.statement_kind();
        if !matches!(kind, StatementKind::Other) && !self.at_statement_end() {
            self.consume_statement_rest();
            return Statement {
                kind: StatementKind::Other,
                text: self.slice(start, self.pos),
                location,
            };
        }
        Statement {
            kind,
            text: self.slice(start, self.pos),
            location,
        }
    }

    fn statement_kind(&mut self) -> StatementKind {
        let Some(name) = self.tok().and_then(Token::ident).map(str::to_string) else {
            self.consume_statement_rest();
            return StatementKind::Other;
        };
        let location = self.location_at(self.pos);
        let next = self.tok_at(self.pos + 1).cloned();

        match next {
            Some(t) if t.is_punct("=") => {
                self.pos += 2;
                let value = self.expr(false);
                StatementKind::Assignment {
                    target: name,
                    value,
                }
            }
            Some(t) if t.is_punct("(") => {
                self.pos += 1;
                StatementKind::Call(self.paren_call(name, location))
            }
            Some(t) if t.is_punct("{") => {
                self.pos += 1;
                let closure = self.closure();
                StatementKind::Call(Call {
                    name,
                    args: Vec::new(),
                    closure: Some(closure),
                    parenthesized: false,
                    location,
                })
            }
            _ => {
                self.pos += 1;
                if self.at_statement_end() {
                    return StatementKind::Call(Call {
                        name,
                        args: Vec::new(),
                        closure: None,
                        parenthesized: false,
                        location,
                    });
                }
                if self.tok().is_some_and(starts_argument) {
                    let args = self.command_args();
                    let closure = if self.tok().is_some_and(|t| t.is_punct("{")) {
                        Some(self.closure())
                    } else {
                        None
                    };
                    return StatementKind::Call(Call {
                        name,
                        args,
                        closure,
                        parenthesized: false,
                        location,
                    });
                }
                self.consume_statement_rest();
                StatementKind::Other
            }
        }
    }

    /// Parses `(args)` with the current token at `(`, plus a trailing closure
    fn paren_call(&mut self, name: String, location: SourceLocation) -> Call {
        let args = self.group_args();
        let closure = if self.tok().is_some_and(|t| t.is_punct("{")) {
            Some(self.closure())
        } else {
            None
        };
        Call {
            name,
            args,
            closure,
            parenthesized: true,
            location,
        }
    }

    /// Parses the arguments of a bracketed group at the current token
    fn group_args(&mut self) -> Vec<Arg> {
        let open = self.pos;
        let close = self.matching[open];
        let saved_end = self.end;
        self.end = close;
        self.pos = open + 1;

        let mut args = Vec::new();
        loop {
            self.skip_newlines();
            if self.tok().is_none() {
                break;
            }
            if self.tok().is_some_and(|t| t.is_punct(",")) {
                self.pos += 1;
                continue;
            }
            let before = self.pos;
            args.push(self.arg(true));
            if self.pos == before {
                self.pos += 1;
            }
        }

        self.end = saved_end;
        self.pos = close + 1;
        args
    }

    fn command_args(&mut self) -> Vec<Arg> {
        let mut args = Vec::new();
        loop {
            let before = self.pos;
            args.push(self.arg(false));
            if self.pos == before {
                break;
            }
            if self.tok().is_some_and(|t| t.is_punct(",")) {
                self.pos += 1;
                self.skip_newlines();
                continue;
            }
            break;
        }
        args
    }

    fn arg(&mut self, group: bool) -> Arg {
        let location = self.location_at(self.pos);
        let key = self.tok().and_then(|t| match &t.kind {
            TokenKind::Ident(name) => Some(name.clone()),
            TokenKind::Str {
                value,
                interpolated: false,
            } => Some(value.clone()),
            _ => None,
        });
        let is_named = key.is_some() && self.tok_at(self.pos + 1).is_some_and(|t| t.is_punct(":"));
        if is_named {
            self.pos += 2;
            if group {
                self.skip_newlines();
            }
            return Arg {
                name: key,
                value: self.expr(group),
                location,
            };
        }
        Arg {
            name: None,
            value: self.expr(group),
            location,
        }
    }

    fn expr(&mut self, group: bool) -> Expr {
        if group {
            self.skip_newlines();
        }
        let start = self.pos;
        let location = self.location_at(start);
        let kind = self.primary();
        let kind = if self.at_expr_end(group) {
            kind
        } else {
            while !self.at_expr_end(group) {
                self.skip_token();
            }
            ExprKind::Other
        };
        let mut text = self.slice(start, self.pos);
        if group {
            text = text.trim_end().to_string();
        }
        Expr {
            kind,
            text,
            location,
        }
    }

    fn primary(&mut self) -> ExprKind {
        let Some(token) = self.tok().cloned() else {
            return ExprKind::Other;
        };
        match &token.kind {
            TokenKind::Str {
                value,
                interpolated,
            } => {
                self.pos += 1;
                if *interpolated {
                    ExprKind::GString
                } else {
                    ExprKind::Str(value.clone())
                }
            }
            TokenKind::Number(n) => {
                self.pos += 1;
                ExprKind::Number(n.clone())
            }
            TokenKind::Punct("-") => match self.tok_at(self.pos + 1).map(|t| &t.kind) {
                Some(TokenKind::Number(n)) => {
                    let n = format!("-{n}");
                    self.pos += 2;
                    ExprKind::Number(n)
                }
                _ => {
                    self.pos += 1;
                    ExprKind::Other
                }
            },
            TokenKind::Ident(name) => {
                let location = self.location_at(self.pos);
                self.pos += 1;
                match name.as_str() {
                    "true" => return ExprKind::Bool(true),
                    "false" => return ExprKind::Bool(false),
                    "null" => return ExprKind::Null,
                    _ => {}
                }
                match self.tok() {
                    Some(t) if t.is_punct("(") => {
                        ExprKind::Call(Box::new(self.paren_call(name.clone(), location)))
                    }
                    Some(t) if t.is_punct("{") => {
                        let closure = self.closure();
                        ExprKind::Call(Box::new(Call {
                            name: name.clone(),
                            args: Vec::new(),
                            closure: Some(closure),
                            parenthesized: false,
                            location,
                        }))
                    }
                    _ => ExprKind::Ident(name.clone()),
                }
            }
            TokenKind::Punct("[") => self.list_or_map(),
            TokenKind::Punct("{") => ExprKind::Closure(self.closure()),
            _ => {
                self.skip_token();
                ExprKind::Other
            }
        }
    }

    fn list_or_map(&mut self) -> ExprKind {
        let open = self.pos;
        let close = self.matching[open];
        let empty_map = close == open + 2 && self.tokens[open + 1].is_punct(":");
        if empty_map {
            self.pos = close + 1;
            return ExprKind::Map(Vec::new());
        }
        let args = self.group_args();
        if args.iter().all(|a| a.name.is_some()) && !args.is_empty() {
            ExprKind::Map(args)
        } else if args.iter().all(|a| a.name.is_none()) {
            ExprKind::List(args.into_iter().map(|a| a.value).collect())
        } else {
            ExprKind::Other
        }
    }

    /// Parses a closure with the current token at `{`
    fn closure(&mut self) -> Closure {
        let open = self.pos;
        let close = self.matching[open];
        let location = self.location_at(open);
        let raw = self.src[self.tokens[open].end..self.tokens[close].start].to_string();

        let saved_end = self.end;
        self.end = close;
        self.pos = open + 1;

        let arrow = self.find_arrow(open + 1, close);
        if let Some(arrow) = arrow {
            self.pos = arrow + 1;
        }
        let statements = self.statements();

        self.end = saved_end;
        self.pos = close + 1;
        Closure {
            raw,
            statements,
            has_params: arrow.is_some(),
            location,
        }
    }

    /// Finds a `->` on the first line of a closure body
    fn find_arrow(&self, from: usize, to: usize) -> Option<usize> {
        let mut idx = from;
        while idx < to {
            let token = &self.tokens[idx];
            if token.is_punct("->") {
                return Some(idx);
            }
            if token.kind == TokenKind::Newline && idx > from {
                return None;
            }
            let jump = self.matching[idx];
            idx = if jump != NO_MATCH && jump > idx { jump + 1 } else { idx + 1 };
        }
        None
    }
}

/// Returns true if the token can start a command-style argument
fn starts_argument(token: &Token) -> bool {
    match &token.kind {
        TokenKind::Ident(_) | TokenKind::Str { .. } | TokenKind::Number(_) => true,
        TokenKind::Punct(p) => matches!(*p, "[" | "-" | "!" | "{"),
        _ => false,
    }
}

impl Call {
    /// Returns true if every argument is named
    #[must_use]
    pub fn all_named(&self) -> bool {
        self.args.iter().all(|a| a.name.is_some())
    }

    /// Returns true if named and unnamed arguments are mixed
    #[must_use]
    pub fn mixed_args(&self) -> bool {
        let named = self.args.iter().filter(|a| a.name.is_some()).count();
        named > 0 && named < self.args.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::lexer::tokenize;

    fn parse(src: &str) -> Vec<Statement> {
        let tokens = tokenize(src).unwrap();
        read(src, &tokens).unwrap()
    }

    fn call(stmt: &Statement) -> &Call {
        match &stmt.kind {
            StatementKind::Call(call) => call,
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_command_call() {
        let stmts = parse("echo 'hi'\nsh script: 'make', returnStdout: true\n");
        assert_eq!(stmts.len(), 2);
        let echo = call(&stmts[0]);
        assert_eq!(echo.name, "echo");
        assert_eq!(echo.args[0].value.kind, ExprKind::Str("hi".into()));
        let sh = call(&stmts[1]);
        assert!(sh.all_named());
        assert_eq!(sh.args[1].value.kind, ExprKind::Bool(true));
    }

    #[test]
    fn test_paren_call_with_closure() {
        let stmts = parse("timeout(time: 5, unit: 'MINUTES') {\n    sh 'make'\n}");
        let timeout = call(&stmts[0]);
        assert!(timeout.parenthesized);
        let closure = timeout.closure.as_ref().unwrap();
        assert_eq!(closure.statements.len(), 1);
        assert_eq!(call(&closure.statements[0]).name, "sh");
    }

    #[test]
    fn test_assignment_keeps_expression_text() {
        let stmts = parse("FOO = \"${BAR}-x\"\nBAZ = env.X + 1\n");
        match &stmts[0].kind {
            StatementKind::Assignment { target, value } => {
                assert_eq!(target, "FOO");
                assert_eq!(value.kind, ExprKind::GString);
                assert_eq!(value.text, "\"${BAR}-x\"");
            }
            other => panic!("unexpected {other:?}"),
        }
        match &stmts[1].kind {
            StatementKind::Assignment { value, .. } => {
                assert_eq!(value.kind, ExprKind::Other);
                assert_eq!(value.text, "env.X + 1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_closure_raw_text() {
        let src = "script {\n    def x = [a: 1]\n    echo \"${x.a}\"\n}";
        let stmts = parse(src);
        let script = call(&stmts[0]);
        assert_eq!(
            script.closure.as_ref().unwrap().raw,
            "\n    def x = [a: 1]\n    echo \"${x.a}\"\n"
        );
    }

    #[test]
    fn test_command_args_with_closures() {
        let stmts = parse("parallel a: {\n echo 'a'\n}, b: {\n echo 'b'\n}\n");
        let parallel = call(&stmts[0]);
        assert_eq!(parallel.args.len(), 2);
        assert!(matches!(parallel.args[0].value.kind, ExprKind::Closure(_)));
        assert_eq!(parallel.args[1].name.as_deref(), Some("b"));
    }

    #[test]
    fn test_method_chain_is_other() {
        let stmts = parse("foo().bar()\nx\n    .y()\n");
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].kind, StatementKind::Other);
        assert_eq!(stmts[1].kind, StatementKind::Other);
    }

    #[test]
    fn test_list_and_map_arguments() {
        let stmts = parse("values('a', 'b')\nfoo([1, 2], [k: 'v'], [:])\n");
        let foo = call(&stmts[1]);
        assert!(matches!(&foo.args[0].value.kind, ExprKind::List(items) if items.len() == 2));
        assert!(matches!(&foo.args[1].value.kind, ExprKind::Map(items) if items.len() == 1));
        assert!(matches!(&foo.args[2].value.kind, ExprKind::Map(items) if items.is_empty()));
    }

    #[test]
    fn test_closure_params_detected() {
        let stmts = parse("each { item ->\n echo item\n}");
        let closure = call(&stmts[0]).closure.clone().unwrap();
        assert!(closure.has_params);
        assert_eq!(closure.statements.len(), 1);
    }

    #[test]
    fn test_unbalanced_brackets() {
        let src = "pipeline {\n stages {\n}";
        let tokens = tokenize(src).unwrap();
        let err = read(src, &tokens).unwrap_err();
        assert_eq!(err.message, "Unclosed '{'");
        assert_eq!((err.line, err.column), (1, 10));

        let src = "a )";
        let tokens = tokenize(src).unwrap();
        assert_eq!(read(src, &tokens).unwrap_err().message, "Unexpected ')'");
    }
}
