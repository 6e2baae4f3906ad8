// SPDX-License-Identifier: Apache-2.0

//! Source parser for the modeling language.
//!
//! Turns model or query text into a list of [`Statement`]s. Name resolution
//! happens later, in [`crate::model::Environment`]; the parser only checks
//! shape. Every error carries the 1-based line and column it was found at.

use thiserror::Error;

use crate::model::types::{Aggregate, DataType, Literal};

#[derive(Debug, Clone, PartialEq, Error)]
#[error("line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }

    pub(crate) fn at(path: &Path, message: impl Into<String>) -> Self {
        Self::new(path.line, path.column, message)
    }
}

// ==================== Syntax Tree ====================

/// Dotted identifier as written in source, e.g. `orders.amount`.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub parts: Vec<String>,
    pub line: usize,
    pub column: usize,
}

impl Path {
    pub fn dotted(&self) -> String {
        self.parts.join(".")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl Comparison {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::NotEq => "!=",
            Comparison::Lt => "<",
            Comparison::LtEq => "<=",
            Comparison::Gt => ">",
            Comparison::GtEq => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub concept: Path,
    pub op: Comparison,
    pub value: Literal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub items: Vec<Path>,
    pub filters: Vec<Filter>,
    pub order_by: Vec<(Path, Direction)>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceSpec {
    Address(Vec<String>),
    Query(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Key {
        name: Path,
        datatype: DataType,
    },
    Property {
        key: Path,
        name: Path,
        datatype: DataType,
    },
    Metric {
        name: Path,
        function: Aggregate,
        input: Path,
    },
    Const {
        name: Path,
        value: Literal,
    },
    Datasource {
        name: Path,
        columns: Vec<(String, Path)>,
        source: SourceSpec,
    },
    Select(SelectStatement),
}

// ==================== Tokenizer ====================

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Semicolon,
    Comma,
    LParen,
    RParen,
    Colon,
    Dot,
    Arrow,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("'{name}'"),
            TokenKind::Int(i) => i.to_string(),
            TokenKind::Float(f) => f.to_string(),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Semicolon => "';'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::Colon => "':'".to_string(),
            TokenKind::Dot => "'.'".to_string(),
            TokenKind::Arrow => "'<-'".to_string(),
            TokenKind::Eq => "'='".to_string(),
            TokenKind::NotEq => "'!='".to_string(),
            TokenKind::Lt => "'<'".to_string(),
            TokenKind::LtEq => "'<='".to_string(),
            TokenKind::Gt => "'>'".to_string(),
            TokenKind::GtEq => "'>='".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    line: usize,
    column: usize,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next()
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.bump() {
            if c == '\n' {
                break;
            }
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();

        while let Some(c) = self.peek() {
            let (line, column) = (self.line, self.column);

            if c.is_whitespace() {
                self.bump();
                continue;
            }
            if c == '#' || (c == '/' && self.peek_second() == Some('/')) {
                self.skip_line();
                continue;
            }

            let kind = if c.is_ascii_alphabetic() || c == '_' {
                TokenKind::Ident(self.take_while(|c| c.is_ascii_alphanumeric() || c == '_'))
            } else if c.is_ascii_digit()
                || (c == '-' && self.peek_second().is_some_and(|d| d.is_ascii_digit()))
            {
                self.number(line, column)?
            } else if c == '\'' || c == '"' {
                TokenKind::Str(self.string(c, line, column)?)
            } else {
                self.bump();
                match (c, self.peek()) {
                    (';', _) => TokenKind::Semicolon,
                    (',', _) => TokenKind::Comma,
                    ('(', _) => TokenKind::LParen,
                    (')', _) => TokenKind::RParen,
                    (':', _) => TokenKind::Colon,
                    ('.', _) => TokenKind::Dot,
                    ('=', _) => TokenKind::Eq,
                    ('<', Some('-')) => {
                        self.bump();
                        TokenKind::Arrow
                    }
                    ('<', Some('=')) => {
                        self.bump();
                        TokenKind::LtEq
                    }
                    ('<', _) => TokenKind::Lt,
                    ('>', Some('=')) => {
                        self.bump();
                        TokenKind::GtEq
                    }
                    ('>', _) => TokenKind::Gt,
                    ('!', Some('=')) => {
                        self.bump();
                        TokenKind::NotEq
                    }
                    (other, _) => {
                        return Err(ParseError::new(
                            line,
                            column,
                            format!("unexpected character '{other}'"),
                        ))
                    }
                }
            };

            tokens.push(Token { kind, line, column });
        }

        Ok(tokens)
    }

    fn take_while(&mut self, keep: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !keep(c) {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }

    fn number(&mut self, line: usize, column: usize) -> Result<TokenKind, ParseError> {
        let mut raw = String::new();
        if self.peek() == Some('-') {
            raw.push('-');
            self.bump();
        }
        raw.push_str(&self.take_while(|c| c.is_ascii_digit()));

        let is_float = self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit());
        if is_float {
            raw.push('.');
            self.bump();
            raw.push_str(&self.take_while(|c| c.is_ascii_digit()));
            raw.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|e| ParseError::new(line, column, format!("invalid number '{raw}': {e}")))
        } else {
            raw.parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|e| ParseError::new(line, column, format!("invalid number '{raw}': {e}")))
        }
    }

    /// Reads a quoted string. Three opening quotes start a raw block that
    /// runs to the matching three closing quotes.
    fn string(&mut self, quote: char, line: usize, column: usize) -> Result<String, ParseError> {
        self.bump();
        let triple = self.peek() == Some(quote) && self.peek_second() == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }

        let mut out = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(ParseError::new(line, column, "unterminated string literal"));
            };
            if c == quote {
                if !triple {
                    return Ok(out);
                }
                if self.peek() == Some(quote) && self.peek_second() == Some(quote) {
                    self.bump();
                    self.bump();
                    return Ok(out);
                }
            } else if c == '\\' && !triple {
                match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(other) => out.push(other),
                    None => {
                        return Err(ParseError::new(line, column, "unterminated string literal"))
                    }
                }
                continue;
            }
            if c != quote || triple {
                out.push(c);
            }
        }
    }
}

// ==================== Parser ====================

/// Parses source text into statements, in source order.
pub fn parse_statements(text: &str) -> Result<Vec<Statement>, ParseError> {
    let tokens = Lexer::new(text).tokenize()?;
    let (end_line, end_column) = end_position(text);
    let mut parser = Parser {
        tokens,
        pos: 0,
        end_line,
        end_column,
    };

    let mut statements = Vec::new();
    while !parser.at_end() {
        statements.push(parser.statement()?);
    }
    Ok(statements)
}

fn end_position(text: &str) -> (usize, usize) {
    let line = text.matches('\n').count() + 1;
    let column = text.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
    (line, column)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end_line: usize,
    end_column: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::new(token.line, token.column, message),
            None => ParseError::new(self.end_line, self.end_column, message),
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let found = self
            .peek()
            .map(|t| t.kind.describe())
            .unwrap_or_else(|| "end of input".to_string());
        self.error_here(format!("expected {expected}, found {found}"))
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek().is_some_and(|t| &t.kind == kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.unexpected(&kind.describe()))
        }
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token { kind: TokenKind::Ident(name), .. }) if name.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.check_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{keyword}'")))
        }
    }

    fn ident(&mut self) -> Result<(String, usize, usize), ParseError> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Ident(name),
                line,
                column,
            }) => {
                let out = (name.clone(), *line, *column);
                self.pos += 1;
                Ok(out)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn path(&mut self) -> Result<Path, ParseError> {
        let (first, line, column) = self.ident()?;
        let mut parts = vec![first];
        while self.eat(&TokenKind::Dot) {
            parts.push(self.ident()?.0);
        }
        Ok(Path { parts, line, column })
    }

    fn simple_name(&mut self) -> Result<Path, ParseError> {
        let (name, line, column) = self.ident()?;
        Ok(Path {
            parts: vec![name],
            line,
            column,
        })
    }

    fn datatype(&mut self) -> Result<DataType, ParseError> {
        let location = self.error_here("");
        let (name, _, _) = self.ident().map_err(|_| self.unexpected("a type"))?;
        name.parse::<DataType>()
            .map_err(|message| ParseError::new(location.line, location.column, message))
    }

    fn literal(&mut self) -> Result<Literal, ParseError> {
        let literal = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Int(i)) => Literal::Int(*i),
            Some(TokenKind::Float(f)) => Literal::Float(*f),
            Some(TokenKind::Str(s)) => Literal::String(s.clone()),
            Some(TokenKind::Ident(name)) if name.eq_ignore_ascii_case("true") => Literal::Bool(true),
            Some(TokenKind::Ident(name)) if name.eq_ignore_ascii_case("false") => Literal::Bool(false),
            _ => return Err(self.unexpected("a literal")),
        };
        self.pos += 1;
        Ok(literal)
    }

    fn statement(&mut self) -> Result<Statement, ParseError> {
        let statement = if self.eat_keyword("key") {
            let name = self.simple_name()?;
            let datatype = self.datatype()?;
            Statement::Key { name, datatype }
        } else if self.eat_keyword("property") {
            let mut full = self.path()?;
            if full.parts.len() < 2 {
                return Err(ParseError::at(
                    &full,
                    "property must be declared as <key>.<name>",
                ));
            }
            let name_part = full.parts.pop().unwrap_or_default();
            let name = Path {
                parts: vec![name_part],
                line: full.line,
                column: full.column,
            };
            let datatype = self.datatype()?;
            Statement::Property {
                key: full,
                name,
                datatype,
            }
        } else if self.eat_keyword("metric") {
            let name = self.simple_name()?;
            self.expect(TokenKind::Arrow)?;
            let (function_name, line, column) = self.ident()?;
            let function = Aggregate::parse(&function_name).ok_or_else(|| {
                ParseError::new(
                    line,
                    column,
                    format!("unknown aggregate '{function_name}'"),
                )
            })?;
            self.expect(TokenKind::LParen)?;
            let input = self.path()?;
            self.expect(TokenKind::RParen)?;
            Statement::Metric {
                name,
                function,
                input,
            }
        } else if self.eat_keyword("const") {
            let name = self.simple_name()?;
            self.expect(TokenKind::Arrow)?;
            let value = self.literal()?;
            Statement::Const { name, value }
        } else if self.eat_keyword("datasource") {
            self.datasource()?
        } else if self.eat_keyword("select") {
            Statement::Select(self.select()?)
        } else {
            return Err(self.unexpected("a statement"));
        };

        self.expect(TokenKind::Semicolon)?;
        Ok(statement)
    }

    fn datasource(&mut self) -> Result<Statement, ParseError> {
        let name = self.simple_name()?;
        self.expect(TokenKind::LParen)?;

        let mut columns = Vec::new();
        while !self.check(&TokenKind::RParen) {
            let column = match self.peek().map(|t| t.kind.clone()) {
                Some(TokenKind::Ident(column) | TokenKind::Str(column)) => column,
                _ => return Err(self.unexpected("column name")),
            };
            self.pos += 1;
            self.expect(TokenKind::Colon)?;
            columns.push((column, self.path()?));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;

        if columns.is_empty() {
            return Err(ParseError::at(&name, "datasource must bind at least one column"));
        }

        let source = if self.eat_keyword("address") {
            SourceSpec::Address(self.path()?.parts)
        } else if self.eat_keyword("query") {
            match self.peek().map(|t| t.kind.clone()) {
                Some(TokenKind::Str(sql)) => {
                    self.pos += 1;
                    SourceSpec::Query(sql)
                }
                _ => return Err(self.unexpected("query string")),
            }
        } else {
            return Err(self.unexpected("'address' or 'query'"));
        };

        Ok(Statement::Datasource {
            name,
            columns,
            source,
        })
    }

    fn select(&mut self) -> Result<SelectStatement, ParseError> {
        let mut items = vec![self.path()?];
        while self.eat(&TokenKind::Comma) {
            items.push(self.path()?);
        }

        let mut filters = Vec::new();
        if self.eat_keyword("where") {
            loop {
                let concept = self.path()?;
                let op = match self.peek().map(|t| t.kind.clone()) {
                    Some(TokenKind::Eq) => Comparison::Eq,
                    Some(TokenKind::NotEq) => Comparison::NotEq,
                    Some(TokenKind::Lt) => Comparison::Lt,
                    Some(TokenKind::LtEq) => Comparison::LtEq,
                    Some(TokenKind::Gt) => Comparison::Gt,
                    Some(TokenKind::GtEq) => Comparison::GtEq,
                    _ => return Err(self.unexpected("comparison operator")),
                };
                self.pos += 1;
                let value = self.literal()?;
                filters.push(Filter { concept, op, value });
                if !self.eat_keyword("and") {
                    break;
                }
            }
        }

        let mut order_by = Vec::new();
        if self.eat_keyword("order") {
            self.expect_keyword("by")?;
            loop {
                let concept = self.path()?;
                let direction = if self.eat_keyword("desc") {
                    Direction::Desc
                } else {
                    self.eat_keyword("asc");
                    Direction::Asc
                };
                order_by.push((concept, direction));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }

        let limit = if self.eat_keyword("limit") {
            match self.peek().map(|t| t.kind.clone()) {
                Some(TokenKind::Int(n)) if n >= 0 => {
                    self.pos += 1;
                    Some(n as u64)
                }
                _ => return Err(self.unexpected("a non-negative limit")),
            }
        } else {
            None
        };

        Ok(SelectStatement {
            items,
            filters,
            order_by,
            limit,
        })
    }
}
