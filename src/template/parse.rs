//! Parser turning lexed tokens into a small template tree.

use super::funcs;
use super::lexer::{Token, TokenKind, lex};
use std::fmt;

/// A node of the parsed template.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Action(Pipeline),
    If(IfNode),
}

/// `{{ if pipeline }} then {{ else }} otherwise {{ end }}`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct IfNode {
    pub condition: Pipeline,
    pub then: Vec<Node>,
    pub otherwise: Vec<Node>,
}

/// Commands joined by `|`; each result feeds the next command.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pipeline {
    pub pos: usize,
    pub commands: Vec<Command>,
}

/// One command: a function call or a single operand.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Command {
    pub pos: usize,
    pub args: Vec<Operand>,
}

/// A term inside a command.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Field { pos: usize, path: Vec<String> },
    Dot { pos: usize },
    Function { pos: usize, name: String },
    Str { pos: usize, value: String },
    Int { pos: usize, value: i64 },
    Bool { pos: usize, value: bool },
    Nested(Box<Pipeline>),
}

impl Operand {
    pub const fn pos(&self) -> usize {
        match self {
            Self::Field { pos, .. }
            | Self::Dot { pos }
            | Self::Function { pos, .. }
            | Self::Str { pos, .. }
            | Self::Int { pos, .. }
            | Self::Bool { pos, .. } => *pos,
            Self::Nested(pipeline) => pipeline.pos,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field { path, .. } => {
                for segment in path {
                    write!(f, ".{segment}")?;
                }
                Ok(())
            }
            Self::Dot { .. } => f.write_str("."),
            Self::Function { name, .. } => f.write_str(name),
            Self::Str { value, .. } => write!(f, "{value:?}"),
            Self::Int { value, .. } => write!(f, "{value}"),
            Self::Bool { value, .. } => write!(f, "{value}"),
            Self::Nested(pipeline) => write!(f, "({pipeline})"),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words: Vec<String> = self.args.iter().map(ToString::to_string).collect();
        f.write_str(&words.join(" "))
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let commands: Vec<String> = self.commands.iter().map(ToString::to_string).collect();
        f.write_str(&commands.join(" | "))
    }
}

/// A parse failure: the 1-based line and the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParseFailure {
    pub line: usize,
    pub message: String,
}

type ParseResult<T> = Result<T, ParseFailure>;

/// How a list of nodes ended.
enum ListEnd {
    End,
    Else,
    ElseIf,
    Eof,
}

/// Parses `source` into a node list.
pub(crate) fn parse(source: &str) -> ParseResult<Vec<Node>> {
    let mut parser = Parser {
        tokens: lex(source),
        index: 0,
    };
    let (nodes, end) = parser.parse_list()?;
    match end {
        ListEnd::Eof => Ok(nodes),
        ListEnd::End => Err(parser.failure("unexpected {{end}}")),
        ListEnd::Else | ListEnd::ElseIf => Err(parser.failure("unexpected {{else}}")),
    }
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
}

impl Parser {
    fn eof_token(&self) -> Token {
        let pos = self.tokens.last().map_or(0, |token| token.pos);
        let line = self.tokens.last().map_or(1, |token| token.line);
        Token {
            kind: TokenKind::Eof,
            pos,
            line,
            text: String::new(),
        }
    }

    fn peek(&self) -> Token {
        self.tokens
            .get(self.index)
            .cloned()
            .unwrap_or_else(|| self.eof_token())
    }

    fn next(&mut self) -> Token {
        let token = self.peek();
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    const fn backup(&mut self) {
        self.index = self.index.saturating_sub(1);
    }

    fn next_non_space(&mut self) -> Token {
        loop {
            let token = self.next();
            if token.kind != TokenKind::Space {
                return token;
            }
        }
    }

    fn peek_non_space(&mut self) -> Token {
        let token = self.next_non_space();
        self.backup();
        token
    }

    fn current_line(&self) -> usize {
        self.tokens
            .get(self.index.saturating_sub(1))
            .map_or(1, |token| token.line)
    }

    fn failure(&self, message: impl Into<String>) -> ParseFailure {
        ParseFailure {
            line: self.current_line(),
            message: message.into(),
        }
    }

    fn unexpected(&self, token: &Token, context: &str) -> ParseFailure {
        if token.kind == TokenKind::Error {
            return self.failure(token.text.clone());
        }
        self.failure(format!("unexpected {} in {context}", token.describe()))
    }

    fn parse_list(&mut self) -> ParseResult<(Vec<Node>, ListEnd)> {
        let mut nodes = Vec::new();
        loop {
            let token = self.next();
            match token.kind {
                TokenKind::Text => nodes.push(Node::Text(token.text)),
                TokenKind::LeftDelim => {
                    if let Some(end) = self.parse_action(&mut nodes)? {
                        return Ok((nodes, end));
                    }
                }
                TokenKind::Eof => return Ok((nodes, ListEnd::Eof)),
                TokenKind::Error => return Err(self.failure(token.text)),
                _ => return Err(self.unexpected(&token, "input")),
            }
        }
    }

    /// Parses the inside of an action. Returns `Some` for list terminators.
    fn parse_action(&mut self, nodes: &mut Vec<Node>) -> ParseResult<Option<ListEnd>> {
        let token = self.peek_non_space();
        match token.kind {
            TokenKind::End => {
                self.next_non_space();
                self.expect_right_delim("end")?;
                Ok(Some(ListEnd::End))
            }
            TokenKind::Else => {
                self.next_non_space();
                if self.peek_non_space().kind == TokenKind::If {
                    return Ok(Some(ListEnd::ElseIf));
                }
                self.expect_right_delim("else")?;
                Ok(Some(ListEnd::Else))
            }
            TokenKind::If => {
                self.next_non_space();
                nodes.push(Node::If(self.parse_if()?));
                Ok(None)
            }
            _ => {
                let pipeline = self.parse_pipeline("command", TokenKind::RightDelim)?;
                nodes.push(Node::Action(pipeline));
                Ok(None)
            }
        }
    }

    fn expect_right_delim(&mut self, context: &str) -> ParseResult<()> {
        let token = self.next_non_space();
        if token.kind == TokenKind::RightDelim {
            return Ok(());
        }
        Err(self.unexpected(&token, context))
    }

    /// Parses from after `if` up to and including the matching `{{end}}`.
    fn parse_if(&mut self) -> ParseResult<IfNode> {
        let condition = self.parse_pipeline("if", TokenKind::RightDelim)?;
        let (then, end) = self.parse_list()?;
        let otherwise = match end {
            ListEnd::End => Vec::new(),
            ListEnd::Else => {
                let (else_nodes, else_end) = self.parse_list()?;
                match else_end {
                    ListEnd::End => else_nodes,
                    ListEnd::Eof => return Err(self.failure("unexpected EOF")),
                    ListEnd::Else | ListEnd::ElseIf => {
                        return Err(self.failure("expected end; found {{else}}"));
                    }
                }
            }
            ListEnd::ElseIf => {
                self.next_non_space();
                vec![Node::If(self.parse_if()?)]
            }
            ListEnd::Eof => return Err(self.failure("unexpected EOF")),
        };
        Ok(IfNode {
            condition,
            then,
            otherwise,
        })
    }

    fn parse_pipeline(&mut self, context: &str, end: TokenKind) -> ParseResult<Pipeline> {
        let pos = self.peek_non_space().pos;
        let mut commands = Vec::new();
        loop {
            let token = self.next_non_space();
            match token.kind {
                kind if kind == end => {
                    if commands.is_empty() {
                        return Err(self.failure(format!("missing value for {context}")));
                    }
                    return Ok(Pipeline { pos, commands });
                }
                TokenKind::Field
                | TokenKind::Dot
                | TokenKind::Identifier
                | TokenKind::Bool
                | TokenKind::Number
                | TokenKind::String
                | TokenKind::RawString
                | TokenKind::LeftParen => {
                    self.backup();
                    commands.push(self.parse_command()?);
                }
                _ => return Err(self.unexpected(&token, context)),
            }
        }
    }

    fn parse_command(&mut self) -> ParseResult<Command> {
        let pos = self.peek_non_space().pos;
        let mut args = Vec::new();
        loop {
            self.peek_non_space();
            if let Some(operand) = self.parse_operand()? {
                args.push(operand);
            }
            let token = self.next();
            match token.kind {
                TokenKind::Space => {}
                TokenKind::RightDelim | TokenKind::RightParen => {
                    self.backup();
                    break;
                }
                TokenKind::Pipe => break,
                _ => return Err(self.unexpected(&token, "operand")),
            }
        }
        if args.is_empty() {
            return Err(self.failure("empty command"));
        }
        Ok(Command { pos, args })
    }

    fn parse_operand(&mut self) -> ParseResult<Option<Operand>> {
        let token = self.next();
        let operand = match token.kind {
            TokenKind::Identifier => {
                if !funcs::exists(&token.text) {
                    return Err(self.failure(format!("function {:?} not defined", token.text)));
                }
                Operand::Function {
                    pos: token.pos,
                    name: token.text,
                }
            }
            TokenKind::Dot => Operand::Dot { pos: token.pos },
            TokenKind::Field => return Ok(Some(self.parse_field_chain(&token))),
            TokenKind::Bool => Operand::Bool {
                pos: token.pos,
                value: token.text == "true",
            },
            TokenKind::Number => {
                let value = token
                    .text
                    .parse::<i64>()
                    .map_err(|_| self.failure(format!("illegal number syntax: {:?}", token.text)))?;
                Operand::Int {
                    pos: token.pos,
                    value,
                }
            }
            TokenKind::String => Operand::Str {
                pos: token.pos,
                value: unquote(&token.text).map_err(|message| self.failure(message))?,
            },
            TokenKind::RawString => Operand::Str {
                pos: token.pos,
                value: token.text.trim_matches('`').to_owned(),
            },
            TokenKind::LeftParen => {
                let pipeline = self.parse_pipeline("parenthesized pipeline", TokenKind::RightParen)?;
                Operand::Nested(Box::new(pipeline))
            }
            _ => {
                self.backup();
                return Ok(None);
            }
        };
        Ok(Some(operand))
    }

    /// Folds `.A.B.C` into one field operand positioned at its first chained segment.
    fn parse_field_chain(&mut self, first: &Token) -> Operand {
        let mut path = vec![first.text.trim_start_matches('.').to_owned()];
        let mut pos = first.pos;
        if self.peek().kind == TokenKind::Field {
            pos = self.peek().pos;
        }
        while self.peek().kind == TokenKind::Field {
            let segment = self.next();
            path.push(segment.text.trim_start_matches('.').to_owned());
        }
        Operand::Field { pos, path }
    }
}

/// Interprets the escapes of a double-quoted string literal.
fn unquote(quoted: &str) -> Result<String, String> {
    let inner = quoted
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .ok_or_else(|| format!("bad string syntax: {quoted}"))?;
    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            value.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => value.push('\n'),
            Some('t') => value.push('\t'),
            Some('r') => value.push('\r'),
            Some('\\') => value.push('\\'),
            Some('"') => value.push('"'),
            _ => return Err(format!("invalid syntax: {quoted}")),
        }
    }
    Ok(value)
}
