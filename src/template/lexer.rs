//! Tokeniser for release templates.
//!
//! Splits a template into literal text and the tokens inside `{{ ... }}`
//! actions. Positions are byte offsets into the whole template so that
//! execution errors can report `line:column` the same way the Go template
//! package does.

const LEFT_DELIM: &str = "{{";
const RIGHT_DELIM: &str = "}}";
const LEFT_TRIM: &str = "{{- ";
const RIGHT_TRIM: &str = " -}}";
const COMMENT_OPEN: &str = "/*";
const COMMENT_CLOSE: &str = "*/";

/// Kind of a lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Text,
    LeftDelim,
    RightDelim,
    Space,
    Field,
    Dot,
    Identifier,
    Bool,
    Number,
    String,
    RawString,
    Pipe,
    LeftParen,
    RightParen,
    Char,
    If,
    Else,
    End,
    Eof,
    Error,
}

impl TokenKind {
    const fn is_keyword(self) -> bool {
        matches!(self, Self::If | Self::Else | Self::End)
    }
}

/// A lexed token with its byte offset and 1-based line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub pos: usize,
    pub line: usize,
    pub text: String,
}

impl Token {
    /// Renders the token the way parse errors quote it.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "EOF".to_owned(),
            TokenKind::Error => self.text.clone(),
            kind if kind.is_keyword() => format!("<{}>", self.text),
            _ if self.text.chars().count() > 10 => {
                let head: String = self.text.chars().take(10).collect();
                format!("{head:?}...")
            }
            _ => format!("{:?}", self.text),
        }
    }
}

/// Lexes `source` into tokens. The final token is always `Eof` or `Error`.
pub(crate) fn lex(source: &str) -> Vec<Token> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    source: &'a str,
    cursor: usize,
    paren_depth: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    const fn new(source: &'a str) -> Self {
        Self {
            source,
            cursor: 0,
            paren_depth: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Token> {
        loop {
            if !self.lex_text() {
                break;
            }
            if !self.lex_action() {
                break;
            }
        }
        self.tokens
    }

    fn rest(&self) -> &'a str {
        self.source.get(self.cursor..).unwrap_or_default()
    }

    fn line_at(&self, pos: usize) -> usize {
        let prefix = self.source.get(..pos).unwrap_or(self.source);
        1 + prefix.matches('\n').count()
    }

    fn emit(&mut self, kind: TokenKind, pos: usize, text: &str) {
        let line = self.line_at(pos);
        self.tokens.push(Token {
            kind,
            pos,
            line,
            text: text.to_owned(),
        });
    }

    fn emit_error(&mut self, message: impl Into<String>) {
        let pos = self.cursor;
        self.tokens.push(Token {
            kind: TokenKind::Error,
            pos,
            line: self.line_at(pos),
            text: message.into(),
        });
    }

    /// Emits literal text up to the next action. Returns `false` at end of input.
    fn lex_text(&mut self) -> bool {
        let rest = self.rest();
        let Some(offset) = rest.find(LEFT_DELIM) else {
            if !rest.is_empty() {
                self.emit(TokenKind::Text, self.cursor, rest);
            }
            self.cursor = self.source.len();
            self.emit(TokenKind::Eof, self.cursor, "");
            return false;
        };

        let mut text = rest.get(..offset).unwrap_or_default();
        let after = rest.get(offset..).unwrap_or_default();
        if has_left_trim(after) {
            text = text.trim_end();
        }
        if !text.is_empty() {
            self.emit(TokenKind::Text, self.cursor, text);
        }
        self.cursor += offset;
        true
    }

    /// Lexes one `{{ ... }}` action. Returns `false` once lexing must stop.
    fn lex_action(&mut self) -> bool {
        let trim_left = has_left_trim(self.rest());
        let mut inner = self.cursor + LEFT_DELIM.len();
        if trim_left {
            inner += 1;
        }

        let after_delim = self.source.get(inner..).unwrap_or_default();
        let after_space = after_delim.trim_start();
        if after_space.starts_with(COMMENT_OPEN) && (trim_left || after_space.len() == after_delim.len()) {
            self.cursor = inner + (after_delim.len() - after_space.len());
            return self.lex_comment();
        }

        self.emit(TokenKind::LeftDelim, self.cursor, LEFT_DELIM);
        self.cursor = inner;
        self.paren_depth = 0;
        self.lex_inside_action()
    }

    fn lex_comment(&mut self) -> bool {
        let rest = self.rest();
        let Some(close) = rest.find(COMMENT_CLOSE) else {
            self.emit_error("unclosed comment");
            return false;
        };
        self.cursor += close + COMMENT_CLOSE.len();
        let tail = self.rest();
        if tail.starts_with(RIGHT_DELIM) {
            self.cursor += RIGHT_DELIM.len();
            return true;
        }
        if tail.starts_with(RIGHT_TRIM) {
            self.cursor += RIGHT_TRIM.len();
            self.skip_trailing_space();
            return true;
        }
        self.emit_error("comment ends before closing delimiter");
        false
    }

    fn skip_trailing_space(&mut self) {
        let rest = self.rest();
        self.cursor += rest.len() - rest.trim_start().len();
    }

    fn at_right_delim(&self) -> Option<bool> {
        let rest = self.rest();
        if rest.starts_with(RIGHT_DELIM) {
            return Some(false);
        }
        let trimmed = rest.trim_start_matches([' ', '\t', '\r', '\n']);
        if trimmed.len() < rest.len() && trimmed.starts_with("-}}") {
            return Some(true);
        }
        None
    }

    fn lex_inside_action(&mut self) -> bool {
        loop {
            if let Some(trim_right) = self.at_right_delim() {
                if self.paren_depth > 0 {
                    self.emit_error("unclosed left paren");
                    return false;
                }
                if trim_right {
                    let rest = self.rest();
                    let spaces = rest.len() - rest.trim_start().len();
                    self.cursor += spaces;
                    self.emit(TokenKind::RightDelim, self.cursor, RIGHT_DELIM);
                    self.cursor += "-}}".len();
                    self.skip_trailing_space();
                } else {
                    self.emit(TokenKind::RightDelim, self.cursor, RIGHT_DELIM);
                    self.cursor += RIGHT_DELIM.len();
                }
                return true;
            }

            let Some(c) = self.rest().chars().next() else {
                self.emit_error("unclosed action");
                return false;
            };

            let keep_going = match c {
                _ if c.is_whitespace() => self.lex_space(),
                '|' => self.lex_single(TokenKind::Pipe, c),
                '(' => {
                    self.paren_depth += 1;
                    self.lex_single(TokenKind::LeftParen, c)
                }
                ')' => self.lex_right_paren(),
                '"' => self.lex_quote(),
                '`' => self.lex_raw_quote(),
                '.' => self.lex_dot_or_field(),
                _ if c.is_ascii_digit() => self.lex_number(),
                '-' | '+' if self.rest().chars().nth(1).is_some_and(|n| n.is_ascii_digit()) => {
                    self.lex_number()
                }
                _ if c == '_' || c.is_alphabetic() => self.lex_identifier(),
                _ if c.is_ascii() && !c.is_ascii_control() => self.lex_single(TokenKind::Char, c),
                _ => {
                    self.emit_error(format!(
                        "unrecognized character in action: U+{:04X} '{c}'",
                        u32::from(c)
                    ));
                    false
                }
            };
            if !keep_going {
                return false;
            }
        }
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> (usize, &'a str) {
        let start = self.cursor;
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|&(_, c)| !predicate(c))
            .map_or(rest.len(), |(index, _)| index);
        self.cursor += len;
        (start, rest.get(..len).unwrap_or_default())
    }

    fn lex_space(&mut self) -> bool {
        let (start, text) = self.take_while(char::is_whitespace);
        self.emit(TokenKind::Space, start, text);
        true
    }

    fn lex_single(&mut self, kind: TokenKind, c: char) -> bool {
        let start = self.cursor;
        self.cursor += c.len_utf8();
        self.emit(kind, start, &c.to_string());
        true
    }

    fn lex_right_paren(&mut self) -> bool {
        if self.paren_depth == 0 {
            self.emit_error("unexpected right paren");
            return false;
        }
        self.paren_depth -= 1;
        self.lex_single(TokenKind::RightParen, ')')
    }

    fn lex_quote(&mut self) -> bool {
        let start = self.cursor;
        let rest = self.rest();
        let mut escaped = false;
        for (index, c) in rest.char_indices().skip(1) {
            match c {
                '\n' => break,
                '\\' if !escaped => escaped = true,
                '"' if !escaped => {
                    let end = index + 1;
                    self.cursor += end;
                    self.emit(TokenKind::String, start, rest.get(..end).unwrap_or_default());
                    return true;
                }
                _ => escaped = false,
            }
        }
        self.emit_error("unterminated quoted string");
        false
    }

    fn lex_raw_quote(&mut self) -> bool {
        let start = self.cursor;
        let rest = self.rest();
        let Some(close) = rest.get(1..).and_then(|tail| tail.find('`')) else {
            self.emit_error("unterminated raw quoted string");
            return false;
        };
        let end = close + 2;
        self.cursor += end;
        self.emit(TokenKind::RawString, start, rest.get(..end).unwrap_or_default());
        true
    }

    fn lex_dot_or_field(&mut self) -> bool {
        let start = self.cursor;
        let rest = self.rest();
        let next = rest.chars().nth(1);
        if !next.is_some_and(is_identifier_char) {
            return self.lex_single(TokenKind::Dot, '.');
        }
        self.cursor += 1;
        let (_, name) = self.take_while(is_identifier_char);
        self.emit(TokenKind::Field, start, &format!(".{name}"));
        true
    }

    fn lex_number(&mut self) -> bool {
        let start = self.cursor;
        let rest = self.rest();
        let sign = usize::from(rest.starts_with(['-', '+']));
        self.cursor += sign;
        let (_, digits) = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        let text = rest.get(..sign + digits.len()).unwrap_or_default();
        self.emit(TokenKind::Number, start, text);
        true
    }

    fn lex_identifier(&mut self) -> bool {
        let (start, word) = self.take_while(is_identifier_char);
        let kind = match word {
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "end" => TokenKind::End,
            "true" | "false" => TokenKind::Bool,
            _ => TokenKind::Identifier,
        };
        self.emit(kind, start, word);
        true
    }
}

fn has_left_trim(text: &str) -> bool {
    text.starts_with(LEFT_TRIM)
        || ["{{-\t", "{{-\r", "{{-\n"]
            .iter()
            .any(|marker| text.starts_with(marker))
}

fn is_identifier_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).into_iter().map(|token| token.kind).collect()
    }

    #[test]
    fn splits_text_and_fields() {
        assert_eq!(
            kinds("a {{ .Env.FOO }} b"),
            vec![
                TokenKind::Text,
                TokenKind::LeftDelim,
                TokenKind::Space,
                TokenKind::Field,
                TokenKind::Field,
                TokenKind::Space,
                TokenKind::RightDelim,
                TokenKind::Text,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn field_positions_are_byte_offsets() {
        let tokens = lex("{{.Env.NOPE}}");
        let fields: Vec<_> = tokens
            .iter()
            .filter(|token| token.kind == TokenKind::Field)
            .map(|token| (token.text.as_str(), token.pos))
            .collect();
        assert_eq!(fields, vec![(".Env", 2), (".NOPE", 6)]);
    }

    #[test]
    fn lone_brace_is_a_char_token() {
        let tokens = lex("{{ .Pro }_checksums.txt");
        assert!(
            tokens
                .iter()
                .any(|token| token.kind == TokenKind::Char && token.text == "}")
        );
    }

    #[test]
    fn trim_markers_remove_surrounding_space() {
        let tokens = lex("a  {{- .X -}}  b");
        let texts: Vec<_> = tokens
            .iter()
            .filter(|token| token.kind == TokenKind::Text)
            .map(|token| token.text.as_str())
            .collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn comments_produce_no_tokens() {
        assert_eq!(
            kinds("x{{/* note */}}y"),
            vec![TokenKind::Text, TokenKind::Text, TokenKind::Eof]
        );
    }

    #[test]
    fn reports_unclosed_action() {
        let tokens = lex("{{ .X ");
        let last = tokens.last().expect("at least one token");
        assert_eq!(last.kind, TokenKind::Error);
        assert_eq!(last.text, "unclosed action");
    }

    #[test]
    fn reports_unterminated_string() {
        let tokens = lex(r#"{{ "abc }}"#);
        let last = tokens.last().expect("at least one token");
        assert_eq!(last.text, "unterminated quoted string");
    }

    #[test]
    fn describes_tokens_like_go() {
        let token = Token {
            kind: TokenKind::Char,
            pos: 0,
            line: 1,
            text: "}".to_owned(),
        };
        assert_eq!(token.describe(), r#""}""#);

        let keyword = Token {
            kind: TokenKind::End,
            pos: 0,
            line: 1,
            text: "end".to_owned(),
        };
        assert_eq!(keyword.describe(), "<end>");
    }
}
