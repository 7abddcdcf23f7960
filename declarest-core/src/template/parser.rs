//! Lexer and parser for `{{ ... }}` expressions.

use std::iter::Peekable;
use std::str::CharIndices;

use serde_json::{Number, Value};

use crate::error::TemplateError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";
const OR: &str = "or";

/// A piece of a compiled template.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    Text(String),
    Expr(Expr),
}

/// `operand ("or" operand)*`
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Expr {
    pub(crate) alternatives: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Literal(Value),
    Path(Path),
}

/// A root name followed by zero or more field/index accessors.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Path {
    pub(crate) root: String,
    pub(crate) keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(String),
    Dot,
    LBracket,
    RBracket,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("'{name}'"),
            Self::Str(value) => format!("string {value:?}"),
            Self::Number(text) => format!("number {text}"),
            Self::Dot => "'.'".to_string(),
            Self::LBracket => "'['".to_string(),
            Self::RBracket => "']'".to_string(),
        }
    }
}

/// Finds the `}}` that ends an expression, skipping quoted strings.
///
/// If a quote is never closed, falls back to the first `}}` so the lexer can
/// report the unterminated string.
fn find_close(body: &str) -> Option<usize> {
    let mut quote = None;
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match (quote, c) {
            (Some(_), '\\') => {
                chars.next();
            }
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '}') if body[i..].starts_with(CLOSE) => return Some(i),
            (None, _) => {}
        }
    }
    body.find(CLOSE)
}

/// Splits `source` into text and expression segments.
///
/// Returns `Ok(None)` when the source contains no `{{`, i.e. it is a plain
/// literal.
pub(crate) fn parse_segments(source: &str) -> Result<Option<Vec<Segment>>, TemplateError> {
    if !source.contains(OPEN) {
        return Ok(None);
    }

    let mut segments = Vec::new();
    let mut rest = source;
    let mut offset = 0;

    while let Some(start) = rest.find(OPEN) {
        if start > 0 {
            segments.push(Segment::Text(rest[..start].to_string()));
        }

        let body_start = start + OPEN.len();
        let Some(body_len) = find_close(&rest[body_start..]) else {
            return Err(TemplateError::new(source, offset + start, "unclosed '{{'"));
        };

        let body = &rest[body_start..body_start + body_len];
        segments.push(Segment::Expr(parse_expr(source, offset + body_start, body)?));

        let consumed = body_start + body_len + CLOSE.len();
        rest = &rest[consumed..];
        offset += consumed;
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest.to_string()));
    }

    Ok(Some(segments))
}

fn parse_expr(template: &str, base: usize, body: &str) -> Result<Expr, TemplateError> {
    let tokens = lex(template, base, body)?;
    if tokens.is_empty() {
        return Err(TemplateError::new(template, base, "empty expression"));
    }

    let mut parser = Parser {
        template,
        tokens,
        cursor: 0,
        end: base + body.len(),
    };

    let mut alternatives = vec![parser.operand()?];
    while parser.peek_keyword(OR) {
        parser.cursor += 1;
        alternatives.push(parser.operand()?);
    }

    if let Some((pos, token)) = parser.peek() {
        return Err(TemplateError::new(
            template,
            pos,
            format!("unexpected {}", token.describe()),
        ));
    }

    Ok(Expr { alternatives })
}

// ============================================================================
// Lexer
// ============================================================================

fn lex(template: &str, base: usize, body: &str) -> Result<Vec<(usize, Token)>, TemplateError> {
    let mut tokens: Vec<(usize, Token)> = Vec::new();
    let mut chars = body.char_indices().peekable();

    while let Some(&(i, c)) = chars.peek() {
        let pos = base + i;
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '.' => {
                chars.next();
                tokens.push((pos, Token::Dot));
            }
            '[' => {
                chars.next();
                tokens.push((pos, Token::LBracket));
            }
            ']' => {
                chars.next();
                tokens.push((pos, Token::RBracket));
            }
            '\'' | '"' => {
                chars.next();
                let value = lex_string(&mut chars, c)
                    .ok_or_else(|| TemplateError::new(template, pos, "unterminated string literal"))?;
                tokens.push((pos, Token::Str(value)));
            }
            c if c.is_ascii_digit() || c == '-' => {
                // `a.0.1` is two index accessors, not the number 0.1
                let after_dot = matches!(tokens.last(), Some((_, Token::Dot)));
                let text = lex_number(&mut chars, !after_dot);
                if text == "-" {
                    return Err(TemplateError::new(template, pos, "unexpected character '-'"));
                }
                tokens.push((pos, Token::Number(text)));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((pos, Token::Ident(name)));
            }
            other => {
                return Err(TemplateError::new(
                    template,
                    pos,
                    format!("unexpected character {other:?}"),
                ));
            }
        }
    }

    Ok(tokens)
}

/// Reads a quoted string whose opening quote was already consumed.
fn lex_string(chars: &mut Peekable<CharIndices<'_>>, quote: char) -> Option<String> {
    let mut value = String::new();
    while let Some((_, ch)) = chars.next() {
        match ch {
            '\\' => value.push(chars.next()?.1),
            ch if ch == quote => return Some(value),
            ch => value.push(ch),
        }
    }
    None
}

fn lex_number(chars: &mut Peekable<CharIndices<'_>>, allow_fraction: bool) -> String {
    let mut text = String::new();
    if let Some((_, first)) = chars.next() {
        text.push(first);
    }

    let mut seen_dot = false;
    while let Some(&(_, ch)) = chars.peek() {
        if ch.is_ascii_digit() {
            text.push(ch);
            chars.next();
        } else if ch == '.' && allow_fraction && !seen_dot && next_is_digit(chars) {
            seen_dot = true;
            text.push(ch);
            chars.next();
        } else {
            break;
        }
    }
    text
}

fn next_is_digit(chars: &Peekable<CharIndices<'_>>) -> bool {
    let mut ahead = chars.clone();
    ahead.next();
    matches!(ahead.peek(), Some((_, d)) if d.is_ascii_digit())
}

// ============================================================================
// Parser
// ============================================================================

struct Parser<'a> {
    template: &'a str,
    tokens: Vec<(usize, Token)>,
    cursor: usize,
    end: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<(usize, &Token)> {
        self.tokens.get(self.cursor).map(|(pos, token)| (*pos, token))
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some((_, Token::Ident(name))) if name == keyword)
    }

    fn next(&mut self) -> Option<(usize, Token)> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn error(&self, pos: usize, message: impl Into<String>) -> TemplateError {
        TemplateError::new(self.template, pos, message)
    }

    fn operand(&mut self) -> Result<Operand, TemplateError> {
        match self.next() {
            Some((_, Token::Str(value))) => Ok(Operand::Literal(Value::String(value))),
            Some((pos, Token::Number(text))) => parse_number(&text)
                .map(Operand::Literal)
                .ok_or_else(|| self.error(pos, format!("invalid number {text}"))),
            Some((pos, Token::Ident(name))) if name == OR => {
                Err(self.error(pos, "expected a value, found 'or'"))
            }
            Some((_, Token::Ident(root))) => self.path(root).map(Operand::Path),
            Some((pos, token)) => Err(self.error(
                pos,
                format!("expected a value, found {}", token.describe()),
            )),
            None => Err(self.error(self.end, "expected a value")),
        }
    }

    fn path(&mut self, root: String) -> Result<Path, TemplateError> {
        let mut keys = Vec::new();
        loop {
            match self.peek() {
                Some((_, Token::Dot)) => {
                    self.cursor += 1;
                    match self.next() {
                        Some((_, Token::Ident(key))) => keys.push(key),
                        Some((_, Token::Number(text))) if is_index(&text) => keys.push(text),
                        Some((pos, _)) => {
                            return Err(self.error(pos, "expected a field name after '.'"));
                        }
                        None => return Err(self.error(self.end, "expected a field name after '.'")),
                    }
                }
                Some((_, Token::LBracket)) => {
                    self.cursor += 1;
                    let key = match self.next() {
                        Some((_, Token::Str(key))) => key,
                        Some((_, Token::Number(text))) if is_index(&text) => text,
                        Some((pos, _)) => {
                            return Err(self.error(pos, "expected a quoted key or an index inside '[]'"));
                        }
                        None => return Err(self.error(self.end, "unclosed '['")),
                    };
                    match self.next() {
                        Some((_, Token::RBracket)) => keys.push(key),
                        Some((pos, _)) => return Err(self.error(pos, "expected ']'")),
                        None => return Err(self.error(self.end, "unclosed '['")),
                    }
                }
                _ => break,
            }
        }
        Ok(Path { root, keys })
    }
}

fn is_index(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

fn parse_number(text: &str) -> Option<Value> {
    if text.contains('.') {
        let value: f64 = text.parse().ok()?;
        Number::from_f64(value).map(Value::Number)
    } else {
        text.parse::<i64>().ok().map(Value::from)
    }
}
