//! Lexer and recursive-descent parser for the selector language.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! pipe    := comma ( '|' comma )*
//! comma   := or ( ',' or )*
//! or      := and ( 'or' and )*
//! and     := compare ( 'and' compare )*
//! compare := postfix ( ( '==' | '!=' | '<' | '<=' | '>' | '>=' ) postfix )?
//! postfix := primary ( '.' name | '.'? '[' bracket ']' | '?' )*
//! primary := '.' ( name | '[' bracket ']' )? | '..' | '(' pipe ')' | literal
//!          | builtin | call '(' pipe ')'
//! bracket := ε | int | string | int? ':' int?
//! ```
//!
//! Builtins: `length`, `keys`, `type`, `first`, `last`, `not`, `add`, `any`,
//! `all`. Calls: `select(f)`, `map(f)`, `has(k)`.

use serde_json::Value;

use super::SelectorError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Filter {
    Identity,
    Recurse,
    Literal(Value),
    Builtin(Builtin),
    Path(Box<Filter>, Step),
    Try(Box<Filter>),
    Pipe(Box<Filter>, Box<Filter>),
    Comma(Box<Filter>, Box<Filter>),
    Compare(Box<Filter>, Comparison, Box<Filter>),
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Select(Box<Filter>),
    Map(Box<Filter>),
    Has(Box<Filter>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Step {
    Field(String),
    Index(i64),
    Slice(Option<i64>, Option<i64>),
    Iterate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    Length,
    Keys,
    Type,
    Not,
    Add,
    Any,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Dot,
    DotDot,
    Ident(String),
    Str(String),
    Num(f64),
    LBracket,
    RBracket,
    LParen,
    RParen,
    Pipe,
    Comma,
    Colon,
    Question,
    Cmp(Comparison),
}

fn syntax_error(position: usize, message: impl Into<String>) -> SelectorError {
    SelectorError::Parse { position, message: message.into() }
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, SelectorError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '.' => {
                if matches!(chars.get(i + 1), Some((_, '.'))) {
                    tokens.push((pos, Token::DotDot));
                    i += 2;
                } else {
                    tokens.push((pos, Token::Dot));
                    i += 1;
                }
            }
            '[' | ']' | '(' | ')' | '|' | ',' | ':' | '?' => {
                let token = match c {
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '|' => Token::Pipe,
                    ',' => Token::Comma,
                    ':' => Token::Colon,
                    _ => Token::Question,
                };
                tokens.push((pos, token));
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let followed_by_eq = matches!(chars.get(i + 1), Some((_, '=')));
                let op = match (c, followed_by_eq) {
                    ('=', true) => Comparison::Eq,
                    ('!', true) => Comparison::Ne,
                    ('<', true) => Comparison::Le,
                    ('<', false) => Comparison::Lt,
                    ('>', true) => Comparison::Ge,
                    ('>', false) => Comparison::Gt,
                    _ => return Err(syntax_error(pos, format!("unexpected character {c:?}"))),
                };
                tokens.push((pos, Token::Cmp(op)));
                i += if followed_by_eq { 2 } else { 1 };
            }
            '"' => {
                let (text, next) = lex_string(&chars, i)?;
                tokens.push((pos, Token::Str(text)));
                i = next;
            }
            c if c.is_ascii_digit() || (c == '-' && next_is_digit(&chars, i)) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().map(|(_, c)| c).collect();
                let number =
                    text.parse::<f64>().map_err(|_| syntax_error(pos, format!("bad number {text:?}")))?;
                tokens.push((pos, Token::Num(number)));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].1.is_ascii_alphanumeric() || chars[i].1 == '_') {
                    i += 1;
                }
                tokens.push((pos, Token::Ident(chars[start..i].iter().map(|(_, c)| c).collect())));
            }
            other => return Err(syntax_error(pos, format!("unexpected character {other:?}"))),
        }
    }

    Ok(tokens)
}

fn next_is_digit(chars: &[(usize, char)], i: usize) -> bool {
    chars.get(i + 1).is_some_and(|(_, c)| c.is_ascii_digit())
}

/// Lex a double-quoted string starting at `chars[start]`, returning the
/// unescaped text and the index just past the closing quote
fn lex_string(chars: &[(usize, char)], start: usize) -> Result<(String, usize), SelectorError> {
    let mut text = String::new();
    let mut i = start + 1;

    while let Some(&(pos, c)) = chars.get(i) {
        match c {
            '"' => return Ok((text, i + 1)),
            '\\' => {
                let (_, escaped) = *chars
                    .get(i + 1)
                    .ok_or_else(|| syntax_error(pos, "unterminated escape"))?;
                match escaped {
                    '"' | '\\' | '/' => text.push(escaped),
                    'n' => text.push('\n'),
                    't' => text.push('\t'),
                    'r' => text.push('\r'),
                    'u' => {
                        let hex: String = chars.iter().skip(i + 2).take(4).map(|(_, c)| c).collect();
                        let code = u32::from_str_radix(&hex, 16)
                            .ok()
                            .filter(|_| hex.len() == 4)
                            .and_then(char::from_u32)
                            .ok_or_else(|| syntax_error(pos, format!("bad unicode escape \\u{hex}")))?;
                        text.push(code);
                        i += 4;
                    }
                    other => return Err(syntax_error(pos, format!("unknown escape \\{other}"))),
                }
                i += 2;
            }
            _ => {
                text.push(c);
                i += 1;
            }
        }
    }

    Err(syntax_error(chars[start].0, "unterminated string"))
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    cursor: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|(_, t)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.cursor + offset).map(|(_, t)| t)
    }

    /// Whether the token at `offset` starts right where the one before it ends.
    /// Only used after a `.`, which is one byte long.
    fn touches_previous(&self, offset: usize) -> bool {
        let index = self.cursor + offset;
        match (index.checked_sub(1).and_then(|i| self.tokens.get(i)), self.tokens.get(index)) {
            (Some((before, _)), Some((at, _))) => *at == before + 1,
            _ => false,
        }
    }

    fn position(&self) -> usize {
        self.tokens.get(self.cursor).map_or(self.end, |(p, _)| *p)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).map(|(_, t)| t.clone());
        self.cursor += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), SelectorError> {
        let position = self.position();
        match self.bump() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(syntax_error(position, format!("expected {expected:?}, found {token:?}"))),
            None => Err(syntax_error(position, format!("expected {expected:?}, found end of input"))),
        }
    }

    fn pipe(&mut self) -> Result<Filter, SelectorError> {
        let mut filter = self.comma()?;
        while self.peek() == Some(&Token::Pipe) {
            self.bump();
            filter = Filter::Pipe(Box::new(filter), Box::new(self.comma()?));
        }
        Ok(filter)
    }

    fn comma(&mut self) -> Result<Filter, SelectorError> {
        let mut filter = self.or()?;
        while self.peek() == Some(&Token::Comma) {
            self.bump();
            filter = Filter::Comma(Box::new(filter), Box::new(self.or()?));
        }
        Ok(filter)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(name)) if name == keyword)
    }

    fn or(&mut self) -> Result<Filter, SelectorError> {
        let mut filter = self.and()?;
        while self.at_keyword("or") {
            self.bump();
            filter = Filter::Or(Box::new(filter), Box::new(self.and()?));
        }
        Ok(filter)
    }

    fn and(&mut self) -> Result<Filter, SelectorError> {
        let mut filter = self.compare()?;
        while self.at_keyword("and") {
            self.bump();
            filter = Filter::And(Box::new(filter), Box::new(self.compare()?));
        }
        Ok(filter)
    }

    /// Comparisons do not chain: `a < b < c` is a syntax error
    fn compare(&mut self) -> Result<Filter, SelectorError> {
        let lhs = self.postfix()?;
        let Some(Token::Cmp(op)) = self.peek().cloned() else {
            return Ok(lhs);
        };
        self.bump();
        let rhs = self.postfix()?;
        if let Some(Token::Cmp(_)) = self.peek() {
            return Err(syntax_error(self.position(), "comparisons cannot be chained"));
        }
        Ok(Filter::Compare(Box::new(lhs), op, Box::new(rhs)))
    }

    fn postfix(&mut self) -> Result<Filter, SelectorError> {
        let mut filter = self.primary()?;
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(Token::Dot), Some(Token::Ident(_) | Token::Str(_)))
                    if self.touches_previous(1) =>
                {
                    self.bump();
                    filter = Filter::Path(Box::new(filter), self.name()?);
                }
                (Some(Token::Dot), Some(Token::LBracket)) => {
                    self.bump();
                    self.bump();
                    filter = Filter::Path(Box::new(filter), self.bracket()?);
                }
                (Some(Token::LBracket), _) => {
                    self.bump();
                    filter = Filter::Path(Box::new(filter), self.bracket()?);
                }
                (Some(Token::Question), _) => {
                    self.bump();
                    filter = Filter::Try(Box::new(filter));
                }
                _ => return Ok(filter),
            }
        }
    }

    fn primary(&mut self) -> Result<Filter, SelectorError> {
        let position = self.position();
        match self.bump() {
            Some(Token::Dot) => match self.peek() {
                Some(Token::Ident(_) | Token::Str(_)) if self.touches_previous(0) => {
                    Ok(Filter::Path(Box::new(Filter::Identity), self.name()?))
                }
                Some(Token::LBracket) => {
                    self.bump();
                    Ok(Filter::Path(Box::new(Filter::Identity), self.bracket()?))
                }
                _ => Ok(Filter::Identity),
            },
            Some(Token::DotDot) => Ok(Filter::Recurse),
            Some(Token::LParen) => {
                let inner = self.pipe()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Str(text)) => Ok(Filter::Literal(Value::String(text))),
            Some(Token::Num(n)) => Ok(Filter::Literal(number_literal(n))),
            Some(Token::Ident(name)) if self.peek() == Some(&Token::LParen) => {
                self.bump();
                let argument = Box::new(self.pipe()?);
                self.expect(Token::RParen)?;
                match name.as_str() {
                    "select" => Ok(Filter::Select(argument)),
                    "map" => Ok(Filter::Map(argument)),
                    "has" => Ok(Filter::Has(argument)),
                    other => Err(syntax_error(position, format!("unknown function {other}/1"))),
                }
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "null" => Ok(Filter::Literal(Value::Null)),
                "true" => Ok(Filter::Literal(Value::Bool(true))),
                "false" => Ok(Filter::Literal(Value::Bool(false))),
                "length" => Ok(Filter::Builtin(Builtin::Length)),
                "keys" => Ok(Filter::Builtin(Builtin::Keys)),
                "type" => Ok(Filter::Builtin(Builtin::Type)),
                "not" => Ok(Filter::Builtin(Builtin::Not)),
                "add" => Ok(Filter::Builtin(Builtin::Add)),
                "any" => Ok(Filter::Builtin(Builtin::Any)),
                "all" => Ok(Filter::Builtin(Builtin::All)),
                "first" => Ok(Filter::Path(Box::new(Filter::Identity), Step::Index(0))),
                "last" => Ok(Filter::Path(Box::new(Filter::Identity), Step::Index(-1))),
                other => Err(syntax_error(position, format!("unknown function {other}"))),
            },
            Some(token) => Err(syntax_error(position, format!("unexpected {token:?}"))),
            None => Err(syntax_error(position, "unexpected end of input")),
        }
    }

    /// Field name following a `.`
    fn name(&mut self) -> Result<Step, SelectorError> {
        let position = self.position();
        match self.bump() {
            Some(Token::Ident(name) | Token::Str(name)) => Ok(Step::Field(name)),
            _ => Err(syntax_error(position, "expected a field name")),
        }
    }

    /// Contents of `[...]`, the opening bracket already consumed
    fn bracket(&mut self) -> Result<Step, SelectorError> {
        let position = self.position();
        let step = match self.peek().cloned() {
            Some(Token::RBracket) => Step::Iterate,
            Some(Token::Str(name)) => {
                self.bump();
                Step::Field(name)
            }
            Some(Token::Colon) => {
                self.bump();
                Step::Slice(None, self.optional_int()?)
            }
            Some(Token::Num(n)) => {
                self.bump();
                if self.peek() == Some(&Token::Colon) {
                    self.bump();
                    Step::Slice(Some(n.floor() as i64), self.optional_int()?)
                } else {
                    Step::Index(n.floor() as i64)
                }
            }
            _ => return Err(syntax_error(position, "expected an index, a slice or a string key")),
        };
        self.expect(Token::RBracket)?;
        Ok(step)
    }

    fn optional_int(&mut self) -> Result<Option<i64>, SelectorError> {
        match self.peek() {
            Some(Token::Num(n)) => {
                let n = n.floor() as i64;
                self.bump();
                Ok(Some(n))
            }
            _ => Ok(None),
        }
    }
}

fn number_literal(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

/// Parse a full selector expression
pub(crate) fn parse(source: &str) -> Result<Filter, SelectorError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(syntax_error(0, "empty selector"));
    }

    let mut parser = Parser { tokens, cursor: 0, end: source.len() };
    let filter = parser.pipe()?;
    if parser.cursor < parser.tokens.len() {
        let position = parser.position();
        return Err(syntax_error(position, "unexpected trailing input"));
    }
    Ok(filter)
}
