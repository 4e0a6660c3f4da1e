//! Lenient literal parser.
//!
//! Accepts strict JSON plus the looser spellings backends tend to produce:
//! single-quoted strings, `True`/`False`/`None`, unquoted object keys,
//! trailing commas and parenthesised tuples. Nothing is evaluated; input is
//! only ever turned into a `serde_json::Value`.

use std::fmt;

use serde_json::{Map, Number, Value};

/// Nesting limit, so a hostile reply cannot blow the stack.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub position: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at character {}", self.message, self.position)
    }
}

impl std::error::Error for ParseError {}

/// Parse a complete literal. Anything but whitespace after the value is an error.
pub fn parse(input: &str) -> Result<Value, ParseError> {
    let mut parser = Parser {
        chars: input.chars().collect(),
        pos: 0,
        depth: 0,
    };
    let value = parser.value()?;
    parser.skip_whitespace();
    if parser.pos < parser.chars.len() {
        return Err(parser.error("Unexpected trailing content"));
    }
    Ok(value)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn error(&self, message: &str) -> ParseError {
        ParseError {
            position: self.pos,
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(_) => {
                self.pos -= 1;
                Err(self.error(&format!("Expected '{}'", expected)))
            }
            None => Err(self.error(&format!("Expected '{}' before end of input", expected))),
        }
    }

    fn value(&mut self) -> Result<Value, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some('{') => self.nested(Parser::object),
            Some('[') => self.nested(|p| p.sequence('[', ']')),
            Some('(') => self.nested(|p| p.sequence('(', ')')),
            Some('"') | Some('\'') => self.string().map(Value::String),
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            Some(c) if is_identifier_start(c) => self.literal(),
            Some(_) => Err(self.error("Unexpected character")),
            None => Err(self.error("Unexpected end of input")),
        }
    }

    fn nested<F>(&mut self, parse: F) -> Result<Value, ParseError>
    where
        F: FnOnce(&mut Parser) -> Result<Value, ParseError>,
    {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("Nesting too deep"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn object(&mut self) -> Result<Value, ParseError> {
        self.expect('{')?;
        let mut map = Map::new();

        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(Value::Object(map));
            }

            let key = self.key()?;
            self.expect(':')?;
            let value = self.value()?;
            map.insert(key, value);

            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(Value::Object(map)),
                Some(_) => {
                    self.pos -= 1;
                    return Err(self.error("Expected ',' or '}' in object"));
                }
                None => return Err(self.error("Unterminated object")),
            }
        }
    }

    fn key(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some('"') | Some('\'') => self.string(),
            Some(c) if is_identifier_start(c) || c.is_ascii_digit() => {
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-')
                {
                    self.pos += 1;
                }
                Ok(self.chars[start..self.pos].iter().collect())
            }
            Some(_) => Err(self.error("Expected object key")),
            None => Err(self.error("Unterminated object")),
        }
    }

    fn sequence(&mut self, open: char, close: char) -> Result<Value, ParseError> {
        self.expect(open)?;
        let mut items = Vec::new();

        loop {
            self.skip_whitespace();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(Value::Array(items));
            }

            items.push(self.value()?);

            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some(c) if c == close => return Ok(Value::Array(items)),
                Some(_) => {
                    self.pos -= 1;
                    return Err(self.error(&format!("Expected ',' or '{}' in list", close)));
                }
                None => return Err(self.error("Unterminated list")),
            }
        }
    }

    fn string(&mut self) -> Result<String, ParseError> {
        let quote = self.bump().ok_or_else(|| self.error("Expected string"))?;
        let mut out = String::new();

        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('u') => out.push(self.unicode_escape()?),
                    Some(other) => out.push(other),
                    None => return Err(self.error("Unterminated string")),
                },
                Some(c) => out.push(c),
                None => return Err(self.error("Unterminated string")),
            }
        }
    }

    fn unicode_escape(&mut self) -> Result<char, ParseError> {
        let end = self.pos + 4;
        if end > self.chars.len() {
            return Err(self.error("Truncated unicode escape"));
        }
        let hex: String = self.chars[self.pos..end].iter().collect();
        let code = u32::from_str_radix(&hex, 16).map_err(|_| self.error("Invalid unicode escape"))?;
        self.pos = end;
        Ok(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    fn number(&mut self) -> Result<Value, ParseError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E' | '_'))
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        let text = text.strip_prefix('+').unwrap_or(&text);

        if let Ok(n) = text.parse::<i64>() {
            return Ok(Value::Number(n.into()));
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| ParseError {
                position: start,
                message: format!("Invalid number '{}'", text),
            })
    }

    fn literal(&mut self) -> Result<Value, ParseError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();

        match word.as_str() {
            "true" | "True" | "TRUE" => Ok(Value::Bool(true)),
            "false" | "False" | "FALSE" => Ok(Value::Bool(false)),
            "null" | "None" | "NULL" | "nil" | "undefined" => Ok(Value::Null),
            _ => Err(ParseError {
                position: start,
                message: format!("Unknown literal '{}'", word),
            }),
        }
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}
