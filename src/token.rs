//! Pull-based token reader over a complete json body.
//!
//! The reader never builds a tree: callers walk tokens and decide per field
//! whether to read a scalar, descend, skip, or capture the raw bytes of a
//! nested value for later parsing with [`TokenStream::copy_current_structure`].

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Number, Value};

use crate::{
    error::{Error, Result},
    record::lossless_i64,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token {
    StartObject,
    EndObject,
    StartArray,
    EndArray,
    FieldName,
    String,
    Number,
    Bool,
    Null,
}

impl Token {
    pub fn is_value(self) -> bool {
        matches!(
            self,
            Token::String | Token::Number | Token::Bool | Token::Null
        )
    }

    pub fn is_structure_start(self) -> bool {
        matches!(self, Token::StartObject | Token::StartArray)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Expect {
    Value,
    ValueOrEnd,
    FieldOrEnd,
    Field,
    CommaOrEnd,
    Done,
}

pub struct TokenStream<'a> {
    buf: &'a [u8],
    pos: usize,
    stack: Vec<Container>,
    expect: Expect,
    current: Option<Token>,
    start: usize,
    end: usize,
    name: Option<String>,
}

impl<'a> TokenStream<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            stack: Vec::new(),
            expect: Expect::Value,
            current: None,
            start: 0,
            end: 0,
            name: None,
        }
    }

    /// Advances to the next token, `None` once the root value is closed.
    pub fn next_token(&mut self) -> Result<Option<Token>> {
        loop {
            self.skip_whitespace();
            let byte = match self.buf.get(self.pos) {
                Some(byte) => *byte,
                None if self.expect == Expect::Done => {
                    self.current = None;
                    return Ok(None);
                }
                None => return Err(self.malformed(self.pos, "unexpected end of input")),
            };

            match self.expect {
                Expect::Done => {
                    return Err(self.malformed(self.pos, "trailing characters after document"))
                }
                Expect::CommaOrEnd => match byte {
                    b',' => {
                        self.pos += 1;
                        self.expect = match self.stack.last() {
                            Some(Container::Object) => Expect::Field,
                            _ => Expect::Value,
                        };
                    }
                    b'}' | b']' => return self.close(byte).map(Some),
                    _ => {
                        return Err(
                            self.malformed(self.pos, "expected `,` or the end of a container")
                        )
                    }
                },
                Expect::FieldOrEnd if byte == b'}' => return self.close(byte).map(Some),
                Expect::FieldOrEnd | Expect::Field => return self.field_name(byte).map(Some),
                Expect::ValueOrEnd if byte == b']' => return self.close(byte).map(Some),
                Expect::ValueOrEnd | Expect::Value => return self.scalar_or_open(byte).map(Some),
            }
        }
    }

    pub fn next_required(&mut self) -> Result<Token> {
        match self.next_token()? {
            Some(token) => Ok(token),
            None => Err(self.malformed(self.pos, "unexpected end of input")),
        }
    }

    /// Reads the next `FIELD_NAME` and moves onto its value.
    ///
    /// Returns `None` when the enclosing object ends.
    pub fn next_field(&mut self) -> Result<Option<(String, Token)>> {
        match self.next_required()? {
            Token::EndObject => Ok(None),
            Token::FieldName => {
                let name = self.name.clone().unwrap_or_default();
                let token = self.next_required()?;
                Ok(Some((name, token)))
            }
            other => Err(self.unexpected("a field name", Some(other))),
        }
    }

    pub fn current_token(&self) -> Option<Token> {
        self.current
    }

    /// The most recently read field name.
    pub fn current_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Byte offset of the current token.
    pub fn offset(&self) -> usize {
        self.start
    }

    pub fn expect_current(&self, token: Token, expected: &'static str) -> Result<()> {
        if self.current == Some(token) {
            Ok(())
        } else {
            Err(self.unexpected(expected, self.current))
        }
    }

    /// The current string, or the literal text of a number or boolean.
    ///
    /// `null` is not text; see [`TokenStream::optional_text`].
    pub fn text(&self) -> Result<String> {
        match self.current {
            Some(Token::String) => self.decode_string(self.start, self.end),
            Some(Token::Number) | Some(Token::Bool) => {
                Ok(String::from_utf8_lossy(self.lexeme()).into_owned())
            }
            other => Err(self.unexpected("a non null scalar value", other)),
        }
    }

    pub fn optional_text(&self) -> Result<Option<String>> {
        match self.current {
            Some(Token::Null) => Ok(None),
            _ => self.text().map(Some),
        }
    }

    pub fn number(&self) -> Result<Number> {
        match self.current {
            Some(Token::Number) => serde_json::from_slice(self.lexeme())
                .map_err(|e| self.malformed(self.start, format!("invalid number: {}", e))),
            other => Err(self.unexpected("a number", other)),
        }
    }

    pub fn long_value(&self) -> Result<i64> {
        let number = self.number()?;
        lossless_i64(&number).ok_or_else(|| {
            self.malformed(self.start, format!("`{}` does not fit a long", number))
        })
    }

    pub fn int_value(&self) -> Result<i32> {
        let value = self.long_value()?;
        if value < i64::from(i32::MIN) || value > i64::from(i32::MAX) {
            return Err(self.malformed(self.start, format!("`{}` does not fit an int", value)));
        }
        Ok(value as i32)
    }

    pub fn double_value(&self) -> Result<f64> {
        match self.current {
            Some(Token::Number) => self
                .number()?
                .as_f64()
                .ok_or_else(|| self.malformed(self.start, "number is not representable")),
            // non finite doubles are rendered as strings
            Some(Token::String) => {
                let text = self.text()?;
                text.parse::<f64>()
                    .map_err(|_| self.unexpected("a number", Some(Token::String)))
            }
            other => Err(self.unexpected("a number", other)),
        }
    }

    pub fn float_value(&self) -> Result<f32> {
        self.double_value().map(|value| value as f32)
    }

    pub fn optional_long(&self) -> Result<Option<i64>> {
        match self.current {
            Some(Token::Null) => Ok(None),
            _ => self.long_value().map(Some),
        }
    }

    pub fn optional_double(&self) -> Result<Option<f64>> {
        match self.current {
            Some(Token::Null) => Ok(None),
            _ => self.double_value().map(Some),
        }
    }

    pub fn bool_value(&self) -> Result<bool> {
        match self.current {
            Some(Token::Bool) => Ok(self.lexeme() == b"true"),
            other => Err(self.unexpected("a boolean", other)),
        }
    }

    /// Moves past the structure opened by the current token.
    ///
    /// No-op when the current token is a scalar.
    pub fn skip_children(&mut self) -> Result<()> {
        if !self.current.map_or(false, Token::is_structure_start) {
            return Ok(());
        }
        let mut depth = 1usize;
        while depth > 0 {
            match self.next_required()? {
                Token::StartObject | Token::StartArray => depth += 1,
                Token::EndObject | Token::EndArray => depth -= 1,
                _ => {}
            }
        }
        Ok(())
    }

    /// Captures the current value, scalar or structure, as a standalone buffer.
    ///
    /// For a structure the stream is left on its closing token.
    pub fn copy_current_structure(&mut self) -> Result<Bytes> {
        let start = self.start;
        match self.current {
            Some(token) if token.is_structure_start() => {
                self.skip_children()?;
                Ok(Bytes::copy_from_slice(&self.buf[start..self.end]))
            }
            Some(token) if token.is_value() => Ok(Bytes::copy_from_slice(self.lexeme())),
            other => Err(self.unexpected("a value", other)),
        }
    }

    pub fn value(&mut self) -> Result<Value> {
        self.deserialize()
    }

    /// Decodes the current value with serde, for fixed-shape leaves.
    pub fn deserialize<T: DeserializeOwned>(&mut self) -> Result<T> {
        let raw = self.copy_current_structure()?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub(crate) fn unexpected(&self, expected: &'static str, found: Option<Token>) -> Error {
        Error::UnexpectedToken {
            offset: self.start,
            expected,
            found,
        }
    }

    fn malformed(&self, offset: usize, reason: impl Into<String>) -> Error {
        Error::MalformedJson {
            offset,
            reason: reason.into(),
        }
    }

    fn lexeme(&self) -> &'a [u8] {
        &self.buf[self.start..self.end]
    }

    fn skip_whitespace(&mut self) {
        while let Some(b' ') | Some(b'\n') | Some(b'\r') | Some(b'\t') = self.buf.get(self.pos) {
            self.pos += 1;
        }
    }

    fn emit(&mut self, token: Token, start: usize, end: usize) -> Token {
        self.current = Some(token);
        self.start = start;
        self.end = end;
        self.pos = end;
        token
    }

    fn after_value(&mut self) {
        self.expect = if self.stack.is_empty() {
            Expect::Done
        } else {
            Expect::CommaOrEnd
        };
    }

    fn close(&mut self, byte: u8) -> Result<Token> {
        let (container, token) = if byte == b'}' {
            (Container::Object, Token::EndObject)
        } else {
            (Container::Array, Token::EndArray)
        };
        if self.stack.pop() != Some(container) {
            return Err(self.malformed(self.pos, "mismatched closing delimiter"));
        }
        let start = self.pos;
        self.after_value();
        Ok(self.emit(token, start, start + 1))
    }

    fn field_name(&mut self, byte: u8) -> Result<Token> {
        if byte != b'"' {
            return Err(self.malformed(self.pos, "expected a field name"));
        }
        let (start, end) = self.scan_string()?;
        self.name = Some(self.decode_string(start, end)?);
        self.pos = end;
        self.skip_whitespace();
        if self.buf.get(self.pos) != Some(&b':') {
            return Err(self.malformed(self.pos, "expected `:` after field name"));
        }
        let colon = self.pos;
        self.expect = Expect::Value;
        self.emit(Token::FieldName, start, end);
        self.pos = colon + 1;
        Ok(Token::FieldName)
    }

    fn scalar_or_open(&mut self, byte: u8) -> Result<Token> {
        let start = self.pos;
        match byte {
            b'{' => {
                self.stack.push(Container::Object);
                self.expect = Expect::FieldOrEnd;
                Ok(self.emit(Token::StartObject, start, start + 1))
            }
            b'[' => {
                self.stack.push(Container::Array);
                self.expect = Expect::ValueOrEnd;
                Ok(self.emit(Token::StartArray, start, start + 1))
            }
            b'"' => {
                let (start, end) = self.scan_string()?;
                self.after_value();
                Ok(self.emit(Token::String, start, end))
            }
            b'-' | b'0'..=b'9' => {
                let end = self.scan_number()?;
                self.after_value();
                Ok(self.emit(Token::Number, start, end))
            }
            b't' => self.literal(b"true", Token::Bool),
            b'f' => self.literal(b"false", Token::Bool),
            b'n' => self.literal(b"null", Token::Null),
            _ => Err(self.malformed(start, format!("unexpected character `{}`", byte as char))),
        }
    }

    fn literal(&mut self, word: &[u8], token: Token) -> Result<Token> {
        let start = self.pos;
        if !self.buf[start..].starts_with(word) {
            return Err(self.malformed(start, "invalid literal"));
        }
        self.after_value();
        Ok(self.emit(token, start, start + word.len()))
    }

    /// Finds the end of the string at `pos`, checking escapes and utf-8 even
    /// when nobody decodes it.
    fn scan_string(&self) -> Result<(usize, usize)> {
        let start = self.pos;
        let mut pos = start + 1;
        loop {
            match self.buf.get(pos) {
                None => return Err(self.malformed(start, "unterminated string")),
                Some(b'\\') => pos += self.escape_len(pos)?,
                Some(b'"') => break,
                Some(byte) if *byte < 0x20 => {
                    return Err(self.malformed(pos, "control character in string"))
                }
                Some(_) => pos += 1,
            }
        }
        std::str::from_utf8(&self.buf[start + 1..pos]).map_err(|e| {
            self.malformed(start + 1 + e.valid_up_to(), "invalid utf-8 in string")
        })?;
        Ok((start, pos + 1))
    }

    fn escape_len(&self, pos: usize) -> Result<usize> {
        match self.buf.get(pos + 1) {
            Some(b'"') | Some(b'\\') | Some(b'/') | Some(b'b') | Some(b'f') | Some(b'n')
            | Some(b'r') | Some(b't') => Ok(2),
            Some(b'u') => match self.buf.get(pos + 2..pos + 6) {
                Some(hex) if hex.iter().all(u8::is_ascii_hexdigit) => Ok(6),
                _ => Err(self.malformed(pos, "invalid unicode escape")),
            },
            _ => Err(self.malformed(pos, "invalid escape")),
        }
    }

    fn scan_number(&self) -> Result<usize> {
        let start = self.pos;
        let mut end = start;
        while let Some(b'0'..=b'9') | Some(b'-') | Some(b'+') | Some(b'.') | Some(b'e')
        | Some(b'E') = self.buf.get(end)
        {
            end += 1;
        }
        serde_json::from_slice::<Number>(&self.buf[start..end])
            .map_err(|e| self.malformed(start, format!("invalid number: {}", e)))?;
        Ok(end)
    }

    fn decode_string(&self, start: usize, end: usize) -> Result<String> {
        serde_json::from_slice(&self.buf[start..end])
            .map_err(|e| self.malformed(start, format!("invalid string: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Result<Vec<Token>> {
        let mut stream = TokenStream::new(input.as_bytes());
        let mut result = Vec::new();
        while let Some(token) = stream.next_token()? {
            result.push(token);
        }
        Ok(result)
    }

    #[test]
    fn test_token_sequence() {
        let result = tokens(r#"{"a": [1, "x", true, null], "b": {}}"#).unwrap();
        assert_eq!(
            result,
            vec![
                Token::StartObject,
                Token::FieldName,
                Token::StartArray,
                Token::Number,
                Token::String,
                Token::Bool,
                Token::Null,
                Token::EndArray,
                Token::FieldName,
                Token::StartObject,
                Token::EndObject,
                Token::EndObject,
            ]
        );
    }

    #[test]
    fn test_scalar_accessors() {
        let mut stream = TokenStream::new(br#"{"s": "a\"b\u00e9", "l": 42, "d": 1.5, "f": false}"#);
        stream.next_token().unwrap();

        let (name, _) = stream.next_field().unwrap().unwrap();
        assert_eq!(name, "s");
        assert_eq!(stream.text().unwrap(), "a\"b\u{e9}");

        stream.next_field().unwrap();
        assert_eq!(stream.long_value().unwrap(), 42);
        assert_eq!(stream.double_value().unwrap(), 42.0);

        stream.next_field().unwrap();
        assert_eq!(stream.double_value().unwrap(), 1.5);
        assert!(stream.long_value().is_err());

        stream.next_field().unwrap();
        assert!(!stream.bool_value().unwrap());
        assert!(stream.next_field().unwrap().is_none());
        assert!(stream.next_token().unwrap().is_none());
    }

    #[test]
    fn test_whole_double_narrows_to_long() {
        let mut stream = TokenStream::new(b"[3.0]");
        stream.next_token().unwrap();
        stream.next_token().unwrap();
        assert_eq!(stream.long_value().unwrap(), 3);
    }

    #[test]
    fn test_copy_current_structure() {
        let input = br#"{"agg": {"buckets": [{"key": "a"}]}, "after": 1}"#;
        let mut stream = TokenStream::new(input);
        stream.next_token().unwrap();
        let (name, token) = stream.next_field().unwrap().unwrap();
        assert_eq!(name, "agg");
        assert_eq!(token, Token::StartObject);

        let raw = stream.copy_current_structure().unwrap();
        assert_eq!(&raw[..], &br#"{"buckets": [{"key": "a"}]}"#[..]);
        assert_eq!(stream.current_token(), Some(Token::EndObject));

        let (name, _) = stream.next_field().unwrap().unwrap();
        assert_eq!(name, "after");
        assert_eq!(stream.long_value().unwrap(), 1);
    }

    #[test]
    fn test_malformed_reports_offset() {
        match tokens(r#"{"a": tru}"#) {
            Err(Error::MalformedJson { offset, .. }) => assert_eq!(offset, 6),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_truncated_input_is_an_error() {
        assert!(tokens(r#"{"a": [1, 2"#).is_err());
        assert!(tokens(r#"{"a": 1"#).is_err());
        assert!(tokens("").is_err());
    }

    #[test]
    fn test_trailing_and_mismatched() {
        assert!(tokens(r#"{} {}"#).is_err());
        assert!(tokens(r#"{"a": [1}"#).is_err());
        assert!(tokens(r#"{"a" 1}"#).is_err());
        assert!(tokens(r#"[1 2]"#).is_err());
    }

    #[test]
    fn test_bad_strings_fail_even_when_skipped() {
        assert!(tokens(r#"{"a": "bad\qescape"}"#).is_err());
        assert!(tokens(r#"{"a": "\u12"}"#).is_err());
        assert!(tokens("{\"a\": \"tab\there\"}").is_err());

        let mut stream = TokenStream::new(b"{\"skip\": [\"\xff\"], \"keep\": 1}");
        stream.next_token().unwrap();
        stream.next_field().unwrap();
        assert!(matches!(stream.skip_children(), Err(Error::MalformedJson { .. })));

        let result = tokens(r#"{"ok": "\n\t\"\\\/\u00e9", "utf8": "é"}"#).unwrap();
        assert_eq!(result.len(), 6);
    }

    #[test]
    fn test_null_is_not_text() {
        let mut stream = TokenStream::new(b"[null, 7]");
        stream.next_token().unwrap();
        stream.next_token().unwrap();
        assert!(stream.text().is_err());
        assert_eq!(stream.optional_text().unwrap(), None);
        stream.next_token().unwrap();
        assert_eq!(stream.text().unwrap(), "7");
    }

    #[test]
    fn test_skip_children() {
        let mut stream = TokenStream::new(br#"{"skip": {"x": [1, {"y": 2}]}, "keep": "v"}"#);
        stream.next_token().unwrap();
        stream.next_field().unwrap();
        stream.skip_children().unwrap();
        let (name, _) = stream.next_field().unwrap().unwrap();
        assert_eq!(name, "keep");
        assert_eq!(stream.text().unwrap(), "v");
    }
}
