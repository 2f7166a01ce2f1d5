//! Lexer for the `.mtm` body language.
//!
//! The lexer works on a byte range of the whole file so that every token
//! carries file-absolute positions. Template literals are returned raw; the
//! parser splits their `${}` holes itself.

use super::token::{OPERATORS, Token, TokenInfo};
use crate::error::CompileError;
use crate::location::{Location, Position};

pub struct Lexer<'src> {
    filename: &'src str,
    src: &'src str,
    end: usize,
    pos: Position,
}

impl<'src> Lexer<'src> {
    /// Lex `src` from `start` to the end of the text.
    pub fn new(filename: &'src str, src: &'src str, start: Position) -> Self {
        Self::with_range(filename, src, start, src.len())
    }

    /// Lex `src` from `start` up to byte offset `end`.
    pub fn with_range(filename: &'src str, src: &'src str, start: Position, end: usize) -> Self {
        Self {
            filename,
            src,
            end: end.min(src.len()),
            pos: start,
        }
    }

    fn rest(&self) -> &'src str {
        &self.src[self.pos.offset..self.end]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        let mut buf = [0u8; 4];
        self.pos = self.pos.advance_over(c.encode_utf8(&mut buf));
        Some(c)
    }

    fn bump_str(&mut self, s: &str) {
        self.pos = self.pos.advance_over(s);
    }

    fn error(&self, start: Position, message: impl Into<String>) -> CompileError {
        CompileError::syntax(self.filename, message).at(Location::from_positions(start, self.pos))
    }

    /// Skip whitespace and comments; returns whether a newline was crossed.
    fn skip_trivia(&mut self) -> Result<bool, CompileError> {
        let mut newline = false;
        loop {
            match self.peek() {
                Some('\n') => {
                    newline = true;
                    self.bump();
                }
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let start = self.pos;
                    self.bump_str("/*");
                    loop {
                        match self.peek() {
                            None => return Err(self.error(start, "unterminated comment")),
                            Some('*') if self.peek_at(1) == Some('/') => {
                                self.bump_str("*/");
                                break;
                            }
                            Some(c) => {
                                if c == '\n' {
                                    newline = true;
                                }
                                self.bump();
                            }
                        }
                    }
                }
                _ => return Ok(newline),
            }
        }
    }

    /// Lex the whole range. The result always ends with an `Eof` token.
    pub fn tokenize(mut self) -> Result<Vec<TokenInfo>, CompileError> {
        let mut tokens = Vec::new();
        let mut first = true;
        loop {
            let crossed = self.skip_trivia()?;
            let newline_before = crossed && !first;
            first = false;
            let start = self.pos;
            let Some(c) = self.peek() else {
                tokens.push(TokenInfo {
                    token: Token::Eof,
                    start,
                    end: start,
                    newline_before,
                });
                return Ok(tokens);
            };
            let token = self.scan_token(c)?;
            tokens.push(TokenInfo {
                token,
                start,
                end: self.pos,
                newline_before,
            });
        }
    }

    fn scan_token(&mut self, c: char) -> Result<Token, CompileError> {
        let start = self.pos;
        if is_ident_start(c) {
            return Ok(Token::Ident(self.scan_identifier()));
        }
        if c == '$' {
            self.bump();
            match self.peek() {
                Some(n) if is_ident_start(n) => return Ok(Token::Ref(self.scan_identifier())),
                _ => return Err(self.error(start, "expected a name after `$`")),
            }
        }
        if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
            return self.scan_number();
        }
        match c {
            '\'' | '"' => return self.scan_string(c),
            '`' => return self.scan_template(),
            _ => {}
        }

        let rest = self.rest();
        let fixed = [
            ("...", Token::DotDotDot),
            ("=>", Token::EqualGreater),
        ];
        for (text, token) in fixed {
            if rest.starts_with(text) {
                self.bump_str(text);
                return Ok(token);
            }
        }
        if rest.starts_with("?.") && !rest[2..].starts_with(|d: char| d.is_ascii_digit()) {
            self.bump_str("?.");
            return Ok(Token::QuestionDot);
        }
        if let Some(&op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            self.bump_str(op);
            return Ok(Token::Operator(op));
        }

        let token = match c {
            '(' => Token::Lparen,
            ')' => Token::Rparen,
            '{' => Token::Lbrace,
            '}' => Token::Rbrace,
            '[' => Token::Lbracket,
            ']' => Token::Rbracket,
            ',' => Token::Comma,
            ';' => Token::Semicolon,
            ':' => Token::Colon,
            '.' => Token::Dot,
            '?' => Token::Question,
            _ => {
                self.bump();
                return Err(self.error(start, format!("unexpected character `{c}`")));
            }
        };
        self.bump();
        Ok(token)
    }

    fn scan_identifier(&mut self) -> String {
        let start = self.pos.offset;
        while let Some(c) = self.peek() {
            if !is_ident_continue(c) {
                break;
            }
            self.bump();
        }
        self.src[start..self.pos.offset].to_string()
    }

    fn scan_number(&mut self) -> Result<Token, CompileError> {
        let start = self.pos;
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X' | 'b' | 'B' | 'o' | 'O')) {
            self.bump();
            self.bump();
            let digits_start = self.pos.offset;
            while let Some(c) = self.peek() {
                if !(c.is_ascii_hexdigit() || c == '_') {
                    break;
                }
                self.bump();
            }
            if self.pos.offset == digits_start {
                return Err(self.error(start, "expected digits after the number prefix"));
            }
        } else {
            self.scan_digits();
            if self.peek() == Some('.') && self.peek_at(1) != Some('.') {
                self.bump();
                self.scan_digits();
            }
            if matches!(self.peek(), Some('e' | 'E')) {
                let sign = matches!(self.peek_at(1), Some('+' | '-'));
                let digit_at = if sign { 2 } else { 1 };
                if self.peek_at(digit_at).is_some_and(|d| d.is_ascii_digit()) {
                    self.bump();
                    if sign {
                        self.bump();
                    }
                    self.scan_digits();
                }
            }
        }
        if self.peek() == Some('n') {
            self.bump();
        }
        if self.peek().is_some_and(is_ident_start) {
            return Err(self.error(start, "identifier directly after number"));
        }
        Ok(Token::Number(self.src[start.offset..self.pos.offset].to_string()))
    }

    fn scan_digits(&mut self) {
        while let Some(c) = self.peek() {
            if !(c.is_ascii_digit() || c == '_') {
                break;
            }
            self.bump();
        }
    }

    fn scan_string(&mut self, quote: char) -> Result<Token, CompileError> {
        let start = self.pos;
        self.bump();
        let content_start = self.pos.offset;
        loop {
            match self.peek() {
                None | Some('\n') => return Err(self.error(start, "unterminated string")),
                Some('\\') => {
                    self.bump();
                    if self.bump().is_none() {
                        return Err(self.error(start, "unterminated string"));
                    }
                }
                Some(c) if c == quote => {
                    let value = self.src[content_start..self.pos.offset].to_string();
                    self.bump();
                    return Ok(Token::String { value, quote });
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    fn scan_template(&mut self) -> Result<Token, CompileError> {
        let start = self.pos;
        self.bump();
        let content_start = self.pos.offset;
        let content_end = template_end(self.src, content_start, self.end)
            .ok_or_else(|| self.error(start, "unterminated template literal"))?;
        let raw = &self.src[content_start..content_end];
        self.bump_str(raw);
        self.bump();
        Ok(Token::Template(raw.to_string()))
    }
}

pub fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Offset of the closing backtick of a template literal whose content starts
/// at `from`, skipping over `${ ... }` holes (which may nest literals).
pub fn template_end(src: &str, from: usize, end: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let end = end.min(bytes.len());
    let mut i = from;
    while i < end {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => return Some(i),
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                i = hole_end(src, i + 2, end)? + 1;
            }
            _ => i += 1,
        }
    }
    None
}

/// Offset of the `}` closing a `${` hole whose content starts at `from`.
pub fn hole_end(src: &str, from: usize, end: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut depth = 0usize;
    let mut i = from;
    while i < end {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' if depth == 0 => return Some(i),
            b'}' => depth -= 1,
            q @ (b'\'' | b'"') => {
                i += 1;
                while i < end && bytes[i] != q {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'`' => {
                i = template_end(src, i + 1, end)?;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        Lexer::new("test.mtm", src, Position::start())
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_declaration_tokens() {
        assert_eq!(
            lex("$count! = 0"),
            vec![
                Token::Ref("count".into()),
                Token::Operator("!"),
                Token::Operator("="),
                Token::Number("0".into()),
                Token::Eof
            ]
        );
        assert_eq!(
            lex("$a!=$b")[..3],
            [Token::Ref("a".into()), Token::Operator("!="), Token::Ref("b".into())]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(lex("1.5e3")[0], Token::Number("1.5e3".into()));
        assert_eq!(lex("0xff")[0], Token::Number("0xff".into()));
        assert_eq!(lex(".5")[0], Token::Number(".5".into()));
        assert_eq!(lex("1_000")[0], Token::Number("1_000".into()));
    }

    #[test]
    fn test_strings_and_templates() {
        assert_eq!(
            lex(r#"'it\'s'"#)[0],
            Token::String { value: r"it\'s".into(), quote: '\'' }
        );
        assert_eq!(lex("`a ${`b ${c}`} d`")[0], Token::Template("a ${`b ${c}`} d".into()));
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            lex("a ?? b ?.c ... => === **="),
            vec![
                Token::Ident("a".into()),
                Token::Operator("??"),
                Token::Ident("b".into()),
                Token::QuestionDot,
                Token::Ident("c".into()),
                Token::DotDotDot,
                Token::EqualGreater,
                Token::Operator("==="),
                Token::Operator("**="),
                Token::Eof
            ]
        );
        assert_eq!(lex("a?.5:1")[1], Token::Question);
    }

    #[test]
    fn test_comments_and_newlines() {
        let tokens = Lexer::new("t.mtm", "a // c\n/* x\ny */ b", Position::start())
            .tokenize()
            .unwrap();
        assert_eq!(tokens[0].token, Token::Ident("a".into()));
        assert!(!tokens[0].newline_before);
        assert_eq!(tokens[1].token, Token::Ident("b".into()));
        assert!(tokens[1].newline_before);
        assert_eq!(tokens[1].start.line, 3);
    }

    #[test]
    fn test_range_and_offsets() {
        let src = "xx $a + 1 yy";
        let tokens = Lexer::with_range("t.mtm", src, Position::new(1, 4, 3), 9)
            .tokenize()
            .unwrap();
        assert_eq!(tokens[0].token, Token::Ref("a".into()));
        assert_eq!(tokens[0].start.offset, 3);
        assert_eq!(tokens[0].start.column, 4);
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn test_errors() {
        let err = Lexer::new("t.mtm", "'abc", Position::start()).tokenize().unwrap_err();
        assert!(err.message.contains("unterminated string"));
        let err = Lexer::new("t.mtm", "`abc", Position::start()).tokenize().unwrap_err();
        assert!(err.message.contains("unterminated template"));
        assert!(Lexer::new("t.mtm", "a # b", Position::start()).tokenize().is_err());
        assert!(Lexer::new("t.mtm", "$ 1", Position::start()).tokenize().is_err());
    }
}
