//! Token definitions for the `.mtm` body language.

use crate::location::{Location, Position};

/// A token in `.mtm` source.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identifier or keyword; keywords are recognized by the parser.
    Ident(String),
    /// `$name`.
    Ref(String),
    /// Numeric literal as written.
    Number(String),
    /// Quoted string; `value` is the raw text between the quotes.
    String { value: String, quote: char },
    /// Backtick literal; the raw text between the backticks.
    Template(String),

    /// `(`
    Lparen,
    /// `)`
    Rparen,
    /// `{`
    Lbrace,
    /// `}`
    Rbrace,
    /// `[`
    Lbracket,
    /// `]`
    Rbracket,
    /// `,`
    Comma,
    /// `;`
    Semicolon,
    /// `:`
    Colon,
    /// `.`
    Dot,
    /// `...`
    DotDotDot,
    /// `?`
    Question,
    /// `?.`
    QuestionDot,
    /// `=>`
    EqualGreater,

    /// Any other operator, e.g. `+`, `===`, `??=`.
    Operator(&'static str),

    Eof,
}

/// Operators recognized by the lexer, longest first.
pub const OPERATORS: &[&str] = &[
    ">>>=", "===", "!==", "**=", "??=", "||=", "&&=", "<<=", ">>=", ">>>", "==", "!=", "<=",
    ">=", "&&", "||", "??", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "**",
    "<<", ">>", "=", "<", ">", "+", "-", "*", "/", "%", "!", "~", "&", "|", "^",
];

/// Assignment operators.
pub const ASSIGNMENT_OPERATORS: &[&str] = &[
    "=", "+=", "-=", "*=", "/=", "%=", "**=", "??=", "||=", "&&=", "<<=", ">>=", ">>>=", "&=",
    "|=", "^=",
];

impl Token {
    /// Binary operator precedence; 0 for tokens that are not binary operators.
    pub fn precedence(&self) -> u8 {
        match self {
            Token::Operator(op) => binary_precedence(op),
            Token::Ident(word) if word == "instanceof" || word == "in" => 8,
            _ => 0,
        }
    }

    pub fn is_ident(&self, word: &str) -> bool {
        matches!(self, Token::Ident(w) if w == word)
    }

    pub fn is_operator(&self, op: &str) -> bool {
        matches!(self, Token::Operator(o) if *o == op)
    }

    pub fn is_assignment(&self) -> bool {
        matches!(self, Token::Operator(op) if ASSIGNMENT_OPERATORS.contains(op))
    }

    /// Words that cannot name a variable.
    pub fn is_keyword_txt(s: &str) -> bool {
        matches!(
            s,
            "async"
                | "await"
                | "break"
                | "const"
                | "continue"
                | "delete"
                | "else"
                | "export"
                | "false"
                | "for"
                | "function"
                | "if"
                | "import"
                | "in"
                | "instanceof"
                | "let"
                | "new"
                | "null"
                | "of"
                | "return"
                | "true"
                | "typeof"
                | "undefined"
                | "var"
                | "void"
                | "while"
        )
    }
}

fn binary_precedence(op: &str) -> u8 {
    match op {
        "??" => 1,
        "||" => 2,
        "&&" => 3,
        "|" => 4,
        "^" => 5,
        "&" => 6,
        "==" | "!=" | "===" | "!==" => 7,
        "<" | ">" | "<=" | ">=" => 8,
        "<<" | ">>" | ">>>" => 9,
        "+" | "-" => 10,
        "*" | "/" | "%" => 11,
        "**" => 12,
        _ => 0,
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "{s}"),
            Token::Ref(s) => write!(f, "${s}"),
            Token::Number(n) => write!(f, "{n}"),
            Token::String { value, quote } => write!(f, "{quote}{value}{quote}"),
            Token::Template(_) => write!(f, "template literal"),
            Token::Lparen => write!(f, "("),
            Token::Rparen => write!(f, ")"),
            Token::Lbrace => write!(f, "{{"),
            Token::Rbrace => write!(f, "}}"),
            Token::Lbracket => write!(f, "["),
            Token::Rbracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Semicolon => write!(f, ";"),
            Token::Colon => write!(f, ":"),
            Token::Dot => write!(f, "."),
            Token::DotDotDot => write!(f, "..."),
            Token::Question => write!(f, "?"),
            Token::QuestionDot => write!(f, "?."),
            Token::EqualGreater => write!(f, "=>"),
            Token::Operator(op) => write!(f, "{op}"),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

/// A token with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenInfo {
    pub token: Token,
    pub start: Position,
    pub end: Position,
    /// A line break separates this token from the previous one.
    pub newline_before: bool,
}

impl TokenInfo {
    pub fn loc(&self) -> Location {
        Location::from_positions(self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operators_longest_first() {
        for (i, op) in OPERATORS.iter().enumerate() {
            for longer in &OPERATORS[i + 1..] {
                assert!(
                    !(longer.starts_with(op) && longer.len() > op.len()),
                    "`{longer}` must come before `{op}`"
                );
            }
        }
    }

    #[test]
    fn test_precedence() {
        assert!(Token::Operator("*").precedence() > Token::Operator("+").precedence());
        assert!(Token::Operator("&&").precedence() > Token::Operator("||").precedence());
        assert_eq!(Token::Operator("=").precedence(), 0);
        assert_eq!(Token::Ident("in".into()).precedence(), 8);
    }

    #[test]
    fn test_display() {
        assert_eq!(Token::Lbrace.to_string(), "{");
        assert_eq!(Token::Ref("count".into()).to_string(), "$count");
    }
}
