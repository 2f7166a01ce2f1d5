//! Syntax-version detection.
//!
//! A file body is classified before it is parsed. `$name = ...` declarations
//! mark the modern idiom and `signal(...)` calls mark the legacy one. Comments
//! and string contents are blanked first so that neither idiom is detected
//! inside them.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Which declaration idiom a file uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyntaxVersion {
    /// Only `signal(...)` declarations, or no declarations at all.
    Legacy,
    /// Only `$name` declarations.
    Modern,
    /// Both idioms in one file.
    Mixed,
}

impl SyntaxVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            SyntaxVersion::Legacy => "legacy",
            SyntaxVersion::Modern => "modern",
            SyntaxVersion::Mixed => "mixed",
        }
    }
}

impl fmt::Display for SyntaxVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// `$name`, optional `!`, optional `: Type`, then a plain `=`.
const MODERN_DECLARATION: &str = r"(?m)^[ \t]*\$[A-Za-z_][A-Za-z0-9_]*!?[ \t]*(?::[^=\n]*)?=(?:[^=>]|$)";
const LEGACY_SIGNAL: &str = r"(?:^|[^A-Za-z0-9_$.])signal[ \t]*\(";

fn modern_declaration() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(MODERN_DECLARATION).expect("MODERN_DECLARATION is a valid pattern"))
}

fn legacy_signal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(LEGACY_SIGNAL).expect("LEGACY_SIGNAL is a valid pattern"))
}

/// Counts of each idiom found in a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyntaxScan {
    pub modern_declarations: usize,
    pub legacy_signals: usize,
}

impl SyntaxScan {
    pub fn version(&self) -> SyntaxVersion {
        match (self.modern_declarations > 0, self.legacy_signals > 0) {
            (true, true) => SyntaxVersion::Mixed,
            (true, false) => SyntaxVersion::Modern,
            _ => SyntaxVersion::Legacy,
        }
    }
}

/// Count the idioms present in `body` (the file without its frontmatter).
pub fn scan(body: &str) -> SyntaxScan {
    let masked = mask_comments_and_strings(body);
    SyntaxScan {
        modern_declarations: modern_declaration().find_iter(&masked).count(),
        legacy_signals: legacy_signal().find_iter(&masked).count(),
    }
}

/// Classify `body`.
pub fn detect(body: &str) -> SyntaxVersion {
    scan(body).version()
}

/// Replace comment and string contents with spaces, keeping newlines and
/// the quote characters themselves. Byte offsets are unchanged: a masked
/// character becomes one space per UTF-8 byte.
fn mask_comments_and_strings(src: &str) -> String {
    fn blank(out: &mut String, c: char) {
        if c == '\n' {
            out.push('\n');
        } else {
            out.extend(std::iter::repeat_n(' ', c.len_utf8()));
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        LineComment,
        BlockComment,
        Str(char),
    }

    let mut out = String::with_capacity(src.len());
    let mut state = State::Code;
    let mut chars = src.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    out.push_str("  ");
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    out.push_str("  ");
                    state = State::BlockComment;
                }
                '\'' | '"' | '`' => {
                    out.push(c);
                    state = State::Str(c);
                }
                _ => out.push(c),
            },
            State::LineComment => {
                blank(&mut out, c);
                if c == '\n' {
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("  ");
                    state = State::Code;
                } else {
                    blank(&mut out, c);
                }
            }
            State::Str(quote) => {
                if c == '\\' {
                    out.push(' ');
                    if let Some(escaped) = chars.next() {
                        blank(&mut out, escaped);
                    }
                } else if c == quote {
                    out.push(c);
                    state = State::Code;
                } else if c == '\n' {
                    out.push('\n');
                    // Unterminated single-line string; resume scanning code.
                    if quote != '`' {
                        state = State::Code;
                    }
                } else {
                    blank(&mut out, c);
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modern() {
        let body = "$count! = 0\n$label: string = 'hi'\n$inc = () => $count++\n";
        assert_eq!(detect(body), SyntaxVersion::Modern);
        assert_eq!(scan(body).modern_declarations, 3);
    }

    #[test]
    fn test_legacy() {
        let body = "const count = signal(0)\nfunction inc() { count.set(count() + 1) }\n";
        assert_eq!(detect(body), SyntaxVersion::Legacy);
    }

    #[test]
    fn test_template_only_is_legacy() {
        assert_eq!(detect("template(`<p>hi</p>`)"), SyntaxVersion::Legacy);
        assert_eq!(detect(""), SyntaxVersion::Legacy);
    }

    #[test]
    fn test_mixed() {
        let body = "$count! = 0\nconst name = signal('x')\n";
        assert_eq!(detect(body), SyntaxVersion::Mixed);
    }

    #[test]
    fn test_comparisons_are_not_declarations() {
        assert_eq!(detect("if ($a == 1) {}\n$b => 1"), SyntaxVersion::Legacy);
    }

    #[test]
    fn test_ignores_comments_and_strings() {
        let body = "// $old! = 1\n/* signal(0) */\nconst s = 'signal(1)'\n$count! = 0\n";
        assert_eq!(detect(body), SyntaxVersion::Modern);

        let body = "const count = signal(0)\nconst doc = `\n$fake! = 1\n`\n";
        assert_eq!(detect(body), SyntaxVersion::Legacy);
    }

    #[test]
    fn test_create_signal_is_not_legacy() {
        assert_eq!(detect("$a! = 1\nconst b = createSignal(1)"), SyntaxVersion::Modern);
        assert_eq!(detect("$a! = 1\nconst b = x.signal(1)"), SyntaxVersion::Modern);
    }

    #[test]
    fn test_mask_preserves_lines() {
        let src = "a // c\n'x\ny' /* z\n*/ b";
        let masked = mask_comments_and_strings(src);
        assert_eq!(masked.lines().count(), src.lines().count());
        assert_eq!(masked.len(), src.len());
    }

    #[test]
    fn test_mask_preserves_byte_offsets_of_multibyte_text() {
        let src = "$a! = 'héllo ✓'\n// ünïcode 🎉\n$b! = 1";
        let masked = mask_comments_and_strings(src);
        assert_eq!(masked.len(), src.len());
        assert_eq!(masked.find("$b!"), src.find("$b!"));
        assert!(masked.is_ascii());
        assert_eq!(detect(src), SyntaxVersion::Modern);
    }
}
