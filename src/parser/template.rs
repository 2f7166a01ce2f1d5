//! Parser for the markup inside `template(`...`)`.
//!
//! Markup is scanned character by character. Embedded expressions (`{{..}}`
//! interpolations, `{..}` attribute values and block conditions) are handed
//! to the expression parser at their absolute file offsets, so every error
//! location points into the original file.

use super::lexer::{self, is_ident_continue, is_ident_start};
use crate::ast::{Attribute, Expr, TemplateChild};
use crate::error::CompileError;
use crate::location::{Location, Position};

/// Elements that never have children.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Parse markup occupying `start.offset..end` of `src`.
pub fn parse_template(
    filename: &str,
    src: &str,
    start: Position,
    end: usize,
) -> Result<Vec<TemplateChild>, CompileError> {
    let mut parser = TemplateParser {
        filename,
        src,
        origin: start,
        pos: start.offset,
        end,
    };
    let (children, stop) = parser.parse_children()?;
    match stop {
        Stop::Eof => Ok(children),
        other => Err(parser.stray(&other, "at the top level of the template")),
    }
}

/// What ended a run of children.
enum Stop {
    Eof,
    Close { tag: String, at: usize },
    ElseIf { condition: Expr, at: usize },
    Else { at: usize },
    EndIf { at: usize },
    EndEach { at: usize },
}

impl Stop {
    fn describe(&self) -> String {
        match self {
            Stop::Eof => "end of template".to_string(),
            Stop::Close { tag, .. } => format!("`</{tag}>`"),
            Stop::ElseIf { .. } => "`{:else if}`".to_string(),
            Stop::Else { .. } => "`{:else}`".to_string(),
            Stop::EndIf { .. } => "`{/if}`".to_string(),
            Stop::EndEach { .. } => "`{/each}`".to_string(),
        }
    }

    fn offset(&self) -> Option<usize> {
        match self {
            Stop::Eof => None,
            Stop::Close { at, .. }
            | Stop::ElseIf { at, .. }
            | Stop::Else { at }
            | Stop::EndIf { at }
            | Stop::EndEach { at } => Some(*at),
        }
    }
}

struct TemplateParser<'a> {
    filename: &'a str,
    src: &'a str,
    origin: Position,
    pos: usize,
    end: usize,
}

impl<'a> TemplateParser<'a> {
    fn position(&self, offset: usize) -> Position {
        self.origin.advance_over(&self.src[self.origin.offset..offset])
    }

    fn error_at(&self, offset: usize, message: impl Into<String>) -> CompileError {
        CompileError::syntax(self.filename, message).at(Location::at(self.position(offset)))
    }

    fn stray(&self, stop: &Stop, context: &str) -> CompileError {
        let at = stop.offset().unwrap_or(self.end);
        self.error_at(at, format!("unexpected {} {context}", stop.describe()))
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..self.end]
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.rest().starts_with(prefix)
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn at_construct(&self) -> bool {
        let rest = self.rest();
        let mut chars = rest.chars();
        match (chars.next(), chars.next()) {
            (Some('<'), Some(c)) => c == '/' || c.is_ascii_alphabetic() || rest.starts_with("<!--"),
            (Some('{'), Some(c)) => matches!(c, '{' | '#' | ':' | '/'),
            _ => false,
        }
    }

    fn parse_children(&mut self) -> Result<(Vec<TemplateChild>, Stop), CompileError> {
        let mut children = Vec::new();
        loop {
            if self.pos >= self.end {
                return Ok((children, Stop::Eof));
            }
            if self.starts_with("<!--") {
                self.skip_comment()?;
            } else if self.starts_with("</") {
                return Ok((children, self.parse_close_tag()?));
            } else if self.starts_with("<") && self.at_construct() {
                children.push(self.parse_element()?);
            } else if self.starts_with("{{") {
                children.push(self.parse_interpolation()?);
            } else if self.at_construct() {
                match self.parse_block_tag()? {
                    BlockTag::If(condition) => children.push(self.parse_if(condition)?),
                    BlockTag::Each(each) => children.push(self.parse_each(each)?),
                    BlockTag::Stop(stop) => return Ok((children, stop)),
                }
            } else {
                let text = self.parse_text();
                if !(text.trim().is_empty() && text.contains('\n')) {
                    children.push(TemplateChild::Text(text.to_string()));
                }
            }
        }
    }

    fn parse_text(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if (c == '<' || c == '{') && self.pos > start && self.at_construct() {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.src[start..self.pos]
    }

    fn skip_comment(&mut self) -> Result<(), CompileError> {
        let start = self.pos;
        match self.rest().find("-->") {
            Some(idx) => {
                self.pos += idx + 3;
                Ok(())
            }
            None => Err(self.error_at(start, "unterminated comment `<!--`")),
        }
    }

    fn parse_tag_name(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | ':' | '.') {
                self.pos += 1;
            } else {
                break;
            }
        }
        &self.src[start..self.pos]
    }

    fn parse_close_tag(&mut self) -> Result<Stop, CompileError> {
        let at = self.pos;
        self.pos += 2;
        let tag = self.parse_tag_name().to_string();
        self.skip_whitespace();
        if !self.starts_with(">") || tag.is_empty() {
            return Err(self.error_at(at, "malformed closing tag"));
        }
        self.pos += 1;
        Ok(Stop::Close { tag, at })
    }

    fn parse_element(&mut self) -> Result<TemplateChild, CompileError> {
        let open = self.pos;
        self.pos += 1;
        let tag = self.parse_tag_name().to_string();
        let mut attributes = Vec::new();

        let self_closing = loop {
            self.skip_whitespace();
            if self.starts_with("/>") {
                self.pos += 2;
                break true;
            }
            if self.starts_with(">") {
                self.pos += 1;
                break false;
            }
            if self.pos >= self.end {
                return Err(self
                    .error_at(open, format!("unterminated tag `<{tag}`"))
                    .with_suggestion("close the tag with `>`"));
            }
            attributes.push(self.parse_attribute()?);
        };

        if self_closing || VOID_ELEMENTS.contains(&tag.as_str()) {
            return Ok(TemplateChild::Element {
                tag,
                attributes,
                children: Vec::new(),
                self_closing: true,
            });
        }

        let (children, stop) = self.parse_children()?;
        match stop {
            Stop::Close { tag: ref closed, .. } if *closed == tag => Ok(TemplateChild::Element {
                tag,
                attributes,
                children,
                self_closing: false,
            }),
            Stop::Close { tag: closed, at } => Err(self.error_at(
                at,
                format!("mismatched closing tag `</{closed}>`, expected `</{tag}>`"),
            )),
            Stop::Eof => Err(self
                .error_at(open, format!("unclosed element `<{tag}>`"))
                .with_suggestion(format!("add `</{tag}>`"))),
            other => Err(self.stray(&other, &format!("inside `<{tag}>`"))),
        }
    }

    fn parse_attribute(&mut self) -> Result<Attribute, CompileError> {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() || matches!(c, '=' | '>' | '/' | '"' | '\'' | '{' | '<') {
                break;
            }
            self.pos += c.len_utf8();
        }
        let name = self.src[start..self.pos].to_string();
        if name.is_empty() {
            return Err(self.error_at(start, "expected an attribute name"));
        }

        self.skip_whitespace();
        let value = if self.starts_with("=") {
            self.pos += 1;
            self.skip_whitespace();
            Some(self.parse_attribute_value()?)
        } else {
            None
        };

        if let Some(event) = event_name(&name) {
            let handler = match value {
                Some(AttrValue::Expr(expr)) => expr,
                Some(AttrValue::Text { start, end }) => self.parse_expr_range(start, end)?,
                None => {
                    return Err(self
                        .error_at(start, format!("event attribute `{name}` needs a handler"))
                        .with_suggestion(format!("write `{name}={{handler}}`")));
                }
            };
            return Ok(Attribute::Event { event, handler });
        }

        Ok(match value {
            Some(AttrValue::Expr(expr)) => Attribute::Binding { name, expr },
            Some(AttrValue::Text { start, end }) => Attribute::Static {
                name,
                value: Some(self.src[start..end].to_string()),
            },
            None => Attribute::Static { name, value: None },
        })
    }

    fn parse_attribute_value(&mut self) -> Result<AttrValue, CompileError> {
        let start = self.pos;
        match self.peek_char() {
            Some('{') => {
                let close = lexer::hole_end(self.src, start + 1, self.end)
                    .ok_or_else(|| self.error_at(start, "unterminated `{` in attribute value"))?;
                let expr = self.parse_expr_range(start + 1, close)?;
                self.pos = close + 1;
                Ok(AttrValue::Expr(expr))
            }
            Some(q @ ('"' | '\'')) => {
                let inner = start + 1;
                let len = self.src[inner..self.end]
                    .find(q)
                    .ok_or_else(|| self.error_at(start, "unterminated attribute value"))?;
                self.pos = inner + len + 1;
                Ok(AttrValue::Text {
                    start: inner,
                    end: inner + len,
                })
            }
            _ => {
                while let Some(c) = self.peek_char() {
                    if c.is_whitespace() || c == '>' || self.starts_with("/>") {
                        break;
                    }
                    self.pos += c.len_utf8();
                }
                if self.pos == start {
                    return Err(self.error_at(start, "expected an attribute value"));
                }
                Ok(AttrValue::Text {
                    start,
                    end: self.pos,
                })
            }
        }
    }

    fn parse_interpolation(&mut self) -> Result<TemplateChild, CompileError> {
        let open = self.pos;
        let inner = open + 2;
        let close = lexer::hole_end(self.src, inner, self.end)
            .filter(|&close| self.src[close..self.end].starts_with("}}"))
            .ok_or_else(|| {
                self.error_at(open, "unterminated interpolation `{{`")
                    .with_suggestion("close it with `}}`")
            })?;
        let expr = self.parse_expr_range(inner, close)?;
        self.pos = close + 2;
        Ok(TemplateChild::Interpolation(expr))
    }

    fn parse_expr_range(&self, start: usize, end: usize) -> Result<Expr, CompileError> {
        super::parse_expression_range(self.filename, self.src, self.position(start), end)
    }

    /// `{#if}`, `{#each}`, `{:else}`, `{:else if}`, `{/if}` or `{/each}`.
    fn parse_block_tag(&mut self) -> Result<BlockTag, CompileError> {
        let at = self.pos;
        let close = lexer::hole_end(self.src, at + 1, self.end)
            .ok_or_else(|| self.error_at(at, "unterminated block tag"))?;
        let content = &self.src[at + 1..close];
        self.pos = close + 1;

        let keyword_end = content
            .find(|c: char| c.is_whitespace())
            .unwrap_or(content.len());
        let keyword = &content[..keyword_end];
        // Offset of the text after the keyword.
        let body = at + 1 + keyword_end;
        let has_body = !content[keyword_end..].trim().is_empty();

        match keyword {
            "#if" if has_body => Ok(BlockTag::If(self.parse_expr_range(body, close)?)),
            "#each" if has_body => Ok(BlockTag::Each(self.parse_each_header(at, body, close)?)),
            ":else" => {
                let rest = content[keyword_end..].trim_start();
                if rest.is_empty() {
                    return Ok(BlockTag::Stop(Stop::Else { at }));
                }
                match rest.strip_prefix("if") {
                    Some(cond) if cond.starts_with(char::is_whitespace) && !cond.trim().is_empty() => {
                        let cond_start = close - cond.len();
                        let condition = self.parse_expr_range(cond_start, close)?;
                        Ok(BlockTag::Stop(Stop::ElseIf { condition, at }))
                    }
                    _ => Err(self.error_at(at, format!("malformed `{{{content}}}`"))),
                }
            }
            "/if" if !has_body => Ok(BlockTag::Stop(Stop::EndIf { at })),
            "/each" if !has_body => Ok(BlockTag::Stop(Stop::EndEach { at })),
            "#if" => Err(self
                .error_at(at, "`{#if}` needs a condition")
                .with_suggestion("write `{#if condition}`")),
            "#each" => Err(self
                .error_at(at, "`{#each}` needs an iterable")
                .with_suggestion("write `{#each items as item}`")),
            _ => Err(self.error_at(at, format!("unknown block tag `{{{content}}}`"))),
        }
    }

    /// `items as item[, index]`.
    fn parse_each_header(&self, at: usize, start: usize, end: usize) -> Result<EachHeader, CompileError> {
        let text = &self.src[start..end];
        let split = last_top_level_as(text).ok_or_else(|| {
            self.error_at(at, "expected `as` in `{#each}`")
                .with_suggestion("write `{#each items as item}`")
        })?;
        let iterable = self.parse_expr_range(start, start + split)?;

        let mut names = text[split + 4..].split(',').map(str::trim);
        let item_name = names.next().unwrap_or_default();
        let index_name = names.next();
        let valid = |name: &str| {
            let mut chars = name.chars();
            chars.next().is_some_and(is_ident_start) && chars.all(is_ident_continue)
        };
        if !valid(item_name) || index_name.is_some_and(|n| !valid(n)) || names.next().is_some() {
            return Err(self
                .error_at(at, "invalid `{#each}` bindings")
                .with_suggestion("write `{#each items as item, index}`"));
        }
        Ok(EachHeader {
            iterable,
            item_name: item_name.to_string(),
            index_name: index_name.map(str::to_string),
            at,
        })
    }

    fn parse_if(&mut self, condition: Expr) -> Result<TemplateChild, CompileError> {
        let open = self.pos;
        let (then_branch, stop) = self.parse_children()?;
        let else_branch = match stop {
            Stop::EndIf { .. } => None,
            Stop::Else { .. } => {
                let (else_branch, stop) = self.parse_children()?;
                match stop {
                    Stop::EndIf { .. } => Some(else_branch),
                    Stop::Eof | Stop::Close { .. } => return Err(self.unterminated("{#if}", "{/if}", open)),
                    other => return Err(self.stray(&other, "after `{:else}`")),
                }
            }
            Stop::ElseIf { condition, .. } => Some(vec![self.parse_if(condition)?]),
            Stop::Eof | Stop::Close { .. } => return Err(self.unterminated("{#if}", "{/if}", open)),
            other => return Err(self.stray(&other, "inside `{#if}`")),
        };
        Ok(TemplateChild::Conditional {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn parse_each(&mut self, header: EachHeader) -> Result<TemplateChild, CompileError> {
        let (body, stop) = self.parse_children()?;
        match stop {
            Stop::EndEach { .. } => Ok(TemplateChild::Loop {
                iterable: header.iterable,
                item_name: header.item_name,
                index_name: header.index_name,
                body,
            }),
            Stop::Eof | Stop::Close { .. } => Err(self.unterminated("{#each}", "{/each}", header.at)),
            other => Err(self.stray(&other, "inside `{#each}`")),
        }
    }

    fn unterminated(&self, block: &str, closer: &str, at: usize) -> CompileError {
        let at = at.min(self.end);
        self.error_at(at, format!("unterminated template block `{block}`"))
            .with_suggestion(format!("close it with `{closer}`"))
    }
}

enum BlockTag {
    If(Expr),
    Each(EachHeader),
    Stop(Stop),
}

struct EachHeader {
    iterable: Expr,
    item_name: String,
    index_name: Option<String>,
    at: usize,
}

enum AttrValue {
    Expr(Expr),
    Text { start: usize, end: usize },
}

/// `onclick` -> `click`, `on:submit` -> `submit`.
fn event_name(attr: &str) -> Option<String> {
    let rest = attr.strip_prefix("on")?;
    let rest = rest.strip_prefix(':').unwrap_or(rest);
    if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(rest.to_ascii_lowercase())
}

/// Byte index of the last ` as ` outside brackets and strings.
fn last_top_level_as(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut quote = None;
    let mut found = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' | b'`' => quote = Some(b),
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth = depth.saturating_sub(1),
                b' ' if depth == 0 && text[i..].starts_with(" as ") => found = Some(i),
                _ => {}
            },
        }
        i += 1;
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn parse(src: &str) -> Vec<TemplateChild> {
        parse_template("t.mtm", src, Position::start(), src.len()).unwrap()
    }

    fn parse_err(src: &str) -> CompileError {
        parse_template("t.mtm", src, Position::start(), src.len()).unwrap_err()
    }

    #[test]
    fn test_elements_and_attributes() {
        let children =
            parse(r#"<div class="box" id=main hidden data-x={$x}><input type="text" /><br></div>"#);
        let TemplateChild::Element {
            tag,
            attributes,
            children,
            ..
        } = &children[0]
        else {
            panic!("expected element");
        };
        assert_eq!(tag, "div");
        assert_eq!(
            attributes[0],
            Attribute::Static {
                name: "class".into(),
                value: Some("box".into())
            }
        );
        assert_eq!(
            attributes[1],
            Attribute::Static {
                name: "id".into(),
                value: Some("main".into())
            }
        );
        assert_eq!(
            attributes[2],
            Attribute::Static {
                name: "hidden".into(),
                value: None
            }
        );
        assert!(matches!(&attributes[3], Attribute::Binding { name, .. } if name == "data-x"));
        assert_eq!(children.len(), 2);
        assert!(matches!(&children[1], TemplateChild::Element { tag, self_closing: true, .. } if tag == "br"));
    }

    #[test]
    fn test_events() {
        let children = parse(r#"<button onClick={$inc} ondblclick="$reset()">go</button>"#);
        let TemplateChild::Element { attributes, .. } = &children[0] else {
            panic!("expected element");
        };
        assert!(matches!(
            &attributes[0],
            Attribute::Event { event, handler } if event == "click" && *handler == Expr::Ref("inc".into())
        ));
        assert!(matches!(
            &attributes[1],
            Attribute::Event { event, handler: Expr::Call { .. } } if event == "dblclick"
        ));
        assert!(parse_err("<button onclick>x</button>").suggestion.is_some());
    }

    #[test]
    fn test_interpolation_and_text() {
        let children = parse("<p>Count: {{ $count }} of {{ { a: 1 }.a }}</p>");
        let TemplateChild::Element { children, .. } = &children[0] else {
            panic!("expected element");
        };
        assert_eq!(children[0], TemplateChild::Text("Count: ".into()));
        assert_eq!(children[1], TemplateChild::Interpolation(Expr::Ref("count".into())));
        assert_eq!(children[2], TemplateChild::Text(" of ".into()));
        assert!(matches!(children[3], TemplateChild::Interpolation(Expr::Member { .. })));
    }

    #[test]
    fn test_layout_whitespace_is_dropped() {
        let children = parse("\n  <p>a</p>\n  <!-- note -->\n  <p>b</p>\n");
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn test_conditionals() {
        let children = parse("{#if $a}<p>a</p>{:else if $b}<p>b</p>{:else}<p>c</p>{/if}");
        let TemplateChild::Conditional {
            condition,
            else_branch: Some(else_branch),
            ..
        } = &children[0]
        else {
            panic!("expected conditional");
        };
        assert_eq!(*condition, Expr::Ref("a".into()));
        let TemplateChild::Conditional {
            condition,
            else_branch: Some(inner_else),
            ..
        } = &else_branch[0]
        else {
            panic!("expected nested conditional");
        };
        assert_eq!(*condition, Expr::Ref("b".into()));
        assert_eq!(inner_else.len(), 1);
    }

    #[test]
    fn test_loops() {
        let children = parse("<ul>{#each $items.filter(x => x.done) as item, i}<li>{{item}}</li>{/each}</ul>");
        let TemplateChild::Element { children, .. } = &children[0] else {
            panic!("expected element");
        };
        let TemplateChild::Loop {
            iterable,
            item_name,
            index_name,
            body,
        } = &children[0]
        else {
            panic!("expected loop");
        };
        assert!(matches!(iterable, Expr::Call { .. }));
        assert_eq!(item_name, "item");
        assert_eq!(index_name.as_deref(), Some("i"));
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn test_errors() {
        let err = parse_err("<div><span></div>");
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert!(err.message.contains("mismatched"));

        let err = parse_err("{#if $a}<p>x</p>");
        assert!(err.message.contains("unterminated template block"));
        assert!(err.suggestion.is_some());

        assert!(parse_err("{/each}").message.contains("unexpected"));
        assert!(parse_err("<div>").message.contains("unclosed"));
        assert!(parse_err("{#each $items}{/each}").message.contains("as"));
        assert!(parse_err("<p>{{ $a </p>").message.contains("interpolation"));
    }

    #[test]
    fn test_error_positions_are_absolute() {
        let src = "xx\n<p>{{ 1 + }}</p>";
        let err = parse_template("t.mtm", src, Position::start().advance_over("xx\n"), src.len())
            .unwrap_err();
        assert_eq!(err.location.map(|l| l.start_line()), Some(2));
    }
}
