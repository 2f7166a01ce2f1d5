//! Frontmatter header parsing.
//!
//! A file may open with a block delimited by lines consisting solely of
//! `---`. Its content is a restricted YAML-like map:
//!
//! ```text
//! ---
//! target: reactjs
//! props:
//!   title: string
//! channels:
//!   - event: cart:add
//!     emit: addToCart
//! styles: [./card.css]
//! ---
//! ```
//!
//! Supported: `key: scalar`, nested block maps and `- ` lists by indentation,
//! flow lists `[a, b]` and maps `{a: b}`, quoted scalars, `#` comments.

use serde::Serialize;

use crate::config::Target;
use crate::error::CompileError;
use crate::location::{Location, Position};

/// A frontmatter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<MetaValue>),
    Map(Vec<(String, MetaValue)>),
}

impl MetaValue {
    /// The value as a string, if it is a scalar.
    pub fn as_scalar_string(&self) -> Option<String> {
        match self {
            MetaValue::String(s) => Some(s.clone()),
            MetaValue::Bool(b) => Some(b.to_string()),
            MetaValue::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            MetaValue::Null => "null",
            MetaValue::Bool(_) => "boolean",
            MetaValue::Number(_) => "number",
            MetaValue::String(_) => "string",
            MetaValue::List(_) => "list",
            MetaValue::Map(_) => "map",
        }
    }

    fn get(&self, key: &str) -> Option<&MetaValue> {
        match self {
            MetaValue::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

/// A `{event, emit}` channel entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    /// DOM event name dispatched on `window`.
    pub event: String,
    /// Name of the emitting function exposed to the component.
    pub emit: String,
}

/// Parsed frontmatter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frontmatter {
    pub target: Target,
    pub channels: Vec<Channel>,
    /// `(name, type)` in declaration order.
    pub props: Vec<(String, String)>,
    pub styles: Vec<String>,
    /// Unrecognized keys, in order.
    pub extra: Vec<(String, MetaValue)>,
}

impl Frontmatter {
    pub fn has_prop(&self, name: &str) -> bool {
        self.props.iter().any(|(p, _)| p == name)
    }

    pub fn prop_names(&self) -> impl Iterator<Item = &str> {
        self.props.iter().map(|(p, _)| p.as_str())
    }
}

/// A source file split into header and body.
#[derive(Debug)]
pub struct SourceSplit<'src> {
    pub frontmatter: Option<Frontmatter>,
    pub body: &'src str,
    /// Where `body` starts in the file.
    pub body_start: Position,
}

const DELIMITER: &str = "---";

/// Split `source` into its frontmatter and body, parsing the frontmatter.
pub fn split<'src>(source: &'src str, file: &str) -> Result<SourceSplit<'src>, CompileError> {
    let mut lines = source.split_inclusive('\n');
    let first = match lines.next() {
        Some(line) => line,
        None => {
            return Ok(SourceSplit {
                frontmatter: None,
                body: source,
                body_start: Position::start(),
            });
        }
    };
    if trim_line_end(first) != DELIMITER {
        return Ok(SourceSplit {
            frontmatter: None,
            body: source,
            body_start: Position::start(),
        });
    }

    let header_start = first.len();
    let mut offset = header_start;
    let mut line_no = 2;
    for line in lines {
        if trim_line_end(line) == DELIMITER {
            let header = &source[header_start..offset];
            let body_offset = offset + line.len();
            let frontmatter = parse(header, file, 2)?;
            return Ok(SourceSplit {
                frontmatter: Some(frontmatter),
                body: &source[body_offset..],
                body_start: Position::new(line_no + 1, 1, body_offset),
            });
        }
        offset += line.len();
        line_no += 1;
    }

    Err(CompileError::frontmatter(file, "unterminated frontmatter block")
        .with_suggestion("close the frontmatter with a line containing only `---`")
        .at(Location::at(Position::start())))
}

fn trim_line_end(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

/// Parse frontmatter content. `first_line` is the file line of its first line.
pub fn parse(header: &str, file: &str, first_line: u32) -> Result<Frontmatter, CompileError> {
    let root = YamlParser::new(header, file, first_line)?.parse_document()?;
    interpret(root, file, first_line)
}

fn interpret(root: MetaValue, file: &str, first_line: u32) -> Result<Frontmatter, CompileError> {
    let header_loc = Location::at(Position::new(first_line, 1, 0));
    let entries = match root {
        MetaValue::Map(entries) => entries,
        MetaValue::Null => Vec::new(),
        other => {
            return Err(CompileError::frontmatter(
                file,
                format!("frontmatter must be a map of keys, found a {}", other.kind()),
            )
            .at(header_loc));
        }
    };

    let mut target = None;
    let mut channels = Vec::new();
    let mut props = Vec::new();
    let mut styles = Vec::new();
    let mut extra = Vec::new();

    for (key, value) in entries {
        match key.as_str() {
            "target" => {
                let name = value.as_scalar_string().ok_or_else(|| {
                    CompileError::frontmatter(file, "`target` must be a plain value").at(header_loc)
                })?;
                let parsed = name.parse::<Target>().map_err(|e| {
                    CompileError::frontmatter(file, e.to_string())
                        .with_suggestion("use one of `reactjs`, `vue`, `solid` or `svelte`")
                        .at(header_loc)
                })?;
                target = Some(parsed);
            }
            "channels" => channels = interpret_channels(value, file, header_loc)?,
            "props" => props = interpret_props(value, file, header_loc)?,
            "styles" => {
                styles = match value {
                    MetaValue::Null => Vec::new(),
                    MetaValue::String(s) => vec![s],
                    MetaValue::List(items) => items
                        .into_iter()
                        .map(|item| {
                            item.as_scalar_string().ok_or_else(|| {
                                CompileError::frontmatter(file, "`styles` entries must be paths")
                                    .at(header_loc)
                            })
                        })
                        .collect::<Result<_, _>>()?,
                    other => {
                        return Err(CompileError::frontmatter(
                            file,
                            format!("`styles` must be a list, found a {}", other.kind()),
                        )
                        .at(header_loc));
                    }
                }
            }
            _ => extra.push((key, value)),
        }
    }

    let target = target.ok_or_else(|| {
        CompileError::frontmatter(file, "missing required `target` key")
            .with_suggestion("add `target: reactjs` (or vue, solid, svelte) to the frontmatter")
            .at(header_loc)
    })?;

    Ok(Frontmatter {
        target,
        channels,
        props,
        styles,
        extra,
    })
}

fn interpret_channels(
    value: MetaValue,
    file: &str,
    loc: Location,
) -> Result<Vec<Channel>, CompileError> {
    let items = match value {
        MetaValue::Null => return Ok(Vec::new()),
        MetaValue::List(items) => items,
        other => {
            return Err(CompileError::frontmatter(
                file,
                format!("`channels` must be a list, found a {}", other.kind()),
            )
            .at(loc));
        }
    };

    let mut channels = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let field = |name: &str| {
            item.get(name).and_then(MetaValue::as_scalar_string).ok_or_else(|| {
                CompileError::frontmatter(
                    file,
                    format!("channel entry {} is missing `{name}`", index + 1),
                )
                .with_suggestion("every channel needs both `event` and `emit`")
                .at(loc)
            })
        };
        channels.push(Channel {
            event: field("event")?,
            emit: field("emit")?,
        });
    }
    Ok(channels)
}

fn interpret_props(
    value: MetaValue,
    file: &str,
    loc: Location,
) -> Result<Vec<(String, String)>, CompileError> {
    match value {
        MetaValue::Null => Ok(Vec::new()),
        MetaValue::Map(entries) => entries
            .into_iter()
            .map(|(name, ty)| match ty {
                MetaValue::Null => Ok((name, "any".to_string())),
                other => other.as_scalar_string().map(|t| (name, t)).ok_or_else(|| {
                    CompileError::frontmatter(file, "prop types must be type names").at(loc)
                }),
            })
            .collect(),
        MetaValue::List(items) => items
            .into_iter()
            .map(|item| {
                item.as_scalar_string().map(|n| (n, "any".to_string())).ok_or_else(|| {
                    CompileError::frontmatter(file, "prop list entries must be names").at(loc)
                })
            })
            .collect(),
        other => Err(CompileError::frontmatter(
            file,
            format!("`props` must be a map of name to type, found a {}", other.kind()),
        )
        .at(loc)),
    }
}

#[derive(Debug, Clone)]
struct Line {
    indent: usize,
    content: String,
    number: u32,
}

struct YamlParser<'a> {
    lines: Vec<Line>,
    pos: usize,
    file: &'a str,
}

impl<'a> YamlParser<'a> {
    fn new(header: &str, file: &'a str, first_line: u32) -> Result<Self, CompileError> {
        let mut lines = Vec::new();
        for (i, raw) in header.lines().enumerate() {
            let number = first_line + i as u32;
            let without_comment = strip_comment(raw);
            if without_comment.trim().is_empty() {
                continue;
            }
            if without_comment.starts_with('\t') {
                return Err(CompileError::frontmatter(file, "tabs are not allowed for indentation")
                    .at(Location::at(Position::new(number, 1, 0))));
            }
            let indent = without_comment.len() - without_comment.trim_start().len();
            lines.push(Line {
                indent,
                content: without_comment.trim().to_string(),
                number,
            });
        }
        Ok(Self { lines, pos: 0, file })
    }

    fn error(&self, number: u32, message: impl Into<String>) -> CompileError {
        CompileError::frontmatter(self.file, message).at(Location::at(Position::new(number, 1, 0)))
    }

    fn parse_document(&mut self) -> Result<MetaValue, CompileError> {
        let Some(first) = self.lines.first() else {
            return Ok(MetaValue::Null);
        };
        let indent = first.indent;
        let value = self.parse_block(indent)?;
        if let Some(line) = self.lines.get(self.pos) {
            return Err(self.error(line.number, "unexpected indentation"));
        }
        Ok(value)
    }

    fn parse_block(&mut self, indent: usize) -> Result<MetaValue, CompileError> {
        match self.lines.get(self.pos) {
            Some(line) if is_list_item(&line.content) => self.parse_list(indent),
            Some(_) => self.parse_map(indent),
            None => Ok(MetaValue::Null),
        }
    }

    fn parse_map(&mut self, indent: usize) -> Result<MetaValue, CompileError> {
        let mut entries: Vec<(String, MetaValue)> = Vec::new();
        while let Some(line) = self.lines.get(self.pos).cloned() {
            if line.indent < indent {
                break;
            }
            if line.indent > indent {
                return Err(self.error(line.number, "unexpected indentation"));
            }
            if is_list_item(&line.content) {
                return Err(self.error(line.number, "unexpected list item in a map"));
            }
            let (key, rest) = split_key(&line.content)
                .ok_or_else(|| self.error(line.number, "expected `key: value`"))?;
            self.pos += 1;

            let value = if rest.is_empty() {
                match self.lines.get(self.pos) {
                    Some(next) if next.indent > indent => {
                        let child = next.indent;
                        self.parse_block(child)?
                    }
                    Some(next) if next.indent == indent && is_list_item(&next.content) => {
                        self.parse_list(indent)?
                    }
                    _ => MetaValue::Null,
                }
            } else {
                parse_inline(rest).map_err(|msg| self.error(line.number, msg))?
            };

            if entries.iter().any(|(k, _)| *k == key) {
                return Err(self.error(line.number, format!("duplicate key `{key}`")));
            }
            entries.push((key, value));
        }
        Ok(MetaValue::Map(entries))
    }

    fn parse_list(&mut self, indent: usize) -> Result<MetaValue, CompileError> {
        let mut items = Vec::new();
        while let Some(line) = self.lines.get(self.pos).cloned() {
            if line.indent != indent || !is_list_item(&line.content) {
                if line.indent > indent {
                    return Err(self.error(line.number, "unexpected indentation"));
                }
                break;
            }
            let rest = line.content[1..].trim_start();
            if rest.is_empty() {
                self.pos += 1;
                match self.lines.get(self.pos) {
                    Some(next) if next.indent > indent => {
                        let child = next.indent;
                        items.push(self.parse_block(child)?);
                    }
                    _ => items.push(MetaValue::Null),
                }
            } else if split_key(rest).is_some() && !rest.starts_with(['[', '{', '"', '\'']) {
                // `- key: value` opens a map whose keys align with `key`.
                let child = indent + (line.content.len() - rest.len());
                self.lines[self.pos] = Line {
                    indent: child,
                    content: rest.to_string(),
                    number: line.number,
                };
                items.push(self.parse_map(child)?);
            } else {
                self.pos += 1;
                items.push(parse_inline(rest).map_err(|msg| self.error(line.number, msg))?);
            }
        }
        Ok(MetaValue::List(items))
    }
}

fn is_list_item(content: &str) -> bool {
    content == "-" || content.starts_with("- ")
}

/// Remove a trailing `# comment` that is outside quotes.
fn strip_comment(line: &str) -> &str {
    let mut quote = None;
    let mut prev_is_space = true;
    for (i, c) in line.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '#' && prev_is_space => return &line[..i],
            None => {}
        }
        prev_is_space = c.is_whitespace();
    }
    line
}

/// Split `key: rest` at the first `:` followed by a space or end of line.
fn split_key(content: &str) -> Option<(String, &str)> {
    let (key, rest) = if let Some(quote @ ('"' | '\'')) = content.chars().next() {
        let close = content[1..].find(quote)? + 1;
        let key = content[1..close].to_string();
        let rest = content[close + 1..].strip_prefix(':')?;
        (key, rest)
    } else {
        let bytes = content.as_bytes();
        let idx = (0..bytes.len()).find(|&i| {
            bytes[i] == b':' && (i + 1 == bytes.len() || bytes[i + 1] == b' ')
        })?;
        (content[..idx].trim().to_string(), &content[idx + 1..])
    };
    if key.is_empty() || key.contains(['[', '{', ',']) {
        return None;
    }
    Some((key, rest.trim()))
}

fn parse_inline(text: &str) -> Result<MetaValue, String> {
    let mut flow = FlowParser { src: text, pos: 0 };
    let value = flow.value(false)?;
    flow.skip_ws();
    if flow.pos < text.len() {
        return Err(format!("unexpected `{}` after value", &text[flow.pos..]));
    }
    Ok(value)
}

struct FlowParser<'s> {
    src: &'s str,
    pos: usize,
}

impl FlowParser<'_> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn value(&mut self, in_flow: bool) -> Result<MetaValue, String> {
        self.skip_ws();
        match self.peek() {
            Some('[') => self.list(),
            Some('{') => self.map(),
            Some(q @ ('"' | '\'')) => self.quoted(q).map(MetaValue::String),
            Some(_) => Ok(plain_scalar(self.plain(in_flow))),
            None => Ok(MetaValue::Null),
        }
    }

    fn plain(&mut self, in_flow: bool) -> &str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if in_flow && matches!(c, ',' | ']' | '}') {
                break;
            }
            if in_flow && c == ':' && self.src[self.pos + 1..].starts_with([' ', ',', '}']) {
                break;
            }
            self.pos += c.len_utf8();
        }
        self.src[start..self.pos].trim()
    }

    fn quoted(&mut self, quote: char) -> Result<String, String> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            let c = self.peek().ok_or_else(|| "unterminated quoted string".to_string())?;
            self.pos += c.len_utf8();
            if c == quote {
                // `''` is an escaped quote in single-quoted scalars.
                if quote == '\'' && self.peek() == Some('\'') {
                    self.pos += 1;
                    out.push('\'');
                    continue;
                }
                return Ok(out);
            }
            if c == '\\' && quote == '"' {
                let escaped = self.peek().ok_or_else(|| "unterminated escape".to_string())?;
                self.pos += escaped.len_utf8();
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                continue;
            }
            out.push(c);
        }
    }

    fn list(&mut self) -> Result<MetaValue, String> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some(']') => {
                    self.pos += 1;
                    return Ok(MetaValue::List(items));
                }
                None => return Err("unterminated `[` list".to_string()),
                _ => {}
            }
            items.push(self.value(true)?);
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(']') => {}
                _ => return Err("expected `,` or `]` in list".to_string()),
            }
        }
    }

    fn map(&mut self) -> Result<MetaValue, String> {
        self.pos += 1;
        let mut entries = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some('}') => {
                    self.pos += 1;
                    return Ok(MetaValue::Map(entries));
                }
                None => return Err("unterminated `{` map".to_string()),
                _ => {}
            }
            let key = match self.value(true)? {
                MetaValue::String(s) => s,
                other => other
                    .as_scalar_string()
                    .ok_or_else(|| "map keys must be scalars".to_string())?,
            };
            self.skip_ws();
            if self.peek() != Some(':') {
                return Err(format!("expected `:` after key `{key}`"));
            }
            self.pos += 1;
            let value = self.value(true)?;
            entries.push((key, value));
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {}
                _ => return Err("expected `,` or `}` in map".to_string()),
            }
        }
    }
}

fn plain_scalar(text: &str) -> MetaValue {
    match text {
        "" | "~" | "null" => MetaValue::Null,
        "true" => MetaValue::Bool(true),
        "false" => MetaValue::Bool(false),
        _ => match text.parse::<f64>() {
            Ok(n) if text.starts_with(|c: char| c.is_ascii_digit() || c == '-') => {
                MetaValue::Number(n)
            }
            _ => MetaValue::String(text.to_string()),
        },
    }
}
