//! Template rendering shared by the backends.
//!
//! Elements, text and whitespace are handled here. Each backend supplies a
//! [`Dialect`] for attribute syntax, interpolation, conditionals and loops.

use crate::ast::{Attribute, Expr, TemplateChild};
use crate::error::CompileError;

use super::printer::Printer;

/// One arm of a flattened `if` / `else if` / `else` chain; `None` is `else`.
pub type Branch<'a> = (Option<&'a Expr>, &'a [TemplateChild]);

pub trait Dialect {
    /// An interpolated value in child position: `{x}` or `{{ x }}`.
    fn interpolation(&mut self, expr: &Expr) -> Result<String, CompileError>;

    fn attribute(&mut self, tag: &str, attr: &Attribute) -> Result<String, CompileError>;

    /// Literal text, already whitespace-normalized.
    fn text(&self, text: &str) -> String;

    fn conditional(&mut self, out: &mut Printer, branches: &[Branch<'_>]) -> Result<(), CompileError>;

    fn each(
        &mut self,
        out: &mut Printer,
        iterable: &Expr,
        item: &str,
        index: Option<&str>,
        body: &[TemplateChild],
    ) -> Result<(), CompileError>;
}

/// Render a list of children, one construct per line.
pub fn render_children<D: Dialect>(
    dialect: &mut D,
    out: &mut Printer,
    children: &[TemplateChild],
) -> Result<(), CompileError> {
    for child in children {
        match child {
            TemplateChild::Text(text) => {
                let text = collapse_whitespace(text);
                let text = text.trim();
                if !text.is_empty() {
                    out.line(dialect.text(text));
                }
            }
            TemplateChild::Interpolation(expr) => {
                let rendered = dialect.interpolation(expr)?;
                out.line(rendered);
            }
            TemplateChild::Element {
                tag,
                attributes,
                children,
                self_closing,
            } => render_element(dialect, out, tag, attributes, children, *self_closing)?,
            TemplateChild::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                let branches = flatten_conditional(condition, then_branch, else_branch.as_deref());
                dialect.conditional(out, &branches)?;
            }
            TemplateChild::Loop {
                iterable,
                item_name,
                index_name,
                body,
            } => dialect.each(out, iterable, item_name, index_name.as_deref(), body)?,
        }
    }
    Ok(())
}

fn render_element<D: Dialect>(
    dialect: &mut D,
    out: &mut Printer,
    tag: &str,
    attributes: &[Attribute],
    children: &[TemplateChild],
    self_closing: bool,
) -> Result<(), CompileError> {
    let mut open = format!("<{tag}");
    for attr in attributes {
        open.push(' ');
        open.push_str(&dialect.attribute(tag, attr)?);
    }

    if self_closing {
        out.line(format!("{open} />"));
        return Ok(());
    }
    if children.is_empty() {
        out.line(format!("{open}></{tag}>"));
        return Ok(());
    }

    if children.iter().all(is_inline) {
        let mut inner = String::new();
        let last = children.len() - 1;
        for (i, child) in children.iter().enumerate() {
            match child {
                TemplateChild::Text(text) => {
                    let mut text = collapse_whitespace(text);
                    if i == 0 {
                        text = text.trim_start().to_string();
                    }
                    if i == last {
                        text = text.trim_end().to_string();
                    }
                    inner.push_str(&dialect.text(&text));
                }
                TemplateChild::Interpolation(expr) => inner.push_str(&dialect.interpolation(expr)?),
                _ => {}
            }
        }
        out.line(format!("{open}>{inner}</{tag}>"));
        return Ok(());
    }

    out.line(format!("{open}>"));
    out.indent();
    render_children(dialect, out, children)?;
    out.dedent();
    out.line(format!("</{tag}>"));
    Ok(())
}

fn is_inline(child: &TemplateChild) -> bool {
    matches!(child, TemplateChild::Text(_) | TemplateChild::Interpolation(_))
}

/// Turn nested `else { if .. }` into a flat arm list.
pub fn flatten_conditional<'a>(
    condition: &'a Expr,
    then_branch: &'a [TemplateChild],
    else_branch: Option<&'a [TemplateChild]>,
) -> Vec<Branch<'a>> {
    let mut branches = vec![(Some(condition), then_branch)];
    let mut rest = else_branch;
    while let Some(children) = rest {
        match children {
            [
                TemplateChild::Conditional {
                    condition,
                    then_branch,
                    else_branch,
                },
            ] => {
                branches.push((Some(condition), then_branch.as_slice()));
                rest = else_branch.as_deref();
            }
            _ => {
                branches.push((None, children));
                rest = None;
            }
        }
    }
    branches
}

/// Replace each whitespace run that spans a line break with one space.
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = String::new();
    for c in text.chars() {
        if c.is_whitespace() {
            run.push(c);
            continue;
        }
        flush_run(&mut out, &mut run);
        out.push(c);
    }
    flush_run(&mut out, &mut run);
    out
}

fn flush_run(out: &mut String, run: &mut String) {
    if run.contains('\n') {
        out.push(' ');
    } else {
        out.push_str(run);
    }
    run.clear();
}

/// Braces as character references so literal text never opens an
/// interpolation.
pub fn escape_braces(text: &str) -> String {
    text.replace('{', "&#123;").replace('}', "&#125;")
}

/// Whether the template needs a fragment wrapper to form a single JSX root.
pub fn needs_fragment(children: &[TemplateChild]) -> bool {
    let significant: Vec<&TemplateChild> = children
        .iter()
        .filter(|c| !matches!(c, TemplateChild::Text(t) if t.trim().is_empty()))
        .collect();
    !matches!(significant.as_slice(), [TemplateChild::Element { .. }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::printer::print_expr;
    use crate::location::Position;
    use crate::parser::template::parse_template;

    struct Plain;

    impl Dialect for Plain {
        fn interpolation(&mut self, expr: &Expr) -> Result<String, CompileError> {
            Ok(format!("{{{}}}", print_expr(expr, 0)))
        }

        fn attribute(&mut self, _tag: &str, attr: &Attribute) -> Result<String, CompileError> {
            Ok(match attr {
                Attribute::Static { name, value: Some(v) } => format!("{name}=\"{v}\""),
                Attribute::Static { name, value: None } => name.clone(),
                Attribute::Binding { name, expr } => format!("{name}={{{}}}", print_expr(expr, 0)),
                Attribute::Event { event, handler } => {
                    format!("on{event}={{{}}}", print_expr(handler, 0))
                }
            })
        }

        fn text(&self, text: &str) -> String {
            text.to_string()
        }

        fn conditional(&mut self, out: &mut Printer, branches: &[Branch<'_>]) -> Result<(), CompileError> {
            for (condition, body) in branches {
                match condition {
                    Some(c) => out.line(format!("if {}", print_expr(c, 0))),
                    None => out.line("else"),
                }
                out.indent();
                render_children(self, out, body)?;
                out.dedent();
            }
            Ok(())
        }

        fn each(
            &mut self,
            out: &mut Printer,
            iterable: &Expr,
            item: &str,
            _index: Option<&str>,
            body: &[TemplateChild],
        ) -> Result<(), CompileError> {
            out.line(format!("each {} as {item}", print_expr(iterable, 0)));
            out.indent();
            render_children(self, out, body)?;
            out.dedent();
            Ok(())
        }
    }

    fn render(src: &str) -> String {
        let children = parse_template("t.mtm", src, Position::start(), src.len()).unwrap();
        let mut out = Printer::new();
        render_children(&mut Plain, &mut out, &children).unwrap();
        out.finish()
    }

    #[test]
    fn test_inline_and_block_elements() {
        assert_eq!(
            render("<div class=\"card\">\n  <h1>Hello {{$name}}!</h1>\n  <br>\n  <input disabled />\n</div>"),
            "<div class=\"card\">\n  <h1>Hello {$name}!</h1>\n  <br />\n  <input disabled />\n</div>\n"
        );
    }

    #[test]
    fn test_inline_text_collapses_line_breaks() {
        assert_eq!(render("<p>\n  one\n  two\n</p>"), "<p>one two</p>\n");
        assert_eq!(render("<span></span>"), "<span></span>\n");
    }

    #[test]
    fn test_else_if_chain_is_flattened() {
        let out = render("{#if $a}<p>a</p>{:else if $b}<p>b</p>{:else}<p>c</p>{/if}");
        assert_eq!(out, "if $a\n  <p>a</p>\nif $b\n  <p>b</p>\nelse\n  <p>c</p>\n");
    }

    #[test]
    fn test_needs_fragment() {
        let one = parse_template("t.mtm", "\n<div></div>\n", Position::start(), 13).unwrap();
        assert!(!needs_fragment(&one));
        let two = parse_template("t.mtm", "<a></a><b></b>", Position::start(), 14).unwrap();
        assert!(needs_fragment(&two));
    }
}
