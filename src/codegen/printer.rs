//! JavaScript source printing shared by every backend.
//!
//! Backends lower the AST into plain JavaScript first; printing never looks
//! up what a name refers to. Indentation is two spaces.

use crate::ast::{Expr, FunctionBody, FunctionDeclaration, Param, Property, PropertyKey, Stmt};

pub const INDENT: &str = "  ";

/// Line-oriented output buffer.
#[derive(Debug, Default)]
pub struct Printer {
    out: String,
    level: usize,
}

impl Printer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn indent(&mut self) {
        self.level += 1;
    }

    pub fn dedent(&mut self) {
        self.level = self.level.saturating_sub(1);
    }

    /// Write `text` at the current indentation. Continuation lines of
    /// multi-line text carry their own indentation.
    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.level {
                self.out.push_str(INDENT);
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    /// An empty line, never two in a row.
    pub fn blank(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    /// Print `expr` for the current indentation.
    pub fn expr(&self, expr: &Expr) -> String {
        print_expr(expr, self.level)
    }

    pub fn function(&self, func: &FunctionDeclaration) -> String {
        print_function(func, self.level)
    }

    pub fn finish(mut self) -> String {
        while self.out.ends_with("\n\n") {
            self.out.pop();
        }
        self.out
    }
}

fn pad(level: usize) -> String {
    INDENT.repeat(level)
}

/// Print an expression whose first line sits at indentation `level`.
pub fn print_expr(expr: &Expr, level: usize) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr, level);
    out
}

fn write_list(out: &mut String, items: &[Expr], level: usize) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(out, item, level);
    }
}

fn write_expr(out: &mut String, expr: &Expr, level: usize) {
    match expr {
        Expr::Number(raw) => out.push_str(raw),
        Expr::String { value, quote } => {
            out.push(*quote);
            out.push_str(value);
            out.push(*quote);
        }
        Expr::Template { quasis, exprs } => {
            out.push('`');
            for (i, quasi) in quasis.iter().enumerate() {
                out.push_str(quasi);
                if let Some(e) = exprs.get(i) {
                    out.push_str("${");
                    write_expr(out, e, level);
                    out.push('}');
                }
            }
            out.push('`');
        }
        Expr::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Expr::Null => out.push_str("null"),
        Expr::Undefined => out.push_str("undefined"),
        Expr::Ident(name) => out.push_str(name),
        // Backends lower every `$name`; this keeps unlowered trees printable.
        Expr::Ref(name) => {
            out.push('$');
            out.push_str(name);
        }
        Expr::Array(items) => {
            out.push('[');
            write_list(out, items, level);
            out.push(']');
        }
        Expr::Object(props) => write_object(out, props, level),
        Expr::Spread(inner) => {
            out.push_str("...");
            write_expr(out, inner, level);
        }
        Expr::Unary { op, arg } => {
            out.push_str(op);
            if op.chars().all(char::is_alphabetic) {
                out.push(' ');
            } else if let Expr::Unary { op: inner, .. } | Expr::Update { op: inner, prefix: true, .. } =
                arg.as_ref()
            {
                // `- -x`, `+ ++x`
                if inner.starts_with(op.chars().next().unwrap_or(' ')) {
                    out.push(' ');
                }
            }
            write_expr(out, arg, level);
        }
        Expr::Update { op, prefix, target } => {
            if *prefix {
                out.push_str(op);
                write_expr(out, target, level);
            } else {
                write_expr(out, target, level);
                out.push_str(op);
            }
        }
        Expr::Binary { op, left, right } => {
            write_expr(out, left, level);
            out.push(' ');
            out.push_str(op);
            out.push(' ');
            write_expr(out, right, level);
        }
        Expr::Assign { op, target, value } => {
            write_expr(out, target, level);
            out.push(' ');
            out.push_str(op);
            out.push(' ');
            write_expr(out, value, level);
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            write_expr(out, test, level);
            out.push_str(" ? ");
            write_expr(out, consequent, level);
            out.push_str(" : ");
            write_expr(out, alternate, level);
        }
        Expr::Call {
            callee,
            args,
            optional,
        } => {
            write_callee(out, callee, level);
            if *optional {
                out.push_str("?.");
            }
            out.push('(');
            write_list(out, args, level);
            out.push(')');
        }
        Expr::New { callee, args } => {
            out.push_str("new ");
            write_callee(out, callee, level);
            out.push('(');
            write_list(out, args, level);
            out.push(')');
        }
        Expr::Member {
            object,
            property,
            optional,
        } => {
            write_callee(out, object, level);
            out.push_str(if *optional { "?." } else { "." });
            out.push_str(property);
        }
        Expr::Index {
            object,
            index,
            optional,
        } => {
            write_callee(out, object, level);
            if *optional {
                out.push_str("?.");
            }
            out.push('[');
            write_expr(out, index, level);
            out.push(']');
        }
        Expr::Arrow {
            is_async,
            params,
            body,
        } => {
            if *is_async {
                out.push_str("async ");
            }
            write_params(out, params, level);
            out.push_str(" => ");
            match body.as_ref() {
                FunctionBody::Expr(e) if matches!(e.as_ref(), Expr::Object(_)) => {
                    out.push('(');
                    write_expr(out, e, level);
                    out.push(')');
                }
                FunctionBody::Expr(e) => write_expr(out, e, level),
                FunctionBody::Block(stmts) => write_block(out, stmts, level),
            }
        }
        Expr::Await(inner) => {
            out.push_str("await ");
            write_expr(out, inner, level);
        }
        Expr::Paren(inner) => {
            out.push('(');
            write_expr(out, inner, level);
            out.push(')');
        }
    }
}

/// Objects of member access and calls need parentheses when they would
/// otherwise bind differently.
fn write_callee(out: &mut String, expr: &Expr, level: usize) {
    let wrap = matches!(
        expr,
        Expr::Arrow { .. }
            | Expr::Binary { .. }
            | Expr::Assign { .. }
            | Expr::Conditional { .. }
            | Expr::Unary { .. }
            | Expr::Await(_)
            | Expr::Object(_)
    ) || matches!(expr, Expr::Number(raw) if !raw.contains(['.', 'e', 'E', 'x', 'X']));
    if wrap {
        out.push('(');
        write_expr(out, expr, level);
        out.push(')');
    } else {
        write_expr(out, expr, level);
    }
}

fn write_object(out: &mut String, props: &[Property], level: usize) {
    if props.is_empty() {
        out.push_str("{}");
        return;
    }
    out.push_str("{ ");
    for (i, prop) in props.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        match prop {
            Property::KeyValue { key, value } => {
                match key {
                    PropertyKey::Ident(name) | PropertyKey::Number(name) => out.push_str(name),
                    PropertyKey::String { value, quote } => {
                        out.push(*quote);
                        out.push_str(value);
                        out.push(*quote);
                    }
                    PropertyKey::Computed(k) => {
                        out.push('[');
                        write_expr(out, k, level);
                        out.push(']');
                    }
                }
                out.push_str(": ");
                write_expr(out, value, level);
            }
            Property::Shorthand(name) => out.push_str(name),
            Property::Spread(e) => {
                out.push_str("...");
                write_expr(out, e, level);
            }
        }
    }
    out.push_str(" }");
}

fn write_params(out: &mut String, params: &[Param], level: usize) {
    out.push('(');
    for (i, param) in params.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        if param.rest {
            out.push_str("...");
        }
        out.push_str(&param.name);
        if let Some(default) = &param.default {
            out.push_str(" = ");
            write_expr(out, default, level);
        }
    }
    out.push(')');
}

/// `{ ... }` with statements one level deeper than `level`.
fn write_block(out: &mut String, stmts: &[Stmt], level: usize) {
    if stmts.is_empty() {
        out.push_str("{}");
        return;
    }
    out.push_str("{\n");
    for stmt in stmts {
        out.push_str(&pad(level + 1));
        write_stmt(out, stmt, level + 1);
        out.push('\n');
    }
    out.push_str(&pad(level));
    out.push('}');
}

fn write_stmt(out: &mut String, stmt: &Stmt, level: usize) {
    match stmt {
        Stmt::Expr(e) => {
            let text = print_expr(e, level);
            // A line starting with these would continue the previous one.
            if text.starts_with(['(', '[', '`']) {
                out.push(';');
            }
            out.push_str(&text);
        }
        Stmt::VarDecl { kind, name, init } => {
            out.push_str(kind.as_str());
            out.push(' ');
            out.push_str(name);
            if let Some(init) = init {
                out.push_str(" = ");
                write_expr(out, init, level);
            }
        }
        Stmt::If {
            test,
            consequent,
            alternate,
        } => {
            out.push_str("if (");
            write_expr(out, test, level);
            out.push_str(") ");
            write_branch(out, consequent, level);
            if let Some(alternate) = alternate {
                if matches!(consequent.as_ref(), Stmt::Block(_)) {
                    out.push(' ');
                } else {
                    out.push('\n');
                    out.push_str(&pad(level));
                }
                out.push_str("else ");
                write_branch(out, alternate, level);
            }
        }
        Stmt::Block(stmts) => write_block(out, stmts, level),
        Stmt::Return(value) => {
            out.push_str("return");
            if let Some(value) = value {
                out.push(' ');
                write_expr(out, value, level);
            }
        }
        Stmt::ForOf {
            kind,
            binding,
            iterable,
            body,
        } => {
            out.push_str("for (");
            out.push_str(kind.as_str());
            out.push(' ');
            out.push_str(binding);
            out.push_str(" of ");
            write_expr(out, iterable, level);
            out.push_str(") ");
            write_branch(out, body, level);
        }
        Stmt::While { test, body } => {
            out.push_str("while (");
            write_expr(out, test, level);
            out.push_str(") ");
            write_branch(out, body, level);
        }
    }
}

fn write_branch(out: &mut String, stmt: &Stmt, level: usize) {
    write_stmt(out, stmt, level);
}

/// A named function as a declaration: `const name = (..) => ..` for arrow
/// functions, `function name(..) {..}` otherwise.
pub fn print_function(func: &FunctionDeclaration, level: usize) -> String {
    let mut out = String::new();
    let is_async = func.is_async || func.declared_async;
    if func.is_arrow {
        out.push_str("const ");
        out.push_str(&func.name);
        out.push_str(" = ");
        if is_async {
            out.push_str("async ");
        }
        write_params(&mut out, &func.params, level);
        out.push_str(" => ");
        match &func.body {
            FunctionBody::Expr(e) if matches!(e.as_ref(), Expr::Object(_)) => {
                out.push('(');
                write_expr(&mut out, e, level);
                out.push(')');
            }
            FunctionBody::Expr(e) => write_expr(&mut out, e, level),
            FunctionBody::Block(stmts) => write_block(&mut out, stmts, level),
        }
    } else {
        if is_async {
            out.push_str("async ");
        }
        out.push_str("function ");
        out.push_str(&func.name);
        write_params(&mut out, &func.params, level);
        out.push(' ');
        match &func.body {
            FunctionBody::Block(stmts) => write_block(&mut out, stmts, level),
            FunctionBody::Expr(e) => {
                write_block(&mut out, &[Stmt::Return(Some(e.as_ref().clone()))], level)
            }
        }
    }
    out
}

/// Escape text for a JSX child position.
pub fn escape_jsx_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '{' => out.push_str("{'{'}"),
            '}' => out.push_str("{'}'}"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape a value placed inside a double-quoted attribute.
pub fn escape_attribute(value: &str) -> String {
    value.replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;

    fn roundtrip(src: &str) -> String {
        print_expr(&parse_expression(src, "t.mtm").unwrap(), 0)
    }

    #[test]
    fn test_expressions() {
        assert_eq!(roundtrip("a+b*(c-1)"), "a + b * (c - 1)");
        assert_eq!(roundtrip("x?.y[0]?.(1)"), "x?.y[0]?.(1)");
        assert_eq!(roundtrip("typeof x === 'string'"), "typeof x === 'string'");
        assert_eq!(roundtrip("`a${b}c`"), "`a${b}c`");
        assert_eq!(roundtrip("{a:1,b,...c}"), "{ a: 1, b, ...c }");
        assert_eq!(roundtrip("async (a, ...r) => await f(a)"), "async (a, ...r) => await f(a)");
        assert_eq!(roundtrip("-(-x)"), "-(-x)");
        assert_eq!(roundtrip("new Date()"), "new Date()");
    }

    #[test]
    fn test_object_arrow_body_is_wrapped() {
        assert_eq!(roundtrip("() => ({ a: 1 })"), "() => ({ a: 1 })");
        let arrow = Expr::arrow(vec![], Expr::Object(vec![Property::Shorthand("a".into())]));
        assert_eq!(print_expr(&arrow, 0), "() => ({ a })");
    }

    #[test]
    fn test_block_bodies() {
        let out = roundtrip("(x) => { if (x) { return 1 } else return 2; for (const y of x) f(y) }");
        assert_eq!(
            out,
            "(x) => {\n  if (x) {\n    return 1\n  } else return 2\n  for (const y of x) f(y)\n}"
        );
    }

    #[test]
    fn test_statement_guard() {
        let out = roundtrip("() => { (a || b).go() }");
        assert_eq!(out, "() => {\n  ;(a || b).go()\n}");
    }

    #[test]
    fn test_printer_lines() {
        let mut p = Printer::new();
        p.line("a {");
        p.indent();
        p.line("b");
        p.dedent();
        p.line("}");
        p.blank();
        p.blank();
        p.line("c");
        assert_eq!(p.finish(), "a {\n  b\n}\n\nc\n");
    }

    #[test]
    fn test_escapes() {
        assert_eq!(escape_jsx_text("a {b} <c>"), "a {'{'}b{'}'} &lt;c&gt;");
        assert_eq!(escape_attribute(r#"say "hi""#), "say &quot;hi&quot;");
    }
}
