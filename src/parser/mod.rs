//! Parser for `.mtm` files.
//!
//! [`parse`] turns file text into a [`Program`]. The work happens in three
//! steps: the frontmatter is split off and parsed, the body is lexed and
//! parsed into statements, and a resolution pass normalizes legacy accessors,
//! computes each declaration's dependencies, checks type annotations and
//! collects warnings. Any failure aborts the whole file.

mod expr;
pub mod lexer;
pub mod template;
pub mod token;
pub mod types;

use ahash::AHashSet;
use std::collections::BTreeSet;

use crate::ast::visit::{self, Fold, Visitor};
use crate::ast::{
    Expr, FunctionBody, FunctionDeclaration, ImportDeclaration, Program, Statement, TemplateNode,
    VariableDeclaration,
};
use crate::error::{CompileError, Warning, WarningKind};
use crate::frontmatter;
use crate::location::{Location, Position};
use crate::syntax::{self, SyntaxVersion};
use lexer::Lexer;
use token::{Token, TokenInfo};

/// Parse a whole `.mtm` file.
pub fn parse(source: &str, path: &str) -> Result<Program, CompileError> {
    let _span = tracing::info_span!("compile.parse", file = %path, bytes = source.len()).entered();

    let split = frontmatter::split(source, path)?;
    let syntax_version = syntax::detect(split.body);

    let mut parser = Parser::new(path, source, split.body_start, source.len())?;
    let mut warnings = Vec::new();
    let body = parser.parse_body(&mut warnings)?;

    let mut program = Program {
        path: path.to_string(),
        syntax_version,
        frontmatter: split.frontmatter,
        body,
        warnings,
    };
    resolve(&mut program)?;

    tracing::debug!(
        file = %path,
        syntax = %program.syntax_version,
        statements = program.body.len(),
        warnings = program.warnings.len(),
        "parsed"
    );
    Ok(program)
}

/// Parse a standalone expression, e.g. for tooling.
pub fn parse_expression(source: &str, path: &str) -> Result<Expr, CompileError> {
    parse_expression_range(path, source, Position::start(), source.len())
}

/// Parse the expression occupying `start..end` of `src`.
pub(crate) fn parse_expression_range(
    filename: &str,
    src: &str,
    start: Position,
    end: usize,
) -> Result<Expr, CompileError> {
    let mut parser = Parser::new(filename, src, start, end)?;
    if parser.at(&Token::Eof) {
        return Err(parser.error_here("expected an expression"));
    }
    let expr = parser.parse_expr()?;
    if !parser.at(&Token::Eof) {
        return Err(parser.error_here(format!("unexpected `{}` after expression", parser.peek())));
    }
    Ok(expr)
}

pub(crate) struct Parser<'src> {
    filename: &'src str,
    src: &'src str,
    tokens: Vec<TokenInfo>,
    pos: usize,
}

impl<'src> Parser<'src> {
    fn new(
        filename: &'src str,
        src: &'src str,
        start: Position,
        end: usize,
    ) -> Result<Self, CompileError> {
        let tokens = Lexer::with_range(filename, src, start, end).tokenize()?;
        Ok(Self {
            filename,
            src,
            tokens,
            pos: 0,
        })
    }

    fn info(&self) -> &TokenInfo {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.info().token
    }

    fn peek_nth(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx].token
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn at_ident(&self, word: &str) -> bool {
        self.peek().is_ident(word)
    }

    fn at_operator(&self, op: &str) -> bool {
        self.peek().is_operator(op)
    }

    fn next(&mut self) -> TokenInfo {
        let info = self.info().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        info
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.at(token) {
            self.next();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, context: &str) -> Result<TokenInfo, CompileError> {
        if self.at(token) {
            Ok(self.next())
        } else {
            Err(self.error_here(format!("expected `{token}` {context}, found `{}`", self.peek())))
        }
    }

    fn expect_name(&mut self, context: &str) -> Result<String, CompileError> {
        match self.peek().clone() {
            Token::Ident(name) if !Token::is_keyword_txt(&name) => {
                self.next();
                Ok(name)
            }
            other => Err(self.error_here(format!("expected a name {context}, found `{other}`"))),
        }
    }

    fn error_here(&self, message: impl Into<String>) -> CompileError {
        CompileError::syntax(self.filename, message).at(self.info().loc())
    }

    /// The end position of the last consumed token.
    fn prev_end(&self) -> Position {
        match self.pos.checked_sub(1) {
            Some(i) => self.tokens[i].end,
            None => self.info().start,
        }
    }

    fn slice(&self, start: Position, end: Position) -> &'src str {
        &self.src[start.offset..end.offset]
    }

    /// A statement ends at `;`, a line break, `}` or the end of input.
    fn expect_statement_end(&mut self) -> Result<(), CompileError> {
        if self.eat(&Token::Semicolon) {
            return Ok(());
        }
        let info = self.info();
        if info.newline_before || matches!(info.token, Token::Eof | Token::Rbrace) {
            return Ok(());
        }
        Err(self
            .error_here(format!("expected a line break or `;`, found `{}`", self.peek()))
            .with_suggestion("put each declaration on its own line"))
    }

    fn parse_body(&mut self, warnings: &mut Vec<Warning>) -> Result<Vec<Statement>, CompileError> {
        let mut body = Vec::new();
        let mut names = AHashSet::new();
        let mut has_template = false;
        loop {
            while self.eat(&Token::Semicolon) {}
            if self.at(&Token::Eof) {
                break;
            }
            let start = self.info().loc();
            let statement = self.parse_top_level(warnings)?;
            let declared = match &statement {
                Statement::Variable(v) => Some(v.name.as_str()),
                Statement::Function(f) => Some(f.name.as_str()),
                Statement::Template(_) => {
                    if has_template {
                        return Err(CompileError::syntax(self.filename, "a file can only have one template")
                            .at(start));
                    }
                    has_template = true;
                    None
                }
                Statement::Import(_) => None,
            };
            if let Some(name) = declared {
                if !names.insert(name.to_string()) {
                    return Err(CompileError::syntax(
                        self.filename,
                        format!("`{name}` is declared more than once"),
                    )
                    .at(start));
                }
            }
            body.push(statement);
        }
        Ok(body)
    }

    fn parse_top_level(&mut self, warnings: &mut Vec<Warning>) -> Result<Statement, CompileError> {
        let start = self.info().start;
        match self.peek().clone() {
            Token::Ref(name) => self.parse_dollar_declaration(name, start, warnings),
            Token::Ident(word) => match word.as_str() {
                "import" => self.parse_import(start),
                "const" | "let" | "var" => self.parse_legacy_declaration(start),
                "function" | "async" if self.peek_nth(1).is_ident("function") || word == "function" => {
                    self.parse_function_declaration(start)
                }
                "template" if matches!(self.peek_nth(1), Token::Lparen) => self.parse_template_call(start),
                "export" => Err(self
                    .error_here("`export` is not supported in component files")
                    .with_suggestion("the component is exported automatically; remove `export`")),
                _ => Err(self.unexpected_top_level()),
            },
            _ => Err(self.unexpected_top_level()),
        }
    }

    fn unexpected_top_level(&self) -> CompileError {
        self.error_here(format!("expected a declaration, found `{}`", self.peek()))
            .with_suggestion("declare state with `$name! = value` or functions with `$name = () => ...`")
    }

    fn parse_import(&mut self, start: Position) -> Result<Statement, CompileError> {
        self.next();
        let mut depth = 0usize;
        let source = loop {
            let info = self.next();
            match info.token {
                Token::Lbrace => depth += 1,
                Token::Rbrace => depth = depth.saturating_sub(1),
                Token::String { value, .. } if depth == 0 => break value,
                Token::Eof => {
                    return Err(CompileError::syntax(self.filename, "unterminated import statement")
                        .at(Location::from_positions(start, info.end)));
                }
                _ => {}
            }
        };
        let end = self.prev_end();
        let raw = self.slice(start, end).to_string();
        self.expect_statement_end()?;
        Ok(Statement::Import(ImportDeclaration {
            raw,
            source,
            loc: Location::from_positions(start, end),
        }))
    }

    /// `$name[!][: Type] = init`.
    fn parse_dollar_declaration(
        &mut self,
        name: String,
        start: Position,
        warnings: &mut Vec<Warning>,
    ) -> Result<Statement, CompileError> {
        self.next();
        let mut is_reactive = false;
        let mut type_annotation = None;

        if self.at_operator("!=") {
            // `$a!=$b` lexes as `!=`.
            self.next();
            is_reactive = true;
        } else {
            if self.at_operator("!") {
                self.next();
                is_reactive = true;
            }
            if self.eat(&Token::Colon) {
                type_annotation = Some(self.parse_type_annotation()?);
            }
            if !self.at_operator("=") {
                return Err(self
                    .error_here(format!("expected `=` after `${name}`, found `{}`", self.peek()))
                    .with_suggestion(format!("declare it as `${name}! = value`")));
            }
            self.next();
        }

        let init = self.parse_expr()?;
        let loc = Location::from_positions(start, self.prev_end());
        self.expect_statement_end()?;

        if let Some(func) = arrow_to_function(&name, &init, loc) {
            if is_reactive {
                warnings.push(Warning::new(
                    WarningKind::ReactiveFunction { name: name.clone() },
                    self.filename,
                    Some(loc),
                ));
            }
            return Ok(Statement::Function(func));
        }

        Ok(Statement::Variable(VariableDeclaration {
            name,
            has_dollar_prefix: true,
            is_reactive,
            type_annotation,
            inferred_type: types::infer(&init),
            init,
            dependencies: BTreeSet::new(),
            loc,
        }))
    }

    /// Raw annotation text up to the `=` that ends it.
    fn parse_type_annotation(&mut self) -> Result<String, CompileError> {
        let start = self.info().start;
        let mut depth = 0usize;
        loop {
            match self.peek() {
                Token::Eof => return Err(self.error_here("expected `=` after the type annotation")),
                Token::Operator("=") if depth == 0 => break,
                Token::Lparen | Token::Lbracket | Token::Lbrace | Token::Operator("<") => depth += 1,
                Token::Rparen | Token::Rbracket | Token::Rbrace | Token::Operator(">") => {
                    depth = depth.saturating_sub(1)
                }
                _ => {}
            }
            self.next();
        }
        let text = self.slice(start, self.prev_end()).trim();
        if text.is_empty() {
            return Err(self.error_here("expected a type after `:`"));
        }
        Ok(text.to_string())
    }

    /// `const name = signal(init)`, `const name = () => ...` or a plain constant.
    fn parse_legacy_declaration(&mut self, start: Position) -> Result<Statement, CompileError> {
        self.next();
        if matches!(self.peek(), Token::Lbracket | Token::Lbrace) {
            return Err(self.error_here("destructuring declarations are not supported"));
        }
        let name = self.expect_name("after the declaration keyword")?;
        let type_annotation = if self.eat(&Token::Colon) {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };
        if !self.at_operator("=") {
            return Err(self.error_here(format!("expected `=` after `{name}`")));
        }
        self.next();
        let init = self.parse_expr()?;
        let loc = Location::from_positions(start, self.prev_end());
        self.expect_statement_end()?;

        if let Some(func) = arrow_to_function(&name, &init, loc) {
            return Ok(Statement::Function(func));
        }

        let (init, is_reactive) = match init {
            Expr::Call {
                callee,
                mut args,
                optional: false,
            } if matches!(callee.as_ref(), Expr::Ident(f) if f == "signal") && args.len() <= 1 => {
                (args.pop().unwrap_or(Expr::Undefined), true)
            }
            other => (other, false),
        };

        Ok(Statement::Variable(VariableDeclaration {
            name,
            has_dollar_prefix: false,
            is_reactive,
            type_annotation,
            inferred_type: types::infer(&init),
            init,
            dependencies: BTreeSet::new(),
            loc,
        }))
    }

    /// `[async] function name(params) { ... }`.
    fn parse_function_declaration(&mut self, start: Position) -> Result<Statement, CompileError> {
        let declared_async = self.at_ident("async");
        if declared_async {
            self.next();
        }
        self.next();
        let name = self.expect_name("after `function`")?;
        let params = self.parse_params()?;
        let body = self.parse_block()?;
        let loc = Location::from_positions(start, self.prev_end());
        let body = FunctionBody::Block(body);
        Ok(Statement::Function(FunctionDeclaration {
            name,
            params,
            is_async: contains_await(&body),
            declared_async,
            is_arrow: false,
            body,
            loc,
        }))
    }

    /// `template(`...`)`.
    fn parse_template_call(&mut self, start: Position) -> Result<Statement, CompileError> {
        self.next();
        self.expect(&Token::Lparen, "after `template`")?;
        let info = self.next();
        let literal_loc = info.loc();
        let Token::Template(raw) = info.token else {
            return Err(CompileError::syntax(self.filename, "`template` expects a backtick string")
                .with_suggestion("write the markup as template(`<div>...</div>`)")
                .at(literal_loc));
        };
        self.expect(&Token::Rparen, "to close `template(`")?;
        let loc = Location::from_positions(start, self.prev_end());
        self.expect_statement_end()?;

        let content_start = info.start.advance_over("`");
        let content_end = content_start.offset + raw.len();
        let children = template::parse_template(self.filename, self.src, content_start, content_end)?;
        Ok(Statement::Template(TemplateNode { raw, children, loc }))
    }
}

/// A declaration whose initializer is an arrow function is a function.
fn arrow_to_function(name: &str, init: &Expr, loc: Location) -> Option<FunctionDeclaration> {
    let Expr::Arrow {
        is_async,
        params,
        body,
    } = init.unparen()
    else {
        return None;
    };
    Some(FunctionDeclaration {
        name: name.to_string(),
        params: params.clone(),
        is_async: contains_await(body),
        declared_async: *is_async,
        is_arrow: true,
        body: body.as_ref().clone(),
        loc,
    })
}

/// Whether `body` awaits, not counting nested functions.
pub(crate) fn contains_await(body: &FunctionBody) -> bool {
    struct AwaitFinder(bool);
    impl Visitor for AwaitFinder {
        fn visit_expr(&mut self, expr: &Expr) {
            match expr {
                Expr::Await(_) => self.0 = true,
                Expr::Arrow { .. } => {}
                _ => visit::walk_expr(self, expr),
            }
        }
    }
    let mut finder = AwaitFinder(false);
    finder.visit_function_body(body);
    finder.0
}

/// Rewrites `count`, `count()`, `count.set(v)` and `count.update(f)` for
/// legacy `signal` declarations into `$count` reads and writes.
struct LegacyAccessors<'a> {
    names: &'a AHashSet<String>,
    scopes: Vec<Vec<String>>,
}

impl LegacyAccessors<'_> {
    fn is_signal(&self, name: &str) -> bool {
        self.names.contains(name) && !self.scopes.iter().any(|s| s.iter().any(|n| n == name))
    }

    fn signal_name(&self, expr: &Expr) -> Option<String> {
        match expr {
            Expr::Ident(name) if self.is_signal(name) => Some(name.clone()),
            _ => None,
        }
    }
}

impl Fold for LegacyAccessors<'_> {
    fn fold_expr(&mut self, expr: Expr) -> Expr {
        match expr {
            Expr::Ident(ref name) if self.is_signal(name) => Expr::Ref(name.clone()),
            Expr::Call {
                callee,
                mut args,
                optional,
            } => {
                if let Some(name) = self.signal_name(&callee) {
                    if args.is_empty() {
                        return Expr::Ref(name);
                    }
                }
                if let Expr::Member {
                    object, property, ..
                } = callee.as_ref()
                {
                    if let Some(name) = self.signal_name(object) {
                        if args.len() == 1 && (property == "set" || property == "update") {
                            let arg = self.fold_expr(args.remove(0));
                            let value = if property == "set" {
                                arg
                            } else {
                                Expr::call(arg, vec![Expr::Ref(name.clone())])
                            };
                            return Expr::Assign {
                                op: "=",
                                target: Box::new(Expr::Ref(name)),
                                value: Box::new(value),
                            };
                        }
                    }
                }
                visit::fold_expr_children(
                    self,
                    Expr::Call {
                        callee,
                        args,
                        optional,
                    },
                )
            }
            other => visit::fold_expr_children(self, other),
        }
    }

    fn enter_scope(&mut self, bound: &[&str]) {
        self.scopes.push(bound.iter().map(|s| s.to_string()).collect());
    }

    fn exit_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(name.to_string());
        }
    }
}

/// Collects `$name` references with the location of the statement they
/// appear in.
struct RefSites {
    current: Location,
    refs: Vec<(String, Location)>,
}

impl Visitor for RefSites {
    fn visit_expr(&mut self, expr: &Expr) {
        if let Expr::Ref(name) = expr {
            if !self.refs.iter().any(|(n, _)| n == name) {
                self.refs.push((name.clone(), self.current));
            }
        }
        visit::walk_expr(self, expr);
    }
}

/// Normalize legacy accessors, compute dependencies, check annotations and
/// collect warnings.
fn resolve(program: &mut Program) -> Result<(), CompileError> {
    let legacy: AHashSet<String> = program
        .variables()
        .filter(|v| v.is_reactive && !v.has_dollar_prefix)
        .map(|v| v.name.clone())
        .collect();

    if !legacy.is_empty() {
        let mut fold = LegacyAccessors {
            names: &legacy,
            scopes: Vec::new(),
        };
        let body = std::mem::take(&mut program.body);
        program.body = body
            .into_iter()
            .map(|statement| match statement {
                Statement::Variable(mut v) => {
                    v.init = fold.fold_expr(v.init);
                    Statement::Variable(v)
                }
                Statement::Function(f) => Statement::Function(visit::fold_function(&mut fold, f)),
                Statement::Template(mut t) => {
                    t.children = t
                        .children
                        .into_iter()
                        .map(|c| fold.fold_template_child(c))
                        .collect();
                    Statement::Template(t)
                }
                other => other,
            })
            .collect();
    }

    let reactive: AHashSet<String> = program.reactive_variables().map(|v| v.name.clone()).collect();
    let path = program.path.clone();
    for statement in &mut program.body {
        if let Statement::Variable(v) = statement {
            v.dependencies = visit::collect_refs(&v.init)
                .into_iter()
                .filter(|name| reactive.contains(name))
                .collect();
            types::check(v, &path)?;
        }
    }

    let mut known: AHashSet<&str> = AHashSet::new();
    known.extend(program.variables().map(|v| v.name.as_str()));
    known.extend(program.functions().map(|f| f.name.as_str()));
    if let Some(fm) = &program.frontmatter {
        known.extend(fm.prop_names());
        known.extend(fm.channels.iter().map(|c| c.emit.as_str()));
    }

    let mut sites = RefSites {
        current: Location::default(),
        refs: Vec::new(),
    };
    for statement in &program.body {
        match statement {
            Statement::Variable(v) => {
                sites.current = v.loc;
                sites.visit_expr(&v.init);
            }
            Statement::Function(f) => {
                sites.current = f.loc;
                visit::walk_function(&mut sites, f);
            }
            Statement::Template(t) => {
                sites.current = t.loc;
                for child in &t.children {
                    sites.visit_template_child(child);
                }
            }
            Statement::Import(_) => {}
        }
    }

    let mut warnings: Vec<Warning> = sites
        .refs
        .into_iter()
        .filter(|(name, _)| !known.contains(name.as_str()))
        .map(|(name, loc)| Warning::new(WarningKind::UnresolvedReference { name }, &path, Some(loc)))
        .collect();
    if program.syntax_version == SyntaxVersion::Mixed {
        warnings.insert(0, Warning::new(WarningKind::MixedSyntax, &path, None));
    }
    program.warnings.extend(warnings);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{InferredType, Stmt, TemplateChild};
    use crate::error::ErrorKind;

    fn parse_ok(src: &str) -> Program {
        parse(src, "Test.mtm").unwrap()
    }

    fn deps(program: &Program, name: &str) -> Vec<String> {
        program.variable(name).unwrap().dependencies.iter().cloned().collect()
    }

    #[test]
    fn test_counter_program() {
        let program = parse_ok(
            "---\ntarget: reactjs\n---\n$counter! = 0\n$inc = () => $counter++\ntemplate(`<button onclick={$inc}>{{$counter}}</button>`)\n",
        );

        assert_eq!(program.syntax_version, SyntaxVersion::Modern);
        let counter = program.variable("counter").unwrap();
        assert!(counter.is_reactive);
        assert!(counter.has_dollar_prefix);
        assert_eq!(counter.inferred_type, InferredType::Number);
        assert_eq!(counter.loc.start_line(), 4);

        let inc = program.function("inc").unwrap();
        assert!(inc.is_arrow);
        assert!(!inc.is_async);

        let template = program.template().unwrap();
        assert_eq!(template.events(), vec![("click", &Expr::Ref("inc".into()))]);
        assert!(program.warnings.is_empty());
    }

    #[test]
    fn test_dependencies_are_exact() {
        let program = parse_ok(
            "$price! = 10\n$qty! = 2\n$label = 'total'\n$total! = $price * $qty + ($label ? 0 : $price)\n",
        );
        assert_eq!(deps(&program, "total"), vec!["price", "qty"]);
        assert!(deps(&program, "price").is_empty());
    }

    #[test]
    fn test_self_reference_is_a_dependency() {
        let program = parse_ok("$count! = $count + 1\n");
        assert_eq!(deps(&program, "count"), vec!["count"]);
    }

    #[test]
    fn test_bang_equal_declarations() {
        let program = parse_ok("$a!=$b\n$b!=$a\n");
        assert!(program.variable("a").unwrap().is_reactive);
        assert_eq!(deps(&program, "a"), vec!["b"]);
        assert_eq!(deps(&program, "b"), vec!["a"]);
    }

    #[test]
    fn test_type_annotation() {
        let program = parse_ok("$items!: string[] = ['a']\n$n: number = 1\n");
        assert_eq!(
            program.variable("items").unwrap().type_annotation.as_deref(),
            Some("string[]")
        );

        let err = parse("$count!: string = 0\n", "Test.mtm").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::TypeConflict { .. }));
        assert!(err.message.contains("string") && err.message.contains("number"));

        let err = parse("$ratio: number = 1.5\n", "Test.mtm").unwrap_err();
        assert!(err.message.contains("float"));
    }

    #[test]
    fn test_async_detection() {
        let program = parse_ok(
            "$load = async () => { const r = await fetch('/x'); return r }\n$later = () => { setTimeout(async () => await x(), 1) }\n",
        );
        assert!(program.function("load").unwrap().is_async);
        assert!(!program.function("later").unwrap().is_async);
    }

    #[test]
    fn test_legacy_program() {
        let program = parse_ok(
            "import { format } from './fmt.js'\nconst count = signal(0)\nconst doubled = signal(count() * 2)\nfunction inc() {\n  count.set(count() + 1)\n}\ntemplate(`<p onclick={inc}>{{count()}}</p>`)\n",
        );

        assert_eq!(program.syntax_version, SyntaxVersion::Legacy);
        let count = program.variable("count").unwrap();
        assert!(count.is_reactive);
        assert!(!count.has_dollar_prefix);
        assert_eq!(count.init, Expr::Number("0".into()));
        assert_eq!(deps(&program, "doubled"), vec!["count"]);

        let inc = program.function("inc").unwrap();
        let FunctionBody::Block(body) = &inc.body else {
            panic!("expected block body");
        };
        assert!(matches!(
            &body[0],
            Stmt::Expr(Expr::Assign { target, .. }) if **target == Expr::Ref("count".into())
        ));
        assert_eq!(program.template().unwrap().bindings(), vec![&Expr::Ref("count".into())]);

        let import = program.imports().next().unwrap();
        assert_eq!(import.raw, "import { format } from './fmt.js'");
        assert_eq!(import.source, "./fmt.js");
    }

    #[test]
    fn test_legacy_shadowing() {
        let program = parse_ok("const count = signal(0)\nconst f = (count) => count + 1\n");
        let f = program.function("f").unwrap();
        let FunctionBody::Expr(body) = &f.body else {
            panic!("expected expression body");
        };
        assert!(visit::collect_refs(body).is_empty());
    }

    #[test]
    fn test_mixed_syntax_warning() {
        let program = parse_ok("$a! = 1\nconst b = signal(2)\n");
        assert_eq!(program.syntax_version, SyntaxVersion::Mixed);
        assert_eq!(program.warnings[0].kind, WarningKind::MixedSyntax);
    }

    #[test]
    fn test_unresolved_reference_warning() {
        let program = parse_ok("$a! = $missing + 1\n");
        assert_eq!(
            program.warnings[0].kind,
            WarningKind::UnresolvedReference { name: "missing".into() }
        );
    }

    #[test]
    fn test_props_are_known() {
        let program = parse_ok("---\ntarget: vue\nprops:\n  title: string\n---\n$upper = $title.toUpperCase()\n");
        assert!(program.warnings.is_empty());
        assert!(program.is_prop("title"));
    }

    #[test]
    fn test_reactive_function_warning() {
        let program = parse_ok("$go! = () => 1\n");
        assert!(program.function("go").is_some());
        assert_eq!(
            program.warnings[0].kind,
            WarningKind::ReactiveFunction { name: "go".into() }
        );
    }

    #[test]
    fn test_syntax_errors() {
        let err = parse("$a! = (1 + \n", "Test.mtm").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert!(err.location.is_some());

        let err = parse("$a! = 1 $b! = 2\n", "Test.mtm").unwrap_err();
        assert!(err.message.contains("line break"));

        let err = parse("$a! = 1\n$a! = 2\n", "Test.mtm").unwrap_err();
        assert!(err.message.contains("more than once"));

        let err = parse("whatever\n", "Test.mtm").unwrap_err();
        assert!(err.suggestion.is_some());
    }

    #[test]
    fn test_unterminated_template_block() {
        let err = parse("template(`<div>{#if $a}<p>x</p></div>`)\n", "Test.mtm").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
    }

    #[test]
    fn test_template_positions_are_file_absolute() {
        let program = parse_ok("$a! = 1\ntemplate(`\n  <p>{{$a}}</p>\n`)\n");
        let children = &program.template().unwrap().children;
        assert!(matches!(&children[0], TemplateChild::Element { tag, .. } if tag == "p"));
    }

    #[test]
    fn test_parse_expression() {
        let expr = parse_expression("$a + 1", "x").unwrap();
        assert!(matches!(expr, Expr::Binary { op: "+", .. }));
        assert!(parse_expression("", "x").is_err());
        assert!(parse_expression("1 2", "x").is_err());
    }
}
