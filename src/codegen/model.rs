//! The backend-neutral view of a component.
//!
//! [`ComponentModel`] classifies every declaration once (state, derived,
//! writable derived, constant, function) so that the four backends agree on
//! what each name is. [`Lower`] rewrites `$name` reads and writes through a
//! backend's [`Rewrite`] rules, turning the AST into plain JavaScript.

use ahash::AHashSet;
use serde::Serialize;

use crate::ast::visit::{self, Fold};
use crate::ast::{
    Expr, FunctionDeclaration, ImportDeclaration, Program, TemplateNode, VariableDeclaration,
};
use crate::config::Target;
use crate::error::{CompileError, Warning, WarningKind};
use crate::frontmatter::Channel;
use crate::helpers;
use crate::reactive::ReactiveGraph;
use crate::reactive::graph::written_root;

/// Array, `Map` and `Set` methods that modify their receiver.
const MUTATING_METHODS: &[&str] = &[
    "push", "pop", "shift", "unshift", "splice", "sort", "reverse", "fill", "copyWithin", "set", "add",
    "delete", "clear",
];

/// How a reactive variable is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BindingKind {
    /// Mutable state: state hook, ref, writable store or signal.
    State,
    /// Computed from other reactive variables only.
    Derived,
    /// Computed from other reactive variables and also written to; emitted
    /// as state that is re-synchronized whenever a dependency changes.
    WritableDerived,
}

/// A reactive variable as exposed by generated code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactiveBinding {
    pub name: String,
    pub kind: BindingKind,
    /// Sorted.
    pub dependencies: Vec<String>,
}

/// What a `$name` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Reactive(BindingKind),
    Constant,
    Function,
    Prop,
    Channel,
    /// Reported as a warning by the parser; printed as a plain name.
    Unknown,
}

/// A top-level component member, in emission order.
#[derive(Debug, Clone, Copy)]
pub enum Member<'a> {
    Reactive(&'a VariableDeclaration, BindingKind),
    /// A plain (non-`!`) declaration; `mutable` when something assigns to it.
    Constant(&'a VariableDeclaration, bool),
    Function(&'a FunctionDeclaration),
}

#[derive(Debug)]
pub struct ComponentModel<'a> {
    pub name: String,
    pub file: &'a str,
    pub program: &'a Program,
    pub graph: &'a ReactiveGraph,
    pub imports: Vec<&'a ImportDeclaration>,
    pub members: Vec<Member<'a>>,
    /// `(name, type)`.
    pub props: Vec<(String, String)>,
    pub channels: Vec<Channel>,
    pub styles: Vec<String>,
    pub template: Option<&'a TemplateNode>,
    pub bindings: Vec<ReactiveBinding>,
}

impl<'a> ComponentModel<'a> {
    pub fn new(program: &'a Program, graph: &'a ReactiveGraph) -> Self {
        let (props, channels, styles) = match &program.frontmatter {
            Some(fm) => (fm.props.clone(), fm.channels.clone(), fm.styles.clone()),
            None => Default::default(),
        };

        let written = plain_writes(program);
        let members = order_members(program, graph, &written);
        let bindings = members
            .iter()
            .filter_map(|m| match m {
                Member::Reactive(decl, kind) => Some(ReactiveBinding {
                    name: decl.name.clone(),
                    kind: *kind,
                    dependencies: decl.dependencies.iter().cloned().collect(),
                }),
                _ => None,
            })
            .collect();

        Self {
            name: helpers::component_name(&program.path),
            file: &program.path,
            program,
            graph,
            imports: program.imports().collect(),
            members,
            props,
            channels,
            styles,
            template: program.template(),
            bindings,
        }
    }

    pub fn ref_kind(&self, name: &str) -> RefKind {
        for member in &self.members {
            match member {
                Member::Reactive(decl, kind) if decl.name == name => return RefKind::Reactive(*kind),
                Member::Constant(decl, _) if decl.name == name => return RefKind::Constant,
                Member::Function(func) if func.name == name => return RefKind::Function,
                _ => {}
            }
        }
        if self.props.iter().any(|(p, _)| p == name) {
            RefKind::Prop
        } else if self.channels.iter().any(|c| c.emit == name) {
            RefKind::Channel
        } else {
            RefKind::Unknown
        }
    }

    /// One warning per reactive variable and mutating method called on it,
    /// for targets that only see whole-value writes.
    pub fn in_place_mutation_warnings(&self, target: Target) -> Vec<Warning> {
        struct Calls<'m, 'a> {
            model: &'m ComponentModel<'a>,
            found: Vec<(String, String)>,
        }
        impl visit::Visitor for Calls<'_, '_> {
            fn visit_expr(&mut self, expr: &Expr) {
                if let Expr::Call { callee, .. } = expr {
                    if let Expr::Member { object, property, .. } = callee.as_ref() {
                        if let Some(root) = written_root(object) {
                            let entry = (root.to_string(), property.clone());
                            if MUTATING_METHODS.contains(&property.as_str())
                                && matches!(self.model.ref_kind(root), RefKind::Reactive(_))
                                && !self.found.contains(&entry)
                            {
                                self.found.push(entry);
                            }
                        }
                    }
                }
                visit::walk_expr(self, expr);
            }
        }

        let mut calls = Calls {
            model: self,
            found: Vec::new(),
        };
        for func in self.program.functions() {
            visit::walk_function(&mut calls, func);
        }
        if let Some(template) = self.template {
            for child in &template.children {
                visit::Visitor::visit_template_child(&mut calls, child);
            }
        }
        calls
            .found
            .into_iter()
            .map(|(name, method)| {
                Warning::new(WarningKind::InPlaceMutation { name, method, target }, self.file, None)
            })
            .collect()
    }

    pub fn has_kind(&self, kind: BindingKind) -> bool {
        self.bindings.iter().any(|b| b.kind == kind)
    }

    pub fn has_loops(&self) -> bool {
        fn any_loop(children: &[crate::ast::TemplateChild]) -> bool {
            use crate::ast::TemplateChild;
            children.iter().any(|c| match c {
                TemplateChild::Loop { .. } => true,
                TemplateChild::Element { children, .. } => any_loop(children),
                TemplateChild::Conditional {
                    then_branch,
                    else_branch,
                    ..
                } => any_loop(then_branch) || else_branch.as_deref().is_some_and(any_loop),
                TemplateChild::Text(_) | TemplateChild::Interpolation(_) => false,
            })
        }
        self.template.is_some_and(|t| any_loop(&t.children))
    }

    pub fn has_conditionals(&self) -> bool {
        fn any_if(children: &[crate::ast::TemplateChild]) -> bool {
            use crate::ast::TemplateChild;
            children.iter().any(|c| match c {
                TemplateChild::Conditional { .. } => true,
                TemplateChild::Element { children, .. } => any_if(children),
                TemplateChild::Loop { body, .. } => any_if(body),
                TemplateChild::Text(_) | TemplateChild::Interpolation(_) => false,
            })
        }
        self.template.is_some_and(|t| any_if(&t.children))
    }

    /// Props referenced by `expr`, in first-seen order.
    pub fn props_in(&self, expr: &Expr) -> Vec<String> {
        visit::collect_refs(expr)
            .into_iter()
            .filter(|name| self.ref_kind(name) == RefKind::Prop)
            .collect()
    }

    /// The framework package followed by every bare import specifier.
    pub fn package_dependencies(&self, framework: &str) -> Vec<String> {
        let mut out = vec![framework.to_string()];
        for import in &self.imports {
            if let Some(package) = package_name(&import.source) {
                if !out.iter().any(|p| p == package) {
                    out.push(package.to_string());
                }
            }
        }
        out
    }

    pub fn lower_expr<R: Rewrite>(&self, rewrite: &R, expr: &Expr) -> Result<Expr, CompileError> {
        let mut lower = Lower::new(self, rewrite);
        let out = lower.fold_expr(expr.clone());
        lower.finish(out)
    }

    pub fn lower_function<R: Rewrite>(
        &self,
        rewrite: &R,
        func: &FunctionDeclaration,
    ) -> Result<FunctionDeclaration, CompileError> {
        let mut lower = Lower::new(self, rewrite);
        let out = visit::fold_function(&mut lower, func.clone());
        lower.finish(out)
    }

    pub fn framework_error(&self, target: Target, message: impl Into<String>) -> CompileError {
        CompileError::framework(self.file, target, message)
    }

    /// The shared error for assignments to read-only props.
    pub fn prop_write_error(&self, target: Target, name: &str) -> CompileError {
        self.framework_error(
            target,
            format!("cannot assign to prop `${name}`: props are read-only in {target}"),
        )
        .with_suggestion(format!(
            "copy the prop into state first, e.g. `$local{}! = ${name}`",
            helpers::capitalize(name)
        ))
    }
}

/// `react` for `react`, `@scope/pkg` for `@scope/pkg/sub`, `None` for
/// relative and absolute paths.
fn package_name(specifier: &str) -> Option<&str> {
    if specifier.starts_with('.') || specifier.starts_with('/') || specifier.is_empty() {
        return None;
    }
    let mut end = specifier.len();
    let mut slashes = specifier.match_indices('/');
    let skip = usize::from(specifier.starts_with('@'));
    if let Some((idx, _)) = slashes.nth(skip) {
        end = idx;
    }
    Some(&specifier[..end])
}

/// Names of plain declarations that something assigns to.
fn plain_writes(program: &Program) -> AHashSet<String> {
    struct Writes(AHashSet<String>);
    impl visit::Visitor for Writes {
        fn visit_expr(&mut self, expr: &Expr) {
            if let Expr::Assign { target, .. } | Expr::Update { target, .. } = expr {
                if let Some(name) = written_root(target) {
                    self.0.insert(name.to_string());
                }
            }
            visit::walk_expr(self, expr);
        }
    }
    let mut writes = Writes(AHashSet::new());
    for func in program.functions() {
        visit::walk_function(&mut writes, func);
    }
    for var in program.variables() {
        visit::Visitor::visit_expr(&mut writes, &var.init);
    }
    if let Some(template) = program.template() {
        for child in &template.children {
            visit::Visitor::visit_template_child(&mut writes, child);
        }
    }
    writes.0
}

/// Declaration order, except that a reactive variable is held back until
/// every variable it depends on has been emitted.
fn order_members<'a>(
    program: &'a Program,
    graph: &ReactiveGraph,
    written: &AHashSet<String>,
) -> Vec<Member<'a>> {
    let classify = |decl: &'a VariableDeclaration| -> Member<'a> {
        match graph.variable(&decl.name) {
            Some(var) if var.is_derived() && var.is_mutated() => {
                Member::Reactive(decl, BindingKind::WritableDerived)
            }
            Some(var) if var.is_derived() => Member::Reactive(decl, BindingKind::Derived),
            Some(_) => Member::Reactive(decl, BindingKind::State),
            None => Member::Constant(decl, written.contains(&decl.name)),
        }
    };

    let mut emitted: AHashSet<&str> = AHashSet::new();
    let mut pending: Vec<&'a VariableDeclaration> = Vec::new();
    let mut out = Vec::new();

    let ready = |decl: &VariableDeclaration, emitted: &AHashSet<&str>| {
        decl.dependencies
            .iter()
            .all(|d| d == &decl.name || emitted.contains(d.as_str()))
    };

    for statement in &program.body {
        match statement {
            crate::ast::Statement::Variable(decl) => {
                if decl.is_reactive && !ready(decl, &emitted) {
                    pending.push(decl);
                    continue;
                }
                out.push(classify(decl));
                emitted.insert(decl.name.as_str());
                // Release anything that was waiting on this declaration.
                loop {
                    let Some(pos) = pending.iter().position(|d| ready(d, &emitted)) else {
                        break;
                    };
                    let decl = pending.remove(pos);
                    out.push(classify(decl));
                    emitted.insert(decl.name.as_str());
                }
            }
            crate::ast::Statement::Function(func) => out.push(Member::Function(func)),
            crate::ast::Statement::Import(_) | crate::ast::Statement::Template(_) => {}
        }
    }
    // Dependencies on names outside the graph never resolve; keep order.
    out.extend(pending.into_iter().map(classify));
    out
}

/// Backend rules for `$name` reads and writes.
pub trait Rewrite {
    /// A read of `$name`.
    fn read(&self, name: &str, kind: RefKind) -> Expr;

    /// `$name op value`, with `value` already lowered.
    fn assign(&self, name: &str, kind: RefKind, op: &'static str, value: Expr) -> Result<Expr, CompileError>;

    /// `$name++` and friends.
    fn update(&self, name: &str, kind: RefKind, op: &'static str, prefix: bool) -> Result<Expr, CompileError>;

    /// A write through `$name`, e.g. `$user.name = x`. The target itself is
    /// lowered like any read.
    fn member_write(&self, _root: &str, _kind: RefKind) -> Result<(), CompileError> {
        Ok(())
    }

    /// Rewrite of an unshadowed plain identifier.
    fn ident(&self, _name: &str) -> Option<Expr> {
        None
    }
}

/// Folds an expression through a [`Rewrite`], recording the first error.
pub struct Lower<'m, 'a, R> {
    model: &'m ComponentModel<'a>,
    rewrite: &'m R,
    error: Option<CompileError>,
    scopes: Vec<Vec<String>>,
}

impl<'m, 'a, R: Rewrite> Lower<'m, 'a, R> {
    fn new(model: &'m ComponentModel<'a>, rewrite: &'m R) -> Self {
        Self {
            model,
            rewrite,
            error: None,
            scopes: Vec::new(),
        }
    }

    fn fail(&mut self, err: CompileError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn finish<T>(self, value: T) -> Result<T, CompileError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(value),
        }
    }

    fn is_shadowed(&self, name: &str) -> bool {
        self.scopes.iter().any(|s| s.iter().any(|n| n == name))
    }

    fn check_member_write(&mut self, target: &Expr) {
        if matches!(target, Expr::Ref(_)) {
            return;
        }
        if let Some(root) = written_root(target) {
            let kind = self.model.ref_kind(root);
            if let Err(err) = self.rewrite.member_write(root, kind) {
                self.fail(err);
            }
        }
    }
}

impl<R: Rewrite> Fold for Lower<'_, '_, R> {
    fn fold_expr(&mut self, expr: Expr) -> Expr {
        match expr {
            Expr::Ref(name) => {
                let kind = self.model.ref_kind(&name);
                self.rewrite.read(&name, kind)
            }
            Expr::Ident(name) => {
                if !self.is_shadowed(&name) {
                    if let Some(rewritten) = self.rewrite.ident(&name) {
                        return rewritten;
                    }
                }
                Expr::Ident(name)
            }
            Expr::Assign { op, target, value } => {
                if let Expr::Ref(name) = target.as_ref() {
                    let kind = self.model.ref_kind(name);
                    let value = self.fold_expr(*value);
                    return match self.rewrite.assign(name, kind, op, value) {
                        Ok(expr) => expr,
                        Err(err) => {
                            self.fail(err);
                            Expr::Undefined
                        }
                    };
                }
                self.check_member_write(&target);
                visit::fold_expr_children(self, Expr::Assign { op, target, value })
            }
            Expr::Update { op, prefix, target } => {
                if let Expr::Ref(name) = target.as_ref() {
                    let kind = self.model.ref_kind(name);
                    return match self.rewrite.update(name, kind, op, prefix) {
                        Ok(expr) => expr,
                        Err(err) => {
                            self.fail(err);
                            Expr::Undefined
                        }
                    };
                }
                self.check_member_write(&target);
                visit::fold_expr_children(self, Expr::Update { op, prefix, target })
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

/// `+=` -> `+`; `None` for plain `=`.
pub fn compound_operator(op: &str) -> Option<&'static str> {
    Some(match op {
        "+=" => "+",
        "-=" => "-",
        "*=" => "*",
        "/=" => "/",
        "%=" => "%",
        "**=" => "**",
        "&&=" => "&&",
        "||=" => "||",
        "??=" => "??",
        "<<=" => "<<",
        ">>=" => ">>",
        ">>>=" => ">>>",
        "&=" => "&",
        "|=" => "|",
        "^=" => "^",
        _ => return None,
    })
}

/// `++` -> `+`, `--` -> `-`.
pub fn update_operator(op: &str) -> &'static str {
    if op == "--" { "-" } else { "+" }
}

/// `current op (value)`, or `value` for plain assignment.
pub fn combine(current: Expr, op: &str, value: Expr) -> Expr {
    match compound_operator(op) {
        Some(binary) => Expr::Binary {
            op: binary,
            left: Box::new(current),
            right: Box::new(wrap_operand(value)),
        },
        None => value,
    }
}

/// `current + 1` for `++`.
pub fn increment(current: Expr, op: &str) -> Expr {
    Expr::Binary {
        op: update_operator(op),
        left: Box::new(current),
        right: Box::new(Expr::Number("1".into())),
    }
}

/// Parenthesize operands that are not atoms.
fn wrap_operand(value: Expr) -> Expr {
    match value {
        Expr::Number(_)
        | Expr::String { .. }
        | Expr::Template { .. }
        | Expr::Bool(_)
        | Expr::Null
        | Expr::Undefined
        | Expr::Ident(_)
        | Expr::Ref(_)
        | Expr::Array(_)
        | Expr::Call { .. }
        | Expr::Member { .. }
        | Expr::Index { .. }
        | Expr::Paren(_) => value,
        other => Expr::paren(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::reactive::analyze;

    fn with_model<T>(src: &str, f: impl FnOnce(&ComponentModel<'_>) -> T) -> T {
        let program = parse(src, "src/user-card.mtm").unwrap();
        let graph = analyze(&program).unwrap();
        let model = ComponentModel::new(&program, &graph);
        f(&model)
    }

    #[test]
    fn test_classification() {
        with_model(
            "---\ntarget: reactjs\nprops:\n  title: string\n---\n$count! = 0\n$doubled! = $count * 2\n$editable! = $count + 1\n$label = 'x'\n$bump = () => { $count++; $editable = 0 }\n",
            |model| {
                assert_eq!(model.name, "UserCard");
                assert_eq!(model.ref_kind("count"), RefKind::Reactive(BindingKind::State));
                assert_eq!(model.ref_kind("doubled"), RefKind::Reactive(BindingKind::Derived));
                assert_eq!(
                    model.ref_kind("editable"),
                    RefKind::Reactive(BindingKind::WritableDerived)
                );
                assert_eq!(model.ref_kind("label"), RefKind::Constant);
                assert_eq!(model.ref_kind("bump"), RefKind::Function);
                assert_eq!(model.ref_kind("title"), RefKind::Prop);
                assert_eq!(model.ref_kind("nope"), RefKind::Unknown);
                assert_eq!(model.bindings.len(), 3);
                assert_eq!(model.bindings[1].dependencies, vec!["count"]);
            },
        );
    }

    #[test]
    fn test_dependencies_are_emitted_first() {
        with_model("$doubled! = $count * 2\n$count! = 1\n$f = () => $count\n", |model| {
            let names: Vec<&str> = model
                .members
                .iter()
                .map(|m| match m {
                    Member::Reactive(d, _) | Member::Constant(d, _) => d.name.as_str(),
                    Member::Function(f) => f.name.as_str(),
                })
                .collect();
            assert_eq!(names, vec!["count", "doubled", "f"]);
        });
    }

    #[test]
    fn test_package_dependencies() {
        with_model(
            "import dayjs from 'dayjs'\nimport { x } from './local.js'\nimport { a } from '@acme/ui/button'\nimport 'dayjs/locale/de'\n",
            |model| {
                assert_eq!(model.package_dependencies("vue"), vec!["vue", "dayjs", "@acme/ui"]);
            },
        );
    }

    #[test]
    fn test_combine() {
        let out = combine(Expr::ident("x"), "+=", Expr::Binary {
            op: "*",
            left: Box::new(Expr::ident("a")),
            right: Box::new(Expr::ident("b")),
        });
        assert_eq!(crate::codegen::printer::print_expr(&out, 0), "x + (a * b)");
        assert_eq!(combine(Expr::ident("x"), "=", Expr::ident("y")), Expr::ident("y"));
        assert_eq!(compound_operator("??="), Some("??"));
    }
}
