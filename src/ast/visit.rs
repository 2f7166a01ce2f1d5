//! Traversal of the AST.
//!
//! [`Visitor`] walks by reference, [`Fold`] rebuilds by value. Both report
//! lexical scopes through `enter_scope`/`exit_scope`/`declare` so that passes
//! which care about shadowing (legacy accessor normalization, loop indices in
//! code generation) can track bound names without re-implementing the walk.

use super::{
    Attribute, Expr, FunctionBody, FunctionDeclaration, Param, Property, PropertyKey, Stmt,
    TemplateChild,
};

pub trait Visitor {
    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_function_body(&mut self, body: &FunctionBody) {
        walk_function_body(self, body);
    }

    fn visit_template_child(&mut self, child: &TemplateChild) {
        walk_template_child(self, child);
    }

    fn enter_scope(&mut self, _bound: &[&str]) {}

    fn exit_scope(&mut self) {}

    fn declare(&mut self, _name: &str) {}
}

pub fn walk_expr<V: Visitor + ?Sized>(v: &mut V, expr: &Expr) {
    match expr {
        Expr::Number(_)
        | Expr::String { .. }
        | Expr::Bool(_)
        | Expr::Null
        | Expr::Undefined
        | Expr::Ident(_)
        | Expr::Ref(_) => {}
        Expr::Template { exprs, .. } => {
            for e in exprs {
                v.visit_expr(e);
            }
        }
        Expr::Array(items) => {
            for item in items {
                v.visit_expr(item);
            }
        }
        Expr::Object(props) => {
            for prop in props {
                match prop {
                    Property::KeyValue { key, value } => {
                        if let PropertyKey::Computed(k) = key {
                            v.visit_expr(k);
                        }
                        v.visit_expr(value);
                    }
                    Property::Shorthand(_) => {}
                    Property::Spread(e) => v.visit_expr(e),
                }
            }
        }
        Expr::Spread(e) | Expr::Await(e) | Expr::Paren(e) => v.visit_expr(e),
        Expr::Unary { arg, .. } => v.visit_expr(arg),
        Expr::Update { target, .. } => v.visit_expr(target),
        Expr::Binary { left, right, .. } => {
            v.visit_expr(left);
            v.visit_expr(right);
        }
        Expr::Assign { target, value, .. } => {
            v.visit_expr(target);
            v.visit_expr(value);
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            v.visit_expr(test);
            v.visit_expr(consequent);
            v.visit_expr(alternate);
        }
        Expr::Call { callee, args, .. } | Expr::New { callee, args } => {
            v.visit_expr(callee);
            for arg in args {
                v.visit_expr(arg);
            }
        }
        Expr::Member { object, .. } => v.visit_expr(object),
        Expr::Index { object, index, .. } => {
            v.visit_expr(object);
            v.visit_expr(index);
        }
        Expr::Arrow { params, body, .. } => {
            walk_params(v, params);
            let bound = param_names(params);
            v.enter_scope(&bound);
            v.visit_function_body(body);
            v.exit_scope();
        }
    }
}

fn walk_params<V: Visitor + ?Sized>(v: &mut V, params: &[Param]) {
    for param in params {
        if let Some(default) = &param.default {
            v.visit_expr(default);
        }
    }
}

fn param_names(params: &[Param]) -> Vec<&str> {
    params.iter().map(|p| p.name.as_str()).collect()
}

pub fn walk_function_body<V: Visitor + ?Sized>(v: &mut V, body: &FunctionBody) {
    match body {
        FunctionBody::Expr(e) => v.visit_expr(e),
        FunctionBody::Block(stmts) => {
            for stmt in stmts {
                v.visit_stmt(stmt);
            }
        }
    }
}

/// Walk a named function: its defaults, then its body with params bound.
pub fn walk_function<V: Visitor + ?Sized>(v: &mut V, func: &FunctionDeclaration) {
    walk_params(v, &func.params);
    v.enter_scope(&param_names(&func.params));
    v.visit_function_body(&func.body);
    v.exit_scope();
}

pub fn walk_stmt<V: Visitor + ?Sized>(v: &mut V, stmt: &Stmt) {
    match stmt {
        Stmt::Expr(e) => v.visit_expr(e),
        Stmt::VarDecl { name, init, .. } => {
            if let Some(init) = init {
                v.visit_expr(init);
            }
            v.declare(name);
        }
        Stmt::If {
            test,
            consequent,
            alternate,
        } => {
            v.visit_expr(test);
            v.visit_stmt(consequent);
            if let Some(alternate) = alternate {
                v.visit_stmt(alternate);
            }
        }
        Stmt::Block(stmts) => {
            v.enter_scope(&[]);
            for s in stmts {
                v.visit_stmt(s);
            }
            v.exit_scope();
        }
        Stmt::Return(e) => {
            if let Some(e) = e {
                v.visit_expr(e);
            }
        }
        Stmt::ForOf {
            binding,
            iterable,
            body,
            ..
        } => {
            v.visit_expr(iterable);
            v.enter_scope(&[binding.as_str()]);
            v.visit_stmt(body);
            v.exit_scope();
        }
        Stmt::While { test, body } => {
            v.visit_expr(test);
            v.visit_stmt(body);
        }
    }
}

pub fn walk_template_child<V: Visitor + ?Sized>(v: &mut V, child: &TemplateChild) {
    match child {
        TemplateChild::Element {
            attributes,
            children,
            ..
        } => {
            for attr in attributes {
                match attr {
                    Attribute::Static { .. } => {}
                    Attribute::Binding { expr, .. } => v.visit_expr(expr),
                    Attribute::Event { handler, .. } => v.visit_expr(handler),
                }
            }
            for c in children {
                v.visit_template_child(c);
            }
        }
        TemplateChild::Text(_) => {}
        TemplateChild::Interpolation(e) => v.visit_expr(e),
        TemplateChild::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            v.visit_expr(condition);
            for c in then_branch {
                v.visit_template_child(c);
            }
            if let Some(else_branch) = else_branch {
                for c in else_branch {
                    v.visit_template_child(c);
                }
            }
        }
        TemplateChild::Loop {
            iterable,
            item_name,
            index_name,
            body,
        } => {
            v.visit_expr(iterable);
            let mut bound = vec![item_name.as_str()];
            bound.extend(index_name.as_deref());
            v.enter_scope(&bound);
            for c in body {
                v.visit_template_child(c);
            }
            v.exit_scope();
        }
    }
}

/// Rebuilding traversal.
pub trait Fold {
    fn fold_expr(&mut self, expr: Expr) -> Expr {
        fold_expr_children(self, expr)
    }

    fn fold_stmt(&mut self, stmt: Stmt) -> Stmt {
        fold_stmt_children(self, stmt)
    }

    fn fold_function_body(&mut self, body: FunctionBody) -> FunctionBody {
        match body {
            FunctionBody::Expr(e) => FunctionBody::Expr(Box::new(self.fold_expr(*e))),
            FunctionBody::Block(stmts) => {
                FunctionBody::Block(stmts.into_iter().map(|s| self.fold_stmt(s)).collect())
            }
        }
    }

    fn fold_template_child(&mut self, child: TemplateChild) -> TemplateChild {
        fold_template_child_children(self, child)
    }

    fn enter_scope(&mut self, _bound: &[&str]) {}

    fn exit_scope(&mut self) {}

    fn declare(&mut self, _name: &str) {}
}

fn fold_box<F: Fold + ?Sized>(f: &mut F, e: Box<Expr>) -> Box<Expr> {
    Box::new(f.fold_expr(*e))
}

fn fold_params<F: Fold + ?Sized>(f: &mut F, params: Vec<Param>) -> Vec<Param> {
    params
        .into_iter()
        .map(|p| Param {
            default: p.default.map(|d| f.fold_expr(d)),
            ..p
        })
        .collect()
}

pub fn fold_expr_children<F: Fold + ?Sized>(f: &mut F, expr: Expr) -> Expr {
    match expr {
        Expr::Number(_)
        | Expr::String { .. }
        | Expr::Bool(_)
        | Expr::Null
        | Expr::Undefined
        | Expr::Ident(_)
        | Expr::Ref(_) => expr,
        Expr::Template { quasis, exprs } => Expr::Template {
            quasis,
            exprs: exprs.into_iter().map(|e| f.fold_expr(e)).collect(),
        },
        Expr::Array(items) => Expr::Array(items.into_iter().map(|e| f.fold_expr(e)).collect()),
        Expr::Object(props) => Expr::Object(
            props
                .into_iter()
                .map(|prop| match prop {
                    Property::KeyValue { key, value } => Property::KeyValue {
                        key: match key {
                            PropertyKey::Computed(k) => PropertyKey::Computed(fold_box(f, k)),
                            other => other,
                        },
                        value: f.fold_expr(value),
                    },
                    Property::Shorthand(name) => Property::Shorthand(name),
                    Property::Spread(e) => Property::Spread(f.fold_expr(e)),
                })
                .collect(),
        ),
        Expr::Spread(e) => Expr::Spread(fold_box(f, e)),
        Expr::Await(e) => Expr::Await(fold_box(f, e)),
        Expr::Paren(e) => Expr::Paren(fold_box(f, e)),
        Expr::Unary { op, arg } => Expr::Unary {
            op,
            arg: fold_box(f, arg),
        },
        Expr::Update { op, prefix, target } => Expr::Update {
            op,
            prefix,
            target: fold_box(f, target),
        },
        Expr::Binary { op, left, right } => Expr::Binary {
            op,
            left: fold_box(f, left),
            right: fold_box(f, right),
        },
        Expr::Assign { op, target, value } => Expr::Assign {
            op,
            target: fold_box(f, target),
            value: fold_box(f, value),
        },
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => Expr::Conditional {
            test: fold_box(f, test),
            consequent: fold_box(f, consequent),
            alternate: fold_box(f, alternate),
        },
        Expr::Call {
            callee,
            args,
            optional,
        } => Expr::Call {
            callee: fold_box(f, callee),
            args: args.into_iter().map(|a| f.fold_expr(a)).collect(),
            optional,
        },
        Expr::New { callee, args } => Expr::New {
            callee: fold_box(f, callee),
            args: args.into_iter().map(|a| f.fold_expr(a)).collect(),
        },
        Expr::Member {
            object,
            property,
            optional,
        } => Expr::Member {
            object: fold_box(f, object),
            property,
            optional,
        },
        Expr::Index {
            object,
            index,
            optional,
        } => Expr::Index {
            object: fold_box(f, object),
            index: fold_box(f, index),
            optional,
        },
        Expr::Arrow {
            is_async,
            params,
            body,
        } => {
            let params = fold_params(f, params);
            let bound: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
            let bound: Vec<&str> = bound.iter().map(String::as_str).collect();
            f.enter_scope(&bound);
            let body = f.fold_function_body(*body);
            f.exit_scope();
            Expr::Arrow {
                is_async,
                params,
                body: Box::new(body),
            }
        }
    }
}

/// Fold a named function: its defaults, then its body with params bound.
pub fn fold_function<F: Fold + ?Sized>(f: &mut F, func: FunctionDeclaration) -> FunctionDeclaration {
    let params = fold_params(f, func.params);
    let bound: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
    let bound: Vec<&str> = bound.iter().map(String::as_str).collect();
    f.enter_scope(&bound);
    let body = f.fold_function_body(func.body);
    f.exit_scope();
    FunctionDeclaration {
        params,
        body,
        ..func
    }
}

pub fn fold_stmt_children<F: Fold + ?Sized>(f: &mut F, stmt: Stmt) -> Stmt {
    match stmt {
        Stmt::Expr(e) => Stmt::Expr(f.fold_expr(e)),
        Stmt::VarDecl { kind, name, init } => {
            let init = init.map(|e| f.fold_expr(e));
            f.declare(&name);
            Stmt::VarDecl { kind, name, init }
        }
        Stmt::If {
            test,
            consequent,
            alternate,
        } => Stmt::If {
            test: f.fold_expr(test),
            consequent: Box::new(f.fold_stmt(*consequent)),
            alternate: alternate.map(|s| Box::new(f.fold_stmt(*s))),
        },
        Stmt::Block(stmts) => {
            f.enter_scope(&[]);
            let stmts = stmts.into_iter().map(|s| f.fold_stmt(s)).collect();
            f.exit_scope();
            Stmt::Block(stmts)
        }
        Stmt::Return(e) => Stmt::Return(e.map(|e| f.fold_expr(e))),
        Stmt::ForOf {
            kind,
            binding,
            iterable,
            body,
        } => {
            let iterable = f.fold_expr(iterable);
            f.enter_scope(&[binding.as_str()]);
            let body = Box::new(f.fold_stmt(*body));
            f.exit_scope();
            Stmt::ForOf {
                kind,
                binding,
                iterable,
                body,
            }
        }
        Stmt::While { test, body } => Stmt::While {
            test: f.fold_expr(test),
            body: Box::new(f.fold_stmt(*body)),
        },
    }
}

pub fn fold_template_child_children<F: Fold + ?Sized>(
    f: &mut F,
    child: TemplateChild,
) -> TemplateChild {
    match child {
        TemplateChild::Element {
            tag,
            attributes,
            children,
            self_closing,
        } => TemplateChild::Element {
            tag,
            attributes: attributes
                .into_iter()
                .map(|attr| match attr {
                    Attribute::Static { .. } => attr,
                    Attribute::Binding { name, expr } => Attribute::Binding {
                        name,
                        expr: f.fold_expr(expr),
                    },
                    Attribute::Event { event, handler } => Attribute::Event {
                        event,
                        handler: f.fold_expr(handler),
                    },
                })
                .collect(),
            children: children
                .into_iter()
                .map(|c| f.fold_template_child(c))
                .collect(),
            self_closing,
        },
        TemplateChild::Text(_) => child,
        TemplateChild::Interpolation(e) => TemplateChild::Interpolation(f.fold_expr(e)),
        TemplateChild::Conditional {
            condition,
            then_branch,
            else_branch,
        } => TemplateChild::Conditional {
            condition: f.fold_expr(condition),
            then_branch: then_branch
                .into_iter()
                .map(|c| f.fold_template_child(c))
                .collect(),
            else_branch: else_branch
                .map(|branch| branch.into_iter().map(|c| f.fold_template_child(c)).collect()),
        },
        TemplateChild::Loop {
            iterable,
            item_name,
            index_name,
            body,
        } => {
            let iterable = f.fold_expr(iterable);
            let mut bound = vec![item_name.as_str()];
            bound.extend(index_name.as_deref());
            f.enter_scope(&bound);
            let body = body.into_iter().map(|c| f.fold_template_child(c)).collect();
            f.exit_scope();
            TemplateChild::Loop {
                iterable,
                item_name,
                index_name,
                body,
            }
        }
    }
}

/// Collect every `$name` referenced by `expr`, in first-seen order.
pub fn collect_refs(expr: &Expr) -> Vec<String> {
    struct Refs(Vec<String>);
    impl Visitor for Refs {
        fn visit_expr(&mut self, expr: &Expr) {
            if let Expr::Ref(name) = expr {
                if !self.0.contains(name) {
                    self.0.push(name.clone());
                }
            }
            walk_expr(self, expr);
        }
    }
    let mut refs = Refs(Vec::new());
    refs.visit_expr(expr);
    refs.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Expr {
        // ($a + $b) * $a
        Expr::Binary {
            op: "*",
            left: Box::new(Expr::paren(Expr::Binary {
                op: "+",
                left: Box::new(Expr::Ref("a".into())),
                right: Box::new(Expr::Ref("b".into())),
            })),
            right: Box::new(Expr::Ref("a".into())),
        }
    }

    #[test]
    fn test_collect_refs() {
        assert_eq!(collect_refs(&sample()), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_fold_renames() {
        struct Rename;
        impl Fold for Rename {
            fn fold_expr(&mut self, expr: Expr) -> Expr {
                match expr {
                    Expr::Ref(name) => Expr::Ident(name),
                    other => fold_expr_children(self, other),
                }
            }
        }

        let folded = Rename.fold_expr(sample());
        assert!(collect_refs(&folded).is_empty());
    }

    #[test]
    fn test_scopes_are_balanced() {
        #[derive(Default)]
        struct Depth {
            current: usize,
            max: usize,
        }
        impl Visitor for Depth {
            fn enter_scope(&mut self, _bound: &[&str]) {
                self.current += 1;
                self.max = self.max.max(self.current);
            }
            fn exit_scope(&mut self) {
                self.current -= 1;
            }
        }

        // (x) => (y) => x + y
        let inner = Expr::arrow(
            vec![Param::named("y")],
            Expr::Binary {
                op: "+",
                left: Box::new(Expr::ident("x")),
                right: Box::new(Expr::ident("y")),
            },
        );
        let outer = Expr::arrow(vec![Param::named("x")], inner);

        let mut depth = Depth::default();
        depth.visit_expr(&outer);
        assert_eq!(depth.current, 0);
        assert_eq!(depth.max, 2);
    }
}
