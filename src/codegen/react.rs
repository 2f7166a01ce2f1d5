//! React function components.
//!
//! State becomes `useState`, derived values `useMemo`, and a derived value
//! that is also written becomes state re-synchronized by `useEffect`.
//! Writes go through the setter; compound writes use the updater form so
//! they see the latest value.

use crate::ast::{Attribute, Expr, Param, Program, TemplateChild};
use crate::config::Target;
use crate::error::CompileError;
use crate::helpers;
use crate::reactive::ReactiveGraph;

use super::markup::{self, Branch, Dialect};
use super::model::{self, BindingKind, ComponentModel, Member, RefKind, Rewrite};
use super::printer::{Printer, escape_attribute, escape_jsx_text, print_expr};
use super::{GeneratedCode, event_handler, react_event_name};

pub fn generate(program: &Program, graph: &ReactiveGraph) -> Result<GeneratedCode, CompileError> {
    let model = ComponentModel::new(program, graph);
    let rewrite = ReactRewrite { model: &model };
    let mut out = Printer::new();

    let mut hooks = Vec::new();
    if model.has_kind(BindingKind::State) || model.has_kind(BindingKind::WritableDerived) {
        hooks.push("useState");
    }
    if model.has_kind(BindingKind::Derived) {
        hooks.push("useMemo");
    }
    if model.has_kind(BindingKind::WritableDerived) {
        hooks.push("useEffect");
    }
    if model.has_loops() {
        hooks.push("Fragment");
    }
    if !hooks.is_empty() {
        out.line(format!("import {{ {} }} from 'react'", hooks.join(", ")));
    }
    super::write_imports(&mut out, &model);
    for style in &model.styles {
        out.line(format!("import '{style}'"));
    }
    out.blank();

    let props: Vec<&str> = model.props.iter().map(|(name, _)| name.as_str()).collect();
    let signature = if props.is_empty() {
        String::new()
    } else {
        format!("{{ {} }}", props.join(", "))
    };
    out.line(format!("export default function {}({signature}) {{", model.name));
    out.indent();

    super::write_channels(&mut out, &model);
    for member in &model.members {
        write_member(&mut out, &model, &rewrite, member)?;
    }

    out.blank();
    match model.template {
        Some(template) => {
            out.line("return (");
            out.indent();
            let mut dialect = Jsx { model: &model, rewrite: &rewrite };
            if markup::needs_fragment(&template.children) {
                out.line("<>");
                out.indent();
                markup::render_children(&mut dialect, &mut out, &template.children)?;
                out.dedent();
                out.line("</>");
            } else {
                markup::render_children(&mut dialect, &mut out, &template.children)?;
            }
            out.dedent();
            out.line(")");
        }
        None => out.line("return null"),
    }
    out.dedent();
    out.line("}");

    let mut generated = super::output(&model, Target::React, "react", out.finish());
    generated.warnings = model.in_place_mutation_warnings(Target::React);
    Ok(generated)
}

fn write_member(
    out: &mut Printer,
    model: &ComponentModel<'_>,
    rewrite: &ReactRewrite<'_, '_>,
    member: &Member<'_>,
) -> Result<(), CompileError> {
    match member {
        Member::Reactive(decl, kind) => {
            let init = out.expr(&model.lower_expr(rewrite, &decl.init)?);
            let setter = helpers::setter_name(&decl.name);
            match kind {
                BindingKind::State => {
                    out.line(format!("const [{}, {setter}] = useState({init})", decl.name));
                }
                BindingKind::Derived => {
                    let deps = dependency_list(model, decl);
                    out.line(format!("const {} = useMemo(() => {init}, [{deps}])", decl.name));
                }
                BindingKind::WritableDerived => {
                    let deps = dependency_list(model, decl);
                    out.line(format!("const [{}, {setter}] = useState({init})", decl.name));
                    out.line("useEffect(() => {");
                    out.indent();
                    out.line(format!("{setter}({init})"));
                    out.dedent();
                    out.line(format!("}}, [{deps}])"));
                }
            }
        }
        Member::Constant(decl, mutable) => {
            let keyword = if *mutable { "let" } else { "const" };
            let init = out.expr(&model.lower_expr(rewrite, &decl.init)?);
            out.line(format!("{keyword} {} = {init}", decl.name));
        }
        Member::Function(func) => {
            let lowered = model.lower_function(rewrite, func)?;
            out.line(out.function(&lowered));
        }
    }
    Ok(())
}

/// Hook dependency array: reactive dependencies, then props the initializer
/// reads.
fn dependency_list(model: &ComponentModel<'_>, decl: &crate::ast::VariableDeclaration) -> String {
    let mut deps: Vec<String> = decl.dependencies.iter().cloned().collect();
    for prop in model.props_in(&decl.init) {
        if !deps.contains(&prop) {
            deps.push(prop);
        }
    }
    deps.join(", ")
}

struct ReactRewrite<'m, 'a> {
    model: &'m ComponentModel<'a>,
}

impl ReactRewrite<'_, '_> {
    fn setter_call(name: &str, arg: Expr) -> Expr {
        Expr::call(Expr::ident(helpers::setter_name(name)), vec![arg])
    }

    fn updater(name: &str, body: Expr) -> Expr {
        Expr::arrow(vec![Param::named(name)], body)
    }
}

impl Rewrite for ReactRewrite<'_, '_> {
    fn read(&self, name: &str, _kind: RefKind) -> Expr {
        Expr::ident(name)
    }

    fn assign(&self, name: &str, kind: RefKind, op: &'static str, value: Expr) -> Result<Expr, CompileError> {
        match kind {
            RefKind::Reactive(_) => Ok(match model::compound_operator(op) {
                None => Self::setter_call(name, value),
                Some(_) => Self::setter_call(
                    name,
                    Self::updater(name, model::combine(Expr::ident(name), op, value)),
                ),
            }),
            RefKind::Prop => Err(self.model.prop_write_error(Target::React, name)),
            _ => Ok(Expr::Assign {
                op,
                target: Box::new(Expr::ident(name)),
                value: Box::new(value),
            }),
        }
    }

    fn update(&self, name: &str, kind: RefKind, op: &'static str, prefix: bool) -> Result<Expr, CompileError> {
        match kind {
            RefKind::Reactive(_) => Ok(Self::setter_call(
                name,
                Self::updater(name, model::increment(Expr::ident(name), op)),
            )),
            RefKind::Prop => Err(self.model.prop_write_error(Target::React, name)),
            _ => Ok(Expr::Update {
                op,
                prefix,
                target: Box::new(Expr::ident(name)),
            }),
        }
    }

    fn member_write(&self, root: &str, kind: RefKind) -> Result<(), CompileError> {
        match kind {
            RefKind::Reactive(_) => Err(self
                .model
                .framework_error(
                    Target::React,
                    format!("cannot mutate `${root}` in place: React state is replaced, not modified"),
                )
                .with_suggestion(format!("assign a new value instead, e.g. `${root} = {{ ...${root} }}`"))),
            RefKind::Prop => Err(self.model.prop_write_error(Target::React, root)),
            _ => Ok(()),
        }
    }
}

struct Jsx<'m, 'a> {
    model: &'m ComponentModel<'a>,
    rewrite: &'m ReactRewrite<'m, 'a>,
}

impl Jsx<'_, '_> {
    fn lower(&self, expr: &Expr) -> Result<Expr, CompileError> {
        self.model.lower_expr(self.rewrite, expr)
    }

    fn print(&self, expr: &Expr) -> Result<String, CompileError> {
        Ok(print_expr(&self.lower(expr)?, 0))
    }

    fn fragment(&mut self, out: &mut Printer, body: &[TemplateChild]) -> Result<(), CompileError> {
        out.indent();
        out.line("<>");
        out.indent();
        markup::render_children(self, out, body)?;
        out.dedent();
        out.line("</>");
        out.dedent();
        Ok(())
    }
}

fn attribute_name(name: &str) -> &str {
    match name {
        "class" => "className",
        "for" => "htmlFor",
        other => other,
    }
}

impl Dialect for Jsx<'_, '_> {
    fn interpolation(&mut self, expr: &Expr) -> Result<String, CompileError> {
        Ok(format!("{{{}}}", self.print(expr)?))
    }

    fn attribute(&mut self, _tag: &str, attr: &Attribute) -> Result<String, CompileError> {
        Ok(match attr {
            Attribute::Static { name, value: Some(value) } => {
                format!("{}=\"{}\"", attribute_name(name), escape_attribute(value))
            }
            Attribute::Static { name, value: None } => attribute_name(name).to_string(),
            Attribute::Binding { name, expr } => {
                format!("{}={{{}}}", attribute_name(name), self.print(expr)?)
            }
            Attribute::Event { event, handler } => {
                let lowered = event_handler(handler, self.lower(handler)?);
                format!("{}={{{}}}", react_event_name(event), print_expr(&lowered, 0))
            }
        })
    }

    fn text(&self, text: &str) -> String {
        escape_jsx_text(text)
    }

    fn conditional(&mut self, out: &mut Printer, branches: &[Branch<'_>]) -> Result<(), CompileError> {
        if let [(Some(condition), body)] = branches {
            out.line(format!("{{{} && (", self.print(condition)?));
            self.fragment(out, body)?;
            out.line(")}");
            return Ok(());
        }
        for (i, (condition, body)) in branches.iter().enumerate() {
            match (i, condition) {
                (0, Some(c)) => out.line(format!("{{{} ? (", self.print(c)?)),
                (_, Some(c)) => out.line(format!(") : {} ? (", self.print(c)?)),
                (_, None) => out.line(") : ("),
            }
            self.fragment(out, body)?;
        }
        match branches.last() {
            Some((Some(_), _)) => out.line(") : null}"),
            _ => out.line(")}"),
        }
        Ok(())
    }

    fn each(
        &mut self,
        out: &mut Printer,
        iterable: &Expr,
        item: &str,
        index: Option<&str>,
        body: &[TemplateChild],
    ) -> Result<(), CompileError> {
        let index = index.unwrap_or("index");
        out.line(format!("{{{}.map(({item}, {index}) => (", self.print(iterable)?));
        out.indent();
        out.line(format!("<Fragment key={{{index}}}>"));
        out.indent();
        markup::render_children(self, out, body)?;
        out.dedent();
        out.line("</Fragment>");
        out.dedent();
        out.line("))}");
        Ok(())
    }
}
