//! Solid components built on signals.
//!
//! Reading state calls the signal getter, writing calls the setter, and
//! props stay behind `props.` so they remain reactive.

use crate::ast::{Attribute, Expr, Program, TemplateChild};
use crate::config::Target;
use crate::error::CompileError;
use crate::helpers;
use crate::reactive::ReactiveGraph;

use super::markup::{self, Branch, Dialect};
use super::model::{self, BindingKind, ComponentModel, Member, RefKind, Rewrite};
use super::printer::{Printer, escape_attribute, escape_jsx_text, print_expr};
use super::{GeneratedCode, event_handler};

pub fn generate(program: &Program, graph: &ReactiveGraph) -> Result<GeneratedCode, CompileError> {
    let model = ComponentModel::new(program, graph);
    let rewrite = SolidRewrite {
        model: &model,
        loops: Vec::new(),
    };
    let mut out = Printer::new();

    let mut api = Vec::new();
    if model.has_kind(BindingKind::State) || model.has_kind(BindingKind::WritableDerived) {
        api.push("createSignal");
    }
    if model.has_kind(BindingKind::Derived) {
        api.push("createMemo");
    }
    if model.has_kind(BindingKind::WritableDerived) {
        api.push("createEffect");
    }
    if model.has_conditionals() {
        api.push("Show");
    }
    if model.has_loops() {
        api.push("For");
    }
    if !api.is_empty() {
        out.line(format!("import {{ {} }} from 'solid-js'", api.join(", ")));
    }
    super::write_imports(&mut out, &model);
    for style in &model.styles {
        out.line(format!("import '{style}'"));
    }
    out.blank();

    let signature = if model.props.is_empty() { "" } else { "props" };
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
            let mut dialect = SolidMarkup { rewrite };
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

    let mut generated = super::output(&model, Target::Solid, "solid-js", out.finish());
    generated.warnings = model.in_place_mutation_warnings(Target::Solid);
    Ok(generated)
}

fn write_member(
    out: &mut Printer,
    model: &ComponentModel<'_>,
    rewrite: &SolidRewrite<'_, '_>,
    member: &Member<'_>,
) -> Result<(), CompileError> {
    match member {
        Member::Reactive(decl, kind) => {
            let init = out.expr(&model.lower_expr(rewrite, &decl.init)?);
            let setter = helpers::setter_name(&decl.name);
            match kind {
                BindingKind::State => {
                    out.line(format!("const [{}, {setter}] = createSignal({init})", decl.name));
                }
                BindingKind::Derived => {
                    out.line(format!("const {} = createMemo(() => {init})", decl.name));
                }
                BindingKind::WritableDerived => {
                    out.line(format!("const [{}, {setter}] = createSignal({init})", decl.name));
                    out.line(format!("createEffect(() => {setter}({init}))"));
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

struct SolidRewrite<'m, 'a> {
    model: &'m ComponentModel<'a>,
    /// Enclosing `<For>` bindings as `(item, index)`, innermost last.
    loops: Vec<(String, Option<String>)>,
}

impl SolidRewrite<'_, '_> {
    fn getter(name: &str) -> Expr {
        Expr::call(Expr::ident(name), Vec::new())
    }

    fn setter_call(name: &str, arg: Expr) -> Expr {
        Expr::call(Expr::ident(helpers::setter_name(name)), vec![arg])
    }
}

impl Rewrite for SolidRewrite<'_, '_> {
    fn read(&self, name: &str, kind: RefKind) -> Expr {
        match kind {
            RefKind::Reactive(_) => Self::getter(name),
            RefKind::Prop => Expr::member(Expr::ident("props"), name),
            _ => Expr::ident(name),
        }
    }

    fn assign(&self, name: &str, kind: RefKind, op: &'static str, value: Expr) -> Result<Expr, CompileError> {
        match kind {
            RefKind::Reactive(_) => Ok(Self::setter_call(
                name,
                model::combine(Self::getter(name), op, value),
            )),
            RefKind::Prop => Err(self.model.prop_write_error(Target::Solid, name)),
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
                model::increment(Self::getter(name), op),
            )),
            RefKind::Prop => Err(self.model.prop_write_error(Target::Solid, name)),
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
                    Target::Solid,
                    format!("cannot mutate `${root}` in place: signals only notify when set"),
                )
                .with_suggestion(format!("assign a new value instead, e.g. `${root} = {{ ...${root} }}`"))),
            RefKind::Prop => Err(self.model.prop_write_error(Target::Solid, root)),
            _ => Ok(()),
        }
    }

    /// `<For>` passes the index as an accessor.
    fn ident(&self, name: &str) -> Option<Expr> {
        for (item, index) in self.loops.iter().rev() {
            if item == name {
                return None;
            }
            if index.as_deref() == Some(name) {
                return Some(Self::getter(name));
            }
        }
        None
    }
}

struct SolidMarkup<'m, 'a> {
    rewrite: SolidRewrite<'m, 'a>,
}

impl SolidMarkup<'_, '_> {
    fn lower(&self, expr: &Expr) -> Result<Expr, CompileError> {
        self.rewrite.model.lower_expr(&self.rewrite, expr)
    }

    fn print(&self, expr: &Expr) -> Result<String, CompileError> {
        Ok(print_expr(&self.lower(expr)?, 0))
    }

    fn fragment(&mut self, out: &mut Printer, body: &[TemplateChild]) -> Result<(), CompileError> {
        out.line("<>");
        out.indent();
        markup::render_children(self, out, body)?;
        out.dedent();
        out.line("</>");
        Ok(())
    }

    fn show(&mut self, out: &mut Printer, branches: &[Branch<'_>]) -> Result<(), CompileError> {
        let Some(((condition, body), rest)) = branches.split_first() else {
            return Ok(());
        };
        let when = match condition {
            Some(c) => self.print(c)?,
            None => return markup::render_children(self, out, body),
        };
        if rest.is_empty() {
            out.line(format!("<Show when={{{when}}}>"));
        } else {
            out.line(format!("<Show when={{{when}}} fallback={{"));
            out.indent();
            match rest {
                [(None, otherwise)] => self.fragment(out, otherwise)?,
                _ => self.show(out, rest)?,
            }
            out.dedent();
            out.line("}>");
        }
        out.indent();
        markup::render_children(self, out, body)?;
        out.dedent();
        out.line("</Show>");
        Ok(())
    }
}

impl Dialect for SolidMarkup<'_, '_> {
    fn interpolation(&mut self, expr: &Expr) -> Result<String, CompileError> {
        Ok(format!("{{{}}}", self.print(expr)?))
    }

    fn attribute(&mut self, _tag: &str, attr: &Attribute) -> Result<String, CompileError> {
        Ok(match attr {
            Attribute::Static { name, value: Some(value) } => {
                format!("{name}=\"{}\"", escape_attribute(value))
            }
            Attribute::Static { name, value: None } => name.clone(),
            Attribute::Binding { name, expr } => format!("{name}={{{}}}", self.print(expr)?),
            Attribute::Event { event, handler } => {
                let lowered = event_handler(handler, self.lower(handler)?);
                format!("on{}={{{}}}", helpers::capitalize(event), print_expr(&lowered, 0))
            }
        })
    }

    fn text(&self, text: &str) -> String {
        escape_jsx_text(text)
    }

    fn conditional(&mut self, out: &mut Printer, branches: &[Branch<'_>]) -> Result<(), CompileError> {
        self.show(out, branches)
    }

    fn each(
        &mut self,
        out: &mut Printer,
        iterable: &Expr,
        item: &str,
        index: Option<&str>,
        body: &[TemplateChild],
    ) -> Result<(), CompileError> {
        let each = self.print(iterable)?;
        let params = match index {
            Some(index) => format!("{item}, {index}"),
            None => item.to_string(),
        };
        out.line(format!("<For each={{{each}}}>"));
        out.indent();
        out.line(format!("{{({params}) => ("));
        out.indent();
        self.rewrite.loops.push((item.to_string(), index.map(str::to_string)));
        let rendered = self.fragment(out, body);
        self.rewrite.loops.pop();
        rendered?;
        out.dedent();
        out.line(")}");
        out.dedent();
        out.line("</For>");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::reactive::analyze;

    fn solid(src: &str) -> Result<String, CompileError> {
        let program = parse(src, "src/Demo.mtm").unwrap();
        let graph = analyze(&program).unwrap();
        generate(&program, &graph).map(|g| g.code)
    }

    #[test]
    fn test_signal_component() {
        let code = solid(
            "---\ntarget: solid\nprops:\n  step: number\n---\n$count! = 0\n$doubled! = $count * 2\n$add = () => { $count += $step }\n\ntemplate(`\n  <button onclick={$add}>{{$doubled}}</button>\n`)\n",
        )
        .unwrap();
        assert_eq!(
            code,
            "import { createSignal, createMemo } from 'solid-js'\n\
             \n\
             export default function Demo(props) {\n\
             \x20 const [count, setCount] = createSignal(0)\n\
             \x20 const doubled = createMemo(() => count() * 2)\n\
             \x20 const add = () => {\n\
             \x20   setCount(count() + props.step)\n\
             \x20 }\n\
             \n\
             \x20 return (\n\
             \x20   <button onClick={add}>{doubled()}</button>\n\
             \x20 )\n\
             }\n"
        );
    }

    #[test]
    fn test_show_and_for() {
        let code = solid(
            "$items! = []\n$base! = 1\n$offset! = $base + 1\n$reset = () => { $offset = 0 }\n\ntemplate(`\n  <ul>{#each $items as item, i}<li>{{i + $offset}} {{item}}</li>{/each}</ul>\n  {#if $items.length}<p>some</p>{:else}<p>none</p>{/if}\n`)\n",
        )
        .unwrap();
        assert!(code.contains("import { createSignal, createEffect, Show, For } from 'solid-js'"), "{code}");
        assert!(code.contains("createEffect(() => setOffset(base() + 1))"), "{code}");
        assert!(code.contains("<For each={items()}>\n"), "{code}");
        assert!(code.contains("{(item, i) => (\n"), "{code}");
        assert!(code.contains("<li>{i() + offset()} {item}</li>"), "{code}");
        assert!(code.contains("<Show when={items().length} fallback={\n"), "{code}");
        assert!(code.contains("}>\n        <p>some</p>\n      </Show>"), "{code}");
    }

    #[test]
    fn test_in_place_mutation_is_rejected() {
        let err = solid("$list! = []\n$add = () => { $list.push(1); $list[0] = 2 }\n").unwrap_err();
        assert!(matches!(err.kind, crate::error::ErrorKind::Framework { target: Target::Solid }));
    }
}
