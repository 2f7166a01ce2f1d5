//! Svelte components backed by stores.
//!
//! State is a `writable` store read and written through Svelte's `$store`
//! auto-subscription, so `$count++` passes through unchanged. Props are
//! `export let` bindings and may be reassigned.

use crate::ast::{Attribute, Expr, Program, TemplateChild};
use crate::config::Target;
use crate::error::CompileError;
use crate::reactive::ReactiveGraph;

use super::markup::{self, Branch, Dialect};
use super::model::{BindingKind, ComponentModel, Member, RefKind, Rewrite};
use super::printer::{Printer, escape_attribute, print_expr};
use super::{GeneratedCode, event_handler};

pub fn generate(program: &Program, graph: &ReactiveGraph) -> Result<GeneratedCode, CompileError> {
    let model = ComponentModel::new(program, graph);
    let rewrite = SvelteRewrite { stores_as_values: false };
    let mut out = Printer::new();

    out.line("<script>");
    let mut api = Vec::new();
    if model.has_kind(BindingKind::State)
        || model.has_kind(BindingKind::WritableDerived)
        || model.members.iter().any(|m| is_synced(&model, m))
    {
        api.push("writable");
    }
    if model.members.iter().any(|m| matches!(m, Member::Reactive(_, BindingKind::Derived)) && !is_synced(&model, m)) {
        api.push("derived");
    }
    if !api.is_empty() {
        out.line(format!("import {{ {} }} from 'svelte/store'", api.join(", ")));
    }
    super::write_imports(&mut out, &model);
    out.blank();

    for (name, _) in &model.props {
        out.line(format!("export let {name}"));
    }
    super::write_channels(&mut out, &model);
    for member in &model.members {
        write_member(&mut out, &model, &rewrite, member)?;
    }
    out.line("</script>");

    if let Some(template) = model.template {
        out.blank();
        let mut dialect = SvelteMarkup { model: &model, rewrite: &rewrite };
        markup::render_children(&mut dialect, &mut out, &template.children)?;
    }

    if !model.styles.is_empty() {
        out.blank();
        out.line("<style>");
        out.indent();
        for style in &model.styles {
            out.line(format!("@import '{style}';"));
        }
        out.dedent();
        out.line("</style>");
    }

    Ok(super::output(&model, Target::Svelte, "svelte", out.finish()))
}

/// A derived value that reads props cannot be a `derived` store, which only
/// tracks stores; it is kept in sync with a reactive statement instead.
fn is_synced(model: &ComponentModel<'_>, member: &Member<'_>) -> bool {
    match member {
        Member::Reactive(decl, BindingKind::Derived) => !model.props_in(&decl.init).is_empty(),
        _ => false,
    }
}

fn write_member(
    out: &mut Printer,
    model: &ComponentModel<'_>,
    rewrite: &SvelteRewrite,
    member: &Member<'_>,
) -> Result<(), CompileError> {
    match member {
        Member::Reactive(decl, kind) => {
            let init = out.expr(&model.lower_expr(rewrite, &decl.init)?);
            let synced = *kind == BindingKind::WritableDerived || is_synced(model, member);
            if *kind == BindingKind::State {
                out.line(format!("const {} = writable({init})", decl.name));
            } else if synced {
                out.line(format!("const {} = writable({init})", decl.name));
                out.line(format!("$: ${} = {init}", decl.name));
            } else {
                let stores: Vec<&str> = decl.dependencies.iter().map(String::as_str).collect();
                let values = SvelteRewrite { stores_as_values: true };
                let body = out.expr(&model.lower_expr(&values, &decl.init)?);
                out.line(format!(
                    "const {} = derived([{list}], ([{list}]) => {body})",
                    decl.name,
                    list = stores.join(", ")
                ));
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

struct SvelteRewrite {
    /// Inside a `derived` callback the store values arrive as plain
    /// parameters named after the stores.
    stores_as_values: bool,
}

impl SvelteRewrite {
    fn place(&self, name: &str, kind: RefKind) -> Expr {
        match kind {
            RefKind::Reactive(_) if !self.stores_as_values => Expr::Ref(name.to_string()),
            _ => Expr::ident(name),
        }
    }
}

impl Rewrite for SvelteRewrite {
    fn read(&self, name: &str, kind: RefKind) -> Expr {
        self.place(name, kind)
    }

    fn assign(&self, name: &str, kind: RefKind, op: &'static str, value: Expr) -> Result<Expr, CompileError> {
        Ok(Expr::Assign {
            op,
            target: Box::new(self.place(name, kind)),
            value: Box::new(value),
        })
    }

    fn update(&self, name: &str, kind: RefKind, op: &'static str, prefix: bool) -> Result<Expr, CompileError> {
        Ok(Expr::Update {
            op,
            prefix,
            target: Box::new(self.place(name, kind)),
        })
    }
}

struct SvelteMarkup<'m, 'a> {
    model: &'m ComponentModel<'a>,
    rewrite: &'m SvelteRewrite,
}

impl SvelteMarkup<'_, '_> {
    fn lower(&self, expr: &Expr) -> Result<Expr, CompileError> {
        self.model.lower_expr(self.rewrite, expr)
    }

    fn print(&self, expr: &Expr) -> Result<String, CompileError> {
        Ok(print_expr(&self.lower(expr)?, 0))
    }

    fn body(&mut self, out: &mut Printer, body: &[TemplateChild]) -> Result<(), CompileError> {
        out.indent();
        markup::render_children(self, out, body)?;
        out.dedent();
        Ok(())
    }
}

impl Dialect for SvelteMarkup<'_, '_> {
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
                format!("on:{event}={{{}}}", print_expr(&lowered, 0))
            }
        })
    }

    fn text(&self, text: &str) -> String {
        markup::escape_braces(text)
    }

    fn conditional(&mut self, out: &mut Printer, branches: &[Branch<'_>]) -> Result<(), CompileError> {
        for (i, (condition, body)) in branches.iter().enumerate() {
            match (i, condition) {
                (0, Some(c)) => out.line(format!("{{#if {}}}", self.print(c)?)),
                (_, Some(c)) => out.line(format!("{{:else if {}}}", self.print(c)?)),
                (_, None) => out.line("{:else}"),
            }
            self.body(out, body)?;
        }
        out.line("{/if}");
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
        let binding = match index {
            Some(index) => format!("{item}, {index}"),
            None => item.to_string(),
        };
        out.line(format!("{{#each {} as {binding}}}", self.print(iterable)?));
        self.body(out, body)?;
        out.line("{/each}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::reactive::analyze;

    fn svelte(src: &str) -> String {
        let program = parse(src, "src/Demo.mtm").unwrap();
        let graph = analyze(&program).unwrap();
        generate(&program, &graph).unwrap().code
    }

    #[test]
    fn test_store_component() {
        let code = svelte(
            "---\ntarget: svelte\nprops:\n  step: number\nstyles: [./demo.css]\n---\n$count! = 0\n$doubled! = $count * 2\n$inc = () => { $count += $step }\n\ntemplate(`\n  <button onclick={$inc}>{{$doubled}}</button>\n`)\n",
        );
        assert_eq!(
            code,
            "<script>\n\
             import { writable, derived } from 'svelte/store'\n\
             \n\
             export let step\n\
             const count = writable(0)\n\
             const doubled = derived([count], ([count]) => count * 2)\n\
             const inc = () => {\n\
             \x20 $count += step\n\
             }\n\
             </script>\n\
             \n\
             <button on:click={inc}>{$doubled}</button>\n\
             \n\
             <style>\n\
             \x20 @import './demo.css';\n\
             </style>\n"
        );
    }

    #[test]
    fn test_blocks_and_prop_writes() {
        let code = svelte(
            "---\ntarget: svelte\nprops:\n  title: string\n---\n$items! = []\n$total! = $items.length + $title.length\n$rename = () => { $title = 'x' }\n\ntemplate(`\n  {#if $items.length}{#each $items as item, i}<p onclick={$rename()}>{{i}}: {{item}}</p>{/each}{:else if $title}<p>{ }</p>{:else}<p>none</p>{/if}\n`)\n",
        );
        assert!(code.contains("const total = writable($items.length + title.length)\n$: $total = $items.length + title.length"), "{code}");
        assert!(code.contains("title = 'x'"), "{code}");
        assert!(code.contains("{#if $items.length}\n  {#each $items as item, i}\n"), "{code}");
        assert!(code.contains("<p on:click={() => rename()}>{i}: {item}</p>"), "{code}");
        assert!(code.contains("{:else if title}\n  <p>&#123; &#125;</p>\n{:else}\n  <p>none</p>\n{/if}"), "{code}");
    }
}
