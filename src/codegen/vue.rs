//! Vue single-file components using `<script setup>`.
//!
//! Script code reads refs through `.value` and props through `props.`;
//! template expressions use bare names since Vue unwraps refs there.

use crate::ast::{Attribute, Expr, Program, TemplateChild};
use crate::config::Target;
use crate::error::CompileError;
use crate::reactive::ReactiveGraph;

use super::GeneratedCode;
use super::markup::{self, Branch, Dialect};
use super::model::{BindingKind, ComponentModel, Member, RefKind, Rewrite};
use super::printer::{Printer, escape_attribute, print_expr};

pub fn generate(program: &Program, graph: &ReactiveGraph) -> Result<GeneratedCode, CompileError> {
    let model = ComponentModel::new(program, graph);
    let script = VueRewrite { model: &model, in_template: false };
    let mut out = Printer::new();

    out.line("<script setup>");
    let mut api = Vec::new();
    if model.has_kind(BindingKind::State) || model.has_kind(BindingKind::WritableDerived) {
        api.push("ref");
    }
    if model.has_kind(BindingKind::Derived) {
        api.push("computed");
    }
    if model.has_kind(BindingKind::WritableDerived) {
        api.push("watch");
    }
    if !api.is_empty() {
        out.line(format!("import {{ {} }} from 'vue'", api.join(", ")));
    }
    super::write_imports(&mut out, &model);
    out.blank();

    if !model.props.is_empty() {
        out.line("const props = defineProps({");
        out.indent();
        for (name, ty) in &model.props {
            out.line(format!("{name}: {},", prop_constructor(ty)));
        }
        out.dedent();
        out.line("})");
    }
    super::write_channels(&mut out, &model);
    for member in &model.members {
        write_member(&mut out, &model, &script, member)?;
    }
    out.line("</script>");

    if let Some(template) = model.template {
        out.blank();
        out.line("<template>");
        out.indent();
        let mut dialect = VueTemplate {
            model: &model,
            rewrite: VueRewrite { model: &model, in_template: true },
        };
        markup::render_children(&mut dialect, &mut out, &template.children)?;
        out.dedent();
        out.line("</template>");
    }

    if !model.styles.is_empty() {
        out.blank();
        for style in &model.styles {
            out.line(format!("<style src=\"{}\"></style>", escape_attribute(style)));
        }
    }

    Ok(super::output(&model, Target::Vue, "vue", out.finish()))
}

/// Runtime prop type for a frontmatter type name.
fn prop_constructor(ty: &str) -> &'static str {
    match ty.trim().to_ascii_lowercase().as_str() {
        "string" => "String",
        "number" | "int" | "float" => "Number",
        "boolean" | "bool" => "Boolean",
        "object" => "Object",
        "function" => "Function",
        "date" => "Date",
        t if t == "array" || t.ends_with("[]") => "Array",
        _ => "null",
    }
}

fn write_member(
    out: &mut Printer,
    model: &ComponentModel<'_>,
    rewrite: &VueRewrite<'_, '_>,
    member: &Member<'_>,
) -> Result<(), CompileError> {
    match member {
        Member::Reactive(decl, kind) => {
            let init = out.expr(&model.lower_expr(rewrite, &decl.init)?);
            match kind {
                BindingKind::State => out.line(format!("const {} = ref({init})", decl.name)),
                BindingKind::Derived => {
                    out.line(format!("const {} = computed(() => {init})", decl.name));
                }
                BindingKind::WritableDerived => {
                    let mut sources: Vec<String> = decl.dependencies.iter().cloned().collect();
                    sources.extend(model.props_in(&decl.init).into_iter().map(|p| format!("() => props.{p}")));
                    out.line(format!("const {} = ref({init})", decl.name));
                    out.line(format!("watch([{}], () => {{", sources.join(", ")));
                    out.indent();
                    out.line(format!("{}.value = {init}", decl.name));
                    out.dedent();
                    out.line("})");
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

struct VueRewrite<'m, 'a> {
    model: &'m ComponentModel<'a>,
    in_template: bool,
}

impl VueRewrite<'_, '_> {
    fn place(&self, name: &str, kind: RefKind) -> Expr {
        match kind {
            RefKind::Reactive(_) if !self.in_template => Expr::member(Expr::ident(name), "value"),
            RefKind::Prop if !self.in_template => Expr::member(Expr::ident("props"), name),
            _ => Expr::ident(name),
        }
    }
}

impl Rewrite for VueRewrite<'_, '_> {
    fn read(&self, name: &str, kind: RefKind) -> Expr {
        self.place(name, kind)
    }

    fn assign(&self, name: &str, kind: RefKind, op: &'static str, value: Expr) -> Result<Expr, CompileError> {
        if kind == RefKind::Prop {
            return Err(self.model.prop_write_error(Target::Vue, name));
        }
        Ok(Expr::Assign {
            op,
            target: Box::new(self.place(name, kind)),
            value: Box::new(value),
        })
    }

    fn update(&self, name: &str, kind: RefKind, op: &'static str, prefix: bool) -> Result<Expr, CompileError> {
        if kind == RefKind::Prop {
            return Err(self.model.prop_write_error(Target::Vue, name));
        }
        Ok(Expr::Update {
            op,
            prefix,
            target: Box::new(self.place(name, kind)),
        })
    }

    fn member_write(&self, root: &str, kind: RefKind) -> Result<(), CompileError> {
        match kind {
            RefKind::Prop => Err(self.model.prop_write_error(Target::Vue, root)),
            _ => Ok(()),
        }
    }
}

struct VueTemplate<'m, 'a> {
    model: &'m ComponentModel<'a>,
    rewrite: VueRewrite<'m, 'a>,
}

impl VueTemplate<'_, '_> {
    /// A lowered expression ready for a double-quoted attribute.
    fn quoted(&self, expr: &Expr) -> Result<String, CompileError> {
        let lowered = self.model.lower_expr(&self.rewrite, expr)?;
        Ok(escape_attribute(&print_expr(&lowered, 0)))
    }

    fn block(&mut self, out: &mut Printer, open: String, body: &[TemplateChild]) -> Result<(), CompileError> {
        out.line(open);
        out.indent();
        markup::render_children(self, out, body)?;
        out.dedent();
        out.line("</template>");
        Ok(())
    }
}

impl Dialect for VueTemplate<'_, '_> {
    fn interpolation(&mut self, expr: &Expr) -> Result<String, CompileError> {
        let lowered = self.model.lower_expr(&self.rewrite, expr)?;
        Ok(format!("{{{{ {} }}}}", print_expr(&lowered, 0)))
    }

    fn attribute(&mut self, _tag: &str, attr: &Attribute) -> Result<String, CompileError> {
        Ok(match attr {
            Attribute::Static { name, value: Some(value) } => {
                format!("{name}=\"{}\"", escape_attribute(value))
            }
            Attribute::Static { name, value: None } => name.clone(),
            Attribute::Binding { name, expr } => format!(":{name}=\"{}\"", self.quoted(expr)?),
            Attribute::Event { event, handler } => format!("@{event}=\"{}\"", self.quoted(handler)?),
        })
    }

    fn text(&self, text: &str) -> String {
        markup::escape_braces(text)
    }

    fn conditional(&mut self, out: &mut Printer, branches: &[Branch<'_>]) -> Result<(), CompileError> {
        for (i, (condition, body)) in branches.iter().enumerate() {
            let open = match (i, condition) {
                (0, Some(c)) => format!("<template v-if=\"{}\">", self.quoted(c)?),
                (_, Some(c)) => format!("<template v-else-if=\"{}\">", self.quoted(c)?),
                (_, None) => "<template v-else>".to_string(),
            };
            self.block(out, open, body)?;
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
        let open = format!(
            "<template v-for=\"({item}, {index}) in {}\" :key=\"{index}\">",
            self.quoted(iterable)?
        );
        self.block(out, open, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::reactive::analyze;

    fn vue(src: &str) -> Result<String, CompileError> {
        let program = parse(src, "src/Demo.mtm").unwrap();
        let graph = analyze(&program).unwrap();
        generate(&program, &graph).map(|g| g.code)
    }

    #[test]
    fn test_single_file_component() {
        let code = vue(
            "---\ntarget: vue\nprops:\n  label: string\nstyles: [./demo.css]\n---\n$count! = 0\n$doubled! = $count * 2\n$inc = () => { $count += 1 }\n\ntemplate(`\n  <button title={$label} onclick={$inc}>{{$doubled}}</button>\n`)\n",
        )
        .unwrap();
        assert_eq!(
            code,
            "<script setup>\n\
             import { ref, computed } from 'vue'\n\
             \n\
             const props = defineProps({\n\
             \x20 label: String,\n\
             })\n\
             const count = ref(0)\n\
             const doubled = computed(() => count.value * 2)\n\
             const inc = () => {\n\
             \x20 count.value += 1\n\
             }\n\
             </script>\n\
             \n\
             <template>\n\
             \x20 <button :title=\"label\" @click=\"inc\">{{ doubled }}</button>\n\
             </template>\n\
             \n\
             <style src=\"./demo.css\"></style>\n"
        );
    }

    #[test]
    fn test_template_blocks() {
        let code = vue(
            "$todos! = []\n\ntemplate(`\n  {#if $todos.length}<ul>{#each $todos as todo}<li onclick={$todos = []}>{{todo.title}}</li>{/each}</ul>{:else}<p>none {x}</p>{/if}\n`)\n",
        )
        .unwrap();
        assert!(code.contains("<template v-if=\"todos.length\">"), "{code}");
        assert!(code.contains("<template v-for=\"(todo, index) in todos\" :key=\"index\">"), "{code}");
        assert!(code.contains("@click=\"todos = []\""), "{code}");
        assert!(code.contains("<template v-else>"), "{code}");
        assert!(code.contains("<p>none &#123;x&#125;</p>"), "{code}");
    }

    #[test]
    fn test_writable_derived_uses_watch() {
        let code = vue(
            "---\ntarget: vue\nprops:\n  start: number\n---\n$base! = 1\n$value! = $base + $start\n$reset = () => { $value = 0 }\n",
        )
        .unwrap();
        assert!(code.contains("import { ref, watch } from 'vue'"), "{code}");
        assert!(code.contains("const value = ref(base.value + props.start)"), "{code}");
        assert!(code.contains("watch([base, () => props.start], () => {\n  value.value = base.value + props.start\n})"), "{code}");
        assert!(code.contains("value.value = 0"), "{code}");
    }

    #[test]
    fn test_prop_constructor() {
        assert_eq!(prop_constructor("string"), "String");
        assert_eq!(prop_constructor("Todo[]"), "Array");
        assert_eq!(prop_constructor("Todo"), "null");
    }
}
