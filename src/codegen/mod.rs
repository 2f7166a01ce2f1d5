//! Code generation.
//!
//! Every backend consumes the same parsed [`Program`] and [`ReactiveGraph`];
//! [`generate`] dispatches through [`BACKENDS`] so that adding a framework is
//! one table entry.

pub mod markup;
pub mod model;
pub mod printer;

mod react;
mod solid;
mod svelte;
mod vue;

use serde::Serialize;

use crate::ast::Program;
use crate::config::Target;
use crate::error::{CompileError, Warning};
use crate::reactive::ReactiveGraph;

pub use model::{BindingKind, ReactiveBinding};

/// The output of one backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedCode {
    pub target: Target,
    pub code: String,
    /// Runtime packages the code imports; the framework package is first.
    pub dependencies: Vec<String>,
    pub exports: Vec<String>,
    /// Identical for every target compiled from the same program.
    pub bindings: Vec<ReactiveBinding>,
    /// Target-specific findings, such as updates the target cannot see.
    pub warnings: Vec<Warning>,
}

pub type Backend = fn(&Program, &ReactiveGraph) -> Result<GeneratedCode, CompileError>;

pub const BACKENDS: &[(Target, Backend)] = &[
    (Target::React, react::generate),
    (Target::Vue, vue::generate),
    (Target::Svelte, svelte::generate),
    (Target::Solid, solid::generate),
];

pub fn backend(target: Target) -> Option<Backend> {
    BACKENDS.iter().find(|(t, _)| *t == target).map(|(_, b)| *b)
}

/// Generate `target` code for `ast`.
pub fn generate(ast: &Program, graph: &ReactiveGraph, target: Target) -> Result<GeneratedCode, CompileError> {
    let _span = tracing::info_span!("compile.generate", file = %ast.path, target = %target).entered();
    let backend = backend(target).ok_or_else(|| {
        CompileError::framework(&ast.path, target, format!("no code generator registered for {target}"))
    })?;
    let generated = backend(ast, graph)?;
    tracing::debug!(bytes = generated.code.len(), "generated");
    Ok(generated)
}

/// Generate every target in `targets`. One target failing leaves the others
/// untouched.
pub fn generate_all(
    ast: &Program,
    graph: &ReactiveGraph,
    targets: &[Target],
) -> Vec<(Target, Result<GeneratedCode, CompileError>)> {
    targets
        .iter()
        .map(|&target| (target, generate(ast, graph, target)))
        .collect()
}

fn output(model: &model::ComponentModel<'_>, target: Target, framework: &str, code: String) -> GeneratedCode {
    GeneratedCode {
        target,
        code,
        dependencies: model.package_dependencies(framework),
        exports: vec!["default".to_string()],
        bindings: model.bindings.clone(),
        warnings: Vec::new(),
    }
}

/// Emit user imports verbatim.
fn write_imports(out: &mut printer::Printer, model: &model::ComponentModel<'_>) {
    for import in &model.imports {
        out.line(import.raw.trim().trim_end_matches(';'));
    }
}

/// `const emit = (detail) => window.dispatchEvent(...)` for each channel.
fn write_channels(out: &mut printer::Printer, model: &model::ComponentModel<'_>) {
    for channel in &model.channels {
        out.line(format!(
            "const {} = (detail) => window.dispatchEvent(new CustomEvent('{}', {{ detail }}))",
            channel.emit, channel.event
        ));
    }
}

/// The JSX event prop for a lowercased DOM event, as React spells it.
fn react_event_name(event: &str) -> String {
    let known = match event {
        "click" => "onClick",
        "dblclick" => "onDoubleClick",
        "contextmenu" => "onContextMenu",
        "mousedown" => "onMouseDown",
        "mouseup" => "onMouseUp",
        "mousemove" => "onMouseMove",
        "mouseenter" => "onMouseEnter",
        "mouseleave" => "onMouseLeave",
        "mouseover" => "onMouseOver",
        "mouseout" => "onMouseOut",
        "keydown" => "onKeyDown",
        "keyup" => "onKeyUp",
        "keypress" => "onKeyPress",
        "focusin" => "onFocusIn",
        "focusout" => "onFocusOut",
        "touchstart" => "onTouchStart",
        "touchend" => "onTouchEnd",
        "touchmove" => "onTouchMove",
        "pointerdown" => "onPointerDown",
        "pointerup" => "onPointerUp",
        "pointermove" => "onPointerMove",
        "dragstart" => "onDragStart",
        "dragend" => "onDragEnd",
        "dragover" => "onDragOver",
        _ => return format!("on{}", crate::helpers::capitalize(event)),
    };
    known.to_string()
}

/// `() => handler` unless the handler already is a function value.
fn event_handler(original: &crate::ast::Expr, lowered: crate::ast::Expr) -> crate::ast::Expr {
    if original.is_effect() {
        crate::ast::Expr::arrow(Vec::new(), lowered)
    } else {
        lowered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::error::WarningKind;
    use crate::reactive::analyze;

    const COUNTER: &str = "---\ntarget: reactjs\n---\n$counter! = 0\n$inc = () => $counter++\n\ntemplate(`\n  <button onclick={$inc}>Count: {{$counter}}</button>\n`)\n";

    fn compile(src: &str, target: Target) -> Result<GeneratedCode, CompileError> {
        let program = parse(src, "src/Counter.mtm").unwrap();
        let graph = analyze(&program).unwrap();
        generate(&program, &graph, target)
    }

    #[test]
    fn test_counter_in_every_framework() {
        let react = compile(COUNTER, Target::React).unwrap().code;
        assert!(react.contains("useState(0)"), "{react}");
        assert!(react.contains("onClick={inc}"), "{react}");
        assert!(react.contains("setCounter((counter) => counter + 1)"), "{react}");

        let vue = compile(COUNTER, Target::Vue).unwrap().code;
        assert!(vue.contains("ref(0)"), "{vue}");
        assert!(vue.contains("@click=\"inc\""), "{vue}");
        assert!(vue.contains("counter.value++"), "{vue}");

        let svelte = compile(COUNTER, Target::Svelte).unwrap().code;
        assert!(svelte.contains("writable(0)"), "{svelte}");
        assert!(svelte.contains("on:click={inc}"), "{svelte}");
        assert!(svelte.contains("$counter++"), "{svelte}");

        let solid = compile(COUNTER, Target::Solid).unwrap().code;
        assert!(solid.contains("createSignal(0)"), "{solid}");
        assert!(solid.contains("onClick={inc}"), "{solid}");
        assert!(solid.contains("setCounter(counter() + 1)"), "{solid}");
    }

    #[test]
    fn test_generation_is_deterministic() {
        for target in Target::ALL {
            assert_eq!(compile(COUNTER, target).unwrap(), compile(COUNTER, target).unwrap());
        }
    }

    #[test]
    fn test_bindings_match_across_targets() {
        let src = "$a! = 1\n$b! = $a * 2\n$c! = $a + 1\n$reset = () => { $c = 0 }\n";
        let program = parse(src, "src/Thing.mtm").unwrap();
        let graph = analyze(&program).unwrap();
        let all = generate_all(&program, &graph, &Target::ALL);
        let first = all[0].1.as_ref().unwrap().bindings.clone();
        assert_eq!(first.len(), 3);
        assert_eq!(first[1].kind, BindingKind::Derived);
        assert_eq!(first[2].kind, BindingKind::WritableDerived);
        for (_, result) in &all {
            assert_eq!(result.as_ref().unwrap().bindings, first);
        }
    }

    #[test]
    fn test_framework_error_is_scoped_to_target() {
        let src = "---\ntarget: reactjs\nprops:\n  title: string\n---\n$rename = () => { $title = 'x' }\n";
        let program = parse(src, "src/Title.mtm").unwrap();
        let graph = analyze(&program).unwrap();
        let results = generate_all(&program, &graph, &Target::ALL);
        for (target, result) in results {
            match target {
                Target::Svelte => assert!(result.is_ok()),
                _ => {
                    let err = result.unwrap_err();
                    assert!(matches!(err.kind, crate::error::ErrorKind::Framework { .. }));
                    assert!(err.message.contains("read-only"));
                }
            }
        }
    }

    #[test]
    fn test_dependencies_and_exports() {
        let src = "import dayjs from 'dayjs'\n$now! = dayjs()\n";
        let program = parse(src, "src/Clock.mtm").unwrap();
        let graph = analyze(&program).unwrap();
        let out = generate(&program, &graph, Target::Solid).unwrap();
        assert_eq!(out.dependencies, vec!["solid-js", "dayjs"]);
        assert_eq!(out.exports, vec!["default"]);
        assert!(out.code.contains("import dayjs from 'dayjs'\n"));
    }

    #[test]
    fn test_in_place_method_call_warns_where_untracked() {
        let src = "$list! = []\n$add = () => { $list.push(1) }\n";
        for target in Target::ALL {
            let out = compile(src, target).unwrap();
            match target {
                Target::React | Target::Solid => {
                    assert_eq!(out.warnings.len(), 1);
                    let warning = &out.warnings[0];
                    assert_eq!(warning.kind.code(), "in-place-mutation");
                    assert!(matches!(
                        &warning.kind,
                        WarningKind::InPlaceMutation { name, method, target: t }
                            if name == "list" && method == "push" && *t == target
                    ));
                }
                Target::Vue | Target::Svelte => assert!(out.warnings.is_empty()),
            }
        }
    }

    #[test]
    fn test_method_calls_on_plain_values_do_not_warn() {
        let src = "$n! = 1\n$m! = $n.toFixed(2)\n$show = () => $n.toString()\n";
        assert!(compile(src, Target::React).unwrap().warnings.is_empty());
    }

    #[test]
    fn test_react_event_names() {
        assert_eq!(react_event_name("dblclick"), "onDoubleClick");
        assert_eq!(react_event_name("submit"), "onSubmit");
    }
}
