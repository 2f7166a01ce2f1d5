//! Initializer type inference and annotation checks.

use crate::ast::{Expr, InferredType, VariableDeclaration};
use crate::error::CompileError;

/// The shape of an initializer expression.
pub fn infer(expr: &Expr) -> InferredType {
    match expr {
        Expr::Number(raw) => number_type(raw),
        Expr::String { .. } | Expr::Template { .. } => InferredType::String,
        Expr::Bool(_) => InferredType::Boolean,
        Expr::Array(_) => InferredType::Array,
        Expr::Object(_) => InferredType::Object,
        Expr::Paren(inner) => infer(inner),
        Expr::Unary { op: "-" | "+", arg } => match infer(arg) {
            t @ (InferredType::Number | InferredType::Float) => t,
            _ => InferredType::Expression,
        },
        _ => InferredType::Expression,
    }
}

fn number_type(raw: &str) -> InferredType {
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("0x") || lower.starts_with("0o") || lower.starts_with("0b") || lower.ends_with('n') {
        return InferredType::Number;
    }
    if lower.contains('.') || lower.contains('e') {
        InferredType::Float
    } else {
        InferredType::Number
    }
}

/// Map a written annotation onto an inferred type, if it is one we check.
pub fn annotation_type(annotation: &str) -> Option<InferredType> {
    let annotation = annotation.trim();
    match annotation {
        "number" | "int" | "integer" => return Some(InferredType::Number),
        "float" | "double" => return Some(InferredType::Float),
        "string" => return Some(InferredType::String),
        "boolean" | "bool" => return Some(InferredType::Boolean),
        "array" | "Array" => return Some(InferredType::Array),
        "object" | "Object" => return Some(InferredType::Object),
        _ => {}
    }
    if annotation.ends_with("[]") || annotation.starts_with("Array<") {
        return Some(InferredType::Array);
    }
    if annotation.starts_with("Record<") || annotation.starts_with('{') {
        return Some(InferredType::Object);
    }
    None
}

/// Reject a declaration whose literal initializer contradicts its annotation.
///
/// Only literal initializers are checked; an initializer computed from other
/// values, or an annotation naming a type outside the known set, passes.
pub fn check(decl: &VariableDeclaration, file: &str) -> Result<(), CompileError> {
    let Some(annotation) = decl.type_annotation.as_deref() else {
        return Ok(());
    };
    if decl.inferred_type == InferredType::Expression {
        return Ok(());
    }
    let Some(declared) = annotation_type(annotation) else {
        return Ok(());
    };
    if declared == decl.inferred_type {
        return Ok(());
    }
    Err(CompileError::type_conflict(file, &decl.name, annotation, decl.inferred_type.as_str())
        .at(decl.loc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;

    fn infer_src(src: &str) -> InferredType {
        infer(&parse_expression(src, "t.mtm").unwrap())
    }

    #[test]
    fn test_infer() {
        assert_eq!(infer_src("42"), InferredType::Number);
        assert_eq!(infer_src("0xff"), InferredType::Number);
        assert_eq!(infer_src("1.5"), InferredType::Float);
        assert_eq!(infer_src("1e3"), InferredType::Float);
        assert_eq!(infer_src("-(2.5)"), InferredType::Float);
        assert_eq!(infer_src("'hi'"), InferredType::String);
        assert_eq!(infer_src("`hi ${x}`"), InferredType::String);
        assert_eq!(infer_src("false"), InferredType::Boolean);
        assert_eq!(infer_src("[1, 2]"), InferredType::Array);
        assert_eq!(infer_src("{ a: 1 }"), InferredType::Object);
        assert_eq!(infer_src("$a * 2"), InferredType::Expression);
        assert_eq!(infer_src("-$a"), InferredType::Expression);
    }

    #[test]
    fn test_annotation_type() {
        assert_eq!(annotation_type("number"), Some(InferredType::Number));
        assert_eq!(annotation_type(" string[] "), Some(InferredType::Array));
        assert_eq!(annotation_type("Array<number>"), Some(InferredType::Array));
        assert_eq!(annotation_type("Record<string, number>"), Some(InferredType::Object));
        assert_eq!(annotation_type("{ id: number }"), Some(InferredType::Object));
        assert_eq!(annotation_type("User"), None);
    }
}
