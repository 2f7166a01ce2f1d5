//! Abstract syntax tree for `.mtm` files.
//!
//! The tree is closed: every construct the parser accepts has a variant here,
//! and passes over it go through [`visit::Visitor`] or [`visit::Fold`] rather
//! than probing node shapes at runtime. A [`Program`] is immutable once the
//! parser returns it; later stages share it behind an `Arc`.
//!
//! Parentheses from the source are kept as [`Expr::Paren`] so that printing
//! an expression never needs precedence information.

pub mod visit;

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::config::Target;
use crate::error::Warning;
use crate::frontmatter::Frontmatter;
use crate::location::Location;
pub use crate::syntax::SyntaxVersion;

/// Root of a parsed file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub path: String,
    pub syntax_version: SyntaxVersion,
    pub frontmatter: Option<Frontmatter>,
    pub body: Vec<Statement>,
    /// Non-fatal findings from parsing.
    pub warnings: Vec<Warning>,
}

impl Program {
    pub fn target(&self) -> Option<Target> {
        self.frontmatter.as_ref().map(|fm| fm.target)
    }

    pub fn imports(&self) -> impl Iterator<Item = &ImportDeclaration> {
        self.body.iter().filter_map(|s| match s {
            Statement::Import(i) => Some(i),
            _ => None,
        })
    }

    pub fn variables(&self) -> impl Iterator<Item = &VariableDeclaration> {
        self.body.iter().filter_map(|s| match s {
            Statement::Variable(v) => Some(v),
            _ => None,
        })
    }

    /// Reactive (`!`) declarations in source order.
    pub fn reactive_variables(&self) -> impl Iterator<Item = &VariableDeclaration> {
        self.variables().filter(|v| v.is_reactive)
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDeclaration> {
        self.body.iter().filter_map(|s| match s {
            Statement::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn template(&self) -> Option<&TemplateNode> {
        self.body.iter().find_map(|s| match s {
            Statement::Template(t) => Some(t),
            _ => None,
        })
    }

    pub fn variable(&self, name: &str) -> Option<&VariableDeclaration> {
        self.variables().find(|v| v.name == name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDeclaration> {
        self.functions().find(|f| f.name == name)
    }

    pub fn is_prop(&self, name: &str) -> bool {
        self.frontmatter.as_ref().is_some_and(|fm| fm.has_prop(name))
    }
}

/// A top-level statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Statement {
    Import(ImportDeclaration),
    Variable(VariableDeclaration),
    Function(FunctionDeclaration),
    Template(TemplateNode),
}

/// An `import` statement, kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportDeclaration {
    /// Source text without a trailing `;`.
    pub raw: String,
    /// The module specifier.
    pub source: String,
    pub loc: Location,
}

/// `$name[!][: Type] = init` or `const name = signal(init)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableDeclaration {
    pub name: String,
    pub has_dollar_prefix: bool,
    pub is_reactive: bool,
    pub type_annotation: Option<String>,
    pub inferred_type: InferredType,
    pub init: Expr,
    /// Reactive variables referenced by `init`.
    pub dependencies: BTreeSet<String>,
    pub loc: Location,
}

/// Shape of an initializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InferredType {
    Number,
    Float,
    String,
    Boolean,
    Array,
    Object,
    Expression,
}

impl InferredType {
    pub fn as_str(self) -> &'static str {
        match self {
            InferredType::Number => "number",
            InferredType::Float => "float",
            InferredType::String => "string",
            InferredType::Boolean => "boolean",
            InferredType::Array => "array",
            InferredType::Object => "object",
            InferredType::Expression => "expression",
        }
    }
}

impl fmt::Display for InferredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub params: Vec<Param>,
    /// True iff the body contains an `await` outside nested functions.
    pub is_async: bool,
    /// Written with the `async` keyword.
    pub declared_async: bool,
    /// Declared as `$name = () => ...` rather than `function name() {}`.
    pub is_arrow: bool,
    pub body: FunctionBody,
    pub loc: Location,
}

/// A parameter: `name`, `name = default` or `...name`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
    pub rest: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FunctionBody {
    Expr(Box<Expr>),
    Block(Vec<Stmt>),
}

/// A statement inside a function body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Stmt {
    Expr(Expr),
    VarDecl {
        kind: VarKind,
        name: String,
        init: Option<Expr>,
    },
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    Block(Vec<Stmt>),
    Return(Option<Expr>),
    ForOf {
        kind: VarKind,
        binding: String,
        iterable: Expr,
        body: Box<Stmt>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VarKind {
    Const,
    Let,
    Var,
}

impl VarKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VarKind::Const => "const",
            VarKind::Let => "let",
            VarKind::Var => "var",
        }
    }
}

/// An expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    /// Numeric literal as written.
    Number(String),
    /// String literal; `value` is the raw text between the quotes.
    String { value: String, quote: char },
    /// Template literal with raw quasis; `quasis.len() == exprs.len() + 1`.
    Template { quasis: Vec<String>, exprs: Vec<Expr> },
    Bool(bool),
    Null,
    Undefined,
    Ident(String),
    /// `$name`.
    Ref(String),
    Array(Vec<Expr>),
    Object(Vec<Property>),
    Spread(Box<Expr>),
    Unary {
        op: &'static str,
        arg: Box<Expr>,
    },
    Update {
        op: &'static str,
        prefix: bool,
        target: Box<Expr>,
    },
    Binary {
        op: &'static str,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assign {
        op: &'static str,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        optional: bool,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        property: String,
        optional: bool,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        optional: bool,
    },
    Arrow {
        is_async: bool,
        params: Vec<Param>,
        body: Box<FunctionBody>,
    },
    Await(Box<Expr>),
    Paren(Box<Expr>),
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Box::new(callee),
            args,
            optional: false,
        }
    }

    pub fn member(object: Expr, property: impl Into<String>) -> Self {
        Expr::Member {
            object: Box::new(object),
            property: property.into(),
            optional: false,
        }
    }

    pub fn paren(inner: Expr) -> Self {
        match inner {
            Expr::Paren(_) => inner,
            other => Expr::Paren(Box::new(other)),
        }
    }

    pub fn arrow(params: Vec<Param>, body: Expr) -> Self {
        Expr::Arrow {
            is_async: false,
            params,
            body: Box::new(FunctionBody::Expr(Box::new(body))),
        }
    }

    /// Strip any number of enclosing parentheses.
    pub fn unparen(&self) -> &Expr {
        let mut expr = self;
        while let Expr::Paren(inner) = expr {
            expr = inner;
        }
        expr
    }

    /// True for calls and assignments, which need wrapping to be used as an
    /// event handler.
    pub fn is_effect(&self) -> bool {
        matches!(
            self.unparen(),
            Expr::Call { .. } | Expr::Assign { .. } | Expr::Update { .. } | Expr::Await(_)
        )
    }
}

impl Param {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            rest: false,
        }
    }
}

/// An object literal member.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Property {
    KeyValue { key: PropertyKey, value: Expr },
    Shorthand(String),
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PropertyKey {
    Ident(String),
    String { value: String, quote: char },
    Number(String),
    Computed(Box<Expr>),
}

/// The `template(`...`)` block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateNode {
    /// Template text as written.
    pub raw: String,
    pub children: Vec<TemplateChild>,
    pub loc: Location,
}

impl TemplateNode {
    /// Every `{{expr}}` interpolation, in document order.
    pub fn bindings(&self) -> Vec<&Expr> {
        let mut out = Vec::new();
        collect_bindings(&self.children, &mut out);
        out
    }

    /// Every event binding as `(event, handler)`, in document order.
    pub fn events(&self) -> Vec<(&str, &Expr)> {
        let mut out = Vec::new();
        collect_events(&self.children, &mut out);
        out
    }
}

fn collect_bindings<'a>(children: &'a [TemplateChild], out: &mut Vec<&'a Expr>) {
    for child in children {
        match child {
            TemplateChild::Interpolation(expr) => out.push(expr),
            TemplateChild::Element { children, .. } => collect_bindings(children, out),
            TemplateChild::Conditional {
                then_branch,
                else_branch,
                ..
            } => {
                collect_bindings(then_branch, out);
                if let Some(else_branch) = else_branch {
                    collect_bindings(else_branch, out);
                }
            }
            TemplateChild::Loop { body, .. } => collect_bindings(body, out),
            TemplateChild::Text(_) => {}
        }
    }
}

fn collect_events<'a>(children: &'a [TemplateChild], out: &mut Vec<(&'a str, &'a Expr)>) {
    for child in children {
        match child {
            TemplateChild::Element {
                attributes,
                children,
                ..
            } => {
                for attr in attributes {
                    if let Attribute::Event { event, handler } = attr {
                        out.push((event.as_str(), handler));
                    }
                }
                collect_events(children, out);
            }
            TemplateChild::Conditional {
                then_branch,
                else_branch,
                ..
            } => {
                collect_events(then_branch, out);
                if let Some(else_branch) = else_branch {
                    collect_events(else_branch, out);
                }
            }
            TemplateChild::Loop { body, .. } => collect_events(body, out),
            TemplateChild::Text(_) | TemplateChild::Interpolation(_) => {}
        }
    }
}

/// A node of the template tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TemplateChild {
    Element {
        tag: String,
        attributes: Vec<Attribute>,
        children: Vec<TemplateChild>,
        self_closing: bool,
    },
    Text(String),
    /// `{{expr}}`.
    Interpolation(Expr),
    /// `{#if}...{:else}...{/if}`; an `{:else if}` is an else branch holding a
    /// single nested conditional.
    Conditional {
        condition: Expr,
        then_branch: Vec<TemplateChild>,
        else_branch: Option<Vec<TemplateChild>>,
    },
    /// `{#each iterable as item, index}...{/each}`.
    Loop {
        iterable: Expr,
        item_name: String,
        index_name: Option<String>,
        body: Vec<TemplateChild>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Attribute {
    /// `name="value"` or a bare `name`.
    Static { name: String, value: Option<String> },
    /// `name={expr}`.
    Binding { name: String, expr: Expr },
    /// `onevent={handler}` or `onevent="handler"`; `event` is lower-case
    /// without the `on` prefix.
    Event { event: String, handler: Expr },
}
