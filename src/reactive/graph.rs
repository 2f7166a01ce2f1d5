//! The reactive dependency graph.
//!
//! Nodes are the `!` declarations of a program; an edge runs from each
//! dependency to the variable derived from it. Plain declarations and props
//! are not part of the graph. The graph is built fresh for every analysis
//! and never changes afterwards. Only direct edges are stored; update
//! chains are walked from them on demand.

use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};

use crate::ast::visit::{self, Visitor};
use crate::ast::{Attribute, Expr, InferredType, Program, TemplateChild};
use crate::error::CompileError;

/// Site name used for writes made directly by template event handlers.
pub const TEMPLATE_SITE: &str = "template";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReactiveVariable {
    pub name: String,
    pub is_reactive: bool,
    pub inferred_type: InferredType,
    /// Reactive variables this one is derived from.
    pub dependencies: BTreeSet<String>,
    /// Variables derived directly from this one, in declaration order.
    pub update_triggers: Vec<String>,
    /// Functions (or [`TEMPLATE_SITE`]) that write to this variable.
    pub mutated_by: Vec<String>,
}

impl ReactiveVariable {
    /// Derived from other reactive variables.
    pub fn is_derived(&self) -> bool {
        !self.dependencies.is_empty()
    }

    /// Written to somewhere in the file.
    pub fn is_mutated(&self) -> bool {
        !self.mutated_by.is_empty()
    }
}

/// Everything that must recompute when `trigger` changes. Built on demand
/// by [`ReactiveGraph::chain`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateChain {
    pub trigger: String,
    /// Transitive dependents of the trigger, in topological order.
    pub affected: Vec<String>,
    /// Writes to the trigger happen alongside writes to a sibling that
    /// reaches one of the same dependents.
    pub batchable: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReactiveGraph {
    /// Nodes in declaration order.
    pub variables: Vec<ReactiveVariable>,
    /// Every variable after all of its dependencies.
    pub order: Vec<String>,
    #[serde(skip)]
    index: AHashMap<String, usize>,
    /// Direct dependents of each node, as declaration indices.
    #[serde(skip)]
    dependents: Vec<Vec<usize>>,
    /// Position of each node in `order`.
    #[serde(skip)]
    ranks: Vec<usize>,
    #[serde(skip)]
    batchable: Vec<bool>,
}

impl PartialEq for ReactiveGraph {
    fn eq(&self, other: &Self) -> bool {
        self.variables == other.variables && self.order == other.order && self.batchable == other.batchable
    }
}

impl ReactiveGraph {
    pub fn variable(&self, name: &str) -> Option<&ReactiveVariable> {
        self.index.get(name).map(|&i| &self.variables[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn chain(&self, name: &str) -> Option<UpdateChain> {
        self.index.get(name).map(|&i| self.chain_at(i))
    }

    /// One chain per variable, in declaration order.
    pub fn update_chains(&self) -> impl Iterator<Item = UpdateChain> + '_ {
        (0..self.variables.len()).map(|i| self.chain_at(i))
    }

    /// Transitive dependents of `name` in topological order; empty for
    /// unknown names.
    pub fn affected(&self, name: &str) -> Vec<&str> {
        match self.index.get(name) {
            Some(&i) => self
                .affected_at(i)
                .into_iter()
                .map(|j| self.variables[j].name.as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn is_batchable(&self, name: &str) -> bool {
        self.index.get(name).is_some_and(|&i| self.batchable[i])
    }

    pub fn dependencies(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.variable(name).map(|v| &v.dependencies)
    }

    /// Position of `name` in the topological order.
    pub fn rank(&self, name: &str) -> Option<usize> {
        self.index.get(name).map(|&i| self.ranks[i])
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    fn affected_at(&self, i: usize) -> Vec<usize> {
        let mut reached = downstream(&self.dependents, i);
        reached.sort_unstable_by_key(|&j| self.ranks[j]);
        reached
    }

    fn chain_at(&self, i: usize) -> UpdateChain {
        UpdateChain {
            trigger: self.variables[i].name.clone(),
            affected: self
                .affected_at(i)
                .into_iter()
                .map(|j| self.variables[j].name.clone())
                .collect(),
            batchable: self.batchable[i],
        }
    }
}

/// Build the reactive graph of `program`, failing on any dependency cycle.
pub fn analyze(program: &Program) -> Result<ReactiveGraph, CompileError> {
    let _span = tracing::info_span!("compile.analyze", file = %program.path).entered();

    let decls: Vec<_> = program.reactive_variables().collect();
    let index: AHashMap<String, usize> = decls
        .iter()
        .enumerate()
        .map(|(i, v)| (v.name.clone(), i))
        .collect();

    // dependency -> dependents, both as declaration indices.
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); decls.len()];
    for (i, decl) in decls.iter().enumerate() {
        for dep in &decl.dependencies {
            if let Some(&d) = index.get(dep) {
                dependents[d].push(i);
            }
        }
    }

    if let Some(cycle) = find_cycle(&dependents) {
        let members: Vec<String> = cycle.iter().map(|&i| decls[i].name.clone()).collect();
        tracing::debug!(file = %program.path, members = ?members, "dependency cycle");
        return Err(CompileError::circular_dependency(&program.path, members).at(decls[cycle[0]].loc));
    }

    let order = topological_order(&dependents);
    let mut ranks = vec![0; decls.len()];
    for (r, &i) in order.iter().enumerate() {
        ranks[i] = r;
    }

    let sites = mutation_sites(program, &index);
    let batchable = batchable_flags(&dependents, &sites);
    let mut mutated_by: Vec<Vec<String>> = vec![Vec::new(); decls.len()];
    for (site, written) in &sites {
        for &i in written {
            if !mutated_by[i].contains(site) {
                mutated_by[i].push(site.clone());
            }
        }
    }

    let variables = decls
        .iter()
        .enumerate()
        .map(|(i, decl)| ReactiveVariable {
            name: decl.name.clone(),
            is_reactive: true,
            inferred_type: decl.inferred_type,
            dependencies: decl.dependencies.clone(),
            update_triggers: dependents[i].iter().map(|&j| decls[j].name.clone()).collect(),
            mutated_by: std::mem::take(&mut mutated_by[i]),
        })
        .collect();

    let graph = ReactiveGraph {
        variables,
        order: order.iter().map(|&i| decls[i].name.clone()).collect(),
        index,
        dependents,
        ranks,
        batchable,
    };
    tracing::debug!(file = %program.path, variables = graph.len(), "analyzed");
    Ok(graph)
}

/// Depth-first search along dependency edges, in declaration order. Returns
/// the nodes on the active path from the target of the first back-edge.
fn find_cycle(dependents: &[Vec<usize>]) -> Option<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Active,
        Done,
    }

    let mut marks = vec![Mark::New; dependents.len()];
    // The active path: each node with the index of its next edge.
    let mut stack: Vec<(usize, usize)> = Vec::new();
    for root in 0..dependents.len() {
        if marks[root] != Mark::New {
            continue;
        }
        marks[root] = Mark::Active;
        stack.push((root, 0));
        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let Some(&next) = dependents[node].get(frame.1) else {
                stack.pop();
                marks[node] = Mark::Done;
                continue;
            };
            frame.1 += 1;
            match marks[next] {
                Mark::Active => {
                    let start = stack.iter().position(|&(n, _)| n == next).unwrap_or(0);
                    return Some(stack[start..].iter().map(|&(n, _)| n).collect());
                }
                Mark::New => {
                    marks[next] = Mark::Active;
                    stack.push((next, 0));
                }
                Mark::Done => {}
            }
        }
    }
    None
}

/// Kahn's algorithm; among ready nodes the earliest declaration goes first.
fn topological_order(dependents: &[Vec<usize>]) -> Vec<usize> {
    let mut in_degree = vec![0usize; dependents.len()];
    for targets in dependents {
        for &t in targets {
            in_degree[t] += 1;
        }
    }
    let mut ready: BTreeSet<usize> = (0..dependents.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(dependents.len());
    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &t in &dependents[node] {
            in_degree[t] -= 1;
            if in_degree[t] == 0 {
                ready.insert(t);
            }
        }
    }
    order
}

/// Every node reachable from `start`, excluding `start`.
fn downstream(dependents: &[Vec<usize>], start: usize) -> Vec<usize> {
    let mut seen = vec![false; dependents.len()];
    seen[start] = true;
    let mut queue = VecDeque::from([start]);
    let mut out = Vec::new();
    while let Some(node) = queue.pop_front() {
        for &next in &dependents[node] {
            if !seen[next] {
                seen[next] = true;
                out.push(next);
                queue.push_back(next);
            }
        }
    }
    out
}

/// A variable is batchable when some site writes it together with a
/// sibling whose dependents overlap its own.
fn batchable_flags(dependents: &[Vec<usize>], sites: &[(String, Vec<usize>)]) -> Vec<bool> {
    let mut flags = vec![false; dependents.len()];
    let mut reach: AHashMap<usize, AHashSet<usize>> = AHashMap::new();
    for (_, written) in sites {
        if written.len() < 2 {
            continue;
        }
        for &w in written {
            reach
                .entry(w)
                .or_insert_with(|| downstream(dependents, w).into_iter().collect());
        }
        for &a in written {
            if flags[a] {
                continue;
            }
            let Some(mine) = reach.get(&a) else {
                continue;
            };
            flags[a] = written
                .iter()
                .filter(|&&b| b != a)
                .filter_map(|b| reach.get(b))
                .any(|theirs| !mine.is_disjoint(theirs));
        }
    }
    flags
}

/// Which reactive variables each function, and the template, writes to.
fn mutation_sites(program: &Program, index: &AHashMap<String, usize>) -> Vec<(String, Vec<usize>)> {
    let mut sites = Vec::new();
    for func in program.functions() {
        let mut finder = Writes::new(index);
        visit::walk_function(&mut finder, func);
        if !finder.written.is_empty() {
            sites.push((func.name.clone(), finder.written));
        }
    }
    if let Some(template) = program.template() {
        let mut finder = Writes::new(index);
        for child in &template.children {
            collect_handler_writes(child, &mut finder);
        }
        if !finder.written.is_empty() {
            sites.push((TEMPLATE_SITE.to_string(), finder.written));
        }
    }
    sites
}

fn collect_handler_writes(child: &TemplateChild, finder: &mut Writes<'_>) {
    match child {
        TemplateChild::Element {
            attributes,
            children,
            ..
        } => {
            for attr in attributes {
                if let Attribute::Event { handler, .. } = attr {
                    finder.visit_expr(handler);
                }
            }
            for c in children {
                collect_handler_writes(c, finder);
            }
        }
        TemplateChild::Conditional {
            then_branch,
            else_branch,
            ..
        } => {
            for c in then_branch.iter().chain(else_branch.iter().flatten()) {
                collect_handler_writes(c, finder);
            }
        }
        TemplateChild::Loop { body, .. } => {
            for c in body {
                collect_handler_writes(c, finder);
            }
        }
        TemplateChild::Text(_) | TemplateChild::Interpolation(_) => {}
    }
}

struct Writes<'a> {
    index: &'a AHashMap<String, usize>,
    seen: AHashSet<usize>,
    written: Vec<usize>,
}

impl<'a> Writes<'a> {
    fn new(index: &'a AHashMap<String, usize>) -> Self {
        Self {
            index,
            seen: AHashSet::new(),
            written: Vec::new(),
        }
    }

    fn record(&mut self, target: &Expr) {
        if let Some(name) = written_root(target) {
            if let Some(&i) = self.index.get(name) {
                if self.seen.insert(i) {
                    self.written.push(i);
                }
            }
        }
    }
}

impl Visitor for Writes<'_> {
    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Assign { target, .. } | Expr::Update { target, .. } => self.record(target),
            _ => {}
        }
        visit::walk_expr(self, expr);
    }
}

/// The `$name` at the root of an assignment target, e.g. `$user` in
/// `$user.profile.name = x`.
pub fn written_root(target: &Expr) -> Option<&str> {
    match target {
        Expr::Ref(name) => Some(name),
        Expr::Member { object, .. } | Expr::Index { object, .. } => written_root(object),
        Expr::Paren(inner) => written_root(inner),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::parser::parse;

    fn graph(src: &str) -> ReactiveGraph {
        analyze(&parse(src, "Test.mtm").unwrap()).unwrap()
    }

    #[test]
    fn test_exact_dependencies() {
        let g = graph("$price! = 10\n$qty! = 2\n$total! = $price * $qty\n");
        let deps: Vec<&str> = g.dependencies("total").unwrap().iter().map(String::as_str).collect();
        assert_eq!(deps, vec!["price", "qty"]);
        assert_eq!(g.variable("price").unwrap().update_triggers, vec!["total"]);
    }

    #[test]
    fn test_plain_variables_are_excluded() {
        let g = graph("$a! = 1\n$label = 'x'\n$b! = $a + 1\n");
        assert!(!g.contains("label"));
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn test_multi_level_chain() {
        let g = graph(
            "$price! = 10\n$qty! = 2\n$result! = $price * $qty\n$formatted! = `$${$result}`\n",
        );
        assert_eq!(g.affected("price"), ["result", "formatted"]);
        assert!(g.affected("formatted").is_empty());
        assert!(g.rank("result").unwrap() < g.rank("formatted").unwrap());
    }

    #[test]
    fn test_topological_order_respects_dependencies() {
        // Declared before its dependency.
        let g = graph("$doubled! = $count * 2\n$count! = 1\n");
        assert_eq!(g.order, vec!["count", "doubled"]);
        assert_eq!(g.variables[0].name, "doubled");
    }

    #[test]
    fn test_two_node_cycle() {
        let err = analyze(&parse("$a! = $b\n$b! = $a\n", "Test.mtm").unwrap()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::CircularDependency { .. }));
        let mut members = err.cycle_members().unwrap().to_vec();
        members.sort();
        assert_eq!(members, vec!["a", "b"]);
        assert!(err.suggestion.is_some());
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let err = analyze(&parse("$count! = $count + 1\n", "Test.mtm").unwrap()).unwrap_err();
        assert_eq!(err.cycle_members().unwrap(), ["count"]);
    }

    #[test]
    fn test_cycle_members_exclude_the_entry_path() {
        let err = analyze(&parse("$root! = 1\n$x! = $root + $z\n$y! = $x\n$z! = $y\n", "Test.mtm").unwrap())
            .unwrap_err();
        let mut members = err.cycle_members().unwrap().to_vec();
        members.sort();
        assert_eq!(members, vec!["x", "y", "z"]);
    }

    #[test]
    fn test_mutation_in_function_is_not_a_cycle() {
        let g = graph("$count! = 0\n$inc = () => { $count = $count + 1 }\n");
        assert_eq!(g.variable("count").unwrap().mutated_by, vec!["inc"]);
        assert!(g.dependencies("count").unwrap().is_empty());
    }

    #[test]
    fn test_template_writes() {
        let g = graph("$open! = false\ntemplate(`<button onclick={$open = !$open}>t</button>`)\n");
        assert_eq!(g.variable("open").unwrap().mutated_by, vec![TEMPLATE_SITE]);
    }

    #[test]
    fn test_batchable_siblings() {
        let g = graph(
            "$a! = 1\n$b! = 2\n$c! = 3\n$sum! = $a + $b + $c\n$other! = 0\n$reset = () => {\n  $a = 0\n  $b = 0\n  $c = 0\n  $other = 1\n}\n",
        );
        assert!(g.chain("a").unwrap().batchable);
        assert!(g.chain("c").unwrap().batchable);
        assert!(!g.chain("other").unwrap().batchable);
        assert!(!g.is_batchable("sum"));
        assert_eq!(g.update_chains().count(), 5);
    }

    #[test]
    fn test_long_chain_is_analyzed_without_expanding_every_chain() {
        let n = 20_000;
        let mut src = String::from("$v0! = 0\n");
        for i in 1..n {
            src.push_str(&format!("$v{i}! = $v{} + 1\n", i - 1));
        }
        let g = graph(&src);
        assert_eq!(g.len(), n);
        assert_eq!(g.rank("v0"), Some(0));
        assert_eq!(g.rank(&format!("v{}", n - 1)), Some(n - 1));
        let affected = g.affected(&format!("v{}", n - 3));
        assert_eq!(affected, [format!("v{}", n - 2), format!("v{}", n - 1)]);
        assert_eq!(g.affected("v0").len(), n - 1);
    }

    #[test]
    fn test_written_root() {
        let target = Expr::member(Expr::member(Expr::Ref("user".into()), "profile"), "name");
        assert_eq!(written_root(&target), Some("user"));
        assert_eq!(written_root(&Expr::ident("x")), None);
    }
}
