//! Module dependency resolution.
//!
//! Orders a set of nodes so that every node appears after all of its
//! dependencies, using a depth-first visit with visiting/visited marks.
//! Revisiting a node that is still being visited means the graph has a
//! cycle, which is a fatal configuration error.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::module::Module;

/// A node in a dependency graph.
pub trait DependencyNode {
    /// Key other nodes use to reference this one.
    fn key(&self) -> &str;
    /// Name reported in errors.
    fn display_name(&self) -> &str;
    /// Keys of the nodes this one depends on.
    fn dependency_keys(&self) -> &[String];
}

impl DependencyNode for Module {
    fn key(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn dependency_keys(&self) -> &[String] {
        &self.dependencies
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Visited,
}

/// Resolve a build order. Dependencies outside `nodes` are an error.
pub fn resolve_order<T: DependencyNode>(nodes: &[T]) -> CoreResult<Vec<&T>> {
    resolve(nodes, true)
}

/// Resolve a build order, ignoring dependencies outside `nodes`.
///
/// Used for plans, whose tasks may depend on modules that already exist
/// and are not part of the current exchange.
pub fn resolve_order_lenient<T: DependencyNode>(nodes: &[T]) -> CoreResult<Vec<&T>> {
    resolve(nodes, false)
}

fn resolve<T: DependencyNode>(nodes: &[T], strict: bool) -> CoreResult<Vec<&T>> {
    let by_key: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.key(), i))
        .collect();
    let mut marks: Vec<Option<Mark>> = vec![None; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());

    for index in 0..nodes.len() {
        visit(index, nodes, &by_key, &mut marks, &mut order, strict)?;
    }

    debug!(
        "Resolved order: {:?}",
        order.iter().map(|n| n.display_name()).collect::<Vec<_>>()
    );
    Ok(order)
}

fn visit<'a, T: DependencyNode>(
    index: usize,
    nodes: &'a [T],
    by_key: &HashMap<&str, usize>,
    marks: &mut [Option<Mark>],
    order: &mut Vec<&'a T>,
    strict: bool,
) -> CoreResult<()> {
    match marks[index] {
        Some(Mark::Visited) => return Ok(()),
        Some(Mark::Visiting) => {
            return Err(CoreError::CircularDependency {
                module: nodes[index].display_name().to_string(),
            })
        }
        None => {}
    }

    marks[index] = Some(Mark::Visiting);
    for dependency in nodes[index].dependency_keys() {
        match by_key.get(dependency.as_str()) {
            Some(&dep_index) => visit(dep_index, nodes, by_key, marks, order, strict)?,
            None if strict => {
                return Err(CoreError::UnknownDependency {
                    module: nodes[index].display_name().to_string(),
                    dependency: dependency.clone(),
                })
            }
            None => {}
        }
    }
    marks[index] = Some(Mark::Visited);
    order.push(&nodes[index]);
    Ok(())
}
