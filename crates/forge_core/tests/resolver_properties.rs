//! Property tests for module ordering.

use std::collections::{HashMap, HashSet};

use forge_core::{resolve_order, CoreError, Module, Technology};
use proptest::prelude::*;

/// Modules `m0..mN` where each module depends only on lower-numbered ones,
/// in shuffled order.
fn acyclic_modules() -> impl Strategy<Value = Vec<Module>> {
    proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), 1..12)
        .prop_map(|deps| {
            deps.iter()
                .enumerate()
                .map(|(i, picks)| {
                    let mut module = Module::new(format!("m{}", i), Technology::Kiwi)
                        .with_id(format!("m{}", i));
                    if i > 0 {
                        let mut seen = HashSet::new();
                        for pick in picks {
                            let dep = format!("m{}", pick % i);
                            if seen.insert(dep.clone()) {
                                module = module.depends_on(dep);
                            }
                        }
                    }
                    module
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

/// Whether `id` can reach itself through dependencies.
fn on_cycle(modules: &[Module], id: &str) -> bool {
    let deps: HashMap<&str, &[String]> = modules
        .iter()
        .map(|m| (m.id.as_str(), m.dependencies.as_slice()))
        .collect();
    let mut stack: Vec<&str> = deps[id].iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    while let Some(next) = stack.pop() {
        if next == id {
            return true;
        }
        if seen.insert(next) {
            stack.extend(deps[next].iter().map(String::as_str));
        }
    }
    false
}

proptest! {
    #[test]
    fn prop_dependencies_come_first(modules in acyclic_modules()) {
        let order = resolve_order(&modules).unwrap();
        prop_assert_eq!(order.len(), modules.len());

        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id.as_str(), i))
            .collect();
        for module in &modules {
            for dep in &module.dependencies {
                prop_assert!(position[dep.as_str()] < position[module.id.as_str()]);
            }
        }
    }

    #[test]
    fn prop_cycle_names_a_module_on_the_cycle(
        modules in acyclic_modules().prop_filter("needs two modules", |m| m.len() > 1),
        first in any::<prop::sample::Index>(),
        second in any::<prop::sample::Index>(),
    ) {
        // Two modules depending on each other close a cycle.
        let mut ids: Vec<usize> = modules
            .iter()
            .map(|m| m.id[1..].parse().unwrap())
            .collect();
        ids.sort_unstable();
        let a = ids[first.index(ids.len())];
        let b = ids[second.index(ids.len())];
        prop_assume!(a != b);

        let mut modules = modules;
        for module in &mut modules {
            let other = if module.id == format!("m{}", a) {
                b
            } else if module.id == format!("m{}", b) {
                a
            } else {
                continue;
            };
            let dep = format!("m{}", other);
            if !module.dependencies.contains(&dep) {
                module.dependencies.push(dep);
            }
        }

        match resolve_order(&modules) {
            Err(CoreError::CircularDependency { module }) => {
                prop_assert!(on_cycle(&modules, &module), "{} is not on a cycle", module);
            }
            other => prop_assert!(false, "expected a cycle, got {:?}", other.map(|o| o.len())),
        }
    }
}
