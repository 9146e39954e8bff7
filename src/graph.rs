//! Static dependency graph over the provider map, with cycle detection.
//!
//! Built once per injector from declared signatures, before any provider
//! runs. An edge goes from a provider to every parameter name that matches
//! another provider; parameter names with no matching provider are
//! external inputs (overrides or defaults) and contribute no edge.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::module::ProviderMap;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    InProgress,
    Done,
}

pub(crate) struct DependencyGraph {
    edges: IndexMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub(crate) fn from_providers(providers: &ProviderMap) -> Self {
        let mut edges = IndexMap::new();
        for (name, binding) in providers {
            let deps = binding
                .signature()
                .names()
                .filter(|dep| providers.contains_key(*dep))
                .map(str::to_owned)
                .collect();
            edges.insert(name.clone(), deps);
        }
        Self { edges }
    }

    /// Depth-first search over every node, with an explicit stack so
    /// pathological graphs cannot exhaust the call stack. Returns the
    /// first cycle found as an ordered name sequence, closed by repeating
    /// the entry node.
    pub(crate) fn find_cycle(&self) -> Option<Vec<String>> {
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        for start in self.edges.keys() {
            if marks.get(start.as_str()).copied().unwrap_or(Mark::New) != Mark::New {
                continue;
            }
            // stack of (node, index of the next edge to follow)
            let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
            marks.insert(start.as_str(), Mark::InProgress);
            while let Some(&(node, next)) = stack.last() {
                let deps = &self.edges[node];
                if next < deps.len() {
                    stack.last_mut().expect("stack is non-empty").1 += 1;
                    let dep = deps[next].as_str();
                    match marks.get(dep).copied().unwrap_or(Mark::New) {
                        Mark::New => {
                            marks.insert(dep, Mark::InProgress);
                            stack.push((dep, 0));
                        }
                        Mark::InProgress => {
                            let entry = stack
                                .iter()
                                .position(|&(n, _)| n == dep)
                                .expect("in-progress node is on the stack");
                            let mut cycle: Vec<String> =
                                stack[entry..].iter().map(|&(n, _)| n.to_owned()).collect();
                            cycle.push(dep.to_owned());
                            return Some(cycle);
                        }
                        Mark::Done => {}
                    }
                } else {
                    marks.insert(node, Mark::Done);
                    stack.pop();
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ProviderMap, ProviderBinding};
    use crate::resolve::to_value;
    use std::sync::Arc;

    fn map_of(entries: &[(&str, &[&str])]) -> ProviderMap {
        let mut map = ProviderMap::new();
        for (name, deps) in entries {
            let mut builder = ProviderBinding::new(name);
            for dep in *deps {
                builder = builder.param(dep);
            }
            let binding = builder.to(|_| Ok(to_value(())));
            map.insert((*name).to_owned(), Arc::new(binding));
        }
        map
    }

    #[test]
    fn acyclic_graph_has_no_cycle() {
        let map = map_of(&[("a", &["b", "c"]), ("b", &["c"]), ("c", &[])]);
        assert!(DependencyGraph::from_providers(&map).find_cycle().is_none());
    }

    #[test]
    fn reports_cycle_in_reference_order() {
        let map = map_of(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        let cycle = DependencyGraph::from_providers(&map)
            .find_cycle()
            .expect("cycle");
        assert_eq!(cycle, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let map = map_of(&[("a", &["a"])]);
        let cycle = DependencyGraph::from_providers(&map)
            .find_cycle()
            .expect("cycle");
        assert_eq!(cycle, vec!["a", "a"]);
    }

    #[test]
    fn unknown_parameter_names_are_not_edges() {
        let map = map_of(&[("a", &["external"]), ("b", &["a"])]);
        assert!(DependencyGraph::from_providers(&map).find_cycle().is_none());
    }
}
