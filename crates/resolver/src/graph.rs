//! Dependency graph construction, validation, and wave ordering

use picopkg_errors::{Error, GraphError};
use picopkg_types::PackageDescriptor;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Directed dependency graph over package IDs
///
/// Edges point from a package to the packages it depends on. A reverse
/// adjacency ("who depends on me") is kept for blocked-state propagation.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// package -> its dependencies, in declared order
    edges: BTreeMap<String, Vec<String>>,
    /// package -> packages that depend on it
    reverse: BTreeMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Build the graph from a descriptor set
    pub fn from_descriptors<'a, I>(descriptors: I) -> Self
    where
        I: IntoIterator<Item = &'a PackageDescriptor>,
    {
        let mut graph = Self::default();
        for descriptor in descriptors {
            graph.add_package(&descriptor.id, &descriptor.depends);
        }
        graph
    }

    /// Add a package and its dependency edges
    pub fn add_package(&mut self, id: &str, depends: &[String]) {
        self.edges
            .entry(id.to_string())
            .or_default()
            .extend(depends.iter().cloned());
        self.reverse.entry(id.to_string()).or_default();
        for dep in depends {
            self.reverse
                .entry(dep.clone())
                .or_default()
                .push(id.to_string());
        }
    }

    /// Number of packages in the graph
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Dependencies of a package, in declared order
    #[must_use]
    pub fn dependencies(&self, id: &str) -> &[String] {
        self.edges.get(id).map_or(&[], Vec::as_slice)
    }

    /// Direct dependents of a package
    #[must_use]
    pub fn dependents(&self, id: &str) -> &[String] {
        self.reverse.get(id).map_or(&[], Vec::as_slice)
    }

    /// All packages that transitively depend on the given one
    #[must_use]
    pub fn transitive_dependents(&self, id: &str) -> BTreeSet<String> {
        let mut result = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(id);
        while let Some(current) = queue.pop_front() {
            for dependent in self.dependents(current) {
                if result.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }
        result
    }

    /// Validate the graph: every edge target must exist, and no package may
    /// transitively depend on itself
    ///
    /// # Errors
    ///
    /// `GraphError::UnknownDependency` for a missing edge target;
    /// `GraphError::CyclicDependency` naming the full cycle when a
    /// depth-first traversal finds a back-edge. Both are fatal to the whole
    /// run - no valid schedule exists.
    pub fn validate(&self) -> Result<(), Error> {
        for (package, depends) in &self.edges {
            for dep in depends {
                if !self.edges.contains_key(dep) {
                    return Err(GraphError::UnknownDependency {
                        package: package.clone(),
                        dependency: dep.clone(),
                    }
                    .into());
                }
            }
        }

        // Iterative DFS with an explicit path stack so a back-edge can
        // report the full cycle.
        let mut visited: BTreeSet<&str> = BTreeSet::new();
        for start in self.edges.keys() {
            if visited.contains(start.as_str()) {
                continue;
            }
            if let Some(cycle) = self.find_cycle_from(start, &mut visited) {
                return Err(GraphError::CyclicDependency { cycle }.into());
            }
        }

        Ok(())
    }

    fn find_cycle_from<'a>(
        &'a self,
        start: &'a str,
        visited: &mut BTreeSet<&'a str>,
    ) -> Option<Vec<String>> {
        // Each frame tracks the next dependency index to visit.
        let mut path: Vec<(&str, usize)> = vec![(start, 0)];
        let mut on_path: BTreeSet<&str> = BTreeSet::new();
        on_path.insert(start);
        visited.insert(start);

        while let Some((node, next)) = path.last_mut() {
            let deps = self.dependencies(*node);
            if *next >= deps.len() {
                on_path.remove(*node);
                path.pop();
                continue;
            }
            let dep = deps[*next].as_str();
            *next += 1;

            if on_path.contains(dep) {
                // Back-edge: the cycle is the path suffix starting at `dep`,
                // closed by repeating it.
                let from = path.iter().position(|(n, _)| *n == dep).unwrap_or(0);
                let mut cycle: Vec<String> =
                    path[from..].iter().map(|(n, _)| (*n).to_string()).collect();
                cycle.push(dep.to_string());
                return Some(cycle);
            }
            if visited.insert(dep) {
                on_path.insert(dep);
                path.push((dep, 0));
            }
        }

        None
    }

    /// Group packages into waves: each wave is the maximal set of packages
    /// whose dependencies all lie in earlier waves
    ///
    /// # Errors
    ///
    /// Propagates validation errors; the ordering is only defined for a
    /// valid graph.
    pub fn build_order(&self) -> Result<BuildOrder, Error> {
        self.validate()?;

        let mut remaining: BTreeSet<&str> = self.edges.keys().map(String::as_str).collect();
        let mut waves: Vec<Vec<String>> = Vec::new();

        while !remaining.is_empty() {
            let wave: Vec<String> = remaining
                .iter()
                .filter(|id| {
                    self.dependencies(id)
                        .iter()
                        .all(|dep| !remaining.contains(dep.as_str()))
                })
                .map(|id| (*id).to_string())
                .collect();

            // A valid (acyclic) graph always yields a non-empty wave.
            if wave.is_empty() {
                return Err(Error::internal("wave construction stalled on a valid graph"));
            }

            for id in &wave {
                remaining.remove(id.as_str());
            }
            waves.push(wave);
        }

        Ok(BuildOrder { waves })
    }
}

/// Wave-grouped build order
///
/// Packages within a wave are mutually independent and may run concurrently;
/// cross-wave ordering is strict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOrder {
    waves: Vec<Vec<String>>,
}

impl BuildOrder {
    #[must_use]
    pub fn waves(&self) -> &[Vec<String>] {
        &self.waves
    }

    /// Flattened order, wave by wave
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.waves.iter().flatten().map(String::as_str)
    }

    #[must_use]
    pub fn package_count(&self) -> usize {
        self.waves.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str, depends: &[&str]) -> PackageDescriptor {
        let mut d = PackageDescriptor::new(id);
        d.depends = depends.iter().map(|s| (*s).to_string()).collect();
        d
    }

    #[test]
    fn unknown_dependency_fails_validation() {
        let pkgs = [descriptor("a", &["missing"])];
        let graph = DependencyGraph::from_descriptors(&pkgs);
        let err = graph.validate().unwrap_err();
        assert!(matches!(
            err,
            Error::Graph(GraphError::UnknownDependency { ref package, ref dependency })
                if package == "a" && dependency == "missing"
        ));
    }

    #[test]
    fn two_cycle_names_both_packages() {
        let pkgs = [descriptor("a", &["b"]), descriptor("b", &["a"])];
        let graph = DependencyGraph::from_descriptors(&pkgs);
        let err = graph.validate().unwrap_err();
        let Error::Graph(GraphError::CyclicDependency { cycle }) = err else {
            panic!("expected cyclic dependency error");
        };
        assert!(cycle.contains(&"a".to_string()));
        assert!(cycle.contains(&"b".to_string()));
        // The cycle is closed: first element repeated at the end.
        assert_eq!(cycle.first(), cycle.last());
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let pkgs = [descriptor("a", &["a"])];
        let graph = DependencyGraph::from_descriptors(&pkgs);
        let err = graph.validate().unwrap_err();
        assert!(matches!(
            err,
            Error::Graph(GraphError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn longer_cycle_reports_full_path() {
        let pkgs = [
            descriptor("a", &["b"]),
            descriptor("b", &["c"]),
            descriptor("c", &["a"]),
            descriptor("d", &[]),
        ];
        let graph = DependencyGraph::from_descriptors(&pkgs);
        let Error::Graph(GraphError::CyclicDependency { cycle }) = graph.validate().unwrap_err()
        else {
            panic!("expected cyclic dependency error");
        };
        // Three distinct members plus the closing repeat
        assert_eq!(cycle.len(), 4);
        for id in ["a", "b", "c"] {
            assert!(cycle.contains(&id.to_string()));
        }
    }

    #[test]
    fn waves_respect_dependencies() {
        // d -> b, c; b -> a; c -> a
        let pkgs = [
            descriptor("a", &[]),
            descriptor("b", &["a"]),
            descriptor("c", &["a"]),
            descriptor("d", &["b", "c"]),
        ];
        let graph = DependencyGraph::from_descriptors(&pkgs);
        let order = graph.build_order().unwrap();

        assert_eq!(order.waves().len(), 3);
        assert_eq!(order.waves()[0], vec!["a"]);
        assert_eq!(order.waves()[1], vec!["b", "c"]);
        assert_eq!(order.waves()[2], vec!["d"]);
    }

    #[test]
    fn every_dependency_lands_in_a_strictly_earlier_wave() {
        let pkgs = [
            descriptor("icu", &[]),
            descriptor("boost", &["icu"]),
            descriptor("app", &["boost", "zlib"]),
            descriptor("zlib", &[]),
            descriptor("tool", &["zlib"]),
        ];
        let graph = DependencyGraph::from_descriptors(&pkgs);
        let order = graph.build_order().unwrap();

        let wave_of = |id: &str| {
            order
                .waves()
                .iter()
                .position(|w| w.iter().any(|p| p == id))
                .unwrap()
        };

        for pkg in ["icu", "boost", "app", "zlib", "tool"] {
            for dep in graph.dependencies(pkg) {
                assert!(wave_of(dep) < wave_of(pkg), "{dep} must precede {pkg}");
            }
        }
    }

    #[test]
    fn disconnected_components_share_waves() {
        let pkgs = [
            descriptor("a", &[]),
            descriptor("b", &["a"]),
            descriptor("x", &[]),
            descriptor("y", &["x"]),
        ];
        let graph = DependencyGraph::from_descriptors(&pkgs);
        let order = graph.build_order().unwrap();
        assert_eq!(order.waves().len(), 2);
        assert_eq!(order.waves()[0], vec!["a", "x"]);
        assert_eq!(order.waves()[1], vec!["b", "y"]);
    }

    #[test]
    fn transitive_dependents_walk_reverse_edges() {
        let pkgs = [
            descriptor("a", &[]),
            descriptor("b", &["a"]),
            descriptor("c", &["b"]),
            descriptor("d", &[]),
        ];
        let graph = DependencyGraph::from_descriptors(&pkgs);
        let dependents = graph.transitive_dependents("a");
        assert_eq!(
            dependents,
            BTreeSet::from(["b".to_string(), "c".to_string()])
        );
        assert!(graph.transitive_dependents("d").is_empty());
    }
}
