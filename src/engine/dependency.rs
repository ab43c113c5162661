// ABOUTME: Dependency graph construction and linear execution ordering
// ABOUTME: Depth-first post-order sort with cycle and unknown-dependency detection

use indexmap::IndexMap;
use petgraph::graph::NodeIndex;
use petgraph::visit::Bfs;
use petgraph::{Direction, Graph};
use std::collections::HashMap;

use super::error::{ExecutionError, Result};
use super::task::TaskDescriptor;

pub struct DependencyGraph {
    graph: Graph<String, ()>,
    task_indices: HashMap<String, NodeIndex>,
    /// Declared dependencies per task, in registration order
    dependencies: IndexMap<String, Vec<String>>,
}

/// Linear order in which the engine consumes tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub order: Vec<String>,
    pub total_tasks: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    InProgress,
    Done,
}

impl DependencyGraph {
    /// Create a dependency graph from registered task descriptors
    pub fn from_descriptors<R>(tasks: &IndexMap<String, TaskDescriptor<R>>) -> Self {
        Self::from_dependencies(
            tasks
                .iter()
                .map(|(task_id, task)| (task_id.clone(), task.dependencies.clone())),
        )
    }

    /// Create a dependency graph from `(task_id, dependencies)` pairs. Unknown
    /// dependency ids are kept and reported when the order is computed.
    pub fn from_dependencies<I>(tasks: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let dependencies: IndexMap<String, Vec<String>> = tasks.into_iter().collect();
        let mut graph = Graph::new();
        let mut task_indices = HashMap::new();

        for task_id in dependencies.keys() {
            let node_index = graph.add_node(task_id.clone());
            task_indices.insert(task_id.clone(), node_index);
        }

        for (task_id, deps) in &dependencies {
            let task_node = task_indices[task_id];
            for dependency in deps {
                if let Some(&dep_node) = task_indices.get(dependency) {
                    // Edge points from the dependency to the task that needs it
                    graph.add_edge(dep_node, task_node, ());
                }
            }
        }

        Self {
            graph,
            task_indices,
            dependencies,
        }
    }

    /// Compute the execution order, failing on the first cycle or unknown dependency
    pub fn create_execution_plan(&self) -> Result<ExecutionPlan> {
        let mut states: HashMap<&str, VisitState> = HashMap::new();
        let mut order = Vec::with_capacity(self.dependencies.len());

        for task_id in self.dependencies.keys() {
            self.visit(task_id, &mut states, &mut order)?;
        }

        Ok(ExecutionPlan {
            total_tasks: order.len(),
            order,
        })
    }

    fn visit<'a>(
        &'a self,
        task_id: &'a str,
        states: &mut HashMap<&'a str, VisitState>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        match states.get(task_id) {
            Some(VisitState::Done) => return Ok(()),
            Some(VisitState::InProgress) => {
                return Err(ExecutionError::CircularDependency {
                    task_id: task_id.to_string(),
                })
            }
            None => {}
        }

        let deps = self
            .dependencies
            .get(task_id)
            .ok_or_else(|| ExecutionError::TaskNotFound {
                task_id: task_id.to_string(),
            })?;

        states.insert(task_id, VisitState::InProgress);
        for dependency in deps {
            self.visit(dependency, states, order)?;
        }
        states.insert(task_id, VisitState::Done);
        order.push(task_id.to_string());

        Ok(())
    }

    /// Declared dependencies of a task
    pub fn get_dependencies(&self, task_id: &str) -> Vec<String> {
        self.dependencies.get(task_id).cloned().unwrap_or_default()
    }

    /// Tasks that directly depend on the given task, in registration order
    pub fn get_dependents(&self, task_id: &str) -> Vec<String> {
        let Some(&node_idx) = self.task_indices.get(task_id) else {
            return Vec::new();
        };

        let mut dependents: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node_idx, Direction::Outgoing)
            .collect();
        dependents.sort();
        dependents.dedup();
        dependents
            .into_iter()
            .map(|node| self.graph[node].clone())
            .collect()
    }

    /// Every task that directly or indirectly depends on the given task
    pub fn get_transitive_dependents(&self, task_id: &str) -> Vec<String> {
        let Some(&start) = self.task_indices.get(task_id) else {
            return Vec::new();
        };

        let mut reached = Vec::new();
        let mut bfs = Bfs::new(&self.graph, start);
        while let Some(node) = bfs.next(&self.graph) {
            if node != start {
                reached.push(node);
            }
        }
        reached.sort();
        reached
            .into_iter()
            .map(|node| self.graph[node].clone())
            .collect()
    }

    /// Tasks with no dependencies
    pub fn get_root_tasks(&self) -> Vec<String> {
        self.dependencies
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(task_id, _)| task_id.clone())
            .collect()
    }

    /// Tasks nothing else depends on
    pub fn get_leaf_tasks(&self) -> Vec<String> {
        self.dependencies
            .keys()
            .filter(|task_id| {
                self.graph
                    .neighbors_directed(self.task_indices[*task_id], Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(tasks: &[(&str, &[&str])]) -> DependencyGraph {
        DependencyGraph::from_dependencies(tasks.iter().map(|(id, deps)| {
            (
                id.to_string(),
                deps.iter().map(|d| d.to_string()).collect(),
            )
        }))
    }

    fn diamond() -> DependencyGraph {
        graph(&[
            ("task_d", &["task_b", "task_c"]),
            ("task_a", &[]),
            ("task_b", &["task_a"]),
            ("task_c", &["task_a"]),
        ])
    }

    #[test]
    fn test_post_order_respects_dependencies() {
        let plan = diamond().create_execution_plan().unwrap();

        assert_eq!(plan.total_tasks, 4);
        assert_eq!(plan.order, vec!["task_a", "task_b", "task_c", "task_d"]);
    }

    #[test]
    fn test_independent_tasks_keep_registration_order() {
        let plan = graph(&[("login", &[]), ("health", &[]), ("extract", &["login"])])
            .create_execution_plan()
            .unwrap();

        assert_eq!(plan.order, vec!["login", "health", "extract"]);
    }

    #[test]
    fn test_every_task_after_its_transitive_dependencies() {
        let g = graph(&[
            ("report", &["update", "extract"]),
            ("update", &["extract"]),
            ("extract", &["navigate"]),
            ("navigate", &["login"]),
            ("login", &[]),
            ("cleanup", &[]),
        ]);
        let plan = g.create_execution_plan().unwrap();

        let position = |id: &str| plan.order.iter().position(|t| t == id);
        for task in &plan.order {
            for dependent in g.get_transitive_dependents(task) {
                assert!(position(task.as_str()) < position(dependent.as_str()));
            }
        }
    }

    #[test]
    fn test_circular_dependency_detection() {
        let result = graph(&[("task_a", &["task_b"]), ("task_b", &["task_a"])])
            .create_execution_plan();

        assert!(matches!(
            result,
            Err(ExecutionError::CircularDependency { ref task_id }) if task_id == "task_a"
        ));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let result = graph(&[("task_a", &["task_a"])]).create_execution_plan();
        assert!(matches!(
            result,
            Err(ExecutionError::CircularDependency { .. })
        ));
    }

    #[test]
    fn test_unknown_dependency_is_named() {
        let result = graph(&[("extract", &["login"])]).create_execution_plan();

        assert!(matches!(
            result,
            Err(ExecutionError::TaskNotFound { ref task_id }) if task_id == "login"
        ));
    }

    #[test]
    fn test_dependency_queries() {
        let g = diamond();

        assert_eq!(g.get_dependencies("task_a"), Vec::<String>::new());
        assert_eq!(g.get_dependencies("task_d"), vec!["task_b", "task_c"]);
        assert_eq!(g.get_dependents("task_a"), vec!["task_b", "task_c"]);
        // Registration order: task_d was registered first
        assert_eq!(
            g.get_transitive_dependents("task_a"),
            vec!["task_d", "task_b", "task_c"]
        );
        assert!(g.get_transitive_dependents("task_d").is_empty());
        assert_eq!(g.get_root_tasks(), vec!["task_a"]);
        assert_eq!(g.get_leaf_tasks(), vec!["task_d"]);
    }
}
