//! Dependency graph between stages.
//!
//! Stages never reference each other by id, only through the names of the tables they read.
//! The graph is rebuilt from scratch over the ordered stage list: while scanning, every table
//! name a stage makes visible is recorded against that stage, and later stages that mention the
//! name get an edge to it. Unknown names produce no edge, and since only earlier stages can have
//! registered a name the graph is acyclic by construction.

use std::collections::HashSet;

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use sluice_schemas::{Stage, StageKind};
use tracing::trace;

use crate::compiler::table_name_for;

/// Name under which the output of a join between `left` and `right` becomes visible
///
/// Two joins of the same pair of tables share this name, the later one shadows the earlier.
pub fn join_output_name(left: &str, right: &str) -> String {
    format!("{left}_{right}_joined")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    /// Ids of the stages whose output this stage reads, in order of first reference
    pub inputs: Vec<String>,

    /// 0 without inputs, otherwise one more than the deepest input
    pub level: usize,
}

/// Stage id to node, in stage order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DependencyGraph {
    nodes: IndexMap<String, GraphNode>,
}

impl DependencyGraph {
    pub fn get(&self, stage_id: &str) -> Option<&GraphNode> {
        self.nodes.get(stage_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &GraphNode)> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Stage ids grouped by level, shallowest first; stage order is kept within a level
    pub fn execution_levels(&self) -> Vec<Vec<String>> {
        let depth = self.nodes.values().map(|node| node.level + 1).max();
        let mut levels = vec![Vec::new(); depth.unwrap_or(0)];

        for (id, node) in &self.nodes {
            levels[node.level].push(id.clone());
        }

        levels
    }

    /// Every stage that transitively reads the output of `stage_id`, in stage order
    pub fn downstream(&self, stage_id: &str) -> Vec<String> {
        let mut affected: HashSet<&str> = HashSet::from([stage_id]);
        let mut dependents = Vec::new();

        // inputs always precede their dependents, one pass is enough
        for (id, node) in &self.nodes {
            if id != stage_id
                && node
                    .inputs
                    .iter()
                    .any(|input| affected.contains(input.as_str()))
            {
                affected.insert(id.as_str());
                dependents.push(id.clone());
            }
        }

        dependents
    }
}

/// Build the dependency graph of `stages`
pub fn build_graph(stages: &[Stage]) -> DependencyGraph {
    // table name -> producing stage id
    let mut known: IndexMap<String, String> = IndexMap::new();
    let mut nodes: IndexMap<String, GraphNode> = IndexMap::new();

    for (pos, stage) in stages.iter().enumerate() {
        let references = referenced_tables(&stage.kind, &known);

        let mut inputs: Vec<String> = Vec::new();
        for table in references {
            match known.get(&table) {
                Some(producer) if *producer != stage.id && !inputs.contains(producer) => {
                    inputs.push(producer.clone())
                }
                Some(_) => (),
                None => trace!("Stage '{}' references unknown table '{table}'", stage.id),
            }
        }

        let level = inputs
            .iter()
            .filter_map(|input| nodes.get(input))
            .map(|node| node.level + 1)
            .max()
            .unwrap_or(0);

        match &stage.kind {
            StageKind::Load(load) => {
                if let Some(name) = load.table_name.as_deref().filter(|n| !n.is_empty()) {
                    known.insert(name.to_string(), stage.id.clone());
                }
            }
            kind => {
                if let StageKind::Join(join) = kind {
                    if let (Some(left), Some(right)) = (&join.left_table, &join.right_table) {
                        known.insert(join_output_name(left, right), stage.id.clone());
                    }
                }
                known.insert(table_name_for(pos, kind.stage_type()), stage.id.clone());
            }
        }

        nodes.insert(stage.id.clone(), GraphNode { inputs, level });
    }

    DependencyGraph { nodes }
}

fn referenced_tables(kind: &StageKind, known: &IndexMap<String, String>) -> Vec<String> {
    match kind {
        StageKind::Load(_) => vec![],
        StageKind::Join(join) => [&join.left_table, &join.right_table]
            .into_iter()
            .flatten()
            .cloned()
            .collect(),
        StageKind::Union(union) => union.tables.clone(),
        StageKind::Custom(custom) => custom
            .sql
            .as_deref()
            .map(|sql| tables_mentioned_in(sql, known.keys()))
            .unwrap_or_default(),
        kind => kind.explicit_table().map(str::to_string).into_iter().collect(),
    }
}

// whole-identifier matches only, `orders` does not match `orders_2024`
fn tables_mentioned_in<'a>(sql: &str, names: impl Iterator<Item = &'a String>) -> Vec<String> {
    names
        .filter(|name| {
            let pattern = format!(r"(^|[^\w.]){}($|[^\w])", regex::escape(name));
            Regex::new(&pattern).is_ok_and(|regex| regex.is_match(sql))
        })
        .cloned()
        .collect()
}
