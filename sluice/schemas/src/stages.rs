//! Stage configuration types.
//!
//! A stage is one declarative step of a pipeline. Its `type` selects the payload found under
//! `data`. Payload fields are all optional at the type level: a stage coming from a user edit or
//! a suggestion may be incomplete, and completeness is decided by validation in `sluice-core`
//! rather than by deserialization.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::serde_helpers::deserialize_sort_keys;

/// A step of a pipeline.
///
/// Serialized as `{ "id": ..., "type": ..., "description": ..., "data": { ... } }`.
///
/// # Examples
///
/// ```
/// use sluice_schemas::{Stage, StageType};
///
/// let stage: Stage = serde_json::from_str(
///     r#"{
///         "id": "s2",
///         "type": "FILTER",
///         "description": "big orders",
///         "data": { "table": "orders", "column": "amount", "operator": ">", "value": 100 }
///     }"#,
/// )
/// .unwrap();
///
/// assert_eq!(stage.stage_type(), StageType::Filter);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Opaque identifier, stable across edits of the stage
    pub id: String,

    /// Free text shown to the user, never used for semantics
    #[serde(default)]
    pub description: String,

    /// Stage type and its payload
    #[serde(flatten)]
    pub kind: StageKind,
}

impl Stage {
    pub fn new(id: impl Into<String>, kind: StageKind) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            kind,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn stage_type(&self) -> StageType {
        self.kind.stage_type()
    }
}

/// A stage proposed by an external producer (e.g. a suggestion service), `id` may be absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateStage {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub description: String,

    #[serde(flatten)]
    pub kind: StageKind,
}

impl CandidateStage {
    /// Turn the candidate into a stage, using `fallback_id` when no id was provided
    pub fn into_stage(self, fallback_id: impl FnOnce() -> String) -> Stage {
        let id = match self.id {
            Some(id) if !id.trim().is_empty() => id,
            _ => fallback_id(),
        };

        Stage {
            id,
            description: self.description,
            kind: self.kind,
        }
    }
}

/// Closed set of stage payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "UPPERCASE")]
pub enum StageKind {
    /// A table loaded into the pipeline from outside, its output is the table itself
    #[serde(alias = "load")]
    Load(LoadStage),
    /// Join two tables on a key
    #[serde(alias = "join")]
    Join(JoinStage),
    /// Concatenate the rows of several tables
    #[serde(alias = "union")]
    Union(UnionStage),
    /// Keep the rows matching one or more conditions
    #[serde(alias = "filter")]
    Filter(FilterStage),
    /// Group rows and compute aggregations per group
    #[serde(alias = "group")]
    Group(GroupStage),
    /// Project a subset of columns
    #[serde(alias = "select")]
    Select(SelectStage),
    /// Order rows
    #[serde(alias = "sort")]
    Sort(SortStage),
    /// Whole-table aggregation
    #[serde(alias = "aggregate")]
    Aggregate(AggregateStage),
    /// Hand written SQL
    #[serde(alias = "custom")]
    Custom(CustomStage),
}

impl StageKind {
    pub fn stage_type(&self) -> StageType {
        match self {
            StageKind::Load(_) => StageType::Load,
            StageKind::Join(_) => StageType::Join,
            StageKind::Union(_) => StageType::Union,
            StageKind::Filter(_) => StageType::Filter,
            StageKind::Group(_) => StageType::Group,
            StageKind::Select(_) => StageType::Select,
            StageKind::Sort(_) => StageType::Sort,
            StageKind::Aggregate(_) => StageType::Aggregate,
            StageKind::Custom(_) => StageType::Custom,
        }
    }

    /// The explicit single input table of the stage, if its type has one and it is set
    pub fn explicit_table(&self) -> Option<&str> {
        let table = match self {
            StageKind::Filter(filter) => filter.table.as_deref(),
            StageKind::Group(group) => group.table.as_deref(),
            StageKind::Select(select) => select.table.as_deref(),
            StageKind::Sort(sort) => sort.table.as_deref(),
            StageKind::Aggregate(aggregate) => aggregate.table.as_deref(),
            StageKind::Load(_)
            | StageKind::Join(_)
            | StageKind::Union(_)
            | StageKind::Custom(_) => None,
        };

        table.filter(|t| !t.trim().is_empty())
    }

    /// Whether the stage reads from a single table that may be implied by its position
    pub fn takes_implicit_input(&self) -> bool {
        matches!(
            self,
            StageKind::Filter(_)
                | StageKind::Group(_)
                | StageKind::Select(_)
                | StageKind::Sort(_)
                | StageKind::Aggregate(_)
        )
    }
}

/// Discriminant of [`StageKind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StageType {
    Load,
    Join,
    Union,
    Filter,
    Group,
    Select,
    Sort,
    Aggregate,
    Custom,
}

impl StageType {
    /// Every stage type, in declaration order
    pub const ALL: [StageType; 9] = [
        StageType::Load,
        StageType::Join,
        StageType::Union,
        StageType::Filter,
        StageType::Group,
        StageType::Select,
        StageType::Sort,
        StageType::Aggregate,
        StageType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageType::Load => "LOAD",
            StageType::Join => "JOIN",
            StageType::Union => "UNION",
            StageType::Filter => "FILTER",
            StageType::Group => "GROUP",
            StageType::Select => "SELECT",
            StageType::Sort => "SORT",
            StageType::Aggregate => "AGGREGATE",
            StageType::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a `LOAD` stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, derive_new::new)]
#[serde(rename_all = "camelCase")]
pub struct LoadStage {
    /// Name of the loaded table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
}

/// Payload of a `JOIN` stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinStage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_key: Option<String>,

    /// Defaults to an inner join
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_type: Option<JoinType>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    #[default]
    #[serde(rename = "INNER", alias = "inner")]
    Inner,
    #[serde(rename = "LEFT", alias = "left")]
    Left,
    #[serde(rename = "RIGHT", alias = "right")]
    Right,
    #[serde(
        rename = "FULL OUTER",
        alias = "FULL",
        alias = "full",
        alias = "full outer"
    )]
    FullOuter,
}

impl JoinType {
    /// SQL join keyword
    pub fn keyword(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::FullOuter => "FULL OUTER JOIN",
        }
    }
}

/// Payload of a `UNION` stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnionStage {
    #[serde(default)]
    pub tables: Vec<String>,

    /// Defaults to `UNION` (distinct rows)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub union_type: Option<UnionType>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnionType {
    #[default]
    #[serde(rename = "UNION", alias = "union", alias = "DISTINCT")]
    Union,
    #[serde(rename = "UNION ALL", alias = "union all", alias = "ALL")]
    UnionAll,
}

impl UnionType {
    pub fn keyword(&self) -> &'static str {
        match self {
            UnionType::Union => "UNION",
            UnionType::UnionAll => "UNION ALL",
        }
    }
}

/// Payload of a `FILTER` stage
///
/// Either a single `column operator value` triple, or an ordered list of `conditions` which
/// takes precedence when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterStage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,

    /// Numbers and booleans are rendered as literals, anything else as a quoted string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<FilterCondition>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// Connective to the previous condition, ignored on the first one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic: Option<Logic>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    #[default]
    #[serde(alias = "and")]
    And,
    #[serde(alias = "or")]
    Or,
}

impl Logic {
    pub fn keyword(&self) -> &'static str {
        match self {
            Logic::And => "AND",
            Logic::Or => "OR",
        }
    }
}

/// Payload of a `GROUP` stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    #[serde(default)]
    pub group_by: Vec<String>,

    #[serde(default)]
    pub aggregations: Vec<Aggregation>,
}

/// `FUNC(column) [AS alias]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_new::new)]
#[serde(rename_all = "camelCase")]
pub struct Aggregation {
    #[serde(alias = "func", alias = "fn")]
    pub function: String,

    pub column: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// Payload of a `SELECT` stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectStage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    #[serde(default)]
    pub columns: Vec<String>,
}

/// Payload of a `SORT` stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortStage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Accepts plain column names as well as `{ "column": .., "direction": .. }` objects
    #[serde(default, deserialize_with = "deserialize_sort_keys")]
    pub order_by: Vec<SortKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_new::new)]
#[serde(rename_all = "camelCase")]
pub struct SortKey {
    pub column: String,

    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "asc")]
    Asc,
    #[serde(alias = "desc")]
    Desc,
}

impl SortDirection {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Payload of an `AGGREGATE` stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    #[serde(default)]
    pub aggregations: Vec<Aggregation>,
}

/// Payload of a `CUSTOM` stage, the SQL is passed to the engine untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomStage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

/// Copy of `stages` with ids renumbered to the human readable sequence `stage_1, stage_2, ...`
///
/// Stages reference each other through table names, never through ids, so renumbering keeps
/// the exported pipeline intact.
pub fn export_stages(stages: &[Stage]) -> Vec<Stage> {
    stages
        .iter()
        .enumerate()
        .map(|(pos, stage)| Stage {
            id: format!("stage_{}", pos + 1),
            description: stage.description.clone(),
            kind: stage.kind.clone(),
        })
        .collect()
}
