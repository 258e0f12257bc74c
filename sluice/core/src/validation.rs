//! Stage validation.
//!
//! A stage must carry every field its compiler needs before it may be compiled or executed.
//! Validation is pure and is the gate in front of the compiler: the materialization engine never
//! compiles a stage that did not pass [`validate`].

use miette::Diagnostic;
use serde_json::Value;
use sluice_schemas::{FilterCondition, StageKind, StageType};

/// A stage payload is incomplete for its declared type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Diagnostic)]
#[error("Incomplete {stage_type} stage: '{field}' is required")]
#[diagnostic(
    code(sluice::validation::incomplete_stage),
    help("Fill in '{field}' before running the stage")
)]
pub struct ValidationError {
    pub stage_type: StageType,

    /// Payload key, `conditions[i].<key>` for filter conditions
    pub field: String,
}

impl ValidationError {
    fn new(stage_type: StageType, field: impl Into<String>) -> Self {
        Self {
            stage_type,
            field: field.into(),
        }
    }
}

/// Check that `stage` is complete enough to compile, reporting the first missing field
pub fn validate(stage: &StageKind) -> Result<(), ValidationError> {
    let stage_type = stage.stage_type();
    let missing = |field: &str| Err(ValidationError::new(stage_type, field));

    match stage {
        StageKind::Load(_) => Ok(()),
        StageKind::Join(join) => {
            if !is_filled(&join.left_table) {
                missing("leftTable")
            } else if !is_filled(&join.right_table) {
                missing("rightTable")
            } else if !is_filled(&join.left_key) {
                missing("leftKey")
            } else if !is_filled(&join.right_key) {
                missing("rightKey")
            } else {
                Ok(())
            }
        }
        StageKind::Union(union) if union.tables.is_empty() => missing("tables"),
        StageKind::Union(_) => Ok(()),
        StageKind::Filter(filter) => {
            let conditions = filter.conditions.as_deref().unwrap_or_default();
            if !is_filled(&filter.table) {
                missing("table")
            } else if !conditions.is_empty() {
                conditions
                    .iter()
                    .enumerate()
                    .try_for_each(|(pos, condition)| validate_condition(condition, pos))
            } else if !is_filled(&filter.column) {
                missing("column")
            } else if !is_filled(&filter.operator) {
                missing("operator")
            } else if !is_present_value(filter.value.as_ref()) {
                missing("value")
            } else {
                Ok(())
            }
        }
        StageKind::Group(group) if group.group_by.is_empty() => missing("groupBy"),
        StageKind::Group(_) => Ok(()),
        StageKind::Select(select) if select.columns.is_empty() => missing("columns"),
        StageKind::Select(_) => Ok(()),
        StageKind::Sort(sort) if sort.order_by.is_empty() => missing("orderBy"),
        StageKind::Sort(_) => Ok(()),
        StageKind::Aggregate(aggregate) if aggregate.aggregations.is_empty() => {
            missing("aggregations")
        }
        StageKind::Aggregate(_) => Ok(()),
        StageKind::Custom(custom) => match custom.sql.as_deref() {
            Some(sql) if !sql.trim().is_empty() => Ok(()),
            _ => missing("sql"),
        },
    }
}

// conditions take precedence over the single column/operator/value triple
fn validate_condition(condition: &FilterCondition, pos: usize) -> Result<(), ValidationError> {
    let missing = |field: &str| {
        Err(ValidationError::new(
            StageType::Filter,
            format!("conditions[{pos}].{field}"),
        ))
    };

    if !is_filled(&condition.column) {
        missing("column")
    } else if !is_filled(&condition.operator) {
        missing("operator")
    } else if !is_present_value(condition.value.as_ref()) {
        missing("value")
    } else {
        Ok(())
    }
}

/// Boolean form of [`validate`]
pub fn is_valid(stage: &StageKind) -> bool {
    validate(stage).is_ok()
}

fn is_filled(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|value| !value.is_empty())
}

// `null` and "" count as missing, any other value (including 0 and "0") is present
pub(crate) fn is_present_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}
