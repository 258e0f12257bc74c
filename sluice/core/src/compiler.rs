//! Stage to SQL compilation.
//!
//! [`compile`] is a pure function of a stage payload and the default input table resolved for
//! it. The same input always yields byte-identical SQL. Identifiers are emitted verbatim; only
//! filter values are quoted.

use miette::Diagnostic;
use serde_json::Value;
use sluice_schemas::{
    AggregateStage, Aggregation, FilterCondition, FilterStage, GroupStage, JoinStage, Logic,
    SelectStage, SortStage, StageKind, StageType, UnionStage,
};

use crate::validation::is_present_value;

/// The payload reaching the compiler is inconsistent, validation was bypassed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Diagnostic)]
pub enum CompileError {
    #[error("Cannot compile {stage_type} stage: '{field}' is missing")]
    #[diagnostic(
        code(sluice::compiler::missing_field),
        help("Stages must pass validation before they are compiled")
    )]
    MissingField {
        stage_type: StageType,
        field: String,
    },

    #[error("Cannot compile UNION stage: at least two tables are required, got {0}")]
    #[diagnostic(code(sluice::compiler::union_arity))]
    UnionArity(usize),

    #[error("LOAD stages are not compiled, the loaded table is their output")]
    #[diagnostic(code(sluice::compiler::load_stage))]
    LoadStage,
}

pub type Result<T> = core::result::Result<T, CompileError>;

/// Name of the table materialized for the stage at `stage_index`
///
/// The position is part of the name, so re-running an unmoved stage targets the same table.
pub fn table_name_for(stage_index: usize, stage_type: StageType) -> String {
    format!(
        "result_stage_{stage_index}_{}",
        stage_type.as_str().to_lowercase()
    )
}

/// Compile `stage` to SQL, reading from `default_input` when the stage has no explicit table
pub fn compile(stage: &StageKind, default_input: Option<&str>) -> Result<String> {
    match stage {
        StageKind::Load(_) => Err(CompileError::LoadStage),
        StageKind::Join(join) => compile_join(join),
        StageKind::Union(union) => compile_union(union),
        StageKind::Filter(filter) => compile_filter(filter, default_input),
        StageKind::Group(group) => compile_group(group, default_input),
        StageKind::Select(select) => compile_select(select, default_input),
        StageKind::Sort(sort) => compile_sort(sort, default_input),
        StageKind::Aggregate(aggregate) => compile_aggregate(aggregate, default_input),
        StageKind::Custom(custom) => match custom.sql.as_deref() {
            Some(sql) if !sql.trim().is_empty() => Ok(sql.to_string()),
            _ => Err(missing(StageType::Custom, "sql")),
        },
    }
}

fn compile_join(join: &JoinStage) -> Result<String> {
    let left = required(StageType::Join, "leftTable", &join.left_table)?;
    let right = required(StageType::Join, "rightTable", &join.right_table)?;
    let left_key = required(StageType::Join, "leftKey", &join.left_key)?;
    let right_key = required(StageType::Join, "rightKey", &join.right_key)?;
    let keyword = join.join_type.unwrap_or_default().keyword();

    // equal keys collapse into one output column
    if left_key == right_key {
        Ok(format!(
            "SELECT l.*, r.* EXCLUDE ({left_key}) FROM {left} AS l {keyword} {right} AS r USING ({left_key})"
        ))
    } else {
        Ok(format!(
            "SELECT l.*, r.* FROM {left} AS l {keyword} {right} AS r ON l.{left_key} = r.{right_key}"
        ))
    }
}

fn compile_union(union: &UnionStage) -> Result<String> {
    if union.tables.is_empty() {
        return Err(missing(StageType::Union, "tables"));
    }
    if union.tables.len() < 2 {
        return Err(CompileError::UnionArity(union.tables.len()));
    }

    let separator = format!(" {} ", union.union_type.unwrap_or_default().keyword());

    Ok(union
        .tables
        .iter()
        .map(|table| format!("SELECT * FROM {table}"))
        .collect::<Vec<_>>()
        .join(separator.as_str()))
}

fn compile_filter(filter: &FilterStage, default_input: Option<&str>) -> Result<String> {
    let table = source_table(StageType::Filter, filter.table.as_deref(), default_input)?;

    let predicate = match filter.conditions.as_deref() {
        Some(conditions) if !conditions.is_empty() => conditions
            .iter()
            .enumerate()
            .map(|(pos, condition)| {
                let rendered = render_condition(condition, pos)?;
                if pos == 0 {
                    Ok(rendered)
                } else {
                    let logic = condition.logic.unwrap_or(Logic::And);
                    Ok(format!("{} {rendered}", logic.keyword()))
                }
            })
            .collect::<Result<Vec<_>>>()?
            .join(" "),
        _ => {
            let column = required(StageType::Filter, "column", &filter.column)?;
            let operator = required(StageType::Filter, "operator", &filter.operator)?;
            let value = filter
                .value
                .as_ref()
                .filter(|value| is_present_value(Some(value)))
                .ok_or_else(|| missing(StageType::Filter, "value"))?;

            format!("{column} {operator} {}", render_literal(value))
        }
    };

    Ok(format!("SELECT * FROM {table} WHERE {predicate}"))
}

fn render_condition(condition: &FilterCondition, pos: usize) -> Result<String> {
    let field = |name: &str| format!("conditions[{pos}].{name}");

    let column = condition
        .column
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| missing(StageType::Filter, field("column")))?;
    let operator = condition
        .operator
        .as_deref()
        .filter(|o| !o.is_empty())
        .ok_or_else(|| missing(StageType::Filter, field("operator")))?;
    let value = condition
        .value
        .as_ref()
        .filter(|value| is_present_value(Some(value)))
        .ok_or_else(|| missing(StageType::Filter, field("value")))?;

    Ok(format!("{column} {operator} {}", render_literal(value)))
}

fn compile_group(group: &GroupStage, default_input: Option<&str>) -> Result<String> {
    let table = source_table(StageType::Group, group.table.as_deref(), default_input)?;
    if group.group_by.is_empty() {
        return Err(missing(StageType::Group, "groupBy"));
    }

    let keys = group.group_by.join(", ");
    let projection = std::iter::once(keys.clone())
        .chain(group.aggregations.iter().map(render_aggregation))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!("SELECT {projection} FROM {table} GROUP BY {keys}"))
}

fn compile_select(select: &SelectStage, default_input: Option<&str>) -> Result<String> {
    let table = source_table(StageType::Select, select.table.as_deref(), default_input)?;
    if select.columns.is_empty() {
        return Err(missing(StageType::Select, "columns"));
    }

    Ok(format!("SELECT {} FROM {table}", select.columns.join(", ")))
}

fn compile_sort(sort: &SortStage, default_input: Option<&str>) -> Result<String> {
    let table = source_table(StageType::Sort, sort.table.as_deref(), default_input)?;
    if sort.order_by.is_empty() {
        return Err(missing(StageType::Sort, "orderBy"));
    }

    let order = sort
        .order_by
        .iter()
        .map(|key| format!("{} {}", key.column, key.direction.keyword()))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!("SELECT * FROM {table} ORDER BY {order}"))
}

fn compile_aggregate(aggregate: &AggregateStage, default_input: Option<&str>) -> Result<String> {
    let table = source_table(StageType::Aggregate, aggregate.table.as_deref(), default_input)?;
    if aggregate.aggregations.is_empty() {
        return Err(missing(StageType::Aggregate, "aggregations"));
    }

    let projection = aggregate
        .aggregations
        .iter()
        .map(render_aggregation)
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!("SELECT {projection} FROM {table}"))
}

fn render_aggregation(aggregation: &Aggregation) -> String {
    let call = format!(
        "{}({})",
        aggregation.function.to_uppercase(),
        aggregation.column
    );

    match aggregation.alias.as_deref() {
        Some(alias) if !alias.is_empty() => format!("{call} AS {alias}"),
        _ => call,
    }
}

/// Render a filter value: numbers and booleans verbatim, everything else as a quoted string
pub fn render_literal(value: &Value) -> String {
    match value {
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::String(text) => quote(text),
        other => quote(&other.to_string()),
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn source_table<'a>(
    stage_type: StageType,
    explicit: Option<&'a str>,
    default_input: Option<&'a str>,
) -> Result<&'a str> {
    explicit
        .filter(|table| !table.trim().is_empty())
        .or(default_input)
        .ok_or_else(|| missing(stage_type, "table"))
}

fn required<'a>(
    stage_type: StageType,
    field: &'static str,
    value: &'a Option<String>,
) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| missing(stage_type, field))
}

fn missing(stage_type: StageType, field: impl Into<String>) -> CompileError {
    CompileError::MissingField {
        stage_type,
        field: field.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;
    use sluice_schemas::*;

    use crate::validation::is_valid;

    fn join(left_key: &str, right_key: &str, join_type: Option<JoinType>) -> StageKind {
        StageKind::Join(JoinStage {
            left_table: Some("customers".to_string()),
            right_table: Some("orders".to_string()),
            left_key: Some(left_key.to_string()),
            right_key: Some(right_key.to_string()),
            join_type,
        })
    }

    fn union(tables: &[&str], union_type: Option<UnionType>) -> StageKind {
        StageKind::Union(UnionStage {
            tables: tables.iter().map(|t| t.to_string()).collect(),
            union_type,
        })
    }

    #[test]
    fn table_name_is_position_and_lowercased_type() {
        assert_eq!(table_name_for(2, StageType::Join), "result_stage_2_join");
        assert_eq!(
            table_name_for(0, StageType::Aggregate),
            "result_stage_0_aggregate"
        );
    }

    #[test]
    fn join_on_shared_key_uses_using_and_excludes_right_key() {
        let sql = compile(&join("id", "id", None), None).unwrap();

        assert_eq!(
            sql,
            "SELECT l.*, r.* EXCLUDE (id) FROM customers AS l INNER JOIN orders AS r USING (id)"
        );
    }

    #[test]
    fn join_on_different_keys_aliases_both_sides() {
        let sql = compile(&join("cust_id", "id", Some(JoinType::Left)), None).unwrap();

        assert!(sql.contains("ON l.cust_id = r.id"), "{sql}");
        assert!(sql.contains("customers AS l LEFT JOIN orders AS r"), "{sql}");
        assert!(sql.starts_with("SELECT l.*, r.* FROM"), "{sql}");
    }

    #[rstest]
    #[case(JoinType::Inner, "INNER JOIN")]
    #[case(JoinType::Left, "LEFT JOIN")]
    #[case(JoinType::Right, "RIGHT JOIN")]
    #[case(JoinType::FullOuter, "FULL OUTER JOIN")]
    fn join_keyword_follows_join_type(#[case] join_type: JoinType, #[case] keyword: &str) {
        let sql = compile(&join("id", "id", Some(join_type)), None).unwrap();
        assert!(sql.contains(keyword), "{sql}");
    }

    #[test]
    fn union_requires_two_tables() {
        assert_eq!(
            compile(&union(&["a"], None), None),
            Err(CompileError::UnionArity(1))
        );
    }

    #[rstest]
    #[case(&["a", "b"], None, "UNION")]
    #[case(&["a", "b", "c"], None, "UNION")]
    #[case(&["a", "b", "c", "d"], Some(UnionType::UnionAll), "UNION ALL")]
    fn union_emits_one_keyword_between_tables(
        #[case] tables: &[&str],
        #[case] union_type: Option<UnionType>,
        #[case] keyword: &str,
    ) {
        let sql = compile(&union(tables, union_type), None).unwrap();

        assert_eq!(
            sql.matches(" UNION ").count() + sql.matches(" UNION ALL ").count(),
            tables.len() - 1
        );
        assert_eq!(sql.matches(keyword).count(), tables.len() - 1);
        assert!(sql.starts_with("SELECT * FROM a "), "{sql}");
    }

    #[test]
    fn filter_quotes_strings_and_keeps_numbers() {
        let stage = |value| {
            StageKind::Filter(FilterStage {
                table: Some("orders".to_string()),
                column: Some("amount".to_string()),
                operator: Some(">".to_string()),
                value: Some(value),
                conditions: None,
            })
        };

        assert_eq!(
            compile(&stage(json!("100")), None).unwrap(),
            "SELECT * FROM orders WHERE amount > '100'"
        );
        assert_eq!(
            compile(&stage(json!(100)), None).unwrap(),
            "SELECT * FROM orders WHERE amount > 100"
        );
        assert_eq!(
            compile(&stage(json!(true)), None).unwrap(),
            "SELECT * FROM orders WHERE amount > true"
        );
        assert_eq!(
            compile(&stage(json!("O'Brien")), None).unwrap(),
            "SELECT * FROM orders WHERE amount > 'O''Brien'"
        );
    }

    #[test]
    fn filter_conditions_chain_in_order() {
        let stage = StageKind::Filter(FilterStage {
            table: Some("orders".to_string()),
            column: Some("ignored".to_string()),
            operator: Some("=".to_string()),
            value: Some(json!("ignored")),
            conditions: Some(vec![
                FilterCondition {
                    column: Some("amount".to_string()),
                    operator: Some(">=".to_string()),
                    value: Some(json!(10)),
                    logic: Some(Logic::Or),
                },
                FilterCondition {
                    column: Some("status".to_string()),
                    operator: Some("=".to_string()),
                    value: Some(json!("open")),
                    logic: None,
                },
                FilterCondition {
                    column: Some("region".to_string()),
                    operator: Some("<>".to_string()),
                    value: Some(json!("EU")),
                    logic: Some(Logic::Or),
                },
            ]),
        });

        assert_eq!(
            compile(&stage, None).unwrap(),
            "SELECT * FROM orders WHERE amount >= 10 AND status = 'open' OR region <> 'EU'"
        );
    }

    #[test]
    fn empty_condition_value_is_missing() {
        let stage = StageKind::Filter(FilterStage {
            table: Some("orders".to_string()),
            conditions: Some(vec![FilterCondition {
                column: Some("amount".to_string()),
                operator: Some("=".to_string()),
                value: Some(json!("")),
                logic: None,
            }]),
            ..Default::default()
        });

        assert_eq!(
            compile(&stage, None),
            Err(CompileError::MissingField {
                stage_type: StageType::Filter,
                field: "conditions[0].value".to_string(),
            })
        );
    }

    #[test]
    fn implicit_input_is_used_without_explicit_table() {
        let stage = StageKind::Select(SelectStage {
            table: None,
            columns: vec!["a".to_string(), "b".to_string()],
        });

        assert_eq!(
            compile(&stage, Some("result_stage_1_filter")).unwrap(),
            "SELECT a, b FROM result_stage_1_filter"
        );
        assert_eq!(
            compile(&stage, None),
            Err(CompileError::MissingField {
                stage_type: StageType::Select,
                field: "table".to_string(),
            })
        );
    }

    #[test]
    fn explicit_table_wins_over_default_input() {
        let stage = StageKind::Sort(SortStage {
            table: Some("orders".to_string()),
            order_by: vec![
                SortKey::new("amount".to_string(), SortDirection::Desc),
                SortKey::new("order_id".to_string(), SortDirection::Asc),
            ],
        });

        assert_eq!(
            compile(&stage, Some("other")).unwrap(),
            "SELECT * FROM orders ORDER BY amount DESC, order_id ASC"
        );
    }

    #[test]
    fn group_and_aggregate_render_aggregations() {
        let aggregations = vec![
            Aggregation::new("sum".to_string(), "amount".to_string(), Some("total".to_string())),
            Aggregation::new("COUNT".to_string(), "*".to_string(), None),
        ];

        let group = StageKind::Group(GroupStage {
            table: None,
            group_by: vec!["customer_id".to_string()],
            aggregations: aggregations.clone(),
        });
        assert_eq!(
            compile(&group, Some("orders")).unwrap(),
            "SELECT customer_id, SUM(amount) AS total, COUNT(*) FROM orders GROUP BY customer_id"
        );

        let aggregate = StageKind::Aggregate(AggregateStage {
            table: Some("orders".to_string()),
            aggregations,
        });
        let sql = compile(&aggregate, None).unwrap();
        assert_eq!(sql, "SELECT SUM(amount) AS total, COUNT(*) FROM orders");
        assert!(!sql.contains("GROUP BY"));
    }

    #[test]
    fn custom_sql_passes_through_verbatim() {
        let sql = "select  weird ,stuff from   t -- keep me";
        let stage = StageKind::Custom(CustomStage {
            sql: Some(sql.to_string()),
        });

        assert_eq!(compile(&stage, Some("ignored")).unwrap(), sql);
    }

    #[test]
    fn compile_is_deterministic() {
        let stage = join("cust_id", "id", Some(JoinType::FullOuter));
        let first = compile(&stage, Some("x")).unwrap();

        for _ in 0..10 {
            assert_eq!(compile(&stage, Some("x")).unwrap(), first);
        }
    }

    #[test]
    fn missing_field_is_named() {
        let stage = StageKind::Join(JoinStage {
            left_table: Some("a".to_string()),
            ..Default::default()
        });

        assert_eq!(
            compile(&stage, None).unwrap_err().to_string(),
            "Cannot compile JOIN stage: 'rightTable' is missing"
        );
    }

    fn sample(stage_type: StageType) -> StageKind {
        let table = Some("t".to_string());
        match stage_type {
            StageType::Load => StageKind::Load(LoadStage::new(table)),
            StageType::Join => join("id", "id", None),
            StageType::Union => union(&["a", "b"], None),
            StageType::Filter => StageKind::Filter(FilterStage {
                table,
                column: Some("c".to_string()),
                operator: Some("=".to_string()),
                value: Some(json!(1)),
                conditions: None,
            }),
            StageType::Group => StageKind::Group(GroupStage {
                table,
                group_by: vec!["c".to_string()],
                aggregations: vec![],
            }),
            StageType::Select => StageKind::Select(SelectStage {
                table,
                columns: vec!["c".to_string()],
            }),
            StageType::Sort => StageKind::Sort(SortStage {
                table,
                order_by: vec![SortKey::new("c".to_string(), SortDirection::Asc)],
            }),
            StageType::Aggregate => StageKind::Aggregate(AggregateStage {
                table,
                aggregations: vec![Aggregation::new("count".to_string(), "*".to_string(), None)],
            }),
            StageType::Custom => StageKind::Custom(CustomStage {
                sql: Some("SELECT 1".to_string()),
            }),
        }
    }

    #[test]
    fn every_stage_type_has_a_validator_and_compiler_arm() {
        for stage_type in StageType::ALL {
            let stage = sample(stage_type);
            assert_eq!(stage.stage_type(), stage_type);
            assert!(is_valid(&stage), "{stage_type} sample should validate");

            match stage_type {
                StageType::Load => assert_eq!(compile(&stage, None), Err(CompileError::LoadStage)),
                _ => assert!(compile(&stage, None).is_ok(), "{stage_type} should compile"),
            }
        }
    }
}
