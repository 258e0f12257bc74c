//! Integration tests for sluice schemas
//!
//! Covers the wire shape of stages and flows, defaults and the export format.

use rstest::rstest;
use sluice_schemas::*;

#[test]
fn test_flow_version_default() {
    let flow: Flow = serde_json::from_str(r#"{ "stages": [] }"#).unwrap();

    assert_eq!(flow.version, "v1");
    assert!(flow.tables.is_empty());
}

#[test]
fn test_flow_from_yaml() {
    let yaml = r#"
tables:
  - name: customers
    columns:
      - { name: customer_id, type: INTEGER }
      - name
    rows:
      - [1, Ada]
      - [2, Grace]
stages:
  - id: load
    type: LOAD
    data:
      tableName: customers
  - id: sorted
    type: SORT
    description: by name
    data:
      table: customers
      orderBy:
        - name
        - { column: customer_id, direction: DESC }
"#;

    let flow: Flow = serde_yml::from_str(yaml).unwrap();

    assert_eq!(flow.tables[0].rows.len(), 2);
    assert_eq!(flow.tables[0].rows[1]["name"], "Grace");

    let StageKind::Sort(sort) = &flow.stages[1].kind else {
        panic!("expected a sort stage");
    };
    assert_eq!(
        sort.order_by,
        vec![
            SortKey::new("name".to_string(), SortDirection::Asc),
            SortKey::new("customer_id".to_string(), SortDirection::Desc),
        ]
    );
    assert_eq!(flow.stages[1].description, "by name");
}

#[test]
fn test_positional_row_longer_than_columns_is_rejected() {
    let result = serde_json::from_str::<TableDefinition>(
        r#"{ "name": "t", "columns": ["a"], "rows": [[1, 2]] }"#,
    );

    assert!(result.is_err());
}

#[test]
fn test_export_renumbers_ids_and_keeps_payloads() {
    let stages = vec![
        Stage::new(
            "b7c1",
            StageKind::Load(LoadStage::new(Some("orders".to_string()))),
        ),
        Stage::new(
            "x-99",
            StageKind::Custom(CustomStage {
                sql: Some("SELECT 1".to_string()),
            }),
        )
        .with_description("constant"),
    ];

    let exported = export_stages(&stages);

    assert_eq!(exported[0].id, "stage_1");
    assert_eq!(exported[1].id, "stage_2");
    assert_eq!(exported[1].description, "constant");
    assert_eq!(exported[1].kind, stages[1].kind);

    let json = serde_json::to_value(&exported).unwrap();
    assert_eq!(json[0]["type"], "LOAD");
    assert_eq!(json[0]["data"]["tableName"], "orders");
}

#[test]
fn test_flow_export_is_stable() {
    let flow = Flow::builder()
        .stages(vec![Stage::new(
            "random",
            StageKind::Select(SelectStage {
                table: Some("t".to_string()),
                columns: vec!["a".to_string()],
            }),
        )])
        .build();

    let first = flow.export().to_json_pretty().unwrap();
    let second = flow.export().export().to_json_pretty().unwrap();

    assert_eq!(first, second);
}

#[rstest]
#[case("LOAD", StageType::Load)]
#[case("join", StageType::Join)]
#[case("UNION", StageType::Union)]
#[case("filter", StageType::Filter)]
#[case("GROUP", StageType::Group)]
#[case("SELECT", StageType::Select)]
#[case("SORT", StageType::Sort)]
#[case("AGGREGATE", StageType::Aggregate)]
#[case("custom", StageType::Custom)]
fn test_stage_type_tags(#[case] tag: &str, #[case] expected: StageType) {
    let json = format!(r#"{{ "id": "s", "type": "{tag}", "data": {{}} }}"#);
    let stage: Stage = serde_json::from_str(&json).unwrap();

    assert_eq!(stage.stage_type(), expected);
    assert_eq!(
        serde_json::to_value(&stage).unwrap()["type"],
        expected.as_str()
    );
}

#[test]
fn test_progress_event_tagging() {
    let event = ProgressEvent::StageStarted {
        id: "s1".to_string(),
        position: 2,
        stage_type: StageType::Filter,
    };

    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "stage_started");
    assert_eq!(json["stage_type"], "FILTER");
}
