//! Common test utilities for sluice core testing.
//!
//! Sample tables, stage builders and a progress tracker that records what it sees.

#![allow(dead_code)]

use std::sync::Mutex;

use serde_json::{json, Value};
use sluice_core::progress_tracker::ProgressTracker;
use sluice_schemas::*;

/// customer_id, name
pub fn customers() -> TableDefinition {
    table(json!({
        "name": "customers",
        "columns": [{ "name": "customer_id", "type": "INTEGER" }, "name"],
        "rows": [[1, "Ada"], [2, "Grace"], [3, "Barbara"]]
    }))
}

/// order_id, customer_id, amount; amounts all have three digits
pub fn orders() -> TableDefinition {
    table(json!({
        "name": "orders",
        "columns": [
            { "name": "order_id", "type": "INTEGER" },
            { "name": "customer_id", "type": "INTEGER" },
            { "name": "amount", "type": "INTEGER" }
        ],
        "rows": [
            [10, 1, 100],
            [11, 1, 150],
            [12, 2, 300],
            [13, 3, 450]
        ]
    }))
}

fn table(value: Value) -> TableDefinition {
    serde_json::from_value(value).expect("valid table definition")
}

pub fn load(id: &str, table: &str) -> Stage {
    Stage::new(id, StageKind::Load(LoadStage::new(Some(table.to_string()))))
}

pub fn join(id: &str, left: &str, right: &str, key: &str) -> Stage {
    Stage::new(
        id,
        StageKind::Join(JoinStage {
            left_table: Some(left.to_string()),
            right_table: Some(right.to_string()),
            left_key: Some(key.to_string()),
            right_key: Some(key.to_string()),
            join_type: None,
        }),
    )
}

pub fn filter(id: &str, table: Option<&str>, column: &str, operator: &str, value: Value) -> Stage {
    Stage::new(
        id,
        StageKind::Filter(FilterStage {
            table: table.map(str::to_string),
            column: Some(column.to_string()),
            operator: Some(operator.to_string()),
            value: Some(value),
            conditions: None,
        }),
    )
}

pub fn select(id: &str, table: Option<&str>, columns: &[&str]) -> Stage {
    Stage::new(
        id,
        StageKind::Select(SelectStage {
            table: table.map(str::to_string),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }),
    )
}

pub fn custom(id: &str, sql: &str) -> Stage {
    Stage::new(
        id,
        StageKind::Custom(CustomStage {
            sql: Some(sql.to_string()),
        }),
    )
}

pub fn column_names(table: &sluice_core::catalogue::Table) -> Vec<&str> {
    table.columns.iter().map(|c| c.name.as_str()).collect()
}

/// Keeps every progress event and the names of the tables it was shown
#[derive(Debug, Default)]
pub struct RecordingTracker {
    pub events: Mutex<Vec<ProgressEvent>>,
    pub outputs: Mutex<Vec<String>>,
}

impl ProgressTracker for RecordingTracker {
    fn on_progress(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn on_output(&self, table_name: &str, _columns: &[Column], _rows: &[Row]) {
        self.outputs.lock().unwrap().push(table_name.to_string());
    }
}
