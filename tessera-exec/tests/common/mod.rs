#![allow(dead_code)]

use serde_json::{json, Value as Json};
use std::sync::Arc;
use tessera_datatype::Value;
use tessera_exec::topend::LocalTopend;
use tessera_exec::{Engine, EngineConfig};
use tessera_storage::catalog::TableDef;
use tessera_storage::table::RowSet;

pub fn engine() -> (Engine, Arc<LocalTopend>) {
    engine_with(EngineConfig::default())
}

pub fn engine_with(config: EngineConfig) -> (Engine, Arc<LocalTopend>) {
    let topend = Arc::new(LocalTopend::new());
    let engine = Engine::new(config, Box::new(topend.clone())).unwrap();
    (engine, topend)
}

pub fn create_table(engine: &mut Engine, def: Json) {
    let def: TableDef = serde_json::from_value(def).unwrap();
    engine.create_table(&def).unwrap();
}

pub fn col(idx: usize, ty: &str) -> Json {
    json!({"TYPE": "VALUE_TUPLE", "VALUE_TYPE": ty, "COLUMN_IDX": idx})
}

pub fn inner_col(idx: usize, ty: &str) -> Json {
    json!({"TYPE": "VALUE_TUPLE", "VALUE_TYPE": ty, "COLUMN_IDX": idx, "TABLE_IDX": 1})
}

pub fn param(idx: usize, ty: &str) -> Json {
    json!({"TYPE": "VALUE_PARAMETER", "VALUE_TYPE": ty, "PARAM_IDX": idx})
}

pub fn constant(v: i64, ty: &str) -> Json {
    json!({"TYPE": "VALUE_CONSTANT", "VALUE_TYPE": ty, "VALUE": v})
}

pub fn address() -> Json {
    json!({"TYPE": "VALUE_TUPLE_ADDRESS"})
}

pub fn cmp(op: &str, l: Json, r: Json) -> Json {
    json!({"TYPE": format!("COMPARE_{}", op), "LEFT": l, "RIGHT": r})
}

pub fn and(l: Json, r: Json) -> Json {
    json!({"TYPE": "CONJUNCTION_AND", "LEFT": l, "RIGHT": r})
}

pub fn out(name: &str, expr: Json) -> Json {
    json!({"COLUMN_NAME": name, "EXPRESSION": expr})
}

/// Loads a fragment of given nodes, root first.
pub fn load(engine: &mut Engine, id: i64, nodes: Vec<Json>) {
    let doc = json!({ "PLAN_NODES": nodes });
    engine.load_fragment(id, &doc.to_string()).unwrap();
}

/// Inserts rows into a table through a batched materialize fragment.
pub fn insert_rows(engine: &mut Engine, table: &str, types: &[&str], rows: Vec<Vec<Value>>) {
    let fragment_id = 9000 + table.len() as i64;
    if !engine.is_loaded(fragment_id) {
        let columns: Vec<Json> = types
            .iter()
            .enumerate()
            .map(|(i, ty)| out(&format!("C{}", i), param(i, ty)))
            .collect();
        load(
            engine,
            fragment_id,
            vec![
                json!({"ID": 1, "PLAN_NODE_TYPE": "INSERT", "CHILDREN_IDS": [2], "TARGET_TABLE_NAME": table}),
                json!({"ID": 2, "PLAN_NODE_TYPE": "MATERIALIZE", "BATCHED": true, "OUTPUT_SCHEMA": columns}),
            ],
        );
    }
    let n = rows.len() as i64;
    let params: Vec<Value> = rows.into_iter().flatten().collect();
    let res = engine.execute_fragment(fragment_id, &params).unwrap();
    assert_eq!(res.rows, vec![vec![Value::BigInt(n)]]);
}

/// Loads and runs a sequential scan of the whole table.
pub fn scan_all(engine: &mut Engine, table: &str) -> RowSet {
    let fragment_id = 8000 + table.len() as i64;
    if !engine.is_loaded(fragment_id) {
        load(
            engine,
            fragment_id,
            vec![json!({"ID": 1, "PLAN_NODE_TYPE": "SEQSCAN", "TARGET_TABLE_NAME": table})],
        );
    }
    engine.execute_fragment(fragment_id, &[]).unwrap()
}

pub fn ints(rows: &[&[i64]]) -> Vec<Vec<Value>> {
    rows.iter()
        .map(|r| r.iter().map(|v| Value::BigInt(*v)).collect())
        .collect()
}

pub fn sorted(mut rows: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
    rows.sort();
    rows
}

/// Table ITEMS(ID INTEGER PK, GRP INTEGER, QTY INTEGER NULL, NAME VARCHAR)
/// with a tree index on GRP.
pub fn items(engine: &mut Engine) {
    create_table(
        engine,
        json!({
            "name": "ITEMS",
            "columns": [
                {"name": "ID", "type": "INTEGER", "allow_null": false},
                {"name": "GRP", "type": "INTEGER"},
                {"name": "QTY", "type": "INTEGER"},
                {"name": "NAME", "type": "VARCHAR", "length": 32}
            ],
            "indexes": [
                {"name": "PK_ITEMS", "type": "BALANCED_TREE", "unique": true, "columns": ["ID"]},
                {"name": "IDX_GRP", "type": "BALANCED_TREE", "columns": ["GRP"]}
            ],
            "primary_key": "PK_ITEMS"
        }),
    );
    let rows = vec![
        (1, 1, Some(10), "a"),
        (2, 1, Some(20), "b"),
        (3, 2, Some(5), "c"),
        (4, 2, None, "d"),
        (5, 3, Some(5), "e"),
    ];
    insert_rows(
        engine,
        "ITEMS",
        &["INTEGER", "INTEGER", "INTEGER", "VARCHAR"],
        rows.into_iter()
            .map(|(id, grp, qty, name)| {
                vec![
                    Value::Integer(id),
                    Value::Integer(grp),
                    qty.map(Value::Integer).unwrap_or(Value::Null),
                    Value::varchar(name),
                ]
            })
            .collect(),
    );
}
