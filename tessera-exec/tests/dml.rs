mod common;

use common::*;
use serde_json::json;
use tessera_datatype::Value;
use tessera_exec::context::Partitioner;
use tessera_exec::{Engine, EngineConfig};
use tessera_storage::error::ConstraintKind;

const UPDATE_QTY: i64 = 1;
const DELETE_BY_ID: i64 = 2;
const TRUNCATE: i64 = 3;

/// Index scan of ITEMS by primary key, projected to given columns.
fn pk_lookup(id: i32, columns: Vec<serde_json::Value>) -> serde_json::Value {
    json!({
        "ID": id,
        "PLAN_NODE_TYPE": "INDEXSCAN",
        "TARGET_TABLE_NAME": "ITEMS",
        "TARGET_INDEX_NAME": "PK_ITEMS",
        "LOOKUP_TYPE": "EQ",
        "SEARCHKEY_EXPRESSIONS": [param(0, "INTEGER")],
        "INLINE_NODES": [{"ID": id + 100, "PLAN_NODE_TYPE": "PROJECTION", "OUTPUT_SCHEMA": columns}]
    })
}

fn load_modifiers(engine: &mut Engine) {
    load(
        engine,
        UPDATE_QTY,
        vec![
            json!({"ID": 1, "PLAN_NODE_TYPE": "UPDATE", "TARGET_TABLE_NAME": "ITEMS", "CHILDREN_IDS": [2]}),
            pk_lookup(
                2,
                vec![out("tuple_address", address()), out("QTY", param(1, "INTEGER"))],
            ),
        ],
    );
    load(
        engine,
        DELETE_BY_ID,
        vec![
            json!({"ID": 1, "PLAN_NODE_TYPE": "DELETE", "TARGET_TABLE_NAME": "ITEMS", "CHILDREN_IDS": [2]}),
            pk_lookup(2, vec![out("tuple_address", address())]),
        ],
    );
    load(
        engine,
        TRUNCATE,
        vec![json!({"ID": 1, "PLAN_NODE_TYPE": "DELETE", "TARGET_TABLE_NAME": "ITEMS", "TRUNCATE": true})],
    );
}

fn qty_of(engine: &mut Engine, id: i32) -> Value {
    scan_all(engine, "ITEMS")
        .rows
        .into_iter()
        .find(|r| r[0] == Value::Integer(id))
        .map(|r| r[2].clone())
        .unwrap()
}

#[test]
fn test_update_undo() {
    let (mut engine, _) = engine();
    items(&mut engine);
    load_modifiers(&mut engine);

    engine.set_undo_token(1);
    let rs = engine
        .execute_fragment(UPDATE_QTY, &[Value::Integer(1), Value::Integer(99)])
        .unwrap();
    assert_eq!(rs.columns, vec!["modified_tuples"]);
    assert_eq!(rs.rows, ints(&[&[1]]));
    assert_eq!(engine.tuples_modified(), 1);
    assert_eq!(qty_of(&mut engine, 1), Value::Integer(99));

    engine.undo_undo_token(1);
    assert_eq!(qty_of(&mut engine, 1), Value::Integer(10));

    engine.set_undo_token(2);
    let rs = engine
        .execute_fragment(UPDATE_QTY, &[Value::Integer(4), Value::Integer(7)])
        .unwrap();
    assert_eq!(rs.rows, ints(&[&[1]]));
    engine.release_undo_token(2);
    assert_eq!(qty_of(&mut engine, 4), Value::Integer(7));

    // no matching row, nothing modified
    let rs = engine
        .execute_fragment(UPDATE_QTY, &[Value::Integer(42), Value::Integer(1)])
        .unwrap();
    assert_eq!(rs.rows, ints(&[&[0]]));
    assert_eq!(engine.tuples_modified(), 0);
}

#[test]
fn test_delete_release() {
    let (mut engine, _) = engine();
    items(&mut engine);
    load_modifiers(&mut engine);

    engine.set_undo_token(1);
    let rs = engine
        .execute_fragment(DELETE_BY_ID, &[Value::Integer(2)])
        .unwrap();
    assert_eq!(rs.rows, ints(&[&[1]]));
    assert_eq!(scan_all(&mut engine, "ITEMS").rows.len(), 4);
    engine.release_undo_token(1);
    // released token can no longer be undone
    engine.undo_undo_token(1);
    assert_eq!(scan_all(&mut engine, "ITEMS").rows.len(), 4);

    engine.set_undo_token(2);
    engine
        .execute_fragment(DELETE_BY_ID, &[Value::Integer(3)])
        .unwrap();
    engine.set_undo_token(3);
    engine
        .execute_fragment(DELETE_BY_ID, &[Value::Integer(4)])
        .unwrap();
    assert_eq!(scan_all(&mut engine, "ITEMS").rows.len(), 2);
    // undo reverts given token and all later ones
    engine.undo_undo_token(2);
    let ids: Vec<Value> = sorted(scan_all(&mut engine, "ITEMS").rows)
        .into_iter()
        .map(|r| r[0].clone())
        .collect();
    assert_eq!(
        ids,
        vec![
            Value::Integer(1),
            Value::Integer(3),
            Value::Integer(4),
            Value::Integer(5)
        ]
    );
}

#[test]
fn test_truncate() {
    let (mut engine, _) = engine();
    items(&mut engine);
    load_modifiers(&mut engine);

    engine.set_undo_token(1);
    let rs = engine.execute_fragment(TRUNCATE, &[]).unwrap();
    assert_eq!(rs.rows, ints(&[&[5]]));
    assert!(scan_all(&mut engine, "ITEMS").rows.is_empty());
    engine.undo_undo_token(1);
    assert_eq!(scan_all(&mut engine, "ITEMS").rows.len(), 5);

    engine.set_undo_token(2);
    engine.execute_fragment(TRUNCATE, &[]).unwrap();
    engine.release_undo_token(2);
    assert!(scan_all(&mut engine, "ITEMS").rows.is_empty());
    // table is usable after truncate
    insert_rows(
        &mut engine,
        "ITEMS",
        &["INTEGER", "INTEGER", "INTEGER", "VARCHAR"],
        vec![vec![
            Value::Integer(1),
            Value::Integer(1),
            Value::Null,
            Value::varchar("z"),
        ]],
    );
    assert_eq!(scan_all(&mut engine, "ITEMS").rows.len(), 1);
}

#[test]
fn test_insert_constraints() {
    let (mut engine, _) = engine();
    items(&mut engine);
    // fragment loaded by items()
    let insert = 9000 + "ITEMS".len() as i64;
    let row = |id: Value| vec![id, Value::Integer(9), Value::Null, Value::varchar("x")];

    let err = engine
        .execute_fragment(insert, &row(Value::Integer(1)))
        .unwrap_err();
    assert_eq!(err.constraint_kind(), Some(ConstraintKind::Unique));
    let err = engine.execute_fragment(insert, &row(Value::Null)).unwrap_err();
    assert_eq!(err.constraint_kind(), Some(ConstraintKind::NotNull));
    assert_eq!(scan_all(&mut engine, "ITEMS").rows.len(), 5);

    // failed statement leaves earlier rows of the batch for the host to undo
    engine.set_undo_token(1);
    let mut params = row(Value::Integer(6));
    params.extend(row(Value::Integer(6)));
    let err = engine.execute_fragment(insert, &params).unwrap_err();
    assert_eq!(err.constraint_kind(), Some(ConstraintKind::Unique));
    assert_eq!(scan_all(&mut engine, "ITEMS").rows.len(), 6);
    engine.undo_undo_token(1);
    assert_eq!(scan_all(&mut engine, "ITEMS").rows.len(), 5);
}

#[test]
fn test_tuple_limit() {
    let (mut engine, _) = engine();
    create_table(
        &mut engine,
        json!({
            "name": "L",
            "columns": [{"name": "V", "type": "BIGINT"}],
            "tuple_limit": 2
        }),
    );
    insert_rows(&mut engine, "L", &["BIGINT"], ints(&[&[1], &[2]]));
    let err = engine
        .execute_fragment(9000 + 1, &[Value::BigInt(3)])
        .unwrap_err();
    assert_eq!(err.constraint_kind(), Some(ConstraintKind::RowLimit));
}

fn partitioned() -> (Engine, Partitioner) {
    let config = EngineConfig {
        partition_id: 0,
        partition_count: 2,
        ..EngineConfig::default()
    };
    let (mut engine, _) = engine_with(config);
    create_table(
        &mut engine,
        json!({
            "name": "P",
            "columns": [
                {"name": "K", "type": "BIGINT", "allow_null": false},
                {"name": "V", "type": "BIGINT"}
            ],
            "partition_column": "K"
        }),
    );
    (engine, Partitioner::new(0, 2))
}

#[test]
fn test_mispartitioned_insert() {
    let (mut engine, p) = partitioned();
    let local: Vec<i64> = (0..20).filter(|k| p.is_local(&Value::BigInt(*k))).collect();
    let remote: Vec<i64> = (0..20).filter(|k| !p.is_local(&Value::BigInt(*k))).collect();
    assert!(!local.is_empty() && !remote.is_empty());

    insert_rows(
        &mut engine,
        "P",
        &["BIGINT", "BIGINT"],
        vec![vec![Value::BigInt(local[0]), Value::BigInt(0)]],
    );
    let err = engine
        .execute_fragment(9000 + 1, &[Value::BigInt(remote[0]), Value::BigInt(0)])
        .unwrap_err();
    assert_eq!(err.constraint_kind(), Some(ConstraintKind::Partitioning));

    // multi-partition insert keeps local rows only
    load(
        &mut engine,
        1,
        vec![
            json!({"ID": 1, "PLAN_NODE_TYPE": "INSERT", "TARGET_TABLE_NAME": "P", "MULTI_PARTITION": true, "CHILDREN_IDS": [2]}),
            json!({
                "ID": 2,
                "PLAN_NODE_TYPE": "MATERIALIZE",
                "BATCHED": true,
                "OUTPUT_SCHEMA": [out("K", param(0, "BIGINT")), out("V", param(1, "BIGINT"))]
            }),
        ],
    );
    let params: Vec<Value> = (100..120).flat_map(|k| [Value::BigInt(k), Value::BigInt(k)]).collect();
    let expected = (100..120).filter(|k| p.is_local(&Value::BigInt(*k))).count() as i64;
    let rs = engine.execute_fragment(1, &params).unwrap();
    assert_eq!(rs.rows, ints(&[&[expected]]));
    assert_eq!(scan_all(&mut engine, "P").rows.len() as i64, expected + 1);
}

#[test]
fn test_update_partition_column() {
    let (mut engine, p) = partitioned();
    let local = (0..20).find(|k| p.is_local(&Value::BigInt(*k))).unwrap();
    let remote = (0..20).find(|k| !p.is_local(&Value::BigInt(*k))).unwrap();
    insert_rows(
        &mut engine,
        "P",
        &["BIGINT", "BIGINT"],
        vec![vec![Value::BigInt(local), Value::BigInt(1)]],
    );
    load(
        &mut engine,
        1,
        vec![
            json!({"ID": 1, "PLAN_NODE_TYPE": "UPDATE", "TARGET_TABLE_NAME": "P", "CHILDREN_IDS": [2]}),
            json!({
                "ID": 2,
                "PLAN_NODE_TYPE": "SEQSCAN",
                "TARGET_TABLE_NAME": "P",
                "INLINE_NODES": [{
                    "ID": 3,
                    "PLAN_NODE_TYPE": "PROJECTION",
                    "OUTPUT_SCHEMA": [out("tuple_address", address()), out("K", param(0, "BIGINT"))]
                }]
            }),
        ],
    );
    let err = engine
        .execute_fragment(1, &[Value::BigInt(remote)])
        .unwrap_err();
    assert_eq!(err.constraint_kind(), Some(ConstraintKind::Partitioning));
    let rs = engine.execute_fragment(1, &[Value::BigInt(local)]).unwrap();
    assert_eq!(rs.rows, ints(&[&[1]]));
}
