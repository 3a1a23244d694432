mod common;

use common::*;
use serde_json::json;
use tessera_datatype::Value;

#[test]
fn test_seq_scan() {
    let (mut engine, _) = engine();
    items(&mut engine);
    let rs = scan_all(&mut engine, "ITEMS");
    assert_eq!(rs.columns, vec!["ID", "GRP", "QTY", "NAME"]);
    assert_eq!(rs.rows.len(), 5);
    assert_eq!(rs.rows[3][2], Value::Null);

    // GRP >= ? projected to ID, skipping one row and keeping two
    load(
        &mut engine,
        1,
        vec![json!({
            "ID": 1,
            "PLAN_NODE_TYPE": "SEQSCAN",
            "TARGET_TABLE_NAME": "ITEMS",
            "PREDICATE": cmp("GREATERTHANOREQUALTO", col(1, "INTEGER"), param(0, "INTEGER")),
            "INLINE_NODES": [
                {"ID": 2, "PLAN_NODE_TYPE": "PROJECTION", "OUTPUT_SCHEMA": [out("ID", col(0, "INTEGER"))]},
                {"ID": 3, "PLAN_NODE_TYPE": "LIMIT", "LIMIT": 2, "OFFSET": 1}
            ]
        })],
    );
    let rs = engine
        .execute_fragment(1, &[Value::Integer(2)])
        .unwrap();
    assert_eq!(rs.columns, vec!["ID"]);
    assert_eq!(rs.rows, ints(&[&[4], &[5]]));
    let rs = engine.execute_fragment(1, &[Value::Integer(1)]).unwrap();
    assert_eq!(rs.rows, ints(&[&[2], &[3]]));
}

#[test]
fn test_index_scan() {
    let (mut engine, _) = engine();
    items(&mut engine);
    load(
        &mut engine,
        1,
        vec![json!({
            "ID": 1,
            "PLAN_NODE_TYPE": "INDEXSCAN",
            "TARGET_TABLE_NAME": "ITEMS",
            "TARGET_INDEX_NAME": "PK_ITEMS",
            "LOOKUP_TYPE": "EQ",
            "SEARCHKEY_EXPRESSIONS": [param(0, "INTEGER")],
            "INLINE_NODES": [{
                "ID": 2,
                "PLAN_NODE_TYPE": "PROJECTION",
                "OUTPUT_SCHEMA": [out("ID", col(0, "INTEGER")), out("NAME", col(3, "VARCHAR"))]
            }]
        })],
    );
    let rs = engine.execute_fragment(1, &[Value::Integer(3)]).unwrap();
    assert_eq!(rs.rows, vec![vec![Value::Integer(3), Value::varchar("c")]]);
    let rs = engine.execute_fragment(1, &[Value::Integer(42)]).unwrap();
    assert!(rs.rows.is_empty());
    // null never matches
    let rs = engine.execute_fragment(1, &[Value::Null]).unwrap();
    assert!(rs.rows.is_empty());

    // GRP >= ? in descending order
    load(
        &mut engine,
        2,
        vec![json!({
            "ID": 1,
            "PLAN_NODE_TYPE": "INDEXSCAN",
            "TARGET_TABLE_NAME": "ITEMS",
            "TARGET_INDEX_NAME": "IDX_GRP",
            "LOOKUP_TYPE": "GTE",
            "SORT_DIRECTION": "DESC",
            "SEARCHKEY_EXPRESSIONS": [param(0, "INTEGER")],
            "INLINE_NODES": [{
                "ID": 2,
                "PLAN_NODE_TYPE": "PROJECTION",
                "OUTPUT_SCHEMA": [out("GRP", col(1, "INTEGER"))]
            }]
        })],
    );
    let rs = engine.execute_fragment(2, &[Value::Integer(2)]).unwrap();
    assert_eq!(rs.rows, ints(&[&[3], &[2], &[2]]));

    // GRP > ? ending at GRP <= ?
    load(
        &mut engine,
        3,
        vec![json!({
            "ID": 1,
            "PLAN_NODE_TYPE": "INDEXSCAN",
            "TARGET_TABLE_NAME": "ITEMS",
            "TARGET_INDEX_NAME": "IDX_GRP",
            "LOOKUP_TYPE": "GT",
            "SORT_DIRECTION": "ASC",
            "SEARCHKEY_EXPRESSIONS": [param(0, "INTEGER")],
            "END_EXPRESSION": cmp("LESSTHANOREQUALTO", col(1, "INTEGER"), param(1, "INTEGER"))
        })],
    );
    let rs = engine
        .execute_fragment(3, &[Value::Integer(1), Value::Integer(2)])
        .unwrap();
    let ids: Vec<Value> = sorted(rs.rows).into_iter().map(|r| r[0].clone()).collect();
    assert_eq!(ids, vec![Value::Integer(3), Value::Integer(4)]);
}

fn counted_table(engine: &mut tessera_exec::Engine) {
    create_table(
        engine,
        json!({
            "name": "K",
            "columns": [
                {"name": "ID", "type": "INTEGER"},
                {"name": "V", "type": "TINYINT"}
            ],
            "indexes": [
                {"name": "K_ID", "type": "BALANCED_TREE", "unique": true, "columns": ["ID"], "countable": true},
                {"name": "K_V", "type": "BALANCED_TREE", "columns": ["V"], "countable": true}
            ]
        }),
    );
    let rows = [1, 3, 5, 7, 9]
        .iter()
        .map(|v| vec![Value::Integer(*v), Value::TinyInt(*v as i8)])
        .collect();
    insert_rows(engine, "K", &["INTEGER", "TINYINT"], rows);
}

#[test]
fn test_index_count() {
    let (mut engine, _) = engine();
    counted_table(&mut engine);
    load(
        &mut engine,
        1,
        vec![json!({
            "ID": 1,
            "PLAN_NODE_TYPE": "INDEXCOUNT",
            "TARGET_TABLE_NAME": "K",
            "TARGET_INDEX_NAME": "K_ID",
            "LOOKUP_TYPE": "GT",
            "SEARCHKEY_EXPRESSIONS": [param(0, "INTEGER")],
            "END_TYPE": "LTE",
            "ENDKEY_EXPRESSIONS": [param(1, "INTEGER")]
        })],
    );
    let rs = engine
        .execute_fragment(1, &[Value::Integer(3), Value::Integer(7)])
        .unwrap();
    assert_eq!(rs.rows, ints(&[&[2]]));
    let rs = engine
        .execute_fragment(1, &[Value::Integer(0), Value::Integer(100)])
        .unwrap();
    assert_eq!(rs.rows, ints(&[&[5]]));

    // key beyond TINYINT range matches nothing above it
    load(
        &mut engine,
        2,
        vec![json!({
            "ID": 1,
            "PLAN_NODE_TYPE": "INDEXCOUNT",
            "TARGET_TABLE_NAME": "K",
            "TARGET_INDEX_NAME": "K_V",
            "LOOKUP_TYPE": "GT",
            "SEARCHKEY_EXPRESSIONS": [param(0, "BIGINT")]
        })],
    );
    let rs = engine.execute_fragment(2, &[Value::BigInt(1000)]).unwrap();
    assert_eq!(rs.rows, ints(&[&[0]]));
    let rs = engine.execute_fragment(2, &[Value::BigInt(-1000)]).unwrap();
    assert_eq!(rs.rows, ints(&[&[5]]));
}

#[test]
fn test_table_count() {
    let (mut engine, _) = engine();
    counted_table(&mut engine);
    load(
        &mut engine,
        1,
        vec![json!({
            "ID": 1,
            "PLAN_NODE_TYPE": "TABLECOUNT",
            "TARGET_TABLE_NAME": "K",
            "OUTPUT_SCHEMA": [out("C", col(0, "BIGINT"))]
        })],
    );
    let rs = engine.execute_fragment(1, &[]).unwrap();
    assert_eq!(rs.columns, vec!["C"]);
    assert_eq!(rs.rows, ints(&[&[5]]));
}

#[test]
fn test_order_by_limit() {
    let (mut engine, _) = engine();
    items(&mut engine);
    load(
        &mut engine,
        1,
        vec![
            json!({
                "ID": 1,
                "PLAN_NODE_TYPE": "ORDERBY",
                "CHILDREN_IDS": [2],
                "SORT_COLUMNS": [
                    {"SORT_EXPRESSION": col(2, "INTEGER"), "SORT_DIRECTION": "DESC"},
                    {"SORT_EXPRESSION": col(0, "INTEGER"), "SORT_DIRECTION": "ASC"}
                ],
                "INLINE_NODES": [{"ID": 3, "PLAN_NODE_TYPE": "LIMIT", "LIMIT": 3}]
            }),
            json!({"ID": 2, "PLAN_NODE_TYPE": "SEQSCAN", "TARGET_TABLE_NAME": "ITEMS"}),
        ],
    );
    let rs = engine.execute_fragment(1, &[]).unwrap();
    let ids: Vec<Value> = rs.rows.iter().map(|r| r[0].clone()).collect();
    assert_eq!(
        ids,
        vec![Value::Integer(2), Value::Integer(1), Value::Integer(3)]
    );
}

fn grouped_sum(engine: &mut tessera_exec::Engine, id: i64, node_type: &str, child: serde_json::Value) {
    load(
        engine,
        id,
        vec![
            json!({
                "ID": 1,
                "PLAN_NODE_TYPE": node_type,
                "CHILDREN_IDS": [2],
                "GROUPBY_EXPRESSIONS": [col(1, "INTEGER")],
                "AGGREGATE_COLUMNS": [
                    {"AGGREGATE_TYPE": "AGGREGATE_SUM", "AGGREGATE_OUTPUT_COLUMN": 1, "AGGREGATE_EXPRESSION": col(2, "INTEGER")},
                    {"AGGREGATE_TYPE": "AGGREGATE_COUNT_STAR", "AGGREGATE_OUTPUT_COLUMN": 2}
                ],
                "OUTPUT_SCHEMA": [
                    out("GRP", col(1, "INTEGER")),
                    out("S", col(1, "BIGINT")),
                    out("C", col(2, "BIGINT"))
                ]
            }),
            child,
        ],
    );
}

#[test]
fn test_grouped_aggregates() {
    let (mut engine, _) = engine();
    items(&mut engine);
    let expected = vec![
        vec![Value::Integer(1), Value::BigInt(30), Value::BigInt(2)],
        vec![Value::Integer(2), Value::BigInt(5), Value::BigInt(2)],
        vec![Value::Integer(3), Value::BigInt(5), Value::BigInt(1)],
    ];
    grouped_sum(
        &mut engine,
        1,
        "HASHAGGREGATE",
        json!({"ID": 2, "PLAN_NODE_TYPE": "SEQSCAN", "TARGET_TABLE_NAME": "ITEMS"}),
    );
    let rs = engine.execute_fragment(1, &[]).unwrap();
    assert_eq!(rs.columns, vec!["GRP", "S", "C"]);
    assert_eq!(sorted(rs.rows), expected);

    // serial aggregation over rows ordered by the index
    grouped_sum(
        &mut engine,
        2,
        "AGGREGATE",
        json!({
            "ID": 2,
            "PLAN_NODE_TYPE": "INDEXSCAN",
            "TARGET_TABLE_NAME": "ITEMS",
            "TARGET_INDEX_NAME": "IDX_GRP",
            "LOOKUP_TYPE": "GTE",
            "SORT_DIRECTION": "ASC"
        }),
    );
    let rs = engine.execute_fragment(2, &[]).unwrap();
    assert_eq!(rs.rows, expected);

    // no input rows, no groups
    load(
        &mut engine,
        3,
        vec![
            json!({
                "ID": 1,
                "PLAN_NODE_TYPE": "HASHAGGREGATE",
                "CHILDREN_IDS": [2],
                "GROUPBY_EXPRESSIONS": [col(1, "INTEGER")],
                "AGGREGATE_COLUMNS": [
                    {"AGGREGATE_TYPE": "AGGREGATE_COUNT_STAR", "AGGREGATE_OUTPUT_COLUMN": 1}
                ],
                "OUTPUT_SCHEMA": [out("GRP", col(1, "INTEGER")), out("C", col(1, "BIGINT"))]
            }),
            json!({
                "ID": 2,
                "PLAN_NODE_TYPE": "SEQSCAN",
                "TARGET_TABLE_NAME": "ITEMS",
                "PREDICATE": cmp("GREATERTHAN", col(0, "INTEGER"), constant(100, "INTEGER"))
            }),
        ],
    );
    let rs = engine.execute_fragment(3, &[]).unwrap();
    assert!(rs.rows.is_empty());
}

#[test]
fn test_global_aggregates() {
    let (mut engine, _) = engine();
    items(&mut engine);
    let aggs = |pred: serde_json::Value| {
        vec![
            json!({
                "ID": 1,
                "PLAN_NODE_TYPE": "AGGREGATE",
                "CHILDREN_IDS": [2],
                "AGGREGATE_COLUMNS": [
                    {"AGGREGATE_TYPE": "AGGREGATE_COUNT_STAR", "AGGREGATE_OUTPUT_COLUMN": 0},
                    {"AGGREGATE_TYPE": "AGGREGATE_COUNT", "AGGREGATE_DISTINCT": 1, "AGGREGATE_OUTPUT_COLUMN": 1, "AGGREGATE_EXPRESSION": col(2, "INTEGER")},
                    {"AGGREGATE_TYPE": "AGGREGATE_SUM", "AGGREGATE_OUTPUT_COLUMN": 2, "AGGREGATE_EXPRESSION": col(2, "INTEGER")},
                    {"AGGREGATE_TYPE": "AGGREGATE_AVG", "AGGREGATE_OUTPUT_COLUMN": 3, "AGGREGATE_EXPRESSION": col(2, "INTEGER")},
                    {"AGGREGATE_TYPE": "AGGREGATE_MIN", "AGGREGATE_OUTPUT_COLUMN": 4, "AGGREGATE_EXPRESSION": col(2, "INTEGER")},
                    {"AGGREGATE_TYPE": "AGGREGATE_MAX", "AGGREGATE_OUTPUT_COLUMN": 5, "AGGREGATE_EXPRESSION": col(3, "VARCHAR")}
                ],
                "OUTPUT_SCHEMA": [
                    out("C", col(0, "BIGINT")),
                    out("D", col(1, "BIGINT")),
                    out("S", col(2, "BIGINT")),
                    out("A", col(3, "INTEGER")),
                    out("MN", col(4, "INTEGER")),
                    out("MX", col(5, "VARCHAR"))
                ]
            }),
            json!({
                "ID": 2,
                "PLAN_NODE_TYPE": "SEQSCAN",
                "TARGET_TABLE_NAME": "ITEMS",
                "PREDICATE": pred
            }),
        ]
    };
    load(
        &mut engine,
        1,
        aggs(cmp("GREATERTHAN", col(0, "INTEGER"), constant(0, "INTEGER"))),
    );
    let rs = engine.execute_fragment(1, &[]).unwrap();
    assert_eq!(
        rs.rows,
        vec![vec![
            Value::BigInt(5),
            Value::BigInt(3),
            Value::BigInt(40),
            Value::Integer(10),
            Value::Integer(5),
            Value::varchar("e"),
        ]]
    );

    // one row even without input
    load(
        &mut engine,
        2,
        aggs(cmp("GREATERTHAN", col(0, "INTEGER"), constant(100, "INTEGER"))),
    );
    let rs = engine.execute_fragment(2, &[]).unwrap();
    assert_eq!(
        rs.rows,
        vec![vec![
            Value::BigInt(0),
            Value::BigInt(0),
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
        ]]
    );
}

fn grp_scan(id: i32, pred: Option<serde_json::Value>) -> serde_json::Value {
    let mut node = json!({
        "ID": id,
        "PLAN_NODE_TYPE": "SEQSCAN",
        "TARGET_TABLE_NAME": "ITEMS",
        "INLINE_NODES": [{
            "ID": id + 100,
            "PLAN_NODE_TYPE": "PROJECTION",
            "OUTPUT_SCHEMA": [out("GRP", col(1, "INTEGER"))]
        }]
    });
    if let Some(p) = pred {
        node["PREDICATE"] = p;
    }
    node
}

#[test]
fn test_set_operations() {
    let (mut engine, _) = engine();
    items(&mut engine);
    let set_op = |op: &str, pred: Option<serde_json::Value>| {
        vec![
            json!({"ID": 1, "PLAN_NODE_TYPE": "UNION", "UNION_TYPE": op, "CHILDREN_IDS": [2, 3]}),
            grp_scan(2, None),
            grp_scan(3, pred),
        ]
    };
    let grp_is = |v: i64| Some(cmp("EQUAL", col(1, "INTEGER"), constant(v, "INTEGER")));

    load(&mut engine, 1, set_op("UNION", None));
    let rs = engine.execute_fragment(1, &[]).unwrap();
    assert_eq!(sorted(rs.rows), ints(&[&[1], &[2], &[3]]));

    load(&mut engine, 2, set_op("UNION_ALL", grp_is(3)));
    let rs = engine.execute_fragment(2, &[]).unwrap();
    assert_eq!(sorted(rs.rows), ints(&[&[1], &[1], &[2], &[2], &[3], &[3]]));

    load(&mut engine, 3, set_op("INTERSECT_ALL", None));
    let rs = engine.execute_fragment(3, &[]).unwrap();
    assert_eq!(sorted(rs.rows), ints(&[&[1], &[1], &[2], &[2], &[3]]));

    load(&mut engine, 4, set_op("INTERSECT", grp_is(2)));
    let rs = engine.execute_fragment(4, &[]).unwrap();
    assert_eq!(rs.rows, ints(&[&[2]]));

    load(&mut engine, 5, set_op("EXCEPT_ALL", grp_is(1)));
    let rs = engine.execute_fragment(5, &[]).unwrap();
    assert_eq!(sorted(rs.rows), ints(&[&[2], &[2], &[3]]));

    load(&mut engine, 6, set_op("EXCEPT", grp_is(1)));
    let rs = engine.execute_fragment(6, &[]).unwrap();
    assert_eq!(sorted(rs.rows), ints(&[&[2], &[3]]));
}
