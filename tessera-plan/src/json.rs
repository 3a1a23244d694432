use crate::error::{Error, Result};
use crate::node::*;
use serde::Deserialize;
use tessera_expr::Expr;

/// Raw fragment document: all nodes plus optional execution order.
#[derive(Debug, Deserialize)]
pub(crate) struct FragmentDoc {
    #[serde(rename = "PLAN_NODES")]
    pub(crate) nodes: Vec<NodeDoc>,
    #[serde(rename = "EXECUTE_LIST", default)]
    pub(crate) execute_list: Option<Vec<PlanNodeId>>,
}

/// Raw plan node with the union of all node fields.
#[derive(Debug, Deserialize)]
pub(crate) struct NodeDoc {
    #[serde(rename = "PLAN_NODE_TYPE")]
    node_type: PlanNodeType,
    #[serde(rename = "ID", default)]
    id: PlanNodeId,
    #[serde(rename = "CHILDREN_IDS", default)]
    children: Vec<PlanNodeId>,
    #[serde(rename = "INLINE_NODES", default)]
    inline_nodes: Vec<NodeDoc>,
    #[serde(rename = "OUTPUT_SCHEMA", default)]
    output_schema: Option<Vec<SchemaColumn>>,
    #[serde(rename = "TARGET_TABLE_NAME", default)]
    target_table: Option<String>,
    #[serde(rename = "TARGET_INDEX_NAME", default)]
    target_index: Option<String>,
    #[serde(rename = "PREDICATE", default)]
    predicate: Option<Expr>,
    #[serde(rename = "LOOKUP_TYPE", default)]
    lookup_type: Option<IndexLookupType>,
    #[serde(rename = "END_TYPE", default)]
    end_type: Option<IndexLookupType>,
    #[serde(rename = "SORT_DIRECTION", default)]
    sort_direction: Option<SortDirection>,
    #[serde(rename = "SEARCHKEY_EXPRESSIONS", alias = "SEARCH_KEYS", default)]
    search_keys: Vec<Expr>,
    #[serde(rename = "ENDKEY_EXPRESSIONS", default)]
    end_keys: Vec<Expr>,
    #[serde(rename = "END_EXPRESSION", default)]
    end_expression: Option<Expr>,
    #[serde(rename = "SKIP_NULL_PREDICATE", default)]
    skip_null_predicate: Option<Expr>,
    #[serde(rename = "JOIN_TYPE", default)]
    join_type: Option<JoinType>,
    #[serde(rename = "PRE_JOIN_PREDICATE", default)]
    pre_join_predicate: Option<Expr>,
    #[serde(rename = "JOIN_PREDICATE", default)]
    join_predicate: Option<Expr>,
    #[serde(rename = "WHERE_PREDICATE", default)]
    where_predicate: Option<Expr>,
    #[serde(rename = "AGGREGATE_COLUMNS", default)]
    aggregate_columns: Vec<AggregateColumnDoc>,
    #[serde(rename = "GROUPBY_EXPRESSIONS", default)]
    group_by: Vec<Expr>,
    #[serde(rename = "SORT_COLUMNS", default)]
    sort_columns: Vec<SortColumnDoc>,
    #[serde(rename = "LIMIT", default)]
    limit: Option<i64>,
    #[serde(rename = "OFFSET", default)]
    offset: Option<i64>,
    #[serde(rename = "LIMIT_PARAM_IDX", default)]
    limit_param_idx: Option<i64>,
    #[serde(rename = "OFFSET_PARAM_IDX", default)]
    offset_param_idx: Option<i64>,
    #[serde(rename = "LIMIT_EXPRESSION", default)]
    limit_expression: Option<Expr>,
    #[serde(rename = "UNION_TYPE", default)]
    set_op: Option<SetOpType>,
    #[serde(rename = "BATCHED", default)]
    batched: bool,
    #[serde(rename = "MULTI_PARTITION", default)]
    multi_partition: bool,
    #[serde(rename = "TRUNCATE", default)]
    truncate: bool,
}

#[derive(Debug, Deserialize)]
struct AggregateColumnDoc {
    #[serde(rename = "AGGREGATE_TYPE")]
    agg_type: AggregateType,
    /// Either boolean or 0/1.
    #[serde(rename = "AGGREGATE_DISTINCT", default)]
    distinct: Option<serde_json::Value>,
    #[serde(rename = "AGGREGATE_OUTPUT_COLUMN")]
    output_column: usize,
    #[serde(rename = "AGGREGATE_EXPRESSION", default)]
    expr: Option<Expr>,
}

#[derive(Debug, Deserialize)]
struct SortColumnDoc {
    #[serde(rename = "SORT_EXPRESSION")]
    expr: Expr,
    #[serde(rename = "SORT_DIRECTION", default)]
    direction: SortDirection,
}

impl TryFrom<NodeDoc> for PlanNode {
    type Error = Error;

    fn try_from(mut doc: NodeDoc) -> Result<Self> {
        let id = doc.id;
        let inline_docs = std::mem::take(&mut doc.inline_nodes);
        let node_type = doc.node_type;
        let kind = match node_type {
            PlanNodeType::SeqScan => NodeKind::SeqScan(SeqScanNode {
                target_table: doc.target_table,
                predicate: doc.predicate,
            }),
            PlanNodeType::IndexScan => NodeKind::IndexScan(doc.index_scan()?),
            PlanNodeType::IndexCount => NodeKind::IndexCount(IndexCountNode {
                target_table: required(id, doc.target_table, "TARGET_TABLE_NAME")?,
                target_index: required(id, doc.target_index, "TARGET_INDEX_NAME")?,
                lookup_type: required(id, doc.lookup_type, "LOOKUP_TYPE")?,
                search_keys: doc.search_keys,
                end_type: doc.end_type,
                end_keys: doc.end_keys,
                skip_null_predicate: doc.skip_null_predicate,
            }),
            PlanNodeType::TableCount => NodeKind::TableCount(TableCountNode {
                target_table: doc.target_table,
            }),
            PlanNodeType::NestLoop => NodeKind::NestLoop(NestLoopNode {
                join_type: doc.join_type.unwrap_or_default(),
                pre_join_predicate: doc.pre_join_predicate,
                join_predicate: doc.join_predicate,
                where_predicate: doc.where_predicate,
            }),
            PlanNodeType::NestLoopIndex => {
                // filled in with the inline index scan below
                NodeKind::NestLoopIndex(NestLoopIndexNode {
                    join_type: doc.join_type.unwrap_or_default(),
                    pre_join_predicate: doc.pre_join_predicate,
                    where_predicate: doc.where_predicate,
                    scan: IndexScanNode {
                        target_table: String::new(),
                        target_index: String::new(),
                        lookup_type: IndexLookupType::Eq,
                        sort_direction: SortDirection::Invalid,
                        search_keys: vec![],
                        end_expression: None,
                        predicate: None,
                        skip_null_predicate: None,
                    },
                })
            }
            PlanNodeType::Aggregate | PlanNodeType::HashAggregate => {
                let mut aggregates = Vec::with_capacity(doc.aggregate_columns.len());
                for c in doc.aggregate_columns {
                    if c.expr.is_none() && c.agg_type != AggregateType::CountStar {
                        return Err(Error::MissingField {
                            node: id,
                            field: "AGGREGATE_EXPRESSION",
                        });
                    }
                    aggregates.push(AggregateColumn {
                        agg_type: c.agg_type,
                        distinct: is_truthy(c.distinct.as_ref()),
                        output_column: c.output_column,
                        expr: c.expr,
                    });
                }
                let agg = AggregateNode {
                    aggregates,
                    group_by: doc.group_by,
                };
                if node_type == PlanNodeType::Aggregate {
                    NodeKind::Aggregate(agg)
                } else {
                    NodeKind::HashAggregate(agg)
                }
            }
            PlanNodeType::OrderBy => NodeKind::OrderBy(OrderByNode {
                sort_keys: doc
                    .sort_columns
                    .into_iter()
                    .map(|c| SortKey {
                        expr: c.expr,
                        direction: c.direction,
                    })
                    .collect(),
            }),
            PlanNodeType::Projection => {
                if doc.output_schema.is_none() {
                    return Err(Error::MissingField {
                        node: id,
                        field: "OUTPUT_SCHEMA",
                    });
                }
                NodeKind::Projection
            }
            PlanNodeType::Materialize => NodeKind::Materialize(MaterializeNode {
                batched: doc.batched,
            }),
            PlanNodeType::Limit => NodeKind::Limit(doc.limit_node()),
            PlanNodeType::Union => NodeKind::Union(UnionNode {
                set_op: doc.set_op.unwrap_or(SetOpType::Union),
            }),
            PlanNodeType::Insert => NodeKind::Insert(InsertNode {
                target_table: required(id, doc.target_table, "TARGET_TABLE_NAME")?,
                multi_partition: doc.multi_partition,
            }),
            PlanNodeType::Update => NodeKind::Update(UpdateNode {
                target_table: required(id, doc.target_table, "TARGET_TABLE_NAME")?,
                multi_partition: doc.multi_partition,
            }),
            PlanNodeType::Delete => NodeKind::Delete(DeleteNode {
                target_table: required(id, doc.target_table, "TARGET_TABLE_NAME")?,
                truncate: doc.truncate,
                multi_partition: doc.multi_partition,
            }),
            PlanNodeType::Receive => NodeKind::Receive,
            PlanNodeType::Send => NodeKind::Send,
        };
        let mut node = PlanNode {
            id,
            children: doc.children,
            output_schema: doc.output_schema,
            inline_projection: None,
            inline_limit: None,
            kind,
        };
        let mut inline_scan = None;
        for inline_doc in inline_docs {
            let inline = PlanNode::try_from(inline_doc)?;
            match inline.kind {
                NodeKind::Projection => node.inline_projection = inline.output_schema,
                NodeKind::Limit(limit) => node.inline_limit = Some(limit),
                NodeKind::IndexScan(scan) if node_type == PlanNodeType::NestLoopIndex => {
                    inline_scan = Some(scan)
                }
                _ => return Err(Error::UnsupportedInlineNode(id, inline.node_type())),
            }
        }
        if let NodeKind::NestLoopIndex(nlij) = &mut node.kind {
            nlij.scan = inline_scan.ok_or(Error::MissingField {
                node: id,
                field: "INLINE_NODES",
            })?;
        }
        Ok(node)
    }
}

impl NodeDoc {
    fn index_scan(&mut self) -> Result<IndexScanNode> {
        let id = self.id;
        Ok(IndexScanNode {
            target_table: required(id, self.target_table.take(), "TARGET_TABLE_NAME")?,
            target_index: required(id, self.target_index.take(), "TARGET_INDEX_NAME")?,
            lookup_type: required(id, self.lookup_type, "LOOKUP_TYPE")?,
            sort_direction: self.sort_direction.unwrap_or_default(),
            search_keys: std::mem::take(&mut self.search_keys),
            end_expression: self.end_expression.take(),
            predicate: self.predicate.take(),
            skip_null_predicate: self.skip_null_predicate.take(),
        })
    }

    fn limit_node(&mut self) -> LimitNode {
        let param_idx = |idx: Option<i64>| idx.filter(|i| *i >= 0).map(|i| i as usize);
        LimitNode {
            limit: self.limit.unwrap_or(-1),
            offset: self.offset.unwrap_or(0),
            limit_param_idx: param_idx(self.limit_param_idx),
            offset_param_idx: param_idx(self.offset_param_idx),
            limit_expression: self.limit_expression.take(),
        }
    }
}

#[inline]
fn required<T>(node: PlanNodeId, value: Option<T>, field: &'static str) -> Result<T> {
    value.ok_or(Error::MissingField { node, field })
}

#[inline]
fn is_truthy(v: Option<&serde_json::Value>) -> bool {
    match v {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::Number(n)) => n.as_i64().map(|n| n != 0).unwrap_or(false),
        _ => false,
    }
}
