use serde::Deserialize;
use tessera_expr::Expr;

/// Identifier of a plan node, unique within one fragment.
pub type PlanNodeId = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum PlanNodeType {
    #[serde(rename = "SEQSCAN")]
    SeqScan,
    #[serde(rename = "INDEXSCAN")]
    IndexScan,
    #[serde(rename = "INDEXCOUNT")]
    IndexCount,
    #[serde(rename = "TABLECOUNT")]
    TableCount,
    #[serde(rename = "NESTLOOP")]
    NestLoop,
    #[serde(rename = "NESTLOOPINDEX")]
    NestLoopIndex,
    #[serde(rename = "AGGREGATE")]
    Aggregate,
    #[serde(rename = "HASHAGGREGATE")]
    HashAggregate,
    #[serde(rename = "ORDERBY")]
    OrderBy,
    #[serde(rename = "PROJECTION")]
    Projection,
    #[serde(rename = "MATERIALIZE")]
    Materialize,
    #[serde(rename = "LIMIT")]
    Limit,
    #[serde(rename = "UNION")]
    Union,
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "RECEIVE")]
    Receive,
    #[serde(rename = "SEND")]
    Send,
}

impl PlanNodeType {
    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            PlanNodeType::SeqScan => "SEQSCAN",
            PlanNodeType::IndexScan => "INDEXSCAN",
            PlanNodeType::IndexCount => "INDEXCOUNT",
            PlanNodeType::TableCount => "TABLECOUNT",
            PlanNodeType::NestLoop => "NESTLOOP",
            PlanNodeType::NestLoopIndex => "NESTLOOPINDEX",
            PlanNodeType::Aggregate => "AGGREGATE",
            PlanNodeType::HashAggregate => "HASHAGGREGATE",
            PlanNodeType::OrderBy => "ORDERBY",
            PlanNodeType::Projection => "PROJECTION",
            PlanNodeType::Materialize => "MATERIALIZE",
            PlanNodeType::Limit => "LIMIT",
            PlanNodeType::Union => "UNION",
            PlanNodeType::Insert => "INSERT",
            PlanNodeType::Update => "UPDATE",
            PlanNodeType::Delete => "DELETE",
            PlanNodeType::Receive => "RECEIVE",
            PlanNodeType::Send => "SEND",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum IndexLookupType {
    #[serde(rename = "EQ")]
    Eq,
    #[serde(rename = "GT")]
    Gt,
    #[serde(rename = "GTE")]
    Gte,
    #[serde(rename = "LT")]
    Lt,
    #[serde(rename = "LTE")]
    Lte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub enum SortDirection {
    #[serde(rename = "ASC")]
    Asc,
    #[serde(rename = "DESC")]
    Desc,
    /// No order requested.
    #[default]
    #[serde(rename = "INVALID")]
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub enum JoinType {
    #[default]
    #[serde(rename = "INNER")]
    Inner,
    #[serde(rename = "LEFT")]
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum AggregateType {
    #[serde(rename = "AGGREGATE_COUNT_STAR")]
    CountStar,
    #[serde(rename = "AGGREGATE_COUNT")]
    Count,
    #[serde(rename = "AGGREGATE_SUM")]
    Sum,
    #[serde(rename = "AGGREGATE_AVG")]
    Avg,
    #[serde(rename = "AGGREGATE_MIN")]
    Min,
    #[serde(rename = "AGGREGATE_MAX")]
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum SetOpType {
    #[serde(rename = "UNION")]
    Union,
    #[serde(rename = "UNION_ALL")]
    UnionAll,
    #[serde(rename = "INTERSECT")]
    Intersect,
    #[serde(rename = "INTERSECT_ALL")]
    IntersectAll,
    #[serde(rename = "EXCEPT")]
    Except,
    #[serde(rename = "EXCEPT_ALL")]
    ExceptAll,
}

impl SetOpType {
    #[inline]
    pub fn is_all(self) -> bool {
        matches!(
            self,
            SetOpType::UnionAll | SetOpType::IntersectAll | SetOpType::ExceptAll
        )
    }
}

/// One output column: its name and the expression producing it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SchemaColumn {
    #[serde(rename = "COLUMN_NAME")]
    pub name: String,
    #[serde(rename = "EXPRESSION")]
    pub expr: Expr,
}

impl SchemaColumn {
    #[inline]
    pub fn new(name: impl Into<String>, expr: Expr) -> Self {
        SchemaColumn {
            name: name.into(),
            expr,
        }
    }
}

/// PlanNode is one operator of a fragment, with its inlined
/// post-processing nodes folded into dedicated fields.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanNode {
    pub id: PlanNodeId,
    pub children: Vec<PlanNodeId>,
    /// Declared output schema. None if inherited.
    pub output_schema: Option<Vec<SchemaColumn>>,
    /// Columns of inline projection.
    pub inline_projection: Option<Vec<SchemaColumn>>,
    pub inline_limit: Option<LimitNode>,
    pub kind: NodeKind,
}

impl PlanNode {
    #[inline]
    pub fn new(id: PlanNodeId, kind: NodeKind) -> Self {
        PlanNode {
            id,
            children: vec![],
            output_schema: None,
            inline_projection: None,
            inline_limit: None,
            kind,
        }
    }

    pub fn node_type(&self) -> PlanNodeType {
        match &self.kind {
            NodeKind::SeqScan(_) => PlanNodeType::SeqScan,
            NodeKind::IndexScan(_) => PlanNodeType::IndexScan,
            NodeKind::IndexCount(_) => PlanNodeType::IndexCount,
            NodeKind::TableCount(_) => PlanNodeType::TableCount,
            NodeKind::NestLoop(_) => PlanNodeType::NestLoop,
            NodeKind::NestLoopIndex(_) => PlanNodeType::NestLoopIndex,
            NodeKind::Aggregate(_) => PlanNodeType::Aggregate,
            NodeKind::HashAggregate(_) => PlanNodeType::HashAggregate,
            NodeKind::OrderBy(_) => PlanNodeType::OrderBy,
            NodeKind::Projection => PlanNodeType::Projection,
            NodeKind::Materialize(_) => PlanNodeType::Materialize,
            NodeKind::Limit(_) => PlanNodeType::Limit,
            NodeKind::Union(_) => PlanNodeType::Union,
            NodeKind::Insert(_) => PlanNodeType::Insert,
            NodeKind::Update(_) => PlanNodeType::Update,
            NodeKind::Delete(_) => PlanNodeType::Delete,
            NodeKind::Receive => PlanNodeType::Receive,
            NodeKind::Send => PlanNodeType::Send,
        }
    }

    #[inline]
    pub fn has_inline_nodes(&self) -> bool {
        self.inline_projection.is_some() || self.inline_limit.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    SeqScan(SeqScanNode),
    IndexScan(IndexScanNode),
    IndexCount(IndexCountNode),
    TableCount(TableCountNode),
    NestLoop(NestLoopNode),
    NestLoopIndex(NestLoopIndexNode),
    Aggregate(AggregateNode),
    HashAggregate(AggregateNode),
    OrderBy(OrderByNode),
    /// Columns are the declared output schema.
    Projection,
    Materialize(MaterializeNode),
    Limit(LimitNode),
    Union(UnionNode),
    Insert(InsertNode),
    Update(UpdateNode),
    Delete(DeleteNode),
    /// Rows come from the host as dependency tables.
    Receive,
    /// Forwards the output of its child.
    Send,
}

/// Sequential scan over a persistent table, or over the output of
/// its only child when no target table is given.
#[derive(Debug, Clone, PartialEq)]
pub struct SeqScanNode {
    pub target_table: Option<String>,
    pub predicate: Option<Expr>,
}

impl SeqScanNode {
    #[inline]
    pub fn is_subquery(&self) -> bool {
        self.target_table.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexScanNode {
    pub target_table: String,
    pub target_index: String,
    pub lookup_type: IndexLookupType,
    pub sort_direction: SortDirection,
    pub search_keys: Vec<Expr>,
    /// Scan stops at the first entry this evaluates false on.
    pub end_expression: Option<Expr>,
    /// Filter applied to every scanned tuple.
    pub predicate: Option<Expr>,
    /// Leading entries are skipped while this evaluates true.
    pub skip_null_predicate: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexCountNode {
    pub target_table: String,
    pub target_index: String,
    pub lookup_type: IndexLookupType,
    pub search_keys: Vec<Expr>,
    pub end_type: Option<IndexLookupType>,
    pub end_keys: Vec<Expr>,
    pub skip_null_predicate: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableCountNode {
    /// Counts rows of the child output if None.
    pub target_table: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NestLoopNode {
    pub join_type: JoinType,
    /// Evaluated on the outer tuple only.
    pub pre_join_predicate: Option<Expr>,
    pub join_predicate: Option<Expr>,
    pub where_predicate: Option<Expr>,
}

/// Nested loop join probing an index of the inner table for each
/// outer tuple. The probe is described by the inline index scan, whose
/// predicate acts as join predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct NestLoopIndexNode {
    pub join_type: JoinType,
    pub pre_join_predicate: Option<Expr>,
    pub where_predicate: Option<Expr>,
    pub scan: IndexScanNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateColumn {
    pub agg_type: AggregateType,
    pub distinct: bool,
    /// Position in output schema.
    pub output_column: usize,
    /// None for COUNT(*).
    pub expr: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateNode {
    pub aggregates: Vec<AggregateColumn>,
    pub group_by: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub expr: Expr,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByNode {
    pub sort_keys: Vec<SortKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterializeNode {
    /// Output one row per parameter set.
    pub batched: bool,
}

/// Limit and offset, each either literal or taken from a parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitNode {
    /// Negative means unlimited.
    pub limit: i64,
    pub offset: i64,
    pub limit_param_idx: Option<usize>,
    pub offset_param_idx: Option<usize>,
    pub limit_expression: Option<Expr>,
}

impl Default for LimitNode {
    #[inline]
    fn default() -> Self {
        LimitNode {
            limit: -1,
            offset: 0,
            limit_param_idx: None,
            offset_param_idx: None,
            limit_expression: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionNode {
    pub set_op: SetOpType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertNode {
    pub target_table: String,
    pub multi_partition: bool,
}

/// Update reads the tuple address from input column 0 and new values
/// of the columns named by input columns 1 and after.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateNode {
    pub target_table: String,
    pub multi_partition: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteNode {
    pub target_table: String,
    pub truncate: bool,
    pub multi_partition: bool,
}
