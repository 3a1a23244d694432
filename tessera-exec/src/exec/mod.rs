pub mod agg;
pub mod dml;
pub mod index;
pub mod join;
pub mod limit;
pub mod proj;
pub mod receive;
pub mod scan;
pub mod setop;
pub mod sort;

use crate::context::ExecutorContext;
use crate::error::{Error, Result};
use agg::AggregateExec;
use dml::{DeleteExec, InsertExec, UpdateExec};
use fnv::FnvHashMap;
use index::{IndexCountExec, IndexScanExec};
use join::{NestLoopExec, NestLoopIndexExec};
use limit::LimitExec;
use proj::{MaterializeExec, ProjectionExec};
use receive::ReceiveExec;
use scan::{SeqScanExec, TableCountExec};
use setop::UnionExec;
use smallvec::SmallVec;
use sort::OrderByExec;
use tessera_datatype::{Value, ValueType};
use tessera_plan::{NodeKind, PlanFragment, PlanNode, PlanNodeId, SchemaColumn};
use tessera_storage::object::POOLED_MAX_VALUE_LENGTH;
use tessera_storage::pool::PoolArena;
use tessera_storage::schema::{ColumnSpec, TupleSchema};
use tessera_storage::table::{PersistentTable, RowSet, TempTable};
use tessera_storage::tuple::TableTuple;

/// Exec is the executor bound to one plan node.
pub enum Exec {
    SeqScan(SeqScanExec),
    IndexScan(IndexScanExec),
    IndexCount(IndexCountExec),
    TableCount(TableCountExec),
    NestLoop(NestLoopExec),
    NestLoopIndex(NestLoopIndexExec),
    Aggregate(AggregateExec),
    OrderBy(OrderByExec),
    Projection(ProjectionExec),
    Materialize(MaterializeExec),
    Limit(LimitExec),
    Union(UnionExec),
    Insert(InsertExec),
    Update(UpdateExec),
    Delete(DeleteExec),
    Receive(ReceiveExec),
    /// Output is a persistent table or the output of input, nothing to run.
    PassThrough,
}

/// Executable reads its inputs and appends result rows to its output.
pub trait Executable {
    fn execute(
        &mut self,
        inputs: &[InputTable<'_>],
        output: &mut TempTable,
        ctx: &ExecutorContext,
    ) -> Result<()>;
}

/// Modifier changes a persistent table with rows of its input,
/// and returns number of rows modified.
pub trait Modifier {
    fn modify(&mut self, rows: Vec<Vec<Value>>, ctx: &mut ExecutorContext) -> Result<i64>;
}

impl Executable for Exec {
    fn execute(
        &mut self,
        inputs: &[InputTable<'_>],
        output: &mut TempTable,
        ctx: &ExecutorContext,
    ) -> Result<()> {
        match self {
            Exec::SeqScan(e) => e.execute(inputs, output, ctx),
            Exec::IndexScan(e) => e.execute(inputs, output, ctx),
            Exec::IndexCount(e) => e.execute(inputs, output, ctx),
            Exec::TableCount(e) => e.execute(inputs, output, ctx),
            Exec::NestLoop(e) => e.execute(inputs, output, ctx),
            Exec::NestLoopIndex(e) => e.execute(inputs, output, ctx),
            Exec::Aggregate(e) => e.execute(inputs, output, ctx),
            Exec::OrderBy(e) => e.execute(inputs, output, ctx),
            Exec::Projection(e) => e.execute(inputs, output, ctx),
            Exec::Materialize(e) => e.execute(inputs, output, ctx),
            Exec::Limit(e) => e.execute(inputs, output, ctx),
            Exec::Union(e) => e.execute(inputs, output, ctx),
            Exec::Receive(e) => e.execute(inputs, output, ctx),
            Exec::Insert(_) | Exec::Update(_) | Exec::Delete(_) | Exec::PassThrough => {
                tessera_storage::fatal!("executor cannot run as query")
            }
        }
    }
}

/// Read-only view of the rows an executor consumes.
#[derive(Clone, Copy)]
pub enum InputTable<'a> {
    Persistent(&'a PersistentTable, &'a PoolArena),
    Temp(&'a TempTable),
}

impl<'a> InputTable<'a> {
    #[inline]
    pub fn name(&self) -> &'a str {
        match self {
            InputTable::Persistent(t, _) => t.name(),
            InputTable::Temp(t) => t.name(),
        }
    }

    #[inline]
    pub fn column_names(&self) -> &'a [String] {
        match self {
            InputTable::Persistent(t, _) => t.column_names(),
            InputTable::Temp(t) => t.column_names(),
        }
    }

    #[inline]
    pub fn schema(&self) -> &'a TupleSchema {
        match self {
            InputTable::Persistent(t, _) => t.schema(),
            InputTable::Temp(t) => t.schema(),
        }
    }

    #[inline]
    pub fn column_count(&self) -> usize {
        self.schema().column_count()
    }

    #[inline]
    pub fn row_count(&self) -> usize {
        match self {
            InputTable::Persistent(t, _) => t.active_tuple_count(),
            InputTable::Temp(t) => t.row_count(),
        }
    }

    /// Active tuples in storage order. Persistent tuples carry their address.
    #[inline]
    pub fn tuples(&self) -> Box<dyn Iterator<Item = TableTuple<'a>> + 'a> {
        match *self {
            InputTable::Persistent(t, arena) => Box::new(t.tuples(arena)),
            InputTable::Temp(t) => Box::new(t.iter()),
        }
    }

    #[inline]
    pub fn rows(&self) -> Vec<Vec<Value>> {
        self.tuples().map(|t| t.values()).collect()
    }

    #[inline]
    pub fn to_row_set(&self) -> RowSet {
        RowSet {
            columns: self.column_names().to_vec(),
            rows: self.rows(),
        }
    }
}

pub(crate) enum Output {
    /// A persistent table read in place.
    Table(String),
    /// Output of the executor at given position.
    Input(usize),
    Temp(TempTable),
}

pub struct ExecNode {
    pub id: PlanNodeId,
    inputs: SmallVec<[usize; 2]>,
    output: Output,
    exec: Exec,
}

/// ExecutorTree is a fragment bound to executors, in execution order.
/// Every executor comes after all executors producing its inputs.
pub struct ExecutorTree {
    nodes: Vec<ExecNode>,
}

impl ExecutorTree {
    /// Initializes executors of all nodes, children first. Tables,
    /// indexes and output schemas are checked here so execution only
    /// fails on data.
    pub fn build(fragment: &PlanFragment, ctx: &ExecutorContext) -> Result<Self> {
        let mut nodes: Vec<ExecNode> = Vec::with_capacity(fragment.execute_list().len());
        let mut positions: FnvHashMap<PlanNodeId, usize> = FnvHashMap::default();
        for id in fragment.execute_list() {
            let plan = fragment.node(*id).ok_or(tessera_plan::Error::NodeNotFound(*id))?;
            let inputs = plan
                .children
                .iter()
                .map(|c| {
                    positions.get(c).copied().ok_or_else(|| {
                        Error::InvalidPlanNode(*id, format!("child {} not initialized", c))
                    })
                })
                .collect::<Result<SmallVec<[usize; 2]>>>()?;
            let required = required_children(plan);
            if inputs.len() < required {
                return Err(Error::InvalidPlanNode(
                    *id,
                    format!(
                        "{} node requires {} children, found {}",
                        plan.node_type().name(),
                        required,
                        inputs.len()
                    ),
                ));
            }
            let (exec, output) = {
                let tables = inputs
                    .iter()
                    .map(|i| input_table(&nodes, *i, ctx))
                    .collect::<Result<SmallVec<[InputTable<'_>; 2]>>>()?;
                init_exec(fragment, plan, &inputs, &tables, ctx)?
            };
            log::trace!("initialized {} node {}", plan.node_type().name(), id);
            positions.insert(*id, nodes.len());
            nodes.push(ExecNode {
                id: *id,
                inputs,
                output,
                exec,
            });
        }
        Ok(ExecutorTree { nodes })
    }

    #[inline]
    pub fn nodes(&self) -> &[ExecNode] {
        &self.nodes
    }

    /// Runs all executors and returns rows of the last one.
    pub fn execute(&mut self, ctx: &mut ExecutorContext) -> Result<RowSet> {
        for pos in 0..self.nodes.len() {
            self.run(pos, ctx)?;
        }
        match self.nodes.len() {
            0 => Err(tessera_plan::Error::EmptyFragment.into()),
            n => Ok(input_table(&self.nodes, n - 1, ctx)?.to_row_set()),
        }
    }

    /// Clears all temp outputs, releasing their memory.
    pub fn clear_outputs(&mut self) {
        for node in &mut self.nodes {
            if let Output::Temp(t) = &mut node.output {
                t.delete_all_tuples();
            }
        }
    }

    fn run(&mut self, pos: usize, ctx: &mut ExecutorContext) -> Result<()> {
        let (done, rest) = self.nodes.split_at_mut(pos);
        let node = &mut rest[0];
        let output = match &mut node.output {
            Output::Temp(t) => t,
            _ => return Ok(()),
        };
        output.delete_all_tuples();
        let modifier: Option<&mut dyn Modifier> = match &mut node.exec {
            Exec::Insert(e) => Some(e as &mut dyn Modifier),
            Exec::Update(e) => Some(e as &mut dyn Modifier),
            Exec::Delete(e) => Some(e as &mut dyn Modifier),
            _ => None,
        };
        match modifier {
            Some(m) => {
                let rows = match node.inputs.first() {
                    Some(i) => input_table(done, *i, ctx)?.rows(),
                    None => vec![],
                };
                let count = m.modify(rows, ctx)?;
                ctx.tuples_modified += count;
                output.insert_values(&[Value::BigInt(count)])?;
            }
            None => {
                let inputs = node
                    .inputs
                    .iter()
                    .map(|i| input_table(done, *i, ctx))
                    .collect::<Result<SmallVec<[InputTable<'_>; 2]>>>()?;
                node.exec.execute(&inputs, output, ctx)?;
            }
        }
        log::trace!("executed node {}, {} rows", node.id, output.row_count());
        Ok(())
    }
}

fn input_table<'a>(
    nodes: &'a [ExecNode],
    pos: usize,
    ctx: &'a ExecutorContext,
) -> Result<InputTable<'a>> {
    match &nodes[pos].output {
        Output::Temp(t) => Ok(InputTable::Temp(t)),
        Output::Table(name) => Ok(InputTable::Persistent(ctx.table(name)?, ctx.arena())),
        Output::Input(p) => input_table(nodes, *p, ctx),
    }
}

/// Least number of children an executor of given node reads.
fn required_children(plan: &PlanNode) -> usize {
    match &plan.kind {
        NodeKind::SeqScan(node) => node.target_table.is_none() as usize,
        NodeKind::TableCount(node) => node.target_table.is_none() as usize,
        NodeKind::NestLoop(_) => 2,
        NodeKind::Send
        | NodeKind::NestLoopIndex(_)
        | NodeKind::Aggregate(_)
        | NodeKind::HashAggregate(_)
        | NodeKind::OrderBy(_)
        | NodeKind::Limit(_)
        | NodeKind::Union(_)
        | NodeKind::Update(_) => 1,
        _ => 0,
    }
}

fn init_exec(
    fragment: &PlanFragment,
    plan: &PlanNode,
    positions: &[usize],
    inputs: &[InputTable<'_>],
    ctx: &ExecutorContext,
) -> Result<(Exec, Output)> {
    let res = match &plan.kind {
        NodeKind::SeqScan(node) => {
            if node.predicate.is_none() && !plan.has_inline_nodes() {
                match &node.target_table {
                    Some(name) => {
                        ctx.table(name)?;
                        (Exec::PassThrough, Output::Table(name.clone()))
                    }
                    None => (Exec::PassThrough, Output::Input(positions[0])),
                }
            } else {
                let (e, t) = SeqScanExec::init(plan, node, inputs, ctx)?;
                (Exec::SeqScan(e), Output::Temp(t))
            }
        }
        NodeKind::Send => (Exec::PassThrough, Output::Input(positions[0])),
        NodeKind::IndexScan(node) => {
            let (e, t) = IndexScanExec::init(plan, node, ctx)?;
            (Exec::IndexScan(e), Output::Temp(t))
        }
        NodeKind::IndexCount(node) => {
            let (e, t) = IndexCountExec::init(plan, node, ctx)?;
            (Exec::IndexCount(e), Output::Temp(t))
        }
        NodeKind::TableCount(node) => {
            let (e, t) = TableCountExec::init(plan, node, ctx)?;
            (Exec::TableCount(e), Output::Temp(t))
        }
        NodeKind::NestLoop(node) => {
            let (e, t) = NestLoopExec::init(plan, node, inputs, ctx)?;
            (Exec::NestLoop(e), Output::Temp(t))
        }
        NodeKind::NestLoopIndex(node) => {
            let (e, t) = NestLoopIndexExec::init(plan, node, inputs, ctx)?;
            (Exec::NestLoopIndex(e), Output::Temp(t))
        }
        NodeKind::Aggregate(node) => {
            let (e, t) = AggregateExec::init(plan, node, false, inputs, ctx)?;
            (Exec::Aggregate(e), Output::Temp(t))
        }
        NodeKind::HashAggregate(node) => {
            let (e, t) = AggregateExec::init(plan, node, true, inputs, ctx)?;
            (Exec::Aggregate(e), Output::Temp(t))
        }
        NodeKind::OrderBy(node) => {
            let (e, t) = OrderByExec::init(plan, node, inputs, ctx)?;
            (Exec::OrderBy(e), Output::Temp(t))
        }
        NodeKind::Projection => {
            let (e, t) = ProjectionExec::init(fragment, plan, inputs, ctx)?;
            (Exec::Projection(e), Output::Temp(t))
        }
        NodeKind::Materialize(node) => {
            let (e, t) = MaterializeExec::init(fragment, plan, node, ctx)?;
            (Exec::Materialize(e), Output::Temp(t))
        }
        NodeKind::Limit(node) => {
            let (e, t) = LimitExec::init(plan, node, inputs, ctx)?;
            (Exec::Limit(e), Output::Temp(t))
        }
        NodeKind::Union(node) => {
            let (e, t) = UnionExec::init(plan, node, inputs, ctx)?;
            (Exec::Union(e), Output::Temp(t))
        }
        NodeKind::Insert(node) => {
            let (e, t) = InsertExec::init(plan, node, inputs, ctx)?;
            (Exec::Insert(e), Output::Temp(t))
        }
        NodeKind::Update(node) => {
            let (e, t) = UpdateExec::init(plan, node, inputs, ctx)?;
            (Exec::Update(e), Output::Temp(t))
        }
        NodeKind::Delete(node) => {
            let (e, t) = DeleteExec::init(plan, node, inputs, ctx)?;
            (Exec::Delete(e), Output::Temp(t))
        }
        NodeKind::Receive => {
            let (e, t) = ReceiveExec::init(fragment, plan, ctx)?;
            (Exec::Receive(e), Output::Temp(t))
        }
    };
    Ok(res)
}

/// Column shape of an output column declared by plan.
/// Object columns without declared size get the largest poolable size.
pub(crate) fn column_spec(node: PlanNodeId, col: &SchemaColumn) -> Result<ColumnSpec> {
    let ty = col.expr.ty;
    if ty == ValueType::Null {
        return Err(Error::InvalidPlanNode(
            node,
            format!("output column {} has no type", col.name),
        ));
    }
    if ty.is_object() {
        let length = if col.expr.size == 0 {
            POOLED_MAX_VALUE_LENGTH as u32
        } else {
            col.expr.size
        };
        Ok(ColumnSpec::new(ty, length, true))
    } else {
        Ok(ColumnSpec::fixed(ty))
    }
}

/// Temp table holding rows of given output columns.
pub(crate) fn temp_table(
    plan: &PlanNode,
    columns: &[SchemaColumn],
    ctx: &ExecutorContext,
) -> Result<TempTable> {
    let specs = columns
        .iter()
        .map(|c| column_spec(plan.id, c))
        .collect::<Result<Vec<_>>>()?;
    let names = columns.iter().map(|c| c.name.clone()).collect();
    Ok(TempTable::new(
        temp_name(plan),
        names,
        TupleSchema::new(&specs),
        Some(ctx.limits().clone()),
    ))
}

/// Temp table of the same columns as input, all nullable.
pub(crate) fn temp_table_like(
    plan: &PlanNode,
    input: &InputTable<'_>,
    ctx: &ExecutorContext,
) -> TempTable {
    TempTable::new(
        temp_name(plan),
        input.column_names().to_vec(),
        nullable_schema(input.schema()),
        Some(ctx.limits().clone()),
    )
}

/// Temp table of a single BIGINT column, named after the declared
/// output column if any.
pub(crate) fn count_table(plan: &PlanNode, default_name: &str, ctx: &ExecutorContext) -> TempTable {
    let name = match plan.output_schema.as_deref() {
        Some([col]) => col.name.clone(),
        _ => default_name.to_string(),
    };
    TempTable::new(
        temp_name(plan),
        vec![name],
        TupleSchema::new(&[ColumnSpec::fixed(ValueType::BigInt)]),
        Some(ctx.limits().clone()),
    )
}

#[inline]
pub(crate) fn nullable_schema(schema: &TupleSchema) -> TupleSchema {
    let specs: Vec<ColumnSpec> = schema
        .specs()
        .into_iter()
        .map(|s| ColumnSpec::new(s.ty, s.length, true))
        .collect();
    TupleSchema::new(&specs)
}

/// Output columns that read every column of given tuple, in order.
pub(crate) fn pass_columns(tuple_idx: usize, input: &InputTable<'_>) -> Vec<SchemaColumn> {
    input
        .schema()
        .columns()
        .iter()
        .zip(input.column_names())
        .enumerate()
        .map(|(i, (col, name))| {
            let expr = if tuple_idx == 0 {
                tessera_expr::Expr::tuple_value(i, col.ty)
            } else {
                tessera_expr::Expr::inner_value(i, col.ty)
            };
            SchemaColumn::new(name.clone(), expr.with_size(col.length))
        })
        .collect()
}

#[inline]
fn temp_name(plan: &PlanNode) -> String {
    format!("{}_{}", plan.node_type().name(), plan.id)
}

/// Checks that output columns only read existing columns.
pub(crate) fn check_columns(
    plan: &PlanNode,
    columns: &[SchemaColumn],
    outer_width: usize,
    inner_width: usize,
) -> Result<()> {
    for c in columns {
        if let Some(col) = c.expr.as_outer_column() {
            if col >= outer_width {
                return Err(Error::InvalidPlanNode(
                    plan.id,
                    format!("column {} of output {} out of range", col, c.name),
                ));
            }
        }
        if let tessera_expr::ExprKind::TupleValue {
            tuple_idx: 1,
            column_idx,
        } = c.expr.kind
        {
            if column_idx >= inner_width {
                return Err(Error::InvalidPlanNode(
                    plan.id,
                    format!("inner column {} of output {} out of range", column_idx, c.name),
                ));
            }
        }
    }
    Ok(())
}
