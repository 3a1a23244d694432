use super::index::{build_search_key, check_lookup, table_index, IndexRange, SearchKey};
use super::limit::{LimitCounter, LimitOffset};
use super::proj::Projector;
use super::{check_columns, pass_columns, temp_table, Executable, InputTable};
use crate::context::ExecutorContext;
use crate::error::Result;
use tessera_datatype::Value;
use tessera_expr::{ColumnSource, EvalInput, Expr};
use tessera_plan::{
    IndexScanNode, JoinType, LimitNode, NestLoopIndexNode, NestLoopNode, PlanNode, SchemaColumn,
};
use tessera_storage::table::TempTable;

/// Output side shared by join executors: where predicate, projection
/// and inline limit.
struct JoinOutput {
    join_type: JoinType,
    pre_join_predicate: Option<Expr>,
    where_predicate: Option<Expr>,
    projector: Projector,
    limit: Option<LimitNode>,
}

impl JoinOutput {
    fn new(
        plan: &PlanNode,
        join_type: JoinType,
        pre_join_predicate: &Option<Expr>,
        where_predicate: &Option<Expr>,
        outer: &InputTable<'_>,
        inner: &InputTable<'_>,
        ctx: &ExecutorContext,
    ) -> Result<(Self, TempTable)> {
        let declared = plan
            .inline_projection
            .as_deref()
            .or(plan.output_schema.as_deref());
        let columns: Vec<SchemaColumn> = match declared {
            Some(columns) => columns.to_vec(),
            None => {
                let mut columns = pass_columns(0, outer);
                columns.extend(pass_columns(1, inner));
                columns
            }
        };
        check_columns(plan, &columns, outer.column_count(), inner.column_count())?;
        let output = temp_table(plan, &columns, ctx)?;
        Ok((
            JoinOutput {
                join_type,
                pre_join_predicate: pre_join_predicate.clone(),
                where_predicate: where_predicate.clone(),
                projector: Projector::new(&columns),
                limit: plan.inline_limit.clone(),
            },
            output,
        ))
    }

    #[inline]
    fn counter(&self, params: &[Value]) -> Result<LimitCounter> {
        Ok(LimitOffset::resolve_opt(self.limit.as_ref(), params)?.counter())
    }

    #[inline]
    fn pre_join(&self, input: &EvalInput<'_>) -> Result<bool> {
        match &self.pre_join_predicate {
            Some(p) => Ok(p.eval_pred(input)?),
            None => Ok(true),
        }
    }

    /// Emits joined row if it passes where predicate and limit.
    fn emit(
        &self,
        input: &EvalInput<'_>,
        counter: &mut LimitCounter,
        row: &mut Vec<Value>,
        output: &mut TempTable,
    ) -> Result<()> {
        if let Some(p) = &self.where_predicate {
            if !p.eval_pred(input)? {
                return Ok(());
            }
        }
        if counter.admit() {
            self.projector.project(input, row)?;
            output.insert_values(row)?;
        }
        Ok(())
    }

    /// Emits outer row padded with null inner columns if it had
    /// no match in a left join.
    fn emit_unmatched(
        &self,
        params: &[Value],
        outer: &dyn ColumnSource,
        null_inner: &dyn ColumnSource,
        counter: &mut LimitCounter,
        row: &mut Vec<Value>,
        output: &mut TempTable,
    ) -> Result<()> {
        if self.join_type == JoinType::Left {
            let input = EvalInput::with_join(params, outer, null_inner);
            self.emit(&input, counter, row, output)?;
        }
        Ok(())
    }
}

/// Joins every outer row with every inner row.
pub struct NestLoopExec {
    join_predicate: Option<Expr>,
    output: JoinOutput,
}

impl NestLoopExec {
    pub fn init(
        plan: &PlanNode,
        node: &NestLoopNode,
        inputs: &[InputTable<'_>],
        ctx: &ExecutorContext,
    ) -> Result<(Self, TempTable)> {
        let (output, table) = JoinOutput::new(
            plan,
            node.join_type,
            &node.pre_join_predicate,
            &node.where_predicate,
            &inputs[0],
            &inputs[1],
            ctx,
        )?;
        log::debug!(
            "nest loop node {} joins {} with {}, {:?}",
            plan.id,
            inputs[0].name(),
            inputs[1].name(),
            node.join_type
        );
        Ok((
            NestLoopExec {
                join_predicate: node.join_predicate.clone(),
                output,
            },
            table,
        ))
    }
}

impl Executable for NestLoopExec {
    fn execute(
        &mut self,
        inputs: &[InputTable<'_>],
        output: &mut TempTable,
        ctx: &ExecutorContext,
    ) -> Result<()> {
        let params = ctx.params();
        let (outer, inner) = (inputs[0], inputs[1]);
        let null_inner = vec![Value::Null; inner.column_count()];
        let mut counter = self.output.counter(params)?;
        let mut row = vec![];
        for o in outer.tuples() {
            if counter.is_full() {
                break;
            }
            let mut matched = false;
            if self.output.pre_join(&EvalInput::with_outer(params, &o))? {
                for i in inner.tuples() {
                    if counter.is_full() {
                        break;
                    }
                    let eval = EvalInput::with_join(params, &o, &i);
                    if let Some(p) = &self.join_predicate {
                        if !p.eval_pred(&eval)? {
                            continue;
                        }
                    }
                    matched = true;
                    self.output.emit(&eval, &mut counter, &mut row, output)?;
                }
            }
            if !matched {
                self.output
                    .emit_unmatched(params, &o, &null_inner, &mut counter, &mut row, output)?;
            }
        }
        Ok(())
    }
}

/// Joins each outer row with inner rows found by probing an index
/// of the inner persistent table.
pub struct NestLoopIndexExec {
    scan: IndexScanNode,
    output: JoinOutput,
}

impl NestLoopIndexExec {
    pub fn init(
        plan: &PlanNode,
        node: &NestLoopIndexNode,
        inputs: &[InputTable<'_>],
        ctx: &ExecutorContext,
    ) -> Result<(Self, TempTable)> {
        let (table, index) = table_index(ctx, &node.scan.target_table, &node.scan.target_index)?;
        check_lookup(plan, index, &node.scan)?;
        let inner = InputTable::Persistent(table, ctx.arena());
        let (output, temp) = JoinOutput::new(
            plan,
            node.join_type,
            &node.pre_join_predicate,
            &node.where_predicate,
            &inputs[0],
            &inner,
            ctx,
        )?;
        log::debug!(
            "nest loop index node {} probes {}.{} for rows of {}",
            plan.id,
            node.scan.target_table,
            node.scan.target_index,
            inputs[0].name()
        );
        Ok((
            NestLoopIndexExec {
                scan: node.scan.clone(),
                output,
            },
            temp,
        ))
    }
}

impl Executable for NestLoopIndexExec {
    fn execute(
        &mut self,
        inputs: &[InputTable<'_>],
        output: &mut TempTable,
        ctx: &ExecutorContext,
    ) -> Result<()> {
        let params = ctx.params();
        let scan = &self.scan;
        let (table, index) = table_index(ctx, &scan.target_table, &scan.target_index)?;
        let null_inner = vec![Value::Null; table.column_names().len()];
        let mut counter = self.output.counter(params)?;
        let mut row = vec![];
        for o in inputs[0].tuples() {
            if counter.is_full() {
                break;
            }
            let outer_eval = EvalInput::with_outer(params, &o);
            let mut matched = false;
            if self.output.pre_join(&outer_eval)? {
                if let SearchKey::Key {
                    key,
                    lookup,
                    null_col,
                } = build_search_key(index, &scan.search_keys, scan.lookup_type, &outer_eval)?
                {
                    let mut range =
                        IndexRange::open(index, key, lookup, null_col, scan.sort_direction);
                    let mut skip_null = scan.skip_null_predicate.as_ref();
                    while let Some(addr) = range.next_address() {
                        if counter.is_full() {
                            break;
                        }
                        let i = match table.tuple(addr, ctx.arena()) {
                            Some(i) => i,
                            None => continue,
                        };
                        let eval = EvalInput::with_join(params, &o, &i);
                        if let Some(p) = skip_null {
                            if p.eval_pred(&eval)? {
                                continue;
                            }
                            skip_null = None;
                        }
                        if let Some(e) = &scan.end_expression {
                            if !e.eval_pred(&eval)? {
                                break;
                            }
                        }
                        if let Some(p) = &scan.predicate {
                            if !p.eval_pred(&eval)? {
                                continue;
                            }
                        }
                        matched = true;
                        self.output.emit(&eval, &mut counter, &mut row, output)?;
                    }
                }
            }
            if !matched {
                self.output
                    .emit_unmatched(params, &o, &null_inner, &mut counter, &mut row, output)?;
            }
        }
        Ok(())
    }
}
