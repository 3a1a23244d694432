use super::limit::LimitOffset;
use super::proj::Projector;
use super::{check_columns, count_table, temp_table, temp_table_like, Executable, InputTable};
use crate::context::ExecutorContext;
use crate::error::Result;
use tessera_datatype::Value;
use tessera_expr::{EvalInput, Expr};
use tessera_plan::{LimitNode, PlanNode, SeqScanNode, TableCountNode};
use tessera_storage::table::TempTable;

/// Filters rows of a persistent table, or of the child output in
/// subquery form, then applies inline limit and projection.
pub struct SeqScanExec {
    table: Option<String>,
    predicate: Option<Expr>,
    projector: Option<Projector>,
    limit: Option<LimitNode>,
}

impl SeqScanExec {
    pub fn init(
        plan: &PlanNode,
        node: &SeqScanNode,
        inputs: &[InputTable<'_>],
        ctx: &ExecutorContext,
    ) -> Result<(Self, TempTable)> {
        let input = match &node.target_table {
            Some(name) => InputTable::Persistent(ctx.table(name)?, ctx.arena()),
            None => inputs[0],
        };
        let declared = plan
            .inline_projection
            .as_deref()
            .or(plan.output_schema.as_deref());
        let (projector, output) = match declared {
            Some(columns) => {
                check_columns(plan, columns, input.column_count(), 0)?;
                (Some(Projector::new(columns)), temp_table(plan, columns, ctx)?)
            }
            None => (None, temp_table_like(plan, &input, ctx)),
        };
        log::debug!(
            "seq scan node {} over {} initialized, projection {}",
            plan.id,
            input.name(),
            projector.is_some()
        );
        Ok((
            SeqScanExec {
                table: node.target_table.clone(),
                predicate: node.predicate.clone(),
                projector,
                limit: plan.inline_limit.clone(),
            },
            output,
        ))
    }
}

impl Executable for SeqScanExec {
    fn execute(
        &mut self,
        inputs: &[InputTable<'_>],
        output: &mut TempTable,
        ctx: &ExecutorContext,
    ) -> Result<()> {
        let params = ctx.params();
        let input = match &self.table {
            Some(name) => InputTable::Persistent(ctx.table(name)?, ctx.arena()),
            None => inputs[0],
        };
        let mut counter = LimitOffset::resolve_opt(self.limit.as_ref(), params)?.counter();
        let mut row = vec![];
        for tuple in input.tuples() {
            if counter.is_full() {
                break;
            }
            let eval = EvalInput::with_outer(params, &tuple);
            if let Some(p) = &self.predicate {
                if !p.eval_pred(&eval)? {
                    continue;
                }
            }
            if !counter.admit() {
                continue;
            }
            match &self.projector {
                Some(proj) => {
                    proj.project(&eval, &mut row)?;
                    output.insert_values(&row)?;
                }
                None => output.insert_tuple(&tuple)?,
            }
        }
        Ok(())
    }
}

/// Counts active rows of a persistent table, or rows of child output.
pub struct TableCountExec {
    table: Option<String>,
}

impl TableCountExec {
    pub fn init(
        plan: &PlanNode,
        node: &TableCountNode,
        ctx: &ExecutorContext,
    ) -> Result<(Self, TempTable)> {
        if let Some(name) = &node.target_table {
            ctx.table(name)?;
        }
        Ok((
            TableCountExec {
                table: node.target_table.clone(),
            },
            count_table(plan, "count(*)", ctx),
        ))
    }
}

impl Executable for TableCountExec {
    fn execute(
        &mut self,
        inputs: &[InputTable<'_>],
        output: &mut TempTable,
        ctx: &ExecutorContext,
    ) -> Result<()> {
        let count = match &self.table {
            Some(name) => ctx.table(name)?.active_tuple_count(),
            None => inputs[0].row_count(),
        };
        output.insert_values(&[Value::BigInt(count as i64)])?;
        Ok(())
    }
}
