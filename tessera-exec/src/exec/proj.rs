use super::{check_columns, temp_table, Executable, InputTable};
use crate::context::ExecutorContext;
use crate::error::{Error, Result};
use tessera_datatype::Value;
use tessera_expr::{EvalInput, Expr};
use tessera_plan::{MaterializeNode, PlanFragment, PlanNode, SchemaColumn};
use tessera_storage::table::TempTable;

/// Projector computes output rows from output columns.
/// Plain column references are copied without evaluation.
pub enum Projector {
    Columns(Vec<usize>),
    Exprs(Vec<Expr>),
}

impl Projector {
    pub fn new(columns: &[SchemaColumn]) -> Self {
        let idx: Option<Vec<usize>> = columns.iter().map(|c| c.expr.as_outer_column()).collect();
        match idx {
            Some(idx) => Projector::Columns(idx),
            None => Projector::Exprs(columns.iter().map(|c| c.expr.clone()).collect()),
        }
    }

    /// Writes projected values into row, replacing its content.
    pub fn project(&self, input: &EvalInput<'_>, row: &mut Vec<Value>) -> Result<()> {
        row.clear();
        match self {
            Projector::Columns(idx) => {
                let src = input
                    .outer
                    .ok_or(tessera_expr::Error::MissingTuple("outer"))?;
                row.extend(idx.iter().map(|i| src.column_value(*i)));
            }
            Projector::Exprs(exprs) => {
                for e in exprs {
                    row.push(e.eval(input)?);
                }
            }
        }
        Ok(())
    }
}

/// Evaluates output columns on each input row, or once if
/// there is no input.
pub struct ProjectionExec {
    projector: Projector,
}

impl ProjectionExec {
    pub fn init(
        fragment: &PlanFragment,
        plan: &PlanNode,
        inputs: &[InputTable<'_>],
        ctx: &ExecutorContext,
    ) -> Result<(Self, TempTable)> {
        let columns = fragment.output_schema(plan.id)?;
        let width = inputs.first().map(|i| i.column_count()).unwrap_or(0);
        check_columns(plan, columns, width, 0)?;
        let output = temp_table(plan, columns, ctx)?;
        Ok((
            ProjectionExec {
                projector: Projector::new(columns),
            },
            output,
        ))
    }
}

impl Executable for ProjectionExec {
    fn execute(
        &mut self,
        inputs: &[InputTable<'_>],
        output: &mut TempTable,
        ctx: &ExecutorContext,
    ) -> Result<()> {
        let params = ctx.params();
        let mut row = vec![];
        match inputs.first() {
            Some(input) => {
                for tuple in input.tuples() {
                    self.projector
                        .project(&EvalInput::with_outer(params, &tuple), &mut row)?;
                    output.insert_values(&row)?;
                }
            }
            None => {
                self.projector.project(&EvalInput::new(params), &mut row)?;
                output.insert_values(&row)?;
            }
        }
        Ok(())
    }
}

/// Materializes a row of constants and parameters.
/// In batched mode parameters hold one row per consecutive group
/// of column count values.
pub struct MaterializeExec {
    exprs: Vec<Expr>,
    /// Parameter index of each column if all columns are parameters.
    param_columns: Option<Vec<usize>>,
    batched: bool,
}

impl MaterializeExec {
    pub fn init(
        fragment: &PlanFragment,
        plan: &PlanNode,
        node: &MaterializeNode,
        ctx: &ExecutorContext,
    ) -> Result<(Self, TempTable)> {
        let columns = fragment.output_schema(plan.id)?;
        check_columns(plan, columns, 0, 0)?;
        if let Some(c) = columns.iter().find(|c| !c.expr.is_tuple_free()) {
            return Err(Error::InvalidPlanNode(
                plan.id,
                format!("materialized column {} reads a tuple", c.name),
            ));
        }
        let output = temp_table(plan, columns, ctx)?;
        let param_columns = columns.iter().map(|c| c.expr.as_param()).collect();
        Ok((
            MaterializeExec {
                exprs: columns.iter().map(|c| c.expr.clone()).collect(),
                param_columns,
                batched: node.batched,
            },
            output,
        ))
    }
}

impl Executable for MaterializeExec {
    fn execute(
        &mut self,
        _inputs: &[InputTable<'_>],
        output: &mut TempTable,
        ctx: &ExecutorContext,
    ) -> Result<()> {
        let params = ctx.params();
        match &self.param_columns {
            Some(idx) if !idx.is_empty() => {
                let width = idx.len();
                let batches = if self.batched { params.len() / width } else { 1 };
                let mut row = Vec::with_capacity(width);
                for b in 0..batches {
                    row.clear();
                    for i in idx {
                        let p = i + b * width;
                        let v = params
                            .get(p)
                            .cloned()
                            .ok_or(tessera_expr::Error::ParamOutOfRange(p))?;
                        row.push(v);
                    }
                    output.insert_values(&row)?;
                }
            }
            _ => {
                let input = EvalInput::new(params);
                let row = self
                    .exprs
                    .iter()
                    .map(|e| e.eval(&input))
                    .collect::<tessera_expr::Result<Vec<_>>>()?;
                output.insert_values(&row)?;
            }
        }
        Ok(())
    }
}
