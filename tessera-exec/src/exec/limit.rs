use super::{temp_table_like, Executable, InputTable};
use crate::context::ExecutorContext;
use crate::error::{Error, Result};
use tessera_datatype::Value;
use tessera_expr::EvalInput;
use tessera_plan::{LimitNode, PlanNode};
use tessera_storage::table::TempTable;

/// Limit and offset resolved against parameters of current execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitOffset {
    pub limit: Option<usize>,
    pub offset: usize,
}

impl LimitOffset {
    #[inline]
    pub fn unlimited() -> Self {
        LimitOffset {
            limit: None,
            offset: 0,
        }
    }

    /// Literal negative limit means no limit. Negative values coming
    /// from parameters are rejected.
    pub fn resolve(node: &LimitNode, params: &[Value]) -> Result<Self> {
        let mut limit = node.limit;
        if let Some(idx) = node.limit_param_idx {
            limit = param_i64(params, idx)?;
            if limit < 0 {
                return Err(Error::sql("Negative parameter to LIMIT"));
            }
        }
        if let Some(e) = &node.limit_expression {
            let v = e.eval(&EvalInput::new(params))?;
            if v.is_null() {
                return Err(Error::sql("LIMIT expression evaluates to NULL"));
            }
            limit = v.to_i64()?;
            if limit < 0 {
                return Err(Error::sql("Negative LIMIT expression"));
            }
        }
        let mut offset = node.offset;
        if let Some(idx) = node.offset_param_idx {
            offset = param_i64(params, idx)?;
        }
        if offset < 0 {
            return Err(Error::sql("Negative parameter to OFFSET"));
        }
        Ok(LimitOffset {
            limit: if limit < 0 { None } else { Some(limit as usize) },
            offset: offset as usize,
        })
    }

    #[inline]
    pub fn resolve_opt(node: Option<&LimitNode>, params: &[Value]) -> Result<Self> {
        match node {
            Some(n) => LimitOffset::resolve(n, params),
            None => Ok(LimitOffset::unlimited()),
        }
    }

    #[inline]
    pub fn counter(&self) -> LimitCounter {
        LimitCounter {
            limit: self.limit,
            skip: self.offset,
            taken: 0,
        }
    }
}

/// Tracks skipped and emitted rows of one execution.
#[derive(Debug)]
pub struct LimitCounter {
    limit: Option<usize>,
    skip: usize,
    taken: usize,
}

impl LimitCounter {
    /// Returns true if the next qualifying row is emitted,
    /// false if it falls into the offset.
    #[inline]
    pub fn admit(&mut self) -> bool {
        if self.skip > 0 {
            self.skip -= 1;
            return false;
        }
        self.taken += 1;
        true
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        matches!(self.limit, Some(l) if self.taken >= l)
    }
}

#[inline]
fn param_i64(params: &[Value], idx: usize) -> Result<i64> {
    let v = params
        .get(idx)
        .ok_or(tessera_expr::Error::ParamOutOfRange(idx))?;
    if v.is_null() {
        return Err(Error::sql("NULL parameter to LIMIT or OFFSET"));
    }
    Ok(v.to_i64()?)
}

pub struct LimitExec {
    limit: LimitNode,
}

impl LimitExec {
    pub fn init(
        plan: &PlanNode,
        node: &LimitNode,
        inputs: &[InputTable<'_>],
        ctx: &ExecutorContext,
    ) -> Result<(Self, TempTable)> {
        let output = temp_table_like(plan, &inputs[0], ctx);
        Ok((
            LimitExec {
                limit: node.clone(),
            },
            output,
        ))
    }
}

impl Executable for LimitExec {
    fn execute(
        &mut self,
        inputs: &[InputTable<'_>],
        output: &mut TempTable,
        ctx: &ExecutorContext,
    ) -> Result<()> {
        let mut counter = LimitOffset::resolve(&self.limit, ctx.params())?.counter();
        for tuple in inputs[0].tuples() {
            if counter.is_full() {
                break;
            }
            if counter.admit() {
                output.insert_tuple(&tuple)?;
            }
        }
        Ok(())
    }
}
