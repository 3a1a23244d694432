use super::limit::LimitOffset;
use super::{temp_table_like, Executable, InputTable};
use crate::context::ExecutorContext;
use crate::error::{Error, Result};
use std::cmp::Ordering;
use tessera_datatype::Value;
use tessera_expr::EvalInput;
use tessera_plan::{LimitNode, OrderByNode, PlanNode, SortDirection, SortKey};
use tessera_storage::table::TempTable;

/// Sorts input rows by sort keys, stable for equal keys.
/// Null sorts before any value in ascending order.
pub struct OrderByExec {
    sort_keys: Vec<SortKey>,
    limit: Option<LimitNode>,
}

impl OrderByExec {
    pub fn init(
        plan: &PlanNode,
        node: &OrderByNode,
        inputs: &[InputTable<'_>],
        ctx: &ExecutorContext,
    ) -> Result<(Self, TempTable)> {
        let output = temp_table_like(plan, &inputs[0], ctx);
        Ok((
            OrderByExec {
                sort_keys: node.sort_keys.clone(),
                limit: plan.inline_limit.clone(),
            },
            output,
        ))
    }
}

#[inline]
fn compare_keys(sort_keys: &[SortKey], l: &[Value], r: &[Value]) -> Ordering {
    for ((k, lv), rv) in sort_keys.iter().zip(l).zip(r) {
        let ord = match k.direction {
            SortDirection::Desc => rv.cmp(lv),
            _ => lv.cmp(rv),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

impl Executable for OrderByExec {
    fn execute(
        &mut self,
        inputs: &[InputTable<'_>],
        output: &mut TempTable,
        ctx: &ExecutorContext,
    ) -> Result<()> {
        if self
            .sort_keys
            .iter()
            .any(|k| k.direction == SortDirection::Invalid)
        {
            return Err(Error::sql("Invalid sort direction in ORDER BY"));
        }
        let params = ctx.params();
        let mut rows = Vec::with_capacity(inputs[0].row_count());
        for tuple in inputs[0].tuples() {
            let eval = EvalInput::with_outer(params, &tuple);
            let mut key = Vec::with_capacity(self.sort_keys.len());
            for k in &self.sort_keys {
                key.push(k.expr.eval(&eval)?);
            }
            rows.push((key, tuple));
        }
        rows.sort_by(|(l, _), (r, _)| compare_keys(&self.sort_keys, l, r));
        let mut counter = LimitOffset::resolve_opt(self.limit.as_ref(), params)?.counter();
        for (_, tuple) in &rows {
            if counter.is_full() {
                break;
            }
            if counter.admit() {
                output.insert_tuple(tuple)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_datatype::ValueType;
    use tessera_expr::Expr;

    #[test]
    fn test_compare_keys() {
        let keys = vec![
            SortKey {
                expr: Expr::tuple_value(0, ValueType::Integer),
                direction: SortDirection::Asc,
            },
            SortKey {
                expr: Expr::tuple_value(1, ValueType::Integer),
                direction: SortDirection::Desc,
            },
        ];
        let mut rows = vec![
            vec![Value::Integer(2), Value::Integer(1)],
            vec![Value::Integer(1), Value::Integer(1)],
            vec![Value::Null, Value::Integer(0)],
            vec![Value::Integer(1), Value::Integer(3)],
        ];
        rows.sort_by(|l, r| compare_keys(&keys, l, r));
        assert_eq!(
            rows,
            vec![
                vec![Value::Null, Value::Integer(0)],
                vec![Value::Integer(1), Value::Integer(3)],
                vec![Value::Integer(1), Value::Integer(1)],
                vec![Value::Integer(2), Value::Integer(1)],
            ]
        );
    }
}
