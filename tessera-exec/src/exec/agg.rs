use super::limit::{LimitCounter, LimitOffset};
use super::{check_columns, temp_table, Executable, InputTable};
use crate::context::ExecutorContext;
use crate::error::{Error, Result};
use fnv::{FnvBuildHasher, FnvHashSet};
use indexmap::IndexMap;
use std::cmp::Ordering;
use tessera_datatype::{Value, ValueType};
use tessera_expr::{EvalInput, Expr};
use tessera_plan::{AggregateColumn, AggregateNode, AggregateType, LimitNode, PlanNode};
use tessera_storage::table::TempTable;

/// Running state of one aggregate function.
struct Accumulator {
    agg_type: AggregateType,
    distinct: Option<FnvHashSet<Value>>,
    count: i64,
    value: Value,
}

impl Accumulator {
    fn new(col: &AggregateColumn) -> Self {
        Accumulator {
            agg_type: col.agg_type,
            distinct: if col.distinct {
                Some(FnvHashSet::default())
            } else {
                None
            },
            count: 0,
            value: Value::Null,
        }
    }

    fn advance(&mut self, v: &Value) -> Result<()> {
        if self.agg_type == AggregateType::CountStar {
            self.count += 1;
            return Ok(());
        }
        if v.is_null() {
            return Ok(());
        }
        if let Some(seen) = &mut self.distinct {
            if !seen.insert(v.clone()) {
                return Ok(());
            }
        }
        self.count += 1;
        match self.agg_type {
            AggregateType::Sum | AggregateType::Avg => {
                self.value = if self.value.is_null() {
                    v.clone()
                } else {
                    self.value.add(v)?
                };
            }
            AggregateType::Min => {
                if self.value.is_null() || v.compare(&self.value)? == Ordering::Less {
                    self.value = v.clone();
                }
            }
            AggregateType::Max => {
                if self.value.is_null() || v.compare(&self.value)? == Ordering::Greater {
                    self.value = v.clone();
                }
            }
            AggregateType::Count | AggregateType::CountStar => (),
        }
        Ok(())
    }

    fn finish(&self, ty: ValueType) -> Result<Value> {
        let v = match self.agg_type {
            AggregateType::CountStar | AggregateType::Count => Value::BigInt(self.count),
            AggregateType::Avg if self.count == 0 => Value::Null,
            AggregateType::Avg => self.value.div(&Value::BigInt(self.count))?,
            _ => self.value.clone(),
        };
        Ok(v.cast_as(ty)?)
    }
}

/// One group: values of its first input row and its accumulators.
struct Group {
    first: Vec<Value>,
    accs: Vec<Accumulator>,
}

/// Computes aggregates over groups of input rows.
///
/// Serial mode expects rows of a group to arrive consecutively,
/// hashed mode accepts any order and emits groups in order of
/// first appearance.
pub struct AggregateExec {
    hashed: bool,
    aggregates: Vec<AggregateColumn>,
    group_by: Vec<Expr>,
    /// Output position and expression of non-aggregate columns.
    pass_through: Vec<(usize, Expr)>,
    output_types: Vec<ValueType>,
    limit: Option<LimitNode>,
}

impl AggregateExec {
    pub fn init(
        plan: &PlanNode,
        node: &AggregateNode,
        hashed: bool,
        inputs: &[InputTable<'_>],
        ctx: &ExecutorContext,
    ) -> Result<(Self, TempTable)> {
        let columns = plan
            .output_schema
            .as_deref()
            .ok_or(tessera_plan::Error::NoOutputSchema(plan.id))?;
        for agg in &node.aggregates {
            if agg.output_column >= columns.len() {
                return Err(Error::InvalidPlanNode(
                    plan.id,
                    format!("aggregate output column {} out of range", agg.output_column),
                ));
            }
            if agg.agg_type != AggregateType::CountStar && agg.expr.is_none() {
                return Err(Error::InvalidPlanNode(
                    plan.id,
                    format!("aggregate {:?} has no expression", agg.agg_type),
                ));
            }
        }
        let pass_through: Vec<(usize, Expr)> = columns
            .iter()
            .enumerate()
            .filter(|(i, _)| !node.aggregates.iter().any(|a| a.output_column == *i))
            .map(|(i, c)| (i, c.expr.clone()))
            .collect();
        let pass_columns: Vec<_> = pass_through.iter().map(|(i, _)| columns[*i].clone()).collect();
        check_columns(plan, &pass_columns, inputs[0].column_count(), 0)?;
        let output = temp_table(plan, columns, ctx)?;
        log::debug!(
            "{} aggregate node {} with {} aggregates grouped by {} expressions",
            if hashed { "hash" } else { "serial" },
            plan.id,
            node.aggregates.len(),
            node.group_by.len()
        );
        Ok((
            AggregateExec {
                hashed,
                aggregates: node.aggregates.clone(),
                group_by: node.group_by.clone(),
                pass_through,
                output_types: columns.iter().map(|c| c.expr.ty).collect(),
                limit: plan.inline_limit.clone(),
            },
            output,
        ))
    }

    fn new_group(&self, first: Vec<Value>) -> Group {
        Group {
            first,
            accs: self.aggregates.iter().map(Accumulator::new).collect(),
        }
    }

    fn advance(&self, group: &mut Group, input: &EvalInput<'_>) -> Result<()> {
        for (agg, acc) in self.aggregates.iter().zip(group.accs.iter_mut()) {
            match &agg.expr {
                Some(e) => acc.advance(&e.eval(input)?)?,
                None => acc.advance(&Value::Null)?,
            }
        }
        Ok(())
    }

    fn group_key(&self, input: &EvalInput<'_>) -> Result<Vec<Value>> {
        let mut key = Vec::with_capacity(self.group_by.len());
        for e in &self.group_by {
            key.push(e.eval(input)?);
        }
        Ok(key)
    }

    fn emit(
        &self,
        group: &Group,
        params: &[Value],
        counter: &mut LimitCounter,
        output: &mut TempTable,
    ) -> Result<()> {
        if !counter.admit() {
            return Ok(());
        }
        let mut row = vec![Value::Null; self.output_types.len()];
        let input = EvalInput::with_outer(params, &group.first);
        for (pos, e) in &self.pass_through {
            row[*pos] = e.eval(&input)?;
        }
        for (agg, acc) in self.aggregates.iter().zip(&group.accs) {
            row[agg.output_column] = acc.finish(self.output_types[agg.output_column])?;
        }
        output.insert_values(&row)?;
        Ok(())
    }
}

impl Executable for AggregateExec {
    fn execute(
        &mut self,
        inputs: &[InputTable<'_>],
        output: &mut TempTable,
        ctx: &ExecutorContext,
    ) -> Result<()> {
        let params = ctx.params();
        let input = inputs[0];
        let mut counter = LimitOffset::resolve_opt(self.limit.as_ref(), params)?.counter();
        if self.group_by.is_empty() {
            let mut group: Option<Group> = None;
            for tuple in input.tuples() {
                let eval = EvalInput::with_outer(params, &tuple);
                let g = group.get_or_insert_with(|| self.new_group(tuple.values()));
                self.advance(g, &eval)?;
            }
            // aggregate of no rows still produces one row
            let group = match group {
                Some(g) => g,
                None => self.new_group(vec![Value::Null; input.column_count()]),
            };
            return self.emit(&group, params, &mut counter, output);
        }
        if self.hashed {
            let mut groups: IndexMap<Vec<Value>, Group, FnvBuildHasher> = IndexMap::default();
            for tuple in input.tuples() {
                let eval = EvalInput::with_outer(params, &tuple);
                let key = self.group_key(&eval)?;
                let g = groups
                    .entry(key)
                    .or_insert_with(|| self.new_group(tuple.values()));
                self.advance(g, &eval)?;
            }
            for g in groups.values() {
                if counter.is_full() {
                    break;
                }
                self.emit(g, params, &mut counter, output)?;
            }
            return Ok(());
        }
        let mut current: Option<(Vec<Value>, Group)> = None;
        for tuple in input.tuples() {
            if counter.is_full() {
                return Ok(());
            }
            let eval = EvalInput::with_outer(params, &tuple);
            let key = self.group_key(&eval)?;
            let same = matches!(&current, Some((k, _)) if *k == key);
            if !same {
                if let Some((_, g)) = current.take() {
                    self.emit(&g, params, &mut counter, output)?;
                }
                current = Some((key, self.new_group(tuple.values())));
            }
            if let Some((_, g)) = current.as_mut() {
                self.advance(g, &eval)?;
            }
        }
        if let Some((_, g)) = current {
            if !counter.is_full() {
                self.emit(&g, params, &mut counter, output)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(agg_type: AggregateType, distinct: bool) -> AggregateColumn {
        AggregateColumn {
            agg_type,
            distinct,
            output_column: 0,
            expr: None,
        }
    }

    fn run(agg_type: AggregateType, distinct: bool, vs: &[Value], ty: ValueType) -> Value {
        let mut acc = Accumulator::new(&col(agg_type, distinct));
        for v in vs {
            acc.advance(v).unwrap();
        }
        acc.finish(ty).unwrap()
    }

    #[test]
    fn test_accumulators() {
        let vs = [
            Value::Integer(4),
            Value::Null,
            Value::Integer(1),
            Value::Integer(4),
        ];
        assert_eq!(run(AggregateType::CountStar, false, &vs, ValueType::BigInt), Value::BigInt(4));
        assert_eq!(run(AggregateType::Count, false, &vs, ValueType::BigInt), Value::BigInt(3));
        assert_eq!(run(AggregateType::Count, true, &vs, ValueType::BigInt), Value::BigInt(2));
        assert_eq!(run(AggregateType::Sum, false, &vs, ValueType::BigInt), Value::BigInt(9));
        assert_eq!(run(AggregateType::Sum, true, &vs, ValueType::BigInt), Value::BigInt(5));
        assert_eq!(run(AggregateType::Avg, false, &vs, ValueType::Integer), Value::Integer(3));
        assert_eq!(run(AggregateType::Min, false, &vs, ValueType::Integer), Value::Integer(1));
        assert_eq!(run(AggregateType::Max, false, &vs, ValueType::Integer), Value::Integer(4));
    }

    #[test]
    fn test_empty_accumulators() {
        assert_eq!(run(AggregateType::CountStar, false, &[], ValueType::BigInt), Value::BigInt(0));
        assert_eq!(run(AggregateType::Sum, false, &[Value::Null], ValueType::BigInt), Value::Null);
        assert_eq!(run(AggregateType::Avg, false, &[], ValueType::Double), Value::Null);
        assert_eq!(run(AggregateType::Max, false, &[], ValueType::Integer), Value::Null);
    }

    #[test]
    fn test_double_avg() {
        let vs = [Value::Double(1.0), Value::Double(2.0)];
        assert_eq!(run(AggregateType::Avg, false, &vs, ValueType::Double), Value::Double(1.5));
    }
}
