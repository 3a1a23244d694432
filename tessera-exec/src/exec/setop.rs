use super::{temp_table_like, Executable, InputTable};
use crate::context::ExecutorContext;
use crate::error::{Error, Result};
use fnv::{FnvBuildHasher, FnvHashSet};
use indexmap::IndexMap;
use tessera_datatype::Value;
use tessera_plan::{PlanNode, SetOpType, UnionNode};
use tessera_storage::table::TempTable;

type Multiset = IndexMap<Vec<Value>, usize, FnvBuildHasher>;

/// Combines rows of all inputs by a set operation.
/// Except keeps row order of the first input, intersect that of the
/// smallest input.
pub struct UnionExec {
    set_op: SetOpType,
}

impl UnionExec {
    pub fn init(
        plan: &PlanNode,
        node: &UnionNode,
        inputs: &[InputTable<'_>],
        ctx: &ExecutorContext,
    ) -> Result<(Self, TempTable)> {
        let width = inputs[0].column_count();
        if let Some(other) = inputs.iter().find(|i| i.column_count() != width) {
            return Err(Error::InvalidPlanNode(
                plan.id,
                format!(
                    "{:?} input {} has {} columns, expected {}",
                    node.set_op,
                    other.name(),
                    other.column_count(),
                    width
                ),
            ));
        }
        Ok((UnionExec { set_op: node.set_op }, temp_table_like(plan, &inputs[0], ctx)))
    }
}

fn multiset(input: &InputTable<'_>, all: bool) -> Multiset {
    let mut res = Multiset::default();
    for tuple in input.tuples() {
        let count = res.entry(tuple.values()).or_insert(0);
        if all || *count == 0 {
            *count += 1;
        }
    }
    res
}

impl Executable for UnionExec {
    fn execute(
        &mut self,
        inputs: &[InputTable<'_>],
        output: &mut TempTable,
        _ctx: &ExecutorContext,
    ) -> Result<()> {
        let all = self.set_op.is_all();
        let counts = match self.set_op {
            SetOpType::UnionAll => {
                for input in inputs {
                    for tuple in input.tuples() {
                        output.insert_tuple(&tuple)?;
                    }
                }
                return Ok(());
            }
            SetOpType::Union => {
                let mut seen = FnvHashSet::default();
                for input in inputs {
                    for tuple in input.tuples() {
                        let row = tuple.values();
                        if !seen.contains(&row) {
                            output.insert_values(&row)?;
                            seen.insert(row);
                        }
                    }
                }
                return Ok(());
            }
            SetOpType::Except | SetOpType::ExceptAll => {
                let mut counts = multiset(&inputs[0], all);
                for input in &inputs[1..] {
                    for tuple in input.tuples() {
                        if let Some(c) = counts.get_mut(&tuple.values()) {
                            *c = if all { c.saturating_sub(1) } else { 0 };
                        }
                    }
                }
                counts
            }
            SetOpType::Intersect | SetOpType::IntersectAll => {
                let smallest = (0..inputs.len())
                    .min_by_key(|i| inputs[*i].row_count())
                    .unwrap_or(0);
                let mut counts = multiset(&inputs[smallest], all);
                for (i, input) in inputs.iter().enumerate() {
                    if i == smallest {
                        continue;
                    }
                    let other = multiset(input, all);
                    for (row, c) in counts.iter_mut() {
                        *c = (*c).min(other.get(row).copied().unwrap_or(0));
                    }
                }
                counts
            }
        };
        for (row, c) in &counts {
            for _ in 0..*c {
                output.insert_values(row)?;
            }
        }
        Ok(())
    }
}
