use super::{count_table, InputTable, Modifier};
use crate::context::{ExecutorContext, Partitioner};
use crate::error::{Error, Result};
use tessera_datatype::Value;
use tessera_plan::{DeleteNode, InsertNode, PlanNode, PlanNodeId, UpdateNode};
use tessera_storage::error::{ConstraintKind, Error as StorageError};
use tessera_storage::table::{PersistentTable, TableId, TempTable};

const MODIFIED_TUPLES: &str = "modified_tuples";

#[inline]
fn tuple_address(row: &[Value]) -> Result<u64> {
    row.first()
        .and_then(Value::as_address)
        .ok_or_else(|| Error::sql("input row carries no tuple address"))
}

/// Rejects a row not owned by this partition.
#[inline]
fn check_partition(
    partitioner: &Partitioner,
    table: &PersistentTable,
    row: &[Value],
    detail: &str,
) -> Result<()> {
    if let Some(v) = table.partition_column().and_then(|c| row.get(c)) {
        if !partitioner.is_local(v) {
            return Err(Error::Storage(StorageError::constraint(
                ConstraintKind::Partitioning,
                table.name(),
                detail,
            )));
        }
    }
    Ok(())
}

/// Inserts input rows into a persistent table.
pub struct InsertExec {
    node: PlanNodeId,
    table: String,
    multi_partition: bool,
}

impl InsertExec {
    pub fn init(
        plan: &PlanNode,
        node: &InsertNode,
        inputs: &[InputTable<'_>],
        ctx: &ExecutorContext,
    ) -> Result<(Self, TempTable)> {
        let table = ctx.table(&node.target_table)?;
        let width = table.column_names().len();
        if let Some(input) = inputs.first() {
            if input.column_count() != width {
                return Err(Error::InvalidPlanNode(
                    plan.id,
                    format!(
                        "insert of {} columns into {} of {} columns",
                        input.column_count(),
                        table.name(),
                        width
                    ),
                ));
            }
        }
        Ok((
            InsertExec {
                node: plan.id,
                table: node.target_table.clone(),
                multi_partition: node.multi_partition,
            },
            count_table(plan, MODIFIED_TUPLES, ctx),
        ))
    }
}

impl Modifier for InsertExec {
    fn modify(&mut self, rows: Vec<Vec<Value>>, ctx: &mut ExecutorContext) -> Result<i64> {
        let partitioner = ctx.partitioner();
        let (table, arena, mut undo) = ctx.modify_parts(&self.table)?;
        let width = table.column_names().len();
        let mut count = 0;
        let mut skipped = 0;
        for row in rows {
            if row.len() != width {
                return Err(Error::InvalidPlanNode(
                    self.node,
                    format!("insert row of {} values into {} columns", row.len(), width),
                ));
            }
            if self.multi_partition {
                // every partition receives all rows and keeps its own
                let local = table
                    .partition_column()
                    .map(|c| partitioner.is_local(&row[c]))
                    .unwrap_or(true);
                if !local {
                    skipped += 1;
                    continue;
                }
            } else {
                check_partition(
                    &partitioner,
                    table,
                    &row,
                    "Mispartitioned tuple in single-partition insert statement",
                )?;
            }
            table.insert_tuple(&row, arena, undo.as_deref_mut())?;
            count += 1;
        }
        if skipped > 0 {
            log::warn!(
                "multi-partition insert into {} skipped {} rows of other partitions",
                self.table,
                skipped
            );
        }
        Ok(count)
    }
}

/// Updates rows addressed by input column 0 with values of the
/// remaining input columns, matched to table columns by name.
pub struct UpdateExec {
    node: PlanNodeId,
    table: String,
    input_columns: Vec<String>,
    resolved: Option<ResolvedUpdate>,
}

/// Target columns and affected indexes, valid for one table id.
struct ResolvedUpdate {
    table_id: TableId,
    columns: Vec<usize>,
    indexes: Vec<usize>,
}

impl UpdateExec {
    pub fn init(
        plan: &PlanNode,
        node: &UpdateNode,
        inputs: &[InputTable<'_>],
        ctx: &ExecutorContext,
    ) -> Result<(Self, TempTable)> {
        let table = ctx.table(&node.target_table)?;
        let names = inputs[0].column_names();
        if names.is_empty() {
            return Err(Error::InvalidPlanNode(
                plan.id,
                "update input lacks tuple address column".to_string(),
            ));
        }
        let mut exec = UpdateExec {
            node: plan.id,
            table: node.target_table.clone(),
            input_columns: names[1..].to_vec(),
            resolved: None,
        };
        exec.resolved = Some(exec.resolve(table)?);
        Ok((exec, count_table(plan, MODIFIED_TUPLES, ctx)))
    }

    fn resolve(&self, table: &PersistentTable) -> Result<ResolvedUpdate> {
        let columns = self
            .input_columns
            .iter()
            .map(|name| {
                table.column_index(name).ok_or_else(|| {
                    Error::InvalidPlanNode(
                        self.node,
                        format!("column {} not found in table {}", name, table.name()),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let indexes = table.indexes_to_update(&columns);
        Ok(ResolvedUpdate {
            table_id: table.id(),
            columns,
            indexes,
        })
    }
}

impl Modifier for UpdateExec {
    fn modify(&mut self, rows: Vec<Vec<Value>>, ctx: &mut ExecutorContext) -> Result<i64> {
        let partitioner = ctx.partitioner();
        let (table, arena, mut undo) = ctx.modify_parts(&self.table)?;
        // table may be recreated between executions
        if self.resolved.as_ref().map(|r| r.table_id) != Some(table.id()) {
            self.resolved = Some(self.resolve(table)?);
        }
        let resolved = match &self.resolved {
            Some(r) => r,
            None => return Ok(0),
        };
        let partition_changes = table
            .partition_column()
            .map(|c| resolved.columns.contains(&c))
            .unwrap_or(false);
        let mut count = 0;
        for row in rows {
            let addr = tuple_address(&row)?;
            if row.len() != resolved.columns.len() + 1 {
                return Err(Error::InvalidPlanNode(
                    self.node,
                    format!("update row of {} values", row.len()),
                ));
            }
            let mut values = table
                .tuple(addr, &*arena)
                .ok_or(StorageError::TupleNotFound)?
                .values();
            for (src, dst) in resolved.columns.iter().enumerate() {
                values[*dst] = row[src + 1].clone();
            }
            if partition_changes {
                check_partition(
                    &partitioner,
                    table,
                    &values,
                    "An update to a partitioning column triggered a partitioning error",
                )?;
            }
            table.update_tuple(addr, &values, Some(resolved.indexes.as_slice()), arena, undo.as_deref_mut())?;
            count += 1;
        }
        Ok(count)
    }
}

/// Deletes rows addressed by input column 0, or all rows on truncate.
pub struct DeleteExec {
    table: String,
    truncate: bool,
}

impl DeleteExec {
    pub fn init(
        plan: &PlanNode,
        node: &DeleteNode,
        _inputs: &[InputTable<'_>],
        ctx: &ExecutorContext,
    ) -> Result<(Self, TempTable)> {
        ctx.table(&node.target_table)?;
        Ok((
            DeleteExec {
                table: node.target_table.clone(),
                truncate: node.truncate,
            },
            count_table(plan, MODIFIED_TUPLES, ctx),
        ))
    }
}

impl Modifier for DeleteExec {
    fn modify(&mut self, rows: Vec<Vec<Value>>, ctx: &mut ExecutorContext) -> Result<i64> {
        let (table, arena, mut undo) = ctx.modify_parts(&self.table)?;
        if self.truncate {
            let count = table.active_tuple_count() as i64;
            table.delete_all_tuples(arena, undo)?;
            return Ok(count);
        }
        let mut count = 0;
        for row in rows {
            let addr = tuple_address(&row)?;
            table.delete_tuple(addr, arena, undo.as_deref_mut())?;
            count += 1;
        }
        Ok(count)
    }
}
