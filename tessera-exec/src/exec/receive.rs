use super::{temp_table, Executable, InputTable};
use crate::context::ExecutorContext;
use crate::error::{Error, Result};
use tessera_plan::{PlanFragment, PlanNode, PlanNodeId};
use tessera_storage::table::TempTable;

/// Collects rows sent by other partitions. The host delivers them as
/// serialized tables of the current input dependency.
pub struct ReceiveExec {
    node: PlanNodeId,
}

impl ReceiveExec {
    pub fn init(
        fragment: &PlanFragment,
        plan: &PlanNode,
        ctx: &ExecutorContext,
    ) -> Result<(Self, TempTable)> {
        let columns = fragment.output_schema(plan.id)?;
        let output = temp_table(plan, columns, ctx)?;
        Ok((ReceiveExec { node: plan.id }, output))
    }
}

impl Executable for ReceiveExec {
    fn execute(
        &mut self,
        _inputs: &[InputTable<'_>],
        output: &mut TempTable,
        ctx: &ExecutorContext,
    ) -> Result<()> {
        let dep = ctx
            .input_dependency_id
            .ok_or_else(|| Error::sql("receive without input dependency"))?;
        let mut tables = 0;
        while let Some(bytes) = ctx.topend().load_next_dependency(dep) {
            output.decode_from(&bytes)?;
            tables += 1;
        }
        log::debug!(
            "receive node {} loaded {} tables, {} rows of dependency {}",
            self.node,
            tables,
            output.row_count(),
            dep
        );
        Ok(())
    }
}
