use crate::config::EngineConfig;
use crate::context::ExecutorContext;
use crate::error::{Error, Result};
use crate::exec::ExecutorTree;
use crate::topend::Topend;
use fnv::FnvHashMap;
use std::panic::{self, AssertUnwindSafe};
use tessera_datatype::Value;
use tessera_plan::PlanFragment;
use tessera_storage::catalog::{Catalog, TableDef};
use tessera_storage::config::TempTableLimits;
use tessera_storage::error::FatalError;
use tessera_storage::table::{RowSet, TableId};

/// Engine is the execution engine of one partition.
///
/// It owns the tables of the partition and the fragments loaded by
/// the host, and runs one fragment at a time on the calling thread.
/// Modifications made while an undo token is set are recorded under
/// that token until the host releases or undoes it.
pub struct Engine {
    ctx: ExecutorContext,
    fragments: FnvHashMap<i64, ExecutorTree>,
}

impl Engine {
    pub fn new(config: EngineConfig, topend: Box<dyn Topend>) -> Result<Self> {
        config.validate()?;
        log::debug!(
            "engine of site {} partition {}/{} on host {} started",
            config.site_id,
            config.partition_id,
            config.partition_count,
            config.hostname
        );
        Ok(Engine {
            ctx: ExecutorContext::new(config, topend),
            fragments: FnvHashMap::default(),
        })
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        self.ctx.config()
    }

    #[inline]
    pub fn catalog(&self) -> &Catalog {
        self.ctx.catalog()
    }

    #[inline]
    pub fn create_table(&mut self, def: &TableDef) -> Result<TableId> {
        Ok(self.ctx.catalog.create_table(def)?)
    }

    /// Parses a plan fragment and binds it to executors. Loading an id
    /// again replaces the previous fragment.
    pub fn load_fragment(&mut self, fragment_id: i64, json: &str) -> Result<()> {
        let fragment = PlanFragment::from_json(json)?;
        let tree = ExecutorTree::build(&fragment, &self.ctx)?;
        self.ctx.diagnose(
            log::Level::Debug,
            &format!(
                "loaded fragment {} with {} executors",
                fragment_id,
                tree.nodes().len()
            ),
        );
        self.fragments.insert(fragment_id, tree);
        Ok(())
    }

    #[inline]
    pub fn unload_fragment(&mut self, fragment_id: i64) -> bool {
        self.fragments.remove(&fragment_id).is_some()
    }

    #[inline]
    pub fn is_loaded(&self, fragment_id: i64) -> bool {
        self.fragments.contains_key(&fragment_id)
    }

    /// Sets token of subsequent modifications. Tokens must increase.
    #[inline]
    pub fn set_undo_token(&mut self, token: i64) {
        log::debug!("set undo token {}", token);
        self.ctx.undo_token = Some(token);
    }

    /// Makes modifications up to given token permanent.
    pub fn release_undo_token(&mut self, token: i64) {
        let ctx = &mut self.ctx;
        ctx.undo_log.release(token, &mut ctx.catalog, &mut ctx.arena);
        if matches!(ctx.undo_token, Some(t) if t <= token) {
            ctx.undo_token = None;
        }
    }

    /// Reverts modifications of given token and all later ones.
    pub fn undo_undo_token(&mut self, token: i64) {
        let ctx = &mut self.ctx;
        ctx.undo_log.undo(token, &mut ctx.catalog, &mut ctx.arena);
        if matches!(ctx.undo_token, Some(t) if t >= token) {
            ctx.undo_token = None;
        }
    }

    #[inline]
    pub fn execute_fragment(&mut self, fragment_id: i64, params: &[Value]) -> Result<RowSet> {
        self.run_fragment(fragment_id, None, params)
    }

    /// Executes a fragment whose receive nodes read tables of given
    /// dependency from the host.
    #[inline]
    pub fn execute_fragment_with_dependency(
        &mut self,
        fragment_id: i64,
        dependency_id: i64,
        params: &[Value],
    ) -> Result<RowSet> {
        self.run_fragment(fragment_id, Some(dependency_id), params)
    }

    fn run_fragment(
        &mut self,
        fragment_id: i64,
        dependency_id: Option<i64>,
        params: &[Value],
    ) -> Result<RowSet> {
        let Engine { ctx, fragments } = self;
        let tree = fragments
            .get_mut(&fragment_id)
            .ok_or(Error::FragmentNotLoaded(fragment_id))?;
        ctx.params.clear();
        ctx.params.extend_from_slice(params);
        ctx.input_dependency_id = dependency_id;
        ctx.tuples_modified = 0;
        let res = panic::catch_unwind(AssertUnwindSafe(|| tree.execute(ctx)));
        tree.clear_outputs();
        ctx.input_dependency_id = None;
        match res {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => {
                ctx.diagnose(
                    log::Level::Warn,
                    &format!("fragment {} failed: {}", fragment_id, e),
                );
                Err(e)
            }
            Err(payload) => {
                if let Some(fatal) = payload.downcast_ref::<FatalError>() {
                    ctx.topend().crash(fatal);
                }
                panic::resume_unwind(payload)
            }
        }
    }

    /// Rows modified by the last executed fragment.
    #[inline]
    pub fn tuples_modified(&self) -> i64 {
        self.ctx.tuples_modified
    }

    #[inline]
    pub fn temp_table_limits(&self) -> &TempTableLimits {
        self.ctx.limits()
    }

    /// Compacts sparse blocks of given table, returns number of tuples
    /// moved. Nothing is moved while undo actions of the table are pending.
    pub fn do_forced_compaction(&mut self, table: &str) -> Result<usize> {
        let ctx = &mut self.ctx;
        let t = ctx
            .catalog
            .table_by_name_mut(table)
            .ok_or_else(|| Error::TableNotExists(table.to_string()))?;
        Ok(t.do_forced_compaction(&mut ctx.arena))
    }
}
