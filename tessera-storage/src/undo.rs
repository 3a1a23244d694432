use crate::catalog::Catalog;
use crate::pool::PoolArena;
use crate::table::TableId;
use std::collections::VecDeque;

const INITIAL_INTEREST_CAPACITY: usize = 16;

/// UndoAction is one reversible step of a transaction.
/// Exactly one of `undo` and `release` is called, which consumes it.
pub trait UndoAction {
    /// Reverts the change.
    fn undo(self: Box<Self>, env: &mut UndoEnv<'_>);

    /// Finalizes the change, freeing what was kept only for reverting.
    fn release(self: Box<Self>, env: &mut UndoEnv<'_>);
}

/// Storage reachable by undo actions.
pub struct UndoEnv<'a> {
    pub catalog: &'a mut Catalog,
    pub arena: &'a mut PoolArena,
    /// Set when no other quantum is pending, so rows may be moved.
    pub allow_compaction: bool,
}

/// UndoQuantum collects undo actions of one token.
pub struct UndoQuantum {
    token: i64,
    actions: Vec<Box<dyn UndoAction>>,
    interests: Vec<TableId>,
}

impl UndoQuantum {
    #[inline]
    pub fn new(token: i64) -> Self {
        UndoQuantum {
            token,
            actions: vec![],
            interests: Vec::with_capacity(INITIAL_INTEREST_CAPACITY),
        }
    }

    #[inline]
    pub fn token(&self) -> i64 {
        self.token
    }

    #[inline]
    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    #[inline]
    pub fn register_undo_action(&mut self, action: Box<dyn UndoAction>) {
        self.actions.push(action);
    }

    /// Registers a table to be notified after release.
    #[inline]
    pub fn register_interest(&mut self, table: TableId) {
        if !self.interests.contains(&table) {
            self.interests.push(table);
        }
    }

    #[inline]
    pub fn interests(&self) -> &[TableId] {
        &self.interests
    }

    /// Reverts all actions, newest first.
    pub fn undo(self, env: &mut UndoEnv<'_>) {
        for action in self.actions.into_iter().rev() {
            action.undo(env);
        }
    }

    /// Finalizes all actions, newest first, then notifies interested tables.
    pub fn release(self, env: &mut UndoEnv<'_>) {
        for action in self.actions.into_iter().rev() {
            action.release(env);
        }
        for id in self.interests {
            if let Some(table) = env.catalog.table_mut(id) {
                table.notify_quantum_release(env.arena, env.allow_compaction);
            }
        }
    }
}

/// UndoLog keeps pending quanta ordered by token.
pub struct UndoLog {
    quanta: VecDeque<UndoQuantum>,
    last_undo_token: i64,
    last_release_token: i64,
}

impl Default for UndoLog {
    #[inline]
    fn default() -> Self {
        UndoLog::new()
    }
}

impl UndoLog {
    #[inline]
    pub fn new() -> Self {
        UndoLog {
            quanta: VecDeque::new(),
            last_undo_token: i64::MIN,
            last_release_token: i64::MIN,
        }
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.quanta.len()
    }

    #[inline]
    pub fn last_undo_token(&self) -> i64 {
        self.last_undo_token
    }

    #[inline]
    pub fn last_release_token(&self) -> i64 {
        self.last_release_token
    }

    /// Returns the quantum of given token, creating it if needed.
    /// Tokens must not decrease.
    pub fn generate_undo_quantum(&mut self, token: i64) -> &mut UndoQuantum {
        let reuse = matches!(self.quanta.back(), Some(q) if q.token == token);
        if !reuse {
            if token <= self.last_undo_token {
                fatal!(
                    "undo token {} is not greater than last undo token {}",
                    token,
                    self.last_undo_token
                )
            }
            log::debug!("new undo quantum {}", token);
            self.last_undo_token = token;
            self.quanta.push_back(UndoQuantum::new(token));
        }
        match self.quanta.back_mut() {
            Some(q) => q,
            None => fatal!("undo log is empty after generating quantum {}", token),
        }
    }

    /// Reverts every quantum whose token is not less than given one,
    /// newest first.
    pub fn undo(&mut self, token: i64, catalog: &mut Catalog, arena: &mut PoolArena) {
        if token > self.last_undo_token || token <= self.last_release_token {
            log::warn!(
                "ignore undo of unknown token {}, last undo token {}, last release token {}",
                token,
                self.last_undo_token,
                self.last_release_token
            );
            return;
        }
        log::debug!("undo to token {}", token);
        while matches!(self.quanta.back(), Some(q) if q.token >= token) {
            if let Some(q) = self.quanta.pop_back() {
                let mut env = UndoEnv {
                    catalog: &mut *catalog,
                    arena: &mut *arena,
                    allow_compaction: false,
                };
                q.undo(&mut env);
            }
        }
        self.last_undo_token = token - 1;
    }

    /// Releases every quantum whose token is not greater than given one,
    /// oldest first.
    pub fn release(&mut self, token: i64, catalog: &mut Catalog, arena: &mut PoolArena) {
        if token <= self.last_release_token {
            log::warn!(
                "ignore release of stale token {}, last release token {}",
                token,
                self.last_release_token
            );
            return;
        }
        log::debug!("release to token {}", token);
        while matches!(self.quanta.front(), Some(q) if q.token <= token) {
            if let Some(q) = self.quanta.pop_front() {
                let mut env = UndoEnv {
                    catalog: &mut *catalog,
                    arena: &mut *arena,
                    allow_compaction: self.quanta.is_empty(),
                };
                q.release(&mut env);
            }
        }
        self.last_release_token = token;
    }
}
