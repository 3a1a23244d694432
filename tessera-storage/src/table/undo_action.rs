use super::{TableId, TupleAddress};
use crate::undo::{UndoAction, UndoEnv};

/// Reverts an insert by removing the row.
pub struct InsertUndo {
    pub(crate) table: TableId,
    pub(crate) addr: TupleAddress,
}

impl UndoAction for InsertUndo {
    #[inline]
    fn undo(self: Box<Self>, env: &mut UndoEnv<'_>) {
        env.catalog
            .table_for_undo(self.table)
            .undo_insert(self.addr, env.arena);
    }

    #[inline]
    fn release(self: Box<Self>, env: &mut UndoEnv<'_>) {
        env.catalog.table_for_undo(self.table).release_in_place();
    }
}

/// Keeps a deleted row in place until release.
pub struct DeleteUndo {
    pub(crate) table: TableId,
    pub(crate) addr: TupleAddress,
}

impl UndoAction for DeleteUndo {
    #[inline]
    fn undo(self: Box<Self>, env: &mut UndoEnv<'_>) {
        env.catalog
            .table_for_undo(self.table)
            .undo_delete(self.addr, env.arena);
    }

    #[inline]
    fn release(self: Box<Self>, env: &mut UndoEnv<'_>) {
        env.catalog
            .table_for_undo(self.table)
            .release_delete(self.addr, env.arena);
    }
}

/// Holds the row image before and after an update.
pub struct UpdateUndo {
    pub(crate) table: TableId,
    pub(crate) addr: TupleAddress,
    pub(crate) old_bytes: Box<[u8]>,
    pub(crate) new_bytes: Box<[u8]>,
    /// Some index keys changed and must be swapped back on undo.
    pub(crate) revert_indexes: bool,
}

impl UndoAction for UpdateUndo {
    fn undo(self: Box<Self>, env: &mut UndoEnv<'_>) {
        env.catalog.table_for_undo(self.table).undo_update(
            self.addr,
            &self.old_bytes,
            &self.new_bytes,
            self.revert_indexes,
            env.arena,
        );
    }

    fn release(self: Box<Self>, env: &mut UndoEnv<'_>) {
        let table = env.catalog.table_for_undo(self.table);
        table.release_in_place();
        table.release_update(&self.old_bytes, &self.new_bytes, env.arena);
    }
}
