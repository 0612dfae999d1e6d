///
/// # Transaction Nesting
///
/// One physical engine transaction is shared by any number of logical
/// scopes. The tracker counts open scopes and decides which begin/end calls
/// must reach the engine:
///
/// - `begin` at depth 0 opens the engine transaction; deeper begins only
///   increment the depth.
/// - `end` at depth 1 commits or rolls back the engine transaction; deeper
///   ends only decrement the depth.
/// - A rollback of a nested scope marks the whole transaction rollback-only,
///   so the outermost end rolls back even when it asks to commit.
/// - Ending with no open scope is an error.
///
/// The context token exists exactly while the depth is above zero (and
/// between `begin` and a successful `entered` for the outermost scope).
///

use crate::engine::TxContext;
use crate::errors::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginStep {
    /// Issue the engine's begin statement, then call `entered`.
    Open,
    /// Already inside a transaction; call `entered` directly.
    Nest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndStep {
    /// Inner scope; call `exited` directly.
    Nest,
    /// Issue the engine's commit statement, then call `exited`.
    Commit,
    /// Issue the engine's rollback statement, then call `exited`.
    Rollback,
}

#[derive(Debug, Default)]
pub struct TransactionTracker {
    depth: usize,
    context: Option<TxContext>,
    rollback_only: bool,
    next_id: u64,
}

impl TransactionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) -> BeginStep {
        if self.context.is_none() {
            self.next_id += 1;
            self.context = Some(TxContext::new(self.next_id));
        }
        if self.depth == 0 {
            BeginStep::Open
        } else {
            BeginStep::Nest
        }
    }

    pub fn entered(&mut self) {
        self.depth += 1;
    }

    /// Drops a context created by a `begin` whose engine statement failed.
    pub fn abandon(&mut self) {
        if self.depth == 0 {
            self.context = None;
        }
    }

    pub fn end(&mut self, commit: bool) -> Result<EndStep, DbError> {
        if self.depth == 0 || self.context.is_none() {
            return Err(DbError::NoTransaction {
                action: if commit { "commit" } else { "rollback" },
            });
        }

        if self.depth > 1 {
            if !commit {
                self.rollback_only = true;
            }
            return Ok(EndStep::Nest);
        }

        if commit && !self.rollback_only {
            Ok(EndStep::Commit)
        } else {
            Ok(EndStep::Rollback)
        }
    }

    pub fn exited(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 {
            self.context = None;
            self.rollback_only = false;
        }
    }

    /// Forgets every open scope, used when the engine handle goes away.
    pub fn reset(&mut self) {
        self.depth = 0;
        self.context = None;
        self.rollback_only = false;
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn context(&self) -> Option<&TxContext> {
        self.context.as_ref()
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_scope() {
        let mut tx = TransactionTracker::new();
        assert!(tx.context().is_none());

        assert_eq!(tx.begin(), BeginStep::Open);
        assert!(tx.context().is_some());
        tx.entered();
        assert_eq!(tx.depth(), 1);

        assert_eq!(tx.end(true).unwrap(), EndStep::Commit);
        tx.exited();
        assert_eq!(tx.depth(), 0);
        assert!(tx.context().is_none());
    }

    #[test]
    fn test_nested_scopes_share_one_context() {
        let mut tx = TransactionTracker::new();
        assert_eq!(tx.begin(), BeginStep::Open);
        tx.entered();
        let outer = tx.context().cloned();

        assert_eq!(tx.begin(), BeginStep::Nest);
        tx.entered();
        assert_eq!(tx.depth(), 2);
        assert_eq!(tx.context().cloned(), outer);

        assert_eq!(tx.end(true).unwrap(), EndStep::Nest);
        tx.exited();
        assert_eq!(tx.end(true).unwrap(), EndStep::Commit);
        tx.exited();
        assert!(tx.context().is_none());
    }

    #[test]
    fn test_nested_rollback_poisons_outer_commit() {
        let mut tx = TransactionTracker::new();
        tx.begin();
        tx.entered();
        tx.begin();
        tx.entered();

        assert_eq!(tx.end(false).unwrap(), EndStep::Nest);
        tx.exited();
        assert!(tx.is_rollback_only());

        assert_eq!(tx.end(true).unwrap(), EndStep::Rollback);
        tx.exited();
        assert!(!tx.is_rollback_only());
    }

    #[test]
    fn test_end_without_scope_is_an_error() {
        let mut tx = TransactionTracker::new();
        match tx.end(true) {
            Err(DbError::NoTransaction { action }) => assert_eq!(action, "commit"),
            other => panic!("unexpected result {other:?}"),
        }
        match tx.end(false) {
            Err(DbError::NoTransaction { action }) => assert_eq!(action, "rollback"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_failed_open_drops_context() {
        let mut tx = TransactionTracker::new();
        tx.begin();
        tx.abandon();
        assert!(tx.context().is_none());
        assert_eq!(tx.depth(), 0);
    }

    #[test]
    fn test_contexts_get_fresh_ids() {
        let mut tx = TransactionTracker::new();
        tx.begin();
        tx.entered();
        let first = tx.context().map(TxContext::id);
        tx.end(true).unwrap();
        tx.exited();

        tx.begin();
        let second = tx.context().map(TxContext::id);
        assert_ne!(first, second);
    }
}
