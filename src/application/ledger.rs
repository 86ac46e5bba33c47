use super::authorize;
use crate::domain::actor::{Actor, Permission};
use crate::domain::finance::{
    CodeSource, FinanceAction, FinanceDraft, FinanceId, FinanceStatus, FinanceTransaction,
    GeneratedCode, Relation, TransactionType, rejection_reason,
};
use crate::domain::ports::{ClockBox, DirectoryBox, FinanceStoreBox, StatusChange};
use crate::error::{FieldError, LedgerError, Result};
use tracing::{info, warn};

/// What `remove` ended up doing to a transaction.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Removal {
    Deleted,
    Cancelled,
}

/// Owns the lifecycle of finance transactions: validation, code generation
/// and the approval state machine.
///
/// Every mutating call takes the acting user explicitly and checks the
/// matching permission before touching storage. Nothing is retried.
pub struct TransactionLedger {
    finance_store: FinanceStoreBox,
    directory: DirectoryBox,
    clock: ClockBox,
}

impl TransactionLedger {
    pub fn new(finance_store: FinanceStoreBox, directory: DirectoryBox, clock: ClockBox) -> Self {
        Self {
            finance_store,
            directory,
            clock,
        }
    }

    /// Next code from the stored sequence for the type's prefix.
    ///
    /// Does not reserve the code; two concurrent callers may get the same one.
    pub async fn next_sequential_code(&self, transaction_type: TransactionType) -> Result<String> {
        let prefix = transaction_type.code_prefix();
        let last = self
            .finance_store
            .last_sequence(prefix)
            .await
            .map_err(|e| LedgerError::SequenceUnavailable(e.to_string()))?;
        let next = last
            .unwrap_or(0)
            .checked_add(1)
            .ok_or_else(|| LedgerError::SequenceUnavailable(format!("{prefix} sequence exhausted")))?;
        Ok(format!("{prefix}{next:06}"))
    }

    /// Generates a transaction code, falling back to `<prefix><yyyyMMddHHmm>`
    /// when the sequence cannot be read.
    ///
    /// Timestamp codes are not sequential and two generated in the same
    /// minute collide; the insert then fails with `DuplicateCode`.
    pub async fn generate_code(&self, transaction_type: TransactionType) -> GeneratedCode {
        match self.next_sequential_code(transaction_type).await {
            Ok(code) => GeneratedCode {
                code,
                source: CodeSource::Sequence,
            },
            Err(err) => {
                let code = format!(
                    "{}{}",
                    transaction_type.code_prefix(),
                    self.clock.now().format("%Y%m%d%H%M")
                );
                warn!(%code, error = %err, "Falling back to timestamp transaction code");
                GeneratedCode {
                    code,
                    source: CodeSource::TimestampFallback,
                }
            }
        }
    }

    /// Every rule violation in `draft`, empty when it is valid.
    pub fn validate(&self, draft: &FinanceDraft) -> Vec<FieldError> {
        draft.validate(self.clock.today())
    }

    /// Validates and persists a new transaction, returning its id.
    ///
    /// A blank code is generated and a missing status defaults to Pending
    /// before validation runs.
    pub async fn create(&self, actor: &Actor, mut draft: FinanceDraft) -> Result<FinanceId> {
        authorize(actor, Permission::RecordFinance)?;

        if draft.status.is_none() {
            draft.status = Some(FinanceStatus::Pending);
        }
        let code_missing = draft
            .transaction_code
            .as_deref()
            .is_none_or(|c| c.trim().is_empty());
        if code_missing && let Some(transaction_type) = draft.transaction_type {
            draft.transaction_code = Some(self.generate_code(transaction_type).await.code);
        }

        let mut errors = self.validate(&draft);
        if errors.is_empty() {
            let code = draft.transaction_code.as_deref().unwrap_or_default();
            if self.finance_store.code_exists(code).await? {
                errors.push(FieldError::new(
                    "transaction_code",
                    format!("'{}' already exists", code.trim()),
                ));
            }
            if let Some(relation) = draft.relations().first().copied()
                && !self.relation_exists(relation).await?
            {
                errors.push(FieldError::new(
                    "relation",
                    format!("{relation:?} does not exist in the directory"),
                ));
            }
        }
        if !errors.is_empty() {
            return Err(LedgerError::Validation(errors));
        }

        let tx = FinanceTransaction::from_validated(draft, actor.id, self.clock.now())?;
        let code = tx.transaction_code.clone();
        let amount = tx.amount;
        let id = self.finance_store.insert(tx).await?;
        info!(id, %code, %amount, recorded_by = actor.id, "Finance transaction created");
        Ok(id)
    }

    pub async fn get(&self, id: FinanceId) -> Result<FinanceTransaction> {
        self.finance_store
            .get(id)
            .await?
            .ok_or(LedgerError::NotFound {
                entity: "Finance transaction",
                id,
            })
    }

    /// Moves a Recorded transaction into the approval queue.
    pub async fn submit(&self, actor: &Actor, id: FinanceId) -> Result<()> {
        authorize(actor, Permission::RecordFinance)?;
        self.transition(actor, id, FinanceAction::Submit, None).await?;
        info!(id, actor = actor.id, "Finance transaction submitted");
        Ok(())
    }

    pub async fn approve(&self, actor: &Actor, id: FinanceId) -> Result<()> {
        authorize(actor, Permission::ApproveFinance)?;
        self.transition(actor, id, FinanceAction::Approve, None).await?;
        info!(id, approver = actor.id, "Finance transaction approved");
        Ok(())
    }

    /// Rejects a Pending transaction. The reason is trimmed and must be
    /// 10 to 500 characters; it is checked before any state is read.
    pub async fn reject(&self, actor: &Actor, id: FinanceId, reason: &str) -> Result<()> {
        authorize(actor, Permission::ApproveFinance)?;
        let reason = rejection_reason(reason)?;
        self.transition(actor, id, FinanceAction::Reject, Some(reason))
            .await?;
        info!(id, actor = actor.id, "Finance transaction rejected");
        Ok(())
    }

    pub async fn cancel(&self, actor: &Actor, id: FinanceId) -> Result<()> {
        authorize(actor, Permission::CancelFinance)?;
        self.transition(actor, id, FinanceAction::Cancel, None).await?;
        info!(id, actor = actor.id, "Finance transaction cancelled");
        Ok(())
    }

    /// Deletes a transaction that never became financially binding.
    /// Approved transactions are cancelled instead.
    pub async fn remove(&self, actor: &Actor, id: FinanceId) -> Result<Removal> {
        authorize(actor, Permission::CancelFinance)?;
        let tx = self.get(id).await?;
        match tx.status {
            FinanceStatus::Approved => {
                self.transition(actor, id, FinanceAction::Cancel, None).await?;
                info!(id, actor = actor.id, "Approved transaction cancelled instead of deleted");
                Ok(Removal::Cancelled)
            }
            FinanceStatus::Cancelled => Err(LedgerError::InvalidStateTransition {
                id,
                from: tx.status,
                action: FinanceAction::Cancel,
            }),
            _ => {
                if !self.finance_store.delete(id, tx.status).await? {
                    // Moved or removed since it was read.
                    let latest = self.get(id).await?;
                    return Err(LedgerError::InvalidStateTransition {
                        id,
                        from: latest.status,
                        action: FinanceAction::Cancel,
                    });
                }
                info!(id, actor = actor.id, "Finance transaction deleted");
                Ok(Removal::Deleted)
            }
        }
    }

    async fn transition(
        &self,
        actor: &Actor,
        id: FinanceId,
        action: FinanceAction,
        reason: Option<String>,
    ) -> Result<FinanceStatus> {
        let current = self.get(id).await?;
        let next = current
            .status
            .apply(action)
            .ok_or(LedgerError::InvalidStateTransition {
                id,
                from: current.status,
                action,
            })?;

        let change = StatusChange {
            expected: current.status,
            status: next,
            actor: actor.id,
            reason,
        };
        if !self.finance_store.update_status(id, change).await? {
            // Someone else moved it first; report what it is now.
            let latest = self.get(id).await?;
            return Err(LedgerError::InvalidStateTransition {
                id,
                from: latest.status,
                action,
            });
        }
        Ok(next)
    }

    async fn relation_exists(&self, relation: Relation) -> Result<bool> {
        Ok(match relation {
            Relation::Project(id) => self.directory.projects().await?.iter().any(|p| p.id == id),
            Relation::Customer(id) => self.directory.customers().await?.iter().any(|c| c.id == id),
            Relation::Employee(id) => self
                .directory
                .employees()
                .await?
                .iter()
                .any(|e| e.employee_id == id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::directory::{DirectoryEntry, EmployeeDropdownItem};
    use crate::domain::ports::FinanceStore;
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::in_memory::{InMemoryDirectory, InMemoryFinanceStore};
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};
    use rust_decimal_macros::dec;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 15)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap()
    }

    async fn directory() -> InMemoryDirectory {
        let directory = InMemoryDirectory::new();
        directory
            .add_employee(EmployeeDropdownItem {
                employee_id: 7,
                employee_code: "NV007".into(),
                full_name: "Tran Van B".into(),
                department_name: "Finance".into(),
                base_salary: dec!(10000000),
            })
            .await;
        directory.add_project(DirectoryEntry::new(3, "Warehouse")).await;
        directory
    }

    async fn ledger_with(store: FinanceStoreBox) -> TransactionLedger {
        TransactionLedger::new(
            store,
            Box::new(directory().await),
            Box::new(FixedClock::new(now())),
        )
    }

    async fn ledger() -> TransactionLedger {
        ledger_with(Box::new(InMemoryFinanceStore::new())).await
    }

    fn expense() -> FinanceDraft {
        FinanceDraft::new(TransactionType::Expense, "Office", dec!(500000), now().date())
    }

    /// Delegates to an in-memory store but cannot read the code sequence.
    struct NoSequenceStore(InMemoryFinanceStore);

    #[async_trait]
    impl FinanceStore for NoSequenceStore {
        async fn insert(&self, tx: FinanceTransaction) -> Result<FinanceId> {
            self.0.insert(tx).await
        }
        async fn get(&self, id: FinanceId) -> Result<Option<FinanceTransaction>> {
            self.0.get(id).await
        }
        async fn update_status(&self, id: FinanceId, change: StatusChange) -> Result<bool> {
            self.0.update_status(id, change).await
        }
        async fn last_sequence(&self, _prefix: &str) -> Result<Option<u32>> {
            Err(LedgerError::Storage("sequence table offline".into()))
        }
        async fn code_exists(&self, code: &str) -> Result<bool> {
            self.0.code_exists(code).await
        }
        async fn delete(&self, id: FinanceId, expected: FinanceStatus) -> Result<bool> {
            self.0.delete(id, expected).await
        }
    }

    /// Approves every Pending transaction just before forwarding a delete.
    struct ApprovedMeanwhile(InMemoryFinanceStore);

    #[async_trait]
    impl FinanceStore for ApprovedMeanwhile {
        async fn insert(&self, tx: FinanceTransaction) -> Result<FinanceId> {
            self.0.insert(tx).await
        }
        async fn get(&self, id: FinanceId) -> Result<Option<FinanceTransaction>> {
            self.0.get(id).await
        }
        async fn update_status(&self, id: FinanceId, change: StatusChange) -> Result<bool> {
            self.0.update_status(id, change).await
        }
        async fn last_sequence(&self, prefix: &str) -> Result<Option<u32>> {
            self.0.last_sequence(prefix).await
        }
        async fn code_exists(&self, code: &str) -> Result<bool> {
            self.0.code_exists(code).await
        }
        async fn delete(&self, id: FinanceId, expected: FinanceStatus) -> Result<bool> {
            let approve = StatusChange {
                expected: FinanceStatus::Pending,
                status: FinanceStatus::Approved,
                actor: 8,
                reason: None,
            };
            self.0.update_status(id, approve).await?;
            self.0.delete(id, expected).await
        }
    }

    #[tokio::test]
    async fn test_generate_code_sequence() {
        let ledger = ledger().await;
        let admin = Actor::administrator(1);

        let first = ledger.generate_code(TransactionType::Expense).await;
        assert_eq!(first.code, "TC000001");
        assert_eq!(first.source, CodeSource::Sequence);

        ledger.create(&admin, expense()).await.unwrap();
        ledger.create(&admin, expense()).await.unwrap();
        assert_eq!(ledger.generate_code(TransactionType::Expense).await.code, "TC000003");
        assert_eq!(ledger.generate_code(TransactionType::Income).await.code, "TN000001");
    }

    #[tokio::test]
    async fn test_generate_code_is_not_reserved() {
        let ledger = ledger().await;
        let a = ledger.generate_code(TransactionType::Income).await;
        let b = ledger.generate_code(TransactionType::Income).await;
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_generate_code_timestamp_fallback() {
        let ledger = ledger_with(Box::new(NoSequenceStore(InMemoryFinanceStore::new()))).await;
        let generated = ledger.generate_code(TransactionType::Income).await;
        assert_eq!(generated.code, "TN202406151405");
        assert_eq!(generated.source, CodeSource::TimestampFallback);

        assert!(matches!(
            ledger.next_sequential_code(TransactionType::Income).await,
            Err(LedgerError::SequenceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_create_defaults_and_records_actor() {
        let ledger = ledger().await;
        let clerk = Actor::new(5, [Permission::RecordFinance]);
        let id = ledger.create(&clerk, expense().with_employee(7)).await.unwrap();

        let tx = ledger.get(id).await.unwrap();
        assert_eq!(tx.status, FinanceStatus::Pending);
        assert_eq!(tx.recorded_by, 5);
        assert_eq!(tx.transaction_code, "TC000001");
        assert_eq!(tx.relation, Some(Relation::Employee(7)));
        assert_eq!(tx.created_at, now());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_without_persisting() {
        let ledger = ledger().await;
        let admin = Actor::administrator(1);
        let draft = expense().with_project(3).with_customer(4);

        let err = ledger.create(&admin, draft).await.unwrap_err();
        assert_eq!(err.field_errors().len(), 1);
        assert_eq!(err.field_errors()[0].field, "relation");
        assert!(matches!(ledger.get(1).await, Err(LedgerError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_code() {
        let ledger = ledger().await;
        let admin = Actor::administrator(1);
        ledger.create(&admin, expense().with_code("TC000010")).await.unwrap();

        let err = ledger
            .create(&admin, expense().with_code("TC000010"))
            .await
            .unwrap_err();
        assert_eq!(err.field_errors()[0].field, "transaction_code");
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_relation() {
        let ledger = ledger().await;
        let admin = Actor::administrator(1);
        let err = ledger
            .create(&admin, expense().with_employee(99))
            .await
            .unwrap_err();
        assert_eq!(err.field_errors()[0].field, "relation");

        assert!(ledger.create(&admin, expense().with_project(3)).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_requires_permission() {
        let ledger = ledger().await;
        let viewer = Actor::new(2, Vec::<Permission>::new());
        let err = ledger.create(&viewer, expense()).await.unwrap_err();
        assert!(matches!(err, LedgerError::PermissionDenied { actor: 2, .. }));
    }

    #[tokio::test]
    async fn test_approve_twice_fails() {
        let ledger = ledger().await;
        let admin = Actor::administrator(1);
        let id = ledger.create(&admin, expense()).await.unwrap();

        ledger.approve(&admin, id).await.unwrap();
        let err = ledger.approve(&admin, id).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidStateTransition {
                from: FinanceStatus::Approved,
                action: FinanceAction::Approve,
                ..
            }
        ));
        assert_eq!(ledger.get(id).await.unwrap().approved_by, Some(1));
    }

    #[tokio::test]
    async fn test_reject_stores_trimmed_reason() {
        let ledger = ledger().await;
        let admin = Actor::administrator(1);
        let id = ledger.create(&admin, expense()).await.unwrap();

        ledger
            .reject(&admin, id, "   invoice was issued twice  ")
            .await
            .unwrap();
        let tx = ledger.get(id).await.unwrap();
        assert_eq!(tx.status, FinanceStatus::Rejected);
        assert_eq!(tx.rejection_reason.as_deref(), Some("invoice was issued twice"));

        assert!(matches!(
            ledger.cancel(&admin, id).await,
            Err(LedgerError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_short_reason_leaves_state_untouched() {
        let ledger = ledger().await;
        let admin = Actor::administrator(1);
        let id = ledger.create(&admin, expense()).await.unwrap();

        let err = ledger.reject(&admin, id, "too short").await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert_eq!(ledger.get(id).await.unwrap().status, FinanceStatus::Pending);
    }

    #[tokio::test]
    async fn test_recorded_flow() {
        let ledger = ledger().await;
        let admin = Actor::administrator(1);
        let id = ledger
            .create(&admin, expense().with_status(FinanceStatus::Recorded))
            .await
            .unwrap();

        assert!(ledger.approve(&admin, id).await.is_err());
        ledger.submit(&admin, id).await.unwrap();
        ledger.approve(&admin, id).await.unwrap();
        ledger.cancel(&admin, id).await.unwrap();
        assert_eq!(ledger.get(id).await.unwrap().status, FinanceStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_remove_deletes_or_cancels() {
        let ledger = ledger().await;
        let admin = Actor::administrator(1);
        let pending = ledger.create(&admin, expense()).await.unwrap();
        let approved = ledger.create(&admin, expense()).await.unwrap();
        ledger.approve(&admin, approved).await.unwrap();

        assert_eq!(ledger.remove(&admin, pending).await.unwrap(), Removal::Deleted);
        assert!(matches!(ledger.get(pending).await, Err(LedgerError::NotFound { .. })));

        assert_eq!(ledger.remove(&admin, approved).await.unwrap(), Removal::Cancelled);
        assert_eq!(
            ledger.get(approved).await.unwrap().status,
            FinanceStatus::Cancelled
        );
        assert!(ledger.remove(&admin, approved).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_keeps_transaction_approved_meanwhile() {
        let store = InMemoryFinanceStore::new();
        let ledger = ledger_with(Box::new(ApprovedMeanwhile(store.clone()))).await;
        let admin = Actor::administrator(1);
        let id = ledger.create(&admin, expense()).await.unwrap();

        let err = ledger.remove(&admin, id).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidStateTransition {
                from: FinanceStatus::Approved,
                ..
            }
        ));
        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, FinanceStatus::Approved);
        assert_eq!(stored.approved_by, Some(8));
    }

    #[tokio::test]
    async fn test_missing_transaction() {
        let ledger = ledger().await;
        let admin = Actor::administrator(1);
        assert!(matches!(
            ledger.approve(&admin, 404).await,
            Err(LedgerError::NotFound { id: 404, .. })
        ));
    }
}
