use super::directory::{DirectoryEntry, EmployeeDropdownItem};
use super::finance::{FinanceId, FinanceStatus, FinanceTransaction};
use super::salary::{DeleteCheck, PaymentStatus, SalaryId, SalaryRecord};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

/// A compare-and-set status change on a finance transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub expected: FinanceStatus,
    pub status: FinanceStatus,
    pub actor: u32,
    pub reason: Option<String>,
}

#[async_trait]
pub trait FinanceStore: Send + Sync {
    /// Persists a new transaction and returns its assigned id.
    /// Fails with `DuplicateCode` if the code is already taken.
    async fn insert(&self, tx: FinanceTransaction) -> Result<FinanceId>;
    async fn get(&self, id: FinanceId) -> Result<Option<FinanceTransaction>>;
    /// Applies `change` only if the current status equals `change.expected`.
    /// Returns `false` when the record is missing or its status differs.
    async fn update_status(&self, id: FinanceId, change: StatusChange) -> Result<bool>;
    /// Highest numeric suffix among codes starting with `prefix`.
    async fn last_sequence(&self, prefix: &str) -> Result<Option<u32>>;
    async fn code_exists(&self, code: &str) -> Result<bool>;
    /// Deletes the transaction only if its status equals `expected`.
    /// Returns `false` when the record is missing or its status differs.
    async fn delete(&self, id: FinanceId, expected: FinanceStatus) -> Result<bool>;
}

#[async_trait]
pub trait SalaryStore: Send + Sync {
    /// Persists a new record and returns its assigned id.
    /// Fails with `DuplicateSalary` if the employee already has a record for the period.
    async fn insert(&self, record: SalaryRecord) -> Result<SalaryId>;
    async fn get(&self, id: SalaryId) -> Result<Option<SalaryRecord>>;
    async fn by_employee(&self, employee_id: u32) -> Result<Vec<SalaryRecord>>;
    /// Replaces the stored record only if its payment status equals `expected`.
    /// Returns `false` when the record is missing or its status differs.
    async fn update(&self, record: SalaryRecord, expected: PaymentStatus) -> Result<bool>;
    async fn can_delete(&self, id: SalaryId) -> Result<DeleteCheck>;
    /// Deletes the record only if it is still eligible for deletion.
    /// Returns `false` when the record is missing or no longer eligible.
    async fn delete(&self, id: SalaryId) -> Result<bool>;
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn employees(&self) -> Result<Vec<EmployeeDropdownItem>>;
    async fn projects(&self) -> Result<Vec<DirectoryEntry>>;
    async fn customers(&self) -> Result<Vec<DirectoryEntry>>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

pub type FinanceStoreBox = Box<dyn FinanceStore>;
pub type SalaryStoreBox = Box<dyn SalaryStore>;
pub type DirectoryBox = Box<dyn Directory>;
pub type ClockBox = Box<dyn Clock>;
