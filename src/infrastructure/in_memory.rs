use crate::domain::directory::{DirectoryEntry, EmployeeDropdownItem};
use crate::domain::finance::{FinanceId, FinanceStatus, FinanceTransaction};
use crate::domain::ports::{Directory, FinanceStore, SalaryStore, StatusChange};
use crate::domain::salary::{DeleteCheck, PaymentStatus, Period, SalaryId, SalaryRecord};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Numeric suffix of `code` after `prefix`, if the rest is all digits.
pub(crate) fn code_sequence(code: &str, prefix: &str) -> Option<u32> {
    let rest = code.strip_prefix(prefix)?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

#[derive(Default)]
struct FinanceTable {
    rows: BTreeMap<FinanceId, FinanceTransaction>,
    next_id: FinanceId,
}

/// A thread-safe in-memory finance gateway.
///
/// Code uniqueness is checked and the row inserted under one write lock.
#[derive(Default, Clone)]
pub struct InMemoryFinanceStore {
    table: Arc<RwLock<FinanceTable>>,
}

impl InMemoryFinanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FinanceStore for InMemoryFinanceStore {
    async fn insert(&self, mut tx: FinanceTransaction) -> Result<FinanceId> {
        let mut table = self.table.write().await;
        if table
            .rows
            .values()
            .any(|row| row.transaction_code.eq_ignore_ascii_case(&tx.transaction_code))
        {
            return Err(LedgerError::DuplicateCode(tx.transaction_code));
        }
        table.next_id += 1;
        let id = table.next_id;
        tx.id = id;
        table.rows.insert(id, tx);
        Ok(id)
    }

    async fn get(&self, id: FinanceId) -> Result<Option<FinanceTransaction>> {
        let table = self.table.read().await;
        Ok(table.rows.get(&id).cloned())
    }

    async fn update_status(&self, id: FinanceId, change: StatusChange) -> Result<bool> {
        let mut table = self.table.write().await;
        let Some(row) = table.rows.get_mut(&id) else {
            return Ok(false);
        };
        if row.status != change.expected {
            return Ok(false);
        }
        row.status = change.status;
        if change.status == FinanceStatus::Approved {
            row.approved_by = Some(change.actor);
        }
        if change.reason.is_some() {
            row.rejection_reason = change.reason;
        }
        Ok(true)
    }

    async fn last_sequence(&self, prefix: &str) -> Result<Option<u32>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter_map(|row| code_sequence(&row.transaction_code, prefix))
            .max())
    }

    async fn code_exists(&self, code: &str) -> Result<bool> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .any(|row| row.transaction_code.eq_ignore_ascii_case(code.trim())))
    }

    async fn delete(&self, id: FinanceId, expected: FinanceStatus) -> Result<bool> {
        let mut table = self.table.write().await;
        match table.rows.get(&id) {
            Some(row) if row.status == expected => Ok(table.rows.remove(&id).is_some()),
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
struct SalaryTable {
    rows: BTreeMap<SalaryId, SalaryRecord>,
    by_period: HashMap<(u32, Period), SalaryId>,
    next_id: SalaryId,
}

/// A thread-safe in-memory salary gateway with a unique
/// `(employee, period)` index.
#[derive(Default, Clone)]
pub struct InMemorySalaryStore {
    table: Arc<RwLock<SalaryTable>>,
}

impl InMemorySalaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records for `employee_id` in `period`.
    pub async fn count_for(&self, employee_id: u32, period: Period) -> usize {
        let table = self.table.read().await;
        table
            .rows
            .values()
            .filter(|r| r.employee_id == employee_id && r.period == period)
            .count()
    }
}

#[async_trait]
impl SalaryStore for InMemorySalaryStore {
    async fn insert(&self, mut record: SalaryRecord) -> Result<SalaryId> {
        let mut table = self.table.write().await;
        let key = (record.employee_id, record.period);
        if table.by_period.contains_key(&key) {
            return Err(LedgerError::DuplicateSalary {
                employee_id: record.employee_id,
                month: record.period.month(),
                year: record.period.year(),
            });
        }
        table.next_id += 1;
        let id = table.next_id;
        record.id = id;
        table.by_period.insert(key, id);
        table.rows.insert(id, record);
        Ok(id)
    }

    async fn get(&self, id: SalaryId) -> Result<Option<SalaryRecord>> {
        let table = self.table.read().await;
        Ok(table.rows.get(&id).cloned())
    }

    async fn by_employee(&self, employee_id: u32) -> Result<Vec<SalaryRecord>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|r| r.employee_id == employee_id)
            .cloned()
            .collect())
    }

    async fn update(&self, record: SalaryRecord, expected: PaymentStatus) -> Result<bool> {
        let mut table = self.table.write().await;
        let Some(existing) = table.rows.get(&record.id) else {
            return Ok(false);
        };
        if existing.payment_status != expected {
            return Ok(false);
        }
        let old_key = (existing.employee_id, existing.period);
        let new_key = (record.employee_id, record.period);
        if old_key != new_key {
            if table.by_period.contains_key(&new_key) {
                return Err(LedgerError::DuplicateSalary {
                    employee_id: record.employee_id,
                    month: record.period.month(),
                    year: record.period.year(),
                });
            }
            table.by_period.remove(&old_key);
            table.by_period.insert(new_key, record.id);
        }
        table.rows.insert(record.id, record);
        Ok(true)
    }

    async fn can_delete(&self, id: SalaryId) -> Result<DeleteCheck> {
        let table = self.table.read().await;
        Ok(match table.rows.get(&id) {
            None => DeleteCheck::denied("salary record not found"),
            Some(record) if !record.can_delete() => DeleteCheck::denied(format!(
                "a {} salary record cannot be deleted",
                record.payment_status
            )),
            Some(_) => DeleteCheck::allowed(),
        })
    }

    async fn delete(&self, id: SalaryId) -> Result<bool> {
        let mut table = self.table.write().await;
        if !table.rows.get(&id).is_some_and(SalaryRecord::can_delete) {
            return Ok(false);
        }
        if let Some(record) = table.rows.remove(&id) {
            table.by_period.remove(&(record.employee_id, record.period));
        }
        Ok(true)
    }
}

/// A fixed directory of employees, projects and customers.
#[derive(Default, Clone)]
pub struct InMemoryDirectory {
    employees: Arc<RwLock<Vec<EmployeeDropdownItem>>>,
    projects: Arc<RwLock<Vec<DirectoryEntry>>>,
    customers: Arc<RwLock<Vec<DirectoryEntry>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_employees(employees: Vec<EmployeeDropdownItem>) -> Self {
        Self {
            employees: Arc::new(RwLock::new(employees)),
            ..Self::default()
        }
    }

    pub async fn add_employee(&self, employee: EmployeeDropdownItem) {
        self.employees.write().await.push(employee);
    }

    pub async fn add_project(&self, project: DirectoryEntry) {
        self.projects.write().await.push(project);
    }

    pub async fn add_customer(&self, customer: DirectoryEntry) {
        self.customers.write().await.push(customer);
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn employees(&self) -> Result<Vec<EmployeeDropdownItem>> {
        Ok(self.employees.read().await.clone())
    }

    async fn projects(&self) -> Result<Vec<DirectoryEntry>> {
        Ok(self.projects.read().await.clone())
    }

    async fn customers(&self) -> Result<Vec<DirectoryEntry>> {
        Ok(self.customers.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::finance::{FinanceDraft, FinanceStatus, TransactionType};
    use crate::domain::salary::{PaymentStatus, SalaryComponents};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn at() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn finance(code: &str) -> FinanceTransaction {
        let draft = FinanceDraft::new(TransactionType::Income, "Revenue", dec!(10), at().date())
            .with_code(code)
            .with_status(FinanceStatus::Pending);
        FinanceTransaction::from_validated(draft, 1, at()).unwrap()
    }

    fn salary(employee_id: u32, month: u32) -> SalaryRecord {
        SalaryRecord::new(
            employee_id,
            Period::new(month, 2024).unwrap(),
            SalaryComponents::base_only(dec!(1000)).unwrap(),
            "",
            at(),
        )
    }

    #[test]
    fn test_code_sequence_parsing() {
        assert_eq!(code_sequence("TN000042", "TN"), Some(42));
        assert_eq!(code_sequence("TNX00042", "TN"), None);
        assert_eq!(code_sequence("TC000042", "TN"), None);
        assert_eq!(code_sequence("TN", "TN"), None);
        assert_eq!(code_sequence("TN202406011230", "TN"), None);
    }

    #[tokio::test]
    async fn test_finance_insert_assigns_ids_and_rejects_duplicate_codes() {
        let store = InMemoryFinanceStore::new();
        let first = store.insert(finance("TN000001")).await.unwrap();
        let second = store.insert(finance("TN000002")).await.unwrap();
        assert_eq!((first, second), (1, 2));

        let err = store.insert(finance("tn000001")).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateCode(_)));
        assert_eq!(store.last_sequence("TN").await.unwrap(), Some(2));
        assert_eq!(store.last_sequence("TC").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_finance_status_compare_and_set() {
        let store = InMemoryFinanceStore::new();
        let id = store.insert(finance("TN000001")).await.unwrap();

        let approve = StatusChange {
            expected: FinanceStatus::Pending,
            status: FinanceStatus::Approved,
            actor: 9,
            reason: None,
        };
        assert!(store.update_status(id, approve.clone()).await.unwrap());
        assert!(!store.update_status(id, approve).await.unwrap());

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, FinanceStatus::Approved);
        assert_eq!(stored.approved_by, Some(9));
    }

    #[tokio::test]
    async fn test_finance_delete_checks_status() {
        let store = InMemoryFinanceStore::new();
        let id = store.insert(finance("TN000001")).await.unwrap();

        assert!(!store.delete(id, FinanceStatus::Recorded).await.unwrap());
        assert!(store.get(id).await.unwrap().is_some());
        assert!(store.delete(id, FinanceStatus::Pending).await.unwrap());
        assert!(!store.delete(id, FinanceStatus::Pending).await.unwrap());
    }

    #[tokio::test]
    async fn test_salary_unique_index() {
        let store = InMemorySalaryStore::new();
        store.insert(salary(1, 6)).await.unwrap();
        store.insert(salary(1, 7)).await.unwrap();
        store.insert(salary(2, 6)).await.unwrap();

        let err = store.insert(salary(1, 6)).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateSalary { employee_id: 1, .. }));
        assert_eq!(store.count_for(1, Period::new(6, 2024).unwrap()).await, 1);
        assert_eq!(store.by_employee(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_salary_delete_frees_period() {
        let store = InMemorySalaryStore::new();
        let id = store.insert(salary(1, 6)).await.unwrap();
        assert!(store.can_delete(id).await.unwrap().allowed);
        assert!(store.delete(id).await.unwrap());
        assert!(store.insert(salary(1, 6)).await.is_ok());
        assert!(!store.can_delete(id).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_paid_salary_cannot_be_deleted() {
        let store = InMemorySalaryStore::new();
        let id = store.insert(salary(1, 6)).await.unwrap();
        let mut record = store.get(id).await.unwrap().unwrap();
        record.payment_status = PaymentStatus::Paid;
        assert!(store.update(record.clone(), PaymentStatus::Unpaid).await.unwrap());
        assert!(!store.update(record, PaymentStatus::Unpaid).await.unwrap());

        let check = store.can_delete(id).await.unwrap();
        assert!(!check.allowed);
        assert!(check.reason.contains("Paid"));
        assert!(!store.delete(id).await.unwrap());
        assert_eq!(store.count_for(1, Period::new(6, 2024).unwrap()).await, 1);
    }
}
