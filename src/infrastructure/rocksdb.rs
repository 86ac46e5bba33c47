use super::in_memory::code_sequence;
use crate::domain::finance::{FinanceId, FinanceStatus, FinanceTransaction};
use crate::domain::ports::{FinanceStore, SalaryStore, StatusChange};
use crate::domain::salary::{DeleteCheck, PaymentStatus, Period, SalaryId, SalaryRecord};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for finance transactions, keyed by id.
pub const CF_FINANCE: &str = "finance";
/// Column Family for salary records, keyed by id.
pub const CF_SALARIES: &str = "salaries";
/// Unique `(employee, period)` index pointing at salary ids.
pub const CF_SALARY_KEYS: &str = "salary_keys";
/// Id counters.
pub const CF_META: &str = "meta";

const FINANCE_NEXT_ID: &[u8] = b"finance_next_id";
const SALARY_NEXT_ID: &[u8] = b"salary_next_id";

/// A persistent finance and salary gateway backed by RocksDB.
///
/// Every read-check-write sequence runs under one async write lock, so the
/// code and `(employee, period)` uniqueness checks cannot interleave with
/// another insert from the same process. Multi-key writes go through a
/// `WriteBatch`.
///
/// `Clone` shares the underlying `Arc<DB>` and lock.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at `path`, creating any missing
    /// column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_FINANCE, CF_SALARIES, CF_SALARY_KEYS, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| LedgerError::Storage(format!("column family {name} not found")))
    }

    fn read<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf)?, IteratorMode::Start) {
            let (_key, value) = item?;
            rows.push(decode(&value)?);
        }
        Ok(rows)
    }

    /// Reserves the next id for `counter` inside `batch`.
    fn next_id(&self, batch: &mut WriteBatch, counter: &[u8]) -> Result<u32> {
        let current = match self.db.get_cf(self.cf(CF_META)?, counter)? {
            Some(bytes) => u32::from_be_bytes(
                bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| LedgerError::Storage("corrupt id counter".into()))?,
            ),
            None => 0,
        };
        let next = current + 1;
        batch.put_cf(self.cf(CF_META)?, counter, next.to_be_bytes());
        Ok(next)
    }

    fn salary_key(employee_id: u32, period: Period) -> Vec<u8> {
        let mut key = employee_id.to_be_bytes().to_vec();
        key.extend_from_slice(&period.year().to_be_bytes());
        key.extend_from_slice(&period.month().to_be_bytes());
        key
    }

    fn salary_key_taken(&self, key: &[u8]) -> Result<bool> {
        Ok(self.db.get_pinned_cf(self.cf(CF_SALARY_KEYS)?, key)?.is_some())
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| LedgerError::Storage(format!("serialization error: {e}")))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| LedgerError::Storage(format!("deserialization error: {e}")))
}

fn duplicate_salary(record: &SalaryRecord) -> LedgerError {
    LedgerError::DuplicateSalary {
        employee_id: record.employee_id,
        month: record.period.month(),
        year: record.period.year(),
    }
}

#[async_trait]
impl FinanceStore for RocksDBStore {
    async fn insert(&self, mut tx: FinanceTransaction) -> Result<FinanceId> {
        let _guard = self.write_lock.lock().await;
        if self.code_exists(&tx.transaction_code).await? {
            return Err(LedgerError::DuplicateCode(tx.transaction_code));
        }

        let mut batch = WriteBatch::default();
        let id = self.next_id(&mut batch, FINANCE_NEXT_ID)?;
        tx.id = id;
        batch.put_cf(self.cf(CF_FINANCE)?, id.to_be_bytes(), encode(&tx)?);
        self.db.write(batch)?;
        Ok(id)
    }

    async fn get(&self, id: FinanceId) -> Result<Option<FinanceTransaction>> {
        self.read(CF_FINANCE, &id.to_be_bytes())
    }

    async fn update_status(&self, id: FinanceId, change: StatusChange) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let Some(mut tx) = self.read::<FinanceTransaction>(CF_FINANCE, &id.to_be_bytes())? else {
            return Ok(false);
        };
        if tx.status != change.expected {
            return Ok(false);
        }
        tx.status = change.status;
        if change.status == FinanceStatus::Approved {
            tx.approved_by = Some(change.actor);
        }
        if change.reason.is_some() {
            tx.rejection_reason = change.reason;
        }
        self.db.put_cf(self.cf(CF_FINANCE)?, id.to_be_bytes(), encode(&tx)?)?;
        Ok(true)
    }

    async fn last_sequence(&self, prefix: &str) -> Result<Option<u32>> {
        Ok(self
            .scan::<FinanceTransaction>(CF_FINANCE)?
            .iter()
            .filter_map(|tx| code_sequence(&tx.transaction_code, prefix))
            .max())
    }

    async fn code_exists(&self, code: &str) -> Result<bool> {
        let code = code.trim();
        Ok(self
            .scan::<FinanceTransaction>(CF_FINANCE)?
            .iter()
            .any(|tx| tx.transaction_code.eq_ignore_ascii_case(code)))
    }

    async fn delete(&self, id: FinanceId, expected: FinanceStatus) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let key = id.to_be_bytes();
        match self.read::<FinanceTransaction>(CF_FINANCE, &key)? {
            Some(tx) if tx.status == expected => {
                self.db.delete_cf(self.cf(CF_FINANCE)?, key)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl SalaryStore for RocksDBStore {
    async fn insert(&self, mut record: SalaryRecord) -> Result<SalaryId> {
        let _guard = self.write_lock.lock().await;
        let key = Self::salary_key(record.employee_id, record.period);
        if self.salary_key_taken(&key)? {
            return Err(duplicate_salary(&record));
        }

        let mut batch = WriteBatch::default();
        let id = self.next_id(&mut batch, SALARY_NEXT_ID)?;
        record.id = id;
        batch.put_cf(self.cf(CF_SALARIES)?, id.to_be_bytes(), encode(&record)?);
        batch.put_cf(self.cf(CF_SALARY_KEYS)?, key, id.to_be_bytes());
        self.db.write(batch)?;
        Ok(id)
    }

    async fn get(&self, id: SalaryId) -> Result<Option<SalaryRecord>> {
        self.read(CF_SALARIES, &id.to_be_bytes())
    }

    async fn by_employee(&self, employee_id: u32) -> Result<Vec<SalaryRecord>> {
        let prefix = employee_id.to_be_bytes();
        let mode = IteratorMode::From(&prefix, Direction::Forward);

        let mut records = Vec::new();
        for item in self.db.iterator_cf(self.cf(CF_SALARY_KEYS)?, mode) {
            let (key, id) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            if let Some(record) = self.read(CF_SALARIES, &id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn update(&self, record: SalaryRecord, expected: PaymentStatus) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let Some(existing) = self.read::<SalaryRecord>(CF_SALARIES, &record.id.to_be_bytes())? else {
            return Ok(false);
        };
        if existing.payment_status != expected {
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        let old_key = Self::salary_key(existing.employee_id, existing.period);
        let new_key = Self::salary_key(record.employee_id, record.period);
        if old_key != new_key {
            if self.salary_key_taken(&new_key)? {
                return Err(duplicate_salary(&record));
            }
            batch.delete_cf(self.cf(CF_SALARY_KEYS)?, old_key);
            batch.put_cf(self.cf(CF_SALARY_KEYS)?, new_key, record.id.to_be_bytes());
        }
        batch.put_cf(self.cf(CF_SALARIES)?, record.id.to_be_bytes(), encode(&record)?);
        self.db.write(batch)?;
        Ok(true)
    }

    async fn can_delete(&self, id: SalaryId) -> Result<DeleteCheck> {
        Ok(match self.read::<SalaryRecord>(CF_SALARIES, &id.to_be_bytes())? {
            None => DeleteCheck::denied("salary record not found"),
            Some(record) if !record.can_delete() => DeleteCheck::denied(format!(
                "a {} salary record cannot be deleted",
                record.payment_status
            )),
            Some(_) => DeleteCheck::allowed(),
        })
    }

    async fn delete(&self, id: SalaryId) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let Some(record) = self.read::<SalaryRecord>(CF_SALARIES, &id.to_be_bytes())? else {
            return Ok(false);
        };
        if !record.can_delete() {
            return Ok(false);
        }
        let mut batch = WriteBatch::default();
        batch.delete_cf(self.cf(CF_SALARIES)?, id.to_be_bytes());
        batch.delete_cf(
            self.cf(CF_SALARY_KEYS)?,
            Self::salary_key(record.employee_id, record.period),
        );
        self.db.write(batch)?;
        Ok(true)
    }
}
