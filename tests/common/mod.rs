#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use staffledger::domain::directory::EmployeeDropdownItem;
use staffledger::domain::ports::SalaryStore;
use staffledger::domain::salary::{DeleteCheck, PaymentStatus, SalaryId, SalaryRecord};
use staffledger::error::{LedgerError, Result};
use staffledger::infrastructure::in_memory::InMemorySalaryStore;
use std::io::Error;
use std::path::Path;

pub fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 20)
        .unwrap()
        .and_hms_opt(16, 0, 0)
        .unwrap()
}

pub fn employee(id: u32, base_salary: Decimal) -> EmployeeDropdownItem {
    EmployeeDropdownItem {
        employee_id: id,
        employee_code: format!("NV{id:03}"),
        full_name: format!("Employee {id}"),
        department_name: "Finance".into(),
        base_salary,
    }
}

/// A salary store whose inserts fail for one employee.
#[derive(Clone)]
pub struct FlakySalaryStore {
    pub inner: InMemorySalaryStore,
    pub failing_employee: u32,
}

#[async_trait]
impl SalaryStore for FlakySalaryStore {
    async fn insert(&self, record: SalaryRecord) -> Result<SalaryId> {
        if record.employee_id == self.failing_employee {
            return Err(LedgerError::Storage("connection reset".into()));
        }
        self.inner.insert(record).await
    }

    async fn get(&self, id: SalaryId) -> Result<Option<SalaryRecord>> {
        self.inner.get(id).await
    }

    async fn by_employee(&self, employee_id: u32) -> Result<Vec<SalaryRecord>> {
        self.inner.by_employee(employee_id).await
    }

    async fn update(&self, record: SalaryRecord, expected: PaymentStatus) -> Result<bool> {
        self.inner.update(record, expected).await
    }

    async fn can_delete(&self, id: SalaryId) -> Result<DeleteCheck> {
        self.inner.can_delete(id).await
    }

    async fn delete(&self, id: SalaryId) -> Result<bool> {
        self.inner.delete(id).await
    }
}

pub fn write_employees_csv(path: &Path, employees: &[(u32, &str, &str)]) -> std::result::Result<(), Error> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["employee_id", "employee_code", "full_name", "department_name", "base_salary"])?;
    for &(id, code, base) in employees {
        let id_field = id.to_string();
        let name = format!("Employee {id}");
        wtr.write_record([id_field.as_str(), code, name.as_str(), "Sales", base])?;
    }
    wtr.flush()?;
    Ok(())
}
