use crate::domain::directory::EmployeeDropdownItem;
use crate::error::{LedgerError, Result};
use std::io::Read;

/// Reads the employee selection for a payroll batch from CSV.
///
/// Expected header: `employee_id,employee_code,full_name,department_name,base_salary`.
/// Fields are trimmed and `department_name` may be left out.
pub struct EmployeeReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> EmployeeReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes one employee per row.
    pub fn employees(self) -> impl Iterator<Item = Result<EmployeeDropdownItem>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LedgerError::from))
    }
}
