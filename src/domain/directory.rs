use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Read-only employee projection supplied by the directory service.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct EmployeeDropdownItem {
    pub employee_id: u32,
    pub employee_code: String,
    pub full_name: String,
    #[serde(default)]
    pub department_name: String,
    pub base_salary: Decimal,
}

/// A project or customer lookup entry.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct DirectoryEntry {
    pub id: u32,
    pub name: String,
}

impl DirectoryEntry {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}
