use crate::error::{FieldError, LedgerError, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type SalaryId = u32;

pub const MIN_YEAR: i32 = 2000;

/// A payroll month.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(month: u32, year: i32) -> Result<Self> {
        let mut errors = Vec::new();
        if !(1..=12).contains(&month) {
            errors.push(FieldError::new("month", "must be between 1 and 12"));
        }
        if year < MIN_YEAR {
            errors.push(FieldError::new("year", format!("must be {MIN_YEAR} or later")));
        }
        if errors.is_empty() {
            Ok(Self { year, month })
        } else {
            Err(LedgerError::Validation(errors))
        }
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    /// The period following this one.
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// The period containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{}", self.month, self.year)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    PartiallyPaid,
    Cancelled,
}

impl PaymentStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "unpaid" => Some(Self::Unpaid),
            "paid" => Some(Self::Paid),
            "partially-paid" | "partiallypaid" => Some(Self::PartiallyPaid),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unpaid => "Unpaid",
            Self::Paid => "Paid",
            Self::PartiallyPaid => "PartiallyPaid",
            Self::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

/// Allowance, bonus and deduction applied on top of a base salary.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
pub struct Adjustments {
    pub allowance: Decimal,
    pub bonus: Decimal,
    pub deduction: Decimal,
}

impl Adjustments {
    pub fn new(allowance: Decimal, bonus: Decimal, deduction: Decimal) -> Result<Self> {
        let mut errors = Vec::new();
        check_non_negative(&mut errors, "allowance", allowance);
        check_non_negative(&mut errors, "bonus", bonus);
        check_non_negative(&mut errors, "deduction", deduction);
        if errors.is_empty() {
            Ok(Self {
                allowance,
                bonus,
                deduction,
            })
        } else {
            Err(LedgerError::Validation(errors))
        }
    }
}

fn check_non_negative(errors: &mut Vec<FieldError>, field: &'static str, value: Decimal) {
    if value < Decimal::ZERO {
        errors.push(FieldError::new(field, "cannot be negative"));
    }
}

/// Salary components, all non-negative. The net figure is always derived
/// and is guaranteed to fit in a `Decimal`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(try_from = "StoredComponents")]
pub struct SalaryComponents {
    base_salary: Decimal,
    allowance: Decimal,
    bonus: Decimal,
    deduction: Decimal,
}

impl SalaryComponents {
    pub fn new(base_salary: Decimal, allowance: Decimal, bonus: Decimal, deduction: Decimal) -> Result<Self> {
        let mut errors = Vec::new();
        check_non_negative(&mut errors, "base_salary", base_salary);
        check_non_negative(&mut errors, "allowance", allowance);
        check_non_negative(&mut errors, "bonus", bonus);
        check_non_negative(&mut errors, "deduction", deduction);
        if errors.is_empty() && checked_net(base_salary, allowance, bonus, deduction).is_none() {
            errors.push(FieldError::new("net_salary", "exceeds the supported decimal range"));
        }
        if errors.is_empty() {
            Ok(Self {
                base_salary,
                allowance,
                bonus,
                deduction,
            })
        } else {
            Err(LedgerError::Validation(errors))
        }
    }

    pub fn base_only(base_salary: Decimal) -> Result<Self> {
        Self::new(base_salary, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)
    }

    pub fn with_adjustments(base_salary: Decimal, adjustments: &Adjustments) -> Result<Self> {
        Self::new(
            base_salary,
            adjustments.allowance,
            adjustments.bonus,
            adjustments.deduction,
        )
    }

    pub fn base_salary(&self) -> Decimal {
        self.base_salary
    }

    pub fn allowance(&self) -> Decimal {
        self.allowance
    }

    pub fn bonus(&self) -> Decimal {
        self.bonus
    }

    pub fn deduction(&self) -> Decimal {
        self.deduction
    }

    pub fn net_salary(&self) -> Decimal {
        self.base_salary - self.deduction + self.allowance + self.bonus
    }
}

/// Same evaluation order as `SalaryComponents::net_salary`.
fn checked_net(base_salary: Decimal, allowance: Decimal, bonus: Decimal, deduction: Decimal) -> Option<Decimal> {
    base_salary
        .checked_sub(deduction)?
        .checked_add(allowance)?
        .checked_add(bonus)
}

#[derive(Deserialize)]
struct StoredComponents {
    base_salary: Decimal,
    allowance: Decimal,
    bonus: Decimal,
    deduction: Decimal,
}

impl TryFrom<StoredComponents> for SalaryComponents {
    type Error = LedgerError;

    fn try_from(c: StoredComponents) -> Result<Self> {
        Self::new(c.base_salary, c.allowance, c.bonus, c.deduction)
    }
}

/// Outcome of the gateway's delete eligibility check.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DeleteCheck {
    pub allowed: bool,
    pub reason: String,
}

impl DeleteCheck {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct SalaryRecord {
    pub id: SalaryId,
    pub employee_id: u32,
    pub period: Period,
    components: SalaryComponents,
    pub payment_status: PaymentStatus,
    pub payment_date: Option<NaiveDate>,
    pub notes: String,
    pub created_at: NaiveDateTime,
}

impl SalaryRecord {
    /// A new unpaid record. The id is assigned by the persistence gateway.
    pub fn new(
        employee_id: u32,
        period: Period,
        components: SalaryComponents,
        notes: impl Into<String>,
        created_at: NaiveDateTime,
    ) -> Self {
        Self {
            id: 0,
            employee_id,
            period,
            components,
            payment_status: PaymentStatus::Unpaid,
            payment_date: None,
            notes: notes.into(),
            created_at,
        }
    }

    pub fn components(&self) -> &SalaryComponents {
        &self.components
    }

    pub fn set_components(&mut self, components: SalaryComponents) {
        self.components = components;
    }

    pub fn net_salary(&self) -> Decimal {
        self.components.net_salary()
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    /// Paid records are locked against further edits.
    pub fn can_edit(&self) -> bool {
        !self.is_paid()
    }

    pub fn can_delete(&self) -> bool {
        matches!(
            self.payment_status,
            PaymentStatus::Unpaid | PaymentStatus::Cancelled
        )
    }

    /// Applies a payment status change.
    ///
    /// An explicit date always wins. Without one, moving to Paid stamps
    /// `today` and moving to Unpaid clears any existing date.
    pub fn apply_payment_status(&mut self, status: PaymentStatus, date: Option<NaiveDate>, today: NaiveDate) {
        self.payment_status = status;
        match (date, status) {
            (Some(date), _) => self.payment_date = Some(date),
            (None, PaymentStatus::Paid) => self.payment_date = Some(today),
            (None, PaymentStatus::Unpaid) => self.payment_date = None,
            (None, _) => {}
        }
    }

    pub fn cancel(&mut self) {
        self.payment_status = PaymentStatus::Cancelled;
        self.payment_date = None;
    }

    /// Appends a line to the notes. Blank input is ignored.
    pub fn append_note(&mut self, note: &str) {
        let note = note.trim();
        if note.is_empty() {
            return;
        }
        if self.notes.is_empty() {
            self.notes = note.to_string();
        } else {
            self.notes.push('\n');
            self.notes.push_str(note);
        }
    }
}
