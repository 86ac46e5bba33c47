use crate::error::{FieldError, LedgerError, Result};
use chrono::{Days, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type FinanceId = u32;

pub const INCOME_CATEGORIES: &[&str] = &["Revenue", "Investment", "Loan", "Other"];

pub const EXPENSE_CATEGORIES: &[&str] = &[
    "Salary",
    "Equipment",
    "Office",
    "Marketing",
    "Travel",
    "Training",
    "Maintenance",
    "Utilities",
    "Insurance",
    "Tax",
    "Other",
];

pub const PAYMENT_METHODS: &[&str] = &["Cash", "BankTransfer", "Card", "Check", "EWallet", "Other"];

pub const MAX_AMOUNT: Decimal = dec!(999999999999.99);
pub const REJECTION_REASON_MIN: usize = 10;
pub const REJECTION_REASON_MAX: usize = 500;

const CODE_MIN_LEN: usize = 3;
const CODE_MAX_LEN: usize = 20;
const DESCRIPTION_MAX_LEN: usize = 500;
const REFERENCE_MAX_LEN: usize = 50;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    /// Prefix used for human-readable transaction codes.
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Income => "TN",
            Self::Expense => "TC",
        }
    }

    pub fn categories(self) -> &'static [&'static str] {
        match self {
            Self::Income => INCOME_CATEGORIES,
            Self::Expense => EXPENSE_CATEGORIES,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "income" => Some(Self::Income),
            "expense" => Some(Self::Expense),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Income => f.write_str("Income"),
            Self::Expense => f.write_str("Expense"),
        }
    }
}

/// Lifecycle status of a finance transaction.
///
/// Transitions:
/// - Recorded → Pending (submit), Recorded → Cancelled (cancel)
/// - Pending → Approved (approve), Pending → Rejected (reject),
///   Pending → Cancelled (cancel)
/// - Approved → Cancelled (cancel)
///
/// Rejected and Cancelled accept nothing further.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FinanceStatus {
    Recorded,
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl FinanceStatus {
    /// The status reached by applying `action`, or `None` if the transition is illegal.
    pub fn apply(self, action: FinanceAction) -> Option<Self> {
        use FinanceAction as A;
        match (self, action) {
            (Self::Recorded, A::Submit) => Some(Self::Pending),
            (Self::Pending, A::Approve) => Some(Self::Approved),
            (Self::Pending, A::Reject) => Some(Self::Rejected),
            (Self::Recorded | Self::Pending | Self::Approved, A::Cancel) => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Statuses a transaction may be created with.
    pub fn is_initial(self) -> bool {
        matches!(self, Self::Recorded | Self::Pending)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "recorded" => Some(Self::Recorded),
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for FinanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Recorded => "Recorded",
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FinanceAction {
    Submit,
    Approve,
    Reject,
    Cancel,
}

impl fmt::Display for FinanceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Cancel => "cancel",
        };
        f.write_str(s)
    }
}

/// The single counterparty a transaction may be linked to.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Relation {
    Project(u32),
    Customer(u32),
    Employee(u32),
}

/// Where a generated transaction code came from.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CodeSource {
    Sequence,
    TimestampFallback,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct GeneratedCode {
    pub code: String,
    pub source: CodeSource,
}

/// Unvalidated transaction input as collected by the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct FinanceDraft {
    pub transaction_code: Option<String>,
    pub transaction_type: Option<TransactionType>,
    pub category: String,
    pub amount: Decimal,
    pub transaction_date: NaiveDate,
    pub project_id: Option<u32>,
    pub customer_id: Option<u32>,
    pub employee_id: Option<u32>,
    pub payment_method: Option<String>,
    pub reference_no: Option<String>,
    pub description: Option<String>,
    pub status: Option<FinanceStatus>,
}

impl FinanceDraft {
    pub fn new(
        transaction_type: TransactionType,
        category: impl Into<String>,
        amount: Decimal,
        transaction_date: NaiveDate,
    ) -> Self {
        Self {
            transaction_code: None,
            transaction_type: Some(transaction_type),
            category: category.into(),
            amount,
            transaction_date,
            project_id: None,
            customer_id: None,
            employee_id: None,
            payment_method: None,
            reference_no: None,
            description: None,
            status: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.transaction_code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: FinanceStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_project(mut self, id: u32) -> Self {
        self.project_id = Some(id);
        self
    }

    pub fn with_customer(mut self, id: u32) -> Self {
        self.customer_id = Some(id);
        self
    }

    pub fn with_employee(mut self, id: u32) -> Self {
        self.employee_id = Some(id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = Some(method.into());
        self
    }

    /// Relation ids that are actually set. Zero ids count as unset.
    pub fn relations(&self) -> Vec<Relation> {
        let mut set = Vec::new();
        if let Some(id) = self.project_id.filter(|id| *id > 0) {
            set.push(Relation::Project(id));
        }
        if let Some(id) = self.customer_id.filter(|id| *id > 0) {
            set.push(Relation::Customer(id));
        }
        if let Some(id) = self.employee_id.filter(|id| *id > 0) {
            set.push(Relation::Employee(id));
        }
        set
    }

    fn code(&self) -> &str {
        self.transaction_code.as_deref().map(str::trim).unwrap_or("")
    }

    /// Checks every rule and returns all violations together.
    pub fn validate(&self, today: NaiveDate) -> Vec<FieldError> {
        let mut errors = Vec::new();

        let code = self.code();
        if code.is_empty() {
            errors.push(FieldError::new("transaction_code", "is required"));
        } else if !(CODE_MIN_LEN..=CODE_MAX_LEN).contains(&code.len()) {
            errors.push(FieldError::new(
                "transaction_code",
                format!("must be between {CODE_MIN_LEN} and {CODE_MAX_LEN} characters"),
            ));
        } else if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            errors.push(FieldError::new(
                "transaction_code",
                "may only contain letters and digits",
            ));
        }

        let category = self.category.trim();
        match self.transaction_type {
            None => errors.push(FieldError::new("transaction_type", "is required")),
            Some(tx_type) => {
                if !category.is_empty() && !tx_type.categories().contains(&category) {
                    errors.push(FieldError::new(
                        "category",
                        format!("'{category}' is not a valid {tx_type} category"),
                    ));
                }
            }
        }
        if category.is_empty() {
            errors.push(FieldError::new("category", "is required"));
        }

        if self.amount <= Decimal::ZERO {
            errors.push(FieldError::new("amount", "must be greater than zero"));
        } else if self.amount > MAX_AMOUNT {
            errors.push(FieldError::new("amount", "is too large"));
        }

        match self.status {
            None => errors.push(FieldError::new("status", "is required")),
            Some(status) if !status.is_initial() => errors.push(FieldError::new(
                "status",
                format!("a new transaction cannot start as {status}"),
            )),
            Some(_) => {}
        }

        if let Some(tomorrow) = today.checked_add_days(Days::new(1))
            && self.transaction_date > tomorrow
        {
            errors.push(FieldError::new("transaction_date", "cannot be in the future"));
        }
        if NaiveDate::from_ymd_opt(2000, 1, 1).is_some_and(|floor| self.transaction_date < floor) {
            errors.push(FieldError::new("transaction_date", "is before 2000-01-01"));
        }

        if let Some(description) = &self.description
            && description.chars().count() > DESCRIPTION_MAX_LEN
        {
            errors.push(FieldError::new(
                "description",
                format!("cannot exceed {DESCRIPTION_MAX_LEN} characters"),
            ));
        }

        if let Some(method) = self.payment_method.as_deref().map(str::trim)
            && !method.is_empty()
            && !PAYMENT_METHODS.contains(&method)
        {
            errors.push(FieldError::new("payment_method", format!("'{method}' is not supported")));
        }

        if let Some(reference) = &self.reference_no
            && reference.trim().chars().count() > REFERENCE_MAX_LEN
        {
            errors.push(FieldError::new(
                "reference_no",
                format!("cannot exceed {REFERENCE_MAX_LEN} characters"),
            ));
        }

        if self.relations().len() > 1 {
            errors.push(FieldError::new(
                "relation",
                "a transaction can be linked to only one of project, customer or employee",
            ));
        }

        errors
    }
}

/// A persisted income/expense ledger entry.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct FinanceTransaction {
    pub id: FinanceId,
    pub transaction_code: String,
    pub transaction_type: TransactionType,
    pub category: String,
    pub amount: Decimal,
    pub transaction_date: NaiveDate,
    pub relation: Option<Relation>,
    pub payment_method: Option<String>,
    pub reference_no: Option<String>,
    pub description: Option<String>,
    pub status: FinanceStatus,
    pub recorded_by: u32,
    pub approved_by: Option<u32>,
    pub rejection_reason: Option<String>,
    pub created_at: NaiveDateTime,
}

impl FinanceTransaction {
    /// Builds the record for a draft that has already passed validation.
    /// The id is assigned by the persistence gateway.
    pub fn from_validated(draft: FinanceDraft, recorded_by: u32, created_at: NaiveDateTime) -> Result<Self> {
        let transaction_type = draft
            .transaction_type
            .ok_or_else(|| LedgerError::invalid("transaction_type", "is required"))?;
        let status = draft
            .status
            .ok_or_else(|| LedgerError::invalid("status", "is required"))?;
        let relation = draft.relations().first().copied();
        let transaction_code = draft.code().to_string();
        Ok(Self {
            id: 0,
            transaction_code,
            transaction_type,
            category: draft.category.trim().to_string(),
            amount: draft.amount,
            transaction_date: draft.transaction_date,
            relation,
            payment_method: non_blank(draft.payment_method),
            reference_no: non_blank(draft.reference_no),
            description: non_blank(draft.description),
            status,
            recorded_by,
            approved_by: None,
            rejection_reason: None,
            created_at,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Trims a rejection reason and checks its length bounds.
pub fn rejection_reason(reason: &str) -> Result<String> {
    let trimmed = reason.trim();
    let len = trimmed.chars().count();
    if len < REJECTION_REASON_MIN {
        return Err(LedgerError::invalid(
            "rejection_reason",
            format!("must be at least {REJECTION_REASON_MIN} characters"),
        ));
    }
    if len > REJECTION_REASON_MAX {
        return Err(LedgerError::invalid(
            "rejection_reason",
            format!("cannot exceed {REJECTION_REASON_MAX} characters"),
        ));
    }
    Ok(trimmed.to_string())
}
