use super::authorize;
use crate::domain::actor::{Actor, Permission};
use crate::domain::directory::EmployeeDropdownItem;
use crate::domain::ports::{ClockBox, DirectoryBox, SalaryStoreBox};
use crate::domain::salary::{
    Adjustments, PaymentStatus, Period, SalaryComponents, SalaryId, SalaryRecord,
};
use crate::error::{FieldError, LedgerError, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How salary components are filled for a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum SalaryMode {
    BaseSalaryOnly,
    /// The same adjustments are applied to every selected employee.
    CustomAdjustments(Adjustments),
}

impl SalaryMode {
    pub fn adjustments(&self) -> Adjustments {
        match self {
            Self::BaseSalaryOnly => Adjustments::default(),
            Self::CustomAdjustments(adjustments) => *adjustments,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkCreateRequest {
    pub period: Option<Period>,
    pub employees: Vec<EmployeeDropdownItem>,
    pub mode: SalaryMode,
}

impl BulkCreateRequest {
    pub fn new(period: Period, employees: Vec<EmployeeDropdownItem>, mode: SalaryMode) -> Self {
        Self {
            period: Some(period),
            employees,
            mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentUpdateRequest {
    pub record_ids: Vec<SalaryId>,
    pub new_status: PaymentStatus,
    pub payment_date: Option<NaiveDate>,
    /// Appended to each record's notes on its own line.
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemStatus {
    Succeeded,
    /// A record for the employee and period already exists and was left alone.
    Skipped,
    Failed(String),
}

/// What happened to one employee or record in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome {
    /// Employee code, or `#<record id>` when the employee is unknown.
    pub key: String,
    pub record_id: Option<SalaryId>,
    pub net_salary: Option<Decimal>,
    pub status: ItemStatus,
}

impl ItemOutcome {
    fn succeeded(key: String, record_id: Option<SalaryId>, net_salary: Decimal) -> Self {
        Self {
            key,
            record_id,
            net_salary: Some(net_salary),
            status: ItemStatus::Succeeded,
        }
    }

    fn skipped(key: String) -> Self {
        Self {
            key,
            record_id: None,
            net_salary: None,
            status: ItemStatus::Skipped,
        }
    }

    fn failed(key: String, record_id: Option<SalaryId>, message: impl Into<String>) -> Self {
        Self {
            key,
            record_id,
            net_salary: None,
            status: ItemStatus::Failed(message.into()),
        }
    }
}

/// Per-item results of a batch operation, in input order.
///
/// In a preview, `Succeeded` means the record would be created.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub outcomes: Vec<ItemOutcome>,
    /// Set when the batch stopped early; `outcomes` holds the items
    /// processed before that point.
    pub cancelled: bool,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Succeeded))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Failed(_)))
    }

    /// `(key, message)` for every failed item.
    pub fn errors(&self) -> Vec<(&str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.status {
                ItemStatus::Failed(msg) => Some((o.key.as_str(), msg.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Sum of net salaries over succeeded items, or `None` if the sum does
    /// not fit in a `Decimal`.
    pub fn total_net_salary(&self) -> Option<Decimal> {
        self.outcomes
            .iter()
            .filter(|o| o.status == ItemStatus::Succeeded)
            .filter_map(|o| o.net_salary)
            .try_fold(Decimal::ZERO, |total, net| total.checked_add(net))
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} succeeded, {} skipped as duplicates, {} failed",
            self.succeeded(),
            self.skipped(),
            self.failed()
        );
        if let Some((key, msg)) = self.errors().first() {
            summary.push_str(&format!(": {key}: {msg}"));
        }
        if self.cancelled {
            summary.push_str(" (cancelled)");
        }
        summary
    }

    fn count(&self, pred: impl Fn(&ItemStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

const LOCKED: &str = "a paid salary record is locked";

/// Message for a conditional update that lost to a concurrent change.
fn stale_update(current: &SalaryRecord) -> String {
    if current.is_paid() {
        LOCKED.to_string()
    } else {
        format!("salary record is now {}, reload and retry", current.payment_status)
    }
}

enum Plan {
    Create(SalaryRecord),
    Skip,
    Reject(String),
}

/// Creates and updates salary records, singly or in batches.
///
/// Batches run sequentially. Precondition failures reject the whole call
/// before any item is touched; failures on one item are recorded in the
/// report and the remaining items still run. The one-record-per-period rule
/// is ultimately enforced by the salary store, so a concurrent creation for
/// the same employee surfaces here as a per-item failure.
pub struct PayrollBatchEngine {
    salary_store: SalaryStoreBox,
    directory: DirectoryBox,
    clock: ClockBox,
}

impl PayrollBatchEngine {
    pub fn new(salary_store: SalaryStoreBox, directory: DirectoryBox, clock: ClockBox) -> Self {
        Self {
            salary_store,
            directory,
            clock,
        }
    }

    /// Plans a bulk creation without persisting anything.
    pub async fn preview(&self, actor: &Actor, request: &BulkCreateRequest) -> Result<BatchReport> {
        self.run_bulk_create(actor, request, false, None).await
    }

    pub async fn bulk_create(&self, actor: &Actor, request: &BulkCreateRequest) -> Result<BatchReport> {
        self.run_bulk_create(actor, request, true, None).await
    }

    /// Like `bulk_create`, but checks `token` between employees.
    pub async fn bulk_create_with_cancel(
        &self,
        actor: &Actor,
        request: &BulkCreateRequest,
        token: &CancellationToken,
    ) -> Result<BatchReport> {
        self.run_bulk_create(actor, request, true, Some(token)).await
    }

    /// Bulk creation over every employee known to the directory.
    pub async fn bulk_create_for_all(&self, actor: &Actor, period: Period, mode: SalaryMode) -> Result<BatchReport> {
        authorize(actor, Permission::ManagePayroll)?;
        let employees = self.directory.employees().await?;
        let request = BulkCreateRequest::new(period, employees, mode);
        self.bulk_create(actor, &request).await
    }

    pub async fn bulk_update_payment(&self, actor: &Actor, request: &PaymentUpdateRequest) -> Result<BatchReport> {
        self.run_payment_update(actor, request, None).await
    }

    pub async fn bulk_update_payment_with_cancel(
        &self,
        actor: &Actor,
        request: &PaymentUpdateRequest,
        token: &CancellationToken,
    ) -> Result<BatchReport> {
        self.run_payment_update(actor, request, Some(token)).await
    }

    async fn run_bulk_create(
        &self,
        actor: &Actor,
        request: &BulkCreateRequest,
        persist: bool,
        token: Option<&CancellationToken>,
    ) -> Result<BatchReport> {
        authorize(actor, Permission::ManagePayroll)?;
        let (period, adjustments) = self.bulk_create_preconditions(request)?;
        let note = format!("Batch-created for {period}");

        let mut seen = HashSet::new();
        let mut report = BatchReport::default();
        for employee in &request.employees {
            if token.is_some_and(CancellationToken::is_cancelled) {
                report.cancelled = true;
                break;
            }
            let key = employee.employee_code.clone();

            let plan = if seen.insert(employee.employee_id) {
                self.plan_employee(employee, period, &adjustments, &note).await
            } else {
                Ok(Plan::Skip)
            };

            let outcome = match plan {
                Err(err) => ItemOutcome::failed(key, None, err.to_string()),
                Ok(Plan::Skip) => {
                    debug!(employee = %key, %period, "Salary record already exists, skipping");
                    ItemOutcome::skipped(key)
                }
                Ok(Plan::Reject(msg)) => ItemOutcome::failed(key, None, msg),
                Ok(Plan::Create(record)) => {
                    let net = record.net_salary();
                    if persist {
                        match self.salary_store.insert(record).await {
                            Ok(id) => ItemOutcome::succeeded(key, Some(id), net),
                            Err(err) => ItemOutcome::failed(key, None, err.to_string()),
                        }
                    } else {
                        ItemOutcome::succeeded(key, None, net)
                    }
                }
            };
            if let ItemStatus::Failed(msg) = &outcome.status {
                warn!(employee = %outcome.key, %period, error = %msg, "Salary record not created");
            }
            report.outcomes.push(outcome);
        }

        info!(
            %period,
            persist,
            succeeded = report.succeeded(),
            skipped = report.skipped(),
            failed = report.failed(),
            total = ?report.total_net_salary(),
            cancelled = report.cancelled,
            "Bulk salary creation finished"
        );
        Ok(report)
    }

    fn bulk_create_preconditions(&self, request: &BulkCreateRequest) -> Result<(Period, Adjustments)> {
        let mut errors = Vec::new();

        if request.employees.is_empty() {
            errors.push(FieldError::new("employees", "select at least one employee"));
        }

        let adjustments = request.mode.adjustments();
        if let Err(err) = Adjustments::new(
            adjustments.allowance,
            adjustments.bonus,
            adjustments.deduction,
        ) {
            errors.extend(err.field_errors().iter().cloned());
        }

        match request.period {
            None => errors.push(FieldError::new("period", "is required")),
            Some(period) => {
                if let Err(err) = self.check_period_not_too_far(period) {
                    errors.extend(err.field_errors().iter().cloned());
                }
            }
        }

        match request.period {
            Some(period) if errors.is_empty() => Ok((period, adjustments)),
            _ => Err(LedgerError::Validation(errors)),
        }
    }

    /// Rejects periods more than one month ahead of today.
    fn check_period_not_too_far(&self, period: Period) -> Result<()> {
        let limit = Period::containing(self.clock.today()).next();
        if period > limit {
            return Err(LedgerError::invalid(
                "period",
                format!("{period} is too far in the future (latest allowed is {limit})"),
            ));
        }
        Ok(())
    }

    async fn plan_employee(
        &self,
        employee: &EmployeeDropdownItem,
        period: Period,
        adjustments: &Adjustments,
        note: &str,
    ) -> Result<Plan> {
        let existing = self.salary_store.by_employee(employee.employee_id).await?;
        if existing.iter().any(|r| r.period == period) {
            return Ok(Plan::Skip);
        }

        let components = match SalaryComponents::with_adjustments(employee.base_salary, adjustments) {
            Ok(components) => components,
            Err(err) => return Ok(Plan::Reject(err.to_string())),
        };
        if components.net_salary() < Decimal::ZERO {
            return Ok(Plan::Reject(format!(
                "net salary {} cannot be negative",
                components.net_salary()
            )));
        }

        Ok(Plan::Create(SalaryRecord::new(
            employee.employee_id,
            period,
            components,
            note,
            self.clock.now(),
        )))
    }

    async fn run_payment_update(
        &self,
        actor: &Actor,
        request: &PaymentUpdateRequest,
        token: Option<&CancellationToken>,
    ) -> Result<BatchReport> {
        authorize(actor, Permission::ProcessPayments)?;

        let today = self.clock.today();
        let mut errors = Vec::new();
        if request.record_ids.is_empty() {
            errors.push(FieldError::new("records", "select at least one salary record"));
        }
        if let Some(date) = request.payment_date
            && date > today
        {
            errors.push(FieldError::new("payment_date", "cannot be in the future"));
        }
        if !errors.is_empty() {
            return Err(LedgerError::Validation(errors));
        }

        let codes = self.employee_codes().await;
        let notes = request.notes.as_deref().unwrap_or_default();

        let mut seen = HashSet::new();
        let mut report = BatchReport::default();
        for &id in &request.record_ids {
            if token.is_some_and(CancellationToken::is_cancelled) {
                report.cancelled = true;
                break;
            }
            if !seen.insert(id) {
                report.outcomes.push(ItemOutcome::skipped(format!("#{id}")));
                continue;
            }

            let outcome = match self.salary_store.get(id).await {
                Err(err) => ItemOutcome::failed(format!("#{id}"), Some(id), err.to_string()),
                Ok(None) => ItemOutcome::failed(format!("#{id}"), Some(id), "salary record not found"),
                Ok(Some(mut record)) => {
                    let key = codes
                        .get(&record.employee_id)
                        .cloned()
                        .unwrap_or_else(|| format!("#{id}"));
                    if !record.can_edit() {
                        ItemOutcome::failed(key, Some(id), LOCKED)
                    } else {
                        let expected = record.payment_status;
                        record.apply_payment_status(request.new_status, request.payment_date, today);
                        record.append_note(notes);
                        let net = record.net_salary();
                        match self.salary_store.update(record, expected).await {
                            Ok(true) => ItemOutcome::succeeded(key, Some(id), net),
                            Ok(false) => match self.salary_store.get(id).await {
                                Ok(Some(current)) => ItemOutcome::failed(key, Some(id), stale_update(&current)),
                                Ok(None) => ItemOutcome::failed(key, Some(id), "salary record not found"),
                                Err(err) => ItemOutcome::failed(key, Some(id), err.to_string()),
                            },
                            Err(err) => ItemOutcome::failed(key, Some(id), err.to_string()),
                        }
                    }
                }
            };
            if let ItemStatus::Failed(msg) = &outcome.status {
                warn!(record = id, error = %msg, "Payment status not updated");
            }
            report.outcomes.push(outcome);
        }

        info!(
            status = %request.new_status,
            succeeded = report.succeeded(),
            failed = report.failed(),
            cancelled = report.cancelled,
            "Bulk payment update finished"
        );
        Ok(report)
    }

    /// Employee codes by id; empty if the directory is unavailable.
    async fn employee_codes(&self) -> HashMap<u32, String> {
        match self.directory.employees().await {
            Ok(employees) => employees
                .into_iter()
                .map(|e| (e.employee_id, e.employee_code))
                .collect(),
            Err(err) => {
                warn!(error = %err, "Directory unavailable, reporting records by id");
                HashMap::new()
            }
        }
    }

    /// Creates one salary record. The employee must not already have a
    /// record for `period`.
    pub async fn create_salary(
        &self,
        actor: &Actor,
        employee_id: u32,
        period: Period,
        components: SalaryComponents,
        notes: &str,
    ) -> Result<SalaryId> {
        authorize(actor, Permission::ManagePayroll)?;
        self.check_period_not_too_far(period)?;
        if components.net_salary() < Decimal::ZERO {
            return Err(LedgerError::invalid("net_salary", "cannot be negative"));
        }
        let known = self
            .directory
            .employees()
            .await?
            .iter()
            .any(|e| e.employee_id == employee_id);
        if !known {
            return Err(LedgerError::NotFound {
                entity: "Employee",
                id: employee_id,
            });
        }
        let existing = self.salary_store.by_employee(employee_id).await?;
        if existing.iter().any(|r| r.period == period) {
            return Err(LedgerError::DuplicateSalary {
                employee_id,
                month: period.month(),
                year: period.year(),
            });
        }

        let record = SalaryRecord::new(employee_id, period, components, notes.trim(), self.clock.now());
        let net = record.net_salary();
        let id = self.salary_store.insert(record).await?;
        info!(id, employee_id, %period, %net, "Salary record created");
        Ok(id)
    }

    pub async fn get_salary(&self, id: SalaryId) -> Result<SalaryRecord> {
        self.salary_store
            .get(id)
            .await?
            .ok_or(LedgerError::NotFound {
                entity: "Salary record",
                id,
            })
    }

    pub async fn salaries_for_employee(&self, employee_id: u32) -> Result<Vec<SalaryRecord>> {
        self.salary_store.by_employee(employee_id).await
    }

    /// Replaces the components of an unpaid record; the net salary follows.
    pub async fn update_components(
        &self,
        actor: &Actor,
        id: SalaryId,
        components: SalaryComponents,
    ) -> Result<SalaryRecord> {
        authorize(actor, Permission::ManagePayroll)?;
        if components.net_salary() < Decimal::ZERO {
            return Err(LedgerError::invalid("net_salary", "cannot be negative"));
        }
        let mut record = self.editable(id).await?;
        let expected = record.payment_status;
        record.set_components(components);
        self.save(record.clone(), expected).await?;
        info!(id, net = %record.net_salary(), "Salary components updated");
        Ok(record)
    }

    /// Marks a record paid, on `date` or today.
    pub async fn mark_paid(&self, actor: &Actor, id: SalaryId, date: Option<NaiveDate>) -> Result<()> {
        authorize(actor, Permission::ProcessPayments)?;
        self.check_payment_date(date)?;
        let mut record = self.editable(id).await?;
        let expected = record.payment_status;
        record.apply_payment_status(PaymentStatus::Paid, date, self.clock.today());
        self.save(record, expected).await?;
        info!(id, "Salary record marked paid");
        Ok(())
    }

    pub async fn mark_partially_paid(&self, actor: &Actor, id: SalaryId, date: NaiveDate) -> Result<()> {
        authorize(actor, Permission::ProcessPayments)?;
        self.check_payment_date(Some(date))?;
        let mut record = self.editable(id).await?;
        let expected = record.payment_status;
        record.apply_payment_status(PaymentStatus::PartiallyPaid, Some(date), self.clock.today());
        self.save(record, expected).await?;
        info!(id, "Salary record marked partially paid");
        Ok(())
    }

    pub async fn cancel_salary(&self, actor: &Actor, id: SalaryId) -> Result<()> {
        authorize(actor, Permission::ManagePayroll)?;
        let mut record = self.editable(id).await?;
        let expected = record.payment_status;
        record.cancel();
        self.save(record, expected).await?;
        info!(id, "Salary record cancelled");
        Ok(())
    }

    /// Deletes a record if the salary store's eligibility check allows it.
    pub async fn delete_salary(&self, actor: &Actor, id: SalaryId) -> Result<()> {
        authorize(actor, Permission::ManagePayroll)?;
        let check = self.salary_store.can_delete(id).await?;
        if !check.allowed {
            return Err(LedgerError::invalid("salary_record", check.reason));
        }
        if !self.salary_store.delete(id).await? {
            let check = self.salary_store.can_delete(id).await?;
            return Err(LedgerError::invalid("salary_record", check.reason));
        }
        info!(id, "Salary record deleted");
        Ok(())
    }

    async fn editable(&self, id: SalaryId) -> Result<SalaryRecord> {
        let record = self.get_salary(id).await?;
        if !record.can_edit() {
            return Err(LedgerError::invalid("payment_status", LOCKED));
        }
        Ok(record)
    }

    /// Writes `record` only if its stored payment status is still `expected`.
    async fn save(&self, record: SalaryRecord, expected: PaymentStatus) -> Result<()> {
        let id = record.id;
        if self.salary_store.update(record, expected).await? {
            return Ok(());
        }
        match self.salary_store.get(id).await? {
            Some(current) => Err(LedgerError::invalid("payment_status", stale_update(&current))),
            None => Err(LedgerError::NotFound {
                entity: "Salary record",
                id,
            }),
        }
    }

    fn check_payment_date(&self, date: Option<NaiveDate>) -> Result<()> {
        match date {
            Some(date) if date > self.clock.today() => {
                Err(LedgerError::invalid("payment_date", "cannot be in the future"))
            }
            _ => Ok(()),
        }
    }
}
