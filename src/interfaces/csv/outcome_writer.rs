use crate::application::payroll::{BatchReport, ItemStatus};
use crate::domain::salary::SalaryId;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct OutcomeRow<'a> {
    employee: &'a str,
    status: &'static str,
    net_salary: Option<Decimal>,
    record_id: Option<SalaryId>,
    message: &'a str,
}

/// Writes per-item batch outcomes as CSV, one row per item in input order.
pub struct OutcomeWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OutcomeWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_report(&mut self, report: &BatchReport) -> Result<()> {
        if report.outcomes.is_empty() {
            self.writer
                .write_record(["employee", "status", "net_salary", "record_id", "message"])?;
        }
        for outcome in &report.outcomes {
            let (status, message) = match &outcome.status {
                ItemStatus::Succeeded => ("succeeded", ""),
                ItemStatus::Skipped => ("skipped", ""),
                ItemStatus::Failed(msg) => ("failed", msg.as_str()),
            };
            self.writer.serialize(OutcomeRow {
                employee: &outcome.key,
                status,
                net_salary: outcome.net_salary,
                record_id: outcome.record_id,
                message,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
