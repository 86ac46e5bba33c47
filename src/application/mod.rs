//! Application services orchestrating the domain through its ports.
//!
//! `TransactionLedger` owns single finance transactions and their approval
//! state machine. `PayrollBatchEngine` owns salary records, individually and
//! in batches with per-item outcome tracking.

pub mod ledger;
pub mod payroll;

use crate::domain::actor::{Actor, Permission, can_perform};
use crate::error::{LedgerError, Result};

pub(crate) fn authorize(actor: &Actor, permission: Permission) -> Result<()> {
    if can_perform(actor, permission) {
        Ok(())
    } else {
        Err(LedgerError::PermissionDenied {
            actor: actor.id,
            permission: permission.to_string(),
        })
    }
}
