use std::collections::HashSet;
use std::fmt;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Permission {
    RecordFinance,
    ApproveFinance,
    CancelFinance,
    ManagePayroll,
    ProcessPayments,
}

impl Permission {
    pub const ALL: [Permission; 5] = [
        Self::RecordFinance,
        Self::ApproveFinance,
        Self::CancelFinance,
        Self::ManagePayroll,
        Self::ProcessPayments,
    ];
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RecordFinance => "RecordFinance",
            Self::ApproveFinance => "ApproveFinance",
            Self::CancelFinance => "CancelFinance",
            Self::ManagePayroll => "ManagePayroll",
            Self::ProcessPayments => "ProcessPayments",
        };
        f.write_str(s)
    }
}

/// The user on whose behalf an operation runs.
///
/// Passed explicitly into every ledger and payroll call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: u32,
    permissions: HashSet<Permission>,
}

impl Actor {
    pub fn new(id: u32, permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            id,
            permissions: permissions.into_iter().collect(),
        }
    }

    /// An actor holding every permission.
    pub fn administrator(id: u32) -> Self {
        Self::new(id, Permission::ALL)
    }

    pub fn permissions(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.iter()
    }
}

pub fn can_perform(actor: &Actor, permission: Permission) -> bool {
    actor.permissions.contains(&permission)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_perform() {
        let clerk = Actor::new(3, [Permission::RecordFinance]);
        assert!(can_perform(&clerk, Permission::RecordFinance));
        assert!(!can_perform(&clerk, Permission::ApproveFinance));

        let admin = Actor::administrator(1);
        assert!(Permission::ALL.iter().all(|p| can_perform(&admin, *p)));
    }
}
