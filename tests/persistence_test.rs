#![cfg(feature = "storage-rocksdb")]

mod common;

use assert_cmd::cargo_bin;
use std::process::Command;
use tempfile::tempdir;

fn run(args: &[&str], db_path: &std::path::Path) -> String {
    let output = Command::new(cargo_bin!("staffledger"))
        .args(args)
        .arg("--db-path")
        .arg(db_path)
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_rocksdb_payroll_survives_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");
    let employees = dir.path().join("employees.csv");
    common::write_employees_csv(&employees, &[(1, "NV001", "10000000"), (2, "NV002", "12000000")])
        .unwrap();
    let employees = employees.to_str().unwrap();
    let generate = ["payroll", "generate", "--month", "6", "--year", "2024", "--employees", employees];

    // 1. First run creates both records
    let first = run(&generate, &db_path);
    assert!(first.contains("NV001,succeeded,10000000,1,"));
    assert!(first.contains("NV002,succeeded,12000000,2,"));

    // 2. Second run against the same database skips them
    let second = run(&generate, &db_path);
    assert!(second.contains("NV001,skipped,,,"));
    assert!(second.contains("NV002,skipped,,,"));

    // 3. Payment status persists too
    let paid = run(&["payroll", "pay", "--ids", "1", "--status", "paid"], &db_path);
    assert!(paid.contains("#1,succeeded,10000000,1,"));
    let again = run(&["payroll", "pay", "--ids", "1", "--status", "unpaid"], &db_path);
    assert!(again.contains("#1,failed,,1,a paid salary record is locked"));
}

#[test]
fn test_rocksdb_finance_approval_across_runs() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    let recorded = run(
        &["finance", "record", "--type", "income", "--category", "Revenue", "--amount", "2500", "--date", "2024-06-15"],
        &db_path,
    );
    assert!(recorded.contains("1,TN000001,Pending"));

    let approved = run(&["finance", "approve", "--id", "1"], &db_path);
    assert!(approved.contains("1,Approved"));

    let output = Command::new(cargo_bin!("staffledger"))
        .args(["finance", "reject", "--id", "1", "--reason", "Amount was entered twice"])
        .arg("--db-path")
        .arg(&db_path)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Cannot reject transaction 1 in status Approved"));
}
