use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use staffledger::application::ledger::TransactionLedger;
use staffledger::application::payroll::{
    BulkCreateRequest, PaymentUpdateRequest, PayrollBatchEngine, SalaryMode,
};
use staffledger::domain::actor::Actor;
use staffledger::domain::directory::EmployeeDropdownItem;
use staffledger::domain::finance::{FinanceDraft, TransactionType};
use staffledger::domain::ports::{Clock, FinanceStoreBox, SalaryStoreBox};
use staffledger::domain::salary::{Adjustments, PaymentStatus, Period};
use staffledger::infrastructure::clock::SystemClock;
use staffledger::infrastructure::in_memory::{
    InMemoryDirectory, InMemoryFinanceStore, InMemorySalaryStore,
};
use staffledger::interfaces::csv::employee_reader::EmployeeReader;
use staffledger::interfaces::csv::outcome_writer::OutcomeWriter;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true, env = "STAFFLEDGER_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Id of the user the commands run as.
    #[arg(long, global = true, env = "STAFFLEDGER_ACTOR", default_value_t = 1)]
    actor_id: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Salary batches and payment status updates
    #[command(subcommand)]
    Payroll(PayrollCommand),
    /// Income and expense transactions
    #[command(subcommand)]
    Finance(FinanceCommand),
}

#[derive(Subcommand)]
enum PayrollCommand {
    /// Show what a batch would create without saving anything
    Preview(BatchArgs),
    /// Create salary records for the selected employees
    Generate(BatchArgs),
    /// Set the payment status of salary records
    Pay {
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<u32>,
        #[arg(long, value_parser = parse_payment_status)]
        status: PaymentStatus,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },
}

#[derive(Args)]
struct BatchArgs {
    /// Employee CSV: employee_id,employee_code,full_name,department_name,base_salary
    #[arg(long)]
    employees: PathBuf,
    #[arg(long)]
    month: u32,
    #[arg(long)]
    year: i32,
    #[arg(long)]
    allowance: Option<Decimal>,
    #[arg(long)]
    bonus: Option<Decimal>,
    #[arg(long)]
    deduction: Option<Decimal>,
}

impl BatchArgs {
    fn mode(&self) -> SalaryMode {
        if self.allowance.is_none() && self.bonus.is_none() && self.deduction.is_none() {
            return SalaryMode::BaseSalaryOnly;
        }
        SalaryMode::CustomAdjustments(Adjustments {
            allowance: self.allowance.unwrap_or_default(),
            bonus: self.bonus.unwrap_or_default(),
            deduction: self.deduction.unwrap_or_default(),
        })
    }
}

#[derive(Subcommand)]
enum FinanceCommand {
    /// Record a new transaction
    Record {
        #[arg(long = "type", value_parser = parse_transaction_type)]
        transaction_type: TransactionType,
        #[arg(long)]
        category: String,
        #[arg(long)]
        amount: Decimal,
        /// Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Generated when omitted.
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        project: Option<u32>,
        #[arg(long)]
        customer: Option<u32>,
        #[arg(long)]
        employee: Option<u32>,
        #[arg(long)]
        payment_method: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Employee CSV used to resolve `--employee`.
        #[arg(long)]
        employees: Option<PathBuf>,
    },
    Approve {
        #[arg(long)]
        id: u32,
    },
    Reject {
        #[arg(long)]
        id: u32,
        #[arg(long)]
        reason: String,
    },
    Cancel {
        #[arg(long)]
        id: u32,
    },
}

fn parse_payment_status(s: &str) -> std::result::Result<PaymentStatus, String> {
    PaymentStatus::parse(s).ok_or_else(|| format!("unknown payment status: {s}"))
}

fn parse_transaction_type(s: &str) -> std::result::Result<TransactionType, String> {
    TransactionType::parse(s).ok_or_else(|| format!("unknown transaction type: {s}"))
}

struct Stores {
    finance: FinanceStoreBox,
    salaries: SalaryStoreBox,
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    use staffledger::infrastructure::rocksdb::RocksDBStore;

    if let Some(db_path) = db_path {
        let store = RocksDBStore::open(db_path).into_diagnostic()?;
        return Ok(Stores {
            finance: Box::new(store.clone()),
            salaries: Box::new(store),
        });
    }
    Ok(in_memory_stores())
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_stores())
}

fn in_memory_stores() -> Stores {
    Stores {
        finance: Box::new(InMemoryFinanceStore::new()),
        salaries: Box::new(InMemorySalaryStore::new()),
    }
}

fn read_employees(path: &Path) -> Result<Vec<EmployeeDropdownItem>> {
    let file = File::open(path).into_diagnostic()?;
    EmployeeReader::new(file)
        .employees()
        .collect::<staffledger::error::Result<Vec<_>>>()
        .into_diagnostic()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "staffledger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let stores = open_stores(cli.db_path)?;
    let actor = Actor::administrator(cli.actor_id);

    match cli.command {
        Command::Payroll(command) => run_payroll(command, stores.salaries, &actor).await,
        Command::Finance(command) => run_finance(command, stores.finance, &actor).await,
    }
}

async fn run_payroll(command: PayrollCommand, salaries: SalaryStoreBox, actor: &Actor) -> Result<()> {
    let directory = InMemoryDirectory::new();

    let report = match command {
        PayrollCommand::Preview(args) => {
            let (engine, request) = batch(&args, salaries, directory).await?;
            engine.preview(actor, &request).await.into_diagnostic()?
        }
        PayrollCommand::Generate(args) => {
            let (engine, request) = batch(&args, salaries, directory).await?;
            engine.bulk_create(actor, &request).await.into_diagnostic()?
        }
        PayrollCommand::Pay {
            ids,
            status,
            date,
            notes,
        } => {
            let engine = PayrollBatchEngine::new(salaries, Box::new(directory), Box::new(SystemClock));
            let request = PaymentUpdateRequest {
                record_ids: ids,
                new_status: status,
                payment_date: date,
                notes,
            };
            engine.bulk_update_payment(actor, &request).await.into_diagnostic()?
        }
    };

    let stdout = io::stdout();
    let mut writer = OutcomeWriter::new(stdout.lock());
    writer.write_report(&report).into_diagnostic()?;
    eprintln!("{}", report.summary());

    Ok(())
}

async fn batch(
    args: &BatchArgs,
    salaries: SalaryStoreBox,
    directory: InMemoryDirectory,
) -> Result<(PayrollBatchEngine, BulkCreateRequest)> {
    let employees = read_employees(&args.employees)?;
    for employee in &employees {
        directory.add_employee(employee.clone()).await;
    }
    let period = Period::new(args.month, args.year).into_diagnostic()?;
    let engine = PayrollBatchEngine::new(salaries, Box::new(directory), Box::new(SystemClock));
    Ok((engine, BulkCreateRequest::new(period, employees, args.mode())))
}

async fn run_finance(command: FinanceCommand, finance: FinanceStoreBox, actor: &Actor) -> Result<()> {
    let directory = InMemoryDirectory::new();
    let ledger = TransactionLedger::new(finance, Box::new(directory.clone()), Box::new(SystemClock));

    match command {
        FinanceCommand::Record {
            transaction_type,
            category,
            amount,
            date,
            code,
            project,
            customer,
            employee,
            payment_method,
            description,
            employees,
        } => {
            if let Some(path) = employees {
                for item in read_employees(&path)? {
                    directory.add_employee(item).await;
                }
            }
            let date = date.unwrap_or_else(|| SystemClock.today());
            let mut draft = FinanceDraft::new(transaction_type, category, amount, date);
            if let Some(code) = code {
                draft = draft.with_code(code);
            }
            if let Some(id) = project {
                draft = draft.with_project(id);
            }
            if let Some(id) = customer {
                draft = draft.with_customer(id);
            }
            if let Some(id) = employee {
                draft = draft.with_employee(id);
            }
            if let Some(method) = payment_method {
                draft = draft.with_payment_method(method);
            }
            if let Some(text) = description {
                draft = draft.with_description(text);
            }

            let id = ledger.create(actor, draft).await.into_diagnostic()?;
            let tx = ledger.get(id).await.into_diagnostic()?;
            println!("{},{},{}", tx.id, tx.transaction_code, tx.status);
        }
        FinanceCommand::Approve { id } => {
            ledger.approve(actor, id).await.into_diagnostic()?;
            println!("{id},Approved");
        }
        FinanceCommand::Reject { id, reason } => {
            ledger.reject(actor, id, &reason).await.into_diagnostic()?;
            println!("{id},Rejected");
        }
        FinanceCommand::Cancel { id } => {
            ledger.cancel(actor, id).await.into_diagnostic()?;
            println!("{id},Cancelled");
        }
    }

    Ok(())
}
