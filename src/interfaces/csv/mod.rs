pub mod employee_reader;
pub mod outcome_writer;
