pub mod actor;
pub mod directory;
pub mod finance;
pub mod ports;
pub mod salary;
