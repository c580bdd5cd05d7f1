//! Mailbox persistence
//!
//! - [`csv`]: pipe-delimited file with append, delete-rewrite and reload

pub mod csv;

pub use csv::CsvStorage;
