//! CSV adapters used by the command-line tool.

pub mod catalog_reader;
pub mod command_reader;
pub mod report_writer;
