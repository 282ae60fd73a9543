pub mod history_writer;
pub mod spend_reader;
