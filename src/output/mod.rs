pub mod calendar;
pub mod csv_file;
