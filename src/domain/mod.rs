pub mod alert;
pub mod day_cursor;
pub mod filter;
pub mod models;
pub mod time_source;
