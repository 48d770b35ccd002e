pub mod outcome;
pub mod probe;
pub mod receiver;
pub mod request_table;
pub mod sender;
