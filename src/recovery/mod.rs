pub mod log_manager;
pub mod log_recovery;
pub mod log_record;

pub use log_manager::LogManager;
pub use log_record::{LogRecord, LogRecordBody, LogRecordType};
pub use log_recovery::LogRecovery;
