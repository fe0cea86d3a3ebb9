pub mod money;
pub mod period;
pub mod transaction;

pub use money::{AmountError, Money};
pub use period::DateRange;
pub use transaction::{Transaction, TransactionId, TransactionKey, TransactionType, UNCATEGORIZED};
