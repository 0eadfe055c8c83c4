pub mod block;
pub mod transaction;

pub use block::{Block, BlockHeader, InvalidBlockError, TransactionGroupSummary};
pub use transaction::Transaction;
