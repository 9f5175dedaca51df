pub mod block;
pub mod transaction;

pub use block::{Block, BlockBody, BlockHeader};
pub use transaction::{OutPoint, OutputCategory, Transaction, TransactionInput, TransactionOutput, UnlockProof};
