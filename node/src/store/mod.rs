pub mod block_store;
pub mod error;
pub mod kv;
pub mod utxo_store;

pub use block_store::BlockStore;
pub use error::StoreError;
pub use kv::{KvStore, SledKvStore, WriteBatch};
pub use utxo_store::UtxoStore;
