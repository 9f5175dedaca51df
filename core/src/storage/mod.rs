pub mod utxo;

pub use utxo::{compute_state_root, Utxo};
