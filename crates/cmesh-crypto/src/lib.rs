//! cmesh-crypto
//!
//! Ed25519 wallet keypair, signing/verification, account id derivation and
//! canonical transaction signing.

pub mod hash;
pub mod keypair;
pub mod pem;
pub mod tx;

pub use hash::account_id_from_pem;
pub use keypair::{verify, KeyPair};
pub use tx::{build_signed_transaction, verify_transaction_signature};
