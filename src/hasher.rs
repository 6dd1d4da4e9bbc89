//! Deterministic account pseudonymization
//!
//! Everywhere an account identity crosses a persistence or network
//! boundary it is replaced by a keyed digest, so raw account numbers
//! never land in edge records. The digest must be stable across process
//! restarts: no salt, no randomness, same inputs in, same hex out.

use sha2::{Digest, Sha256};

use crate::messages::AccountKey;

/// Pseudonymize one side of a payment.
///
/// Digest over the concatenation of the agent's clearing-system member id,
/// the account identifier, and the proprietary scheme code. Each input
/// individually affects the output.
pub fn account_hash(member_id: &str, account_id: &str, scheme: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(member_id.as_bytes());
    hasher.update(account_id.as_bytes());
    hasher.update(scheme.as_bytes());
    hex::encode(hasher.finalize())
}

/// [`account_hash`] over a message-side [`AccountKey`]
pub fn hash_key(key: &AccountKey<'_>) -> String {
    account_hash(key.member_id, key.account_id, key.scheme)
}
