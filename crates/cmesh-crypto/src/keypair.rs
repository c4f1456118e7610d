use cmesh_core::{AccountId, MeshError, MeshResult};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::hash::account_id_from_pem;
use crate::pem::{decode_public_key_pem, encode_public_key_pem};

fn ser_secret_hex<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(bytes))
}

fn de_secret_hex<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
    let text = String::deserialize(d)?;
    hex::decode(&text).map_err(serde::de::Error::custom)
}

/// An Ed25519 wallet keypair: the derived `accountId`, the public key in
/// PEM form, and the secret key seed (hex on the wire, zeroized on drop).
/// The whole struct is `Serialize`/`Deserialize` — this IS the on-disk
/// keyfile shape; callers (the wallet CLI) write/read it directly.
#[derive(Serialize, Deserialize)]
pub struct KeyPair {
    pub account_id: AccountId,
    pub public_key_pem: String,
    #[serde(serialize_with = "ser_secret_hex", deserialize_with = "de_secret_hex")]
    secret_key: Vec<u8>,
}

impl KeyPair {
    /// Generate a fresh Ed25519 keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        Self::from_signing_key(signing_key)
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        let public_key_pem = encode_public_key_pem(&verifying_key.to_bytes());
        let account_id = account_id_from_pem(&public_key_pem);
        Self {
            account_id,
            public_key_pem,
            secret_key: signing_key.to_bytes().to_vec(),
        }
    }

    /// Restore a keypair from a raw 32-byte secret seed. Used when loading a
    /// keyfile from disk.
    pub fn from_seed(seed: &[u8]) -> MeshResult<Self> {
        let arr: [u8; 32] = seed
            .try_into()
            .map_err(|_| MeshError::BadKeyMaterial("secret key seed must be 32 bytes".into()))?;
        Ok(Self::from_signing_key(SigningKey::from_bytes(&arr)))
    }

    fn signing_key(&self) -> SigningKey {
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&self.secret_key);
        SigningKey::from_bytes(&seed)
    }

    pub fn verifying_key(&self) -> MeshResult<VerifyingKey> {
        let raw = decode_public_key_pem(&self.public_key_pem)
            .map_err(MeshError::BadKeyMaterial)?;
        VerifyingKey::from_bytes(&raw)
            .map_err(|e| MeshError::BadKeyMaterial(format!("invalid public key: {e}")))
    }

    /// Sign arbitrary bytes with this keypair's secret key.
    pub fn sign(&self, message: &[u8]) -> String {
        let sig: Signature = self.signing_key().sign(message);
        hex::encode(sig.to_bytes())
    }

    /// Validate that `public_key_pem` is genuinely this keypair's public key
    /// and that `account_id` is what it derives to. Used on import
    /// (spec §4.1: `BadKeyMaterial` on mismatch).
    pub fn verify_self_consistent(&self) -> MeshResult<()> {
        let derived_pem_key = self.signing_key().verifying_key();
        let declared = self.verifying_key()?;
        if derived_pem_key != declared {
            return Err(MeshError::BadKeyMaterial(
                "declared public key does not match secret key".into(),
            ));
        }
        let expected_account = account_id_from_pem(&self.public_key_pem);
        if expected_account != self.account_id {
            return Err(MeshError::BadKeyMaterial(
                "declared account id does not match public key".into(),
            ));
        }
        Ok(())
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.secret_key.zeroize();
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair {{ account_id: {:?} }}", self.account_id)
    }
}

/// Verify a hex-encoded Ed25519 signature over `message` against a PEM
/// public key. Used by the ledger when validating a received transaction.
pub fn verify(pubkey_pem: &str, message: &[u8], signature_hex: &str) -> MeshResult<()> {
    let raw = decode_public_key_pem(pubkey_pem).map_err(|_| MeshError::BadSignature)?;
    let verifying_key =
        VerifyingKey::from_bytes(&raw).map_err(|_| MeshError::BadSignature)?;
    let sig_bytes = hex::decode(signature_hex).map_err(|_| MeshError::BadSignature)?;
    let sig_arr: [u8; 64] = sig_bytes.as_slice().try_into().map_err(|_| MeshError::BadSignature)?;
    let signature = Signature::from_bytes(&sig_arr);
    verifying_key
        .verify(message, &signature)
        .map_err(|_| MeshError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let kp = KeyPair::generate();
        let msg = b"capsule mesh settlement payload";
        let sig = kp.sign(msg);
        assert!(verify(&kp.public_key_pem, msg, &sig).is_ok());
    }

    #[test]
    fn tampered_message_fails_verification() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"original");
        assert!(verify(&kp.public_key_pem, b"tampered", &sig).is_err());
    }

    #[test]
    fn self_consistency_check_passes_for_generated_key() {
        let kp = KeyPair::generate();
        assert!(kp.verify_self_consistent().is_ok());
    }

    #[test]
    fn self_consistency_check_fails_on_tampered_account_id() {
        let mut kp = KeyPair::generate();
        kp.account_id = AccountId::from("acct_0000000000000000");
        assert!(kp.verify_self_consistent().is_err());
    }

    #[test]
    fn json_round_trip_preserves_signing_ability() {
        let kp = KeyPair::generate();
        let json = serde_json::to_string(&kp).unwrap();
        let restored: KeyPair = serde_json::from_str(&json).unwrap();
        let sig = restored.sign(b"hello");
        assert!(verify(&restored.public_key_pem, b"hello", &sig).is_ok());
    }
}
