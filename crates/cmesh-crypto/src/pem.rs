//! Minimal PEM encoding for raw Ed25519 public key bytes. The mesh does not
//! need ASN.1/SPKI framing — only a stable textual form to hash for account
//! id derivation (spec §3 "Account") — so this wraps the raw 32-byte key in
//! PEM delimiters with base64, not a full PKCS#8 SubjectPublicKeyInfo.

use base64::{engine::general_purpose::STANDARD, Engine as _};

const HEADER: &str = "-----BEGIN CMESH PUBLIC KEY-----";
const FOOTER: &str = "-----END CMESH PUBLIC KEY-----";
const LINE_WIDTH: usize = 64;

pub fn encode_public_key_pem(raw: &[u8; 32]) -> String {
    let b64 = STANDARD.encode(raw);
    let mut out = String::with_capacity(b64.len() + 64);
    out.push_str(HEADER);
    out.push('\n');
    for chunk in b64.as_bytes().chunks(LINE_WIDTH) {
        out.push_str(std::str::from_utf8(chunk).expect("base64 output is ascii"));
        out.push('\n');
    }
    out.push_str(FOOTER);
    out.push('\n');
    out
}

pub fn decode_public_key_pem(pem: &str) -> Result<[u8; 32], String> {
    let body: String = pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    let bytes = STANDARD
        .decode(body.trim())
        .map_err(|e| format!("malformed PEM base64: {e}"))?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| format!("expected 32-byte public key, got {}", v.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let raw = [7u8; 32];
        let pem = encode_public_key_pem(&raw);
        assert!(pem.starts_with(HEADER));
        let decoded = decode_public_key_pem(&pem).unwrap();
        assert_eq!(decoded, raw);
    }
}
