//! Nostr event model and integrity checks.

use anyhow::{anyhow, Result};
use secp256k1::{schnorr::Signature, Message, Secp256k1, XOnlyPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Wrapper for a Nostr tag expressed as an array of strings.
///
/// Tags appear as small arrays where the first element denotes the type and
/// the following elements hold data, e.g. `["e", "<event id>"]` or
/// `["t", "news"]`. Each tag is stored verbatim so uncommon or custom tags
/// are preserved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// The tag's value, conventionally its second element.
    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }
}

/// Core Nostr event persisted in the store and served to clients.
///
/// ```json
/// {
///   "id": "aa11",
///   "pubkey": "npub...",
///   "kind": 1,
///   "created_at": 1700000000,
///   "tags": [["t", "news"], ["e", "bb22"]],
///   "content": "hello",
///   "sig": "deadbeef"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Event identifier (hex of SHA-256 hash).
    pub id: String,
    /// Author public key (hex).
    pub pubkey: String,
    /// Kind number, e.g. `1` or `30023`.
    pub kind: u32,
    /// Unix timestamp of creation.
    pub created_at: u64,
    /// Arbitrary tags such as `e` (reference) or `t` (topic).
    pub tags: Vec<Tag>,
    /// Event content body.
    pub content: String,
    /// Schnorr signature over the event hash.
    pub sig: String,
}

/// Recompute the Nostr event hash from its fields.
pub fn event_hash(ev: &Event) -> Result<[u8; 32]> {
    let arr = serde_json::json!([0, ev.pubkey, ev.created_at, ev.kind, ev.tags, ev.content]);
    let data = serde_json::to_vec(&arr)?;
    let hash = Sha256::digest(&data);
    Ok(hash.into())
}

/// Verify an event's ID and Schnorr signature.
///
/// Ingest-only guard: the read path assumes stored events already passed it.
pub fn verify(ev: &Event) -> Result<()> {
    let hash = event_hash(ev)?;
    let calc_id = hex::encode(hash);
    if calc_id != ev.id {
        return Err(anyhow!("id mismatch"));
    }
    let sig = Signature::from_slice(&hex::decode(&ev.sig)?)?;
    let pk = XOnlyPublicKey::from_slice(&hex::decode(&ev.pubkey)?)?;
    let secp = Secp256k1::verification_only();
    let msg = Message::from_digest_slice(&hash)?;
    secp.verify_schnorr(&sig, &msg, &pk)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::Keypair;

    fn signed_event(kind: u32) -> Event {
        let secp = Secp256k1::new();
        let sk = [1u8; 32];
        let kp = Keypair::from_seckey_slice(&secp, &sk).unwrap();
        let pubkey = kp.x_only_public_key().0;
        let mut ev = Event {
            id: String::new(),
            pubkey: hex::encode(pubkey.serialize()),
            kind,
            created_at: 1,
            tags: vec![],
            content: String::new(),
            sig: String::new(),
        };
        let hash = event_hash(&ev).unwrap();
        ev.id = hex::encode(hash);
        let msg = Message::from_digest_slice(&hash).unwrap();
        let sig = secp.sign_schnorr_no_aux_rand(&msg, &kp);
        ev.sig = hex::encode(sig.as_ref());
        ev
    }

    #[test]
    fn event_hash_matches_reference() {
        let ev = Event {
            id: String::new(),
            pubkey: "00".repeat(32),
            kind: 1,
            created_at: 1,
            tags: vec![],
            content: String::new(),
            sig: String::new(),
        };
        let expected = {
            let obj =
                serde_json::json!([0, ev.pubkey, ev.created_at, ev.kind, ev.tags, ev.content]);
            let mut hasher = Sha256::new();
            hasher.update(serde_json::to_vec(&obj).unwrap());
            let bytes = hasher.finalize();
            let mut arr = [0u8; 32];
            arr.copy_from_slice(&bytes);
            arr
        };
        assert_eq!(event_hash(&ev).unwrap(), expected);
    }

    #[test]
    fn verify_accepts_signed_event() {
        let ev = signed_event(1);
        verify(&ev).unwrap();
    }

    #[test]
    fn verify_rejects_bad_sig() {
        let mut ev = signed_event(1);
        ev.sig = "00".repeat(64);
        assert!(verify(&ev).is_err());
    }

    #[test]
    fn verify_rejects_id_mismatch() {
        let mut ev = signed_event(1);
        ev.id.replace_range(0..2, "ff");
        assert!(verify(&ev).is_err());
    }

    #[test]
    fn tag_value_is_second_element() {
        let tag = Tag(vec!["t".into(), "news".into(), "extra".into()]);
        assert_eq!(tag.value(), Some("news"));
        assert_eq!(Tag(vec!["t".into()]).value(), None);
    }

    #[test]
    fn event_json_roundtrip() {
        let ev = Event {
            id: "aa".repeat(32),
            pubkey: "bb".repeat(32),
            kind: 30023,
            created_at: 1700000000,
            tags: vec![Tag(vec!["t".into(), "news".into()])],
            content: "hello".into(),
            sig: "cc".repeat(64),
        };
        let json = serde_json::to_string(&ev).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ev);
    }
}
