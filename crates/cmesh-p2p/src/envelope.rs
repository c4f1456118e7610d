use cmesh_core::{GossipPayload, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The wire envelope around every gossip payload: `{type, payload, messageId,
/// hopsLeft, requestId, timestamp}` (spec §4.3/§6). `payload`'s own
/// internal `type`/`payload` tagging (see `cmesh_core::GossipPayload`)
/// produces the outer `type` key via serde's adjacently-tagged flatten.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(flatten)]
    pub payload: GossipPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub hops_left: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: Timestamp,
}

impl Envelope {
    /// Build a freshly-originated envelope: a new `messageId` is minted here
    /// (spec §4.3 "Message ids are assigned on first emission").
    pub fn originate(payload: GossipPayload, hops_left: u32, timestamp: Timestamp) -> Self {
        Self {
            payload,
            message_id: Some(Uuid::new_v4().to_string()),
            hops_left,
            request_id: None,
            timestamp,
        }
    }

    pub fn with_request_id(mut self, request_id: String) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn to_line(&self) -> String {
        serde_json::to_string(self).expect("Envelope serialization is infallible")
    }

    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// A copy of this envelope, hop-decremented, for relay to other peers.
    pub fn relayed(&self) -> Option<Self> {
        if self.hops_left == 0 {
            return None;
        }
        let mut next = self.clone();
        next.hops_left -= 1;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let env = Envelope::originate(
            GossipPayload::Ping { timestamp: 1, ping_id: "p1".into() },
            3,
            1,
        );
        let line = env.to_line();
        let parsed = Envelope::from_line(&line).unwrap();
        assert_eq!(parsed.hops_left, 3);
        assert_eq!(parsed.message_id, env.message_id);
    }

    #[test]
    fn malformed_line_fails_to_parse() {
        assert!(Envelope::from_line("not json at all").is_err());
    }

    #[test]
    fn relay_decrements_hops_and_stops_at_zero() {
        let env = Envelope::originate(
            GossipPayload::Task { task: dummy_task() },
            1,
            1,
        );
        let relayed = env.relayed().unwrap();
        assert_eq!(relayed.hops_left, 0);
        assert!(relayed.relayed().is_none());
    }

    fn dummy_task() -> cmesh_core::Task {
        cmesh_core::Task::new(
            cmesh_core::TaskId::derive("d", &cmesh_core::AccountId::from("acct_0000000000000000"), 1),
            "d".into(),
            cmesh_core::AccountId::from("acct_0000000000000000"),
            1,
            cmesh_core::Bounty { amount: 1, token: "mesh".into() },
            cmesh_core::AccountId::from("escrow_000000000000000000000000"),
            vec![],
        )
    }
}
