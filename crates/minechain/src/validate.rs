//! Boundary validation: loosely typed rows become strict [`MiningEvent`]s
//! before anything is hashed.

use crate::crypto::contains_delimiter;
use crate::{LedgerError, MiningEvent, RawMiningEvent, Result};

fn required_text(value: Option<String>, field: &str) -> Result<String> {
    let value = value.ok_or_else(|| LedgerError::MalformedEvent(format!("missing {field}")))?;
    if value.trim().is_empty() {
        return Err(LedgerError::MalformedEvent(format!("empty {field}")));
    }
    if contains_delimiter(&value) {
        return Err(LedgerError::MalformedEvent(format!("{field} contains ':'")));
    }
    Ok(value)
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| LedgerError::MalformedEvent(format!("missing {field}")))
}

impl TryFrom<RawMiningEvent> for MiningEvent {
    type Error = LedgerError;

    fn try_from(raw: RawMiningEvent) -> Result<Self> {
        Ok(Self {
            id: required_text(raw.id, "id")?,
            wallet_address: required_text(raw.wallet_address, "walletAddress")?,
            challenge_id: required_text(raw.challenge_id, "challengeId")?,
            solution_hash: required_text(raw.solution_hash, "solutionHash")?,
            points_awarded: required(raw.points_awarded, "pointsAwarded")?,
            difficulty: required(raw.difficulty, "difficulty")?,
            timestamp: required(raw.timestamp, "timestamp")?,
        })
    }
}

impl MiningEvent {
    /// Re-check an already typed event (e.g. one deserialized straight into
    /// `MiningEvent` by a caller that bypassed `RawMiningEvent`).
    pub fn validate(&self) -> Result<()> {
        for (value, field) in [
            (&self.id, "id"),
            (&self.wallet_address, "walletAddress"),
            (&self.challenge_id, "challengeId"),
            (&self.solution_hash, "solutionHash"),
        ] {
            required_text(Some(value.clone()), field)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawMiningEvent {
        RawMiningEvent {
            id: Some("e-1".into()),
            wallet_address: Some("wallet".into()),
            challenge_id: Some("c1".into()),
            solution_hash: Some("0000ab".into()),
            points_awarded: Some(10),
            difficulty: Some(4),
            timestamp: Some(1_700_000_000_000),
        }
    }

    #[test]
    fn complete_row_converts() {
        let ev = MiningEvent::try_from(raw()).unwrap();
        assert_eq!(ev.id, "e-1");
        assert_eq!(ev.points_awarded, 10);
        assert!(ev.validate().is_ok());
    }

    #[test]
    fn missing_field_is_rejected_not_hashed_as_placeholder() {
        let mut r = raw();
        r.solution_hash = None;
        match MiningEvent::try_from(r) {
            Err(LedgerError::MalformedEvent(msg)) => assert!(msg.contains("solutionHash")),
            other => panic!("unexpected: {other:?}"),
        }

        let mut r = raw();
        r.timestamp = None;
        assert!(matches!(MiningEvent::try_from(r), Err(LedgerError::MalformedEvent(_))));
    }

    #[test]
    fn empty_and_delimiter_values_are_rejected() {
        let mut r = raw();
        r.wallet_address = Some("  ".into());
        assert!(MiningEvent::try_from(r).is_err());

        let mut r = raw();
        r.challenge_id = Some("c:1".into());
        assert!(MiningEvent::try_from(r).is_err());
    }

    #[test]
    fn raw_deserializes_from_partial_json() {
        let r: RawMiningEvent = serde_json::from_str(r#"{"id":"x","walletAddress":"w"}"#).unwrap();
        assert!(r.challenge_id.is_none());
        assert!(MiningEvent::try_from(r).is_err());
    }
}
