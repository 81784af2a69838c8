//! Seal record state machine
//!
//! ```text
//!   write track:  Pending -> Unsealed -> Sealed -> Unconfirmed -> Confirmed
//!                              ^          |          |
//!                              +----------+----------+   (reseal after grace period)
//!
//!   watch track:  Watched -> Unconfirmed -> Confirmed
//!                    |           |
//!                    +-----------+--> Unwatched        (gave up after grace period)
//! ```
//!
//! Which track a record is on is fixed at creation by its `SealIntent`.

use crate::error::{AnchorError, Result};
use serde::{Deserialize, Serialize};

/// Whether this process owns the on-chain write for a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SealIntent {
    /// We submit the transaction ourselves
    Write,
    /// Someone else submits it; we only observe
    Watch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SealState {
    /// Created, but the seal address could not be resolved yet
    Pending,
    Unsealed,
    Sealed { tx_id: String },
    Watched,
    Unconfirmed { tx_id: String, confirmations: u64 },
    Confirmed { tx_id: String, confirmations: u64 },
    Unwatched,
}

/// Fieldless mirror of `SealState`, used for store queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SealStateKind {
    Pending,
    Unsealed,
    Sealed,
    Watched,
    Unconfirmed,
    Confirmed,
    Unwatched,
}

impl SealStateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SealStateKind::Pending => "pending",
            SealStateKind::Unsealed => "unsealed",
            SealStateKind::Sealed => "sealed",
            SealStateKind::Watched => "watched",
            SealStateKind::Unconfirmed => "unconfirmed",
            SealStateKind::Confirmed => "confirmed",
            SealStateKind::Unwatched => "unwatched",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SealStateKind::Pending),
            "unsealed" => Some(SealStateKind::Unsealed),
            "sealed" => Some(SealStateKind::Sealed),
            "watched" => Some(SealStateKind::Watched),
            "unconfirmed" => Some(SealStateKind::Unconfirmed),
            "confirmed" => Some(SealStateKind::Confirmed),
            "unwatched" => Some(SealStateKind::Unwatched),
            _ => None,
        }
    }
}

impl std::fmt::Display for SealStateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SealState {
    pub fn kind(&self) -> SealStateKind {
        match self {
            SealState::Pending => SealStateKind::Pending,
            SealState::Unsealed => SealStateKind::Unsealed,
            SealState::Sealed { .. } => SealStateKind::Sealed,
            SealState::Watched => SealStateKind::Watched,
            SealState::Unconfirmed { .. } => SealStateKind::Unconfirmed,
            SealState::Confirmed { .. } => SealStateKind::Confirmed,
            SealState::Unwatched => SealStateKind::Unwatched,
        }
    }

    pub fn tx_id(&self) -> Option<&str> {
        match self {
            SealState::Sealed { tx_id }
            | SealState::Unconfirmed { tx_id, .. }
            | SealState::Confirmed { tx_id, .. } => Some(tx_id),
            _ => None,
        }
    }

    pub fn confirmations(&self) -> u64 {
        match self {
            SealState::Unconfirmed { confirmations, .. }
            | SealState::Confirmed { confirmations, .. } => *confirmations,
            _ => 0,
        }
    }

    fn illegal(&self, event: &'static str) -> AnchorError {
        AnchorError::IllegalTransition {
            from: self.kind().as_str(),
            event,
        }
    }

    /// Pending -> Unsealed once an address is known
    pub fn resolve(&self) -> Result<SealState> {
        match self {
            SealState::Pending => Ok(SealState::Unsealed),
            _ => Err(self.illegal("resolve")),
        }
    }

    /// Unsealed -> Sealed after the adapter accepted our transaction
    pub fn seal(&self, tx_id: String) -> Result<SealState> {
        match self {
            SealState::Unsealed => Ok(SealState::Sealed { tx_id }),
            _ => Err(self.illegal("seal")),
        }
    }

    /// Record a confirmation count read from the chain
    ///
    /// Reaching `required` confirmations moves the record to `Confirmed`.
    /// A lower count than already recorded never moves it backwards.
    pub fn observe(&self, tx_id: String, confirmations: u64, required: u64) -> Result<SealState> {
        let confirmations = confirmations.max(self.confirmations());
        match self {
            SealState::Sealed { .. } | SealState::Watched | SealState::Unconfirmed { .. } => {
                if confirmations >= required {
                    Ok(SealState::Confirmed { tx_id, confirmations })
                } else {
                    Ok(SealState::Unconfirmed { tx_id, confirmations })
                }
            }
            _ => Err(self.illegal("observe")),
        }
    }

    /// Give up on a commitment someone else owns
    pub fn unwatch(&self) -> Result<SealState> {
        match self {
            SealState::Watched | SealState::Unconfirmed { .. } => Ok(SealState::Unwatched),
            _ => Err(self.illegal("unwatch")),
        }
    }

    /// Send our own unconfirmed write back to be submitted again
    pub fn reseal(&self) -> Result<SealState> {
        match self {
            SealState::Sealed { .. } | SealState::Unconfirmed { .. } => Ok(SealState::Unsealed),
            _ => Err(self.illegal("reseal")),
        }
    }
}

/// Everything tracked about one object or batch awaiting an on-chain seal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealRecord {
    pub link: String,
    pub permalink: String,
    /// Seal address, absent while `Pending`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub base_pub_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<String>,
    pub blockchain: String,
    pub network: String,
    pub intent: SealIntent,
    pub state: SealState,
    pub created_at: i64,
    /// Time of the most recent successful submission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sealed_at: Option<i64>,
    pub updated_at: i64,
}

impl SealRecord {
    pub fn kind(&self) -> SealStateKind {
        self.state.kind()
    }

    pub fn confirmations(&self) -> u64 {
        self.state.confirmations()
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self.state, SealState::Confirmed { .. })
    }

    pub fn resolve_address(&mut self, address: String, now: i64) -> Result<()> {
        self.state = self.state.resolve()?;
        self.address = Some(address);
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_sealed(&mut self, tx_id: String, now: i64) -> Result<()> {
        self.state = self.state.seal(tx_id)?;
        self.sealed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Apply a chain observation; returns whether anything changed
    pub fn observe(&mut self, tx_id: String, confirmations: u64, required: u64, now: i64) -> Result<bool> {
        let next = self.state.observe(tx_id, confirmations, required)?;
        if next == self.state {
            return Ok(false);
        }
        self.state = next;
        self.updated_at = now;
        Ok(true)
    }

    pub fn unwatch(&mut self, now: i64) -> Result<()> {
        if self.intent != SealIntent::Watch {
            return Err(AnchorError::IllegalTransition {
                from: self.kind().as_str(),
                event: "unwatch",
            });
        }
        self.state = self.state.unwatch()?;
        self.updated_at = now;
        Ok(())
    }

    pub fn reseal(&mut self, now: i64) -> Result<()> {
        if self.intent != SealIntent::Write {
            return Err(AnchorError::IllegalTransition {
                from: self.kind().as_str(),
                event: "reseal",
            });
        }
        self.state = self.state.reseal()?;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(intent: SealIntent, state: SealState) -> SealRecord {
        SealRecord {
            link: "aa".to_string(),
            permalink: "aa".to_string(),
            address: Some("0x01".to_string()),
            base_pub_key: "02ab".to_string(),
            counterparty: None,
            blockchain: "ethereum".to_string(),
            network: "mock".to_string(),
            intent,
            state,
            created_at: 0,
            sealed_at: None,
            updated_at: 0,
        }
    }

    #[test]
    fn test_write_track_happy_path() {
        let mut r = record(SealIntent::Write, SealState::Pending);
        r.resolve_address("0xabc".to_string(), 1).unwrap();
        assert_eq!(r.kind(), SealStateKind::Unsealed);

        r.mark_sealed("tx1".to_string(), 2).unwrap();
        assert_eq!(r.state.tx_id(), Some("tx1"));
        assert_eq!(r.sealed_at, Some(2));

        assert!(r.observe("tx1".to_string(), 1, 3, 3).unwrap());
        assert_eq!(r.kind(), SealStateKind::Unconfirmed);
        assert!(r.observe("tx1".to_string(), 3, 3, 4).unwrap());
        assert!(r.is_confirmed());
        assert_eq!(r.confirmations(), 3);
    }

    #[test]
    fn test_observe_never_lowers_confirmations() {
        let state = SealState::Unconfirmed { tx_id: "t".to_string(), confirmations: 4 };
        let next = state.observe("t".to_string(), 1, 6).unwrap();
        assert_eq!(next.confirmations(), 4);
    }

    #[test]
    fn test_unchanged_observation_reports_no_change() {
        let mut r = record(
            SealIntent::Watch,
            SealState::Unconfirmed { tx_id: "t".to_string(), confirmations: 2 },
        );
        assert!(!r.observe("t".to_string(), 2, 6, 9).unwrap());
        assert_eq!(r.updated_at, 0);
    }

    #[test]
    fn test_confirmed_is_terminal() {
        let state = SealState::Confirmed { tx_id: "t".to_string(), confirmations: 6 };
        assert!(state.observe("t".to_string(), 7, 6).is_err());
        assert!(state.reseal().is_err());
        assert!(state.unwatch().is_err());
    }

    #[test]
    fn test_unwatch_requires_watch_intent() {
        let mut ours = record(SealIntent::Write, SealState::Sealed { tx_id: "t".to_string() });
        assert!(matches!(
            ours.unwatch(1),
            Err(AnchorError::IllegalTransition { event: "unwatch", .. })
        ));

        let mut theirs = record(SealIntent::Watch, SealState::Watched);
        theirs.unwatch(1).unwrap();
        assert_eq!(theirs.kind(), SealStateKind::Unwatched);
        assert!(theirs.observe("t".to_string(), 10, 1, 2).is_err());
    }

    #[test]
    fn test_reseal_requires_write_intent() {
        let mut theirs = record(
            SealIntent::Watch,
            SealState::Unconfirmed { tx_id: "t".to_string(), confirmations: 1 },
        );
        assert!(theirs.reseal(1).is_err());

        let mut ours = record(
            SealIntent::Write,
            SealState::Unconfirmed { tx_id: "t".to_string(), confirmations: 1 },
        );
        ours.reseal(1).unwrap();
        assert_eq!(ours.state, SealState::Unsealed);
        assert_eq!(ours.state.tx_id(), None);
    }

    #[test]
    fn test_state_kind_string_round_trip() {
        for kind in [
            SealStateKind::Pending,
            SealStateKind::Unsealed,
            SealStateKind::Sealed,
            SealStateKind::Watched,
            SealStateKind::Unconfirmed,
            SealStateKind::Confirmed,
            SealStateKind::Unwatched,
        ] {
            assert_eq!(SealStateKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SealStateKind::parse("bogus"), None);
    }

    #[test]
    fn test_state_serializes_tagged() {
        let json = serde_json::to_value(SealState::Sealed { tx_id: "t".to_string() }).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "sealed", "tx_id": "t" }));
    }
}
