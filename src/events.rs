//! Event types and wire schema.
//!
//! Events are modelled as a tagged sum type keyed by `eventType`, an
//! exhaustive `match` over the payload variant rather than a duck-typed
//! bag of optional fields.

use crate::decimal::{Cents, Lots, Price};
use serde::{Deserialize, Serialize};

pub type Ticket = u64;
pub type UnixSeconds = i64;
pub type SeqNo = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionMode {
    Live,
    Paper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CashflowKind {
    Deposit,
    Withdrawal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BrokerAction {
    Open,
    Close,
}

/// One event payload variant. Field names are `camelCase` on the wire;
/// the tag value (`eventType`) is a fixed `SCREAMING_SNAKE_CASE` string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "camelCase")]
pub enum EventPayload {
    #[serde(rename = "SESSION_START")]
    SessionStart {
        broker: String,
        account: String,
        symbol: String,
        timeframe: String,
        ea_version: String,
        mode: SessionMode,
        balance: Cents,
    },
    #[serde(rename = "SESSION_END")]
    SessionEnd {
        reason: String,
        final_balance: Option<Cents>,
        final_equity: Option<Cents>,
        uptime_seconds: u64,
    },
    #[serde(rename = "SNAPSHOT")]
    Snapshot {
        balance: Cents,
        equity: Cents,
        open_trades: u32,
        unrealized_pn_l: Cents,
        drawdown: Cents,
    },
    #[serde(rename = "TRADE_OPEN")]
    TradeOpen {
        ticket: Ticket,
        symbol: String,
        direction: Direction,
        lots: Lots,
        open_price: Price,
        sl: Option<Price>,
        tp: Option<Price>,
    },
    #[serde(rename = "TRADE_CLOSE")]
    TradeClose {
        ticket: Ticket,
        close_price: Price,
        profit: Cents,
        swap: Cents,
        commission: Cents,
        close_reason: String,
    },
    #[serde(rename = "TRADE_MODIFY")]
    TradeModify {
        ticket: Ticket,
        new_sl: Option<Price>,
        new_tp: Option<Price>,
        old_sl: Option<Price>,
        old_tp: Option<Price>,
    },
    #[serde(rename = "PARTIAL_CLOSE")]
    PartialClose {
        ticket: Ticket,
        closed_lots: Lots,
        remaining_lots: Lots,
        profit: Cents,
        close_price: Price,
    },
    #[serde(rename = "CASHFLOW")]
    Cashflow {
        #[serde(rename = "type")]
        kind: CashflowKind,
        amount: Cents,
        balance_before: Cents,
        balance_after: Cents,
        note: String,
    },
    #[serde(rename = "BROKER_EVIDENCE")]
    BrokerEvidence {
        broker_ticket: String,
        execution_timestamp: UnixSeconds,
        symbol: String,
        volume: Lots,
        execution_price: Price,
        action: BrokerAction,
        linked_ticket: Ticket,
    },
    #[serde(rename = "BROKER_HISTORY_DIGEST")]
    BrokerHistoryDigest {
        period_start: UnixSeconds,
        period_end: UnixSeconds,
        trade_count: u64,
        history_hash: String,
        first_ticket: Option<Ticket>,
        last_ticket: Option<Ticket>,
        export_format: String,
    },
    #[serde(rename = "CHAIN_RECOVERY")]
    ChainRecovery {
        previous_seq_no: SeqNo,
        previous_hash: String,
        recovered_from_seq_no: SeqNo,
        recovered_from_hash: String,
        reason: String,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::SessionStart { .. } => "SESSION_START",
            EventPayload::SessionEnd { .. } => "SESSION_END",
            EventPayload::Snapshot { .. } => "SNAPSHOT",
            EventPayload::TradeOpen { .. } => "TRADE_OPEN",
            EventPayload::TradeClose { .. } => "TRADE_CLOSE",
            EventPayload::TradeModify { .. } => "TRADE_MODIFY",
            EventPayload::PartialClose { .. } => "PARTIAL_CLOSE",
            EventPayload::Cashflow { .. } => "CASHFLOW",
            EventPayload::BrokerEvidence { .. } => "BROKER_EVIDENCE",
            EventPayload::BrokerHistoryDigest { .. } => "BROKER_HISTORY_DIGEST",
            EventPayload::ChainRecovery { .. } => "CHAIN_RECOVERY",
        }
    }

    /// Payload-shape validation. Chain/hash validity is checked
    /// separately by [`crate::chain`].
    pub fn validate(&self) -> Result<(), SchemaError> {
        match self {
            EventPayload::TradeOpen { lots, .. } if lots.is_zero() || lots.to_f64() < 0.0 => {
                Err(SchemaError::new("lots must be > 0 on TRADE_OPEN"))
            }
            EventPayload::PartialClose { remaining_lots, .. } if remaining_lots.to_f64() < 0.0 => {
                Err(SchemaError::new("remainingLots must be >= 0 on PARTIAL_CLOSE"))
            }
            _ => Ok(()),
        }
    }
}

/// A tagged, human-readable schema validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaError {
    pub message: String,
}

impl SchemaError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "schema error: {}", self.message)
    }
}

/// The full, hash-chained event record as stored and replayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub instance_id: String,
    pub seq_no: SeqNo,
    pub prev_hash: String,
    pub event_hash: String,
    pub timestamp: UnixSeconds,
    pub payload: EventPayload,
}

impl Event {
    /// Validate the structural invariants that don't require chain
    /// context: hex shape of the two hash fields and a positive
    /// timestamp.
    pub fn validate_shape(&self) -> Result<(), SchemaError> {
        if self.timestamp <= 0 {
            return Err(SchemaError::new("timestamp must be positive"));
        }
        if !is_hex64(&self.prev_hash) {
            return Err(SchemaError::new("prevHash must be 64-char lowercase hex"));
        }
        if !is_hex64(&self.event_hash) {
            return Err(SchemaError::new("eventHash must be 64-char lowercase hex"));
        }
        self.payload.validate()
    }
}

pub fn is_hex64(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_tag_matches_wire_constant() {
        let p = EventPayload::Snapshot {
            balance: Cents::from_f64(1.0),
            equity: Cents::from_f64(1.0),
            open_trades: 0,
            unrealized_pn_l: Cents::ZERO,
            drawdown: Cents::ZERO,
        };
        assert_eq!(p.event_type(), "SNAPSHOT");
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["eventType"], "SNAPSHOT");
    }

    #[test]
    fn trade_open_rejects_non_positive_lots() {
        let p = EventPayload::TradeOpen {
            ticket: 1,
            symbol: "EURUSD".into(),
            direction: Direction::Buy,
            lots: Lots::ZERO,
            open_price: Price::from_f64(1.085),
            sl: None,
            tp: None,
        };
        assert!(p.validate().is_err());
    }

    #[test]
    fn is_hex64_rejects_uppercase_and_wrong_length() {
        assert!(is_hex64(&"a".repeat(64)));
        assert!(!is_hex64(&"A".repeat(64)));
        assert!(!is_hex64(&"a".repeat(63)));
    }
}
