//! Deterministic replay engine.
//!
//! A pure function over the full event prefix — no I/O, no clock, no RNG —
//! grounded in the peak/drawdown tracking loop of `equity_curve.rs`,
//! generalized from a single `equity_value` stream to the full running
//! state this ledger derives (balance, drawdown, closed trades, daily
//! time-weighted returns).

use crate::decimal::{Cents, Lots, Price, Ratio};
use crate::events::{CashflowKind, Direction, Event, EventPayload, SeqNo, Ticket};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPosition {
    pub ticket: Ticket,
    pub symbol: String,
    pub direction: Direction,
    pub lots: Lots,
    pub open_price: Price,
    pub sl: Option<Price>,
    pub tp: Option<Price>,
    pub open_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub ticket: Ticket,
    pub symbol: String,
    pub direction: Direction,
    pub lots: Lots,
    pub open_price: Price,
    pub close_price: Price,
    pub profit: Cents,
    pub swap: Cents,
    pub commission: Cents,
    pub net_profit: Cents,
    pub close_reason: String,
    pub open_timestamp: i64,
    pub close_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: i64,
    pub value: Cents,
    pub cause: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancePoint {
    pub timestamp: i64,
    pub value: Cents,
    pub cause: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DrawdownPoint {
    pub timestamp: i64,
    pub dd_abs: Cents,
    pub dd_pct: Ratio,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyEquity {
    pub start_equity: Cents,
    pub end_equity: Cents,
    pub cashflow: Cents,
}

/// Derived ledger state after replaying an event prefix. Every field is
/// reconstructed purely from the event sequence; nothing here is carried
/// over from any previous run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayState {
    pub last_seq_no: SeqNo,
    pub last_event_hash: String,

    pub balance: Cents,
    pub equity: Cents,
    pub high_water_mark: Cents,
    pub max_drawdown: Cents,
    pub max_drawdown_pct: Ratio,
    pub max_drawdown_duration_sec: i64,
    pub drawdown_start_timestamp: i64,
    pub peak_equity_timestamp: i64,

    pub total_trades: u32,
    pub win_count: u32,
    pub loss_count: u32,
    pub total_profit: Cents,
    pub total_swap: Cents,
    pub total_commission: Cents,
    pub cumulative_cashflow: Cents,

    pub open_positions: Vec<OpenPosition>,
    pub closed_trades: Vec<ClosedTrade>,

    pub equity_curve: Vec<EquityPoint>,
    pub balance_curve: Vec<BalancePoint>,
    pub drawdown_series: Vec<DrawdownPoint>,
    pub daily_equity: BTreeMap<String, DailyEquity>,

    pub broker_evidence_count: u32,
    pub broker_history_digest_count: u32,
    pub chain_recovery_count: u32,
}

impl Default for ReplayState {
    fn default() -> Self {
        Self {
            last_seq_no: 0,
            last_event_hash: crate::canonical::GENESIS.to_string(),
            balance: Cents::ZERO,
            equity: Cents::ZERO,
            high_water_mark: Cents::ZERO,
            max_drawdown: Cents::ZERO,
            max_drawdown_pct: Ratio::ZERO,
            max_drawdown_duration_sec: 0,
            drawdown_start_timestamp: 0,
            peak_equity_timestamp: 0,
            total_trades: 0,
            win_count: 0,
            loss_count: 0,
            total_profit: Cents::ZERO,
            total_swap: Cents::ZERO,
            total_commission: Cents::ZERO,
            cumulative_cashflow: Cents::ZERO,
            open_positions: Vec::new(),
            closed_trades: Vec::new(),
            equity_curve: Vec::new(),
            balance_curve: Vec::new(),
            drawdown_series: Vec::new(),
            daily_equity: BTreeMap::new(),
            broker_evidence_count: 0,
            broker_history_digest_count: 0,
            chain_recovery_count: 0,
        }
    }
}

fn date_key(timestamp: i64) -> String {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "1970-01-01".to_string())
}

impl ReplayState {
    /// Peak/drawdown update invoked wherever equity changes.
    fn update_peak_and_drawdown(&mut self, ts: i64) {
        if self.equity > self.high_water_mark.to_f64() {
            self.high_water_mark = self.equity;
            self.peak_equity_timestamp = ts;
            if self.drawdown_start_timestamp > 0 {
                let dur = ts - self.drawdown_start_timestamp;
                self.max_drawdown_duration_sec = self.max_drawdown_duration_sec.max(dur);
                self.drawdown_start_timestamp = 0;
            }
        } else if self.high_water_mark.to_f64() > 0.0 {
            if self.drawdown_start_timestamp == 0 {
                self.drawdown_start_timestamp = self.peak_equity_timestamp;
            }
            let dd_abs = self.high_water_mark - self.equity;
            let dd_pct = Ratio::percent_of(dd_abs, self.high_water_mark);
            self.max_drawdown = self.max_drawdown.max(dd_abs);
            self.max_drawdown_pct = self.max_drawdown_pct.max(dd_pct);
            let dur = ts - self.drawdown_start_timestamp;
            self.max_drawdown_duration_sec = self.max_drawdown_duration_sec.max(dur);
            self.drawdown_series.push(DrawdownPoint { timestamp: ts, dd_abs, dd_pct });
        }
    }

    fn emit_points(&mut self, ts: i64, cause: &str) {
        self.equity_curve.push(EquityPoint { timestamp: ts, value: self.equity, cause: cause.to_string() });
        self.balance_curve.push(BalancePoint { timestamp: ts, value: self.balance, cause: cause.to_string() });
    }

    fn touch_daily_end_equity(&mut self, ts: i64) {
        let key = date_key(ts);
        let entry = self.daily_equity.entry(key).or_insert_with(|| DailyEquity {
            start_equity: self.equity,
            end_equity: self.equity,
            cashflow: Cents::ZERO,
        });
        entry.end_equity = self.equity;
    }

    fn apply(&mut self, e: &Event) {
        let ts = e.timestamp;
        match &e.payload {
            EventPayload::SessionStart { balance, .. } => {
                if self.last_seq_no <= 1 || self.balance.is_zero() {
                    self.balance = *balance;
                    self.equity = *balance;
                    self.high_water_mark = *balance;
                    self.peak_equity_timestamp = ts;
                }
                self.emit_points(ts, "SESSION_START");
            }
            EventPayload::Snapshot { balance, equity, .. } => {
                self.balance = *balance;
                self.equity = *equity;
                self.update_peak_and_drawdown(ts);
                self.emit_points(ts, "SNAPSHOT");
                self.touch_daily_end_equity(ts);
            }
            EventPayload::TradeOpen { ticket, symbol, direction, lots, open_price, sl, tp } => {
                self.open_positions.push(OpenPosition {
                    ticket: *ticket,
                    symbol: symbol.clone(),
                    direction: *direction,
                    lots: *lots,
                    open_price: *open_price,
                    sl: *sl,
                    tp: *tp,
                    open_timestamp: ts,
                });
            }
            EventPayload::TradeClose { ticket, close_price, profit, swap, commission, close_reason } => {
                let net_profit = *profit + *swap + *commission;
                let pos_index = self.open_positions.iter().position(|p| p.ticket == *ticket);
                let pos = pos_index.map(|i| self.open_positions.remove(i));
                self.total_trades += 1;
                if net_profit.to_f64() >= 0.0 {
                    self.win_count += 1;
                } else {
                    self.loss_count += 1;
                }
                self.total_profit = self.total_profit + *profit;
                self.total_swap = self.total_swap + *swap;
                self.total_commission = self.total_commission + *commission;
                self.balance = self.balance + net_profit;
                self.equity = self.balance;
                if let Some(pos) = pos {
                    self.closed_trades.push(ClosedTrade {
                        ticket: *ticket,
                        symbol: pos.symbol,
                        direction: pos.direction,
                        lots: pos.lots,
                        open_price: pos.open_price,
                        close_price: *close_price,
                        profit: *profit,
                        swap: *swap,
                        commission: *commission,
                        net_profit,
                        close_reason: close_reason.clone(),
                        open_timestamp: pos.open_timestamp,
                        close_timestamp: ts,
                    });
                }
                self.update_peak_and_drawdown(ts);
                self.emit_points(ts, "TRADE_CLOSE");
            }
            EventPayload::TradeModify { ticket, new_sl, new_tp, .. } => {
                if let Some(pos) = self.open_positions.iter_mut().find(|p| p.ticket == *ticket) {
                    pos.sl = *new_sl;
                    pos.tp = *new_tp;
                }
            }
            EventPayload::PartialClose { ticket, remaining_lots, profit, .. } => {
                if let Some(pos) = self.open_positions.iter_mut().find(|p| p.ticket == *ticket) {
                    pos.lots = *remaining_lots;
                }
                self.total_profit = self.total_profit + *profit;
                self.balance = self.balance + *profit;
                self.equity = self.balance;
                self.update_peak_and_drawdown(ts);
                self.emit_points(ts, "PARTIAL_CLOSE");
            }
            EventPayload::Cashflow { kind, amount, .. } => {
                let signed = match kind {
                    CashflowKind::Deposit => *amount,
                    CashflowKind::Withdrawal => -*amount,
                };
                self.balance = self.balance + signed;
                self.equity = self.equity + signed;
                self.high_water_mark = self.high_water_mark + signed;
                self.cumulative_cashflow = self.cumulative_cashflow + signed;
                let key = date_key(ts);
                let entry = self.daily_equity.entry(key).or_insert_with(|| DailyEquity {
                    start_equity: self.equity,
                    end_equity: self.equity,
                    cashflow: Cents::ZERO,
                });
                entry.cashflow = entry.cashflow + signed;
                self.emit_points(ts, "CASHFLOW");
            }
            EventPayload::SessionEnd { final_balance, final_equity, .. } => {
                if let Some(b) = final_balance {
                    self.balance = *b;
                }
                if let Some(eq) = final_equity {
                    self.equity = *eq;
                }
                self.update_peak_and_drawdown(ts);
                self.emit_points(ts, "SESSION_END");
            }
            EventPayload::BrokerEvidence { .. } => {
                self.broker_evidence_count += 1;
            }
            EventPayload::BrokerHistoryDigest { .. } => {
                self.broker_history_digest_count += 1;
            }
            EventPayload::ChainRecovery { .. } => {
                self.chain_recovery_count += 1;
            }
        }
        self.last_seq_no = e.seq_no;
        self.last_event_hash = e.event_hash.clone();
    }
}

/// Replay the full event prefix into a [`ReplayState`]. Events are
/// assumed already in ascending `seqNo` order (the caller — ingest path
/// or bundle verifier — is responsible for chain validity; this function
/// applies semantics regardless and never fails).
pub fn replay_all(events: &[Event]) -> ReplayState {
    let mut state = ReplayState::default();
    for e in events {
        state.apply(e);
    }
    state
}

/// Daily time-weighted return: `(end - start - cashflow) / start * 100`.
pub fn daily_twr(day: &DailyEquity) -> Ratio {
    if day.start_equity.is_zero() {
        return Ratio::ZERO;
    }
    let numerator = (day.end_equity - day.start_equity - day.cashflow).to_f64();
    Ratio::from_f64(numerator / day.start_equity.to_f64() * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::compute_event_hash;
    use crate::events::{Direction, SessionMode};

    fn ev(instance_id: &str, seq_no: SeqNo, prev_hash: &str, ts: i64, payload: EventPayload) -> Event {
        let hash = compute_event_hash(instance_id, seq_no, prev_hash, ts, &payload);
        Event {
            instance_id: instance_id.to_string(),
            seq_no,
            prev_hash: prev_hash.to_string(),
            event_hash: hash,
            timestamp: ts,
            payload,
        }
    }

    /// The twelve-event worked ledger.
    #[test]
    fn worked_example_matches_expected_final_state() {
        let instance_id = "worked-example";
        let mut events = Vec::new();
        let mut prev = crate::canonical::GENESIS.to_string();
        let mut seq = 1u64;
        let mut ts = 1_700_000_000i64;

        macro_rules! push {
            ($payload:expr) => {{
                let e = ev(instance_id, seq, &prev, ts, $payload);
                prev = e.event_hash.clone();
                events.push(e);
                seq += 1;
                ts += 60;
            }};
        }

        push!(EventPayload::SessionStart {
            broker: "IC Markets".into(),
            account: "1".into(),
            symbol: "EURUSD".into(),
            timeframe: "M15".into(),
            ea_version: "1.0".into(),
            mode: SessionMode::Live,
            balance: Cents::from_f64(10000.0),
        });
        push!(EventPayload::Snapshot {
            balance: Cents::from_f64(10000.0),
            equity: Cents::from_f64(10000.0),
            open_trades: 0,
            unrealized_pn_l: Cents::ZERO,
            drawdown: Cents::ZERO,
        });
        push!(EventPayload::TradeOpen {
            ticket: 1,
            symbol: "EURUSD".into(),
            direction: Direction::Buy,
            lots: Lots::from_f64(0.10),
            open_price: Price::from_f64(1.085),
            sl: None,
            tp: None,
        });
        push!(EventPayload::Snapshot {
            balance: Cents::from_f64(10000.0),
            equity: Cents::from_f64(9980.0),
            open_trades: 1,
            unrealized_pn_l: Cents::from_f64(-20.0),
            drawdown: Cents::from_f64(20.0),
        });
        push!(EventPayload::Snapshot {
            balance: Cents::from_f64(10000.0),
            equity: Cents::from_f64(10050.0),
            open_trades: 1,
            unrealized_pn_l: Cents::from_f64(50.0),
            drawdown: Cents::ZERO,
        });
        push!(EventPayload::TradeClose {
            ticket: 1,
            close_price: Price::from_f64(1.0875),
            profit: Cents::from_f64(25.00),
            swap: Cents::from_f64(-1.20),
            commission: Cents::from_f64(-3.50),
            close_reason: "manual".into(),
        });
        push!(EventPayload::Snapshot {
            balance: Cents::from_f64(10020.30),
            equity: Cents::from_f64(10020.30),
            open_trades: 0,
            unrealized_pn_l: Cents::ZERO,
            drawdown: Cents::ZERO,
        });
        push!(EventPayload::Cashflow {
            kind: CashflowKind::Deposit,
            amount: Cents::from_f64(5000.0),
            balance_before: Cents::from_f64(10020.30),
            balance_after: Cents::from_f64(15020.30),
            note: "wire".into(),
        });
        push!(EventPayload::TradeOpen {
            ticket: 2,
            symbol: "GBPUSD".into(),
            direction: Direction::Buy,
            lots: Lots::from_f64(0.20),
            open_price: Price::from_f64(1.26),
            sl: None,
            tp: None,
        });
        push!(EventPayload::Snapshot {
            balance: Cents::from_f64(15020.30),
            equity: Cents::from_f64(14870.30),
            open_trades: 1,
            unrealized_pn_l: Cents::from_f64(-150.0),
            drawdown: Cents::from_f64(179.70),
        });
        push!(EventPayload::TradeClose {
            ticket: 2,
            close_price: Price::from_f64(1.25),
            profit: Cents::from_f64(-200.00),
            swap: Cents::from_f64(-2.50),
            commission: Cents::from_f64(-7.00),
            close_reason: "manual".into(),
        });
        push!(EventPayload::Snapshot {
            balance: Cents::from_f64(14810.80),
            equity: Cents::from_f64(14810.80),
            open_trades: 0,
            unrealized_pn_l: Cents::ZERO,
            drawdown: Cents::from_f64(239.20),
        });

        let state = replay_all(&events);

        assert_eq!(state.balance.canonical_string(), "14810.80");
        assert_eq!(state.equity.canonical_string(), "14810.80");
        assert_eq!(state.high_water_mark.canonical_string(), "15050.00");
        assert_eq!(state.max_drawdown.canonical_string(), "239.20");
        assert_eq!(state.max_drawdown_pct.canonical_string(), "1.5892");
        assert_eq!(state.cumulative_cashflow.canonical_string(), "5000.00");
        assert_eq!(state.total_trades, 2);
        assert_eq!(state.win_count, 1);
        assert_eq!(state.loss_count, 1);
        assert_eq!(state.total_swap.canonical_string(), "-3.70");
        assert_eq!(state.total_commission.canonical_string(), "-10.50");
        assert_eq!(state.total_profit.canonical_string(), "-175.00");
    }

    #[test]
    fn drawdown_is_never_reset_by_a_cashflow() {
        let instance_id = "cashflow-neutrality";
        let mut events = Vec::new();
        let mut prev = crate::canonical::GENESIS.to_string();
        let mut seq = 1u64;
        let mut ts = 1_700_000_000i64;
        macro_rules! push {
            ($payload:expr) => {{
                let e = ev(instance_id, seq, &prev, ts, $payload);
                prev = e.event_hash.clone();
                events.push(e);
                seq += 1;
                ts += 60;
            }};
        }
        push!(EventPayload::SessionStart {
            broker: "IC Markets".into(),
            account: "1".into(),
            symbol: "EURUSD".into(),
            timeframe: "M15".into(),
            ea_version: "1.0".into(),
            mode: SessionMode::Live,
            balance: Cents::from_f64(10000.0),
        });
        push!(EventPayload::Snapshot {
            balance: Cents::from_f64(9000.0),
            equity: Cents::from_f64(9000.0),
            open_trades: 0,
            unrealized_pn_l: Cents::ZERO,
            drawdown: Cents::from_f64(1000.0),
        });
        let dd_before = replay_all(&events).max_drawdown;

        push!(EventPayload::Cashflow {
            kind: CashflowKind::Deposit,
            amount: Cents::from_f64(2000.0),
            balance_before: Cents::from_f64(9000.0),
            balance_after: Cents::from_f64(11000.0),
            note: "top-up".into(),
        });
        let dd_after = replay_all(&events).max_drawdown;

        assert!(dd_after.to_f64() >= dd_before.to_f64());
    }

    #[test]
    fn daily_twr_excludes_cashflow_contribution() {
        let day = DailyEquity {
            start_equity: Cents::from_f64(1000.0),
            end_equity: Cents::from_f64(1100.0),
            cashflow: Cents::from_f64(50.0),
        };
        assert_eq!(daily_twr(&day).canonical_string(), "5.0000");
    }
}
