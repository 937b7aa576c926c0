//! Sharpe/Sortino/Calmar/profit-factor over replay output.
//!
//! Grounded in `metrics.rs`'s `calculate_sharpe` shape (mean/stddev over a
//! return series, sample variance with an `n-1` denominator) but operating
//! over the canonical-decimal trade series this ledger produces rather
//! than a raw equity-sample vector, so the output is exactly reproducible
//! rather than float-order-dependent.

use crate::decimal::{checked_div, Cents, Ratio};
use crate::replay::ClosedTrade;
use serde::{Deserialize, Serialize};

/// `profitFactor` is `grossProfit / |grossLoss|`, which is unbounded when
/// `grossLoss == 0`. Never emitted as a bare JSON float infinity; the
/// sentinel string `"inf"` is used instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfitFactor {
    Finite(Ratio),
    Infinite,
}

impl ProfitFactor {
    pub fn canonical_string(&self) -> String {
        match self {
            ProfitFactor::Finite(r) => r.canonical_string(),
            ProfitFactor::Infinite => "inf".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub sharpe: Ratio,
    pub sortino: Ratio,
    pub calmar: Ratio,
    pub profit_factor: ProfitFactor,
    pub longest_win_streak: u32,
    pub longest_loss_streak: u32,
}

/// Sample mean and standard deviation (`n-1` denominator); zero when
/// fewer than two observations.
fn mean_stddev(xs: &[f64]) -> (f64, f64) {
    if xs.len() < 2 {
        return (xs.first().copied().unwrap_or(0.0), 0.0);
    }
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let variance = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt())
}

fn sharpe(net_profits: &[f64]) -> f64 {
    if net_profits.len() < 2 {
        return 0.0;
    }
    let (mean, std_dev) = mean_stddev(net_profits);
    checked_div(mean, std_dev)
}

fn sortino(net_profits: &[f64]) -> f64 {
    if net_profits.len() < 2 {
        return 0.0;
    }
    let n = net_profits.len() as f64;
    let mean = net_profits.iter().sum::<f64>() / n;
    let downside_sq_sum: f64 = net_profits.iter().filter(|&&r| r < 0.0).map(|r| r.powi(2)).sum();
    let downside_dev = (downside_sq_sum / (n - 1.0)).sqrt();
    checked_div(mean, downside_dev)
}

fn longest_run(flags: &[bool]) -> (u32, u32) {
    let mut longest_true = 0u32;
    let mut longest_false = 0u32;
    let mut current_true = 0u32;
    let mut current_false = 0u32;
    for &f in flags {
        if f {
            current_true += 1;
            current_false = 0;
        } else {
            current_false += 1;
            current_true = 0;
        }
        longest_true = longest_true.max(current_true);
        longest_false = longest_false.max(current_false);
    }
    (longest_true, longest_false)
}

/// Compute statistics from a chronological trade list and the replay's
/// final balance / max drawdown. `grossProfit`/`grossLoss` for the
/// profit-factor ratio are summed over the raw `profit` field of each
/// trade (excluding swap/commission), matching the worked ledger example.
pub fn compute_statistics(
    trades: &[ClosedTrade],
    max_drawdown: Cents,
    total_return: Cents,
) -> Statistics {
    let net_profits: Vec<f64> = trades.iter().map(|t| t.net_profit.to_f64()).collect();

    let gross_profit: f64 = trades.iter().map(|t| t.profit.to_f64()).filter(|&p| p > 0.0).sum();
    let gross_loss: f64 = trades.iter().map(|t| t.profit.to_f64()).filter(|&p| p < 0.0).sum();

    let profit_factor = if gross_loss == 0.0 {
        if gross_profit > 0.0 {
            ProfitFactor::Infinite
        } else {
            ProfitFactor::Finite(Ratio::ZERO)
        }
    } else {
        ProfitFactor::Finite(Ratio::from_f64(gross_profit / gross_loss.abs()))
    };

    let calmar = if max_drawdown.is_zero() {
        Ratio::ZERO
    } else {
        Ratio::from_f64(checked_div(total_return.to_f64(), max_drawdown.to_f64()))
    };

    let win_flags: Vec<bool> = net_profits.iter().map(|&p| p >= 0.0).collect();
    let (longest_win_streak, longest_loss_streak) = longest_run(&win_flags);

    Statistics {
        sharpe: Ratio::from_f64(sharpe(&net_profits)),
        sortino: Ratio::from_f64(sortino(&net_profits)),
        calmar,
        profit_factor,
        longest_win_streak,
        longest_loss_streak,
    }
}
