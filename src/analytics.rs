use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::{Settings, Trade, TradeStatus};

/// Trades that count towards P&L: no paper trades, no no-trade days.
pub fn real_trades(trades: &[Trade]) -> impl Iterator<Item = &Trade> {
    trades.iter().filter(|t| t.is_real())
}

fn sum_pnl(trades: &[Trade], in_window: impl Fn(NaiveDate) -> bool) -> f64 {
    real_trades(trades)
        .filter(|t| in_window(t.date))
        .map(|t| t.pnl_amount)
        .sum()
}

pub fn daily_pnl(trades: &[Trade], date: NaiveDate) -> f64 {
    sum_pnl(trades, |d| d == date)
}

/// Seven days starting at `start`, inclusive
pub fn weekly_pnl(trades: &[Trade], start: NaiveDate) -> f64 {
    let end = start.checked_add_days(Days::new(7)).unwrap_or(NaiveDate::MAX);
    sum_pnl(trades, |d| d >= start && d < end)
}

/// `month` is 1-based
pub fn monthly_pnl(trades: &[Trade], year: i32, month: u32) -> f64 {
    sum_pnl(trades, |d| d.year() == year && d.month() == month)
}

pub fn yearly_pnl(trades: &[Trade], year: i32) -> f64 {
    sum_pnl(trades, |d| d.year() == year)
}

pub fn total_pnl(trades: &[Trade]) -> f64 {
    sum_pnl(trades, |_| true)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_trades: i32,
    pub wins: i32,
    pub losses: i32,
    pub breakevens: i32,
    pub open_trades: i32,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub profit_factor: f64,
    pub avg_risk_reward: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
}

pub fn dashboard_stats(trades: &[Trade]) -> DashboardStats {
    let real: Vec<&Trade> = real_trades(trades).collect();
    let closed = || real.iter().filter(|t| t.status == TradeStatus::Closed);

    let wins = closed().filter(|t| t.pnl_amount > 0.0).count() as i32;
    let losses = closed().filter(|t| t.pnl_amount < 0.0).count() as i32;
    let breakevens = closed().filter(|t| t.pnl_amount == 0.0).count() as i32;
    let open_trades = real.iter().filter(|t| t.status == TradeStatus::Open).count() as i32;

    let decided = wins + losses;
    let win_rate = if decided > 0 {
        (wins as f64 / decided as f64) * 100.0
    } else {
        0.0
    };

    let gross_profit: f64 = real.iter().map(|t| t.pnl_amount).filter(|p| *p > 0.0).sum();
    let gross_loss: f64 = real
        .iter()
        .map(|t| t.pnl_amount)
        .filter(|p| *p < 0.0)
        .sum::<f64>()
        .abs();

    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    let ratios: Vec<f64> = real
        .iter()
        .filter_map(|t| t.risk_reward_ratio.as_deref().and_then(parse_risk_reward))
        .collect();
    let avg_risk_reward = if ratios.is_empty() {
        0.0
    } else {
        ratios.iter().sum::<f64>() / ratios.len() as f64
    };

    let best_trade = real.iter().map(|t| t.pnl_amount).fold(None, |best: Option<f64>, p| {
        Some(best.map_or(p, |b| b.max(p)))
    });
    let worst_trade = real.iter().map(|t| t.pnl_amount).fold(None, |worst: Option<f64>, p| {
        Some(worst.map_or(p, |w| w.min(p)))
    });

    DashboardStats {
        total_trades: real.len() as i32,
        wins,
        losses,
        breakevens,
        open_trades,
        win_rate,
        total_pnl: gross_profit - gross_loss,
        gross_profit,
        gross_loss,
        profit_factor,
        avg_risk_reward,
        best_trade: best_trade.unwrap_or(0.0),
        worst_trade: worst_trade.unwrap_or(0.0),
    }
}

/// Reward per unit of risk from free text: "1:2.5" -> 2.5, "3" -> 3.0
pub fn parse_risk_reward(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    match raw.split_once(':') {
        Some((risk, reward)) => {
            let risk: f64 = risk.trim().parse().ok()?;
            let reward: f64 = reward.trim().parse().ok()?;
            (risk > 0.0).then(|| reward / risk)
        }
        None => raw.parse().ok(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityCurvePoint {
    pub date: NaiveDate,
    pub cumulative_pnl: f64,
    pub balance: f64,
    pub daily_pnl: f64,
    pub trade_count: i32,
}

/// One point per trading day, oldest first
pub fn equity_curve(trades: &[Trade], starting_balance: f64) -> Vec<EquityCurvePoint> {
    let mut daily: BTreeMap<NaiveDate, (f64, i32)> = BTreeMap::new();
    for trade in real_trades(trades).filter(|t| t.status == TradeStatus::Closed) {
        let entry = daily.entry(trade.date).or_insert((0.0, 0));
        entry.0 += trade.pnl_amount;
        entry.1 += 1;
    }

    let mut cumulative_pnl = 0.0;
    daily
        .into_iter()
        .map(|(date, (daily_pnl, trade_count))| {
            cumulative_pnl += daily_pnl;
            EquityCurvePoint {
                date,
                cumulative_pnl,
                balance: starting_balance + cumulative_pnl,
                daily_pnl,
                trade_count,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalPeriod {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalProgress {
    pub period: GoalPeriod,
    pub goal: f64,
    pub pnl: f64,
    /// Share of the goal reached, in percent; may exceed 100
    pub percent: f64,
    pub reached: bool,
}

/// Progress against each goal set in `settings`. Weeks start on Monday.
pub fn goal_progress(trades: &[Trade], settings: &Settings, today: NaiveDate) -> Vec<GoalProgress> {
    let week_start = today
        .checked_sub_days(Days::new(today.weekday().num_days_from_monday() as u64))
        .unwrap_or(today);

    [
        (GoalPeriod::Daily, settings.daily_goal, daily_pnl(trades, today)),
        (GoalPeriod::Weekly, settings.weekly_goal, weekly_pnl(trades, week_start)),
        (
            GoalPeriod::Monthly,
            settings.monthly_goal,
            monthly_pnl(trades, today.year(), today.month()),
        ),
        (GoalPeriod::Yearly, settings.yearly_goal, yearly_pnl(trades, today.year())),
    ]
    .into_iter()
    .filter_map(|(period, goal, pnl)| {
        let goal = goal.filter(|g| *g > 0.0)?;
        Some(GoalProgress {
            period,
            goal,
            pnl,
            percent: pnl / goal * 100.0,
            reached: pnl >= goal,
        })
    })
    .collect()
}
