use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    #[default]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewsImpact {
    Low,
    Medium,
    High,
    Holiday,
}

/// Economic calendar event attached to a trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsEvent {
    pub title: String,
    pub impact: NewsImpact,
    pub time: String,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    pub account_id: Option<String>,

    pub symbol: String,
    pub direction: TradeDirection,
    pub date: NaiveDate,
    pub entry_time: Option<String>,
    pub holding_time: Option<String>,

    pub lot_size: f64,
    pub entry_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub stop_loss_pips: Option<f64>,
    pub risk_reward_ratio: Option<String>, // free text, e.g. "1:2.5"

    pub pnl_amount: f64,
    pub pnl_percentage: f64,

    #[serde(default)]
    pub pre_market_plan: String,
    #[serde(default)]
    pub post_market_plan: String,
    #[serde(default)]
    pub emotions_before: String,
    #[serde(default)]
    pub emotions_during: String,
    #[serde(default)]
    pub emotions_after: String,
    #[serde(default)]
    pub notes: String,

    #[serde(default)]
    pub chart_before_images: Vec<String>,
    #[serde(default)]
    pub chart_after_images: Vec<String>,
    #[serde(default)]
    pub pre_market_images: Vec<String>,
    #[serde(default)]
    pub post_market_images: Vec<String>,

    // Bracket-label encoded, see models::chart_notes
    pub chart_analysis_notes: Option<String>,
    pub pre_market_notes: Option<String>,
    pub post_market_notes: Option<String>,

    pub strategy: Option<String>,
    pub category: Option<String>,
    pub forecast_id: Option<String>,

    #[serde(default)]
    pub followed_rules_list: Vec<String>,
    #[serde(default)]
    pub broken_rules_list: Vec<String>,

    #[serde(default)]
    pub is_paper_trade: bool,
    #[serde(default)]
    pub no_trade_taken: bool,
    #[serde(default)]
    pub status: TradeStatus,

    #[serde(default)]
    pub news_events: Vec<NewsEvent>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trade {
    /// Real trades count towards P&L and win rate; paper trades and
    /// no-trade days never do.
    pub fn is_real(&self) -> bool {
        !self.is_paper_trade && !self.no_trade_taken
    }
}

/// Insert payload: a trade without identity, owner, account or timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeDraft {
    pub symbol: String,
    pub direction: TradeDirection,
    pub date: NaiveDate,
    pub entry_time: Option<String>,
    pub holding_time: Option<String>,
    pub lot_size: f64,
    pub entry_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub stop_loss_pips: Option<f64>,
    pub risk_reward_ratio: Option<String>,
    pub pnl_amount: f64,
    pub pnl_percentage: f64,
    #[serde(default)]
    pub pre_market_plan: String,
    #[serde(default)]
    pub post_market_plan: String,
    #[serde(default)]
    pub emotions_before: String,
    #[serde(default)]
    pub emotions_during: String,
    #[serde(default)]
    pub emotions_after: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub chart_before_images: Vec<String>,
    #[serde(default)]
    pub chart_after_images: Vec<String>,
    #[serde(default)]
    pub pre_market_images: Vec<String>,
    #[serde(default)]
    pub post_market_images: Vec<String>,
    pub chart_analysis_notes: Option<String>,
    pub pre_market_notes: Option<String>,
    pub post_market_notes: Option<String>,
    pub strategy: Option<String>,
    pub category: Option<String>,
    pub forecast_id: Option<String>,
    #[serde(default)]
    pub followed_rules_list: Vec<String>,
    #[serde(default)]
    pub broken_rules_list: Vec<String>,
    #[serde(default)]
    pub is_paper_trade: bool,
    #[serde(default)]
    pub no_trade_taken: bool,
    #[serde(default)]
    pub status: TradeStatus,
    #[serde(default)]
    pub news_events: Vec<NewsEvent>,
}

impl TradeDraft {
    /// Minimal draft with every optional field empty.
    pub fn new(symbol: impl Into<String>, direction: TradeDirection, date: NaiveDate) -> Self {
        Self {
            symbol: symbol.into(),
            direction,
            date,
            entry_time: None,
            holding_time: None,
            lot_size: 0.0,
            entry_price: 0.0,
            stop_loss: None,
            take_profit: None,
            stop_loss_pips: None,
            risk_reward_ratio: None,
            pnl_amount: 0.0,
            pnl_percentage: 0.0,
            pre_market_plan: String::new(),
            post_market_plan: String::new(),
            emotions_before: String::new(),
            emotions_during: String::new(),
            emotions_after: String::new(),
            notes: String::new(),
            chart_before_images: Vec::new(),
            chart_after_images: Vec::new(),
            pre_market_images: Vec::new(),
            post_market_images: Vec::new(),
            chart_analysis_notes: None,
            pre_market_notes: None,
            post_market_notes: None,
            strategy: None,
            category: None,
            forecast_id: None,
            followed_rules_list: Vec::new(),
            broken_rules_list: Vec::new(),
            is_paper_trade: false,
            no_trade_taken: false,
            status: TradeStatus::Closed,
            news_events: Vec::new(),
        }
    }

    /// Materialize the draft into a stored trade.
    pub fn into_trade(
        self,
        id: String,
        user_id: String,
        account_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Trade {
        Trade {
            id,
            user_id,
            account_id,
            symbol: self.symbol,
            direction: self.direction,
            date: self.date,
            entry_time: self.entry_time,
            holding_time: self.holding_time,
            lot_size: self.lot_size,
            entry_price: self.entry_price,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            stop_loss_pips: self.stop_loss_pips,
            risk_reward_ratio: self.risk_reward_ratio,
            pnl_amount: self.pnl_amount,
            pnl_percentage: self.pnl_percentage,
            pre_market_plan: self.pre_market_plan,
            post_market_plan: self.post_market_plan,
            emotions_before: self.emotions_before,
            emotions_during: self.emotions_during,
            emotions_after: self.emotions_after,
            notes: self.notes,
            chart_before_images: self.chart_before_images,
            chart_after_images: self.chart_after_images,
            pre_market_images: self.pre_market_images,
            post_market_images: self.post_market_images,
            chart_analysis_notes: self.chart_analysis_notes,
            pre_market_notes: self.pre_market_notes,
            post_market_notes: self.post_market_notes,
            strategy: self.strategy,
            category: self.category,
            forecast_id: self.forecast_id,
            followed_rules_list: self.followed_rules_list,
            broken_rules_list: self.broken_rules_list,
            is_paper_trade: self.is_paper_trade,
            no_trade_taken: self.no_trade_taken,
            status: self.status,
            news_events: self.news_events,
            created_at: now,
            updated_at: now,
        }
    }
}

impl From<&Trade> for TradeDraft {
    /// Clone without identity: id, owner, account and timestamps are dropped.
    fn from(trade: &Trade) -> Self {
        Self {
            symbol: trade.symbol.clone(),
            direction: trade.direction,
            date: trade.date,
            entry_time: trade.entry_time.clone(),
            holding_time: trade.holding_time.clone(),
            lot_size: trade.lot_size,
            entry_price: trade.entry_price,
            stop_loss: trade.stop_loss,
            take_profit: trade.take_profit,
            stop_loss_pips: trade.stop_loss_pips,
            risk_reward_ratio: trade.risk_reward_ratio.clone(),
            pnl_amount: trade.pnl_amount,
            pnl_percentage: trade.pnl_percentage,
            pre_market_plan: trade.pre_market_plan.clone(),
            post_market_plan: trade.post_market_plan.clone(),
            emotions_before: trade.emotions_before.clone(),
            emotions_during: trade.emotions_during.clone(),
            emotions_after: trade.emotions_after.clone(),
            notes: trade.notes.clone(),
            chart_before_images: trade.chart_before_images.clone(),
            chart_after_images: trade.chart_after_images.clone(),
            pre_market_images: trade.pre_market_images.clone(),
            post_market_images: trade.post_market_images.clone(),
            chart_analysis_notes: trade.chart_analysis_notes.clone(),
            pre_market_notes: trade.pre_market_notes.clone(),
            post_market_notes: trade.post_market_notes.clone(),
            strategy: trade.strategy.clone(),
            category: trade.category.clone(),
            forecast_id: trade.forecast_id.clone(),
            followed_rules_list: trade.followed_rules_list.clone(),
            broken_rules_list: trade.broken_rules_list.clone(),
            is_paper_trade: trade.is_paper_trade,
            no_trade_taken: trade.no_trade_taken,
            status: trade.status,
            news_events: trade.news_events.clone(),
        }
    }
}

/// Sparse update. Only fields that are `Some` are serialized and written;
/// nullable columns use `Some(None)` to clear.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<TradeDirection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_time: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holding_time: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lot_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss_pips: Option<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_reward_ratio: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pnl_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pnl_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_market_plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_market_plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotions_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotions_during: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotions_after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_before_images: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_after_images: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_market_images: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_market_images: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_analysis_notes: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_market_notes: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_market_notes: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast_id: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followed_rules_list: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broken_rules_list: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_paper_trade: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_trade_taken: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TradeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub news_events: Option<Vec<NewsEvent>>,
}

macro_rules! apply_fields {
    ($patch:expr, $trade:expr, $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = &$patch.$field {
                $trade.$field = value.clone();
            }
        )+
    };
}

impl TradePatch {
    pub fn is_empty(&self) -> bool {
        *self == TradePatch::default()
    }

    /// Merge the present fields into `trade` and stamp `updated_at`.
    pub fn apply_to(&self, trade: &mut Trade, now: DateTime<Utc>) {
        apply_fields!(
            self,
            trade,
            symbol,
            direction,
            date,
            entry_time,
            holding_time,
            lot_size,
            entry_price,
            stop_loss,
            take_profit,
            stop_loss_pips,
            risk_reward_ratio,
            pnl_amount,
            pnl_percentage,
            pre_market_plan,
            post_market_plan,
            emotions_before,
            emotions_during,
            emotions_after,
            notes,
            chart_before_images,
            chart_after_images,
            pre_market_images,
            post_market_images,
            chart_analysis_notes,
            pre_market_notes,
            post_market_notes,
            strategy,
            category,
            forecast_id,
            followed_rules_list,
            broken_rules_list,
            is_paper_trade,
            no_trade_taken,
            status,
            news_events,
        );
        trade.updated_at = now;
    }
}
