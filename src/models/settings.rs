use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub user_id: String,
    pub currency: String,
    pub account_balance: f64,
    pub daily_goal: Option<f64>,
    pub weekly_goal: Option<f64>,
    pub monthly_goal: Option<f64>,
    pub yearly_goal: Option<f64>,
    pub reduced_motion: bool,
    pub show_paper_trades: bool,
    pub compact_calendar: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Settings {
    pub fn defaults_for(user_id: &str, now: i64) -> Self {
        Self {
            user_id: user_id.to_string(),
            currency: "USD".to_string(),
            account_balance: 0.0,
            daily_goal: None,
            weekly_goal: None,
            monthly_goal: None,
            yearly_goal: None,
            reduced_motion: false,
            show_paper_trades: true,
            compact_calendar: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSettingsInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_balance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_goal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly_goal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_goal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yearly_goal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduced_motion: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_paper_trades: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compact_calendar: Option<bool>,
}
