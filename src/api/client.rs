use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::auth::Session;
use crate::models::{AccountMembership, Settings, Trade, TradeDraft, TradePatch, UpdateSettingsInput};

use super::error::BackendError;

/// Configuration for rate limiting
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

/// Which slice of the user's trades a query targets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountScope {
    Account(String),
    /// Trades with no owning account
    Unassigned,
}

impl AccountScope {
    pub fn from_account_id(account_id: Option<&str>) -> Self {
        match account_id {
            Some(id) => AccountScope::Account(id.to_string()),
            None => AccountScope::Unassigned,
        }
    }

    pub fn account_id(&self) -> Option<&str> {
        match self {
            AccountScope::Account(id) => Some(id),
            AccountScope::Unassigned => None,
        }
    }
}

/// Request parameters for fetching trades
#[derive(Debug, Clone)]
pub struct FetchTradesRequest {
    pub scope: AccountScope,
    /// Most recent N trades by date
    pub limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Row-level change notification for a user's trades
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeChange {
    pub kind: ChangeKind,
    pub user_id: String,
    pub trade_id: String,
    pub account_id: Option<String>,
}

/// Remote data store the sync core reads from and writes to
#[async_trait]
pub trait JournalBackend: Send + Sync {
    /// Backend name for logging (e.g., "rest", "sqlite")
    fn backend_name(&self) -> &str;

    async fn list_account_memberships(
        &self,
        session: &Session,
    ) -> Result<Vec<AccountMembership>, BackendError>;

    async fn get_selected_account_id(&self, session: &Session)
        -> Result<Option<String>, BackendError>;

    async fn set_selected_account_id(
        &self,
        session: &Session,
        account_id: &str,
    ) -> Result<(), BackendError>;

    /// Trades for the scope, newest date first
    async fn fetch_trades(
        &self,
        session: &Session,
        request: FetchTradesRequest,
    ) -> Result<Vec<Trade>, BackendError>;

    async fn insert_trade(
        &self,
        session: &Session,
        account_id: &str,
        draft: TradeDraft,
    ) -> Result<Trade, BackendError>;

    /// Write only the fields present in `patch`
    async fn update_trade(
        &self,
        session: &Session,
        trade_id: &str,
        patch: &TradePatch,
    ) -> Result<(), BackendError>;

    async fn delete_trade(&self, session: &Session, trade_id: &str) -> Result<(), BackendError>;

    async fn get_settings(&self, session: &Session) -> Result<Settings, BackendError>;

    async fn update_settings(
        &self,
        session: &Session,
        input: UpdateSettingsInput,
    ) -> Result<Settings, BackendError>;
}

/// Source of realtime change notifications
pub trait ChangeFeed: Send + Sync {
    /// Receiver yields changes for `user_id` only
    fn subscribe(&self, user_id: &str) -> broadcast::Receiver<TradeChange>;
}
