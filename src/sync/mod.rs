pub mod account_context;
pub mod retry;
pub mod state;
pub mod timer;
pub mod trade_store;

use thiserror::Error;

use crate::api::BackendError;

pub use account_context::{AccountContext, SwitchPhase};
pub use retry::RetryPolicy;
pub use state::{SharedState, TradeCache};
pub use timer::TaskSlot;
pub use trade_store::TradeStore;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("You must be signed in")]
    NotAuthenticated,

    #[error("No active account selected")]
    NoActiveAccount,

    #[error("Trade not found: {0}")]
    TradeNotFound(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Whether a failed fetch should reach the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Automatic loads; failures degrade to an empty list quietly
    Silent,
    /// User-initiated refresh
    Notify,
}
