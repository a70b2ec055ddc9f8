use serde::{Deserialize, Serialize};

/// Error body returned by the hosted REST layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestErrorBody {
    pub code: Option<String>,
    pub message: String,
    pub details: Option<String>,
    pub hint: Option<String>,
}

/// Insert body: the draft plus owner and account columns
#[derive(Debug, Clone, Serialize)]
pub struct InsertTradeBody<'a, T: Serialize> {
    #[serde(flatten)]
    pub draft: &'a T,
    pub user_id: &'a str,
    pub account_id: &'a str,
}
