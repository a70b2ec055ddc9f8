use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::api::{
    client::{AccountScope, FetchTradesRequest, JournalBackend, RateLimitConfig},
    error::BackendError,
    rate_limiter::RateLimiter,
};
use crate::auth::Session;
use crate::models::{
    AccountMembership, ProfileSelection, Settings, Trade, TradeDraft, TradePatch,
    UpdateSettingsInput,
};

use super::types::{InsertTradeBody, RestErrorBody};

const REST_PREFIX: &str = "/rest/v1";
const ACCOUNT_MEMBERS_TABLE: &str = "account_members";
const PROFILES_TABLE: &str = "profiles";
const TRADES_TABLE: &str = "trades";
const SETTINGS_TABLE: &str = "user_settings";

const MEMBERSHIP_SELECT: &str = "account_id,role,account:accounts(*)";

/// Backend talking to the hosted Postgres REST layer
pub struct RestBackend {
    base_url: String,
    anon_key: String,
    http_client: reqwest::Client,
    rate_limiter: RateLimiter,
}

impl RestBackend {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>, limits: RateLimitConfig) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            http_client: reqwest::Client::new(),
            rate_limiter: RateLimiter::new(limits),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}{}/{}", self.base_url, REST_PREFIX, table)
    }

    fn build_headers(&self, session: &Session) -> Result<HeaderMap, BackendError> {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.anon_key)
                .map_err(|e| BackendError::Unauthorized(format!("Invalid API key: {}", e)))?,
        );
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", session.access_token))
                .map_err(|e| BackendError::Unauthorized(format!("Invalid access token: {}", e)))?,
        );
        Ok(headers)
    }

    fn request(
        &self,
        method: reqwest::Method,
        table: &str,
        session: &Session,
    ) -> Result<RequestBuilder, BackendError> {
        let headers = self.build_headers(session)?;
        Ok(self
            .http_client
            .request(method, self.table_url(table))
            .headers(headers))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, BackendError> {
        self.rate_limiter.acquire().await;

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                BackendError::NetworkError(e.to_string())
            } else {
                BackendError::HttpError(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(BackendError::RateLimitError(
                "Too many requests to backend".to_string(),
            ));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(BackendError::Unauthorized(format!(
                "Request rejected with status {}",
                status
            )));
        }

        let body = response.text().await?;
        Err(match serde_json::from_str::<RestErrorBody>(&body) {
            Ok(err) => BackendError::RemoteError {
                code: err.code.unwrap_or_else(|| status.as_u16().to_string()),
                message: err.message,
            },
            Err(_) => BackendError::RemoteError {
                code: status.as_u16().to_string(),
                message: body,
            },
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, BackendError> {
        let response = self.send(builder).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            BackendError::ParseError(format!("Failed to parse response: {} - Body: {}", e, text))
        })
    }
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

/// Query filter selecting the trades of one scope
fn scope_filter(scope: &AccountScope) -> (&'static str, String) {
    match scope {
        AccountScope::Account(id) => ("account_id", eq(id)),
        AccountScope::Unassigned => ("account_id", "is.null".to_string()),
    }
}

#[async_trait]
impl JournalBackend for RestBackend {
    fn backend_name(&self) -> &str {
        "rest"
    }

    async fn list_account_memberships(
        &self,
        session: &Session,
    ) -> Result<Vec<AccountMembership>, BackendError> {
        let builder = self
            .request(reqwest::Method::GET, ACCOUNT_MEMBERS_TABLE, session)?
            .query(&[("select", MEMBERSHIP_SELECT.to_string()), ("user_id", eq(&session.user_id))]);
        self.send_json(builder).await
    }

    async fn get_selected_account_id(&self, session: &Session) -> Result<Option<String>, BackendError> {
        let builder = self
            .request(reqwest::Method::GET, PROFILES_TABLE, session)?
            .query(&[("select", "selected_account_id".to_string()), ("id", eq(&session.user_id))]);
        let rows: Vec<ProfileSelection> = self.send_json(builder).await?;
        Ok(rows.into_iter().next().and_then(|p| p.selected_account_id))
    }

    async fn set_selected_account_id(&self, session: &Session, account_id: &str) -> Result<(), BackendError> {
        let body = ProfileSelection {
            selected_account_id: Some(account_id.to_string()),
        };
        let builder = self
            .request(reqwest::Method::PATCH, PROFILES_TABLE, session)?
            .query(&[("id", eq(&session.user_id))])
            .json(&body);
        self.send(builder).await?;
        Ok(())
    }

    async fn fetch_trades(
        &self,
        session: &Session,
        request: FetchTradesRequest,
    ) -> Result<Vec<Trade>, BackendError> {
        let (scope_key, scope_value) = scope_filter(&request.scope);
        let builder = self
            .request(reqwest::Method::GET, TRADES_TABLE, session)?
            .query(&[
                ("select", "*".to_string()),
                ("user_id", eq(&session.user_id)),
                (scope_key, scope_value),
                ("order", "date.desc".to_string()),
                ("limit", request.limit.to_string()),
            ]);
        self.send_json(builder).await
    }

    async fn insert_trade(
        &self,
        session: &Session,
        account_id: &str,
        draft: TradeDraft,
    ) -> Result<Trade, BackendError> {
        let body = InsertTradeBody {
            draft: &draft,
            user_id: &session.user_id,
            account_id,
        };
        let builder = self
            .request(reqwest::Method::POST, TRADES_TABLE, session)?
            .header("Prefer", "return=representation")
            .json(&body);
        let rows: Vec<Trade> = self.send_json(builder).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::ParseError("Insert returned no rows".to_string()))
    }

    async fn update_trade(
        &self,
        session: &Session,
        trade_id: &str,
        patch: &TradePatch,
    ) -> Result<(), BackendError> {
        let builder = self
            .request(reqwest::Method::PATCH, TRADES_TABLE, session)?
            .query(&[("id", eq(trade_id)), ("user_id", eq(&session.user_id))])
            .json(patch);
        self.send(builder).await?;
        Ok(())
    }

    async fn delete_trade(&self, session: &Session, trade_id: &str) -> Result<(), BackendError> {
        let builder = self
            .request(reqwest::Method::DELETE, TRADES_TABLE, session)?
            .query(&[("id", eq(trade_id)), ("user_id", eq(&session.user_id))]);
        self.send(builder).await?;
        Ok(())
    }

    async fn get_settings(&self, session: &Session) -> Result<Settings, BackendError> {
        let builder = self
            .request(reqwest::Method::GET, SETTINGS_TABLE, session)?
            .query(&[("select", "*".to_string()), ("user_id", eq(&session.user_id))]);
        let rows: Vec<Settings> = self.send_json(builder).await?;
        Ok(rows.into_iter().next().unwrap_or_else(|| {
            Settings::defaults_for(&session.user_id, chrono::Utc::now().timestamp())
        }))
    }

    async fn update_settings(
        &self,
        session: &Session,
        input: UpdateSettingsInput,
    ) -> Result<Settings, BackendError> {
        let builder = self
            .request(reqwest::Method::PATCH, SETTINGS_TABLE, session)?
            .query(&[("user_id", eq(&session.user_id))])
            .header("Prefer", "return=representation")
            .json(&input);
        let rows: Vec<Settings> = self.send_json(builder).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound("settings row".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> RestBackend {
        RestBackend::new(
            "https://project.example.co/",
            "anon-key",
            RateLimitConfig {
                requests_per_second: 10,
                burst_size: 10,
            },
        )
    }

    #[test]
    fn test_table_url_strips_trailing_slash() {
        assert_eq!(
            backend().table_url(TRADES_TABLE),
            "https://project.example.co/rest/v1/trades"
        );
    }

    #[test]
    fn test_build_headers() {
        let session = Session::new("user-1", "jwt-token");
        let headers = backend().build_headers(&session).unwrap();

        assert_eq!(headers["apikey"], "anon-key");
        assert_eq!(headers["Authorization"], "Bearer jwt-token");
    }

    #[test]
    fn test_build_headers_rejects_invalid_token() {
        let session = Session::new("user-1", "bad\ntoken");
        let result = backend().build_headers(&session);

        assert!(matches!(result, Err(BackendError::Unauthorized(_))));
    }

    #[test]
    fn test_scope_filter() {
        assert_eq!(
            scope_filter(&AccountScope::Account("acc-1".to_string())),
            ("account_id", "eq.acc-1".to_string())
        );
        assert_eq!(
            scope_filter(&AccountScope::Unassigned),
            ("account_id", "is.null".to_string())
        );
    }

    #[test]
    fn test_insert_body_flattens_draft() {
        let draft = TradeDraft::new(
            "NAS100",
            crate::models::TradeDirection::Long,
            chrono::NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
        );
        let body = InsertTradeBody {
            draft: &draft,
            user_id: "user-1",
            account_id: "acc-1",
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["symbol"], "NAS100");
        assert_eq!(value["user_id"], "user-1");
        assert_eq!(value["account_id"], "acc-1");
    }
}
