use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::api::{
    AccountScope, BackendError, ChangeFeed, ChangeKind, FetchTradesRequest, JournalBackend,
    TradeChange,
};
use crate::auth::Session;
use crate::db::Database;
use crate::models::{
    Account, AccountMembership, AccountRecord, AccountRole, AccountStatus, AccountType, Settings,
    Trade, TradeDraft, TradePatch, UpdateSettingsInput,
};

const TRADE_COLUMNS: &[&str] = &[
    "id",
    "user_id",
    "account_id",
    "symbol",
    "direction",
    "date",
    "entry_time",
    "holding_time",
    "lot_size",
    "entry_price",
    "stop_loss",
    "take_profit",
    "stop_loss_pips",
    "risk_reward_ratio",
    "pnl_amount",
    "pnl_percentage",
    "pre_market_plan",
    "post_market_plan",
    "emotions_before",
    "emotions_during",
    "emotions_after",
    "notes",
    "chart_before_images",
    "chart_after_images",
    "pre_market_images",
    "post_market_images",
    "chart_analysis_notes",
    "pre_market_notes",
    "post_market_notes",
    "strategy",
    "category",
    "forecast_id",
    "followed_rules_list",
    "broken_rules_list",
    "is_paper_trade",
    "no_trade_taken",
    "status",
    "news_events",
    "created_at",
    "updated_at",
];

/// Stored as JSON text
const JSON_COLUMNS: &[&str] = &[
    "chart_before_images",
    "chart_after_images",
    "pre_market_images",
    "post_market_images",
    "followed_rules_list",
    "broken_rules_list",
    "news_events",
];

/// Stored as 0/1
const BOOL_COLUMNS: &[&str] = &[
    "is_paper_trade",
    "no_trade_taken",
    "reduced_motion",
    "show_paper_trades",
    "compact_calendar",
];

const CHANGE_BUFFER: usize = 64;

/// Input for creating an account locally
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub account_type: AccountType,
    pub broker_name: Option<String>,
    pub currency: String,
    pub starting_balance: f64,
}

/// Local SQLite implementation of the journal backend.
///
/// Mirrors the hosted store's row-level rules: every trade query is scoped
/// to the session user, and writes to an account require membership.
pub struct SqliteBackend {
    db: Arc<Database>,
    feeds: Mutex<HashMap<String, broadcast::Sender<TradeChange>>>,
}

impl SqliteBackend {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            feeds: Mutex::new(HashMap::new()),
        }
    }

    pub fn open(db_path: &str) -> Result<Self, BackendError> {
        Ok(Self::new(Arc::new(Database::new(db_path)?)))
    }

    pub fn in_memory() -> Result<Self, BackendError> {
        Ok(Self::new(Arc::new(Database::open_in_memory()?)))
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        let conn = self.db.lock();
        f(&conn)
    }

    /// Create an account owned by `owner_user_id`
    pub fn create_account(
        &self,
        owner_user_id: &str,
        input: NewAccount,
    ) -> Result<Account, BackendError> {
        let record = AccountRecord {
            id: uuid::Uuid::new_v4().to_string(),
            name: input.name,
            account_type: input.account_type,
            broker_name: input.broker_name,
            currency: input.currency,
            starting_balance: input.starting_balance,
            status: AccountStatus::Active,
            created_at: Utc::now(),
        };

        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO accounts (id, name, type, broker_name, currency, starting_balance, status, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.id,
                    record.name,
                    to_text(&record.account_type)?,
                    record.broker_name,
                    record.currency,
                    record.starting_balance,
                    to_text(&record.status)?,
                    record.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                ],
            )?;
            insert_member(&tx, &record.id, owner_user_id, AccountRole::Owner)?;
            tx.commit()?;
            Ok(())
        })?;

        Ok(Account::from(AccountMembership {
            account_id: record.id.clone(),
            role: AccountRole::Owner,
            account: record,
        }))
    }

    pub fn add_member(
        &self,
        account_id: &str,
        user_id: &str,
        role: AccountRole,
    ) -> Result<(), BackendError> {
        self.with_conn(|conn| insert_member(conn, account_id, user_id, role))
    }

    pub fn set_account_status(
        &self,
        account_id: &str,
        status: AccountStatus,
    ) -> Result<(), BackendError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE accounts SET status = ? WHERE id = ?",
                params![to_text(&status)?, account_id],
            )?;
            if changed == 0 {
                return Err(BackendError::NotFound(format!("account {}", account_id)));
            }
            Ok(())
        })
    }

    fn publish(&self, change: TradeChange) {
        let feeds = self.feeds.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(tx) = feeds.get(&change.user_id) {
            // No receivers is fine
            let _ = tx.send(change);
        }
    }
}

fn insert_member(
    conn: &Connection,
    account_id: &str,
    user_id: &str,
    role: AccountRole,
) -> Result<(), BackendError> {
    conn.execute(
        "INSERT INTO account_members (account_id, user_id, role, created_at) VALUES (?, ?, ?, ?)
         ON CONFLICT(account_id, user_id) DO UPDATE SET role = excluded.role",
        params![
            account_id,
            user_id,
            to_text(&role)?,
            Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
        ],
    )?;
    Ok(())
}

fn is_member(conn: &Connection, account_id: &str, user_id: &str) -> Result<bool, BackendError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM account_members WHERE account_id = ? AND user_id = ?",
        params![account_id, user_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Serialize a unit enum or timestamp to the text stored in its column
fn to_text<T: Serialize>(value: &T) -> Result<String, BackendError> {
    match serde_json::to_value(value)? {
        Value::String(s) => Ok(s),
        other => Err(BackendError::ParseError(format!(
            "Expected text value, got {}",
            other
        ))),
    }
}

fn from_text<T: DeserializeOwned>(raw: String) -> Result<T, BackendError> {
    Ok(serde_json::from_value(Value::String(raw))?)
}

fn check_column(column: &str) -> Result<(), BackendError> {
    if TRADE_COLUMNS.contains(&column) {
        Ok(())
    } else {
        Err(BackendError::ParseError(format!("Unknown trade column: {}", column)))
    }
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

fn row_to_json(row: &Row, columns: &[String]) -> Result<Map<String, Value>, BackendError> {
    let mut map = Map::with_capacity(columns.len());
    for (i, name) in columns.iter().enumerate() {
        let value = match row.get_ref(i)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(n) if BOOL_COLUMNS.contains(&name.as_str()) => Value::Bool(n != 0),
            ValueRef::Integer(n) => Value::from(n),
            ValueRef::Real(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ValueRef::Text(bytes) => {
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| BackendError::ParseError(format!("{}: {}", name, e)))?;
                if JSON_COLUMNS.contains(&name.as_str()) {
                    serde_json::from_str(text)?
                } else {
                    Value::String(text.to_string())
                }
            }
            ValueRef::Blob(_) => {
                return Err(BackendError::ParseError(format!(
                    "Unexpected blob in column {}",
                    name
                )));
            }
        };
        map.insert(name.clone(), value);
    }
    Ok(map)
}

fn query_rows<T: DeserializeOwned>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<T>, BackendError> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params)?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let map = row_to_json(row, &columns)?;
        out.push(serde_json::from_value(Value::Object(map))?);
    }
    Ok(out)
}

fn map_membership(row: &Row) -> Result<AccountMembership, BackendError> {
    Ok(AccountMembership {
        account_id: row.get(0)?,
        role: from_text(row.get(1)?)?,
        account: AccountRecord {
            id: row.get(2)?,
            name: row.get(3)?,
            account_type: from_text(row.get(4)?)?,
            broker_name: row.get(5)?,
            currency: row.get(6)?,
            starting_balance: row.get(7)?,
            status: from_text(row.get(8)?)?,
            created_at: from_text::<DateTime<Utc>>(row.get(9)?)?,
        },
    })
}

fn trade_account_id(
    conn: &Connection,
    trade_id: &str,
    user_id: &str,
) -> Result<Option<String>, BackendError> {
    conn.query_row(
        "SELECT account_id FROM trades WHERE id = ? AND user_id = ?",
        params![trade_id, user_id],
        |row| row.get::<_, Option<String>>(0),
    )
    .optional()?
    .ok_or_else(|| BackendError::NotFound(format!("trade {}", trade_id)))
}

fn load_settings(conn: &Connection, user_id: &str) -> Result<Option<Settings>, BackendError> {
    let rows: Vec<Settings> = query_rows(
        conn,
        "SELECT user_id, currency, account_balance, daily_goal, weekly_goal, monthly_goal, yearly_goal,
                reduced_motion, show_paper_trades, compact_calendar, created_at, updated_at
         FROM user_settings WHERE user_id = ?",
        &[&user_id],
    )?;
    Ok(rows.into_iter().next())
}

#[async_trait]
impl JournalBackend for SqliteBackend {
    fn backend_name(&self) -> &str {
        "sqlite"
    }

    async fn list_account_memberships(
        &self,
        session: &Session,
    ) -> Result<Vec<AccountMembership>, BackendError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.account_id, m.role, a.id, a.name, a.type, a.broker_name, a.currency,
                        a.starting_balance, a.status, a.created_at
                 FROM account_members m
                 JOIN accounts a ON a.id = m.account_id
                 WHERE m.user_id = ?
                 ORDER BY a.created_at ASC, a.rowid ASC",
            )?;
            let mut rows = stmt.query([&session.user_id])?;
            let mut memberships = Vec::new();
            while let Some(row) = rows.next()? {
                memberships.push(map_membership(row)?);
            }
            Ok(memberships)
        })
    }

    async fn get_selected_account_id(&self, session: &Session) -> Result<Option<String>, BackendError> {
        self.with_conn(|conn| {
            let selected = conn
                .query_row(
                    "SELECT selected_account_id FROM profiles WHERE id = ?",
                    [&session.user_id],
                    |row| row.get::<_, Option<String>>(0),
                )
                .optional()?;
            Ok(selected.flatten())
        })
    }

    async fn set_selected_account_id(&self, session: &Session, account_id: &str) -> Result<(), BackendError> {
        self.with_conn(|conn| {
            if !is_member(conn, account_id, &session.user_id)? {
                return Err(BackendError::Unauthorized(format!(
                    "user is not a member of account {}",
                    account_id
                )));
            }
            conn.execute(
                "INSERT INTO profiles (id, selected_account_id, updated_at) VALUES (?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    selected_account_id = excluded.selected_account_id,
                    updated_at = excluded.updated_at",
                params![session.user_id, account_id, Utc::now().timestamp()],
            )?;
            Ok(())
        })
    }

    async fn fetch_trades(
        &self,
        session: &Session,
        request: FetchTradesRequest,
    ) -> Result<Vec<Trade>, BackendError> {
        self.with_conn(|conn| match &request.scope {
            AccountScope::Account(account_id) => query_rows(
                conn,
                "SELECT * FROM trades WHERE user_id = ? AND account_id = ?
                 ORDER BY date DESC, rowid DESC LIMIT ?",
                &[&session.user_id, account_id, &request.limit],
            ),
            AccountScope::Unassigned => query_rows(
                conn,
                "SELECT * FROM trades WHERE user_id = ? AND account_id IS NULL
                 ORDER BY date DESC, rowid DESC LIMIT ?",
                &[&session.user_id, &request.limit],
            ),
        })
    }

    async fn insert_trade(
        &self,
        session: &Session,
        account_id: &str,
        draft: TradeDraft,
    ) -> Result<Trade, BackendError> {
        let trade = draft.into_trade(
            uuid::Uuid::new_v4().to_string(),
            session.user_id.clone(),
            Some(account_id.to_string()),
            Utc::now(),
        );
        let Value::Object(fields) = serde_json::to_value(&trade)? else {
            return Err(BackendError::ParseError("Trade did not serialize to an object".to_string()));
        };

        self.with_conn(|conn| {
            if !is_member(conn, account_id, &session.user_id)? {
                return Err(BackendError::Unauthorized(format!(
                    "user is not a member of account {}",
                    account_id
                )));
            }

            let mut columns = Vec::with_capacity(fields.len());
            let mut values = Vec::with_capacity(fields.len());
            for (column, value) in &fields {
                check_column(column)?;
                columns.push(column.as_str());
                values.push(json_to_sql(value));
            }

            // Column names come from the Trade type and are checked against TRADE_COLUMNS
            let placeholders = vec!["?"; columns.len()].join(", ");
            let sql = format!(
                "INSERT INTO trades ({}) VALUES ({})",
                columns.join(", "),
                placeholders
            );
            conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
            Ok(())
        })?;

        self.publish(TradeChange {
            kind: ChangeKind::Insert,
            user_id: session.user_id.clone(),
            trade_id: trade.id.clone(),
            account_id: trade.account_id.clone(),
        });

        Ok(trade)
    }

    async fn update_trade(
        &self,
        session: &Session,
        trade_id: &str,
        patch: &TradePatch,
    ) -> Result<(), BackendError> {
        let Value::Object(fields) = serde_json::to_value(patch)? else {
            return Err(BackendError::ParseError("Patch did not serialize to an object".to_string()));
        };
        let now = serde_json::to_value(Utc::now())?;

        let account_id = self.with_conn(|conn| {
            let account_id = trade_account_id(conn, trade_id, &session.user_id)?;

            let mut updates = vec!["updated_at = ?".to_string()];
            let mut values = vec![json_to_sql(&now)];
            for (column, value) in &fields {
                check_column(column)?;
                updates.push(format!("{} = ?", column));
                values.push(json_to_sql(value));
            }
            values.push(SqlValue::Text(trade_id.to_string()));
            values.push(SqlValue::Text(session.user_id.clone()));

            let sql = format!(
                "UPDATE trades SET {} WHERE id = ? AND user_id = ?",
                updates.join(", ")
            );
            conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
            Ok(account_id)
        })?;

        self.publish(TradeChange {
            kind: ChangeKind::Update,
            user_id: session.user_id.clone(),
            trade_id: trade_id.to_string(),
            account_id,
        });

        Ok(())
    }

    async fn delete_trade(&self, session: &Session, trade_id: &str) -> Result<(), BackendError> {
        let account_id = self.with_conn(|conn| {
            let account_id = trade_account_id(conn, trade_id, &session.user_id)?;
            conn.execute(
                "DELETE FROM trades WHERE id = ? AND user_id = ?",
                params![trade_id, session.user_id],
            )?;
            Ok(account_id)
        })?;

        self.publish(TradeChange {
            kind: ChangeKind::Delete,
            user_id: session.user_id.clone(),
            trade_id: trade_id.to_string(),
            account_id,
        });

        Ok(())
    }

    async fn get_settings(&self, session: &Session) -> Result<Settings, BackendError> {
        self.with_conn(|conn| {
            if let Some(settings) = load_settings(conn, &session.user_id)? {
                return Ok(settings);
            }

            let defaults = Settings::defaults_for(&session.user_id, Utc::now().timestamp());
            conn.execute(
                "INSERT INTO user_settings (user_id, currency, account_balance, reduced_motion,
                    show_paper_trades, compact_calendar, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    defaults.user_id,
                    defaults.currency,
                    defaults.account_balance,
                    defaults.reduced_motion,
                    defaults.show_paper_trades,
                    defaults.compact_calendar,
                    defaults.created_at,
                    defaults.updated_at
                ],
            )?;
            Ok(defaults)
        })
    }

    async fn update_settings(
        &self,
        session: &Session,
        input: UpdateSettingsInput,
    ) -> Result<Settings, BackendError> {
        // Make sure the row exists before patching it
        self.get_settings(session).await?;

        self.with_conn(|conn| {
            let mut updates = Vec::new();
            let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(val) = input.currency {
                updates.push("currency = ?");
                values.push(Box::new(val));
            }
            if let Some(val) = input.account_balance {
                updates.push("account_balance = ?");
                values.push(Box::new(val));
            }
            if let Some(val) = input.daily_goal {
                updates.push("daily_goal = ?");
                values.push(Box::new(val));
            }
            if let Some(val) = input.weekly_goal {
                updates.push("weekly_goal = ?");
                values.push(Box::new(val));
            }
            if let Some(val) = input.monthly_goal {
                updates.push("monthly_goal = ?");
                values.push(Box::new(val));
            }
            if let Some(val) = input.yearly_goal {
                updates.push("yearly_goal = ?");
                values.push(Box::new(val));
            }
            if let Some(val) = input.reduced_motion {
                updates.push("reduced_motion = ?");
                values.push(Box::new(val));
            }
            if let Some(val) = input.show_paper_trades {
                updates.push("show_paper_trades = ?");
                values.push(Box::new(val));
            }
            if let Some(val) = input.compact_calendar {
                updates.push("compact_calendar = ?");
                values.push(Box::new(val));
            }

            updates.push("updated_at = strftime('%s', 'now')");
            values.push(Box::new(session.user_id.clone()));

            let query = format!("UPDATE user_settings SET {} WHERE user_id = ?", updates.join(", "));
            let params: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
            conn.execute(&query, params.as_slice())?;

            load_settings(conn, &session.user_id)?
                .ok_or_else(|| BackendError::NotFound("settings row".to_string()))
        })
    }
}

impl ChangeFeed for SqliteBackend {
    fn subscribe(&self, user_id: &str) -> broadcast::Receiver<TradeChange> {
        let mut feeds = self.feeds.lock().unwrap_or_else(|p| p.into_inner());
        feeds
            .entry(user_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANGE_BUFFER).0)
            .subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TradeDirection;
    use chrono::NaiveDate;

    fn session(user: &str) -> Session {
        Session::new(user, format!("token-{}", user))
    }

    fn new_account(name: &str, balance: f64) -> NewAccount {
        NewAccount {
            name: name.to_string(),
            account_type: AccountType::Personal,
            broker_name: None,
            currency: "USD".to_string(),
            starting_balance: balance,
        }
    }

    fn draft(symbol: &str, day: u32, pnl: f64) -> TradeDraft {
        let mut draft = TradeDraft::new(
            symbol,
            TradeDirection::Long,
            NaiveDate::from_ymd_opt(2024, 4, day).unwrap(),
        );
        draft.pnl_amount = pnl;
        draft.followed_rules_list = vec!["A+ setup only".to_string()];
        draft
    }

    fn scope(account: &Account) -> FetchTradesRequest {
        FetchTradesRequest {
            scope: AccountScope::Account(account.id.clone()),
            limit: 500,
        }
    }

    #[tokio::test]
    async fn test_memberships_and_selection() {
        let backend = SqliteBackend::in_memory().unwrap();
        let alice = session("alice");
        let first = backend.create_account("alice", new_account("Main", 10_000.0)).unwrap();
        let shared = backend.create_account("bob", new_account("Team", 50_000.0)).unwrap();
        backend.add_member(&shared.id, "alice", AccountRole::Member).unwrap();

        let memberships = backend.list_account_memberships(&alice).await.unwrap();
        assert_eq!(memberships.len(), 2);
        assert_eq!(memberships[0].account_id, first.id);
        assert_eq!(memberships[0].role, AccountRole::Owner);
        assert_eq!(memberships[1].role, AccountRole::Member);

        assert_eq!(backend.get_selected_account_id(&alice).await.unwrap(), None);
        backend.set_selected_account_id(&alice, &shared.id).await.unwrap();
        assert_eq!(
            backend.get_selected_account_id(&alice).await.unwrap(),
            Some(shared.id.clone())
        );
    }

    #[tokio::test]
    async fn test_archived_status_round_trips() {
        let backend = SqliteBackend::in_memory().unwrap();
        let account = backend.create_account("alice", new_account("Old", 2_000.0)).unwrap();

        backend.set_account_status(&account.id, AccountStatus::Archived).unwrap();

        let memberships = backend.list_account_memberships(&session("alice")).await.unwrap();
        assert_eq!(memberships[0].account.status, AccountStatus::Archived);
        assert!(matches!(
            backend.set_account_status("missing", AccountStatus::Active),
            Err(BackendError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_selection_requires_membership() {
        let backend = SqliteBackend::in_memory().unwrap();
        let bobs = backend.create_account("bob", new_account("Bob", 1.0)).unwrap();

        let result = backend.set_selected_account_id(&session("alice"), &bobs.id).await;
        assert!(matches!(result, Err(BackendError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_insert_and_fetch_scoped_by_account() {
        let backend = SqliteBackend::in_memory().unwrap();
        let alice = session("alice");
        let a = backend.create_account("alice", new_account("A", 10_000.0)).unwrap();
        let b = backend.create_account("alice", new_account("B", 5_000.0)).unwrap();

        backend.insert_trade(&alice, &a.id, draft("EURUSD", 1, 500.0)).await.unwrap();
        backend.insert_trade(&alice, &a.id, draft("GBPUSD", 3, -200.0)).await.unwrap();
        backend.insert_trade(&alice, &b.id, draft("XAUUSD", 2, 80.0)).await.unwrap();

        let trades = backend.fetch_trades(&alice, scope(&a)).await.unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].symbol, "GBPUSD", "newest date first");
        assert_eq!(trades[1].followed_rules_list, vec!["A+ setup only".to_string()]);
        assert!(!trades[0].is_paper_trade);

        let unassigned = backend
            .fetch_trades(
                &alice,
                FetchTradesRequest {
                    scope: AccountScope::Unassigned,
                    limit: 500,
                },
            )
            .await
            .unwrap();
        assert!(unassigned.is_empty());

        let limited = backend
            .fetch_trades(
                &alice,
                FetchTradesRequest {
                    scope: AccountScope::Account(a.id.clone()),
                    limit: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_requires_membership() {
        let backend = SqliteBackend::in_memory().unwrap();
        let bobs = backend.create_account("bob", new_account("Bob", 1.0)).unwrap();

        let result = backend
            .insert_trade(&session("alice"), &bobs.id, draft("EURUSD", 1, 1.0))
            .await;
        assert!(matches!(result, Err(BackendError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_sparse_update_leaves_other_columns() {
        let backend = SqliteBackend::in_memory().unwrap();
        let alice = session("alice");
        let a = backend.create_account("alice", new_account("A", 10_000.0)).unwrap();
        let mut d = draft("EURUSD", 1, 500.0);
        d.notes = "Clean entry".to_string();
        d.stop_loss = Some(1.08);
        let trade = backend.insert_trade(&alice, &a.id, d).await.unwrap();

        let patch = TradePatch {
            pnl_amount: Some(750.0),
            stop_loss: Some(None),
            is_paper_trade: Some(true),
            ..Default::default()
        };
        backend.update_trade(&alice, &trade.id, &patch).await.unwrap();

        let stored = backend.fetch_trades(&alice, scope(&a)).await.unwrap().remove(0);
        assert_eq!(stored.pnl_amount, 750.0);
        assert_eq!(stored.stop_loss, None);
        assert!(stored.is_paper_trade);
        assert_eq!(stored.notes, "Clean entry");
        assert_eq!(stored.symbol, "EURUSD");
        assert!(stored.updated_at >= trade.updated_at);
    }

    #[tokio::test]
    async fn test_update_and_delete_scoped_to_user() {
        let backend = SqliteBackend::in_memory().unwrap();
        let alice = session("alice");
        let a = backend.create_account("alice", new_account("A", 10_000.0)).unwrap();
        let trade = backend.insert_trade(&alice, &a.id, draft("EURUSD", 1, 5.0)).await.unwrap();

        let mallory = session("mallory");
        let patch = TradePatch {
            symbol: Some("HACKED".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            backend.update_trade(&mallory, &trade.id, &patch).await,
            Err(BackendError::NotFound(_))
        ));
        assert!(matches!(
            backend.delete_trade(&mallory, &trade.id).await,
            Err(BackendError::NotFound(_))
        ));

        backend.delete_trade(&alice, &trade.id).await.unwrap();
        assert!(backend.fetch_trades(&alice, scope(&a)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_change_feed_is_per_user() {
        let backend = SqliteBackend::in_memory().unwrap();
        let alice = session("alice");
        let a = backend.create_account("alice", new_account("A", 10_000.0)).unwrap();
        let mut alice_rx = backend.subscribe("alice");
        let mut bob_rx = backend.subscribe("bob");

        let trade = backend.insert_trade(&alice, &a.id, draft("EURUSD", 1, 5.0)).await.unwrap();
        backend.delete_trade(&alice, &trade.id).await.unwrap();

        let inserted = alice_rx.recv().await.unwrap();
        assert_eq!(inserted.kind, ChangeKind::Insert);
        assert_eq!(inserted.account_id.as_deref(), Some(a.id.as_str()));
        assert_eq!(alice_rx.recv().await.unwrap().kind, ChangeKind::Delete);
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_settings_defaults_and_update() {
        let backend = SqliteBackend::in_memory().unwrap();
        let alice = session("alice");

        let settings = backend.get_settings(&alice).await.unwrap();
        assert_eq!(settings.currency, "USD");
        assert!(settings.show_paper_trades);
        assert_eq!(settings.monthly_goal, None);

        let updated = backend
            .update_settings(
                &alice,
                UpdateSettingsInput {
                    monthly_goal: Some(2_000.0),
                    reduced_motion: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.monthly_goal, Some(2_000.0));
        assert!(updated.reduced_motion);
        assert_eq!(updated.currency, "USD");
    }

    #[test]
    fn test_file_backed_backend_persists_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.db");
        let path = path.to_str().unwrap();

        let account = {
            let backend = SqliteBackend::open(path).unwrap();
            backend.create_account("alice", new_account("Main", 1_000.0)).unwrap()
        };

        let reopened = SqliteBackend::open(path).unwrap();
        let count: i64 = reopened
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM accounts WHERE id = ?",
                    [&account.id],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }
}
