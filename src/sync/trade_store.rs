use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::analytics;
use crate::api::{AccountScope, ChangeFeed, FetchTradesRequest, JournalBackend, TradeChange};
use crate::auth::SessionProvider;
use crate::config::SyncTiming;
use crate::models::{Trade, TradeDraft, TradePatch};
use crate::notify::{Notification, Notifier};

use super::account_context::AccountContext;
use super::retry::RetryPolicy;
use super::state::SharedState;
use super::{FetchMode, JournalError};

/// A remote change only triggers a refetch when an account is active and
/// no account switch is under way.
pub fn should_refetch_on_change(has_active_account: bool, is_switching: bool) -> bool {
    has_active_account && !is_switching
}

/// Cached trades of the active account, with optimistic writes and
/// bounded retry against the backend.
pub struct TradeStore {
    backend: Arc<dyn JournalBackend>,
    sessions: Arc<SessionProvider>,
    accounts: Arc<AccountContext>,
    shared: Arc<SharedState>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
    fetch_limit: u32,
}

impl TradeStore {
    pub fn new(
        backend: Arc<dyn JournalBackend>,
        sessions: Arc<SessionProvider>,
        accounts: Arc<AccountContext>,
        shared: Arc<SharedState>,
        notifier: Arc<dyn Notifier>,
        timing: &SyncTiming,
    ) -> Self {
        Self {
            backend,
            sessions,
            accounts,
            shared,
            notifier,
            retry: RetryPolicy::from(timing),
            fetch_limit: timing.fetch_limit,
        }
    }

    fn effective_scope(&self) -> AccountScope {
        AccountScope::from_account_id(self.accounts.active_account_id().as_deref())
    }

    fn report(&self, title: &str, error: &JournalError) {
        log::error!("{}: {}", title, error);
        self.notifier
            .notify(Notification::error(title, error.to_string()));
    }

    /// Previous snapshot while switching accounts, live trades otherwise.
    pub fn display_trades(&self) -> Vec<Trade> {
        self.shared.display_trades(self.accounts.is_switching())
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.display_trades()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.is_loading()
    }

    pub fn get_trade(&self, trade_id: &str) -> Option<Trade> {
        self.shared.find_trade(trade_id)
    }

    pub fn trades_by_date(&self, date: NaiveDate) -> Vec<Trade> {
        self.shared
            .trades()
            .into_iter()
            .filter(|t| t.date == date)
            .collect()
    }

    pub fn real_trades(&self) -> Vec<Trade> {
        self.shared.trades().into_iter().filter(|t| t.is_real()).collect()
    }

    pub fn daily_pnl(&self, date: NaiveDate) -> f64 {
        analytics::daily_pnl(&self.shared.trades(), date)
    }

    pub fn weekly_pnl(&self, start: NaiveDate) -> f64 {
        analytics::weekly_pnl(&self.shared.trades(), start)
    }

    pub fn monthly_pnl(&self, year: i32, month: u32) -> f64 {
        analytics::monthly_pnl(&self.shared.trades(), year, month)
    }

    pub fn yearly_pnl(&self, year: i32) -> f64 {
        analytics::yearly_pnl(&self.shared.trades(), year)
    }

    pub fn total_pnl(&self) -> f64 {
        analytics::total_pnl(&self.shared.trades())
    }

    /// Load the most recent trades of the active account (or the unassigned
    /// ones). After the retries are spent the list is emptied; only
    /// [`FetchMode::Notify`] tells the user.
    pub async fn fetch_trades(&self, mode: FetchMode) {
        let Some(session) = self.sessions.current() else {
            return;
        };
        let scope = self.effective_scope();
        let Some(epoch) = self.shared.begin_fetch(&scope, mode) else {
            log::debug!("Fetch for {:?} already in flight ({:?})", scope, mode);
            return;
        };

        let request = FetchTradesRequest {
            scope: scope.clone(),
            limit: self.fetch_limit,
        };
        let result = self
            .retry
            .run("Fetch trades", || {
                self.backend.fetch_trades(&session, request.clone())
            })
            .await;

        if self.effective_scope() != scope {
            log::debug!("Active account changed; discarding trades for {:?}", scope);
            self.shared.abandon_fetch(&scope, epoch);
            return;
        }

        match result {
            Ok(trades) => {
                let count = trades.len();
                if self.shared.complete_fetch(&scope, epoch, trades).is_some() {
                    log::info!("Loaded {} trades for {:?}", count, scope);
                }
            }
            // A manual refresh that joined this fetch may have upgraded the mode
            Err(e) => {
                if self.shared.complete_fetch(&scope, epoch, Vec::new()) == Some(FetchMode::Notify) {
                    self.report("Failed to load trades", &JournalError::from(e));
                }
            }
        }
    }

    pub async fn refetch(&self) {
        self.fetch_trades(FetchMode::Notify).await;
    }

    /// Fetch when nothing is loaded yet or the cache belongs to another scope.
    pub async fn sync_with_active_account(&self) {
        if self.sessions.current().is_none() {
            return;
        }
        if self.shared.needs_fetch(&self.effective_scope()) {
            self.fetch_trades(FetchMode::Silent).await;
        }
    }

    pub async fn add_trade(&self, draft: TradeDraft) -> Option<Trade> {
        match self.insert(draft).await {
            Ok(trade) => {
                self.notifier.notify(Notification::success(
                    "Trade added",
                    format!("{} saved", trade.symbol),
                ));
                Some(trade)
            }
            Err(e) => {
                self.report("Failed to add trade", &e);
                None
            }
        }
    }

    async fn insert(&self, draft: TradeDraft) -> Result<Trade, JournalError> {
        let session = self.sessions.current().ok_or(JournalError::NotAuthenticated)?;
        let account_id = self
            .accounts
            .active_account_id()
            .ok_or(JournalError::NoActiveAccount)?;

        let trade = self.backend.insert_trade(&session, &account_id, draft).await?;

        if self.effective_scope() == AccountScope::Account(account_id) {
            self.shared.prepend_trade(trade.clone());
        }
        Ok(trade)
    }

    /// Apply `patch` locally right away, then write it remotely. If every
    /// attempt fails the cache is reloaded to drop the optimistic change.
    pub async fn update_trade(&self, trade_id: &str, patch: TradePatch) -> bool {
        let Some(session) = self.sessions.current() else {
            self.report("Failed to update trade", &JournalError::NotAuthenticated);
            return false;
        };

        let now = Utc::now();
        if !self.shared.modify_trade(trade_id, |trade| patch.apply_to(trade, now)) {
            log::debug!("Trade {} is not cached; updating remotely only", trade_id);
        }

        let result = self
            .retry
            .run("Update trade", || {
                self.backend.update_trade(&session, trade_id, &patch)
            })
            .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                self.fetch_trades(FetchMode::Silent).await;
                self.report("Failed to update trade", &JournalError::from(e));
                false
            }
        }
    }

    pub async fn delete_trade(&self, trade_id: &str) -> bool {
        match self.remove(trade_id).await {
            Ok(()) => {
                self.notifier
                    .notify(Notification::success("Trade deleted", "The trade was removed"));
                true
            }
            Err(e) => {
                self.report("Failed to delete trade", &e);
                false
            }
        }
    }

    async fn remove(&self, trade_id: &str) -> Result<(), JournalError> {
        let session = self.sessions.current().ok_or(JournalError::NotAuthenticated)?;
        self.backend.delete_trade(&session, trade_id).await?;
        self.shared.remove_trade(trade_id);
        Ok(())
    }

    /// Copy a cached trade into the active account.
    pub async fn duplicate_trade(&self, trade_id: &str) -> Option<Trade> {
        let Some(source) = self.shared.find_trade(trade_id) else {
            self.report(
                "Failed to duplicate trade",
                &JournalError::TradeNotFound(trade_id.to_string()),
            );
            return None;
        };
        self.add_trade(TradeDraft::from(&source)).await
    }

    /// React to a realtime change. Returns true when a refetch ran.
    pub async fn handle_remote_change(&self, change: &TradeChange) -> bool {
        if self.sessions.current_user_id().as_deref() != Some(change.user_id.as_str()) {
            return false;
        }
        self.refetch_on_change().await
    }

    async fn refetch_on_change(&self) -> bool {
        let has_active = self.accounts.active_account_id().is_some();
        if !should_refetch_on_change(has_active, self.accounts.is_switching()) {
            return false;
        }
        self.fetch_trades(FetchMode::Silent).await;
        true
    }

    /// Re-check the fetch rule whenever the active account changes.
    pub fn spawn_account_watcher(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let mut active = self.accounts.subscribe_active();
        tokio::spawn(async move {
            loop {
                active.borrow_and_update();
                let pending = Arc::clone(&store);
                tokio::spawn(async move {
                    pending.sync_with_active_account().await;
                });
                if active.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Follow the signed-in user's change feed, resubscribing on user change.
    pub fn spawn_realtime_listener(self: &Arc<Self>, feed: Arc<dyn ChangeFeed>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let mut sessions = self.sessions.subscribe();
        tokio::spawn(async move {
            loop {
                let user_id = sessions.borrow_and_update().as_ref().map(|s| s.user_id.clone());

                if let Some(user_id) = user_id {
                    let mut changes = feed.subscribe(&user_id);
                    let session_changed = loop {
                        tokio::select! {
                            received = changes.recv() => match received {
                                Ok(change) => {
                                    store.handle_remote_change(&change).await;
                                }
                                Err(RecvError::Lagged(skipped)) => {
                                    log::warn!("Change feed lagged by {} events", skipped);
                                    store.refetch_on_change().await;
                                }
                                Err(RecvError::Closed) => break false,
                            },
                            changed = sessions.changed() => break changed.is_ok(),
                        }
                    };
                    if session_changed {
                        continue;
                    }
                }

                if sessions.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::{BackendError, ChangeKind};
    use crate::auth::Session;
    use crate::models::{
        AccountMembership, AccountRecord, AccountRole, AccountStatus, AccountType, Settings,
        UpdateSettingsInput,
    };
    use crate::notify::{MemoryNotifier, NotificationKind};
    use crate::sync::state::tests::trade;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    pub(crate) fn account(id: &str, starting_balance: f64) -> AccountMembership {
        AccountMembership {
            account_id: id.to_string(),
            role: AccountRole::Owner,
            account: AccountRecord {
                id: id.to_string(),
                name: format!("Account {}", id),
                account_type: AccountType::Personal,
                broker_name: None,
                currency: "USD".to_string(),
                starting_balance,
                status: AccountStatus::Active,
                created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            },
        }
    }

    #[derive(Default)]
    struct FakeState {
        accounts: Vec<AccountMembership>,
        selected: Option<String>,
        trades: Vec<Trade>,
        fail_accounts: bool,
        fetch_failures: u32,
        update_failures: u32,
        update_delay: Duration,
        selection_delay: Option<Duration>,
        fetch_calls: Vec<(AccountScope, Instant)>,
        update_calls: Vec<Instant>,
        next_id: u32,
    }

    /// In-memory backend with failure injection and call recording
    pub(crate) struct FakeBackend {
        state: Mutex<FakeState>,
    }

    impl FakeBackend {
        pub(crate) fn new() -> Self {
            Self {
                state: Mutex::new(FakeState::default()),
            }
        }

        fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
            self.state.lock().unwrap()
        }

        pub(crate) fn set_accounts(&self, accounts: Vec<AccountMembership>) {
            self.state().accounts = accounts;
        }

        pub(crate) fn select_account(&self, id: &str) {
            self.state().selected = Some(id.to_string());
        }

        pub(crate) fn selected_account(&self) -> Option<String> {
            self.state().selected.clone()
        }

        pub(crate) fn fail_accounts(&self, fail: bool) {
            self.state().fail_accounts = fail;
        }

        fn set_trades(&self, trades: Vec<Trade>) {
            self.state().trades = trades;
        }

        fn remote_trade(&self, id: &str) -> Option<Trade> {
            self.state().trades.iter().find(|t| t.id == id).cloned()
        }

        /// Fail the next `n` fetches; `u32::MAX` fails forever
        fn fail_fetches(&self, n: u32) {
            self.state().fetch_failures = n;
        }

        fn fail_updates(&self, n: u32) {
            self.state().update_failures = n;
        }

        fn delay_updates(&self, delay: Duration) {
            self.state().update_delay = delay;
        }

        /// Slow down only the next selection write
        pub(crate) fn delay_next_selection(&self, delay: Duration) {
            self.state().selection_delay = Some(delay);
        }

        fn fetch_calls(&self) -> Vec<(AccountScope, Instant)> {
            self.state().fetch_calls.clone()
        }

        fn update_calls(&self) -> Vec<Instant> {
            self.state().update_calls.clone()
        }
    }

    fn take_failure(remaining: &mut u32) -> bool {
        match *remaining {
            0 => false,
            u32::MAX => true,
            _ => {
                *remaining -= 1;
                true
            }
        }
    }

    #[async_trait]
    impl JournalBackend for FakeBackend {
        fn backend_name(&self) -> &str {
            "fake"
        }

        async fn list_account_memberships(
            &self,
            _session: &Session,
        ) -> Result<Vec<AccountMembership>, BackendError> {
            let state = self.state();
            if state.fail_accounts {
                return Err(BackendError::NetworkError("offline".into()));
            }
            Ok(state.accounts.clone())
        }

        async fn get_selected_account_id(
            &self,
            _session: &Session,
        ) -> Result<Option<String>, BackendError> {
            Ok(self.state().selected.clone())
        }

        async fn set_selected_account_id(
            &self,
            _session: &Session,
            account_id: &str,
        ) -> Result<(), BackendError> {
            let delay = self.state().selection_delay.take();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.state().selected = Some(account_id.to_string());
            Ok(())
        }

        async fn fetch_trades(
            &self,
            _session: &Session,
            request: FetchTradesRequest,
        ) -> Result<Vec<Trade>, BackendError> {
            let mut state = self.state();
            state.fetch_calls.push((request.scope.clone(), Instant::now()));
            if take_failure(&mut state.fetch_failures) {
                return Err(BackendError::NetworkError("connection reset".into()));
            }
            let mut trades: Vec<Trade> = state
                .trades
                .iter()
                .filter(|t| t.account_id.as_deref() == request.scope.account_id())
                .cloned()
                .collect();
            trades.sort_by(|a, b| b.date.cmp(&a.date));
            trades.truncate(request.limit as usize);
            Ok(trades)
        }

        async fn insert_trade(
            &self,
            session: &Session,
            account_id: &str,
            draft: TradeDraft,
        ) -> Result<Trade, BackendError> {
            let mut state = self.state();
            state.next_id += 1;
            let trade = draft.into_trade(
                format!("new-{}", state.next_id),
                session.user_id.clone(),
                Some(account_id.to_string()),
                Utc::now(),
            );
            state.trades.push(trade.clone());
            Ok(trade)
        }

        async fn update_trade(
            &self,
            _session: &Session,
            trade_id: &str,
            patch: &TradePatch,
        ) -> Result<(), BackendError> {
            let delay = {
                let mut state = self.state();
                state.update_calls.push(Instant::now());
                state.update_delay
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let mut state = self.state();
            if take_failure(&mut state.update_failures) {
                return Err(BackendError::NetworkError("timeout".into()));
            }
            let trade = state
                .trades
                .iter_mut()
                .find(|t| t.id == trade_id)
                .ok_or_else(|| BackendError::NotFound(trade_id.to_string()))?;
            patch.apply_to(trade, Utc::now());
            Ok(())
        }

        async fn delete_trade(&self, _session: &Session, trade_id: &str) -> Result<(), BackendError> {
            let mut state = self.state();
            let before = state.trades.len();
            state.trades.retain(|t| t.id != trade_id);
            if state.trades.len() == before {
                return Err(BackendError::NotFound(trade_id.to_string()));
            }
            Ok(())
        }

        async fn get_settings(&self, session: &Session) -> Result<Settings, BackendError> {
            Ok(Settings::defaults_for(&session.user_id, 0))
        }

        async fn update_settings(
            &self,
            session: &Session,
            _input: UpdateSettingsInput,
        ) -> Result<Settings, BackendError> {
            Ok(Settings::defaults_for(&session.user_id, 0))
        }
    }

    struct Harness {
        backend: Arc<FakeBackend>,
        sessions: Arc<SessionProvider>,
        shared: Arc<SharedState>,
        notifier: Arc<MemoryNotifier>,
        accounts: Arc<AccountContext>,
        store: Arc<TradeStore>,
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    fn harness() -> Harness {
        let _ = env_logger::builder().is_test(true).try_init();
        let backend = Arc::new(FakeBackend::new());
        backend.set_accounts(vec![account("a", 10_000.0), account("b", 25_000.0)]);
        backend.set_trades(vec![
            trade("a1", Some("a"), date(3, 10), 500.0),
            trade("a2", Some("a"), date(3, 12), -200.0),
            trade("b1", Some("b"), date(3, 11), 75.0),
        ]);
        let sessions = Arc::new(SessionProvider::new());
        sessions.sign_in(Session::new("user-1", "token"));
        let shared = Arc::new(SharedState::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let timing = SyncTiming::default();
        let accounts = Arc::new(AccountContext::new(
            backend.clone(),
            sessions.clone(),
            shared.clone(),
            notifier.clone(),
            timing.clone(),
        ));
        let store = Arc::new(TradeStore::new(
            backend.clone(),
            sessions.clone(),
            accounts.clone(),
            shared.clone(),
            notifier.clone(),
            &timing,
        ));
        Harness {
            backend,
            sessions,
            shared,
            notifier,
            accounts,
            store,
        }
    }

    /// Harness with account `a` active and its trades loaded
    async fn loaded() -> Harness {
        let h = harness();
        h.accounts.fetch_accounts().await;
        h.store.fetch_trades(FetchMode::Silent).await;
        h
    }

    fn ids(trades: &[Trade]) -> Vec<&str> {
        trades.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_refetch_guard() {
        assert!(should_refetch_on_change(true, false));
        assert!(!should_refetch_on_change(true, true));
        assert!(!should_refetch_on_change(false, false));
        assert!(!should_refetch_on_change(false, true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_loads_active_account() {
        let h = loaded().await;

        assert_eq!(ids(&h.store.trades()), vec!["a2", "a1"]);
        assert_eq!(h.shared.fetched_for(), Some(AccountScope::Account("a".into())));
        assert!(!h.store.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_without_account_targets_unassigned() {
        let h = harness();
        h.backend.set_trades(vec![trade("loose", None, date(3, 1), 1.0)]);

        h.store.fetch_trades(FetchMode::Silent).await;

        assert_eq!(ids(&h.store.trades()), vec!["loose"]);
        assert_eq!(h.shared.fetched_for(), Some(AccountScope::Unassigned));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_retry_bound() {
        let h = harness();
        h.accounts.fetch_accounts().await;
        h.backend.fail_fetches(u32::MAX);

        h.store.fetch_trades(FetchMode::Silent).await;

        let calls = h.backend.fetch_calls();
        assert_eq!(calls.len(), 4);
        let gaps: Vec<u128> = calls
            .windows(2)
            .map(|w| (w[1].1 - w[0].1).as_millis())
            .collect();
        assert_eq!(gaps.len(), 3);
        for (gap, expected) in gaps.iter().zip([100u128, 200, 400]) {
            assert!(*gap >= expected && *gap < expected + 5, "gap {} vs {}", gap, expected);
        }
        assert!(h.store.trades().is_empty());
        assert!(h.shared.is_loaded());
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_refetch_failure_notifies_once() {
        let h = loaded().await;
        h.backend.fail_fetches(u32::MAX);

        h.store.refetch().await;

        assert!(h.store.trades().is_empty());
        assert_eq!(h.notifier.errors().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_refetch_joining_silent_fetch_notifies() {
        let h = loaded().await;
        let calls_before = h.backend.fetch_calls().len();
        h.backend.fail_fetches(u32::MAX);

        let store = h.store.clone();
        let background = tokio::spawn(async move { store.fetch_trades(FetchMode::Silent).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.store.refetch().await;
        background.await.unwrap();

        assert_eq!(h.backend.fetch_calls().len() - calls_before, 4);
        assert!(h.store.trades().is_empty());
        assert_eq!(h.notifier.errors().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_recovers_within_retries() {
        let h = harness();
        h.accounts.fetch_accounts().await;
        h.backend.fail_fetches(2);

        h.store.fetch_trades(FetchMode::Notify).await;

        assert_eq!(h.backend.fetch_calls().len(), 3);
        assert_eq!(h.store.trades().len(), 2);
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_trade_prepends() {
        let h = loaded().await;

        let created = h
            .store
            .add_trade(TradeDraft::new("GBPUSD", crate::models::TradeDirection::Short, date(3, 1)))
            .await
            .unwrap();

        assert_eq!(created.account_id.as_deref(), Some("a"));
        assert_eq!(h.store.trades()[0].id, created.id);
        assert_eq!(h.store.trades().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_trade_requires_account_and_session() {
        let h = harness();
        let draft = TradeDraft::new("XAUUSD", crate::models::TradeDirection::Long, date(3, 1));

        assert!(h.store.add_trade(draft.clone()).await.is_none());
        assert_eq!(h.notifier.errors()[0].body, JournalError::NoActiveAccount.to_string());

        h.accounts.fetch_accounts().await;
        h.sessions.sign_out();
        assert!(h.store.add_trade(draft).await.is_none());
        assert_eq!(h.notifier.errors()[1].body, JournalError::NotAuthenticated.to_string());
    }

    #[tokio::test(start_paused = true)]
    async fn test_optimistic_update_visible_immediately() {
        let h = loaded().await;
        h.backend.delay_updates(Duration::from_millis(100));
        let patch = TradePatch {
            pnl_amount: Some(750.0),
            ..TradePatch::default()
        };

        let update = h.store.update_trade("a1", patch);
        tokio::pin!(update);
        assert!(futures::poll!(update.as_mut()).is_pending());

        assert_eq!(h.store.get_trade("a1").unwrap().pnl_amount, 750.0);
        assert_eq!(h.backend.remote_trade("a1").unwrap().pnl_amount, 500.0);

        assert!(update.await);
        assert_eq!(h.backend.remote_trade("a1").unwrap().pnl_amount, 750.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_update_rolls_back_via_refetch() {
        let h = loaded().await;
        h.backend.fail_updates(u32::MAX);
        let patch = TradePatch {
            symbol: Some("X".to_string()),
            ..TradePatch::default()
        };

        assert!(!h.store.update_trade("a1", patch).await);

        assert_eq!(h.backend.update_calls().len(), 4);
        assert_eq!(h.store.get_trade("a1").unwrap().symbol, "EURUSD");
        assert_eq!(
            h.store.trades(),
            vec![h.backend.remote_trade("a2").unwrap(), h.backend.remote_trade("a1").unwrap()]
        );
        let errors = h.notifier.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, NotificationKind::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_sends_only_patched_fields() {
        let h = loaded().await;
        let patch = TradePatch {
            notes: Some("moved stop to entry".to_string()),
            ..TradePatch::default()
        };

        assert!(h.store.update_trade("a2", patch).await);

        let remote = h.backend.remote_trade("a2").unwrap();
        assert_eq!(remote.notes, "moved stop to entry");
        assert_eq!(remote.pnl_amount, -200.0);
        assert_eq!(remote.symbol, "EURUSD");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_trade() {
        let h = loaded().await;

        assert!(h.store.delete_trade("a1").await);
        assert_eq!(ids(&h.store.trades()), vec!["a2"]);
        assert!(h.backend.remote_trade("a1").is_none());

        assert!(!h.store.delete_trade("a1").await);
        assert_eq!(h.notifier.errors().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_lands_in_active_account() {
        let h = loaded().await;
        let mut source = h.store.get_trade("a1").unwrap();
        source.notes = "breakout retest".to_string();
        h.shared.modify_trade("a1", |t| t.notes = source.notes.clone());

        h.accounts.set_reduced_motion(true);
        h.accounts.set_active_account(h.accounts.list_accounts()[1].clone());

        let copy = h.store.duplicate_trade("a1").await.unwrap();

        assert_ne!(copy.id, source.id);
        assert_eq!(copy.account_id.as_deref(), Some("b"));
        assert_eq!(copy.user_id, source.user_id);
        assert_ne!(copy.created_at, source.created_at);
        assert_eq!(TradeDraft::from(&copy), TradeDraft::from(&source));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_unknown_trade() {
        let h = loaded().await;

        assert!(h.store.duplicate_trade("missing").await.is_none());
        assert_eq!(
            h.notifier.errors()[0].body,
            JournalError::TradeNotFound("missing".into()).to_string()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_monthly_pnl_sample() {
        let h = loaded().await;
        assert_eq!(h.store.monthly_pnl(2026, 3), 300.0);

        let mut paper = TradeDraft::new("NAS100", crate::models::TradeDirection::Long, date(3, 20));
        paper.is_paper_trade = true;
        paper.pnl_amount = 1_000.0;
        h.store.add_trade(paper).await.unwrap();

        assert_eq!(h.store.trades().len(), 3);
        assert_eq!(h.store.monthly_pnl(2026, 3), 300.0);
        assert_eq!(h.store.daily_pnl(date(3, 20)), 0.0);
        assert_eq!(h.store.weekly_pnl(date(3, 16)), 0.0);
        assert_eq!(h.store.yearly_pnl(2026), 300.0);
        assert_eq!(h.store.total_pnl(), 300.0);
        assert_eq!(h.store.real_trades().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trades_by_date() {
        let h = loaded().await;

        assert_eq!(ids(&h.store.trades_by_date(date(3, 12))), vec!["a2"]);
        assert!(h.store.trades_by_date(date(3, 13)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_fetches_new_account_once() {
        let h = harness();
        let watcher = h.store.spawn_account_watcher();
        h.accounts.fetch_accounts().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.shared.fetched_for(), Some(AccountScope::Account("a".into())));

        h.accounts.set_active_account(h.accounts.list_accounts()[1].clone());
        tokio::time::sleep(Duration::from_millis(300)).await;

        let b_fetches = h
            .backend
            .fetch_calls()
            .iter()
            .filter(|(scope, _)| *scope == AccountScope::Account("b".into()))
            .count();
        assert_eq!(b_fetches, 1);
        assert_eq!(h.shared.fetched_for(), Some(AccountScope::Account("b".into())));
        assert_eq!(ids(&h.store.trades()), vec!["b1"]);
        watcher.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_display_substitution_during_switch() {
        let h = harness();
        let watcher = h.store.spawn_account_watcher();
        h.accounts.fetch_accounts().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let before = h.store.trades();
        assert_eq!(ids(&before), vec!["a2", "a1"]);

        h.accounts.set_active_account(h.accounts.list_accounts()[1].clone());
        assert_eq!(h.store.display_trades(), before);

        // Swapped and B fetched, still settling
        tokio::time::sleep(Duration::from_millis(170)).await;
        assert_eq!(ids(&h.shared.trades()), vec!["b1"]);
        assert_eq!(h.store.display_trades(), before);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!h.accounts.is_switching());
        assert_eq!(h.store.display_trades(), h.shared.trades());
        assert_eq!(ids(&h.store.trades()), vec!["b1"]);
        watcher.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_while_settling_keeps_display() {
        let h = harness();
        h.backend
            .set_accounts(vec![account("a", 10_000.0), account("b", 25_000.0), account("c", 5_000.0)]);
        let watcher = h.store.spawn_account_watcher();
        h.accounts.fetch_accounts().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let before = h.store.trades();
        let accounts = h.accounts.list_accounts();

        h.accounts.set_active_account(accounts[1].clone());
        tokio::time::sleep(Duration::from_millis(170)).await;
        assert_eq!(ids(&h.shared.trades()), vec!["b1"]);
        assert_eq!(h.store.display_trades(), before);

        h.accounts.set_active_account(accounts[2].clone());
        assert_eq!(h.store.display_trades(), before);
        assert_eq!(h.shared.previous_starting_balance(), Some(10_000.0));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!h.accounts.is_switching());
        assert_eq!(h.accounts.active_account_id().as_deref(), Some("c"));
        assert!(h.store.display_trades().is_empty());
        watcher.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_change_skipped_while_switching() {
        let h = loaded().await;
        let change = TradeChange {
            kind: ChangeKind::Insert,
            user_id: "user-1".into(),
            trade_id: "a3".into(),
            account_id: Some("a".into()),
        };
        let before = h.backend.fetch_calls().len();

        h.accounts.set_active_account(h.accounts.list_accounts()[1].clone());
        assert!(!h.store.handle_remote_change(&change).await);
        assert_eq!(h.backend.fetch_calls().len(), before);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(h.store.handle_remote_change(&change).await);

        let foreign = TradeChange {
            user_id: "user-2".into(),
            ..change
        };
        assert!(!h.store.handle_remote_change(&foreign).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_change_clears_cache() {
        let h = loaded().await;
        assert_eq!(h.store.trades().len(), 2);

        h.sessions.sign_out();
        h.accounts.handle_user_change().await;

        assert!(h.store.trades().is_empty());
        assert!(!h.shared.is_loaded());
        h.store.sync_with_active_account().await;
        assert!(h.store.trades().is_empty());
    }
}
