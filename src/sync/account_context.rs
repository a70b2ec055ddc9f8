use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::api::JournalBackend;
use crate::auth::{Session, SessionProvider};
use crate::config::SyncTiming;
use crate::models::Account;
use crate::notify::{Notification, Notifier};

use super::state::SharedState;
use super::timer::TaskSlot;

#[derive(Debug, Clone, PartialEq)]
pub enum SwitchPhase {
    Idle,
    /// Fading out; the active account has not changed yet
    Switching(Account),
    /// Active account swapped, waiting for the view to settle
    SettlingVisual,
}

#[derive(Debug)]
struct Accounts {
    list: Vec<Account>,
    active: Option<Account>,
    loading: bool,
    is_switching: bool,
    phase: SwitchPhase,
}

impl Default for Accounts {
    fn default() -> Self {
        Self {
            list: Vec::new(),
            active: None,
            loading: false,
            is_switching: false,
            phase: SwitchPhase::Idle,
        }
    }
}

/// Owns the signed-in user's accounts and the active one, and runs the
/// Idle -> Switching -> SettlingVisual choreography on a switch.
pub struct AccountContext {
    backend: Arc<dyn JournalBackend>,
    sessions: Arc<SessionProvider>,
    shared: Arc<SharedState>,
    notifier: Arc<dyn Notifier>,
    timing: SyncTiming,
    inner: RwLock<Accounts>,
    reduced_motion: AtomicBool,
    generation: AtomicU64,
    switch_task: TaskSlot,
    active_tx: watch::Sender<Option<String>>,
    /// Sequence of the newest selection write; older ones are skipped
    persist_seq: Arc<AtomicU64>,
    persist_lock: Arc<Mutex<()>>,
}

impl AccountContext {
    pub fn new(
        backend: Arc<dyn JournalBackend>,
        sessions: Arc<SessionProvider>,
        shared: Arc<SharedState>,
        notifier: Arc<dyn Notifier>,
        timing: SyncTiming,
    ) -> Self {
        let (active_tx, _rx) = watch::channel(None);
        Self {
            backend,
            sessions,
            shared,
            notifier,
            timing,
            inner: RwLock::new(Accounts::default()),
            reduced_motion: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            switch_task: TaskSlot::new(),
            active_tx,
            persist_seq: Arc::new(AtomicU64::new(0)),
            persist_lock: Arc::new(Mutex::new(())),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Accounts> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Accounts> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn list_accounts(&self) -> Vec<Account> {
        self.read().list.clone()
    }

    pub fn active_account(&self) -> Option<Account> {
        self.read().active.clone()
    }

    pub fn active_account_id(&self) -> Option<String> {
        self.read().active.as_ref().map(|a| a.id.clone())
    }

    pub fn is_loading(&self) -> bool {
        self.read().loading
    }

    pub fn is_switching(&self) -> bool {
        self.read().is_switching
    }

    pub fn phase(&self) -> SwitchPhase {
        self.read().phase.clone()
    }

    pub fn reduced_motion(&self) -> bool {
        self.reduced_motion.load(Ordering::SeqCst)
    }

    pub fn set_reduced_motion(&self, enabled: bool) {
        self.reduced_motion.store(enabled, Ordering::SeqCst);
    }

    /// Active account id, updated whenever the active account changes
    pub fn subscribe_active(&self) -> watch::Receiver<Option<String>> {
        self.active_tx.subscribe()
    }

    fn publish_active(&self, account_id: Option<String>) {
        self.active_tx.send_if_modified(|current| {
            if *current == account_id {
                return false;
            }
            *current = account_id;
            true
        });
    }

    /// Load the user's accounts and restore the persisted selection.
    pub async fn fetch_accounts(&self) {
        let Some(session) = self.sessions.current() else {
            {
                let mut inner = self.write();
                inner.list.clear();
                inner.active = None;
            }
            self.publish_active(None);
            return;
        };

        self.write().loading = true;

        let (memberships, selected) = futures::future::join(
            self.backend.list_account_memberships(&session),
            self.backend.get_selected_account_id(&session),
        )
        .await;

        // User changed while the request was out
        if self.sessions.current_user_id().as_deref() != Some(session.user_id.as_str()) {
            self.write().loading = false;
            return;
        }

        let memberships = match memberships {
            Ok(memberships) => memberships,
            Err(e) => {
                if cfg!(debug_assertions) {
                    log::warn!("Failed to fetch accounts: {}", e);
                }
                self.write().loading = false;
                return;
            }
        };

        let selected = selected.unwrap_or_else(|e| {
            if cfg!(debug_assertions) {
                log::warn!("Failed to load selected account: {}", e);
            }
            None
        });

        let accounts: Vec<Account> = memberships.into_iter().map(Account::from).collect();
        let restored = selected
            .as_deref()
            .and_then(|id| accounts.iter().find(|a| a.id == id))
            .cloned();
        let (active, persist_default) = match restored {
            Some(account) => (Some(account), false),
            None => (accounts.first().cloned(), true),
        };

        log::debug!(
            "Loaded {} accounts for {} (active: {:?})",
            accounts.len(),
            session.user_id,
            active.as_ref().map(|a| a.id.as_str())
        );

        let active_id = active.as_ref().map(|a| a.id.clone());
        {
            let mut inner = self.write();
            inner.list = accounts;
            inner.active = active;
            inner.loading = false;
        }
        self.publish_active(active_id.clone());

        if persist_default && let Some(account_id) = active_id {
            self.persist_selection(session, account_id);
        }
    }

    pub async fn refresh_accounts(&self) {
        self.fetch_accounts().await;
    }

    /// Switch to `account`. With reduced motion the swap is immediate;
    /// otherwise the active account changes after the fade-out delay and the
    /// flags clear after the settle delay. A newer call supersedes this one.
    pub fn set_active_account(self: &Arc<Self>, account: Account) {
        let reduced_motion = self.reduced_motion();
        // Generation, flags and snapshot change under one guard
        let generation = {
            let mut inner = self.write();
            let target = match &inner.phase {
                SwitchPhase::Switching(pending) => Some(pending.id.as_str()),
                _ => inner.active.as_ref().map(|a| a.id.as_str()),
            };
            if target == Some(account.id.as_str()) {
                return;
            }

            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            if reduced_motion {
                inner.active = Some(account.clone());
                inner.is_switching = false;
                inner.phase = SwitchPhase::Idle;
                self.shared.end_transition();
            } else {
                let previous_balance = inner.active.as_ref().map(|a| a.starting_balance);
                self.shared.begin_transition(previous_balance, inner.is_switching);
                inner.is_switching = true;
                inner.phase = SwitchPhase::Switching(account.clone());
            }
            generation
        };
        self.switch_task.cancel();

        if reduced_motion {
            self.publish_active(Some(account.id.clone()));
            self.persist_current_selection(account.id);
            return;
        }

        let ctx = Arc::clone(self);
        let fade_out = self.timing.fade_out();
        let settle = self.timing.settle();
        self.switch_task.schedule(async move {
            tokio::time::sleep(fade_out).await;
            if !ctx.swap_active(generation, account) {
                return;
            }
            tokio::time::sleep(settle).await;
            ctx.finish_switch(generation);
        });
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn swap_active(&self, generation: u64, account: Account) -> bool {
        let account_id = account.id.clone();
        {
            let mut inner = self.write();
            if !self.is_current(generation) {
                return false;
            }
            inner.active = Some(account);
            inner.phase = SwitchPhase::SettlingVisual;
        }
        self.publish_active(Some(account_id.clone()));
        self.persist_current_selection(account_id);
        true
    }

    fn finish_switch(&self, generation: u64) {
        let mut inner = self.write();
        if !self.is_current(generation) {
            return;
        }
        inner.is_switching = false;
        inner.phase = SwitchPhase::Idle;
        self.shared.end_transition();
    }

    fn persist_current_selection(&self, account_id: String) {
        match self.sessions.current() {
            Some(session) => self.persist_selection(session, account_id),
            None => self.notifier.notify(Notification::error(
                "Could not save account",
                "You must be signed in",
            )),
        }
    }

    /// Fire-and-forget; the selection is re-derived on the next fetch.
    /// Writes run one at a time and only the newest one is sent.
    fn persist_selection(&self, session: Session, account_id: String) {
        let seq = self.persist_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let latest = Arc::clone(&self.persist_seq);
        let lock = Arc::clone(&self.persist_lock);
        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            let _guard = lock.lock().await;
            if latest.load(Ordering::SeqCst) != seq {
                log::debug!("Selection {} superseded before it was saved", account_id);
                return;
            }
            if let Err(e) = backend.set_selected_account_id(&session, &account_id).await
                && cfg!(debug_assertions)
            {
                log::warn!("Failed to persist selected account {}: {}", account_id, e);
            }
        });
    }

    /// Drop everything that belongs to the previous user, then load the
    /// accounts of the current one.
    pub async fn handle_user_change(&self) {
        {
            let mut inner = self.write();
            self.generation.fetch_add(1, Ordering::SeqCst);
            *inner = Accounts::default();
            self.shared.reset();
        }
        self.switch_task.cancel();
        self.publish_active(None);

        self.fetch_accounts().await;
    }

    /// Run [`handle_user_change`](Self::handle_user_change) on every sign-in,
    /// sign-out and user switch, starting with the current session.
    pub fn spawn_session_watcher(self: &Arc<Self>) -> JoinHandle<()> {
        let ctx = Arc::clone(self);
        let mut sessions = self.sessions.subscribe();
        tokio::spawn(async move {
            loop {
                sessions.borrow_and_update();
                ctx.handle_user_change().await;
                if sessions.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}
