use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::api::AccountScope;
use crate::models::Trade;

use super::FetchMode;

/// Process-wide trade cache shared by the account context and the trade store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeCache {
    pub trades: Vec<Trade>,
    pub loaded: bool,
    /// Scope the cached list was fetched for; `None` until a fetch completes
    pub fetched_for: Option<AccountScope>,
    /// Scope of the fetch currently running, if any, and whether its
    /// failure reaches the user
    pub in_flight: Option<(AccountScope, FetchMode)>,
    pub previous_trades: Vec<Trade>,
    pub is_transitioning: bool,
    pub previous_starting_balance: Option<f64>,
    pub is_loading: bool,
    /// Bumped on every reset so fetches started before it are dropped
    pub epoch: u64,
}

/// Injectable container for [`TradeCache`]. Consumers only go through
/// these setters; every transition runs under a single write guard.
#[derive(Debug, Default)]
pub struct SharedState {
    cache: RwLock<TradeCache>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, TradeCache> {
        self.cache.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, TradeCache> {
        self.cache.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn snapshot(&self) -> TradeCache {
        self.read().clone()
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.read().trades.clone()
    }

    pub fn previous_trades(&self) -> Vec<Trade> {
        self.read().previous_trades.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.read().loaded
    }

    pub fn fetched_for(&self) -> Option<AccountScope> {
        self.read().fetched_for.clone()
    }

    pub fn is_transitioning(&self) -> bool {
        self.read().is_transitioning
    }

    pub fn is_loading(&self) -> bool {
        self.read().is_loading
    }

    pub fn previous_starting_balance(&self) -> Option<f64> {
        self.read().previous_starting_balance
    }

    pub fn epoch(&self) -> u64 {
        self.read().epoch
    }

    pub fn find_trade(&self, trade_id: &str) -> Option<Trade> {
        self.read().trades.iter().find(|t| t.id == trade_id).cloned()
    }

    /// Snapshot the visible trades and the outgoing balance, then raise the
    /// transition flag. A switch that supersedes a running one keeps the
    /// snapshot already on screen, balance included.
    pub fn begin_transition(&self, previous_starting_balance: Option<f64>, is_switching: bool) {
        let mut cache = self.write();
        let showing_previous =
            (is_switching || cache.is_transitioning) && !cache.previous_trades.is_empty();
        if !showing_previous {
            cache.previous_trades = cache.trades.clone();
            cache.previous_starting_balance = previous_starting_balance;
        }
        cache.is_transitioning = true;
    }

    pub fn end_transition(&self) {
        self.write().is_transitioning = false;
    }

    /// A fetch is due when nothing is loaded for `scope` yet.
    pub fn needs_fetch(&self, scope: &AccountScope) -> bool {
        let cache = self.read();
        !cache.loaded || cache.fetched_for.as_ref() != Some(scope)
    }

    fn is_in_flight(cache: &TradeCache, scope: &AccountScope) -> bool {
        matches!(&cache.in_flight, Some((running, _)) if running == scope)
    }

    /// Mark a fetch for `scope` as running and return the epoch it belongs
    /// to. `None` when a fetch for the same scope is already in flight; a
    /// [`FetchMode::Notify`] request then upgrades the running one.
    pub fn begin_fetch(&self, scope: &AccountScope, mode: FetchMode) -> Option<u64> {
        let mut cache = self.write();
        if let Some((running, running_mode)) = cache.in_flight.as_mut()
            && *running == *scope
        {
            if mode == FetchMode::Notify {
                *running_mode = FetchMode::Notify;
            }
            return None;
        }
        cache.in_flight = Some((scope.clone(), mode));
        cache.is_loading = true;
        Some(cache.epoch)
    }

    /// Store a fetch result and return the mode the fetch ended with. Dropped
    /// (`None`) when a reset happened meanwhile or a newer fetch took over
    /// the in-flight slot.
    pub fn complete_fetch(
        &self,
        scope: &AccountScope,
        epoch: u64,
        trades: Vec<Trade>,
    ) -> Option<FetchMode> {
        let mut cache = self.write();
        if cache.epoch != epoch || !Self::is_in_flight(&cache, scope) {
            return None;
        }
        let (_, mode) = cache.in_flight.take()?;
        cache.trades = trades;
        cache.loaded = true;
        cache.fetched_for = Some(scope.clone());
        cache.is_loading = false;
        Some(mode)
    }

    /// Release the in-flight slot without touching the cached trades.
    pub fn abandon_fetch(&self, scope: &AccountScope, epoch: u64) {
        let mut cache = self.write();
        if cache.epoch == epoch && Self::is_in_flight(&cache, scope) {
            cache.in_flight = None;
            cache.is_loading = false;
        }
    }

    /// The previous snapshot while a switch is under way, the live list otherwise.
    pub fn display_trades(&self, is_switching: bool) -> Vec<Trade> {
        let cache = self.read();
        if (is_switching || cache.is_transitioning) && !cache.previous_trades.is_empty() {
            cache.previous_trades.clone()
        } else {
            cache.trades.clone()
        }
    }

    pub fn prepend_trade(&self, trade: Trade) {
        self.write().trades.insert(0, trade);
    }

    /// Apply `f` to the cached trade with `trade_id`; false if it is not cached.
    pub fn modify_trade(&self, trade_id: &str, f: impl FnOnce(&mut Trade)) -> bool {
        let mut cache = self.write();
        match cache.trades.iter_mut().find(|t| t.id == trade_id) {
            Some(trade) => {
                f(trade);
                true
            }
            None => false,
        }
    }

    pub fn remove_trade(&self, trade_id: &str) -> Option<Trade> {
        let mut cache = self.write();
        let index = cache.trades.iter().position(|t| t.id == trade_id)?;
        Some(cache.trades.remove(index))
    }

    /// Clear everything; used on sign-out and user change.
    pub fn reset(&self) {
        let mut cache = self.write();
        let epoch = cache.epoch.wrapping_add(1);
        *cache = TradeCache {
            epoch,
            ..TradeCache::default()
        };
    }
}
