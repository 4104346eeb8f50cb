//! Cost-aware admission control for named upstream operations.
//!
//! Budgets are integer "cost units". An operation is admitted while any
//! budget remains, even when its cost overshoots the remainder — the search
//! surface's own quota model works the same way, and it lets a session always
//! perform at least one expensive operation before going dry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use tracing::{debug, warn};

/// Default per-operation costs. Unlisted operations cost 1; `fetch.*` is
/// time-budgeted elsewhere and costs nothing here.
fn default_costs() -> HashMap<String, u64> {
    HashMap::from([
        ("youtube.search".to_string(), 100),
        ("youtube.videos".to_string(), 1),
        ("youtube.channels".to_string(), 1),
        ("spotify.search".to_string(), 1),
        ("spotify.artist".to_string(), 1),
        ("spotify.top_tracks".to_string(), 1),
        ("instagram.profile".to_string(), 1),
        ("tiktok.profile".to_string(), 1),
        ("fetch.plain".to_string(), 0),
        ("fetch.headless".to_string(), 0),
    ])
}

struct QuotaState {
    spent: u64,
    window_start: NaiveDate,
}

/// Tracks spend against a budget that resets at UTC midnight.
/// A limit of 0 means unlimited (spend is still recorded).
pub struct QuotaLimiter {
    limit: u64,
    costs: HashMap<String, u64>,
    state: Arc<Mutex<QuotaState>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub spent: u64,
    pub limit: u64,
    pub remaining: u64,
}

impl QuotaLimiter {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            costs: default_costs(),
            state: Arc::new(Mutex::new(QuotaState {
                spent: 0,
                window_start: Utc::now().date_naive(),
            })),
        }
    }

    pub fn cost_of(&self, op: &str) -> u64 {
        if let Some(&c) = self.costs.get(op) {
            return c;
        }
        // Wildcard family defaults (fetch.* is free).
        if op.starts_with("fetch.") {
            return 0;
        }
        1
    }

    /// Non-blocking admission check. Admits while any budget remains and
    /// records the spend; never waits.
    pub fn try_acquire(&self, op: &str, count: u64) -> bool {
        self.try_acquire_at(op, count, Utc::now().date_naive())
    }

    fn try_acquire_at(&self, op: &str, count: u64, today: NaiveDate) -> bool {
        let cost = self.cost_of(op).saturating_mul(count);
        if cost == 0 {
            return true;
        }
        let mut state = self.state.lock().expect("quota mutex poisoned");
        if today > state.window_start {
            debug!(op, "Daily quota window reset");
            state.spent = 0;
            state.window_start = today;
        }
        if self.limit > 0 && state.spent >= self.limit {
            warn!(op, cost, spent = state.spent, limit = self.limit, "Budget exhausted");
            return false;
        }
        state.spent += cost;
        true
    }

    /// Acquire with a refundable handle for failure paths.
    pub fn reserve(&self, op: &str, count: u64) -> Option<Reservation> {
        let cost = self.cost_of(op).saturating_mul(count);
        if !self.try_acquire(op, count) {
            return None;
        }
        Some(Reservation {
            state: Arc::clone(&self.state),
            units: cost,
            settled: false,
        })
    }

    pub(crate) fn refund_units(&self, units: u64) {
        let mut state = self.state.lock().expect("quota mutex poisoned");
        state.spent = state.spent.saturating_sub(units);
    }

    pub fn status(&self) -> QuotaStatus {
        let state = self.state.lock().expect("quota mutex poisoned");
        let remaining = if self.limit == 0 {
            u64::MAX
        } else {
            self.limit.saturating_sub(state.spent)
        };
        QuotaStatus {
            spent: state.spent,
            limit: self.limit,
            remaining,
        }
    }
}

/// A held budget acquisition. `commit()` keeps the spend; `refund()` (or
/// dropping uncommitted) returns it.
pub struct Reservation {
    state: Arc<Mutex<QuotaState>>,
    units: u64,
    settled: bool,
}

impl Reservation {
    pub fn commit(mut self) {
        self.settled = true;
    }

    pub fn refund(mut self) {
        self.do_refund();
    }

    fn do_refund(&mut self) {
        if !self.settled && self.units > 0 {
            let mut state = self.state.lock().expect("quota mutex poisoned");
            state.spent = state.spent.saturating_sub(self.units);
            self.settled = true;
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.do_refund();
    }
}

/// Joint gate over the process-wide daily limiter and an optional
/// session-scoped budget. Remembers whether any acquisition was ever denied,
/// for the end-of-session summary.
pub struct BudgetGate {
    global: Arc<QuotaLimiter>,
    session: Option<QuotaLimiter>,
    exhausted: AtomicBool,
}

impl BudgetGate {
    pub fn new(global: Arc<QuotaLimiter>, session_limit: Option<u64>) -> Self {
        Self {
            global,
            session: session_limit.map(QuotaLimiter::new),
            exhausted: AtomicBool::new(false),
        }
    }

    /// Admit iff both the session and global budgets admit. A global denial
    /// refunds the session spend.
    pub fn try_acquire(&self, op: &str, count: u64) -> bool {
        if let Some(session) = &self.session {
            if !session.try_acquire(op, count) {
                self.exhausted.store(true, Ordering::Relaxed);
                return false;
            }
            if !self.global.try_acquire(op, count) {
                session.refund_units(session.cost_of(op).saturating_mul(count));
                self.exhausted.store(true, Ordering::Relaxed);
                return false;
            }
            return true;
        }
        let admitted = self.global.try_acquire(op, count);
        if !admitted {
            self.exhausted.store(true, Ordering::Relaxed);
        }
        admitted
    }

    pub fn exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    #[test]
    fn unlimited_always_admits() {
        let limiter = QuotaLimiter::new(0);
        assert!(limiter.try_acquire("youtube.search", 10));
        assert!(limiter.try_acquire("spotify.search", 1000));
    }

    #[test]
    fn fetch_ops_are_free() {
        let limiter = QuotaLimiter::new(1);
        assert!(limiter.try_acquire("fetch.headless", 50));
        assert!(limiter.try_acquire("fetch.plain", 50));
        assert_eq!(limiter.status().spent, 0);
    }

    #[test]
    fn first_expensive_op_admits_then_denies() {
        // Budget 1, search costs 100: the first acquire overshoots but is
        // admitted; everything after is denied.
        let limiter = QuotaLimiter::new(1);
        assert!(limiter.try_acquire("youtube.search", 1));
        assert_eq!(limiter.status().spent, 100);
        assert!(!limiter.try_acquire("youtube.search", 1));
        assert!(!limiter.try_acquire("spotify.search", 1));
    }

    #[test]
    fn unknown_ops_cost_one() {
        let limiter = QuotaLimiter::new(3);
        assert_eq!(limiter.cost_of("lyrics.page"), 1);
        assert!(limiter.try_acquire("lyrics.page", 3));
        assert!(!limiter.try_acquire("lyrics.page", 1));
    }

    #[test]
    fn window_resets_on_new_day() {
        let limiter = QuotaLimiter::new(100);
        let today = Utc::now().date_naive();
        assert!(limiter.try_acquire_at("youtube.search", 1, today));
        assert!(!limiter.try_acquire_at("youtube.search", 1, today));
        let tomorrow = today.checked_add_days(Days::new(1)).unwrap();
        assert!(limiter.try_acquire_at("youtube.search", 1, tomorrow));
    }

    #[test]
    fn reservation_refund_returns_budget() {
        let limiter = QuotaLimiter::new(100);
        let r = limiter.reserve("youtube.search", 1).unwrap();
        assert_eq!(limiter.status().spent, 100);
        r.refund();
        assert_eq!(limiter.status().spent, 0);
        assert!(limiter.try_acquire("spotify.search", 1));
    }

    #[test]
    fn reservation_commit_keeps_spend() {
        let limiter = QuotaLimiter::new(100);
        let r = limiter.reserve("spotify.search", 2).unwrap();
        r.commit();
        assert_eq!(limiter.status().spent, 2);
    }

    #[test]
    fn dropped_reservation_refunds() {
        let limiter = QuotaLimiter::new(100);
        {
            let _r = limiter.reserve("spotify.search", 5).unwrap();
        }
        assert_eq!(limiter.status().spent, 0);
    }

    #[test]
    fn gate_combines_session_and_global() {
        let global = Arc::new(QuotaLimiter::new(0));
        let gate = BudgetGate::new(Arc::clone(&global), Some(1));
        assert!(gate.try_acquire("youtube.search", 1));
        assert!(!gate.try_acquire("spotify.search", 1));
        assert!(gate.exhausted());
    }

    #[test]
    fn gate_without_session_budget_never_exhausts_on_unlimited_global() {
        let gate = BudgetGate::new(Arc::new(QuotaLimiter::new(0)), None);
        assert!(gate.try_acquire("youtube.search", 100));
        assert!(!gate.exhausted());
    }

    #[test]
    fn global_denial_refunds_session() {
        let global = Arc::new(QuotaLimiter::new(1));
        assert!(global.try_acquire("youtube.search", 1)); // exhaust global
        let gate = BudgetGate::new(Arc::clone(&global), Some(1000));
        assert!(!gate.try_acquire("spotify.search", 1));
        // session budget was refunded, a later cheap global window would admit
        assert!(gate.exhausted());
    }
}
