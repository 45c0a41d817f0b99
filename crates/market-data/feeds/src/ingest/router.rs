//! Trade router: the single merge point for stream and poll trades
//!
//! Both producers call [`TradeRouter::accept`]. The watermark check, dedup
//! bookkeeping, watermark advance and downstream hand-off all happen under
//! one lock, so downstream sees each logical trade once and in
//! non-decreasing timestamp order.

use crate::ingest::watermark::Watermark;
use common::{Origin, Symbol, Trade};
use rustc_hash::FxHashSet;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

/// Accepted trades between throughput log lines
const LOG_EVERY_N_ACCEPTED: u64 = 5;

/// Outcome of routing one trade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// New trade, delivered downstream
    Accepted,
    /// Older than the watermark
    Stale,
    /// Already delivered (same timestamp and id, or same timestamp without id)
    Duplicate,
    /// Trade for another market
    WrongSymbol,
    /// New trade, but the downstream consumer is gone
    Closed,
}

impl Verdict {
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Router counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterCounts {
    pub accepted: u64,
    pub from_stream: u64,
    pub from_poll: u64,
    pub stale: u64,
    pub duplicate: u64,
}

#[derive(Debug, Default)]
struct RouterStats {
    /// Bumped under the dedup lock, so each accepted trade gets a unique ordinal
    accepted: AtomicU64,
    from_stream: AtomicU64,
    from_poll: AtomicU64,
    stale: AtomicU64,
    duplicate: AtomicU64,
}

/// Dedup memory for the trades sitting exactly at the watermark
#[derive(Debug)]
struct DedupState {
    ids_at_mark: FxHashSet<String>,
    /// An id-less trade was delivered at the mark; nothing else at that
    /// timestamp can be told apart from it
    sealed: bool,
}

/// Merges both ingestion channels into one ordered, deduplicated stream
pub struct TradeRouter {
    symbol: Symbol,
    watermark: Watermark,
    state: Mutex<DedupState>,
    downstream: mpsc::Sender<Trade>,
    stats: RouterStats,
}

impl TradeRouter {
    /// Router for `symbol` delivering into `downstream`.
    ///
    /// Trades at the initial watermark are treated as already delivered.
    #[must_use]
    pub fn new(symbol: Symbol, watermark: Watermark, downstream: mpsc::Sender<Trade>) -> Self {
        Self {
            symbol,
            watermark,
            state: Mutex::new(DedupState {
                ids_at_mark: FxHashSet::default(),
                sealed: true,
            }),
            downstream,
            stats: RouterStats::default(),
        }
    }

    /// Symbol this router accepts
    #[must_use]
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Shared watermark handle
    #[must_use]
    pub fn watermark(&self) -> &Watermark {
        &self.watermark
    }

    /// Route a trade; true if it was newly delivered downstream
    pub async fn accept(&self, trade: Trade, origin: Origin) -> bool {
        self.route(trade, origin).await.is_accepted()
    }

    /// Route a trade and report why it was or wasn't delivered
    pub async fn route(&self, trade: Trade, origin: Origin) -> Verdict {
        if trade.symbol != self.symbol {
            debug!("Dropping {} trade for {}", origin, trade.symbol);
            return Verdict::WrongSymbol;
        }

        let mut state = self.state.lock().await;
        let mark = self.watermark.get();
        let (ts, id) = trade.key();

        match ts.cmp(&mark) {
            CmpOrdering::Less => {
                self.stats.stale.fetch_add(1, Ordering::Relaxed);
                debug!("Stale {} trade at {} (mark {})", origin, ts, mark);
                return Verdict::Stale;
            }
            CmpOrdering::Equal => {
                let fresh_id = match id {
                    Some(id) if !state.sealed => state.ids_at_mark.insert(id.to_string()),
                    _ => false,
                };
                if !fresh_id {
                    self.stats.duplicate.fetch_add(1, Ordering::Relaxed);
                    debug!("Duplicate {} trade at {}", origin, ts);
                    return Verdict::Duplicate;
                }
            }
            CmpOrdering::Greater => {
                self.watermark.advance_to(ts);
                state.ids_at_mark.clear();
                match id {
                    Some(id) => {
                        state.ids_at_mark.insert(id.to_string());
                        state.sealed = false;
                    }
                    None => state.sealed = true,
                }
            }
        }

        let price = trade.price;
        if self.downstream.send(trade).await.is_err() {
            debug!("Downstream closed; {} trade at {} not delivered", origin, ts);
            return Verdict::Closed;
        }
        match origin {
            Origin::Stream => self.stats.from_stream.fetch_add(1, Ordering::Relaxed),
            Origin::Poll => self.stats.from_poll.fetch_add(1, Ordering::Relaxed),
        };
        let total = self.stats.accepted.fetch_add(1, Ordering::Relaxed) + 1;
        drop(state);

        if total % LOG_EVERY_N_ACCEPTED == 0 {
            info!("Trades accepted: {}; last price: {} via {}", total, price, origin);
        } else {
            debug!("Accepted {} trade at {} price {}", origin, ts, price);
        }
        Verdict::Accepted
    }

    /// Snapshot of the router counters
    #[must_use]
    pub fn counts(&self) -> RouterCounts {
        RouterCounts {
            accepted: self.stats.accepted.load(Ordering::Relaxed),
            from_stream: self.stats.from_stream.load(Ordering::Relaxed),
            from_poll: self.stats.from_poll.load(Ordering::Relaxed),
            stale: self.stats.stale.load(Ordering::Relaxed),
            duplicate: self.stats.duplicate.load(Ordering::Relaxed),
        }
    }
}
