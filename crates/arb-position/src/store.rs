//! Lock-protected position table.
//!
//! One `parking_lot::Mutex` guards the symbol -> position map. Every method
//! copies what it needs and releases the lock before any I/O. After each
//! mutation the table is copied under the lock, tagged with a generation
//! number and written to the snapshot file outside it; the snapshot store
//! discards a write older than the last one it saved.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arb_core::{
    base_symbol, CooldownTable, Opportunity, Position, PositionStatus, Price, VenuePosition,
};
use arb_persistence::SnapshotStore;
use arb_telemetry::Metrics;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::error::PositionResult;

/// Symbols changed by a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub adopted: Vec<String>,
    pub dropped: Vec<String>,
}

impl Reconciled {
    pub fn is_empty(&self) -> bool {
        self.adopted.is_empty() && self.dropped.is_empty()
    }
}

/// Shared position, cooldown and opportunity tables.
pub struct PositionStore {
    positions: Mutex<HashMap<String, Position>>,
    opportunities: Mutex<HashMap<String, Opportunity>>,
    cooldowns: Arc<CooldownTable>,
    generation: AtomicU64,
    snapshot: Option<Arc<SnapshotStore>>,
}

impl PositionStore {
    pub fn new(cooldowns: Arc<CooldownTable>, snapshot: Option<Arc<SnapshotStore>>) -> Self {
        Self {
            positions: Mutex::new(HashMap::new()),
            opportunities: Mutex::new(HashMap::new()),
            cooldowns,
            generation: AtomicU64::new(0),
            snapshot,
        }
    }

    /// Store without a snapshot file.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(CooldownTable::new()), None)
    }

    pub fn cooldowns(&self) -> &Arc<CooldownTable> {
        &self.cooldowns
    }

    /// Load the snapshot once at startup. Returns the number restored.
    pub fn restore(&self, now: DateTime<Utc>) -> PositionResult<usize> {
        let Some(snapshot) = &self.snapshot else {
            return Ok(0);
        };
        let loaded = snapshot.load(now)?;
        let restored = loaded.positions.len();
        {
            let mut positions = self.positions.lock();
            for position in loaded.positions {
                positions.insert(position.symbol.clone(), position);
            }
        }
        if !loaded.dropped_expired.is_empty() {
            self.persist();
        }
        Metrics::open_positions(self.len());
        Ok(restored)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn get(&self, symbol: &str) -> Option<Position> {
        self.positions.lock().get(symbol).cloned()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.positions.lock().contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.positions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every position.
    pub fn snapshot(&self) -> Vec<Position> {
        self.positions.lock().values().cloned().collect()
    }

    /// Copy of positions in `Open` status.
    pub fn open_positions(&self) -> Vec<Position> {
        self.positions
            .lock()
            .values()
            .filter(|p| p.is_open())
            .cloned()
            .collect()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Insert `position` unless the symbol already has one.
    pub fn insert_if_absent(&self, position: Position) -> bool {
        let inserted = {
            let mut positions = self.positions.lock();
            if positions.contains_key(&position.symbol) {
                false
            } else {
                positions.insert(position.symbol.clone(), position);
                true
            }
        };
        if inserted {
            self.persist();
        }
        inserted
    }

    /// Flip `Open -> Closing`, returning a copy of the position.
    ///
    /// `None` if the symbol has no position or it is already closing, so
    /// at most one caller proceeds to close.
    pub fn try_begin_close(&self, symbol: &str) -> Option<Position> {
        let claimed = {
            let mut positions = self.positions.lock();
            match positions.get_mut(symbol) {
                Some(p) if p.status == PositionStatus::Open => {
                    p.status = PositionStatus::Closing;
                    Some(p.clone())
                }
                _ => None,
            }
        };
        if claimed.is_some() {
            self.persist();
        }
        claimed
    }

    /// Flip `Closing -> Open` after a failed close.
    pub fn revert_close(&self, symbol: &str) -> bool {
        let reverted = {
            let mut positions = self.positions.lock();
            match positions.get_mut(symbol) {
                Some(p) if p.status == PositionStatus::Closing => {
                    p.status = PositionStatus::Open;
                    true
                }
                _ => false,
            }
        };
        if reverted {
            self.persist();
        }
        reverted
    }

    pub fn remove(&self, symbol: &str) -> Option<Position> {
        let removed = self.positions.lock().remove(symbol);
        if removed.is_some() {
            self.persist();
        }
        removed
    }

    /// Apply an averaging fill to an open position.
    pub fn apply_add(
        &self,
        symbol: &str,
        price: Price,
        add_notional: Decimal,
        now: DateTime<Utc>,
    ) -> Option<Position> {
        let updated = {
            let mut positions = self.positions.lock();
            match positions.get_mut(symbol) {
                Some(p) if p.is_open() => {
                    *p = p.with_add(price, add_notional, now);
                    Some(p.clone())
                }
                _ => None,
            }
        };
        if updated.is_some() {
            self.persist();
        }
        updated
    }

    /// Record the latest home-venue price seen for `symbol`.
    ///
    /// Not a lifecycle change, so no snapshot is written; the price rides
    /// along with the next mutation.
    pub fn update_last_price(&self, symbol: &str, price: Price) -> bool {
        let mut positions = self.positions.lock();
        match positions.get_mut(symbol) {
            Some(p) if p.last_price != Some(price) => {
                p.last_price = Some(price);
                true
            }
            _ => false,
        }
    }

    /// Bring the table in line with a successful venue listing.
    ///
    /// Venue positions the table does not know about are adopted. Open
    /// positions the venue no longer holds are dropped. Known symbols keep
    /// their timers, and closing positions are left to the closer.
    pub fn reconcile(
        &self,
        venue_positions: &[VenuePosition],
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> Reconciled {
        let held: Vec<&VenuePosition> = venue_positions
            .iter()
            .filter(|vp| !vp.contracts.is_zero())
            .collect();
        let held_bases: HashSet<String> = held.iter().map(|vp| base_symbol(&vp.symbol)).collect();

        let result = {
            let mut positions = self.positions.lock();

            let dropped: Vec<String> = positions
                .values()
                .filter(|p| p.is_open() && !held_bases.contains(&base_symbol(&p.symbol)))
                .map(|p| p.symbol.clone())
                .collect();
            for symbol in &dropped {
                positions.remove(symbol);
            }

            let mut known: HashSet<String> =
                positions.keys().map(|symbol| base_symbol(symbol)).collect();
            let adopted: Vec<String> = held
                .into_iter()
                .filter_map(|vp| {
                    if !known.insert(base_symbol(&vp.symbol)) {
                        return None;
                    }
                    positions.insert(vp.symbol.clone(), Position::from_venue(vp, now, max_age));
                    Some(vp.symbol.clone())
                })
                .collect();

            Reconciled { adopted, dropped }
        };

        if !result.adopted.is_empty() {
            info!(symbols = ?result.adopted, "Adopted venue positions");
        }
        if !result.dropped.is_empty() {
            warn!(symbols = ?result.dropped, "Venue no longer holds positions, dropped locally");
        }
        if !result.is_empty() {
            self.persist();
        }
        result
    }

    // =========================================================================
    // Opportunities
    // =========================================================================

    /// Record this cycle's opportunity for a symbol, replacing any older one.
    pub fn record_opportunity(&self, opportunity: Opportunity) {
        self.opportunities
            .lock()
            .insert(opportunity.symbol.clone(), opportunity);
    }

    /// Take every recorded opportunity and return the highest score.
    pub fn drain_best_opportunity(&self) -> Option<Opportunity> {
        let drained: Vec<Opportunity> = self.opportunities.lock().drain().map(|(_, o)| o).collect();
        drained.into_iter().max_by(|a, b| a.score.cmp(&b.score))
    }

    pub fn opportunity_count(&self) -> usize {
        self.opportunities.lock().len()
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    fn persist(&self) {
        let (generation, positions) = {
            let positions = self.positions.lock();
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            (generation, positions.values().cloned().collect::<Vec<_>>())
        };
        Metrics::open_positions(positions.len());

        let Some(snapshot) = &self.snapshot else {
            return;
        };
        match snapshot.save(generation, positions.iter()) {
            Ok(true) => {}
            Ok(false) => debug!(generation, "Newer snapshot already written"),
            Err(e) => warn!(error = %e, "Failed to persist position snapshot"),
        }
    }
}
