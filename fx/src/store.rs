//! Durable rate table with append-only history.
//!
//! The current table lives in `rates.json` and is replaced atomically on
//! every commit. Every committed entry is also appended to
//! `rates_history.jsonl`, which is never rewritten.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};
use valuta_common::{storage, time, CurrencyCode, CurrencyPair, RateEntry, Timestamp};

use crate::error::{FxError, FxResult};

pub const RATES_FILE: &str = "rates.json";
pub const HISTORY_FILE: &str = "rates_history.jsonl";

const IDENTITY_SOURCE: &str = "identity";

/// On-disk shape of `rates.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotFile {
    pairs: Vec<RateEntry>,
    last_refresh: Option<Timestamp>,
}

/// Immutable view of the current rate table.
#[derive(Debug, Clone, Default)]
pub struct RateSnapshot {
    entries: BTreeMap<CurrencyPair, RateEntry>,
    last_refresh: Option<Timestamp>,
}

impl RateSnapshot {
    /// Latest committed entry for exactly this pair.
    pub fn get(&self, pair: &CurrencyPair) -> Option<&RateEntry> {
        self.entries.get(pair)
    }

    /// All committed entries ordered by pair.
    pub fn entries(&self) -> impl Iterator<Item = &RateEntry> {
        self.entries.values()
    }

    /// Time of the last successful commit.
    pub fn last_refresh(&self) -> Option<Timestamp> {
        self.last_refresh
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a rate: direct, inverted, then triangulated through USD.
    pub fn resolve(&self, pair: &CurrencyPair) -> Option<RateEntry> {
        if pair.base == pair.quote {
            return Some(RateEntry::new(
                pair.clone(),
                Decimal::ONE,
                time::now(),
                IDENTITY_SOURCE,
            ));
        }

        if let Some(entry) = self.leg(pair) {
            return Some(entry);
        }

        if pair.base.is_usd() || pair.quote.is_usd() {
            return None;
        }

        let usd = CurrencyCode::usd();
        let to_usd = self.leg(&CurrencyPair::new(pair.base.clone(), usd.clone()))?;
        let from_usd = self.leg(&CurrencyPair::new(usd, pair.quote.clone()))?;
        to_usd.chain(&from_usd)
    }

    /// Direct entry or the inverse of the reverse pair.
    fn leg(&self, pair: &CurrencyPair) -> Option<RateEntry> {
        if let Some(entry) = self.entries.get(pair) {
            return Some(entry.clone());
        }
        self.entries.get(&pair.inverse())?.inverted()
    }

    fn merged(&self, entries: &[RateEntry], committed_at: Timestamp) -> Self {
        let mut next = self.entries.clone();
        for entry in entries {
            next.insert(entry.pair(), entry.clone());
        }
        Self {
            entries: next,
            last_refresh: Some(committed_at),
        }
    }

    fn to_file(&self) -> SnapshotFile {
        SnapshotFile {
            pairs: self.entries.values().cloned().collect(),
            last_refresh: self.last_refresh,
        }
    }

    fn from_file(file: SnapshotFile) -> Self {
        Self {
            entries: file.pairs.into_iter().map(|e| (e.pair(), e)).collect(),
            last_refresh: file.last_refresh,
        }
    }
}

/// File-backed rate store.
///
/// Commits are serialized. Readers take an `Arc` of the current snapshot and
/// never block on a commit in progress.
pub struct RateStore {
    snapshot_path: PathBuf,
    history_path: PathBuf,
    current: RwLock<Arc<RateSnapshot>>,
    commit_lock: Mutex<()>,
}

impl RateStore {
    /// Open the store in `dir`, loading the last committed snapshot.
    ///
    /// Temporary files left behind by an interrupted commit are ignored.
    pub fn open(dir: impl AsRef<Path>) -> FxResult<Self> {
        let dir = dir.as_ref();
        let snapshot_path = dir.join(RATES_FILE);
        let history_path = dir.join(HISTORY_FILE);

        let snapshot = storage::read_json::<SnapshotFile>(&snapshot_path)?
            .map(RateSnapshot::from_file)
            .unwrap_or_default();

        info!(
            path = %snapshot_path.display(),
            pairs = snapshot.len(),
            "Rate store opened"
        );

        Ok(Self {
            snapshot_path,
            history_path,
            current: RwLock::new(Arc::new(snapshot)),
            commit_lock: Mutex::new(()),
        })
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<RateSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Commit `entries` over the current snapshot.
    ///
    /// Pairs not in `entries` keep their previous value. Nothing is written
    /// if any rate is not strictly positive. Returns the number of pairs
    /// written.
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    pub fn commit(&self, entries: &[RateEntry]) -> FxResult<usize> {
        validate(entries)?;

        let _guard = self.commit_lock.lock();

        let (next, staged) = self.stage(entries)?;
        storage::append_json_lines(&self.history_path, entries)?;
        storage::publish(staged, &self.snapshot_path)?;

        let pairs = next.len();
        *self.current.write() = Arc::new(next);

        info!(committed = entries.len(), pairs, "Rates committed");
        Ok(entries.len())
    }

    /// Write the merged snapshot to a temporary file without publishing it.
    fn stage(&self, entries: &[RateEntry]) -> FxResult<(RateSnapshot, NamedTempFile)> {
        let next = self.snapshot().merged(entries, time::now());
        let staged = storage::stage_json(&self.snapshot_path, &next.to_file())?;
        debug!(path = %staged.path().display(), "Snapshot staged");
        Ok((next, staged))
    }

    /// Rate for `base` in units of `quote`.
    pub fn current_rate(&self, base: &CurrencyCode, quote: &CurrencyCode) -> FxResult<RateEntry> {
        let pair = CurrencyPair::new(base.clone(), quote.clone());
        self.snapshot()
            .resolve(&pair)
            .ok_or(FxError::RateNotFound(pair))
    }

    /// Committed entries for exactly this pair, most recent first.
    pub fn history(
        &self,
        base: &CurrencyCode,
        quote: &CurrencyCode,
        limit: usize,
    ) -> FxResult<Vec<RateEntry>> {
        let pair = CurrencyPair::new(base.clone(), quote.clone());
        let records: Vec<RateEntry> = storage::read_json_lines(&self.history_path)?;

        Ok(records
            .into_iter()
            .rev()
            .filter(|entry| entry.pair() == pair)
            .take(limit)
            .collect())
    }
}

fn validate(entries: &[RateEntry]) -> FxResult<()> {
    match entries.iter().find(|e| e.rate <= Decimal::ZERO) {
        Some(invalid) => Err(FxError::InvalidRate {
            pair: invalid.pair(),
            rate: invalid.rate.to_string(),
        }),
        None => Ok(()),
    }
}
