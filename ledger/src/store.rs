//! Durable wallet storage in `portfolios.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument};
use valuta_common::{storage, CurrencyCode, UserId};

use crate::error::{LedgerError, LedgerResult};
use crate::wallet::Wallet;

pub const PORTFOLIOS_FILE: &str = "portfolios.json";

type Balances = BTreeMap<CurrencyCode, Decimal>;
type PortfolioFile = BTreeMap<UserId, Balances>;

/// Wallets keyed by user, persisted after every change.
///
/// Each wallet has its own lock. An update runs on a copy of the wallet,
/// the file is replaced atomically, and only then is the copy swapped in.
/// Lock order is always wallet, then file.
pub struct WalletStore {
    path: PathBuf,
    wallets: DashMap<UserId, Arc<Mutex<Wallet>>>,
    persisted: Mutex<PortfolioFile>,
}

impl WalletStore {
    /// Open the store in `dir`, loading existing wallets.
    pub fn open(dir: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = dir.as_ref().join(PORTFOLIOS_FILE);
        let persisted: PortfolioFile = storage::read_json(&path)?.unwrap_or_default();

        let wallets = DashMap::new();
        for (user_id, balances) in &persisted {
            let wallet = Wallet::with_balances(*user_id, balances.clone());
            wallets.insert(*user_id, Arc::new(Mutex::new(wallet)));
        }

        info!(path = %path.display(), wallets = wallets.len(), "Wallet store opened");

        Ok(Self {
            path,
            wallets,
            persisted: Mutex::new(persisted),
        })
    }

    /// Create and persist a wallet for a new user.
    #[instrument(skip(self, balances))]
    pub fn create(
        &self,
        user_id: UserId,
        balances: impl IntoIterator<Item = (CurrencyCode, Decimal)>,
    ) -> LedgerResult<Wallet> {
        let wallet = Wallet::with_balances(user_id, balances);

        match self.wallets.entry(user_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(LedgerError::WalletExists(user_id)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                self.persist(&wallet)?;
                slot.insert(Arc::new(Mutex::new(wallet.clone())));
                info!("Wallet created");
                Ok(wallet)
            }
        }
    }

    /// Copy of the user's wallet.
    pub fn get(&self, user_id: &UserId) -> LedgerResult<Wallet> {
        let handle = self.handle(user_id)?;
        let wallet = handle.lock().clone();
        Ok(wallet)
    }

    /// Run `apply` against a copy of the wallet and persist the result.
    ///
    /// If `apply` or the write fails, the stored wallet is unchanged.
    pub fn update<T>(
        &self,
        user_id: &UserId,
        apply: impl FnOnce(&mut Wallet) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let handle = self.handle(user_id)?;
        let mut wallet = handle.lock();

        let mut next = wallet.clone();
        let output = apply(&mut next)?;

        self.persist(&next)?;
        *wallet = next;

        debug!(user_id = %user_id, "Wallet updated");
        Ok(output)
    }

    /// Number of stored wallets.
    pub fn count(&self) -> usize {
        self.wallets.len()
    }

    fn handle(&self, user_id: &UserId) -> LedgerResult<Arc<Mutex<Wallet>>> {
        self.wallets
            .get(user_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(LedgerError::WalletNotFound(*user_id))
    }

    /// Write the portfolio file with `wallet` replaced.
    fn persist(&self, wallet: &Wallet) -> LedgerResult<()> {
        let mut persisted = self.persisted.lock();

        let mut next = persisted.clone();
        next.insert(wallet.user_id, wallet.balances().clone());
        storage::atomic_write_json(&self.path, &next)?;

        *persisted = next;
        Ok(())
    }
}
