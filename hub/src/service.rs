//! Trading hub: the use cases behind every shell command.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};
use valuta_common::{
    time, Currency, CurrencyCode, CurrencyKind, CurrencyRegistry, RateEntry, Timestamp, ValutaError,
};
use valuta_fx::{FxEngine, FxError, RateQuote, RateSource, RateStore, SourceError};
use valuta_ledger::{valuate, Ledger, TradeRecord, Valuation, WalletStore};

use crate::config::HubConfig;
use crate::error::{HubError, HubResult};
use crate::metrics::{HubMetrics, MetricsSnapshot};
use crate::middleware::logged;
use crate::state::Session;
use crate::users::UserStore;

/// Outcome of a rate refresh that committed at least one source.
#[derive(Debug, Clone)]
pub struct RefreshReport {
    /// Pairs written to the snapshot.
    pub updated_pairs: usize,
    /// Sources that answered.
    pub succeeded: Vec<String>,
    /// Sources that failed; their pairs kept their previous rates.
    pub failed: BTreeMap<String, SourceError>,
    pub last_refresh: Option<Timestamp>,
}

/// One stored rate with its freshness.
#[derive(Debug, Clone, PartialEq)]
pub struct RateRow {
    pub entry: RateEntry,
    pub fresh: bool,
}

/// Current snapshot as shown to the user.
#[derive(Debug, Clone)]
pub struct RatesView {
    /// Rows ordered by pair.
    pub rows: Vec<RateRow>,
    pub last_refresh: Option<Timestamp>,
}

/// Composes the registry, FX engine, ledger and stores.
pub struct TradingHub {
    registry: Arc<CurrencyRegistry>,
    fx: FxEngine,
    ledger: Ledger,
    wallets: WalletStore,
    users: UserStore,
    metrics: Arc<HubMetrics>,
    initial_balance: Decimal,
}

impl TradingHub {
    /// Open the hub with the live rate sources.
    pub fn open(config: &HubConfig) -> HubResult<Self> {
        let sources = config
            .rate_sources()
            .map_err(|e| HubError::Configuration(e.to_string()))?;
        Self::with_sources(config, sources)
    }

    /// Open the hub with the given rate sources, in priority order.
    pub fn with_sources(config: &HubConfig, sources: Vec<Arc<dyn RateSource>>) -> HubResult<Self> {
        config.validate().map_err(HubError::Configuration)?;

        std::fs::create_dir_all(&config.data_dir).map_err(ValutaError::from)?;

        let registry = Arc::new(config.registry()?);
        let fx_config = config.fx_engine_config().map_err(HubError::Configuration)?;
        let store = Arc::new(RateStore::open(&config.data_dir)?);
        let fx = FxEngine::new(store, Arc::clone(&registry), sources, fx_config);
        let wallets = WalletStore::open(&config.data_dir)?;
        let users = UserStore::open(&config.data_dir)?;

        info!(
            data_dir = %config.data_dir.display(),
            currencies = registry.len(),
            sources = fx.sources().len(),
            users = users.count(),
            wallets = wallets.count(),
            "Trading hub opened"
        );

        Ok(Self {
            ledger: Ledger::new(Arc::clone(&registry)),
            wallets,
            users,
            registry,
            fx,
            metrics: Arc::new(HubMetrics::new()),
            initial_balance: config.initial_balance,
        })
    }

    pub fn registry(&self) -> &CurrencyRegistry {
        &self.registry
    }

    pub fn fx(&self) -> &FxEngine {
        &self.fx
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Register a user, fund their wallet and start a session.
    pub async fn register(&self, username: &str, password: &str) -> HubResult<Session> {
        logged("register", async {
            let user = self.users.register(username, password)?;

            if let Err(e) = self
                .wallets
                .create(user.user_id, [(CurrencyCode::usd(), self.initial_balance)])
            {
                error!(user_id = %user.user_id, error = %e, "Wallet creation failed, removing user");
                if let Err(rollback) = self.users.remove(&user.user_id) {
                    error!(user_id = %user.user_id, error = %rollback, "User removal failed");
                }
                return Err(e.into());
            }

            Ok(Session::start(&user))
        })
        .await
    }

    pub async fn login(&self, username: &str, password: &str) -> HubResult<Session> {
        logged("login", async {
            let user = self.users.authenticate(username, password)?;
            Ok(Session::start(&user))
        })
        .await
    }

    pub fn logout(&self, session: Session) {
        info!(user_id = %session.user_id, "User logged out");
    }

    /// USD initially credited on registration.
    pub fn initial_balance(&self) -> Decimal {
        self.initial_balance
    }

    /// Buy `amount` of `currency` with USD at the current fresh rate.
    pub async fn buy(&self, session: &Session, currency: &str, amount: Decimal) -> HubResult<TradeRecord> {
        logged("buy", self.trade(session, currency, amount, Side::Buy)).await
    }

    /// Sell `amount` of `currency` for USD at the current fresh rate.
    pub async fn sell(&self, session: &Session, currency: &str, amount: Decimal) -> HubResult<TradeRecord> {
        logged("sell", self.trade(session, currency, amount, Side::Sell)).await
    }

    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    async fn trade(
        &self,
        session: &Session,
        currency: &str,
        amount: Decimal,
        side: Side,
    ) -> HubResult<TradeRecord> {
        let result = self.execute_trade(session, currency, amount, side);
        match &result {
            Ok(_) => self.metrics.trade_executed(),
            Err(_) => self.metrics.trade_rejected(),
        }
        result
    }

    fn execute_trade(
        &self,
        session: &Session,
        currency: &str,
        amount: Decimal,
        side: Side,
    ) -> HubResult<TradeRecord> {
        let code = self.currency(currency)?;
        let rate = self.fx.trade_rate(&code)?;

        let record = self.wallets.update(&session.user_id, |wallet| match side {
            Side::Buy => self.ledger.buy(wallet, &code, amount, rate.rate),
            Side::Sell => self.ledger.sell(wallet, &code, amount, rate.rate),
        })?;

        Ok(record)
    }

    /// Rate of `from` in `to`, flagged stale rather than refused.
    pub async fn get_rate(&self, from: &str, to: &str) -> HubResult<RateQuote> {
        logged("get_rate", async {
            let base = self.currency(from)?;
            let quote = self.currency(to)?;
            Ok(self.fx.quote(&base, &quote)?)
        })
        .await
    }

    /// Refresh rates from every source, or only from `source`.
    pub async fn update_rates(&self, source: Option<&str>) -> HubResult<RefreshReport> {
        logged("update_rates", async {
            let selected = self.select_sources(source)?;

            match self.fx.refresh(&selected).await {
                Ok(result) => {
                    self.metrics.refresh_committed(result.failed.len());
                    Ok(RefreshReport {
                        updated_pairs: result.entries.len(),
                        succeeded: result.succeeded.into_iter().collect(),
                        failed: result.failed,
                        last_refresh: self.fx.store().snapshot().last_refresh(),
                    })
                }
                Err(e) => {
                    if let FxError::AllSourcesUnavailable(failed) = &e {
                        self.metrics.refresh_failed(failed.len());
                    }
                    Err(e.into())
                }
            }
        })
        .await
    }

    fn select_sources(&self, filter: Option<&str>) -> HubResult<Vec<Arc<dyn RateSource>>> {
        let sources = self.fx.sources();
        let Some(filter) = filter else {
            return Ok(sources.to_vec());
        };

        let selected: Vec<_> = sources
            .iter()
            .filter(|s| s.id().eq_ignore_ascii_case(filter.trim()))
            .cloned()
            .collect();

        if selected.is_empty() {
            let known: Vec<&str> = sources.iter().map(|s| s.id()).collect();
            warn!(filter, "Unknown rate source requested");
            return Err(HubError::Configuration(format!(
                "unknown rate source '{}'; available: {}",
                filter,
                known.join(", ")
            )));
        }

        Ok(selected)
    }

    /// Stored rates, optionally only those involving `currency`.
    pub async fn show_rates(&self, currency: Option<&str>) -> HubResult<RatesView> {
        logged("show_rates", async {
            let filter = currency.map(|c| self.currency(c)).transpose()?;
            let snapshot = self.fx.store().snapshot();
            let ttl = self.fx.ttl();
            let now = time::now();

            let rows = snapshot
                .entries()
                .filter(|entry| match &filter {
                    Some(code) => &entry.base == code || &entry.quote == code,
                    None => true,
                })
                .map(|entry| RateRow {
                    entry: entry.clone(),
                    fresh: ttl.is_fresh(entry, now),
                })
                .collect();

            Ok(RatesView {
                rows,
                last_refresh: snapshot.last_refresh(),
            })
        })
        .await
    }

    /// Value the session's wallet in `base` (USD by default).
    pub async fn show_portfolio(&self, session: &Session, base: Option<&str>) -> HubResult<Valuation> {
        logged("show_portfolio", async {
            let base = match base {
                Some(base) => self.currency(base)?,
                None => CurrencyCode::usd(),
            };
            let wallet = self.wallets.get(&session.user_id)?;
            Ok(valuate(&wallet, &base, &self.fx.store().snapshot()))
        })
        .await
    }

    /// Supported currencies ordered by code, optionally of one kind.
    pub fn list_currencies(&self, kind: Option<&str>) -> HubResult<Vec<Currency>> {
        let kind = match kind.map(|k| k.trim().to_lowercase()) {
            None => None,
            Some(k) if k == "fiat" => Some(CurrencyKind::Fiat),
            Some(k) if k == "crypto" => Some(CurrencyKind::Crypto),
            Some(other) => {
                return Err(HubError::InvalidInput(format!(
                    "unknown currency kind '{other}'; use fiat or crypto"
                )))
            }
        };

        Ok(self
            .registry
            .list()
            .into_iter()
            .filter(|currency| kind.map_or(true, |kind| currency.kind() == kind))
            .cloned()
            .collect())
    }

    /// Committed rates for exactly `from/to`, most recent first.
    pub async fn rate_history(&self, from: &str, to: &str, limit: usize) -> HubResult<Vec<RateEntry>> {
        logged("rate_history", async {
            let base = self.currency(from)?;
            let quote = self.currency(to)?;
            Ok(self.fx.store().history(&base, &quote, limit)?)
        })
        .await
    }

    /// Parse a user-supplied code and require it to be registered.
    fn currency(&self, raw: &str) -> HubResult<CurrencyCode> {
        let code = CurrencyCode::parse(raw)?;
        self.registry.lookup(code.as_str())?;
        Ok(code)
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Buy,
    Sell,
}
