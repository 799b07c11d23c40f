//! Buy/sell transaction engine.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, instrument, warn};
use valuta_common::{time, CurrencyCode, CurrencyRegistry, TradeId};

use crate::error::{LedgerError, LedgerResult};
use crate::trade::{TradeRecord, TradeSide};
use crate::wallet::Wallet;

/// Applies trades to wallets.
///
/// The ledger never fetches rates; the caller supplies the USD rate it
/// resolved. Each operation either updates both balances or leaves the
/// wallet untouched. Amounts are not rounded.
pub struct Ledger {
    registry: Arc<CurrencyRegistry>,
}

impl Ledger {
    /// Create a new ledger validating codes against `registry`.
    pub fn new(registry: Arc<CurrencyRegistry>) -> Self {
        Self { registry }
    }

    /// Buy `amount` of `currency` for `amount * rate` USD.
    #[instrument(skip(self, wallet), fields(user_id = %wallet.user_id))]
    pub fn buy(
        &self,
        wallet: &mut Wallet,
        currency: &CurrencyCode,
        amount: Decimal,
        rate: Decimal,
    ) -> LedgerResult<TradeRecord> {
        self.validate(currency, amount, rate)?;

        let usd = CurrencyCode::usd();
        let cost = usd_value(amount, rate)?;
        let usd_available = wallet.balance(&usd);

        if !wallet.has_sufficient_funds(&usd, cost) {
            warn!(required = %cost, available = %usd_available, "Buy rejected");
            return Err(LedgerError::InsufficientFunds {
                currency: usd,
                required: cost,
                available: usd_available,
            });
        }

        let usd_balance = usd_available - cost;
        let currency_balance = wallet
            .balance(currency)
            .checked_add(amount)
            .ok_or(LedgerError::AmountOverflow { amount, rate })?;
        wallet.set_balance(usd, usd_balance);
        wallet.set_balance(currency.clone(), currency_balance);

        let record = record(wallet, TradeSide::Buy, currency, amount, rate, cost);
        info!(trade_id = %record.id, currency = %currency, amount = %amount, usd = %cost, "Buy applied");
        Ok(record)
    }

    /// Sell `amount` of `currency` for `amount * rate` USD.
    #[instrument(skip(self, wallet), fields(user_id = %wallet.user_id))]
    pub fn sell(
        &self,
        wallet: &mut Wallet,
        currency: &CurrencyCode,
        amount: Decimal,
        rate: Decimal,
    ) -> LedgerResult<TradeRecord> {
        self.validate(currency, amount, rate)?;

        let available = wallet.balance(currency);
        if !wallet.has_sufficient_funds(currency, amount) {
            warn!(required = %amount, available = %available, "Sell rejected");
            return Err(LedgerError::InsufficientFunds {
                currency: currency.clone(),
                required: amount,
                available,
            });
        }

        let usd = CurrencyCode::usd();
        let proceeds = usd_value(amount, rate)?;
        let currency_balance = available - amount;
        let usd_balance = wallet
            .balance(&usd)
            .checked_add(proceeds)
            .ok_or(LedgerError::AmountOverflow { amount, rate })?;
        wallet.set_balance(currency.clone(), currency_balance);
        wallet.set_balance(usd, usd_balance);

        let record = record(wallet, TradeSide::Sell, currency, amount, rate, proceeds);
        info!(trade_id = %record.id, currency = %currency, amount = %amount, usd = %proceeds, "Sell applied");
        Ok(record)
    }

    fn validate(&self, currency: &CurrencyCode, amount: Decimal, rate: Decimal) -> LedgerResult<()> {
        self.registry.lookup(currency.as_str())?;

        if currency.is_usd() {
            return Err(LedgerError::UnsupportedTrade(
                "USD is the settlement currency and cannot be traded against itself".to_string(),
            ));
        }
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if rate <= Decimal::ZERO {
            return Err(LedgerError::InvalidRate(rate));
        }
        Ok(())
    }
}

fn usd_value(amount: Decimal, rate: Decimal) -> LedgerResult<Decimal> {
    amount
        .checked_mul(rate)
        .ok_or(LedgerError::AmountOverflow { amount, rate })
}

fn record(
    wallet: &Wallet,
    side: TradeSide,
    currency: &CurrencyCode,
    amount: Decimal,
    rate: Decimal,
    usd_value: Decimal,
) -> TradeRecord {
    TradeRecord {
        id: TradeId::new(),
        user_id: wallet.user_id,
        side,
        currency: currency.clone(),
        amount,
        rate,
        usd_value,
        currency_balance: wallet.balance(currency),
        usd_balance: wallet.balance(&CurrencyCode::usd()),
        executed_at: time::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use valuta_common::UserId;

    fn ledger() -> Ledger {
        Ledger::new(Arc::new(CurrencyRegistry::builtin()))
    }

    fn btc() -> CurrencyCode {
        CurrencyCode::new("BTC")
    }

    fn funded(usd: Decimal, btc_balance: Decimal) -> Wallet {
        Wallet::with_balances(
            UserId::new(),
            [(CurrencyCode::usd(), usd), (btc(), btc_balance)],
        )
    }

    #[test]
    fn test_buy_example() {
        let mut wallet = Wallet::with_balances(UserId::new(), [(CurrencyCode::usd(), dec!(10000))]);

        let record = ledger().buy(&mut wallet, &btc(), dec!(0.1), dec!(67000)).unwrap();

        assert_eq!(wallet.balance(&CurrencyCode::usd()), dec!(3300));
        assert_eq!(wallet.balance(&btc()), dec!(0.1));
        assert_eq!(record.side, TradeSide::Buy);
        assert_eq!(record.usd_value, dec!(6700));
        assert_eq!(record.usd_balance, dec!(3300));
        assert_eq!(record.currency_balance, dec!(0.1));
    }

    #[test]
    fn test_sell() {
        let mut wallet = funded(dec!(100), dec!(0.5));

        let record = ledger().sell(&mut wallet, &btc(), dec!(0.2), dec!(60000)).unwrap();

        assert_eq!(wallet.balance(&btc()), dec!(0.3));
        assert_eq!(wallet.balance(&CurrencyCode::usd()), dec!(12100));
        assert_eq!(record.side, TradeSide::Sell);
        assert_eq!(record.usd_value, dec!(12000));
    }

    #[test]
    fn test_invalid_amount_leaves_wallet_unchanged() {
        let mut wallet = funded(dec!(100), dec!(1));
        let before = wallet.clone();

        for amount in [dec!(0), dec!(-1)] {
            let err = ledger().buy(&mut wallet, &btc(), amount, dec!(10)).unwrap_err();
            assert!(matches!(err, LedgerError::InvalidAmount(_)));
            let err = ledger().sell(&mut wallet, &btc(), amount, dec!(10)).unwrap_err();
            assert!(matches!(err, LedgerError::InvalidAmount(_)));
        }
        assert_eq!(wallet, before);
    }

    #[test]
    fn test_insufficient_funds_leaves_wallet_unchanged() {
        let mut wallet = funded(dec!(100), dec!(1));
        let before = wallet.clone();

        let err = ledger().buy(&mut wallet, &btc(), dec!(1), dec!(100.01)).unwrap_err();
        match err {
            LedgerError::InsufficientFunds { currency, required, available } => {
                assert!(currency.is_usd());
                assert_eq!(required, dec!(100.01));
                assert_eq!(available, dec!(100));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = ledger().sell(&mut wallet, &btc(), dec!(1.5), dec!(10)).unwrap_err();
        assert_eq!(err.error_code(), "INSUFFICIENT_FUNDS");
        assert_eq!(wallet, before);
    }

    #[test]
    fn test_exact_balance_is_sufficient() {
        let mut wallet = funded(dec!(100), dec!(1));
        ledger().buy(&mut wallet, &btc(), dec!(1), dec!(100)).unwrap();
        assert_eq!(wallet.balance(&CurrencyCode::usd()), Decimal::ZERO);

        ledger().sell(&mut wallet, &btc(), dec!(2), dec!(50)).unwrap();
        assert_eq!(wallet.balance(&btc()), Decimal::ZERO);
    }

    #[test]
    fn test_rejects_usd_unknown_currency_and_bad_rate() {
        let mut wallet = funded(dec!(100), dec!(1));

        let err = ledger().buy(&mut wallet, &CurrencyCode::usd(), dec!(1), dec!(1)).unwrap_err();
        assert!(matches!(err, LedgerError::UnsupportedTrade(_)));

        let err = ledger().buy(&mut wallet, &CurrencyCode::new("ZZZ"), dec!(1), dec!(1)).unwrap_err();
        assert_eq!(err.error_code(), "CURRENCY_NOT_FOUND");

        let err = ledger().sell(&mut wallet, &btc(), dec!(1), dec!(0)).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRate(_)));
    }

    #[test]
    fn test_overflowing_amount_is_rejected() {
        let mut wallet = funded(dec!(10000), dec!(1));
        let before = wallet.clone();

        let err = ledger().buy(&mut wallet, &btc(), Decimal::MAX, dec!(67000)).unwrap_err();
        assert!(matches!(err, LedgerError::AmountOverflow { .. }));
        assert_eq!(err.error_code(), "AMOUNT_OVERFLOW");

        let mut rich = funded(Decimal::MAX, Decimal::MAX);
        let rich_before = rich.clone();
        let err = ledger().sell(&mut rich, &btc(), Decimal::MAX, dec!(2)).unwrap_err();
        assert!(matches!(err, LedgerError::AmountOverflow { .. }));
        let err = ledger().sell(&mut rich, &btc(), dec!(1), dec!(1)).unwrap_err();
        assert!(matches!(err, LedgerError::AmountOverflow { .. }));

        assert_eq!(wallet, before);
        assert_eq!(rich, rich_before);
    }

    fn decimal(units: i64, scale: u32) -> Decimal {
        Decimal::new(units, scale)
    }

    proptest! {
        #[test]
        fn prop_buy_conserves_usd_value(
            usd in 0i64..100_000_000,
            held in 0i64..1_000_000,
            amount in 1i64..1_000_000,
            rate in 1i64..10_000_000,
        ) {
            let usd = decimal(usd, 2);
            let held = decimal(held, 4);
            let amount = decimal(amount, 4);
            let rate = decimal(rate, 2);
            let mut wallet = funded(usd, held);
            let before = wallet.clone();

            match ledger().buy(&mut wallet, &btc(), amount, rate) {
                Ok(_) => {
                    prop_assert_eq!(wallet.balance(&CurrencyCode::usd()), usd - amount * rate);
                    prop_assert_eq!(wallet.balance(&btc()), held + amount);
                    prop_assert_eq!(
                        wallet.balance(&CurrencyCode::usd()) + wallet.balance(&btc()) * rate,
                        usd + held * rate
                    );
                    prop_assert!(wallet.balance(&CurrencyCode::usd()) >= Decimal::ZERO);
                }
                Err(LedgerError::InsufficientFunds { .. }) => {
                    prop_assert!(usd < amount * rate);
                    prop_assert_eq!(wallet, before);
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
        }

        #[test]
        fn prop_sell_conserves_usd_value(
            usd in 0i64..100_000_000,
            held in 0i64..1_000_000,
            amount in 1i64..1_000_000,
            rate in 1i64..10_000_000,
        ) {
            let usd = decimal(usd, 2);
            let held = decimal(held, 4);
            let amount = decimal(amount, 4);
            let rate = decimal(rate, 2);
            let mut wallet = funded(usd, held);
            let before = wallet.clone();

            match ledger().sell(&mut wallet, &btc(), amount, rate) {
                Ok(_) => {
                    prop_assert_eq!(wallet.balance(&btc()), held - amount);
                    prop_assert_eq!(wallet.balance(&CurrencyCode::usd()), usd + amount * rate);
                    prop_assert_eq!(
                        wallet.balance(&CurrencyCode::usd()) + wallet.balance(&btc()) * rate,
                        usd + held * rate
                    );
                    prop_assert!(wallet.balance(&btc()) >= Decimal::ZERO);
                }
                Err(LedgerError::InsufficientFunds { .. }) => {
                    prop_assert!(held < amount);
                    prop_assert_eq!(wallet, before);
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
        }
    }
}
