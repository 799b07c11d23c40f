//! Periodic background rate refresh.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::service::TradingHub;

/// Spawn the refresh loop. Returns `None` if the interval is zero.
///
/// The first refresh runs one interval after start. The loop exits when
/// `shutdown` flips to `true` or its sender is dropped.
pub fn spawn(
    hub: Arc<TradingHub>,
    config: &SchedulerConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Option<JoinHandle<()>> {
    let period = config.interval;
    if period.is_zero() {
        info!("Rate scheduler disabled");
        return None;
    }

    let handle = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = period.as_secs(), "Rate scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match hub.update_rates(None).await {
                        Ok(report) => {
                            if !report.failed.is_empty() {
                                warn!(
                                    failed = ?report.failed.keys().collect::<Vec<_>>(),
                                    "Scheduled refresh partially failed"
                                );
                            }
                            info!(updated_pairs = report.updated_pairs, "Scheduled refresh complete");
                        }
                        Err(e) => {
                            error!(error_code = e.error_code(), error = %e, "Scheduled refresh failed");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Rate scheduler stopped");
    });

    Some(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use tempfile::TempDir;
    use valuta_common::{CurrencyCode, CurrencyKind, CurrencyPair};
    use valuta_fx::{MockRateSource, RateSource};

    fn hub(dir: &TempDir, source: Arc<MockRateSource>) -> Arc<TradingHub> {
        let config = HubConfig {
            data_dir: dir.path().to_path_buf(),
            rates_ttl_seconds: Some(300),
            ..HubConfig::default()
        };
        let sources: Vec<Arc<dyn RateSource>> = vec![source];
        Arc::new(TradingHub::with_sources(&config, sources).unwrap())
    }

    #[tokio::test]
    async fn test_refreshes_until_shutdown() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(MockRateSource::new("coingecko", Some(CurrencyKind::Crypto)));
        source.set_rate(CurrencyPair::to_usd(CurrencyCode::new("BTC")), dec!(67000));
        let hub = hub(&dir, source);

        let (tx, rx) = watch::channel(false);
        let config = SchedulerConfig {
            interval: Duration::from_millis(20),
        };
        let handle = spawn(Arc::clone(&hub), &config, rx).unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(hub.metrics().refreshes_total >= 1);
        assert!(hub.fx().trade_rate(&CurrencyCode::new("BTC")).is_ok());
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_loop() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(MockRateSource::new("coingecko", Some(CurrencyKind::Crypto)));
        source.set_failure(Some(valuta_fx::SourceError::Unavailable("down".to_string())));
        let hub = hub(&dir, source);

        let (tx, rx) = watch::channel(false);
        let config = SchedulerConfig {
            interval: Duration::from_millis(20),
        };
        let handle = spawn(Arc::clone(&hub), &config, rx).unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        drop(tx);
        handle.await.unwrap();

        assert!(hub.metrics().refreshes_failed >= 2);
    }

    #[tokio::test]
    async fn test_zero_interval_disables() {
        let dir = TempDir::new().unwrap();
        let hub = hub(&dir, Arc::new(MockRateSource::new("coingecko", None)));
        let (_tx, rx) = watch::channel(false);

        let config = SchedulerConfig {
            interval: Duration::ZERO,
        };
        assert!(spawn(hub, &config, rx).is_none());
    }
}
