//! Logging wrapper around hub use cases.

use std::future::Future;
use std::time::Instant;

use tracing::{info, info_span, warn, Instrument};

use crate::error::HubResult;

/// Run `operation` inside a span named after `action`, logging its outcome
/// and duration. The result is returned unchanged.
pub async fn logged<T, F>(action: &'static str, operation: F) -> HubResult<T>
where
    F: Future<Output = HubResult<T>>,
{
    let span = info_span!("use_case", action);

    async move {
        let started = Instant::now();
        let result = operation.await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => info!(elapsed_ms, "Action succeeded"),
            Err(e) => warn!(
                elapsed_ms,
                error_code = e.error_code(),
                error = %e,
                "Action failed"
            ),
        }

        result
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HubError;
    use tokio_test::{assert_err, assert_ok, block_on};

    #[test]
    fn test_result_passes_through() {
        let ok = assert_ok!(block_on(logged("ok", async { Ok::<_, HubError>(7) })));
        assert_eq!(ok, 7);

        let err = assert_err!(block_on(logged("fail", async {
            Err::<(), _>(HubError::NotLoggedIn)
        })));
        assert_eq!(err.error_code(), "NOT_LOGGED_IN");
    }
}
