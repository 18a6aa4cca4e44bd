//! Batch runner: one session, one page, recipients strictly in order.
//!
//! A single tab can only represent one active chat view, so there is no
//! parallelism here: parallel tabs would multiply memory and risk
//! invalidating the login session.

use crate::automation::actuator::{self, SendTuning};
use crate::automation::driver::ChatPage;
use crate::automation::session::{self, SessionProfile, SetupError};
use crate::core::config::CourierConfig;
use crate::core::types::{BatchSummary, CancelFlag, Recipient, SendResult};
use std::time::Duration;
use tracing::{info, warn};

/// Drive the actuator over `rows` on an already-ready page.
///
/// One result per input row, in input order; a recipient's failure is
/// recorded and never stops the batch. Sleeps `delay` after every recipient
/// to throttle the interaction rate.
pub async fn run_batch(
    page: &dyn ChatPage,
    host: &str,
    rows: &[Recipient],
    delay: Duration,
    on_progress: &mut (dyn FnMut(SendResult) + Send),
) -> BatchSummary {
    let ladder = actuator::default_ladder();
    let tuning = SendTuning::default();
    let mut summary = BatchSummary::default();

    for (index, recipient) in rows.iter().enumerate() {
        let result = match actuator::send_single(page, host, recipient, &ladder, &tuning).await {
            Ok(outcome) => {
                summary.sent += 1;
                SendResult {
                    index,
                    phone: recipient.phone.clone(),
                    name: recipient.name.clone(),
                    ok: true,
                    error: None,
                    method: Some(outcome.method.label()),
                }
            }
            Err(e) => {
                warn!("batch: recipient {} ({}) failed: {}", index, recipient.phone, e);
                summary.failed += 1;
                SendResult {
                    index,
                    phone: recipient.phone.clone(),
                    name: recipient.name.clone(),
                    ok: false,
                    error: Some(e.to_string()),
                    method: None,
                }
            }
        };
        on_progress(result);

        tokio::time::sleep(delay).await;
    }

    info!(
        "batch: finished: {} sent, {} failed of {}",
        summary.sent,
        summary.failed,
        rows.len()
    );
    summary
}

/// Open the batch-profile session, wait for login, run the batch, and close
/// the session unconditionally. Setup errors propagate; per-recipient
/// errors are folded into the progress stream.
pub async fn send_batch(
    cfg: &CourierConfig,
    rows: Vec<Recipient>,
    delay: Duration,
    mut on_progress: impl FnMut(SendResult) + Send,
) -> Result<BatchSummary, SetupError> {
    let session = session::open_session(cfg, SessionProfile::Batch).await?;

    // The login gate for a batch has no stop control; the flag exists so
    // the wait stays cancellable from a future caller.
    let ready = session.wait_for_ready(&CancelFlag::new()).await;
    if let Err(e) = ready {
        session.close().await;
        return Err(e);
    }

    let host = cfg.resolve_host();
    let summary = run_batch(
        &*session.page(),
        &host,
        &rows,
        delay,
        &mut on_progress,
    )
    .await;

    session.close().await;
    Ok(summary)
}
