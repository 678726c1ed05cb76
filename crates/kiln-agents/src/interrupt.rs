//! Process interrupt wiring

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Token cancelled on every Ctrl-C
///
/// Repeated interrupts only cancel the same token again; the controller
/// coalesces them into a single cleanup.
pub fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let listener = token.clone();
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for interrupts");
                return;
            }
            if listener.is_cancelled() {
                info!("interrupt received, cleanup already in progress");
            } else {
                info!("interrupt received, cancelling running tasks");
            }
            listener.cancel();
        }
    });
    token
}
