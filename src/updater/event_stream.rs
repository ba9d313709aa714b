// Event-stream loop: batches pushed by the control plane's AllWatcher

use super::{apply_batch, model_mode, recover_connection, stop_requested, stopped, Recovery, RunOutcome};
use crate::connection::{AllWatcher, Connection};
use crate::error::{RpcError, SyncError};
use crate::model::Session;
use std::sync::Weak;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub(super) async fn run(session: Weak<dyn Session>, mut stop_rx: watch::Receiver<bool>) -> RunOutcome {
    let Some(conn) = session.upgrade().map(|s| s.connection()) else {
        return RunOutcome::Cancelled;
    };
    let mut watcher = conn.all_watcher();

    load_initial_mode(&session, conn.as_ref()).await;

    loop {
        if stop_requested(&stop_rx) {
            release(watcher.as_mut()).await;
            return RunOutcome::Clean;
        }

        let fetched = tokio::select! {
            _ = stopped(&mut stop_rx) => None,
            result = watcher.next() => Some(result),
        };

        let Some(result) = fetched else {
            release(watcher.as_mut()).await;
            return RunOutcome::Clean;
        };

        match result {
            Ok(deltas) => {
                if stop_requested(&stop_rx) {
                    debug!(deltas = deltas.len(), "Stop requested, discarding batch");
                    release(watcher.as_mut()).await;
                    return RunOutcome::Clean;
                }

                let Some(live) = session.upgrade() else {
                    debug!("Model dropped, ending sync");
                    release(watcher.as_mut()).await;
                    return RunOutcome::Cancelled;
                };

                if let Err(e) = apply_batch(live.as_ref(), deltas).await {
                    return RunOutcome::Failed(e);
                }
            }
            Err(e) if e.is_watcher_stopped() => {
                if stop_requested(&stop_rx) {
                    return RunOutcome::Clean;
                }
                warn!(error = %e, "Watcher stopped by the server, starting a new watch");
                watcher.discard_watch();
            }
            Err(RpcError::ConnectionClosed) => match recover_connection(conn.as_ref()).await {
                Ok(Recovery::Resume) => watcher.discard_watch(),
                Ok(Recovery::Exit) => return RunOutcome::Clean,
                Err(e) => return RunOutcome::Failed(e),
            },
            Err(e) => {
                error!(error = %e, "Watcher failed");
                return RunOutcome::Failed(SyncError::Rpc(e));
            }
        }
    }
}

/// Seed the session mode from the model config. Failure is not fatal.
async fn load_initial_mode(session: &Weak<dyn Session>, conn: &dyn Connection) {
    match conn.model_config().await {
        Ok(config) => {
            if let (Some(mode), Some(session)) = (model_mode(&config), session.upgrade()) {
                info!(mode = %mode, "Model mode from config");
                session.set_mode(mode);
            }
        }
        Err(e) => warn!(error = %e, "Could not read model config"),
    }
}

/// Best-effort release of the server-side watch
async fn release(watcher: &mut dyn AllWatcher) {
    if let Err(e) = watcher.stop().await {
        debug!(error = %e, "Ignoring error while stopping watcher");
    }
}
