// Polling loop: full status snapshots diffed into change records

use super::{
    apply_batch, recover_connection, sleep_unless_stopped, stop_requested, stopped, Recovery,
    RunOutcome,
};
use crate::error::RpcError;
use crate::model::Session;
use crate::status::StateDiffer;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug)]
pub(super) struct Intervals {
    pub poll: Duration,
    pub backoff: Duration,
}

pub(super) async fn run(
    session: Weak<dyn Session>,
    differ: Arc<Mutex<StateDiffer>>,
    intervals: Intervals,
    mut stop_rx: watch::Receiver<bool>,
) -> RunOutcome {
    let Some((conn, model_uuid)) = session
        .upgrade()
        .map(|s| (s.connection(), s.model_uuid().to_string()))
    else {
        return RunOutcome::Cancelled;
    };
    let mut client = conn.status_client();

    loop {
        if stop_requested(&stop_rx) {
            return RunOutcome::Clean;
        }

        let fetched = tokio::select! {
            _ = stopped(&mut stop_rx) => None,
            result = client.full_status() => Some(result),
        };

        let Some(result) = fetched else {
            return RunOutcome::Clean;
        };

        match result {
            Ok(status) => {
                let deltas = differ.lock().await.diff(&status, &model_uuid);
                debug!(deltas = deltas.len(), "Polled full status");

                {
                    let Some(live) = session.upgrade() else {
                        debug!("Model dropped, ending sync");
                        return RunOutcome::Cancelled;
                    };
                    if let Err(e) = apply_batch(live.as_ref(), deltas).await {
                        return RunOutcome::Failed(e);
                    }
                }

                if !sleep_unless_stopped(intervals.poll, &mut stop_rx).await {
                    return RunOutcome::Clean;
                }
            }
            Err(RpcError::ConnectionClosed) => match recover_connection(conn.as_ref()).await {
                // Status clients are bound to the old connection
                Ok(Recovery::Resume) => client = conn.status_client(),
                Ok(Recovery::Exit) => return RunOutcome::Clean,
                Err(e) => return RunOutcome::Failed(e),
            },
            Err(e) => {
                warn!(
                    error = %e,
                    backoff_ms = intervals.backoff.as_millis() as u64,
                    "Full status fetch failed, retrying"
                );
                if !sleep_unless_stopped(intervals.backoff, &mut stop_rx).await {
                    return RunOutcome::Clean;
                }
            }
        }
    }
}
