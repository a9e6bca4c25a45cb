use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::models::proposal::{MatchProposal, MatchStatus};
use crate::models::ride::MatchAccepted;
use crate::state::AppState;

pub async fn publish_accepted(state: &AppState, proposal: &MatchProposal) {
    if proposal.status != MatchStatus::Accepted {
        return;
    }

    let event = MatchAccepted::from(proposal);
    let _ = state.match_events_tx.send(event.clone());

    if let Err(err) = state.accepted_tx.send(event).await {
        error!(match_id = %proposal.id, error = %err, "acceptance queue send failed");
    }
}

pub async fn run_acceptance_worker(state: Arc<AppState>, mut accepted_rx: mpsc::Receiver<MatchAccepted>) {
    info!("acceptance worker started");

    while let Some(event) = accepted_rx.recv().await {
        if let Err(err) = state
            .coordinator
            .reject_competing_proposals(event.match_id, &event.driver_id, &event.passenger_id)
            .await
        {
            error!(
                match_id = %event.match_id,
                error = %err,
                retryable = err.is_retryable(),
                "failed to reject competing matches"
            );
        }
    }

    warn!("acceptance worker stopped: queue channel closed");
}
