//! Per-session phase loop. The only code that moves a running session from
//! one phase to the next.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::protocol::ServerMessage;
use crate::registry::{conclude, SessionHandle, SessionRegistry};
use crate::types::*;

/// Spawn the driver task for a freshly started session
pub(crate) fn spawn(registry: Arc<SessionRegistry>, handle: Arc<SessionHandle>) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(session = %handle.key, "Driver started");
        run(&registry, &handle).await;
        tracing::info!(session = %handle.key, "Driver stopped");
    })
}

async fn run(registry: &SessionRegistry, handle: &SessionHandle) {
    let key = &handle.key;
    let courier = registry.courier().clone();
    let config = registry.config().clone();

    loop {
        announce(registry, handle, Phase::Night, Some(config.night)).await;
        wait_phase(registry, handle, Phase::Night, config.night).await;

        let (summary, checks, outcome) = {
            let mut s = handle.session.lock().await;
            let summary = match s.resolve_night() {
                Ok((summary, _)) => summary,
                Err(e) => {
                    tracing::debug!(session = %key, "Night not resolved: {}", e);
                    return;
                }
            };
            registry.rebuild_mafia_index(&s).await;
            (summary, s.last_checks().to_vec(), conclude(&mut s))
        };

        courier
            .publish(
                key,
                ServerMessage::NightResult {
                    session: key.clone(),
                    summary,
                },
            )
            .await;
        for check in checks {
            let msg = ServerMessage::CheckResult {
                session: key.clone(),
                target: check.target,
                target_name: check.target_name,
                is_mafia: check.is_mafia,
            };
            if !courier.deliver(check.commissioner, msg).await {
                tracing::warn!(session = %key, participant = check.commissioner, "Check result undeliverable");
            }
        }
        if let Some((winner, mafia)) = outcome {
            registry.finish(key, winner, mafia).await;
            return;
        }

        announce(registry, handle, Phase::Day, Some(config.day)).await;
        wait_phase(registry, handle, Phase::Day, config.day).await;

        let roster = {
            let mut s = handle.session.lock().await;
            match s.skip_first_vote() {
                Some(roster) => Some(roster),
                None => {
                    if let Err(e) = s.open_vote() {
                        tracing::debug!(session = %key, "Vote not opened: {}", e);
                        return;
                    }
                    None
                }
            }
        };
        if let Some(roster) = roster {
            courier
                .publish(
                    key,
                    ServerMessage::FirstDayRoster {
                        session: key.clone(),
                        roster,
                    },
                )
                .await;
            continue;
        }

        announce(registry, handle, Phase::Voting, Some(config.voting)).await;
        wait_phase(registry, handle, Phase::Voting, config.voting).await;

        let (summary, outcome) = {
            let mut s = handle.session.lock().await;
            let summary = match s.resolve_vote() {
                Ok((summary, _)) => summary,
                Err(e) => {
                    tracing::debug!(session = %key, "Vote not resolved: {}", e);
                    return;
                }
            };
            registry.rebuild_mafia_index(&s).await;
            (summary, conclude(&mut s))
        };

        courier
            .publish(
                key,
                ServerMessage::VoteResult {
                    session: key.clone(),
                    summary,
                },
            )
            .await;
        if let Some((winner, mafia)) = outcome {
            registry.finish(key, winner, mafia).await;
            return;
        }
    }
}

async fn announce(
    registry: &SessionRegistry,
    handle: &SessionHandle,
    phase: Phase,
    span: Option<Duration>,
) {
    let round = handle.session.lock().await.round;
    let deadline = span
        .and_then(|d| chrono::Duration::from_std(d).ok())
        .map(|d| (chrono::Utc::now() + d).to_rfc3339());

    tracing::info!(session = %handle.key, ?phase, round, "Phase started");
    registry
        .courier()
        .publish(
            &handle.key,
            ServerMessage::PhaseChanged {
                session: handle.key.clone(),
                phase,
                round,
                deadline,
            },
        )
        .await;
}

/// Whether the driver may leave `phase` before its timer runs out
async fn phase_complete(handle: &SessionHandle, phase: Phase) -> bool {
    let s = handle.session.lock().await;
    if s.phase != phase {
        return true;
    }
    match phase {
        Phase::Night => s.all_required_actions_completed(),
        Phase::Voting => s.all_voted(),
        _ => false,
    }
}

/// Sleep through a phase, waking for reminders, submissions and the poll interval.
async fn wait_phase(registry: &SessionRegistry, handle: &SessionHandle, phase: Phase, span: Duration) {
    let poll = registry.config().poll_interval;
    let deadline = Instant::now() + span;
    // Descending; marks at or beyond the phase length never fire
    let mut marks: Vec<u64> = registry
        .config()
        .reminder_marks
        .iter()
        .copied()
        .filter(|m| Duration::from_secs(*m) < span)
        .collect();

    loop {
        if phase_complete(handle, phase).await {
            tracing::debug!(session = %handle.key, ?phase, "Phase complete early");
            return;
        }

        let now = Instant::now();
        if now >= deadline {
            return;
        }
        let remaining = deadline - now;

        let mut due = None;
        while let Some(&mark) = marks.first() {
            if remaining > Duration::from_secs(mark) {
                break;
            }
            due = Some(mark);
            marks.remove(0);
        }
        if let Some(seconds_left) = due {
            registry
                .courier()
                .publish(
                    &handle.key,
                    ServerMessage::Reminder {
                        session: handle.key.clone(),
                        phase,
                        seconds_left,
                    },
                )
                .await;
        }

        let mut wake_at = deadline.min(now + poll);
        if let Some(&mark) = marks.first() {
            wake_at = wake_at.min(deadline - Duration::from_secs(mark));
        }

        tokio::select! {
            _ = tokio::time::sleep_until(wake_at) => {}
            _ = handle.wake.notified() => {}
        }
    }
}
