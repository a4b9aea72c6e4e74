//! Live sessions, keyed by chat/topic, plus the reverse index used to route
//! mafia relay messages.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;

use crate::config::GameConfig;
use crate::courier::Courier;
use crate::driver;
use crate::error::{Accepted, EngineError, Rejection};
use crate::protocol::ServerMessage;
use crate::state::Session;
use crate::types::*;

/// One live session and the machinery around it
pub struct SessionHandle {
    pub key: SessionKey,
    pub(crate) session: Mutex<Session>,
    /// Signalled by every accepted submission so the driver can re-check early exit
    pub(crate) wake: Notify,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl SessionHandle {
    fn new(key: SessionKey) -> Self {
        Self {
            session: Mutex::new(Session::new(key.clone())),
            key,
            wake: Notify::new(),
            driver: Mutex::new(None),
        }
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().await.snapshot()
    }
}

/// Listing entry for `/api/sessions`
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub key: SessionKey,
    pub phase: Phase,
    pub round: u32,
    pub seated: usize,
    pub alive: usize,
}

#[derive(Debug, Clone)]
pub struct StartReport {
    pub seated: usize,
    pub removed: Vec<Participant>,
    /// Set when forced removal already decided the game
    pub winner: Option<Winner>,
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionKey, Arc<SessionHandle>>>,
    /// living mafia id -> their session
    mafia_index: RwLock<HashMap<ParticipantId, SessionKey>>,
    config: Arc<GameConfig>,
    courier: Arc<dyn Courier>,
}

impl SessionRegistry {
    pub fn new(config: Arc<GameConfig>, courier: Arc<dyn Courier>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            mafia_index: RwLock::new(HashMap::new()),
            config,
            courier,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub(crate) fn courier(&self) -> &Arc<dyn Courier> {
        &self.courier
    }

    /// Idempotent: an existing session under `key` is returned as is
    pub async fn create_or_get(&self, key: &str) -> Arc<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(key.to_string())
            .or_insert_with(|| {
                tracing::info!(session = %key, "Session created");
                Arc::new(SessionHandle::new(key.to_string()))
            })
            .clone()
    }

    pub async fn get(&self, key: &str) -> Accepted<Arc<SessionHandle>> {
        self.sessions
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or(Rejection::SessionNotFound)
    }

    pub async fn list(&self) -> Vec<SessionInfo> {
        let handles: Vec<_> = self.sessions.read().await.values().cloned().collect();
        let mut infos = Vec::with_capacity(handles.len());
        for handle in handles {
            let s = handle.session.lock().await;
            infos.push(SessionInfo {
                key: s.key.clone(),
                phase: s.phase,
                round: s.round,
                seated: s.seated(),
                alive: s.living().len(),
            });
        }
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }

    /// Stop the driver, end the session and forget it
    pub async fn force_end(&self, key: &str) -> Accepted {
        let handle = self
            .sessions
            .write()
            .await
            .remove(key)
            .ok_or(Rejection::SessionNotFound)?;

        if let Some(task) = handle.driver.lock().await.take() {
            task.abort();
        }
        handle.session.lock().await.phase = Phase::Ended;
        self.clear_mafia_index(key).await;

        tracing::info!(session = %key, "Session force-ended");
        self.courier
            .publish(
                &handle.key,
                ServerMessage::GameEnded {
                    session: handle.key.clone(),
                },
            )
            .await;
        Ok(())
    }

    pub async fn is_startable(&self, key: &str) -> bool {
        match self.get(key).await {
            Ok(handle) => handle.session.lock().await.is_startable(),
            Err(_) => false,
        }
    }

    /// Seat a participant and announce the new lobby roster. Returns the seat count.
    pub async fn add_participant(
        &self,
        key: &str,
        id: ParticipantId,
        display_name: String,
        username: Option<String>,
    ) -> Accepted<usize> {
        let handle = self.get(key).await?;
        let (seated, participants) = {
            let mut s = handle.session.lock().await;
            s.add_participant(id, display_name, username, self.config.max_players)?;
            (s.seated(), lobby_names(&s))
        };
        self.courier
            .publish(
                &handle.key,
                ServerMessage::LobbyUpdate {
                    session: handle.key.clone(),
                    participants,
                },
            )
            .await;
        Ok(seated)
    }

    /// Unseat a lobby participant. A lobby left empty is forgotten.
    pub async fn remove_participant(&self, key: &str, id: ParticipantId) -> Accepted {
        let handle = self.get(key).await?;
        let participants = {
            let mut s = handle.session.lock().await;
            s.remove_participant(id)?;
            lobby_names(&s)
        };
        if participants.is_empty() {
            self.forget_empty_lobby(&handle).await;
        }
        self.courier
            .publish(
                &handle.key,
                ServerMessage::LobbyUpdate {
                    session: handle.key.clone(),
                    participants,
                },
            )
            .await;
        Ok(())
    }

    async fn forget_empty_lobby(&self, handle: &Arc<SessionHandle>) {
        let mut sessions = self.sessions.write().await;
        // A join may have landed since the roster was read
        let still_empty = handle.session.lock().await.seated() == 0;
        let same = sessions
            .get(&handle.key)
            .is_some_and(|current| Arc::ptr_eq(current, handle));
        if still_empty && same {
            sessions.remove(&handle.key);
            tracing::info!(session = %handle.key, "Empty lobby dropped");
        }
    }

    /// Deal roles, deliver them privately, drop whoever could not be reached,
    /// and hand the session to its driver.
    pub async fn start(self: &Arc<Self>, key: &str) -> Result<StartReport, EngineError> {
        let handle = self.get(key).await?;

        let deliveries = {
            let mut s = handle.session.lock().await;
            s.assign_roles(self.config.min_players)?;
            self.rebuild_mafia_index(&s).await;
            role_messages(&s)
        };

        let mut unreachable = Vec::new();
        for (id, msg) in deliveries {
            if !self.courier.deliver(id, msg).await {
                unreachable.push(id);
            }
        }

        // With everyone reached the one-time removal stays open for the
        // transport until the first night resolves
        let (removed, outcome) = if unreachable.is_empty() {
            (Vec::new(), conclude(&mut *handle.session.lock().await))
        } else {
            self.prune(&handle, &unreachable).await?
        };
        let seated = handle.session.lock().await.seated();

        self.courier
            .publish(
                &handle.key,
                ServerMessage::Started {
                    session: handle.key.clone(),
                    seated,
                    removed: removed.iter().map(|p| p.label()).collect(),
                },
            )
            .await;

        let winner = match outcome {
            Some((winner, mafia)) => {
                self.finish(&handle.key, winner, mafia).await;
                Some(winner)
            }
            None => {
                let task = driver::spawn(self.clone(), handle.clone());
                *handle.driver.lock().await = Some(task);
                None
            }
        };

        Ok(StartReport {
            seated,
            removed,
            winner,
        })
    }

    /// One-time removal of participants whose role could not be delivered,
    /// for transports that learn about failures after `start` returned.
    /// Open until the first night resolves.
    pub async fn remove_unreachable(
        &self,
        key: &str,
        ids: &[ParticipantId],
    ) -> Accepted<Vec<Participant>> {
        let handle = self.get(key).await?;
        let (removed, outcome) = self.prune(&handle, ids).await?;
        handle.wake.notify_one();
        if let Some((winner, mafia)) = outcome {
            if let Some(task) = handle.driver.lock().await.take() {
                task.abort();
            }
            self.finish(&handle.key, winner, mafia).await;
        }
        Ok(removed)
    }

    async fn prune(
        &self,
        handle: &SessionHandle,
        ids: &[ParticipantId],
    ) -> Accepted<(Vec<Participant>, Option<(Winner, Vec<String>)>)> {
        let mut s = handle.session.lock().await;
        let removed = s.remove_unreachable(ids)?;
        self.rebuild_mafia_index(&s).await;
        Ok((removed, conclude(&mut s)))
    }

    pub async fn submit_night_action(
        &self,
        key: &str,
        actor: ParticipantId,
        kind: ActionKind,
        target: Option<ParticipantId>,
    ) -> Accepted {
        let handle = self.get(key).await?;
        let notice = {
            let mut s = handle.session.lock().await;
            s.submit_night_action(actor, kind, target)?;
            s.all_required_actions_completed() && s.take_all_actions_notice()
        };
        handle.wake.notify_one();

        if notice {
            self.courier
                .publish(
                    &handle.key,
                    ServerMessage::AllActionsReceived {
                        session: handle.key.clone(),
                    },
                )
                .await;
        }
        Ok(())
    }

    pub async fn submit_vote(
        &self,
        key: &str,
        voter: ParticipantId,
        target: Option<ParticipantId>,
    ) -> Accepted {
        let handle = self.get(key).await?;
        handle.session.lock().await.submit_vote(voter, target)?;
        handle.wake.notify_one();
        Ok(())
    }

    pub async fn living(&self, key: &str) -> Accepted<Vec<Participant>> {
        let handle = self.get(key).await?;
        let s = handle.session.lock().await;
        Ok(s.living().into_iter().cloned().collect())
    }

    pub async fn living_with_role(&self, key: &str, role: Role) -> Accepted<Vec<Participant>> {
        let handle = self.get(key).await?;
        let s = handle.session.lock().await;
        Ok(s.living_with_role(role).into_iter().cloned().collect())
    }

    pub async fn snapshot(&self, key: &str) -> Accepted<SessionSnapshot> {
        Ok(self.get(key).await?.snapshot().await)
    }

    /// First session that has `id` seated
    pub async fn session_of(&self, id: ParticipantId) -> Option<SessionKey> {
        let handles: Vec<_> = self.sessions.read().await.values().cloned().collect();
        for handle in handles {
            if handle.session.lock().await.participant(id).is_some() {
                return Some(handle.key.clone());
            }
        }
        None
    }

    pub async fn mafia_session_for(&self, id: ParticipantId) -> Option<SessionKey> {
        self.mafia_index.read().await.get(&id).cloned()
    }

    /// Living mafia of a session other than `exclude`
    pub async fn mafia_peers(
        &self,
        key: &str,
        exclude: ParticipantId,
    ) -> Accepted<Vec<Participant>> {
        let mut mafia = self.living_with_role(key, Role::Mafia).await?;
        mafia.retain(|p| p.id != exclude);
        Ok(mafia)
    }

    /// Forward a mafia member's text to their living peers. Returns how many got it.
    pub async fn relay(&self, from: ParticipantId, text: String) -> Accepted<usize> {
        let key = self
            .mafia_session_for(from)
            .await
            .ok_or(Rejection::NotMafia)?;
        let handle = self.get(&key).await?;
        let (sender, peers) = {
            let s = handle.session.lock().await;
            let sender = s.living_participant(from)?.label();
            let peers: Vec<ParticipantId> = s
                .living_with_role(Role::Mafia)
                .iter()
                .map(|p| p.id)
                .filter(|id| *id != from)
                .collect();
            (sender, peers)
        };

        let mut delivered = 0;
        for peer in peers {
            let msg = ServerMessage::MafiaMessage {
                from: sender.clone(),
                text: text.clone(),
            };
            if self.courier.deliver(peer, msg).await {
                delivered += 1;
            }
        }
        tracing::debug!(session = %key, participant = from, delivered, "Mafia message relayed");
        Ok(delivered)
    }

    /// Replace this session's index entries with its current living mafia
    pub(crate) async fn rebuild_mafia_index(&self, session: &Session) {
        let mut index = self.mafia_index.write().await;
        index.retain(|_, key| key != &session.key);
        for p in session.living_with_role(Role::Mafia) {
            index.insert(p.id, session.key.clone());
        }
    }

    async fn clear_mafia_index(&self, key: &str) {
        self.mafia_index.write().await.retain(|_, k| k != key);
    }

    /// Announce the winner and drop the session
    pub(crate) async fn finish(&self, key: &SessionKey, winner: Winner, mafia: Vec<String>) {
        self.sessions.write().await.remove(key);
        self.clear_mafia_index(key).await;
        tracing::info!(session = %key, ?winner, "Session finished");
        self.courier
            .publish(
                key,
                ServerMessage::GameOver {
                    session: key.clone(),
                    winner,
                    mafia,
                },
            )
            .await;
    }
}

/// Evaluate the win condition, returning the winner with the mafia roster for the reveal
pub(crate) fn conclude(session: &mut Session) -> Option<(Winner, Vec<String>)> {
    let winner = session.evaluate()?;
    Some((winner, session.mafia_roster()))
}

fn lobby_names(session: &Session) -> Vec<String> {
    session
        .snapshot()
        .participants
        .iter()
        .map(|p| p.label())
        .collect()
}

fn role_messages(session: &Session) -> Vec<(ParticipantId, ServerMessage)> {
    let mafia = session.living_with_role(Role::Mafia);
    session
        .snapshot()
        .participants
        .into_iter()
        .filter_map(|p| {
            let role = p.role?;
            let mafia_peers = if role == Role::Mafia {
                mafia
                    .iter()
                    .filter(|m| m.id != p.id)
                    .map(|m| m.label())
                    .collect()
            } else {
                Vec::new()
            };
            Some((
                p.id,
                ServerMessage::RoleAssigned {
                    session: session.key.clone(),
                    role,
                    mafia_peers,
                },
            ))
        })
        .collect()
}
