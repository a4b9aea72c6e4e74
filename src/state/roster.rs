use super::night::leaders;
use super::Session;
use crate::error::{Accepted, Rejection};
use crate::types::*;

impl Session {
    /// Seat a participant. Lobby only.
    pub fn add_participant(
        &mut self,
        id: ParticipantId,
        display_name: String,
        username: Option<String>,
        max_players: usize,
    ) -> Accepted {
        self.require_phase(Phase::Lobby)?;

        if self.participants.contains_key(&id) {
            return Err(Rejection::AlreadySeated(id));
        }
        if self.participants.len() >= max_players {
            return Err(Rejection::LobbyFull(max_players));
        }

        self.participants
            .insert(id, Participant::new(id, display_name, username));
        tracing::info!(
            session = %self.key,
            participant = id,
            seated = self.participants.len(),
            "Participant joined"
        );
        Ok(())
    }

    /// Voluntary leave. Lobby only.
    pub fn remove_participant(&mut self, id: ParticipantId) -> Accepted<Participant> {
        self.require_phase(Phase::Lobby)?;

        let removed = self
            .participants
            .remove(&id)
            .ok_or(Rejection::UnknownParticipant(id))?;
        tracing::info!(session = %self.key, participant = id, "Participant left");
        Ok(removed)
    }

    /// Drop participants who could not be reached with their role.
    ///
    /// Allowed once, right after assignment (first night), and never re-deals roles.
    pub fn remove_unreachable(&mut self, ids: &[ParticipantId]) -> Accepted<Vec<Participant>> {
        self.require_phase(Phase::Night)?;
        if self.round != 1 || self.unreachable_pruned {
            return Err(Rejection::AlreadyPruned);
        }
        self.unreachable_pruned = true;

        let removed: Vec<Participant> = ids
            .iter()
            .filter_map(|id| self.participants.remove(id))
            .collect();

        for p in &removed {
            tracing::info!(
                session = %self.key,
                participant = p.id,
                role = ?p.role,
                "Removed unreachable participant"
            );
        }
        if !removed.is_empty() {
            self.forget_night_references();
        }
        Ok(removed)
    }

    /// Drop every recorded night action made by or aimed at someone no longer seated
    fn forget_night_references(&mut self) {
        let seated = |id: &ParticipantId| self.participants.contains_key(id);

        let ballots: Vec<_> = self
            .night
            .mafia_ballots
            .iter()
            .filter(|(actor, target)| seated(actor) && seated(target))
            .map(|(actor, target)| (*actor, *target))
            .collect();
        let saves: Vec<_> = self
            .night
            .doctor_saves
            .iter()
            .filter(|(actor, target)| seated(actor) && target.map_or(true, |t| seated(&t)))
            .map(|(actor, target)| (*actor, *target))
            .collect();
        let checks: Vec<_> = self
            .night
            .checks
            .iter()
            .filter(|(actor, check)| seated(actor) && seated(&check.target))
            .map(|(actor, check)| (*actor, check.clone()))
            .collect();
        let distraction_lost = self.night.distraction.is_some_and(|t| !seated(&t));

        self.night.mafia_ballots = ballots.into_iter().collect();
        self.night.doctor_saves = saves.into_iter().collect();
        self.night.checks = checks.into_iter().collect();
        if distraction_lost {
            self.night.distraction = None;
            self.night.completed.remove(&Role::Butterfly);
        }
        self.ever_distracted.retain(|id| self.participants.contains_key(id));

        let (top, _) = leaders(self.night.mafia_ballots.values());
        self.night.provisional_kill = match top.as_slice() {
            [single] => Some(*single),
            _ => None,
        };
        // Whoever lost their action to the removal has to act again
        if !self.mafia_ballots_complete() {
            self.night.completed.remove(&Role::Mafia);
        }
        if self.night.doctor_saves.is_empty() {
            self.night.completed.remove(&Role::Doctor);
        }
        if self.night.checks.is_empty() {
            self.night.completed.remove(&Role::Commissioner);
        }
    }

    /// At least one seat taken and still in Lobby
    pub fn is_startable(&self) -> bool {
        !self.participants.is_empty() && self.phase == Phase::Lobby
    }
}
