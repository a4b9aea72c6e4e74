mod night;
mod outcome;
mod resolve;
mod roles;
mod roster;
mod vote;

pub use night::{strategy, NightRole};
pub use roles::{role_list, RoleCounts, ROLE_TABLE};

use crate::error::{Accepted, Rejection};
use crate::types::*;
use std::collections::{HashMap, HashSet};

/// Working state of the current night. Emptied by the resolver.
#[derive(Debug, Clone, Default)]
pub(crate) struct NightLedger {
    /// mafia id -> target id
    pub mafia_ballots: HashMap<ParticipantId, ParticipantId>,
    /// doctor id -> target, `None` is an explicit decline
    pub doctor_saves: HashMap<ParticipantId, Option<ParticipantId>>,
    /// commissioner id -> check, result computed at submission
    pub checks: HashMap<ParticipantId, CheckOutcome>,
    pub distraction: Option<ParticipantId>,
    /// Role categories that finished acting
    pub completed: HashSet<Role>,
    /// Unique leader among the current mafia ballots, `None` on a tie
    pub provisional_kill: Option<ParticipantId>,
    pub all_actions_notified: bool,
}

/// Previous night's results kept for the following day
#[derive(Debug, Clone, Default)]
pub(crate) struct LastRound {
    pub save_targets: Vec<ParticipantId>,
    pub distraction: Option<ParticipantId>,
    pub checks: Vec<CheckOutcome>,
}

/// All mutable state of one game
#[derive(Debug, Clone)]
pub struct Session {
    pub key: SessionKey,
    pub phase: Phase,
    pub round: u32,
    pub(crate) participants: HashMap<ParticipantId, Participant>,
    pub(crate) night: NightLedger,
    /// doctor id -> last actual (non-self) save, committed when a night resolves
    pub(crate) doctor_prev_target: HashMap<ParticipantId, ParticipantId>,
    /// voter id -> target id
    pub(crate) votes: HashMap<ParticipantId, ParticipantId>,
    pub(crate) skipped_voters: HashSet<ParticipantId>,
    pub(crate) last_round: LastRound,
    pub(crate) first_vote_skipped: bool,
    pub(crate) ever_distracted: HashSet<ParticipantId>,
    pub(crate) unreachable_pruned: bool,
}

impl Session {
    pub fn new(key: impl Into<SessionKey>) -> Self {
        Self {
            key: key.into(),
            phase: Phase::Lobby,
            round: 0,
            participants: HashMap::new(),
            night: NightLedger::default(),
            doctor_prev_target: HashMap::new(),
            votes: HashMap::new(),
            skipped_voters: HashSet::new(),
            last_round: LastRound::default(),
            first_vote_skipped: false,
            ever_distracted: HashSet::new(),
            unreachable_pruned: false,
        }
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    pub fn seated(&self) -> usize {
        self.participants.len()
    }

    /// Living participants ordered by id
    pub fn living(&self) -> Vec<&Participant> {
        let mut alive: Vec<_> = self.participants.values().filter(|p| p.alive).collect();
        alive.sort_by_key(|p| p.id);
        alive
    }

    /// Living holders of a role ordered by id
    pub fn living_with_role(&self, role: Role) -> Vec<&Participant> {
        let mut holders: Vec<_> = self
            .participants
            .values()
            .filter(|p| p.alive && p.role == Some(role))
            .collect();
        holders.sort_by_key(|p| p.id);
        holders
    }

    pub fn count_alive(&self, role: Role) -> usize {
        self.participants
            .values()
            .filter(|p| p.alive && p.role == Some(role))
            .count()
    }

    pub fn is_distracted(&self, id: ParticipantId) -> bool {
        self.night.distraction == Some(id)
    }

    /// Private check results from the night that just resolved
    pub fn last_checks(&self) -> &[CheckOutcome] {
        &self.last_round.checks
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let mut participants: Vec<_> = self.participants.values().cloned().collect();
        participants.sort_by_key(|p| p.id);
        let mut ever_distracted: Vec<_> = self.ever_distracted.iter().copied().collect();
        ever_distracted.sort_unstable();

        SessionSnapshot {
            key: self.key.clone(),
            phase: self.phase,
            round: self.round,
            participants,
            first_vote_skipped: self.first_vote_skipped,
            ever_distracted,
        }
    }

    pub(crate) fn require_phase(&self, expected: Phase) -> Accepted {
        if self.phase == expected {
            Ok(())
        } else {
            Err(Rejection::WrongPhase {
                expected,
                actual: self.phase,
            })
        }
    }

    /// Look up a participant who must be alive
    pub(crate) fn living_participant(&self, id: ParticipantId) -> Accepted<&Participant> {
        let p = self
            .participants
            .get(&id)
            .ok_or(Rejection::UnknownParticipant(id))?;
        if !p.alive {
            return Err(Rejection::NotAlive(id));
        }
        Ok(p)
    }

    /// Validate a target that must be another living participant
    pub(crate) fn living_target(
        &self,
        actor: ParticipantId,
        target: Option<ParticipantId>,
    ) -> Accepted<ParticipantId> {
        let target = target.ok_or(Rejection::TargetRequired)?;
        if target == actor {
            return Err(Rejection::SelfTarget);
        }
        match self.participants.get(&target) {
            Some(p) if p.alive => Ok(target),
            Some(_) => Err(Rejection::TargetNotAlive(target)),
            None => Err(Rejection::UnknownParticipant(target)),
        }
    }

    pub(crate) fn name_of(&self, id: ParticipantId) -> String {
        self.participants
            .get(&id)
            .map(|p| p.display_name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Session already in Night with the given seating, bypassing the shuffle
    pub(crate) fn seated(roles: &[(ParticipantId, Role)]) -> Session {
        let mut session = Session::new("test_0");
        for (id, role) in roles {
            let mut p = Participant::new(*id, format!("P{}", id), None);
            p.role = Some(*role);
            session.participants.insert(*id, p);
        }
        session.phase = Phase::Night;
        session.round = 1;
        session
    }

    #[test]
    fn test_new_session_is_lobby() {
        let session = Session::new("chat_1");
        assert_eq!(session.phase, Phase::Lobby);
        assert_eq!(session.round, 0);
        assert_eq!(session.seated(), 0);
    }

    #[test]
    fn test_living_helpers() {
        let mut session = seated(&[(3, Role::Mafia), (1, Role::Civilian), (2, Role::Mafia)]);
        session.participants.get_mut(&2).unwrap().alive = false;

        let ids: Vec<_> = session.living().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(session.count_alive(Role::Mafia), 1);
        assert_eq!(session.living_with_role(Role::Mafia)[0].id, 3);
    }

    #[test]
    fn test_living_target_validation() {
        let mut session = seated(&[(1, Role::Mafia), (2, Role::Civilian), (3, Role::Civilian)]);
        session.participants.get_mut(&3).unwrap().alive = false;

        assert_eq!(session.living_target(1, Some(2)), Ok(2));
        assert_eq!(session.living_target(1, Some(1)), Err(Rejection::SelfTarget));
        assert_eq!(
            session.living_target(1, Some(3)),
            Err(Rejection::TargetNotAlive(3))
        );
        assert_eq!(
            session.living_target(1, Some(9)),
            Err(Rejection::UnknownParticipant(9))
        );
        assert_eq!(session.living_target(1, None), Err(Rejection::TargetRequired));
    }

    #[test]
    fn test_snapshot_redaction() {
        let mut session = seated(&[(1, Role::Mafia), (2, Role::Civilian)]);
        session.participants.get_mut(&2).unwrap().alive = false;

        let snap = session.snapshot().redacted();
        assert_eq!(snap.participants[0].role, None);
        assert_eq!(snap.participants[1].role, Some(Role::Civilian));

        session.phase = Phase::Ended;
        let snap = session.snapshot().redacted();
        assert_eq!(snap.participants[0].role, Some(Role::Mafia));
    }
}
