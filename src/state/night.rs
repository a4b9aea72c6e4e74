//! Night arbitration: validating and recording each role's nightly action.
//!
//! Shared preconditions (phase, living actor, distraction, role) are checked
//! once in [`Session::submit_night_action`]; role-specific rules live in one
//! [`NightRole`] implementation per action.

use super::Session;
use crate::error::{Accepted, Rejection};
use crate::types::*;
use std::collections::HashMap;

/// Role-specific validation and recording of a night action
pub trait NightRole: Sync {
    fn kind(&self) -> ActionKind;

    /// Called with the shared preconditions already satisfied.
    /// Must not mutate the session when it returns an error.
    fn record(
        &self,
        session: &mut Session,
        actor: ParticipantId,
        target: Option<ParticipantId>,
    ) -> Accepted;
}

struct MafiaKill;
struct DoctorSave;
struct CommissionerCheck;
struct ButterflyDistract;

static MAFIA_KILL: MafiaKill = MafiaKill;
static DOCTOR_SAVE: DoctorSave = DoctorSave;
static COMMISSIONER_CHECK: CommissionerCheck = CommissionerCheck;
static BUTTERFLY_DISTRACT: ButterflyDistract = ButterflyDistract;

/// Strategy table: one implementation per action kind
pub fn strategy(kind: ActionKind) -> &'static dyn NightRole {
    match kind {
        ActionKind::MafiaKill => &MAFIA_KILL,
        ActionKind::DoctorSave => &DOCTOR_SAVE,
        ActionKind::CommissionerCheck => &COMMISSIONER_CHECK,
        ActionKind::ButterflyDistract => &BUTTERFLY_DISTRACT,
    }
}

/// Candidates with the highest count, ascending by id, and that count
pub(crate) fn leaders<'a>(
    ballots: impl IntoIterator<Item = &'a ParticipantId>,
) -> (Vec<ParticipantId>, u32) {
    let mut tally: HashMap<ParticipantId, u32> = HashMap::new();
    for target in ballots {
        *tally.entry(*target).or_insert(0) += 1;
    }
    let max = tally.values().copied().max().unwrap_or(0);
    let mut top: Vec<_> = tally
        .into_iter()
        .filter(|(_, count)| *count == max)
        .map(|(id, _)| id)
        .collect();
    top.sort_unstable();
    (top, max)
}

impl NightRole for MafiaKill {
    fn kind(&self) -> ActionKind {
        ActionKind::MafiaKill
    }

    fn record(
        &self,
        session: &mut Session,
        actor: ParticipantId,
        target: Option<ParticipantId>,
    ) -> Accepted {
        let target = session.living_target(actor, target)?;
        session.night.mafia_ballots.insert(actor, target);

        // Ties stay unresolved until the night resolves
        let (top, _) = leaders(session.night.mafia_ballots.values());
        session.night.provisional_kill = match top.as_slice() {
            [single] => Some(*single),
            _ => None,
        };

        if session.mafia_ballots_complete() {
            session.night.completed.insert(Role::Mafia);
        }
        Ok(())
    }
}

impl NightRole for DoctorSave {
    fn kind(&self) -> ActionKind {
        ActionKind::DoctorSave
    }

    fn record(
        &self,
        session: &mut Session,
        actor: ParticipantId,
        target: Option<ParticipantId>,
    ) -> Accepted {
        match target {
            None => {}
            Some(t) if t == actor => {
                let doctor = session
                    .participants
                    .get_mut(&actor)
                    .ok_or(Rejection::UnknownParticipant(actor))?;
                if doctor.self_heal_used {
                    return Err(Rejection::SelfHealUsed);
                }
                doctor.self_heal_used = true;
            }
            Some(_) => {
                let t = session.living_target(actor, target)?;
                if session.doctor_prev_target.get(&actor) == Some(&t) {
                    return Err(Rejection::RepeatSave(t));
                }
            }
        }

        // Switching away from tonight's self-heal gives it back
        if target != Some(actor) && session.night.doctor_saves.get(&actor) == Some(&Some(actor)) {
            session.refund_self_heal(actor);
        }
        session.night.doctor_saves.insert(actor, target);
        session.night.completed.insert(Role::Doctor);
        Ok(())
    }
}

impl NightRole for CommissionerCheck {
    fn kind(&self) -> ActionKind {
        ActionKind::CommissionerCheck
    }

    fn record(
        &self,
        session: &mut Session,
        actor: ParticipantId,
        target: Option<ParticipantId>,
    ) -> Accepted {
        let target = session.living_target(actor, target)?;
        if session.night.checks.contains_key(&actor) {
            return Err(Rejection::AlreadyActed);
        }
        if session.night.checks.values().any(|c| c.target == target) {
            return Err(Rejection::AlreadyChecked(target));
        }

        let subject = session
            .participants
            .get(&target)
            .ok_or(Rejection::UnknownParticipant(target))?;
        let outcome = CheckOutcome {
            commissioner: actor,
            target,
            target_name: subject.display_name.clone(),
            is_mafia: subject.is_mafia(),
        };
        session.night.checks.insert(actor, outcome);
        session.night.completed.insert(Role::Commissioner);
        Ok(())
    }
}

impl NightRole for ButterflyDistract {
    fn kind(&self) -> ActionKind {
        ActionKind::ButterflyDistract
    }

    fn record(
        &self,
        session: &mut Session,
        actor: ParticipantId,
        target: Option<ParticipantId>,
    ) -> Accepted {
        let target = match target {
            None => None,
            Some(_) => Some(session.living_target(actor, target)?),
        };

        session.night.distraction = target;
        if let Some(t) = target {
            session.ever_distracted.insert(t);
        }
        session.night.completed.insert(Role::Butterfly);
        Ok(())
    }
}

impl Session {
    /// Validate and record one night action.
    pub fn submit_night_action(
        &mut self,
        actor: ParticipantId,
        kind: ActionKind,
        target: Option<ParticipantId>,
    ) -> Accepted {
        let result = self.check_and_record(actor, kind, target);
        match &result {
            Ok(()) => tracing::info!(
                session = %self.key,
                participant = actor,
                round = self.round,
                action = ?kind,
                target = ?target,
                "Night action recorded"
            ),
            Err(e) => tracing::warn!(
                session = %self.key,
                participant = actor,
                action = ?kind,
                "Night action rejected: {}",
                e
            ),
        }
        result
    }

    fn check_and_record(
        &mut self,
        actor: ParticipantId,
        kind: ActionKind,
        target: Option<ParticipantId>,
    ) -> Accepted {
        self.require_phase(Phase::Night)?;
        let player = self.living_participant(actor)?;
        if self.is_distracted(actor) {
            return Err(Rejection::Distracted(actor));
        }
        if player.role.and_then(Role::night_action) != Some(kind) {
            return Err(Rejection::WrongRole(kind.role()));
        }
        strategy(kind).record(self, actor, target)
    }

    /// Living mafia who are able to act tonight
    pub(crate) fn active_mafia(&self) -> Vec<ParticipantId> {
        self.living_with_role(Role::Mafia)
            .into_iter()
            .filter(|p| !self.is_distracted(p.id))
            .map(|p| p.id)
            .collect()
    }

    pub(crate) fn mafia_ballots_complete(&self) -> bool {
        self.active_mafia()
            .iter()
            .all(|id| self.night.mafia_ballots.contains_key(id))
    }

    /// Every role category with a living, undistracted holder has acted.
    pub fn all_required_actions_completed(&self) -> bool {
        [Role::Mafia, Role::Doctor, Role::Commissioner, Role::Butterfly]
            .into_iter()
            .all(|role| {
                let can_act = self
                    .living_with_role(role)
                    .iter()
                    .any(|p| !self.is_distracted(p.id));
                if !can_act {
                    return true;
                }
                match role {
                    Role::Mafia => self.mafia_ballots_complete(),
                    _ => self.night.completed.contains(&role),
                }
            })
    }

    /// True exactly once per night, the first time every action is in
    pub fn take_all_actions_notice(&mut self) -> bool {
        if self.phase != Phase::Night
            || self.night.all_actions_notified
            || !self.all_required_actions_completed()
        {
            return false;
        }
        self.night.all_actions_notified = true;
        true
    }

    pub(crate) fn refund_self_heal(&mut self, doctor: ParticipantId) {
        if let Some(p) = self.participants.get_mut(&doctor) {
            p.self_heal_used = false;
        }
    }

    /// Current unique leader among mafia ballots, if any
    pub fn provisional_kill(&self) -> Option<ParticipantId> {
        self.night.provisional_kill
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::seated;

    fn table() -> Session {
        seated(&[
            (1, Role::Mafia),
            (2, Role::Mafia),
            (3, Role::Doctor),
            (4, Role::Commissioner),
            (5, Role::Butterfly),
            (6, Role::Civilian),
            (7, Role::Civilian),
        ])
    }

    #[test]
    fn test_strategy_table_covers_every_kind() {
        for kind in [
            ActionKind::MafiaKill,
            ActionKind::DoctorSave,
            ActionKind::CommissionerCheck,
            ActionKind::ButterflyDistract,
        ] {
            assert_eq!(strategy(kind).kind(), kind);
        }
    }

    #[test]
    fn test_shared_preconditions() {
        let mut session = table();
        assert_eq!(
            session.submit_night_action(6, ActionKind::MafiaKill, Some(7)),
            Err(Rejection::WrongRole(Role::Mafia))
        );
        assert_eq!(
            session.submit_night_action(42, ActionKind::MafiaKill, Some(7)),
            Err(Rejection::UnknownParticipant(42))
        );

        session.participants.get_mut(&1).unwrap().alive = false;
        assert_eq!(
            session.submit_night_action(1, ActionKind::MafiaKill, Some(7)),
            Err(Rejection::NotAlive(1))
        );

        session.phase = Phase::Day;
        assert!(matches!(
            session.submit_night_action(2, ActionKind::MafiaKill, Some(7)),
            Err(Rejection::WrongPhase { .. })
        ));
    }

    #[test]
    fn test_no_self_targeting() {
        let mut session = table();
        for (actor, kind) in [
            (1, ActionKind::MafiaKill),
            (4, ActionKind::CommissionerCheck),
            (5, ActionKind::ButterflyDistract),
        ] {
            assert_eq!(
                session.submit_night_action(actor, kind, Some(actor)),
                Err(Rejection::SelfTarget)
            );
        }
        assert!(session.night.mafia_ballots.is_empty());
        assert!(session.night.checks.is_empty());
        assert_eq!(session.night.distraction, None);
    }

    #[test]
    fn test_mafia_completes_when_every_member_voted() {
        let mut session = table();
        session
            .submit_night_action(1, ActionKind::MafiaKill, Some(6))
            .unwrap();
        assert!(!session.night.completed.contains(&Role::Mafia));
        assert_eq!(session.provisional_kill(), Some(6));

        session
            .submit_night_action(2, ActionKind::MafiaKill, Some(7))
            .unwrap();
        assert!(session.night.completed.contains(&Role::Mafia));
        // 1:1 tie is left for the resolver
        assert_eq!(session.provisional_kill(), None);
    }

    #[test]
    fn test_mafia_cannot_kill_the_dead() {
        let mut session = table();
        session.participants.get_mut(&6).unwrap().alive = false;
        assert_eq!(
            session.submit_night_action(1, ActionKind::MafiaKill, Some(6)),
            Err(Rejection::TargetNotAlive(6))
        );
    }

    #[test]
    fn test_doctor_self_heal_once_per_session() {
        let mut session = table();
        session
            .submit_night_action(3, ActionKind::DoctorSave, Some(3))
            .unwrap();
        assert!(session.participant(3).unwrap().self_heal_used);
        assert_eq!(
            session.submit_night_action(3, ActionKind::DoctorSave, Some(3)),
            Err(Rejection::SelfHealUsed)
        );
    }

    #[test]
    fn test_doctor_changing_mind_keeps_self_heal() {
        let mut session = table();
        session
            .submit_night_action(3, ActionKind::DoctorSave, Some(3))
            .unwrap();
        session
            .submit_night_action(3, ActionKind::DoctorSave, Some(6))
            .unwrap();
        assert!(!session.participant(3).unwrap().self_heal_used);

        session
            .submit_night_action(3, ActionKind::DoctorSave, Some(3))
            .unwrap();
        assert_eq!(session.night.doctor_saves.get(&3), Some(&Some(3)));
    }

    #[test]
    fn test_doctor_repeat_save_rejected() {
        let mut session = table();
        session.doctor_prev_target.insert(3, 6);

        assert_eq!(
            session.submit_night_action(3, ActionKind::DoctorSave, Some(6)),
            Err(Rejection::RepeatSave(6))
        );
        session
            .submit_night_action(3, ActionKind::DoctorSave, Some(7))
            .unwrap();
        assert_eq!(session.night.doctor_saves.get(&3), Some(&Some(7)));
    }

    #[test]
    fn test_doctor_decline_completes() {
        let mut session = table();
        session
            .submit_night_action(3, ActionKind::DoctorSave, None)
            .unwrap();
        assert_eq!(session.night.doctor_saves.get(&3), Some(&None));
        assert!(session.night.completed.contains(&Role::Doctor));
    }

    #[test]
    fn test_commissioner_one_check_per_night() {
        let mut session = table();
        session
            .submit_night_action(4, ActionKind::CommissionerCheck, Some(1))
            .unwrap();
        assert!(session.night.checks[&4].is_mafia);
        assert_eq!(
            session.submit_night_action(4, ActionKind::CommissionerCheck, Some(6)),
            Err(Rejection::AlreadyActed)
        );
    }

    #[test]
    fn test_second_commissioner_cannot_recheck_target() {
        let mut session = seated(&[
            (1, Role::Mafia),
            (2, Role::Commissioner),
            (3, Role::Commissioner),
            (4, Role::Civilian),
        ]);
        session
            .submit_night_action(2, ActionKind::CommissionerCheck, Some(4))
            .unwrap();
        assert_eq!(
            session.submit_night_action(3, ActionKind::CommissionerCheck, Some(4)),
            Err(Rejection::AlreadyChecked(4))
        );
        session
            .submit_night_action(3, ActionKind::CommissionerCheck, Some(1))
            .unwrap();
    }

    #[test]
    fn test_butterfly_last_write_wins_and_blocks_target() {
        let mut session = table();
        session
            .submit_night_action(5, ActionKind::ButterflyDistract, Some(4))
            .unwrap();
        assert_eq!(
            session.submit_night_action(4, ActionKind::CommissionerCheck, Some(1)),
            Err(Rejection::Distracted(4))
        );

        session
            .submit_night_action(5, ActionKind::ButterflyDistract, Some(3))
            .unwrap();
        assert_eq!(session.night.distraction, Some(3));
        session
            .submit_night_action(4, ActionKind::CommissionerCheck, Some(1))
            .unwrap();

        session
            .submit_night_action(5, ActionKind::ButterflyDistract, None)
            .unwrap();
        assert_eq!(session.night.distraction, None);
        assert_eq!(session.ever_distracted.len(), 2);
    }

    #[test]
    fn test_all_required_actions() {
        let mut session = table();
        assert!(!session.all_required_actions_completed());

        session.submit_night_action(1, ActionKind::MafiaKill, Some(6)).unwrap();
        session.submit_night_action(2, ActionKind::MafiaKill, Some(6)).unwrap();
        session.submit_night_action(3, ActionKind::DoctorSave, None).unwrap();
        session
            .submit_night_action(4, ActionKind::CommissionerCheck, Some(7))
            .unwrap();
        assert!(!session.all_required_actions_completed());

        session
            .submit_night_action(5, ActionKind::ButterflyDistract, None)
            .unwrap();
        assert!(session.all_required_actions_completed());
        assert!(session.take_all_actions_notice());
        assert!(!session.take_all_actions_notice());
    }

    #[test]
    fn test_absent_categories_are_vacuous() {
        let mut session = seated(&[(1, Role::Mafia), (2, Role::Civilian), (3, Role::Doctor)]);
        session.participants.get_mut(&3).unwrap().alive = false;

        session.submit_night_action(1, ActionKind::MafiaKill, Some(2)).unwrap();
        assert!(session.all_required_actions_completed());
    }

    #[test]
    fn test_distracted_mafia_does_not_hold_up_the_night() {
        let mut session = seated(&[
            (1, Role::Mafia),
            (2, Role::Mafia),
            (3, Role::Butterfly),
            (4, Role::Civilian),
        ]);
        session
            .submit_night_action(3, ActionKind::ButterflyDistract, Some(2))
            .unwrap();
        session.submit_night_action(1, ActionKind::MafiaKill, Some(4)).unwrap();
        assert!(session.all_required_actions_completed());
    }

    #[test]
    fn test_leaders_tally() {
        let (top, max) = leaders(&[5, 5, 6]);
        assert_eq!((top, max), (vec![5], 2));
        let (top, max) = leaders(&[6, 5]);
        assert_eq!((top, max), (vec![5, 6], 1));
        let (top, max) = leaders(&[]);
        assert!(top.is_empty());
        assert_eq!(max, 0);
    }
}
