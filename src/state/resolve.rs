use super::night::leaders;
use super::{LastRound, NightLedger, Session};
use crate::error::Accepted;
use crate::types::*;
use rand::seq::IndexedRandom;

impl Session {
    /// Fold the night's actions into one outcome and move to Day.
    ///
    /// Returns the public summary and the id of whoever died, if anybody.
    pub fn resolve_night(&mut self) -> Accepted<(NightSummary, Option<ParticipantId>)> {
        self.require_phase(Phase::Night)?;
        let mut rng = rand::rng();

        // Distraction voids whatever the distracted participant already did
        if let Some(d) = self.night.distraction {
            self.night.mafia_ballots.remove(&d);
            if self.night.doctor_saves.remove(&d) == Some(Some(d)) {
                self.refund_self_heal(d);
            }
            self.night.checks.remove(&d);
        }

        let mut checks: Vec<CheckOutcome> = self.night.checks.values().cloned().collect();
        checks.sort_by_key(|c| c.commissioner);
        let mut save_targets: Vec<ParticipantId> =
            self.night.doctor_saves.values().flatten().copied().collect();
        save_targets.sort_unstable();
        self.last_round = LastRound {
            save_targets: save_targets.clone(),
            distraction: self.night.distraction,
            checks,
        };

        // Majority is always recomputed here; the provisional leader is advisory
        let mafia_present = self.count_alive(Role::Mafia) > 0;
        let mut no_target = false;
        let kill_target = if !self.night.mafia_ballots.is_empty() {
            let (top, votes) = leaders(self.night.mafia_ballots.values());
            let chosen = top.choose(&mut rng).copied();
            if top.len() > 1 {
                tracing::info!(session = %self.key, tied = ?top, votes, chosen = ?chosen, "Mafia ballots tied, picked at random");
            }
            chosen
        } else if !self.active_mafia().is_empty() {
            let candidates: Vec<ParticipantId> = self
                .living()
                .into_iter()
                .filter(|p| !p.is_mafia())
                .map(|p| p.id)
                .collect();
            let chosen = candidates.choose(&mut rng).copied();
            match chosen {
                Some(id) => tracing::info!(session = %self.key, target = id, "Mafia cast no ballot, random target"),
                None => no_target = true,
            }
            chosen
        } else {
            None
        };

        let saved = kill_target.is_some_and(|t| save_targets.contains(&t));

        let mut eliminated = None;
        let mut survivor = None;
        if let Some(target) = kill_target {
            if saved {
                survivor = Some(self.name_of(target));
                tracing::info!(session = %self.key, target, "Kill prevented by doctor");
            } else if let Some(victim) = self.participants.get_mut(&target).filter(|p| p.alive) {
                victim.alive = false;
                tracing::info!(session = %self.key, target, role = ?victim.role, "Killed at night");
                eliminated = Some(Casualty::from(&*victim));
            }
        }

        for (doctor, save) in &self.night.doctor_saves {
            if let Some(t) = save.filter(|t| t != doctor) {
                self.doctor_prev_target.insert(*doctor, t);
            }
        }

        let summary = NightSummary {
            round: self.round,
            eliminated: eliminated.clone(),
            survivor,
            healed: save_targets.iter().map(|id| self.name_of(*id)).collect(),
            no_target,
            quiet_night: !mafia_present,
            commissioner_found_mafia: (!self.last_round.checks.is_empty())
                .then(|| self.last_round.checks.iter().any(|c| c.is_mafia)),
            distracted: self.last_round.distraction.map(|id| self.name_of(id)),
        };

        self.night = NightLedger::default();
        self.phase = Phase::Day;
        tracing::info!(session = %self.key, round = self.round, "Night resolved");

        Ok((summary, eliminated.map(|c| c.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::seated;

    fn five() -> Session {
        seated(&[
            (1, Role::Mafia),
            (2, Role::Doctor),
            (3, Role::Commissioner),
            (4, Role::Civilian),
            (5, Role::Civilian),
        ])
    }

    #[test]
    fn test_majority_kill() {
        let mut session = seated(&[
            (1, Role::Mafia),
            (2, Role::Mafia),
            (3, Role::Mafia),
            (4, Role::Civilian),
            (5, Role::Civilian),
        ]);
        session.submit_night_action(1, ActionKind::MafiaKill, Some(4)).unwrap();
        session.submit_night_action(2, ActionKind::MafiaKill, Some(4)).unwrap();
        session.submit_night_action(3, ActionKind::MafiaKill, Some(5)).unwrap();

        let (summary, killed) = session.resolve_night().unwrap();
        assert_eq!(killed, Some(4));
        assert_eq!(summary.eliminated.unwrap().role, Some(Role::Civilian));
        assert!(!session.participant(4).unwrap().alive);
        assert_eq!(session.phase, Phase::Day);
    }

    #[test]
    fn test_tie_is_broken_roughly_uniformly() {
        let mut hits = [0u32; 2];
        for _ in 0..400 {
            let mut session = seated(&[
                (1, Role::Mafia),
                (2, Role::Mafia),
                (3, Role::Civilian),
                (4, Role::Civilian),
                (5, Role::Civilian),
            ]);
            session.submit_night_action(1, ActionKind::MafiaKill, Some(3)).unwrap();
            session.submit_night_action(2, ActionKind::MafiaKill, Some(4)).unwrap();
            match session.resolve_night().unwrap().1 {
                Some(3) => hits[0] += 1,
                Some(4) => hits[1] += 1,
                other => panic!("unexpected victim {:?}", other),
            }
        }
        assert!(hits[0] > 120 && hits[1] > 120, "skewed: {:?}", hits);
    }

    #[test]
    fn test_doctor_save_prevents_kill() {
        let mut session = five();
        session.submit_night_action(1, ActionKind::MafiaKill, Some(4)).unwrap();
        session.submit_night_action(2, ActionKind::DoctorSave, Some(4)).unwrap();

        let (summary, killed) = session.resolve_night().unwrap();
        assert_eq!(killed, None);
        assert!(summary.eliminated.is_none());
        assert_eq!(summary.survivor.as_deref(), Some("P4"));
        assert_eq!(summary.healed, vec!["P4".to_string()]);
        assert!(session.participant(4).unwrap().alive);
    }

    #[test]
    fn test_silent_mafia_gets_random_non_mafia_target() {
        let mut session = five();
        let (summary, killed) = session.resolve_night().unwrap();
        let victim = killed.unwrap();
        assert_ne!(victim, 1);
        assert!(!summary.quiet_night);
    }

    #[test]
    fn test_no_mafia_means_quiet_night() {
        let mut session = five();
        session.participants.get_mut(&1).unwrap().alive = false;
        let (summary, killed) = session.resolve_night().unwrap();
        assert_eq!(killed, None);
        assert!(summary.quiet_night);
    }

    #[test]
    fn test_mafia_without_candidates_reports_no_target() {
        let mut session = seated(&[(1, Role::Mafia), (2, Role::Mafia)]);
        let (summary, killed) = session.resolve_night().unwrap();
        assert_eq!(killed, None);
        assert!(summary.no_target);
    }

    #[test]
    fn test_distracted_ballot_is_voided() {
        let mut session = seated(&[
            (1, Role::Mafia),
            (2, Role::Butterfly),
            (3, Role::Civilian),
            (4, Role::Civilian),
        ]);
        session.submit_night_action(1, ActionKind::MafiaKill, Some(3)).unwrap();
        session
            .submit_night_action(2, ActionKind::ButterflyDistract, Some(1))
            .unwrap();

        let (summary, killed) = session.resolve_night().unwrap();
        assert_eq!(killed, None);
        assert_eq!(summary.distracted.as_deref(), Some("P1"));
        assert_eq!(session.last_round.distraction, Some(1));
    }

    #[test]
    fn test_distracted_self_heal_is_not_spent() {
        let mut session = seated(&[
            (1, Role::Mafia),
            (2, Role::Doctor),
            (3, Role::Butterfly),
            (4, Role::Civilian),
            (5, Role::Civilian),
        ]);
        session.submit_night_action(2, ActionKind::DoctorSave, Some(2)).unwrap();
        session
            .submit_night_action(3, ActionKind::ButterflyDistract, Some(2))
            .unwrap();
        session.submit_night_action(1, ActionKind::MafiaKill, Some(4)).unwrap();

        let (summary, _) = session.resolve_night().unwrap();
        assert!(summary.healed.is_empty());
        assert!(!session.participant(2).unwrap().self_heal_used);

        session.phase = Phase::Night;
        session.submit_night_action(2, ActionKind::DoctorSave, Some(2)).unwrap();
        session.submit_night_action(1, ActionKind::MafiaKill, Some(5)).unwrap();
        session.resolve_night().unwrap();
        assert!(session.participant(2).unwrap().self_heal_used);
    }

    #[test]
    fn test_commissioner_result_is_anonymous_in_summary() {
        let mut session = five();
        session
            .submit_night_action(3, ActionKind::CommissionerCheck, Some(1))
            .unwrap();
        session.submit_night_action(1, ActionKind::MafiaKill, Some(5)).unwrap();

        let (summary, _) = session.resolve_night().unwrap();
        assert_eq!(summary.commissioner_found_mafia, Some(true));
        let checks = session.last_checks();
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].target, 1);
    }

    #[test]
    fn test_working_state_cleared_and_prev_save_committed() {
        let mut session = five();
        session.submit_night_action(1, ActionKind::MafiaKill, Some(5)).unwrap();
        session.submit_night_action(2, ActionKind::DoctorSave, Some(4)).unwrap();
        session.resolve_night().unwrap();

        assert!(session.night.mafia_ballots.is_empty());
        assert!(session.night.doctor_saves.is_empty());
        assert!(session.night.completed.is_empty());
        assert_eq!(session.night.provisional_kill, None);
        assert_eq!(session.doctor_prev_target.get(&2), Some(&4));

        // Next night: 4 again is refused, a decline then 4 is still refused
        session.phase = Phase::Night;
        assert!(session
            .submit_night_action(2, ActionKind::DoctorSave, Some(4))
            .is_err());
        session.submit_night_action(2, ActionKind::DoctorSave, None).unwrap();
        session.submit_night_action(1, ActionKind::MafiaKill, Some(3)).unwrap();
        session.resolve_night().unwrap();
        session.phase = Phase::Night;
        assert_eq!(
            session.submit_night_action(2, ActionKind::DoctorSave, Some(4)),
            Err(crate::error::Rejection::RepeatSave(4))
        );
    }

    #[test]
    fn test_resolve_requires_night() {
        let mut session = five();
        session.phase = Phase::Voting;
        assert!(session.resolve_night().is_err());
    }
}
