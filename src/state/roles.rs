use super::{NightLedger, Session};
use crate::error::EngineError;
use crate::types::*;
use rand::seq::SliceRandom;

/// Headcount per role for one seat count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleCounts {
    pub mafia: usize,
    pub doctor: usize,
    pub commissioner: usize,
    pub butterfly: usize,
    pub civilian: usize,
}

impl RoleCounts {
    const fn new(
        mafia: usize,
        doctor: usize,
        commissioner: usize,
        butterfly: usize,
        civilian: usize,
    ) -> Self {
        Self {
            mafia,
            doctor,
            commissioner,
            butterfly,
            civilian,
        }
    }

    pub fn total(&self) -> usize {
        self.mafia + self.doctor + self.commissioner + self.butterfly + self.civilian
    }
}

/// Seat count -> distribution, ascending by seat count
pub const ROLE_TABLE: &[(usize, RoleCounts)] = &[
    (4, RoleCounts::new(1, 1, 0, 0, 2)),
    (5, RoleCounts::new(1, 1, 1, 0, 2)),
    (6, RoleCounts::new(1, 1, 1, 0, 3)),
    (7, RoleCounts::new(2, 1, 1, 0, 3)),
    (8, RoleCounts::new(2, 1, 1, 1, 3)),
    (9, RoleCounts::new(2, 1, 1, 1, 4)),
    (10, RoleCounts::new(2, 1, 1, 1, 5)),
    (11, RoleCounts::new(3, 1, 1, 1, 5)),
    (12, RoleCounts::new(3, 1, 1, 1, 6)),
];

/// Unshuffled role tokens for `seats` participants.
///
/// Seat counts above the largest tier reuse it, padded with civilians.
pub fn role_list(seats: usize) -> Result<Vec<Role>, EngineError> {
    let (smallest, _) = ROLE_TABLE[0];
    let (largest, largest_counts) = ROLE_TABLE[ROLE_TABLE.len() - 1];

    let counts = match ROLE_TABLE.iter().find(|(n, _)| *n == seats) {
        Some((_, counts)) => *counts,
        None if seats > largest => RoleCounts {
            civilian: largest_counts.civilian + (seats - largest_counts.total()),
            ..largest_counts
        },
        None => {
            return Err(EngineError::NotEnoughPlayers {
                seated: seats,
                required: smallest,
            })
        }
    };

    let mut roles = Vec::with_capacity(counts.total());
    roles.extend(std::iter::repeat_n(Role::Mafia, counts.mafia));
    roles.extend(std::iter::repeat_n(Role::Doctor, counts.doctor));
    roles.extend(std::iter::repeat_n(Role::Commissioner, counts.commissioner));
    roles.extend(std::iter::repeat_n(Role::Butterfly, counts.butterfly));
    roles.extend(std::iter::repeat_n(Role::Civilian, counts.civilian));
    Ok(roles)
}

impl Session {
    /// Deal roles to the seated roster and enter the first night.
    ///
    /// Runs exactly once, from Lobby. On error nothing is mutated.
    pub fn assign_roles(&mut self, min_players: usize) -> Result<(), EngineError> {
        self.require_phase(Phase::Lobby)?;

        let seated = self.participants.len();
        if seated < min_players {
            tracing::warn!(
                session = %self.key,
                seated,
                min_players,
                "Starting below the recommended player count"
            );
        }

        let mut roles = role_list(seated)?;
        if roles.len() < seated {
            tracing::error!(session = %self.key, roles = roles.len(), seated, "Role list shorter than roster");
            return Err(EngineError::RoleShortfall {
                roles: roles.len(),
                seated,
            });
        }

        let mut rng = rand::rng();
        roles.shuffle(&mut rng);
        let mut ids: Vec<ParticipantId> = self.participants.keys().copied().collect();
        ids.shuffle(&mut rng);

        for (id, role) in ids.iter().zip(roles) {
            if let Some(p) = self.participants.get_mut(id) {
                p.role = Some(role);
            }
        }

        self.phase = Phase::Night;
        self.round = 1;
        self.night = NightLedger::default();

        for p in self.participants.values() {
            tracing::info!(session = %self.key, participant = p.id, role = ?p.role, "Role assigned");
        }
        tracing::info!(session = %self.key, seated, "Game started");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lobby(n: usize) -> Session {
        let mut session = Session::new("roles_0");
        for id in 1..=n as ParticipantId {
            session
                .add_participant(id, format!("P{}", id), None, 64)
                .unwrap();
        }
        session
    }

    fn histogram(roles: impl IntoIterator<Item = Role>) -> HashMap<Role, usize> {
        let mut counts = HashMap::new();
        for role in roles {
            *counts.entry(role).or_insert(0) += 1;
        }
        counts
    }

    #[test]
    fn test_table_totals_match_seats() {
        for (seats, counts) in ROLE_TABLE {
            assert_eq!(counts.total(), *seats);
            assert!(counts.mafia >= 1);
        }
    }

    #[test]
    fn test_role_list_pads_above_largest_tier() {
        let roles = role_list(15).unwrap();
        let counts = histogram(roles.iter().copied());
        assert_eq!(roles.len(), 15);
        assert_eq!(counts[&Role::Mafia], 3);
        assert_eq!(counts[&Role::Civilian], 9);
    }

    #[test]
    fn test_role_list_below_smallest_tier_fails() {
        assert_eq!(
            role_list(3),
            Err(EngineError::NotEnoughPlayers {
                seated: 3,
                required: 4
            })
        );
    }

    #[test]
    fn test_assignment_is_bijection_for_all_sizes() {
        for seats in 4..=16 {
            let mut session = lobby(seats);
            session.assign_roles(4).unwrap();

            assert_eq!(session.phase, Phase::Night);
            assert_eq!(session.round, 1);
            assert!(session.participants.values().all(|p| p.role.is_some()));

            let assigned = histogram(session.participants.values().filter_map(|p| p.role));
            let expected = histogram(role_list(seats).unwrap());
            assert_eq!(assigned, expected, "seats = {}", seats);
        }
    }

    #[test]
    fn test_assignment_requires_lobby_and_runs_once() {
        let mut session = lobby(5);
        session.assign_roles(4).unwrap();
        assert!(matches!(
            session.assign_roles(4),
            Err(EngineError::Rejected(_))
        ));
    }

    #[test]
    fn test_too_few_players_stays_in_lobby() {
        let mut session = lobby(2);
        assert!(session.assign_roles(4).is_err());
        assert_eq!(session.phase, Phase::Lobby);
        assert!(session.participants.values().all(|p| p.role.is_none()));
    }
}
