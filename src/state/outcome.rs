use super::Session;
use crate::types::*;

impl Session {
    /// Check the win condition and end the game when one side has won.
    ///
    /// Mafia win once they are at least as many as everybody else alive,
    /// which includes an empty table. Otherwise the town wins when no mafia
    /// is left. An ended session stays ended.
    pub fn evaluate(&mut self) -> Option<Winner> {
        let (mafia, others) = self
            .living()
            .iter()
            .filter_map(|p| p.role)
            .fold((0usize, 0usize), |(mafia, others), role| match role.faction() {
                Faction::Mafia => (mafia + 1, others),
                Faction::Town => (mafia, others + 1),
            });

        let winner = if mafia >= others {
            Winner::Mafia
        } else if mafia == 0 {
            Winner::Town
        } else {
            return None;
        };

        if self.phase != Phase::Ended {
            self.phase = Phase::Ended;
            tracing::info!(session = %self.key, ?winner, mafia, others, round = self.round, "Game over");
        }
        Some(winner)
    }

    /// Everybody dealt the mafia role, dead or alive, for the final reveal
    pub fn mafia_roster(&self) -> Vec<String> {
        let mut mafia: Vec<_> = self.participants.values().filter(|p| p.is_mafia()).collect();
        mafia.sort_by_key(|p| p.id);
        mafia.iter().map(|p| p.label()).collect()
    }
}
