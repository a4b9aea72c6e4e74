use super::night::leaders;
use super::Session;
use crate::error::{Accepted, Rejection};
use crate::types::*;
use rand::seq::IndexedRandom;

impl Session {
    fn clear_ballots(&mut self) {
        self.votes.clear();
        self.skipped_voters.clear();
        for p in self.participants.values_mut() {
            p.has_voted = false;
            p.vote_target = None;
        }
    }

    /// Day -> Voting. Last night's distraction target sits this vote out.
    pub fn open_vote(&mut self) -> Accepted {
        self.require_phase(Phase::Day)?;
        self.clear_ballots();

        if let Some(distracted) = self.last_round.distraction {
            if let Some(p) = self.participants.get_mut(&distracted).filter(|p| p.alive) {
                p.has_voted = true;
                tracing::info!(session = %self.key, participant = distracted, "Distracted, vote auto-skipped");
            }
        }

        self.phase = Phase::Voting;
        tracing::info!(session = %self.key, round = self.round, "Voting opened");
        Ok(())
    }

    /// Record a ballot, or a skip when `target` is `None`.
    pub fn submit_vote(&mut self, voter: ParticipantId, target: Option<ParticipantId>) -> Accepted {
        self.require_phase(Phase::Voting)?;
        if self.living_participant(voter)?.has_voted {
            return Err(Rejection::AlreadyVoted);
        }
        let target = match target {
            Some(_) => Some(self.living_target(voter, target)?),
            None => None,
        };

        match target {
            Some(t) => {
                self.votes.insert(voter, t);
            }
            None => {
                self.skipped_voters.insert(voter);
            }
        }
        if let Some(p) = self.participants.get_mut(&voter) {
            p.has_voted = true;
            p.vote_target = target;
        }
        tracing::info!(session = %self.key, participant = voter, target = ?target, "Vote recorded");
        Ok(())
    }

    /// Every living participant has voted or skipped
    pub fn all_voted(&self) -> bool {
        let living = self.living();
        !living.is_empty() && living.iter().all(|p| p.has_voted)
    }

    /// Tally, execute at most one participant, and move on to the next night.
    pub fn resolve_vote(&mut self) -> Accepted<(VoteSummary, Option<ParticipantId>)> {
        self.require_phase(Phase::Voting)?;

        let mut tally: Vec<(ParticipantId, u32)> = Vec::new();
        for target in self.votes.values() {
            match tally.iter_mut().find(|(id, _)| id == target) {
                Some((_, count)) => *count += 1,
                None => tally.push((*target, 1)),
            }
        }
        tally.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let (top, _) = leaders(self.votes.values());
        let chosen = top.choose(&mut rand::rng()).copied();

        let mut executed = None;
        if let Some(id) = chosen {
            if let Some(p) = self.participants.get_mut(&id) {
                p.alive = false;
                executed = Some(Casualty::from(&*p));
            }
            tracing::info!(session = %self.key, participant = id, tied = ?top, "Executed by vote");
        } else {
            tracing::info!(session = %self.key, round = self.round, "Nobody voted, no execution");
        }

        let summary = VoteSummary {
            round: self.round,
            executed,
            tied: if top.len() > 1 { top } else { Vec::new() },
            tally,
            skipped: self.skipped_voters.len(),
        };

        self.clear_ballots();
        self.phase = Phase::Night;
        self.round += 1;
        Ok((summary, chosen))
    }

    /// The first day after the first night has no vote
    pub fn first_vote_pending(&self) -> bool {
        self.phase == Phase::Day && !self.first_vote_skipped && self.round <= 1
    }

    /// Skip the very first vote: Day -> Night with a roster listing.
    ///
    /// `None` when the one-shot rule does not apply; nothing changes then.
    pub fn skip_first_vote(&mut self) -> Option<RosterSummary> {
        if !self.first_vote_pending() {
            return None;
        }

        let mut everyone: Vec<_> = self.participants.values().collect();
        everyone.sort_by_key(|p| p.id);
        let (alive, dead): (Vec<_>, Vec<_>) = everyone.into_iter().partition(|p| p.alive);
        let roster = RosterSummary {
            alive: alive.iter().map(|p| p.label()).collect(),
            dead: dead.iter().map(|p| p.label()).collect(),
        };

        self.first_vote_skipped = true;
        self.night.all_actions_notified = false;
        self.phase = Phase::Night;
        self.round += 1;
        tracing::info!(session = %self.key, round = self.round, "First vote skipped");
        Some(roster)
    }
}
