use serde::{Deserialize, Serialize};

/// Opaque ID types
pub type ParticipantId = i64;
/// Session key: chat/topic composite, e.g. `"-100123_0"`
pub type SessionKey = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Lobby,
    Night,
    Day,
    Voting,
    Ended,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Mafia,
    Civilian,
    Doctor,
    Commissioner,
    Butterfly,
}

impl Role {
    /// Night action this role performs, if any
    pub fn night_action(self) -> Option<ActionKind> {
        match self {
            Role::Mafia => Some(ActionKind::MafiaKill),
            Role::Doctor => Some(ActionKind::DoctorSave),
            Role::Commissioner => Some(ActionKind::CommissionerCheck),
            Role::Butterfly => Some(ActionKind::ButterflyDistract),
            Role::Civilian => None,
        }
    }

    pub fn faction(self) -> Faction {
        match self {
            Role::Mafia => Faction::Mafia,
            _ => Faction::Town,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    MafiaKill,
    DoctorSave,
    CommissionerCheck,
    ButterflyDistract,
}

impl ActionKind {
    /// Role that may submit this action. Also names the completion category.
    pub fn role(self) -> Role {
        match self {
            ActionKind::MafiaKill => Role::Mafia,
            ActionKind::DoctorSave => Role::Doctor,
            ActionKind::CommissionerCheck => Role::Commissioner,
            ActionKind::ButterflyDistract => Role::Butterfly,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Faction {
    Mafia,
    Town,
}

/// A seated participant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub id: ParticipantId,
    pub username: Option<String>,
    pub display_name: String,
    pub role: Option<Role>,
    pub alive: bool,
    pub has_voted: bool,
    pub vote_target: Option<ParticipantId>,
    /// Lifetime flag, doctor only
    pub self_heal_used: bool,
}

impl Participant {
    pub fn new(id: ParticipantId, display_name: String, username: Option<String>) -> Self {
        Self {
            id,
            username,
            display_name,
            role: None,
            alive: true,
            has_voted: false,
            vote_target: None,
            self_heal_used: false,
        }
    }

    /// Name with `@username` suffix when known, as used in roster listings
    pub fn label(&self) -> String {
        match &self.username {
            Some(u) => format!("{} (@{})", self.display_name, u),
            None => self.display_name.clone(),
        }
    }

    pub fn is_mafia(&self) -> bool {
        self.role == Some(Role::Mafia)
    }
}

/// Somebody removed from play by the night kill or the day vote
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Casualty {
    pub id: ParticipantId,
    pub display_name: String,
    pub role: Option<Role>,
}

impl From<&Participant> for Casualty {
    fn from(p: &Participant) -> Self {
        Self {
            id: p.id,
            display_name: p.display_name.clone(),
            role: p.role,
        }
    }
}

/// One commissioner's check, private to that commissioner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckOutcome {
    pub commissioner: ParticipantId,
    pub target: ParticipantId,
    pub target_name: String,
    pub is_mafia: bool,
}

/// Public outcome of a night, consumed by the day announcements
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NightSummary {
    pub round: u32,
    pub eliminated: Option<Casualty>,
    /// Set when the mafia's target survived thanks to a doctor
    pub survivor: Option<String>,
    /// Names of everybody a doctor healed (informational)
    pub healed: Vec<String>,
    /// Living mafia existed but nobody was available to kill
    pub no_target: bool,
    /// No living mafia at all
    pub quiet_night: bool,
    /// `Some(true)` when a check hit a mafia member; never names the target
    pub commissioner_found_mafia: Option<bool>,
    pub distracted: Option<String>,
}

/// Public outcome of a day vote
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VoteSummary {
    pub round: u32,
    pub executed: Option<Casualty>,
    /// Candidates that tied for the most votes (empty unless a tie was broken)
    pub tied: Vec<ParticipantId>,
    pub tally: Vec<(ParticipantId, u32)>,
    pub skipped: usize,
}

/// Living/dead listing announced when the first vote is skipped
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RosterSummary {
    pub alive: Vec<String>,
    pub dead: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Mafia,
    Town,
}

/// Read-only view of a session handed to collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub key: SessionKey,
    pub phase: Phase,
    pub round: u32,
    pub participants: Vec<Participant>,
    pub first_vote_skipped: bool,
    pub ever_distracted: Vec<ParticipantId>,
}

impl SessionSnapshot {
    /// Hide roles of everybody still in play unless the game is over
    pub fn redacted(mut self) -> Self {
        if self.phase != Phase::Ended {
            for p in self.participants.iter_mut().filter(|p| p.alive) {
                p.role = None;
            }
        }
        self
    }
}
