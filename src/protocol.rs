use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Take a seat in the connection's session, creating it if needed
    Join,
    Leave,
    Start,
    NightAction {
        action: ActionKind,
        /// `None` declines (doctor) or distracts nobody (butterfly)
        target: Option<ParticipantId>,
    },
    Vote {
        /// `None` skips
        target: Option<ParticipantId>,
    },
    /// Private relay to the other living mafia of the sender's session
    MafiaChat {
        text: String,
    },
    EndGame,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        participant: ParticipantId,
        session: Option<SessionKey>,
        server_now: String,
    },
    Joined {
        session: SessionKey,
        seated: usize,
    },
    Left {
        session: SessionKey,
    },
    /// Lobby roster changed
    LobbyUpdate {
        session: SessionKey,
        participants: Vec<String>,
    },
    Started {
        session: SessionKey,
        seated: usize,
        /// Participants dropped because their role could not be delivered
        removed: Vec<String>,
    },
    /// Private: the recipient's role, plus fellow mafia for mafia members
    RoleAssigned {
        session: SessionKey,
        role: Role,
        mafia_peers: Vec<String>,
    },
    PhaseChanged {
        session: SessionKey,
        phase: Phase,
        round: u32,
        /// RFC 3339, absent for phases without a timer
        deadline: Option<String>,
    },
    Reminder {
        session: SessionKey,
        phase: Phase,
        seconds_left: u64,
    },
    ActionAccepted {
        action: ActionKind,
    },
    AllActionsReceived {
        session: SessionKey,
    },
    NightResult {
        session: SessionKey,
        summary: NightSummary,
    },
    /// Private to the checking commissioner
    CheckResult {
        session: SessionKey,
        target: ParticipantId,
        target_name: String,
        is_mafia: bool,
    },
    /// First day: no vote, living and dead are listed instead
    FirstDayRoster {
        session: SessionKey,
        roster: RosterSummary,
    },
    VoteAccepted,
    VoteResult {
        session: SessionKey,
        summary: VoteSummary,
    },
    MafiaMessage {
        from: String,
        text: String,
    },
    MafiaChatSent {
        recipients: usize,
    },
    GameOver {
        session: SessionKey,
        winner: Winner,
        mafia: Vec<String>,
    },
    /// Forced end, no winner
    GameEnded {
        session: SessionKey,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, msg: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.into(),
            msg: msg.into(),
        }
    }
}

impl From<crate::error::Rejection> for ServerMessage {
    fn from(r: crate::error::Rejection) -> Self {
        ServerMessage::error(r.code(), r.to_string())
    }
}

impl From<crate::error::EngineError> for ServerMessage {
    fn from(e: crate::error::EngineError) -> Self {
        ServerMessage::error(e.code(), e.to_string())
    }
}
