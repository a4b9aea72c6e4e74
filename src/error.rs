use crate::types::{ParticipantId, Phase, Role};

/// Result type for session mutators
pub type Accepted<T = ()> = Result<T, Rejection>;

/// A submission or request whose preconditions did not hold.
///
/// Rejections never mutate state and are always recoverable; the transport
/// decides how to tell the participant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("Session not found")]
    SessionNotFound,

    #[error("Expected phase {expected:?}, session is in {actual:?}")]
    WrongPhase { expected: Phase, actual: Phase },

    #[error("Participant {0} is not seated in this session")]
    UnknownParticipant(ParticipantId),

    #[error("Participant {0} is not alive")]
    NotAlive(ParticipantId),

    #[error("Participant {0} is distracted this round")]
    Distracted(ParticipantId),

    #[error("Action requires role {0:?}")]
    WrongRole(Role),

    #[error("Cannot target yourself")]
    SelfTarget,

    #[error("A target is required")]
    TargetRequired,

    #[error("Target {0} is not alive")]
    TargetNotAlive(ParticipantId),

    #[error("Already checked somebody tonight")]
    AlreadyActed,

    #[error("Target {0} was already checked tonight")]
    AlreadyChecked(ParticipantId),

    #[error("Self-heal was already used")]
    SelfHealUsed,

    #[error("Cannot heal {0} two nights in a row")]
    RepeatSave(ParticipantId),

    #[error("Already voted")]
    AlreadyVoted,

    #[error("Participant {0} is already seated")]
    AlreadySeated(ParticipantId),

    #[error("Lobby is full ({0} seats)")]
    LobbyFull(usize),

    #[error("Not seated in any session")]
    NotInSession,

    #[error("Not a mafia member in any running session")]
    NotMafia,

    #[error("Unreachable participants were already pruned")]
    AlreadyPruned,
}

impl Rejection {
    /// Stable code for the transport's error message
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::SessionNotFound => "SESSION_NOT_FOUND",
            Rejection::WrongPhase { .. } => "WRONG_PHASE",
            Rejection::UnknownParticipant(_) => "UNKNOWN_PARTICIPANT",
            Rejection::NotAlive(_) => "NOT_ALIVE",
            Rejection::Distracted(_) => "DISTRACTED",
            Rejection::WrongRole(_) => "WRONG_ROLE",
            Rejection::SelfTarget => "SELF_TARGET",
            Rejection::TargetRequired => "TARGET_REQUIRED",
            Rejection::TargetNotAlive(_) => "TARGET_NOT_ALIVE",
            Rejection::AlreadyActed => "ALREADY_ACTED",
            Rejection::AlreadyChecked(_) => "ALREADY_CHECKED",
            Rejection::SelfHealUsed => "SELF_HEAL_USED",
            Rejection::RepeatSave(_) => "REPEAT_SAVE",
            Rejection::AlreadyVoted => "ALREADY_VOTED",
            Rejection::AlreadySeated(_) => "ALREADY_SEATED",
            Rejection::LobbyFull(_) => "LOBBY_FULL",
            Rejection::NotInSession => "NOT_IN_SESSION",
            Rejection::NotMafia => "NOT_MAFIA",
            Rejection::AlreadyPruned => "ALREADY_PRUNED",
        }
    }
}

/// Errors that stop a session from proceeding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("{seated} seated, at least {required} needed for a role distribution")]
    NotEnoughPlayers { seated: usize, required: usize },

    #[error("Role list has {roles} entries for {seated} seats")]
    RoleShortfall { roles: usize, seated: usize },
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Rejected(r) => r.code(),
            EngineError::NotEnoughPlayers { .. } => "NOT_ENOUGH_PLAYERS",
            EngineError::RoleShortfall { .. } => "ROLE_SHORTFALL",
        }
    }
}
