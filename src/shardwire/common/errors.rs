use std::fmt::{self, Debug, Display};
use std::{io, result};
use std::net::AddrParseError;
use std::sync::PoisonError;

/// The action a caller should take in response to a recoverable routing
/// error, per spec §7's propagation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Surface a protocol error packet to the client; the session continues.
    Recoverable,
    /// The routing entry point must return a "session must close" signal.
    SessionMustClose,
}

#[derive(Debug)]
pub struct Error {
    err: Box<ErrorKind>,
    recovery: Recovery,
}

#[derive(Debug)]
pub enum ErrorKind {
    IOError(io::Error),
    YAMLError(serde_yaml::Error),
    PoisonError,
    StringError(String),
    /// The classifier could not build a parse tree; routers treat this as WRITE (§4.1).
    ClassifierError(String),
    /// A statement referenced two backends that don't share a shard (§4.5 Routing, step 3).
    CrossShardError { statement: String },
    /// The default database named at connect time isn't in the shard map (§4.5).
    UnknownDatabase(String),
    /// Same database name discovered on two backends with no tiebreaker (§4.5 Conflict policy).
    DuplicateDatabase(String),
    /// A session's command log grew past `max_sescmd_history` (§4.2 History-size guard).
    HistoryLimitExceeded { limit: usize },
    /// No usable backend remained after an error-handling pass (§7, taxonomy 2/3/4).
    NoUsableBackend,
    /// `disable_sescmd_history` is set and a backend joined after history was
    /// already pruned past it, so it cannot be replayed (§8 boundary behaviors).
    SescmdHistoryUnavailable,
    /// Preconditions for an automatic failover were not satisfied (§4.6 step 11 / §7 taxonomy 8).
    FailoverPreconditionFailed(String),
    /// The failover or switchover procedure itself failed partway through (§7 taxonomy 9).
    FailoverFailed(String),
    /// A backend connection was closed (by us, by the peer, or by a timeout).
    Closed,
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    pub fn new<S: ToString>(s: S) -> Self {
        Self::recoverable(ErrorKind::StringError(s.to_string()))
    }

    fn recoverable(kind: ErrorKind) -> Self {
        Error { err: Box::new(kind), recovery: Recovery::Recoverable }
    }

    fn fatal(kind: ErrorKind) -> Self {
        Error { err: Box::new(kind), recovery: Recovery::SessionMustClose }
    }

    pub fn classifier_failed<S: ToString>(s: S) -> Self {
        Self::recoverable(ErrorKind::ClassifierError(s.to_string()))
    }

    pub fn cross_shard(statement: impl Into<String>) -> Self {
        Self::recoverable(ErrorKind::CrossShardError { statement: statement.into() })
    }

    pub fn unknown_database(db: impl Into<String>) -> Self {
        Self::fatal(ErrorKind::UnknownDatabase(db.into()))
    }

    pub fn duplicate_database(db: impl Into<String>) -> Self {
        Self::fatal(ErrorKind::DuplicateDatabase(db.into()))
    }

    pub fn history_limit_exceeded(limit: usize) -> Self {
        Self::fatal(ErrorKind::HistoryLimitExceeded { limit })
    }

    pub fn no_usable_backend() -> Self {
        Self::fatal(ErrorKind::NoUsableBackend)
    }

    pub fn sescmd_history_unavailable() -> Self {
        Self::fatal(ErrorKind::SescmdHistoryUnavailable)
    }

    pub fn failover_precondition<S: ToString>(s: S) -> Self {
        Self::recoverable(ErrorKind::FailoverPreconditionFailed(s.to_string()))
    }

    pub fn failover_failed<S: ToString>(s: S) -> Self {
        Self::recoverable(ErrorKind::FailoverFailed(s.to_string()))
    }

    pub fn closed() -> Self {
        Self::fatal(ErrorKind::Closed)
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.err
    }

    /// Whether the routing entry point that produced this error must close the session (§7).
    pub fn is_fatal(&self) -> bool {
        self.recovery == Recovery::SessionMustClose
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Error::new(err)
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Error::new(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::fatal(ErrorKind::IOError(err))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::fatal(ErrorKind::YAMLError(err))
    }
}

impl From<AddrParseError> for Error {
    fn from(err: AddrParseError) -> Self {
        Error::new(err)
    }
}

impl<Guard> From<PoisonError<Guard>> for Error {
    fn from(_err: PoisonError<Guard>) -> Self {
        Self::fatal(ErrorKind::PoisonError)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.err, f)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::IOError(e) => Display::fmt(e, f),
            ErrorKind::YAMLError(e) => Display::fmt(e, f),
            ErrorKind::PoisonError => f.write_str("another thread panicked while holding the lock"),
            ErrorKind::StringError(s) => f.write_str(s),
            ErrorKind::ClassifierError(s) => write!(f, "could not classify statement: {}", s),
            ErrorKind::CrossShardError { statement } => write!(f, "cross-shard queries not supported: {}", statement),
            ErrorKind::UnknownDatabase(db) => write!(f, "unknown database '{}'", db),
            ErrorKind::DuplicateDatabase(db) => write!(f, "duplicate databases found: '{}'", db),
            ErrorKind::HistoryLimitExceeded { limit } => write!(f, "session command history exceeded {} entries", limit),
            ErrorKind::NoUsableBackend => f.write_str("no usable backend connection remains for this session"),
            ErrorKind::SescmdHistoryUnavailable => {
                f.write_str("session command history is disabled and already pruned; a new backend cannot be replayed")
            }
            ErrorKind::FailoverPreconditionFailed(s) => write!(f, "failover preconditions not met: {}", s),
            ErrorKind::FailoverFailed(s) => write!(f, "failover failed: {}", s),
            ErrorKind::Closed => f.write_str("connection is closed"),
        }
    }
}

impl std::error::Error for Error {}
