use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use dsvdc_dsuid::Dsuid;

use crate::error::{HostError, Result};
use crate::message::{HelloRequest, ResultCode};

/// Highest vDC API version this host speaks.
pub const SUPPORTED_API_VERSION: u32 = 3;

/// State of the link to the single controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected { peer: Dsuid },
}

/// Outcome of a hello request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelloOutcome {
    /// A new session was created for the peer.
    Established { peer: Dsuid },
    /// The connected peer said hello again; the session is kept as is.
    Renewed { peer: Dsuid },
    /// Message id or peer dSUID missing.
    MissingData,
    /// API version missing or newer than [`SUPPORTED_API_VERSION`].
    IncompatibleApi,
    /// The peer dSUID is present but cannot be parsed.
    InvalidPeer,
    /// Another peer already holds the session.
    Busy { current: Dsuid },
}

impl HelloOutcome {
    /// `None` for success, otherwise the code of the rejection reply.
    pub fn rejection(&self) -> Option<ResultCode> {
        match self {
            HelloOutcome::Established { .. } | HelloOutcome::Renewed { .. } => None,
            HelloOutcome::MissingData => Some(ResultCode::ErrMissingData),
            HelloOutcome::IncompatibleApi => Some(ResultCode::ErrIncompatibleApi),
            HelloOutcome::InvalidPeer => Some(ResultCode::ErrInvalidValueType),
            HelloOutcome::Busy { .. } => Some(ResultCode::ErrServiceNotAvailable),
        }
    }
}

/// A live controller session.
#[derive(Debug)]
struct Session {
    peer: Dsuid,
    message_counter: u32,
    established_at: Instant,
}

impl Session {
    fn new(peer: Dsuid) -> Self {
        Self {
            peer,
            message_counter: 0,
            established_at: Instant::now(),
        }
    }
}

/// Handshake state machine and message-id allocator.
///
/// At most one session exists at a time. It is created by a successful
/// hello and dropped by a matching bye or by [`SessionManager::terminate`].
#[derive(Debug, Default)]
pub struct SessionManager {
    inner: Mutex<Option<Session>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Session>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a hello request.
    ///
    /// Rejections never change state. A hello from the connected peer keeps
    /// the existing session and its message counter.
    pub fn hello(&self, message_id: Option<u32>, request: Option<&HelloRequest>) -> HelloOutcome {
        let Some(request) = request else {
            return HelloOutcome::MissingData;
        };
        let (Some(_), Some(peer_text)) = (message_id, request.dsuid.as_deref()) else {
            return HelloOutcome::MissingData;
        };
        match request.api_version {
            Some(version) if version <= SUPPORTED_API_VERSION => {}
            _ => return HelloOutcome::IncompatibleApi,
        }
        let Ok(peer) = Dsuid::parse(peer_text) else {
            return HelloOutcome::InvalidPeer;
        };

        let mut session = self.lock();
        match session.as_ref() {
            None => {
                *session = Some(Session::new(peer));
                HelloOutcome::Established { peer }
            }
            Some(current) if current.peer == peer => HelloOutcome::Renewed { peer },
            Some(current) => HelloOutcome::Busy {
                current: current.peer,
            },
        }
    }

    /// End the session if `peer` is the connected controller.
    ///
    /// Returns false, leaving state untouched, for any other peer.
    pub fn bye(&self, peer: &Dsuid) -> bool {
        let mut session = self.lock();
        match session.as_ref() {
            Some(current) if current.peer == *peer => {
                *session = None;
                true
            }
            _ => false,
        }
    }

    /// End the session unconditionally, returning the peer it belonged to.
    pub fn terminate(&self) -> Option<Dsuid> {
        self.lock().take().map(|session| session.peer)
    }

    /// Allocate the next outbound message id (1, 2, 3, ... per session).
    pub fn next_message_id(&self) -> Result<u32> {
        let mut session = self.lock();
        let session = session.as_mut().ok_or(HostError::NoActiveSession)?;
        session.message_counter = session.message_counter.wrapping_add(1);
        if session.message_counter == crate::message::RESERVED_MESSAGE_ID {
            session.message_counter = 1;
        }
        Ok(session.message_counter)
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    pub fn peer(&self) -> Option<Dsuid> {
        self.lock().as_ref().map(|session| session.peer)
    }

    pub fn state(&self) -> SessionState {
        match self.lock().as_ref() {
            Some(session) => SessionState::Connected { peer: session.peer },
            None => SessionState::Disconnected,
        }
    }

    /// How long the current session has existed.
    pub fn age(&self) -> Option<std::time::Duration> {
        self.lock()
            .as_ref()
            .map(|session| session.established_at.elapsed())
    }
}
