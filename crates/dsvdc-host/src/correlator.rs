use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{HostError, Result};
use crate::message::{GenericResponse, Message};

/// Callback run with the peer's reply to a request.
pub type ResponseCallback = Box<dyn FnOnce(&GenericResponse) + Send>;

/// Outbound path for messages: whatever currently carries the session.
pub trait Transmit: Send + Sync {
    /// Whether a session is established and a transport is attached.
    fn is_connected(&self) -> bool;

    /// Encode and hand a message to the transport.
    fn transmit(&self, message: &Message) -> Result<()>;
}

/// An outbound request awaiting its reply.
pub struct PendingRequest {
    pub id: u32,
    pub callback: ResponseCallback,
    pub created_at: Instant,
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Matches asynchronous generic responses to the requests that caused them.
///
/// Entries are keyed by message id and removed when their reply arrives.
/// Requests the peer never answers stay until [`RequestCorrelator::evict_older_than`]
/// sweeps them.
#[derive(Debug, Default)]
pub struct RequestCorrelator {
    pending: Mutex<HashMap<u32, PendingRequest>>,
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, PendingRequest>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `callback` under the message id and transmit the message.
    ///
    /// Nothing is transmitted unless `via` is connected and the message is
    /// complete. If transmission fails the entry is dropped again.
    ///
    /// # Errors
    ///
    /// - [`HostError::NotConnected`] if `via` has no session or transport.
    /// - [`HostError::IncompleteMessage`] if the message lacks its id or
    ///   payload. Distinct from `NotConnected`; neither case stores a
    ///   callback or transmits anything.
    /// - Any error from [`Transmit::transmit`].
    pub fn send<T: Transmit + ?Sized>(
        &self,
        via: &T,
        message: &Message,
        callback: ResponseCallback,
    ) -> Result<u32> {
        if !via.is_connected() {
            tracing::error!(
                msg_type = %message.msg_type,
                "send rejected, not connected to a controller"
            );
            return Err(HostError::NotConnected);
        }
        let id = match message.request_id() {
            Some(id) if message.is_complete() => id,
            _ => {
                tracing::error!(
                    msg_type = %message.msg_type,
                    "send rejected, message is not properly initialized"
                );
                return Err(HostError::IncompleteMessage(message.msg_type.to_string()));
            }
        };

        let replaced = self.lock().insert(
            id,
            PendingRequest {
                id,
                callback,
                created_at: Instant::now(),
            },
        );
        if replaced.is_some() {
            tracing::warn!(message_id = id, "replaced pending request with the same id");
        }

        tracing::debug!(message_id = id, msg_type = %message.msg_type, "sending request");
        if let Err(err) = via.transmit(message) {
            self.lock().remove(&id);
            return Err(err);
        }
        Ok(id)
    }

    /// Route a generic response to its pending request.
    ///
    /// Returns true if a callback ran. Replies with a missing or reserved id,
    /// a malformed payload, or no matching entry are logged and dropped.
    pub fn on_reply(&self, reply: &Message) -> bool {
        let Some(id) = reply.request_id() else {
            tracing::error!(
                message_id = ?reply.message_id,
                "invalid or unknown response id, dropping"
            );
            return false;
        };
        let Some(response) = reply.generic_response.as_ref().filter(|r| r.code.is_some()) else {
            tracing::error!(message_id = id, "invalid response payload, dropping");
            return false;
        };

        let entry = self.lock().remove(&id);
        match entry {
            Some(pending) => {
                tracing::debug!(
                    message_id = id,
                    code = ?response.code,
                    elapsed_ms = pending.created_at.elapsed().as_millis() as u64,
                    "response matched"
                );
                (pending.callback)(response);
                true
            }
            None => {
                tracing::warn!(message_id = id, "no pending request for response, dropping");
                false
            }
        }
    }

    /// Drop entries older than `max_age`. Returns how many were evicted.
    pub fn evict_older_than(&self, max_age: Duration) -> usize {
        let mut pending = self.lock();
        let before = pending.len();
        pending.retain(|id, request| {
            let keep = request.created_at.elapsed() < max_age;
            if !keep {
                tracing::warn!(message_id = *id, "request timed out without response");
            }
            keep
        });
        before - pending.len()
    }

    pub fn is_pending(&self, id: u32) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use dsvdc_dsuid::DEFAULT_HOST_DSUID;

    use super::*;
    use crate::message::{MessageType, ResultCode};

    #[derive(Default)]
    struct Recorder {
        connected: AtomicBool,
        fail: AtomicBool,
        sent: Mutex<Vec<Message>>,
    }

    impl Recorder {
        fn connected() -> Self {
            let recorder = Self::default();
            recorder.connected.store(true, Ordering::SeqCst);
            recorder
        }
    }

    impl Transmit for Recorder {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn transmit(&self, message: &Message) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(HostError::NotConnected);
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn counting_callback(counter: &Arc<AtomicUsize>) -> ResponseCallback {
        let counter = Arc::clone(counter);
        Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn send_records_and_transmits() {
        let correlator = RequestCorrelator::new();
        let via = Recorder::connected();

        let id = correlator
            .send(&via, &Message::announce_vdc(DEFAULT_HOST_DSUID, 4), Box::new(|_| {}))
            .unwrap();

        assert_eq!(id, 4);
        assert!(correlator.is_pending(4));
        assert_eq!(via.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn send_rejected_when_disconnected() {
        let correlator = RequestCorrelator::new();
        let via = Recorder::default();

        let err = correlator
            .send(&via, &Message::announce_vdc(DEFAULT_HOST_DSUID, 4), Box::new(|_| {}))
            .unwrap_err();

        assert!(matches!(err, HostError::NotConnected));
        assert!(correlator.is_empty());
        assert!(via.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn send_rejects_incomplete_message() {
        let correlator = RequestCorrelator::new();
        let via = Recorder::connected();

        let no_payload = Message::new(MessageType::VdcSendAnnounceVdc).with_message_id(Some(2));
        let no_id = Message::vanish(DEFAULT_HOST_DSUID);

        assert!(matches!(
            correlator.send(&via, &no_payload, Box::new(|_| {})),
            Err(HostError::IncompleteMessage(_))
        ));
        assert!(matches!(
            correlator.send(&via, &no_id, Box::new(|_| {})),
            Err(HostError::IncompleteMessage(_))
        ));
        assert!(correlator.is_empty());
        assert!(via.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn failed_transmit_removes_entry() {
        let correlator = RequestCorrelator::new();
        let via = Recorder::connected();
        via.fail.store(true, Ordering::SeqCst);

        let result = correlator.send(&via, &Message::announce_vdc(DEFAULT_HOST_DSUID, 9), Box::new(|_| {}));
        assert!(result.is_err());
        assert!(correlator.is_empty());
    }

    #[test]
    fn matching_reply_invokes_callback_once() {
        let correlator = RequestCorrelator::new();
        let via = Recorder::connected();
        let calls = Arc::new(AtomicUsize::new(0));

        correlator
            .send(&via, &Message::announce_vdc(DEFAULT_HOST_DSUID, 1), counting_callback(&calls))
            .unwrap();

        let reply = Message::generic_response(ResultCode::ErrOk, Some(1));
        assert!(correlator.on_reply(&reply));
        assert!(!correlator.on_reply(&reply));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(correlator.is_empty());
    }

    #[test]
    fn unmatched_reply_is_ignored() {
        let correlator = RequestCorrelator::new();
        let via = Recorder::connected();
        let calls = Arc::new(AtomicUsize::new(0));

        correlator
            .send(&via, &Message::announce_vdc(DEFAULT_HOST_DSUID, 1), counting_callback(&calls))
            .unwrap();

        assert!(!correlator.on_reply(&Message::generic_response(ResultCode::ErrOk, Some(2))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(correlator.is_pending(1));
    }

    #[test]
    fn malformed_replies_are_dropped() {
        let correlator = RequestCorrelator::new();
        let via = Recorder::connected();
        let calls = Arc::new(AtomicUsize::new(0));
        correlator
            .send(&via, &Message::announce_vdc(DEFAULT_HOST_DSUID, 1), counting_callback(&calls))
            .unwrap();

        let reserved = Message::generic_response(ResultCode::ErrOk, Some(0));
        let no_id = Message::generic_response(ResultCode::ErrOk, None);
        let no_payload = Message::new(MessageType::GenericResponse).with_message_id(Some(1));

        assert!(!correlator.on_reply(&reserved));
        assert!(!correlator.on_reply(&no_id));
        assert!(!correlator.on_reply(&no_payload));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(correlator.is_pending(1));
    }

    #[test]
    fn callback_receives_response_payload() {
        let correlator = RequestCorrelator::new();
        let via = Recorder::connected();
        let seen = Arc::new(Mutex::new(None));

        let sink = Arc::clone(&seen);
        correlator
            .send(
                &via,
                &Message::announce_vdc(DEFAULT_HOST_DSUID, 3),
                Box::new(move |response| *sink.lock().unwrap() = response.code),
            )
            .unwrap();

        correlator.on_reply(&Message::generic_response(ResultCode::ErrForbidden, Some(3)));
        assert_eq!(*seen.lock().unwrap(), Some(ResultCode::ErrForbidden));
    }

    #[test]
    fn eviction_drops_only_old_entries() {
        let correlator = RequestCorrelator::new();
        let via = Recorder::connected();

        correlator
            .send(&via, &Message::announce_vdc(DEFAULT_HOST_DSUID, 1), Box::new(|_| {}))
            .unwrap();

        assert_eq!(correlator.evict_older_than(Duration::from_secs(60)), 0);
        assert_eq!(correlator.len(), 1);

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(correlator.evict_older_than(Duration::from_millis(1)), 1);
        assert!(correlator.is_empty());
    }
}
