use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use dsvdc_dsuid::Dsuid;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::codec::{JsonCodec, PayloadCodec};
use crate::config::HostConfig;
use crate::correlator::{RequestCorrelator, ResponseCallback, Transmit};
use crate::entity::{Addressable, HostEntity, Vdc};
use crate::error::{HostError, Result};
use crate::link::Link;
use crate::message::{Message, ResultCode};
use crate::registry::EntityRegistry;
use crate::session::{HelloOutcome, SessionManager, SessionState};

/// The vDC host: owns the controller session, the entity registry and the
/// pending-request table.
pub struct VdcHost {
    dsuid: Dsuid,
    name: String,
    config: HostConfig,
    session: SessionManager,
    registry: EntityRegistry,
    correlator: RequestCorrelator,
    codec: Arc<dyn PayloadCodec>,
    link: Mutex<Option<Link>>,
    announce_pending: AtomicBool,
}

impl VdcHost {
    /// Host using the JSON payload codec.
    pub fn new(config: HostConfig) -> Arc<Self> {
        Self::with_codec(config, Arc::new(JsonCodec))
    }

    /// Host using an explicit payload codec.
    ///
    /// The host registers itself under its own dSUID right away.
    pub fn with_codec(config: HostConfig, codec: Arc<dyn PayloadCodec>) -> Arc<Self> {
        let dsuid = config.host_dsuid();
        let name = config.name.clone();
        let registry = EntityRegistry::new();
        registry.register(Arc::new(HostEntity::new(dsuid, name.clone())));

        tracing::info!(%dsuid, name = %name, "vDC host created");
        Arc::new(Self {
            dsuid,
            name,
            config,
            session: SessionManager::new(),
            registry,
            correlator: RequestCorrelator::new(),
            codec,
            link: Mutex::new(None),
            announce_pending: AtomicBool::new(false),
        })
    }

    pub fn dsuid(&self) -> Dsuid {
        self.dsuid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn correlator(&self) -> &RequestCorrelator {
        &self.correlator
    }

    pub fn codec(&self) -> &Arc<dyn PayloadCodec> {
        &self.codec
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    fn link(&self) -> MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connected means a controller session exists and its transport is attached.
    pub fn is_connected(&self) -> bool {
        self.session.is_connected() && self.link().is_some()
    }

    /// Handle a hello request arriving over `link`.
    ///
    /// A successful hello binds the session to `link`. A fresh session also
    /// schedules re-announcement of every known vDC, see
    /// [`VdcHost::flush_announcements`].
    pub fn process_hello(&self, request: &Message, link: Option<&Link>) -> Message {
        let outcome = self
            .session
            .hello(request.message_id, request.vdsm_request_hello.as_ref());

        match outcome {
            HelloOutcome::Established { peer } => {
                tracing::info!(%peer, "new controller session established");
                self.attach(link);
                self.announce_pending.store(true, Ordering::SeqCst);
            }
            HelloOutcome::Renewed { peer } => {
                tracing::info!(%peer, "controller renewed its session");
                self.attach(link);
            }
            HelloOutcome::MissingData => {
                tracing::error!("hello without message id or controller dSUID");
            }
            HelloOutcome::IncompatibleApi => {
                tracing::error!(
                    api_version = ?request.vdsm_request_hello.as_ref().and_then(|h| h.api_version),
                    "hello with missing or incompatible API version"
                );
            }
            HelloOutcome::InvalidPeer => {
                tracing::error!("hello with malformed controller dSUID");
            }
            HelloOutcome::Busy { current } => {
                tracing::error!(%current, "already connected to another controller, rejecting hello");
            }
        }

        match outcome.rejection() {
            None => Message::hello_response(self.dsuid, request.message_id),
            Some(code) => Message::generic_response(code, request.message_id),
        }
    }

    /// Handle a ping by delegating to the addressed entity's `pong`.
    ///
    /// Unknown or malformed targets get no reply.
    pub fn process_ping(&self, request: &Message) -> Option<Message> {
        let Some(target) = request.vdsm_send_ping.as_ref().and_then(|p| p.target()) else {
            tracing::warn!("incomplete ping request, no payload or dSUID");
            return None;
        };
        match self.registry.find(&target) {
            Some(entity) => {
                tracing::debug!(name = entity.name(), dsuid = %target, "delegating ping");
                entity.pong(request)
            }
            None => {
                tracing::warn!(dsuid = %target, "ping for unknown entity, dropping");
                None
            }
        }
    }

    /// Handle a bye from the controller arriving over `link`.
    ///
    /// Only the connected controller can end its session, and only over the
    /// connection carrying it. Every registered entity then observes the bye
    /// and the reply is `ERR_OK`. Anything else is dropped without reply.
    pub fn process_bye(&self, request: &Message, link: Option<&Link>) -> Option<Message> {
        let Some(peer) = request.vdsm_send_bye.as_ref().and_then(|p| p.target()) else {
            tracing::warn!("incomplete bye request, no payload or dSUID");
            return None;
        };
        if let Some(link) = link {
            let session_link = self.link().as_ref().map(Link::id);
            if session_link != Some(link.id()) {
                tracing::warn!(
                    %peer,
                    link = link.id(),
                    "bye over a connection without the session, dropping"
                );
                return None;
            }
        }
        if !self.session.bye(&peer) {
            tracing::warn!(%peer, "bye from unknown controller, dropping");
            return None;
        }

        tracing::info!(%peer, "controller session invalidated");
        self.link().take();
        for entity in self.registry.entities() {
            let _ = entity.bye(request);
        }
        Some(Message::generic_response(ResultCode::ErrOk, request.message_id))
    }

    /// Handle a remove request.
    ///
    /// Removal is not supported yet: a request without a target is answered
    /// with `ERR_MISSING_DATA`, a complete one is logged and left unanswered.
    pub fn process_remove(&self, request: &Message) -> Option<Message> {
        let Some(target) = request.vdsm_send_remove.as_ref().and_then(|p| p.target()) else {
            tracing::warn!("incomplete remove request, no payload or dSUID");
            return Some(Message::generic_response(
                ResultCode::ErrMissingData,
                request.message_id,
            ));
        };
        tracing::warn!(dsuid = %target, "remove request not supported, ignoring");
        None
    }

    /// Route a generic response to the request waiting for it.
    pub fn process_generic_response(&self, response: &Message) -> bool {
        self.correlator.on_reply(response)
    }

    /// Next outbound message id of the current session.
    pub fn next_message_id(&self) -> Result<u32> {
        self.session.next_message_id()
    }

    /// Send a request whose generic response will be passed to `callback`.
    pub fn send(&self, message: &Message, callback: ResponseCallback) -> Result<u32> {
        self.correlator.send(self, message, callback)
    }

    /// Send a notification that expects no reply.
    pub fn notify(&self, message: &Message) -> Result<()> {
        if !self.is_connected() {
            return Err(HostError::NotConnected);
        }
        if !message.is_complete() {
            return Err(HostError::IncompleteMessage(message.msg_type.to_string()));
        }
        tracing::debug!(msg_type = %message.msg_type, "sending notification");
        self.transmit(message)
    }

    /// Add a vDC together with its devices.
    ///
    /// The vDC is announced at once when a controller is connected. Returns
    /// false if its dSUID was already registered.
    pub fn add_vdc(self: &Arc<Self>, vdc: Arc<Vdc>) -> bool {
        if !vdc.attach_to(self) {
            return false;
        }
        tracing::info!(dsuid = %vdc.dsuid(), model = vdc.model(), "vDC added");

        if self.is_connected() {
            if let Err(err) = vdc.announce() {
                tracing::warn!(dsuid = %vdc.dsuid(), error = %err, "vDC announcement failed");
            }
        }
        true
    }

    pub fn find_entity(&self, dsuid: &Dsuid) -> Option<Arc<dyn Addressable>> {
        self.registry.find(dsuid)
    }

    pub fn vdcs(&self) -> Vec<Arc<Vdc>> {
        self.registry.vdcs()
    }

    /// Announce every registered vDC. Returns how many announcements went out.
    pub fn announce_vdcs(&self) -> usize {
        let vdcs = self.vdcs();
        tracing::info!(count = vdcs.len(), "announcing vDCs");
        vdcs.iter()
            .filter(|vdc| match vdc.announce() {
                Ok(_) => true,
                Err(err) => {
                    tracing::warn!(dsuid = %vdc.dsuid(), error = %err, "vDC announcement failed");
                    false
                }
            })
            .count()
    }

    /// Run the announcements scheduled by a fresh handshake, if any.
    ///
    /// Called after the hello response has been queued so the controller
    /// sees the response first.
    pub fn flush_announcements(&self) -> usize {
        if self.announce_pending.swap(false, Ordering::SeqCst) {
            self.announce_vdcs()
        } else {
            0
        }
    }

    fn attach(&self, link: Option<&Link>) {
        if let Some(link) = link {
            *self.link() = Some(link.clone());
        }
    }

    /// The transport with id `link_id` went away.
    ///
    /// If it carried the session, the session ends and every vDC is marked
    /// disconnected so that a new controller can say hello.
    pub fn detach(&self, link_id: u64) -> bool {
        {
            let mut link = self.link();
            if link.as_ref().map(Link::id) != Some(link_id) {
                return false;
            }
            link.take();
        }

        if let Some(peer) = self.session.terminate() {
            tracing::warn!(%peer, "controller connection lost, session terminated");
        }
        for vdc in self.vdcs() {
            vdc.set_connected(false);
        }
        true
    }

    /// Wait until a controller has completed its handshake.
    ///
    /// Polls every `connect_poll_interval` without deadline; only `cancel`
    /// ends the wait early. Returns the time spent waiting.
    pub async fn wait_until_connected(&self, cancel: &CancellationToken) -> Result<Duration> {
        let started = Instant::now();
        while !self.is_connected() {
            tracing::info!(
                waited_secs = started.elapsed().as_secs(),
                "waiting for controller hello"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(HostError::Cancelled),
                _ = tokio::time::sleep(self.config.connect_poll_interval) => {}
            }
        }
        let waited = started.elapsed();
        tracing::info!(waited_ms = waited.as_millis() as u64, "controller connected");
        Ok(waited)
    }

    /// Drop pending requests older than the configured max age.
    pub fn evict_expired(&self) -> usize {
        match self.config.request_max_age {
            Some(max_age) => self.correlator.evict_older_than(max_age),
            None => 0,
        }
    }
}

impl Transmit for VdcHost {
    fn is_connected(&self) -> bool {
        VdcHost::is_connected(self)
    }

    fn transmit(&self, message: &Message) -> Result<()> {
        let link = self.link().clone().ok_or(HostError::NotConnected)?;
        let body = self.codec.encode(message)?;
        if body.len() > self.config.max_message_size {
            return Err(HostError::MessageTooLarge {
                size: body.len(),
                max: self.config.max_message_size,
            });
        }
        link.send(Bytes::from(body))
    }
}

impl std::fmt::Debug for VdcHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VdcHost")
            .field("dsuid", &self.dsuid)
            .field("name", &self.name)
            .field("session", &self.session.state())
            .field("entities", &self.registry.len())
            .field("pending_requests", &self.correlator.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use dsvdc_dsuid::{Namespace, DEFAULT_HOST_DSUID};
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::entity::{Device, EntityKind};
    use crate::message::MessageType;

    fn controller(name: &str) -> Dsuid {
        Dsuid::generate_v5(Namespace::Vdsm, name)
    }

    fn host() -> Arc<VdcHost> {
        VdcHost::new(HostConfig::default())
    }

    fn connect(host: &VdcHost, peer: Dsuid) -> (Link, UnboundedReceiver<Bytes>) {
        let (link, rx) = Link::channel(1);
        let reply = host.process_hello(&Message::hello_request(peer, 3, 1), Some(&link));
        assert_eq!(reply.msg_type, MessageType::VdcResponseHello);
        (link, rx)
    }

    fn sent(rx: &mut UnboundedReceiver<Bytes>) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(body) = rx.try_recv() {
            out.push(JsonCodec.decode(&body).unwrap());
        }
        out
    }

    fn code(message: &Message) -> Option<ResultCode> {
        message.generic_response.as_ref().and_then(|r| r.code)
    }

    #[derive(Debug)]
    struct CountingEntity {
        dsuid: Dsuid,
        kind: EntityKind,
        byes: AtomicUsize,
    }

    impl CountingEntity {
        fn new(dsuid: Dsuid, kind: EntityKind) -> Arc<Self> {
            Arc::new(Self {
                dsuid,
                kind,
                byes: AtomicUsize::new(0),
            })
        }

        fn byes(&self) -> usize {
            self.byes.load(Ordering::SeqCst)
        }
    }

    impl Addressable for CountingEntity {
        fn dsuid(&self) -> Dsuid {
            self.dsuid
        }

        fn name(&self) -> &str {
            "counting"
        }

        fn kind(&self) -> EntityKind {
            self.kind
        }

        fn bye(&self, request: &Message) -> Option<Message> {
            self.byes.fetch_add(1, Ordering::SeqCst);
            crate::entity::default_bye(self, request)
        }
    }

    #[test]
    fn host_registers_itself() {
        let host = host();
        assert_eq!(host.dsuid(), DEFAULT_HOST_DSUID);
        assert_eq!(host.name(), "default-vDC-Host");
        let entity = host.find_entity(&DEFAULT_HOST_DSUID).unwrap();
        assert_eq!(entity.kind(), EntityKind::Host);
    }

    #[test]
    fn hello_echoes_host_dsuid() {
        let host = host();
        let (link, _rx) = Link::channel(1);
        let reply = host.process_hello(&Message::hello_request(controller("p"), 3, 42), Some(&link));

        assert_eq!(reply.message_id, Some(42));
        assert_eq!(
            reply.vdc_response_hello.unwrap().dsuid.as_deref(),
            Some("6123A881016010000000F2CA0DEB370700")
        );
        assert!(host.is_connected());
    }

    #[test]
    fn hello_rejections() {
        let host = host();
        let p = controller("p");

        let mut no_version = Message::hello_request(p, 3, 1);
        no_version.vdsm_request_hello.as_mut().unwrap().api_version = None;
        assert_eq!(
            code(&host.process_hello(&no_version, None)),
            Some(ResultCode::ErrIncompatibleApi)
        );

        let too_new = Message::hello_request(p, 4, 1);
        assert_eq!(
            code(&host.process_hello(&too_new, None)),
            Some(ResultCode::ErrIncompatibleApi)
        );

        let no_id = Message::hello_request(p, 3, 1).with_message_id(None);
        assert_eq!(
            code(&host.process_hello(&no_id, None)),
            Some(ResultCode::ErrMissingData)
        );

        assert_eq!(host.session_state(), SessionState::Disconnected);
    }

    #[test]
    fn second_controller_is_rejected() {
        let host = host();
        let p = controller("p");
        let (_link, _rx) = connect(&host, p);

        let (other, _other_rx) = Link::channel(2);
        let reply = host.process_hello(&Message::hello_request(controller("q"), 3, 1), Some(&other));

        assert_eq!(code(&reply), Some(ResultCode::ErrServiceNotAvailable));
        assert_eq!(reply.generic_response.unwrap().description.as_deref(), Some("Service not available"));
        assert_eq!(host.session_state(), SessionState::Connected { peer: p });
    }

    #[test]
    fn ping_delegates_to_entity() {
        let host = host();
        let pong = host.process_ping(&Message::ping(DEFAULT_HOST_DSUID)).unwrap();
        assert_eq!(pong.msg_type, MessageType::VdcSendPong);
        assert_eq!(pong.vdc_send_pong.unwrap().target(), Some(DEFAULT_HOST_DSUID));
    }

    #[test]
    fn ping_for_unknown_or_malformed_target_is_dropped() {
        let host = host();
        assert!(host.process_ping(&Message::ping(controller("nobody"))).is_none());
        assert!(host.process_ping(&Message::new(MessageType::VdsmSendPing)).is_none());
    }

    #[test]
    fn bye_cascades_to_every_entity_once() {
        let host = host();
        let p = controller("p");

        let host_entry = CountingEntity::new(host.dsuid(), EntityKind::Host);
        assert!(host.registry().remove(&host.dsuid()).is_some());
        assert!(host.registry().register(host_entry.clone()));
        let vdc_entry = CountingEntity::new(Dsuid::generate_v4(), EntityKind::Vdc);
        assert!(host.registry().register(vdc_entry.clone()));
        let device_entry = CountingEntity::new(Dsuid::generate_v4(), EntityKind::Device);
        assert!(host.registry().register(device_entry.clone()));

        let (link, _rx) = connect(&host, p);
        let reply = host.process_bye(&Message::bye(p, Some(5)), Some(&link)).unwrap();

        assert_eq!(code(&reply), Some(ResultCode::ErrOk));
        assert_eq!(reply.message_id, Some(5));
        assert_eq!(host.session_state(), SessionState::Disconnected);

        let entries = [&host_entry, &vdc_entry, &device_entry];
        for entry in entries {
            assert_eq!(entry.byes(), 1, "{}", entry.kind);
        }
        let delivered: usize = entries.iter().map(|entry| entry.byes()).sum();
        assert_eq!(delivered, host.registry().len());
    }

    #[test]
    fn bye_disconnects_vdcs_and_their_devices() {
        let host = host();
        let p = controller("p");
        let device = CountingEntity::new(Dsuid::generate_v4(), EntityKind::Device);
        let vdc = Arc::new(Vdc::new("test"));
        vdc.add_device(device.clone());
        vdc.set_connected(true);
        host.add_vdc(Arc::clone(&vdc));

        let (link, _rx) = connect(&host, p);
        assert!(host.process_bye(&Message::bye(p, Some(5)), Some(&link)).is_some());

        assert_eq!(device.byes(), 1);
        assert!(!vdc.is_connected());
    }

    #[test]
    fn bye_over_other_connection_is_dropped() {
        let host = host();
        let p = controller("p");
        let (_link, _rx) = connect(&host, p);
        let (other, _other_rx) = Link::channel(2);

        assert!(host.process_bye(&Message::bye(p, Some(1)), Some(&other)).is_none());
        assert!(host.is_connected());
        assert_eq!(host.session_state(), SessionState::Connected { peer: p });
    }

    #[test]
    fn bye_from_stranger_is_dropped() {
        let host = host();
        let p = controller("p");
        let (_link, _rx) = connect(&host, p);

        assert!(host.process_bye(&Message::bye(controller("q"), Some(1)), None).is_none());
        assert!(host.process_bye(&Message::new(MessageType::VdsmSendBye), None).is_none());
        assert!(host.is_connected());
    }

    #[test]
    fn bye_while_disconnected_is_dropped() {
        let host = host();
        assert!(host.process_bye(&Message::bye(controller("p"), Some(1)), None).is_none());
    }

    #[test]
    fn remove_without_target_reports_missing_data() {
        let host = host();
        let reply = host
            .process_remove(&Message::new(MessageType::VdsmSendRemove).with_message_id(Some(3)))
            .unwrap();
        assert_eq!(code(&reply), Some(ResultCode::ErrMissingData));
        assert!(host.process_remove(&Message::remove(DEFAULT_HOST_DSUID, Some(4))).is_none());
    }

    #[test]
    fn message_id_requires_session() {
        let host = host();
        assert!(matches!(host.next_message_id(), Err(HostError::NoActiveSession)));

        let (_link, _rx) = connect(&host, controller("p"));
        assert_eq!(host.next_message_id().unwrap(), 1);
        assert_eq!(host.next_message_id().unwrap(), 2);
    }

    #[test]
    fn send_requires_connection() {
        let host = host();
        let err = host
            .send(&Message::announce_vdc(DEFAULT_HOST_DSUID, 1), Box::new(|_| {}))
            .unwrap_err();
        assert!(matches!(err, HostError::NotConnected));
        assert!(host.correlator().is_empty());
    }

    #[test]
    fn vdc_added_while_disconnected_is_announced_after_hello() {
        let host = host();
        let vdc = Arc::new(Vdc::new("test"));
        assert!(host.add_vdc(Arc::clone(&vdc)));
        assert!(!vdc.is_connected());

        let (_link, mut rx) = connect(&host, controller("p"));
        assert!(sent(&mut rx).is_empty());
        assert_eq!(host.flush_announcements(), 1);
        assert_eq!(host.flush_announcements(), 0);

        let announced = sent(&mut rx);
        assert_eq!(announced.len(), 1);
        assert_eq!(announced[0].msg_type, MessageType::VdcSendAnnounceVdc);
        assert_eq!(announced[0].message_id, Some(1));
        assert_eq!(
            announced[0].vdc_send_announce_vdc.as_ref().unwrap().target(),
            Some(vdc.dsuid())
        );

        assert!(host.process_generic_response(&Message::generic_response(ResultCode::ErrOk, Some(1))));
        assert!(vdc.is_connected());
    }

    #[test]
    fn vdc_added_while_connected_is_announced_immediately() {
        let host = host();
        let (_link, mut rx) = connect(&host, controller("p"));

        let vdc = Arc::new(Vdc::new("late"));
        host.add_vdc(Arc::clone(&vdc));

        let announced = sent(&mut rx);
        assert_eq!(announced.len(), 1);
        assert_eq!(announced[0].msg_type, MessageType::VdcSendAnnounceVdc);
    }

    #[test]
    fn rejected_announcement_keeps_vdc_disconnected() {
        let host = host();
        let (_link, _rx) = connect(&host, controller("p"));
        let vdc = Arc::new(Vdc::new("test"));
        host.add_vdc(Arc::clone(&vdc));

        host.process_generic_response(&Message::generic_response(ResultCode::ErrForbidden, Some(1)));
        assert!(!vdc.is_connected());
    }

    #[test]
    fn renewal_does_not_reannounce() {
        let host = host();
        let p = controller("p");
        host.add_vdc(Arc::new(Vdc::new("test")));

        let (link, _rx) = connect(&host, p);
        assert_eq!(host.flush_announcements(), 1);

        host.process_hello(&Message::hello_request(p, 3, 2), Some(&link));
        assert_eq!(host.flush_announcements(), 0);
    }

    #[test]
    fn duplicate_vdc_not_added() {
        let host = host();
        let dsuid = Dsuid::generate_v4();
        assert!(host.add_vdc(Arc::new(Vdc::with_dsuid(dsuid, "first"))));
        assert!(!host.add_vdc(Arc::new(Vdc::with_dsuid(dsuid, "second"))));
        assert_eq!(host.vdcs().len(), 1);
    }

    #[test]
    fn device_added_to_attached_vdc_is_addressable() {
        let host = host();
        let vdc = Arc::new(Vdc::new("test"));
        host.add_vdc(Arc::clone(&vdc));

        let lamp = Dsuid::generate_v4();
        vdc.add_device(Arc::new(Device::new(lamp, "lamp")));
        assert!(host.find_entity(&lamp).is_some());

        vdc.remove_device(&lamp);
        assert!(host.find_entity(&lamp).is_none());
    }

    #[test]
    fn vanish_is_sent_when_connected() {
        let host = host();
        let vdc = Arc::new(Vdc::new("test"));
        host.add_vdc(Arc::clone(&vdc));
        let (_link, mut rx) = connect(&host, controller("p"));

        let lamp = Dsuid::generate_v4();
        vdc.add_device(Arc::new(Device::new(lamp, "lamp")));
        vdc.remove_device(&lamp);

        let messages = sent(&mut rx);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].msg_type, MessageType::VdcSendVanish);
        assert_eq!(messages[0].vdc_send_vanish.as_ref().unwrap().target(), Some(lamp));
    }

    #[test]
    fn detach_terminates_session() {
        let host = host();
        let vdc = Arc::new(Vdc::new("test"));
        host.add_vdc(Arc::clone(&vdc));
        let (link, _rx) = connect(&host, controller("p"));
        vdc.set_connected(true);

        assert!(!host.detach(link.id() + 1));
        assert!(host.is_connected());

        assert!(host.detach(link.id()));
        assert!(!host.is_connected());
        assert_eq!(host.session_state(), SessionState::Disconnected);
        assert!(!vdc.is_connected());

        let (_link, _rx) = connect(&host, controller("q"));
        assert!(host.is_connected());
    }

    #[test]
    fn oversize_message_not_transmitted() {
        let config = HostConfig {
            max_message_size: 16,
            ..HostConfig::default()
        };
        let host = VdcHost::new(config);
        let (_link, mut rx) = connect(&host, controller("p"));

        let err = host
            .send(&Message::announce_vdc(DEFAULT_HOST_DSUID, 1), Box::new(|_| {}))
            .unwrap_err();
        assert!(matches!(err, HostError::MessageTooLarge { max: 16, .. }));
        assert!(host.correlator().is_empty());
        assert!(sent(&mut rx).is_empty());
    }

    #[test]
    fn evict_expired_respects_config() {
        let config = HostConfig {
            request_max_age: None,
            ..HostConfig::default()
        };
        let host = VdcHost::new(config);
        let (_link, _rx) = connect(&host, controller("p"));
        host.send(&Message::announce_vdc(DEFAULT_HOST_DSUID, 1), Box::new(|_| {}))
            .unwrap();

        assert_eq!(host.evict_expired(), 0);
        assert_eq!(host.correlator().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_connected_is_cancellable() {
        let host = host();
        let cancel = CancellationToken::new();

        let waiter = {
            let host = Arc::clone(&host);
            let cancel = cancel.clone();
            tokio::spawn(async move { host.wait_until_connected(&cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(HostError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_connected_returns_after_hello() {
        let host = host();
        let cancel = CancellationToken::new();

        let waiter = {
            let host = Arc::clone(&host);
            let cancel = cancel.clone();
            tokio::spawn(async move { host.wait_until_connected(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(2500)).await;
        let (_link, _rx) = connect(&host, controller("p"));

        let waited = waiter.await.unwrap().unwrap();
        assert!(waited >= Duration::from_secs(2));
    }

    #[test]
    fn removing_colliding_device_keeps_host_entry() {
        let host = host();
        let vdc = Arc::new(Vdc::new("test"));
        vdc.add_device(Arc::new(Device::new(DEFAULT_HOST_DSUID, "clash")));
        assert!(host.add_vdc(Arc::clone(&vdc)));
        assert_eq!(
            host.find_entity(&DEFAULT_HOST_DSUID).unwrap().kind(),
            EntityKind::Host
        );

        assert!(vdc.remove_device(&DEFAULT_HOST_DSUID).is_some());

        let entry = host.find_entity(&DEFAULT_HOST_DSUID).unwrap();
        assert_eq!(entry.kind(), EntityKind::Host);
        assert!(host.process_ping(&Message::ping(DEFAULT_HOST_DSUID)).is_some());
    }

    #[test]
    fn removing_owned_device_frees_its_entry() {
        let host = host();
        let vdc = Arc::new(Vdc::new("test"));
        let dsuid = Dsuid::generate_v4();
        host.add_vdc(Arc::clone(&vdc));
        vdc.add_device(Arc::new(Device::new(dsuid, "lamp")));
        assert!(host.find_entity(&dsuid).is_some());

        assert!(vdc.remove_device(&dsuid).is_some());
        assert!(host.find_entity(&dsuid).is_none());
    }

    #[test]
    fn devices_added_during_add_vdc_reach_registry() {
        let host = host();
        let vdc = Arc::new(Vdc::new("test"));
        let ids: Vec<Dsuid> = (0..64).map(|_| Dsuid::generate_v4()).collect();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for id in &ids {
                    vdc.add_device(Arc::new(Device::new(*id, "lamp")));
                }
            });
            scope.spawn(|| assert!(host.add_vdc(Arc::clone(&vdc))));
        });

        for id in &ids {
            assert!(host.find_entity(id).is_some(), "{id} missing from registry");
        }
        assert_eq!(host.registry().len(), ids.len() + 2);
    }
}
