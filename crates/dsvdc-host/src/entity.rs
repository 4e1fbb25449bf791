use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use dsvdc_dsuid::Dsuid;

use crate::error::{HostError, Result};
use crate::host::VdcHost;
use crate::message::{Message, ResultCode};

/// Kind of an addressable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// The vDC host itself.
    Host,
    /// A logical vDC grouping devices.
    Vdc,
    /// A virtual device (vdSD).
    Device,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Host => "vDChost",
            EntityKind::Vdc => "vDC",
            EntityKind::Device => "vdSD",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something the controller can address by dSUID.
///
/// `pong` and `bye` default to [`default_pong`] and [`default_bye`];
/// implementors override them to add their own behaviour.
pub trait Addressable: Send + Sync + fmt::Debug {
    fn dsuid(&self) -> Dsuid;

    fn name(&self) -> &str;

    fn kind(&self) -> EntityKind;

    /// Answer a ping addressed to this entity.
    fn pong(&self, request: &Message) -> Option<Message> {
        default_pong(self, request)
    }

    /// Observe the controller saying bye.
    fn bye(&self, request: &Message) -> Option<Message> {
        default_bye(self, request)
    }

    /// Downcast to a vDC, used to re-announce vDCs after a handshake.
    fn into_vdc(self: Arc<Self>) -> Option<Arc<Vdc>> {
        None
    }
}

/// Pong naming `entity`, or `None` if the request has no ping payload.
pub fn default_pong<E: Addressable + ?Sized>(entity: &E, request: &Message) -> Option<Message> {
    if request.vdsm_send_ping.is_none() {
        tracing::warn!(dsuid = %entity.dsuid(), "incomplete ping request");
        return None;
    }
    tracing::info!(name = entity.name(), dsuid = %entity.dsuid(), "pong");
    Some(Message::pong(entity.dsuid()))
}

/// `ERR_OK` acknowledgement, or `None` if the request has no bye payload.
pub fn default_bye<E: Addressable + ?Sized>(entity: &E, request: &Message) -> Option<Message> {
    if request.vdsm_send_bye.is_none() {
        tracing::warn!(dsuid = %entity.dsuid(), "incomplete bye request");
        return None;
    }
    tracing::info!(name = entity.name(), dsuid = %entity.dsuid(), "bye");
    Some(Message::generic_response(ResultCode::ErrOk, request.message_id))
}

/// Registry entry standing for the host itself.
#[derive(Debug, Clone)]
pub struct HostEntity {
    dsuid: Dsuid,
    name: String,
}

impl HostEntity {
    pub fn new(dsuid: Dsuid, name: impl Into<String>) -> Self {
        Self {
            dsuid,
            name: name.into(),
        }
    }
}

impl Addressable for HostEntity {
    fn dsuid(&self) -> Dsuid {
        self.dsuid
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Host
    }
}

/// A plain virtual device.
#[derive(Debug, Clone)]
pub struct Device {
    dsuid: Dsuid,
    name: String,
}

impl Device {
    pub fn new(dsuid: Dsuid, name: impl Into<String>) -> Self {
        Self {
            dsuid,
            name: name.into(),
        }
    }
}

impl Addressable for Device {
    fn dsuid(&self) -> Dsuid {
        self.dsuid
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Device
    }
}

/// A logical vDC owning a set of devices.
///
/// Becomes `connected` once the controller acknowledges its announcement.
pub struct Vdc {
    dsuid: Dsuid,
    model: String,
    connected: AtomicBool,
    devices: RwLock<HashMap<Dsuid, Arc<dyn Addressable>>>,
    host: RwLock<Weak<VdcHost>>,
}

impl Vdc {
    /// vDC with a random (v4) dSUID.
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_dsuid(Dsuid::generate_v4(), model)
    }

    pub fn with_dsuid(dsuid: Dsuid, model: impl Into<String>) -> Self {
        Self {
            dsuid,
            model: model.into(),
            connected: AtomicBool::new(false),
            devices: RwLock::new(HashMap::new()),
            host: RwLock::new(Weak::new()),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn host(&self) -> Option<Arc<VdcHost>> {
        self.host
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .upgrade()
    }

    /// Register this vDC and its devices with `host`, then attach to it.
    ///
    /// The device table stays locked throughout, so a concurrent
    /// [`Vdc::add_device`] either lands in the registered snapshot or sees
    /// the host afterwards. Returns false if the vDC's dSUID was taken.
    pub(crate) fn attach_to(self: &Arc<Self>, host: &Arc<VdcHost>) -> bool {
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        if !host.registry().register_vdc_with(self, devices.values().cloned()) {
            return false;
        }
        *self.host.write().unwrap_or_else(PoisonError::into_inner) = Arc::downgrade(host);
        true
    }

    /// Snapshot of the devices owned by this vDC.
    pub fn devices(&self) -> Vec<Arc<dyn Addressable>> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn device(&self, dsuid: &Dsuid) -> Option<Arc<dyn Addressable>> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(dsuid)
            .cloned()
    }

    /// Add a device. The first device registered under a dSUID wins.
    ///
    /// If the vDC is already attached, the device is also registered with
    /// the host so it becomes addressable right away.
    pub fn add_device(&self, device: Arc<dyn Addressable>) -> bool {
        let dsuid = device.dsuid();
        let host = {
            let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
            if devices.contains_key(&dsuid) {
                tracing::warn!(vdc = %self.dsuid, %dsuid, "device already present, ignoring");
                return false;
            }
            devices.insert(dsuid, Arc::clone(&device));
            self.host()
        };
        if let Some(host) = host {
            host.registry().register(device);
        }
        true
    }

    /// Remove a device, telling the controller it vanished.
    pub fn remove_device(&self, dsuid: &Dsuid) -> Option<Arc<dyn Addressable>> {
        let removed = self
            .devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(dsuid)?;
        self.vanish(*dsuid);
        if let Some(host) = self.host() {
            host.registry().remove_if_same(dsuid, &removed);
        }
        Some(removed)
    }

    /// Announce this vDC to the controller.
    ///
    /// The vDC is marked connected when the controller answers `ERR_OK`.
    /// Returns the message id of the announcement.
    pub fn announce(self: &Arc<Self>) -> Result<u32> {
        let host = self.host().ok_or(HostError::Detached(self.dsuid))?;
        let message_id = host.next_message_id()?;
        let message = Message::announce_vdc(self.dsuid, message_id);

        tracing::info!(model = %self.model, dsuid = %self.dsuid, message_id, "announcing vDC");
        let vdc = Arc::downgrade(self);
        host.send(
            &message,
            Box::new(move |response| {
                let Some(vdc) = vdc.upgrade() else {
                    return;
                };
                if response.is_ok() {
                    tracing::info!(dsuid = %vdc.dsuid, "vDC announcement accepted");
                    vdc.set_connected(true);
                } else {
                    tracing::warn!(
                        dsuid = %vdc.dsuid,
                        code = ?response.code,
                        "vDC announcement rejected"
                    );
                }
            }),
        )
    }

    /// Tell the controller that `dsuid` has vanished from this vDC.
    ///
    /// The notification is composed in any case and sent when the host has a
    /// controller session. The composed message is returned.
    pub fn vanish(&self, dsuid: Dsuid) -> Message {
        let message = Message::vanish(dsuid);
        match self.host() {
            Some(host) if host.is_connected() => {
                if let Err(err) = host.notify(&message) {
                    tracing::warn!(%dsuid, error = %err, "vanish notification failed");
                }
            }
            _ => tracing::debug!(%dsuid, "vanish composed while disconnected, not sent"),
        }
        message
    }
}

impl fmt::Debug for Vdc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vdc")
            .field("dsuid", &self.dsuid)
            .field("model", &self.model)
            .field("connected", &self.is_connected())
            .field("devices", &self.devices().len())
            .finish()
    }
}

impl Addressable for Vdc {
    fn dsuid(&self) -> Dsuid {
        self.dsuid
    }

    fn name(&self) -> &str {
        &self.model
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Vdc
    }

    fn bye(&self, request: &Message) -> Option<Message> {
        self.set_connected(false);
        default_bye(self, request)
    }

    fn into_vdc(self: Arc<Self>) -> Option<Arc<Vdc>> {
        Some(self)
    }
}
