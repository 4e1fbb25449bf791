use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dsvdc_dsuid::Dsuid;

use crate::entity::{Addressable, Vdc};

/// Flat dSUID lookup over the host, its vDCs and all their devices.
///
/// The first entity registered under a dSUID keeps it; later registrations
/// of the same dSUID are ignored.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: RwLock<HashMap<Dsuid, Arc<dyn Addressable>>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Dsuid, Arc<dyn Addressable>>> {
        self.entities.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Dsuid, Arc<dyn Addressable>>> {
        self.entities.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an entity. Returns false if its dSUID is already taken.
    pub fn register(&self, entity: Arc<dyn Addressable>) -> bool {
        let dsuid = entity.dsuid();
        let mut entities = self.write();
        if entities.contains_key(&dsuid) {
            tracing::debug!(%dsuid, kind = %entity.kind(), "dSUID already registered, ignoring");
            return false;
        }
        tracing::debug!(%dsuid, kind = %entity.kind(), name = entity.name(), "registered entity");
        entities.insert(dsuid, entity);
        true
    }

    /// Register a vDC and every device it owns, each first-wins.
    ///
    /// Returns false if the vDC's own dSUID was already taken; its devices
    /// are not registered in that case.
    pub fn register_vdc(&self, vdc: &Arc<Vdc>) -> bool {
        self.register_vdc_with(vdc, vdc.devices())
    }

    /// Like [`EntityRegistry::register_vdc`], with the device list supplied
    /// by a caller already holding the vDC's device table.
    pub(crate) fn register_vdc_with(
        &self,
        vdc: &Arc<Vdc>,
        devices: impl IntoIterator<Item = Arc<dyn Addressable>>,
    ) -> bool {
        let mut entities = self.write();
        let dsuid = vdc.dsuid();
        if entities.contains_key(&dsuid) {
            tracing::warn!(%dsuid, "vDC dSUID already registered, ignoring");
            return false;
        }
        entities.insert(dsuid, Arc::clone(vdc) as Arc<dyn Addressable>);
        for device in devices {
            entities.entry(device.dsuid()).or_insert(device);
        }
        true
    }

    pub fn find(&self, dsuid: &Dsuid) -> Option<Arc<dyn Addressable>> {
        self.read().get(dsuid).cloned()
    }

    pub fn contains(&self, dsuid: &Dsuid) -> bool {
        self.read().contains_key(dsuid)
    }

    pub fn remove(&self, dsuid: &Dsuid) -> Option<Arc<dyn Addressable>> {
        self.write().remove(dsuid)
    }

    /// Remove the entry for `dsuid` only if it is `entity` itself.
    ///
    /// An entity that lost the first-wins race for its dSUID never owned the
    /// entry, so removing it leaves the current owner in place.
    pub fn remove_if_same(&self, dsuid: &Dsuid, entity: &Arc<dyn Addressable>) -> bool {
        let mut entities = self.write();
        match entities.get(dsuid) {
            Some(current) if Arc::ptr_eq(current, entity) => {
                entities.remove(dsuid);
                true
            }
            Some(_) => {
                tracing::debug!(%dsuid, "dSUID owned by another entity, keeping it");
                false
            }
            None => false,
        }
    }

    /// Snapshot of every registered entity.
    pub fn entities(&self) -> Vec<Arc<dyn Addressable>> {
        self.read().values().cloned().collect()
    }

    /// Snapshot of the registered vDCs.
    pub fn vdcs(&self) -> Vec<Arc<Vdc>> {
        self.entities()
            .into_iter()
            .filter_map(|entity| entity.into_vdc())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use dsvdc_dsuid::Namespace;

    use super::*;
    use crate::entity::{Device, EntityKind};

    fn id(name: &str) -> Dsuid {
        Dsuid::generate_v5(Namespace::Vdc, name)
    }

    #[test]
    fn first_registration_wins() {
        let registry = EntityRegistry::new();
        let dsuid = id("lamp");

        assert!(registry.register(Arc::new(Device::new(dsuid, "first"))));
        assert!(!registry.register(Arc::new(Device::new(dsuid, "second"))));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find(&dsuid).unwrap().name(), "first");
    }

    #[test]
    fn find_unknown_is_none() {
        let registry = EntityRegistry::new();
        assert!(registry.find(&id("nothing")).is_none());
    }

    #[test]
    fn register_vdc_adds_devices_without_overwriting() {
        let registry = EntityRegistry::new();
        let shared = id("shared");
        registry.register(Arc::new(Device::new(shared, "already-there")));

        let vdc = Arc::new(Vdc::with_dsuid(id("vdc"), "vdc"));
        vdc.add_device(Arc::new(Device::new(shared, "from-vdc")));
        vdc.add_device(Arc::new(Device::new(id("own"), "own")));

        assert!(registry.register_vdc(&vdc));
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.find(&shared).unwrap().name(), "already-there");
        assert_eq!(registry.find(&id("own")).unwrap().name(), "own");
        assert_eq!(registry.find(&id("vdc")).unwrap().kind(), EntityKind::Vdc);
    }

    #[test]
    fn duplicate_vdc_rejected() {
        let registry = EntityRegistry::new();
        let first = Arc::new(Vdc::with_dsuid(id("vdc"), "first"));
        let second = Arc::new(Vdc::with_dsuid(id("vdc"), "second"));
        second.add_device(Arc::new(Device::new(id("lamp"), "lamp")));

        assert!(registry.register_vdc(&first));
        assert!(!registry.register_vdc(&second));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.vdcs()[0].model(), "first");
    }

    #[test]
    fn vdcs_lists_only_vdcs() {
        let registry = EntityRegistry::new();
        registry.register(Arc::new(Device::new(id("lamp"), "lamp")));
        registry.register_vdc(&Arc::new(Vdc::with_dsuid(id("a"), "a")));
        registry.register_vdc(&Arc::new(Vdc::with_dsuid(id("b"), "b")));

        assert_eq!(registry.vdcs().len(), 2);
        assert_eq!(registry.entities().len(), 3);
    }

    #[test]
    fn remove_frees_dsuid() {
        let registry = EntityRegistry::new();
        let dsuid = id("lamp");
        registry.register(Arc::new(Device::new(dsuid, "old")));

        assert!(registry.remove(&dsuid).is_some());
        assert!(!registry.contains(&dsuid));
        assert!(registry.register(Arc::new(Device::new(dsuid, "new"))));
        assert_eq!(registry.find(&dsuid).unwrap().name(), "new");
    }

    #[test]
    fn remove_if_same_keeps_other_owner() {
        let registry = EntityRegistry::new();
        let dsuid = id("lamp");
        let owner: Arc<dyn Addressable> = Arc::new(Device::new(dsuid, "owner"));
        let loser: Arc<dyn Addressable> = Arc::new(Device::new(dsuid, "loser"));
        registry.register(Arc::clone(&owner));
        registry.register(Arc::clone(&loser));

        assert!(!registry.remove_if_same(&dsuid, &loser));
        assert_eq!(registry.find(&dsuid).unwrap().name(), "owner");

        assert!(registry.remove_if_same(&dsuid, &owner));
        assert!(!registry.contains(&dsuid));
        assert!(!registry.remove_if_same(&dsuid, &owner));
    }
}
