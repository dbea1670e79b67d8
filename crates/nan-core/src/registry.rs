//! Session registry.
//!
//! Owns every identifier pool and the peer-link table of one NAN
//! interface, and the session records bound to them. Service sessions
//! (publish and subscribe) draw from one shared id space; data-path
//! sessions draw from the NDP instance id space and hold a reference into
//! the peer-link table.

use std::collections::BTreeMap;

use nan_types::MacAddress;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{IdKind, NanError, NanResult};
use crate::id_pool::IdentifierPool;
use crate::limits::NanLimits;
use crate::peer_link::{LinkHandle, PeerLinkTable};

/// Publish or subscribe service identifier.
pub type ServiceId = u16;

/// NAN data path instance identifier.
pub type NdpInstanceId = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Publish,
    Subscribe,
}

impl ServiceKind {
    pub fn id_kind(&self) -> IdKind {
        match self {
            ServiceKind::Publish => IdKind::Publish,
            ServiceKind::Subscribe => IdKind::Subscribe,
        }
    }
}

/// Indications the host asked not to receive for a service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceOptions {
    pub suppress_terminated: bool,
    pub suppress_match_expired: bool,
    /// Only meaningful to the firmware, which filters received follow-ups.
    pub suppress_received_followup: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceSession {
    pub id: ServiceId,
    pub kind: ServiceKind,
    pub options: ServiceOptions,
}

/// Result of a publish/subscribe allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceGrant {
    pub id: ServiceId,
    /// False when an existing session was updated in place.
    pub created: bool,
    /// Options in force before an update, so a failed update can be undone.
    pub previous: Option<ServiceOptions>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataPathRole {
    Initiator,
    Responder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataPathState {
    Requested,
    Establishing,
    Active,
    Terminating,
}

impl DataPathState {
    fn can_become(&self, next: DataPathState) -> bool {
        use DataPathState::*;
        matches!(
            (*self, next),
            (Requested, Establishing)
                | (Requested, Active)
                | (Establishing, Active)
                | (Requested | Establishing | Active | Terminating, Terminating)
        )
    }
}

/// How a data path came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPathParams {
    pub role: DataPathRole,
    /// Service the peer's request arrived on (responder side only).
    pub service_id: Option<ServiceId>,
    /// Local NDI, known up front for initiators and at response time for
    /// responders.
    pub local_address: Option<MacAddress>,
    /// Firmware's own request id, echoed back in the response.
    pub local_instance_tag: u16,
}

impl DataPathParams {
    pub fn initiator(local_address: Option<MacAddress>) -> Self {
        Self {
            role: DataPathRole::Initiator,
            service_id: None,
            local_address,
            local_instance_tag: 0,
        }
    }

    pub fn responder(service_id: ServiceId, local_instance_tag: u16) -> Self {
        Self {
            role: DataPathRole::Responder,
            service_id: Some(service_id),
            local_address: None,
            local_instance_tag,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataPathSession {
    pub ndp_instance_id: NdpInstanceId,
    pub role: DataPathRole,
    pub state: DataPathState,
    pub peer_address: MacAddress,
    pub local_address: Option<MacAddress>,
    pub link: LinkHandle,
    pub service_id: Option<ServiceId>,
    pub local_instance_tag: u16,
}

/// Sessions removed by [`SessionRegistry::teardown_all`], each in
/// ascending id order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub data_paths: Vec<DataPathSession>,
    pub services: Vec<ServiceSession>,
}

impl TeardownReport {
    pub fn is_empty(&self) -> bool {
        self.data_paths.is_empty() && self.services.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkSnapshot {
    pub slot: usize,
    pub interface_index: u16,
    pub peer_address: MacAddress,
    pub session_count: u32,
}

/// Serialisable dump of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrySnapshot {
    pub service_ids: Vec<ServiceId>,
    pub ndp_instance_ids: Vec<NdpInstanceId>,
    pub links: Vec<LinkSnapshot>,
    pub services: Vec<ServiceSession>,
    pub data_paths: Vec<DataPathSession>,
}

#[derive(Debug, Clone)]
pub struct SessionRegistry {
    service_ids: IdentifierPool,
    ndp_ids: IdentifierPool,
    links: PeerLinkTable,
    services: BTreeMap<ServiceId, ServiceSession>,
    data_paths: BTreeMap<NdpInstanceId, DataPathSession>,
}

impl SessionRegistry {
    pub fn new(limits: &NanLimits) -> Self {
        Self {
            service_ids: IdentifierPool::new(IdKind::Service, limits.max_service_id),
            ndp_ids: IdentifierPool::new(IdKind::NdpInstance, limits.max_ndp_instances),
            links: PeerLinkTable::new(limits.max_ndp_instances, limits.data_ifindex_start),
            services: BTreeMap::new(),
            data_paths: BTreeMap::new(),
        }
    }

    pub fn allocate_publish(
        &mut self,
        requested_id: ServiceId,
        options: ServiceOptions,
    ) -> NanResult<ServiceGrant> {
        self.allocate_service(ServiceKind::Publish, requested_id, options)
    }

    pub fn allocate_subscribe(
        &mut self,
        requested_id: ServiceId,
        options: ServiceOptions,
    ) -> NanResult<ServiceGrant> {
        self.allocate_service(ServiceKind::Subscribe, requested_id, options)
    }

    /// Allocates a fresh id when `requested_id` is 0, otherwise updates the
    /// existing session of the same kind.
    fn allocate_service(
        &mut self,
        kind: ServiceKind,
        requested_id: ServiceId,
        options: ServiceOptions,
    ) -> NanResult<ServiceGrant> {
        if requested_id != 0 {
            let session = self
                .services
                .get_mut(&requested_id)
                .filter(|s| s.kind == kind)
                .ok_or_else(|| NanError::invalid_id(kind.id_kind(), requested_id))?;
            let previous = session.options;
            session.options = options;
            debug!("Updated {:?} session {}", kind, requested_id);
            return Ok(ServiceGrant {
                id: requested_id,
                created: false,
                previous: Some(previous),
            });
        }

        let id = self.service_ids.allocate_next()?;
        self.services.insert(id, ServiceSession { id, kind, options });
        info!("Allocated {:?} session {}", kind, id);
        Ok(ServiceGrant {
            id,
            created: true,
            previous: None,
        })
    }

    /// Puts back the options of an update whose lower-layer request failed.
    pub fn restore_options(&mut self, id: ServiceId, options: ServiceOptions) {
        if let Some(session) = self.services.get_mut(&id) {
            session.options = options;
        }
    }

    pub fn service(&self, id: ServiceId) -> Option<&ServiceSession> {
        self.services.get(&id)
    }

    /// Returns the session for `id` if it exists and has the given kind.
    pub fn validate_service(&self, kind: ServiceKind, id: ServiceId) -> NanResult<&ServiceSession> {
        self.services
            .get(&id)
            .filter(|s| s.kind == kind)
            .ok_or_else(|| NanError::invalid_id(kind.id_kind(), id))
    }

    /// Releases a service id and removes its session.
    pub fn cancel(&mut self, id: ServiceId) -> NanResult<ServiceSession> {
        let session = self
            .services
            .remove(&id)
            .ok_or_else(|| NanError::invalid_id(IdKind::Service, id))?;
        self.service_ids.release(id);
        info!("Cancelled {:?} session {}", session.kind, id);
        Ok(session)
    }

    /// Allocates an NDP instance id and binds it to the link serving
    /// `peer`. Nothing is left allocated on failure.
    pub fn begin_data_path(
        &mut self,
        peer: MacAddress,
        params: DataPathParams,
    ) -> NanResult<(NdpInstanceId, LinkHandle)> {
        let ndp_instance_id = self.ndp_ids.allocate_next()?;

        let link = match self.links.find_or_reserve(peer) {
            Ok(link) => link,
            Err(e) => {
                self.ndp_ids.release(ndp_instance_id);
                return Err(e);
            }
        };
        self.links.increment(link);

        self.data_paths.insert(
            ndp_instance_id,
            DataPathSession {
                ndp_instance_id,
                role: params.role,
                state: DataPathState::Requested,
                peer_address: peer,
                local_address: params.local_address,
                link,
                service_id: params.service_id,
                local_instance_tag: params.local_instance_tag,
            },
        );
        info!(
            "Data path {} to {} on link {} ({:?})",
            ndp_instance_id,
            peer,
            link.slot(),
            params.role
        );
        Ok((ndp_instance_id, link))
    }

    /// Removes a data path and drops its link reference. Unknown ids are
    /// ignored.
    pub fn end_data_path(&mut self, ndp_instance_id: NdpInstanceId) -> Option<DataPathSession> {
        let session = self.data_paths.remove(&ndp_instance_id)?;
        self.links.decrement(session.link);
        self.ndp_ids.release(ndp_instance_id);
        info!("Data path {} ended", ndp_instance_id);
        Some(session)
    }

    pub fn data_path(&self, ndp_instance_id: NdpInstanceId) -> Option<&DataPathSession> {
        self.data_paths.get(&ndp_instance_id)
    }

    pub fn set_local_address(
        &mut self,
        ndp_instance_id: NdpInstanceId,
        local: MacAddress,
    ) -> NanResult<()> {
        let session = self
            .data_paths
            .get_mut(&ndp_instance_id)
            .ok_or_else(|| NanError::not_found(IdKind::NdpInstance, ndp_instance_id))?;
        session.local_address = Some(local);
        Ok(())
    }

    pub fn mark_establishing(&mut self, ndp_instance_id: NdpInstanceId) -> NanResult<()> {
        self.transition(ndp_instance_id, DataPathState::Establishing)
    }

    pub fn mark_active(&mut self, ndp_instance_id: NdpInstanceId) -> NanResult<()> {
        self.transition(ndp_instance_id, DataPathState::Active)
    }

    pub fn mark_terminating(&mut self, ndp_instance_id: NdpInstanceId) -> NanResult<()> {
        self.transition(ndp_instance_id, DataPathState::Terminating)
    }

    fn transition(&mut self, ndp_instance_id: NdpInstanceId, next: DataPathState) -> NanResult<()> {
        let session = self
            .data_paths
            .get_mut(&ndp_instance_id)
            .ok_or_else(|| NanError::not_found(IdKind::NdpInstance, ndp_instance_id))?;

        if !session.state.can_become(next) {
            warn!(
                "Data path {} cannot move from {:?} to {:?}",
                ndp_instance_id, session.state, next
            );
            return Err(NanError::invalid_id(IdKind::NdpInstance, ndp_instance_id));
        }

        debug!(
            "Data path {}: {:?} -> {:?}",
            ndp_instance_id, session.state, next
        );
        session.state = next;
        Ok(())
    }

    /// Finds the data path on `link` whose local NDI is `local`.
    pub fn lookup_by_local_address(
        &self,
        link: LinkHandle,
        local: MacAddress,
    ) -> Option<NdpInstanceId> {
        self.data_paths
            .values()
            .find(|s| s.link == link && s.local_address == Some(local))
            .map(|s| s.ndp_instance_id)
    }

    pub fn links(&self) -> &PeerLinkTable {
        &self.links
    }

    pub fn service_pool(&self) -> &IdentifierPool {
        &self.service_ids
    }

    pub fn ndp_pool(&self) -> &IdentifierPool {
        &self.ndp_ids
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceSession> {
        self.services.values()
    }

    pub fn data_paths(&self) -> impl Iterator<Item = &DataPathSession> {
        self.data_paths.values()
    }

    /// Removes every session and frees every identifier and link.
    pub fn teardown_all(&mut self) -> TeardownReport {
        let data_paths: Vec<_> = std::mem::take(&mut self.data_paths).into_values().collect();
        let services: Vec<_> = std::mem::take(&mut self.services).into_values().collect();

        self.service_ids.clear();
        self.ndp_ids.clear();
        self.links.clear();

        if !data_paths.is_empty() || !services.is_empty() {
            info!(
                "Tore down {} data paths and {} services",
                data_paths.len(),
                services.len()
            );
        }

        TeardownReport {
            data_paths,
            services,
        }
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            service_ids: self.service_ids.iter_allocated().collect(),
            ndp_instance_ids: self.ndp_ids.iter_allocated().collect(),
            links: self
                .links
                .active_links()
                .map(|(handle, link)| LinkSnapshot {
                    slot: handle.slot(),
                    interface_index: self.links.interface_index(handle),
                    peer_address: link.peer_address,
                    session_count: link.session_count,
                })
                .collect(),
            services: self.services.values().copied().collect(),
            data_paths: self.data_paths.values().copied().collect(),
        }
    }
}
