//! Per-interface NAN context.
//!
//! [`NanInterface`] serialises every HAL command and every lower-layer
//! indication behind one mutex. Commands validate preconditions, mutate the
//! registry and tables, signal the lower layer, and return a
//! [`CommandReply`]. Indications drive the data-path state machine and
//! queue notifications that the caller collects with
//! [`NanInterface::take_notifications`].

use std::sync::Arc;

use nan_types::{DiscoveryMacRandomization, MacAddress};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::dispatcher::{map_result_code, map_service_reason, EventDispatcher, NanEvent, Notification};
use crate::error::{IdKind, NanError, NanResult};
use crate::followup::{FollowupCorrelation, FollowupCorrelationTable};
use crate::limits::NanLimits;
use crate::lower_layer::{NanLowerLayer, NdpResponse};
use crate::registry::{
    DataPathParams, DataPathRole, DataPathState, NdpInstanceId, RegistrySnapshot, ServiceId,
    ServiceKind, ServiceOptions, SessionRegistry,
};
use crate::request::{
    CommandReply, ConfigRequest, DataPathIndication, DataPathInitiateRequest,
    DataPathRespondRequest, DiscoveryEngineEvent, DiscoveryEventKind, EnableRequest,
    FollowupRequest, MatchKey, NanCapabilities, PublishRequest, SubscribeRequest,
    TerminationTarget, TransactionId,
};
use crate::status::{DataPathResponse, HalStatus, LowerResultCode, ResponseType, ServiceReason};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    #[default]
    Disabled,
    Enabled,
}

/// Serialisable dump of one interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceSnapshot {
    pub state: ServiceState,
    pub master_preference: u8,
    pub discovery: DiscoveryMacRandomization,
    pub local_nmi: Option<MacAddress>,
    pub cluster_id: Option<MacAddress>,
    pub registry: RegistrySnapshot,
    pub followups: Vec<FollowupCorrelation>,
    pub pending_notifications: usize,
}

struct NanState {
    service_state: ServiceState,
    master_preference: u8,
    discovery: DiscoveryMacRandomization,
    local_nmi: Option<MacAddress>,
    cluster_id: Option<MacAddress>,
    registry: SessionRegistry,
    followups: FollowupCorrelationTable,
    dispatcher: EventDispatcher,
}

impl NanState {
    fn ensure_enabled(&self) -> NanResult<()> {
        match self.service_state {
            ServiceState::Enabled => Ok(()),
            ServiceState::Disabled => Err(NanError::NotEnabled),
        }
    }
}

pub struct NanInterface {
    limits: NanLimits,
    lower: Arc<dyn NanLowerLayer>,
    state: Mutex<NanState>,
}

impl NanInterface {
    /// Creates a disabled interface. `limits` must pass [`NanLimits::check`];
    /// out-of-range identifier spaces panic.
    pub fn new(limits: NanLimits, lower: Arc<dyn NanLowerLayer>) -> Self {
        let state = NanState {
            service_state: ServiceState::Disabled,
            master_preference: 0,
            discovery: DiscoveryMacRandomization::default(),
            local_nmi: None,
            cluster_id: None,
            registry: SessionRegistry::new(&limits),
            followups: FollowupCorrelationTable::new(limits.max_followup_requests),
            dispatcher: EventDispatcher::new(),
        };
        Self {
            limits,
            lower,
            state: Mutex::new(state),
        }
    }

    pub fn limits(&self) -> &NanLimits {
        &self.limits
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().service_state == ServiceState::Enabled
    }

    // ---- HAL commands ----

    #[instrument(skip(self))]
    pub fn enable(&self, request: EnableRequest) -> CommandReply {
        let mut state = self.state.lock();
        let result = (|| -> NanResult<u16> {
            if state.service_state == ServiceState::Enabled {
                return Err(NanError::AlreadyEnabled);
            }
            self.lower
                .enable(&request)
                .map_err(|e| NanError::lower_layer("enable", e))?;
            state.service_state = ServiceState::Enabled;
            state.master_preference = request.master_preference;
            state.discovery = request.discovery;
            state.cluster_id = None;
            info!(
                "NAN enabled (rand interval {}s, cluster merge {:?})",
                request.discovery.interval_secs, request.discovery.cluster_merge
            );
            Ok(0)
        })();
        reply(ResponseType::Enabled, request.transaction_id, result, 0)
    }

    /// Stops NAN and tears down every session. Each torn-down data path and
    /// service yields a notification, followed by a final `Disabled`.
    #[instrument(skip(self))]
    pub fn disable(&self, transaction_id: TransactionId) -> CommandReply {
        let mut state = self.state.lock();
        if state.service_state == ServiceState::Disabled {
            debug!("NAN already disabled");
            return CommandReply::success(ResponseType::Disabled, transaction_id, 0);
        }

        if let Err(e) = self.lower.disable() {
            error!("Lower layer disable failed: {}", e);
        }

        let report = state.registry.teardown_all();
        state.followups.clear();

        for session in &report.data_paths {
            state.dispatcher.emit(NanEvent::DataPathEnded {
                ndp_instance_id: session.ndp_instance_id,
            });
        }
        for session in report.services.iter().filter(|s| !s.options.suppress_terminated) {
            state.dispatcher.emit(service_terminated(
                session.kind,
                session.id,
                HalStatus::Success,
            ));
        }
        state.dispatcher.emit(NanEvent::Disabled {
            status: HalStatus::Success,
        });

        state.service_state = ServiceState::Disabled;
        state.master_preference = 0;
        state.discovery = DiscoveryMacRandomization::default();
        state.local_nmi = None;
        state.cluster_id = None;
        info!(
            "NAN disabled ({} data paths, {} services torn down)",
            report.data_paths.len(),
            report.services.len()
        );
        CommandReply::success(ResponseType::Disabled, transaction_id, 0)
    }

    /// Reconfigures an enabled interface. The stored settings change only
    /// once the lower layer accepted them.
    #[instrument(skip(self))]
    pub fn set_config(&self, request: ConfigRequest) -> CommandReply {
        let mut state = self.state.lock();
        let result = (|| -> NanResult<u16> {
            state.ensure_enabled()?;
            self.lower
                .set_config(&request)
                .map_err(|e| NanError::lower_layer("set_config", e))?;
            if let Some(master_preference) = request.master_preference {
                state.master_preference = master_preference;
            }
            state.discovery = request.discovery;
            info!(
                "NAN config updated (master preference {}, rand interval {}s, cluster merge {:?})",
                state.master_preference,
                request.discovery.interval_secs,
                request.discovery.cluster_merge
            );
            Ok(0)
        })();
        reply(ResponseType::Config, request.transaction_id, result, 0)
    }

    /// Reports the firmware's limits, bounded by the configured NDP instance
    /// count. Always succeeds; a failed read reports only the local bounds.
    #[instrument(skip(self))]
    pub fn get_capabilities(
        &self,
        transaction_id: TransactionId,
    ) -> (CommandReply, NanCapabilities) {
        let _state = self.state.lock();
        let reported = self.lower.capabilities().unwrap_or_else(|e| {
            error!("Lower layer capabilities read failed: {}", e);
            NanCapabilities::default()
        });
        let capabilities = reported.bounded_by(self.limits.max_ndp_instances);
        debug!("NAN capabilities {:?}", capabilities);
        (
            CommandReply::success(ResponseType::GetCapabilities, transaction_id, 0),
            capabilities,
        )
    }

    #[instrument(skip(self))]
    pub fn publish(&self, request: PublishRequest) -> CommandReply {
        let mut state = self.state.lock();
        let result = self.start_service(
            &mut state,
            ServiceKind::Publish,
            request.publish_id,
            request.options,
            |lower, id| lower.publish(id, &request),
        );
        reply(
            ResponseType::Publish,
            request.transaction_id,
            result,
            request.publish_id,
        )
    }

    #[instrument(skip(self))]
    pub fn publish_cancel(
        &self,
        transaction_id: TransactionId,
        publish_id: ServiceId,
    ) -> CommandReply {
        let mut state = self.state.lock();
        let result = self.stop_service(&mut state, ServiceKind::Publish, publish_id, |lower, id| {
            lower.publish_cancel(id)
        });
        reply(ResponseType::PublishCancel, transaction_id, result, publish_id)
    }

    #[instrument(skip(self))]
    pub fn subscribe(&self, request: SubscribeRequest) -> CommandReply {
        let mut state = self.state.lock();
        let result = self.start_service(
            &mut state,
            ServiceKind::Subscribe,
            request.subscribe_id,
            request.options,
            |lower, id| lower.subscribe(id, &request),
        );
        reply(
            ResponseType::Subscribe,
            request.transaction_id,
            result,
            request.subscribe_id,
        )
    }

    #[instrument(skip(self))]
    pub fn subscribe_cancel(
        &self,
        transaction_id: TransactionId,
        subscribe_id: ServiceId,
    ) -> CommandReply {
        let mut state = self.state.lock();
        let result =
            self.stop_service(&mut state, ServiceKind::Subscribe, subscribe_id, |lower, id| {
                lower.subscribe_cancel(id)
            });
        reply(ResponseType::SubscribeCancel, transaction_id, result, subscribe_id)
    }

    #[instrument(skip(self))]
    pub fn transmit_followup(&self, request: FollowupRequest) -> CommandReply {
        let mut state = self.state.lock();
        let result = (|| -> NanResult<u16> {
            state.ensure_enabled()?;
            if state.registry.service(request.service_id).is_none() {
                return Err(NanError::invalid_id(IdKind::Service, request.service_id));
            }
            state
                .followups
                .register(request.match_key, request.transaction_id)?;

            if let Err(e) = self.lower.transmit_followup(&request) {
                // Nothing will complete this transaction.
                let _ = state.followups.resolve_and_remove(request.match_key);
                return Err(NanError::lower_layer("transmit_followup", e));
            }
            Ok(request.service_id)
        })();
        reply(
            ResponseType::TransmitFollowup,
            request.transaction_id,
            result,
            request.service_id,
        )
    }

    #[instrument(skip(self))]
    pub fn data_path_initiate(&self, request: DataPathInitiateRequest) -> CommandReply {
        let mut state = self.state.lock();
        let result = (|| -> NanResult<u16> {
            state.ensure_enabled()?;
            let (ndp_instance_id, link) = state
                .registry
                .begin_data_path(request.peer, DataPathParams::initiator(request.local_ndi))?;
            let ndl_ifindex = state.registry.links().interface_index(link);

            if let Err(e) = self.lower.ndp_request(ndp_instance_id, ndl_ifindex, &request) {
                state.registry.end_data_path(ndp_instance_id);
                return Err(NanError::lower_layer("ndp_request", e));
            }
            state.registry.mark_establishing(ndp_instance_id)?;
            info!(
                "Data path {} requested to {} on NDL {}",
                ndp_instance_id, request.peer, ndl_ifindex
            );
            Ok(ndp_instance_id)
        })();
        reply(ResponseType::DataPathInitiator, request.transaction_id, result, 0)
    }

    /// Answers a peer's data-path request. A reject ends the data path
    /// without a notification.
    #[instrument(skip(self))]
    pub fn data_path_respond(&self, request: DataPathRespondRequest) -> CommandReply {
        let mut state = self.state.lock();
        let ndp_instance_id = request.ndp_instance_id;
        let result = (|| -> NanResult<u16> {
            state.ensure_enabled()?;
            let session = state
                .registry
                .data_path(ndp_instance_id)
                .copied()
                .filter(|s| s.role == DataPathRole::Responder && s.state == DataPathState::Requested)
                .ok_or_else(|| NanError::invalid_id(IdKind::NdpInstance, ndp_instance_id))?;

            let response = NdpResponse {
                ndp_instance_id,
                ndl_ifindex: state.registry.links().interface_index(session.link),
                local_instance_tag: session.local_instance_tag,
                local_ndi: request.local_ndi,
                accept: request.accept,
            };
            if let Err(e) = self.lower.ndp_response(&response) {
                state.registry.end_data_path(ndp_instance_id);
                return Err(NanError::lower_layer("ndp_response", e));
            }

            if request.accept {
                if let Some(local) = request.local_ndi {
                    state.registry.set_local_address(ndp_instance_id, local)?;
                }
                state.registry.mark_establishing(ndp_instance_id)?;
            } else {
                state.registry.end_data_path(ndp_instance_id);
                info!("Data path {} rejected by host", ndp_instance_id);
            }
            Ok(ndp_instance_id)
        })();
        reply(
            ResponseType::DataPathResponder,
            request.transaction_id,
            result,
            ndp_instance_id,
        )
    }

    /// Asks the firmware to end each listed data path. Unknown ids are
    /// skipped; known ones stay registered as terminating until the
    /// termination indication arrives.
    ///
    /// While disabled nothing can be live, so a single `DataPathEnded` for
    /// id 0 is reported and the command succeeds.
    #[instrument(skip(self))]
    pub fn data_path_end(
        &self,
        transaction_id: TransactionId,
        ndp_instance_ids: &[NdpInstanceId],
    ) -> CommandReply {
        let mut state = self.state.lock();
        if state.ensure_enabled().is_err() {
            warn!("Data path end while NAN is disabled");
            state
                .dispatcher
                .emit(NanEvent::DataPathEnded { ndp_instance_id: 0 });
            return CommandReply::success(ResponseType::DataPathEnd, transaction_id, 0);
        }

        let mut status = HalStatus::Success;
        for &id in ndp_instance_ids {
            if state.registry.data_path(id).is_none() {
                debug!("Ignoring end of unknown data path {}", id);
                continue;
            }
            match self.lower.ndp_terminate(id) {
                Ok(()) => {
                    if let Err(e) = state.registry.mark_terminating(id) {
                        warn!("Data path {}: {}", id, e);
                    }
                }
                Err(e) => {
                    error!("Lower layer ndp_terminate failed for {}: {}", id, e);
                    status = HalStatus::InternalFailure;
                }
            }
        }
        CommandReply {
            response: ResponseType::DataPathEnd,
            transaction_id,
            status,
            id: 0,
        }
    }

    // ---- Lower-layer indications ----

    /// Data-path setup confirm from the firmware.
    ///
    /// An accept for a data path the host is already ending is dropped; the
    /// termination indication that follows reports the end. A reject always
    /// ends the data path.
    #[instrument(skip(self))]
    pub fn accept_or_reject(
        &self,
        ndp_instance_id: NdpInstanceId,
        code: LowerResultCode,
    ) -> NanResult<()> {
        let mut state = self.state.lock();
        let session = state
            .registry
            .data_path(ndp_instance_id)
            .copied()
            .ok_or_else(|| NanError::not_found(IdKind::NdpInstance, ndp_instance_id))?;

        let (response, status) = map_result_code(code);
        match response {
            DataPathResponse::Accept if session.state == DataPathState::Terminating => {
                debug!(
                    "Data path {} confirmed while terminating, awaiting termination",
                    ndp_instance_id
                );
                return Ok(());
            }
            DataPathResponse::Accept => {
                state.registry.mark_active(ndp_instance_id)?;
                info!("Data path {} to {} established", ndp_instance_id, session.peer_address);
            }
            DataPathResponse::Reject => {
                state.registry.end_data_path(ndp_instance_id);
                warn!(
                    "Data path {} to {} rejected: {:?} ({:?})",
                    ndp_instance_id, session.peer_address, code, status
                );
            }
        }
        state.dispatcher.emit(NanEvent::data_path_confirm(
            ndp_instance_id,
            session.peer_address,
            code,
        ));
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn terminate(&self, target: TerminationTarget, reason: ServiceReason) -> NanResult<()> {
        let mut state = self.state.lock();
        match target {
            TerminationTarget::Publish(id) => {
                self.end_service(&mut state, ServiceKind::Publish, id, reason)
            }
            TerminationTarget::Subscribe(id) => {
                self.end_service(&mut state, ServiceKind::Subscribe, id, reason)
            }
            TerminationTarget::DataPath(id) => {
                state
                    .registry
                    .end_data_path(id)
                    .ok_or_else(|| NanError::not_found(IdKind::NdpInstance, id))?;
                state
                    .dispatcher
                    .emit(NanEvent::DataPathEnded { ndp_instance_id: id });
                Ok(())
            }
        }
    }

    /// Follow-up transmit status from the firmware.
    #[instrument(skip(self))]
    pub fn deliver_followup_completion(
        &self,
        match_key: MatchKey,
        reason: ServiceReason,
    ) -> NanResult<()> {
        let mut state = self.state.lock();
        let transaction_id = state.followups.resolve_and_remove(match_key)?;
        state.dispatcher.emit(NanEvent::FollowupDelivered {
            transaction_id,
            status: map_service_reason(reason),
        });
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn match_expired(&self, service_id: ServiceId) -> NanResult<()> {
        let mut state = self.state.lock();
        let session = state
            .registry
            .service(service_id)
            .copied()
            .ok_or_else(|| NanError::not_found(IdKind::Service, service_id))?;
        if session.options.suppress_match_expired {
            debug!("Match expired on {} suppressed", service_id);
        } else {
            state.dispatcher.emit(NanEvent::MatchExpired { service_id });
        }
        Ok(())
    }

    /// Discovery engine indication: the local NMI changed, or a cluster was
    /// started or joined.
    #[instrument(skip(self))]
    pub fn discovery_engine_event(&self, event: DiscoveryEngineEvent) -> NanResult<()> {
        let mut state = self.state.lock();
        state.ensure_enabled()?;
        match event.kind {
            DiscoveryEventKind::NmiAddressChanged => state.local_nmi = Some(event.address),
            DiscoveryEventKind::ClusterStarted | DiscoveryEventKind::ClusterJoined => {
                state.cluster_id = Some(event.address)
            }
        }
        info!("Discovery engine {:?}: {}", event.kind, event.address);
        state.dispatcher.emit(NanEvent::DiscoveryEngine {
            discovery_event: event.kind,
            address: event.address,
        });
        Ok(())
    }

    /// A peer asked for a data path. When no NDP id or link is free the
    /// firmware is told to reject and nothing is reported to the host.
    #[instrument(skip(self))]
    pub fn data_path_requested(&self, indication: DataPathIndication) -> NanResult<()> {
        let mut state = self.state.lock();
        state.ensure_enabled()?;

        let params = DataPathParams::responder(indication.service_id, indication.local_instance_tag);
        match state.registry.begin_data_path(indication.peer, params) {
            Ok((ndp_instance_id, _)) => {
                info!(
                    "Data path {} requested by {} on service {}",
                    ndp_instance_id, indication.peer, indication.service_id
                );
                state.dispatcher.emit(NanEvent::DataPathRequested {
                    ndp_instance_id,
                    service_id: indication.service_id,
                    peer: indication.peer,
                });
                Ok(())
            }
            Err(e) => {
                warn!(
                    "Rejecting data path request from {}: {}",
                    indication.peer, e
                );
                let response = NdpResponse::reject(indication.local_instance_tag);
                if let Err(msg) = self.lower.ndp_response(&response) {
                    error!("Lower layer ndp_response failed: {}", msg);
                }
                Err(e)
            }
        }
    }

    // ---- Outputs ----

    pub fn take_notifications(&self) -> Vec<Notification> {
        self.state.lock().dispatcher.drain()
    }

    pub fn snapshot(&self) -> InterfaceSnapshot {
        let state = self.state.lock();
        InterfaceSnapshot {
            state: state.service_state,
            master_preference: state.master_preference,
            discovery: state.discovery,
            local_nmi: state.local_nmi,
            cluster_id: state.cluster_id,
            registry: state.registry.snapshot(),
            followups: state.followups.entries().to_vec(),
            pending_notifications: state.dispatcher.pending(),
        }
    }

    // ---- Helpers ----

    fn start_service(
        &self,
        state: &mut NanState,
        kind: ServiceKind,
        requested_id: ServiceId,
        options: ServiceOptions,
        send: impl FnOnce(&dyn NanLowerLayer, ServiceId) -> Result<(), String>,
    ) -> NanResult<ServiceId> {
        state.ensure_enabled()?;
        let grant = match kind {
            ServiceKind::Publish => state.registry.allocate_publish(requested_id, options)?,
            ServiceKind::Subscribe => state.registry.allocate_subscribe(requested_id, options)?,
        };

        if let Err(e) = send(self.lower.as_ref(), grant.id) {
            if grant.created {
                state.registry.cancel(grant.id)?;
            } else if let Some(previous) = grant.previous {
                state.registry.restore_options(grant.id, previous);
            }
            return Err(NanError::lower_layer(format!("{:?}", kind).to_lowercase(), e));
        }
        Ok(grant.id)
    }

    fn stop_service(
        &self,
        state: &mut NanState,
        kind: ServiceKind,
        id: ServiceId,
        send: impl FnOnce(&dyn NanLowerLayer, ServiceId) -> Result<(), String>,
    ) -> NanResult<ServiceId> {
        state.ensure_enabled()?;
        state.registry.validate_service(kind, id)?;
        send(self.lower.as_ref(), id)
            .map_err(|e| NanError::lower_layer(format!("{:?}_cancel", kind).to_lowercase(), e))?;
        state.registry.cancel(id)?;
        Ok(id)
    }

    fn end_service(
        &self,
        state: &mut NanState,
        kind: ServiceKind,
        id: ServiceId,
        reason: ServiceReason,
    ) -> NanResult<()> {
        if state.registry.validate_service(kind, id).is_err() {
            return Err(NanError::not_found(kind.id_kind(), id));
        }
        let session = state.registry.cancel(id)?;
        if session.options.suppress_terminated {
            debug!("Termination of {:?} {} suppressed", kind, id);
        } else {
            state
                .dispatcher
                .emit(service_terminated(kind, id, map_service_reason(reason)));
        }
        Ok(())
    }
}

fn service_terminated(kind: ServiceKind, id: ServiceId, status: HalStatus) -> NanEvent {
    match kind {
        ServiceKind::Publish => NanEvent::PublishTerminated {
            publish_id: id,
            status,
        },
        ServiceKind::Subscribe => NanEvent::SubscribeTerminated {
            subscribe_id: id,
            status,
        },
    }
}

fn reply(
    response: ResponseType,
    transaction_id: TransactionId,
    result: NanResult<u16>,
    fallback_id: u16,
) -> CommandReply {
    match result {
        Ok(id) => CommandReply::success(response, transaction_id, id),
        Err(e) => {
            let status = e.status();
            if e.is_expected() {
                warn!(
                    response = response.code(),
                    status = status.code(),
                    transaction_id,
                    "{:?} request refused: {}",
                    response,
                    e
                );
            } else {
                error!(
                    response = response.code(),
                    status = status.code(),
                    transaction_id,
                    "{:?} request failed: {}",
                    response,
                    e
                );
            }
            CommandReply::failure(response, transaction_id, status, fallback_id)
        }
    }
}
