//! Integration tests for the NAN interface against a recording firmware
//! layer.
//!
//! The mock records every signal it is sent and can be told to refuse the
//! next signal of a given kind, which exercises the rollback paths.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use nan_core::{
    ConfigRequest, DataPathIndication, DataPathInitiateRequest, DataPathRespondRequest,
    DataPathState, EnableRequest, FollowupRequest, HalStatus, IdKind, IdentifierPool,
    LowerResultCode, NanCapabilities, NanError, NanEvent, NanInterface, NanLimits,
    NanLowerLayer, NdpInstanceId, NdpResponse, PublishRequest, ResponseType, ServiceId,
    ServiceOptions, ServiceReason, SubscribeRequest, TerminationTarget,
};
use nan_types::MacAddress;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Enable,
    Disable,
    SetConfig { master_preference: Option<u8> },
    Publish(ServiceId),
    PublishCancel(ServiceId),
    Subscribe(ServiceId),
    SubscribeCancel(ServiceId),
    Followup { service_id: ServiceId, match_key: u16 },
    NdpRequest { ndp_instance_id: NdpInstanceId, ndl_ifindex: u16 },
    NdpResponse(NdpResponse),
    NdpTerminate(NdpInstanceId),
}

/// Mock firmware layer for testing
#[derive(Default)]
pub struct MockFirmware {
    signals: Mutex<Vec<Signal>>,
    refuse_next: Mutex<Option<&'static str>>,
}

impl MockFirmware {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes the next signal named `op` fail.
    pub fn refuse_next(&self, op: &'static str) {
        *self.refuse_next.lock().unwrap() = Some(op);
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.signals.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.signals.lock().unwrap().clear();
    }

    fn record(&self, op: &'static str, signal: Signal) -> Result<(), String> {
        let mut refuse = self.refuse_next.lock().unwrap();
        if *refuse == Some(op) {
            *refuse = None;
            return Err(format!("{} refused", op));
        }
        self.signals.lock().unwrap().push(signal);
        Ok(())
    }
}

impl NanLowerLayer for MockFirmware {
    fn enable(&self, _request: &EnableRequest) -> Result<(), String> {
        self.record("enable", Signal::Enable)
    }

    fn disable(&self) -> Result<(), String> {
        self.record("disable", Signal::Disable)
    }

    fn set_config(&self, request: &ConfigRequest) -> Result<(), String> {
        self.record(
            "set_config",
            Signal::SetConfig {
                master_preference: request.master_preference,
            },
        )
    }

    fn capabilities(&self) -> Result<NanCapabilities, String> {
        let mut refuse = self.refuse_next.lock().unwrap();
        if *refuse == Some("capabilities") {
            *refuse = None;
            return Err("capabilities refused".to_string());
        }
        Ok(NanCapabilities {
            max_concurrent_nan_clusters: 1,
            max_publishes: 8,
            max_subscribes: 8,
            max_service_name_len: 255,
            max_ndi_interfaces: 2,
            max_ndp_sessions: 32,
            max_app_info_len: 255,
            max_queued_transmit_followup_msgs: 20,
        })
    }

    fn publish(&self, publish_id: ServiceId, _request: &PublishRequest) -> Result<(), String> {
        self.record("publish", Signal::Publish(publish_id))
    }

    fn publish_cancel(&self, publish_id: ServiceId) -> Result<(), String> {
        self.record("publish_cancel", Signal::PublishCancel(publish_id))
    }

    fn subscribe(&self, subscribe_id: ServiceId, _request: &SubscribeRequest) -> Result<(), String> {
        self.record("subscribe", Signal::Subscribe(subscribe_id))
    }

    fn subscribe_cancel(&self, subscribe_id: ServiceId) -> Result<(), String> {
        self.record("subscribe_cancel", Signal::SubscribeCancel(subscribe_id))
    }

    fn transmit_followup(&self, request: &FollowupRequest) -> Result<(), String> {
        self.record(
            "transmit_followup",
            Signal::Followup {
                service_id: request.service_id,
                match_key: request.match_key,
            },
        )
    }

    fn ndp_request(
        &self,
        ndp_instance_id: NdpInstanceId,
        ndl_ifindex: u16,
        _request: &DataPathInitiateRequest,
    ) -> Result<(), String> {
        self.record(
            "ndp_request",
            Signal::NdpRequest {
                ndp_instance_id,
                ndl_ifindex,
            },
        )
    }

    fn ndp_response(&self, response: &NdpResponse) -> Result<(), String> {
        self.record("ndp_response", Signal::NdpResponse(*response))
    }

    fn ndp_terminate(&self, ndp_instance_id: NdpInstanceId) -> Result<(), String> {
        self.record("ndp_terminate", Signal::NdpTerminate(ndp_instance_id))
    }
}

fn peer(last: u8) -> MacAddress {
    MacAddress::new([0x02, 0xaa, 0xbb, 0xcc, 0xdd, last])
}

fn setup() -> (Arc<MockFirmware>, NanInterface) {
    let firmware = MockFirmware::new();
    let nan = NanInterface::new(NanLimits::default(), firmware.clone());
    assert!(nan.enable(EnableRequest::default()).is_success());
    firmware.clear();
    (firmware, nan)
}

fn initiate(nan: &NanInterface, to: MacAddress) -> nan_core::CommandReply {
    nan.data_path_initiate(DataPathInitiateRequest {
        transaction_id: 0,
        peer: to,
        local_ndi: None,
        requestor_instance_id: 1,
    })
}

fn events(nan: &NanInterface) -> Vec<NanEvent> {
    nan.take_notifications().into_iter().map(|n| n.event).collect()
}

#[test]
fn test_pool_never_exceeds_capacity() {
    let mut rng = StdRng::seed_from_u64(0x4e41_4e00);
    for capacity in [1u16, 8, 16, 63] {
        let mut pool = IdentifierPool::new(IdKind::NdpInstance, capacity);
        let mut live: HashSet<u16> = HashSet::new();

        for _ in 0..2000 {
            if rng.gen_bool(0.6) {
                let hint = rng.gen_range(0..=capacity + 2);
                match pool.allocate(hint) {
                    Ok(id) => {
                        assert!((1..=capacity).contains(&id));
                        assert!(live.insert(id), "id {} handed out twice", id);
                    }
                    Err(e) => {
                        assert_eq!(e, NanError::exhausted(IdKind::NdpInstance));
                        assert_eq!(live.len(), usize::from(capacity));
                    }
                }
            } else if let Some(&id) = live.iter().next() {
                pool.release(id);
                live.remove(&id);
            }
            assert!(pool.allocated_count() <= usize::from(capacity));
            assert_eq!(pool.allocated_count(), live.len());
        }
    }
}

#[test]
fn test_capacity_eight_exhaustion_and_reuse() {
    let mut pool = IdentifierPool::new(IdKind::NdpInstance, 8);
    for expected in 1..=8 {
        assert_eq!(pool.allocate(1).unwrap(), expected);
    }
    assert_eq!(pool.allocate(1), Err(NanError::exhausted(IdKind::NdpInstance)));
    pool.release(3);
    assert_eq!(pool.allocate(1).unwrap(), 3);
}

#[test]
fn test_initiate_then_end_restores_tables() {
    let (_firmware, nan) = setup();
    initiate(&nan, peer(1));
    let before = nan.snapshot().registry;

    let reply = initiate(&nan, peer(2));
    assert!(reply.is_success());
    nan.terminate(TerminationTarget::DataPath(reply.id), ServiceReason::UserRequest)
        .unwrap();

    let after = nan.snapshot().registry;
    assert_eq!(after.ndp_instance_ids, before.ndp_instance_ids);
    assert_eq!(after.links, before.links);

    // The rotation cursor is back where it was too.
    assert_eq!(initiate(&nan, peer(2)).id, reply.id);
}

#[test]
fn test_round_trip_on_fresh_interface_reuses_first_id() {
    let (_firmware, nan) = setup();
    let first = initiate(&nan, peer(1));
    assert_eq!(first.id, 1);
    nan.terminate(TerminationTarget::DataPath(first.id), ServiceReason::UserRequest)
        .unwrap();
    assert_eq!(initiate(&nan, peer(1)).id, 1);
}

#[test]
fn test_same_peer_shares_link() {
    let (firmware, nan) = setup();
    let a = initiate(&nan, peer(7));
    let b = initiate(&nan, peer(7));
    assert!(a.is_success() && b.is_success());
    assert_ne!(a.id, b.id);

    let links = nan.snapshot().registry.links;
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].session_count, 2);
    assert_eq!(links[0].interface_index, 5);

    assert_eq!(
        firmware.signals(),
        vec![
            Signal::NdpRequest {
                ndp_instance_id: a.id,
                ndl_ifindex: 5
            },
            Signal::NdpRequest {
                ndp_instance_id: b.id,
                ndl_ifindex: 5
            },
        ]
    );
}

#[test]
fn test_initiate_exhausted_leaves_links_untouched() {
    let (_firmware, nan) = setup();
    for _ in 0..8 {
        assert!(initiate(&nan, peer(1)).is_success());
    }
    let before = nan.snapshot().registry;

    let reply = initiate(&nan, peer(9));
    assert_eq!(reply.status, HalStatus::NoResourceAvailable);
    assert_eq!(reply.response, ResponseType::DataPathInitiator);
    assert_eq!(nan.snapshot().registry, before);
    assert_eq!(before.links[0].session_count, 8);
}

#[test]
fn test_initiate_refused_by_firmware_rolls_back() {
    let (firmware, nan) = setup();
    firmware.refuse_next("ndp_request");
    let reply = initiate(&nan, peer(3));
    assert_eq!(reply.status, HalStatus::InternalFailure);

    let snap = nan.snapshot().registry;
    assert!(snap.ndp_instance_ids.is_empty());
    assert!(snap.links.is_empty());
}

#[test]
fn test_disable_ends_every_data_path() {
    let (firmware, nan) = setup();
    let publish = nan.publish(PublishRequest::default());
    let subscribe = nan.subscribe(SubscribeRequest::default());
    let mut ids: Vec<u16> = (0..5).map(|i| initiate(&nan, peer(i % 3)).id).collect();
    ids.sort_unstable();
    nan.take_notifications();

    assert!(nan.disable(0).is_success());
    let events = events(&nan);

    let ended: Vec<u16> = events
        .iter()
        .filter_map(|e| match e {
            NanEvent::DataPathEnded { ndp_instance_id } => Some(*ndp_instance_id),
            _ => None,
        })
        .collect();
    assert_eq!(ended, ids);

    assert_eq!(
        events[ids.len()..].to_vec(),
        vec![
            NanEvent::PublishTerminated {
                publish_id: publish.id,
                status: HalStatus::Success
            },
            NanEvent::SubscribeTerminated {
                subscribe_id: subscribe.id,
                status: HalStatus::Success
            },
            NanEvent::Disabled {
                status: HalStatus::Success
            },
        ]
    );

    let snap = nan.snapshot();
    assert!(snap.registry.service_ids.is_empty());
    assert!(snap.registry.ndp_instance_ids.is_empty());
    assert!(snap.registry.links.is_empty());
    assert!(firmware.signals().contains(&Signal::Disable));

    // Disabling again does nothing.
    assert!(nan.disable(0).is_success());
    assert!(nan.take_notifications().is_empty());
}

#[test]
fn test_followup_same_match_is_queue_full() {
    let (firmware, nan) = setup();
    let service = nan.subscribe(SubscribeRequest::default()).id;
    let request = FollowupRequest {
        service_id: service,
        match_key: 4,
        transaction_id: 100,
    };
    assert!(nan.transmit_followup(request).is_success());

    let second = nan.transmit_followup(FollowupRequest {
        transaction_id: 101,
        ..request
    });
    assert_eq!(second.status, HalStatus::FollowupQueueFull);
    assert_eq!(
        firmware.signals(),
        vec![
            Signal::Subscribe(service),
            Signal::Followup {
                service_id: service,
                match_key: 4
            }
        ]
    );

    nan.deliver_followup_completion(4, ServiceReason::FollowupTransmitSuccess)
        .unwrap();
    assert_eq!(
        events(&nan),
        vec![NanEvent::FollowupDelivered {
            transaction_id: 100,
            status: HalStatus::Success
        }]
    );
    assert!(nan.transmit_followup(request).is_success());
}

#[test]
fn test_followup_validation_and_failure() {
    let (firmware, nan) = setup();
    let unknown = nan.transmit_followup(FollowupRequest {
        service_id: 5,
        match_key: 1,
        transaction_id: 1,
    });
    assert_eq!(unknown.status, HalStatus::InvalidPublishSubscribeId);

    let service = nan.publish(PublishRequest::default()).id;
    firmware.refuse_next("transmit_followup");
    let request = FollowupRequest {
        service_id: service,
        match_key: 1,
        transaction_id: 1,
    };
    assert_eq!(
        nan.transmit_followup(request).status,
        HalStatus::InternalFailure
    );
    assert!(nan.snapshot().followups.is_empty());

    assert_eq!(
        nan.deliver_followup_completion(1, ServiceReason::FollowupTransmitFailure),
        Err(NanError::not_found(IdKind::Followup, 1))
    );
}

#[test]
fn test_followup_failure_status() {
    let (_firmware, nan) = setup();
    let service = nan.publish(PublishRequest::default()).id;
    nan.transmit_followup(FollowupRequest {
        service_id: service,
        match_key: 0,
        transaction_id: 9,
    });
    nan.deliver_followup_completion(0, ServiceReason::FollowupTransmitFailure)
        .unwrap();
    assert_eq!(
        events(&nan),
        vec![NanEvent::FollowupDelivered {
            transaction_id: 9,
            status: HalStatus::ProtocolFailure
        }]
    );
}

#[test]
fn test_publish_refused_releases_id() {
    let (firmware, nan) = setup();
    firmware.refuse_next("publish");
    let reply = nan.publish(PublishRequest::default());
    assert_eq!(reply.status, HalStatus::InternalFailure);
    assert!(nan.snapshot().registry.service_ids.is_empty());

    // The refused grant left no trace, so the next publish gets id 1 again.
    assert_eq!(nan.publish(PublishRequest::default()).id, 1);
}

#[test]
fn test_subscribe_refused_releases_id() {
    let (firmware, nan) = setup();
    let publish = nan.publish(PublishRequest::default()).id;
    firmware.refuse_next("subscribe");
    let reply = nan.subscribe(SubscribeRequest {
        transaction_id: 3,
        ..Default::default()
    });
    assert_eq!(reply.status, HalStatus::InternalFailure);
    assert_eq!(reply.response, ResponseType::Subscribe);
    assert_eq!(reply.transaction_id, 3);
    assert_eq!(nan.snapshot().registry.service_ids, vec![publish]);

    let retry = nan.subscribe(SubscribeRequest::default());
    assert!(retry.is_success());
    assert_eq!(retry.id, publish + 1);
    assert_eq!(
        firmware.signals(),
        vec![Signal::Publish(publish), Signal::Subscribe(retry.id)]
    );
}

#[test]
fn test_publish_update_refused_keeps_session() {
    let (firmware, nan) = setup();
    let id = nan.publish(PublishRequest::default()).id;

    firmware.refuse_next("publish");
    let update = nan.publish(PublishRequest {
        publish_id: id,
        options: ServiceOptions {
            suppress_terminated: true,
            ..Default::default()
        },
        ..Default::default()
    });
    assert_eq!(update.status, HalStatus::InternalFailure);

    let services = nan.snapshot().registry.services;
    assert_eq!(services.len(), 1);
    assert!(!services[0].options.suppress_terminated);
}

#[test]
fn test_service_id_space_is_shared() {
    let (_firmware, nan) = setup();
    for i in 0..16 {
        let reply = if i % 2 == 0 {
            nan.publish(PublishRequest::default())
        } else {
            nan.subscribe(SubscribeRequest::default())
        };
        assert!(reply.is_success());
    }
    let reply = nan.subscribe(SubscribeRequest::default());
    assert_eq!(reply.status, HalStatus::InvalidPublishSubscribeId);
    assert_eq!(reply.response, ResponseType::Subscribe);
}

#[test]
fn test_cancel_unknown_is_invalid() {
    let (firmware, nan) = setup();
    assert_eq!(
        nan.publish_cancel(0, 3).status,
        HalStatus::InvalidPublishSubscribeId
    );
    let id = nan.publish(PublishRequest::default()).id;
    firmware.refuse_next("publish_cancel");
    assert_eq!(nan.publish_cancel(0, id).status, HalStatus::InternalFailure);
    // Still live after the refused cancel.
    assert!(nan.publish_cancel(0, id).is_success());
    assert!(firmware.signals().contains(&Signal::PublishCancel(id)));
}

#[test]
fn test_suppressed_indications() {
    let (_firmware, nan) = setup();
    let quiet = nan
        .publish(PublishRequest {
            options: ServiceOptions {
                suppress_terminated: true,
                suppress_match_expired: true,
                suppress_received_followup: false,
            },
            ..Default::default()
        })
        .id;
    let loud = nan.subscribe(SubscribeRequest::default()).id;

    nan.match_expired(quiet).unwrap();
    nan.match_expired(loud).unwrap();
    nan.terminate(TerminationTarget::Publish(quiet), ServiceReason::CountReached)
        .unwrap();
    nan.terminate(TerminationTarget::Subscribe(loud), ServiceReason::Other(3))
        .unwrap();

    assert_eq!(
        events(&nan),
        vec![
            NanEvent::MatchExpired { service_id: loud },
            NanEvent::SubscribeTerminated {
                subscribe_id: loud,
                status: HalStatus::InternalFailure
            },
        ]
    );
    assert!(nan.snapshot().registry.service_ids.is_empty());
}

#[test]
fn test_setup_confirm_outcomes() {
    let (_firmware, nan) = setup();
    let ok = initiate(&nan, peer(1)).id;
    let refused = initiate(&nan, peer(2)).id;

    nan.accept_or_reject(ok, LowerResultCode::Success).unwrap();
    nan.accept_or_reject(refused, LowerResultCode::RejectedSecurityPolicy)
        .unwrap();

    assert_eq!(
        events(&nan),
        vec![
            NanEvent::DataPathEstablished {
                ndp_instance_id: ok,
                peer: peer(1),
                status: HalStatus::Success
            },
            NanEvent::DataPathRejected {
                ndp_instance_id: refused,
                peer: peer(2),
                status: HalStatus::ProtocolFailure
            },
        ]
    );

    let snap = nan.snapshot().registry;
    assert_eq!(snap.ndp_instance_ids, vec![ok]);
    assert_eq!(snap.data_paths[0].state, DataPathState::Active);

    // A late confirm for a removed data path is a lookup miss.
    assert_eq!(
        nan.accept_or_reject(refused, LowerResultCode::Success),
        Err(NanError::not_found(IdKind::NdpInstance, refused))
    );
}

#[test]
fn test_data_path_end_then_termination() {
    let (firmware, nan) = setup();
    let id = initiate(&nan, peer(1)).id;
    nan.accept_or_reject(id, LowerResultCode::Success).unwrap();
    nan.take_notifications();
    firmware.clear();

    assert!(nan.data_path_end(0, &[id, 6, 0]).is_success());
    assert_eq!(firmware.signals(), vec![Signal::NdpTerminate(id)]);
    assert_eq!(
        nan.snapshot().registry.data_paths[0].state,
        DataPathState::Terminating
    );

    nan.terminate(TerminationTarget::DataPath(id), ServiceReason::UserRequest)
        .unwrap();
    assert_eq!(
        events(&nan),
        vec![NanEvent::DataPathEnded {
            ndp_instance_id: id
        }]
    );

    // Host end racing the firmware termination is harmless.
    assert!(nan.data_path_end(0, &[id]).is_success());
    assert_eq!(
        nan.terminate(TerminationTarget::DataPath(id), ServiceReason::UserRequest),
        Err(NanError::not_found(IdKind::NdpInstance, id))
    );
}

#[test]
fn test_data_path_end_refused() {
    let (firmware, nan) = setup();
    let id = initiate(&nan, peer(1)).id;
    firmware.refuse_next("ndp_terminate");
    assert_eq!(nan.data_path_end(0, &[id]).status, HalStatus::InternalFailure);
    assert_eq!(
        nan.snapshot().registry.data_paths[0].state,
        DataPathState::Establishing
    );
}

#[test]
fn test_confirm_after_host_end_waits_for_termination() {
    let (firmware, nan) = setup();
    let id = initiate(&nan, peer(1)).id;
    assert!(nan.data_path_end(0, &[id]).is_success());
    firmware.clear();

    // The setup confirm crossed the host's end request.
    assert_eq!(nan.accept_or_reject(id, LowerResultCode::Success), Ok(()));
    assert!(nan.take_notifications().is_empty());
    assert_eq!(
        nan.snapshot().registry.data_paths[0].state,
        DataPathState::Terminating
    );
    assert!(firmware.signals().is_empty());

    nan.terminate(TerminationTarget::DataPath(id), ServiceReason::UserRequest)
        .unwrap();
    assert_eq!(
        events(&nan),
        vec![NanEvent::DataPathEnded {
            ndp_instance_id: id
        }]
    );
    assert!(nan.snapshot().registry.ndp_instance_ids.is_empty());
}

#[test]
fn test_reject_after_host_end_ends_data_path() {
    let (_firmware, nan) = setup();
    let id = initiate(&nan, peer(1)).id;
    nan.data_path_end(0, &[id]);

    nan.accept_or_reject(id, LowerResultCode::NoOtaAck).unwrap();
    assert_eq!(
        events(&nan),
        vec![NanEvent::DataPathRejected {
            ndp_instance_id: id,
            peer: peer(1),
            status: HalStatus::NoOtaAck
        }]
    );
    assert!(nan.snapshot().registry.links.is_empty());
}

#[test]
fn test_reject_confirm_on_active_data_path() {
    let (_firmware, nan) = setup();
    let id = initiate(&nan, peer(4)).id;
    nan.accept_or_reject(id, LowerResultCode::Success).unwrap();
    nan.take_notifications();

    nan.accept_or_reject(id, LowerResultCode::NdlUnacceptable)
        .unwrap();
    assert_eq!(
        events(&nan),
        vec![NanEvent::DataPathRejected {
            ndp_instance_id: id,
            peer: peer(4),
            status: HalStatus::ProtocolFailure
        }]
    );
    let snap = nan.snapshot().registry;
    assert!(snap.ndp_instance_ids.is_empty());
    assert!(snap.links.is_empty());
}

#[test]
fn test_respond_refused_by_firmware_ends_data_path() {
    let (firmware, nan) = setup();
    let service = nan.publish(PublishRequest::default()).id;
    nan.data_path_requested(DataPathIndication {
        service_id: service,
        peer: peer(5),
        local_instance_tag: 30,
    })
    .unwrap();
    let NanEvent::DataPathRequested {
        ndp_instance_id, ..
    } = events(&nan)[0]
    else {
        panic!("expected a data path request");
    };

    firmware.refuse_next("ndp_response");
    let reply = nan.data_path_respond(DataPathRespondRequest {
        transaction_id: 11,
        ndp_instance_id,
        accept: true,
        local_ndi: None,
    });
    assert_eq!(reply.status, HalStatus::InternalFailure);
    assert_eq!(reply.response, ResponseType::DataPathResponder);
    assert_eq!((reply.transaction_id, reply.id), (11, ndp_instance_id));

    let snap = nan.snapshot().registry;
    assert!(snap.ndp_instance_ids.is_empty());
    assert!(snap.links.is_empty());
    assert!(nan.take_notifications().is_empty());
}

#[test]
fn test_data_path_end_while_disabled_reports_id_zero() {
    let firmware = MockFirmware::new();
    let nan = NanInterface::new(NanLimits::default(), firmware.clone());
    let reply = nan.data_path_end(2, &[1, 3]);
    assert!(reply.is_success());
    assert_eq!(reply.response, ResponseType::DataPathEnd);
    assert_eq!(
        events(&nan),
        vec![NanEvent::DataPathEnded { ndp_instance_id: 0 }]
    );
    assert!(firmware.signals().is_empty());
}

#[test]
fn test_set_config_refused_keeps_settings() {
    let (firmware, nan) = setup();
    assert!(nan
        .set_config(ConfigRequest::from_raw(1, Some(4), 0xC000_0010))
        .is_success());

    firmware.refuse_next("set_config");
    let reply = nan.set_config(ConfigRequest::from_raw(2, Some(7), 0x8000_0030));
    assert_eq!(reply.status, HalStatus::InternalFailure);
    assert_eq!(reply.response, ResponseType::Config);

    let snap = nan.snapshot();
    assert_eq!(snap.master_preference, 4);
    assert_eq!(snap.discovery.interval_secs, 16);
    assert_eq!(
        firmware.signals(),
        vec![Signal::SetConfig {
            master_preference: Some(4)
        }]
    );
}

#[test]
fn test_capabilities_capped_and_read_failure_tolerated() {
    let (firmware, nan) = setup();
    let (reply, caps) = nan.get_capabilities(5);
    assert!(reply.is_success());
    assert_eq!(reply.response, ResponseType::GetCapabilities);
    assert_eq!(caps.max_publishes, 8);
    assert_eq!(caps.max_ndi_interfaces, 2);
    assert_eq!(caps.max_ndp_sessions, 8);
    assert_eq!(caps.max_queued_transmit_followup_msgs, 20);

    firmware.refuse_next("capabilities");
    let (reply, caps) = nan.get_capabilities(6);
    assert!(reply.is_success());
    assert_eq!(
        caps,
        NanCapabilities {
            max_ndi_interfaces: 8,
            max_ndp_sessions: 8,
            ..Default::default()
        }
    );
}

#[test]
fn test_responder_accept_and_reject() {
    let (firmware, nan) = setup();
    let service = nan.publish(PublishRequest::default()).id;
    let local = MacAddress::new([0x06, 0, 0, 0, 0, 1]);

    for (tag, who) in [(21u16, peer(1)), (22, peer(2))] {
        nan.data_path_requested(DataPathIndication {
            service_id: service,
            peer: who,
            local_instance_tag: tag,
        })
        .unwrap();
    }
    let requested: Vec<u16> = events(&nan)
        .into_iter()
        .filter_map(|e| match e {
            NanEvent::DataPathRequested {
                ndp_instance_id, ..
            } => Some(ndp_instance_id),
            _ => None,
        })
        .collect();
    assert_eq!(requested.len(), 2);
    firmware.clear();

    let accept = nan.data_path_respond(DataPathRespondRequest {
        transaction_id: 0,
        ndp_instance_id: requested[0],
        accept: true,
        local_ndi: Some(local),
    });
    assert!(accept.is_success());
    assert_eq!(accept.response, ResponseType::DataPathResponder);

    let reject = nan.data_path_respond(DataPathRespondRequest {
        transaction_id: 0,
        ndp_instance_id: requested[1],
        accept: false,
        local_ndi: None,
    });
    assert!(reject.is_success());

    assert_eq!(
        firmware.signals(),
        vec![
            Signal::NdpResponse(NdpResponse {
                ndp_instance_id: requested[0],
                ndl_ifindex: 5,
                local_instance_tag: 21,
                local_ndi: Some(local),
                accept: true,
            }),
            Signal::NdpResponse(NdpResponse {
                ndp_instance_id: requested[1],
                ndl_ifindex: 6,
                local_instance_tag: 22,
                local_ndi: None,
                accept: false,
            }),
        ]
    );

    let snap = nan.snapshot().registry;
    assert_eq!(snap.ndp_instance_ids, vec![requested[0]]);
    assert_eq!(snap.data_paths[0].local_address, Some(local));
    assert_eq!(snap.data_paths[0].state, DataPathState::Establishing);
    assert!(nan.take_notifications().is_empty());

    assert_eq!(
        nan.data_path_respond(DataPathRespondRequest {
            transaction_id: 0,
            ndp_instance_id: 7,
            accept: true,
            local_ndi: None,
        })
        .status,
        HalStatus::InvalidNdpId
    );
}

#[test]
fn test_responder_exhaustion_rejects_in_firmware() {
    let limits = NanLimits {
        max_ndp_instances: 1,
        ..Default::default()
    };
    let firmware = MockFirmware::new();
    let nan = NanInterface::new(limits, firmware.clone());
    nan.enable(EnableRequest::default());
    assert!(initiate(&nan, peer(1)).is_success());
    firmware.clear();

    let result = nan.data_path_requested(DataPathIndication {
        service_id: 1,
        peer: peer(2),
        local_instance_tag: 0x55,
    });
    assert_eq!(result, Err(NanError::exhausted(IdKind::NdpInstance)));
    assert_eq!(
        firmware.signals(),
        vec![Signal::NdpResponse(NdpResponse::reject(0x55))]
    );
    assert!(nan.take_notifications().is_empty());
}

#[test]
fn test_enable_refused_stays_disabled() {
    let firmware = MockFirmware::new();
    let nan = NanInterface::new(NanLimits::default(), firmware.clone());
    firmware.refuse_next("enable");
    assert_eq!(
        nan.enable(EnableRequest::default()).status,
        HalStatus::InternalFailure
    );
    assert!(!nan.is_enabled());
    assert!(nan.enable(EnableRequest::default()).is_success());
}

#[test]
fn test_concurrent_end_and_termination() {
    let (_firmware, nan) = setup();
    let nan = Arc::new(nan);
    let ids: Vec<u16> = (0..8).map(|i| initiate(&nan, peer(i)).id).collect();

    let host = {
        let nan = nan.clone();
        let ids = ids.clone();
        std::thread::spawn(move || {
            for id in ids {
                nan.data_path_end(0, &[id]);
            }
        })
    };
    let firmware_side = {
        let nan = nan.clone();
        let ids = ids.clone();
        std::thread::spawn(move || {
            for id in ids {
                let _ = nan.terminate(TerminationTarget::DataPath(id), ServiceReason::Timeout);
            }
        })
    };
    host.join().unwrap();
    firmware_side.join().unwrap();

    let ended = events(&nan)
        .into_iter()
        .filter(|e| matches!(e, NanEvent::DataPathEnded { .. }))
        .count();
    assert_eq!(ended, ids.len());
    let snap = nan.snapshot().registry;
    assert!(snap.ndp_instance_ids.is_empty());
    assert!(snap.links.is_empty());
}
