//! End-to-end reconciler behaviour against the in-memory kernel.

use std::convert::Infallible;

use ipnet::IpNet;
use wireport_core::fake::{FakeKernel, FakeOp, KernelCall};
use wireport_core::{
    CallContext, EntityKind, Interface, InterfaceIdentifier, KeyPair, Peer, PeerIdentifier, PresharedKey, PrivateKey,
    PublicKey, ReconcileError, Reconciler,
};

type FakeReconciler = Reconciler<FakeKernel, FakeKernel>;

fn setup() -> (FakeKernel, FakeReconciler) {
    let kernel = FakeKernel::new();
    (kernel.clone(), Reconciler::new(kernel.clone(), kernel))
}

fn ctx() -> CallContext {
    CallContext::background()
}

fn net(s: &str) -> IpNet {
    s.parse().expect("valid cidr")
}

fn new_key() -> PublicKey {
    PrivateKey::generate().public_key()
}

fn with_key(mut iface: Interface) -> Result<Interface, Infallible> {
    iface.key_pair = Some(KeyPair::generate());
    Ok(iface)
}

fn add_peer(rec: &FakeReconciler, iface: &str, key: &PublicKey, allowed: &str) {
    rec.save_peer(&ctx(), &InterfaceIdentifier::from(iface), &PeerIdentifier::from(key), |mut peer| {
        peer.allowed_ips = vec![net(allowed).into()];
        Ok::<_, Infallible>(peer)
    })
    .expect("save peer");
}

#[test]
fn new_interface_scenario() {
    let (kernel, rec) = setup();
    let id = InterfaceIdentifier::from("wg-test");
    let key_pair = KeyPair::generate();
    let expected_public = key_pair.public_key;

    rec.save_interface(&ctx(), &id, |mut iface| {
        iface.key_pair = Some(key_pair);
        iface.listen_port = 51820;
        iface.addresses = vec![net("10.0.0.1/24").into()];
        iface.mtu = 1420;
        iface.device_up = true;
        Ok::<_, Infallible>(iface)
    })
    .expect("save");

    let writes = kernel.writes();
    let count = |op: FakeOp| writes.iter().filter(|c| c.op() == op).count();
    assert_eq!(count(FakeOp::LinkAdd), 1);
    assert_eq!(count(FakeOp::AddrReplace), 1);
    assert_eq!(count(FakeOp::AddrAdd), 0);
    assert_eq!(count(FakeOp::LinkSetMtu), 1);
    assert_eq!(count(FakeOp::LinkSetUp), 1);
    assert_eq!(count(FakeOp::ConfigureDevice), 1);
    assert_eq!(writes.len(), 5);

    match writes.last().expect("writes") {
        KernelCall::ConfigureDevice { name, config } => {
            assert_eq!(name, "wg-test");
            let private = config.private_key.as_ref().expect("private key pushed");
            assert_eq!(private.public_key(), expected_public);
            assert_eq!(config.listen_port, Some(51820));
            assert!(config.firewall_mark.is_none());
            assert!(!config.replace_peers);
            assert!(config.peers.is_empty());
        }
        other => panic!("last write should configure the device, got {other:?}"),
    }

    let iface = rec.get_interface(&ctx(), &id).expect("get");
    assert!(iface.device_up);
    assert_eq!(iface.addresses.iter().map(ToString::to_string).collect::<Vec<_>>(), vec!["10.0.0.1/24"]);
    assert_eq!(iface.mtu, 1420);
    assert_eq!(iface.public_key(), Some(&expected_public));
}

#[test]
fn link_create_precedes_every_tunnel_configure() {
    let (kernel, rec) = setup();
    rec.save_interface(&ctx(), &InterfaceIdentifier::from("wg0"), with_key).expect("save");

    let writes = kernel.writes();
    let creates: Vec<usize> = writes
        .iter()
        .enumerate()
        .filter(|(_, c)| c.op() == FakeOp::LinkAdd)
        .map(|(i, _)| i)
        .collect();
    let first_configure = writes
        .iter()
        .position(|c| c.op() == FakeOp::ConfigureDevice)
        .expect("configure issued");
    assert_eq!(creates, vec![0]);
    assert!(creates[0] < first_configure);
}

#[test]
fn existing_interface_is_not_recreated() {
    let (kernel, rec) = setup();
    kernel.add_interface("wg0");

    rec.save_interface(&ctx(), &InterfaceIdentifier::from("wg0"), with_key).expect("save");
    assert!(!kernel.writes().iter().any(|c| c.op() == FakeOp::LinkAdd));
}

#[test]
fn identity_transform_reads_back_unchanged() {
    let (_kernel, rec) = setup();
    let id = InterfaceIdentifier::from("wg0");
    rec.save_interface(&ctx(), &id, |iface| {
        let mut iface = with_key(iface)?;
        iface.listen_port = 51000;
        iface.firewall_mark = 0x51;
        iface.device_up = true;
        Ok::<_, Infallible>(iface)
    })
    .expect("first save");

    let before = rec.get_interface(&ctx(), &id).expect("get");
    rec.save_interface(&ctx(), &id, Ok::<_, Infallible>).expect("identity save");
    let after = rec.get_interface(&ctx(), &id).expect("get");
    assert_eq!(before, after);
}

#[test]
fn save_peer_scenario_creates_then_updates_only_that_peer() {
    let (kernel, rec) = setup();
    rec.save_interface(&ctx(), &InterfaceIdentifier::from("wg0"), with_key).expect("save");
    let sibling = new_key();
    add_peer(&rec, "wg0", &sibling, "10.0.0.9/32");
    kernel.clear_journal();

    let key = new_key();
    add_peer(&rec, "wg0", &key, "10.0.0.2/32");

    let configures: Vec<_> = kernel
        .writes()
        .into_iter()
        .filter_map(|c| match c {
            KernelCall::ConfigureDevice { config, .. } => Some(config),
            _ => None,
        })
        .collect();
    assert_eq!(configures.len(), 2);

    let create = &configures[0];
    assert_eq!(create.peers.len(), 1);
    assert_eq!(create.peers[0].public_key, key);
    assert!(create.peers[0].allowed_ips.is_empty());
    assert!(!create.peers[0].replace_allowed_ips);

    let update = &configures[1];
    assert!(!update.replace_peers);
    assert!(update.private_key.is_none());
    assert_eq!(update.peers.len(), 1);
    assert_eq!(update.peers[0].public_key, key);
    assert!(update.peers[0].replace_allowed_ips);
    assert!(update.peers[0].update_only);
    assert_eq!(update.peers[0].allowed_ips, vec![net("10.0.0.2/32")]);

    assert!(configures.iter().flat_map(|c| &c.peers).all(|p| p.public_key != sibling));

    let sibling_peer = rec
        .get_peer(&ctx(), &InterfaceIdentifier::from("wg0"), &PeerIdentifier::from(&sibling))
        .expect("sibling still present");
    assert_eq!(sibling_peer.allowed_ips[0].to_string(), "10.0.0.9/32");
}

#[test]
fn peer_round_trip() {
    let (_kernel, rec) = setup();
    let iface = InterfaceIdentifier::from("wg0");
    rec.save_interface(&ctx(), &iface, with_key).expect("save");

    let key = new_key();
    let id = PeerIdentifier::from(&key);
    let psk = PresharedKey::generate();
    let psk_copy = psk.clone();
    rec.save_peer(&ctx(), &iface, &id, move |mut peer| {
        peer.preshared_key = Some(psk);
        peer.endpoint = Some("192.0.2.10:51820".parse().expect("endpoint"));
        peer.allowed_ips = vec![net("10.0.0.2/32").into(), net("fd00::2/128").into()];
        peer.persistent_keepalive = 25;
        Ok::<_, Infallible>(peer)
    })
    .expect("save peer");

    let peer = rec.get_peer(&ctx(), &iface, &id).expect("get peer");
    assert_eq!(peer.identifier, id);
    assert_eq!(peer.preshared_key, Some(psk_copy));
    assert_eq!(peer.endpoint.expect("endpoint").to_string(), "192.0.2.10:51820");
    assert_eq!(peer.allowed_ips.len(), 2);
    assert_eq!(peer.persistent_keepalive, 25);
    assert!(peer.last_handshake.is_none());
}

#[test]
fn keepalive_can_be_disabled() {
    let (_kernel, rec) = setup();
    let iface = InterfaceIdentifier::from("wg0");
    rec.save_interface(&ctx(), &iface, with_key).expect("save");
    let id = PeerIdentifier::from(&new_key());

    for keepalive in [25, 0] {
        rec.save_peer(&ctx(), &iface, &id, |mut peer| {
            peer.persistent_keepalive = keepalive;
            Ok::<_, Infallible>(peer)
        })
        .expect("save peer");
    }

    assert_eq!(rec.get_peer(&ctx(), &iface, &id).expect("get").persistent_keepalive, 0);
}

#[test]
fn unset_preshared_key_never_pushed() {
    let (kernel, rec) = setup();
    let iface = InterfaceIdentifier::from("wg0");
    rec.save_interface(&ctx(), &iface, with_key).expect("save");

    rec.save_peer(&ctx(), &iface, &PeerIdentifier::from(&new_key()), |mut peer| {
        peer.preshared_key = None;
        peer.allowed_ips = vec![net("10.0.0.2/32").into()];
        Ok::<_, Infallible>(peer)
    })
    .expect("save peer");

    for call in kernel.writes() {
        if let KernelCall::ConfigureDevice { config, .. } = call {
            assert!(config.peers.iter().all(|p| p.preshared_key.is_none()));
        }
    }
}

#[test]
fn existing_preshared_key_survives_update_without_one() {
    let (kernel, rec) = setup();
    let iface = InterfaceIdentifier::from("wg0");
    rec.save_interface(&ctx(), &iface, with_key).expect("save");
    let key = new_key();
    let id = PeerIdentifier::from(&key);

    rec.save_peer(&ctx(), &iface, &id, |mut peer| {
        peer.preshared_key = Some(PresharedKey::generate());
        Ok::<_, Infallible>(peer)
    })
    .expect("set psk");

    rec.save_peer(&ctx(), &iface, &id, |mut peer| {
        peer.preshared_key = None;
        Ok::<_, Infallible>(peer)
    })
    .expect("save without psk");

    let device = kernel.device_snapshot("wg0").expect("device");
    assert_ne!(device.peers[0].preshared_key, [0u8; 32]);
}

#[test]
fn delete_then_get_is_not_found() {
    let (_kernel, rec) = setup();
    let iface = InterfaceIdentifier::from("wg0");
    rec.save_interface(&ctx(), &iface, with_key).expect("save");
    let key = new_key();
    add_peer(&rec, "wg0", &key, "10.0.0.2/32");

    let id = PeerIdentifier::from(&key);
    rec.delete_peer(&ctx(), &iface, &id).expect("delete");

    let err = rec.get_peer(&ctx(), &iface, &id).expect_err("deleted");
    assert!(err.is_not_found_for(EntityKind::Peer));
}

#[test]
fn deleting_absent_peer_succeeds() {
    let (kernel, rec) = setup();
    kernel.add_interface("wg0");

    rec.delete_peer(&ctx(), &InterfaceIdentifier::from("wg0"), &PeerIdentifier::from(&new_key()))
        .expect("idempotent delete");
    assert_eq!(kernel.writes().len(), 1);
}

#[test]
fn delete_touches_only_the_named_peer() {
    let (kernel, rec) = setup();
    let iface = InterfaceIdentifier::from("wg0");
    rec.save_interface(&ctx(), &iface, with_key).expect("save");
    let keep = new_key();
    let gone = new_key();
    add_peer(&rec, "wg0", &keep, "10.0.0.2/32");
    add_peer(&rec, "wg0", &gone, "10.0.0.3/32");

    rec.delete_peer(&ctx(), &iface, &PeerIdentifier::from(&gone)).expect("delete");

    let peers = rec.list_peers(&ctx(), &iface).expect("list");
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].public_key(), &keep);
    assert_eq!(kernel.device_snapshot("wg0").expect("device").peers.len(), 1);
}

#[test]
fn invalid_peer_identifiers_make_no_kernel_calls() {
    let (kernel, rec) = setup();
    kernel.add_interface("wg0");
    let iface = InterfaceIdentifier::from("wg0");

    for bad in ["", "alice", "not base64!", "AAAA", "dGVzdA=="] {
        let id = PeerIdentifier::from(bad);
        let errs = [
            rec.get_peer(&ctx(), &iface, &id).expect_err("get"),
            rec.save_peer(&ctx(), &iface, &id, Ok::<_, Infallible>).expect_err("save"),
            rec.delete_peer(&ctx(), &iface, &id).expect_err("delete"),
        ];
        for err in errs {
            assert!(
                matches!(err, ReconcileError::InvalidIdentifier { kind: EntityKind::Peer, .. }),
                "{bad:?}: {err}"
            );
        }
    }
    assert!(kernel.calls().is_empty());
}

#[test]
fn invalid_interface_name_makes_no_kernel_calls() {
    let (kernel, rec) = setup();
    let err = rec
        .save_interface(&ctx(), &InterfaceIdentifier::from("this-name-is-too-long"), with_key)
        .expect_err("too long");
    assert!(matches!(err, ReconcileError::InvalidIdentifier { kind: EntityKind::Interface, .. }));
    assert!(kernel.calls().is_empty());
}

#[test]
fn list_interfaces_merges_every_device() {
    let (kernel, rec) = setup();
    for name in ["wg0", "wg1"] {
        rec.save_interface(&ctx(), &InterfaceIdentifier::from(name), |iface| {
            let mut iface = with_key(iface)?;
            iface.device_up = name == "wg0";
            Ok::<_, Infallible>(iface)
        })
        .expect("save");
    }
    kernel.simulate_traffic("wg1", 10, 20).expect("traffic");

    let list = rec.list_interfaces(&ctx()).expect("list");
    assert_eq!(list.len(), 2);
    assert!(list[0].device_up);
    assert!(!list[1].device_up);
    assert_eq!((list[1].bytes_upload, list[1].bytes_download), (20, 10));
}

#[test]
fn list_interfaces_fails_together() {
    let (kernel, rec) = setup();
    kernel.add_interface("wg0");
    kernel.insert_device_without_link("wg1");

    let err = rec.list_interfaces(&ctx()).expect_err("wg1 has no link");
    assert!(matches!(err, ReconcileError::Merge { ref interface, .. } if interface == "wg1"));
}

#[test]
fn enumeration_failure() {
    let (kernel, rec) = setup();
    kernel.fail_on(FakeOp::Devices, "netlink dump interrupted");
    assert!(matches!(rec.list_interfaces(&ctx()), Err(ReconcileError::Enumeration { .. })));
}

#[test]
fn get_interface_without_device_is_not_found() {
    let (kernel, rec) = setup();
    kernel.insert_link_without_device("wg0", "dummy");
    let err = rec.get_interface(&ctx(), &InterfaceIdentifier::from("wg0")).expect_err("no device");
    assert!(err.is_not_found_for(EntityKind::Interface));
}

#[test]
fn get_interface_without_link_is_merge_error() {
    let (kernel, rec) = setup();
    kernel.insert_device_without_link("wg0");
    let err = rec.get_interface(&ctx(), &InterfaceIdentifier::from("wg0")).expect_err("no link");
    assert!(matches!(err, ReconcileError::Merge { .. }));
}

#[test]
fn link_stage_failure_stops_before_tunnel_stage() {
    let (kernel, rec) = setup();
    kernel.add_interface("wg0");
    kernel.fail_on(FakeOp::LinkSetMtu, "invalid argument");

    let err = rec
        .save_interface(&ctx(), &InterfaceIdentifier::from("wg0"), |iface| {
            let mut iface = with_key(iface)?;
            iface.mtu = 1380;
            Ok::<_, Infallible>(iface)
        })
        .expect_err("mtu rejected");

    assert!(matches!(err, ReconcileError::LinkUpdate { .. }));
    assert!(!kernel.writes().iter().any(|c| c.op() == FakeOp::ConfigureDevice));
}

#[test]
fn tunnel_stage_failure_is_attributed() {
    let (kernel, rec) = setup();
    kernel.add_interface("wg0");
    kernel.fail_on(FakeOp::ConfigureDevice, "operation not permitted");

    let err = rec
        .save_interface(&ctx(), &InterfaceIdentifier::from("wg0"), with_key)
        .expect_err("configure rejected");
    assert!(matches!(err, ReconcileError::TunnelUpdate { kind: EntityKind::Interface, .. }));
    assert!(kernel.writes().iter().any(|c| c.op() == FakeOp::LinkSetDown));
}

#[test]
fn peer_create_failure_fails_fast() {
    let (kernel, rec) = setup();
    kernel.add_interface("wg0");
    kernel.fail_on(FakeOp::ConfigureDevice, "out of memory");

    let err = rec
        .save_peer(&ctx(), &InterfaceIdentifier::from("wg0"), &PeerIdentifier::from(&new_key()), Ok::<_, Infallible>)
        .expect_err("create fails");
    assert!(matches!(err, ReconcileError::Create { kind: EntityKind::Peer, .. }));
    assert_eq!(kernel.writes().len(), 1);
}

#[test]
fn transform_error_aborts_without_writes() {
    let (kernel, rec) = setup();
    kernel.add_interface("wg0");

    #[derive(Debug, thiserror::Error)]
    #[error("listen port 80 is reserved")]
    struct Reserved;

    let err = rec
        .save_interface(&ctx(), &InterfaceIdentifier::from("wg0"), |_| Err::<Interface, _>(Reserved))
        .expect_err("transform fails");

    match err {
        ReconcileError::Transform { kind, id, source } => {
            assert_eq!(kind, EntityKind::Interface);
            assert_eq!(id, "wg0");
            assert!(source.downcast_ref::<Reserved>().is_some());
        }
        other => panic!("expected transform error, got {other}"),
    }
    assert!(kernel.writes().is_empty());
}

#[test]
fn peer_transform_error_after_create() {
    let (kernel, rec) = setup();
    kernel.add_interface("wg0");

    let err = rec
        .save_peer(&ctx(), &InterfaceIdentifier::from("wg0"), &PeerIdentifier::from(&new_key()), |_| {
            Err::<Peer, _>("no allowed ips given")
        })
        .expect_err("transform fails");

    assert!(matches!(err, ReconcileError::Transform { kind: EntityKind::Peer, .. }));
    // The minimal create is the only write.
    assert_eq!(kernel.writes().len(), 1);
}

#[test]
fn counters_are_read_fresh() {
    let (kernel, rec) = setup();
    let iface = InterfaceIdentifier::from("wg0");
    rec.save_interface(&ctx(), &iface, with_key).expect("save");
    let key = new_key();
    add_peer(&rec, "wg0", &key, "10.0.0.2/32");
    let id = PeerIdentifier::from(&key);

    kernel.simulate_peer_traffic("wg0", &key, 100, 40).expect("traffic");
    kernel.simulate_handshake("wg0", &key, 1_700_000_000).expect("handshake");
    let peer = rec.get_peer(&ctx(), &iface, &id).expect("get");
    assert_eq!((peer.bytes_upload, peer.bytes_download), (100, 40));
    assert!(peer.last_handshake.is_some());
    assert_eq!(peer.protocol_version, 1);

    kernel.simulate_peer_traffic("wg0", &key, 1, 1).expect("traffic");
    let peer = rec.get_peer(&ctx(), &iface, &id).expect("get");
    assert_eq!((peer.bytes_upload, peer.bytes_download), (101, 41));
}
