//! Integration tests for the redirection controller.
//!
//! These drive the public facade against the bundled backends: the SFC and
//! flow classifier drivers for end-to-end behavior, the mock driver where
//! failures have to be injected.

use pretty_assertions::assert_eq;
use redirect_driver::{DriverError, DriverOp, FlowClassifierDriver, MockDriver, RedirectionDriver, SfcDriver};
use redirect_orch::{RedirectionController, RedirectionControllerConfig, RedirectionError};
use redirect_types::{
    ElementId, FailurePolicyType, HookId, HookParams, InspectionPortElement, TagEncapsulationType,
};
use std::sync::Arc;
use std::thread;

fn id(s: &str) -> ElementId {
    s.parse().unwrap()
}

fn vxlan(tag: u64, order: u64) -> HookParams {
    HookParams::new(tag, TagEncapsulationType::Vxlan, order, FailurePolicyType::FailOpen)
}

fn sfc(ports: &[&str]) -> RedirectionController {
    let driver = SfcDriver::new("neutron-sfc");
    for port in ports {
        driver.add_port(id(port));
    }
    RedirectionController::open(Arc::new(driver), RedirectionControllerConfig::new("sfc-test")).unwrap()
}

fn mock(ports: &[&str]) -> (Arc<MockDriver>, RedirectionController) {
    let driver = Arc::new(MockDriver::with_ports(ports.iter().copied()));
    let controller =
        RedirectionController::open(driver.clone(), RedirectionControllerConfig::new("mock-test")).unwrap();
    (driver, controller)
}

fn hook_ids(controller: &RedirectionController, element: &ElementId) -> Vec<HookId> {
    controller
        .inspection_chain(element)
        .into_iter()
        .map(|h| h.hook_id)
        .collect()
}

#[test]
fn test_protect_composite_through_firewall() {
    let controller = sfc(&["p1", "p2", "p3"]);

    let c1 = controller.register_network_element(&[id("p1"), id("p2")]).unwrap();
    assert_eq!(controller.get_network_elements(&c1.id).unwrap(), Some(vec![id("p1"), id("p2")]));

    let port1 = InspectionPortElement::symmetric(id("p3"));
    let port1_id = controller.register_inspection_port(&port1).unwrap();

    let params = vxlan(42, 1);
    let hook_id = controller
        .install_inspection_hook(&[c1.id.clone()], &port1, params)
        .unwrap();
    assert_eq!(hook_id, HookId::from(port1_id.clone()));

    let by_id = controller.get_inspection_hook(&hook_id).unwrap();
    let by_pair = controller.get_inspection_hook_for(&c1.id, &port1).unwrap();
    assert_eq!(by_id, by_pair);
    assert_eq!(by_id.params(), params);
    assert_eq!(by_id.inspection_port.element_id, Some(port1_id));

    assert_eq!(controller.get_inspection_hook_tag(&c1.id, &port1).unwrap(), Some(42));
    assert_eq!(
        controller.get_inspection_hook_failure_policy(&c1.id, &port1).unwrap(),
        Some(FailurePolicyType::FailOpen)
    );

    controller.remove_inspection_hook_by_id(&hook_id).unwrap();
    assert!(controller.get_inspection_hook(&hook_id).is_none());
    assert!(controller.get_inspection_hook_for(&c1.id, &port1).is_none());
    controller.close().unwrap();
}

#[test]
fn test_removals_are_idempotent() {
    let driver = Arc::new(SfcDriver::new("neutron-sfc"));
    for port in ["p1", "p2", "p3"] {
        driver.add_port(id(port));
    }
    let controller = RedirectionController::open(driver.clone(), RedirectionControllerConfig::new("sfc-test")).unwrap();
    let observe = |controller: &RedirectionController| {
        (
            controller.inspection_hooks(),
            controller.inspection_ports(),
            driver.snapshot().unwrap(),
        )
    };

    let port = InspectionPortElement::symmetric(id("p3"));
    controller.register_inspection_port(&port).unwrap();
    let hook = controller.install_inspection_hook(&[id("p1")], &port, vxlan(1, 1)).unwrap();

    controller.remove_inspection_hook(&[id("p1")], &port).unwrap();
    let after_first = observe(&controller);
    assert!(after_first.0.is_empty());
    controller.remove_inspection_hook(&[id("p1")], &port).unwrap();
    assert_eq!(observe(&controller), after_first);
    controller.remove_inspection_hook_by_id(&hook).unwrap();
    assert_eq!(controller.remove_all_inspection_hooks(&id("p1")).unwrap(), 0);
    assert_eq!(observe(&controller), after_first);

    controller.remove_inspection_port(&port).unwrap();
    let after_first = observe(&controller);
    assert!(after_first.1.is_empty());
    controller.remove_inspection_port(&port).unwrap();
    assert_eq!(observe(&controller), after_first);

    let c1 = controller.register_network_element(&[id("p1"), id("p2")]).unwrap();
    controller.delete_network_element(&c1.id).unwrap();
    let after_first = observe(&controller);
    controller.delete_network_element(&c1.id).unwrap();
    controller.delete_network_element(&id("never-existed")).unwrap();
    assert_eq!(observe(&controller), after_first);
    assert_eq!(controller.get_network_elements(&c1.id).unwrap(), None);
}

#[test]
fn test_composite_hook_orders_cover_members() {
    let (_, controller) = mock(&["p1", "p2", "fw", "ids"]);
    let c1 = controller.register_network_element(&[id("p1"), id("p2")]).unwrap();
    let fw = InspectionPortElement::symmetric(id("fw"));
    let ids = InspectionPortElement::symmetric(id("ids"));
    controller.register_inspection_port(&fw).unwrap();
    controller.register_inspection_port(&ids).unwrap();

    let on_c1 = controller.install_inspection_hook(&[c1.id.clone()], &fw, vxlan(1, 5)).unwrap();
    let err = controller
        .install_inspection_hook(&[id("p1")], &ids, vxlan(2, 5))
        .unwrap_err();
    assert!(matches!(err, RedirectionError::Conflict(_)));
    assert_eq!(controller.inspection_hooks().len(), 1);

    let on_p1 = controller.install_inspection_hook(&[id("p1")], &ids, vxlan(2, 3)).unwrap();
    assert_eq!(hook_ids(&controller, &id("p1")), vec![on_p1, on_c1.clone()]);
    assert_eq!(hook_ids(&controller, &id("p2")), vec![on_c1]);
}

#[test]
fn test_port_registration_idempotent() {
    let controller = sfc(&["p1", "p2"]);
    let port = InspectionPortElement::new(id("p1"), id("p2"));

    let a = controller.register_inspection_port(&port).unwrap();
    let b = controller.register_inspection_port(&port).unwrap();
    assert_eq!(a, b);
    assert_eq!(controller.inspection_ports().len(), 1);

    // The reverse direction is a different port.
    let reverse = controller
        .register_inspection_port(&InspectionPortElement::new(id("p2"), id("p1")))
        .unwrap();
    assert_ne!(a, reverse);
}

#[test]
fn test_unresolved_references() {
    let controller = sfc(&["p1", "p3"]);
    let port = InspectionPortElement::symmetric(id("p3"));

    let err = controller.install_inspection_hook(&[id("p1")], &port, vxlan(1, 1)).unwrap_err();
    assert!(matches!(err, RedirectionError::PortNotFound(_)));
    assert!(matches!(
        controller.set_inspection_hook_tag(&id("p1"), &port, 5),
        Err(RedirectionError::PortNotFound(_))
    ));
    assert!(matches!(
        controller.get_inspection_hook_order(&id("p1"), &port),
        Err(RedirectionError::PortNotFound(_))
    ));

    controller.register_inspection_port(&port).unwrap();
    assert!(controller.install_inspection_hook(&[id("p1")], &port, vxlan(1, 1)).is_ok());

    let err = controller
        .remove_inspection_port(&InspectionPortElement::symmetric(id("ghost")))
        .unwrap_err();
    assert!(matches!(err, RedirectionError::PortNotFound(_)));

    let err = controller.update_network_element(&id("ghost"), &[id("p1")]).unwrap_err();
    assert!(matches!(err, RedirectionError::NotFound(_)));
    assert_eq!(controller.get_network_elements(&id("ghost")).unwrap(), None);
}

#[test]
fn test_setters_round_trip() {
    let controller = sfc(&["p1", "p3"]);
    let port = InspectionPortElement::symmetric(id("p3"));
    controller.register_inspection_port(&port).unwrap();
    let hook = controller.install_inspection_hook(&[id("p1")], &port, vxlan(42, 1)).unwrap();

    controller.set_inspection_hook_tag(&id("p1"), &port, 7).unwrap();
    controller.set_inspection_hook_order(&id("p1"), &port, 9).unwrap();
    controller
        .set_inspection_hook_failure_policy(&id("p1"), &port, FailurePolicyType::FailClosed)
        .unwrap();

    assert_eq!(controller.get_inspection_hook_tag(&id("p1"), &port).unwrap(), Some(7));
    assert_eq!(controller.get_inspection_hook_order(&id("p1"), &port).unwrap(), Some(9));
    assert_eq!(
        controller.get_inspection_hook_failure_policy(&id("p1"), &port).unwrap(),
        Some(FailurePolicyType::FailClosed)
    );
    // Identity survives every setter.
    assert_eq!(controller.get_inspection_hook(&hook).unwrap().hook_id, hook);
}

#[test]
fn test_ordering_is_deterministic() {
    let (_, controller) = mock(&["p1", "p2", "fw", "ids"]);
    let fw = InspectionPortElement::symmetric(id("fw"));
    let ids = InspectionPortElement::symmetric(id("ids"));
    controller.register_inspection_port(&fw).unwrap();
    controller.register_inspection_port(&ids).unwrap();

    let h1 = controller.install_inspection_hook(&[id("p1")], &fw, vxlan(10, 10)).unwrap();
    let h2 = controller
        .install_inspection_hook(&[id("p1"), id("p2")], &ids, vxlan(20, 5))
        .unwrap();
    assert_eq!(hook_ids(&controller, &id("p1")), vec![h2.clone(), h1.clone()]);
    assert_eq!(
        controller.inspection_ports_for(&id("p1")),
        vec![
            controller.get_inspection_port(&ids).unwrap(),
            controller.get_inspection_port(&fw).unwrap()
        ]
    );

    let h2_before = controller.get_inspection_hook(&h2).unwrap();
    controller.set_inspection_hook_order(&id("p1"), &fw, 1).unwrap();
    assert_eq!(hook_ids(&controller, &id("p1")), vec![h1, h2.clone()]);
    assert_eq!(controller.get_inspection_hook(&h2).unwrap(), h2_before);

    // Equal order on overlapping elements is refused.
    let err = controller.set_inspection_hook_order(&id("p1"), &fw, 5).unwrap_err();
    assert!(matches!(err, RedirectionError::Conflict(_)));
    assert!(err.is_backend_failure());
}

#[test]
fn test_bulk_removal() {
    let (_, controller) = mock(&["p1", "p2", "a", "b", "c"]);
    let ports: Vec<InspectionPortElement> = ["a", "b", "c"]
        .iter()
        .map(|name| {
            let port = InspectionPortElement::symmetric(id(name));
            controller.register_inspection_port(&port).unwrap();
            port
        })
        .collect();

    for (order, port) in ports.iter().enumerate() {
        controller
            .install_inspection_hook(&[id("p1")], port, vxlan(1, order as u64))
            .unwrap();
    }
    let survivor = controller.install_inspection_hook(&[id("p2")], &ports[0], vxlan(1, 0)).unwrap();

    assert_eq!(controller.remove_all_inspection_hooks(&id("p1")).unwrap(), 3);
    assert!(controller.inspection_chain(&id("p1")).is_empty());
    assert!(controller.get_inspection_hook(&survivor).is_some());
    assert_eq!(controller.inspected_elements_for(&ports[0]), Some(vec![id("p2")]));
    assert_eq!(controller.inspected_elements_for(&ports[1]), Some(vec![]));
}

#[test]
fn test_update_from_snapshot() {
    let controller = sfc(&["p1", "p3"]);
    let port = InspectionPortElement::symmetric(id("p3"));
    controller.register_inspection_port(&port).unwrap();
    let hook = controller.install_inspection_hook(&[id("p1")], &port, vxlan(42, 1)).unwrap();

    let mut snapshot = controller.get_inspection_hook(&hook).unwrap();
    snapshot.tag = 1000;
    snapshot.encapsulation = TagEncapsulationType::Mpls;
    snapshot.failure_policy = FailurePolicyType::FailClosed;
    controller.update_inspection_hook(&snapshot).unwrap();
    assert_eq!(controller.get_inspection_hook(&hook).unwrap(), snapshot);

    // A snapshot naming another port is not this hook.
    let mut moved = snapshot.clone();
    moved.inspection_port = InspectionPortElement::symmetric(id("p1"));
    assert!(controller.update_inspection_hook(&moved).is_err());
    assert_eq!(controller.get_inspection_hook(&hook).unwrap(), snapshot);
}

#[test]
fn test_unsupported_attributes_rejected() {
    let controller = sfc(&["p1", "p3"]);
    let port = InspectionPortElement::symmetric(id("p3"));
    controller.register_inspection_port(&port).unwrap();

    // SFC carries no VLAN tags.
    let vlan = HookParams::new(7, TagEncapsulationType::Vlan, 1, FailurePolicyType::FailOpen);
    let err = controller.install_inspection_hook(&[id("p1")], &port, vlan).unwrap_err();
    assert!(matches!(err, RedirectionError::Backend(DriverError::NotSupported { .. })));
    assert!(controller.inspection_hooks().is_empty());
}

#[test]
fn test_flow_classifier_backend() {
    let driver = FlowClassifierDriver::new("classifier");
    for port in ["p1", "p2", "fw"] {
        driver.add_port(id(port));
    }
    let controller =
        RedirectionController::open(Arc::new(driver), RedirectionControllerConfig::default()).unwrap();
    assert!(!controller.capabilities().hook_id_is_port_id);

    let fw = InspectionPortElement::symmetric(id("fw"));
    let fw_id = controller.register_inspection_port(&fw).unwrap();
    let vlan = HookParams::new(100, TagEncapsulationType::Vlan, 1, FailurePolicyType::FailClosed);
    let h1 = controller.install_inspection_hook(&[id("p1")], &fw, vlan).unwrap();
    let h2 = controller.install_inspection_hook(&[id("p2")], &fw, vlan).unwrap();

    assert_ne!(h1, h2);
    assert_ne!(h1, HookId::from(fw_id));
    assert_eq!(controller.inspected_elements_for(&fw), Some(vec![id("p1"), id("p2")]));
}

#[test]
fn test_redirect_rolls_back_fresh_port() {
    let (driver, controller) = mock(&["p1", "fw"]);
    let fw = InspectionPortElement::symmetric(id("fw"));

    driver.fail_next(DriverOp::InstallHook, DriverError::invalid_parameter("rejected"));
    let err = controller.redirect(&[id("p1")], &fw, vxlan(1, 1)).unwrap_err();
    assert!(err.is_backend_failure());
    assert!(controller.get_inspection_port(&fw).is_none());
    assert!(driver.snapshot().unwrap().ports.is_empty());

    let hook = controller.redirect(&[id("p1")], &fw, vxlan(1, 1)).unwrap();
    assert_eq!(hook_ids(&controller, &id("p1")), vec![hook]);
}

#[test]
fn test_session_released_exactly_once() {
    let driver = Arc::new(MockDriver::with_ports(["p1"]));
    {
        let controller =
            RedirectionController::open(driver.clone(), RedirectionControllerConfig::default()).unwrap();
        driver.fail_next(DriverOp::CreateElement, DriverError::unreachable("mock"));
        assert!(controller.register_network_element(&[id("p1")]).is_err());
    }
    assert_eq!(driver.connect_count(), 1);
    assert_eq!(driver.disconnect_count(), 1);

    // The session is free again.
    let controller = RedirectionController::open(driver.clone(), RedirectionControllerConfig::default()).unwrap();
    controller.close().unwrap();
    assert_eq!(driver.disconnect_count(), 2);
}

#[test]
fn test_reconcile_after_timeout() {
    let (driver, controller) = mock(&["p1", "fw"]);
    let fw = InspectionPortElement::symmetric(id("fw"));
    controller.register_inspection_port(&fw).unwrap();

    driver.fail_after_apply(DriverOp::InstallHook, DriverError::unreachable("mock"));
    assert!(controller.install_inspection_hook(&[id("p1")], &fw, vxlan(1, 1)).is_err());

    let report = controller.reconcile().unwrap();
    assert_eq!(report.hooks.added, 1);
    assert_eq!(report.ports.total(), 0);

    let installed = controller.get_inspection_hook_for(&id("p1"), &fw).unwrap();
    let retried = controller.install_inspection_hook(&[id("p1")], &fw, vxlan(1, 1)).unwrap();
    assert_eq!(installed.hook_id, retried);
    assert_eq!(driver.call_count(DriverOp::InstallHook), 1);
}

#[test]
fn test_remove_port_after_lost_create_reply() {
    let (driver, controller) = mock(&["fw"]);
    let fw = InspectionPortElement::symmetric(id("fw"));

    driver.fail_after_apply(DriverOp::CreateInspectionPort, DriverError::unreachable("mock"));
    assert!(controller.register_inspection_port(&fw).is_err());
    assert!(controller.get_inspection_port(&fw).is_none());
    assert_eq!(driver.snapshot().unwrap().ports.len(), 1);

    controller.remove_inspection_port(&fw).unwrap();
    assert!(driver.snapshot().unwrap().ports.is_empty());
    assert!(controller.inspection_ports().is_empty());
}

#[test]
fn test_concurrent_disjoint_and_shared_elements() {
    let names: Vec<String> = (0..8).map(|i| format!("e{}", i)).collect();
    let ports: Vec<String> = (0..8).map(|i| format!("fw{}", i)).collect();
    let all: Vec<&str> = names
        .iter()
        .chain(ports.iter())
        .map(String::as_str)
        .chain(["shared"])
        .collect();
    let (_, controller) = mock(&all);

    let registered: Vec<InspectionPortElement> = ports
        .iter()
        .map(|p| {
            let port = InspectionPortElement::symmetric(id(p));
            controller.register_inspection_port(&port).unwrap();
            port
        })
        .collect();

    // Disjoint elements, one hook each.
    thread::scope(|s| {
        for (name, port) in names.iter().zip(&registered) {
            let controller = &controller;
            s.spawn(move || {
                controller.install_inspection_hook(&[id(name)], port, vxlan(1, 1)).unwrap();
            });
        }
    });
    for name in &names {
        assert_eq!(controller.inspection_chain(&id(name)).len(), 1);
    }

    // Shared element, distinct orders: every install lands.
    thread::scope(|s| {
        for (i, port) in registered.iter().enumerate().skip(1) {
            let controller = &controller;
            s.spawn(move || {
                controller
                    .install_inspection_hook(&[id("e0")], port, vxlan(2, 10 + i as u64))
                    .unwrap();
            });
        }
    });
    let orders: Vec<u64> = controller.inspection_chain(&id("e0")).iter().map(|h| h.order).collect();
    assert_eq!(orders, vec![1, 11, 12, 13, 14, 15, 16, 17]);

    // Shared element, same order: exactly one wins.
    let results: Vec<bool> = thread::scope(|s| {
        let handles: Vec<_> = registered
            .iter()
            .map(|port| {
                let controller = &controller;
                s.spawn(move || {
                    controller
                        .install_inspection_hook(&[id("shared")], port, vxlan(3, 99))
                        .is_ok()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
    assert_eq!(controller.inspection_chain(&id("shared")).len(), 1);
}
