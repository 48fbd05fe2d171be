//! Property-based tests for discovery reconciliation over random
//! sequences of endpoint sets.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use pitlink_communication::{LinkManager, LinkSettings};
use pitlink_protocol::CommandRegistry;
use proptest::prelude::*;

use common::{FixedScanner, MockFactory, REGISTRY};

const DEVICES: [&str; 3] = ["base", "pedals", "wheel"];
const PATHS: [&str; 2] = ["/dev/ttyACM0", "/dev/ttyACM1"];

fn manager(factory: Arc<MockFactory>) -> LinkManager {
    let registry = CommandRegistry::from_yaml_str(REGISTRY).unwrap();
    LinkManager::new(
        Arc::new(RwLock::new(Arc::new(registry))),
        LinkSettings::dry_run(),
        Arc::new(FixedScanner::default()),
        factory,
        Arc::new(|_: &str, _: Vec<u8>| {}),
    )
}

/// One discovery pass: an optional path index per device
fn pass() -> impl Strategy<Value = Vec<Option<usize>>> {
    proptest::collection::vec(proptest::option::of(0..PATHS.len()), DEVICES.len())
}

fn discovered(pass: &[Option<usize>]) -> HashMap<String, String> {
    DEVICES
        .iter()
        .zip(pass)
        .filter_map(|(device, path)| path.map(|p| (device.to_string(), PATHS[p].to_string())))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_persisting_endpoints_keep_their_link(passes in proptest::collection::vec(pass(), 1..10)) {
        let factory = Arc::new(MockFactory::default());
        let manager = manager(Arc::clone(&factory));
        let mut previous: HashMap<String, String> = HashMap::new();

        for pass in &passes {
            let current = discovered(pass);
            let persisting: Vec<_> = previous
                .iter()
                .filter(|(device, path)| current.get(*device) == Some(*path))
                .filter_map(|(device, _)| factory.link(device))
                .collect();

            manager.reconcile(current.clone());

            for link in persisting {
                let now = factory.link(&link.device).unwrap();
                prop_assert!(Arc::ptr_eq(&link, &now));
                prop_assert_eq!(link.stop_count(), 0);
            }

            let mut expected: Vec<String> = current.keys().cloned().collect();
            expected.sort();
            prop_assert_eq!(manager.active_devices(), expected);
            previous = current;
        }

        for link in factory.opened.lock().iter() {
            prop_assert!(link.stop_count() <= 1);
        }
    }

    #[test]
    fn prop_stop_all_stops_every_link_once(passes in proptest::collection::vec(pass(), 1..6)) {
        let factory = Arc::new(MockFactory::default());
        let manager = manager(Arc::clone(&factory));
        for pass in &passes {
            manager.reconcile(discovered(pass));
        }

        manager.stop_all();
        prop_assert!(manager.active_devices().is_empty());
        for link in factory.opened.lock().iter() {
            prop_assert_eq!(link.stop_count(), 1);
        }
    }
}
