//! Property tests: any enable/disable sequence leaves the same shortcut set
//! as the equivalent single canonical call.

use std::sync::Arc;
use std::time::Duration;

use exam_guard_platform::{SyntheticClipboard, SyntheticShortcutRegistry};
use exam_guard_restriction::{CAPTURE_SHORTCUTS, RestrictionConfig, RestrictionEnforcer};
use proptest::prelude::*;

proptest! {
    #[test]
    fn idempotence_property_tests_prop_enable_disable_sequences_are_idempotent(calls in prop::collection::vec(any::<bool>(), 1..24)) {
        let registry = Arc::new(SyntheticShortcutRegistry::new());
        let mut enforcer = RestrictionEnforcer::new(
            registry.clone(),
            Arc::new(SyntheticClipboard::new()),
            RestrictionConfig::new(Duration::from_secs(60)),
        );

        let mut expected_active = false;
        let mut enable_transitions = 0usize;
        for enable in calls {
            if enable {
                if !expected_active {
                    enable_transitions += 1;
                }
                enforcer.enable();
            } else {
                enforcer.disable();
            }
            expected_active = enable;

            let mut canonical: Vec<_> = if expected_active {
                CAPTURE_SHORTCUTS.to_vec()
            } else {
                Vec::new()
            };
            canonical.sort();
            prop_assert_eq!(registry.active_combos(), canonical);
            prop_assert_eq!(enforcer.status().active, expected_active);
        }

        prop_assert_eq!(
            registry.register_calls(),
            enable_transitions * CAPTURE_SHORTCUTS.len()
        );
    }
}
