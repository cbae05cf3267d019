//! Integration tests for bulk registration into owner-scoped sets.

use exam_guard_platform::{
    Key, KeyCombo, Modifiers, RegisteredSet, SyntheticShortcutRegistry, register_all,
    unregister_all,
};

fn combos() -> Vec<KeyCombo> {
    vec![
        KeyCombo::new(Modifiers::ALT, Key::Tab),
        KeyCombo::new(Modifiers::ALT, Key::F4),
        KeyCombo::bare(Key::PrintScreen),
    ]
}

#[test]
fn registered_set_tests_absorbs_foreign_and_unsupported_combos() {
    let registry = SyntheticShortcutRegistry::new()
        .with_foreign(&[KeyCombo::new(Modifiers::ALT, Key::Tab)])
        .with_unsupported(&[KeyCombo::bare(Key::PrintScreen)]);
    let mut held = RegisteredSet::new();

    let report = register_all(&registry, &combos(), &mut held);
    assert_eq!(report.registered, 1);
    assert_eq!(report.failed.len(), 2);
    assert_eq!(held.combos(), vec![KeyCombo::new(Modifiers::ALT, Key::F4)]);
}

#[test]
fn registered_set_tests_second_pass_does_not_double_register() {
    let registry = SyntheticShortcutRegistry::new();
    let mut held = RegisteredSet::new();

    register_all(&registry, &combos(), &mut held);
    let second = register_all(&registry, &combos(), &mut held);
    assert_eq!(second.registered, 0);
    assert_eq!(second.already_held, 3);
    assert_eq!(registry.register_calls(), 3);

    assert_eq!(unregister_all(&registry, &mut held), 3);
    assert!(held.is_empty());
    assert!(registry.active_combos().is_empty());
    assert_eq!(unregister_all(&registry, &mut held), 0);
}

#[test]
fn registered_set_tests_owners_never_release_each_other() {
    let registry = SyntheticShortcutRegistry::new();
    let mut first = RegisteredSet::new();
    let mut second = RegisteredSet::new();

    register_all(&registry, &combos(), &mut first);
    let report = register_all(&registry, &combos(), &mut second);
    assert_eq!(report.failed.len(), 3);
    assert!(second.is_empty());

    unregister_all(&registry, &mut second);
    assert_eq!(registry.active_combos().len(), 3);
}
