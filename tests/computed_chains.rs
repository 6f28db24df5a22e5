//! Computed values: chaining, laziness, disposal, and dependency hygiene.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use loadout_observables::{cell, cloned, computed, map, sequence, untrack, OwnerId};

#[test]
fn attack_stat_example() {
    let base = cell(100);
    let bonus = cell(25);

    let attack = computed(cloned!(base, bonus => move || base.get() + bonus.get()));
    assert_eq!(attack.get(), 125);

    base.set(120);
    assert_eq!(attack.get(), 145);
}

#[test]
fn lazy_until_first_read() {
    let runs = Rc::new(Cell::new(0u32));
    let source = cell(1);

    let derived = computed({
        let runs = runs.clone();
        cloned!(source => move || {
            runs.set(runs.get() + 1);
            source.get()
        })
    });

    // Creation and upstream churn don't evaluate an unobserved computed.
    source.set(2);
    source.set(3);
    assert_eq!(runs.get(), 0);

    assert_eq!(derived.get(), 3);
    assert_eq!(runs.get(), 1);
}

#[test]
fn three_level_chain_propagates_through_derive() {
    let base = cell(2);
    let squared = computed(cloned!(base => move || base.get() * base.get()));
    let labeled = squared.derive(|n| format!("power {n}"));
    let shouted = labeled.derive(|s| s.to_uppercase());

    assert_eq!(shouted.get(), "POWER 4");

    base.set(3);
    assert_eq!(shouted.get(), "POWER 9");
}

#[test]
fn chained_observer_fires_once_per_upstream_change() {
    let base = cell(1);
    let doubled = computed(cloned!(base => move || base.get() * 2));
    let plus_ten = computed(cloned!(doubled => move || doubled.get() + 10));

    assert_eq!(plus_ten.get(), 12);

    let log: Rc<RefCell<Vec<(i32, i32)>>> = Rc::new(RefCell::new(Vec::new()));
    {
        let log = log.clone();
        plus_ten.observe(move |prev, cur| log.borrow_mut().push((*prev, *cur)));
    }

    base.set(5);

    assert_eq!(*log.borrow(), vec![(12, 20)]);
}

#[test]
fn computed_over_sequence_and_map() {
    let inventory = sequence(vec!["Sword".to_string()]);
    let weights = map::<String, u32>();
    weights.add("Sword".to_string(), 10).unwrap();
    weights.add("Shield".to_string(), 25).unwrap();

    let carry = computed(cloned!(inventory, weights => move || {
        inventory.with(|items| {
            items
                .iter()
                .map(|item| weights.try_get(item).unwrap_or(0))
                .sum::<u32>()
        })
    }));

    assert_eq!(carry.get(), 10);

    inventory.add("Shield".to_string());
    assert_eq!(carry.get(), 35);

    weights.set(&"Shield".to_string(), 30).unwrap();
    assert_eq!(carry.get(), 40);
}

#[test]
fn dependencies_follow_the_branch_actually_read() {
    let use_alt = cell(false);
    let main_cost = cell(10);
    let alt_cost = cell(99);
    let runs = Rc::new(Cell::new(0u32));

    let cost = computed({
        let runs = runs.clone();
        cloned!(use_alt, main_cost, alt_cost => move || {
            runs.set(runs.get() + 1);
            if use_alt.get() { alt_cost.get() } else { main_cost.get() }
        })
    });

    assert_eq!(cost.get(), 10);
    assert_eq!(runs.get(), 1);

    // The branch not taken is not a dependency.
    alt_cost.set(100);
    assert_eq!(cost.get(), 10);
    assert_eq!(runs.get(), 1);

    use_alt.set(true);
    assert_eq!(cost.get(), 100);
    assert_eq!(runs.get(), 2);

    // After the switch, the previously-live branch is dropped.
    main_cost.set(0);
    assert_eq!(cost.get(), 100);
    assert_eq!(runs.get(), 2);
}

#[test]
fn untracked_read_stays_out_of_the_dependency_set() {
    let tracked = cell(1);
    let peeked = cell(100);

    let snapshot = computed(cloned!(tracked, peeked => move || {
        (tracked.get(), untrack(|| peeked.get()))
    }));

    assert_eq!(snapshot.get(), (1, 100));

    peeked.set(999);
    assert_eq!(snapshot.get(), (1, 100));

    tracked.set(2);
    assert_eq!(snapshot.get(), (2, 999));
}

#[test]
fn dispose_unhooks_upstream_subscriptions() {
    let base = cell(1);
    let doubled = computed(cloned!(base => move || base.get() * 2));
    assert_eq!(doubled.get(), 2);
    assert_eq!(base.as_subject().dependent_count(), 1);

    doubled.dispose();
    assert_eq!(base.as_subject().dependent_count(), 0);

    // Upstream churn after disposal is ignored.
    base.set(50);
}

#[test]
fn dropping_a_computed_releases_it_from_upstream() {
    let base = cell(1);
    {
        let doubled = computed(cloned!(base => move || base.get() * 2));
        assert_eq!(doubled.get(), 2);
    }
    // The weak dependent entry dies with the computed; the next mutation
    // sweeps it.
    base.set(2);
    assert_eq!(base.as_subject().dependent_count(), 0);
}

#[test]
fn observer_teardown_by_owner() {
    let base = cell(1);
    let doubled = computed(cloned!(base => move || base.get() * 2));
    doubled.get();

    let widget = OwnerId::new();
    let fired = Rc::new(Cell::new(0u32));
    {
        let fired = fired.clone();
        doubled.observe_owned(widget, move |_, _| fired.set(fired.get() + 1));
    }

    doubled.stop_observing_all(Some(widget));
    base.set(2);

    assert_eq!(fired.get(), 0);
}
