//! Counters recorded through the `metrics` facade.
//!
//! Nothing is exported unless the embedding application installs a recorder.

use hive_storage::EntityKind;
use ::metrics::{counter, describe_counter};

/// Register metric descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(
        "hive_reconcile_events_total",
        "Change events and pulled rows handled by the reconciler, by outcome"
    );
    describe_counter!(
        "hive_subscription_reconnects_total",
        "Change feed reconnect attempts per entity kind"
    );
    describe_counter!(
        "hive_subscription_degraded_total",
        "Subscriptions that gave up after the retry ceiling"
    );
}

pub(crate) fn record_reconcile(kind: EntityKind, outcome: &'static str, count: u64) {
    if count > 0 {
        counter!("hive_reconcile_events_total", "kind" => kind.as_str(), "outcome" => outcome)
            .increment(count);
    }
}

pub(crate) fn record_reconnect(kind: EntityKind) {
    counter!("hive_subscription_reconnects_total", "kind" => kind.as_str()).increment(1);
}

pub(crate) fn record_degraded(kind: EntityKind) {
    counter!("hive_subscription_degraded_total", "kind" => kind.as_str()).increment(1);
}
