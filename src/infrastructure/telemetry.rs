//! Softphone metrics
//!
//! Recorded through the `metrics` facade; installing an exporter is left to
//! the embedding application.

use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Register metric descriptions with the installed recorder
pub fn describe_metrics() {
    describe_counter!("softphone_calls_placed_total", "Outbound calls requested");
    describe_counter!("softphone_calls_answered_total", "Calls that reached InCall");
    describe_counter!("softphone_calls_failed_total", "Calls that ended in a failure");
    describe_counter!(
        "softphone_incoming_rejected_total",
        "Incoming sessions rejected because the call slot was busy or the device not ready"
    );
    describe_counter!("softphone_registrations_total", "Device registration attempts");
    describe_counter!("softphone_transfers_total", "Finished transfer attempts");
    describe_gauge!("softphone_call_active", "1 while the call slot is in use");
}

pub fn record_call_placed() {
    counter!("softphone_calls_placed_total").increment(1);
}

pub fn record_call_answered() {
    counter!("softphone_calls_answered_total").increment(1);
}

pub fn record_call_failed(reason: &str) {
    counter!("softphone_calls_failed_total", "reason" => reason.to_string()).increment(1);
}

pub fn record_incoming_rejected() {
    counter!("softphone_incoming_rejected_total").increment(1);
}

pub fn record_registration(success: bool) {
    counter!("softphone_registrations_total", "success" => success.to_string()).increment(1);
}

pub fn record_transfer(outcome: &str) {
    counter!("softphone_transfers_total", "outcome" => outcome.to_string()).increment(1);
}

pub fn set_call_active(active: bool) {
    gauge!("softphone_call_active").set(if active { 1.0 } else { 0.0 });
}
