// ABOUTME: Prometheus metrics for pairing and relay activity
// ABOUTME: Thin wrappers over the metrics macros so call sites stay one line

use anyhow::{Context, Result};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder. Call once at startup.
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

pub fn record_event(kind: &'static str) {
    counter!("anonchat_events_total", "kind" => kind).increment(1);
}

pub fn record_pair_created() {
    counter!("anonchat_pairs_created_total").increment(1);
}

pub fn record_message_relayed() {
    counter!("anonchat_messages_relayed_total").increment(1);
}

pub fn record_chat_ended() {
    counter!("anonchat_chats_ended_total").increment(1);
}

pub fn record_new_user() {
    counter!("anonchat_new_users_total").increment(1);
}

/// `kind` is "transient" or "unexpected"; `target` is "user" or "oversight"
pub fn record_delivery_failure(kind: &'static str, target: &'static str) {
    counter!("anonchat_delivery_failures_total", "kind" => kind, "target" => target).increment(1);
}

pub fn set_queue_gauges(waiting: usize, pairs: usize) {
    gauge!("anonchat_waiting_users").set(waiting as f64);
    gauge!("anonchat_active_pairs").set(pairs as f64);
}
