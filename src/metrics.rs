//! Prometheus counters for the profile operations. Without an installed
//! recorder (tests, tools) these are no-ops.

fn outcome(ok: bool) -> &'static str {
    if ok {
        "success"
    } else {
        "failure"
    }
}

pub fn record_profile_update(ok: bool) {
    metrics::counter!("resqnet_profile_updates_total", "outcome" => outcome(ok)).increment(1);
}

/// `phase` is the step that failed, or `"none"`.
pub fn record_contact_replacement(ok: bool, phase: &'static str) {
    metrics::counter!(
        "resqnet_contact_replacements_total",
        "outcome" => outcome(ok),
        "failed_phase" => phase
    )
    .increment(1);
}

pub fn record_account_deletion(ok: bool) {
    metrics::counter!("resqnet_account_deletions_total", "outcome" => outcome(ok)).increment(1);
}

pub fn set_active_sessions(count: usize) {
    metrics::gauge!("resqnet_active_sessions").set(count as f64);
}
