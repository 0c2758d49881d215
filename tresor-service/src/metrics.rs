//! Metrics definitions for the server.
//!
//! This module defines all metrics keys the service emits and provides a
//! helper [`describe_metrics`] to set metadata for each metric using the
//! `metrics` crate, following `oprf-service::metrics`'s layout.

/// Number of currently open client connections.
pub const METRICS_ID_CONNECTIONS_OPEN: &str = "tresor.service.connections.open";
/// Number of successful `Signup` requests.
pub const METRICS_ID_SIGNUP_SUCCESS: &str = "tresor.service.signup.success";
/// Number of `Signup` requests rejected for a taken username.
pub const METRICS_ID_SIGNUP_TAKEN: &str = "tresor.service.signup.taken";
/// Number of successful `Login` requests.
pub const METRICS_ID_LOGIN_SUCCESS: &str = "tresor.service.login.success";
/// Number of failed `Login` requests.
pub const METRICS_ID_LOGIN_FAILURE: &str = "tresor.service.login.failure";
/// Number of usersets created.
pub const METRICS_ID_USERSETS_CREATED: &str = "tresor.service.usersets.created";
/// Number of decryption operations prepared.
pub const METRICS_ID_OPERATIONS_PREPARED: &str = "tresor.service.operations.prepared";
/// Number of decryption operations that reached both thresholds and
/// finished.
pub const METRICS_ID_OPERATIONS_FINISHED: &str = "tresor.service.operations.finished";
/// Number of `DecryptParticipate` requests answered `NotRequired`.
pub const METRICS_ID_PARTICIPATE_NOT_REQUIRED: &str = "tresor.service.participate.not_required";
/// Duration of a single `SendDecryptionPart` request from receipt to ack.
pub const METRICS_ID_SEND_PART_DURATION: &str = "tresor.service.send_part.duration";

/// Describes all metrics used by the service, following `oprf-service`'s
/// `describe_metrics`.
pub fn describe_metrics() {
    metrics::describe_gauge!(
        METRICS_ID_CONNECTIONS_OPEN,
        metrics::Unit::Count,
        "Number of currently open client connections"
    );
    metrics::describe_counter!(
        METRICS_ID_SIGNUP_SUCCESS,
        metrics::Unit::Count,
        "Number of successful signups"
    );
    metrics::describe_counter!(
        METRICS_ID_SIGNUP_TAKEN,
        metrics::Unit::Count,
        "Number of signups rejected for a taken username"
    );
    metrics::describe_counter!(
        METRICS_ID_LOGIN_SUCCESS,
        metrics::Unit::Count,
        "Number of successful logins"
    );
    metrics::describe_counter!(
        METRICS_ID_LOGIN_FAILURE,
        metrics::Unit::Count,
        "Number of failed logins"
    );
    metrics::describe_counter!(
        METRICS_ID_USERSETS_CREATED,
        metrics::Unit::Count,
        "Number of usersets created"
    );
    metrics::describe_counter!(
        METRICS_ID_OPERATIONS_PREPARED,
        metrics::Unit::Count,
        "Number of decryption operations prepared"
    );
    metrics::describe_counter!(
        METRICS_ID_OPERATIONS_FINISHED,
        metrics::Unit::Count,
        "Number of decryption operations that finished"
    );
    metrics::describe_counter!(
        METRICS_ID_PARTICIPATE_NOT_REQUIRED,
        metrics::Unit::Count,
        "Number of DecryptParticipate requests answered NotRequired"
    );
    metrics::describe_histogram!(
        METRICS_ID_SEND_PART_DURATION,
        metrics::Unit::Milliseconds,
        "Duration of a SendDecryptionPart request from receipt to ack"
    );
}
