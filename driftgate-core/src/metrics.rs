//! Metric recording hooks. Bodies compile to nothing without the `metrics` feature.

use crate::shutdown::ShutdownReason;

#[cfg(feature = "metrics")]
use driftgate_observability::metrics as m;

pub(crate) fn connection_opened() {
    #[cfg(feature = "metrics")]
    if m::metrics_enabled() {
        m::ACTIVE_CONNECTIONS.inc();
    }
}

pub(crate) fn connection_closed() {
    #[cfg(feature = "metrics")]
    if m::metrics_enabled() {
        m::ACTIVE_CONNECTIONS.dec();
    }
}

pub(crate) fn connection_accepted() {
    #[cfg(feature = "metrics")]
    if m::metrics_enabled() {
        m::CONNECTIONS_ACCEPTED_TOTAL.inc();
    }
}

pub(crate) fn connection_rejected() {
    #[cfg(feature = "metrics")]
    if m::metrics_enabled() {
        m::CONNECTIONS_REJECTED_TOTAL.inc();
    }
}

pub(crate) fn accept_error() {
    #[cfg(feature = "metrics")]
    if m::metrics_enabled() {
        m::ACCEPT_ERRORS_TOTAL.inc();
    }
}

pub(crate) fn handler_error() {
    #[cfg(feature = "metrics")]
    if m::metrics_enabled() {
        m::HANDLER_ERRORS_TOTAL.inc();
    }
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub(crate) fn shutdown_requested(reason: ShutdownReason) {
    #[cfg(feature = "metrics")]
    if m::metrics_enabled() {
        m::SHUTTING_DOWN.set(1);
        m::SHUTDOWN_REQUESTS_TOTAL
            .with_label_values(&[reason.as_str()])
            .inc();
    }
}
