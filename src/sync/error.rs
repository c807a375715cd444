//! Error taxonomy for the synchronization core

use thiserror::Error;

use super::guard::Ticket;

/// Errors raised by guards, counters and loggers.
///
/// Lost updates and garbled lines produced by the unguarded variants are
/// *not* errors: they are the measured outcome of those variants.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A guard or component was configured with impossible parameters,
    /// e.g. a bounded guard with zero permits.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A guard was used against its protocol, e.g. releasing a ticket that
    /// is not currently held.
    #[error("Invalid guard state: {reason} (ticket {ticket})")]
    InvalidState { ticket: Ticket, reason: &'static str },

    /// The sink or the shared guard storage failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub(crate) fn not_held(ticket: Ticket) -> Self {
        SyncError::InvalidState {
            ticket,
            reason: "release without a matching acquire",
        }
    }

    /// Whether this error signals a broken caller invariant rather than an
    /// environmental failure.
    pub fn is_programming_error(&self) -> bool {
        !matches!(self, SyncError::Io(_))
    }
}
