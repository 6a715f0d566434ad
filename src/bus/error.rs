//! Error type for bus operations.

/// Error type for publish and subscribe operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// The bus has been closed; no further deliveries or registrations.
    #[error("event bus is closed (channel: {channel})")]
    Closed {
        /// Channel the rejected operation targeted.
        channel: String,
    },
}
