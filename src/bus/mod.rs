//! The host message bus, as seen by the relay
//! The relay depends on this capability to reach apps and the manager;
//! it never owns routing or connection handling itself.

pub mod messages;
pub mod stdio;

use log::Level;

pub use messages::{InboundMessage, OutboundMessage};
pub use stdio::StdioBus;

/// Log target used for messages logged through the bus sink
pub const BUS_LOG_TARGET: &str = "beacon_relay::bus";

/// Capability interface offered by the host messaging framework.
///
/// Sends are fire-and-forget: implementations must not block and no
/// acknowledgment is awaited.
pub trait MessageBus: Send + Sync + 'static {
    /// Sends a message to a subscriber address
    fn send_message(&self, address: &str, message: OutboundMessage);

    /// Sends a message to the adaptor manager
    fn send_manager_message(&self, message: OutboundMessage);

    /// Logging sink with severity levels
    fn log(&self, level: Level, message: &str) {
        log::log!(target: BUS_LOG_TARGET, level, "{}", message);
    }
}
