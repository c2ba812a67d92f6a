/// Envelope codec: `{topic, payload}` to two wire frames and back.
pub mod codec;
/// Node configuration loading (defaults, file, `EXTNODE_*` environment).
pub mod config;
/// Structured logging (filters, console and file sinks).
pub mod logging;
/// Message envelope and payload types.
pub mod message;
/// Transport connection to the broker: framing, reconnect, queues.
pub mod network;
/// Bus node: lifecycle, control messages, dispatch loop.
pub mod node;
/// Topic router: subscription patterns and handler matching.
pub mod pubsub;
/// Well-known topic names.
pub mod topics;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Error types and result aliases.
pub use extnode_error::{
    ConnectError, DecodeError, ErrorExt, LifecycleError, NodeResult, PublishError, StackError,
    StatusCode,
};

/// Configuration.
pub use config::NodeConfig;
/// Logging entry point.
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
/// Message envelope.
pub use message::{Message, Payload};
/// Transport state.
pub use network::TransportState;
/// Node API.
pub use node::{
    connect, LifecycleState, Node, NotificationLevel, OperateAction, OperateCommand,
    StatsSnapshot, WeakNode,
};
/// Handler registration types.
pub use pubsub::{HandlerError, HandlerResult, SubscriptionHandle};
