//! Event Bus - in-process publish/subscribe.
//!
//! Named channels, any number of listeners per channel, synchronous or
//! queued delivery, and explicit listener removal. The bus is an explicit
//! value: construct one at startup, clone it into whatever needs it, and
//! `close()` it at shutdown.
//!
//! ## Delivery model
//!
//! ```text
//! publish(channel, msg)
//!        │
//!        ▼
//! ┌─────────────────────────────┐
//! │ snapshot listeners (FIFO)   │  ◄── copy-on-iterate; lock released
//! └─────────────┬───────────────┘
//!               │ for each listener still active
//!               ▼
//! ┌──────────────┐   ┌────────────────────┐
//! │ sync handler │   │ queued (mpsc) tx   │──► QueuedSubscription::recv()
//! └──────────────┘   └────────────────────┘
//! ```
//!
//! - Listeners registered during a delivery do not see that delivery.
//! - Listeners removed during a delivery are skipped for the rest of it.
//! - Messages published on a channel with no listeners are dropped.
//! - A publish on the channel currently being delivered waits until that
//!   delivery finishes, so each channel stays FIFO.
//!
//! ## Example
//!
//! ```
//! use civitas_gateway::bus::EventBus;
//! use civitas_gateway::message::{Action, Message};
//! use serde_json::json;
//!
//! let bus = EventBus::new();
//! let handle = bus
//!     .subscribe("UserEvent", |msg| println!("got {}", msg.correlation_id()))
//!     .unwrap();
//!
//! let delivered = bus
//!     .publish("UserEvent", &Message::crud("UserEvent", Action::Create, json!({})))
//!     .unwrap();
//! assert_eq!(delivered, 1);
//!
//! bus.unsubscribe(&handle);
//! assert_eq!(bus.listener_count("UserEvent"), 0);
//! ```

mod error;
mod event_bus;
mod subscription;

pub use error::BusError;
pub use event_bus::{EventBus, Handler};
pub use subscription::{QueuedSubscription, SubscribeOptions, SubscriptionHandle};
