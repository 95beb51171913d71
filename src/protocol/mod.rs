//! Messaging between the coordinator, page agents and the control surface
//!
//! - message: the tagged wire contract and its replies
//! - transport: the request/response channel and the in-process bus
//! - delivery: probing, injection and the single retry for page sends

pub mod delivery;
pub mod message;
pub mod transport;

pub use delivery::Delivery;
pub use message::{Message, PageInfo, Response, message_schema, response_schema};
pub use transport::{Bus, Endpoint, MessageHandler, TabId, Target, Transport};
