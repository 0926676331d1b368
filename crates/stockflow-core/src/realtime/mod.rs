//! Realtime events
//!
//! Transport and typing for server-pushed change events.

mod channel;
mod event;
mod message;

pub use channel::{
    ChannelCommand, ChannelConnector, ChannelEndpoint, ChannelEvent, ChannelHandle,
    WebSocketConnector,
};
pub use event::{OrderCreated, RealtimeEvent, StockUpdated, ORDER_CREATED, STOCK_UPDATED};
pub use message::EventFrame;
