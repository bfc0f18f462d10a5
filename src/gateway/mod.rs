//! Public gateway: dispatcher, proxy and login hand-off.
//!
//! Every request on the public listener passes the [`Dispatcher`] first
//! (as axum middleware, see [`crate::http`]). Only [`Action::AllowNext`]
//! reaches the hand-off routes.

pub mod client_ip;
pub mod dispatcher;
pub mod handoff;
pub mod proxy;

pub use client_ip::{UNKNOWN_CLIENT, client_ip};
pub use dispatcher::{Action, Dispatcher};
pub use handoff::Handoff;
pub use proxy::Forwarder;
