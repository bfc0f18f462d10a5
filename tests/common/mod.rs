//! Integration test common infrastructure.
//!
//! Spawns in-process HTTP servers on `127.0.0.1:0`: the gateway itself plus
//! fake classifier, upstream origin and sibling reputation services.

pub mod fakes;
pub mod server;

#[allow(unused_imports)]
pub use fakes::{
    CountingCredentials, FakeClassifierApi, FakeEnricher, FakeReputationApi, spawn_origin,
};
#[allow(unused_imports)]
pub use server::{TestGateway, client, config_text, spawn_router};
