use log::info;

pub mod algorithm;
pub mod best_route;
pub mod cs;
pub mod dead_nonce_list;
pub mod face;
pub mod fib;
pub mod forwarder;
pub mod measurements;
pub mod multicast;
pub mod name_tree;
pub mod pit;
pub mod region;
pub mod scheduler;
pub mod strategy;

pub use face::{Face, FaceEvent, FaceMessage, FaceScope, FaceTable, LinkType};
pub use forwarder::{
    Forwarder, ForwarderConfig, ForwarderCounters, ForwardingEngine, UnsolicitedDataPolicy,
};
pub use strategy::{Strategy, StrategyChoice};

pub fn init() {
    info!("ndnfw forwarding core initialized");
}
