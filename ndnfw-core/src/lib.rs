use log::info;

pub mod packets;
pub mod tlv;

pub use packets::*;
pub use tlv::{TlvElement, TlvError};

pub fn init() {
    info!("ndnfw core initialized");
}
