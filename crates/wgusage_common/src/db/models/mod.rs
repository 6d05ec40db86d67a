pub mod interface;
pub mod peer;

pub use interface::Interface;
pub use peer::Peer;
