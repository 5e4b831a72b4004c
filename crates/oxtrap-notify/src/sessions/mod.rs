pub mod udp;

pub use udp::{UdpSession, UdpSessionOpener};
