//! DHCP/proxyDHCP netboot handling: wire codec, the pure decision engine,
//! and the async server loop that ties them to a socket (spec §4.D, §4.E).

pub mod decide;
pub mod server;
pub mod transport;
pub mod wire;

pub use decide::decide;
