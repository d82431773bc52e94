// Sherpa live channel client: one reconnecting push connection per session,
// shared by chat channels and calendar feeds.

pub mod channel;
pub mod config;
pub mod endpoint;
pub mod session;
pub mod transport;

pub use channel::{ConnectionHealth, ConnectionState, LiveChannel, LiveTransport, TransportEvent};
pub use config::LiveConfig;
pub use session::{LiveHandle, LiveSession};
