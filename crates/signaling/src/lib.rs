pub mod config;
pub mod registry;
pub mod router;
pub mod server;
pub mod transport;

pub use config::SignalingServerConfig;
pub use registry::{ConnectionRegistry, RegistryError};
pub use router::{Inbound, RoomRouter, RouteError};
pub use server::{app, run_server, serve};
pub use transport::{ChannelTransport, DeliveryError, Transport};
