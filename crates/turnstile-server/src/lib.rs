//! Turnstile production server.
//!
//! Production "glue" around [`turnstile_core`]'s action-based coordinator:
//! a JSON-lines TCP transport, a Tokio runtime, and the system clock. The
//! coordinator itself never touches a socket; one loop feeds it events and
//! executes the actions it returns.
//!
//! # Components
//!
//! - [`Runtime`]: single-writer loop around the coordinator
//! - [`ChannelTransport`]: per-connection outbound queues and room groups
//! - [`tcp`]: JSON-lines codec, reader/writer tasks per connection
//! - [`SystemEnv`]: production environment (real time, Tokio sleep)

#![forbid(unsafe_code)]

mod error;
mod runtime;
mod system_env;
pub mod tcp;
mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

pub use error::ServerError;
pub use runtime::{Runtime, TICK_INTERVAL};
pub use system_env::SystemEnv;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
pub use transport::{ChannelTransport, Transport};
use turnstile_core::ServerConfig;

/// Production turnstile server.
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
}

impl Server {
    /// Bind the listener on the configured port.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
        Ok(Self { config, listener })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections and run the coordinator loop until failure.
    pub async fn run(self) -> Result<(), ServerError> {
        let env = SystemEnv::new();
        let transport = Arc::new(ChannelTransport::new());
        let (events, inbox) = mpsc::unbounded_channel();
        let runtime = Runtime::new(env, self.config, Arc::clone(&transport), inbox)?;

        tokio::select! {
            result = tcp::serve(self.listener, events, transport) => Ok(result?),
            () = runtime.run() => Ok(()),
        }
    }
}
