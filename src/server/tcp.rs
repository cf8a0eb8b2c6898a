//! # Servidor TCP Concurrente
//! src/server/tcp.rs
//!
//! Acepta conexiones y atiende cada una en su propio thread. La
//! configuración se comparte de solo lectura entre todos los threads.

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread;

use log::{debug, error, info};

use crate::config::Config;
use crate::server::connection;

/// Servidor Spartan
pub struct Server {
    config: Arc<Config>,
    listener: TcpListener,
}

impl Server {
    /// Abre el socket en la dirección configurada
    pub fn bind(config: Config) -> io::Result<Self> {
        let address = config.address();
        let listener = TcpListener::bind(&address)?;
        info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            config: Arc::new(config),
            listener,
        })
    }

    /// Dirección real del socket (útil con puerto 0)
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Loop de aceptación; no retorna mientras el socket siga abierto
    pub fn run(&self) -> io::Result<()> {
        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    continue;
                }
            };

            let peer = stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "unknown".to_string());
            debug!("New connection from {}", peer);

            let config = Arc::clone(&self.config);
            let spawned = thread::Builder::new()
                .name(format!("conn-{}", peer))
                .spawn(move || {
                    if let Err(e) = connection::handle(stream, &config) {
                        error!("Connection {} failed: {}", peer, e);
                    }
                });

            if let Err(e) = spawned {
                error!("Cannot spawn connection thread: {}", e);
            }
        }

        Ok(())
    }
}
