//! # spsrv
//! src/lib.rs
//!
//! Servidor del protocolo Spartan: archivos estáticos, listados de
//! directorio, directorios de usuario y scripts CGI.
//!
//! ## Arquitectura
//!
//! - `spartan`: request line, data block y respuestas del protocolo
//! - `config`: archivo TOML y flags de línea de comandos
//! - `router`: traduce el path pedido a un archivo, sin salir de la raíz
//! - `handlers`: archivos, listados y CGI
//! - `server`: socket TCP y manejo de cada conexión
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use spsrv::config::Config;
//! use spsrv::server::Server;
//!
//! let server = Server::bind(Config::default()).expect("no se pudo abrir el puerto");
//! server.run().expect("error en el servidor");
//! ```

pub mod config;
pub mod handlers;
pub mod router;
pub mod server;
pub mod spartan;
