//! # Módulo del Servidor
//! src/server/mod.rs
//!
//! - `tcp`: escucha en el puerto y lanza un thread por conexión
//! - `connection`: lee un request, lo atiende y escribe la respuesta

pub mod connection;
pub mod tcp;

pub use tcp::Server;
