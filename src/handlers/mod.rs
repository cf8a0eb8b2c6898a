//! # Handlers
//!
//! Lo que se hace con un request ya resuelto.
//!
//! - **files**: archivos estáticos, con fallback a listado o redirect
//! - **listing**: listados de directorio en gemtext
//! - **cgi**: ejecución de scripts bajo los prefijos CGI

pub mod cgi;
pub mod files;
pub mod listing;

pub use cgi::{CgiError, CgiOutcome};

use std::fs::Metadata;

#[cfg(unix)]
pub(crate) fn permission_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

// Sin bits de ejecución fuera de unix: el CGI siempre declina
#[cfg(not(unix))]
pub(crate) fn permission_bits(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}
