//! # Módulo Spartan
//!
//! Implementación del protocolo Spartan desde cero:
//!
//! - Parsing de la request line y lectura del data block
//! - Construcción de respuestas
//! - Códigos de estado
//!
//! ### Formato de Request
//!
//! ```text
//! <host> <path> <data-length>\n
//! <data-length bytes opcionales>
//! ```
//!
//! ### Formato de Response
//!
//! ```text
//! <dígito de estado> <meta>\r\n
//! <body, solo si el estado es 2>
//! ```
//!
//! Cada conexión transporta exactamente un request y una respuesta.

pub mod request;
pub mod response;
pub mod status;

pub use request::{read_data_block, read_request_line, ParseError, Request, RequestLine};
pub use response::Response;
pub use status::Status;

/// Content-type nativo del protocolo (documentos gemtext y listados)
pub const GEMINI_META: &str = "text/gemini; lang=en; charset=utf-8";

/// Documento servido cuando el path nombra un directorio
pub const INDEX_FILE: &str = "index.gmi";
