//! # Construcción de Respuestas Spartan
//! src/spartan/response.rs
//!
//! Una respuesta Spartan es una sola línea de estado seguida, solo en caso
//! de éxito, por el body:
//!
//! ```text
//! 2 text/gemini; lang=en; charset=utf-8\r\n
//! # Hola mundo
//! ```
//!
//! ## Ejemplo de uso
//!
//! ```
//! use spsrv::spartan::{Response, Status};
//!
//! let response = Response::success("text/plain", b"hola".to_vec());
//! assert_eq!(response.status(), Status::Success);
//! assert_eq!(response.to_bytes(), b"2 text/plain\r\nhola");
//! ```

use super::Status;

/// Representa una respuesta Spartan completa
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Código de estado (2, 3, 4, 5)
    status: Status,

    /// Meta: content-type, path destino o mensaje de error
    meta: String,

    /// Cuerpo de la respuesta (solo se envía con `Status::Success`)
    body: Vec<u8>,
}

impl Response {
    /// Crea una respuesta sin body
    pub fn new(status: Status, meta: &str) -> Self {
        Self {
            status,
            meta: meta.to_string(),
            body: Vec::new(),
        }
    }

    /// Respuesta exitosa con content-type y contenido
    pub fn success(content_type: &str, body: Vec<u8>) -> Self {
        Self::new(Status::Success, content_type).with_body(body)
    }

    /// Redirección hacia `target`
    pub fn redirect(target: &str) -> Self {
        Self::new(Status::Redirect, target)
    }

    /// Error atribuible al cliente
    pub fn client_error(message: &str) -> Self {
        Self::new(Status::ClientError, message)
    }

    /// Error atribuible al servidor
    pub fn server_error(message: &str) -> Self {
        Self::new(Status::ServerError, message)
    }

    /// Establece el cuerpo de la respuesta
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Convierte la respuesta a bytes listos para enviar por el socket
    ///
    /// - Línea de estado: `<dígito> <meta>\r\n`
    /// - Body: solo si el estado es de éxito
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = format!("{} {}\r\n", self.status, self.meta);

        let mut result = Vec::with_capacity(header.len() + self.body.len());
        result.extend_from_slice(header.as_bytes());
        if self.status.is_success() {
            result.extend_from_slice(&self.body);
        }
        result
    }

    /// Obtiene el código de estado
    pub fn status(&self) -> Status {
        self.status
    }

    /// Obtiene el meta de la línea de estado
    pub fn meta(&self) -> &str {
        &self.meta
    }

    /// Obtiene una referencia al body
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}
