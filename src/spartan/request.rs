//! # Parsing de Requests Spartan
//! src/spartan/request.rs
//!
//! ## Formato de un Request Spartan
//!
//! ```text
//! example.org /path/to/file.gmi 0\n
//! ```
//!
//! ## Componentes
//!
//! 1. **Request Line**: `<host> <path> <data-length>` separados por un espacio
//! 2. **Data block**: exactamente `<data-length>` bytes (opcional, solo para CGI)
//!
//! La línea termina en `\n`; un `\r` previo se descarta.

use std::io::{self, BufRead, Read};
use std::net::SocketAddr;

use thiserror::Error;

/// Largo máximo de la request line (sin el terminador)
pub const MAX_REQUEST_LINE: usize = 1024;

/// Errores que pueden ocurrir al leer o parsear un request
#[derive(Debug, Error)]
pub enum ParseError {
    /// La línea supera `MAX_REQUEST_LINE`
    #[error("request line exceeds {} bytes", MAX_REQUEST_LINE)]
    TooLong,

    /// El cliente cerró la conexión antes del `\n`
    #[error("request line is not terminated")]
    Unterminated,

    /// La línea no es UTF-8 válido
    #[error("request line is not valid UTF-8")]
    InvalidUtf8,

    /// No son exactamente tres tokens
    #[error("expected `<host> <path> <data-length>`, got {0} tokens")]
    InvalidRequestLine(usize),

    /// El largo declarado no es un entero decimal no negativo
    #[error("invalid data length: {0:?}")]
    InvalidDataLength(String),

    /// Llegaron menos bytes que los declarados
    #[error("incomplete data block: expected {expected} bytes, received {received}")]
    IncompleteData { expected: usize, received: usize },

    /// Error de lectura en el socket
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Request line parseada
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    /// Host pedido por el cliente
    pub host: String,

    /// Path pedido (ej: "/docs/")
    pub path: String,

    /// Largo declarado del data block
    pub data_len: usize,
}

impl RequestLine {
    /// Parsea `<host> <path> <data-length>`
    ///
    /// # Ejemplo
    ///
    /// ```
    /// use spsrv::spartan::RequestLine;
    ///
    /// let line = RequestLine::parse("localhost /index.gmi 0").unwrap();
    /// assert_eq!(line.host, "localhost");
    /// assert_eq!(line.path, "/index.gmi");
    /// assert_eq!(line.data_len, 0);
    /// ```
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        // Separador literal: dos espacios seguidos generan un token vacío
        let parts: Vec<&str> = line.split(' ').collect();
        if parts.len() != 3 {
            return Err(ParseError::InvalidRequestLine(parts.len()));
        }

        let data_len = parts[2]
            .parse::<usize>()
            .map_err(|_| ParseError::InvalidDataLength(parts[2].to_string()))?;

        Ok(Self {
            host: parts[0].to_string(),
            path: parts[1].to_string(),
            data_len,
        })
    }
}

/// Lee la request line desde la conexión
///
/// Retorna `Ok(None)` si el cliente cerró sin enviar nada.
pub fn read_request_line<R: BufRead>(reader: &mut R) -> Result<Option<String>, ParseError> {
    // Contenido + "\r\n"
    let limit = (MAX_REQUEST_LINE + 2) as u64;
    let mut buf = Vec::new();
    reader.by_ref().take(limit).read_until(b'\n', &mut buf)?;

    if buf.is_empty() {
        return Ok(None);
    }

    if buf.last() != Some(&b'\n') {
        if buf.len() as u64 >= limit {
            return Err(ParseError::TooLong);
        }
        return Err(ParseError::Unterminated);
    }

    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    if buf.len() > MAX_REQUEST_LINE {
        return Err(ParseError::TooLong);
    }

    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| ParseError::InvalidUtf8)
}

/// Lee exactamente `len` bytes del data block
pub fn read_data_block<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>, ParseError> {
    let mut data = Vec::new();
    reader.take(len as u64).read_to_end(&mut data)?;

    if data.len() < len {
        return Err(ParseError::IncompleteData {
            expected: len,
            received: data.len(),
        });
    }
    Ok(data)
}

/// Request validado de una conexión
///
/// Se construye una sola vez por conexión y no se modifica después.
#[derive(Debug, Clone)]
pub struct Request {
    peer: SocketAddr,
    host: String,
    vhost: Option<String>,
    path: String,
    data: Vec<u8>,
}

impl Request {
    pub fn new(peer: SocketAddr, line: RequestLine, vhost: Option<String>, data: Vec<u8>) -> Self {
        Self {
            peer,
            host: line.host,
            vhost,
            path: line.path,
            data,
        }
    }

    /// Dirección del cliente
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Host tal como lo envió el cliente
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Usuario implícito cuando el host es un subdominio de usuario
    pub fn vhost(&self) -> Option<&str> {
        self.vhost.as_deref()
    }

    /// Path lógico pedido
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Data block (vacío si el largo declarado fue 0)
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
