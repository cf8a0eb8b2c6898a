//! # Códigos de Estado Spartan
//! src/spartan/status.rs
//!
//! El protocolo Spartan usa un solo dígito como código de estado:
//!
//! - **2**: Éxito (meta = content-type)
//! - **3**: Redirección (meta = path destino)
//! - **4**: Error del cliente (meta = mensaje)
//! - **5**: Error del servidor (meta = mensaje)

/// Representa los códigos de estado que envía el servidor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// 2 - La petición fue exitosa, sigue un body
    Success = 2,

    /// 3 - El recurso está en otro path
    Redirect = 3,

    /// 4 - Request inválido o recurso inexistente
    ClientError = 4,

    /// 5 - Error interno del servidor
    ServerError = 5,
}

impl Status {
    /// Convierte el código a su valor numérico
    ///
    /// # Ejemplo
    /// ```
    /// use spsrv::spartan::Status;
    /// assert_eq!(Status::Success.as_u8(), 2);
    /// ```
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Verifica si el código indica éxito
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }

    /// Verifica si el código indica error del cliente
    pub fn is_client_error(&self) -> bool {
        matches!(self, Status::ClientError)
    }

    /// Verifica si el código indica error del servidor
    pub fn is_server_error(&self) -> bool {
        matches!(self, Status::ServerError)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}
