//! # Archivos Estáticos
//! src/handlers/files.rs
//!
//! Sirve un path ya resuelto:
//!
//! - Si se puede abrir y leer, responde `2 <content-type>` con el contenido.
//! - Si no existe y era el `index.gmi` de un directorio existente, genera
//!   el listado (si están habilitados).
//! - Si se abrió pero no se pudo leer porque es un directorio, redirige al
//!   mismo path con `/` final.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

use log::{error, info, warn};

use crate::config::Config;
use crate::handlers::listing;
use crate::spartan::{Response, GEMINI_META, INDEX_FILE};

/// Sirve `path`, pedido por el cliente como `logical`
pub fn serve(logical: &str, path: &Path, config: &Config) -> Response {
    info!("Fetching: {}", path.display());

    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) => return open_failed(logical, path, config, e),
    };

    let mut content = Vec::new();
    if let Err(e) = file.read_to_end(&mut content) {
        // Un directorio se abre bien pero no se puede leer
        if fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false) {
            let target = format!("{}/", logical);
            info!("Redirecting {} to {}", path.display(), target);
            return Response::redirect(&target);
        }
        error!("Cannot read {}: {}", path.display(), e);
        return Response::server_error("Resource could not be read");
    }

    info!("Serving content: {}", path.display());
    Response::success(&content_type(path, &content), content)
}

/// Fallback cuando el archivo no se pudo abrir: listado o 404
fn open_failed(logical: &str, path: &Path, config: &Config, err: io::Error) -> Response {
    let is_index = path.file_name().map_or(false, |name| name == INDEX_FILE);

    if config.dirlist_enable && is_index && err.kind() == io::ErrorKind::NotFound {
        if let Some(dir) = path.parent().filter(|dir| dir.exists()) {
            info!("Generating directory listing: {}", dir.display());
            return match listing::render(logical, dir, config) {
                Ok(body) => Response::success(GEMINI_META, body),
                Err(e) => {
                    error!("Listing {} failed: {}", dir.display(), e);
                    Response::server_error("Error generating directory listing")
                }
            };
        }
    }

    warn!("Not found {}: {}", path.display(), err);
    Response::client_error("Not found")
}

/// Content-type de un archivo
///
/// Los documentos `.gmi` usan el tipo nativo del protocolo; el resto se
/// detecta por contenido.
pub fn content_type(path: &Path, content: &[u8]) -> String {
    if path.extension().map_or(false, |ext| ext == "gmi") {
        return GEMINI_META.to_string();
    }

    let sniffed = tree_magic_mini::from_u8(content);
    if sniffed == "text/plain" && std::str::from_utf8(content).is_ok() {
        return "text/plain; charset=utf-8".to_string();
    }
    sniffed.to_string()
}
