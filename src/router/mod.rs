//! # Resolución de Paths
//! src/router/mod.rs
//!
//! Traduce el path lógico de un request al archivo que hay que servir.
//!
//! ```text
//! Request → resolve() → Resolved { absolute, relative, user } → CGI | archivos
//! ```
//!
//! Hay tres raíces posibles, en este orden de precedencia:
//!
//! 1. Subdominio de usuario (`alice.example.org`): el path va directo al
//!    directorio publicado de `alice`.
//! 2. Path con tilde (`/~alice/...`) si los directorios de usuario están
//!    habilitados.
//! 3. El directorio raíz global.
//!
//! Un path vacío o terminado en `/` se completa con `index.gmi`.

use std::path::{Component, Path, PathBuf};

use log::debug;
use thiserror::Error;

use crate::config::Config;
use crate::spartan::INDEX_FILE;

/// Errores de resolución
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    /// El path resuelto quedó fuera de su raíz de confianza
    #[error("path {0:?} escapes its root directory")]
    OutsideRoot(String),
}

/// Resultado de resolver un path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Path absoluto (raíz + relativo), limpio
    pub absolute: PathBuf,

    /// Path relativo a la raíz elegida, sin `/` inicial; se compara contra
    /// los prefijos CGI
    pub relative: String,

    /// Dueño del directorio cuando el request es de usuario
    pub user: Option<String>,
}

impl Resolved {
    /// Primer prefijo CGI configurado con el que empieza el path relativo
    pub fn cgi_prefix<'a>(&self, config: &'a Config) -> Option<&'a str> {
        config
            .cgi_paths
            .iter()
            .map(String::as_str)
            .find(|prefix| self.relative.starts_with(prefix))
    }
}

/// Chequeo rápido de directory traversal
///
/// Cualquier `..` en el path se rechaza antes de tocar el filesystem.
pub fn is_traversal(path: &str) -> bool {
    path.contains("..")
}

/// Limpia un path lógico: colapsa `//`, `.` y `..`
///
/// El resultado no lleva `/` inicial ni final.
///
/// # Ejemplo
/// ```
/// use spsrv::router::clean;
///
/// assert_eq!(clean("/docs//./guide/"), "docs/guide");
/// assert_eq!(clean("/a/b/../c"), "a/c");
/// assert_eq!(clean("/"), "");
/// ```
pub fn clean(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Normaliza un path del filesystem sin tocar el disco
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Un nombre de usuario usable como componente de path
pub fn is_valid_user(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}

/// Separa `/~usuario/resto` en (`usuario`, `/resto`)
fn split_user(path: &str) -> Option<(&str, &str)> {
    let rest = path.strip_prefix("/~")?;
    let end = rest.find('/').unwrap_or(rest.len());
    let (user, remainder) = rest.split_at(end);

    if is_valid_user(user) {
        Some((user, remainder))
    } else {
        None
    }
}

/// Resuelve el path pedido a un archivo del filesystem
///
/// `vhost` es el usuario implícito cuando el host del request fue un
/// subdominio de usuario.
pub fn resolve(path: &str, vhost: Option<&str>, config: &Config) -> Result<Resolved, RouteError> {
    let (base, user, logical) = if let Some(user) = vhost {
        (config.user_root(user), Some(user), path)
    } else if let Some((user, rest)) = split_user(path).filter(|_| config.user_dir_enable) {
        (config.user_root(user), Some(user), rest)
    } else {
        (config.root_dir.clone(), None, path)
    };

    // El directorio de un usuario tiene que quedar dentro de los homes
    let root = normalize(&base);
    if user.is_some() && !root.starts_with(normalize(&config.home_dir)) {
        return Err(RouteError::OutsideRoot(path.to_string()));
    }

    let mut relative = clean(logical);
    if path.is_empty() || path.ends_with('/') {
        if relative.is_empty() {
            relative = INDEX_FILE.to_string();
        } else {
            relative = format!("{}/{}", relative, INDEX_FILE);
        }
    }

    let absolute = normalize(&root.join(&relative));
    if !absolute.starts_with(&root) {
        return Err(RouteError::OutsideRoot(path.to_string()));
    }

    debug!("Resolved {:?} -> {} (user: {:?})", path, absolute.display(), user);

    Ok(Resolved {
        absolute,
        relative,
        user: user.map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.root_dir = PathBuf::from("/srv/spartan/");
        config.home_dir = PathBuf::from("/home");
        config
    }

    #[test]
    fn test_traversal_detection() {
        assert!(is_traversal("/../etc/passwd"));
        assert!(is_traversal("/docs/..hidden"));
        assert!(!is_traversal("/docs/./guide.gmi"));
    }

    #[test]
    fn test_clean() {
        assert_eq!(clean(""), "");
        assert_eq!(clean("/"), "");
        assert_eq!(clean("/a//b/./c/"), "a/b/c");
        assert_eq!(clean("/../../a"), "a");
    }

    #[test]
    fn test_resolve_root_file() {
        let resolved = resolve("/docs/guide.gmi", None, &test_config()).unwrap();

        assert_eq!(resolved.absolute, PathBuf::from("/srv/spartan/docs/guide.gmi"));
        assert_eq!(resolved.relative, "docs/guide.gmi");
        assert_eq!(resolved.user, None);
    }

    #[test]
    fn test_resolve_index_completion() {
        let config = test_config();

        let dir = resolve("/docs/", None, &config).unwrap();
        let explicit = resolve("/docs/index.gmi", None, &config).unwrap();
        assert_eq!(dir, explicit);

        let root = resolve("/", None, &config).unwrap();
        assert_eq!(root.absolute, PathBuf::from("/srv/spartan/index.gmi"));
        assert_eq!(root.relative, "index.gmi");

        let empty = resolve("", None, &config).unwrap();
        assert_eq!(empty, root);
    }

    #[test]
    fn test_resolve_directory_without_slash() {
        let resolved = resolve("/docs", None, &test_config()).unwrap();
        assert_eq!(resolved.absolute, PathBuf::from("/srv/spartan/docs"));
        assert_eq!(resolved.relative, "docs");
    }

    #[test]
    fn test_resolve_tilde_user() {
        let mut config = test_config();
        config.user_dir_enable = true;

        let resolved = resolve("/~alice/notes/", None, &config).unwrap();
        assert_eq!(
            resolved.absolute,
            PathBuf::from("/home/alice/public_spartan/notes/index.gmi")
        );
        assert_eq!(resolved.relative, "notes/index.gmi");
        assert_eq!(resolved.user.as_deref(), Some("alice"));

        let bare = resolve("/~alice", None, &config).unwrap();
        assert_eq!(bare.absolute, PathBuf::from("/home/alice/public_spartan"));
        assert_eq!(bare.relative, "");
    }

    #[test]
    fn test_resolve_tilde_disabled() {
        let resolved = resolve("/~alice/notes.gmi", None, &test_config()).unwrap();
        assert_eq!(resolved.absolute, PathBuf::from("/srv/spartan/~alice/notes.gmi"));
        assert_eq!(resolved.user, None);
    }

    #[test]
    fn test_resolve_tilde_empty_user() {
        let mut config = test_config();
        config.user_dir_enable = true;

        let resolved = resolve("/~/x.gmi", None, &config).unwrap();
        assert_eq!(resolved.absolute, PathBuf::from("/srv/spartan/~/x.gmi"));
        assert_eq!(resolved.user, None);
    }

    #[test]
    fn test_resolve_vhost_user() {
        let mut config = test_config();
        config.user_dir_enable = true;
        config.user_subdomains = true;

        let resolved = resolve("/cgi/hello", Some("bob"), &config).unwrap();
        assert_eq!(
            resolved.absolute,
            PathBuf::from("/home/bob/public_spartan/cgi/hello")
        );
        assert_eq!(resolved.relative, "cgi/hello");
        assert_eq!(resolved.user.as_deref(), Some("bob"));

        // Con subdominio la tilde se toma literal
        let literal = resolve("/~carol/", Some("bob"), &config).unwrap();
        assert_eq!(literal.relative, "~carol/index.gmi");
    }

    #[test]
    fn test_resolve_outside_root() {
        let config = test_config();
        assert_eq!(
            resolve("/x", Some(".."), &config),
            Err(RouteError::OutsideRoot("/x".to_string()))
        );
    }

    #[test]
    fn test_resolve_stays_in_user_directory() {
        let mut config = test_config();
        config.user_dir_enable = true;

        let alice = PathBuf::from("/home/alice/public_spartan");
        let resolved = resolve("/../../bob/public_spartan/x", Some("alice"), &config).unwrap();
        assert!(resolved.absolute.starts_with(&alice));
        assert_eq!(resolved.absolute, alice.join("bob/public_spartan/x"));

        let tilde = resolve("/~alice/../../bob/x", None, &config).unwrap();
        assert!(tilde.absolute.starts_with(&alice));
    }

    #[test]
    fn test_cgi_prefix() {
        let mut config = test_config();
        config.cgi_paths = vec!["cgi/".to_string(), "bin/".to_string()];

        let cgi = resolve("/bin/run", None, &config).unwrap();
        assert_eq!(cgi.cgi_prefix(&config), Some("bin/"));

        let plain = resolve("/cgi", None, &config).unwrap();
        assert_eq!(plain.cgi_prefix(&config), None);
    }
}
