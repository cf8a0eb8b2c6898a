//! # Manejo de una Conexión
//! src/server/connection.rs
//!
//! Cada conexión lleva un request y una respuesta:
//!
//! 1. Leer y parsear la request line
//! 2. Validar host y path
//! 3. Leer el data block declarado
//! 4. Resolver el path e intentar CGI
//! 5. Si el CGI declina, servir el archivo
//!
//! Toda falla se responde con una sola línea de estado; solo las fallas de
//! I/O sobre el socket cierran la conexión sin respuesta.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::config::Config;
use crate::handlers::{cgi, files, CgiOutcome};
use crate::router::{is_traversal, is_valid_user, resolve};
use crate::spartan::{read_data_block, read_request_line, ParseError, Request, RequestLine, Response};

/// Cuánto se espera a que el cliente deje de enviar antes de cerrar
const DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

/// Máximo que se descarta al cerrar
const DRAIN_LIMIT: u64 = 64 * 1024;

/// Cómo se relaciona el host del request con el hostname configurado
#[derive(Debug, PartialEq, Eq)]
enum HostMatch {
    /// El host es el nuestro (o no hay restricción)
    Primary,

    /// Subdominio de usuario: `<usuario>.<hostname>`
    User(String),

    /// Cualquier otro host
    Foreign,
}

fn match_host(host: &str, config: &Config) -> HostMatch {
    if config.hostname.is_empty() || host == config.hostname {
        return HostMatch::Primary;
    }

    if config.user_dir_enable && config.user_subdomains {
        let label = host
            .strip_suffix(config.hostname.as_str())
            .and_then(|rest| rest.strip_suffix('.'));
        if let Some(label) = label {
            if is_valid_user(label) && !label.contains('.') {
                return HostMatch::User(label.to_string());
            }
        }
    }

    HostMatch::Foreign
}

/// Atiende una conexión completa
pub fn handle(stream: TcpStream, config: &Config) -> io::Result<()> {
    let peer = stream.peer_addr()?;
    let mut reader = BufReader::new(stream.try_clone()?);

    let reply = match respond(&mut reader, peer, config) {
        Some(reply) => reply,
        None => return Ok(()),
    };

    let mut stream = stream;
    stream.write_all(&reply)?;
    stream.flush()?;

    // Descartar lo que el cliente siga enviando para que el cierre no sea un RST
    let _ = stream.shutdown(Shutdown::Write);
    let _ = stream.set_read_timeout(Some(DRAIN_TIMEOUT));
    let _ = io::copy(&mut reader.take(DRAIN_LIMIT), &mut io::sink());

    Ok(())
}

/// Lee un request de `reader` y arma la respuesta
///
/// `None` significa que no hay nada que responder: el cliente cerró sin
/// enviar un request o el socket falló.
pub fn respond<R: BufRead>(reader: &mut R, peer: SocketAddr, config: &Config) -> Option<Vec<u8>> {
    let line = match read_request_line(reader) {
        Ok(Some(line)) => line,
        Ok(None) => {
            debug!("{} closed the connection without a request", peer);
            return None;
        }
        Err(ParseError::Io(e)) => {
            error!("Error reading request from {}: {}", peer, e);
            return None;
        }
        Err(ParseError::TooLong) => {
            warn!("Request from {} too long", peer);
            return Some(Response::client_error("Request too long").to_bytes());
        }
        Err(e) => {
            warn!("Bad request from {}: {}", peer, e);
            return Some(Response::client_error("Bad request").to_bytes());
        }
    };

    info!("--> Incoming request from {}: {:?}", peer, line);

    let request_line = match RequestLine::parse(&line) {
        Ok(request_line) => request_line,
        Err(e) => {
            warn!("Bad request: {}", e);
            return Some(Response::client_error("Bad request").to_bytes());
        }
    };

    let vhost = match match_host(&request_line.host, config) {
        HostMatch::Primary => None,
        HostMatch::User(user) => Some(user),
        HostMatch::Foreign => {
            warn!("Refusing request for host {:?}", request_line.host);
            return Some(Response::client_error("No proxying to other hosts!").to_bytes());
        }
    };

    if is_traversal(&request_line.path) {
        warn!("Directory traversal attempt: {:?}", request_line.path);
        return Some(
            Response::client_error("Stop it with your directory traversal technique!").to_bytes(),
        );
    }

    let data = match read_data_block(reader, request_line.data_len) {
        Ok(data) => data,
        Err(ParseError::Io(e)) => {
            error!("Error reading data block from {}: {}", peer, e);
            return None;
        }
        Err(e) => {
            warn!("Bad request from {}: {}", peer, e);
            return Some(Response::client_error("Incomplete data block").to_bytes());
        }
    };

    let request = Request::new(peer, request_line, vhost, data);
    Some(dispatch(&request, config))
}

/// CGI si corresponde, si no archivo estático
fn dispatch(request: &Request, config: &Config) -> Vec<u8> {
    let resolved = match resolve(request.path(), request.vhost(), config) {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!("{}", e);
            return Response::client_error("Stop it with your directory traversal technique!")
                .to_bytes();
        }
    };

    if let Some(prefix) = resolved.cgi_prefix(config) {
        if resolved.user.is_some() && !(config.user_dir_enable && config.user_cgi_enable) {
            debug!("CGI disabled for user directories, skipping {}", prefix);
        } else {
            debug!("Path {:?} matches CGI prefix {:?}", resolved.relative, prefix);
            match cgi::execute(config, request, &resolved) {
                Ok(CgiOutcome::Forward(output)) => {
                    info!("<-- CGI output for {} ({} bytes)", request.path(), output.len());
                    return output;
                }
                Ok(CgiOutcome::Declined) => {}
                Err(e) => {
                    error!("CGI {}: {}", resolved.absolute.display(), e);
                    let response = e.response();
                    log_response(request, &response);
                    return response.to_bytes();
                }
            }
        }
    }

    if !request.data().is_empty() {
        let response = Response::client_error("Unwanted input data block received");
        log_response(request, &response);
        return response.to_bytes();
    }

    let response = files::serve(request.path(), &resolved.absolute, config);
    log_response(request, &response);
    response.to_bytes()
}

/// Registra la respuesta con el nivel que corresponde a su estado
fn log_response(request: &Request, response: &Response) {
    let status = response.status();
    if status.is_server_error() {
        error!("<-- {} {} {}: {}", request.host(), request.path(), status, response.meta());
    } else if status.is_client_error() {
        warn!("<-- {} {} {}: {}", request.host(), request.path(), status, response.meta());
    } else {
        info!("<-- {} {} {} {}", request.host(), request.path(), status, response.meta());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;

    fn setup() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.root_dir = dir.path().join("root");
        config.home_dir = dir.path().join("home");
        config.hostname = "example.org".to_string();
        fs::create_dir_all(&config.root_dir).unwrap();
        fs::create_dir_all(config.home_dir.join("alice").join("public_spartan")).unwrap();
        (dir, config)
    }

    fn ask(config: &Config, raw: &[u8]) -> Option<String> {
        let peer: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let mut reader = Cursor::new(raw.to_vec());
        respond(&mut reader, peer, config).map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    #[test]
    fn test_match_host() {
        let (_dir, mut config) = setup();
        assert_eq!(match_host("example.org", &config), HostMatch::Primary);
        assert_eq!(match_host("alice.example.org", &config), HostMatch::Foreign);

        config.user_dir_enable = true;
        config.user_subdomains = true;
        assert_eq!(
            match_host("alice.example.org", &config),
            HostMatch::User("alice".to_string())
        );
        assert_eq!(match_host("a.b.example.org", &config), HostMatch::Foreign);
        assert_eq!(match_host(".example.org", &config), HostMatch::Foreign);
        assert_eq!(match_host("aliceexample.org", &config), HostMatch::Foreign);
        assert_eq!(match_host("other.net", &config), HostMatch::Foreign);

        config.hostname = String::new();
        assert_eq!(match_host("anything.net", &config), HostMatch::Primary);
    }

    #[test]
    fn test_empty_connection() {
        let (_dir, config) = setup();
        assert_eq!(ask(&config, b""), None);
    }

    #[test]
    fn test_serves_file() {
        let (_dir, config) = setup();
        fs::write(config.root_dir.join("index.gmi"), "# Home\n").unwrap();

        let reply = ask(&config, b"example.org / 0\r\n").unwrap();
        assert_eq!(reply, "2 text/gemini; lang=en; charset=utf-8\r\n# Home\n");
    }

    #[test]
    fn test_bare_newline_terminator() {
        let (_dir, config) = setup();
        fs::write(config.root_dir.join("index.gmi"), "# Home\n").unwrap();

        let reply = ask(&config, b"example.org / 0\n").unwrap();
        assert!(reply.starts_with("2 "));
    }

    #[test]
    fn test_bad_requests() {
        let (_dir, config) = setup();
        assert_eq!(ask(&config, b"example.org /\r\n").unwrap(), "4 Bad request\r\n");
        assert_eq!(ask(&config, b"example.org / x\r\n").unwrap(), "4 Bad request\r\n");
        assert_eq!(ask(&config, b"example.org / -1\r\n").unwrap(), "4 Bad request\r\n");
        assert_eq!(ask(&config, b"example.org / 0").unwrap(), "4 Bad request\r\n");
    }

    #[test]
    fn test_request_too_long() {
        let (_dir, config) = setup();
        let mut raw = format!("example.org /{} 0", "a".repeat(1100)).into_bytes();
        raw.extend_from_slice(b"\r\n");

        assert_eq!(ask(&config, &raw).unwrap(), "4 Request too long\r\n");
    }

    #[test]
    fn test_foreign_host() {
        let (_dir, config) = setup();
        assert_eq!(
            ask(&config, b"evil.net / 0\r\n").unwrap(),
            "4 No proxying to other hosts!\r\n"
        );
    }

    #[test]
    fn test_traversal() {
        let (_dir, config) = setup();
        assert_eq!(
            ask(&config, b"example.org /../secret 0\r\n").unwrap(),
            "4 Stop it with your directory traversal technique!\r\n"
        );
    }

    #[test]
    fn test_incomplete_data_block() {
        let (_dir, config) = setup();
        assert_eq!(
            ask(&config, b"example.org /form 10\r\nabc").unwrap(),
            "4 Incomplete data block\r\n"
        );
    }

    #[test]
    fn test_data_for_static_file() {
        let (_dir, config) = setup();
        fs::write(config.root_dir.join("page.gmi"), "hi\n").unwrap();

        assert_eq!(
            ask(&config, b"example.org /page.gmi 5\r\nhello").unwrap(),
            "4 Unwanted input data block received\r\n"
        );
    }

    #[test]
    fn test_not_found() {
        let (_dir, config) = setup();
        assert_eq!(
            ask(&config, b"example.org /nope.gmi 0\r\n").unwrap(),
            "4 Not found\r\n"
        );
    }

    #[test]
    fn test_user_subdomain_and_tilde() {
        let (_dir, mut config) = setup();
        config.user_dir_enable = true;
        config.user_subdomains = true;
        fs::write(
            config.user_root("alice").join("index.gmi"),
            "# Alice\n",
        )
        .unwrap();

        let by_subdomain = ask(&config, b"alice.example.org / 0\r\n").unwrap();
        let by_tilde = ask(&config, b"example.org /~alice/ 0\r\n").unwrap();
        assert_eq!(by_subdomain, "2 text/gemini; lang=en; charset=utf-8\r\n# Alice\n");
        assert_eq!(by_subdomain, by_tilde);
    }

    #[cfg(unix)]
    #[test]
    fn test_user_cgi_disabled_serves_source() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, mut config) = setup();
        config.user_dir_enable = true;
        let cgi_dir = config.user_root("alice").join("cgi");
        fs::create_dir(&cgi_dir).unwrap();
        let script = cgi_dir.join("run");
        fs::write(&script, "#!/bin/sh\nprintf '2 text/plain\\r\\nran'\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let reply = ask(&config, b"example.org /~alice/cgi/run 0\r\n").unwrap();
        assert!(reply.starts_with("2 "), "{}", reply);
        assert!(reply.contains("#!/bin/sh"), "{}", reply);

        config.user_cgi_enable = true;
        let reply = ask(&config, b"example.org /~alice/cgi/run 0\r\n").unwrap();
        assert_eq!(reply, "2 text/plain\r\nran");
    }

    #[cfg(unix)]
    #[test]
    fn test_cgi_spawn_failure_is_terminal() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, config) = setup();
        let cgi_dir = config.root_dir.join("cgi");
        fs::create_dir(&cgi_dir).unwrap();
        let script = cgi_dir.join("broken");
        fs::write(&script, "#!/nonexistent/sh\nprintf '2 text/plain\\r\\nran'\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(
            ask(&config, b"example.org /cgi/broken 0\r\n").unwrap(),
            "5 CGI error\r\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_cgi_receives_data_block() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, config) = setup();
        let cgi_dir = config.root_dir.join("cgi");
        fs::create_dir(&cgi_dir).unwrap();
        let script = cgi_dir.join("echo");
        fs::write(
            &script,
            "#!/bin/sh\nprintf '2 text/plain\\r\\n%s:' \"$CONTENT_LENGTH\"\nexec cat\n",
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let reply = ask(&config, b"example.org /cgi/echo 5\r\nhello").unwrap();
        assert_eq!(reply, "2 text/plain\r\n5:hello");
    }
}
