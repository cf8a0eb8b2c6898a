//! # Gateway CGI
//! src/handlers/cgi.rs
//!
//! Ejecuta un script como subproceso y reenvía su salida tal cual.
//!
//! ```text
//! NotEligible → Eligible → Declined | TimedOut | ExecutionFailed
//!                          | MalformedOutput | Forwarded
//! ```
//!
//! - El script debe existir, ser un archivo regular y tener los tres bits
//!   de ejecución; si no, el gateway declina y se sirve como archivo.
//! - El entorno del proceso es solo el que arma `environment()`.
//! - El data block del request va por stdin.
//! - Si el script supera el tiempo máximo se mata y se responde con error.
//! - La primera línea de stdout debe ser `<número> <resto>`.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Write};
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::config::Config;
use crate::router::Resolved;
use crate::spartan::{Request, Response};

/// Valor de `SERVER_SOFTWARE`
pub const SERVER_SOFTWARE: &str = "SPSRV";

/// Bits de ejecución para usuario, grupo y otros
const EXECUTABLE: u32 = 0o111;

/// Cada cuánto se revisa si el script terminó
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Resultado de un intento de CGI que no es un error
#[derive(Debug, PartialEq, Eq)]
pub enum CgiOutcome {
    /// No hay script ejecutable: se sigue con archivos estáticos
    Declined,

    /// Salida completa del script, header validado
    Forward(Vec<u8>),
}

/// Fallas del script; todas terminan la conexión
#[derive(Debug, Error)]
pub enum CgiError {
    #[error("script exceeded the {0:?} runtime limit")]
    TimedOut(Duration),

    #[error("cannot run script: {0}")]
    Spawn(#[source] io::Error),

    #[error("script exited with {status}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("first output line {0:?} is not a valid response header")]
    MalformedHeader(String),
}

impl CgiError {
    /// Respuesta que recibe el cliente
    pub fn response(&self) -> Response {
        match self {
            CgiError::TimedOut(_) => Response::server_error("CGI process timed out!"),
            _ => Response::server_error("CGI error"),
        }
    }
}

/// Ejecuta el script al que apunta `resolved`
pub fn execute(config: &Config, request: &Request, resolved: &Resolved) -> Result<CgiOutcome, CgiError> {
    let script = resolved.absolute.as_path();
    if !is_executable(script) {
        debug!("{} is not an executable script", script.display());
        return Ok(CgiOutcome::Declined);
    }

    let env = environment(config, request, script);
    info!("Running script: {}", script.display());

    let output = run(script, &env, request.data(), config.cgi_timeout())?;
    validate_header(&output)?;
    Ok(CgiOutcome::Forward(output))
}

/// Archivo regular con `a+x`
pub fn is_executable(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(metadata) => {
            metadata.is_file() && super::permission_bits(&metadata) & EXECUTABLE == EXECUTABLE
        }
        Err(_) => false,
    }
}

/// Variables de entorno del script
pub fn environment(config: &Config, request: &Request, script: &Path) -> BTreeMap<&'static str, String> {
    let mut vars = BTreeMap::new();
    vars.insert("GATEWAY_INTERFACE", "CGI/1.1".to_string());
    vars.insert("SERVER_PROTOCOL", "SPARTAN".to_string());
    vars.insert("SERVER_SOFTWARE", SERVER_SOFTWARE.to_string());
    vars.insert("REQUEST_METHOD", String::new());
    vars.insert("SERVER_NAME", config.hostname.clone());
    vars.insert("SERVER_PORT", config.port.to_string());
    vars.insert("REMOTE_ADDR", request.peer().ip().to_string());
    let script = std::path::absolute(script).unwrap_or_else(|_| script.to_path_buf());
    vars.insert("SCRIPT_PATH", script.to_string_lossy().into_owned());
    vars.insert("CONTENT_LENGTH", request.data().len().to_string());
    vars
}

/// Dueño del proceso hijo: al soltarlo lo mata (si sigue vivo) y lo espera
struct ChildGuard(Child);

impl Deref for ChildGuard {
    type Target = Child;

    fn deref(&self) -> &Child {
        &self.0
    }
}

impl DerefMut for ChildGuard {
    fn deref_mut(&mut self) -> &mut Child {
        &mut self.0
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(None) = self.0.try_wait() {
            let _ = self.0.kill();
        }
        let _ = self.0.wait();
    }
}

/// De qué pipe del hijo viene un buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pipe {
    Stdout,
    Stderr,
}

fn spawn_reader<R: Read + Send + 'static>(source: Option<R>, pipe: Pipe, tx: Sender<(Pipe, Vec<u8>)>) {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut source) = source {
            let _ = source.read_to_end(&mut buf);
        }
        let _ = tx.send((pipe, buf));
    });
}

fn timed_out(script: &Path, timeout: Duration) -> CgiError {
    warn!(
        "Terminating CGI process {} due to exceeding {:?} runtime limit",
        script.display(),
        timeout
    );
    CgiError::TimedOut(timeout)
}

/// Corre el script y devuelve su stdout completo
///
/// El límite de tiempo cubre tanto la ejecución como la lectura de la
/// salida: un proceso que hereda los pipes y sigue vivo no extiende la
/// espera.
fn run(
    script: &Path,
    env: &BTreeMap<&'static str, String>,
    input: &[u8],
    timeout: Duration,
) -> Result<Vec<u8>, CgiError> {
    let child = Command::new(script)
        .env_clear()
        .envs(env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(CgiError::Spawn)?;
    let mut child = ChildGuard(child);

    // Un script que no lee stdin no debe bloquear al handler
    if let Some(mut stdin) = child.stdin.take() {
        let input = input.to_vec();
        thread::spawn(move || {
            let _ = stdin.write_all(&input);
        });
    }

    let (tx, rx) = mpsc::channel();
    spawn_reader(child.stdout.take(), Pipe::Stdout, tx.clone());
    spawn_reader(child.stderr.take(), Pipe::Stderr, tx);

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait().map_err(CgiError::Spawn)? {
            break status;
        }
        if Instant::now() >= deadline {
            // El guard mata y espera al proceso; los lectores quedan sueltos
            return Err(timed_out(script, timeout));
        }
        thread::sleep(POLL_INTERVAL);
    };

    let mut output = None;
    let mut errors = None;
    while output.is_none() || errors.is_none() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((Pipe::Stdout, buf)) => output = Some(buf),
            Ok((Pipe::Stderr, buf)) => errors = Some(buf),
            Err(RecvTimeoutError::Timeout) => {
                debug!("{} exited but its output pipes are still open", script.display());
                return Err(timed_out(script, timeout));
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    let output = output.unwrap_or_default();
    let errors = errors.unwrap_or_default();

    if !status.success() {
        let stderr = String::from_utf8_lossy(&errors).into_owned();
        error!("CGI program {} failed with {}", script.display(), status);
        if !stderr.is_empty() {
            error!("↳ stderr output: {}", stderr.trim_end());
        }
        return Err(CgiError::Failed { status, stderr });
    }

    Ok(output)
}

/// La primera línea debe ser `<número> <resto>`
pub fn validate_header(output: &[u8]) -> Result<(), CgiError> {
    let end = output.iter().position(|&b| b == b'\n').unwrap_or(output.len());
    let line = String::from_utf8_lossy(&output[..end]);
    let line = line.trim_end_matches('\r');

    match line.split_once(' ') {
        Some((code, _)) if !code.is_empty() && code.bytes().all(|b| b.is_ascii_digit()) => Ok(()),
        _ => {
            error!("Unable to parse first line of CGI output as a response header: {:?}", line);
            Err(CgiError::MalformedHeader(line.to_string()))
        }
    }
}
