//! # Listados de Directorio
//! src/handlers/listing.rs
//!
//! Genera un documento gemtext con las entradas de un directorio:
//!
//! ```text
//! # Directory listing
//!
//! => / ..
//! => notes/ notes/                                             Mar  3 2024
//! => a.txt a.txt                                       2 KiB   Mar  1 2024
//! ```
//!
//! Los archivos ocultos (`.algo`) y los que no son legibles por todos
//! (`o+r`, `g+r`, `u+r`) nunca aparecen.

use std::fs::{self, File, Metadata};
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::time::SystemTime;

use log::debug;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use time::macros::format_description;
use time::OffsetDateTime;

use crate::config::{Config, SortKey};
use crate::router::clean;

/// Encabezado fijo de todo listado
const HEADER: &str = "# Directory listing\n\n";

/// Bits de lectura para usuario, grupo y otros
const WORLD_READABLE: u32 = 0o444;

/// Caracteres que no se escapan dentro de un segmento de path
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b':')
    .remove(b'=')
    .remove(b'@');

/// Una entrada del directorio con los datos que usa el listado
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: SystemTime,
    pub mode: u32,
}

impl Entry {
    fn from_metadata(name: String, metadata: &Metadata) -> Self {
        Self {
            name,
            is_dir: metadata.is_dir(),
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            mode: super::permission_bits(metadata),
        }
    }

    /// Ni oculto ni restringido
    pub fn is_listable(&self) -> bool {
        !self.name.starts_with('.') && self.mode & WORLD_READABLE == WORLD_READABLE
    }

    /// Destino del link: nombre escapado, con `/` si es directorio
    pub fn link(&self) -> String {
        let mut link = utf8_percent_encode(&self.name, PATH_SEGMENT).to_string();
        if self.is_dir {
            link.push('/');
        }
        link
    }
}

/// Genera el listado de `dir`, pedido como `logical`
pub fn render(logical: &str, dir: &Path, config: &Config) -> io::Result<Vec<u8>> {
    let mut entries = read_entries(dir)?;
    sort_entries(&mut entries, config.dirlist_sort, config.dirlist_reverse);

    let mut listing = String::from(HEADER);
    if let Some(up) = parent_link(logical) {
        listing.push_str(&format!("=> {} ..\n", up));
    }

    for entry in entries.iter().filter(|entry| entry.is_listable()) {
        listing.push_str(&format!("=> {} {}\n", entry.link(), label(entry, dir, config)));
    }

    Ok(listing.into_bytes())
}

/// Lee las entradas sin seguir symlinks
fn read_entries(dir: &Path) -> io::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        match entry.metadata() {
            Ok(metadata) => entries.push(Entry::from_metadata(name, &metadata)),
            // La entrada desapareció entre read_dir y stat
            Err(e) => debug!("Skipping {}: {}", name, e),
        }
    }
    Ok(entries)
}

/// Orden estable por la clave configurada, partiendo del orden por nombre
pub fn sort_entries(entries: &mut [Entry], key: SortKey, reverse: bool) {
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    match key {
        SortKey::Name => {}
        SortKey::Size => entries.sort_by_key(|entry| entry.size),
        SortKey::Time => entries.sort_by_key(|entry| entry.modified),
    }
    if reverse {
        entries.reverse();
    }
}

/// Link "subir un nivel", salvo en la raíz
fn parent_link(logical: &str) -> Option<String> {
    let cleaned = clean(logical);
    if cleaned.is_empty() {
        return None;
    }

    match cleaned.rfind('/') {
        Some(pos) => Some(format!("/{}", &cleaned[..pos])),
        None => Some("/".to_string()),
    }
}

/// Etiqueta legible: nombre (o título), tamaño y fecha
fn label(entry: &Entry, dir: &Path, config: &Config) -> String {
    let mut name = entry.name.clone();
    if config.dirlist_titles && !entry.is_dir && is_gemtext(&entry.name) {
        if let Some(title) = read_heading(&dir.join(&entry.name)) {
            name = title;
        }
    }

    if name.chars().count() > 40 {
        name = name.chars().take(36).collect::<String>() + "...";
    }
    if entry.is_dir {
        name.push('/');
    }

    format!(
        "{:<40}    {}   {}",
        name,
        size_column(entry),
        format_date(entry.modified)
    )
}

fn is_gemtext(name: &str) -> bool {
    Path::new(name).extension().map_or(false, |ext| ext == "gmi")
}

/// Primer heading `# ` del documento, si lo hay
fn read_heading(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    for line in BufReader::new(file).lines() {
        let line = line.ok()?;
        if line.starts_with("# ") {
            return Some(line[1..].trim().to_string());
        }
    }
    None
}

/// Columna de tamaño, siempre de 8 caracteres
pub fn size_column(entry: &Entry) -> String {
    if entry.is_dir {
        return " ".repeat(8);
    }

    let size = entry.size;
    if size < 1 << 10 {
        format!("{:4}   B", size)
    } else if size < 1 << 20 {
        format!("{:4} KiB", size >> 10)
    } else if size < 1 << 30 {
        format!("{:4} MiB", size >> 20)
    } else if size < 1 << 40 {
        format!("{:4} GiB", size >> 30)
    } else if size < 1 << 50 {
        format!("{:4} TiB", size >> 40)
    } else {
        "GIGANTIC".to_string()
    }
}

/// Fecha de modificación como `Jan  2 2006`
fn format_date(modified: SystemTime) -> String {
    let format = format_description!("[month repr:short] [day padding:space] [year]");
    OffsetDateTime::from(modified)
        .format(&format)
        .unwrap_or_default()
}
