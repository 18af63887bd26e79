// src/codec.rs
//! The comma separated server list served to game clients.
//!
//! Fields are not escaped: clients split on `,` and `\n` directly, so names
//! are cleaned with [`sanitize_field`] before they reach the directory.

use std::collections::HashMap;
use std::num::ParseIntError;
use thiserror::Error;
use crate::models::game_mode::GameMode;
use crate::models::server::ServerEntry;
use crate::storage::memory::ServerDirectory;

pub const HEADER: &str = "name,ip,port,mode";
const FIELD_COUNT: usize = 4;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("line {line}: expected 4 fields, found {found}")]
    FieldCount { line: usize, found: usize },
    #[error("line {line}: invalid port {value:?}: {source}")]
    InvalidPort {
        line: usize,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("line {line}: unknown game mode {label:?}")]
    UnknownMode { line: usize, label: String },
}

pub fn render_line(entry: &ServerEntry) -> String {
    format!("{},{},{},{}", entry.name, entry.ip, entry.port, entry.game_mode)
}

/// Header, then servers whose line starts with a letter, then everything
/// else. Both groups sorted by code point. No trailing newline.
pub fn encode(entries: &[ServerEntry]) -> String {
    let (mut alpha, mut nonalpha): (Vec<String>, Vec<String>) = entries
        .iter()
        .map(render_line)
        .partition(|line| line.chars().next().map_or(false, char::is_alphabetic));
    alpha.sort();
    nonalpha.sort();
    alpha.append(&mut nonalpha);

    let mut resp = String::from(HEADER);
    resp.push('\n');
    resp.push_str(&alpha.join("\n"));
    resp
}

/// Reads a published list back into entries keyed by `ip:port`.
///
/// The loopback name key used for beacon registrations is not applied here;
/// restored entries are always keyed by endpoint. Health history is not part
/// of the format, so every entry comes back healthy with no probe history.
/// A leading header line is skipped, as is the empty line that follows it
/// in a list with no servers. Any other bad line, empty ones included,
/// fails the whole decode.
pub fn decode(text: &str) -> Result<HashMap<String, ServerEntry>, DecodeError> {
    let mut servers = HashMap::new();
    let lines: Vec<&str> = text.split('\n').collect();
    let header_only = lines.len() == 2 && lines[0] == HEADER && lines[1].is_empty();
    if header_only {
        return Ok(servers);
    }

    for (index, line) in lines.into_iter().enumerate() {
        let line_no = index + 1;
        let line = line.strip_suffix('\r').unwrap_or(line);
        if index == 0 && line == HEADER {
            continue;
        }

        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != FIELD_COUNT {
            return Err(DecodeError::FieldCount { line: line_no, found: fields.len() });
        }
        let port = fields[2].parse::<u16>().map_err(|source| DecodeError::InvalidPort {
            line: line_no,
            value: fields[2].to_string(),
            source,
        })?;
        let game_mode = GameMode::from_label(fields[3]).ok_or_else(|| DecodeError::UnknownMode {
            line: line_no,
            label: fields[3].to_string(),
        })?;

        let entry = ServerEntry::new(fields[0], fields[1], port, game_mode);
        servers.insert(ServerDirectory::endpoint_key(&entry.ip, entry.port), entry);
    }
    Ok(servers)
}

/// Replaces the list's separator characters so a field cannot split a record.
pub fn sanitize_field(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            ',' | '\n' | '\r' => ' ',
            c => c,
        })
        .collect()
}
