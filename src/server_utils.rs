use std::path::{Path, PathBuf};

use crate::error::ControlError;

/// Splits a comma separated species list, dropping empty entries.
pub fn parse_species_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_turn_delay(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

/// 400 for rejected configuration, 409 for commands the current phase does
/// not allow, 500 once a game has halted on an internal error.
pub fn status_code_for(err: &ControlError) -> u16 {
    match err {
        ControlError::Config(_) => 400,
        ControlError::Transition(_) => 409,
        ControlError::Invariant(_) => 500,
    }
}

pub fn resolve_static_dir(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if path.join("index.html").is_file() {
            return Some(path.to_path_buf());
        }
    }

    let candidates = [
        PathBuf::from("frontend"),
        PathBuf::from("../frontend"),
        PathBuf::from("static"),
    ];
    candidates
        .into_iter()
        .find(|path| path.join("index.html").is_file())
}
