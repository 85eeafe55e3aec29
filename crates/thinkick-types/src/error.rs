// ─────────────────────────────────────────────────────────────────────
// Thinkick — Errors
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackError {
    #[error("Invalid slice: {0}")]
    InvalidSlice(String),

    #[error("Invalid particle state: {0}")]
    InvalidParticle(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Line is not backtrackable: {0}")]
    NotBacktrackable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type TrackResult<T> = Result<T, TrackError>;
