//! Error types for the coordination layer.
//!
//! Only caller mistakes surface here. Contradictory sensor reports (cycles,
//! self-links, foreign neighbors) are absorbed by the managers and never
//! become errors.

use thiserror::Error;

/// Result type for cube coordination operations.
pub type Result<T> = std::result::Result<T, CubesError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CubesError {
    /// Configuration is unusable
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// No cube set with this ID
    #[error("Unknown cube set: {0}")]
    UnknownCubeSet(usize),

    /// Tile ID not mapped to a cube in this set
    #[error("Unknown tile {tile_id} in cube set {cube_set}")]
    UnknownTile { cube_set: usize, tile_id: String },

    /// Config (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CubesError {
    fn from(err: serde_json::Error) -> Self {
        CubesError::Serialization(err.to_string())
    }
}
