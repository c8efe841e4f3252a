//! Versioned structured-tree persistence.
//!
//! Unlike the DSL, this format is lossless: nested children, layers, styles,
//! notes, and external ids all survive. Connections reference shapes by id so
//! the file carries no positional coupling.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Connection, EditorSession, Layer, Shape};
use crate::Direction;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFile {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub shapes: Vec<Shape>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl DocumentFile {
    /// Captures the session's full tree, regardless of drill-down depth.
    pub fn from_session(session: &EditorSession) -> Self {
        let (shapes, connections) = session.document();
        DocumentFile {
            version: FORMAT_VERSION,
            saved_at: Utc::now(),
            direction: session.direction,
            layers: session.layers().to_vec(),
            shapes,
            connections,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize document")
    }

    pub fn from_json(input: &str) -> Result<Self> {
        let file: DocumentFile =
            serde_json::from_str(input).context("failed to parse document JSON")?;
        if file.version != FORMAT_VERSION {
            bail!(
                "unsupported document version {} (expected {FORMAT_VERSION})",
                file.version
            );
        }
        Ok(file)
    }

    /// Loads the document into a session, dropping connections whose
    /// endpoints are missing and fast-forwarding the sequence counter.
    pub fn into_session(self) -> EditorSession {
        let mut session = EditorSession::new();
        session.restore_from_parts(self.direction, self.layers, self.shapes, self.connections);
        session
    }
}
