//! The qualification registry.
//!
//! External-facing aggregate of per-requirement test outcomes. Populated
//! only by the result collector as tests complete, then handed off intact
//! (as a JSON snapshot) to the external report generator. A test may leave
//! a serialized qualification payload (`qdata.json`) next to its
//! descriptor; when present it is merged into the entry verbatim.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::warn;

use crate::errors::SuiteResult;
use crate::ledger::TestStatus;

/// Outcome record for one requirement/test identifier.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryEntry {
    pub status: TestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Payload emitted by the test itself, carried through untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Mapping from requirement/test identifier to its outcome record.
#[derive(Debug, Default, Serialize)]
pub struct QualificationRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl QualificationRegistry {
    pub fn new() -> QualificationRegistry {
        QualificationRegistry::default()
    }

    /// Merge the outcome of one test, together with any qualification
    /// payload it produced. A no-op when the test left no payload file.
    pub fn merge(
        &mut self,
        id: &str,
        status: TestStatus,
        comment: Option<&str>,
        qdata_file: &Path,
    ) {
        let text = match std::fs::read_to_string(qdata_file) {
            Ok(text) => text,
            Err(_) => return,
        };

        let payload = match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(e) => {
                // Degrade gracefully: keep the outcome, drop the payload.
                warn!(
                    "unparsable qualification payload {}: {e}",
                    qdata_file.display()
                );
                None
            }
        };

        self.entries.insert(
            id.to_string(),
            RegistryEntry {
                status,
                comment: comment.map(str::to_string),
                payload,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&RegistryEntry> {
        self.entries.get(id)
    }

    /// Serialize the registry for the external report generator.
    pub fn write_snapshot(&self, path: &Path) -> SuiteResult<()> {
        let json = serde_json::to_string_pretty(self)
            .expect("INVARIANT: registry entries serialize to JSON");
        std::fs::write(path, json)?;
        Ok(())
    }
}
