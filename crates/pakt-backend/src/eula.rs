//! In-memory trust registries.
//!
//! Both registries remember user decisions for the lifetime of the
//! daemon process only; persistence belongs to the frontends.

use std::collections::BTreeSet;
use std::sync::Mutex;

use tracing::debug;

/// Accepted end-user license agreements, keyed by opaque `eula_id`.
#[derive(Default)]
pub struct EulaRegistry {
    accepted: Mutex<BTreeSet<String>>,
}

impl EulaRegistry {
    /// Records an acceptance. Duplicate accepts are no-ops.
    pub fn accept(&self, eula_id: &str) {
        let mut accepted = self.accepted.lock().unwrap();
        if !accepted.insert(eula_id.to_string()) {
            debug!(eula_id, "eula already accepted");
        }
    }

    pub fn is_valid(&self, eula_id: &str) -> bool {
        self.accepted.lock().unwrap().contains(eula_id)
    }

    /// All accepted ids joined with `;`, `None` when nothing was
    /// accepted. This is what spawned helpers receive in their
    /// environment.
    pub fn accepted_string(&self) -> Option<String> {
        let accepted = self.accepted.lock().unwrap();
        if accepted.is_empty() {
            return None;
        }
        Some(accepted.iter().cloned().collect::<Vec<_>>().join(";"))
    }
}

/// Imported repository signing keys, keyed by `key_id`.
///
/// A key imported through install-signature lets the next refresh
/// auto-approve the matching signature prompt.
#[derive(Default)]
pub struct SignatureRegistry {
    imported: Mutex<BTreeSet<String>>,
}

impl SignatureRegistry {
    pub fn import(&self, key_id: &str) {
        let mut imported = self.imported.lock().unwrap();
        if !imported.insert(key_id.to_string()) {
            debug!(key_id, "signature already imported");
        }
    }

    pub fn is_approved(&self, key_id: &str) -> bool {
        self.imported.lock().unwrap().contains(key_id)
    }
}
