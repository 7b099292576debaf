//! Mount coordination: submits registry keys to the archive engine, mounts
//! what they unlock and reconciles the outcome onto the catalog.

use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::catalog::ArchiveCatalog;
use crate::crypto::{KEY_STRING_LEN, ZERO_KEY_STRING};
use crate::error::Result;
use crate::guid::Guid;
use crate::keys::KeyRegistry;
use crate::provider::ArchiveEngine;

/// Key text actually handed to the engine for one registry entry.
///
/// Anything that is not `0x` followed by exactly 64 characters is replaced
/// by the reserved all-zero key.
pub fn submission_key(key: &str) -> &str {
    let trimmed = key.trim();
    if trimmed.len() == KEY_STRING_LEN {
        trimmed
    } else {
        ZERO_KEY_STRING
    }
}

/// One key submission made during a mount pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedKey {
    pub guid: Guid,
    pub key: String,
    /// Whether the engine accepted the key text
    pub accepted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MountReport {
    pub submitted: Vec<SubmittedKey>,
    pub mounted: usize,
    pub unmounted: usize,
    pub game_name: String,
}

/// Drives a mount pass over an engine, a catalog and a key registry
pub struct VfsMountCoordinator<'a, E: ArchiveEngine + ?Sized> {
    engine: &'a mut E,
    catalog: &'a mut ArchiveCatalog,
}

impl<'a, E: ArchiveEngine + ?Sized> VfsMountCoordinator<'a, E> {
    pub fn new(engine: &'a mut E, catalog: &'a mut ArchiveCatalog) -> Self {
        Self { engine, catalog }
    }

    /// Submit every registry key, mount and reconcile.
    ///
    /// A rejected key is logged and skipped; only cancellation or an engine
    /// failure aborts the pass.
    pub fn remount(
        &mut self,
        registry: &KeyRegistry,
        cancel: &CancellationToken,
    ) -> Result<MountReport> {
        self.catalog.deactivate_all();

        let mut report = MountReport::default();
        for entry in registry.entries() {
            cancel.check()?;

            let key = submission_key(&entry.key);
            if key != entry.key.trim() {
                debug!(guid = %entry.guid, "Substituting zero key");
            }

            let accepted = match self.engine.submit_key(entry.guid, key) {
                Ok(()) => true,
                Err(e) => {
                    warn!(guid = %entry.guid, "Key not accepted: {}", e);
                    false
                }
            };
            self.catalog.set_key(entry.guid, &entry.key);
            report.submitted.push(SubmittedKey {
                guid: entry.guid,
                key: key.to_string(),
                accepted,
            });
        }

        let sets = self.engine.mount(cancel)?;
        self.catalog.reconcile_after_mount(&sets.mounted, &sets.unmounted);

        report.mounted = sets.mounted.len();
        report.unmounted = sets.unmounted.len();
        report.game_name = self.engine.game_name();

        info!(
            mounted = report.mounted,
            unmounted = report.unmounted,
            game = %report.game_name,
            "Remounted archives"
        );
        Ok(report)
    }
}
