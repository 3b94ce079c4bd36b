//! # Ordinal Registry
//!
//! Translates between engine ordinals and the numeric state ids the host platform
//! uses natively. The two tables are built on first use by walking every state of
//! the [`BlockRegistry`] and asking the host for its id. The build happens once,
//! on whichever thread gets there first; every later lookup is a plain array read.

use std::sync::{Arc, OnceLock};

use super::{registry::BlockRegistry, Ordinal, AIR, UNSET};
use crate::engine_state::voxels::host::NativeIdSource;

/// Sentinel in the ordinal-to-native table for states the host has no id for.
const NO_NATIVE_ID: u32 = u32::MAX;

struct OrdinalTables {
    native_to_ordinal: Vec<Ordinal>,
    ordinal_to_native: Vec<u32>,
}

/// Lazily built bidirectional ordinal/native-id table.
pub struct OrdinalRegistry {
    registry: Arc<BlockRegistry>,
    source: Arc<dyn NativeIdSource>,
    tables: OnceLock<OrdinalTables>,
}

impl OrdinalRegistry {
    pub fn new(registry: Arc<BlockRegistry>, source: Arc<dyn NativeIdSource>) -> Self {
        OrdinalRegistry {
            registry,
            source,
            tables: OnceLock::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.tables.get().is_some()
    }

    /// Builds the tables if no thread has done so yet. Concurrent callers block
    /// until the single build finishes.
    pub fn initialize(&self) {
        self.tables();
    }

    fn tables(&self) -> &OrdinalTables {
        self.tables.get_or_init(|| self.build())
    }

    fn build(&self) -> OrdinalTables {
        let state_count = self.registry.state_count();
        let mut ordinal_to_native = vec![NO_NATIVE_ID; state_count];
        let mut native_to_ordinal: Vec<Ordinal> = Vec::new();
        let mut unmapped = 0usize;

        // Ordinal 0 is the reserved sentinel and never has a native counterpart.
        for ordinal in 1..state_count {
            let Some(state) = self.registry.state(ordinal as Ordinal) else {
                continue;
            };
            let Some(native) = self.source.native_id_for(state) else {
                unmapped += 1;
                continue;
            };
            ordinal_to_native[ordinal] = native;

            let slot = native as usize;
            if slot >= native_to_ordinal.len() {
                native_to_ordinal.resize(slot + 1, UNSET);
            }
            native_to_ordinal[slot] = ordinal as Ordinal;
        }

        if unmapped > 0 {
            log::warn!("{} block states have no native id", unmapped);
        }
        log::info!(
            "Ordinal registry built: {} states, native ids up to {}",
            state_count,
            native_to_ordinal.len()
        );

        OrdinalTables {
            native_to_ordinal,
            ordinal_to_native,
        }
    }

    /// Converts a native state id into an ordinal.
    ///
    /// Ids the host never reported degrade to [`AIR`].
    pub fn to_ordinal(&self, native: u32) -> Ordinal {
        match self.tables().native_to_ordinal.get(native as usize) {
            Some(&ordinal) if ordinal != UNSET => ordinal,
            _ => {
                log::warn!("Unknown native block id {}, using air", native);
                AIR
            }
        }
    }

    /// Converts an ordinal into the host's native id.
    ///
    /// Ordinals without a native id degrade to the native id of air, or `0` when
    /// the host has none for air either.
    pub fn to_native(&self, ordinal: Ordinal) -> u32 {
        let tables = self.tables();
        match tables.ordinal_to_native.get(ordinal as usize) {
            Some(&native) if native != NO_NATIVE_ID && ordinal != UNSET => native,
            _ => {
                log::warn!("Ordinal {} has no native id, using air", ordinal);
                tables
                    .ordinal_to_native
                    .get(AIR as usize)
                    .copied()
                    .filter(|native| *native != NO_NATIVE_ID)
                    .unwrap_or(0)
            }
        }
    }

    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }
}
