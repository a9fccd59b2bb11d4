//! Value-version table.
//!
//! For each original value, one slot per in-flight iteration: slot `v`
//! holds the clone that stands in for the value `v` iterations behind the
//! newest one. Slot `max_stage + 1` never exists; a version that would
//! land there is a final loop result instead.

use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};

use swp_ir::ValueId;

use crate::error::PipelineError;

pub(crate) struct ValueVersions {
    slots: usize,
    table: FxHashMap<ValueId, SmallVec<[Option<ValueId>; 4]>>,
}

impl ValueVersions {
    pub(crate) fn new(max_stage: u32) -> Self {
        ValueVersions {
            slots: max_stage as usize + 1,
            table: FxHashMap::default(),
        }
    }

    pub(crate) fn set(&mut self, value: ValueId, version: u32, clone: ValueId) {
        debug_assert!((version as usize) < self.slots, "version {version} out of range");
        let slots = self.slots;
        self.table
            .entry(value)
            .or_insert_with(|| smallvec![None; slots])[version as usize] = Some(clone);
    }

    /// Whether `value` has any slot row at all.
    pub(crate) fn tracks(&self, value: ValueId) -> bool {
        self.table.contains_key(&value)
    }

    /// The clone at `version`; a tracked value with an empty slot is an
    /// internal error.
    pub(crate) fn get(&self, value: ValueId, version: u32) -> Result<ValueId, PipelineError> {
        self.table
            .get(&value)
            .and_then(|row| row.get(version as usize).copied().flatten())
            .ok_or(PipelineError::MissingVersion { value, version })
    }

    /// `Ok(None)` for untracked values, which are left untouched when
    /// cloning.
    pub(crate) fn remap(&self, value: ValueId, version: u32) -> Result<Option<ValueId>, PipelineError> {
        if self.tracks(value) {
            self.get(value, version).map(Some)
        } else {
            Ok(None)
        }
    }

    pub(crate) fn clear(&mut self) {
        self.table.clear();
    }
}
