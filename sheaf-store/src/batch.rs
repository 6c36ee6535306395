use std::collections::HashMap;

use sheaf_core::errors::Result;
use sheaf_format::ptype::PrimitiveType;

use crate::column::store::ColumnStore;

/// Default number of records per batch.
pub const DEFAULT_BATCH_SIZE: u32 = 8192;

/// A bounded, contiguous group of records under construction. The batch maps
/// global field ids into a dense local id space (first-seen order) and keeps
/// the per-row schema ids in a u32 column store so they compress and
/// serialize like any other column.
pub struct RecordBatch {
    pub n_rec: u32,
    /// Global field ids in first-seen order; index is the local id.
    pub local_dict: Vec<u32>,
    global_to_local: HashMap<u32, u32>,
    pub schemas: ColumnStore,
}

impl RecordBatch {
    pub fn new() -> Self {
        Self {
            n_rec: 0,
            local_dict: Vec::new(),
            global_to_local: HashMap::new(),
            schemas: ColumnStore::new(PrimitiveType::UInt32),
        }
    }

    /// Record the schema id of the next row; this is what advances the
    /// batch's row count.
    pub fn add_schema(&mut self, schema_id: u32) -> Result<()> {
        self.schemas.append_validity(true, 0)?;
        self.schemas.append(schema_id)?;
        self.n_rec += 1;
        Ok(())
    }

    /// Map a global field id into the batch, returning its local id.
    pub fn add_global_field(&mut self, global_id: u32) -> u32 {
        if let Some(&local) = self.global_to_local.get(&global_id) {
            return local;
        }
        let local = self.local_dict.len() as u32;
        self.global_to_local.insert(global_id, local);
        self.local_dict.push(global_id);
        local
    }

    pub fn find_local_field(&self, global_id: u32) -> Option<u32> {
        self.global_to_local.get(&global_id).copied()
    }
}

impl Default for RecordBatch {
    fn default() -> Self {
        Self::new()
    }
}
