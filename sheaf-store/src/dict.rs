use std::collections::HashMap;

use sheaf_core::errors::{Error, Result};
use sheaf_format::codec::Codec;
use sheaf_format::ptype::{PrimitiveType, StoreKind};
use xxhash_rust::xxh64::Xxh64;

const SCHEMA_HASH_SEED: u64 = 71236251;

/// Declared typing of one field: its storage flavor, element type, and an
/// optional explicit transform chain (empty means auto). Typing is fixed at
/// first registration.
#[derive(Debug, Clone)]
pub struct FieldType {
    pub name: String,
    pub kind: StoreKind,
    pub ptype: PrimitiveType,
    pub transforms: Vec<Codec>,
}

/// Bijection field-name <-> global field id, plus per-field typing.
#[derive(Default)]
pub struct FieldDictionary {
    fields: Vec<FieldType>,
    map: HashMap<String, u32>,
}

impl FieldDictionary {
    pub fn find(&self, field_name: &str) -> Option<u32> {
        self.map.get(field_name).copied()
    }

    /// Resolve a field id, registering the name on first sight. A later
    /// registration with conflicting typing is fatal.
    pub fn find_or_add(
        &mut self,
        field_name: &str,
        ptype: PrimitiveType,
        kind: StoreKind,
    ) -> Result<u32> {
        if let Some(&id) = self.map.get(field_name) {
            let field = &self.fields[id as usize];
            if field.ptype != ptype || field.kind != kind {
                return Err(Error::TypeMismatch(format!(
                    "field '{}' registered as {:?}/{:?}, appended as {:?}/{:?}",
                    field_name, field.kind, field.ptype, kind, ptype
                )));
            }
            return Ok(id);
        }

        let id = self.fields.len() as u32;
        self.map.insert(field_name.to_string(), id);
        self.fields.push(FieldType {
            name: field_name.to_string(),
            kind,
            ptype,
            transforms: Vec::new(),
        });
        log::debug!("registered field '{}' as {} ({:?}/{:?})", field_name, id, kind, ptype);
        Ok(id)
    }

    pub fn field(&self, id: u32) -> &FieldType {
        &self.fields[id as usize]
    }

    pub fn field_mut(&mut self, id: u32) -> &mut FieldType {
        &mut self.fields[id as usize]
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldType> {
        self.fields.iter()
    }
}

/// The ordered vector of global field ids one record maps to. Ordering
/// matters: permutations are distinct schemas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaPattern {
    pub ids: Vec<u32>,
}

impl SchemaPattern {
    /// 64-bit hash of the id vector; keys the schema dictionary.
    pub fn hash(&self) -> u64 {
        let mut state = Xxh64::new(SCHEMA_HASH_SEED);
        for id in &self.ids {
            state.update(&id.to_le_bytes());
        }
        state.digest()
    }
}

/// Bijection schema-hash <-> schema id over ordered field-id vectors.
#[derive(Default)]
pub struct SchemaDictionary {
    schemas: Vec<SchemaPattern>,
    map: HashMap<u64, u32>,
}

impl SchemaDictionary {
    pub fn find_or_add(&mut self, pattern: SchemaPattern) -> u32 {
        let hash = pattern.hash();
        if let Some(&id) = self.map.get(&hash) {
            return id;
        }
        let id = self.schemas.len() as u32;
        self.map.insert(hash, id);
        self.schemas.push(pattern);
        id
    }

    pub fn schema(&self, id: u32) -> &SchemaPattern {
        &self.schemas[id as usize]
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
