use sheaf_core::errors::{Error, Result};
use sheaf_format::ptype::{Primitive, PrimitiveType, StoreKind};

/// One field slot of the record under construction. Slot buffers are reused
/// across records; `reset` clears sizes without freeing capacity.
pub struct Slot {
    pub(crate) name: String,
    pub(crate) ptype: PrimitiveType,
    pub(crate) kind: StoreKind,
    /// Number of elements carried by this slot.
    pub(crate) stride: u32,
    pub(crate) data: Vec<u8>,
}

impl Slot {
    fn empty() -> Self {
        Self {
            name: String::new(),
            ptype: PrimitiveType::Unknown,
            kind: StoreKind::Column,
            stride: 0,
            data: Vec::with_capacity(64),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ptype(&self) -> PrimitiveType {
        self.ptype
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Copy the slot payload out as typed values. The byte buffer carries no
    /// alignment guarantee, so this cannot be a borrowed cast.
    pub(crate) fn typed<T: Primitive>(&self) -> Vec<T> {
        bytemuck::pod_collect_to_vec(&self.data)
    }
}

/// Assembles one record as an ordered sequence of named, typed slots. The
/// caller fills it, hands it to the writer, and reuses it for the next
/// record.
pub struct RecordBuilder {
    pub n_added: u64,
    n_used: usize,
    slots: Vec<Slot>,
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self {
            n_added: 0,
            n_used: 0,
            slots: Vec::new(),
        }
    }

    fn next_slot(&mut self) -> &mut Slot {
        if self.n_used == self.slots.len() {
            self.slots.push(Slot::empty());
        }
        let slot = &mut self.slots[self.n_used];
        self.n_used += 1;
        slot.data.clear();
        slot
    }

    /// Add a scalar field.
    pub fn add<T: Primitive>(&mut self, name: &str, value: T) -> Result<()> {
        self.add_values(name, std::slice::from_ref(&value))
    }

    /// Add a fixed-width vector field; each row may carry a different
    /// multiplicity.
    pub fn add_values<T: Primitive>(&mut self, name: &str, values: &[T]) -> Result<()> {
        check_element_type(T::PTYPE)?;
        let slot = self.next_slot();
        slot.name.clear();
        slot.name.push_str(name);
        slot.ptype = T::PTYPE;
        slot.kind = StoreKind::Column;
        slot.stride = values.len() as u32;
        slot.data.extend_from_slice(bytemuck::cast_slice(values));
        Ok(())
    }

    /// Add a variable-length (tensor) field.
    pub fn add_array<T: Primitive>(&mut self, name: &str, values: &[T]) -> Result<()> {
        check_element_type(T::PTYPE)?;
        let slot = self.next_slot();
        slot.name.clear();
        slot.name.push_str(name);
        slot.ptype = T::PTYPE;
        slot.kind = StoreKind::Tensor;
        slot.stride = values.len() as u32;
        slot.data.extend_from_slice(bytemuck::cast_slice(values));
        Ok(())
    }

    /// Convenience for byte payloads (sequences, quality strings, names).
    pub fn add_bytes(&mut self, name: &str, values: &[u8]) -> Result<()> {
        self.add_array(name, values)
    }

    pub fn len(&self) -> usize {
        self.n_used
    }

    pub fn is_empty(&self) -> bool {
        self.n_used == 0
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots[..self.n_used]
    }

    /// Clear per-record state, keeping slot capacity for reuse.
    pub fn reset(&mut self) {
        self.n_used = 0;
        for slot in &mut self.slots {
            slot.stride = 0;
            slot.data.clear();
        }
    }
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn check_element_type(ptype: PrimitiveType) -> Result<()> {
    match ptype {
        PrimitiveType::Unknown
        | PrimitiveType::ByteArray
        | PrimitiveType::FixedLenByteArray => Err(Error::TypeMismatch(format!(
            "{:?} is not a valid element type for a slot",
            ptype
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_assembly() {
        let mut builder = RecordBuilder::new();
        builder.add("POS", 1234u32).unwrap();
        builder.add_values("COUNTS", &[1i32, 2, 3]).unwrap();
        builder.add_bytes("SEQ", b"ACGT").unwrap();

        assert_eq!(builder.len(), 3);
        let slots = builder.slots();
        assert_eq!(slots[0].name(), "POS");
        assert_eq!(slots[0].stride(), 1);
        assert_eq!(slots[0].kind(), StoreKind::Column);
        assert_eq!(slots[1].typed::<i32>(), &[1, 2, 3]);
        assert_eq!(slots[2].kind(), StoreKind::Tensor);
        assert_eq!(slots[2].typed::<u8>(), b"ACGT");
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let mut builder = RecordBuilder::new();
        builder.add_bytes("SEQ", &[b'A'; 4096]).unwrap();
        builder.reset();
        assert!(builder.is_empty());
        builder.add("POS", 1u32).unwrap();
        assert_eq!(builder.len(), 1);
        assert_eq!(builder.slots()[0].name(), "POS");
    }
}
