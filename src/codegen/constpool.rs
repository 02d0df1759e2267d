//! Constant-pool seam
//!
//! The binary container that will hold the emitted instructions owns the real
//! constant pool; the generator only needs indices. [`ConstPool`] is the
//! boundary: the container interns whatever entry the generator asks for and
//! answers the index the instruction operand should carry.
//!
//! [`RecordingPool`] is a self-contained implementation that follows JVM
//! numbering rules (long and double entries take two indices), so a container
//! can replay its entries verbatim, and tests can assert against them.

use rustc_hash::FxHashMap;

/// Index provider for constant-pool references in emitted instructions.
/// Class names are internal (slashed) names or array descriptors.
pub trait ConstPool {
    fn class(&mut self, internal_name: &str) -> u16;
    fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16;
    fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16;
    fn interface_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16;
    fn string(&mut self, value: &str) -> u16;
    fn integer(&mut self, value: i32) -> u16;
    fn long(&mut self, value: i64) -> u16;
    fn float(&mut self, value: f32) -> u16;
    fn double(&mut self, value: f64) -> u16;
}

/// One recorded pool entry
#[derive(Debug, Clone, PartialEq)]
pub enum PoolEntry {
    Class(String),
    FieldRef { class: String, name: String, descriptor: String },
    MethodRef { class: String, name: String, descriptor: String },
    InterfaceMethodRef { class: String, name: String, descriptor: String },
    String(String),
    Integer(i32),
    Long(i64),
    Float(u32),
    Double(u64),
}

impl PoolEntry {
    fn is_wide(&self) -> bool {
        matches!(self, PoolEntry::Long(_) | PoolEntry::Double(_))
    }
}

/// In-memory [`ConstPool`] with deduplication
#[derive(Default)]
pub struct RecordingPool {
    entries: Vec<(u16, PoolEntry)>,
    index: FxHashMap<PoolEntry, u16>,
    next: u16,
}

impl RecordingPool {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: FxHashMap::default(),
            next: 1,
        }
    }

    /// All recorded entries with their assigned indices
    pub fn entries(&self) -> &[(u16, PoolEntry)] {
        &self.entries
    }

    /// Entry at a given index, if one was recorded there
    pub fn entry_at(&self, index: u16) -> Option<&PoolEntry> {
        self.entries
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, e)| e)
    }

    fn intern(&mut self, entry: PoolEntry) -> u16 {
        if let Some(&i) = self.index.get(&entry) {
            return i;
        }
        let i = self.next;
        self.next += if entry.is_wide() { 2 } else { 1 };
        self.index.insert(entry.clone(), i);
        self.entries.push((i, entry));
        i
    }
}

impl std::hash::Hash for PoolEntry {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            PoolEntry::Class(s) | PoolEntry::String(s) => s.hash(state),
            PoolEntry::FieldRef { class, name, descriptor }
            | PoolEntry::MethodRef { class, name, descriptor }
            | PoolEntry::InterfaceMethodRef { class, name, descriptor } => {
                class.hash(state);
                name.hash(state);
                descriptor.hash(state);
            }
            PoolEntry::Integer(v) => v.hash(state),
            PoolEntry::Long(v) => v.hash(state),
            PoolEntry::Float(v) => v.hash(state),
            PoolEntry::Double(v) => v.hash(state),
        }
    }
}

impl Eq for PoolEntry {}

impl ConstPool for RecordingPool {
    fn class(&mut self, internal_name: &str) -> u16 {
        self.intern(PoolEntry::Class(internal_name.to_string()))
    }

    fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.intern(PoolEntry::FieldRef {
            class: class.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.intern(PoolEntry::MethodRef {
            class: class.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    fn interface_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.intern(PoolEntry::InterfaceMethodRef {
            class: class.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    fn string(&mut self, value: &str) -> u16 {
        self.intern(PoolEntry::String(value.to_string()))
    }

    fn integer(&mut self, value: i32) -> u16 {
        self.intern(PoolEntry::Integer(value))
    }

    fn long(&mut self, value: i64) -> u16 {
        self.intern(PoolEntry::Long(value))
    }

    fn float(&mut self, value: f32) -> u16 {
        self.intern(PoolEntry::Float(value.to_bits()))
    }

    fn double(&mut self, value: f64) -> u16 {
        self.intern(PoolEntry::Double(value.to_bits()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupes_and_numbers_wide_entries() {
        let mut pool = RecordingPool::new();
        let a = pool.class("java/lang/Object");
        let b = pool.long(7);
        let c = pool.class("java/lang/Object");
        let d = pool.integer(1);
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(c, a);
        // the long consumed indices 2 and 3
        assert_eq!(d, 4);
    }
}
