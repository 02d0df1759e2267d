//! Class metadata model
//!
//! The container that owns the real class data (class files, reflection,
//! whatever the agent has loaded) implements [`MetadataStore`]; the compiler
//! only ever asks it for [`ClassDesc`] records and walks superclass and
//! interface names from there.

use std::sync::Arc;

/// Member and class access flags (JVM `access_flags` values)
pub mod access {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const ABSTRACT: u16 = 0x0400;
    pub const INTERFACE: u16 = 0x0200;
}

/// Field descriptor record
#[derive(Debug, Clone)]
pub struct FieldDesc {
    pub name: String,
    pub descriptor: String,
    pub access: u16,
}

/// Method descriptor record
#[derive(Debug, Clone)]
pub struct MethodDesc {
    pub name: String,
    pub descriptor: String,
    pub access: u16,
}

impl MethodDesc {
    pub fn is_static(&self) -> bool {
        self.access & access::STATIC != 0
    }

    pub fn is_private(&self) -> bool {
        self.access & access::PRIVATE != 0
    }
}

/// Metadata for one class, as reported by the store
#[derive(Debug, Clone)]
pub struct ClassDesc {
    /// Dotted class name (`java.lang.String`)
    pub name: String,
    pub access: u16,
    /// Dotted superclass name; `None` only for `java.lang.Object`
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldDesc>,
    pub methods: Vec<MethodDesc>,
    /// Dotted name of the lexically enclosing class, if this is a nested class
    pub enclosing: Option<String>,
}

impl ClassDesc {
    pub fn is_interface(&self) -> bool {
        self.access & access::INTERFACE != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access & access::ABSTRACT != 0
    }

    pub fn field(&self, name: &str) -> Option<&FieldDesc> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Top-level class of the nest this class belongs to
    pub fn toplevel_name(&self) -> &str {
        match self.name.find('$') {
            Some(i) => &self.name[..i],
            None => &self.name,
        }
    }
}

/// Builder for [`ClassDesc`], used by embedders and test fixtures
pub struct ClassBuilder {
    desc: ClassDesc,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let superclass = if name == crate::types::OBJECT {
            None
        } else {
            Some(crate::types::OBJECT.to_string())
        };
        Self {
            desc: ClassDesc {
                name,
                access: access::PUBLIC,
                superclass,
                interfaces: Vec::new(),
                fields: Vec::new(),
                methods: Vec::new(),
                enclosing: None,
            },
        }
    }

    pub fn access(mut self, flags: u16) -> Self {
        self.desc.access = flags;
        self
    }

    pub fn extends(mut self, name: impl Into<String>) -> Self {
        self.desc.superclass = Some(name.into());
        self
    }

    pub fn implements(mut self, name: impl Into<String>) -> Self {
        self.desc.interfaces.push(name.into());
        self
    }

    pub fn enclosing(mut self, name: impl Into<String>) -> Self {
        self.desc.enclosing = Some(name.into());
        self
    }

    pub fn field(mut self, name: &str, descriptor: &str, access: u16) -> Self {
        self.desc.fields.push(FieldDesc {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access,
        });
        self
    }

    pub fn method(mut self, name: &str, descriptor: &str, access: u16) -> Self {
        self.desc.methods.push(MethodDesc {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access,
        });
        self
    }

    pub fn build(self) -> Arc<ClassDesc> {
        Arc::new(self.desc)
    }
}

/// External class-metadata store
///
/// Implementations must be safe to query from several compilations running in
/// parallel against the same store.
pub trait MetadataStore: Send + Sync {
    /// Resolve a dotted class name to its metadata, or `None` if unknown
    fn find_class(&self, name: &str) -> Option<Arc<ClassDesc>>;
}

/// Map-backed [`MetadataStore`] for embedders that describe classes by hand
#[derive(Default)]
pub struct SimpleStore {
    classes: std::collections::HashMap<String, Arc<ClassDesc>>,
}

impl SimpleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, class: Arc<ClassDesc>) -> &mut Self {
        self.classes.insert(class.name.clone(), class);
        self
    }
}

impl MetadataStore for SimpleStore {
    fn find_class(&self, name: &str) -> Option<Arc<ClassDesc>> {
        self.classes.get(name).cloned()
    }
}
