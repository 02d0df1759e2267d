//! Name and member resolution against the class metadata store
//!
//! The resolver owns a concurrent cache of resolved and known-invalid class
//! names. A resolver instance wraps exactly one metadata store, so the cache
//! lives and dies with the store it describes; independent compiler sessions
//! that share a store share a resolver.
//!
//! Overload resolution scores every candidate: an exact per-parameter match
//! scores zero, a match reachable only through widening or boxing-equivalent
//! substitution counts a penalty per parameter, and anything else rejects the
//! candidate. The first exact match in search order wins; otherwise the
//! lowest-penalty inexact match anywhere in the search wins, first-found
//! breaking ties. Resolution never silently drops an equally good candidate.

use std::sync::Arc;

use dashmap::DashMap;
use log::trace;

use crate::ast::Location;
use crate::error::{Error, Result};
use crate::metadata::{access, ClassDesc, MetadataStore, MethodDesc};
use crate::types::{
    self, parse_descriptor, parse_method_descriptor, widens_to, wrapper_class, TypeDesc,
};

/// A resolved field: declaring class, descriptor, flags, decoded type
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRef {
    pub class: String,
    pub name: String,
    pub descriptor: String,
    pub access: u16,
    pub ty: TypeDesc,
}

impl FieldRef {
    pub fn is_static(&self) -> bool {
        self.access & access::STATIC != 0
    }

    pub fn is_private(&self) -> bool {
        self.access & access::PRIVATE != 0
    }
}

/// A resolved method: declaring class, descriptor, flags, decoded signature
/// and the overload exactness score (0 = exact)
#[derive(Debug, Clone, PartialEq)]
pub struct MethodRef {
    pub class: String,
    pub name: String,
    pub descriptor: String,
    pub access: u16,
    /// Declared on an interface type (controls the invocation opcode)
    pub on_interface: bool,
    pub score: u32,
    pub param_types: Vec<TypeDesc>,
    pub ret: TypeDesc,
}

impl MethodRef {
    pub fn is_static(&self) -> bool {
        self.access & access::STATIC != 0
    }

    pub fn is_private(&self) -> bool {
        self.access & access::PRIVATE != 0
    }
}

/// Explicit classification of an unqualified dotted name: either a field
/// chain starting at the compiled class, a static member behind a class-name
/// prefix, or nothing this resolver knows about
#[derive(Debug)]
pub enum PathTarget {
    /// `path[0]` is a field of the compiled class; `rest` begins at index 1
    FieldChain { head: FieldRef },
    /// `path[..split]` is a class name and `path[split]` one of its static
    /// fields; `rest` begins at `split + 1`
    StaticMember { split: usize, head: FieldRef },
    Unresolved,
}

/// Signature comparison outcome for one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigMatch {
    Exact,
    Inexact(u32),
    No,
}

enum CacheEntry {
    Found(Arc<ClassDesc>),
    Invalid,
}

/// Resolves qualified and unqualified names to class, field and method
/// metadata, with a per-store concurrent cache
pub struct MemberResolver {
    store: Arc<dyn MetadataStore>,
    cache: DashMap<String, CacheEntry>,
}

impl MemberResolver {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
        }
    }

    fn find_cached(&self, name: &str) -> Option<Arc<ClassDesc>> {
        if let Some(entry) = self.cache.get(name) {
            return match &*entry {
                CacheEntry::Found(c) => Some(c.clone()),
                CacheEntry::Invalid => None,
            };
        }
        match self.store.find_class(name) {
            Some(c) => {
                trace!("resolved class {}", name);
                self.cache
                    .insert(name.to_string(), CacheEntry::Found(c.clone()));
                Some(c)
            }
            None => {
                trace!("recording invalid class name {}", name);
                self.cache.insert(name.to_string(), CacheEntry::Invalid);
                None
            }
        }
    }

    /// Resolve a possibly unqualified class name: as written first, then with
    /// the `java.lang.` prefix
    pub fn try_resolve_class(&self, name: &str) -> Option<Arc<ClassDesc>> {
        if let Some(c) = self.find_cached(name) {
            return Some(c);
        }
        if !name.contains('.') {
            return self.find_cached(&format!("java.lang.{}", name));
        }
        None
    }

    pub fn resolve_class(&self, name: &str, loc: Location) -> Result<Arc<ClassDesc>> {
        self.try_resolve_class(name)
            .ok_or_else(|| Error::compile(loc, format!("cannot resolve class `{}`", name)))
    }

    /// Qualify the class name inside a parsed type triple
    pub fn resolve_type(&self, ty: &TypeDesc, loc: Location) -> Result<TypeDesc> {
        match &ty.class_name {
            None => Ok(ty.clone()),
            Some(name) => {
                let class = self.resolve_class(name, loc)?;
                let mut resolved = ty.clone();
                resolved.class_name = Some(class.name.clone());
                Ok(resolved)
            }
        }
    }

    // ------------------------------------------------------------------
    // Fields
    // ------------------------------------------------------------------

    /// Find a field on `class`, its superclass chain and its interfaces
    pub fn lookup_field(&self, class: &Arc<ClassDesc>, name: &str) -> Option<FieldRef> {
        let mut current = Some(class.clone());
        while let Some(c) = current {
            if let Some(f) = c.field(name) {
                let (ty, _) = parse_descriptor(&f.descriptor, Location::start()).ok()?;
                return Some(FieldRef {
                    class: c.name.clone(),
                    name: f.name.clone(),
                    descriptor: f.descriptor.clone(),
                    access: f.access,
                    ty,
                });
            }
            for itf in &c.interfaces {
                if let Some(ic) = self.find_cached(itf) {
                    if let Some(f) = self.lookup_field(&ic, name) {
                        return Some(f);
                    }
                }
            }
            current = c.superclass.as_deref().and_then(|s| self.find_cached(s));
        }
        None
    }

    /// Classify a dotted name per the two-phase rule: field of the compiled
    /// class first, then every class-name prefix with a static member behind
    /// it; the tagged result replaces any backtracking control flow
    pub fn classify_path(&self, start: &Arc<ClassDesc>, path: &[String]) -> PathTarget {
        if let Some(head) = self.lookup_field(start, &path[0]) {
            return PathTarget::FieldChain { head };
        }
        for split in 1..path.len() {
            let prefix = path[..split].join(".");
            if let Some(class) = self.try_resolve_class(&prefix) {
                if let Some(head) = self.lookup_field(&class, &path[split]) {
                    return PathTarget::StaticMember { split, head };
                }
            }
        }
        PathTarget::Unresolved
    }

    // ------------------------------------------------------------------
    // Methods and overload resolution
    // ------------------------------------------------------------------

    /// Resolve an overloaded call on `class`. `current` carries the identity
    /// of the method being compiled, which is scored first so that direct
    /// self-recursion resolves without qualification.
    pub fn lookup_method(
        &self,
        class: &Arc<ClassDesc>,
        name: &str,
        arg_types: &[TypeDesc],
        current: Option<(&str, &MethodDesc)>,
        loc: Location,
    ) -> Result<Option<MethodRef>> {
        let mut best: Option<MethodRef> = None;

        if let Some((cur_class, cur)) = current {
            if cur.name == name && cur_class == class.name.as_str() {
                if let Some(found) =
                    self.score_candidate(&class.name, class.is_interface(), cur, arg_types, loc)?
                {
                    if found.score == 0 {
                        return Ok(Some(found));
                    }
                    best = Some(found);
                }
            }
        }

        self.search_class(class, name, arg_types, &mut best, loc)?;
        if let Some(b) = &best {
            if b.score == 0 {
                return Ok(Some(b.clone()));
            }
        }

        // interfaces, searched when the type is an interface or abstract
        if class.is_interface() || class.is_abstract() {
            self.search_interfaces(class, name, arg_types, &mut best, loc)?;
        }
        if let Some(b) = &best {
            if b.score == 0 {
                return Ok(Some(b.clone()));
            }
        }

        // an interface type still answers java.lang.Object methods
        if class.is_interface() {
            if let Some(object) = self.find_cached(types::OBJECT) {
                self.search_class(&object, name, arg_types, &mut best, loc)?;
            }
        }
        Ok(best)
    }

    /// Declared methods of `class` and its superclass chain (the chain walk
    /// is skipped for interface types)
    fn search_class(
        &self,
        class: &Arc<ClassDesc>,
        name: &str,
        arg_types: &[TypeDesc],
        best: &mut Option<MethodRef>,
        loc: Location,
    ) -> Result<()> {
        let mut current = Some(class.clone());
        while let Some(c) = current {
            for m in c.methods.iter().filter(|m| m.name == name) {
                if let Some(found) =
                    self.score_candidate(&c.name, c.is_interface(), m, arg_types, loc)?
                {
                    if found.score == 0 {
                        *best = Some(found);
                        return Ok(());
                    }
                    keep_better(best, found);
                }
            }
            if c.is_interface() {
                break;
            }
            current = c.superclass.as_deref().and_then(|s| self.find_cached(s));
        }
        Ok(())
    }

    fn search_interfaces(
        &self,
        class: &Arc<ClassDesc>,
        name: &str,
        arg_types: &[TypeDesc],
        best: &mut Option<MethodRef>,
        loc: Location,
    ) -> Result<()> {
        for itf in &class.interfaces {
            let ic = match self.find_cached(itf) {
                Some(c) => c,
                None => continue,
            };
            for m in ic.methods.iter().filter(|m| m.name == name) {
                if let Some(found) =
                    self.score_candidate(&ic.name, true, m, arg_types, loc)?
                {
                    if found.score == 0 {
                        *best = Some(found);
                        return Ok(());
                    }
                    keep_better(best, found);
                }
            }
            self.search_interfaces(&ic, name, arg_types, best, loc)?;
            if best.as_ref().map_or(false, |b| b.score == 0) {
                return Ok(());
            }
        }
        Ok(())
    }

    fn score_candidate(
        &self,
        class_name: &str,
        on_interface: bool,
        m: &MethodDesc,
        arg_types: &[TypeDesc],
        loc: Location,
    ) -> Result<Option<MethodRef>> {
        let (params, ret) = parse_method_descriptor(&m.descriptor, loc)?;
        match self.compare_signature(&params, arg_types) {
            SigMatch::No => Ok(None),
            SigMatch::Exact => Ok(Some(MethodRef {
                class: class_name.to_string(),
                name: m.name.clone(),
                descriptor: m.descriptor.clone(),
                access: m.access,
                on_interface,
                score: 0,
                param_types: params,
                ret,
            })),
            SigMatch::Inexact(score) => Ok(Some(MethodRef {
                class: class_name.to_string(),
                name: m.name.clone(),
                descriptor: m.descriptor.clone(),
                access: m.access,
                on_interface,
                score,
                param_types: params,
                ret,
            })),
        }
    }

    /// Score a parameter list against the argument types
    pub fn compare_signature(&self, params: &[TypeDesc], args: &[TypeDesc]) -> SigMatch {
        if params.len() != args.len() {
            return SigMatch::No;
        }
        let mut penalty = 0u32;
        for (param, arg) in params.iter().zip(args) {
            if param == arg {
                continue;
            }
            if arg.is_null() && param.is_reference() {
                continue;
            }
            if arg.is_primitive() && param.is_primitive() && arg.dims == 0 && param.dims == 0 {
                if widens_to(arg.base, param.base) {
                    penalty += 1;
                    continue;
                }
                return SigMatch::No;
            }
            if arg.is_primitive() && param.is_reference() {
                // boxing-equivalent substitution
                let boxed_ok = param.dims == 0
                    && (param.class_name.as_deref() == Some(types::OBJECT)
                        || param.class_name.as_deref() == wrapper_class(arg.base));
                if boxed_ok {
                    penalty += 1;
                    continue;
                }
                return SigMatch::No;
            }
            if arg.is_reference() && param.is_reference() {
                if self.is_assignable_ref(arg, param) {
                    penalty += 1;
                    continue;
                }
                return SigMatch::No;
            }
            return SigMatch::No;
        }
        if penalty == 0 {
            SigMatch::Exact
        } else {
            SigMatch::Inexact(penalty)
        }
    }

    /// Reference widening: is a value of type `sub` usable where `sup` is
    /// expected?
    pub fn is_assignable_ref(&self, sub: &TypeDesc, sup: &TypeDesc) -> bool {
        if sub.is_null() {
            return sup.is_reference();
        }
        if sup.dims == 0 && sup.class_name.as_deref() == Some(types::OBJECT) {
            return true;
        }
        if sub.dims != sup.dims {
            return false;
        }
        if sub.dims > 0 {
            // element types must agree exactly for primitives, widen for classes
            if sub.base != sup.base {
                return false;
            }
            if sub.base != crate::types::BaseType::Class {
                return true;
            }
        }
        let (sub_name, sup_name) = match (&sub.class_name, &sup.class_name) {
            (Some(a), Some(b)) => (a, b),
            _ => return false,
        };
        if sub_name == sup_name {
            return true;
        }
        self.is_subclass_of(sub_name, sup_name)
    }

    /// Walk superclass chain and interfaces of `sub` looking for `sup`
    pub fn is_subclass_of(&self, sub: &str, sup: &str) -> bool {
        if sub == sup {
            return true;
        }
        let class = match self.find_cached(sub) {
            Some(c) => c,
            None => return false,
        };
        for itf in &class.interfaces {
            if self.is_subclass_of(itf, sup) {
                return true;
            }
        }
        match &class.superclass {
            Some(s) => self.is_subclass_of(s, sup),
            None => false,
        }
    }

    /// Whether two classes belong to the same top-level nest, which is what
    /// makes a package-visible bridge accessor reachable
    pub fn lexically_related(&self, a: &str, b: &str) -> bool {
        fn toplevel(name: &str) -> &str {
            match name.find('$') {
                Some(i) => &name[..i],
                None => name,
            }
        }
        toplevel(a) == toplevel(b)
    }
}

fn keep_better(best: &mut Option<MethodRef>, found: MethodRef) {
    match best {
        None => *best = Some(found),
        // strictly better only; ties resolve to the first found
        Some(b) if found.score < b.score => *best = Some(found),
        Some(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ClassBuilder, SimpleStore};

    fn store() -> Arc<SimpleStore> {
        let mut s = SimpleStore::new();
        s.insert(ClassBuilder::new("java.lang.Object").build());
        s.insert(
            ClassBuilder::new("java.lang.String")
                .method("length", "()I", access::PUBLIC)
                .build(),
        );
        s.insert(
            ClassBuilder::new("com.example.Target")
                .field("count", "I", access::PUBLIC)
                .method("foo", "(Ljava/lang/Object;)V", access::PUBLIC)
                .method("foo", "(Ljava/lang/String;)V", access::PUBLIC)
                .method("bar", "(J)V", access::PUBLIC)
                .method("bar", "(D)V", access::PUBLIC)
                .build(),
        );
        s.insert(
            ClassBuilder::new("com.example.Config")
                .field("LIMIT", "I", access::PUBLIC | access::STATIC)
                .build(),
        );
        Arc::new(s)
    }

    fn resolver() -> MemberResolver {
        MemberResolver::new(store())
    }

    #[test]
    fn java_lang_prefix_fallback() {
        let r = resolver();
        assert!(r.try_resolve_class("String").is_some());
        assert!(r.try_resolve_class("NoSuch").is_none());
        // the negative result is cached too
        assert!(r.try_resolve_class("NoSuch").is_none());
    }

    #[test]
    fn exact_overload_beats_inexact() {
        let r = resolver();
        let target = r.try_resolve_class("com.example.Target").unwrap();
        let m = r
            .lookup_method(
                &target,
                "foo",
                &[TypeDesc::string()],
                None,
                Location::start(),
            )
            .unwrap()
            .unwrap();
        assert_eq!(m.descriptor, "(Ljava/lang/String;)V");
        assert_eq!(m.score, 0);
    }

    #[test]
    fn lowest_penalty_inexact_wins_with_first_found_ties() {
        let r = resolver();
        let target = r.try_resolve_class("com.example.Target").unwrap();
        // int widens to both long and double; the first candidate wins the tie
        let m = r
            .lookup_method(&target, "bar", &[TypeDesc::int()], None, Location::start())
            .unwrap()
            .unwrap();
        assert_eq!(m.descriptor, "(J)V");
        assert_eq!(m.score, 1);
    }

    #[test]
    fn wrong_arity_is_no_match() {
        let r = resolver();
        let target = r.try_resolve_class("com.example.Target").unwrap();
        let m = r
            .lookup_method(&target, "foo", &[], None, Location::start())
            .unwrap();
        assert!(m.is_none());
    }

    #[test]
    fn classify_path_field_vs_class_prefix() {
        let r = resolver();
        let target = r.try_resolve_class("com.example.Target").unwrap();

        match r.classify_path(&target, &["count".to_string()]) {
            PathTarget::FieldChain { head } => assert_eq!(head.name, "count"),
            other => panic!("unexpected classification: {:?}", other),
        }

        let path: Vec<String> = ["com", "example", "Config", "LIMIT"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        match r.classify_path(&target, &path) {
            PathTarget::StaticMember { split, head } => {
                assert_eq!(split, 3);
                assert_eq!(head.class, "com.example.Config");
            }
            other => panic!("unexpected classification: {:?}", other),
        }

        match r.classify_path(&target, &["nope".to_string()]) {
            PathTarget::Unresolved => {}
            other => panic!("unexpected classification: {:?}", other),
        }
    }
}
