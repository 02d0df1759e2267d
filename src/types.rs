//! Type triples and descriptor utilities
//!
//! Every expression node carries, after type checking, a resolved triple of
//! base kind, array depth and (for class types) the dotted class name. The
//! descriptor functions translate between triples and the canonical JVM
//! descriptor strings used for member resolution and emission.

use once_cell::sync::Lazy;

use crate::ast::Location;
use crate::error::{Error, Result};

pub const OBJECT: &str = "java.lang.Object";
pub const STRING: &str = "java.lang.String";

/// Base kind of a resolved type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
    Class,
}

impl BaseType {
    /// Descriptor character for a primitive base type
    pub fn descriptor_char(self) -> Option<char> {
        Some(match self {
            BaseType::Boolean => 'Z',
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Short => 'S',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Float => 'F',
            BaseType::Double => 'D',
            BaseType::Void => 'V',
            BaseType::Class => return None,
        })
    }

    /// Source-level keyword for the primitive, if any
    pub fn keyword(self) -> Option<&'static str> {
        Some(match self {
            BaseType::Boolean => "boolean",
            BaseType::Byte => "byte",
            BaseType::Char => "char",
            BaseType::Short => "short",
            BaseType::Int => "int",
            BaseType::Long => "long",
            BaseType::Float => "float",
            BaseType::Double => "double",
            BaseType::Void => "void",
            BaseType::Class => return None,
        })
    }
}

/// Resolved type triple: base kind, array depth, optional class name
///
/// Invariant: `class_name` is `Some` exactly when `base == Class`; a positive
/// `dims` makes the triple describe an array of the base/class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDesc {
    pub base: BaseType,
    pub dims: usize,
    pub class_name: Option<String>,
}

impl TypeDesc {
    pub fn primitive(base: BaseType) -> Self {
        debug_assert!(base != BaseType::Class);
        Self { base, dims: 0, class_name: None }
    }

    pub fn class(name: impl Into<String>) -> Self {
        Self {
            base: BaseType::Class,
            dims: 0,
            class_name: Some(name.into()),
        }
    }

    pub fn array_of(mut elem: TypeDesc, extra_dims: usize) -> Self {
        elem.dims += extra_dims;
        elem
    }

    pub fn int() -> Self {
        Self::primitive(BaseType::Int)
    }

    pub fn void() -> Self {
        Self::primitive(BaseType::Void)
    }

    pub fn object() -> Self {
        Self::class(OBJECT)
    }

    pub fn string() -> Self {
        Self::class(STRING)
    }

    /// The special bottom type of the `null` literal; assignable to any
    /// reference type and distinguishable by its empty class name
    pub fn null() -> Self {
        Self {
            base: BaseType::Class,
            dims: 0,
            class_name: Some(String::new()),
        }
    }

    pub fn is_null(&self) -> bool {
        self.base == BaseType::Class
            && self.dims == 0
            && self.class_name.as_deref() == Some("")
    }

    pub fn is_reference(&self) -> bool {
        self.dims > 0 || self.base == BaseType::Class
    }

    pub fn is_primitive(&self) -> bool {
        !self.is_reference()
    }

    pub fn is_void(&self) -> bool {
        self.dims == 0 && self.base == BaseType::Void
    }

    pub fn is_string(&self) -> bool {
        self.dims == 0 && self.class_name.as_deref() == Some(STRING)
    }

    pub fn is_numeric(&self) -> bool {
        self.dims == 0
            && matches!(
                self.base,
                BaseType::Byte
                    | BaseType::Char
                    | BaseType::Short
                    | BaseType::Int
                    | BaseType::Long
                    | BaseType::Float
                    | BaseType::Double
            )
    }

    pub fn is_boolean(&self) -> bool {
        self.dims == 0 && self.base == BaseType::Boolean
    }

    /// Number of stack slots / local slots a value of this type occupies
    pub fn width(&self) -> u16 {
        if self.dims == 0 && matches!(self.base, BaseType::Long | BaseType::Double) {
            2
        } else if self.is_void() {
            0
        } else {
            1
        }
    }

    /// Element type of an array type
    pub fn element(&self) -> Option<TypeDesc> {
        if self.dims == 0 {
            None
        } else {
            let mut t = self.clone();
            t.dims -= 1;
            Some(t)
        }
    }

    /// Canonical JVM descriptor for this triple
    pub fn descriptor(&self) -> String {
        let mut d = String::new();
        for _ in 0..self.dims {
            d.push('[');
        }
        match self.base.descriptor_char() {
            Some(c) => d.push(c),
            None => {
                d.push('L');
                d.push_str(&self.class_name.as_deref().unwrap_or(OBJECT).replace('.', "/"));
                d.push(';');
            }
        }
        d
    }

    /// Internal (slashed) class name, for arrays the full descriptor form
    pub fn internal_name(&self) -> String {
        if self.dims > 0 {
            self.descriptor()
        } else {
            self.class_name.as_deref().unwrap_or(OBJECT).replace('.', "/")
        }
    }

    /// Human-readable source form, for diagnostics
    pub fn display(&self) -> String {
        let mut s = match self.base.keyword() {
            Some(k) => k.to_string(),
            None if self.is_null() => "null".to_string(),
            None => self.class_name.clone().unwrap_or_else(|| OBJECT.to_string()),
        };
        for _ in 0..self.dims {
            s.push_str("[]");
        }
        s
    }
}

/// Parse one type from a descriptor, returning the triple and the number of
/// characters consumed
pub fn parse_descriptor(desc: &str, loc: Location) -> Result<(TypeDesc, usize)> {
    let bytes = desc.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i] == b'[' {
        i += 1;
    }
    let dims = i;
    if i >= bytes.len() {
        return Err(Error::compile(loc, format!("bad descriptor: {}", desc)));
    }
    let (base, class_name, consumed) = match bytes[i] {
        b'Z' => (BaseType::Boolean, None, 1),
        b'B' => (BaseType::Byte, None, 1),
        b'C' => (BaseType::Char, None, 1),
        b'S' => (BaseType::Short, None, 1),
        b'I' => (BaseType::Int, None, 1),
        b'J' => (BaseType::Long, None, 1),
        b'F' => (BaseType::Float, None, 1),
        b'D' => (BaseType::Double, None, 1),
        b'V' => (BaseType::Void, None, 1),
        b'L' => {
            let rest = &desc[i + 1..];
            let end = rest
                .find(';')
                .ok_or_else(|| Error::compile(loc, format!("bad descriptor: {}", desc)))?;
            (
                BaseType::Class,
                Some(rest[..end].replace('/', ".")),
                end + 2,
            )
        }
        _ => return Err(Error::compile(loc, format!("bad descriptor: {}", desc))),
    };
    Ok((TypeDesc { base, dims, class_name }, dims + consumed))
}

/// Parse the parameter list and return type out of a method descriptor
pub fn parse_method_descriptor(desc: &str, loc: Location) -> Result<(Vec<TypeDesc>, TypeDesc)> {
    if !desc.starts_with('(') {
        return Err(Error::compile(loc, format!("bad method descriptor: {}", desc)));
    }
    let close = desc
        .find(')')
        .ok_or_else(|| Error::compile(loc, format!("bad method descriptor: {}", desc)))?;
    let mut params = Vec::new();
    let mut rest = &desc[1..close];
    while !rest.is_empty() {
        let (t, n) = parse_descriptor(rest, loc)?;
        params.push(t);
        rest = &rest[n..];
    }
    let (ret, _) = parse_descriptor(&desc[close + 1..], loc)?;
    Ok((params, ret))
}

/// Build a method descriptor from parameter triples and a return triple
pub fn method_descriptor(params: &[TypeDesc], ret: &TypeDesc) -> String {
    let mut d = String::from("(");
    for p in params {
        d.push_str(&p.descriptor());
    }
    d.push(')');
    d.push_str(&ret.descriptor());
    d
}

/// Binary numeric promotion: the wider of {int, long, float, double};
/// sub-int operands (byte, short, char) promote to int
pub fn binary_promotion(a: BaseType, b: BaseType) -> BaseType {
    use BaseType::*;
    match (a, b) {
        (Double, _) | (_, Double) => Double,
        (Float, _) | (_, Float) => Float,
        (Long, _) | (_, Long) => Long,
        _ => Int,
    }
}

/// Whether a primitive value of `from` widens implicitly to `to`
pub fn widens_to(from: BaseType, to: BaseType) -> bool {
    use BaseType::*;
    if from == to {
        return true;
    }
    match from {
        Byte => matches!(to, Short | Int | Long | Float | Double),
        Short | Char => matches!(to, Int | Long | Float | Double),
        Int => matches!(to, Long | Float | Double),
        Long => matches!(to, Float | Double),
        Float => matches!(to, Double),
        _ => false,
    }
}

/// Wrapper class for a primitive base type (boxing-equivalent substitution)
pub fn wrapper_class(base: BaseType) -> Option<&'static str> {
    static TABLE: Lazy<Vec<(BaseType, &'static str)>> = Lazy::new(|| {
        vec![
            (BaseType::Boolean, "java.lang.Boolean"),
            (BaseType::Byte, "java.lang.Byte"),
            (BaseType::Char, "java.lang.Character"),
            (BaseType::Short, "java.lang.Short"),
            (BaseType::Int, "java.lang.Integer"),
            (BaseType::Long, "java.lang.Long"),
            (BaseType::Float, "java.lang.Float"),
            (BaseType::Double, "java.lang.Double"),
        ]
    });
    TABLE.iter().find(|(b, _)| *b == base).map(|(_, n)| *n)
}

/// Name of the unboxing method on the wrapper class (`intValue` etc.)
pub fn unbox_method(base: BaseType) -> Option<&'static str> {
    Some(match base {
        BaseType::Boolean => "booleanValue",
        BaseType::Byte => "byteValue",
        BaseType::Char => "charValue",
        BaseType::Short => "shortValue",
        BaseType::Int => "intValue",
        BaseType::Long => "longValue",
        BaseType::Float => "floatValue",
        BaseType::Double => "doubleValue",
        _ => return None,
    })
}

/// Look up the primitive base type for a source keyword
pub fn primitive_by_name(name: &str) -> Option<BaseType> {
    Some(match name {
        "boolean" => BaseType::Boolean,
        "byte" => BaseType::Byte,
        "char" => BaseType::Char,
        "short" => BaseType::Short,
        "int" => BaseType::Int,
        "long" => BaseType::Long,
        "float" => BaseType::Float,
        "double" => BaseType::Double,
        "void" => BaseType::Void,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_round_trip() {
        let t = TypeDesc::array_of(TypeDesc::class("java.lang.String"), 2);
        assert_eq!(t.descriptor(), "[[Ljava/lang/String;");
        let (back, n) = parse_descriptor(&t.descriptor(), Location::start()).unwrap();
        assert_eq!(back, t);
        assert_eq!(n, t.descriptor().len());
    }

    #[test]
    fn method_descriptor_build_and_parse() {
        let d = method_descriptor(
            &[TypeDesc::int(), TypeDesc::class(OBJECT)],
            &TypeDesc::primitive(BaseType::Long),
        );
        assert_eq!(d, "(ILjava/lang/Object;)J");
        let (params, ret) = parse_method_descriptor(&d, Location::start()).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(ret, TypeDesc::primitive(BaseType::Long));
    }

    #[test]
    fn promotion_widens() {
        assert_eq!(binary_promotion(BaseType::Byte, BaseType::Char), BaseType::Int);
        assert_eq!(binary_promotion(BaseType::Int, BaseType::Long), BaseType::Long);
        assert_eq!(binary_promotion(BaseType::Float, BaseType::Long), BaseType::Float);
        assert!(widens_to(BaseType::Int, BaseType::Double));
        assert!(!widens_to(BaseType::Long, BaseType::Int));
        assert!(!widens_to(BaseType::Boolean, BaseType::Int));
    }

    #[test]
    fn width_of_wide_types() {
        assert_eq!(TypeDesc::primitive(BaseType::Long).width(), 2);
        assert_eq!(TypeDesc::array_of(TypeDesc::primitive(BaseType::Long), 1).width(), 1);
        assert_eq!(TypeDesc::void().width(), 0);
    }
}
