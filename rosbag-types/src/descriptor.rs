/// Core structural descriptors for ROS message types
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Name of the synthetic member injected into field-less structures.
///
/// The member participates in CDR layout and RIHS01 hashing but is skipped by
/// the ROS1 wire format, the canonical ROS1 definition text, and the value
/// model.
pub const EMPTY_STRUCTURE_REQUIRED_MEMBER_NAME: &str = "structure_needs_at_least_one_member";

/// Wire-level primitive kinds shared by the MSG and IDL grammars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PrimitiveKind {
    Bool,
    Octet,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    String,
}

impl PrimitiveKind {
    /// Parse a canonical primitive name
    ///
    /// The legacy spellings `byte` and `char` are accepted and mapped to
    /// `octet` and `uint8`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bool" => Some(Self::Bool),
            "octet" | "byte" => Some(Self::Octet),
            "int8" => Some(Self::Int8),
            "uint8" | "char" => Some(Self::UInt8),
            "int16" => Some(Self::Int16),
            "uint16" => Some(Self::UInt16),
            "int32" => Some(Self::Int32),
            "uint32" => Some(Self::UInt32),
            "int64" => Some(Self::Int64),
            "uint64" => Some(Self::UInt64),
            "float32" => Some(Self::Float32),
            "float64" => Some(Self::Float64),
            "string" => Some(Self::String),
            _ => None,
        }
    }

    /// Canonical name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Octet => "octet",
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::String => "string",
        }
    }

    /// Wire size in bytes, `None` for the variable-length string
    #[must_use]
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Bool | Self::Octet | Self::Int8 | Self::UInt8 => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int32 | Self::UInt32 | Self::Float32 => Some(4),
            Self::Int64 | Self::UInt64 | Self::Float64 => Some(8),
            Self::String => None,
        }
    }

    /// CDR alignment requirement in bytes
    ///
    /// Strings align on their 32-bit length prefix.
    #[must_use]
    pub fn alignment(self) -> usize {
        self.fixed_size().unwrap_or(4)
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primitive type with an optional string bound
///
/// `limit` is the upper bound for bounded strings, 0 for unbounded strings,
/// and unused for the fixed-size primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BaseType {
    /// Primitive kind
    pub kind: PrimitiveKind,
    /// String upper bound, 0 = unbounded
    pub limit: u64,
}

impl BaseType {
    /// Create an unbounded base type
    #[must_use]
    pub fn new(kind: PrimitiveKind) -> Self {
        Self { kind, limit: 0 }
    }

    /// Create a bounded string type
    #[must_use]
    pub fn bounded_string(limit: u64) -> Self {
        Self {
            kind: PrimitiveKind::String,
            limit,
        }
    }
}

/// Element type of an array or sequence
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ElementType {
    /// Primitive element
    Base(BaseType),
    /// Reference to another registered type
    Name(String),
}

/// Field type descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FieldType {
    /// Primitive field
    Base(BaseType),
    /// Reference to another registered type
    Name(String),
    /// Fixed-length array
    Array(ElementType, u64),
    /// Variable-length sequence, bound 0 = unbounded
    Sequence(ElementType, u64),
}

impl FieldType {
    /// Shorthand for an unbounded primitive field
    #[must_use]
    pub fn base(kind: PrimitiveKind) -> Self {
        FieldType::Base(BaseType::new(kind))
    }

    /// Shorthand for a named reference field
    #[must_use]
    pub fn name(typename: &str) -> Self {
        FieldType::Name(typename.to_string())
    }
}

/// Literal value of a constant definition
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConstValue {
    /// Boolean literal
    Bool(bool),
    /// Integer literal
    Int(i64),
    /// Floating point literal
    Float(f64),
    /// String literal
    Str(String),
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Bool(v) => write!(f, "{v}"),
            ConstValue::Int(v) => write!(f, "{v}"),
            ConstValue::Float(v) => write!(f, "{v}"),
            ConstValue::Str(v) => write!(f, "{v}"),
        }
    }
}

/// Constant definition
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConstDef {
    /// Constant name
    pub name: String,
    /// Primitive type of the constant
    pub kind: PrimitiveKind,
    /// Literal value
    pub value: ConstValue,
}

/// Field definition
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Field type
    pub ty: FieldType,
}

impl FieldDef {
    /// Create a new field definition
    #[must_use]
    pub fn new(name: &str, ty: FieldType) -> Self {
        Self {
            name: name.to_string(),
            ty,
        }
    }
}

/// Structural summary of one message type
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TypeDescriptor {
    /// Normalized type name
    pub name: String,
    /// Constant definitions in declaration order
    pub constants: Vec<ConstDef>,
    /// Field definitions in declaration order
    pub fields: Vec<FieldDef>,
}

impl TypeDescriptor {
    /// Create a new descriptor
    #[must_use]
    pub fn new(name: &str, constants: Vec<ConstDef>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.to_string(),
            constants,
            fields,
        }
    }

    /// Structural field equality, comparing field names case-insensitively
    ///
    /// Constants do not participate; two descriptors with the same fields but
    /// different constants compare equal.
    #[must_use]
    pub fn same_fields(&self, other: &TypeDescriptor) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.name.eq_ignore_ascii_case(&b.name) && a.ty == b.ty)
    }
}

/// Normalize a message type name to the `package/msg/Type` form
///
/// Inserts the `msg` middle segment when the second-to-last path segment is
/// anything else.
#[must_use]
pub fn normalize_typename(name: &str) -> String {
    match name.rsplit_once('/') {
        Some((parent, base)) => {
            if parent.rsplit('/').next() == Some("msg") {
                name.to_string()
            } else {
                format!("{parent}/msg/{base}")
            }
        }
        None => format!("msg/{name}"),
    }
}

/// Undo message type name normalization, yielding the ROS1 style name
///
/// The input must contain a `msg` middle segment.
#[must_use]
pub fn denormalize_typename(name: &str) -> String {
    name.replacen("/msg/", "/", 1)
}

/// Reserved words that field and constant names may not collide with
const KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "crate",
    "do", "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl",
    "in", "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "self", "static", "struct", "super", "trait", "true", "try", "type", "typeof",
    "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

/// Normalize a field name, avoiding collisions with reserved words
#[must_use]
pub fn normalize_fieldname(name: &str) -> String {
    if KEYWORDS.contains(&name) {
        format!("{name}_")
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_sizes() {
        assert_eq!(PrimitiveKind::Bool.fixed_size(), Some(1));
        assert_eq!(PrimitiveKind::UInt16.fixed_size(), Some(2));
        assert_eq!(PrimitiveKind::Float32.fixed_size(), Some(4));
        assert_eq!(PrimitiveKind::UInt64.fixed_size(), Some(8));
        assert_eq!(PrimitiveKind::String.fixed_size(), None);
        assert_eq!(PrimitiveKind::String.alignment(), 4);
    }

    #[test]
    fn test_primitive_parse_aliases() {
        assert_eq!(PrimitiveKind::parse("byte"), Some(PrimitiveKind::Octet));
        assert_eq!(PrimitiveKind::parse("char"), Some(PrimitiveKind::UInt8));
        assert_eq!(PrimitiveKind::parse("float128"), None);
    }

    #[test]
    fn test_normalize_typename() {
        assert_eq!(normalize_typename("std_msgs/Header"), "std_msgs/msg/Header");
        assert_eq!(
            normalize_typename("std_msgs/msg/Header"),
            "std_msgs/msg/Header"
        );
        assert_eq!(
            normalize_typename("a/b/Type"),
            "a/b/msg/Type",
            "non-msg middle segments gain a msg segment"
        );
    }

    #[test]
    fn test_denormalize_typename() {
        assert_eq!(denormalize_typename("std_msgs/msg/Header"), "std_msgs/Header");
    }

    #[test]
    fn test_normalize_fieldname() {
        assert_eq!(normalize_fieldname("return"), "return_");
        assert_eq!(normalize_fieldname("yield"), "yield_");
        assert_eq!(normalize_fieldname("data"), "data");
    }

    #[test]
    fn test_same_fields_case_insensitive() {
        let a = TypeDescriptor::new(
            "test_msgs/msg/Foo",
            vec![],
            vec![FieldDef::new("Data", FieldType::base(PrimitiveKind::Bool))],
        );
        let b = TypeDescriptor::new(
            "test_msgs/msg/Foo",
            vec![],
            vec![FieldDef::new("data", FieldType::base(PrimitiveKind::Bool))],
        );
        assert!(a.same_fields(&b));

        let c = TypeDescriptor::new(
            "test_msgs/msg/Foo",
            vec![],
            vec![FieldDef::new("data", FieldType::base(PrimitiveKind::Int8))],
        );
        assert!(!a.same_fields(&c));
    }

    #[test]
    fn test_const_value_display() {
        assert_eq!(ConstValue::Bool(true).to_string(), "true");
        assert_eq!(ConstValue::Int(42).to_string(), "42");
        assert_eq!(ConstValue::Float(1.33).to_string(), "1.33");
        assert_eq!(ConstValue::Str("foo bar".to_string()).to_string(), "foo bar");
    }
}
