// types.rs — Value type descriptors for graph nodes
//
// A `TypeDesc` is the machine-level view of a value flowing through the
// graph: integer or float with a bit width, void, or an opaque spelling for
// composite values (arrays, struct pointers) that never take part in
// arithmetic.
//
// Preconditions: none.
// Postconditions: `Display` renders `i32`, `f64`, `void` or the opaque text.
// Failure modes: `from_c_name` rejects scalar spellings outside the kernel
//                subset. Array-element stripping rejects malformed opaque text.
// Side effects: none.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Integer,
    Float,
}

/// Type of a value carried by a node or edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDesc {
    pub kind: DataKind,
    pub bits: u32,
    pub unsigned: bool,
    pub void: bool,
    /// Opaque spelling for non-scalar values, e.g. `int[10][20]`.
    pub opaque: Option<String>,
}

/// A type query that has no answer for the node or spelling involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeError(pub String);

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for TypeError {}

impl TypeDesc {
    pub fn int(bits: u32) -> Self {
        TypeDesc {
            kind: DataKind::Integer,
            bits,
            unsigned: false,
            void: false,
            opaque: None,
        }
    }

    pub fn float(bits: u32) -> Self {
        TypeDesc {
            kind: DataKind::Float,
            ..TypeDesc::int(bits)
        }
    }

    pub fn scalar(kind: DataKind, bits: u32) -> Self {
        TypeDesc {
            kind,
            ..TypeDesc::int(bits)
        }
    }

    pub fn void() -> Self {
        TypeDesc {
            void: true,
            ..TypeDesc::int(0)
        }
    }

    pub fn opaque(text: impl Into<String>) -> Self {
        TypeDesc {
            opaque: Some(text.into()),
            ..TypeDesc::int(0)
        }
    }

    pub fn with_unsigned(mut self, unsigned: bool) -> Self {
        self.unsigned = unsigned;
        self
    }

    /// Map a canonical C scalar spelling to its machine type.
    pub fn from_c_name(name: &str) -> Result<Self, TypeError> {
        let ty = match name {
            "int" | "signed int" => TypeDesc::int(32),
            "unsigned int" => TypeDesc::int(32).with_unsigned(true),
            "long" | "signed long" | "long long" | "signed long long" => TypeDesc::int(64),
            "unsigned long" | "unsigned long long" => TypeDesc::int(64).with_unsigned(true),
            "short" | "signed short" => TypeDesc::int(16),
            "unsigned short" => TypeDesc::int(16).with_unsigned(true),
            "char" | "signed char" | "bool" => TypeDesc::int(8),
            "unsigned char" => TypeDesc::int(8).with_unsigned(true),
            "double" => TypeDesc::float(64),
            "float" => TypeDesc::float(32),
            "void" => TypeDesc::void(),
            other => {
                return Err(TypeError(format!(
                    "cannot describe type '{}' as a machine value",
                    other
                )))
            }
        };
        Ok(ty)
    }

    pub fn is_float(&self) -> bool {
        !self.void && self.opaque.is_none() && self.kind == DataKind::Float
    }

    pub fn is_integer(&self) -> bool {
        !self.void && self.opaque.is_none() && self.kind == DataKind::Integer
    }

    pub fn is_opaque(&self) -> bool {
        self.opaque.is_some()
    }

    /// Result type of a binary unit: float dominates, width is the widest
    /// operand or the unit minimum.
    pub fn binary_result(lhs: &TypeDesc, rhs: &TypeDesc, unit_min: u32) -> TypeDesc {
        let kind = if lhs.kind == DataKind::Float || rhs.kind == DataKind::Float {
            DataKind::Float
        } else {
            DataKind::Integer
        };
        TypeDesc::scalar(kind, lhs.bits.max(rhs.bits).max(unit_min))
    }

    /// Type of an address computed into an array of this (opaque) type.
    ///
    /// Indexing a multi-dimensional array yields the row type; anything else
    /// yields a 64-bit pointer.
    pub fn indexed_address(&self) -> Result<TypeDesc, TypeError> {
        let Some(text) = &self.opaque else {
            return Ok(TypeDesc::int(64));
        };
        if !text.ends_with(']') {
            return Err(TypeError(format!(
                "opaque array type does not end in ']': {}",
                text
            )));
        }
        let Some(open) = text.rfind('[') else {
            return Err(TypeError(format!("unbalanced array type: {}", text)));
        };
        let row = &text[..open];
        if row.ends_with(']') {
            Ok(TypeDesc::opaque(row))
        } else {
            Ok(TypeDesc::int(64))
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.void {
            return write!(f, "void");
        }
        if let Some(text) = &self.opaque {
            return write!(f, "{}", text);
        }
        match self.kind {
            DataKind::Integer => write!(f, "i{}", self.bits),
            DataKind::Float => write!(f, "f{}", self.bits),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c_names_map_to_widths() {
        let cases = [
            ("int", "i32"),
            ("unsigned int", "i32"),
            ("long long", "i64"),
            ("short", "i16"),
            ("unsigned char", "i8"),
            ("bool", "i8"),
            ("double", "f64"),
            ("float", "f32"),
            ("void", "void"),
        ];
        for (name, expected) in cases {
            let ty = TypeDesc::from_c_name(name).expect("known scalar");
            assert_eq!(ty.to_string(), expected, "for {}", name);
        }
        assert!(TypeDesc::from_c_name("unsigned char").unwrap().unsigned);
        assert!(!TypeDesc::from_c_name("int").unwrap().unsigned);
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = TypeDesc::from_c_name("struct pt").unwrap_err();
        assert!(err.0.contains("struct pt"));
    }

    #[test]
    fn float_dominates_binary_result() {
        let ty = TypeDesc::binary_result(&TypeDesc::int(64), &TypeDesc::float(32), 0);
        assert_eq!(ty, TypeDesc::float(64));
    }

    #[test]
    fn unit_minimum_widens_result() {
        let ty = TypeDesc::binary_result(&TypeDesc::int(8), &TypeDesc::int(16), 32);
        assert_eq!(ty, TypeDesc::int(32));
    }

    #[test]
    fn opaque_display_is_verbatim() {
        assert_eq!(TypeDesc::opaque("int[10][20]").to_string(), "int[10][20]");
        assert!(!TypeDesc::opaque("struct*").is_integer());
    }

    #[test]
    fn indexing_strips_one_dimension() {
        let row = TypeDesc::opaque("int[10][20]").indexed_address().unwrap();
        assert_eq!(row, TypeDesc::opaque("int[10]"));
        let leaf = TypeDesc::opaque("int[10]").indexed_address().unwrap();
        assert_eq!(leaf, TypeDesc::int(64));
        assert_eq!(TypeDesc::int(32).indexed_address().unwrap(), TypeDesc::int(64));
        assert!(TypeDesc::opaque("struct*").indexed_address().is_err());
    }
}
