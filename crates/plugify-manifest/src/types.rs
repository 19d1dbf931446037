//! Portable ABI type system shared by every generator stage
//!
//! This module provides:
//! - `PortableType`, the closed taxonomy of wire type tags
//! - Parameter/return descriptors and `CallableSignature`
//! - The explicit symbol record used by import-direction callables

use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// POINTER WIDTH - decided once per build
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerWidth {
    Bits32,
    Bits64,
}

impl PointerWidth {
    /// Width of the platform this generator was compiled for
    pub const fn target() -> Self {
        if cfg!(target_pointer_width = "32") {
            PointerWidth::Bits32
        } else {
            PointerWidth::Bits64
        }
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            32 => Some(PointerWidth::Bits32),
            64 => Some(PointerWidth::Bits64),
            _ => None,
        }
    }

    pub const fn bits(self) -> u8 {
        match self {
            PointerWidth::Bits32 => 32,
            PointerWidth::Bits64 => 64,
        }
    }

    pub fn pointer_type(self) -> PortableType {
        match self {
            PointerWidth::Bits32 => PortableType::Ptr32,
            PointerWidth::Bits64 => PortableType::Ptr64,
        }
    }
}

impl Default for PointerWidth {
    fn default() -> Self {
        PointerWidth::target()
    }
}

// =============================================================================
// PORTABLE TYPE - closed taxonomy
// =============================================================================

/// A language-neutral wire type tag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PortableType {
    Void,
    Bool,
    Char8,
    Char16,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Ptr32,
    Ptr64,
    Float32,
    Float64,
    String,
    Any,
    Vec2,
    Vec3,
    Vec4,
    Mat4x4,
    Function(Arc<FunctionSignature>),
    Array(Box<PortableType>),
}

/// How a portable value travels across the native boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireForm {
    /// Nothing crosses
    Nothing,
    /// 1-byte integer
    Byte,
    /// 2-byte unsigned integer
    UShort,
    /// Pointer-sized opaque handle
    Handle,
    /// Contiguous float fields passed by value
    FloatFields,
    /// The value at its natural width
    Natural,
}

impl PortableType {
    /// Leaf tag name as it appears in the manifest (`elementType[]` for arrays)
    pub fn type_name(&self) -> String {
        match self {
            PortableType::Array(element) => format!("{}[]", element.leaf_name()),
            other => other.leaf_name().to_string(),
        }
    }

    fn leaf_name(&self) -> &'static str {
        match self {
            PortableType::Void => "void",
            PortableType::Bool => "bool",
            PortableType::Char8 => "char8",
            PortableType::Char16 => "char16",
            PortableType::Int8 => "int8",
            PortableType::Int16 => "int16",
            PortableType::Int32 => "int32",
            PortableType::Int64 => "int64",
            PortableType::UInt8 => "uint8",
            PortableType::UInt16 => "uint16",
            PortableType::UInt32 => "uint32",
            PortableType::UInt64 => "uint64",
            PortableType::Ptr32 => "ptr32",
            PortableType::Ptr64 => "ptr64",
            PortableType::Float32 => "float",
            PortableType::Float64 => "double",
            PortableType::String => "string",
            PortableType::Any => "any",
            PortableType::Vec2 => "vec2",
            PortableType::Vec3 => "vec3",
            PortableType::Vec4 => "vec4",
            PortableType::Mat4x4 => "mat4x4",
            PortableType::Function(_) => "function",
            // Nested arrays never survive classification
            PortableType::Array(_) => "array",
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, PortableType::Void)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, PortableType::Ptr32 | PortableType::Ptr64)
    }

    pub fn as_function(&self) -> Option<&FunctionSignature> {
        match self {
            PortableType::Function(signature) => Some(signature),
            _ => None,
        }
    }

    pub fn element(&self) -> Option<&PortableType> {
        match self {
            PortableType::Array(element) => Some(element),
            _ => None,
        }
    }

    /// Whether a value of this type needs conversion code to cross the boundary
    ///
    /// A callback only does when its own signature is not self-describing.
    pub fn requires_marshaling(&self) -> bool {
        match self {
            PortableType::String | PortableType::Array(_) | PortableType::Any => true,
            PortableType::Function(signature) => !signature.is_self_describing(),
            _ => false,
        }
    }

    pub fn wire_form(&self) -> WireForm {
        match self {
            PortableType::Void => WireForm::Nothing,
            PortableType::Bool => WireForm::Byte,
            PortableType::Char16 => WireForm::UShort,
            PortableType::String
            | PortableType::Array(_)
            | PortableType::Function(_)
            | PortableType::Any => WireForm::Handle,
            PortableType::Vec2 | PortableType::Vec3 | PortableType::Vec4 | PortableType::Mat4x4 => {
                WireForm::FloatFields
            }
            _ => WireForm::Natural,
        }
    }
}

impl fmt::Display for PortableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_name())
    }
}

// =============================================================================
// FUNCTION SIGNATURE - callback prototypes
// =============================================================================

/// The single invocation signature of a callback type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionSignature {
    /// Name of the callback type as declared
    pub name: Arc<str>,
    pub parameters: Vec<FunctionParam>,
    pub return_type: PortableType,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionParam {
    pub name: Arc<str>,
    pub ty: PortableType,
    pub by_ref: bool,
}

impl FunctionSignature {
    /// True when none of the callback's own parameters or return need marshaling
    pub fn is_self_describing(&self) -> bool {
        !self.return_type.requires_marshaling()
            && self.parameters.iter().all(|p| !p.ty.requires_marshaling())
    }
}

// =============================================================================
// ENUM INFO - metadata carried next to the integer tag
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumInfo {
    pub name: Arc<str>,
    /// Sorted by value
    pub values: Vec<EnumValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub name: Arc<str>,
    pub value: i64,
}

// =============================================================================
// DEFAULT VALUE - literal rendered in the target language
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    Bool(bool),
    /// Absent value, rendered as the target's null literal
    Null,
    /// Numeric, string, or any other literal, kept verbatim
    Verbatim(Arc<str>),
}

impl DefaultValue {
    pub fn literal(&self) -> &str {
        match self {
            DefaultValue::Bool(true) => "true",
            DefaultValue::Bool(false) => "false",
            DefaultValue::Null => "null",
            DefaultValue::Verbatim(text) => text,
        }
    }
}

// =============================================================================
// DESCRIPTORS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    pub name: Arc<str>,
    pub ty: PortableType,
    pub by_ref: bool,
    pub default: Option<DefaultValue>,
    /// Host-language spelling of the type, without the `ref` modifier
    pub host_type: Arc<str>,
    pub enum_info: Option<Arc<EnumInfo>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnDescriptor {
    pub ty: PortableType,
    pub host_type: Arc<str>,
    pub enum_info: Option<Arc<EnumInfo>>,
}

impl ReturnDescriptor {
    pub fn void() -> Self {
        ReturnDescriptor {
            ty: PortableType::Void,
            host_type: Arc::from("void"),
            enum_info: None,
        }
    }
}

// =============================================================================
// CALLABLE SIGNATURE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Export,
    Import,
}

impl Direction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Export => "export",
            Direction::Import => "import",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Symbols generated for an import-direction callable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSymbols {
    /// Managed forwarding entry point, e.g. `Foo`
    pub entry_point_symbol: Arc<str>,
    /// Raw native function-pointer slot, e.g. `__Foo`
    pub raw_pointer_symbol: Arc<str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Export {
        /// Fully-qualified `declaring-type.method`
        func_name: Arc<str>,
    },
    Import(ImportSymbols),
}

/// One level of type nesting around a callable
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeFrame {
    /// Declaration keyword, e.g. `class` or `record struct`
    pub keyword: Arc<str>,
    pub name: Arc<str>,
    pub is_static: bool,
}

impl TypeFrame {
    pub fn class(name: &str) -> Self {
        TypeFrame {
            keyword: Arc::from("class"),
            name: Arc::from(name),
            is_static: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeclaringType {
    pub namespace: Option<Arc<str>>,
    /// Enclosing type path, outermost first, e.g. `Outer.Inner`
    pub name: Arc<str>,
    /// Same path as `name`, one frame per level
    pub frames: Vec<TypeFrame>,
}

impl DeclaringType {
    /// Declaring type made of plain class frames
    pub fn new(namespace: Option<&str>, name: &str) -> Self {
        Self::with_frames(namespace, name.split('.').map(TypeFrame::class).collect())
    }

    pub fn with_frames(namespace: Option<&str>, frames: Vec<TypeFrame>) -> Self {
        let name = frames
            .iter()
            .map(|f| f.name.as_ref())
            .collect::<Vec<_>>()
            .join(".");
        DeclaringType {
            namespace: namespace.filter(|ns| !ns.is_empty()).map(Arc::from),
            name: Arc::from(name),
            frames,
        }
    }

    pub fn qualified(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}.{}", ns, self.name),
            None => self.name.to_string(),
        }
    }

    pub fn member(&self, member: &str) -> String {
        format!("{}.{}", self.qualified(), member)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallableSignature {
    pub module: Arc<str>,
    pub native_symbol: Arc<str>,
    /// Identifier exactly as declared
    pub declared_name: Arc<str>,
    pub declaring_type: DeclaringType,
    pub binding: Binding,
    /// Declared accessibility, re-emitted on implementing shims
    pub accessibility: Option<Arc<str>>,
    pub parameters: SmallVec<[ParameterDescriptor; 4]>,
    pub return_type: ReturnDescriptor,
}

impl CallableSignature {
    pub fn direction(&self) -> Direction {
        match self.binding {
            Binding::Export { .. } => Direction::Export,
            Binding::Import(_) => Direction::Import,
        }
    }

    pub fn import_symbols(&self) -> Option<&ImportSymbols> {
        match &self.binding {
            Binding::Import(symbols) => Some(symbols),
            Binding::Export { .. } => None,
        }
    }

    /// `declaring-type.method` of the declaration
    pub fn qualified_name(&self) -> String {
        match &self.binding {
            Binding::Export { func_name } => func_name.to_string(),
            Binding::Import(_) => self.declaring_type.member(&self.declared_name),
        }
    }
}
