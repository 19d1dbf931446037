//! Type classification: C# source types onto the closed portable taxonomy
//!
//! `classify` is total: every input yields a portable type or an
//! `UnsupportedTypeError`. `render_source` goes the other way and produces a
//! canonical spelling that classifies back to the same tag.

use crate::source::{DelegateDecl, ParamDecl, ParamModifier, SourceType};
use plugify_manifest::{
    EnumInfo, EnumValue, FunctionParam, FunctionSignature, PointerWidth, PortableType,
    UnsupportedTypeError,
};
use std::sync::Arc;

/// Callback signatures nest; anything deeper than this is treated as runaway
const MAX_DEPTH: usize = 16;

/// Result of classifying one source type
#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub ty: PortableType,
    /// Present for enums and arrays of enums
    pub enum_info: Option<Arc<EnumInfo>>,
}

impl Classified {
    fn plain(ty: PortableType) -> Self {
        Classified {
            ty,
            enum_info: None,
        }
    }
}

const SYSTEM: &str = "System";
const NUMERICS: &str = "System.Numerics";
const PLUGIFY: &str = "Plugify";

/// Keyword, simple or qualified name lookup; `None` for anything outside the taxonomy
///
/// Each simple name belongs to exactly one namespace. Keywords have none and
/// are never qualified.
fn lookup_name(name: &str, width: PointerWidth) -> Option<PortableType> {
    let (namespace, simple) = match name.rsplit_once('.') {
        Some((namespace, simple)) => (Some(namespace), simple),
        None => (None, name),
    };
    let (home, ty) = match simple {
        "void" => (None, PortableType::Void),
        "bool" => (None, PortableType::Bool),
        "char" => (None, PortableType::Char16),
        "sbyte" => (None, PortableType::Int8),
        "short" => (None, PortableType::Int16),
        "int" => (None, PortableType::Int32),
        "long" => (None, PortableType::Int64),
        "byte" => (None, PortableType::UInt8),
        "ushort" => (None, PortableType::UInt16),
        "uint" => (None, PortableType::UInt32),
        "ulong" => (None, PortableType::UInt64),
        "nint" | "nuint" => (None, width.pointer_type()),
        "float" => (None, PortableType::Float32),
        "double" => (None, PortableType::Float64),
        "string" => (None, PortableType::String),
        "object" => (None, PortableType::Any),
        "Void" => (Some(SYSTEM), PortableType::Void),
        "Boolean" => (Some(SYSTEM), PortableType::Bool),
        "Char" => (Some(SYSTEM), PortableType::Char16),
        "SByte" => (Some(SYSTEM), PortableType::Int8),
        "Int16" => (Some(SYSTEM), PortableType::Int16),
        "Int32" => (Some(SYSTEM), PortableType::Int32),
        "Int64" => (Some(SYSTEM), PortableType::Int64),
        "Byte" => (Some(SYSTEM), PortableType::UInt8),
        "UInt16" => (Some(SYSTEM), PortableType::UInt16),
        "UInt32" => (Some(SYSTEM), PortableType::UInt32),
        "UInt64" => (Some(SYSTEM), PortableType::UInt64),
        "IntPtr" | "UIntPtr" => (Some(SYSTEM), width.pointer_type()),
        "Single" => (Some(SYSTEM), PortableType::Float32),
        "Double" => (Some(SYSTEM), PortableType::Float64),
        "String" => (Some(SYSTEM), PortableType::String),
        "Object" => (Some(SYSTEM), PortableType::Any),
        "Vector2" => (Some(NUMERICS), PortableType::Vec2),
        "Vector3" => (Some(NUMERICS), PortableType::Vec3),
        "Vector4" => (Some(NUMERICS), PortableType::Vec4),
        "Matrix4x4" => (Some(NUMERICS), PortableType::Mat4x4),
        "Bool8" => (Some(PLUGIFY), PortableType::Bool),
        "Char8" => (Some(PLUGIFY), PortableType::Char8),
        "Char16" => (Some(PLUGIFY), PortableType::Char16),
        _ => return None,
    };
    match (namespace, home) {
        (None, _) => Some(ty),
        (Some(namespace), Some(home)) if namespace == home => Some(ty),
        _ => None,
    }
}

/// Whether `name` is one of the built-in portable names
pub fn is_builtin_name(name: &str) -> bool {
    lookup_name(name, PointerWidth::Bits64).is_some()
}

fn is_reference_like(ty: &PortableType) -> bool {
    matches!(
        ty,
        PortableType::String | PortableType::Any | PortableType::Array(_) | PortableType::Function(_)
    )
}

pub struct TypeClassifier {
    width: PointerWidth,
}

impl TypeClassifier {
    pub fn new(width: PointerWidth) -> Self {
        TypeClassifier { width }
    }

    pub fn pointer_width(&self) -> PointerWidth {
        self.width
    }

    pub fn classify(&self, source: &SourceType) -> Result<PortableType, UnsupportedTypeError> {
        self.classify_full(source).map(|c| c.ty)
    }

    /// Classify and keep enum metadata alongside the tag
    pub fn classify_full(&self, source: &SourceType) -> Result<Classified, UnsupportedTypeError> {
        self.classify_at(source, 0)
    }

    fn classify_at(&self, source: &SourceType, depth: usize) -> Result<Classified, UnsupportedTypeError> {
        if depth > MAX_DEPTH {
            return Err(UnsupportedTypeError::new(
                source.to_string(),
                "type nesting is too deep",
            ));
        }

        match source {
            SourceType::Named(name) => lookup_name(name, self.width)
                .map(Classified::plain)
                .ok_or_else(|| {
                    UnsupportedTypeError::new(name.as_ref(), "not a portable type")
                }),

            SourceType::Array(element) => {
                let inner = self.classify_at(element, depth + 1)?;
                match inner.ty {
                    PortableType::Void => Err(UnsupportedTypeError::new(
                        source.to_string(),
                        "void is not a valid array element",
                    )),
                    PortableType::Array(_) => Err(UnsupportedTypeError::new(
                        source.to_string(),
                        "arrays of arrays are not supported",
                    )),
                    PortableType::Function(_) => Err(UnsupportedTypeError::new(
                        source.to_string(),
                        "arrays of callbacks are not supported",
                    )),
                    ty => Ok(Classified {
                        ty: PortableType::Array(Box::new(ty)),
                        enum_info: inner.enum_info,
                    }),
                }
            }

            SourceType::MultiArray(..) => Err(UnsupportedTypeError::new(
                source.to_string(),
                "multi-dimensional arrays are not supported",
            )),

            SourceType::Pointer(inner) => match inner.as_ref() {
                SourceType::Pointer(_) => Err(UnsupportedTypeError::new(
                    source.to_string(),
                    "pointers to pointers are not supported",
                )),
                _ => Ok(Classified::plain(self.width.pointer_type())),
            },

            SourceType::Nullable(inner) => {
                let classified = self.classify_at(inner, depth + 1)?;
                if is_reference_like(&classified.ty) {
                    Ok(classified)
                } else {
                    Err(UnsupportedTypeError::new(
                        source.to_string(),
                        "nullable value types are not supported",
                    ))
                }
            }

            SourceType::Generic { .. } => Err(UnsupportedTypeError::new(
                source.to_string(),
                "generic types are not supported",
            )),

            SourceType::Tuple(_) => Err(UnsupportedTypeError::new(
                source.to_string(),
                "tuples are not supported",
            )),

            SourceType::TypeParameter(name) => Err(UnsupportedTypeError::new(
                name.as_ref(),
                "open generic type parameters are not supported",
            )),

            SourceType::Delegate(decl) => self
                .classify_delegate(decl, depth)
                .map(|sig| Classified::plain(PortableType::Function(Arc::new(sig)))),

            SourceType::Enum(decl) => {
                if let Some(reason) = &decl.error {
                    return Err(UnsupportedTypeError::new(decl.qualified_name.as_ref(), reason.as_str()));
                }
                let underlying = self.classify_at(&decl.underlying, depth + 1)?;
                if !is_integral(&underlying.ty) {
                    return Err(UnsupportedTypeError::new(
                        decl.qualified_name.as_ref(),
                        "enum underlying type must be integral",
                    ));
                }
                let mut values: Vec<EnumValue> = decl
                    .members
                    .iter()
                    .map(|m| EnumValue {
                        name: m.name.clone(),
                        value: m.value,
                    })
                    .collect();
                values.sort_by_key(|v| v.value);
                Ok(Classified {
                    ty: underlying.ty,
                    enum_info: Some(Arc::new(EnumInfo {
                        name: decl.name.clone(),
                        values,
                    })),
                })
            }
        }
    }

    fn classify_delegate(
        &self,
        decl: &DelegateDecl,
        depth: usize,
    ) -> Result<FunctionSignature, UnsupportedTypeError> {
        let context = format!("callback `{}`", decl.qualified_name);
        let parameters = decl
            .parameters
            .iter()
            .map(|p| self.classify_delegate_param(p, depth).map_err(|e| e.within(context.as_str())))
            .collect::<Result<Vec<_>, _>>()?;
        let return_type = self
            .classify_at(&decl.return_type, depth + 1)
            .map_err(|e| e.within(format!("return type of {}", context)))?
            .ty;
        Ok(FunctionSignature {
            name: decl.name.clone(),
            parameters,
            return_type,
        })
    }

    fn classify_delegate_param(
        &self,
        param: &ParamDecl,
        depth: usize,
    ) -> Result<FunctionParam, UnsupportedTypeError> {
        let by_ref = match param.modifier {
            ParamModifier::None => false,
            ParamModifier::Ref => true,
            other => {
                return Err(UnsupportedTypeError::new(
                    param.ty.to_string(),
                    format!(
                        "`{}` parameters are not supported",
                        other.keyword().unwrap_or_default()
                    ),
                ))
            }
        };
        let ty = self.classify_at(&param.ty, depth + 1)?.ty;
        if ty.is_void() {
            return Err(UnsupportedTypeError::new("void", "void is not a valid parameter type"));
        }
        Ok(FunctionParam {
            name: param.name.clone(),
            ty,
            by_ref,
        })
    }
}

fn is_integral(ty: &PortableType) -> bool {
    matches!(
        ty,
        PortableType::Int8
            | PortableType::Int16
            | PortableType::Int32
            | PortableType::Int64
            | PortableType::UInt8
            | PortableType::UInt16
            | PortableType::UInt32
            | PortableType::UInt64
    )
}

/// Canonical C# spelling of a portable type
pub fn render_source(ty: &PortableType) -> SourceType {
    let name = match ty {
        PortableType::Void => "void",
        PortableType::Bool => "bool",
        PortableType::Char8 => "Plugify.Char8",
        PortableType::Char16 => "char",
        PortableType::Int8 => "sbyte",
        PortableType::Int16 => "short",
        PortableType::Int32 => "int",
        PortableType::Int64 => "long",
        PortableType::UInt8 => "byte",
        PortableType::UInt16 => "ushort",
        PortableType::UInt32 => "uint",
        PortableType::UInt64 => "ulong",
        PortableType::Ptr32 | PortableType::Ptr64 => "nint",
        PortableType::Float32 => "float",
        PortableType::Float64 => "double",
        PortableType::String => "string",
        PortableType::Any => "object",
        PortableType::Vec2 => "System.Numerics.Vector2",
        PortableType::Vec3 => "System.Numerics.Vector3",
        PortableType::Vec4 => "System.Numerics.Vector4",
        PortableType::Mat4x4 => "System.Numerics.Matrix4x4",
        PortableType::Array(element) => return SourceType::array(render_source(element)),
        PortableType::Function(signature) => {
            return SourceType::Delegate(Arc::new(DelegateDecl {
                name: signature.name.clone(),
                qualified_name: signature.name.clone(),
                parameters: signature
                    .parameters
                    .iter()
                    .map(|p| ParamDecl {
                        name: p.name.clone(),
                        ty: render_source(&p.ty),
                        modifier: if p.by_ref {
                            ParamModifier::Ref
                        } else {
                            ParamModifier::None
                        },
                        default: None,
                    })
                    .collect(),
                return_type: render_source(&signature.return_type),
            }))
        }
    };
    SourceType::named(name)
}

#[cfg(test)]
mod tests {
    use crate::classifier::*;
    use crate::source::{EnumDecl, EnumMember};

    fn classifier() -> TypeClassifier {
        TypeClassifier::new(PointerWidth::Bits64)
    }

    fn callback(name: &str, params: Vec<(&str, SourceType)>, ret: SourceType) -> SourceType {
        SourceType::Delegate(Arc::new(DelegateDecl {
            name: Arc::from(name),
            qualified_name: Arc::from(format!("Demo.{}", name)),
            parameters: params
                .into_iter()
                .map(|(n, ty)| ParamDecl {
                    name: Arc::from(n),
                    ty,
                    modifier: ParamModifier::None,
                    default: None,
                })
                .collect(),
            return_type: ret,
        }))
    }

    fn every_variant() -> Vec<PortableType> {
        let leaves = vec![
            PortableType::Void,
            PortableType::Bool,
            PortableType::Char8,
            PortableType::Char16,
            PortableType::Int8,
            PortableType::Int16,
            PortableType::Int32,
            PortableType::Int64,
            PortableType::UInt8,
            PortableType::UInt16,
            PortableType::UInt32,
            PortableType::UInt64,
            PortableType::Ptr64,
            PortableType::Float32,
            PortableType::Float64,
            PortableType::String,
            PortableType::Any,
            PortableType::Vec2,
            PortableType::Vec3,
            PortableType::Vec4,
            PortableType::Mat4x4,
        ];
        let mut all = leaves.clone();
        all.push(PortableType::Array(Box::new(PortableType::String)));
        all.push(PortableType::Array(Box::new(PortableType::Mat4x4)));
        all.push(PortableType::Function(Arc::new(FunctionSignature {
            name: Arc::from("OnEvent"),
            parameters: vec![
                FunctionParam {
                    name: Arc::from("code"),
                    ty: PortableType::Int32,
                    by_ref: true,
                },
                FunctionParam {
                    name: Arc::from("tags"),
                    ty: PortableType::Array(Box::new(PortableType::String)),
                    by_ref: false,
                },
            ],
            return_type: PortableType::Bool,
        })));
        all
    }

    #[test]
    fn test_render_classify_round_trip() {
        let classifier = classifier();
        for ty in every_variant() {
            let rendered = render_source(&ty);
            let back = classifier.classify(&rendered);
            assert_eq!(back.as_ref(), Ok(&ty), "round trip failed for {}", ty);
        }
    }

    #[test]
    fn test_pointer_width_is_fixed_per_classifier() {
        let narrow = TypeClassifier::new(PointerWidth::Bits32);
        assert_eq!(narrow.classify(&SourceType::named("nint")), Ok(PortableType::Ptr32));
        assert_eq!(
            narrow.classify(&render_source(&PortableType::Ptr32)),
            Ok(PortableType::Ptr32)
        );
        assert_eq!(
            classifier().classify(&SourceType::Pointer(Box::new(SourceType::named("void")))),
            Ok(PortableType::Ptr64)
        );
    }

    #[test]
    fn test_qualified_names() {
        let c = classifier();
        assert_eq!(c.classify(&SourceType::named("System.Int32")), Ok(PortableType::Int32));
        assert_eq!(c.classify(&SourceType::named("Plugify.Bool8")), Ok(PortableType::Bool));
        assert_eq!(
            c.classify(&SourceType::named("System.Numerics.Matrix4x4")),
            Ok(PortableType::Mat4x4)
        );
        assert!(c.classify(&SourceType::named("System.int")).is_err());
        assert!(c.classify(&SourceType::named("Other.Vector3")).is_err());
        assert!(c.classify(&SourceType::named("Plugify.Int32")).is_err());
        assert!(c.classify(&SourceType::named("System.Vector3")).is_err());
        assert!(c.classify(&SourceType::named("System.Numerics.Int32")).is_err());
        assert!(c.classify(&SourceType::named("System.Char8")).is_err());
        assert_eq!(c.classify(&SourceType::named("Plugify.Char16")), Ok(PortableType::Char16));
        assert_eq!(c.classify(&SourceType::named("System.IntPtr")), Ok(PortableType::Ptr64));
        assert!(c.classify(&SourceType::named("Widget")).is_err());
    }

    #[test]
    fn test_rejections() {
        let c = classifier();
        let jagged = SourceType::array(SourceType::array(SourceType::named("int")));
        let Err(err) = c.classify(&jagged) else {
            panic!("jagged arrays must be rejected");
        };
        assert!(err.reason.contains("arrays of arrays"));

        assert!(c.classify(&SourceType::array(SourceType::named("void"))).is_err());
        assert!(c
            .classify(&SourceType::Pointer(Box::new(SourceType::Pointer(Box::new(
                SourceType::named("byte")
            )))))
            .is_err());
        assert!(c
            .classify(&SourceType::Nullable(Box::new(SourceType::named("int"))))
            .is_err());
        assert!(c
            .classify(&SourceType::Generic {
                name: Arc::from("List"),
                args: vec![SourceType::named("int")],
            })
            .is_err());
        assert!(c.classify(&SourceType::TypeParameter(Arc::from("T"))).is_err());
        let cb = callback("Cb", vec![], SourceType::named("void"));
        assert!(c.classify(&SourceType::array(cb)).is_err());
    }

    #[test]
    fn test_nullable_reference_types() {
        let c = classifier();
        assert_eq!(
            c.classify(&SourceType::Nullable(Box::new(SourceType::named("string")))),
            Ok(PortableType::String)
        );
        assert_eq!(
            c.classify(&SourceType::Nullable(Box::new(SourceType::array(
                SourceType::named("object")
            )))),
            Ok(PortableType::Array(Box::new(PortableType::Any)))
        );
    }

    #[test]
    fn test_callback_self_description() {
        let c = classifier();
        let plain = callback("Plain", vec![("x", SourceType::named("int"))], SourceType::named("void"));
        let Ok(ty) = c.classify(&plain) else {
            panic!("callback should classify");
        };
        assert!(!ty.requires_marshaling());

        let marshaled = callback("Named", vec![("name", SourceType::named("string"))], SourceType::named("void"));
        let Ok(ty) = c.classify(&marshaled) else {
            panic!("callback should classify");
        };
        assert!(ty.requires_marshaling());

        let bad = callback("Bad", vec![("v", SourceType::named("void"))], SourceType::named("void"));
        let Err(err) = c.classify(&bad) else {
            panic!("void parameter must be rejected");
        };
        assert_eq!(err.context.as_deref(), Some("callback `Demo.Bad`"));
    }

    #[test]
    fn test_enum_classification() {
        let decl = EnumDecl {
            name: Arc::from("Mode"),
            qualified_name: Arc::from("Demo.Mode"),
            underlying: SourceType::named("ushort"),
            members: vec![
                EnumMember {
                    name: Arc::from("High"),
                    value: 10,
                },
                EnumMember {
                    name: Arc::from("Low"),
                    value: 1,
                },
            ],
            error: None,
        };
        let enum_ty = SourceType::Enum(Arc::new(decl));
        let Ok(classified) = classifier().classify_full(&SourceType::array(enum_ty)) else {
            panic!("enum array should classify");
        };
        assert_eq!(classified.ty, PortableType::Array(Box::new(PortableType::UInt16)));
        let Some(info) = classified.enum_info else {
            panic!("enum info should be carried");
        };
        let names: Vec<&str> = info.values.iter().map(|v| v.name.as_ref()).collect();
        assert_eq!(names, vec!["Low", "High"]);
    }
}
