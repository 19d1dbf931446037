//! Signature transformation: scanned declarations into `CallableSignature`s
//!
//! Structural checks run first (annotation, static, generics), then every
//! parameter is classified in declaration order, then the return type.

use crate::classifier::TypeClassifier;
use crate::naming::split_marker;
use crate::source::{AttributeDecl, CallableDecl, Literal, ParamDecl, ParamModifier, SourceType};
use plugify_manifest::{
    Binding, CallableError, CallableSignature, DeclarationError, DeclaringType, DefaultValue,
    ImportSymbols, ParameterDescriptor, ReturnDescriptor, TypeFrame,
};
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_EXPORT_ATTRIBUTE: &str = "NativeExport";
pub const DEFAULT_IMPORT_ATTRIBUTE: &str = "NativeImport";
pub const DEFAULT_IMPORT_MARKER: &str = "___";

/// Prefix the raw native slot gets in front of the shared symbol name
const RAW_SLOT_PREFIX: &str = "__";

/// Which attributes mark a callable and how import identifiers are spelled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationConventions {
    pub export_attribute: String,
    pub import_attribute: String,
    pub import_marker: String,
}

impl Default for AnnotationConventions {
    fn default() -> Self {
        AnnotationConventions {
            export_attribute: DEFAULT_EXPORT_ATTRIBUTE.to_string(),
            import_attribute: DEFAULT_IMPORT_ATTRIBUTE.to_string(),
            import_marker: DEFAULT_IMPORT_MARKER.to_string(),
        }
    }
}

impl AnnotationConventions {
    pub fn from_config(config: &plugify_config::Config) -> Self {
        let defaults = AnnotationConventions::default();
        AnnotationConventions {
            export_attribute: config
                .export_attribute
                .clone()
                .unwrap_or(defaults.export_attribute),
            import_attribute: config
                .import_attribute
                .clone()
                .unwrap_or(defaults.import_attribute),
            import_marker: config
                .import_marker
                .clone()
                .unwrap_or(defaults.import_marker),
        }
    }

    /// Whether any attribute in `attributes` is one of ours
    pub fn is_annotated(&self, attributes: &[AttributeDecl]) -> bool {
        attributes
            .iter()
            .any(|a| a.is(&self.export_attribute) || a.is(&self.import_attribute))
    }
}

pub struct SignatureTransformer {
    classifier: TypeClassifier,
    conventions: AnnotationConventions,
}

impl SignatureTransformer {
    pub fn new(classifier: TypeClassifier, conventions: AnnotationConventions) -> Self {
        SignatureTransformer {
            classifier,
            conventions,
        }
    }

    pub fn classifier(&self) -> &TypeClassifier {
        &self.classifier
    }

    pub fn conventions(&self) -> &AnnotationConventions {
        &self.conventions
    }

    pub fn transform(
        &self,
        module: &str,
        decl: &CallableDecl,
    ) -> Result<CallableSignature, CallableError> {
        let method = decl.qualified_name();
        let exports: Vec<&AttributeDecl> = decl
            .attributes
            .iter()
            .filter(|a| a.is(&self.conventions.export_attribute))
            .collect();
        let imports: Vec<&AttributeDecl> = decl
            .attributes
            .iter()
            .filter(|a| a.is(&self.conventions.import_attribute))
            .collect();

        let (attribute, annotation) = match (exports.as_slice(), imports.as_slice()) {
            ([], []) => return Err(DeclarationError::NotAnnotated { method }.into()),
            ([_, ..], [_, ..]) => {
                return Err(DeclarationError::ConflictingAnnotations { method }.into())
            }
            ([single], []) => (&self.conventions.export_attribute, *single),
            ([], [single]) => (&self.conventions.import_attribute, *single),
            (_, _) => {
                let attribute = if exports.is_empty() {
                    &self.conventions.import_attribute
                } else {
                    &self.conventions.export_attribute
                };
                return Err(DeclarationError::DuplicateAnnotation {
                    method,
                    attribute: attribute.clone(),
                }
                .into());
            }
        };

        if !decl.is_static {
            return Err(DeclarationError::NotStatic {
                method,
                attribute: attribute.clone(),
            }
            .into());
        }
        if !decl.type_parameters.is_empty() {
            return Err(DeclarationError::GenericMethod { method }.into());
        }
        if let Some(generic) = decl.containers.iter().find(|c| !c.type_parameters.is_empty()) {
            return Err(DeclarationError::GenericContainer {
                method,
                container: generic.name.to_string(),
            }
            .into());
        }

        let declaring_type = DeclaringType::with_frames(
            decl.namespace.as_deref(),
            decl.containers
                .iter()
                .map(|c| TypeFrame {
                    keyword: c.keyword.clone(),
                    name: c.name.clone(),
                    is_static: c.is_static,
                })
                .collect(),
        );

        let (native_symbol, binding) = if attribute == &self.conventions.export_attribute {
            let name = export_name(&method, attribute, annotation)?;
            let func_name = Arc::from(declaring_type.member(&decl.name));
            (Arc::from(name), Binding::Export { func_name })
        } else {
            if !annotation.args.is_empty() {
                return Err(DeclarationError::UnexpectedArguments {
                    method,
                    attribute: attribute.clone(),
                }
                .into());
            }
            if !decl.is_partial {
                return Err(DeclarationError::NotPartial { method }.into());
            }
            let Some(symbol) = split_marker(&decl.name, &self.conventions.import_marker) else {
                return Err(DeclarationError::MissingMarker {
                    method,
                    marker: self.conventions.import_marker.clone(),
                }
                .into());
            };
            let symbols = ImportSymbols {
                entry_point_symbol: Arc::from(symbol),
                raw_pointer_symbol: Arc::from(format!("{}{}", RAW_SLOT_PREFIX, symbol)),
            };
            (Arc::from(symbol), Binding::Import(symbols))
        };

        let parameters = decl
            .parameters
            .iter()
            .map(|p| self.transform_parameter(&decl.name, p))
            .collect::<Result<SmallVec<[ParameterDescriptor; 4]>, CallableError>>()?;

        let return_type = if decl.return_type.is_void() {
            ReturnDescriptor::void()
        } else {
            let classified = self
                .classifier
                .classify_full(&decl.return_type)
                .map_err(|e| e.within(format!("return type of `{}`", decl.name)))?;
            ReturnDescriptor {
                ty: classified.ty,
                host_type: Arc::from(host_spelling(&decl.return_type)),
                enum_info: classified.enum_info,
            }
        };

        debug!(
            "Transformed {} `{}` with {} parameter(s)",
            binding_kind(&binding),
            method,
            parameters.len()
        );

        Ok(CallableSignature {
            module: Arc::from(module),
            native_symbol,
            declared_name: decl.name.clone(),
            declaring_type,
            binding,
            accessibility: decl.accessibility.clone(),
            parameters,
            return_type,
        })
    }

    fn transform_parameter(
        &self,
        method: &str,
        param: &ParamDecl,
    ) -> Result<ParameterDescriptor, CallableError> {
        let by_ref = match param.modifier {
            ParamModifier::None => false,
            ParamModifier::Ref => true,
            other => {
                return Err(DeclarationError::UnsupportedModifier {
                    method: method.to_string(),
                    parameter: param.name.to_string(),
                    modifier: other.keyword().unwrap_or_default().to_string(),
                }
                .into())
            }
        };

        let classified = self
            .classifier
            .classify_full(&param.ty)
            .map_err(|e| e.within(format!("parameter `{}` of `{}`", param.name, method)))?;
        if classified.ty.is_void() {
            return Err(plugify_manifest::UnsupportedTypeError::new(
                "void",
                "void is not a valid parameter type",
            )
            .within(format!("parameter `{}` of `{}`", param.name, method))
            .into());
        }

        Ok(ParameterDescriptor {
            name: param.name.clone(),
            ty: classified.ty,
            by_ref,
            default: param.default.as_ref().map(default_value),
            host_type: Arc::from(host_spelling(&param.ty)),
            enum_info: classified.enum_info,
        })
    }
}

fn binding_kind(binding: &Binding) -> &'static str {
    match binding {
        Binding::Export { .. } => "export",
        Binding::Import(_) => "import",
    }
}

fn default_value(literal: &Literal) -> DefaultValue {
    match literal {
        Literal::Bool(value) => DefaultValue::Bool(*value),
        Literal::Null => DefaultValue::Null,
        Literal::Number(text) | Literal::Str(text) | Literal::Expr(text) => {
            DefaultValue::Verbatim(text.clone())
        }
    }
}

/// Read the export name out of the annotation's first argument
fn export_name(method: &str, attribute: &str, annotation: &AttributeDecl) -> Result<String, DeclarationError> {
    let Some(arg) = annotation.args.first() else {
        return Err(DeclarationError::MissingExportName {
            method: method.to_string(),
            attribute: attribute.to_string(),
        });
    };
    let arg = arg.trim();

    let name = if let Some(inner) = arg.strip_prefix("@\"").and_then(|a| a.strip_suffix('"')) {
        inner.replace("\"\"", "\"")
    } else if let Some(inner) = arg.strip_prefix('"').and_then(|a| a.strip_suffix('"')) {
        inner.to_string()
    } else if let Some(inner) = arg.strip_prefix("nameof(").and_then(|a| a.strip_suffix(')')) {
        inner.rsplit('.').next().unwrap_or(inner).trim().to_string()
    } else {
        return Err(DeclarationError::Malformed {
            method: method.to_string(),
            reason: format!("export name `{}` is not a string literal", arg),
        });
    };

    if name.trim().is_empty() {
        return Err(DeclarationError::EmptyExportName {
            method: method.to_string(),
            attribute: attribute.to_string(),
        });
    }
    Ok(name)
}

/// Host spelling used in emitted code; declared types are rooted with `global::`
pub fn host_spelling(ty: &SourceType) -> String {
    match ty {
        SourceType::Delegate(decl) => format!("global::{}", decl.qualified_name),
        SourceType::Enum(decl) => format!("global::{}", decl.qualified_name),
        SourceType::Array(element) => format!("{}[]", host_spelling(element)),
        SourceType::Nullable(inner) => format!("{}?", host_spelling(inner)),
        SourceType::Pointer(inner) => format!("{}*", host_spelling(inner)),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use crate::source::{DelegateDecl, TypeFrameDecl};
    use crate::transformer::*;
    use plugify_manifest::{Direction, PointerWidth, PortableType};

    fn transformer() -> SignatureTransformer {
        SignatureTransformer::new(
            TypeClassifier::new(PointerWidth::Bits64),
            AnnotationConventions::default(),
        )
    }

    fn param(name: &str, ty: &str, modifier: ParamModifier) -> ParamDecl {
        ParamDecl {
            name: Arc::from(name),
            ty: SourceType::named(ty),
            modifier,
            default: None,
        }
    }

    fn callable(name: &str, attributes: Vec<AttributeDecl>, parameters: Vec<ParamDecl>, ret: SourceType) -> CallableDecl {
        CallableDecl {
            name: Arc::from(name),
            namespace: Some(Arc::from("Demo")),
            containers: vec![TypeFrameDecl {
                keyword: Arc::from("class"),
                name: Arc::from("Api"),
                type_parameters: Vec::new(),
                is_static: true,
            }],
            is_static: true,
            is_partial: false,
            accessibility: Some(Arc::from("public")),
            attributes,
            type_parameters: Vec::new(),
            parameters,
            return_type: ret,
            location: None,
        }
    }

    fn export(name: &str) -> AttributeDecl {
        AttributeDecl::new("NativeExport", vec![Arc::from(format!("\"{}\"", name))])
    }

    fn import() -> AttributeDecl {
        AttributeDecl::new("NativeImport", Vec::new())
    }

    fn combine() -> CallableDecl {
        callable(
            "Combine",
            vec![export("Combine")],
            vec![
                param("a", "int", ParamModifier::None),
                param("b", "float", ParamModifier::Ref),
                ParamDecl {
                    name: Arc::from("names"),
                    ty: SourceType::array(SourceType::named("string")),
                    modifier: ParamModifier::None,
                    default: None,
                },
            ],
            SourceType::named("long"),
        )
    }

    #[test]
    fn test_combine_export() {
        let Ok(sig) = transformer().transform("demo", &combine()) else {
            panic!("Combine should transform");
        };
        assert_eq!(sig.direction(), Direction::Export);
        assert_eq!(sig.native_symbol.as_ref(), "Combine");
        assert_eq!(sig.qualified_name(), "Demo.Api.Combine");
        let types: Vec<&PortableType> = sig.parameters.iter().map(|p| &p.ty).collect();
        assert_eq!(
            types,
            vec![
                &PortableType::Int32,
                &PortableType::Float32,
                &PortableType::Array(Box::new(PortableType::String))
            ]
        );
        assert!(sig.parameters[1].by_ref);
        assert_eq!(sig.parameters[2].host_type.as_ref(), "string[]");
        assert_eq!(sig.return_type.ty, PortableType::Int64);
    }

    #[test]
    fn test_import_symbols() {
        let mut decl = callable(
            "___Notify",
            vec![import()],
            vec![param("message", "string", ParamModifier::None)],
            SourceType::named("void"),
        );
        decl.is_partial = true;
        let Ok(sig) = transformer().transform("demo", &decl) else {
            panic!("import should transform");
        };
        let Some(symbols) = sig.import_symbols() else {
            panic!("import symbols expected");
        };
        assert_eq!(symbols.entry_point_symbol.as_ref(), "Notify");
        assert_eq!(symbols.raw_pointer_symbol.as_ref(), "__Notify");
        assert_eq!(sig.native_symbol.as_ref(), "Notify");
        assert!(sig.return_type.ty.is_void());
    }

    #[test]
    fn test_structural_errors() {
        let t = transformer();

        let mut not_static = combine();
        not_static.is_static = false;
        assert!(matches!(
            t.transform("demo", &not_static),
            Err(CallableError::Declaration(DeclarationError::NotStatic { .. }))
        ));

        let missing = callable("Run", vec![AttributeDecl::new("NativeExport", Vec::new())], vec![], SourceType::named("void"));
        assert!(matches!(
            t.transform("demo", &missing),
            Err(CallableError::Declaration(DeclarationError::MissingExportName { .. }))
        ));

        let empty = callable("Run", vec![export("")], vec![], SourceType::named("void"));
        assert!(matches!(
            t.transform("demo", &empty),
            Err(CallableError::Declaration(DeclarationError::EmptyExportName { .. }))
        ));

        let twice = callable("Run", vec![export("A"), export("B")], vec![], SourceType::named("void"));
        assert!(matches!(
            t.transform("demo", &twice),
            Err(CallableError::Declaration(DeclarationError::DuplicateAnnotation { .. }))
        ));

        let both = callable("Run", vec![export("A"), import()], vec![], SourceType::named("void"));
        assert!(matches!(
            t.transform("demo", &both),
            Err(CallableError::Declaration(DeclarationError::ConflictingAnnotations { .. }))
        ));

        let mut unmarked = callable("Notify", vec![import()], vec![], SourceType::named("void"));
        unmarked.is_partial = true;
        assert!(matches!(
            t.transform("demo", &unmarked),
            Err(CallableError::Declaration(DeclarationError::MissingMarker { .. }))
        ));

        let mut generic = combine();
        generic.type_parameters = vec![Arc::from("T")];
        assert!(matches!(
            t.transform("demo", &generic),
            Err(CallableError::Declaration(DeclarationError::GenericMethod { .. }))
        ));
    }

    #[test]
    fn test_parameter_errors_name_the_parameter() {
        let t = transformer();
        let outp = callable("Run", vec![export("Run")], vec![param("x", "int", ParamModifier::Out)], SourceType::named("void"));
        assert!(matches!(
            t.transform("demo", &outp),
            Err(CallableError::Declaration(DeclarationError::UnsupportedModifier { .. }))
        ));

        let jagged = callable(
            "Fill",
            vec![export("Fill")],
            vec![ParamDecl {
                name: Arc::from("grid"),
                ty: SourceType::array(SourceType::array(SourceType::named("int"))),
                modifier: ParamModifier::None,
                default: None,
            }],
            SourceType::named("void"),
        );
        let Err(CallableError::UnsupportedType(err)) = t.transform("demo", &jagged) else {
            panic!("jagged array must be an unsupported type");
        };
        assert_eq!(err.context.as_deref(), Some("parameter `grid` of `Fill`"));
    }

    #[test]
    fn test_export_name_forms() {
        let t = transformer();
        let nameof = callable(
            "Run",
            vec![AttributeDecl::new("NativeExport", vec![Arc::from("nameof(Api.Run)")])],
            vec![],
            SourceType::named("void"),
        );
        assert!(t.transform("demo", &nameof).is_ok_and(|s| s.native_symbol.as_ref() == "Run"));

        let expr = callable(
            "Run",
            vec![AttributeDecl::new("NativeExport", vec![Arc::from("Prefix + \"Run\"")])],
            vec![],
            SourceType::named("void"),
        );
        assert!(matches!(
            t.transform("demo", &expr),
            Err(CallableError::Declaration(DeclarationError::Malformed { .. }))
        ));
    }

    #[test]
    fn test_defaults_and_host_spelling() {
        let mut flag = param("flag", "bool", ParamModifier::None);
        flag.default = Some(Literal::Bool(true));
        let mut label = param("label", "string", ParamModifier::None);
        label.default = Some(Literal::Null);
        let mut scale = param("scale", "float", ParamModifier::None);
        scale.default = Some(Literal::Number(Arc::from("0.5f")));
        let cb = ParamDecl {
            name: Arc::from("cb"),
            ty: SourceType::Delegate(Arc::new(DelegateDecl {
                name: Arc::from("OnTick"),
                qualified_name: Arc::from("Demo.OnTick"),
                parameters: Vec::new(),
                return_type: SourceType::named("void"),
            })),
            modifier: ParamModifier::None,
            default: None,
        };

        let decl = callable("Tick", vec![export("Tick")], vec![flag, label, scale, cb], SourceType::named("void"));
        let Ok(sig) = transformer().transform("demo", &decl) else {
            panic!("Tick should transform");
        };
        let defaults: Vec<Option<&str>> = sig
            .parameters
            .iter()
            .map(|p| p.default.as_ref().map(DefaultValue::literal))
            .collect();
        assert_eq!(defaults, vec![Some("true"), Some("null"), Some("0.5f"), None]);
        assert_eq!(sig.parameters[3].host_type.as_ref(), "global::Demo.OnTick");
    }
}
