//! Plugin manifest document - the shape a native host loads
//!
//! Field order of every struct below is the serialized key order, so the
//! declaration order here is part of the external contract.

use crate::errors::ManifestError;
use crate::types::{
    CallableSignature, DefaultValue, EnumInfo, FunctionSignature, ParameterDescriptor,
    PortableType, ReturnDescriptor,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// File extension of manifest documents
pub const MANIFEST_EXTENSION: &str = "pplugin";

pub const DEFAULT_SCHEMA: &str =
    "https://raw.githubusercontent.com/untrustedmodders/plugify/refs/heads/main/schemas/plugin.schema.json";

/// Language module the host uses to load managed plugins
pub const DEFAULT_LANGUAGE: &str = "dotnet";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Arc<str>>,
    pub name: Arc<str>,
    pub version: Arc<str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Arc<str>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Arc<str>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<Arc<str>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<Arc<str>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<Arc<str>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Arc<str>>,
    #[serde(default)]
    pub methods: Vec<ManifestMethod>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestMethod {
    pub name: Arc<str>,
    pub func_name: Arc<str>,
    pub param_types: Vec<ManifestParam>,
    pub ret_type: ManifestReturn,
}

/// Serialized as the literal string `"ref"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefMarker {
    #[serde(rename = "ref")]
    Ref,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestParam {
    #[serde(rename = "type")]
    pub ty: Arc<str>,
    pub name: Arc<str>,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub by_ref: Option<RefMarker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Arc<str>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prototype: Option<Box<Prototype>>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_info: Option<ManifestEnum>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestReturn {
    #[serde(rename = "type")]
    pub ty: Arc<str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prototype: Option<Box<Prototype>>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_info: Option<ManifestEnum>,
}

/// Nested signature of a function-typed parameter or return
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prototype {
    pub name: Arc<str>,
    pub param_types: Vec<ManifestParam>,
    pub ret_type: ManifestReturn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEnum {
    pub name: Arc<str>,
    pub values: Vec<ManifestEnumValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEnumValue {
    pub name: Arc<str>,
    pub value: i64,
}

/// Optional document-level fields, each omitted when absent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestMetadata {
    pub schema: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub website: Option<String>,
    pub license: Option<String>,
    pub entry: Option<String>,
    pub language: Option<String>,
}

impl ManifestMetadata {
    /// Lowest-precedence layer: schema, language and `<assembly>.dll` entry
    pub fn defaults_for(assembly: &str) -> Self {
        ManifestMetadata {
            schema: Some(DEFAULT_SCHEMA.to_string()),
            entry: Some(format!("{}.dll", assembly)),
            language: Some(DEFAULT_LANGUAGE.to_string()),
            ..ManifestMetadata::default()
        }
    }

    /// Fill every field that is still empty from `fallback`
    pub fn or(self, fallback: ManifestMetadata) -> Self {
        ManifestMetadata {
            schema: self.schema.or(fallback.schema),
            description: self.description.or(fallback.description),
            author: self.author.or(fallback.author),
            website: self.website.or(fallback.website),
            license: self.license.or(fallback.license),
            entry: self.entry.or(fallback.entry),
            language: self.language.or(fallback.language),
        }
    }
}

fn opt_arc(value: Option<String>) -> Option<Arc<str>> {
    value.filter(|v| !v.is_empty()).map(Arc::from)
}

impl PluginManifest {
    pub fn new(name: &str, version: &str, metadata: ManifestMetadata) -> Self {
        PluginManifest {
            schema: opt_arc(metadata.schema),
            name: Arc::from(name),
            version: Arc::from(version),
            description: opt_arc(metadata.description),
            author: opt_arc(metadata.author),
            website: opt_arc(metadata.website),
            license: opt_arc(metadata.license),
            entry: opt_arc(metadata.entry),
            language: opt_arc(metadata.language),
            methods: Vec::new(),
        }
    }

    /// A manifest with no methods; valid for library-only modules
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// `<name>.pplugin`
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, MANIFEST_EXTENSION)
    }

    pub fn method(&self, name: &str) -> Option<&ManifestMethod> {
        self.methods.iter().find(|m| m.name.as_ref() == name)
    }

    /// Two-space indented JSON with a trailing newline
    pub fn to_document(&self) -> Result<String, ManifestError> {
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        Ok(content)
    }

    pub fn from_document(content: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(content)?)
    }
}

// =============================================================================
// PROJECTION - CallableSignature -> manifest entry
// =============================================================================

impl ManifestMethod {
    /// Project an export-direction signature; imports have no manifest entry
    pub fn from_signature(signature: &CallableSignature) -> Option<Self> {
        let crate::types::Binding::Export { func_name } = &signature.binding else {
            return None;
        };

        Some(ManifestMethod {
            name: signature.native_symbol.clone(),
            func_name: func_name.clone(),
            param_types: signature
                .parameters
                .iter()
                .map(ManifestParam::from_descriptor)
                .collect(),
            ret_type: ManifestReturn::from_descriptor(&signature.return_type),
        })
    }
}

impl ManifestParam {
    pub fn from_descriptor(param: &ParameterDescriptor) -> Self {
        ManifestParam {
            ty: Arc::from(param.ty.type_name()),
            name: param.name.clone(),
            by_ref: param.by_ref.then_some(RefMarker::Ref),
            default: param.default.as_ref().map(|d: &DefaultValue| Arc::from(d.literal())),
            prototype: prototype_of(&param.ty),
            enum_info: param.enum_info.as_deref().map(ManifestEnum::from_info),
        }
    }
}

impl ManifestReturn {
    pub fn from_descriptor(ret: &ReturnDescriptor) -> Self {
        ManifestReturn {
            ty: Arc::from(ret.ty.type_name()),
            prototype: prototype_of(&ret.ty),
            enum_info: ret.enum_info.as_deref().map(ManifestEnum::from_info),
        }
    }

    fn of_type(ty: &PortableType) -> Self {
        ManifestReturn {
            ty: Arc::from(ty.type_name()),
            prototype: prototype_of(ty),
            enum_info: None,
        }
    }
}

impl Prototype {
    pub fn from_function(signature: &FunctionSignature) -> Self {
        Prototype {
            name: signature.name.clone(),
            param_types: signature
                .parameters
                .iter()
                .map(|p| ManifestParam {
                    ty: Arc::from(p.ty.type_name()),
                    name: p.name.clone(),
                    by_ref: p.by_ref.then_some(RefMarker::Ref),
                    default: None,
                    prototype: prototype_of(&p.ty),
                    enum_info: None,
                })
                .collect(),
            ret_type: ManifestReturn::of_type(&signature.return_type),
        }
    }
}

fn prototype_of(ty: &PortableType) -> Option<Box<Prototype>> {
    ty.as_function()
        .map(|signature| Box::new(Prototype::from_function(signature)))
}

impl ManifestEnum {
    pub fn from_info(info: &EnumInfo) -> Self {
        ManifestEnum {
            name: info.name.clone(),
            values: info
                .values
                .iter()
                .map(|v| ManifestEnumValue {
                    name: v.name.clone(),
                    value: v.value,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::manifest::*;
    use crate::types::{Binding, DeclaringType, EnumValue, FunctionParam};
    use smallvec::smallvec;

    fn param(name: &str, ty: PortableType, by_ref: bool) -> ParameterDescriptor {
        ParameterDescriptor {
            name: Arc::from(name),
            host_type: Arc::from(ty.type_name()),
            ty,
            by_ref,
            default: None,
            enum_info: None,
        }
    }

    fn combine() -> CallableSignature {
        CallableSignature {
            module: Arc::from("demo"),
            native_symbol: Arc::from("Combine"),
            declared_name: Arc::from("Combine"),
            declaring_type: DeclaringType::new(Some("Demo"), "Api"),
            binding: Binding::Export {
                func_name: Arc::from("Demo.Api.Combine"),
            },
            accessibility: Some(Arc::from("public")),
            parameters: smallvec![
                param("a", PortableType::Int32, false),
                param("b", PortableType::Float32, true),
                param(
                    "names",
                    PortableType::Array(Box::new(PortableType::String)),
                    false
                ),
            ],
            return_type: ReturnDescriptor {
                ty: PortableType::Int64,
                host_type: Arc::from("long"),
                enum_info: None,
            },
        }
    }

    #[test]
    fn test_combine_projection_document() {
        let Some(method) = ManifestMethod::from_signature(&combine()) else {
            panic!("export should project");
        };
        let Ok(json) = serde_json::to_string(&method) else {
            panic!("serialization failed");
        };
        assert_eq!(
            json,
            r#"{"name":"Combine","funcName":"Demo.Api.Combine","paramTypes":[{"type":"int32","name":"a"},{"type":"float","name":"b","ref":"ref"},{"type":"string[]","name":"names"}],"retType":{"type":"int64"}}"#
        );
    }

    #[test]
    fn test_import_has_no_projection() {
        let mut sig = combine();
        sig.binding = Binding::Import(crate::types::ImportSymbols {
            entry_point_symbol: Arc::from("Combine"),
            raw_pointer_symbol: Arc::from("__Combine"),
        });
        assert!(ManifestMethod::from_signature(&sig).is_none());
    }

    #[test]
    fn test_metadata_order_and_omission() {
        let manifest = PluginManifest::new(
            "demo",
            "1.2.3",
            ManifestMetadata {
                schema: Some("https://example.org/schema.json".to_string()),
                author: Some("Demo Co".to_string()),
                description: Some(String::new()),
                ..Default::default()
            },
        );
        let Ok(doc) = manifest.to_document() else {
            panic!("serialization failed");
        };
        assert!(doc.ends_with("}\n"));
        assert!(!doc.contains("description"));
        assert!(!doc.contains("null"));
        let schema = doc.find("$schema").unwrap_or(usize::MAX);
        let name = doc.find("\"name\"").unwrap_or(usize::MAX);
        let author = doc.find("\"author\"").unwrap_or(usize::MAX);
        let methods = doc.find("\"methods\"").unwrap_or(usize::MAX);
        assert!(schema < name && name < author && author < methods);
    }

    #[test]
    fn test_callback_prototype_and_enum() {
        let cb = PortableType::Function(Arc::new(FunctionSignature {
            name: Arc::from("OnTick"),
            parameters: vec![FunctionParam {
                name: Arc::from("dt"),
                ty: PortableType::Float64,
                by_ref: false,
            }],
            return_type: PortableType::Void,
        }));
        let mut sig = combine();
        sig.parameters = smallvec![param("tick", cb, false)];
        sig.return_type = ReturnDescriptor {
            ty: PortableType::Int32,
            host_type: Arc::from("Status"),
            enum_info: Some(Arc::new(EnumInfo {
                name: Arc::from("Status"),
                values: vec![
                    EnumValue {
                        name: Arc::from("Ok"),
                        value: 0,
                    },
                    EnumValue {
                        name: Arc::from("Failed"),
                        value: 1,
                    },
                ],
            })),
        };

        let Some(method) = ManifestMethod::from_signature(&sig) else {
            panic!("export should project");
        };
        let Some(proto) = method.param_types[0].prototype.as_deref() else {
            panic!("function parameter needs a prototype");
        };
        assert_eq!(proto.name.as_ref(), "OnTick");
        assert_eq!(proto.param_types[0].ty.as_ref(), "double");
        assert_eq!(proto.ret_type.ty.as_ref(), "void");
        let Some(info) = method.ret_type.enum_info.as_ref() else {
            panic!("enum metadata expected");
        };
        assert_eq!(info.values.len(), 2);
    }

    #[test]
    fn test_defaults_fill_only_missing_fields() {
        let configured = ManifestMetadata {
            language: Some("csharp".to_string()),
            ..ManifestMetadata::default()
        };
        let metadata = configured.or(ManifestMetadata::defaults_for("DemoPlugin"));
        assert_eq!(metadata.language.as_deref(), Some("csharp"));
        assert_eq!(metadata.entry.as_deref(), Some("DemoPlugin.dll"));
        assert_eq!(metadata.schema.as_deref(), Some(DEFAULT_SCHEMA));
        assert_eq!(metadata.author, None);
    }

    #[test]
    fn test_document_round_trip() {
        let mut manifest = PluginManifest::new("demo", "0.1.0", ManifestMetadata::default());
        if let Some(method) = ManifestMethod::from_signature(&combine()) {
            manifest.methods.push(method);
        }
        let Ok(document) = manifest.to_document() else {
            panic!("manifest should serialize");
        };
        assert!(document.ends_with("}\n"));
        assert!(document.contains("\n  \"name\": \"demo\""));
        assert!(PluginManifest::from_document(&document).is_ok_and(|m| m == manifest));
    }
}
