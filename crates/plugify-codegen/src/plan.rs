//! Marshaling plans for import-direction callables
//!
//! A plan lists, per parameter in declaration order, how the value reaches
//! the raw native slot: the wire type in the unmanaged signature, the setup
//! statements before the call, write-back statements after it, and teardown
//! statements for the guaranteed-release block. Pinned pointers have no
//! teardown; their release is the end of the `fixed` scope.

use plugify_ast::naming::is_keyword;
use plugify_manifest::{
    CallableError, CallableSignature, DeclarationError, PortableType, UnsupportedTypeError,
};
use serde::Serialize;
use smallvec::SmallVec;

pub const RETURN_LOCAL: &str = "__retVal";
pub const RETURN_NATIVE_LOCAL: &str = "__retVal_native";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarshalStrategy {
    None,
    StringHandle,
    ArrayHandle,
    VariantHandle,
    CallbackThunk,
    PinnedPointer,
}

impl MarshalStrategy {
    /// Strategies that allocate a native handle which must be released
    pub fn owns_handle(self) -> bool {
        matches!(
            self,
            MarshalStrategy::StringHandle | MarshalStrategy::ArrayHandle | MarshalStrategy::VariantHandle
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamPlan {
    pub name: String,
    pub strategy: MarshalStrategy,
    pub by_ref: bool,
    /// Type in the unmanaged function pointer signature
    pub wire_type: String,
    /// Host parameter spelling in the managed signature, e.g. `ref float b`
    pub host_parameter: String,
    /// Host type as used in a managed function pointer (`ref float`)
    pub host_pointer_type: String,
    /// Expression handed to the raw slot
    pub argument: String,
    /// Handle local declared before the guarded block
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub setup: Vec<String>,
    /// `fixed (...)` header opening a pinned scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub write_back: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub teardown: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReturnPlan {
    pub host_type: String,
    pub wire_type: String,
    pub strategy: MarshalStrategy,
    /// Native result is captured separately and converted after the call
    pub native_local: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conversion: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub teardown: Vec<String>,
}

impl ReturnPlan {
    pub fn is_void(&self) -> bool {
        self.host_type == "void"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarshalPlan {
    /// Declared identifier of the partial method, e.g. `___Foo`
    pub method: String,
    pub entry_point: String,
    pub raw_slot: String,
    pub parameters: SmallVec<[ParamPlan; 4]>,
    #[serde(rename = "return")]
    pub ret: ReturnPlan,
    /// Number of `fixed` scopes the shim opens
    pub pinned_scopes: usize,
}

impl MarshalPlan {
    /// A guaranteed-release block is needed only when some handle is owned
    pub fn needs_guard(&self) -> bool {
        !self.ret.teardown.is_empty() || self.parameters.iter().any(|p| !p.teardown.is_empty())
    }

    /// Nothing to set up, convert or release: the shim is a single call
    pub fn is_passthrough(&self) -> bool {
        self.pinned_scopes == 0
            && !self.ret.native_local
            && self
                .parameters
                .iter()
                .all(|p| p.setup.is_empty() && p.write_back.is_empty() && p.teardown.is_empty())
    }

    /// `__Foo(a, __b, __names)`
    pub fn call_expression(&self) -> String {
        let args: Vec<&str> = self.parameters.iter().map(|p| p.argument.as_str()).collect();
        format!("{}({})", self.raw_slot, args.join(", "))
    }

    /// `delegate* unmanaged[Cdecl]<int, float*, nint, long>`
    pub fn raw_pointer_type(&self) -> String {
        let mut types: Vec<&str> = self.parameters.iter().map(|p| p.wire_type.as_str()).collect();
        types.push(&self.ret.wire_type);
        format!("delegate* unmanaged[Cdecl]<{}>", types.join(", "))
    }

    /// `delegate*<int, ref float, string[], long>`
    pub fn managed_pointer_type(&self) -> String {
        let mut types: Vec<&str> = self
            .parameters
            .iter()
            .map(|p| p.host_pointer_type.as_str())
            .collect();
        types.push(&self.ret.host_type);
        format!("delegate*<{}>", types.join(", "))
    }
}

/// Identifier usable in emitted code
pub fn escape_identifier(name: &str) -> String {
    if is_keyword(name) {
        format!("@{}", name)
    } else {
        name.to_string()
    }
}

/// Suffix of the `NativeMethods.*Vector*` helpers for an element type
pub fn vector_suffix(element: &PortableType) -> Option<&'static str> {
    Some(match element {
        PortableType::Bool => "Bool",
        PortableType::Char8 => "Char8",
        PortableType::Char16 => "Char16",
        PortableType::Int8 => "Int8",
        PortableType::Int16 => "Int16",
        PortableType::Int32 => "Int32",
        PortableType::Int64 => "Int64",
        PortableType::UInt8 => "UInt8",
        PortableType::UInt16 => "UInt16",
        PortableType::UInt32 => "UInt32",
        PortableType::UInt64 => "UInt64",
        PortableType::Ptr32 | PortableType::Ptr64 => "IntPtr",
        PortableType::Float32 => "Float",
        PortableType::Float64 => "Double",
        PortableType::String => "String",
        PortableType::Any => "Variant",
        PortableType::Vec2 => "Vector2",
        PortableType::Vec3 => "Vector3",
        PortableType::Vec4 => "Vector4",
        PortableType::Mat4x4 => "Matrix4x4",
        PortableType::Void | PortableType::Function(_) | PortableType::Array(_) => return None,
    })
}

/// Underlying array spelling handed to vector helpers for enum elements
fn underlying_array(element: &PortableType) -> &'static str {
    match element {
        PortableType::Int8 => "sbyte[]",
        PortableType::Int16 => "short[]",
        PortableType::Int32 => "int[]",
        PortableType::Int64 => "long[]",
        PortableType::UInt8 => "byte[]",
        PortableType::UInt16 => "ushort[]",
        PortableType::UInt32 => "uint[]",
        _ => "ulong[]",
    }
}

struct ArrayHelpers {
    suffix: &'static str,
    /// Expression viewing the managed array as the helper's element type
    view: Box<dyn Fn(&str) -> String>,
    element_host: String,
}

fn array_helpers(
    ty: &PortableType,
    host_type: &str,
    is_enum: bool,
    type_text: &str,
) -> Result<ArrayHelpers, UnsupportedTypeError> {
    let Some(element) = ty.element() else {
        return Err(UnsupportedTypeError::new(type_text, "expected an array type"));
    };
    let Some(suffix) = vector_suffix(element) else {
        return Err(UnsupportedTypeError::new(type_text, "array element cannot cross the boundary"));
    };
    let element_host = host_type
        .trim_end_matches('?')
        .strip_suffix("[]")
        .unwrap_or(host_type)
        .to_string();
    let view: Box<dyn Fn(&str) -> String> = if is_enum {
        let underlying = underlying_array(element);
        Box::new(move |name: &str| format!("Unsafe.As<{}>({})", underlying, name))
    } else {
        Box::new(|name: &str| name.to_string())
    };
    Ok(ArrayHelpers {
        suffix,
        view,
        element_host,
    })
}

fn handle_teardown(handle: &str, delete: &str) -> String {
    format!("if ({} != 0) NativeMethods.{}({});", handle, delete, handle)
}

/// Wire type of a by-value return or parameter that needs no handle
fn natural_wire(ty: &PortableType, host_type: &str) -> String {
    match ty {
        PortableType::Bool => "byte".to_string(),
        PortableType::Char16 => "ushort".to_string(),
        PortableType::Ptr32 | PortableType::Ptr64 => {
            if host_type.ends_with('*') {
                host_type.to_string()
            } else {
                "nint".to_string()
            }
        }
        _ => host_type.trim_end_matches('?').to_string(),
    }
}

pub fn build_plan(signature: &CallableSignature) -> Result<MarshalPlan, CallableError> {
    let Some(symbols) = signature.import_symbols() else {
        return Err(DeclarationError::WrongDirection {
            method: signature.qualified_name(),
            expected: "import".to_string(),
            actual: "export".to_string(),
        }
        .into());
    };
    let method = signature.declared_name.to_string();

    let mut parameters: SmallVec<[ParamPlan; 4]> = SmallVec::new();
    let mut pinned_scopes = 0;
    for param in &signature.parameters {
        let plan = plan_parameter(&method, param)?;
        if plan.pin.is_some() {
            pinned_scopes += 1;
        }
        parameters.push(plan);
    }

    let ret = plan_return(&method, &signature.return_type)?;

    Ok(MarshalPlan {
        method,
        entry_point: symbols.entry_point_symbol.to_string(),
        raw_slot: symbols.raw_pointer_symbol.to_string(),
        parameters,
        ret,
        pinned_scopes,
    })
}

fn plan_parameter(
    method: &str,
    param: &plugify_manifest::ParameterDescriptor,
) -> Result<ParamPlan, CallableError> {
    let name = escape_identifier(&param.name);
    let handle = format!("__{}", param.name);
    let host = param.host_type.as_ref();
    let context = || format!("parameter `{}` of `{}`", param.name, method);
    let is_enum = param.enum_info.is_some();

    let mut plan = ParamPlan {
        name: param.name.to_string(),
        strategy: MarshalStrategy::None,
        by_ref: param.by_ref,
        wire_type: String::new(),
        host_parameter: if param.by_ref {
            format!("ref {} {}", host, name)
        } else {
            format!("{} {}", host, name)
        },
        host_pointer_type: if param.by_ref {
            format!("ref {}", host)
        } else {
            host.to_string()
        },
        argument: name.clone(),
        local: None,
        setup: Vec::new(),
        pin: None,
        write_back: Vec::new(),
        teardown: Vec::new(),
    };

    match &param.ty {
        PortableType::String => {
            plan.strategy = MarshalStrategy::StringHandle;
            plan.wire_type = "nint".to_string();
            plan.local = Some(handle.clone());
            plan.argument = handle.clone();
            plan.setup
                .push(format!("{} = NativeMethods.CreateString({});", handle, name));
            if param.by_ref {
                plan.write_back
                    .push(format!("{} = NativeMethods.GetStringData({});", name, handle));
            }
            plan.teardown.push(handle_teardown(&handle, "DeleteString"));
        }
        PortableType::Any => {
            plan.strategy = MarshalStrategy::VariantHandle;
            plan.wire_type = "nint".to_string();
            plan.local = Some(handle.clone());
            plan.argument = handle.clone();
            plan.setup
                .push(format!("{} = NativeMethods.CreateVariant({});", handle, name));
            if param.by_ref {
                plan.write_back
                    .push(format!("{} = NativeMethods.GetVariantData({});", name, handle));
            }
            plan.teardown.push(handle_teardown(&handle, "DeleteVariant"));
        }
        PortableType::Array(_) => {
            let helpers = array_helpers(&param.ty, host, is_enum, host).map_err(|e| e.within(context()))?;
            let suffix = helpers.suffix;
            plan.strategy = MarshalStrategy::ArrayHandle;
            plan.wire_type = "nint".to_string();
            plan.local = Some(handle.clone());
            plan.argument = handle.clone();
            plan.setup.push(format!(
                "{} = NativeMethods.CreateVector{}({}, {}.Length);",
                handle,
                suffix,
                (helpers.view)(&name),
                name
            ));
            if param.by_ref {
                plan.write_back.push(format!(
                    "Array.Resize(ref {}, NativeMethods.GetVectorSize{}({}));",
                    name, suffix, handle
                ));
                plan.write_back.push(format!(
                    "NativeMethods.GetVectorData{}({}, {});",
                    suffix,
                    handle,
                    (helpers.view)(&name)
                ));
            }
            plan.teardown
                .push(handle_teardown(&handle, &format!("DeleteVector{}", suffix)));
        }
        PortableType::Function(callback) => {
            if param.by_ref {
                return Err(UnsupportedTypeError::new(host, "callbacks cannot be passed by reference")
                    .within(context())
                    .into());
            }
            plan.wire_type = "nint".to_string();
            if callback.is_self_describing() {
                plan.argument = format!("Marshal.GetFunctionPointerForDelegate({})", name);
            } else {
                plan.strategy = MarshalStrategy::CallbackThunk;
                plan.argument = format!("Marshalling.GetFunctionPointerForDelegate({})", name);
            }
        }
        PortableType::Void => {
            return Err(UnsupportedTypeError::new("void", "void is not a valid parameter type")
                .within(context())
                .into());
        }
        other if param.by_ref => {
            let pointee = natural_pointee(other, host);
            plan.strategy = MarshalStrategy::PinnedPointer;
            plan.wire_type = format!("{}*", pointee);
            plan.pin = Some(format!("fixed ({}* {} = &{})", pointee, handle, name));
            plan.argument = handle;
        }
        PortableType::Bool => {
            plan.wire_type = "byte".to_string();
            plan.argument = format!("(byte)({} ? 1 : 0)", name);
        }
        PortableType::Char16 => {
            plan.wire_type = "ushort".to_string();
            plan.argument = format!("(ushort){}", name);
        }
        other => {
            plan.wire_type = natural_wire(other, host);
        }
    }

    Ok(plan)
}

/// Storage type a pinned pointer points at
fn natural_pointee(ty: &PortableType, host_type: &str) -> String {
    match ty {
        PortableType::Ptr32 | PortableType::Ptr64 if !host_type.ends_with('*') => "nint".to_string(),
        _ => host_type.to_string(),
    }
}

fn plan_return(
    method: &str,
    ret: &plugify_manifest::ReturnDescriptor,
) -> Result<ReturnPlan, CallableError> {
    let host = ret.host_type.to_string();
    let context = || format!("return type of `{}`", method);
    let native = RETURN_NATIVE_LOCAL;
    let value = RETURN_LOCAL;

    let mut plan = ReturnPlan {
        host_type: host.clone(),
        wire_type: String::new(),
        strategy: MarshalStrategy::None,
        native_local: false,
        conversion: Vec::new(),
        teardown: Vec::new(),
    };

    match &ret.ty {
        PortableType::Void => plan.wire_type = "void".to_string(),
        PortableType::Bool => {
            plan.wire_type = "byte".to_string();
            plan.native_local = true;
            plan.conversion.push(format!("{} = {} != 0;", value, native));
        }
        PortableType::Char16 => {
            plan.wire_type = "ushort".to_string();
            plan.native_local = true;
            plan.conversion.push(format!("{} = (char){};", value, native));
        }
        PortableType::String => {
            plan.wire_type = "nint".to_string();
            plan.strategy = MarshalStrategy::StringHandle;
            plan.native_local = true;
            plan.conversion
                .push(format!("{} = NativeMethods.GetStringData({});", value, native));
            plan.teardown.push(handle_teardown(native, "DeleteString"));
        }
        PortableType::Any => {
            plan.wire_type = "nint".to_string();
            plan.strategy = MarshalStrategy::VariantHandle;
            plan.native_local = true;
            plan.conversion
                .push(format!("{} = NativeMethods.GetVariantData({});", value, native));
            plan.teardown.push(handle_teardown(native, "DeleteVariant"));
        }
        PortableType::Array(_) => {
            let helpers = array_helpers(&ret.ty, &host, ret.enum_info.is_some(), &host)
                .map_err(|e| e.within(context()))?;
            let suffix = helpers.suffix;
            plan.wire_type = "nint".to_string();
            plan.strategy = MarshalStrategy::ArrayHandle;
            plan.native_local = true;
            plan.conversion.push(format!(
                "{} = new {}[NativeMethods.GetVectorSize{}({})];",
                value, helpers.element_host, suffix, native
            ));
            plan.conversion.push(format!(
                "NativeMethods.GetVectorData{}({}, {});",
                suffix,
                native,
                (helpers.view)(value)
            ));
            plan.teardown
                .push(handle_teardown(native, &format!("DeleteVector{}", suffix)));
        }
        PortableType::Function(callback) => {
            plan.wire_type = "nint".to_string();
            plan.native_local = true;
            let helper = if callback.is_self_describing() {
                "Marshal"
            } else {
                plan.strategy = MarshalStrategy::CallbackThunk;
                "Marshalling"
            };
            plan.conversion.push(format!(
                "{} = {}.GetDelegateForFunctionPointer<{}>({});",
                value,
                helper,
                host.trim_end_matches('?'),
                native
            ));
        }
        other => plan.wire_type = natural_wire(other, &host),
    }

    Ok(plan)
}
