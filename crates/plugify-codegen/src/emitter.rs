//! C# rendering of plans and manifests
//!
//! Every function here is pure: the same signatures and plans always render
//! the same bytes.

use crate::plan::{escape_identifier, MarshalPlan, RETURN_LOCAL, RETURN_NATIVE_LOCAL};
use crate::writer::CodeWriter;
use plugify_ast::naming::{is_identifier, sanitize_identifier};
use plugify_manifest::{
    Binding, CallableSignature, DeclaringType, ManifestError, ParameterDescriptor, PluginManifest,
};
use std::collections::HashSet;

pub const GENERATED_NAMESPACE: &str = "Plugify.Generated";
pub const EXPORTS_FILE: &str = "PluginExports.g.cs";
pub const MANIFEST_CLASS_FILE: &str = "PlugifyManifest.g.cs";
pub const DIAGNOSTIC_CLASS_FILE: &str = "PlugifyManifestDiagnostic.g.cs";

const USINGS: &[&str] = &[
    "System",
    "System.Numerics",
    "System.Runtime.CompilerServices",
    "System.Runtime.InteropServices",
    "Plugify",
];

fn header(w: &mut CodeWriter, usings: bool) {
    w.line("// <auto-generated/>");
    w.line("#nullable enable");
    if usings {
        w.blank();
        for using in USINGS {
            w.line(&format!("using {};", using));
        }
    }
    w.blank();
}

/// `<Namespace>.<Type>.Imports.g.cs`
pub fn imports_file_name(declaring: &DeclaringType) -> String {
    format!("{}.Imports.g.cs", declaring.qualified())
}

/// C# regular string literal
pub fn string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// C# verbatim string literal; only `"` needs doubling
pub fn verbatim_literal(text: &str) -> String {
    format!("@\"{}\"", text.replace('"', "\"\""))
}

// =============================================================================
// IMPORTS
// =============================================================================

/// One file holding every import shim of a declaring type
pub fn emit_imports(declaring: &DeclaringType, items: &[(&CallableSignature, &MarshalPlan)]) -> String {
    let mut w = CodeWriter::new();
    header(&mut w, true);

    if let Some(ns) = &declaring.namespace {
        w.open(&format!("namespace {}", ns));
    }
    for frame in &declaring.frames {
        let modifier = if frame.is_static { "static " } else { "" };
        w.open(&format!("{}unsafe partial {} {}", modifier, frame.keyword, frame.name));
    }

    for (index, (signature, plan)) in items.iter().enumerate() {
        if index > 0 {
            w.blank();
        }
        emit_import(&mut w, signature, plan);
    }

    w.finish()
}

fn emit_import(w: &mut CodeWriter, signature: &CallableSignature, plan: &MarshalPlan) {
    let access = signature.accessibility.as_deref().unwrap_or("private");

    w.line(&format!(
        "{} static {} {} = &{};",
        access,
        plan.managed_pointer_type(),
        plan.entry_point,
        plan.method
    ));
    w.line(&format!(
        "internal static {} {};",
        plan.raw_pointer_type(),
        plan.raw_slot
    ));
    w.blank();

    let params: Vec<&str> = plan
        .parameters
        .iter()
        .map(|p| p.host_parameter.as_str())
        .collect();
    w.open(&format!(
        "{} static partial {} {}({})",
        access,
        plan.ret.host_type,
        plan.method,
        params.join(", ")
    ));
    emit_shim_body(w, plan);
    w.close();
}

/// Body of an import shim: locals, guarded setup, call, conversion, write-back
pub fn emit_shim_body(w: &mut CodeWriter, plan: &MarshalPlan) {
    let call = plan.call_expression();
    if plan.is_passthrough() {
        if plan.ret.is_void() {
            w.line(&format!("{};", call));
        } else {
            w.line(&format!("return {};", call));
        }
        return;
    }

    if !plan.ret.is_void() {
        w.line(&format!("{} {};", plan.ret.host_type, RETURN_LOCAL));
    }
    if plan.ret.native_local {
        w.line(&format!(
            "{} {} = default;",
            plan.ret.wire_type, RETURN_NATIVE_LOCAL
        ));
    }
    for local in plan.parameters.iter().filter_map(|p| p.local.as_deref()) {
        w.line(&format!("nint {} = default;", local));
    }

    let body_depth = w.depth();
    let guarded = plan.needs_guard();
    if guarded {
        w.open("try");
    }
    let guard_depth = w.depth();

    for param in &plan.parameters {
        for statement in &param.setup {
            w.line(statement);
        }
        if let Some(pin) = &param.pin {
            w.open(pin);
        }
    }

    if plan.ret.is_void() {
        w.line(&format!("{};", call));
    } else if plan.ret.native_local {
        w.line(&format!("{} = {};", RETURN_NATIVE_LOCAL, call));
    } else {
        w.line(&format!("{} = {};", RETURN_LOCAL, call));
    }
    for statement in &plan.ret.conversion {
        w.line(statement);
    }
    for param in &plan.parameters {
        for statement in &param.write_back {
            w.line(statement);
        }
    }

    w.close_to(guard_depth);

    if guarded {
        w.continue_with("finally");
        for statement in &plan.ret.teardown {
            w.line(statement);
        }
        for param in plan.parameters.iter().rev() {
            for statement in &param.teardown {
                w.line(statement);
            }
        }
        w.close_to(body_depth);
    }

    if !plan.ret.is_void() {
        w.line(&format!("return {};", RETURN_LOCAL));
    }
}

// =============================================================================
// EXPORTS
// =============================================================================

/// Thin forwarders named after the native symbols
pub fn emit_exports(signatures: &[&CallableSignature]) -> String {
    let mut w = CodeWriter::new();
    header(&mut w, true);
    w.open(&format!("namespace {}", GENERATED_NAMESPACE));
    w.open("internal static class PluginExports");

    let mut taken: HashSet<String> = HashSet::new();
    let mut first = true;
    for signature in signatures {
        let Binding::Export { func_name } = &signature.binding else {
            continue;
        };
        if !first {
            w.blank();
        }
        first = false;

        let name = unique_name(&sanitize_identifier(&signature.native_symbol), &mut taken);
        let params: Vec<String> = signature.parameters.iter().map(export_parameter).collect();
        let args: Vec<String> = signature
            .parameters
            .iter()
            .map(|p| {
                let arg = escape_identifier(&p.name);
                if p.by_ref {
                    format!("ref {}", arg)
                } else {
                    arg
                }
            })
            .collect();
        w.line(&format!(
            "public static {} {}({}) => global::{}({});",
            signature.return_type.host_type,
            name,
            params.join(", "),
            func_name,
            args.join(", ")
        ));
    }

    w.finish()
}

fn unique_name(base: &str, taken: &mut HashSet<String>) -> String {
    let mut candidate = base.to_string();
    let mut suffix = 2;
    while taken.contains(&candidate) {
        candidate = format!("{}_{}", base, suffix);
        suffix += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

fn export_parameter(param: &ParameterDescriptor) -> String {
    let name = escape_identifier(&param.name);
    let mut text = if param.by_ref {
        format!("ref {} {}", param.host_type, name)
    } else {
        format!("{} {}", param.host_type, name)
    };
    if let Some(default) = &param.default {
        let literal = default.literal();
        let literal = if param.enum_info.is_some() {
            qualify_enum_default(literal, &param.host_type)
        } else {
            literal.to_string()
        };
        text.push_str(" = ");
        text.push_str(&literal);
    }
    text
}

/// `Mode.On` -> `global::Demo.Mode.On`; casts and numbers are kept
fn qualify_enum_default(literal: &str, host_type: &str) -> String {
    let segments: Vec<&str> = literal.split('.').collect();
    if segments.len() < 2 || !segments.iter().all(|s| is_identifier(s)) {
        return literal.to_string();
    }
    match segments.last() {
        Some(member) => format!("{}.{}", host_type, member),
        None => literal.to_string(),
    }
}

// =============================================================================
// MANIFEST CONSTANTS
// =============================================================================

/// Embeds the manifest document and its file name
pub fn emit_manifest_class(manifest: &PluginManifest) -> Result<String, ManifestError> {
    let document = manifest.to_document()?;
    let mut w = CodeWriter::new();
    header(&mut w, false);
    w.open(&format!("namespace {}", GENERATED_NAMESPACE));
    w.open("internal static class PlugifyManifest");
    w.line(&format!(
        "public const string ManifestFileName = {};",
        string_literal(&manifest.file_name())
    ));
    w.line(&format!(
        "public const string ManifestJson = {};",
        verbatim_literal(&document)
    ));
    Ok(w.finish())
}

/// Emitted instead of the manifest class when the module has no exports
pub fn emit_diagnostic_class(message: &str) -> String {
    let mut w = CodeWriter::new();
    header(&mut w, false);
    w.open(&format!("namespace {}", GENERATED_NAMESPACE));
    w.open("internal static class PlugifyManifestDiagnostic");
    w.line(&format!("public const string Message = {};", string_literal(message)));
    w.finish()
}
