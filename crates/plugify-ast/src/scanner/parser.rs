//! Text-level parsing of the declaration nodes ast-grep locates
//!
//! Inputs are node texts with comments already blanked out.

use crate::naming::{find_closing, find_top_level, split_top_level, split_words};
use crate::scanner::types::{mark_type_parameters, parse_type};
use crate::source::{
    AttributeDecl, EnumMember, Literal, ParamDecl, ParamModifier, SourceType, TypeFrameDecl,
};
use std::sync::Arc;

const MEMBER_MODIFIERS: &[&str] = &[
    "public", "private", "protected", "internal", "static", "partial", "extern", "unsafe", "new",
    "virtual", "override", "sealed", "abstract", "async", "readonly", "file", "required",
    "delegate",
];

const ACCESSIBILITY: &[&str] = &["public", "private", "protected", "internal", "file"];

/// Leading attribute lists and the text after them
pub fn parse_attributes(text: &str) -> Result<(Vec<AttributeDecl>, &str), String> {
    let mut attributes = Vec::new();
    let mut rest = text.trim_start();
    while let Some(inner) = rest.strip_prefix('[') {
        let close = find_closing(inner, b'[', b']')
            .ok_or_else(|| "unterminated attribute list".to_string())?;
        let mut list = inner[..close].trim();

        // Attribute target, e.g. `return:` or `method:`
        if let Some(colon) = find_top_level(list, b':', false) {
            let target = list[..colon].trim();
            if !target.is_empty() && target.chars().all(char::is_alphabetic) {
                list = list[colon + 1..].trim();
            }
        }

        for item in split_top_level(list, b',', false) {
            attributes.push(parse_attribute(item)?);
        }
        rest = inner[close + 1..].trim_start();
    }
    Ok((attributes, rest))
}

fn parse_attribute(item: &str) -> Result<AttributeDecl, String> {
    match item.find('(') {
        Some(open) => {
            let name = item[..open].trim();
            let close = find_closing(&item[open + 1..], b'(', b')')
                .ok_or_else(|| format!("unterminated arguments of attribute `{}`", name))?;
            let args = split_top_level(&item[open + 1..open + 1 + close], b',', false)
                .into_iter()
                .map(Arc::from)
                .collect();
            Ok(AttributeDecl::new(name, args))
        }
        None => Ok(AttributeDecl::new(item.trim(), Vec::new())),
    }
}

/// Result of parsing a method or delegate declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSignature {
    pub attributes: Vec<AttributeDecl>,
    pub modifiers: Vec<String>,
    pub name: String,
    pub type_parameters: Vec<Arc<str>>,
    pub return_type: SourceType,
    pub parameters: Vec<ParamDecl>,
}

impl ParsedSignature {
    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| m == modifier)
    }

    /// Accessibility keywords in declaration order, e.g. `protected internal`
    pub fn accessibility(&self) -> Option<String> {
        let words: Vec<&str> = self
            .modifiers
            .iter()
            .map(String::as_str)
            .filter(|m| ACCESSIBILITY.contains(m))
            .collect();
        (!words.is_empty()).then(|| words.join(" "))
    }
}

/// Parse `[attrs] modifiers ReturnType Name<T>(params) ...`
pub fn parse_signature(text: &str) -> Result<ParsedSignature, String> {
    let (attributes, rest) = parse_attributes(text)?;

    let open = find_top_level(rest, b'(', true)
        .ok_or_else(|| "missing parameter list".to_string())?;
    let close = find_closing(&rest[open + 1..], b'(', b')')
        .ok_or_else(|| "unterminated parameter list".to_string())?;
    let header = &rest[..open];
    let params_text = &rest[open + 1..open + 1 + close];

    let mut words = split_words(header);
    // `Name <T>` written with a space
    if words.len() >= 2 && words[words.len() - 1].starts_with('<') {
        let generic = words.remove(words.len() - 1);
        let name = words.remove(words.len() - 1);
        return parse_with_header(attributes, &words, &format!("{}{}", name, generic), params_text);
    }
    let name_word = words
        .pop()
        .ok_or_else(|| "missing declaration name".to_string())?;
    parse_with_header(attributes, &words, name_word, params_text)
}

fn parse_with_header(
    attributes: Vec<AttributeDecl>,
    words: &[&str],
    name_word: &str,
    params_text: &str,
) -> Result<ParsedSignature, String> {
    let (name, type_parameters) = split_generic_name(name_word)?;
    if name.is_empty() {
        return Err("missing declaration name".to_string());
    }

    let modifier_count = words
        .iter()
        .take_while(|w| MEMBER_MODIFIERS.contains(*w))
        .count();
    let modifiers: Vec<String> = words[..modifier_count]
        .iter()
        .map(|w| (*w).to_string())
        .collect();
    let return_words = &words[modifier_count..];
    if return_words.is_empty() {
        return Err(format!("`{}` has no return type", name));
    }
    if return_words[0] == "ref" {
        return Err(format!("`{}` returns by reference", name));
    }
    let return_type = mark_type_parameters(parse_type(&return_words.join(" "))?, &type_parameters);

    let parameters = split_top_level(params_text, b',', true)
        .into_iter()
        .map(|p| parse_parameter(p, &type_parameters))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ParsedSignature {
        attributes,
        modifiers,
        name,
        type_parameters,
        return_type,
        parameters,
    })
}

/// `Foo<T, in U>` -> (`Foo`, [`T`, `U`])
fn split_generic_name(word: &str) -> Result<(String, Vec<Arc<str>>), String> {
    let Some(open) = word.find('<') else {
        return Ok((word.trim_start_matches('@').to_string(), Vec::new()));
    };
    let close = find_closing(&word[open + 1..], b'<', b'>')
        .ok_or_else(|| format!("unterminated type parameters in `{}`", word))?;
    let params = split_top_level(&word[open + 1..open + 1 + close], b',', true)
        .into_iter()
        .filter_map(|p| split_words(p).last().map(|w| Arc::from(*w)))
        .collect();
    Ok((word[..open].trim_start_matches('@').to_string(), params))
}

fn parse_parameter(text: &str, type_parameters: &[Arc<str>]) -> Result<ParamDecl, String> {
    let (_, text) = parse_attributes(text)?;

    let (declaration, default) = match find_top_level(text, b'=', true) {
        Some(eq) => (&text[..eq], Some(parse_literal(text[eq + 1..].trim()))),
        None => (text, None),
    };

    let mut words = split_words(declaration);
    let name = words
        .pop()
        .ok_or_else(|| format!("malformed parameter `{}`", text))?;

    let mut modifier = ParamModifier::None;
    let mut index = 0;
    while index < words.len() {
        let next = match (words[index], modifier) {
            ("ref", ParamModifier::None) => ParamModifier::Ref,
            // `ref readonly` reads like `in`
            ("readonly", ParamModifier::Ref) => ParamModifier::In,
            ("out", _) => ParamModifier::Out,
            ("in", _) => ParamModifier::In,
            ("params", _) => ParamModifier::Params,
            ("this", _) => ParamModifier::This,
            ("scoped", current) => current,
            _ => break,
        };
        modifier = next;
        index += 1;
    }

    let type_words = &words[index..];
    if type_words.is_empty() {
        return Err(format!("parameter `{}` has no type", name));
    }
    let ty = mark_type_parameters(parse_type(&type_words.join(" "))?, type_parameters);

    Ok(ParamDecl {
        name: Arc::from(name.trim_start_matches('@')),
        ty,
        modifier,
        default,
    })
}

pub fn parse_literal(text: &str) -> Literal {
    let text = text.trim();
    match text {
        "true" => return Literal::Bool(true),
        "false" => return Literal::Bool(false),
        "null" => return Literal::Null,
        _ => {}
    }
    if text.starts_with('"') || text.starts_with("@\"") {
        return Literal::Str(Arc::from(text));
    }
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    let is_number = digits
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || (c == '.' && digits.len() > 1))
        && digits
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '+' || c == '-');
    if is_number {
        Literal::Number(Arc::from(text))
    } else {
        Literal::Expr(Arc::from(text))
    }
}

/// Header of a class/struct/record/interface declaration
pub fn parse_type_frame(text: &str) -> Result<TypeFrameDecl, String> {
    let (_, rest) = parse_attributes(text)?;
    let end = [find_top_level(rest, b'{', false), find_top_level(rest, b';', false)]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(rest.len());
    let words = split_words(&rest[..end]);

    let keyword_at = words
        .iter()
        .position(|w| matches!(*w, "class" | "struct" | "interface" | "record"))
        .ok_or_else(|| "missing type keyword".to_string())?;
    let mut name_at = keyword_at + 1;
    let mut keyword = words[keyword_at].to_string();
    if keyword == "record" {
        if let Some(kind @ ("class" | "struct")) = words.get(name_at).copied() {
            keyword = format!("record {}", kind);
            name_at += 1;
        }
    }

    let raw_name = words
        .get(name_at)
        .ok_or_else(|| format!("missing {} name", keyword))?;
    let cut = raw_name.find(['(', ':']).unwrap_or(raw_name.len());
    let (name, type_parameters) = split_generic_name(raw_name[..cut].trim())?;

    Ok(TypeFrameDecl {
        keyword: Arc::from(keyword),
        name: Arc::from(name),
        type_parameters,
        is_static: words[..keyword_at].contains(&"static"),
    })
}

/// Name of a block or file-scoped namespace declaration
pub fn parse_namespace(text: &str) -> Option<String> {
    let rest = text.trim_start().strip_prefix("namespace")?;
    let end = rest.find(['{', ';']).unwrap_or(rest.len());
    let name = rest[..end].trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Parsed `enum Name : underlying { members }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEnum {
    pub name: String,
    pub underlying: SourceType,
    pub members: Vec<EnumMember>,
    pub error: Option<String>,
}

pub fn parse_enum(text: &str) -> Result<ParsedEnum, String> {
    let (_, rest) = parse_attributes(text)?;
    let open = rest
        .find('{')
        .ok_or_else(|| "missing enum body".to_string())?;
    let close = find_closing(&rest[open + 1..], b'{', b'}')
        .ok_or_else(|| "unterminated enum body".to_string())?;
    let header = &rest[..open];
    let body = &rest[open + 1..open + 1 + close];

    let words = split_words(header);
    let enum_at = words
        .iter()
        .position(|w| *w == "enum")
        .ok_or_else(|| "missing `enum` keyword".to_string())?;
    let tail = words[enum_at + 1..].join(" ");
    let (name, underlying) = match tail.split_once(':') {
        Some((name, base)) => (name.trim().to_string(), parse_type(base)?),
        None => (tail.trim().to_string(), SourceType::named("int")),
    };
    if name.is_empty() {
        return Err("missing enum name".to_string());
    }

    let mut members: Vec<EnumMember> = Vec::new();
    let mut error = None;
    let mut next_value: i64 = 0;
    for item in split_top_level(body, b',', false) {
        let (_, item) = parse_attributes(item)?;
        let (member, value) = match item.split_once('=') {
            Some((member, expr)) => match eval_const(expr, &members, &name) {
                Ok(value) => (member.trim(), value),
                Err(reason) => {
                    error.get_or_insert_with(|| {
                        format!("value of `{}.{}`: {}", name, member.trim(), reason)
                    });
                    (member.trim(), next_value)
                }
            },
            None => (item.trim(), next_value),
        };
        members.push(EnumMember {
            name: Arc::from(member.trim_start_matches('@')),
            value,
        });
        next_value = value.wrapping_add(1);
    }

    Ok(ParsedEnum {
        name,
        underlying,
        members,
        error,
    })
}

// =============================================================================
// CONSTANT EXPRESSIONS - enum member initializers
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Or,
    Xor,
    And,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl Op {
    fn precedence(self) -> u8 {
        match self {
            Op::Or => 1,
            Op::Xor => 2,
            Op::And => 3,
            Op::Shl | Op::Shr => 4,
            Op::Add | Op::Sub => 5,
            Op::Mul | Op::Div | Op::Rem => 6,
        }
    }

    fn apply(self, lhs: i64, rhs: i64) -> Result<i64, String> {
        Ok(match self {
            Op::Or => lhs | rhs,
            Op::Xor => lhs ^ rhs,
            Op::And => lhs & rhs,
            Op::Shl => lhs.wrapping_shl(rhs as u32),
            Op::Shr => lhs.wrapping_shr(rhs as u32),
            Op::Add => lhs.wrapping_add(rhs),
            Op::Sub => lhs.wrapping_sub(rhs),
            Op::Mul => lhs.wrapping_mul(rhs),
            Op::Div | Op::Rem if rhs == 0 => return Err("division by zero".to_string()),
            Op::Div => lhs.wrapping_div(rhs),
            Op::Rem => lhs.wrapping_rem(rhs),
        })
    }
}

struct ConstEval<'a> {
    text: &'a str,
    pos: usize,
    known: &'a [EnumMember],
    enum_name: &'a str,
}

impl ConstEval<'_> {
    fn skip_ws(&mut self) {
        while self.text[self.pos..].starts_with(|c: char| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek_op(&mut self) -> Option<(Op, usize)> {
        self.skip_ws();
        let rest = &self.text[self.pos..];
        let ops = [
            ("<<", Op::Shl),
            (">>", Op::Shr),
            ("|", Op::Or),
            ("^", Op::Xor),
            ("&", Op::And),
            ("+", Op::Add),
            ("-", Op::Sub),
            ("*", Op::Mul),
            ("/", Op::Div),
            ("%", Op::Rem),
        ];
        ops.iter()
            .find(|(sym, _)| rest.starts_with(sym))
            .map(|(sym, op)| (*op, sym.len()))
    }

    fn expression(&mut self, min_precedence: u8) -> Result<i64, String> {
        let mut lhs = self.unary()?;
        while let Some((op, width)) = self.peek_op() {
            if op.precedence() < min_precedence {
                break;
            }
            self.pos += width;
            let rhs = self.expression(op.precedence() + 1)?;
            lhs = op.apply(lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<i64, String> {
        self.skip_ws();
        let rest = &self.text[self.pos..];
        if let Some(stripped) = rest.strip_prefix('-') {
            self.pos += rest.len() - stripped.len();
            return Ok(self.unary()?.wrapping_neg());
        }
        if rest.starts_with('+') {
            self.pos += 1;
            return self.unary();
        }
        if rest.starts_with('~') {
            self.pos += 1;
            return Ok(!self.unary()?);
        }
        if rest.starts_with('(') {
            self.pos += 1;
            // Cast to an integral type: `(int)X`
            let close = self.text[self.pos..]
                .find(')')
                .ok_or_else(|| "unbalanced parenthesis".to_string())?;
            let inner = self.text[self.pos..self.pos + close].trim();
            if matches!(
                inner,
                "int" | "uint" | "long" | "ulong" | "short" | "ushort" | "byte" | "sbyte"
            ) {
                self.pos += close + 1;
                return self.unary();
            }
            let value = self.expression(0)?;
            self.skip_ws();
            if !self.text[self.pos..].starts_with(')') {
                return Err("unbalanced parenthesis".to_string());
            }
            self.pos += 1;
            return Ok(value);
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<i64, String> {
        let rest = &self.text[self.pos..];
        let len = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.' || c == '@'))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(format!("unexpected `{}`", rest.trim()));
        }
        let word = &rest[..len];
        self.pos += len;

        if word.starts_with(|c: char| c.is_ascii_digit()) {
            return parse_integer(word);
        }

        let member = word
            .strip_prefix(self.enum_name)
            .and_then(|w| w.strip_prefix('.'))
            .unwrap_or(word)
            .trim_start_matches('@');
        self.known
            .iter()
            .find(|m| m.name.as_ref() == member)
            .map(|m| m.value)
            .ok_or_else(|| format!("unknown constant `{}`", word))
    }
}

fn parse_integer(word: &str) -> Result<i64, String> {
    let cleaned: String = word.chars().filter(|c| *c != '_').collect();
    let lower = cleaned.to_ascii_lowercase();
    let (digits, radix) = if let Some(hex) = lower.strip_prefix("0x") {
        (hex.trim_end_matches(['u', 'l']), 16)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        (bin.trim_end_matches(['u', 'l']), 2)
    } else {
        (lower.trim_end_matches(['u', 'l']), 10)
    };
    u64::from_str_radix(digits, radix)
        .map(|v| v as i64)
        .map_err(|_| format!("invalid integer literal `{}`", word))
}

/// Evaluate an enum member initializer against previously declared members
pub fn eval_const(expr: &str, known: &[EnumMember], enum_name: &str) -> Result<i64, String> {
    let mut eval = ConstEval {
        text: expr,
        pos: 0,
        known,
        enum_name,
    };
    let value = eval.expression(0)?;
    eval.skip_ws();
    if eval.pos < expr.len() {
        return Err(format!("unexpected `{}`", expr[eval.pos..].trim()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use crate::scanner::parser::*;

    fn signature(text: &str) -> ParsedSignature {
        match parse_signature(text) {
            Ok(sig) => sig,
            Err(e) => panic!("failed to parse `{}`: {}", text, e),
        }
    }

    #[test]
    fn test_export_method() {
        let sig = signature(
            "[NativeExport(\"Combine\")]\n    public static long Combine(int a, ref float b, string[] names) => 0;",
        );
        assert_eq!(sig.name, "Combine");
        assert_eq!(sig.attributes.len(), 1);
        assert!(sig.attributes[0].is("NativeExport"));
        assert_eq!(sig.attributes[0].args[0].as_ref(), "\"Combine\"");
        assert!(sig.has_modifier("static"));
        assert_eq!(sig.accessibility().as_deref(), Some("public"));
        assert_eq!(sig.return_type, SourceType::named("long"));
        assert_eq!(sig.parameters.len(), 3);
        assert_eq!(sig.parameters[1].modifier, ParamModifier::Ref);
        assert_eq!(
            sig.parameters[2].ty,
            SourceType::array(SourceType::named("string"))
        );
    }

    #[test]
    fn test_attribute_lists_and_targets() {
        let sig = signature(
            "[return: MarshalAs(UnmanagedType.U1)] [Obsolete, Plugify.NativeImportAttribute]\ninternal static partial bool ___Check();",
        );
        let names: Vec<&str> = sig.attributes.iter().map(|a| a.name.as_ref()).collect();
        assert_eq!(names, vec!["MarshalAs", "Obsolete", "NativeImport"]);
        assert!(sig.has_modifier("partial"));
        assert_eq!(sig.accessibility().as_deref(), Some("internal"));
    }

    #[test]
    fn test_generic_method() {
        let sig = signature("public static T Pick<T>(T[] items)");
        assert_eq!(sig.type_parameters.len(), 1);
        assert_eq!(sig.return_type, SourceType::TypeParameter(Arc::from("T")));
    }

    #[test]
    fn test_parameter_modifiers_and_defaults() {
        let sig = signature(
            "static void Run(out int a, in Vector3 b, params int[] c, ref readonly int d, bool e = true, string f = \"x, y\", float g = -1.5f, object h = null, int i = default)",
        );
        let modifiers: Vec<ParamModifier> = sig.parameters.iter().map(|p| p.modifier).collect();
        assert_eq!(
            modifiers[..4],
            [
                ParamModifier::Out,
                ParamModifier::In,
                ParamModifier::Params,
                ParamModifier::In
            ]
        );
        assert_eq!(sig.parameters[4].default, Some(Literal::Bool(true)));
        assert_eq!(
            sig.parameters[5].default,
            Some(Literal::Str(Arc::from("\"x, y\"")))
        );
        assert_eq!(
            sig.parameters[6].default,
            Some(Literal::Number(Arc::from("-1.5f")))
        );
        assert_eq!(sig.parameters[7].default, Some(Literal::Null));
        assert_eq!(
            sig.parameters[8].default,
            Some(Literal::Expr(Arc::from("default")))
        );
    }

    #[test]
    fn test_delegate_declaration() {
        let sig = signature("public delegate void OnTick(double dt, string name);");
        assert!(sig.has_modifier("delegate"));
        assert_eq!(sig.name, "OnTick");
        assert!(sig.return_type.is_void());
    }

    #[test]
    fn test_malformed_signatures() {
        assert!(parse_signature("public static Foo").is_err());
        assert!(parse_signature("public static ref int Peek()").is_err());
        assert!(parse_signature("[NativeExport(\"x\") static void X()").is_err());
    }

    #[test]
    fn test_type_frames() {
        let Ok(frame) = parse_type_frame("[Serializable]\npublic static unsafe partial class Api : Base {") else {
            panic!("class header should parse");
        };
        assert_eq!(frame.name.as_ref(), "Api");
        assert_eq!(frame.keyword.as_ref(), "class");
        assert!(frame.is_static);

        let Ok(record) = parse_type_frame("public record struct Point<T>(T X, T Y);") else {
            panic!("record header should parse");
        };
        assert_eq!(record.keyword.as_ref(), "record struct");
        assert_eq!(record.name.as_ref(), "Point");
        assert_eq!(record.type_parameters.len(), 1);
    }

    #[test]
    fn test_namespaces() {
        assert_eq!(parse_namespace("namespace Demo.Plugin { }").as_deref(), Some("Demo.Plugin"));
        assert_eq!(parse_namespace("namespace Demo;").as_deref(), Some("Demo"));
        assert_eq!(parse_namespace("class X {}"), None);
    }

    #[test]
    fn test_enum_values() {
        let Ok(parsed) = parse_enum(
            "public enum Flags : byte { None, A = 1 << 0, B = 1 << 1, Both = A | B, Next, Hex = 0x10, Neg = -(2), Cast = (int)Flags.Hex + 1 }",
        ) else {
            panic!("enum should parse");
        };
        assert_eq!(parsed.name, "Flags");
        assert_eq!(parsed.underlying, SourceType::named("byte"));
        assert_eq!(parsed.error, None);
        let values: Vec<i64> = parsed.members.iter().map(|m| m.value).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4, 16, -2, 17]);
    }

    #[test]
    fn test_enum_unknown_constant() {
        let Ok(parsed) = parse_enum("enum Mode { A = Other.Value }") else {
            panic!("enum should parse");
        };
        assert!(parsed.error.is_some());
    }
}
