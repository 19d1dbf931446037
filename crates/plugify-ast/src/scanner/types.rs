//! Parser for C# type spellings such as `global::System.Numerics.Vector3[]?`

use crate::source::SourceType;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Ident(&'a str),
    Dot,
    Lt,
    Gt,
    Comma,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Question,
    Star,
}

fn tokenize(text: &str) -> Result<Vec<Token<'_>>, String> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let token = match b {
            b'.' => Token::Dot,
            b':' if bytes.get(i + 1) == Some(&b':') => {
                i += 1;
                Token::Dot
            }
            b'<' => Token::Lt,
            b'>' => Token::Gt,
            b',' => Token::Comma,
            b'[' => Token::LBracket,
            b']' => Token::RBracket,
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b'?' => Token::Question,
            b'*' => Token::Star,
            _ if b.is_ascii_whitespace() => {
                i += 1;
                continue;
            }
            _ if b == b'@' || b == b'_' || b.is_ascii_alphanumeric() || b >= 0x80 => {
                let start = i;
                i += 1;
                while i < bytes.len()
                    && (bytes[i] == b'_' || bytes[i].is_ascii_alphanumeric() || bytes[i] >= 0x80)
                {
                    i += 1;
                }
                tokens.push(Token::Ident(&text[start..i]));
                continue;
            }
            _ => return Err(format!("unexpected character `{}` in type", b as char)),
        };
        tokens.push(token);
        i += 1;
    }
    Ok(tokens)
}

struct TypeParser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> TypeParser<'a> {
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token<'_>) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token<'_>, what: &str) -> Result<(), String> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(format!("expected {}", what))
        }
    }

    fn parse_type(&mut self) -> Result<SourceType, String> {
        let mut ty = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Question) => {
                    self.pos += 1;
                    if matches!(ty, SourceType::Nullable(_)) {
                        return Err("doubled nullable annotation".to_string());
                    }
                    ty = SourceType::Nullable(Box::new(ty));
                }
                Some(Token::Star) => {
                    self.pos += 1;
                    ty = SourceType::Pointer(Box::new(ty));
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let mut rank: u8 = 1;
                    while self.eat(&Token::Comma) {
                        rank = rank.saturating_add(1);
                    }
                    self.expect(&Token::RBracket, "`]`")?;
                    ty = if rank == 1 {
                        SourceType::Array(Box::new(ty))
                    } else {
                        SourceType::MultiArray(Box::new(ty), rank)
                    };
                }
                _ => return Ok(ty),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<SourceType, String> {
        match self.next() {
            Some(Token::LParen) => {
                let mut items = Vec::new();
                loop {
                    items.push(self.parse_type()?);
                    // Optional tuple element name
                    if let Some(Token::Ident(_)) = self.peek() {
                        self.pos += 1;
                    }
                    if self.eat(&Token::RParen) {
                        break;
                    }
                    self.expect(&Token::Comma, "`,` or `)` in tuple type")?;
                }
                Ok(SourceType::Tuple(items))
            }
            Some(Token::Ident("delegate")) if self.peek() == Some(&Token::Star) => {
                // Function pointer: delegate* [unmanaged[Conv]] <...>
                self.pos += 1;
                let mut depth = 0usize;
                while let Some(token) = self.next() {
                    match token {
                        Token::Lt => depth += 1,
                        Token::Gt => {
                            depth = depth.saturating_sub(1);
                            if depth == 0 {
                                return Ok(SourceType::Pointer(Box::new(SourceType::named(
                                    "void",
                                ))));
                            }
                        }
                        _ => {}
                    }
                }
                Err("unterminated function pointer type".to_string())
            }
            Some(Token::Ident(first)) => {
                let mut segments = vec![first.trim_start_matches('@')];
                while self.peek() == Some(&Token::Dot) {
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Ident(segment)) => segments.push(segment.trim_start_matches('@')),
                        _ => return Err("expected identifier after `.`".to_string()),
                    }
                }
                if segments.first() == Some(&"global") && segments.len() > 1 {
                    segments.remove(0);
                }
                let name: Arc<str> = Arc::from(segments.join("."));

                if self.eat(&Token::Lt) {
                    let mut args = Vec::new();
                    loop {
                        args.push(self.parse_type()?);
                        if self.eat(&Token::Gt) {
                            break;
                        }
                        self.expect(&Token::Comma, "`,` or `>` in generic arguments")?;
                    }
                    return Ok(SourceType::Generic { name, args });
                }
                Ok(SourceType::Named(name))
            }
            Some(other) => Err(format!("unexpected {:?} at start of type", other)),
            None => Err("empty type".to_string()),
        }
    }
}

/// Parse a complete type spelling
pub fn parse_type(text: &str) -> Result<SourceType, String> {
    let tokens = tokenize(text.trim())?;
    let mut parser = TypeParser { tokens, pos: 0 };
    let ty = parser.parse_type()?;
    if parser.pos < parser.tokens.len() {
        return Err(format!("unexpected trailing text in type `{}`", text.trim()));
    }
    Ok(ty)
}

/// Replace names matching an open type parameter with `TypeParameter`
pub fn mark_type_parameters(ty: SourceType, params: &[Arc<str>]) -> SourceType {
    if params.is_empty() {
        return ty;
    }
    match ty {
        SourceType::Named(name) if params.iter().any(|p| *p == name) => {
            SourceType::TypeParameter(name)
        }
        SourceType::Array(inner) => SourceType::Array(Box::new(mark_type_parameters(*inner, params))),
        SourceType::MultiArray(inner, rank) => {
            SourceType::MultiArray(Box::new(mark_type_parameters(*inner, params)), rank)
        }
        SourceType::Pointer(inner) => {
            SourceType::Pointer(Box::new(mark_type_parameters(*inner, params)))
        }
        SourceType::Nullable(inner) => {
            SourceType::Nullable(Box::new(mark_type_parameters(*inner, params)))
        }
        SourceType::Generic { name, args } => SourceType::Generic {
            name,
            args: args
                .into_iter()
                .map(|a| mark_type_parameters(a, params))
                .collect(),
        },
        SourceType::Tuple(items) => SourceType::Tuple(
            items
                .into_iter()
                .map(|a| mark_type_parameters(a, params))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use crate::scanner::types::*;

    fn parsed(text: &str) -> SourceType {
        match parse_type(text) {
            Ok(ty) => ty,
            Err(e) => panic!("failed to parse `{}`: {}", text, e),
        }
    }

    #[test]
    fn test_simple_and_qualified() {
        assert_eq!(parsed("int"), SourceType::named("int"));
        assert_eq!(
            parsed("global::System.Numerics.Vector3"),
            SourceType::named("System.Numerics.Vector3")
        );
        assert_eq!(parsed("@string"), SourceType::named("string"));
    }

    #[test]
    fn test_suffix_order() {
        assert_eq!(
            parsed("string[]?"),
            SourceType::Nullable(Box::new(SourceType::array(SourceType::named("string"))))
        );
        assert_eq!(
            parsed("int?[]"),
            SourceType::array(SourceType::Nullable(Box::new(SourceType::named("int"))))
        );
        assert_eq!(
            parsed("byte**"),
            SourceType::Pointer(Box::new(SourceType::Pointer(Box::new(SourceType::named(
                "byte"
            )))))
        );
        assert_eq!(
            parsed("int[,,]"),
            SourceType::MultiArray(Box::new(SourceType::named("int")), 3)
        );
    }

    #[test]
    fn test_generics_and_tuples() {
        assert_eq!(
            parsed("Dictionary<string, List<int>>"),
            SourceType::Generic {
                name: Arc::from("Dictionary"),
                args: vec![
                    SourceType::named("string"),
                    SourceType::Generic {
                        name: Arc::from("List"),
                        args: vec![SourceType::named("int")],
                    },
                ],
            }
        );
        assert_eq!(
            parsed("(int x, string y)"),
            SourceType::Tuple(vec![SourceType::named("int"), SourceType::named("string")])
        );
    }

    #[test]
    fn test_function_pointer_is_pointer() {
        assert_eq!(
            parsed("delegate* unmanaged[Cdecl]<int, void>"),
            SourceType::Pointer(Box::new(SourceType::named("void")))
        );
    }

    #[test]
    fn test_errors() {
        assert!(parse_type("").is_err());
        assert!(parse_type("int??").is_err());
        assert!(parse_type("List<int").is_err());
        assert!(parse_type("int x").is_err());
    }

    #[test]
    fn test_mark_type_parameters() {
        let params = vec![Arc::from("T")];
        assert_eq!(
            mark_type_parameters(parsed("T[]"), &params),
            SourceType::array(SourceType::TypeParameter(Arc::from("T")))
        );
        assert_eq!(mark_type_parameters(parsed("Tx"), &params), SourceType::named("Tx"));
    }
}
