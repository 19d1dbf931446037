//! Indented C# source builder with an explicit scope stack
//!
//! Every `open` pushes a scope that knows how to close itself; `close` pops
//! the innermost one, so scopes always unwind in reverse order of opening.

const INDENT: &str = "    ";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Scope {
    /// Text after the closing brace, e.g. ` // __b`
    trailer: String,
}

#[derive(Debug, Default)]
pub struct CodeWriter {
    out: String,
    scopes: Vec<Scope>,
}

impl CodeWriter {
    pub fn new() -> Self {
        CodeWriter::default()
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn line(&mut self, text: &str) {
        if text.is_empty() {
            self.out.push('\n');
            return;
        }
        for _ in 0..self.scopes.len() {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// `header` on its own line, then `{`
    pub fn open(&mut self, header: &str) {
        self.open_with_trailer(header, "");
    }

    pub fn open_with_trailer(&mut self, header: &str, trailer: &str) {
        self.line(header);
        self.line("{");
        self.scopes.push(Scope {
            trailer: trailer.to_string(),
        });
    }

    /// Close the innermost scope; a no-op when nothing is open
    pub fn close(&mut self) {
        if let Some(scope) = self.scopes.pop() {
            let closing = format!("}}{}", scope.trailer);
            self.line(&closing);
        }
    }

    /// Close scopes until only `depth` remain open
    pub fn close_to(&mut self, depth: usize) {
        while self.scopes.len() > depth {
            self.close();
        }
    }

    /// Close `}` and reopen with `header`, keeping the depth (`} finally {`)
    pub fn continue_with(&mut self, header: &str) {
        if let Some(scope) = self.scopes.pop() {
            self.line(&format!("}}{}", scope.trailer));
            self.line(header);
            self.line("{");
            self.scopes.push(Scope {
                trailer: String::new(),
            });
        }
    }

    /// Release every open scope and return the text
    pub fn finish(mut self) -> String {
        self.close_to(0);
        self.out
    }
}

#[cfg(test)]
mod tests {
    use crate::writer::*;

    #[test]
    fn test_scopes_close_in_reverse() {
        let mut w = CodeWriter::new();
        w.open("namespace Demo");
        w.open_with_trailer("fixed (int* __a = &a)", " // __a");
        w.open_with_trailer("fixed (int* __b = &b)", " // __b");
        w.line("Call(__a, __b);");
        let text = w.finish();
        let expected = "namespace Demo\n{\n    fixed (int* __a = &a)\n    {\n        fixed (int* __b = &b)\n        {\n            Call(__a, __b);\n        } // __b\n    } // __a\n}\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_continue_with_keeps_depth() {
        let mut w = CodeWriter::new();
        w.open("try");
        w.line("Work();");
        w.continue_with("finally");
        assert_eq!(w.depth(), 1);
        w.line("Release();");
        w.close();
        assert_eq!(w.finish(), "try\n{\n    Work();\n}\nfinally\n{\n    Release();\n}\n");
    }

    #[test]
    fn test_close_is_noop_when_empty() {
        let mut w = CodeWriter::new();
        w.close();
        w.line("x");
        assert_eq!(w.finish(), "x\n");
    }
}
