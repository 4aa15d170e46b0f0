//! Compiler configuration.

/// Options controlling the shape of generated code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Module the generated code `require`s for its runtime.
    pub runtime_module: String,
    /// Local name the runtime is bound to.
    pub runtime_local: String,
    /// One level of indentation.
    pub indent: String,
    /// Drop indentation from the output.
    pub minify: bool,
    /// Emit `-- line:col` markers before translated statements.
    pub source_positions: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            runtime_module: "moonlift.runtime".to_string(),
            runtime_local: "__rt".to_string(),
            indent: "  ".to_string(),
            minify: false,
            source_positions: false,
        }
    }
}

impl CompilerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runtime_module(mut self, module: impl Into<String>) -> Self {
        self.runtime_module = module.into();
        self
    }

    pub fn with_runtime_local(mut self, name: impl Into<String>) -> Self {
        self.runtime_local = name.into();
        self
    }

    pub fn with_indent(mut self, indent: impl Into<String>) -> Self {
        self.indent = indent.into();
        self
    }

    pub fn with_minify(mut self, minify: bool) -> Self {
        self.minify = minify;
        self
    }

    pub fn with_source_positions(mut self, enabled: bool) -> Self {
        self.source_positions = enabled;
        self
    }

    /// `<runtime>.<member>`.
    pub fn rt(&self, member: &str) -> String {
        format!("{}.{}", self.runtime_local, member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = CompilerOptions::default();
        assert_eq!(options.runtime_module, "moonlift.runtime");
        assert_eq!(options.rt("recv"), "__rt.recv");
        assert!(!options.minify);
    }

    #[test]
    fn builder_overrides() {
        let options = CompilerOptions::new()
            .with_runtime_local("R")
            .with_indent("\t")
            .with_minify(true);
        assert_eq!(options.rt("go"), "R.go");
        assert_eq!(options.indent, "\t");
        assert!(options.minify);
    }
}
