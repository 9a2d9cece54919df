//! @ai:module:intent Define language-specific comment formats and declaration heuristics
//! @ai:module:layer domain
//! @ai:module:public_api Language, Dialect, DialectRegistry, detect_language
//! @ai:module:depends_on parser, extractor
//! @ai:module:stateless true

use crate::error::Result;
use crate::extractor::SymbolHeuristic;
use crate::parser::CommentSyntax;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;

/// @ai:intent Represents a built-in programming language with its comment syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Rust,
    Python,
    TypeScript,
    JavaScript,
    Go,
    Java,
    C,
    Cpp,
    Kotlin,
    CSharp,
    Protobuf,
}

const ALL_LANGUAGES: [Language; 11] = [
    Language::Rust,
    Language::Python,
    Language::TypeScript,
    Language::JavaScript,
    Language::Go,
    Language::Java,
    Language::C,
    Language::Cpp,
    Language::Kotlin,
    Language::CSharp,
    Language::Protobuf,
];

impl Language {
    /// @ai:intent Get the comment syntax descriptor for this language
    /// @ai:effects pure
    pub fn comment_syntax(&self) -> CommentSyntax {
        let c_block = Some(("/*", "*/"));
        let c_like = || CommentSyntax::new(&["//"], c_block).with_block_line_prefix("*");
        match self {
            Language::Rust => CommentSyntax::new(&["//", "///", "//!"], c_block)
                .with_block_line_prefix("*")
                .with_char_literals(),
            Language::Python => CommentSyntax::new(&["#"], Some(("\"\"\"", "\"\"\"")))
                .with_string_quotes(&['"', '\'']),
            Language::TypeScript | Language::JavaScript => c_like()
                .with_string_quotes(&['"', '\''])
                .with_raw_string_quotes(&['`']),
            Language::Go => c_like().with_raw_string_quotes(&['`']).with_char_literals(),
            Language::Java
            | Language::C
            | Language::Cpp
            | Language::Kotlin
            | Language::CSharp => c_like().with_char_literals(),
            Language::Protobuf => c_like().with_string_quotes(&['"', '\'']),
        }
    }

    /// @ai:intent Regex recognising a declaration line; the first matching group is the symbol name
    /// @ai:effects pure
    pub fn declaration_pattern(&self) -> &'static str {
        match self {
            Language::Rust => {
                r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:(?:async|const|unsafe|extern(?:\s+\x22[^\x22]*\x22)?)\s+)*(?:fn|struct|enum|trait|type|mod|const|static|union)\s+([A-Za-z_][A-Za-z0-9_]*)|^\s*impl(?:<[^>]*>)?\s+(?:[A-Za-z_][\w:]*\s+for\s+)?([A-Za-z_][\w:]*)"
            }
            Language::Python => r"^\s*(?:async\s+)?(?:def|class)\s+([A-Za-z_]\w*)",
            Language::TypeScript | Language::JavaScript => {
                r"^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?(?:async\s+)?(?:function\*?|class|interface|type|enum|const|let|var)\s+([A-Za-z_$][\w$]*)"
            }
            Language::Go => {
                r"^\s*(?:func\s+(?:\([^)]*\)\s*)?([A-Za-z_]\w*)|type\s+([A-Za-z_]\w*)|(?:var|const)\s+([A-Za-z_]\w*))"
            }
            Language::Java => {
                r"^\s*(?:(?:public|protected|private|static|final|abstract|sealed)\s+)*(?:class|interface|enum|record)\s+([A-Za-z_]\w*)|^\s*(?:public|protected|private)\s+(?:(?:static|final|abstract|synchronized)\s+)*[\w<>\[\],.?]+\s+([A-Za-z_]\w*)\s*\("
            }
            Language::C | Language::Cpp => {
                r"^\s*(?:(?:typedef\s+)?(?:struct|union|enum|class|namespace)\s+([A-Za-z_]\w*)|#define\s+([A-Za-z_]\w*)|[A-Za-z_][\w:<>*&\s]*?[\s*&]([A-Za-z_][\w:~]*)\s*\([^;]*$)"
            }
            Language::Kotlin => {
                r"^\s*(?:(?:public|private|protected|internal|open|abstract|sealed|data|enum|inline|value|override|suspend|operator|infix|const|lateinit|annotation|inner|companion)\s+)*(?:fun\s+(?:<[^>]*>\s*)?(?:[\w.]+(?:<[^>]*>)?\.)?|class\s+|interface\s+|object\s+|val\s+|var\s+|typealias\s+)([A-Za-z_]\w*)"
            }
            Language::CSharp => {
                r"^\s*(?:\[[^\]]*\]\s*)*(?:(?:public|private|protected|internal|static|sealed|abstract|partial|readonly|unsafe)\s+)*(?:class|struct|interface|enum|record|namespace)\s+([A-Za-z_][\w.]*)|^\s*(?:(?:public|private|protected|internal)\s+)(?:(?:static|virtual|override|abstract|async|sealed|new|extern)\s+)*[\w<>\[\],.?]+\s+([A-Za-z_]\w*)\s*[(<]"
            }
            Language::Protobuf => r"^\s*(?:message|enum|service|rpc|oneof|extend)\s+([A-Za-z_][\w.]*)",
        }
    }

    /// @ai:intent Get file extensions for this language
    /// @ai:effects pure
    pub fn extensions(&self) -> &[&str] {
        match self {
            Language::Rust => &["rs"],
            Language::Python => &["py", "pyi"],
            Language::TypeScript => &["ts", "tsx"],
            Language::JavaScript => &["js", "jsx", "mjs"],
            Language::Go => &["go"],
            Language::Java => &["java"],
            Language::C => &["c", "h"],
            Language::Cpp => &["cpp", "cc", "cxx", "hpp", "hh", "hxx"],
            Language::Kotlin => &["kt", "kts"],
            Language::CSharp => &["cs"],
            Language::Protobuf => &["proto"],
        }
    }

    /// @ai:intent Get language name as string
    /// @ai:effects pure
    pub fn name(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Kotlin => "kotlin",
            Language::CSharp => "csharp",
            Language::Protobuf => "protobuf",
        }
    }

    /// @ai:intent Build the dialect descriptor for this built-in language
    pub fn dialect(&self) -> Result<Dialect> {
        Dialect::new(
            self.name(),
            self.extensions().iter().map(|ext| ext.to_string()).collect(),
            self.comment_syntax(),
            Some(self.declaration_pattern()),
        )
    }
}

/// @ai:intent Detect the programming language from a file path
/// @ai:pre path is a valid file path
/// @ai:post result is Some if extension is recognized
/// @ai:example ("test.rs") -> Some(Rust)
/// @ai:example ("test.py") -> Some(Python)
/// @ai:example ("test.txt") -> None
/// @ai:effects pure
pub fn detect_language(path: &Path) -> Option<Language> {
    let ext = path.extension()?.to_str()?;

    ALL_LANGUAGES
        .into_iter()
        .find(|lang| lang.extensions().contains(&ext))
}

/// @ai:intent Comment syntax plus declaration heuristic for one family of files
///
/// Built-in languages and `[[language]]` config tables both end up here.
#[derive(Debug, Clone)]
pub struct Dialect {
    pub name: String,
    pub extensions: Vec<String>,
    pub syntax: CommentSyntax,
    declaration: Option<Regex>,
}

impl Dialect {
    /// @ai:intent Create a dialect, compiling its declaration regex
    /// @ai:pre without a pattern no code line counts as a declaration
    /// @ai:post Err if the pattern is not a valid regex
    pub fn new(
        name: impl Into<String>,
        extensions: Vec<String>,
        syntax: CommentSyntax,
        declaration: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            extensions,
            syntax,
            declaration: declaration.map(Regex::new).transpose()?,
        })
    }

    pub fn handles(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|known| known == ext))
    }
}

impl SymbolHeuristic for Dialect {
    fn is_declaration(&self, code: &str) -> bool {
        self.declaration
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(code))
    }

    fn symbol_name(&self, code: &str) -> Option<String> {
        let captures = self.declaration.as_ref()?.captures(code)?;
        captures
            .iter()
            .skip(1)
            .flatten()
            .next()
            .map(|m| m.as_str().to_string())
    }
}

/// @ai:intent Lookup table from file extension to dialect
#[derive(Debug, Clone, Default)]
pub struct DialectRegistry {
    dialects: Vec<Arc<Dialect>>,
}

impl DialectRegistry {
    /// @ai:intent Registry preloaded with every built-in language
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::default();
        for language in ALL_LANGUAGES {
            registry.register(language.dialect()?);
        }
        Ok(registry)
    }

    /// @ai:intent Add a dialect, replacing one with the same name
    /// @ai:post later registrations win extension lookups
    pub fn register(&mut self, dialect: Dialect) {
        self.dialects.retain(|existing| existing.name != dialect.name);
        self.dialects.push(Arc::new(dialect));
    }

    /// @ai:intent Find the dialect that handles a file
    /// @ai:effects pure
    pub fn detect(&self, path: &Path) -> Option<Arc<Dialect>> {
        self.dialects
            .iter()
            .rev()
            .find(|dialect| dialect.handles(path))
            .cloned()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Dialect>> {
        self.dialects.iter().find(|d| d.name == name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.dialects.iter().map(|d| d.name.as_str())
    }
}
