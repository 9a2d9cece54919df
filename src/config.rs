//! @ai:module:intent Load the optional annotree.toml configuration
//! @ai:module:layer infrastructure
//! @ai:module:public_api Config, ScanConfig, CheckConfig, LinksConfig, LanguageConfig, CONFIG_FILE_NAME
//! @ai:module:depends_on language, parser, linter, reader, error
//! @ai:module:stateless true

use crate::error::{Error, Result};
use crate::language::{Dialect, DialectRegistry};
use crate::linter::FailPolicy;
use crate::parser::CommentSyntax;
use crate::reader::LinkFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// File looked up in the scan root when no `--config` is given.
pub const CONFIG_FILE_NAME: &str = "annotree.toml";

/// annotree configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub check: CheckConfig,

    #[serde(default)]
    pub links: LinksConfig,

    /// Extra or overriding comment syntaxes, one `[[language]]` table each
    #[serde(default, rename = "language")]
    pub languages: Vec<LanguageConfig>,
}

/// File discovery settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ScanConfig {
    /// Globs relative to the scan root; empty means every file
    #[serde(default)]
    pub include: Vec<String>,

    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// Silently skip files no dialect handles instead of failing the run
    #[serde(default = "default_skip_unknown_files")]
    pub skip_unknown_files: bool,
}

/// Exit policy settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct CheckConfig {
    #[serde(default)]
    pub fail_on: FailPolicy,
}

/// Source links printed next to occurrences
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct LinksConfig {
    /// Repository or file-server root, e.g. `https://github.com/org/repo`
    #[serde(default)]
    pub root: Option<String>,

    /// Template with `{root}`, `{path}` and `{line}` placeholders
    #[serde(default)]
    pub format: Option<String>,
}

impl LinksConfig {
    pub fn link_format(&self) -> Option<LinkFormat> {
        let root = self.root.as_deref()?;
        Some(LinkFormat::new(root, self.format.as_deref()))
    }
}

/// One `[[language]]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct LanguageConfig {
    pub name: String,

    pub extensions: Vec<String>,

    #[serde(default)]
    pub line_markers: Vec<String>,

    #[serde(default)]
    pub block_start: Option<String>,

    #[serde(default)]
    pub block_end: Option<String>,

    #[serde(default)]
    pub block_line_prefix: Option<String>,

    /// Escape-aware string quotes; `["\""]` when unset
    #[serde(default)]
    pub string_quotes: Option<Vec<char>>,

    /// Multi-line raw string quotes such as the backtick
    #[serde(default)]
    pub raw_string_quotes: Vec<char>,

    #[serde(default)]
    pub char_literals: bool,

    /// Regex matching declaration lines; its first matching group is the symbol name
    #[serde(default)]
    pub declaration: Option<String>,
}

fn default_exclude() -> Vec<String> {
    vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ]
}

fn default_skip_unknown_files() -> bool {
    true
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: default_exclude(),
            skip_unknown_files: default_skip_unknown_files(),
        }
    }
}

impl LanguageConfig {
    /// @ai:intent Turn the table into a dialect
    /// @ai:post Err when the table names no comment syntax or a half block pair
    pub fn to_dialect(&self) -> Result<Dialect> {
        let block = match (&self.block_start, &self.block_end) {
            (Some(start), Some(end)) => Some((start.as_str(), end.as_str())),
            (None, None) => None,
            _ => {
                return Err(Error::Config(format!(
                    "language `{}` must set both block-start and block-end",
                    self.name
                )))
            }
        };

        if self.line_markers.is_empty() && block.is_none() {
            return Err(Error::Config(format!(
                "language `{}` defines no comment markers",
                self.name
            )));
        }

        let markers: Vec<&str> = self.line_markers.iter().map(String::as_str).collect();
        let mut syntax = CommentSyntax::new(&markers, block);
        if let Some(prefix) = &self.block_line_prefix {
            syntax = syntax.with_block_line_prefix(prefix);
        }
        if let Some(quotes) = &self.string_quotes {
            syntax = syntax.with_string_quotes(quotes);
        }
        syntax = syntax.with_raw_string_quotes(&self.raw_string_quotes);
        if self.char_literals {
            syntax = syntax.with_char_literals();
        }

        let extensions = self
            .extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_string())
            .collect();

        Dialect::new(&self.name, extensions, syntax, self.declaration.as_deref())
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| Error::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Load `annotree.toml` from a directory, falling back to defaults
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if config_path.is_file() {
            tracing::debug!(path = %config_path.display(), "loading configuration");
            Self::load(&config_path)
        } else {
            Ok(Config::default())
        }
    }

    /// @ai:intent Built-in dialects plus the configured ones
    /// @ai:post configured languages replace built-ins of the same name
    pub fn dialects(&self) -> Result<DialectRegistry> {
        let mut registry = DialectRegistry::builtin()?;
        for language in &self.languages {
            registry.register(language.to_dialect()?);
        }
        Ok(registry)
    }
}
