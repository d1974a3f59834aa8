//! Language registry.
//!
//! A closed set of [`LanguageId`]s, each described by a pure-data
//! [`LanguageProfile`]: the file extensions it claims, a comment-line
//! pattern, and a section-boundary pattern (function/class/block openers).
//! The truncator only sees a profile through the [`SyntaxRules`] capability
//! pair, so adding a language never touches the truncation code.
//!
//! The registry is built once at startup from the enabled/disabled language
//! selection and is read-only afterwards.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Identity of a supported language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageId {
    Python,
    Javascript,
    Java,
    Go,
    Cpp,
    Csharp,
    Ruby,
    Php,
    Rust,
    Swift,
    Kotlin,
    Bash,
}

impl LanguageId {
    pub const ALL: [LanguageId; 12] = [
        LanguageId::Python,
        LanguageId::Javascript,
        LanguageId::Java,
        LanguageId::Go,
        LanguageId::Cpp,
        LanguageId::Csharp,
        LanguageId::Ruby,
        LanguageId::Php,
        LanguageId::Rust,
        LanguageId::Swift,
        LanguageId::Kotlin,
        LanguageId::Bash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageId::Python => "python",
            LanguageId::Javascript => "javascript",
            LanguageId::Java => "java",
            LanguageId::Go => "go",
            LanguageId::Cpp => "cpp",
            LanguageId::Csharp => "csharp",
            LanguageId::Ruby => "ruby",
            LanguageId::Php => "php",
            LanguageId::Rust => "rust",
            LanguageId::Swift => "swift",
            LanguageId::Kotlin => "kotlin",
            LanguageId::Bash => "bash",
        }
    }

    /// Human-readable name used in artifact headings.
    pub fn display_name(&self) -> &'static str {
        match self {
            LanguageId::Python => "Python",
            LanguageId::Javascript => "JavaScript",
            LanguageId::Java => "Java",
            LanguageId::Go => "Go",
            LanguageId::Cpp => "C++",
            LanguageId::Csharp => "C#",
            LanguageId::Ruby => "Ruby",
            LanguageId::Php => "PHP",
            LanguageId::Rust => "Rust",
            LanguageId::Swift => "Swift",
            LanguageId::Kotlin => "Kotlin",
            LanguageId::Bash => "Bash",
        }
    }

    fn patterns(&self) -> BuiltinPatterns {
        match self {
            LanguageId::Python => BuiltinPatterns {
                extensions: &["py"],
                comment: r"^\s*#",
                section: r"^\s*(def|class|async\s+def)\b",
            },
            LanguageId::Javascript => BuiltinPatterns {
                extensions: &["js", "jsx", "ts", "tsx"],
                comment: r"^\s*//|^\s*/\*|^\s*\*",
                section: r"^\s*(function|class|export\s+\w+)\b",
            },
            LanguageId::Java => BuiltinPatterns {
                extensions: &["java"],
                comment: r"^\s*//|^\s*/\*|^\s*\*",
                section: r"^\s*(public|private|protected|static)?\s*(class|interface|enum)\b",
            },
            LanguageId::Go => BuiltinPatterns {
                extensions: &["go"],
                comment: r"^\s*//",
                section: r"^\s*(func|type)\b",
            },
            LanguageId::Cpp => BuiltinPatterns {
                extensions: &["cpp", "hpp", "cxx", "hxx"],
                comment: r"^\s*//|^\s*/\*|^\s*\*",
                section: r"^\s*(class|struct|enum|template|namespace)\b",
            },
            LanguageId::Csharp => BuiltinPatterns {
                extensions: &["cs"],
                comment: r"^\s*//|^\s*/\*|^\s*\*",
                section: r"^\s*(public|private|protected|internal)?\s*(class|struct|enum|namespace)\b",
            },
            LanguageId::Ruby => BuiltinPatterns {
                extensions: &["rb"],
                comment: r"^\s*#",
                section: r"^\s*(def|class|module)\b",
            },
            LanguageId::Php => BuiltinPatterns {
                extensions: &["php"],
                comment: r"^\s*//|^\s*#|^\s*/\*|^\s*\*",
                section: r"^\s*(function|class|trait)\b",
            },
            LanguageId::Rust => BuiltinPatterns {
                extensions: &["rs"],
                comment: r"^\s*//",
                section: r"^\s*(pub(\([^)]*\))?\s+)?(async\s+)?(fn|struct|enum|impl|trait|mod)\b",
            },
            LanguageId::Swift => BuiltinPatterns {
                extensions: &["swift"],
                comment: r"^\s*//",
                section: r"^\s*(func|class|struct|enum)\b",
            },
            LanguageId::Kotlin => BuiltinPatterns {
                extensions: &["kt"],
                comment: r"^\s*//|^\s*/\*|^\s*\*",
                section: r"^\s*(fun|class|object|interface)\b",
            },
            LanguageId::Bash => BuiltinPatterns {
                extensions: &["sh"],
                comment: r"^\s*#",
                section: r"^\s*(function)\b",
            },
        }
    }
}

impl fmt::Display for LanguageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LanguageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        LanguageId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = LanguageId::ALL.iter().map(|id| id.as_str()).collect();
                format!("Unknown language: '{}'. Known: {}", s, known.join(", "))
            })
    }
}

/// Raw pattern table entry before compilation.
struct BuiltinPatterns {
    extensions: &'static [&'static str],
    comment: &'static str,
    section: &'static str,
}

/// Line-level syntax capabilities used by the truncator.
pub trait SyntaxRules {
    /// True when the line is a comment line.
    fn is_comment(&self, line: &str) -> bool;
    /// True when the line opens a new structural section.
    fn is_section_start(&self, line: &str) -> bool;
}

/// Detection rules for one language.
#[derive(Debug, Clone)]
pub struct LanguageProfile {
    pub id: LanguageId,
    pub extensions: Vec<&'static str>,
    pub comment_pattern: Regex,
    pub section_pattern: Regex,
}

impl LanguageProfile {
    /// Compile the built-in profile for a language.
    pub fn builtin(id: LanguageId) -> Result<Self, regex::Error> {
        let patterns = id.patterns();
        Ok(Self {
            id,
            extensions: patterns.extensions.to_vec(),
            comment_pattern: Regex::new(patterns.comment)?,
            section_pattern: Regex::new(patterns.section)?,
        })
    }

    pub fn claims_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

impl SyntaxRules for LanguageProfile {
    fn is_comment(&self, line: &str) -> bool {
        self.comment_pattern.is_match(line)
    }

    fn is_section_start(&self, line: &str) -> bool {
        self.section_pattern.is_match(line)
    }
}

/// Which languages are active for a run.
///
/// A non-empty `enable` list wins: only those languages are active and
/// `disable` is ignored. Otherwise every language not in `disable` is active.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LanguageSelection {
    pub enable: Vec<LanguageId>,
    pub disable: Vec<LanguageId>,
}

impl LanguageSelection {
    pub fn is_enabled(&self, id: LanguageId) -> bool {
        if !self.enable.is_empty() {
            return self.enable.contains(&id);
        }
        !self.disable.contains(&id)
    }
}

/// The set of enabled language profiles.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    profiles: Vec<LanguageProfile>,
}

impl LanguageRegistry {
    /// Build a registry holding every enabled built-in profile.
    pub fn new(selection: &LanguageSelection) -> Result<Self, regex::Error> {
        let profiles = LanguageId::ALL
            .iter()
            .copied()
            .filter(|id| selection.is_enabled(*id))
            .map(LanguageProfile::builtin)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { profiles })
    }

    /// Registry with every built-in language enabled.
    pub fn all() -> Result<Self, regex::Error> {
        Self::new(&LanguageSelection::default())
    }

    /// Find the profile claiming a file extension (without the dot).
    pub fn for_extension(&self, ext: &str) -> Option<&LanguageProfile> {
        self.profiles.iter().find(|p| p.claims_extension(ext))
    }

    pub fn get(&self, id: LanguageId) -> Option<&LanguageProfile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    pub fn profiles(&self) -> &[LanguageProfile] {
        &self.profiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_builtin_patterns_compile() {
        let registry = LanguageRegistry::all().unwrap();
        assert_eq!(registry.profiles().len(), LanguageId::ALL.len());
    }

    #[test]
    fn extension_lookup() {
        let registry = LanguageRegistry::all().unwrap();
        assert_eq!(registry.for_extension("py").unwrap().id, LanguageId::Python);
        assert_eq!(registry.for_extension("TSX").unwrap().id, LanguageId::Javascript);
        assert_eq!(registry.for_extension("hpp").unwrap().id, LanguageId::Cpp);
        assert!(registry.for_extension("md").is_none());
    }

    #[test]
    fn enable_list_wins_over_disable() {
        let selection = LanguageSelection {
            enable: vec![LanguageId::Go],
            disable: vec![LanguageId::Go, LanguageId::Python],
        };
        let registry = LanguageRegistry::new(&selection).unwrap();
        assert!(registry.get(LanguageId::Go).is_some());
        assert!(registry.get(LanguageId::Python).is_none());
        assert!(registry.get(LanguageId::Rust).is_none());
    }

    #[test]
    fn disable_list_removes_language() {
        let selection = LanguageSelection {
            enable: vec![],
            disable: vec![LanguageId::Php],
        };
        let registry = LanguageRegistry::new(&selection).unwrap();
        assert!(registry.for_extension("php").is_none());
        assert!(registry.for_extension("rb").is_some());
    }

    #[test]
    fn section_and_comment_rules() {
        let python = LanguageProfile::builtin(LanguageId::Python).unwrap();
        assert!(python.is_section_start("def main():"));
        assert!(python.is_section_start("    async def fetch(self):"));
        assert!(python.is_section_start("class Handler(Base):"));
        assert!(!python.is_section_start("default = 3"));
        assert!(python.is_comment("  # note"));

        let rust = LanguageProfile::builtin(LanguageId::Rust).unwrap();
        assert!(rust.is_section_start("pub(crate) async fn run() {"));
        assert!(rust.is_section_start("impl Display for Thing {"));
        assert!(rust.is_comment("/// Docs"));
    }

    #[test]
    fn parse_language_ids() {
        assert_eq!("Python".parse::<LanguageId>().unwrap(), LanguageId::Python);
        assert_eq!(" csharp ".parse::<LanguageId>().unwrap(), LanguageId::Csharp);
        assert!("cobol".parse::<LanguageId>().is_err());
    }
}
