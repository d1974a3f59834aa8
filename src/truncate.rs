//! Structure-aware truncation of source files.
//!
//! Oversized files are cut down to a token budget without splitting a
//! function, class, or other structural unit in half. The file is split at
//! lines matching the language's section pattern; comment lines directly
//! above a boundary travel with the section they document. The preamble
//! (imports, header comment) is always kept, then whole sections are appended
//! in file order until the next one would overflow the budget.
//!
//! Files where no boundary is detected fall back to whole-line truncation.
//! Whenever content is dropped, [`TRUNCATION_MARKER`] is appended on its own
//! line so the inference service knows it is looking at a partial view.

use crate::languages::SyntaxRules;

/// Approximate bytes-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// Smallest budget a run accepts. Below it the excerpt could hold nothing
/// but the marker.
pub const MIN_BUDGET_TOKENS: usize = 16;

/// Appended to every excerpt that dropped content.
pub const TRUNCATION_MARKER: &str = "…truncated…";

/// How the excerpt was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationStrategy {
    /// Content fit the budget.
    Unchanged,
    /// Whole structural sections were kept.
    Sections,
    /// No boundaries were found; whole lines were kept.
    Lines,
}

/// Result of [`truncate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    pub excerpt: String,
    pub was_truncated: bool,
    pub strategy: TruncationStrategy,
}

/// Estimate the token count of `text`.
pub fn estimate_tokens(text: &str) -> usize {
    tokens_for_len(text.len())
}

fn tokens_for_len(len: usize) -> usize {
    len.div_ceil(CHARS_PER_TOKEN)
}

/// Tokens reserved for the marker and the newlines around it.
fn marker_tokens() -> usize {
    tokens_for_len(TRUNCATION_MARKER.len() + 2)
}

/// Split `content` into contiguous structural sections.
///
/// Returns `None` when the rules detect no section boundary at all.
/// Otherwise the returned slices concatenate back to `content` exactly; the
/// first slice is the preamble when the file does not open with a boundary.
pub fn split_sections<'a, R: SyntaxRules + ?Sized>(
    content: &'a str,
    rules: &R,
) -> Option<Vec<&'a str>> {
    let mut starts: Vec<usize> = vec![0];
    let mut found_boundary = false;
    let mut comment_run: Option<usize> = None;
    let mut offset = 0usize;

    for line in content.split_inclusive('\n') {
        let text = line.trim_end_matches(['\n', '\r']);
        if rules.is_section_start(text) {
            found_boundary = true;
            let last = *starts.last().unwrap_or(&0);
            let start = match comment_run {
                Some(run) if run > last => run,
                _ => offset,
            };
            if start > last {
                starts.push(start);
            }
            comment_run = None;
        } else if rules.is_comment(text) {
            comment_run.get_or_insert(offset);
        } else {
            comment_run = None;
        }
        offset += line.len();
    }

    if !found_boundary {
        return None;
    }

    let mut sections = Vec::with_capacity(starts.len());
    for (i, start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(content.len());
        sections.push(&content[*start..end]);
    }
    Some(sections)
}

/// Truncate `content` to at most `budget_tokens` estimated tokens.
///
/// The only excerpt allowed to exceed the budget is one consisting of a
/// single oversized first section; it is kept whole rather than returning
/// an empty excerpt.
pub fn truncate<R: SyntaxRules + ?Sized>(
    content: &str,
    budget_tokens: usize,
    rules: &R,
) -> Truncation {
    if estimate_tokens(content) <= budget_tokens {
        return Truncation {
            excerpt: content.to_string(),
            was_truncated: false,
            strategy: TruncationStrategy::Unchanged,
        };
    }

    let available = budget_tokens.saturating_sub(marker_tokens());

    let (kept, strategy) = match split_sections(content, rules) {
        Some(sections) => (
            keep_whole_sections(&sections, available),
            TruncationStrategy::Sections,
        ),
        None => {
            tracing::debug!("no section boundaries detected, truncating by lines");
            (keep_whole_lines(content, available), TruncationStrategy::Lines)
        }
    };

    let mut excerpt = content[..kept].to_string();
    if !excerpt.is_empty() && !excerpt.ends_with('\n') {
        excerpt.push('\n');
    }
    excerpt.push_str(TRUNCATION_MARKER);
    excerpt.push('\n');

    Truncation {
        excerpt,
        was_truncated: true,
        strategy,
    }
}

/// Byte length of the longest prefix of whole sections within `available`.
/// The first section is always kept.
fn keep_whole_sections(sections: &[&str], available: usize) -> usize {
    let mut end = sections.first().map(|s| s.len()).unwrap_or(0);
    for section in sections.iter().skip(1) {
        if tokens_for_len(end + section.len()) > available {
            break;
        }
        end += section.len();
    }
    end
}

/// Byte length of the longest prefix of whole lines within `available`.
/// A first line longer than the budget is cut at a character boundary.
fn keep_whole_lines(content: &str, available: usize) -> usize {
    let mut end = 0usize;
    for line in content.split_inclusive('\n') {
        if tokens_for_len(end + line.len()) > available {
            break;
        }
        end += line.len();
    }
    if end == 0 {
        end = (available * CHARS_PER_TOKEN).min(content.len());
        while end > 0 && !content.is_char_boundary(end) {
            end -= 1;
        }
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::{LanguageId, LanguageProfile};

    fn python() -> LanguageProfile {
        LanguageProfile::builtin(LanguageId::Python).unwrap()
    }

    fn sample_python(functions: usize) -> String {
        let mut src = String::from("import os\nimport sys\n\n");
        for i in 0..functions {
            src.push_str(&format!("# Helper number {i}.\n"));
            src.push_str(&format!("def helper_{i}(value):\n"));
            src.push_str(&format!("    total = value * {i}\n"));
            src.push_str("    return total + len(os.environ)\n\n");
        }
        src
    }

    fn strip_marker(excerpt: &str) -> &str {
        excerpt
            .strip_suffix(&format!("{}\n", TRUNCATION_MARKER))
            .expect("marker present")
    }

    #[test]
    fn fits_budget_unchanged() {
        let src = sample_python(2);
        let result = truncate(&src, 10_000, &python());
        assert_eq!(result.excerpt, src);
        assert!(!result.was_truncated);
        assert_eq!(result.strategy, TruncationStrategy::Unchanged);
    }

    #[test]
    fn sections_reassemble_to_content() {
        let src = sample_python(5);
        let sections = split_sections(&src, &python()).unwrap();
        assert_eq!(sections.len(), 6);
        assert_eq!(sections.concat(), src);
        assert!(sections[0].starts_with("import os"));
        assert!(sections[1].starts_with("# Helper number 0."));
        assert!(sections[1].contains("def helper_0"));
    }

    #[test]
    fn file_opening_with_boundary_has_no_preamble() {
        let src = "def a():\n    pass\ndef b():\n    pass\n";
        let sections = split_sections(src, &python()).unwrap();
        assert_eq!(sections, vec!["def a():\n    pass\n", "def b():\n    pass\n"]);
    }

    #[test]
    fn header_comment_stays_in_preamble() {
        let src = "# Module header\ndef a():\n    pass\n";
        let sections = split_sections(src, &python()).unwrap();
        assert_eq!(sections, vec!["# Module header\n", "def a():\n    pass\n"]);
    }

    #[test]
    fn excerpt_within_budget_and_section_aligned() {
        let src = sample_python(40);
        let profile = python();
        let sections = split_sections(&src, &profile).unwrap();
        for budget in [30, 50, 80, 120, 200, 400] {
            let result = truncate(&src, budget, &profile);
            assert!(result.was_truncated, "budget {budget}");
            assert_eq!(result.strategy, TruncationStrategy::Sections);
            assert!(
                estimate_tokens(&result.excerpt) <= budget,
                "budget {budget} exceeded: {}",
                estimate_tokens(&result.excerpt)
            );
            let body = strip_marker(&result.excerpt);
            let mut prefix = String::new();
            let aligned = sections.iter().any(|s| {
                prefix.push_str(s);
                prefix == body
            });
            assert!(aligned, "budget {budget} cut inside a section");
        }
    }

    #[test]
    fn stops_at_first_overflowing_section() {
        let big_body = "    x = 1\n".repeat(200);
        let src = format!(
            "import os\ndef small():\n    pass\ndef huge():\n{big_body}def tail():\n    pass\n"
        );
        let result = truncate(&src, 40, &python());
        let body = strip_marker(&result.excerpt);
        assert_eq!(body, "import os\ndef small():\n    pass\n");
        assert!(!result.excerpt.contains("def tail"));
    }

    #[test]
    fn oversized_first_section_kept_whole() {
        let preamble = "import os\n".repeat(100);
        let src = format!("{preamble}def f():\n    pass\n");
        let result = truncate(&src, 20, &python());
        assert!(result.was_truncated);
        assert_eq!(strip_marker(&result.excerpt), preamble);
    }

    #[test]
    fn falls_back_to_lines_without_boundaries() {
        let src = (0..100)
            .map(|i| format!("value_{i} = {i}\n"))
            .collect::<String>();
        let result = truncate(&src, 30, &python());
        assert_eq!(result.strategy, TruncationStrategy::Lines);
        assert!(estimate_tokens(&result.excerpt) <= 30);
        let body = strip_marker(&result.excerpt);
        assert!(src.starts_with(body));
        assert!(body.ends_with('\n'));
        assert!(!body.is_empty());
    }

    #[test]
    fn single_long_line_cut_on_char_boundary() {
        let src = "é".repeat(500);
        let result = truncate(&src, 20, &python());
        assert_eq!(result.strategy, TruncationStrategy::Lines);
        assert!(estimate_tokens(&result.excerpt) <= 20);
        assert!(result.excerpt.ends_with(&format!("{}\n", TRUNCATION_MARKER)));
        assert!(result.excerpt.starts_with('é'));
    }
}
