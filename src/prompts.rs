//! Prompt templates for the three kinds of inference calls.

use crate::languages::LanguageId;
use crate::models::RepositorySummary;

/// Full documentation for one (possibly truncated) file.
pub fn documentation_prompt(
    relative_path: &str,
    language: LanguageId,
    excerpt: &str,
    was_truncated: bool,
) -> String {
    let partial = if was_truncated {
        "The code below is a partial view: whole functions or classes were dropped to fit \
         the input limit, and the cut is marked with a truncation line. Document only what \
         is shown and do not guess at the missing parts.\n\n"
    } else {
        ""
    };
    format!(
        "You are an expert software engineer and technical writer. \
         Your task is to analyze the following {lang} code from `{path}` and generate \
         comprehensive documentation.\n\n\
         {partial}\
         Code:\n```{fence}\n{excerpt}\n```\n\n\
         Please provide:\n\
         1. A high-level overview of the code's purpose and functionality\n\
         2. Detailed description of key components, classes, and functions\n\
         3. Explanation of important algorithms, data structures, or patterns used\n\
         4. Any security considerations or potential vulnerabilities\n\
         5. Dependencies and integration points with other systems\n\n\
         Format your response in clear, well-structured markdown. \
         Use appropriate headings, code blocks, and bullet points for readability. \
         Focus on making the documentation useful for both developers and security engineers.",
        lang = language.display_name(),
        path = relative_path,
        fence = language.as_str(),
        partial = partial,
        excerpt = excerpt.trim_end(),
    )
}

/// Condense generated documentation into a short summary.
pub fn summary_prompt(relative_path: &str, documentation: &str) -> String {
    format!(
        "Summarize the following documentation for `{path}` in two or three sentences. \
         State what the file is responsible for, the main data it handles, and any \
         external systems it talks to. Reply with the summary only, no headings.\n\n\
         Documentation:\n{documentation}",
        path = relative_path,
        documentation = documentation.trim(),
    )
}

/// Attacker-perspective threat model for one documented file.
pub fn threat_model_prompt(relative_path: &str, language: LanguageId, documentation: &str) -> String {
    format!(
        "You are an application security penetration tester and threat modeler. \
         Using the documentation below for `{path}`, part of a {lang} codebase, write a \
         threat model from an attacker's point of view.\n\n\
         Documentation:\n{documentation}\n\n\
         Cover:\n\
         1. What the code does: features, user roles, authentication and authorization, \
         data flows, external integrations\n\
         2. Attack surface: input points, session handling, state transitions and \
         business workflows, data stores\n\
         3. Attack scenarios, only where the documentation gives clear evidence: the \
         functionality abused, the attack path step by step, the attacker position \
         needed, and the impact\n\
         4. Security weaknesses: missing validation, bypassable controls, trust \
         assumptions an attacker can break\n\
         5. Testing guide: payloads, techniques and tools to confirm each scenario\n\
         6. Impact assessment: exploitability, business impact, attack complexity, \
         detection likelihood\n\n\
         Reply in markdown. If the documentation shows nothing exploitable, say so in \
         one sentence instead of inventing threats.",
        path = relative_path,
        lang = language.display_name(),
        documentation = documentation.trim(),
    )
}

/// Repository-level data-flow / threat diagram from every file summary.
pub fn diagram_prompt(summary: &RepositorySummary) -> String {
    let mut listing = String::new();
    for (path, text) in &summary.entries {
        let one_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
        listing.push_str(&format!("- {}: {}\n", path, one_line));
    }
    format!(
        "You are an expert application security engineer and threat modeler. \
         Below is a summary of every documented file in a repository.\n\n\
         {listing}\n\
         Produce a single Mermaid `flowchart TD` diagram of the system as an attacker \
         would see it:\n\
         - external actors and entry points (user input, APIs, file uploads, CLIs)\n\
         - the main components, grouped into subgraphs per trust boundary\n\
         - data stores and external services\n\
         - data flows between them, labelled with the data that moves\n\
         - flows that cross a trust boundary marked with a dashed arrow\n\n\
         Only include elements supported by the summaries. \
         Reply with the Mermaid source only, without a code fence.",
        listing = listing,
    )
}

/// Fallback summary: the first paragraph of the documentation.
pub fn first_paragraph(documentation: &str) -> String {
    documentation
        .split("\n\n")
        .map(str::trim)
        .find(|p| !p.is_empty() && !p.starts_with('#'))
        .or_else(|| documentation.lines().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or_default()
        .to_string()
}
