//! # Wraith
//!
//! Incremental, language-aware documentation and threat-flow generation for
//! source repositories.
//!
//! Wraith walks a repository, documents every supported source file with an
//! external text-generation service, condenses each document into a short
//! summary, and synthesizes a repository-level data-flow / threat diagram
//! from those summaries. Content fingerprints make reruns incremental: only
//! changed files reach the inference service.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ Walk+Filter  │──▶│ Fingerprint │──▶│  Generation  │──▶│  Aggregate  │
//! │ gitignore    │   │   Cache     │   │ truncate+LLM │   │ summary+    │
//! │ + languages  │   │  (changed)  │   │ bounded pool │   │ diagram     │
//! └──────────────┘   └─────────────┘   └──────────────┘   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=...
//! wraith run ./my-repo                     # writes ./my-repo/.wraith/
//! wraith run ./my-repo --dry-run           # show what would be regenerated
//! wraith run ./my-repo --enable-languages python,go --concurrency 8
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`languages`] | Language registry and syntax rules |
//! | [`filter`] | Ignore patterns and built-in deny-list |
//! | [`scan`] | Repository walk |
//! | [`fingerprint`] | Full and sampled content digests |
//! | [`cache`] | Change-detection cache and artifact store |
//! | [`truncate`] | Structure-aware truncation |
//! | [`inference`] | Inference client trait, retry policy, HTTP clients |
//! | [`prompts`] | Prompt templates |
//! | [`generate`] | Bounded-concurrency generation orchestrator |
//! | [`aggregate`] | Repository summary and diagram |
//! | [`pipeline`] | Top-level run |
//! | [`progress`] | Progress reporting |
//! | [`error`] | Error taxonomy |

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
pub mod filter;
pub mod fingerprint;
pub mod generate;
pub mod inference;
pub mod languages;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod scan;
pub mod truncate;
