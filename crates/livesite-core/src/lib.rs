//! # livesite-core
//!
//! Core functionality for livesite - a scheduled agent that keeps a static
//! HTML page evolving by patching generated content into it.
//!
//! The crate treats sub-trees of the page as named, hashed sections, decides
//! each cycle which one is due for a change, and merges whatever the
//! generator returns back into the page without ever leaving it broken.
//!
//! ## Architecture
//!
//! - **Document model**: lenient HTML parsing, CSS-subset queries and
//!   validated mutations ([`dom`])
//! - **Sections**: deterministic identifiers and content hashes ([`sections`])
//! - **Staleness**: per-section modification times and weighted target
//!   selection ([`staleness`], [`random`])
//! - **Classification and patching**: shape detection and the fallback chain
//!   of patch strategies ([`classify`], [`patch`])
//! - **Persistence**: atomic writes, backups and the JSON state file
//!   ([`storage`], [`state`])
//! - **Cycle**: inputs, prompt, generator and orchestration ([`cycle`])
//!
//! ## Quick Start
//!
//! ```rust
//! use livesite_core::classify::classify;
//! use livesite_core::dom::Document;
//! use livesite_core::patch::PatchApplier;
//! use livesite_core::sections::SectionIndexer;
//! use livesite_core::staleness::Target;
//! use livesite_core::Config;
//!
//! let config = Config::default();
//! let mut doc = Document::parse(r#"<body><div id="contact">Old</div></body>"#)?;
//! let index = SectionIndexer::from_config(&config)?.index(&doc);
//!
//! let content = classify(r#"<div id="contact">New</div>"#)?;
//! let target = Target::Concrete("section_contact".into());
//! PatchApplier::from_config(&config)?.apply(&mut doc, &index, &content, &target, chrono::Utc::now())?;
//!
//! let contact = doc.find_by_id("contact").unwrap();
//! assert_eq!(doc.text_content(contact), "New");
//! # Ok::<(), livesite_core::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`]. Errors carry a stable
//! category for logging and a recoverability hint:
//!
//! ```rust
//! use livesite_core::{Error, dom::Document};
//!
//! match Document::parse("<p>\0</p>") {
//!     Ok(_) => unreachable!(),
//!     Err(Error::Parse(msg)) => assert!(!msg.is_empty()),
//!     Err(e) => panic!("unexpected {}", e.category()),
//! }
//! ```

/// Content classification of generated text
pub mod classify;
/// Configuration loading and validation
pub mod config;
/// Wake-up cycle orchestration
pub mod cycle;
/// Arena-backed HTML document model
pub mod dom;
/// Error types and result aliases
pub mod error;
/// Text generator collaborator
pub mod generator;
/// Operator message inbox
pub mod inbox;
/// News headline scraping
pub mod news;
/// Patch strategies and their fallback chain
pub mod patch;
/// Prompt assembly
pub mod prompt;
/// Injectable randomness
pub mod random;
/// Section identifiers and hashes
pub mod sections;
/// Staleness tracking and target selection
pub mod staleness;
/// Persisted agent state
pub mod state;
/// Document storage, backups and locking
pub mod storage;
/// Default document
pub mod template;

// Re-export commonly used types
pub use classify::{Classification, ContentKind};
pub use config::Config;
pub use cycle::{Agent, CycleReport, SetupReport};
pub use dom::Document;
pub use error::{Error, Result};
pub use generator::{AnthropicGenerator, Generator};
pub use patch::{PatchApplier, PatchOutcome, Strategy};
pub use random::{RandomSource, StdRandom};
pub use sections::{Section, SectionIndex, SectionIndexer, SectionKind};
pub use staleness::{AnalysisReport, StalenessTracker, Target};
