//! # PDF Processor
//!
//! Upload a PDF, extract its text, and run one of three operations on it:
//! a bulleted summary, a full translation, or a question-answer chat grounded
//! in the document.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────────┐   ┌──────────────────┐
//! │ CLI / HTTP   │──▶│  DocumentProcessor   │──▶│ CompletionClient │
//! │ upload       │   │  stage machine       │   │ (chat endpoint)  │
//! └──────────────┘   └──────┬──────────┬────┘   └────────▲─────────┘
//!                           ▼          ▼                 │
//!                   ┌─────────────┐ ┌─────────────────────┴┐
//!                   │TextExtractor│ │ ConversationSession  │
//!                   │   (lopdf)   │ │ transcript           │
//!                   └─────────────┘ └──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENROUTER_API_KEY=...
//! pdfp summarize report.pdf
//! pdfp translate report.pdf
//! pdfp chat report.pdf
//! pdfp serve                    # HTTP upload surface
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`validate`] | Accept/reject contract for uploads |
//! | [`extract`] | Page-ordered PDF text extraction |
//! | [`completion`] | Chat-completion client |
//! | [`prompts`] | Operation and chat prompts |
//! | [`stage`] | Processing stage and its display mapping |
//! | [`progress`] | Stage and notice reporting |
//! | [`session`] | Document chat transcript |
//! | [`processor`] | Document state machine |
//! | [`server`] | HTTP server |

pub mod completion;
pub mod config;
pub mod extract;
pub mod models;
pub mod processor;
pub mod progress;
pub mod prompts;
pub mod server;
pub mod session;
pub mod stage;
pub mod validate;
