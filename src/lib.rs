//! # Pony Mail Setup
//!
//! First-run provisioning for a Pony Mail archive.
//!
//! The setup run collects deployment parameters, creates the search index
//! with the archive's fixed document schema, and writes the configuration
//! files read by the archiver, the Lua request layer and the browser client.
//!
//! ## Pipeline
//!
//! ```text
//! ┌───────────┐   ┌────────────┐   ┌─────────────┐   ┌──────────┐
//! │ Bootstrap │──▶│ Parameters │──▶│  Provision  │──▶│   Emit   │
//! │ py client │   │ flags/file │   │ search index│   │ cfg, lua │
//! └───────────┘   │  /prompts  │   └─────────────┘   │  js seed │
//!                 └────────────┘                     └──────────┘
//! ```
//!
//! Every stage runs once, in order. A failing stage ends the run.
//!
//! ## Quick Start
//!
//! ```bash
//! ponymail-setup --defaults                       # disposable local setup
//! ponymail-setup --dbhost es1 --generator full    # prompt for the rest
//! ponymail-setup --defaults --skiponexist         # safe to re-run
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`bootstrap`] | Archiver client pre-flight check and install |
//! | [`params`] | Deployment parameters and their builder |
//! | [`prompt`] | Interactive question loop |
//! | [`config`] | TOML preseed file |
//! | [`schema`] | Document-type mappings |
//! | [`engine`] | Search-engine admin client |
//! | [`provision`] | Index creation |
//! | [`emit`] | Config artifact rendering and writing |
//! | [`error`] | Error taxonomy |
//! | [`logging`] | Tracing subscriber setup |

pub mod bootstrap;
pub mod config;
pub mod emit;
pub mod engine;
pub mod error;
pub mod logging;
pub mod params;
pub mod prompt;
pub mod provision;
pub mod schema;
