// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Download orchestration for channel media.
//!
//! The [`Engine`] keeps a registry of active downloads, discovers new ones by
//! scanning channel history, and runs two supervisor loops:
//! - reconciliation: sweeps tasks, admits queued downloads under the
//!   parallelism cap, and cleans the source when the queue is empty
//! - listener: applies the source's push updates and scans on new messages
//!
//! The source and the store are injected as trait objects.

pub mod completion;
pub mod context;
pub mod control;
pub mod engine;
pub mod files;
pub mod registry;
pub mod scanner;
pub mod settings;
pub mod shutdown;
pub mod supervisor;
pub mod task;

pub use completion::Completion;
pub use control::{DownloadView, LiveState};
pub use engine::Engine;
pub use registry::TaskRegistry;
pub use settings::EngineSettings;
pub use supervisor::PassOutcome;
pub use task::{ErrorState, FileSnapshot, TaskLog, TaskState};
