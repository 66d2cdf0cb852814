//! Render graph compiler and executor.
//!
//! Accepts a declarative description of a frame's rendering work — passes
//! that read and write GPU resources, possibly replicated across camera
//! views — and produces a validated, scheduled execution plan that runs
//! with bounded parallelism across host-supplied worker threads.
//!
//! Entry points: [`builder::Builder`] configures and compiles a
//! [`graph::Graph`]; [`cache::Cache`] keeps compiled graphs around across
//! frames so identical configurations skip recompilation.

#[macro_use]
extern crate log;

pub mod analyzer;
pub mod builder;
pub mod cache;
pub mod capability;
pub mod config;
pub mod descriptor;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod expansion;
pub mod graph;
pub mod handle;
pub mod pass;
pub mod pool;
pub mod promotion;
pub mod scheduler;
pub mod state;
pub mod tracker;

pub use builder::Builder;
pub use cache::{Cache, CacheKey, CacheStats};
pub use capability::{FrameContext, GraphicsLayer, IntegrationStats, PassCostProfiler, TaskExecutionContext, ThreadPool, ViewInfo};
pub use config::RenderGraphConfig;
pub use descriptor::{BufferDesc, FormatTag, ResourceDescriptor, ResourceKind, TextureDesc, UsageFlags};
pub use diagnostics::{DiagnosticsSink, Severity, ValidationError, ValidationErrorKind, ValidationResult};
pub use error::BuildError;
pub use executor::ExecutionStats;
pub use graph::Graph;
pub use handle::{PassHandle, ResourceHandle, ViewIndex};
pub use pass::{Pass, PassConfigurator};
pub use promotion::{OptimizationStrategy, SharedPromotionStrategy};
pub use state::{Queue, ResourceLifetime, ResourceState, Scope};
