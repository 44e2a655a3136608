//! # Provider
//!
//! A resource provider framework: many interchangeable backends per kind of
//! resource, one picked per host, driven through an idempotent
//! query → diff → mutate → flush protocol.
//!
//! ## Core Concepts
//!
//! - **ResourceType / Resource**: attribute schema and one desired state
//! - **ProviderSpec**: a backend (confines, defaults, commands, features,
//!   lifecycle and setters), optionally inheriting from a parent
//! - **ProviderRegistry**: specs per resource type, in registration order
//! - **Session**: run-scoped state (facts, executor, command tables, caches)
//!   that binds, prefetches, syncs and flushes
//!
//! ## Example
//!
//! ```ignore
//! use provider::{
//!     HostFacts, ProviderRegistry, ProviderSpec, Resource, ResourceType, Session,
//!     SystemExecutor,
//! };
//! use std::sync::Arc;
//!
//! let mut registry = ProviderRegistry::new();
//! registry.register_type(ResourceType::new("package"))?;
//! registry.register(
//!     ProviderSpec::builder("package", "apt")
//!         .command("install", "apt-get")
//!         .lifecycle(AptLifecycle)
//!         .build(),
//! )?;
//!
//! let session = Session::new(Arc::new(registry), HostFacts::detect(), Arc::new(SystemExecutor));
//! let report = session.converge(vec![Resource::new("package", "nginx").ensure("present")]);
//! println!("{} changes", report.summary.total_changes());
//! ```
//!
//! ## Extension Points
//!
//! - [`Lifecycle`]: query/create/destroy (plus optional instances, latest,
//!   available_versions, flush)
//! - [`Setter`]: one per mutable property
//! - [`VersionScheme`]: version ordering and range matching
//! - [`Executor`]: how external commands run
//! - [`ProgressCallback`]: progress updates during convergence

pub mod command;
pub mod confine;
pub mod context;
pub mod diff;
pub mod error;
pub mod exec;
pub mod facts;
pub mod feature;
pub mod provider;
pub mod registry;
pub mod report;
pub mod resource;
#[cfg(any(test, feature = "test-utils"))]
pub mod scripted;
pub mod session;
pub mod sync;
pub mod value;
pub mod version;

// Re-export main types at crate root
pub use command::{CommandDecl, CommandLocator, CommandTable, Resolution};
pub use confine::{Confine, DefaultRule};
pub use context::{NoProgress, ProgressCallback, ProviderContext};
pub use diff::{Plan, PropertyChange};
pub use error::{ErrorCategory, ProviderError, Result};
pub use exec::{CommandOutput, Executor, Invocation, SystemExecutor};
pub use facts::HostFacts;
pub use feature::{Feature, FeatureSet};
pub use provider::{Lifecycle, Lookup, PropertyHash, ProviderSpec, ProviderSpecBuilder, Setter};
pub use registry::{ProviderRegistry, select_default, specificity};
pub use report::{ApplyResult, ResourceReport, RunReport, RunSummary};
pub use resource::{AttrKind, AttributeDef, Domain, ENSURE, Resource, ResourceType};
#[cfg(any(test, feature = "test-utils"))]
pub use scripted::ScriptedExecutor;
pub use session::{BindFailure, Session, SessionOptions};
pub use sync::{Observed, ProviderInstance};
pub use value::Value;
pub use version::{Pep440Scheme, SegmentScheme, SemverScheme, VersionScheme};
