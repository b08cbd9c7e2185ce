//! fservice - declarative service resolution
//!
//! Services are assembled from [`Fragment`]s (loaders, rules, callbacks,
//! promise lists, bind names and traits), flattened by the
//! [`ServiceRegistry`] and evaluated lazily by [`Service`].

pub mod bind_name;
pub mod catalog;
pub mod context;
pub mod deps;
pub mod error;
pub mod event_log;
pub mod fragment;
pub mod outcome;
pub mod registry;
pub mod request;
pub mod rules;
pub mod service;

pub use catalog::{builtin_registry, Outbox};
pub use context::{Context, ContextBuilder};
pub use deps::{Args, Dep};
pub use error::{FixSuggestion, Result, ServiceError};
pub use event_log::{Event, EventKind, EventLog};
pub use fragment::{Callback, Fragment, Loaded, Loader, ServiceDescriptor};
pub use outcome::Outcome;
pub use registry::{Blueprint, ServiceRegistry};
pub use request::Request;
pub use rules::{BasicRules, RuleEngine};
pub use service::Service;
