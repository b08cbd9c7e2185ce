//! Resolution context
//!
//! Everything a service tree shares: the registry that acts as the service
//! factory, the rule engine, the locale resolver and an optional event log.
//! A context is cheap to clone; children receive their parent's.

use std::fmt;
use std::sync::Arc;

use crate::error::{Result, ServiceError};
use crate::event_log::{EventKind, EventLog};
use crate::fragment::ServiceDescriptor;
use crate::registry::ServiceRegistry;
use crate::rules::{BasicRules, RuleEngine};
use crate::service::Service;

pub type LocaleResolver = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Clone)]
pub struct Context {
    registry: Arc<ServiceRegistry>,
    rules: Arc<dyn RuleEngine>,
    locale: Option<LocaleResolver>,
    events: Option<EventLog>,
}

impl Context {
    pub fn builder(registry: impl Into<Arc<ServiceRegistry>>) -> ContextBuilder {
        ContextBuilder::new(registry.into())
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn rule_engine(&self) -> &dyn RuleEngine {
        self.rules.as_ref()
    }

    pub fn events(&self) -> Option<&EventLog> {
        self.events.as_ref()
    }

    /// Current locale, asked from the resolver on every call
    pub fn locale(&self) -> Result<String> {
        self.locale
            .as_ref()
            .map(|resolve| resolve())
            .ok_or(ServiceError::LocaleNotConfigured)
    }

    /// Record an event; the closure only runs when a log is attached
    pub(crate) fn emit(&self, kind: impl FnOnce() -> EventKind) {
        if let Some(events) = &self.events {
            events.emit(kind());
        }
    }

    /// Build a root service instance from a descriptor
    pub fn service(&self, descriptor: &ServiceDescriptor) -> Result<Service> {
        Service::new(self.clone(), descriptor)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("services", &self.registry.len())
            .field("locale", &self.locale.is_some())
            .field("events", &self.events)
            .finish()
    }
}

pub struct ContextBuilder {
    registry: Arc<ServiceRegistry>,
    rules: Option<Arc<dyn RuleEngine>>,
    locale: Option<LocaleResolver>,
    events: Option<EventLog>,
}

impl ContextBuilder {
    fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self {
            registry,
            rules: None,
            locale: None,
            events: None,
        }
    }

    pub fn rule_engine(mut self, engine: impl RuleEngine + 'static) -> Self {
        self.rules = Some(Arc::new(engine));
        self
    }

    /// Fixed locale
    pub fn locale(self, locale: impl Into<String>) -> Self {
        let locale = locale.into();
        self.locale_resolver(move || locale.clone())
    }

    pub fn locale_resolver<F>(mut self, resolve: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.locale = Some(Arc::new(resolve));
        self
    }

    pub fn event_log(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Context {
        Context {
            registry: self.registry,
            rules: self
                .rules
                .unwrap_or_else(|| Arc::new(BasicRules::new())),
            locale: self.locale,
            events: self.events,
        }
    }
}
