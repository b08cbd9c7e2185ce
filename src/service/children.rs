//! Child services produced by loaders

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use super::Service;
use crate::error::Result;
use crate::event_log::EventKind;
use crate::fragment::ServiceDescriptor;
use crate::outcome::Outcome;

impl Service {
    /// Build, run and keep one child per descriptor
    ///
    /// A single descriptor becomes child `key`; a batch becomes `key.0`,
    /// `key.1`, … Every child is run even after one fails. Any failure marks
    /// `key` invalid and yields no value; otherwise the value is the child's
    /// result (or the array of results for a batch).
    pub(super) fn attach_children(
        &mut self,
        key: &str,
        descriptors: Vec<ServiceDescriptor>,
        batch: bool,
    ) -> Result<Option<Value>> {
        let mut results = Vec::with_capacity(descriptors.len());
        let mut failed = false;

        for (i, descriptor) in descriptors.into_iter().enumerate() {
            let child_key = if batch {
                format!("{}.{}", key, i)
            } else {
                key.to_string()
            };

            // labels handed down may reference this instance's names
            let names = descriptor
                .names
                .iter()
                .map(|(k, label)| Ok((k.clone(), self.resolve_bind_name(label)?)))
                .collect::<Result<IndexMap<_, _>>>()?;

            let path: Arc<str> = Arc::from(format!("{}.{}", self.path, child_key));
            let mut child = Service::spawn(
                self.ctx.clone(),
                &descriptor.service,
                descriptor.inputs,
                names,
                path,
            )?;

            self.ctx.emit(|| EventKind::ChildAttached {
                path: Arc::clone(&self.path),
                key: child_key.clone(),
                service: descriptor.service.clone(),
            });

            let outcome = child.run()?;
            debug!(path = %self.path, child = %child_key, ok = outcome.is_ok(), "child resolved");
            self.children.insert(child_key, child);

            match outcome {
                Outcome::Result(value) => results.push(value),
                Outcome::Errors(_) => {
                    failed = true;
                    self.invalidate(key);
                }
            }
        }

        if failed {
            return Ok(None);
        }

        Ok(if batch {
            Some(Value::Array(results))
        } else {
            results.pop()
        })
    }
}
