//! Immutable route table snapshot.
//!
//! # Responsibilities
//! - Hold the validated set of service descriptors
//! - Resolve a path to its longest matching prefix
//! - Produce a new table for every change (copy-on-write)
//!
//! # Design Decisions
//! - Entries sorted by prefix length, longest first, so the first hit wins
//! - O(n) prefix scan (acceptable for typical route counts)
//! - Explicit NotFound rather than silent default

use std::sync::Arc;

use serde::Serialize;

use crate::config::validation::{validate_services, ValidationError};
use crate::routing::descriptor::ServiceDescriptor;
use crate::routing::matcher::PathPrefixMatcher;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("no route for {0}")]
    NotFound(String),

    #[error("prefix {prefix} already routed to {existing}")]
    DuplicatePrefix { prefix: String, existing: String },

    #[error("service {0} already registered")]
    DuplicateService(String),

    #[error("invalid route table: {}", join(.0))]
    Invalid(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<Vec<ValidationError>> for RouteError {
    fn from(errors: Vec<ValidationError>) -> Self {
        match errors.as_slice() {
            [ValidationError::DuplicatePrefix { prefix, first, .. }] => RouteError::DuplicatePrefix {
                prefix: prefix.clone(),
                existing: first.clone(),
            },
            [ValidationError::DuplicateService(name)] => RouteError::DuplicateService(name.clone()),
            _ => RouteError::Invalid(errors),
        }
    }
}

#[derive(Debug, Clone)]
struct RouteEntry {
    matcher: PathPrefixMatcher,
    descriptor: Arc<ServiceDescriptor>,
}

/// A resolved route: the descriptor plus the path to send upstream.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub descriptor: Arc<ServiceDescriptor>,
    pub prefix: String,
    pub upstream_path: String,
}

/// Serializable view of one entry, for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct RouteSummary {
    pub prefix: String,
    pub service: String,
    pub upstream: String,
    pub auth_level: String,
    pub timeout_secs: u64,
}

/// A consistent, immutable set of routes.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    version: u64,
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    /// Build a table from descriptors, rejecting conflicts.
    pub fn build(version: u64, services: Vec<ServiceDescriptor>) -> Result<Self, RouteError> {
        validate_services(&services)?;

        let mut entries: Vec<RouteEntry> = services
            .into_iter()
            .map(|descriptor| RouteEntry {
                matcher: PathPrefixMatcher::new(&descriptor.path_prefix),
                descriptor: Arc::new(descriptor),
            })
            .collect();
        entries.sort_by(|a, b| {
            b.matcher
                .prefix()
                .len()
                .cmp(&a.matcher.prefix().len())
                .then_with(|| a.matcher.prefix().cmp(b.matcher.prefix()))
        });

        Ok(Self { version, entries })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve `path` by longest segment-aligned prefix.
    pub fn lookup(&self, path: &str) -> Result<RouteMatch, RouteError> {
        self.entries
            .iter()
            .find(|entry| entry.matcher.matches(path))
            .map(|entry| {
                let upstream_path = if entry.descriptor.strip_prefix {
                    entry.matcher.strip(path).to_string()
                } else {
                    path.to_string()
                };
                RouteMatch {
                    descriptor: entry.descriptor.clone(),
                    prefix: entry.matcher.prefix().to_string(),
                    upstream_path,
                }
            })
            .ok_or_else(|| RouteError::NotFound(path.to_string()))
    }

    pub fn service(&self, name: &str) -> Option<Arc<ServiceDescriptor>> {
        self.entries
            .iter()
            .find(|entry| entry.descriptor.name == name)
            .map(|entry| entry.descriptor.clone())
    }

    pub fn services(&self) -> impl Iterator<Item = &Arc<ServiceDescriptor>> {
        self.entries.iter().map(|entry| &entry.descriptor)
    }

    pub fn descriptors(&self) -> Vec<ServiceDescriptor> {
        self.services().map(|d| d.as_ref().clone()).collect()
    }

    /// A new table with `descriptor` added; `self` is left untouched.
    pub fn with_service(&self, descriptor: ServiceDescriptor) -> Result<Self, RouteError> {
        let mut services = self.descriptors();
        services.push(descriptor);
        Self::build(self.version + 1, services)
    }

    pub fn summaries(&self) -> Vec<RouteSummary> {
        self.entries
            .iter()
            .map(|entry| RouteSummary {
                prefix: entry.matcher.prefix().to_string(),
                service: entry.descriptor.name.clone(),
                upstream: entry.descriptor.authority(),
                auth_level: entry.descriptor.auth_level.to_string(),
                timeout_secs: entry.descriptor.timeout_secs,
            })
            .collect()
    }
}
