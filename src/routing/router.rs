//! Route lookup and atomic replacement.
//!
//! # Responsibilities
//! - Publish the current route table snapshot
//! - Look up the matching route for a request path
//! - Register a service or replace the whole table atomically
//!
//! # Design Decisions
//! - Readers load the snapshot without locking (arc-swap)
//! - Writers are serialized and build the next table before storing it
//! - A rejected update never touches the published table

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::routing::descriptor::ServiceDescriptor;
use crate::routing::table::{RouteError, RouteMatch, RouteTable};

/// Holder of the live route table.
#[derive(Debug)]
pub struct Router {
    current: ArcSwap<RouteTable>,
    writer: Mutex<()>,
}

impl Router {
    /// Create the router from the startup service list.
    pub fn from_services(services: Vec<ServiceDescriptor>) -> Result<Self, RouteError> {
        let table = RouteTable::build(1, services)?;
        Ok(Self {
            current: ArcSwap::from_pointee(table),
            writer: Mutex::new(()),
        })
    }

    /// The table every new request will see.
    pub fn snapshot(&self) -> Arc<RouteTable> {
        self.current.load_full()
    }

    pub fn lookup(&self, path: &str) -> Result<RouteMatch, RouteError> {
        self.current.load().lookup(path)
    }

    /// Add a single service.
    pub fn register(&self, descriptor: ServiceDescriptor) -> Result<Arc<RouteTable>, RouteError> {
        let _guard = self.writer.lock();
        let next = Arc::new(self.current.load().with_service(descriptor)?);
        self.current.store(next.clone());
        tracing::info!(version = next.version(), routes = next.len(), "Route registered");
        Ok(next)
    }

    /// Replace every route at once.
    pub fn update(&self, services: Vec<ServiceDescriptor>) -> Result<Arc<RouteTable>, RouteError> {
        let _guard = self.writer.lock();
        let version = self.current.load().version() + 1;
        let next = Arc::new(RouteTable::build(version, services)?);
        self.current.store(next.clone());
        tracing::info!(version, routes = next.len(), "Route table replaced");
        Ok(next)
    }
}
