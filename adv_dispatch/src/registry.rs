use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::table::{Handler, SharedHandler};

/// Named native handlers that room scripts refer to.
pub struct HandlerRegistry<C> {
    handlers: BTreeMap<String, SharedHandler<C>>,
}

impl<C> Default for HandlerRegistry<C> {
    fn default() -> Self {
        HandlerRegistry {
            handlers: BTreeMap::new(),
        }
    }
}

impl<C> HandlerRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, returning any handler it replaced.
    pub fn register<H>(&mut self, name: impl Into<String>, handler: H) -> Option<SharedHandler<C>>
    where
        H: Handler<C> + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler))
    }

    pub fn get(&self, name: &str) -> Option<&SharedHandler<C>> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<C> fmt::Debug for HandlerRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}
