use std::fmt;
use std::sync::Arc;

use log::{debug, warn};

use crate::error::DispatchError;
use crate::pattern::Pattern;
use crate::trigger::Trigger;

/// Native code attached to a dispatch row.
///
/// `C` is whatever mutable state the owning room exposes to its handlers.
pub trait Handler<C>: Send + Sync {
    fn invoke(&self, ctx: &mut C, event: &Trigger);
}

impl<C, F> Handler<C> for F
where
    F: Fn(&mut C, &Trigger) + Send + Sync,
{
    fn invoke(&self, ctx: &mut C, event: &Trigger) {
        self(ctx, event)
    }
}

/// Handlers are shared read-only; a table never frees them on its own.
pub type SharedHandler<C> = Arc<dyn Handler<C>>;

pub struct DispatchRow<C> {
    pattern: Pattern,
    handler: SharedHandler<C>,
    label: Option<String>,
}

impl<C> DispatchRow<C> {
    pub fn new<H>(pattern: Pattern, handler: H) -> Self
    where
        H: Handler<C> + 'static,
    {
        Self::shared(pattern, Arc::new(handler))
    }

    pub fn shared(pattern: Pattern, handler: SharedHandler<C>) -> Self {
        DispatchRow {
            pattern,
            handler,
            label: None,
        }
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn handler(&self) -> &SharedHandler<C> {
        &self.handler
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl<C> Clone for DispatchRow<C> {
    fn clone(&self) -> Self {
        DispatchRow {
            pattern: self.pattern,
            handler: Arc::clone(&self.handler),
            label: self.label.clone(),
        }
    }
}

impl<C> fmt::Debug for DispatchRow<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchRow")
            .field("pattern", &self.pattern.to_string())
            .field("label", &self.label)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    Unbuilt,
    Built,
}

/// A row that sits behind an earlier, more general one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowedRow {
    pub row: usize,
    pub shadowed_by: usize,
}

fn find_shadowed<C>(rows: &[DispatchRow<C>]) -> Vec<ShadowedRow> {
    let mut shadowed = Vec::new();
    for (row, later) in rows.iter().enumerate() {
        let earlier = rows[..row]
            .iter()
            .position(|earlier| earlier.pattern.subsumes(&later.pattern));
        if let Some(shadowed_by) = earlier {
            shadowed.push(ShadowedRow { row, shadowed_by });
        }
    }
    shadowed
}

/// Ordered trigger table scanned linearly; the first matching row wins.
pub struct ActionDispatchTable<C> {
    rows: Vec<DispatchRow<C>>,
    state: TableState,
}

impl<C> Default for ActionDispatchTable<C> {
    fn default() -> Self {
        ActionDispatchTable {
            rows: Vec::new(),
            state: TableState::Unbuilt,
        }
    }
}

impl<C> ActionDispatchTable<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `rows` in order, replacing whatever the table held. Row order
    /// is taken as given.
    pub fn build<I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = DispatchRow<C>>,
    {
        let rows: Vec<DispatchRow<C>> = rows.into_iter().collect();
        debug!("dispatch table built with {} rows", rows.len());
        self.rows = rows;
        self.state = TableState::Built;
    }

    /// Like [`build`](Self::build), but refuses a row list in which some row
    /// can never fire because an earlier row already covers it. The table is
    /// left untouched on error.
    pub fn build_checked<I>(&mut self, rows: I) -> Result<(), DispatchError>
    where
        I: IntoIterator<Item = DispatchRow<C>>,
    {
        let rows: Vec<DispatchRow<C>> = rows.into_iter().collect();
        if let Some(first) = find_shadowed(&rows).first() {
            return Err(DispatchError::ShadowedRow {
                row: first.row,
                shadowed_by: first.shadowed_by,
                pattern: rows[first.row].pattern,
            });
        }
        self.build(rows);
        Ok(())
    }

    /// Rows of the current table that can never fire.
    pub fn shadowed_rows(&self) -> Vec<ShadowedRow> {
        let shadowed = find_shadowed(&self.rows);
        for entry in &shadowed {
            warn!(
                "dispatch row {} ({}) is shadowed by row {} ({})",
                entry.row,
                self.rows[entry.row].pattern,
                entry.shadowed_by,
                self.rows[entry.shadowed_by].pattern
            );
        }
        shadowed
    }

    pub fn state(&self) -> TableState {
        self.state
    }

    pub fn rows(&self) -> &[DispatchRow<C>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First row matching `event`, with its index.
    pub fn matched_row(&self, event: &Trigger) -> Option<(usize, &DispatchRow<C>)> {
        self.rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.pattern.matches(event))
    }

    /// Handler of the first matching row, or `None` when the event is not
    /// handled here.
    pub fn dispatch(&self, event: &Trigger) -> Option<&SharedHandler<C>> {
        self.matched_row(event).map(|(_, row)| &row.handler)
    }

    pub fn has_handler(&self, event: &Trigger) -> bool {
        self.matched_row(event).is_some()
    }

    /// Dispatch and run the handler. Returns whether anything ran.
    pub fn handle(&self, ctx: &mut C, event: &Trigger) -> bool {
        match self.dispatch(event) {
            Some(handler) => {
                handler.invoke(ctx, event);
                true
            }
            None => false,
        }
    }
}

impl<C> fmt::Debug for ActionDispatchTable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDispatchTable")
            .field("state", &self.state)
            .field("rows", &self.rows)
            .finish()
    }
}
