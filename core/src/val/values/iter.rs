use std::sync::{Arc, Mutex, PoisonError};

use core::fmt;

use super::{RangeValue, Val};

/// State machine behind an iterator value.
pub trait IteratorState: Send + 'static {
    /// Advance and return the next element, or `None` once exhausted.
    fn next_val(&mut self) -> Option<Val>;

    fn debug_name(&self) -> &'static str {
        "iterator"
    }
}

/// Shared handle to a stateful iterator.
///
/// `FOR_ITER` advances through `&self`, so the state sits behind a mutex.
pub struct IteratorValue {
    state: Mutex<Box<dyn IteratorState>>,
}

impl fmt::Debug for IteratorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("IteratorValue")
            .field("kind", &guard.debug_name())
            .finish()
    }
}

impl IteratorValue {
    pub fn new<S>(state: S) -> Arc<Self>
    where
        S: IteratorState,
    {
        Arc::new(Self {
            state: Mutex::new(Box::new(state)),
        })
    }

    pub fn next(&self) -> Option<Val> {
        // A panic mid-advance leaves the state at worst one element ahead.
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        guard.next_val()
    }
}

pub(crate) struct SeqIter {
    items: Arc<[Val]>,
    pos: usize,
}

impl SeqIter {
    pub(crate) fn new(items: Arc<[Val]>) -> Self {
        Self { items, pos: 0 }
    }
}

impl IteratorState for SeqIter {
    fn next_val(&mut self) -> Option<Val> {
        let item = self.items.get(self.pos)?.clone();
        self.pos += 1;
        Some(item)
    }

    fn debug_name(&self) -> &'static str {
        "sequence_iterator"
    }
}

pub(crate) struct StrIter {
    text: Arc<str>,
    pos: usize,
}

impl StrIter {
    pub(crate) fn new(text: Arc<str>) -> Self {
        Self { text, pos: 0 }
    }
}

impl IteratorState for StrIter {
    fn next_val(&mut self) -> Option<Val> {
        let c = self.text[self.pos..].chars().next()?;
        self.pos += c.len_utf8();
        let mut buf = [0u8; 4];
        Some(Val::str(c.encode_utf8(&mut buf)))
    }

    fn debug_name(&self) -> &'static str {
        "str_iterator"
    }
}

pub(crate) struct RangeIter {
    range: RangeValue,
    index: usize,
}

impl RangeIter {
    pub(crate) fn new(range: RangeValue) -> Self {
        Self { range, index: 0 }
    }
}

impl IteratorState for RangeIter {
    fn next_val(&mut self) -> Option<Val> {
        let v = self.range.get(self.index)?;
        self.index += 1;
        Some(Val::Int(v))
    }

    fn debug_name(&self) -> &'static str {
        "range_iterator"
    }
}
