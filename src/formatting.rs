//! The formatting engine: mark store, resolution index, and the change
//! computer that turns each mutation into the minimal list of observable
//! format transitions.

use std::cmp::Ordering;

use enum_as_inner::EnumAsInner;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::{Anchor, AnchorType, Format, InternalString, Lamport, Mark, Position, TimestampMark};

use self::error::Error;
use self::index::{ResolutionIndex, SideStacks};
use self::span_builder::SpanBuilder;
use self::store::{MarkIdx, MarkStore};

pub mod anchor;
mod encoding;
pub mod error;
mod index;
mod span_builder;
mod store;

/// One observable formatting transition produced by
/// [`Formatting::add_mark`] / [`Formatting::delete_mark`].
#[derive(Clone, Debug, PartialEq)]
pub struct FormatChange<P> {
    pub start: Anchor<P>,
    pub end: Anchor<P>,
    pub key: InternalString,
    /// Winning value over `[start, end)` after the mutation; `Value::Null`
    /// means the key is no longer set there.
    pub value: Value,
    /// What the same key resolved to over the range immediately before the
    /// mutation; `None` when it was unset.
    pub previous_value: Option<Value>,
    /// The full format record over the range after the mutation.
    pub format: Format,
}

/// Maximal run of positions sharing one format, as enumerated by
/// [`Formatting::formatted_spans`].
#[derive(Clone, Debug, PartialEq)]
pub struct FormattedSpan<P> {
    pub start: Anchor<P>,
    pub end: Anchor<P>,
    pub format: Format,
}

/// What happened to one anchor-side stack during a mutation walk. Fed into
/// the span builder; only transitions at the top of a stack are observable.
#[derive(Clone, Debug, PartialEq, EnumAsInner)]
enum StackUpdate {
    /// The inserted mark took the top of its stack.
    Winner {
        displaced: Option<Value>,
        format: Format,
    },
    /// The removed mark had been the top; `value` is what the stack
    /// resolves to now (`Null` when it emptied).
    Exposed { value: Value, format: Format },
    /// The stack changed below its top, or not at all.
    Unchanged,
}

/// The formatting engine: an ordered set of marks plus the sparse
/// per-position index resolving them.
///
/// The resolved state is a pure function of the mark set; `add_mark` and
/// `delete_mark` are idempotent and commute. Only the *change records* they
/// return are order-sensitive, since those describe transitions.
pub struct Formatting<M: Mark> {
    store: MarkStore<M>,
    index: ResolutionIndex<M::Pos>,
}

impl<M: Mark> Default for Formatting<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Mark> Formatting<M> {
    pub fn new() -> Self {
        Self {
            store: MarkStore::new(),
            index: ResolutionIndex::new(),
        }
    }

    /// Number of marks currently stored.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.len() == 0
    }

    /// All marks, ascending under the precedence order.
    pub fn marks(&self) -> impl Iterator<Item = &M> + '_ {
        self.store.iter()
    }

    /// The format at `pos`: for each key, the value of the greatest-
    /// precedence mark covering the position, with `Null` winners omitted.
    ///
    /// The boundary sentinels are not positions and cannot be queried.
    pub fn get_format(&self, pos: &M::Pos) -> Result<Format, Error> {
        if *pos == <M::Pos>::min_pos() || *pos == <M::Pos>::max_pos() {
            return Err(Error::FormatAtBoundary);
        }
        Ok(format_of(self.index.effective_side(pos), &self.store))
    }

    /// Store `mark` and return the format changes it caused. Adding a mark
    /// equal (under the precedence order) to one already present is a no-op
    /// with an empty change list.
    pub fn add_mark(&mut self, mark: M) -> Result<Vec<FormatChange<M::Pos>>, Error> {
        mark.start().validate()?;
        mark.end().validate()?;
        if mark.start() >= mark.end() {
            return Err(Error::MarkRangeInvalid);
        }
        let (at, existing) = self.store.locate(&mark)?;
        if existing.is_some() {
            return Ok(Vec::new());
        }

        debug_log::group!("add_mark {:?} {:?}..{:?}", mark.key(), mark.start(), mark.end());
        let start = mark.start().clone();
        let end = mark.end().clone();
        let key = mark.key().clone();
        let value = mark.value().clone();
        let idx = self.store.insert_at(at, mark);
        self.index.create_data(&start);
        self.index.create_data(&end);

        let mut builder = SpanBuilder::new(|a: &StackUpdate, b: &StackUpdate| a == b);
        let store = &self.store;
        for (pos, data) in self.index.range_mut(&start.pos, &end.pos) {
            let first = *pos == start.pos;
            let last = *pos == end.pos;
            let before_in = (!first || start.type_ == AnchorType::Before)
                && (!last || end.type_ == AnchorType::After);
            let after_in = !last;
            if before_in {
                if let Some(side) = data.before.as_mut() {
                    let update = apply_insert(side, &key, idx, store);
                    builder.add(Anchor::before(pos.clone()), update);
                }
            }
            if after_in {
                if let Some(side) = data.after.as_mut() {
                    let update = apply_insert(side, &key, idx, store);
                    builder.add(Anchor::after(pos.clone()), update);
                }
            }
        }

        let mut changes = Vec::new();
        for span in builder.finish(end) {
            if let StackUpdate::Winner { displaced, format } = span.data {
                if displaced.as_ref() != Some(&value) {
                    changes.push(FormatChange {
                        start: span.start,
                        end: span.end,
                        key: key.clone(),
                        value: value.clone(),
                        previous_value: displaced,
                        format,
                    });
                }
            }
        }
        debug_log::debug_log!("{} change records", changes.len());
        debug_log::group_end!();
        Ok(changes)
    }

    /// Remove the canonical mark equal to `mark` under the precedence order
    /// and return the format changes. Deleting an absent mark is a no-op
    /// with an empty change list.
    pub fn delete_mark(&mut self, mark: &M) -> Result<Vec<FormatChange<M::Pos>>, Error> {
        let (at, existing) = self.store.locate(mark)?;
        let Some(idx) = existing else {
            return Ok(Vec::new());
        };

        let (start, end, key, value) = {
            let canonical = self.store.get(idx);
            (
                canonical.start().clone(),
                canonical.end().clone(),
                canonical.key().clone(),
                canonical.value().clone(),
            )
        };
        debug_log::group!("delete_mark {:?} {:?}..{:?}", key, start, end);
        self.store.unlink(at);
        self.index.create_data(&start);
        self.index.create_data(&end);

        let mut builder = SpanBuilder::new(|a: &StackUpdate, b: &StackUpdate| a == b);
        let store = &self.store;
        for (pos, data) in self.index.range_mut(&start.pos, &end.pos) {
            let first = *pos == start.pos;
            let last = *pos == end.pos;
            let before_in = (!first || start.type_ == AnchorType::Before)
                && (!last || end.type_ == AnchorType::After);
            let after_in = !last;
            if before_in {
                if let Some(side) = data.before.as_mut() {
                    let update = apply_remove(side, &key, idx, store);
                    builder.add(Anchor::before(pos.clone()), update);
                }
            }
            if after_in {
                if let Some(side) = data.after.as_mut() {
                    let update = apply_remove(side, &key, idx, store);
                    builder.add(Anchor::after(pos.clone()), update);
                }
            }
        }

        let spans = builder.finish(end);
        self.store.release(idx);

        let mut changes = Vec::new();
        for span in spans.into_iter().filter(|s| !s.data.is_unchanged()) {
            if let StackUpdate::Exposed {
                value: new_value,
                format,
            } = span.data
            {
                if new_value != value {
                    changes.push(FormatChange {
                        start: span.start,
                        end: span.end,
                        key: key.clone(),
                        value: new_value,
                        previous_value: Some(value.clone()),
                        format,
                    });
                }
            }
        }
        debug_log::group_end!();
        Ok(changes)
    }

    /// Enumerate the whole sequence as maximal single-format spans: a
    /// gap-free cover of `[MIN_ANCHOR, MAX_ANCHOR)` in which neighbors
    /// differ in at least one key.
    pub fn formatted_spans(&self) -> Vec<FormattedSpan<M::Pos>> {
        let mut builder = SpanBuilder::new(|a: &Format, b: &Format| a == b);
        for (pos, data) in self.index.iter() {
            if let Some(before) = &data.before {
                builder.add(Anchor::before(pos.clone()), format_of(before, &self.store));
            }
            if let Some(after) = &data.after {
                builder.add(Anchor::after(pos.clone()), format_of(after, &self.store));
            }
        }
        builder
            .finish(Anchor::max())
            .into_iter()
            .map(|span| FormattedSpan {
                start: span.start,
                end: span.end,
                format: span.data,
            })
            .collect()
    }

    /// Drop every mark and reset the index to its seeded state.
    pub fn clear(&mut self) {
        self.store.clear();
        self.index = ResolutionIndex::new();
    }

    /// The saved state: all marks in ascending precedence order.
    pub fn save(&self) -> Vec<M> {
        self.store.iter().cloned().collect()
    }

    /// Replace the state with `marks`. Input is normally a prior
    /// [`Formatting::save`]; unsorted or duplicated input is tolerated.
    pub fn load(&mut self, marks: Vec<M>) -> Result<(), Error> {
        self.clear();
        for mark in marks {
            self.add_mark(mark)?;
        }
        Ok(())
    }

    /// Compact byte form of [`Formatting::save`], compressed when large.
    pub fn export(&self) -> Vec<u8>
    where
        M: Serialize,
    {
        encoding::encode(&self.save())
    }

    /// Replace the state with marks decoded from [`Formatting::export`]
    /// bytes.
    pub fn import(&mut self, bytes: &[u8]) -> Result<(), Error>
    where
        M: DeserializeOwned,
    {
        self.load(encoding::decode(bytes)?)
    }
}

/// Insert `idx` into the side's stack for `key`, keeping ascending
/// precedence order.
fn apply_insert<M: Mark>(
    side: &mut SideStacks,
    key: &InternalString,
    idx: MarkIdx,
    store: &MarkStore<M>,
) -> StackUpdate {
    let stack = side.entry(key.clone()).or_default();
    let displaced = stack.last().map(|&top| store.get(top).value().clone());
    let mark = store.get(idx);
    let mut at = stack.len();
    while at > 0 && mark.compare(store.get(stack[at - 1])) == Ordering::Less {
        at -= 1;
    }
    let is_top = at == stack.len();
    stack.insert(at, idx);
    if is_top {
        StackUpdate::Winner {
            displaced,
            format: format_of(side, store),
        }
    } else {
        StackUpdate::Unchanged
    }
}

/// Remove `idx` from the side's stack for `key`; empty stacks are deleted.
fn apply_remove<M: Mark>(
    side: &mut SideStacks,
    key: &InternalString,
    idx: MarkIdx,
    store: &MarkStore<M>,
) -> StackUpdate {
    let mut was_top = false;
    let mut found = false;
    if let Some(stack) = side.get_mut(key) {
        if let Some(at) = stack.iter().position(|&i| i == idx) {
            found = true;
            was_top = at + 1 == stack.len();
            stack.remove(at);
        }
        if stack.is_empty() {
            side.remove(key);
        }
    }
    if !found || !was_top {
        return StackUpdate::Unchanged;
    }
    let value = side
        .get(key)
        .and_then(|stack| stack.last())
        .map(|&top| store.get(top).value().clone())
        .unwrap_or(Value::Null);
    StackUpdate::Exposed {
        value,
        format: format_of(side, store),
    }
}

fn format_of<M: Mark>(side: &SideStacks, store: &MarkStore<M>) -> Format {
    let mut format = Format::default();
    for (key, stack) in side {
        if let Some(&top) = stack.last() {
            let value = store.get(top).value();
            if !value.is_null() {
                format.insert(key.clone(), value.clone());
            }
        }
    }
    format
}

/// [`Formatting`] over [`TimestampMark`]s, stamping fresh marks with this
/// replica's id and a Lamport counter kept one past the greatest timestamp
/// observed, so locally created marks always win over observed ones.
pub struct TimestampFormatting<P: Position> {
    inner: Formatting<TimestampMark<P>>,
    replica: InternalString,
    max_timestamp: Lamport,
}

impl<P: Position> TimestampFormatting<P> {
    pub fn new(replica: impl Into<InternalString>) -> Self {
        Self {
            inner: Formatting::new(),
            replica: replica.into(),
            max_timestamp: 0,
        }
    }

    pub fn replica(&self) -> &InternalString {
        &self.replica
    }

    /// A fresh mark stamped with this replica and the next timestamp. The
    /// mark is not stored; pass it to [`TimestampFormatting::add_mark`].
    pub fn new_mark(
        &mut self,
        start: Anchor<P>,
        end: Anchor<P>,
        key: impl Into<InternalString>,
        value: Value,
    ) -> TimestampMark<P> {
        self.max_timestamp += 1;
        TimestampMark {
            start,
            end,
            key: key.into(),
            value,
            creator: self.replica.clone(),
            timestamp: self.max_timestamp,
        }
    }

    pub fn add_mark(&mut self, mark: TimestampMark<P>) -> Result<Vec<FormatChange<P>>, Error> {
        self.max_timestamp = self.max_timestamp.max(mark.timestamp);
        self.inner.add_mark(mark)
    }

    pub fn delete_mark(&mut self, mark: &TimestampMark<P>) -> Result<Vec<FormatChange<P>>, Error> {
        self.inner.delete_mark(mark)
    }

    pub fn get_format(&self, pos: &P) -> Result<Format, Error> {
        self.inner.get_format(pos)
    }

    pub fn formatted_spans(&self) -> Vec<FormattedSpan<P>> {
        self.inner.formatted_spans()
    }

    pub fn marks(&self) -> impl Iterator<Item = &TimestampMark<P>> + '_ {
        self.inner.marks()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn save(&self) -> Vec<TimestampMark<P>> {
        self.inner.save()
    }

    pub fn load(&mut self, marks: Vec<TimestampMark<P>>) -> Result<(), Error> {
        for mark in &marks {
            self.max_timestamp = self.max_timestamp.max(mark.timestamp);
        }
        self.inner.load(marks)
    }

    pub fn export(&self) -> Vec<u8>
    where
        P: Serialize,
    {
        self.inner.export()
    }

    pub fn import(&mut self, bytes: &[u8]) -> Result<(), Error>
    where
        P: DeserializeOwned,
    {
        let marks = encoding::decode(bytes)?;
        self.load(marks)
    }
}
