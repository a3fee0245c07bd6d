//! Index-based facade pairing an external list with a
//! [`TimestampFormatting`] instance.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::formatting::anchor::span_from_slice;
use crate::formatting::{FormatChange, TimestampFormatting};
use crate::{index_of_anchor, Error, Expand, Format, InternalString, PositionList, TimestampMark};

#[cfg(test)]
mod test;

/// Per-key expand policy consulted by [`RichList::insert_with_format`].
pub type ExpandRule = dyn Fn(&InternalString, &Value) -> Expand;

/// Run of list indices `[start, end)` sharing one format.
#[derive(Clone, Debug, PartialEq)]
pub struct FormattedSlice {
    pub start: usize,
    pub end: usize,
    pub format: Format,
}

/// Saved state of a [`RichList`]: position-space metadata, then the list,
/// then the formatting marks. Loaded strictly in that order.
#[derive(Serialize, Deserialize)]
#[serde(bound(serialize = "P: Serialize", deserialize = "P: DeserializeOwned"))]
pub struct RichListSave<P> {
    order: Value,
    list: Value,
    formatting: Vec<TimestampMark<P>>,
}

/// A list of values with inline formatting. All operations take list
/// indices; spans and marks stay internal.
pub struct RichList<L: PositionList> {
    list: L,
    formatting: TimestampFormatting<L::Pos>,
    expand_rule: Option<Box<ExpandRule>>,
    on_new_mark: Option<Box<dyn FnMut(&TimestampMark<L::Pos>)>>,
}

impl<L: PositionList> RichList<L> {
    pub fn new(list: L, replica: impl Into<InternalString>) -> Self {
        Self {
            list,
            formatting: TimestampFormatting::new(replica),
            expand_rule: None,
            on_new_mark: None,
        }
    }

    /// Per-key expand policy for [`RichList::insert_with_format`]; without
    /// one, every key expands `After`.
    pub fn set_expand_rule(
        &mut self,
        rule: impl Fn(&InternalString, &Value) -> Expand + 'static,
    ) {
        self.expand_rule = Some(Box::new(rule));
    }

    /// Synchronous callback fired for every mark this facade creates, after
    /// the engine state is fully updated.
    pub fn set_on_new_mark(&mut self, hook: impl FnMut(&TimestampMark<L::Pos>) + 'static) {
        self.on_new_mark = Some(Box::new(hook));
    }

    pub fn list(&self) -> &L {
        &self.list
    }

    pub fn formatting(&self) -> &TimestampFormatting<L::Pos> {
        &self.formatting
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Insert plain values without touching formatting. Whatever marks
    /// cover the gap apply to them.
    pub fn insert_at(&mut self, index: usize, values: Vec<L::Item>) -> Vec<L::Pos> {
        self.list.insert_at(index, values)
    }

    /// Apply `key = value` over the slice `[start, end)`, creating and
    /// storing a fresh mark. Returns the mark and the observable format
    /// changes.
    pub fn format(
        &mut self,
        start: usize,
        end: usize,
        key: impl Into<InternalString>,
        value: Value,
        expand: Option<Expand>,
    ) -> Result<(TimestampMark<L::Pos>, Vec<FormatChange<L::Pos>>), Error> {
        let span = span_from_slice(&self.list, start, end, expand.unwrap_or(Expand::After))?;
        let mark = self.formatting.new_mark(span.start, span.end, key, value);
        let changes = self.formatting.add_mark(mark.clone())?;
        if let Some(hook) = self.on_new_mark.as_mut() {
            hook(&mark);
        }
        Ok((mark, changes))
    }

    /// Insert `values` at `index` so that they carry exactly `format`:
    /// whatever the inherited format lacks is patched with fresh marks over
    /// the inserted range, one per differing key, expanded per the rule.
    /// Returns the created marks.
    pub fn insert_with_format(
        &mut self,
        index: usize,
        format: &Format,
        values: Vec<L::Item>,
    ) -> Result<Vec<TimestampMark<L::Pos>>, Error> {
        if index > self.list.len() {
            return Err(Error::OutOfRange {
                start: index,
                end: index,
                len: self.list.len(),
            });
        }
        let count = values.len();
        let positions = self.list.insert_at(index, values);
        if count == 0 {
            return Ok(Vec::new());
        }

        let inherited = self.formatting.get_format(&positions[0])?;
        let mut needed: Vec<(InternalString, Value)> =
            diff_formats(&inherited, format).into_iter().collect();
        needed.sort_by(|a, b| {
            let x: &str = &a.0;
            let y: &str = &b.0;
            x.cmp(y)
        });

        let mut marks = Vec::with_capacity(needed.len());
        for (key, value) in needed {
            let expand = match &self.expand_rule {
                Some(rule) => rule(&key, &value),
                None => Expand::After,
            };
            let span = span_from_slice(&self.list, index, index + count, expand)?;
            let mark = self.formatting.new_mark(span.start, span.end, key, value);
            self.formatting.add_mark(mark.clone())?;
            if let Some(hook) = self.on_new_mark.as_mut() {
                hook(&mark);
            }
            marks.push(mark);
        }
        Ok(marks)
    }

    /// The resolved format of the value at `index`.
    pub fn get_format_at(&self, index: usize) -> Result<Format, Error> {
        if index >= self.list.len() {
            return Err(Error::OutOfRange {
                start: index,
                end: index + 1,
                len: self.list.len(),
            });
        }
        self.formatting.get_format(self.list.position_at(index))
    }

    /// Project [`TimestampFormatting::formatted_spans`] onto list indices,
    /// dropping empty slices and merging same-format neighbors. `window`
    /// restricts the result to `[start, end)`.
    pub fn formatted_slices(
        &self,
        window: Option<(usize, usize)>,
    ) -> Result<Vec<FormattedSlice>, Error> {
        let (lo, hi) = match window {
            Some((start, end)) => {
                if start > end || end > self.list.len() {
                    return Err(Error::OutOfRange {
                        start,
                        end,
                        len: self.list.len(),
                    });
                }
                (start, end)
            }
            None => (0, self.list.len()),
        };

        let mut slices: Vec<FormattedSlice> = Vec::new();
        for span in self.formatting.formatted_spans() {
            let start = index_of_anchor(&self.list, &span.start).max(lo);
            let end = index_of_anchor(&self.list, &span.end).min(hi);
            if start >= end {
                continue;
            }
            match slices.last_mut() {
                Some(last) if last.end == start && last.format == span.format => last.end = end,
                _ => slices.push(FormattedSlice {
                    start,
                    end,
                    format: span.format,
                }),
            }
        }
        Ok(slices)
    }

    /// Iterate `(position, value, format)` for every present item, in
    /// order, optionally restricted to the index window `[start, end)`.
    pub fn entries(&self, window: Option<(usize, usize)>) -> Result<Entries<'_, L>, Error> {
        let slices = self.formatted_slices(window)?;
        Ok(Entries {
            list: &self.list,
            slices: slices.into_iter(),
            current: None,
        })
    }

    pub fn save(&self) -> RichListSave<L::Pos> {
        RichListSave {
            order: self.list.save_order(),
            list: self.list.save_list(),
            formatting: self.formatting.save(),
        }
    }

    pub fn load(&mut self, saved: RichListSave<L::Pos>) -> Result<(), Error> {
        self.list.load_order(saved.order)?;
        self.list.load_list(saved.list)?;
        self.formatting.load(saved.formatting)
    }
}

/// Iterator over `(position, value, format)` triples of a [`RichList`].
pub struct Entries<'a, L: PositionList> {
    list: &'a L,
    slices: std::vec::IntoIter<FormattedSlice>,
    current: Option<(FormattedSlice, usize)>,
}

impl<'a, L: PositionList> Iterator for Entries<'a, L> {
    type Item = (L::Pos, &'a L::Item, Format);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((slice, cursor)) = self.current.as_mut() {
                if *cursor < slice.end {
                    let index = *cursor;
                    *cursor += 1;
                    return Some((
                        self.list.position_at(index).clone(),
                        self.list.value_at(index),
                        slice.format.clone(),
                    ));
                }
                self.current = None;
            }
            let slice = self.slices.next()?;
            let start = slice.start;
            self.current = Some((slice, start));
        }
    }
}

/// The changes needed to take `current` to `target`, ignoring `Null`
/// entries in either; `Null` in the result signals deletion of a key.
pub fn diff_formats(current: &Format, target: &Format) -> Format {
    let mut changes = Format::default();
    for (key, value) in target {
        if value.is_null() {
            continue;
        }
        if current.get(key) != Some(value) {
            changes.insert(key.clone(), value.clone());
        }
    }
    for (key, value) in current {
        if value.is_null() {
            continue;
        }
        let gone = match target.get(key) {
            None => true,
            Some(v) => v.is_null(),
        };
        if gone {
            changes.insert(key.clone(), Value::Null);
        }
    }
    changes
}
