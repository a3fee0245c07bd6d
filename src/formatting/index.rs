use std::collections::BTreeMap;

use fxhash::FxHashMap;
use smallvec::SmallVec;

use crate::{Anchor, AnchorType, InternalString, Position};

use super::store::MarkIdx;

/// Per-key stacks for one anchor side, each ordered ascending by mark
/// precedence; the top of a stack is the current winner for that key.
/// Stacks are never left empty.
pub(crate) type SideStacks = FxHashMap<InternalString, SmallVec<[MarkIdx; 2]>>;

/// Anchor-side stacks for one position with formatting activity. A `None`
/// side means "same as whatever a walk to the left resolves to".
#[derive(Clone, Debug, Default)]
pub(crate) struct FormatData {
    pub before: Option<SideStacks>,
    pub after: Option<SideStacks>,
}

/// Sparse map from position to [`FormatData`], seeded with an entry at
/// `MIN_POS` whose `after` side is populated so that every left walk
/// terminates. Entries are created on demand at mark endpoints and retained
/// after the covering marks are gone.
#[derive(Debug)]
pub(crate) struct ResolutionIndex<P: Position> {
    map: BTreeMap<P, FormatData>,
}

impl<P: Position> ResolutionIndex<P> {
    pub fn new() -> Self {
        let mut map = BTreeMap::new();
        map.insert(
            P::min_pos(),
            FormatData {
                before: None,
                after: Some(SideStacks::default()),
            },
        );
        Self { map }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&P, &FormatData)> {
        self.map.iter()
    }

    pub fn range_mut<'a>(
        &'a mut self,
        start: &P,
        end: &P,
    ) -> impl Iterator<Item = (&'a P, &'a mut FormatData)> + 'a {
        self.map.range_mut(start..=end)
    }

    /// The stacks governing the gap just before `pos`: the position's own
    /// `before` side when present, otherwise the nearest entry to the left.
    pub fn effective_side(&self, pos: &P) -> &SideStacks {
        if let Some(data) = self.map.get(pos) {
            if let Some(before) = &data.before {
                return before;
            }
        }
        self.left_stacks(pos)
    }

    fn left_stacks(&self, pos: &P) -> &SideStacks {
        let (_, data) = self
            .map
            .range(..pos)
            .next_back()
            .expect("the MIN_POS entry bounds every left walk");
        data.after
            .as_ref()
            .or(data.before.as_ref())
            .expect("index entries carry at least one side")
    }

    /// Ensure the entry at `anchor.pos` exists and has the `anchor.type_`
    /// side populated, deep-copying the effective stacks for that gap.
    /// No-op for `MIN_POS`, whose seeded entry already covers it.
    pub fn create_data(&mut self, anchor: &Anchor<P>) {
        if anchor.pos == P::min_pos() {
            return;
        }
        let present = self.map.get(&anchor.pos).is_some_and(|data| match anchor.type_ {
            AnchorType::Before => data.before.is_some(),
            AnchorType::After => data.after.is_some(),
        });
        if present {
            return;
        }
        let stacks = match anchor.type_ {
            AnchorType::After => match self.map.get(&anchor.pos).and_then(|d| d.before.as_ref()) {
                Some(before) => before.clone(),
                None => self.left_stacks(&anchor.pos).clone(),
            },
            AnchorType::Before => self.left_stacks(&anchor.pos).clone(),
        };
        let data = self.map.entry(anchor.pos.clone()).or_default();
        match anchor.type_ {
            AnchorType::Before => data.before = Some(stacks),
            AnchorType::After => data.after = Some(stacks),
        }
    }
}
