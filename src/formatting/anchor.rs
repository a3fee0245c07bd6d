//! Conversions between anchors and list indices.
//!
//! All functions are pure; they consult the list only through
//! [`PositionList::index_of_position`] and [`PositionList::position_at`].

use crate::{Anchor, AnchorRange, AnchorType, Bias, Expand, PositionList};

use super::error::Error;

/// Which neighbor of a gap an anchor attaches to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bind {
    Left,
    Right,
}

/// The index immediately to the right of `anchor` in `list`: for a `Before`
/// anchor, the index of the first present position `>= anchor.pos`; for an
/// `After` anchor, one past the last present position `<= anchor.pos`.
/// Always in `[0, list.len()]`.
pub fn index_of_anchor<L: PositionList>(list: &L, anchor: &Anchor<L::Pos>) -> usize {
    match anchor.type_ {
        AnchorType::Before => list.index_of_position(&anchor.pos, Bias::Right),
        AnchorType::After => list.index_of_position(&anchor.pos, Bias::Left),
    }
}

/// The anchor in the gap between index `index - 1` and `index`, attached to
/// the neighbor chosen by `bind`. The ends of the list yield the anchor
/// space extremes. `index` must be in `[0, list.len()]`.
pub fn anchor_at<L: PositionList>(list: &L, index: usize, bind: Bind) -> Anchor<L::Pos> {
    match bind {
        Bind::Left => {
            if index == 0 {
                Anchor::min()
            } else {
                Anchor::after(list.position_at(index - 1).clone())
            }
        }
        Bind::Right => {
            if index == list.len() {
                Anchor::max()
            } else {
                Anchor::before(list.position_at(index).clone())
            }
        }
    }
}

/// Project a span onto index space: `(index_of_anchor(start),
/// index_of_anchor(end))`.
pub fn slice_from_span<L: PositionList>(
    list: &L,
    start: &Anchor<L::Pos>,
    end: &Anchor<L::Pos>,
) -> (usize, usize) {
    (index_of_anchor(list, start), index_of_anchor(list, end))
}

/// Build the anchor span covering the slice `[start, end)` of `list`.
/// `expand` chooses whether each endpoint binds to the far neighbor of its
/// gap, so the span swallows later inserts at that edge.
pub fn span_from_slice<L: PositionList>(
    list: &L,
    start: usize,
    end: usize,
    expand: Expand,
) -> Result<AnchorRange<L::Pos>, Error> {
    if start >= end || end > list.len() {
        return Err(Error::OutOfRange {
            start,
            end,
            len: list.len(),
        });
    }
    let start_bind = match expand {
        Expand::Before | Expand::Both => Bind::Left,
        Expand::None | Expand::After => Bind::Right,
    };
    let end_bind = match expand {
        Expand::After | Expand::Both => Bind::Right,
        Expand::None | Expand::Before => Bind::Left,
    };
    Ok(AnchorRange {
        start: anchor_at(list, start, start_bind),
        end: anchor_at(list, end, end_bind),
    })
}
