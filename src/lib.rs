//! Inline-formatting resolution for ordered position spaces, a Rust
//! implementation of the [Peritext](https://www.inkandswitch.com/peritext/)
//! mark model.
//!
//! The crate maintains a local, mutable set of formatting *marks* over an
//! external totally ordered position space and projects that set onto a
//! single *format* per position. It is not itself a replicated data type:
//! the resolved state is a pure function of the mark set, so marks can be
//! exchanged by any transport and applied in any order.
//!
//! The position space stays external. Implement [`Position`] for its
//! identifier type (plus [`PositionList`] when projecting onto a concrete
//! list) and hand marks to [`Formatting`], or use the [`RichList`] facade
//! which pairs a list with [`TimestampFormatting`].

#![deny(unsafe_code)]

use std::cmp::Ordering;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use string_cache::DefaultAtom;

pub mod formatting;
pub mod rich_list;
#[cfg(any(test, feature = "test"))]
pub mod test_utils;

pub use formatting::{
    anchor::{anchor_at, index_of_anchor, slice_from_span, span_from_slice, Bind},
    error::Error,
    FormatChange, FormattedSpan, Formatting, TimestampFormatting,
};
pub use rich_list::{diff_formats, Entries, FormattedSlice, RichList, RichListSave};

pub type InternalString = DefaultAtom;
pub type Lamport = u32;

/// Map from attribute key to winning value. Keys whose winner is
/// [`Value::Null`] never appear.
pub type Format = fxhash::FxHashMap<InternalString, Value>;

/// An identifier drawn from an external totally ordered position space.
///
/// `min_pos()` and `max_pos()` are reserved sentinels that compare strictly
/// below/above every real position; they bound the anchor space and never
/// identify a list slot.
pub trait Position: Clone + Ord + Eq + Debug {
    fn min_pos() -> Self;
    fn max_pos() -> Self;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AnchorType {
    Before,
    After,
}

/// A point in the gap immediately before or after a position.
///
/// Anchors order by position first; on a tie `Before < After`. The two
/// permitted extremes are [`Anchor::min`] (`(MIN_POS, After)`) and
/// [`Anchor::max`] (`(MAX_POS, Before)`); the outward-facing sides of the
/// sentinels are invalid everywhere.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Anchor<P> {
    pub pos: P,
    #[serde(rename = "before", with = "before_flag")]
    pub type_: AnchorType,
}

mod before_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::AnchorType;

    pub fn serialize<S: Serializer>(type_: &AnchorType, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bool(matches!(type_, AnchorType::Before))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<AnchorType, D::Error> {
        Ok(if bool::deserialize(d)? {
            AnchorType::Before
        } else {
            AnchorType::After
        })
    }
}

impl<P: Position> Anchor<P> {
    pub fn before(pos: P) -> Self {
        Self {
            pos,
            type_: AnchorType::Before,
        }
    }

    pub fn after(pos: P) -> Self {
        Self {
            pos,
            type_: AnchorType::After,
        }
    }

    /// The least valid anchor, `(MIN_POS, After)`.
    pub fn min() -> Self {
        Self::after(P::min_pos())
    }

    /// The greatest valid anchor, `(MAX_POS, Before)`.
    pub fn max() -> Self {
        Self::before(P::max_pos())
    }

    /// Rejects the two illegal extremes, `(MIN_POS, Before)` and
    /// `(MAX_POS, After)`.
    pub fn validate(&self) -> Result<(), Error> {
        let illegal = match self.type_ {
            AnchorType::Before => self.pos == P::min_pos(),
            AnchorType::After => self.pos == P::max_pos(),
        };
        if illegal {
            return Err(Error::InvalidAnchor);
        }
        Ok(())
    }
}

/// Half-open anchor interval `[start, end)`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnchorRange<P> {
    pub start: Anchor<P>,
    pub end: Anchor<P>,
}

/// Controls whether a span derived from an index slice covers the gaps just
/// outside its endpoints, so that content inserted there later falls inside
/// the mark.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expand {
    None,
    Before,
    After,
    Both,
}

/// A formatting instruction: `key = value` over the anchor span
/// `[start, end)`, carrying enough metadata to totally order it against
/// every other mark.
pub trait Mark: Clone + Debug {
    type Pos: Position;

    fn start(&self) -> &Anchor<Self::Pos>;
    fn end(&self) -> &Anchor<Self::Pos>;
    fn key(&self) -> &InternalString;
    fn value(&self) -> &Value;
    /// Total precedence order; the greater mark wins. `Equal` identifies
    /// the same logical mark.
    fn compare(&self, other: &Self) -> Ordering;
}

/// The default mark: Lamport timestamp with creator tie-break, so marks are
/// globally unique and locally monotone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(serialize = "P: Serialize", deserialize = "P: serde::de::DeserializeOwned"))]
pub struct TimestampMark<P> {
    pub start: Anchor<P>,
    pub end: Anchor<P>,
    pub key: InternalString,
    /// [`Value::Null`] means "remove `key` from the format".
    pub value: Value,
    #[serde(rename = "creatorID")]
    pub creator: InternalString,
    /// Positive; `(creator, timestamp)` is globally unique.
    pub timestamp: Lamport,
}

impl<P: Position> Mark for TimestampMark<P> {
    type Pos = P;

    fn start(&self) -> &Anchor<P> {
        &self.start
    }

    fn end(&self) -> &Anchor<P> {
        &self.end
    }

    fn key(&self) -> &InternalString {
        &self.key
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn compare(&self, other: &Self) -> Ordering {
        match self.timestamp.cmp(&other.timestamp) {
            Ordering::Equal => {
                let a: &str = &self.creator;
                let b: &str = &other.creator;
                a.cmp(b)
            }
            ord => ord,
        }
    }
}

/// Search bias for [`PositionList::index_of_position`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bias {
    /// One past the rightmost present position `<= pos`.
    Left,
    /// The index of the leftmost present position `>= pos`.
    Right,
}

/// The external list the engine projects spans onto. The list owns its
/// values and creates positions; the engine never mutates it except through
/// [`PositionList::insert_at`] on behalf of the facade.
pub trait PositionList {
    type Pos: Position;
    type Item;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Panics if `index >= len()`.
    fn position_at(&self, index: usize) -> &Self::Pos;

    /// Panics if `index >= len()`.
    fn value_at(&self, index: usize) -> &Self::Item;

    /// Index of `pos` under the given bias; the result is in `[0, len()]`
    /// for every position, present or not.
    fn index_of_position(&self, pos: &Self::Pos, bias: Bias) -> usize;

    /// Create `values.len()` fresh positions in the gap at `index` and
    /// insert the values there. Returns the created positions in order.
    fn insert_at(&mut self, index: usize, values: Vec<Self::Item>) -> Vec<Self::Pos>;

    /// Opaque saved form of the position-space metadata.
    fn save_order(&self) -> Value;

    /// Opaque saved form of the items and their positions.
    fn save_list(&self) -> Value;

    fn load_order(&mut self, saved: Value) -> Result<(), Error>;

    fn load_list(&mut self, saved: Value) -> Result<(), Error>;
}
