//! Test-only position space and a multi-actor fuzz harness.
//!
//! The engine is agnostic to the position space; for tests a bounded
//! integer space with midpoint allocation is enough. Real integrations
//! plug in a fractional-identifier space instead.

use arbitrary::Arbitrary;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::formatting::anchor::span_from_slice;
use crate::formatting::{FormattedSpan, TimestampFormatting};
use crate::{Anchor, Bias, Error, Expand, Position, PositionList};

/// Midpoint-divisible test position. `0` and `u64::MAX` are the reserved
/// sentinels; the space exhausts after ~63 adversarial splits, which the
/// tests never approach.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct TestPos(pub u64);

impl Position for TestPos {
    fn min_pos() -> Self {
        TestPos(0)
    }

    fn max_pos() -> Self {
        TestPos(u64::MAX)
    }
}

/// In-memory sorted list over [`TestPos`].
#[derive(Clone, Debug, Default)]
pub struct TestList<T> {
    items: Vec<(TestPos, T)>,
}

impl<T> TestList<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn positions(&self) -> impl Iterator<Item = &TestPos> {
        self.items.iter().map(|(pos, _)| pos)
    }
}

impl<T: Serialize + DeserializeOwned> TestList<T> {
    pub fn from_values(values: Vec<T>) -> Self {
        let mut list = Self::new();
        list.insert_at(0, values);
        list
    }
}

impl<T: Serialize + DeserializeOwned> PositionList for TestList<T> {
    type Pos = TestPos;
    type Item = T;

    fn len(&self) -> usize {
        self.items.len()
    }

    fn position_at(&self, index: usize) -> &TestPos {
        &self.items[index].0
    }

    fn value_at(&self, index: usize) -> &T {
        &self.items[index].1
    }

    fn index_of_position(&self, pos: &TestPos, bias: Bias) -> usize {
        match bias {
            Bias::Right => self.items.partition_point(|(p, _)| p < pos),
            Bias::Left => self.items.partition_point(|(p, _)| p <= pos),
        }
    }

    fn insert_at(&mut self, index: usize, values: Vec<T>) -> Vec<TestPos> {
        let TestPos(left) = if index == 0 {
            TestPos::min_pos()
        } else {
            self.items[index - 1].0
        };
        let TestPos(right) = if index == self.items.len() {
            TestPos::max_pos()
        } else {
            self.items[index].0
        };
        let count = values.len() as u64;
        assert!(
            right - left > count,
            "test position space exhausted between {left} and {right}"
        );
        let step = (right - left) / (count + 1);
        let mut created = Vec::with_capacity(values.len());
        for (offset, value) in values.into_iter().enumerate() {
            let pos = TestPos(left + step * (offset as u64 + 1));
            self.items.insert(index + offset, (pos, value));
            created.push(pos);
        }
        created
    }

    fn save_order(&self) -> Value {
        // positions are self-contained; there is no metadata to carry
        Value::Null
    }

    fn save_list(&self) -> Value {
        serde_json::to_value(&self.items).unwrap()
    }

    fn load_order(&mut self, _saved: Value) -> Result<(), Error> {
        Ok(())
    }

    fn load_list(&mut self, saved: Value) -> Result<(), Error> {
        self.items = serde_json::from_value(saved).map_err(|_| Error::DecodeError)?;
        Ok(())
    }
}

/// Assert that `spans` is a gap-free cover of the anchor space in which
/// neighbors differ in at least one key.
pub fn check_span_invariants(spans: &[FormattedSpan<TestPos>]) {
    assert!(!spans.is_empty());
    assert_eq!(spans[0].start, Anchor::min());
    assert_eq!(spans[spans.len() - 1].end, Anchor::max());
    for pair in spans.windows(2) {
        assert_eq!(pair[0].end, pair[1].start, "gap between spans");
        assert_ne!(pair[0].format, pair[1].format, "mergeable neighbors");
        assert!(pair[0].start < pair[0].end);
    }
}

/// Shuffled copy of `items`, for add-order permutation checks.
pub fn shuffled<T: Clone>(items: &[T], seed: u64) -> Vec<T> {
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut out = items.to_vec();
    out.shuffle(&mut rng);
    out
}

#[derive(Arbitrary, Clone, Copy, Debug)]
pub enum StyleKind {
    Bold,
    Italic,
    Link,
}

fn style(kind: StyleKind, remove: bool) -> (&'static str, Value, Expand) {
    let (key, value, expand) = match kind {
        StyleKind::Bold => ("bold", Value::Bool(true), Expand::After),
        StyleKind::Italic => ("italic", Value::Bool(true), Expand::After),
        StyleKind::Link => ("link", Value::String("https://example.com".into()), Expand::None),
    };
    if remove {
        // removals cover the gaps too, so later inserts stay unformatted
        let expand = match kind {
            StyleKind::Link => Expand::Both,
            _ => Expand::After,
        };
        (key, Value::Null, expand)
    } else {
        (key, value, expand)
    }
}

#[derive(Arbitrary, Clone, Copy, Debug)]
pub enum Action {
    Format {
        actor: u8,
        start: u8,
        len: u8,
        kind: StyleKind,
    },
    Unformat {
        actor: u8,
        start: u8,
        len: u8,
        kind: StyleKind,
    },
    Sync(u8, u8),
}

pub struct Actor {
    list: TestList<char>,
    formatting: TimestampFormatting<TestPos>,
}

impl Actor {
    pub fn new(id: usize, list: TestList<char>) -> Self {
        Self {
            list,
            formatting: TimestampFormatting::new(format!("replica-{id}")),
        }
    }

    pub fn len(&self) -> usize {
        PositionList::len(&self.list)
    }

    pub fn apply_style(&mut self, start: usize, end: usize, kind: StyleKind, remove: bool) {
        let (key, value, expand) = style(kind, remove);
        let span = span_from_slice(&self.list, start, end, expand).unwrap();
        let mark = self.formatting.new_mark(span.start, span.end, key, value);
        self.formatting.add_mark(mark).unwrap();
    }

    pub fn merge(&mut self, other: &Self) {
        let marks: Vec<_> = other.formatting.marks().cloned().collect();
        for mark in marks {
            self.formatting.add_mark(mark).unwrap();
        }
    }

    pub fn spans(&self) -> Vec<FormattedSpan<TestPos>> {
        self.formatting.formatted_spans()
    }
}

pub fn preprocess_action(actors: &[Actor], action: &mut Action) {
    match action {
        Action::Format {
            actor, start, len, ..
        }
        | Action::Unformat {
            actor, start, len, ..
        } => {
            *actor %= actors.len() as u8;
            let doc_len = actors[*actor as usize].len();
            *start = (*start as usize % doc_len) as u8;
            *len = (*len).max(1);
            *len = (*len as usize).min(doc_len - *start as usize) as u8;
        }
        Action::Sync(a, b) => {
            *a %= actors.len() as u8;
            *b %= actors.len() as u8;
            if a == b {
                *b = (*a + 1) % actors.len() as u8;
            }
        }
    }
}

pub fn apply_action(actors: &mut [Actor], action: Action) {
    match action {
        Action::Format {
            actor,
            start,
            len,
            kind,
        } => {
            let (start, len) = (start as usize, len as usize);
            actors[actor as usize].apply_style(start, start + len, kind, false);
        }
        Action::Unformat {
            actor,
            start,
            len,
            kind,
        } => {
            let (start, len) = (start as usize, len as usize);
            actors[actor as usize].apply_style(start, start + len, kind, true);
        }
        Action::Sync(a, b) => {
            let (a, b) = arref::array_mut_ref!(actors, [a as usize, b as usize]);
            a.merge(b);
        }
    }
}

fn sync_all(actors: &mut [Actor]) {
    for i in 1..actors.len() {
        let (first, other) = arref::array_mut_ref!(actors, [0, i]);
        first.merge(other);
    }
    for i in 1..actors.len() {
        let (first, other) = arref::array_mut_ref!(actors, [0, i]);
        other.merge(first);
    }
}

/// Drive `actions` over `actor_num` replicas sharing one document, then
/// fully sync and assert every replica resolves identical spans.
pub fn fuzzing(actor_num: usize, actions: Vec<Action>) {
    let list = TestList::from_values("abcdefghijklmnop".chars().collect());
    let mut actors: Vec<Actor> = (0..actor_num).map(|i| Actor::new(i, list.clone())).collect();

    for mut action in actions {
        preprocess_action(&actors, &mut action);
        debug_log::group!("{:?},", &action);
        apply_action(&mut actors, action);
        debug_log::group_end!();
    }

    sync_all(&mut actors);

    let expected = actors[0].spans();
    check_span_invariants(&expected);
    for actor in &actors[1..] {
        assert_eq!(actor.spans(), expected);
    }
}
