use crate::{Anchor, Position};

/// Maximal half-open span `[start, end)` carrying one payload.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct BuiltSpan<P, D> {
    pub start: Anchor<P>,
    pub end: Anchor<P>,
    pub data: D,
}

/// Consumes an in-order stream of `(anchor, payload)` events and assembles
/// maximal contiguous spans: each event closes the running span at its
/// anchor and opens a new one. Zero-length spans are skipped; a span whose
/// payload equals its predecessor's (under the supplied equality) extends
/// the predecessor instead.
///
/// The builder knows nothing about marks; callers plug in the payload
/// equality.
pub(crate) struct SpanBuilder<P: Position, D, E>
where
    E: Fn(&D, &D) -> bool,
{
    spans: Vec<BuiltSpan<P, D>>,
    pending: Option<(Anchor<P>, D)>,
    same: E,
}

impl<P: Position, D, E> SpanBuilder<P, D, E>
where
    E: Fn(&D, &D) -> bool,
{
    pub fn new(same: E) -> Self {
        Self {
            spans: Vec::new(),
            pending: None,
            same,
        }
    }

    pub fn add(&mut self, anchor: Anchor<P>, data: D) {
        if let Some((start, payload)) = self.pending.take() {
            self.close(start, anchor.clone(), payload);
        }
        self.pending = Some((anchor, data));
    }

    pub fn finish(mut self, end: Anchor<P>) -> Vec<BuiltSpan<P, D>> {
        if let Some((start, payload)) = self.pending.take() {
            self.close(start, end, payload);
        }
        self.spans
    }

    fn close(&mut self, start: Anchor<P>, end: Anchor<P>, data: D) {
        if start == end {
            return;
        }
        if let Some(last) = self.spans.last_mut() {
            if (self.same)(&last.data, &data) {
                last.end = end;
                return;
            }
        }
        self.spans.push(BuiltSpan { start, end, data });
    }
}
