//! Sequential id allocation over an immutable list.

/// Hands out ids from a request list one at a time, in order.
///
/// A fresh cursor is created per message build, so two builds of the same
/// request allocate the same ids to the same cards.
#[derive(Debug, Clone)]
pub struct IdCursor<'a> {
    ids: &'a [String],
    position: usize,
}

impl<'a> IdCursor<'a> {
    pub fn new(ids: &'a [String]) -> Self {
        Self { ids, position: 0 }
    }

    /// Ids not yet handed out.
    pub fn remaining(&self) -> usize {
        self.ids.len().saturating_sub(self.position)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

impl<'a> Iterator for IdCursor<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.get(self.position)?;
        self.position += 1;
        Some(id.as_str())
    }
}
