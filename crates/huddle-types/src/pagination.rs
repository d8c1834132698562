use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_PAGE_LIMIT: usize = 50;
pub const MAX_PAGE_LIMIT: usize = 100;

/// Query parameters accepted by every listing endpoint.
///
/// `cursor` is the id of the last item of the previous page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub cursor: Option<Uuid>,
}

impl PageQuery {
    pub fn new(limit: Option<i64>, cursor: Option<Uuid>) -> Self {
        Self { limit, cursor }
    }

    /// Clamped page size. Zero, negative or missing limits use the default.
    pub fn limit(&self) -> usize {
        match self.limit {
            Some(n) if n > 0 => (n as usize).min(MAX_PAGE_LIMIT),
            _ => DEFAULT_PAGE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Uuid>,
}

impl<T> Page<T> {
    /// Build a page from a query that fetched up to `limit + 1` rows.
    /// The extra row only signals that another page exists.
    pub fn from_overfetch(mut items: Vec<T>, limit: usize, id_of: impl Fn(&T) -> Uuid) -> Self {
        let has_more = items.len() > limit;
        items.truncate(limit);
        let next_cursor = if has_more { items.last().map(&id_of) } else { None };
        Self {
            items,
            has_more,
            next_cursor,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            has_more: self.has_more,
            next_cursor: self.next_cursor,
        }
    }
}
