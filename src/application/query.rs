//! Query-building helpers shared by the read path, the ingestion worker and reindexing.

use serde::Serialize;
use serde_json::{Map, Value, json};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::domain::entities::NewsRecord;

/// Timestamp layout stored in the search index; the index mapping declares the same format.
pub const INDEX_TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]");

/// Date pattern matching [`INDEX_TIMESTAMP_FORMAT`] in the search engine's own syntax.
pub const INDEX_DATE_PATTERN: &str = "yyyy-MM-dd HH:mm:ss.SSSSSS";

/// A 1-based page number. Anything missing, unparsable or below one reads as page 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageNumber(u32);

impl PageNumber {
    pub const FIRST: PageNumber = PageNumber(1);

    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(|value| value.trim().parse::<i64>().ok())
            .map(Self::from_raw)
            .unwrap_or(Self::FIRST)
    }

    pub fn from_raw(raw: i64) -> Self {
        match u32::try_from(raw) {
            Ok(value) if value >= 1 => Self(value),
            _ if raw > i64::from(u32::MAX) => Self(u32::MAX),
            _ => Self::FIRST,
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for PageNumber {
    fn default() -> Self {
        Self::FIRST
    }
}

impl std::fmt::Display for PageNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Deepest `from + size` the search engine serves; its default `index.max_result_window`.
pub const RESULT_WINDOW: u64 = 10_000;

/// Paginated search over the index, rendered into the engine's JSON request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub offset: u64,
    pub size: u32,
    pub sort: Vec<(String, SortDirection)>,
}

impl SearchQuery {
    /// The read path query: one page of `size` identifiers, newest first.
    ///
    /// Items created in the same instant are ordered by descending id so pages never overlap.
    pub fn newest_first(page: PageNumber, size: u32) -> Self {
        Self {
            offset: u64::from(page.get().saturating_sub(1)) * u64::from(size),
            size,
            sort: vec![
                ("created".to_string(), SortDirection::Desc),
                ("id".to_string(), SortDirection::Desc),
            ],
        }
    }

    pub fn from(&self) -> u64 {
        self.offset
    }

    /// Shrink the page so it ends inside `window`; `None` if it starts at or beyond it.
    pub fn within_window(mut self, window: u64) -> Option<Self> {
        let room = window.checked_sub(self.offset).filter(|room| *room > 0)?;
        self.size = self.size.min(u32::try_from(room).unwrap_or(u32::MAX));
        Some(self)
    }

    /// `from` and `size` are omitted when zero so the engine applies its own defaults.
    pub fn to_body(&self) -> Value {
        let mut body = Map::new();
        let from = self.from();
        if from > 0 {
            body.insert("from".to_string(), json!(from));
        }
        if self.size > 0 {
            body.insert("size".to_string(), json!(self.size));
        }
        if !self.sort.is_empty() {
            let sort = self
                .sort
                .iter()
                .map(|(field, direction)| json!({ field: { "order": direction.as_str() } }))
                .collect::<Vec<_>>();
            body.insert("sort".to_string(), Value::Array(sort));
        }
        Value::Object(body)
    }
}

/// The indexed projection of a news item: identity and creation time only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsDocument {
    pub id: i64,
    pub created: String,
}

impl NewsDocument {
    pub fn from_record(record: &NewsRecord) -> Result<Self, time::error::Format> {
        Ok(Self {
            id: record.id,
            created: format_index_timestamp(record.created)?,
        })
    }
}

pub fn format_index_timestamp(value: OffsetDateTime) -> Result<String, time::error::Format> {
    value.to_offset(UtcOffset::UTC).format(INDEX_TIMESTAMP_FORMAT)
}

/// Columns of the `news` table that may appear in generated SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewsColumn {
    Id,
    Author,
    Body,
    Created,
}

impl NewsColumn {
    pub fn as_str(self) -> &'static str {
        match self {
            NewsColumn::Id => "id",
            NewsColumn::Author => "author",
            NewsColumn::Body => "body",
            NewsColumn::Created => "created",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    Like,
    NotLike,
    IsNull,
    IsNotNull,
}

impl FilterOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::NotEq => "!=",
            FilterOp::Lt => "<",
            FilterOp::Gt => ">",
            FilterOp::Le => "<=",
            FilterOp::Ge => ">=",
            FilterOp::Like => "LIKE",
            FilterOp::NotLike => "NOT LIKE",
            FilterOp::IsNull => "IS NULL",
            FilterOp::IsNotNull => "IS NOT NULL",
        }
    }

    pub fn takes_value(self) -> bool {
        !matches!(self, FilterOp::IsNull | FilterOp::IsNotNull)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Int(i64),
    Text(String),
    Timestamp(OffsetDateTime),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: NewsColumn,
    pub op: FilterOp,
    pub value: Option<FilterValue>,
}

/// Filtered, sorted, paginated select over the item store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewsQuery {
    pub filters: Vec<Filter>,
    pub sort: Vec<(NewsColumn, SortDirection)>,
    pub limit: Option<u32>,
    pub page: Option<u32>,
}

impl NewsQuery {
    pub fn by_id(id: i64) -> Self {
        Self::default()
            .filter(NewsColumn::Id, FilterOp::Eq, FilterValue::Int(id))
            .limit(1)
    }

    pub fn filter(mut self, column: NewsColumn, op: FilterOp, value: FilterValue) -> Self {
        self.filters.push(Filter {
            column,
            op,
            value: Some(value),
        });
        self
    }

    pub fn filter_null(mut self, column: NewsColumn, not_null: bool) -> Self {
        let op = if not_null {
            FilterOp::IsNotNull
        } else {
            FilterOp::IsNull
        };
        self.filters.push(Filter {
            column,
            op,
            value: None,
        });
        self
    }

    pub fn sort_by(mut self, column: NewsColumn, direction: SortDirection) -> Self {
        self.sort.push((column, direction));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Row offset implied by `page` and `limit`; zero unless both are positive.
    pub fn offset(&self) -> u64 {
        match (self.page, self.limit) {
            (Some(page), Some(limit)) if page > 0 && limit > 0 => {
                u64::from(page - 1) * u64::from(limit)
            }
            _ => 0,
        }
    }
}
