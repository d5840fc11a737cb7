use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::{
        query::{FilterValue, NewsQuery},
        repos::{NewsRepo, RepoError},
    },
    domain::{entities::NewsRecord, news::NewsDraft},
    infra::deadline::with_deadline,
};

use super::{PostgresRepositories, map_sqlx_error};

const NEWS_COLUMNS: &str = "id, author, body, created";

#[derive(sqlx::FromRow)]
struct NewsRow {
    id: i64,
    author: String,
    body: String,
    created: OffsetDateTime,
}

impl From<NewsRow> for NewsRecord {
    fn from(row: NewsRow) -> Self {
        Self {
            id: row.id,
            author: row.author,
            body: row.body,
            created: row.created,
        }
    }
}

/// Render `query` as a parameterized select over `news`.
///
/// Column names and operators come from closed enums; every value is bound.
pub fn push_news_select<'q>(qb: &mut QueryBuilder<'q, Postgres>, query: &'q NewsQuery) {
    qb.push("SELECT ");
    qb.push(NEWS_COLUMNS);
    qb.push(" FROM news");

    for (position, filter) in query.filters.iter().enumerate() {
        qb.push(if position == 0 { " WHERE " } else { " AND " });
        qb.push(filter.column.as_str());
        qb.push(" ");
        qb.push(filter.op.as_sql());

        if !filter.op.takes_value() {
            continue;
        }
        qb.push(" ");
        match filter.value.as_ref() {
            Some(FilterValue::Int(value)) => {
                qb.push_bind(*value);
            }
            Some(FilterValue::Text(value)) => {
                qb.push_bind(value.as_str());
            }
            Some(FilterValue::Timestamp(value)) => {
                qb.push_bind(*value);
            }
            None => {
                qb.push("NULL");
            }
        }
    }

    for (position, (column, direction)) in query.sort.iter().enumerate() {
        qb.push(if position == 0 { " ORDER BY " } else { ", " });
        qb.push(column.as_str());
        qb.push(" ");
        qb.push(direction.as_sql());
    }

    if let Some(limit) = query.limit.filter(|limit| *limit > 0) {
        qb.push(" LIMIT ");
        qb.push_bind(i64::from(limit));
    }

    let offset = query.offset();
    if offset > 0 {
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(offset).unwrap_or(i64::MAX));
    }
}

#[async_trait]
impl NewsRepo for PostgresRepositories {
    async fn create_news(&self, draft: &NewsDraft) -> Result<NewsRecord, RepoError> {
        let insert = async {
            let mut tx = self.begin().await.map_err(map_sqlx_error)?;

            let row = sqlx::query_as::<_, NewsRow>(
                r#"
                INSERT INTO news (draft_token, author, body)
                VALUES ($1, $2, $3)
                ON CONFLICT (draft_token) DO UPDATE
                    SET draft_token = EXCLUDED.draft_token
                RETURNING id, author, body, created
                "#,
            )
            .bind(draft.token)
            .bind(draft.author.as_str())
            .bind(draft.body.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            tx.commit().await.map_err(map_sqlx_error)?;
            Ok::<_, RepoError>(NewsRecord::from(row))
        };

        with_deadline(self.timeout(), insert, || RepoError::Timeout).await
    }

    async fn list_news(&self, query: &NewsQuery) -> Result<Vec<NewsRecord>, RepoError> {
        let mut qb = QueryBuilder::new("");
        push_news_select(&mut qb, query);

        let rows = with_deadline(
            self.timeout(),
            async {
                qb.build_query_as::<NewsRow>()
                    .fetch_all(self.pool())
                    .await
                    .map_err(map_sqlx_error)
            },
            || RepoError::Timeout,
        )
        .await?;

        Ok(rows.into_iter().map(NewsRecord::from).collect())
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        with_deadline(
            self.timeout(),
            async { self.ping().await.map_err(map_sqlx_error) },
            || RepoError::Timeout,
        )
        .await
    }
}
