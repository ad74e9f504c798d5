//! The link index: which files reference which assets.

use crate::error::{ErrorKind, Result};
use crate::store::Store;
use exn::ResultExt;
use std::sync::Arc;

#[derive(Clone)]
pub struct LinkIndex {
    store: Arc<Store>,
}

impl LinkIndex {
    pub(crate) fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Record that `source` references each of `targets`. Existing edges
    /// are kept.
    pub async fn add(&self, source: &str, targets: &[impl AsRef<str>]) -> Result<()> {
        let mut conn = self.store.acquire().await?;
        for target in targets {
            sqlx::query(include_str!("../queries/add_link.sql"))
                .bind(source)
                .bind(target.as_ref())
                .execute(&mut *conn)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        Ok(())
    }

    /// Forget the given edges of `source`, or all of them when `targets` is
    /// `None`.
    pub async fn remove(&self, source: &str, targets: Option<&[String]>) -> Result<()> {
        let mut conn = self.store.acquire().await?;
        let Some(targets) = targets else {
            sqlx::query(include_str!("../queries/remove_links.sql"))
                .bind(source)
                .execute(&mut *conn)
                .await
                .or_raise(|| ErrorKind::Database)?;
            return Ok(());
        };
        for target in targets {
            sqlx::query(include_str!("../queries/remove_link.sql"))
                .bind(source)
                .bind(target)
                .execute(&mut *conn)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        Ok(())
    }

    /// Add edges for `targets`, first dropping every existing edge of
    /// `source` when `clear` is set.
    pub async fn update(&self, source: &str, targets: &[String], clear: bool) -> Result<()> {
        if clear {
            self.remove(source, None).await?;
        }
        self.add(source, targets).await
    }

    /// Everything `source` references.
    pub async fn get_links(&self, source: &str) -> Result<Vec<String>> {
        let mut conn = self.store.acquire().await?;
        sqlx::query_scalar(include_str!("../queries/get_links.sql"))
            .bind(source)
            .fetch_all(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// Every file that references `target`.
    pub async fn get_sources(&self, target: &str) -> Result<Vec<String>> {
        let mut conn = self.store.acquire().await?;
        sqlx::query_scalar(include_str!("../queries/get_sources.sql"))
            .bind(target)
            .fetch_all(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)
    }
}
