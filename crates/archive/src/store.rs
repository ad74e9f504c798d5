//! Statement routing between the pool and one open transaction.
//!
//! While a transaction is open every statement, whichever task issues it,
//! runs inside that transaction. This is what lets a full reload clear the
//! tables and rebuild them atomically while the rebuild itself goes through
//! the regular save path.
//!
//! Transactions are taken in turn: [`Store::begin`] waits until the previous
//! one has been committed or rolled back.
//!
//! Never hold a [`Conn`] across another call to [`Store::acquire`]: with a
//! transaction open, or with a single-connection pool, that deadlocks.

use crate::Database;
use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard, OwnedMutexGuard};

pub(crate) struct Store {
    pool: SqlitePool,
    tx: Mutex<Option<Transaction<'static, Sqlite>>>,
    turn: Arc<Mutex<()>>,
    /// Held from `begin` until the matching `commit` or `rollback`.
    holder: Mutex<Option<OwnedMutexGuard<()>>>,
}

pub(crate) enum Conn<'a> {
    Pool(PoolConnection<Sqlite>),
    Tx(MappedMutexGuard<'a, Transaction<'static, Sqlite>>),
}

impl Deref for Conn<'_> {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        match self {
            Self::Pool(conn) => &**conn,
            Self::Tx(tx) => &***tx,
        }
    }
}

impl DerefMut for Conn<'_> {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        match self {
            Self::Pool(conn) => &mut **conn,
            Self::Tx(tx) => &mut ***tx,
        }
    }
}

impl Store {
    pub(crate) fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
            tx: Mutex::new(None),
            turn: Arc::new(Mutex::new(())),
            holder: Mutex::new(None),
        }
    }

    /// A connection for the next statement(s): the open transaction if
    /// there is one, otherwise a pooled connection.
    pub(crate) async fn acquire(&self) -> Result<Conn<'_>> {
        let guard = self.tx.lock().await;
        let guard = match MutexGuard::try_map(guard, Option::as_mut) {
            Ok(tx) => return Ok(Conn::Tx(tx)),
            Err(guard) => guard,
        };
        drop(guard);
        let conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        Ok(Conn::Pool(conn))
    }

    /// Open a transaction, waiting for any open one to finish first.
    pub(crate) async fn begin(&self) -> Result<()> {
        let turn = self.turn.clone().lock_owned().await;
        let tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        *self.tx.lock().await = Some(tx);
        *self.holder.lock().await = Some(turn);
        Ok(())
    }

    pub(crate) async fn commit(&self) -> Result<()> {
        let (tx, _turn) = self.finish().await?;
        tx.commit().await.or_raise(|| ErrorKind::Database)
    }

    pub(crate) async fn rollback(&self) -> Result<()> {
        let (tx, _turn) = self.finish().await?;
        tx.rollback().await.or_raise(|| ErrorKind::Database)
    }

    /// Detach the open transaction. The next `begin` may proceed once the
    /// returned guard is dropped.
    async fn finish(&self) -> Result<(Transaction<'static, Sqlite>, Option<OwnedMutexGuard<()>>)> {
        let tx = self.tx.lock().await.take().ok_or_raise(|| ErrorKind::Transaction)?;
        let turn = self.holder.lock().await.take();
        Ok((tx, turn))
    }
}
