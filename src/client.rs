//!
//! Connection facade
//! ------------------
//! Thin entry point binding the session, wire codec, materializer and
//! transfer engine into the connection/statement/cursor lifecycle exposed to
//! callers. Mapping onto any standard driver interface vocabulary (typed
//! getter grids, metadata passthroughs) is deliberately out of scope; callers
//! get exactly the operations the protocol offers.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::blob::TransferControl;
use crate::config::SessionConfig;
use crate::cursor::RowCursor;
use crate::error::ClientResult;
use crate::request::RequestDescriptor;
use crate::session::{Holdability, IsolationLevel, Session};

/// Outcome of a generic statement execution.
pub enum Execution {
    /// Rows affected by a mutating statement.
    Count(u64),
    /// Cursor over a materialized result.
    Rows(RowCursor),
}

pub struct Connection {
    session: Session,
}

impl Connection {
    /// Authenticate and open one connection. One session per connection;
    /// distinct connections are fully independent.
    pub async fn open(
        config: SessionConfig,
        base_url: &str,
        database: &str,
        user: &str,
        password: &str,
    ) -> ClientResult<Self> {
        let session = Session::open(config, base_url, database, user, password).await?;
        Ok(Self { session })
    }

    /// Run a query-shaped SQL string and return a cursor.
    pub async fn query(&mut self, sql: &str) -> ClientResult<RowCursor> {
        self.session.execute_query(RequestDescriptor::new(sql)).await
    }

    /// Run a mutating SQL string and return the update count.
    pub async fn update(&mut self, sql: &str) -> ClientResult<u64> {
        self.session.execute_update(RequestDescriptor::new(sql)).await
    }

    /// Execute a full descriptor (prepared parameters, kind, row cap).
    /// The caller states whether rows are expected, which picks the wire
    /// operation for plain statements.
    pub async fn execute(
        &mut self,
        desc: RequestDescriptor,
        expects_rows: bool,
    ) -> ClientResult<Execution> {
        if expects_rows {
            Ok(Execution::Rows(self.session.execute_query(desc).await?))
        } else {
            Ok(Execution::Count(self.session.execute_update(desc).await?))
        }
    }

    /// Server metadata for a topic, as a cursor.
    pub async fn metadata(&mut self, topic: &str) -> ClientResult<RowCursor> {
        self.session.metadata(topic).await
    }

    pub async fn commit(&mut self) -> ClientResult<()> {
        self.session.commit().await
    }

    pub async fn rollback(&mut self) -> ClientResult<()> {
        self.session.rollback().await
    }

    pub async fn set_auto_commit(&mut self, flag: bool) -> ClientResult<()> {
        self.session.set_auto_commit(flag).await
    }

    pub async fn set_isolation(&mut self, level: IsolationLevel) -> ClientResult<()> {
        self.session.set_isolation(level).await
    }

    pub async fn set_holdability(&mut self, holdability: Holdability) -> ClientResult<()> {
        self.session.set_holdability(holdability).await
    }

    pub async fn upload_blob<R>(
        &mut self,
        id: &str,
        source: &mut R,
        total_len: Option<u64>,
        control: &TransferControl,
    ) -> ClientResult<()>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.session.upload_blob(id, source, total_len, control).await
    }

    pub async fn download_blob<W>(
        &mut self,
        id: &str,
        sink: &mut W,
        control: &TransferControl,
    ) -> ClientResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.session.download_blob(id, sink, control).await
    }

    /// Close the connection, invalidating the session token. Any later call
    /// fails fast locally.
    pub async fn close(&mut self) -> ClientResult<()> {
        self.session.close().await
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}
