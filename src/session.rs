//!
//! Session / request layer
//! ------------------------
//! Owns the authenticated handle to one remote QuayDB connection: base URL,
//! session token, transaction and compression settings, timeouts. Every
//! operation is a POST of form fields to a per-operation path carrying the
//! token; responses are scalar status payloads, tabular payloads (streamed
//! into the materializer) or raw blob bytes. One session serves one logical
//! connection and is not safe for concurrent use from multiple tasks; the
//! caller serializes statement execution, matching the server's
//! one-statement-at-a-time session semantics.
//!
//! Nothing here retries. A transport failure or remote fault surfaces to the
//! caller exactly once, because the server may have partially applied a
//! mutating statement and a blind retry would risk duplicate effects.

use std::io::Read;

use reqwest::Url;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::cursor::RowCursor;
use crate::error::{self, ClientError, ClientResult, TransportStatus};
use crate::request::RequestDescriptor;
use crate::stage::{StageWriter, StagedResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn wire_token(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ_UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ_COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE_READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Holdability {
    HoldCursorsOverCommit,
    CloseCursorsAtCommit,
}

impl Holdability {
    pub fn wire_token(self) -> &'static str {
        match self {
            Holdability::HoldCursorsOverCommit => "HOLD",
            Holdability::CloseCursorsAtCommit => "CLOSE",
        }
    }
}

pub struct Session {
    http: reqwest::Client,
    base: Url,
    database: String,
    user: String,
    token: String,
    autocommit: bool,
    isolation: IsolationLevel,
    holdability: Holdability,
    gzip: bool,
    trace: bool,
    default_max_rows: u32,
    closed: bool,
    last_status: Option<TransportStatus>,
}

impl Session {
    /// Perform the login round trip and return an authenticated session.
    /// The gzip preference is negotiated here, once, for the whole session;
    /// the login exchange itself is always uncompressed.
    pub async fn open(
        config: SessionConfig,
        base_url: &str,
        database: &str,
        user: &str,
        password: &str,
    ) -> ClientResult<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| ClientError::protocol(format!("invalid base URL: {e}")))?;
        if !base.path().ends_with('/') {
            let p = format!("{}/", base.path());
            base.set_path(&p);
        }

        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout);
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(
                reqwest::Proxy::all(proxy)
                    .map_err(|e| ClientError::protocol(format!("invalid proxy URL: {e}")))?,
            );
        }
        let http = builder.build()?;

        let login_url = base
            .join("login")
            .map_err(|e| ClientError::protocol(format!("invalid operation URL: {e}")))?;
        let resp = http
            .post(login_url)
            .form(&[
                ("database", database),
                ("user", user),
                ("password", password),
                ("gzip", if config.gzip { "true" } else { "false" }),
            ])
            .send()
            .await?;
        let status = TransportStatus::new(
            resp.status().as_u16(),
            resp.status().canonical_reason().unwrap_or(""),
        );
        let body = resp.bytes().await?;
        if let Some(err) = error::translate(&status, &body) {
            return Err(err);
        }
        let v: Value = serde_json::from_slice(&body)
            .map_err(|e| ClientError::protocol(format!("malformed login response: {e}")))?;
        let token = v
            .get("session_id")
            .and_then(|t| t.as_str())
            .ok_or_else(|| ClientError::protocol("login response missing session_id"))?
            .to_string();
        debug!(user, database, gzip = config.gzip, "session opened");

        Ok(Self {
            http,
            base,
            database: database.to_string(),
            user: user.to_string(),
            token,
            autocommit: true,
            isolation: IsolationLevel::ReadCommitted,
            holdability: Holdability::HoldCursorsOverCommit,
            gzip: config.gzip,
            trace: config.trace_requests,
            default_max_rows: config.max_rows,
            closed: false,
            last_status: Some(status),
        })
    }

    fn op_url(&self, path: &str) -> ClientResult<Url> {
        self.base
            .join(path)
            .map_err(|e| ClientError::protocol(format!("invalid operation URL: {e}")))
    }

    /// POST form fields to an operation path. Records the transport status
    /// and rejects locally (no network call) once the session is closed.
    pub(crate) async fn post_op(
        &mut self,
        path: &str,
        fields: Vec<(String, String)>,
    ) -> ClientResult<reqwest::Response> {
        if self.closed {
            return Err(ClientError::Closed);
        }
        let url = self.op_url(path)?;
        if self.trace {
            info!(%url, fields = fields.len(), "quaydb request");
        } else {
            debug!(%url, "quaydb request");
        }
        let resp = self.http.post(url).form(&fields).send().await?;
        let status = TransportStatus::new(
            resp.status().as_u16(),
            resp.status().canonical_reason().unwrap_or(""),
        );
        debug!(path, code = status.code, "quaydb response");
        self.last_status = Some(status);
        Ok(resp)
    }

    fn inflate_if_needed(&self, body: &[u8]) -> ClientResult<Vec<u8>> {
        if !self.gzip {
            return Ok(body.to_vec());
        }
        let mut out = Vec::new();
        flate2::read::GzDecoder::new(body)
            .read_to_end(&mut out)
            .map_err(|e| ClientError::protocol(format!("invalid gzip stream: {e}")))?;
        Ok(out)
    }

    /// One round trip with a scalar status payload in response.
    pub(crate) async fn call_scalar(
        &mut self,
        path: &str,
        mut fields: Vec<(String, String)>,
    ) -> ClientResult<Value> {
        fields.insert(0, ("session_id".to_string(), self.token.clone()));
        let resp = self.post_op(path, fields).await?;
        let status = self.last_status.clone().unwrap_or(TransportStatus::new(0, ""));
        let raw = resp.bytes().await?;
        // Fault bodies follow the session compression like any other scalar
        // payload; if inflation fails, translate against the raw bytes so a
        // plain-text error page still classifies.
        let body = self.inflate_if_needed(&raw).unwrap_or_else(|_| raw.to_vec());
        if let Some(err) = error::translate(&status, &body) {
            return Err(err);
        }
        serde_json::from_slice(&body)
            .map_err(|e| ClientError::protocol(format!("malformed status payload: {e}")))
    }

    /// One round trip with a tabular payload in response, streamed into a
    /// staged result without buffering the body in memory.
    pub(crate) async fn call_tabular(
        &mut self,
        path: &str,
        mut fields: Vec<(String, String)>,
    ) -> ClientResult<StagedResult> {
        fields.insert(0, ("session_id".to_string(), self.token.clone()));
        let mut resp = self.post_op(path, fields).await?;
        let status = self.last_status.clone().unwrap_or(TransportStatus::new(0, ""));
        if !(200..300).contains(&status.code) {
            let raw = resp.bytes().await?;
            let body = self.inflate_if_needed(&raw).unwrap_or_else(|_| raw.to_vec());
            return Err(error::translate(&status, &body)
                .unwrap_or_else(|| ClientError::protocol("unclassifiable response")));
        }
        let mut writer = StageWriter::new(self.gzip)?;
        while let Some(chunk) = resp.chunk().await? {
            writer.push(&chunk)?;
        }
        // A FAIL payload under HTTP 200 surfaces here from the header check.
        writer.finish()
    }

    fn execute_fields(&self, desc: &RequestDescriptor) -> ClientResult<Vec<(String, String)>> {
        let max_rows = if desc.max_rows > 0 { desc.max_rows } else { self.default_max_rows };
        let mut fields = vec![
            ("sql".to_string(), desc.sql.clone()),
            ("max_rows".to_string(), max_rows.to_string()),
        ];
        fields.extend(desc.param_fields()?);
        Ok(fields)
    }

    /// Execute a statement that reports an update count.
    pub async fn execute_update(&mut self, desc: RequestDescriptor) -> ClientResult<u64> {
        let fields = self.execute_fields(&desc)?;
        let v = self.call_scalar(desc.kind.op_path(false), fields).await?;
        v.get("update_count")
            .and_then(|u| u.as_u64())
            .ok_or_else(|| ClientError::protocol("status payload missing update_count"))
    }

    /// Execute a statement that produces rows; the response is materialized
    /// to a staging buffer and returned as a cursor over it.
    pub async fn execute_query(&mut self, desc: RequestDescriptor) -> ClientResult<RowCursor> {
        let fields = self.execute_fields(&desc)?;
        let staged = self.call_tabular(desc.kind.op_path(true), fields).await?;
        Ok(RowCursor::new(staged))
    }

    /// Server metadata for a topic (tables, columns, types, ...), as a cursor.
    pub async fn metadata(&mut self, topic: &str) -> ClientResult<RowCursor> {
        let fields = vec![("topic".to_string(), topic.to_string())];
        let staged = self.call_tabular("get_metadata", fields).await?;
        Ok(RowCursor::new(staged))
    }

    pub async fn commit(&mut self) -> ClientResult<()> {
        self.call_scalar("commit", Vec::new()).await.map(|_| ())
    }

    pub async fn rollback(&mut self) -> ClientResult<()> {
        self.call_scalar("rollback", Vec::new()).await.map(|_| ())
    }

    /// Each setter is one round trip and fails atomically: the local flag
    /// only changes after the server acknowledged.
    pub async fn set_auto_commit(&mut self, flag: bool) -> ClientResult<()> {
        let fields = vec![("flag".to_string(), flag.to_string())];
        self.call_scalar("set_auto_commit", fields).await?;
        self.autocommit = flag;
        Ok(())
    }

    pub async fn set_isolation(&mut self, level: IsolationLevel) -> ClientResult<()> {
        let fields = vec![("level".to_string(), level.wire_token().to_string())];
        self.call_scalar("set_isolation", fields).await?;
        self.isolation = level;
        Ok(())
    }

    pub async fn set_holdability(&mut self, holdability: Holdability) -> ClientResult<()> {
        let fields = vec![("holdability".to_string(), holdability.wire_token().to_string())];
        self.call_scalar("set_holdability", fields).await?;
        self.holdability = holdability;
        Ok(())
    }

    /// Invalidate the token server-side and close the session locally.
    /// The local close happens even when the logout round trip fails, so a
    /// half-dead session can never keep issuing requests.
    pub async fn close(&mut self) -> ClientResult<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.call_scalar("logout", Vec::new()).await;
        self.closed = true;
        match result {
            Ok(_) => {
                debug!(user = %self.user, "session closed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "logout failed; session closed locally");
                Err(e)
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn gzip_enabled(&self) -> bool {
        self.gzip
    }

    pub fn autocommit(&self) -> bool {
        self.autocommit
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn holdability(&self) -> Holdability {
        self.holdability
    }

    /// HTTP outcome of the most recent exchange, for diagnostics and the
    /// error translator.
    pub fn last_status(&self) -> Option<&TransportStatus> {
        self.last_status.as_ref()
    }
}
