use tracing::{debug, warn};

use crate::connection::Connection;
use crate::context::Context;
use crate::error::SqlAdapterError;
use crate::hooks::{Flow, Hook};
use crate::query::{Parameters, Query};
use crate::request::Request;
use crate::results::{ExecResult, InsertResult, Rows};
use crate::statement::Statement;
use crate::transaction::{QueryExecTransaction, TxExecutor, TxState};

/// Executor servicing one routed call, chosen from the request's attachments.
enum Target<'a> {
    Connection(&'a Connection),
    Transaction(&'a mut dyn QueryExecTransaction),
}

impl<'a> Target<'a> {
    fn select(conn: &'a Connection, executor: Option<&'a mut TxExecutor>, hook: Hook) -> Self {
        match executor {
            Some(executor) => {
                debug!(%hook, nested = executor.is_nested(), "routing to transaction");
                Target::Transaction(executor.as_executor_mut())
            }
            None => {
                debug!(%hook, backend = conn.backend(), "routing to connection");
                Target::Connection(conn)
            }
        }
    }

    async fn query(self, ctx: &Context, query: &Query) -> Result<Rows, SqlAdapterError> {
        match self {
            Target::Connection(conn) => conn.query(ctx, query).await,
            Target::Transaction(tx) => tx.query(ctx, query).await,
        }
    }

    async fn insert(self, ctx: &Context, query: &Query) -> Result<InsertResult, SqlAdapterError> {
        match self {
            Target::Connection(conn) => conn.insert(ctx, query).await,
            Target::Transaction(tx) => tx.insert(ctx, query).await,
        }
    }

    async fn exec(self, ctx: &Context, query: &Query) -> Result<ExecResult, SqlAdapterError> {
        match self {
            Target::Connection(conn) => conn.exec(ctx, query).await,
            Target::Transaction(tx) => tx.exec(ctx, query).await,
        }
    }

    async fn prepare(self, ctx: &Context, query: &Query) -> Result<Statement, SqlAdapterError> {
        match self {
            Target::Connection(conn) => conn.prepare(ctx, query).await,
            Target::Transaction(tx) => tx.prepare(ctx, query).await,
        }
    }
}

/// Routes hook invocations onto a [`Connection`] or the transaction attached to the request.
///
/// Every handler either writes its product onto the request and returns [`Flow::Continue`], or
/// records the error and returns [`Flow::Halt`].
#[derive(Debug, Clone)]
pub struct SqlAdapter {
    connection: Connection,
}

impl SqlAdapter {
    #[must_use]
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub async fn handle(&self, hook: Hook, ctx: &Context, req: &mut Request) -> Flow {
        let outcome = match hook {
            Hook::Begin => self.begin(ctx, req).await,
            Hook::BeginNested => self.begin_nested(ctx, req).await,
            Hook::Commit => Self::finish(ctx, req, true).await,
            Hook::Rollback => Self::finish(ctx, req, false).await,
            Hook::Prepare => self.prepare(ctx, req).await,
            Hook::Query => self.query(ctx, req).await,
            Hook::Insert => self.insert(ctx, req).await,
            Hook::Exec => self.exec(ctx, req).await,
            Hook::StatementQuery => Self::statement_query(ctx, req).await,
            Hook::StatementInsert => Self::statement_insert(ctx, req).await,
            Hook::StatementExec => Self::statement_exec(ctx, req).await,
            Hook::StatementClose => Self::statement_close(ctx, req).await,
            Hook::RowsNext => Self::rows_next(ctx, req).await,
            Hook::RowsClose => Self::rows_close(ctx, req).await,
            Hook::Ping => self.connection.ping(ctx).await,
            Hook::ConnClose => self.connection.close(ctx).await,
        };
        match outcome {
            Ok(()) => Flow::Continue,
            Err(err) => {
                debug!(%hook, error = %err, "hook failed");
                req.set_error(err);
                Flow::Halt
            }
        }
    }

    fn ensure_no_active_tx(req: &Request) -> Result<(), SqlAdapterError> {
        match req.executor.as_ref().map(TxExecutor::state) {
            Some(TxState::Active) => Err(SqlAdapterError::TransactionState(
                "a transaction is already active on this request".into(),
            )),
            _ => Ok(()),
        }
    }

    async fn begin(&self, ctx: &Context, req: &mut Request) -> Result<(), SqlAdapterError> {
        Self::ensure_no_active_tx(req)?;
        let tx = self.connection.begin(ctx, &req.tx_options).await?;
        req.executor = Some(TxExecutor::Single(tx));
        Ok(())
    }

    async fn begin_nested(&self, ctx: &Context, req: &mut Request) -> Result<(), SqlAdapterError> {
        if let Some(TxExecutor::Nested(outer)) = req.executor.as_ref()
            && outer.state() == TxState::Active
        {
            let inner = outer.begin(ctx, &req.tx_options).await?;
            req.executor = Some(TxExecutor::Nested(inner));
            return Ok(());
        }
        Self::ensure_no_active_tx(req)?;
        let tx = self.connection.begin_nested(ctx, &req.tx_options).await?;
        req.executor = Some(TxExecutor::Nested(tx));
        Ok(())
    }

    /// Commit or roll back the attached executor. It stays attached in its terminal state, so
    /// later routed calls fail instead of silently running on the connection.
    async fn finish(ctx: &Context, req: &mut Request, commit: bool) -> Result<(), SqlAdapterError> {
        let executor = req.executor.as_mut().ok_or_else(|| {
            SqlAdapterError::TransactionState("no transaction attached to the request".into())
        })?;
        let tx = executor.as_executor_mut();
        let res = if commit {
            tx.commit(ctx).await
        } else {
            tx.rollback(ctx).await
        };
        if res.is_err() && tx.state() == TxState::Aborted {
            warn!(commit, "transaction outcome unknown after failed finish");
        }
        res
    }

    async fn prepare(&self, ctx: &Context, req: &mut Request) -> Result<(), SqlAdapterError> {
        let query = req.query.as_ref().ok_or(SqlAdapterError::MissingAttachment("query"))?;
        let stmt = Target::select(&self.connection, req.executor.as_mut(), Hook::Prepare)
            .prepare(ctx, query)
            .await?;
        req.statement = Some(stmt);
        Ok(())
    }

    async fn query(&self, ctx: &Context, req: &mut Request) -> Result<(), SqlAdapterError> {
        let query = req.query.as_ref().ok_or(SqlAdapterError::MissingAttachment("query"))?;
        let rows = Target::select(&self.connection, req.executor.as_mut(), Hook::Query)
            .query(ctx, query)
            .await?;
        req.row = None;
        req.rows = Some(rows);
        Ok(())
    }

    async fn insert(&self, ctx: &Context, req: &mut Request) -> Result<(), SqlAdapterError> {
        let query = req.query.as_ref().ok_or(SqlAdapterError::MissingAttachment("query"))?;
        let result = Target::select(&self.connection, req.executor.as_mut(), Hook::Insert)
            .insert(ctx, query)
            .await?;
        req.insert_result = Some(result);
        Ok(())
    }

    async fn exec(&self, ctx: &Context, req: &mut Request) -> Result<(), SqlAdapterError> {
        let query = req.query.as_ref().ok_or(SqlAdapterError::MissingAttachment("query"))?;
        let result = Target::select(&self.connection, req.executor.as_mut(), Hook::Exec)
            .exec(ctx, query)
            .await?;
        req.result = Some(result);
        Ok(())
    }

    fn statement_parts(
        req: &mut Request,
    ) -> Result<(&mut Statement, Parameters), SqlAdapterError> {
        let stmt = req
            .statement
            .as_mut()
            .ok_or(SqlAdapterError::MissingAttachment("statement"))?;
        Ok((stmt, req.parameters.clone().unwrap_or_default()))
    }

    async fn statement_query(ctx: &Context, req: &mut Request) -> Result<(), SqlAdapterError> {
        let (stmt, params) = Self::statement_parts(req)?;
        let rows = stmt.query(ctx, &params).await?;
        req.row = None;
        req.rows = Some(rows);
        Ok(())
    }

    async fn statement_insert(ctx: &Context, req: &mut Request) -> Result<(), SqlAdapterError> {
        let (stmt, params) = Self::statement_parts(req)?;
        let result = stmt.insert(ctx, &params).await?;
        req.insert_result = Some(result);
        Ok(())
    }

    async fn statement_exec(ctx: &Context, req: &mut Request) -> Result<(), SqlAdapterError> {
        let (stmt, params) = Self::statement_parts(req)?;
        let result = stmt.exec(ctx, &params).await?;
        req.result = Some(result);
        Ok(())
    }

    async fn statement_close(ctx: &Context, req: &mut Request) -> Result<(), SqlAdapterError> {
        let stmt = req
            .statement
            .take()
            .ok_or(SqlAdapterError::MissingAttachment("statement"))?;
        stmt.close(ctx).await
    }

    async fn rows_next(ctx: &Context, req: &mut Request) -> Result<(), SqlAdapterError> {
        let rows = req
            .rows
            .as_mut()
            .ok_or(SqlAdapterError::MissingAttachment("rows"))?;
        req.row = None;
        req.row = rows.next(ctx).await?;
        Ok(())
    }

    async fn rows_close(ctx: &Context, req: &mut Request) -> Result<(), SqlAdapterError> {
        let rows = req
            .rows
            .take()
            .ok_or(SqlAdapterError::MissingAttachment("rows"))?;
        req.row = None;
        rows.close(ctx).await
    }
}
