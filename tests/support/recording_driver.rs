//! A native driver that records which handle serviced every call.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sql_engine_adapter::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    Connection,
    Transaction(usize),
    Statement(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub handle: Handle,
    pub op: &'static str,
    pub sql: Option<String>,
    pub args: Vec<RowValues>,
}

#[derive(Debug, Default)]
pub struct Recorder {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicUsize,
    pub fail_commit: AtomicBool,
    /// The next native close fails once.
    pub fail_close: AtomicBool,
    /// Transaction and statement execs sleep this long after recording the call.
    pub exec_delay_ms: AtomicU64,
}

impl Recorder {
    fn record(&self, handle: Handle, op: &'static str, sql: Option<&str>, args: &[RowValues]) {
        self.calls.lock().unwrap().push(Call {
            handle,
            op,
            sql: sql.map(str::to_owned),
            args: args.to_vec(),
        });
    }

    fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ops(&self) -> Vec<(Handle, &'static str)> {
        self.calls().into_iter().map(|c| (c.handle, c.op)).collect()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| c.op == op).count()
    }

    async fn exec_delay(&self) {
        let ms = self.exec_delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

/// Echo the arguments back as a single row, or `one = 1` when there are none.
fn echo_rows(args: &[RowValues]) -> Box<dyn NativeRows> {
    let mut rs = ResultSet::with_capacity(1);
    if args.is_empty() {
        rs.set_column_names(Arc::new(vec!["one".to_string()]));
        rs.add_row_values(vec![RowValues::Int(1)]);
    } else {
        rs.set_column_names(Arc::new(
            (0..args.len()).map(|i| format!("arg{i}")).collect(),
        ));
        rs.add_row_values(args.to_vec());
    }
    Box::new(BufferedRows::from(rs))
}

const OUTCOME: ExecOutcome = ExecOutcome {
    rows_affected: 1,
    last_insert_id: Some(42),
};

#[derive(Debug)]
pub struct RecordingConnection {
    recorder: Arc<Recorder>,
}

impl RecordingConnection {
    pub fn new(recorder: Arc<Recorder>) -> Self {
        Self { recorder }
    }
}

#[async_trait]
impl NativeConnection for RecordingConnection {
    fn backend(&self) -> &'static str {
        "recording"
    }

    async fn begin(&self, _options: &TxOptions) -> Result<Box<dyn NativeTransaction>, DriverError> {
        self.recorder.record(Handle::Connection, "begin", None, &[]);
        Ok(Box::new(RecordingTransaction {
            id: self.recorder.next_id(),
            recorder: Arc::clone(&self.recorder),
        }))
    }

    async fn prepare(&self, sql: &str) -> Result<Box<dyn NativeStatement>, DriverError> {
        self.recorder
            .record(Handle::Connection, "prepare", Some(sql), &[]);
        Ok(Box::new(RecordingStatement {
            id: self.recorder.next_id(),
            recorder: Arc::clone(&self.recorder),
        }))
    }

    async fn query(
        &self,
        sql: &str,
        args: &[RowValues],
    ) -> Result<Box<dyn NativeRows>, DriverError> {
        self.recorder
            .record(Handle::Connection, "query", Some(sql), args);
        Ok(echo_rows(args))
    }

    async fn exec(&self, sql: &str, args: &[RowValues]) -> Result<ExecOutcome, DriverError> {
        self.recorder.record(Handle::Connection, "exec", Some(sql), args);
        Ok(OUTCOME)
    }

    async fn ping(&self) -> Result<(), DriverError> {
        self.recorder.record(Handle::Connection, "ping", None, &[]);
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.recorder.record(Handle::Connection, "close", None, &[]);
        if self.recorder.fail_close.swap(false, Ordering::SeqCst) {
            return Err(DriverError::Other("injected close failure".into()));
        }
        Ok(())
    }
}

pub struct RecordingTransaction {
    id: usize,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl NativeTransaction for RecordingTransaction {
    async fn prepare(&self, sql: &str) -> Result<Box<dyn NativeStatement>, DriverError> {
        self.recorder
            .record(Handle::Transaction(self.id), "prepare", Some(sql), &[]);
        Ok(Box::new(RecordingStatement {
            id: self.recorder.next_id(),
            recorder: Arc::clone(&self.recorder),
        }))
    }

    async fn query(
        &self,
        sql: &str,
        args: &[RowValues],
    ) -> Result<Box<dyn NativeRows>, DriverError> {
        self.recorder
            .record(Handle::Transaction(self.id), "query", Some(sql), args);
        Ok(echo_rows(args))
    }

    async fn exec(&self, sql: &str, args: &[RowValues]) -> Result<ExecOutcome, DriverError> {
        self.recorder
            .record(Handle::Transaction(self.id), "exec", Some(sql), args);
        self.recorder.exec_delay().await;
        Ok(OUTCOME)
    }

    async fn commit(&self) -> Result<(), DriverError> {
        self.recorder
            .record(Handle::Transaction(self.id), "commit", None, &[]);
        if self.recorder.fail_commit.load(Ordering::SeqCst) {
            return Err(DriverError::Other("injected commit failure".into()));
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<(), DriverError> {
        self.recorder
            .record(Handle::Transaction(self.id), "rollback", None, &[]);
        Ok(())
    }
}

pub struct RecordingStatement {
    id: usize,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl NativeStatement for RecordingStatement {
    async fn query(&self, args: &[RowValues]) -> Result<Box<dyn NativeRows>, DriverError> {
        self.recorder
            .record(Handle::Statement(self.id), "query", None, args);
        Ok(echo_rows(args))
    }

    async fn exec(&self, args: &[RowValues]) -> Result<ExecOutcome, DriverError> {
        self.recorder
            .record(Handle::Statement(self.id), "exec", None, args);
        self.recorder.exec_delay().await;
        Ok(OUTCOME)
    }

    async fn close(self: Box<Self>) -> Result<(), DriverError> {
        self.recorder
            .record(Handle::Statement(self.id), "close", None, &[]);
        Ok(())
    }
}

/// A [`Connection`] over a fresh recorder.
pub fn recording_connection(factory: StrategyFactory) -> (Connection, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let native = Arc::new(RecordingConnection::new(Arc::clone(&recorder)));
    (Connection::new(native, factory), recorder)
}

pub fn recording_adapter(style: PlaceholderStyle) -> (SqlAdapter, Arc<Recorder>) {
    let (conn, recorder) = recording_connection(StrategyFactory::for_style(style));
    (SqlAdapter::new(conn), recorder)
}
