//! In-process engine for `mem://` endpoints.
//!
//! Keeps records as JSON objects in ordered maps keyed by
//! (namespace, database, table). It speaks the same CBOR request/response and
//! notification protocol as a real embedded engine, which makes it the
//! collaborator the adapter is exercised against. It does not parse a query
//! language; `query`, `patch`, `relate` and `run` are rejected.
//!
//! Credentials are simplified to username/password pairs. Tokens are opaque
//! UUID strings issued by `signup`/`signin` and accepted by `authenticate`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::{Endpoint, EndpointKind, Engine, EngineConnector, NotificationStream};
use crate::config::{ConnectionOptions, Credentials};
use crate::protocol::codec;
use crate::protocol::{EngineError, LiveAction, Method, Notification};

pub const ENGINE_VERSION: &str = concat!("memory-engine-", env!("CARGO_PKG_VERSION"));

type TableKey = (String, String, String);
type NotificationItem = Result<Vec<u8>, EngineError>;

// ============================================================================
// Connector
// ============================================================================

/// Builds [`MemoryEngine`]s for `mem://` / `memory` endpoints.
///
/// Keeps every engine it constructed so callers can inspect them afterwards.
#[derive(Default)]
pub struct MemoryConnector {
    fail_with: Mutex<Option<String>>,
    construct_delay: Option<Duration>,
    execute_delay: Option<Duration>,
    constructed: Mutex<Vec<Arc<MemoryEngine>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector whose construction always fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        let connector = Self::default();
        connector.set_failure(Some(message.into()));
        connector
    }

    /// Sleep this long before constructing.
    pub fn with_construct_delay(mut self, delay: Duration) -> Self {
        self.construct_delay = Some(delay);
        self
    }

    /// Engines built by this connector sleep this long inside every `execute`,
    /// after the released check and before the call runs.
    pub fn with_execute_delay(mut self, delay: Duration) -> Self {
        self.execute_delay = Some(delay);
        self
    }

    /// Make subsequent constructions fail (`Some`) or succeed again (`None`).
    pub fn set_failure(&self, message: Option<String>) {
        *self.fail_with.lock() = message;
    }

    /// Engines constructed so far, oldest first.
    pub fn constructed(&self) -> Vec<Arc<MemoryEngine>> {
        self.constructed.lock().clone()
    }

    pub fn constructed_count(&self) -> usize {
        self.constructed.lock().len()
    }

    /// Most recently constructed engine.
    pub fn latest(&self) -> Option<Arc<MemoryEngine>> {
        self.constructed.lock().last().cloned()
    }
}

#[async_trait]
impl EngineConnector for MemoryConnector {
    async fn construct(
        &self,
        endpoint: &Endpoint,
        options: &ConnectionOptions,
    ) -> Result<Arc<dyn Engine>, EngineError> {
        if let Some(delay) = self.construct_delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.fail_with.lock().clone();
        if let Some(message) = failure {
            return Err(EngineError::Construct(message));
        }

        match endpoint.kind() {
            EndpointKind::Memory => {}
            EndpointKind::IndxDb { name } => {
                return Err(EngineError::Construct(format!(
                    "IndexedDB storage '{name}' is not available in this build"
                )));
            }
            EndpointKind::Other { scheme, .. } => {
                return Err(EngineError::Construct(format!(
                    "Unsupported endpoint scheme '{scheme}'"
                )));
            }
        }

        let mut engine = MemoryEngine::new(options.clone());
        engine.execute_delay = self.execute_delay;
        let engine = Arc::new(engine);
        self.constructed.lock().push(engine.clone());
        debug!(endpoint = %endpoint, strict = options.strict, capacity = options.capacity, "memory_engine_constructed");
        Ok(engine)
    }
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Default)]
struct Session {
    namespace: Option<String>,
    database: Option<String>,
    user: Option<String>,
    vars: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
struct Store {
    tables: BTreeMap<TableKey, BTreeMap<String, Value>>,
    /// username -> password
    users: BTreeMap<String, String>,
    /// token -> username
    tokens: BTreeMap<String, String>,
    /// live query id -> watched table
    lives: BTreeMap<String, TableKey>,
}

enum NotifySender {
    Bounded(mpsc::Sender<NotificationItem>),
    Unbounded(mpsc::UnboundedSender<NotificationItem>),
}

impl NotifySender {
    fn send(&self, item: NotificationItem) -> bool {
        match self {
            NotifySender::Bounded(tx) => match tx.try_send(item) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("memory_engine_notification_dropped_full");
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            },
            NotifySender::Unbounded(tx) => tx.send(item).is_ok(),
        }
    }
}

enum NotifyReceiver {
    Bounded(mpsc::Receiver<NotificationItem>),
    Unbounded(mpsc::UnboundedReceiver<NotificationItem>),
}

impl NotifyReceiver {
    async fn recv(&mut self) -> Option<NotificationItem> {
        match self {
            NotifyReceiver::Bounded(rx) => rx.recv().await,
            NotifyReceiver::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// How a write treats the target record.
#[derive(Clone, Copy)]
enum WriteMode {
    /// Replace content of existing records
    Update,
    /// Replace content, creating the record if missing
    Upsert,
    /// Merge fields into existing records
    Merge,
}

pub struct MemoryEngine {
    options: ConnectionOptions,
    session: Mutex<Session>,
    store: RwLock<Store>,
    notify_tx: Mutex<Option<NotifySender>>,
    notify_rx: Mutex<Option<NotifyReceiver>>,
    released: AtomicBool,
    release_count: AtomicUsize,
    executed: AtomicUsize,
    execute_delay: Option<Duration>,
}

impl MemoryEngine {
    pub fn new(options: ConnectionOptions) -> Self {
        let (tx, rx) = if options.notifications {
            if options.capacity == 0 {
                let (tx, rx) = mpsc::unbounded_channel();
                (
                    Some(NotifySender::Unbounded(tx)),
                    Some(NotifyReceiver::Unbounded(rx)),
                )
            } else {
                let (tx, rx) = mpsc::channel(options.capacity);
                (
                    Some(NotifySender::Bounded(tx)),
                    Some(NotifyReceiver::Bounded(rx)),
                )
            }
        } else {
            (None, None)
        };

        let mut store = Store::default();
        if let Some(user) = &options.user {
            match user {
                Credentials::Root { username, password }
                | Credentials::Namespace {
                    username, password, ..
                }
                | Credentials::Database {
                    username, password, ..
                } => {
                    store.users.insert(username.clone(), password.clone());
                }
                Credentials::Scope { .. } => {}
            }
        }

        Self {
            options,
            session: Mutex::new(Session::default()),
            store: RwLock::new(store),
            notify_tx: Mutex::new(tx),
            notify_rx: Mutex::new(rx),
            released: AtomicBool::new(false),
            release_count: AtomicUsize::new(0),
            executed: AtomicUsize::new(0),
            execute_delay: None,
        }
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// How many times `release` has been called.
    pub fn release_count(&self) -> usize {
        self.release_count.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Number of requests submitted through `execute`.
    pub fn executed_count(&self) -> usize {
        self.executed.load(Ordering::Relaxed)
    }

    /// Push an arbitrary notification onto the stream.
    ///
    /// Returns `false` when notifications are disabled, the stream is closed,
    /// or a bounded channel is full.
    pub fn push_notification(&self, notification: &Notification) -> bool {
        match codec::encode_notification(notification) {
            Ok(bytes) => self.send_item(Ok(bytes)),
            Err(e) => {
                warn!(error = %e, "memory_engine_notification_encode_failed");
                false
            }
        }
    }

    /// Push a raw blob onto the stream, bypassing the encoder.
    pub fn push_raw_notification(&self, bytes: Vec<u8>) -> bool {
        self.send_item(Ok(bytes))
    }

    /// Make the notification reader observe a read failure.
    pub fn fail_notifications(&self, message: impl Into<String>) -> bool {
        self.send_item(Err(EngineError::Notifications(message.into())))
    }

    fn send_item(&self, item: NotificationItem) -> bool {
        match self.notify_tx.lock().as_ref() {
            Some(tx) => tx.send(item),
            None => false,
        }
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    fn dispatch(&self, method: &Method, params: &[Value]) -> Result<Value, String> {
        match method {
            Method::Ping => Ok(Value::Null),
            Method::Version => Ok(Value::String(ENGINE_VERSION.to_string())),
            Method::Use => Ok(self.use_scope(params)),
            Method::Info => Ok(self
                .session
                .lock()
                .user
                .as_ref()
                .map_or(Value::Null, |user| json!({ "username": user }))),
            Method::Signup => self.signup(params),
            Method::Signin => self.signin(params),
            Method::Authenticate => self.authenticate(params),
            Method::Invalidate => {
                self.session.lock().user = None;
                Ok(Value::Null)
            }
            Method::Let => {
                let name = str_param(params, 0, "variable name")?;
                let value = params.get(1).cloned().unwrap_or(Value::Null);
                self.session.lock().vars.insert(name.to_string(), value);
                Ok(Value::Null)
            }
            Method::Unset => {
                let name = str_param(params, 0, "variable name")?;
                self.session.lock().vars.remove(name);
                Ok(Value::Null)
            }
            Method::Select => self.select(params),
            Method::Create => self.create(params),
            Method::Insert => self.insert(params),
            Method::Update => self.write(params, WriteMode::Update),
            Method::Upsert => self.write(params, WriteMode::Upsert),
            Method::Merge => self.write(params, WriteMode::Merge),
            Method::Delete => self.delete(params),
            Method::Live => self.live(params),
            Method::Kill => self.kill(params),
            other => Err(format!(
                "Method not supported by the in-memory engine: {other}"
            )),
        }
    }

    fn use_scope(&self, params: &[Value]) -> Value {
        let mut session = self.session.lock();
        if let Some(ns) = params.first().and_then(Value::as_str) {
            session.namespace = Some(ns.to_string());
        }
        if let Some(db) = params.get(1).and_then(Value::as_str) {
            session.database = Some(db.to_string());
        }
        Value::Null
    }

    /// Namespace and database records are addressed in.
    ///
    /// Strict mode requires both to be selected; otherwise `default` stands in.
    fn scope(&self) -> Result<(String, String), String> {
        let session = self.session.lock();
        let resolve = |value: &Option<String>, what: &str| match value {
            Some(v) => Ok(v.clone()),
            None if self.options.strict => Err(format!("Specify a {what} to use")),
            None => Ok("default".to_string()),
        };
        Ok((
            resolve(&session.namespace, "namespace")?,
            resolve(&session.database, "database")?,
        ))
    }

    fn table_key(&self, table: &str) -> Result<TableKey, String> {
        let (ns, db) = self.scope()?;
        Ok((ns, db, table.to_string()))
    }

    fn issue_token(&self, store: &mut Store, username: &str) -> Value {
        let token = uuid::Uuid::new_v4().to_string();
        store.tokens.insert(token.clone(), username.to_string());
        self.session.lock().user = Some(username.to_string());
        Value::String(token)
    }

    fn signup(&self, params: &[Value]) -> Result<Value, String> {
        let (username, password) = credentials(params)?;
        let mut store = self.store.write();
        if store.users.contains_key(&username) {
            return Err(format!("User '{username}' already exists"));
        }
        store.users.insert(username.clone(), password);
        Ok(self.issue_token(&mut store, &username))
    }

    fn signin(&self, params: &[Value]) -> Result<Value, String> {
        let (username, password) = credentials(params)?;
        let mut store = self.store.write();
        if store.users.get(&username) != Some(&password) {
            return Err("There was a problem with authentication".to_string());
        }
        Ok(self.issue_token(&mut store, &username))
    }

    fn authenticate(&self, params: &[Value]) -> Result<Value, String> {
        let token = str_param(params, 0, "token")?;
        let username = self
            .store
            .read()
            .tokens
            .get(token)
            .cloned()
            .ok_or_else(|| "There was a problem with authentication".to_string())?;
        self.session.lock().user = Some(username);
        Ok(Value::Null)
    }

    fn select(&self, params: &[Value]) -> Result<Value, String> {
        let (table, id) = parse_thing(str_param(params, 0, "resource")?)?;
        let key = self.table_key(&table)?;
        let store = self.store.read();
        let records = store.tables.get(&key);
        Ok(match id {
            Some(id) => records
                .and_then(|r| r.get(&id))
                .cloned()
                .unwrap_or(Value::Null),
            None => Value::Array(records.map(|r| r.values().cloned().collect()).unwrap_or_default()),
        })
    }

    fn create(&self, params: &[Value]) -> Result<Value, String> {
        let (table, id) = parse_thing(str_param(params, 0, "resource")?)?;
        let key = self.table_key(&table)?;
        let id = id.unwrap_or_else(new_record_id);
        let record = build_record(&table, &id, params.get(1))?;
        {
            let mut store = self.store.write();
            let records = store.tables.entry(key.clone()).or_default();
            if records.contains_key(&id) {
                return Err(format!("Database record `{table}:{id}` already exists"));
            }
            records.insert(id, record.clone());
        }
        self.notify(&key, &LiveAction::Create, &record);
        Ok(record)
    }

    fn insert(&self, params: &[Value]) -> Result<Value, String> {
        let (table, id) = parse_thing(str_param(params, 0, "table")?)?;
        if id.is_some() {
            return Err("insert expects a table, not a record id".to_string());
        }
        let key = self.table_key(&table)?;
        let rows: Vec<Value> = match params.get(1) {
            Some(Value::Array(rows)) => rows.clone(),
            Some(row @ Value::Object(_)) => vec![row.clone()],
            _ => return Err("insert expects an object or an array of objects".to_string()),
        };

        let mut created = Vec::with_capacity(rows.len());
        {
            let mut store = self.store.write();
            let records = store.tables.entry(key.clone()).or_default();
            for row in &rows {
                let id = row
                    .get("id")
                    .and_then(Value::as_str)
                    .map(|raw| raw.strip_prefix(&format!("{table}:")).unwrap_or(raw).to_string())
                    .unwrap_or_else(new_record_id);
                if records.contains_key(&id) {
                    return Err(format!("Database record `{table}:{id}` already exists"));
                }
                let record = build_record(&table, &id, Some(row))?;
                records.insert(id, record.clone());
                created.push(record);
            }
        }
        for record in &created {
            self.notify(&key, &LiveAction::Create, record);
        }
        Ok(Value::Array(created))
    }

    fn write(&self, params: &[Value], mode: WriteMode) -> Result<Value, String> {
        let (table, id) = parse_thing(str_param(params, 0, "resource")?)?;
        let key = self.table_key(&table)?;
        let data = params.get(1);
        // Checked up front so a table-wide write never stops halfway.
        match (mode, data) {
            (WriteMode::Merge, Some(Value::Object(_))) => {}
            (WriteMode::Merge, _) => return Err("merge expects an object".to_string()),
            (_, None | Some(Value::Null | Value::Object(_))) => {}
            (_, Some(other)) => {
                return Err(format!("Record content must be an object, got {other}"))
            }
        }

        let mut changed: Vec<(LiveAction, Value)> = Vec::new();
        {
            let mut store = self.store.write();
            let records = store.tables.entry(key.clone()).or_default();
            let targets: Vec<String> = match &id {
                Some(id) => vec![id.clone()],
                None => records.keys().cloned().collect(),
            };
            for target in targets {
                let existing = records.get(&target).cloned();
                let next = match (existing, mode) {
                    (Some(existing), WriteMode::Merge) => merge_record(&existing, data),
                    (Some(_), WriteMode::Update | WriteMode::Upsert) => {
                        build_record(&table, &target, data)?
                    }
                    (None, WriteMode::Upsert) => {
                        let record = build_record(&table, &target, data)?;
                        records.insert(target, record.clone());
                        changed.push((LiveAction::Create, record));
                        continue;
                    }
                    (None, WriteMode::Update | WriteMode::Merge) => continue,
                };
                records.insert(target, next.clone());
                changed.push((LiveAction::Update, next));
            }
        }

        for (action, record) in &changed {
            self.notify(&key, action, record);
        }
        Ok(match id {
            Some(_) => changed
                .into_iter()
                .next()
                .map_or(Value::Null, |(_, record)| record),
            None => Value::Array(changed.into_iter().map(|(_, record)| record).collect()),
        })
    }

    fn delete(&self, params: &[Value]) -> Result<Value, String> {
        let (table, id) = parse_thing(str_param(params, 0, "resource")?)?;
        let key = self.table_key(&table)?;
        let removed: Vec<Value> = {
            let mut store = self.store.write();
            match store.tables.get_mut(&key) {
                Some(records) => match &id {
                    Some(id) => records.remove(id).into_iter().collect(),
                    None => std::mem::take(records).into_values().collect(),
                },
                None => Vec::new(),
            }
        };
        for record in &removed {
            self.notify(&key, &LiveAction::Delete, record);
        }
        Ok(match id {
            Some(_) => removed.into_iter().next().unwrap_or(Value::Null),
            None => Value::Array(removed),
        })
    }

    fn live(&self, params: &[Value]) -> Result<Value, String> {
        if !self.options.notifications {
            return Err("Live queries require notifications to be enabled".to_string());
        }
        if let Some(capabilities) = &self.options.capabilities {
            if !capabilities.allows_live_queries() {
                return Err("Live query notifications are not allowed".to_string());
            }
        }
        let (table, id) = parse_thing(str_param(params, 0, "table")?)?;
        if id.is_some() {
            return Err("live expects a table, not a record id".to_string());
        }
        let key = self.table_key(&table)?;
        let live_id = uuid::Uuid::new_v4().to_string();
        self.store.write().lives.insert(live_id.clone(), key);
        Ok(Value::String(live_id))
    }

    fn kill(&self, params: &[Value]) -> Result<Value, String> {
        let live_id = str_param(params, 0, "live query id")?;
        match self.store.write().lives.remove(live_id) {
            Some(_) => Ok(Value::Null),
            None => Err(format!(
                "Can not execute KILL statement using id '{live_id}'"
            )),
        }
    }

    /// Fan a record change out to every live query watching its table.
    fn notify(&self, key: &TableKey, action: &LiveAction, record: &Value) {
        let subscribers: Vec<String> = self
            .store
            .read()
            .lives
            .iter()
            .filter(|(_, watched)| *watched == key)
            .map(|(id, _)| id.clone())
            .collect();
        for id in subscribers {
            let sent = self.push_notification(&Notification {
                id: Some(id),
                action: Some(action.clone()),
                result: record.clone(),
            });
            trace!(table = %key.2, action = %action, sent, "memory_engine_notify");
        }
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn execute(&self, request: Vec<u8>) -> Result<Vec<u8>, EngineError> {
        if self.is_released() {
            return Err(EngineError::Released);
        }
        self.executed.fetch_add(1, Ordering::Relaxed);
        if let Some(delay) = self.execute_delay {
            tokio::time::sleep(delay).await;
        }
        let call = codec::decode_request(&request)?;
        trace!(id = call.id, method = %call.method, "memory_engine_execute");
        let result = self
            .dispatch(&call.method, &call.params)
            .map_err(EngineError::Execute)?;
        Ok(codec::encode_value(&result)?)
    }

    fn notifications(&self) -> Result<NotificationStream, EngineError> {
        if !self.options.notifications {
            return Err(EngineError::Notifications(
                "Notifications not enabled".to_string(),
            ));
        }
        let rx = self.notify_rx.lock().take().ok_or_else(|| {
            EngineError::Notifications("Notification stream already taken".to_string())
        })?;
        Ok(Box::pin(futures_util::stream::unfold(
            rx,
            |mut rx| async move { rx.recv().await.map(|item| (item, rx)) },
        )))
    }

    fn version(&self) -> String {
        ENGINE_VERSION.to_string()
    }

    fn release(&self) {
        self.release_count.fetch_add(1, Ordering::SeqCst);
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.notify_tx.lock().take();
        self.notify_rx.lock().take();
        debug!("memory_engine_released");
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn str_param<'a>(params: &'a [Value], index: usize, what: &str) -> Result<&'a str, String> {
    params
        .get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("Expected {what} as parameter {index}"))
}

fn credentials(params: &[Value]) -> Result<(String, String), String> {
    let object = params
        .first()
        .and_then(Value::as_object)
        .ok_or_else(|| "Expected credentials object as parameter 0".to_string())?;
    let field = |names: [&str; 2]| {
        names
            .iter()
            .find_map(|name| object.get(*name).and_then(Value::as_str))
            .map(str::to_string)
    };
    let username = field(["username", "user"]).ok_or("Missing username in credentials")?;
    let password = field(["password", "pass"]).ok_or("Missing password in credentials")?;
    Ok((username, password))
}

/// Split `table` or `table:id`.
fn parse_thing(raw: &str) -> Result<(String, Option<String>), String> {
    let (table, id) = match raw.split_once(':') {
        Some((table, id)) => (table, Some(id)),
        None => (raw, None),
    };
    if table.is_empty() {
        return Err(format!("Invalid resource '{raw}': empty table name"));
    }
    match id {
        Some("") => Err(format!("Invalid resource '{raw}': empty record id")),
        Some(id) => Ok((table.to_string(), Some(id.to_string()))),
        None => Ok((table.to_string(), None)),
    }
}

fn new_record_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn build_record(table: &str, id: &str, data: Option<&Value>) -> Result<Value, String> {
    let mut object = match data {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(other) => return Err(format!("Record content must be an object, got {other}")),
    };
    object.insert("id".to_string(), Value::String(format!("{table}:{id}")));
    Ok(Value::Object(object))
}

fn merge_record(existing: &Value, data: Option<&Value>) -> Value {
    let mut merged = existing.clone();
    if let (Value::Object(target), Some(Value::Object(patch))) = (&mut merged, data) {
        for (field, value) in patch {
            if field != "id" {
                target.insert(field.clone(), value.clone());
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PendingCall;
    use futures_util::StreamExt;

    async fn call(engine: &MemoryEngine, method: &str, params: Vec<Value>) -> Result<Value, EngineError> {
        let request = codec::encode_request(&PendingCall {
            id: 1,
            method: Method::parse(method),
            params,
        })
        .unwrap();
        let reply = engine.execute(request).await?;
        Ok(codec::decode_value(&reply).unwrap())
    }

    #[tokio::test]
    async fn test_create_and_select_record() {
        let engine = MemoryEngine::new(ConnectionOptions::default());
        let created = call(&engine, "create", vec![json!("person:tobie"), json!({"name": "Tobie"})])
            .await
            .unwrap();
        assert_eq!(created, json!({"id": "person:tobie", "name": "Tobie"}));

        let selected = call(&engine, "select", vec![json!("person")]).await.unwrap();
        assert_eq!(selected, json!([{"id": "person:tobie", "name": "Tobie"}]));
    }

    #[tokio::test]
    async fn test_table_update_with_bad_content_changes_nothing() {
        let engine = MemoryEngine::new(ConnectionOptions::default());
        call(&engine, "create", vec![json!("person:a"), json!({"age": 1})]).await.unwrap();
        call(&engine, "create", vec![json!("person:b"), json!({"age": 2})]).await.unwrap();

        for method in ["update", "upsert"] {
            let err = call(&engine, method, vec![json!("person"), json!(5)]).await.unwrap_err();
            assert!(err.to_string().contains("must be an object"), "{method}: {err}");
        }
        let rows = call(&engine, "select", vec![json!("person")]).await.unwrap();
        assert_eq!(
            rows,
            json!([{"id": "person:a", "age": 1}, {"id": "person:b", "age": 2}])
        );
    }

    #[tokio::test]
    async fn test_create_duplicate_fails() {
        let engine = MemoryEngine::new(ConnectionOptions::default());
        call(&engine, "create", vec![json!("person:a")]).await.unwrap();
        let err = call(&engine, "create", vec![json!("person:a")]).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_strict_mode_requires_scope() {
        let engine = MemoryEngine::new(ConnectionOptions::default().strict(true));
        let err = call(&engine, "create", vec![json!("person")]).await.unwrap_err();
        assert_eq!(err, EngineError::Execute("Specify a namespace to use".to_string()));

        call(&engine, "use", vec![json!("test"), json!("test")]).await.unwrap();
        assert!(call(&engine, "create", vec![json!("person")]).await.is_ok());
    }

    #[tokio::test]
    async fn test_merge_and_upsert() {
        let engine = MemoryEngine::new(ConnectionOptions::default());
        call(&engine, "create", vec![json!("person:a"), json!({"age": 1})]).await.unwrap();
        let merged = call(&engine, "merge", vec![json!("person:a"), json!({"name": "A"})])
            .await
            .unwrap();
        assert_eq!(merged, json!({"id": "person:a", "age": 1, "name": "A"}));

        let missing = call(&engine, "update", vec![json!("person:b"), json!({})]).await.unwrap();
        assert_eq!(missing, Value::Null);

        let upserted = call(&engine, "upsert", vec![json!("person:b"), json!({"age": 2})])
            .await
            .unwrap();
        assert_eq!(upserted, json!({"id": "person:b", "age": 2}));
    }

    #[tokio::test]
    async fn test_signup_signin_authenticate() {
        let engine = MemoryEngine::new(ConnectionOptions::default());
        let creds = json!({"username": "u", "password": "p"});
        let token = call(&engine, "signup", vec![creds.clone()]).await.unwrap();
        assert!(token.is_string());

        let again = call(&engine, "signin", vec![creds]).await.unwrap();
        assert!(again.is_string());
        assert_ne!(token, again);

        assert!(call(&engine, "authenticate", vec![token]).await.is_ok());
        assert!(call(&engine, "authenticate", vec![json!("bogus")]).await.is_err());
        assert_eq!(
            call(&engine, "info", vec![]).await.unwrap(),
            json!({"username": "u"})
        );
    }

    #[tokio::test]
    async fn test_live_query_pushes_notifications() {
        let engine = MemoryEngine::new(ConnectionOptions::default());
        let mut stream = engine.notifications().unwrap();
        let live_id = call(&engine, "live", vec![json!("person")]).await.unwrap();

        call(&engine, "create", vec![json!("person:a")]).await.unwrap();
        call(&engine, "delete", vec![json!("person:a")]).await.unwrap();

        let first = codec::decode_notification(&stream.next().await.unwrap().unwrap()).unwrap();
        assert_eq!(first.id.as_deref(), live_id.as_str());
        assert_eq!(first.action, Some(LiveAction::Create));
        let second = codec::decode_notification(&stream.next().await.unwrap().unwrap()).unwrap();
        assert_eq!(second.action, Some(LiveAction::Delete));
    }

    #[tokio::test]
    async fn test_notifications_taken_once() {
        let engine = MemoryEngine::new(ConnectionOptions::default());
        assert!(engine.notifications().is_ok());
        assert!(engine.notifications().is_err());
    }

    #[tokio::test]
    async fn test_notifications_disabled() {
        let engine = MemoryEngine::new(ConnectionOptions::default().notifications(false));
        assert!(engine.notifications().is_err());
        assert!(call(&engine, "live", vec![json!("person")]).await.is_err());
    }

    #[tokio::test]
    async fn test_release_closes_stream_and_rejects_requests() {
        let engine = MemoryEngine::new(ConnectionOptions::default());
        let mut stream = engine.notifications().unwrap();
        engine.release();
        assert!(stream.next().await.is_none());
        assert_eq!(
            call(&engine, "ping", vec![]).await.unwrap_err(),
            EngineError::Released
        );
        assert_eq!(engine.release_count(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let engine = MemoryEngine::new(ConnectionOptions::default());
        let err = call(&engine, "query", vec![json!("SELECT * FROM person")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[tokio::test]
    async fn test_connector_rejects_unsupported_endpoints() {
        let connector = MemoryConnector::new();
        let options = ConnectionOptions::default();
        let indxdb = Endpoint::parse("indxdb://app").unwrap();
        assert!(connector.construct(&indxdb, &options).await.is_err());
        let other = Endpoint::parse("tikv://127.0.0.1:2379").unwrap();
        assert!(connector.construct(&other, &options).await.is_err());
        assert_eq!(connector.constructed_count(), 0);

        let mem = Endpoint::parse("mem://").unwrap();
        assert!(connector.construct(&mem, &options).await.is_ok());
        assert_eq!(connector.constructed_count(), 1);
    }

    #[test]
    fn test_parse_thing() {
        assert_eq!(parse_thing("person").unwrap(), ("person".to_string(), None));
        assert_eq!(
            parse_thing("person:tobie").unwrap(),
            ("person".to_string(), Some("tobie".to_string()))
        );
        assert!(parse_thing(":x").is_err());
        assert!(parse_thing("person:").is_err());
    }
}
