//! 事件日志：只追加的有序记录，唯一对外持久化的产物
//!
//! 观察者可轮询（since）或订阅推送（subscribe）；可选 JSONL 文件 sink，每条记录追加一行。
//! 记录一旦写入永不修改。

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// 推送通道容量；慢订阅者会收到 Lagged 并可改用 since 补齐
const SUBSCRIBER_CAPACITY: usize = 256;

/// 记录的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventRole {
    System,
    User,
    Assistant,
    Tool,
    Perception,
    Goal,
    Reflex,
    Action,
    Message,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub role: EventRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// JSONL 文件 sink
#[derive(Debug)]
struct JsonlSink {
    path: PathBuf,
    file: File,
}

impl JsonlSink {
    fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    fn write(&mut self, record: &EventRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(record)?;
        writeln!(self.file, "{line}")
    }
}

#[derive(Debug)]
struct LogInner {
    records: Vec<EventRecord>,
    sink: Option<JsonlSink>,
}

/// 只追加的事件日志
#[derive(Debug)]
pub struct EventLog {
    inner: Mutex<LogInner>,
    tx: broadcast::Sender<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        Self {
            inner: Mutex::new(LogInner {
                records: Vec::new(),
                sink: None,
            }),
            tx,
        }
    }

    /// 同时把每条记录追加写入 JSONL 文件
    pub fn with_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let log = Self::new();
        let sink = JsonlSink::open(path.as_ref())?;
        log.lock().sink = Some(sink);
        Ok(log)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn append(&self, role: EventRole, content: impl Into<String>) -> u64 {
        self.append_with(role, content, None)
    }

    /// 追加一条记录（可带结构化 metadata），返回序号
    pub fn append_with(
        &self,
        role: EventRole,
        content: impl Into<String>,
        metadata: Option<serde_json::Value>,
    ) -> u64 {
        let mut inner = self.lock();
        let record = EventRecord {
            seq: inner.records.len() as u64,
            timestamp: Utc::now(),
            role,
            content: content.into(),
            metadata,
        };
        if let Some(sink) = inner.sink.as_mut() {
            if let Err(e) = sink.write(&record) {
                tracing::warn!(path = %sink.path.display(), "event log sink write failed: {}", e);
            }
        }
        let seq = record.seq;
        inner.records.push(record.clone());
        drop(inner);
        // 没有订阅者时 send 返回 Err，忽略
        let _ = self.tx.send(record);
        seq
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.lock().records.clone()
    }

    /// 轮询：返回序号 >= seq 的记录
    pub fn since(&self, seq: u64) -> Vec<EventRecord> {
        let inner = self.lock();
        let start = (seq as usize).min(inner.records.len());
        inner.records[start..].to_vec()
    }

    pub fn last(&self) -> Option<EventRecord> {
        self.lock().records.last().cloned()
    }

    /// 推送：订阅之后追加的记录
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.tx.subscribe()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

/// 读取 JSONL 事件文件（离线回放 / 测试）
pub fn load_jsonl(path: impl AsRef<Path>) -> anyhow::Result<Vec<EventRecord>> {
    let data = std::fs::read_to_string(path)?;
    let mut records = Vec::new();
    for line in data.lines().filter(|l| !l.trim().is_empty()) {
        records.push(serde_json::from_str(line)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_assigns_increasing_seq() {
        let log = EventLog::new();
        assert_eq!(log.append(EventRole::System, "boot"), 0);
        assert_eq!(log.append(EventRole::Goal, "goal set"), 1);
        let all = log.snapshot();
        assert_eq!(all.len(), 2);
        assert!(all[0].timestamp <= all[1].timestamp);
    }

    #[test]
    fn test_since_polls_tail() {
        let log = EventLog::new();
        for i in 0..5 {
            log.append(EventRole::Tool, format!("r{i}"));
        }
        let tail = log.since(3);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].content, "r3");
        assert!(log.since(99).is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_receives_new_records() {
        let log = EventLog::new();
        log.append(EventRole::System, "before");
        let mut rx = log.subscribe();
        log.append_with(
            EventRole::Action,
            "mine",
            Some(serde_json::json!({"count": 3})),
        );
        let rec = rx.recv().await.unwrap();
        assert_eq!(rec.seq, 1);
        assert_eq!(rec.metadata.unwrap()["count"], 3);
    }

    #[test]
    fn test_jsonl_sink_persists_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("events.jsonl");
        let log = EventLog::with_file(&path).unwrap();
        log.append(EventRole::User, "hello");
        log.append(EventRole::Assistant, "hi");
        let loaded = load_jsonl(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].content, "hi");
        assert_eq!(loaded[1].role, EventRole::Assistant);
    }
}
