//! 文件轮询连接器
//!
//! 每个 `pollInterval` 检查一次文件：
//! - CSV/文本：按字节偏移追加读取新行，文件变短时从头开始
//! - JSON：文件大小或修改时间变化时重新读取整个文档
//!
//! `hasHeader = true` 的 CSV 文件以首行作为列名。

use crate::config::{interval_field, provenance, require_fields, string_field, text_format};
use crate::connector::{PayloadTx, Protocol};
use crate::error::ConnectorError;
use async_trait::async_trait;
use domain::{InterfaceType, Reading, SourceConfig};
use historian_normalize::{split_csv_line, DataFormat, TextFormat};
use serde_json::{json, Map, Value};
use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

const DEFAULT_POLL_MS: u64 = 5_000;
const DEFAULT_RECONNECT_MS: u64 = 5_000;

/// 一次轮询读到的内容
#[derive(Debug, Clone, PartialEq)]
pub enum FileChunk {
    /// 新增的完整行（行号, 内容）
    Lines {
        lines: Vec<(u64, String)>,
        headers: Option<Vec<String>>,
    },
    /// 整个 JSON 文档
    Document(String),
}

/// 文件读取进度
#[derive(Debug, Default)]
pub struct FileCursor {
    offset: u64,
    next_line: u64,
    headers: Option<Vec<String>>,
    fingerprint: Option<(u64, Option<SystemTime>)>,
}

/// 文件协议
#[derive(Debug, Clone)]
pub struct FileProtocol {
    source_id: i64,
    path: PathBuf,
    poll_interval: Duration,
    reconnect_interval: Duration,
    has_header: bool,
    read_from_start: bool,
    format: TextFormat,
    provenance: Map<String, Value>,
}

impl FileProtocol {
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// 读取自上次以来的新内容。
    pub async fn poll(&self, cursor: &mut FileCursor) -> Result<Option<FileChunk>, ConnectorError> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|err| ConnectorError::Transport(format!("{}: {}", self.path.display(), err)))?;
        let len = metadata.len();

        if self.format.format == DataFormat::Json {
            let fingerprint = (len, metadata.modified().ok());
            if cursor.fingerprint == Some(fingerprint) {
                return Ok(None);
            }
            cursor.fingerprint = Some(fingerprint);
            let text = tokio::fs::read_to_string(&self.path).await?;
            if text.trim().is_empty() {
                return Ok(None);
            }
            return Ok(Some(FileChunk::Document(text)));
        }

        if len < cursor.offset {
            // 文件被截断或轮转
            cursor.offset = 0;
            cursor.next_line = 0;
            cursor.headers = None;
        }
        if len == cursor.offset {
            return Ok(None);
        }

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(cursor.offset)).await?;
        let mut buffer = Vec::with_capacity((len - cursor.offset) as usize);
        file.read_to_end(&mut buffer).await?;

        // 只消费到最后一个换行，半行留到下次
        let Some(end) = buffer.iter().rposition(|byte| *byte == b'\n') else {
            return Ok(None);
        };
        let complete = &buffer[..=end];
        cursor.offset += complete.len() as u64;

        let mut lines = Vec::new();
        for raw in String::from_utf8_lossy(complete).lines() {
            let index = cursor.next_line;
            cursor.next_line += 1;
            let line = raw.trim_end_matches('\r');
            if index == 0 && self.wants_header() {
                cursor.headers = Some(
                    split_csv_line(line, self.format.delimiter)
                        .into_iter()
                        .map(|header| header.trim().to_string())
                        .collect(),
                );
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }
            lines.push((index, line.to_string()));
        }
        if lines.is_empty() {
            return Ok(None);
        }
        Ok(Some(FileChunk::Lines {
            lines,
            headers: cursor.headers.clone(),
        }))
    }

    fn wants_header(&self) -> bool {
        self.has_header && self.format.format == DataFormat::Csv
    }
}

#[async_trait]
impl Protocol for FileProtocol {
    type Session = FileCursor;
    type Payload = FileChunk;

    const KIND: InterfaceType = InterfaceType::File;

    fn initialize(config: &SourceConfig) -> Result<Self, ConnectorError> {
        require_fields(config, &["path"])?;
        let path = string_field(config, "path")?;
        let format = text_format(config, DataFormat::Csv)?;
        // 兼容 `fileFormat` 字段
        let format = match config.lookup_str("fileFormat") {
            Some(value) if config.lookup("dataFormat").is_none() => TextFormat {
                format: DataFormat::parse(value),
                ..format
            },
            _ => format,
        };
        let file_name = PathBuf::from(&path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        Ok(Self {
            source_id: config.id,
            provenance: provenance(&[("fileName", json!(file_name)), ("path", json!(path))]),
            path: PathBuf::from(path),
            poll_interval: interval_field(config, "pollInterval", DEFAULT_POLL_MS)?,
            reconnect_interval: interval_field(config, "reconnectInterval", DEFAULT_RECONNECT_MS)?,
            has_header: config.lookup_bool("hasHeader").unwrap_or(false),
            read_from_start: config.lookup_bool("readFromStart").unwrap_or(true),
            format,
        })
    }

    fn source_id(&self) -> i64 {
        self.source_id
    }

    fn reconnect_interval(&self) -> Duration {
        self.reconnect_interval
    }

    async fn connect(&self) -> Result<FileCursor, ConnectorError> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|err| ConnectorError::Transport(format!("{}: {}", self.path.display(), err)))?;
        if !metadata.is_file() {
            return Err(ConnectorError::Transport(format!(
                "{}: not a regular file",
                self.path.display()
            )));
        }
        let mut cursor = FileCursor::default();
        if !self.read_from_start {
            cursor.offset = metadata.len();
            cursor.fingerprint = Some((metadata.len(), metadata.modified().ok()));
            if self.wants_header() {
                // 从尾部开始时仍需要列名
                let text = tokio::fs::read_to_string(&self.path).await?;
                if let Some(first) = text.lines().next() {
                    cursor.headers = Some(
                        split_csv_line(first, self.format.delimiter)
                            .into_iter()
                            .map(|header| header.trim().to_string())
                            .collect(),
                    );
                }
                cursor.next_line = text.lines().count() as u64;
            }
        }
        Ok(cursor)
    }

    async fn acquire(
        &self,
        mut cursor: FileCursor,
        tx: PayloadTx<FileChunk>,
    ) -> Result<(), ConnectorError> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if let Some(chunk) = self.poll(&mut cursor).await? {
                tx.send(chunk);
            }
        }
    }

    fn process_data(&self, chunk: FileChunk, received_at: i64) -> Vec<Reading> {
        match chunk {
            FileChunk::Document(text) => {
                self.format
                    .normalize(self.source_id, &text, 0, received_at, &self.provenance)
            }
            FileChunk::Lines { lines, headers } => {
                let format = match headers {
                    Some(headers) if self.format.headers.is_none() => TextFormat {
                        headers: Some(headers),
                        ..self.format.clone()
                    },
                    _ => self.format.clone(),
                };
                lines
                    .iter()
                    .flat_map(|(index, line)| {
                        format.normalize(self.source_id, line, *index, received_at, &self.provenance)
                    })
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("historian-{}-{}", uuid::Uuid::new_v4(), name))
    }

    fn protocol(path: &PathBuf, extra: Value) -> FileProtocol {
        let mut interface_config = json!({"path": path.to_string_lossy()});
        if let (Some(target), Value::Object(extra)) = (interface_config.as_object_mut(), extra) {
            target.extend(extra);
        }
        let config: SourceConfig = serde_json::from_value(json!({
            "id": 14,
            "name": "file",
            "interfaceType": "FILE",
            "protocolType": "CUSTOM",
            "interfaceConfig": interface_config,
        }))
        .unwrap();
        FileProtocol::initialize(&config).unwrap()
    }

    #[test]
    fn path_is_required_and_poll_defaults() {
        let config: SourceConfig = serde_json::from_value(json!({
            "id": 14, "name": "file", "interfaceType": "FILE", "protocolType": "CUSTOM"
        }))
        .unwrap();
        assert!(matches!(
            FileProtocol::initialize(&config),
            Err(ConnectorError::ConfigValidation { .. })
        ));
        let protocol = protocol(&temp_path("x.csv"), json!({}));
        assert_eq!(protocol.poll_interval(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn tails_new_lines_and_uses_header() {
        let path = temp_path("tail.csv");
        std::fs::write(&path, "flow,temp\n1,20\n2,2").unwrap();
        let protocol = protocol(&path, json!({"hasHeader": true}));
        let mut cursor = protocol.connect().await.unwrap();

        let chunk = protocol.poll(&mut cursor).await.unwrap().unwrap();
        let readings = protocol.process_data(chunk, 0);
        let tags: Vec<&str> = readings.iter().map(|r| r.tag_name.as_str()).collect();
        assert_eq!(tags, vec!["flow", "temp"]);
        assert_eq!(readings[0].metadata["lineIndex"], json!(1));

        // 补全半行后才读取
        std::fs::write(&path, "flow,temp\n1,20\n2,21\n").unwrap();
        let chunk = protocol.poll(&mut cursor).await.unwrap().unwrap();
        let readings = protocol.process_data(chunk, 0);
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[1].value, json!(21));
        assert!(protocol.poll(&mut cursor).await.unwrap().is_none());

        // 截断后从头读取
        std::fs::write(&path, "flow,temp\n9,9\n").unwrap();
        let chunk = protocol.poll(&mut cursor).await.unwrap().unwrap();
        let readings = protocol.process_data(chunk, 0);
        assert_eq!(readings[0].value, json!(9));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn missing_file_is_a_transport_error() {
        let protocol = protocol(&temp_path("missing.csv"), json!({}));
        assert!(matches!(
            protocol.connect().await,
            Err(ConnectorError::Transport(_))
        ));
    }
}
