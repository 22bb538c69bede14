//! # 采集连接器能力模块
//!
//! 每种接口类型实现一个 [`Protocol`]：配置校验、打开传输、采集循环和负载规整。
//! [`SupervisedConnector`] 负责统一的生命周期与重连：
//!
//! ```text
//! STOPPED → STARTING → RUNNING → (传输错误) → RECONNECT_SCHEDULED → STARTING …
//! ```
//!
//! 读数经 [`historian_pipeline::ReadingSender`] 交给按数据源串行的写入任务，
//! `stop()` 返回后不会再有读数落库。
//!
//! | 接口 | 采集方式 | 默认重连间隔 |
//! |------|----------|--------------|
//! | SERIAL | 按行读取 | 5s |
//! | TCP | 按行读取，可选周期请求命令 | 5s |
//! | UDP | 数据报 | 5s |
//! | FILE | 轮询追加内容（默认 5s） | 5s |
//! | API | 轮询 HTTP（默认 60s） | 60s |
//! | MODBUS | 轮询寄存器（默认 10s） | 10s |
//! | MQTT | 订阅 topic | 5s |

pub mod api;
pub mod config;
pub mod connector;
pub mod error;
pub mod file;
pub mod modbus;
pub mod mqtt;
pub mod registry;
pub mod serial;
pub mod supervisor;
pub mod tcp;
pub mod udp;

pub use api::{ApiProtocol, ApiResponseBody};
pub use connector::{Connector, PayloadTx, Protocol};
pub use error::ConnectorError;
pub use file::{FileChunk, FileCursor, FileProtocol};
pub use modbus::{ModbusProtocol, RegisterScan};
pub use mqtt::{parse_broker_url, BrokerAddress, MqttMessage, MqttProtocol};
pub use registry::{supervised, ConnectorFactory, ConnectorRegistry};
pub use serial::SerialProtocol;
pub use supervisor::SupervisedConnector;
pub use tcp::TcpProtocol;
pub use udp::{Datagram, UdpProtocol};

/// 面向行的传输（TCP/Serial）读到的一行文本。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLine {
    /// 自连接建立起的行号
    pub index: u64,
    pub text: String,
}

/// 从面向行的传输读取一行；非 UTF-8 字节以替换字符解码，交由规整阶段生成诊断读数。
///
/// `buf` 需跨调用保留：在 `select!` 中被取消时已读字节留在其中，下次调用继续拼接。
/// 传输关闭且无残留字节时返回 `None`。
pub(crate) async fn read_text_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    use tokio::io::AsyncBufReadExt;

    let read = reader.read_until(b'\n', buf).await?;
    if read == 0 && buf.is_empty() {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf)
        .trim_end_matches(['\r', '\n'])
        .to_string();
    buf.clear();
    Ok(Some(line))
}
