//! 连接器契约
//!
//! - [`Connector`]：对象安全的生命周期接口，由生命周期管理器持有
//! - [`Protocol`]：单个传输协议需要实现的部分（校验、连接、采集、规整）
//! - [`PayloadTx`]：采集循环向监督者上报原始负载与非致命错误

use crate::error::ConnectorError;
use async_trait::async_trait;
use domain::{ConnectorStatus, InterfaceType, Reading, SourceConfig};
use std::time::Duration;
use tokio::sync::mpsc;

/// 连接器生命周期接口。
#[async_trait]
pub trait Connector: Send + Sync {
    fn source_id(&self) -> i64;

    fn kind(&self) -> InterfaceType;

    /// 打开传输并开始采集。传输失败不向调用方传播，
    /// 而是记录到状态并调度一次重连；STARTING/RUNNING 时为空操作。
    async fn start(&self);

    /// 取消重连与采集、关闭传输与写入闸门；已停止时为空操作。
    async fn stop(&self) -> Result<(), ConnectorError>;

    /// 同步状态快照，不做 I/O。
    fn status(&self) -> ConnectorStatus;
}

/// 单个传输协议的实现。
#[async_trait]
pub trait Protocol: Send + Sync + 'static {
    /// 已打开的传输
    type Session: Send + 'static;
    /// 原始负载
    type Payload: Send + 'static;

    const KIND: InterfaceType;

    /// 校验配置（不做 I/O）。
    fn initialize(config: &SourceConfig) -> Result<Self, ConnectorError>
    where
        Self: Sized;

    fn source_id(&self) -> i64;

    fn reconnect_interval(&self) -> Duration;

    /// 打开传输。
    async fn connect(&self) -> Result<Self::Session, ConnectorError>;

    /// 采集循环；返回即表示传输已结束（正常关闭或出错），由监督者调度重连。
    async fn acquire(
        &self,
        session: Self::Session,
        tx: PayloadTx<Self::Payload>,
    ) -> Result<(), ConnectorError>;

    /// 原始负载 → 读数（纯函数）。
    fn process_data(&self, payload: Self::Payload, received_at: i64) -> Vec<Reading>;
}

pub(crate) enum AcquireEvent<P> {
    Payload { payload: P, received_at: i64 },
    Error(String),
}

/// 采集循环的上报端。
pub struct PayloadTx<P> {
    tx: mpsc::UnboundedSender<AcquireEvent<P>>,
}

impl<P> Clone for PayloadTx<P> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<P> PayloadTx<P> {
    pub(crate) fn new(tx: mpsc::UnboundedSender<AcquireEvent<P>>) -> Self {
        Self { tx }
    }

    /// 上报一个原始负载（以当前时间作为接收时间）。
    pub fn send(&self, payload: P) -> bool {
        self.tx
            .send(AcquireEvent::Payload {
                payload,
                received_at: domain::now_epoch_ms(),
            })
            .is_ok()
    }

    /// 上报不中断采集的错误（如一次轮询失败），写入 `lastError`。
    pub fn report_error(&self, error: impl std::fmt::Display) {
        let _ = self.tx.send(AcquireEvent::Error(error.to_string()));
    }
}
