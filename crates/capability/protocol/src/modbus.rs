//! Modbus TCP 轮询连接器
//!
//! 连接 Modbus 从设备，按 `pollInterval`（默认 10s）依次读取每个寄存器块。
//!
//! ```json
//! {
//!   "host": "10.0.0.5", "port": 502, "unitId": 1,
//!   "registers": [{ "address": 40001, "type": "holding", "length": 2, "tagName": "temp" }]
//! }
//! ```
//!
//! 从站异常只记录到 `lastError` 并继续下一块；传输错误结束采集并调度重连。

use crate::config::{
    interval_field, port_field, provenance, require_fields, string_field, u64_field,
};
use crate::connector::{PayloadTx, Protocol};
use crate::error::ConnectorError;
use async_trait::async_trait;
use domain::{InterfaceType, Reading, SourceConfig};
use historian_normalize::{normalize_register_block, RegisterBlock, RegisterKind, RegisterValues};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tracing::{debug, warn};

const DEFAULT_POLL_MS: u64 = 10_000;
const DEFAULT_RECONNECT_MS: u64 = 10_000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// 一轮轮询的结果：(寄存器块下标, 读到的值)
pub type RegisterScan = Vec<(usize, RegisterValues)>;

/// Modbus TCP 协议
#[derive(Debug, Clone)]
pub struct ModbusProtocol {
    source_id: i64,
    host: String,
    port: u16,
    unit_id: u8,
    registers: Vec<RegisterBlock>,
    poll_interval: Duration,
    reconnect_interval: Duration,
    connect_timeout: Duration,
    provenance: Map<String, Value>,
}

impl ModbusProtocol {
    pub fn registers(&self) -> &[RegisterBlock] {
        &self.registers
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn read_block(
        &self,
        ctx: &mut Context,
        block: &RegisterBlock,
    ) -> Result<Option<RegisterValues>, ConnectorError> {
        let result = match block.kind {
            RegisterKind::Holding => ctx
                .read_holding_registers(block.address, block.length)
                .await
                .map_err(ConnectorError::transport)?
                .map(RegisterValues::Words),
            RegisterKind::Input => ctx
                .read_input_registers(block.address, block.length)
                .await
                .map_err(ConnectorError::transport)?
                .map(RegisterValues::Words),
            RegisterKind::Coil => ctx
                .read_coils(block.address, block.length)
                .await
                .map_err(ConnectorError::transport)?
                .map(RegisterValues::Bits),
            RegisterKind::Discrete => ctx
                .read_discrete_inputs(block.address, block.length)
                .await
                .map_err(ConnectorError::transport)?
                .map(RegisterValues::Bits),
        };
        match result {
            Ok(values) => Ok(Some(values)),
            Err(exception) => {
                warn!(
                    target: "historian.protocol",
                    source_id = self.source_id,
                    unit_id = self.unit_id,
                    address = block.address,
                    exception = ?exception,
                    "modbus_exception"
                );
                Ok(None)
            }
        }
    }
}

fn parse_registers(config: &SourceConfig) -> Result<Vec<RegisterBlock>, ConnectorError> {
    let Some(value) = config.lookup("registers") else {
        return Ok(Vec::new());
    };
    let blocks: Vec<RegisterBlock> = serde_json::from_value(value.clone())
        .map_err(|err| ConnectorError::invalid("registers", err.to_string()))?;
    if let Some(block) = blocks.iter().find(|block| block.length == 0) {
        return Err(ConnectorError::invalid(
            "registers",
            format!("block {} has zero length", block.tag_name),
        ));
    }
    Ok(blocks)
}

#[async_trait]
impl Protocol for ModbusProtocol {
    type Session = Context;
    type Payload = RegisterScan;

    const KIND: InterfaceType = InterfaceType::Modbus;

    fn initialize(config: &SourceConfig) -> Result<Self, ConnectorError> {
        require_fields(config, &["host", "port", "unitId"])?;
        let host = string_field(config, "host")?;
        let port = port_field(config, "port")?;
        let unit_id = u8::try_from(u64_field(config, "unitId")?)
            .map_err(|_| ConnectorError::invalid("unitId", "expected 0-255"))?;
        let registers = parse_registers(config)?;
        if registers.is_empty() {
            warn!(
                target: "historian.protocol",
                source_id = config.id,
                "modbus_no_registers"
            );
        }
        let connect_timeout = match config.lookup_u64("connectTimeout") {
            Some(ms) if ms > 0 => Duration::from_millis(ms),
            _ => Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        };
        Ok(Self {
            source_id: config.id,
            provenance: provenance(&[
                ("host", json!(host)),
                ("port", json!(port)),
                ("unitId", json!(unit_id)),
            ]),
            host,
            port,
            unit_id,
            registers,
            poll_interval: interval_field(config, "pollInterval", DEFAULT_POLL_MS)?,
            reconnect_interval: interval_field(config, "reconnectInterval", DEFAULT_RECONNECT_MS)?,
            connect_timeout,
        })
    }

    fn source_id(&self) -> i64 {
        self.source_id
    }

    fn reconnect_interval(&self) -> Duration {
        self.reconnect_interval
    }

    async fn connect(&self) -> Result<Context, ConnectorError> {
        let target = format!("{}:{}", self.host, self.port);
        let addr = tokio::net::lookup_host(&target)
            .await?
            .next()
            .ok_or_else(|| ConnectorError::Transport(format!("{}: no address", target)))?;
        let ctx = tokio::time::timeout(
            self.connect_timeout,
            tcp::connect_slave(addr, Slave(self.unit_id)),
        )
        .await
        .map_err(|_| ConnectorError::Transport(format!("connect {} timed out", target)))??;
        debug!(
            target: "historian.protocol",
            source_id = self.source_id,
            address = %addr,
            unit_id = self.unit_id,
            "modbus_connected"
        );
        Ok(ctx)
    }

    async fn acquire(&self, mut ctx: Context, tx: PayloadTx<RegisterScan>) -> Result<(), ConnectorError> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            let mut scan = Vec::with_capacity(self.registers.len());
            for (index, block) in self.registers.iter().enumerate() {
                match self.read_block(&mut ctx, block).await? {
                    Some(values) => scan.push((index, values)),
                    None => tx.report_error(format!(
                        "modbus exception reading {} at {}",
                        block.tag_name, block.address
                    )),
                }
            }
            if !scan.is_empty() {
                tx.send(scan);
            }
        }
    }

    fn process_data(&self, scan: RegisterScan, received_at: i64) -> Vec<Reading> {
        scan.iter()
            .filter_map(|(index, values)| {
                self.registers.get(*index).map(|block| {
                    normalize_register_block(
                        self.source_id,
                        block,
                        values,
                        received_at,
                        &self.provenance,
                    )
                })
            })
            .flatten()
            .collect()
    }
}
