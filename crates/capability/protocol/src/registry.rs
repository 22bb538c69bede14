//! 连接器注册表
//!
//! 按 `interfaceType` 查找构造函数。默认注册 7 种接口；USB 没有连接器，
//! 构造时返回 [`ConnectorError::Unsupported`]。

use crate::api::ApiProtocol;
use crate::connector::{Connector, Protocol};
use crate::error::ConnectorError;
use crate::file::FileProtocol;
use crate::modbus::ModbusProtocol;
use crate::mqtt::MqttProtocol;
use crate::serial::SerialProtocol;
use crate::supervisor::SupervisedConnector;
use crate::tcp::TcpProtocol;
use crate::udp::UdpProtocol;
use domain::{InterfaceType, SourceConfig};
use historian_pipeline::ReadingSender;
use std::collections::HashMap;
use std::sync::Arc;

/// 连接器构造函数：校验配置并返回未启动的连接器。
pub type ConnectorFactory =
    fn(&SourceConfig, ReadingSender) -> Result<Arc<dyn Connector>, ConnectorError>;

/// 把协议包装为受监督的连接器。
pub fn supervised<P: Protocol>(
    config: &SourceConfig,
    sender: ReadingSender,
) -> Result<Arc<dyn Connector>, ConnectorError> {
    let protocol = P::initialize(config)?;
    Ok(Arc::new(SupervisedConnector::new(protocol, sender)))
}

#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    factories: HashMap<InterfaceType, ConnectorFactory>,
}

impl ConnectorRegistry {
    /// 空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册全部内置连接器
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(InterfaceType::Serial, supervised::<SerialProtocol>);
        registry.register(InterfaceType::Tcp, supervised::<TcpProtocol>);
        registry.register(InterfaceType::Udp, supervised::<UdpProtocol>);
        registry.register(InterfaceType::File, supervised::<FileProtocol>);
        registry.register(InterfaceType::Api, supervised::<ApiProtocol>);
        registry.register(InterfaceType::Modbus, supervised::<ModbusProtocol>);
        registry.register(InterfaceType::Mqtt, supervised::<MqttProtocol>);
        registry
    }

    /// 注册（或替换）某个接口类型的构造函数
    pub fn register(&mut self, kind: InterfaceType, factory: ConnectorFactory) {
        self.factories.insert(kind, factory);
    }

    pub fn build(
        &self,
        config: &SourceConfig,
        sender: ReadingSender,
    ) -> Result<Arc<dyn Connector>, ConnectorError> {
        let factory = self
            .factories
            .get(&config.interface_type)
            .ok_or(ConnectorError::Unsupported(config.interface_type))?;
        factory(config, sender)
    }

    pub fn supports(&self, kind: InterfaceType) -> bool {
        self.factories.contains_key(&kind)
    }

    /// 已注册的接口类型（按声明顺序）
    pub fn kinds(&self) -> Vec<InterfaceType> {
        InterfaceType::ALL
            .into_iter()
            .filter(|kind| self.supports(*kind))
            .collect()
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
