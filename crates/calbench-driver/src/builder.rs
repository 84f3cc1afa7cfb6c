//! Builder 模式实现
//!
//! 提供链式构造 `Instrument` 实例的便捷方式。

use crate::error::DriverError;
use crate::instrument::Instrument;
use calbench_bus::{BusAddress, BusError, InstrumentBus, PrologixBus};
use std::time::Duration;
use tracing::info;

#[cfg(feature = "mock")]
use calbench_bus::{ReadingSource, SimulatedDmm};

/// 默认会话超时
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// 运行时选择后端的会话类型
pub type DynInstrument = Instrument<Box<dyn InstrumentBus>>;

/// Instrument Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use calbench_driver::InstrumentBuilder;
/// use std::time::Duration;
///
/// let dmm = InstrumentBuilder::new()
///     .address("prologix://192.168.1.50/16".parse().unwrap())
///     .timeout(Duration::from_secs(10))
///     .build()
///     .unwrap();
/// ```
pub struct InstrumentBuilder {
    /// 仪器地址
    address: Option<BusAddress>,
    /// 会话超时（读取与完成等待）
    timeout: Duration,
    /// 模拟仪器的数据源（仅 `BusAddress::Simulated`）
    #[cfg(feature = "mock")]
    reading_source: Option<Box<dyn ReadingSource>>,
}

impl InstrumentBuilder {
    /// 创建新的 Builder
    pub fn new() -> Self {
        Self {
            address: None,
            timeout: DEFAULT_TIMEOUT,
            #[cfg(feature = "mock")]
            reading_source: None,
        }
    }

    /// 设置仪器地址（必需）
    pub fn address(mut self, address: BusAddress) -> Self {
        self.address = Some(address);
        self
    }

    /// 设置会话超时（可选，默认 8 秒）
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 设置模拟仪器的数据源
    #[cfg(feature = "mock")]
    pub fn reading_source(mut self, source: impl ReadingSource + 'static) -> Self {
        self.reading_source = Some(Box::new(source));
        self
    }

    /// 打开会话并构建 Instrument
    ///
    /// # Errors
    /// - `DriverError::Bus`: 地址缺失、后端不可用或连接失败
    pub fn build(self) -> Result<DynInstrument, DriverError> {
        let address = self
            .address
            .ok_or_else(|| BusError::InvalidAddress("no instrument address configured".to_string()))?;

        let bus: Box<dyn InstrumentBus> = match &address {
            BusAddress::Prologix { host, port, gpib } => {
                Box::new(PrologixBus::connect(host, *port, *gpib, self.timeout)?)
            },
            #[cfg(feature = "mock")]
            BusAddress::Simulated => {
                let mut sim = match self.reading_source {
                    Some(source) => SimulatedDmm::from_boxed(source),
                    None => SimulatedDmm::scripted(Vec::<String>::new()),
                };
                sim.set_timeout(self.timeout);
                Box::new(sim)
            },
            #[cfg(not(feature = "mock"))]
            BusAddress::Simulated => {
                return Err(BusError::InvalidAddress(
                    "simulated instrument requires the `mock` feature".to_string(),
                )
                .into());
            },
        };

        info!("Opened instrument session at {} (timeout {:?})", address, self.timeout);
        Instrument::new(bus)
    }
}

impl Default for InstrumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_address() {
        let err = InstrumentBuilder::new().build().err().unwrap();
        assert!(matches!(err, DriverError::Bus(BusError::InvalidAddress(_))));
    }

    #[test]
    fn test_builder_default_timeout() {
        let builder = InstrumentBuilder::default();
        assert_eq!(builder.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_builder_connection_refused() {
        // 端口 1 通常无人监听
        let result = InstrumentBuilder::new()
            .address(BusAddress::Prologix {
                host: "127.0.0.1".to_string(),
                port: 1,
                gpib: 16,
            })
            .timeout(Duration::from_millis(200))
            .build();
        assert!(matches!(result, Err(DriverError::Bus(_))));
    }
}
