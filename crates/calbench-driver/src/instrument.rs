//! 指令协议层
//!
//! 提供对外的 `Instrument` 结构体：独占总线会话，把协议层的指令序列翻译成
//! 总线读写，并把 SRQ 通知接到 [`CompletionSignal`] 上。

use crate::error::DriverError;
use crate::signal::{CompletionSignal, completion_handler};
use calbench_bus::InstrumentBus;
use calbench_protocol::{
    Command, MeasurementSetup, ParsedBurst, arm_sequence, configure_sequence,
    is_operation_complete, parse_numeric_list, parse_register, release_sequence,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 仪器会话
///
/// 会话是显式传递的资源，不存在全局实例；所有方法只在测试序列线程中调用。
///
/// # 示例
///
/// ```no_run
/// use calbench_bus::PrologixBus;
/// use calbench_driver::Instrument;
/// use calbench_protocol::MeasurementSetup;
/// use std::time::Duration;
///
/// let bus = PrologixBus::connect("192.168.1.50", 1234, 16, Duration::from_secs(8)).unwrap();
/// let mut dmm = Instrument::new(bus).unwrap();
///
/// dmm.configure(&MeasurementSetup::default()).unwrap();
/// dmm.arm().unwrap();
/// dmm.await_completion().unwrap();
/// let burst = dmm.fetch_burst().unwrap();
/// println!("{} samples", burst.len());
/// ```
pub struct Instrument<B: InstrumentBus> {
    bus: B,
    signal: Arc<CompletionSignal>,
}

impl<B: InstrumentBus> Instrument<B> {
    /// 接管总线会话：先发送器件清除，再注册完成通知回调
    ///
    /// 器件清除会丢弃仪器输出队列中残留的响应，保证第一条查询读到的是自己的回复。
    ///
    /// # 错误
    ///
    /// - `DriverError::Bus`: 器件清除或回调注册失败
    pub fn new(mut bus: B) -> Result<Self, DriverError> {
        bus.clear()?;
        let signal = Arc::new(CompletionSignal::new());
        bus.on_service_request(completion_handler(signal.clone()))?;
        Ok(Self { bus, signal })
    }

    /// 发送一条指令
    pub fn send(&mut self, command: &Command) -> Result<(), DriverError> {
        self.bus.write_line(&command.to_string())?;
        Ok(())
    }

    /// 发送查询并读取一行响应（已去除行终止符）
    pub fn query(&mut self, command: &Command) -> Result<String, DriverError> {
        self.send(command)?;
        let line = self.bus.read_line()?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// 查询逗号分隔的数值列表
    ///
    /// 无法解析的字段被丢弃并逐个记录 `warn!`，不会导致失败。
    pub fn fetch_numeric_list(&mut self, command: &Command) -> Result<ParsedBurst, DriverError> {
        let response = self.query(command)?;
        let burst = parse_numeric_list(&response);

        for field in &burst.rejected {
            warn!("Dropping unparsable sample {:?} from {} response", field, command);
        }

        Ok(burst)
    }

    /// 查询 16 位事件/状态寄存器
    ///
    /// # 错误
    ///
    /// - `DriverError::Protocol`: 响应不是合法的寄存器值
    pub fn query_register(&mut self, command: &Command) -> Result<u16, DriverError> {
        let reply = self.query(command)?;
        Ok(parse_register(&reply)?)
    }

    /// 读取仪器标识（`*IDN?`）
    pub fn identify(&mut self) -> Result<String, DriverError> {
        self.query(&Command::IdentityQuery)
    }

    /// 一次性测量配置
    ///
    /// 发送配置序列后用 `*OPC?` 同步；同步结果仅作参考，非 `1` 的响应只记录警告。
    pub fn configure(&mut self, setup: &MeasurementSetup) -> Result<(), DriverError> {
        debug!(
            "Configuring {:?}, range {} V, {} samples",
            setup.function, setup.range_volts, setup.sample_count
        );

        for command in configure_sequence(setup) {
            self.send(&command)?;
        }

        let reply = self.query(&Command::OperationCompleteQuery)?;
        if !is_operation_complete(&reply) {
            warn!("Configuration sync returned {:?} (expected 1), continuing", reply);
        }

        Ok(())
    }

    /// 布防并发出总线触发
    ///
    /// 先读取（即清除）测量状态寄存器、清空缓冲区、启动触发系统，
    /// 再清除遗留的完成许可，最后触发。
    pub fn arm(&mut self) -> Result<(), DriverError> {
        for command in arm_sequence() {
            if command.is_query() {
                match self.query_register(&command) {
                    Ok(events) => debug!("Measurement event register before arm: {}", events),
                    Err(DriverError::Protocol(e)) => debug!("Ignoring unreadable status reply: {}", e),
                    Err(e) => return Err(e),
                }
            } else {
                self.send(&command)?;
            }
        }

        if self.signal.take_stale() {
            warn!("Discarded stale completion signal before trigger");
        }

        self.bus.assert_trigger()?;
        Ok(())
    }

    /// 等待完成信号，受会话超时约束
    ///
    /// # 错误
    ///
    /// - `DriverError::CompletionTimeout`: 超时内未收到 SRQ
    pub fn await_completion(&mut self) -> Result<(), DriverError> {
        let timeout = self.bus.timeout();
        if self.signal.wait_timeout(timeout) {
            Ok(())
        } else {
            Err(DriverError::CompletionTimeout { timeout })
        }
    }

    /// 读取本次采集的数据（`:TRACe:DATA?`）
    pub fn fetch_burst(&mut self) -> Result<ParsedBurst, DriverError> {
        self.fetch_numeric_list(&Command::TraceDataQuery)
    }

    /// 在仪器前面板显示文本（截断到显示宽度）
    pub fn show_text(&mut self, text: &str) -> Result<(), DriverError> {
        self.send(&Command::display_text(text))?;
        self.send(&Command::DisplayTextState(true))
    }

    /// 关闭前面板文本显示
    pub fn clear_text(&mut self) -> Result<(), DriverError> {
        self.send(&Command::DisplayTextState(false))
    }

    /// 释放仪器：中止、复位并返回本地控制
    pub fn release(&mut self) -> Result<(), DriverError> {
        for command in release_sequence() {
            self.send(&command)?;
        }
        self.bus.return_to_local()?;
        info!("Instrument released to local control");
        Ok(())
    }

    /// 会话超时
    pub fn timeout(&self) -> Duration {
        self.bus.timeout()
    }

    /// 设置会话超时（同时约束读取与完成等待）
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.bus.set_timeout(timeout);
    }

    /// 完成信号（用于诊断）
    pub fn completion_signal(&self) -> &Arc<CompletionSignal> {
        &self.signal
    }

    /// 底层总线
    pub fn bus(&self) -> &B {
        &self.bus
    }
}
