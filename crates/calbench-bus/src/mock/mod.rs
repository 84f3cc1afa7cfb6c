//! 模拟数字万用表
//!
//! 在内存中实现 [`InstrumentBus`]，解析本项目使用的 SCPI 子集：
//! 记录收到的每一行指令、维护显示文本 / 采样数 / trace 缓冲区，
//! 总线触发后由独立的通知线程（模拟传输层的中断上下文）调用 SRQ 回调。
//!
//! 采集数据由 [`ReadingSource`] 提供：测试使用 [`ScriptedReadings`] 逐阶段给出原始响应，
//! 演示模式可以传入闭包按显示文本生成读数。

use crate::{BusError, EventQueue, InstrumentBus, ServiceRequest, ServiceRequestHandler};
use calbench_protocol::StatusByte;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// SRQ 时上报的状态字节：RQS | MSB
const SRQ_STATUS: u8 = StatusByte::REQUEST_SERVICE | StatusByte::MEASUREMENT_SUMMARY;

/// 测量事件寄存器的 Buffer Full 位
const BUFFER_FULL: u16 = 512;

/// 采集数据来源
pub trait ReadingSource: Send {
    /// 生成一次采集的 `:TRACe:DATA?` 原始响应
    ///
    /// - `display_text`: 当前前面板显示的文本（即阶段标签）
    /// - `sample_count`: 已配置的采样点数
    fn acquire(&mut self, display_text: Option<&str>, sample_count: u32) -> String;
}

impl<F> ReadingSource for F
where
    F: FnMut(Option<&str>, u32) -> String + Send,
{
    fn acquire(&mut self, display_text: Option<&str>, sample_count: u32) -> String {
        self(display_text, sample_count)
    }
}

/// 按顺序返回预设响应的数据源（用完后返回空响应）
#[derive(Debug, Clone, Default)]
pub struct ScriptedReadings {
    responses: VecDeque<String>,
}

impl ScriptedReadings {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
        }
    }
}

impl ReadingSource for ScriptedReadings {
    fn acquire(&mut self, _display_text: Option<&str>, _sample_count: u32) -> String {
        self.responses.pop_front().unwrap_or_default()
    }
}

/// 注入的故障
#[derive(Debug, Clone, Default)]
struct Faults {
    /// 触发后不产生 SRQ（模拟完成信号丢失）
    suppress_srq: bool,
    /// 写入以此前缀开头的指令时返回超时（大写比较）
    fail_on: Option<String>,
}

/// 模拟仪器的内部状态
#[derive(Debug)]
struct SimState {
    transcript: Vec<String>,
    responses: VecDeque<String>,
    identity: String,
    opc_reply: String,
    display_text: Option<String>,
    display_on: bool,
    sample_count: u32,
    srq_enabled: bool,
    initiated: bool,
    trace: Option<String>,
    measurement_events: u16,
    triggers: usize,
    local_returns: usize,
    faults: Faults,
}

impl SimState {
    fn new() -> Self {
        Self {
            transcript: Vec::new(),
            responses: VecDeque::new(),
            identity: "KEITHLEY INSTRUMENTS INC.,MODEL 2000,SIMULATED,A20".to_string(),
            opc_reply: "1".to_string(),
            display_text: None,
            display_on: false,
            sample_count: 1,
            srq_enabled: false,
            initiated: false,
            trace: None,
            measurement_events: 0,
            triggers: 0,
            local_returns: 0,
            faults: Faults::default(),
        }
    }

    fn reset(&mut self) {
        self.display_text = None;
        self.display_on = false;
        self.sample_count = 1;
        self.srq_enabled = false;
        self.initiated = false;
        self.trace = None;
        self.measurement_events = 0;
    }

    fn handle(&mut self, line: &str) {
        let upper = line.trim().to_ascii_uppercase();

        if upper == "*RST" {
            self.reset();
        } else if upper == "*IDN?" {
            self.responses.push_back(self.identity.clone());
        } else if upper == "*OPC?" {
            self.responses.push_back(self.opc_reply.clone());
        } else if let Some(mask) = upper.strip_prefix("*SRE ") {
            self.srq_enabled = mask.trim().parse::<u8>().map(|m| m & 1 != 0).unwrap_or(false);
        } else if let Some(count) = upper.strip_prefix(":SAMPLE:COUNT ") {
            self.sample_count = count.trim().parse().unwrap_or(1);
        } else if upper.starts_with(":DISPLAY:TEXT:DATA") {
            self.display_text = quoted_argument(line.trim());
        } else if let Some(state) = upper.strip_prefix(":DISPLAY:TEXT:STATE ") {
            self.display_on = state.trim() == "1" || state.trim() == "ON";
        } else if upper.starts_with(":ABOR") {
            self.initiated = false;
        } else if upper.starts_with(":INIT") {
            self.initiated = true;
        } else if upper == ":TRACE:CLEAR" {
            self.trace = None;
        } else if upper == ":STATUS:MEASUREMENT?" {
            // 读取即清除
            self.responses.push_back(self.measurement_events.to_string());
            self.measurement_events = 0;
        } else if upper == ":TRACE:DATA?" {
            self.responses.push_back(self.trace.clone().unwrap_or_default());
        }
    }
}

/// 提取 `'...'` 中的参数并还原 SCPI 的 `''` 转义
fn quoted_argument(line: &str) -> Option<String> {
    let start = line.find('\'')?;
    let end = line.rfind('\'')?;
    if end <= start {
        return None;
    }
    Some(line[start + 1..end].replace("''", "'"))
}

/// 事件队列：记录挂起的 SRQ 与确认次数
#[derive(Debug, Default)]
struct SimEvents {
    pending: AtomicBool,
    discards: AtomicUsize,
    notifications: AtomicUsize,
}

impl EventQueue for SimEvents {
    fn discard_pending_events(&self) -> Result<(), BusError> {
        self.pending.store(false, Ordering::Release);
        self.discards.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// 通知线程
struct Notifier {
    tx: Option<Sender<Duration>>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for Notifier {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("Simulated SRQ notifier thread panicked");
        }
    }
}

/// 模拟仪器的观察句柄
///
/// 会话移交给驱动层后，测试仍可以通过它检查指令记录与事件计数。
#[derive(Clone)]
pub struct SimMonitor {
    state: Arc<Mutex<SimState>>,
    events: Arc<SimEvents>,
}

impl SimMonitor {
    /// 收到的全部指令（按顺序）
    pub fn transcript(&self) -> Vec<String> {
        self.state.lock().transcript.clone()
    }

    /// 总线触发次数（仅统计已 `:INIT` 的有效触发）
    pub fn triggers(&self) -> usize {
        self.state.lock().triggers
    }

    /// 返回本地控制的次数
    pub fn local_returns(&self) -> usize {
        self.state.lock().local_returns
    }

    /// 当前显示文本
    pub fn display_text(&self) -> Option<String> {
        self.state.lock().display_text.clone()
    }

    /// 显示文本是否处于开启状态
    pub fn display_on(&self) -> bool {
        self.state.lock().display_on
    }

    /// 回调确认（discard）次数
    pub fn discards(&self) -> usize {
        self.events.discards.load(Ordering::Acquire)
    }

    /// 已投递的 SRQ 通知次数
    pub fn notifications(&self) -> usize {
        self.events.notifications.load(Ordering::Acquire)
    }

    /// 是否有未确认的 SRQ
    pub fn has_pending_event(&self) -> bool {
        self.events.pending.load(Ordering::Acquire)
    }
}

/// 模拟数字万用表会话
pub struct SimulatedDmm {
    state: Arc<Mutex<SimState>>,
    events: Arc<SimEvents>,
    source: Box<dyn ReadingSource>,
    handler: Arc<Mutex<Option<ServiceRequestHandler>>>,
    notifier: Option<Notifier>,
    timeout: Duration,
    acquisition_delay: Duration,
}

impl SimulatedDmm {
    /// 创建模拟仪器
    pub fn new(source: impl ReadingSource + 'static) -> Self {
        Self::from_boxed(Box::new(source))
    }

    /// 使用已装箱的数据源创建模拟仪器
    pub fn from_boxed(source: Box<dyn ReadingSource>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new())),
            events: Arc::new(SimEvents::default()),
            source,
            handler: Arc::new(Mutex::new(None)),
            notifier: None,
            timeout: Duration::from_secs(8),
            acquisition_delay: Duration::from_millis(5),
        }
    }

    /// 使用预设响应创建模拟仪器
    pub fn scripted<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ScriptedReadings::new(responses))
    }

    /// 设置 `*IDN?` 响应
    pub fn with_identity(self, identity: impl Into<String>) -> Self {
        self.state.lock().identity = identity.into();
        self
    }

    /// 设置 `*OPC?` 响应
    pub fn with_opc_reply(self, reply: impl Into<String>) -> Self {
        self.state.lock().opc_reply = reply.into();
        self
    }

    /// 设置触发到 SRQ 之间的采集耗时
    pub fn with_acquisition_delay(mut self, delay: Duration) -> Self {
        self.acquisition_delay = delay;
        self
    }

    /// 触发后不产生 SRQ
    pub fn suppress_srq(self) -> Self {
        self.state.lock().faults.suppress_srq = true;
        self
    }

    /// 写入指定前缀的指令时返回超时
    pub fn fail_on(self, prefix: impl Into<String>) -> Self {
        self.state.lock().faults.fail_on = Some(prefix.into().to_ascii_uppercase());
        self
    }

    /// 获取观察句柄
    pub fn monitor(&self) -> SimMonitor {
        SimMonitor {
            state: self.state.clone(),
            events: self.events.clone(),
        }
    }

    fn spawn_notifier(events: Arc<SimEvents>, handler: Arc<Mutex<Option<ServiceRequestHandler>>>) -> Notifier {
        let (tx, rx) = crossbeam_channel::unbounded::<Duration>();

        let handle = spawn(move || {
            for delay in rx.iter() {
                std::thread::sleep(delay);

                // 上一次 SRQ 未被确认：中断不会重新布防
                if events.pending.swap(true, Ordering::AcqRel) {
                    warn!("Simulated DMM: previous SRQ was never discarded, dropping notification");
                    continue;
                }

                events.notifications.fetch_add(1, Ordering::AcqRel);
                let current = handler.lock().clone();
                if let Some(callback) = current {
                    callback(&ServiceRequest::new(StatusByte(SRQ_STATUS), events.as_ref()));
                }
            }
        });

        Notifier {
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    /// 在采集耗时后投递一次 SRQ
    fn notify(&mut self, delay: Duration) -> Result<(), BusError> {
        let events = self.events.clone();
        let handler = self.handler.clone();
        let notifier = self.notifier.get_or_insert_with(|| Self::spawn_notifier(events, handler));

        notifier
            .tx
            .as_ref()
            .ok_or(BusError::Disconnected)?
            .send(delay)
            .map_err(|_| BusError::Device("SRQ notifier stopped".to_string()))
    }
}

impl InstrumentBus for SimulatedDmm {
    fn write_line(&mut self, line: &str) -> Result<(), BusError> {
        let mut state = self.state.lock();
        trace!("sim <- {}", line);
        state.transcript.push(line.to_string());

        if let Some(prefix) = &state.faults.fail_on
            && line.trim().to_ascii_uppercase().starts_with(prefix.as_str())
        {
            return Err(BusError::Timeout);
        }

        state.handle(line);
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, BusError> {
        let line = self.state.lock().responses.pop_front().ok_or(BusError::Timeout)?;
        trace!("sim -> {}", line);
        Ok(line)
    }

    fn assert_trigger(&mut self) -> Result<(), BusError> {
        let fire = {
            let mut state = self.state.lock();
            state.transcript.push("<GET>".to_string());

            if !state.initiated {
                debug!("Simulated DMM: trigger ignored (not initiated)");
                return Ok(());
            }

            let display = state.display_text.clone();
            let count = state.sample_count;
            let data = self.source.acquire(display.as_deref(), count);

            state.trace = Some(data);
            state.initiated = false;
            state.measurement_events |= BUFFER_FULL;
            state.triggers += 1;
            state.srq_enabled && !state.faults.suppress_srq
        };

        if fire {
            self.notify(self.acquisition_delay)?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), BusError> {
        let mut state = self.state.lock();
        state.transcript.push("<SDC>".to_string());
        state.responses.clear();
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn on_service_request(&mut self, handler: ServiceRequestHandler) -> Result<(), BusError> {
        *self.handler.lock() = Some(handler);
        Ok(())
    }

    fn return_to_local(&mut self) -> Result<(), BusError> {
        let mut state = self.state.lock();
        state.transcript.push("<GTL>".to_string());
        state.local_returns += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn handler_into(tx: mpsc::Sender<StatusByte>, discard: bool) -> ServiceRequestHandler {
        let tx = Mutex::new(tx);
        Arc::new(move |req: &ServiceRequest<'_>| {
            if discard {
                req.discard_pending_events().unwrap();
            }
            let _ = tx.lock().send(req.status());
        })
    }

    #[test]
    fn test_identity_and_opc_queries() {
        let mut dmm = SimulatedDmm::scripted(Vec::<String>::new()).with_identity("ACME,DMM1");
        dmm.write_line("*IDN?").unwrap();
        assert_eq!(dmm.read_line().unwrap(), "ACME,DMM1");

        dmm.write_line("*OPC?").unwrap();
        assert_eq!(dmm.read_line().unwrap(), "1");

        // 没有待读响应时返回超时
        assert!(matches!(dmm.read_line(), Err(BusError::Timeout)));
    }

    #[test]
    fn test_trigger_produces_trace_and_srq() {
        let mut dmm = SimulatedDmm::scripted(["0.1,0.2"]);
        let monitor = dmm.monitor();
        let (tx, rx) = mpsc::channel();
        dmm.on_service_request(handler_into(tx, true)).unwrap();

        dmm.write_line("*SRE 1").unwrap();
        dmm.write_line(":INITiate").unwrap();
        dmm.assert_trigger().unwrap();

        let status = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(status.measurement_summary());
        assert_eq!(monitor.discards(), 1);
        assert!(!monitor.has_pending_event());

        dmm.write_line(":STATus:MEASurement?").unwrap();
        assert_eq!(dmm.read_line().unwrap(), "512");
        dmm.write_line(":TRACe:DATA?").unwrap();
        assert_eq!(dmm.read_line().unwrap(), "0.1,0.2");
        assert_eq!(monitor.triggers(), 1);
    }

    #[test]
    fn test_trigger_without_initiate_is_ignored() {
        let mut dmm = SimulatedDmm::scripted(["1"]);
        let monitor = dmm.monitor();
        dmm.write_line("*SRE 1").unwrap();
        dmm.assert_trigger().unwrap();
        assert_eq!(monitor.triggers(), 0);
        assert_eq!(monitor.notifications(), 0);
    }

    #[test]
    fn test_undiscarded_srq_blocks_next_notification() {
        let mut dmm = SimulatedDmm::scripted(["1", "2"]);
        let monitor = dmm.monitor();
        let (tx, rx) = mpsc::channel();
        dmm.on_service_request(handler_into(tx, false)).unwrap();
        dmm.write_line("*SRE 1").unwrap();

        dmm.write_line(":INIT").unwrap();
        dmm.assert_trigger().unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();

        dmm.write_line(":INIT").unwrap();
        dmm.assert_trigger().unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert_eq!(monitor.notifications(), 1);
        assert!(monitor.has_pending_event());
    }

    #[test]
    fn test_display_text_tracking() {
        let mut dmm = SimulatedDmm::scripted(Vec::<String>::new());
        let monitor = dmm.monitor();
        dmm.write_line(":DISPlay:TEXT:DATA 'It''s 97'").unwrap();
        dmm.write_line(":DISPlay:TEXT:STATe 1").unwrap();
        assert_eq!(monitor.display_text().as_deref(), Some("It's 97"));
        assert!(monitor.display_on());

        dmm.write_line("*RST").unwrap();
        assert_eq!(monitor.display_text(), None);
    }

    #[test]
    fn test_closure_reading_source() {
        let mut dmm = SimulatedDmm::new(|label: Option<&str>, count: u32| {
            assert_eq!(label, Some("Fully CW"));
            vec!["1.0"; count as usize].join(",")
        });
        dmm.write_line(":DISPlay:TEXT:DATA 'Fully CW'").unwrap();
        dmm.write_line(":SAMPle:COUNt 3").unwrap();
        dmm.write_line(":INIT").unwrap();
        dmm.assert_trigger().unwrap();
        dmm.write_line(":TRACe:DATA?").unwrap();
        assert_eq!(dmm.read_line().unwrap(), "1.0,1.0,1.0");
    }

    #[test]
    fn test_fault_injection() {
        let mut dmm = SimulatedDmm::scripted(Vec::<String>::new()).fail_on(":trac:data");
        assert!(dmm.write_line(":TRACe:CLEar").is_ok());
        // 前缀按大写比较
        assert!(matches!(dmm.write_line(":TRAC:DATA?"), Err(BusError::Timeout)));
    }
}
