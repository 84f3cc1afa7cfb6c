//! SCPI 指令定义
//!
//! 包含配置、触发、取数、显示等指令，以及测试流程使用的固定指令序列。

use crate::DISPLAY_TEXT_WIDTH;
use std::fmt;

/// 测量事件使能掩码：bit 9 = Buffer Full（缓冲区满）
pub const MEASUREMENT_EVENT_BUFFER_FULL: u16 = 512;

/// 服务请求使能掩码：bit 0 = MSB（测量汇总位）
pub const SERVICE_REQUEST_MEASUREMENT_SUMMARY: u8 = 1;

/// 指令分类
///
/// 上层不关心指令的具体文本，只关心它属于流程的哪个阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    /// 一次性配置（复位、事件使能、功能/量程、采样数）
    Configure,
    /// 同步查询（`*OPC?`），确认配置已生效
    Synchronize,
    /// 每阶段的布防 / 触发
    Arm,
    /// 读取测量数据
    Fetch,
    /// 前面板显示
    Display,
    /// 测试结束后的复位
    Release,
    /// 仪器识别
    Identify,
}

/// 测量功能
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MeasurementFunction {
    /// 直流电压
    #[default]
    VoltageDc,
    /// 交流电压
    VoltageAc,
}

impl MeasurementFunction {
    /// SCPI 功能名（`:SENSe:FUNCtion` 参数）
    pub fn scpi_name(&self) -> &'static str {
        match self {
            MeasurementFunction::VoltageDc => "VOLTage:DC",
            MeasurementFunction::VoltageAc => "VOLTage:AC",
        }
    }
}

/// 一次性测量配置参数
///
/// 每种测试类型一份，在 `Configuring` 阶段一次性下发。
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MeasurementSetup {
    /// 测量功能
    pub function: MeasurementFunction,
    /// 量程（伏特）
    pub range_volts: f64,
    /// 每阶段采样点数（同时作为 trace 缓冲区大小）
    pub sample_count: u32,
    /// 输入阻抗自动模式（`None` 表示不下发该指令，保留仪器默认值）
    pub input_impedance_auto: Option<bool>,
}

impl Default for MeasurementSetup {
    fn default() -> Self {
        Self {
            function: MeasurementFunction::VoltageDc,
            range_volts: 0.2,
            sample_count: 100,
            input_impedance_auto: None,
        }
    }
}

/// SCPI 指令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `*RST`
    Reset,
    /// `*CLS`
    ClearStatus,
    /// `:STATus:PRESet`
    StatusPreset,
    /// `:STATus:MEASurement:ENABle <mask>`
    MeasurementEventEnable(u16),
    /// `*SRE <mask>`
    ServiceRequestEnable(u8),
    /// `:SENSe:FUNCtion '<func>'`
    Function(MeasurementFunction),
    /// `:SENSe:<func>:RANGe <volts>`
    Range(MeasurementFunction, f64),
    /// `:INPut:IMPedance:AUTO ON|OFF`
    InputImpedanceAuto(bool),
    /// `:SAMPle:COUNt <n>`
    SampleCount(u32),
    /// `:TRIGger:SOURce BUS`
    TriggerSourceBus,
    /// `:TRACe:POINts <n>`
    TracePoints(u32),
    /// `:TRACe:FEED SENSe1`
    TraceFeedSense,
    /// `:TRACe:FEED:CONTrol NEXT`
    TraceFeedControlNext,
    /// `:TRACe:CLEar`
    TraceClear,
    /// `:INITiate`
    Initiate,
    /// `*OPC?`
    OperationCompleteQuery,
    /// `:STATus:MEASurement?`（读取即清除测量事件寄存器）
    MeasurementStatusQuery,
    /// `:TRACe:DATA?`
    TraceDataQuery,
    /// `:DISPlay:TEXT:DATA '<text>'`
    DisplayText(String),
    /// `:DISPlay:TEXT:STATe 0|1`
    DisplayTextState(bool),
    /// `*IDN?`
    IdentityQuery,
    /// `:ABORt`
    Abort,
}

impl Command {
    /// 构建显示文本指令
    ///
    /// 文本会被截断到 [`DISPLAY_TEXT_WIDTH`] 个字符；单引号按 SCPI 规则转义，
    /// 非 ASCII 可打印字符替换为 `?`（前面板字库不支持）。
    pub fn display_text(text: &str) -> Self {
        let truncated: String = text
            .chars()
            .take(DISPLAY_TEXT_WIDTH)
            .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '?' })
            .collect();
        Command::DisplayText(truncated)
    }

    /// 指令分类
    pub fn class(&self) -> CommandClass {
        match self {
            Command::Reset
            | Command::ClearStatus
            | Command::StatusPreset
            | Command::MeasurementEventEnable(_)
            | Command::ServiceRequestEnable(_)
            | Command::Function(_)
            | Command::Range(..)
            | Command::InputImpedanceAuto(_)
            | Command::SampleCount(_)
            | Command::TriggerSourceBus
            | Command::TracePoints(_)
            | Command::TraceFeedSense => CommandClass::Configure,
            Command::OperationCompleteQuery => CommandClass::Synchronize,
            Command::MeasurementStatusQuery
            | Command::TraceClear
            | Command::TraceFeedControlNext
            | Command::Initiate => CommandClass::Arm,
            Command::TraceDataQuery => CommandClass::Fetch,
            Command::DisplayText(_) | Command::DisplayTextState(_) => CommandClass::Display,
            Command::IdentityQuery => CommandClass::Identify,
            Command::Abort => CommandClass::Release,
        }
    }

    /// 是否为查询指令（需要读取一行响应）
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            Command::OperationCompleteQuery
                | Command::MeasurementStatusQuery
                | Command::TraceDataQuery
                | Command::IdentityQuery
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Reset => write!(f, "*RST"),
            Command::ClearStatus => write!(f, "*CLS"),
            Command::StatusPreset => write!(f, ":STATus:PRESet"),
            Command::MeasurementEventEnable(mask) => write!(f, ":STATus:MEASurement:ENABle {}", mask),
            Command::ServiceRequestEnable(mask) => write!(f, "*SRE {}", mask),
            Command::Function(func) => write!(f, ":SENSe:FUNCtion '{}'", func.scpi_name()),
            Command::Range(func, volts) => {
                write!(f, ":SENSe:{}:RANGe {}", func.scpi_name(), volts)
            },
            Command::InputImpedanceAuto(on) => {
                write!(f, ":INPut:IMPedance:AUTO {}", if *on { "ON" } else { "OFF" })
            },
            Command::SampleCount(n) => write!(f, ":SAMPle:COUNt {}", n),
            Command::TriggerSourceBus => write!(f, ":TRIGger:SOURce BUS"),
            Command::TracePoints(n) => write!(f, ":TRACe:POINts {}", n),
            Command::TraceFeedSense => write!(f, ":TRACe:FEED SENSe1"),
            Command::TraceFeedControlNext => write!(f, ":TRACe:FEED:CONTrol NEXT"),
            Command::TraceClear => write!(f, ":TRACe:CLEar"),
            Command::Initiate => write!(f, ":INITiate"),
            Command::OperationCompleteQuery => write!(f, "*OPC?"),
            Command::MeasurementStatusQuery => write!(f, ":STATus:MEASurement?"),
            Command::TraceDataQuery => write!(f, ":TRACe:DATA?"),
            Command::DisplayText(text) => {
                write!(f, ":DISPlay:TEXT:DATA '{}'", text.replace('\'', "''"))
            },
            Command::DisplayTextState(on) => {
                write!(f, ":DISPlay:TEXT:STATe {}", if *on { 1 } else { 0 })
            },
            Command::IdentityQuery => write!(f, "*IDN?"),
            Command::Abort => write!(f, ":ABORt"),
        }
    }
}

/// 一次性配置指令序列（不含末尾的同步查询）
///
/// 顺序：复位 → 状态预置 → 清状态 → 完成通知使能 → 功能/量程 → 触发与缓冲区。
/// 完成通知条件必须在第一次触发之前使能，否则第一阶段永远等不到 SRQ。
pub fn configure_sequence(setup: &MeasurementSetup) -> Vec<Command> {
    let mut commands = vec![
        Command::Reset,
        Command::StatusPreset,
        Command::ClearStatus,
        Command::MeasurementEventEnable(MEASUREMENT_EVENT_BUFFER_FULL),
        Command::ServiceRequestEnable(SERVICE_REQUEST_MEASUREMENT_SUMMARY),
        Command::Function(setup.function),
        Command::Range(setup.function, setup.range_volts),
    ];

    if let Some(auto) = setup.input_impedance_auto {
        commands.push(Command::InputImpedanceAuto(auto));
    }

    commands.extend([
        Command::SampleCount(setup.sample_count),
        Command::TriggerSourceBus,
        Command::TracePoints(setup.sample_count),
        Command::TraceFeedSense,
    ]);

    commands
}

/// 每阶段的布防指令序列（总线触发由传输层单独发出）
///
/// 第一条是测量状态查询：读取即清除上一阶段残留的 Buffer Full 事件。
pub fn arm_sequence() -> [Command; 4] {
    [
        Command::MeasurementStatusQuery,
        Command::TraceClear,
        Command::TraceFeedControlNext,
        Command::Initiate,
    ]
}

/// 释放仪器的指令序列（之后由传输层返回本地控制）
///
/// 中止触发系统后复位，清除显示文本与远程配置。
pub fn release_sequence() -> [Command; 2] {
    [Command::Abort, Command::Reset]
}
