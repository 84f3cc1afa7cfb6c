//! IEEE 488.2 状态字节
//!
//! ```text
//! Bit 7 - OSB - Operation Summary Bit
//! Bit 6 - RQS - Request for Service
//! Bit 5 - ESB - Event Summary Bit
//! Bit 4 - MAV - Message Available
//! Bit 3 - QSB - Questionable Summary Bit
//! Bit 2 - EAV - Error Available
//! Bit 1 - 未使用
//! Bit 0 - MSB - Measurement Summary Bit
//! ```

use std::fmt;

/// 串行轮询得到的状态字节
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusByte(pub u8);

impl StatusByte {
    pub const MEASUREMENT_SUMMARY: u8 = 1 << 0;
    pub const ERROR_AVAILABLE: u8 = 1 << 2;
    pub const QUESTIONABLE_SUMMARY: u8 = 1 << 3;
    pub const MESSAGE_AVAILABLE: u8 = 1 << 4;
    pub const EVENT_SUMMARY: u8 = 1 << 5;
    pub const REQUEST_SERVICE: u8 = 1 << 6;
    pub const OPERATION_SUMMARY: u8 = 1 << 7;

    /// 原始值
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// 测量汇总位（本项目使能的唯一 SRQ 来源）
    pub fn measurement_summary(&self) -> bool {
        self.0 & Self::MEASUREMENT_SUMMARY != 0
    }

    /// 错误队列非空
    pub fn error_available(&self) -> bool {
        self.0 & Self::ERROR_AVAILABLE != 0
    }

    /// 输出缓冲区有消息可读
    pub fn message_available(&self) -> bool {
        self.0 & Self::MESSAGE_AVAILABLE != 0
    }

    /// 设备正在请求服务
    pub fn request_service(&self) -> bool {
        self.0 & Self::REQUEST_SERVICE != 0
    }
}

impl From<u8> for StatusByte {
    fn from(value: u8) -> Self {
        StatusByte(value)
    }
}

impl fmt::Display for StatusByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(u8, &str); 7] = [
            (StatusByte::OPERATION_SUMMARY, "OSB"),
            (StatusByte::REQUEST_SERVICE, "RQS"),
            (StatusByte::EVENT_SUMMARY, "ESB"),
            (StatusByte::MESSAGE_AVAILABLE, "MAV"),
            (StatusByte::QUESTIONABLE_SUMMARY, "QSB"),
            (StatusByte::ERROR_AVAILABLE, "EAV"),
            (StatusByte::MEASUREMENT_SUMMARY, "MSB"),
        ];

        write!(f, "0x{:02X}", self.0)?;
        let set: Vec<&str> =
            NAMES.iter().filter(|(bit, _)| self.0 & bit != 0).map(|(_, name)| *name).collect();
        if !set.is_empty() {
            write!(f, " [{}]", set.join("|"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_bits() {
        let sb = StatusByte(0x41);
        assert!(sb.measurement_summary());
        assert!(sb.request_service());
        assert!(!sb.error_available());
        assert!(!sb.message_available());
        assert_eq!(sb.bits(), 0x41);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(StatusByte(0x41).to_string(), "0x41 [RQS|MSB]");
        assert_eq!(StatusByte(0).to_string(), "0x00");
    }
}
