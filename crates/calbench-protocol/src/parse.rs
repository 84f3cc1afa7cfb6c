//! 响应解析
//!
//! 仪器的数值响应是逗号分隔的 ASCII 浮点数列表（如 `:TRACe:DATA?` 的返回）。

use crate::ProtocolError;

/// 一次取数得到的样本
///
/// 无法解析的字段不会导致失败，而是保存在 `rejected` 中由上层记录日志。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedBurst {
    /// 有效样本（保持响应中的顺序）
    pub samples: Vec<f64>,
    /// 被丢弃的原始字段
    pub rejected: Vec<String>,
}

impl ParsedBurst {
    /// 有效样本数
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// 是否没有任何有效样本
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// 解析逗号分隔的数值列表
///
/// 每个字段去除首尾空白后按 `f64` 解析；非有限值（`NaN`、`inf`）同样视为无效字段。
/// 空响应得到空的 `ParsedBurst`（无样本、无丢弃）。
///
/// # 示例
///
/// ```
/// use calbench_protocol::parse_numeric_list;
///
/// let burst = parse_numeric_list("0.5,abc,0.6");
/// assert_eq!(burst.samples, vec![0.5, 0.6]);
/// assert_eq!(burst.rejected, vec!["abc".to_string()]);
/// ```
pub fn parse_numeric_list(response: &str) -> ParsedBurst {
    let response = response.trim();
    let mut burst = ParsedBurst::default();

    if response.is_empty() {
        return burst;
    }

    for field in response.split(',') {
        let field = field.trim();
        match field.parse::<f64>() {
            Ok(value) if value.is_finite() => burst.samples.push(value),
            _ => burst.rejected.push(field.to_string()),
        }
    }

    burst
}

/// 解析整数寄存器响应（如 `:STATus:MEASurement?`）
///
/// 部分仪器以浮点格式返回寄存器值（`+5.12000000E+02`），这里一并接受。
pub fn parse_register(response: &str) -> Result<u16, ProtocolError> {
    let trimmed = response.trim();
    if let Ok(value) = trimmed.parse::<u16>() {
        return Ok(value);
    }

    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 && value <= u16::MAX as f64 && value.fract() == 0.0 => {
            Ok(value as u16)
        },
        _ => Err(ProtocolError::InvalidRegister {
            raw: trimmed.to_string(),
        }),
    }
}

/// 判断 `*OPC?` 响应是否表示“操作完成”
pub fn is_operation_complete(response: &str) -> bool {
    matches!(parse_register(response), Ok(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_list() {
        let burst = parse_numeric_list("0.001,0.002,0.0015,-0.001");
        assert_eq!(burst.samples, vec![0.001, 0.002, 0.0015, -0.001]);
        assert!(burst.rejected.is_empty());
        assert_eq!(burst.len(), 4);
    }

    #[test]
    fn test_parse_drops_malformed_field() {
        let burst = parse_numeric_list("0.5,abc,0.6");
        assert_eq!(burst.samples, vec![0.5, 0.6]);
        assert_eq!(burst.rejected, vec!["abc".to_string()]);
    }

    #[test]
    fn test_parse_scientific_and_whitespace() {
        let burst = parse_numeric_list(" +1.00012E+00, -2.5E-03 ,3\r\n");
        assert_eq!(burst.samples, vec![1.00012, -0.0025, 3.0]);
        assert!(burst.rejected.is_empty());
    }

    #[test]
    fn test_parse_empty_response() {
        let burst = parse_numeric_list("\n");
        assert!(burst.is_empty());
        assert!(burst.rejected.is_empty());
    }

    #[test]
    fn test_parse_all_invalid() {
        let burst = parse_numeric_list("abc,,NaN,inf");
        assert!(burst.is_empty());
        assert_eq!(burst.rejected.len(), 4);
        assert_eq!(burst.rejected[1], "");
    }

    #[test]
    fn test_parse_register() {
        assert_eq!(parse_register("512\n"), Ok(512));
        assert_eq!(parse_register("+5.12000000E+02"), Ok(512));
        assert_eq!(parse_register("0"), Ok(0));
        assert!(parse_register("1.5").is_err());
        assert!(parse_register("busy").is_err());
    }

    #[test]
    fn test_operation_complete() {
        assert!(is_operation_complete("1\n"));
        assert!(is_operation_complete("+1"));
        assert!(!is_operation_complete("0"));
        assert!(!is_operation_complete(""));
    }
}
