//! 工程记数法格式化
//!
//! 指数取 3 的倍数，尾数落在 `[1, 1000)` 区间，配合 SI 前缀输出，
//! 例如 `0.000875 V` → `875.000 µV`。

/// 支持的 SI 前缀（指数 -12..=9）
const PREFIXES: [(i32, &str); 8] = [
    (-12, "p"),
    (-9, "n"),
    (-6, "µ"),
    (-3, "m"),
    (0, ""),
    (3, "k"),
    (6, "M"),
    (9, "G"),
];

const MIN_EXPONENT: i32 = -12;
const MAX_EXPONENT: i32 = 9;

fn prefix_for(exponent: i32) -> &'static str {
    PREFIXES
        .iter()
        .find(|(e, _)| *e == exponent)
        .map(|(_, p)| *p)
        .unwrap_or("")
}

fn engineering_exponent(value: f64) -> i32 {
    if value == 0.0 {
        return 0;
    }
    let exp = (value.abs().log10() / 3.0).floor() as i32 * 3;
    exp.clamp(MIN_EXPONENT, MAX_EXPONENT)
}

/// 以工程记数法格式化数值
///
/// # 参数
///
/// - `value`: 数值
/// - `decimals`: 尾数保留的小数位数
/// - `unit`: 单位（可为空）
///
/// # 示例
///
/// ```
/// use calbench_tools::format_engineering;
///
/// assert_eq!(format_engineering(0.000875, 3, "V"), "875.000 µV");
/// assert_eq!(format_engineering(-0.015, 3, "V"), "-15.000 mV");
/// assert_eq!(format_engineering(1.0, 4, "V"), "1.0000 V");
/// ```
pub fn format_engineering(value: f64, decimals: usize, unit: &str) -> String {
    if !value.is_finite() {
        return format!("{value} {unit}").trim_end().to_string();
    }

    let mut exponent = engineering_exponent(value);
    let mut mantissa = value / 10f64.powi(exponent);

    // 舍入后可能进位到 1000（如 999.9996 m → 1000.000 m）
    let rounded: f64 = format!("{mantissa:.decimals$}").parse().unwrap_or(mantissa);
    if rounded.abs() >= 1000.0 && exponent < MAX_EXPONENT {
        exponent += 3;
        mantissa = value / 10f64.powi(exponent);
    }

    format!("{mantissa:.decimals$} {}{unit}", prefix_for(exponent))
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes() {
        assert_eq!(format_engineering(1500.0, 1, "Hz"), "1.5 kHz");
        assert_eq!(format_engineering(2.2e-9, 1, "F"), "2.2 nF");
        assert_eq!(format_engineering(4.7e6, 2, "Ω"), "4.70 MΩ");
        assert_eq!(format_engineering(1e-13, 1, "A"), "0.1 pA");
    }

    #[test]
    fn test_zero_and_unitless() {
        assert_eq!(format_engineering(0.0, 2, "V"), "0.00 V");
        assert_eq!(format_engineering(0.005, 1, ""), "5.0 m");
        assert_eq!(format_engineering(12.0, 0, ""), "12");
    }

    #[test]
    fn test_rounding_carry() {
        assert_eq!(format_engineering(0.999_999_6, 3, "V"), "1.000 V");
        assert_eq!(format_engineering(-0.000_999_999_9, 2, "V"), "-1.00 mV");
    }

    #[test]
    fn test_non_finite() {
        assert_eq!(format_engineering(f64::NAN, 3, "V"), "NaN V");
        assert_eq!(format_engineering(f64::INFINITY, 3, ""), "inf");
    }
}
