//! 体积格式化：字节数 → (数值, 单位)。

use serde::Serialize;

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// 人类可读的体积信息。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeInfo {
    /// 保留两位小数的数值。
    pub magnitude: f64,
    /// `B` / `KB` / `MB` / `GB` / `TB` 之一。
    pub unit: &'static str,
    /// 原始字节数。
    pub raw_bytes: u64,
}

/// 按 1024 进制选择不超过数值的最大单位，最大停在 TB。
///
/// # 示例
/// ```rust
/// use base64_workbench::codec::format_size;
///
/// let info = format_size(1536);
/// assert_eq!((info.magnitude, info.unit), (1.5, "KB"));
/// ```
pub fn format_size(bytes: u64) -> SizeInfo {
    if bytes == 0 {
        return SizeInfo {
            magnitude: 0.0,
            unit: UNITS[0],
            raw_bytes: 0,
        };
    }

    let mut value = bytes as f64;
    let mut unit_index = 0;
    while value >= 1024.0 && unit_index < UNITS.len() - 1 {
        value /= 1024.0;
        unit_index += 1;
    }

    SizeInfo {
        magnitude: (value * 100.0).round() / 100.0,
        unit: UNITS[unit_index],
        raw_bytes: bytes,
    }
}

impl std::fmt::Display for SizeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.magnitude, self.unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(bytes: u64) -> (f64, &'static str) {
        let info = format_size(bytes);
        (info.magnitude, info.unit)
    }

    #[test]
    fn formats_unit_boundaries() {
        assert_eq!(pair(0), (0.0, "B"));
        assert_eq!(pair(1023), (1023.0, "B"));
        assert_eq!(pair(1024), (1.0, "KB"));
        assert_eq!(pair(1536), (1.5, "KB"));
        assert_eq!(pair(5 * 1024 * 1024), (5.0, "MB"));
        assert_eq!(pair(1024_u64.pow(4)), (1.0, "TB"));
    }

    #[test]
    fn stops_at_terabytes() {
        assert_eq!(pair(2048 * 1024_u64.pow(4)), (2048.0, "TB"));
    }

    #[test]
    fn rounds_to_two_decimals_and_keeps_raw_bytes() {
        let info = format_size(1234567);
        assert_eq!(info.magnitude, 1.18);
        assert_eq!(info.unit, "MB");
        assert_eq!(info.raw_bytes, 1234567);
        assert_eq!(info.to_string(), "1.18MB");
    }
}
