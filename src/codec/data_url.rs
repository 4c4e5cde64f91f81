//! # Data URL 解析
//!
//! ## 设计思路
//!
//! “是否为 Data URL”与“是否为合法 Base64”是两个独立的问题。
//! 解析结果用显式的枚举表达，而不是在字符串上做切片手术：
//! - `Base64Payload::DataUrl`：带 `data:<mime>;base64,` 头
//! - `Base64Payload::Raw`：纯 Base64 字符串
//!
//! ## 实现思路
//!
//! - 头部与字母表校验均使用 `once_cell::sync::Lazy` 预编译的正则。
//! - 以 `data:` 开头但缺少 `;base64,` 标记的输入直接判为格式错误。

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ConvertError;

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// `data:<mime>[;param=value]*;base64,`
static DATA_URL_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^data:([^;,]*)((?:;[^;,]*)*);base64,").expect("valid data url regex")
});

/// Base64 字母表加最多两个尾部填充字符。
static BASE64_ALPHABET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9+/]*={0,2}$").expect("valid base64 regex"));

/// Base64 输入的解析结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Base64Payload<'a> {
    DataUrl { mime_type: String, payload: &'a str },
    Raw { payload: &'a str },
}

impl<'a> Base64Payload<'a> {
    /// 拆分可选的 Data URL 头，不校验载荷内容。
    pub fn parse(input: &'a str) -> Result<Self, ConvertError> {
        let normalized = input.trim();

        if let Some(captures) = DATA_URL_HEADER.captures(normalized) {
            let header_len = captures.get(0).map(|m| m.end()).unwrap_or(0);
            let mime_type = captures
                .get(1)
                .map(|m| m.as_str().trim())
                .filter(|mime| !mime.is_empty())
                .unwrap_or(DEFAULT_MIME_TYPE)
                .to_ascii_lowercase();

            return Ok(Self::DataUrl {
                mime_type,
                payload: &normalized[header_len..],
            });
        }

        if normalized
            .get(..5)
            .is_some_and(|head| head.eq_ignore_ascii_case("data:"))
        {
            return Err(ConvertError::InvalidFormat(
                "Data URL 缺少 ;base64, 标记".to_string(),
            ));
        }

        Ok(Self::Raw {
            payload: normalized,
        })
    }

    /// 拆分并校验载荷是否符合 Base64 字母表。
    pub fn parse_validated(input: &'a str) -> Result<Self, ConvertError> {
        let parsed = Self::parse(input)?;
        if !is_base64_alphabet(parsed.payload()) {
            return Err(ConvertError::InvalidFormat(
                "包含非 Base64 字符或填充位置错误".to_string(),
            ));
        }
        Ok(parsed)
    }

    pub fn has_prefix(&self) -> bool {
        matches!(self, Self::DataUrl { .. })
    }

    pub fn payload(&self) -> &'a str {
        match self {
            Self::DataUrl { payload, .. } | Self::Raw { payload } => *payload,
        }
    }

    /// 按载荷长度与填充估算解码后的字节数。
    pub fn decoded_len_hint(&self) -> u64 {
        let payload = self.payload();
        let padding = payload.bytes().rev().take_while(|b| *b == b'=').count();
        ((payload.len() / 4) * 3).saturating_sub(padding) as u64
    }

    /// 记录的 MIME 类型；纯 Base64 时为 `application/octet-stream`。
    pub fn mime_type(&self) -> &str {
        match self {
            Self::DataUrl { mime_type, .. } => mime_type,
            Self::Raw { .. } => DEFAULT_MIME_TYPE,
        }
    }
}

pub fn is_base64_alphabet(payload: &str) -> bool {
    BASE64_ALPHABET.is_match(payload)
}

/// 拼接 Data URL：`data:<mime>;base64,<payload>`。
pub fn to_data_url(mime_type: &str, payload: &str) -> String {
    let mut out = String::with_capacity(payload.len() + mime_type.len() + 13);
    out.push_str("data:");
    out.push_str(mime_type);
    out.push_str(";base64,");
    out.push_str(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_data_url_with_mime() {
        let parsed = Base64Payload::parse("data:image/png;base64,iVBORw0KGgo=").expect("parse");
        assert!(parsed.has_prefix());
        assert_eq!(parsed.mime_type(), "image/png");
        assert_eq!(parsed.payload(), "iVBORw0KGgo=");
    }

    #[test]
    fn parses_data_url_with_parameters() {
        let parsed =
            Base64Payload::parse("data:text/plain;charset=utf-8;base64,SGk=").expect("parse");
        assert_eq!(parsed.mime_type(), "text/plain");
        assert_eq!(parsed.payload(), "SGk=");
    }

    #[test]
    fn empty_mime_falls_back_to_octet_stream() {
        let parsed = Base64Payload::parse("data:;base64,AAAA").expect("parse");
        assert_eq!(parsed.mime_type(), DEFAULT_MIME_TYPE);
    }

    #[test]
    fn raw_payload_has_no_prefix() {
        let parsed = Base64Payload::parse("  SGVsbG8=\n").expect("parse");
        assert_eq!(parsed, Base64Payload::Raw { payload: "SGVsbG8=" });
        assert_eq!(parsed.mime_type(), DEFAULT_MIME_TYPE);
    }

    #[test]
    fn data_url_without_base64_marker_is_rejected() {
        let result = Base64Payload::parse("data:image/png,rawbytes");
        assert!(matches!(result, Err(ConvertError::InvalidFormat(_))));
    }

    #[test]
    fn alphabet_check_rejects_garbage_and_bad_padding() {
        assert!(is_base64_alphabet(""));
        assert!(is_base64_alphabet("Zm9vYg=="));
        assert!(!is_base64_alphabet("not-base64!@#"));
        assert!(!is_base64_alphabet("Zm9v==="));
        assert!(!is_base64_alphabet("Zm=9v"));
        assert!(matches!(
            Base64Payload::parse_validated("data:image/png;base64,abc$"),
            Err(ConvertError::InvalidFormat(_))
        ));
    }

    #[test]
    fn decoded_len_hint_accounts_for_padding() {
        let hint = |s: &str| Base64Payload::parse(s).expect("parse").decoded_len_hint();
        assert_eq!(hint("Zm9vYmFy"), 6);
        assert_eq!(hint("Zm9vYg=="), 4);
        assert_eq!(hint("data:image/png;base64,Zm9vYmE="), 5);
        assert_eq!(hint(""), 0);
    }

    #[test]
    fn builds_data_url() {
        assert_eq!(to_data_url("image/gif", "R0lG"), "data:image/gif;base64,R0lG");
    }
}
