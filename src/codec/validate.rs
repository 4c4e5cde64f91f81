//! Base64 图片校验：MIME 白名单 + 字母表 + 文件签名探测。

use base64::{Engine as _, engine::general_purpose};
use serde::Serialize;

use super::data_url::{Base64Payload, is_base64_alphabet};

/// 允许的图片 MIME 类型。
pub const IMAGE_MIME_TYPES: [&str; 7] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
    "image/svg+xml",
];

const SVG_MIME_TYPE: &str = "image/svg+xml";

/// 签名探测只解码开头的一小段。
const SIGNATURE_PROBE_CHARS: usize = 64;

/// 校验结论。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub message: String,
    /// Data URL 头声明的 MIME 类型。
    pub declared_mime: Option<String>,
    /// 按文件签名识别出的 MIME 类型（SVG 不做探测）。
    pub detected_mime: Option<String>,
}

impl ValidationReport {
    fn invalid(message: impl Into<String>, declared_mime: Option<String>) -> Self {
        Self {
            is_valid: false,
            message: message.into(),
            declared_mime,
            detected_mime: None,
        }
    }
}

fn probe_signature(payload: &str) -> Result<Option<infer::Type>, base64::DecodeError> {
    let probe_len = if payload.len() <= SIGNATURE_PROBE_CHARS {
        payload.len()
    } else {
        SIGNATURE_PROBE_CHARS
    };
    let head = general_purpose::STANDARD.decode(&payload[..probe_len])?;
    Ok(infer::get(&head))
}

/// 校验输入是否为合法的 Base64 图片 Data URL。
///
/// 不会返回错误：所有问题都体现在 `is_valid = false` 与 `message` 中。
pub fn validate_base64_image(input: &str) -> ValidationReport {
    let parsed = match Base64Payload::parse(input) {
        Ok(parsed) => parsed,
        Err(err) => return ValidationReport::invalid(err.to_string(), None),
    };

    let Base64Payload::DataUrl { mime_type, payload } = &parsed else {
        return ValidationReport::invalid("缺少 data:image/...;base64, 头", None);
    };
    let declared = Some(mime_type.clone());

    if !IMAGE_MIME_TYPES.contains(&mime_type.as_str()) {
        return ValidationReport::invalid(format!("不支持的图片类型：{}", mime_type), declared);
    }

    if payload.is_empty() {
        return ValidationReport::invalid("图片内容为空", declared);
    }

    if !is_base64_alphabet(payload) {
        return ValidationReport::invalid("Base64 格式无效", declared);
    }

    // SVG 是文本格式，没有可探测的文件签名。
    if mime_type == SVG_MIME_TYPE {
        return ValidationReport {
            is_valid: true,
            message: "有效的 Base64 图片".to_string(),
            declared_mime: declared,
            detected_mime: None,
        };
    }

    let detected = match probe_signature(payload) {
        Ok(kind) => kind,
        Err(err) => {
            return ValidationReport::invalid(format!("Base64 内容已损坏：{}", err), declared);
        }
    };

    if let Some(kind) = detected {
        if kind.matcher_type() != infer::MatcherType::Image {
            return ValidationReport {
                is_valid: false,
                message: format!("文件签名不是图片类型：{}", kind.mime_type()),
                declared_mime: declared,
                detected_mime: Some(kind.mime_type().to_string()),
            };
        }
    }

    ValidationReport {
        is_valid: true,
        message: "有效的 Base64 图片".to_string(),
        declared_mime: declared,
        detected_mime: detected.map(|kind| kind.mime_type().to_string()),
    }
}
