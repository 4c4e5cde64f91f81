//! # 数据源模型
//!
//! ## 设计思路
//!
//! `BinarySource` 是一个类文件句柄：名称、声明长度、MIME 类型，以及一个可增量读取的字节流。
//! 编码阶段只依赖这四项，不关心数据来自内存还是磁盘。

use std::fs::File;
use std::io::Read;
use std::path::Path;

use bytes::{Buf, Bytes};

use super::data_url::DEFAULT_MIME_TYPE;
use crate::error::ConvertError;

/// 类文件数据源。
pub struct BinarySource {
    name: String,
    mime_type: String,
    len: u64,
    reader: Box<dyn Read + Send>,
}

impl BinarySource {
    /// 由内存字节构建数据源。
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        let bytes: Bytes = bytes.into();
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            len: bytes.len() as u64,
            reader: Box::new(bytes.reader()),
        }
    }

    /// 由任意读取器构建数据源，`len` 为声明长度（用于体积校验与进度换算）。
    pub fn from_reader(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        len: u64,
        reader: impl Read + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            len,
            reader: Box::new(reader),
        }
    }

    /// 打开本地文件：长度取自 metadata，MIME 类型优先按文件签名识别，其次按扩展名。
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConvertError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| ConvertError::Read(format!("无法打开文件 {}：{}", path.display(), e)))?;
        let len = file
            .metadata()
            .map_err(|e| ConvertError::Read(format!("无法读取文件信息：{}", e)))?
            .len();

        let sniffed = infer::get_from_path(path)
            .map_err(|e| ConvertError::Read(format!("无法识别文件类型：{}", e)))?
            .map(|kind| kind.mime_type().to_string());
        let mime_type = sniffed
            .or_else(|| mime_from_extension(path).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        log::debug!("📂 打开数据源 {}（{} 字节，{}）", name, len, mime_type);

        Ok(Self::from_reader(name, mime_type, len, file))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// 声明长度（字节）。
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn into_parts(self) -> (String, String, u64, Box<dyn Read + Send>) {
        (self.name, self.mime_type, self.len, self.reader)
    }
}

impl std::fmt::Debug for BinarySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinarySource")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// 文本类格式没有魔数，按扩展名兜底。
fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "svg" => "image/svg+xml",
        "json" => "application/json",
        "xml" => "application/xml",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => return None,
    };
    Some(mime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_file(name: &str, contents: &[u8]) -> std::path::PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let dir = std::env::temp_dir().join(format!("b64wb_source_{}", stamp));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join(name);
        std::fs::write(&path, contents).expect("write temp file");
        path
    }

    #[test]
    fn from_bytes_reports_length_and_reads_back() {
        let source = BinarySource::from_bytes("a.bin", "application/octet-stream", vec![1u8, 2, 3]);
        assert_eq!(source.len(), 3);
        assert_eq!(source.name(), "a.bin");

        let (_, _, _, mut reader) = source.into_parts();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).expect("read");
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn from_path_sniffs_signature_before_extension() {
        let png_signature = [137_u8, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13, 73, 72, 68, 82];
        let path = temp_file("mislabelled.txt", &png_signature);

        let source = BinarySource::from_path(&path).expect("open source");
        assert_eq!(source.mime_type(), "image/png");
        assert_eq!(source.len(), png_signature.len() as u64);
        assert_eq!(source.name(), "mislabelled.txt");

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn from_path_falls_back_to_extension() {
        let path = temp_file("icon.svg", b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>");
        let source = BinarySource::from_path(&path).expect("open source");
        assert_eq!(source.mime_type(), "image/svg+xml");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn from_path_missing_file_is_read_error() {
        let result = BinarySource::from_path("/definitely/not/here.bin");
        assert!(matches!(result, Err(ConvertError::Read(_))));
    }
}
