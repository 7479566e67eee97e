//! 文档类型表
//!
//! 扫描件的扩展名到 MIME 类型的映射

use phf::phf_map;
use std::path::Path;

/// 支持的扩展名（小写）到 MIME 类型
static CONTENT_TYPES: phf::Map<&'static str, &'static str> = phf_map! {
    "pdf" => "application/pdf",
    "jpg" => "image/jpeg",
    "jpeg" => "image/jpeg",
    "png" => "image/png",
    "tif" => "image/tiff",
    "tiff" => "image/tiff",
    "webp" => "image/webp",
    "bmp" => "image/bmp",
    "gif" => "image/gif",
};

/// 扫描仪或操作系统生成的无用文件
static SCANNER_JUNK: phf::Set<&'static str> = phf::phf_set! {
    "thumbs.db",
    ".ds_store",
    "desktop.ini",
};

/// 根据扩展名推断 MIME 类型
pub fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    CONTENT_TYPES.get(ext.as_str()).copied()
}

/// 是否是图片（可以直接交给视觉模型）
pub fn is_image(content_type: &str) -> bool {
    content_type.starts_with("image/")
}

pub fn is_scanner_junk(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| SCANNER_JUNK.contains(n.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_is_case_insensitive() {
        assert_eq!(content_type_for(Path::new("a/ESCRITURA.JPG")), Some("image/jpeg"));
        assert_eq!(content_type_for(Path::new("acta.pdf")), Some("application/pdf"));
        assert_eq!(content_type_for(Path::new("notes.docx")), None);
        assert_eq!(content_type_for(Path::new("no_extension")), None);
    }

    #[test]
    fn test_scanner_junk() {
        assert!(is_scanner_junk(Path::new("scans/Thumbs.db")));
        assert!(is_scanner_junk(Path::new(".DS_Store")));
        assert!(!is_scanner_junk(Path::new("scans/page1.png")));
    }
}
