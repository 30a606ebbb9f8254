//! Name and path helpers for the collection layout / 集合目录命名工具函数

/// Image extensions treated as pages / 作为图片页处理的扩展名
const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "apng"];

/// Extensions treated as the novel asset / 作为小说文件处理的扩展名
const NOVEL_EXTS: &[&str] = &["txt", "epub"];

/// Split `"Name (12345)"` into name and numeric id / 拆分名称与数字ID
///
/// The last `(` and the last `)` delimit the id. Everything before the `(` is
/// the name (trimmed). If there is no such pair, or the content is not a plain
/// unsigned integer, the whole string is the name and the id is absent.
/// 括号内容不是纯数字时视为没有ID
pub fn split_name_and_id(value: &str) -> (String, Option<u64>) {
    let (Some(open), Some(close)) = (value.rfind('('), value.rfind(')')) else {
        return (value.to_string(), None);
    };
    if open >= close {
        return (value.to_string(), None);
    }

    let digits = value[open + 1..close].trim();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return (value.to_string(), None);
    }

    match digits.parse::<u64>() {
        Ok(id) => (value[..open].trim().to_string(), Some(id)),
        // 溢出
        Err(_) => (value.to_string(), None),
    }
}

/// Get file extension (lowercase) / 获取文件扩展名
pub fn get_ext(path: &str) -> String {
    std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

pub fn is_image_file(name: &str) -> bool {
    IMAGE_EXTS.contains(&get_ext(name).as_str())
}

/// Metadata file: `*-meta.txt` or `*_meta.txt` / 元数据文件
pub fn is_meta_file(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with("-meta.txt") || lower.ends_with("_meta.txt")
}

/// Novel asset: `.txt` or `.epub`, never the metadata file / 小说文件（排除元数据文件）
pub fn is_novel_file(name: &str) -> bool {
    !is_meta_file(name) && NOVEL_EXTS.contains(&get_ext(name).as_str())
}

/// Build the stable identity of a work / 生成作品的相对路径
/// Always `/`-separated so that stored lists survive a platform change.
pub fn relative_path(creator_dir: &str, work_dir: &str) -> String {
    format!("{}/{}", to_slash(creator_dir), to_slash(work_dir))
}

/// Replace backslashes with forward slashes and trim surrounding slashes / 统一使用正斜杠
pub fn to_slash(part: &str) -> String {
    part.replace('\\', "/").trim_matches('/').to_string()
}
