use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

/// Age restriction of a work / 作品年龄分级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgeRestriction {
    #[serde(rename = "all-ages")]
    AllAges,
    #[serde(rename = "r-18")]
    R18,
    #[serde(rename = "r-18g")]
    R18g,
}

impl AgeRestriction {
    /// Parse the `xRestrict` value of a metadata file / 解析元数据中的 xRestrict 值
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "AllAges" => Some(Self::AllAges),
            "R-18" => Some(Self::R18),
            "R-18G" => Some(Self::R18g),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Image page of a work / 作品图片
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub name: String,
    pub path: PathBuf,
    pub dimensions: Option<Dimensions>,
}

/// Plain asset (novel text / epub) / 普通资源文件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    pub path: PathBuf,
}

/// Work - one directory below a creator directory / 作品
///
/// Identity is `relative_path` only. `id` comes from the directory name or the
/// metadata file and is frequently absent, so it never takes part in equality.
/// 作品身份只由 relative_path 决定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Work {
    /// `<creator dir>/<work dir>`, always `/`-separated / 相对集合根目录的路径
    pub relative_path: String,
    /// Absolute path of the work directory / 作品目录绝对路径
    pub path: PathBuf,
    pub title: String,
    pub creator_name: String,
    pub id: Option<u64>,
    pub creator_id: Option<u64>,
    pub image_assets: Vec<ImageAsset>,
    pub novel_asset: Option<Asset>,

    pub url: Option<String>,
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub age_restriction: Option<AgeRestriction>,
    pub ai: Option<bool>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub dimensions: Option<Dimensions>,
    pub bookmarks: Option<u64>,
    pub upload_time: Option<String>,
}

impl PartialEq for Work {
    fn eq(&self, other: &Self) -> bool {
        self.relative_path == other.relative_path
    }
}

impl Eq for Work {}

impl Hash for Work {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.relative_path.hash(state);
    }
}

/// Batch of newly discovered works / 扫描过程中产出的一批作品
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chunk {
    pub works: Vec<Work>,
    pub warnings: Vec<String>,
    pub finished: bool,
}

impl Chunk {
    /// Empty, non-final chunk (used when a poll fails) / 空的未完成批次
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.works.is_empty() && self.warnings.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Minimal work for tests / 测试用作品
    pub fn work(relative_path: &str, title: &str) -> Work {
        let creator = relative_path.split('/').next().unwrap_or_default();
        Work {
            relative_path: relative_path.to_string(),
            path: PathBuf::from("/collection").join(relative_path),
            title: title.to_string(),
            creator_name: creator.to_string(),
            id: None,
            creator_id: None,
            image_assets: Vec::new(),
            novel_asset: None,
            url: None,
            image_url: None,
            thumbnail_url: None,
            age_restriction: None,
            ai: None,
            description: None,
            tags: None,
            dimensions: None,
            bookmarks: None,
            upload_time: None,
        }
    }
}
