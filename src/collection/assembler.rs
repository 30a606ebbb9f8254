//! Work assembler - one work directory to one `Work` / 作品组装
//!
//! Combines the file listing of a work directory, its metadata file and the
//! names of the work and creator directories.

use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::metadata::{parse_metadata, Metadata};
use crate::models::{Asset, Dimensions, ImageAsset, Work};
use crate::utils::{is_image_file, is_meta_file, is_novel_file, relative_path, split_name_and_id};

/// Image dimension lookup, provided by the host / 图片尺寸探测（宿主提供）
pub trait ImageProbe: Send + Sync {
    fn dimensions(&self, path: &Path) -> Result<Dimensions, String>;
}

/// Reads dimensions from the image header with the `image` crate / 使用 image 库读取图片头
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderProbe;

impl ImageProbe for HeaderProbe {
    fn dimensions(&self, path: &Path) -> Result<Dimensions, String> {
        image::image_dimensions(path)
            .map(|(width, height)| Dimensions { width, height })
            .map_err(|e| e.to_string())
    }
}

/// File inside a work directory / 作品目录中的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkFile {
    pub name: String,
    pub path: PathBuf,
}

/// Result of assembling one work / 组装结果
#[derive(Debug, Default)]
pub struct AssembledWork {
    pub work: Option<Work>,
    pub warnings: Vec<String>,
}

/// Work assembler / 作品组装器
#[derive(Clone)]
pub struct WorkAssembler {
    probe: Arc<dyn ImageProbe>,
}

impl Default for WorkAssembler {
    fn default() -> Self {
        Self::new(Arc::new(HeaderProbe))
    }
}

impl WorkAssembler {
    pub fn new(probe: Arc<dyn ImageProbe>) -> Self {
        Self { probe }
    }

    /// Assemble the work at `<root>/<creator_dir>/<work_dir>` / 组装单个作品
    pub async fn assemble(&self, root: &Path, creator_dir: &str, work_dir: &str) -> AssembledWork {
        let work_path = root.join(creator_dir).join(work_dir);

        let files = match list_files(&work_path).await {
            Ok(files) => files,
            Err(e) => {
                tracing::debug!("Failed to list work {:?}: {}", work_path, e);
                return AssembledWork {
                    work: None,
                    warnings: vec![format!(
                        "Cannot parse work '{}' of creator '{}'",
                        work_dir, creator_dir
                    )],
                };
            }
        };

        let ((metadata, meta_warnings), (image_assets, image_warnings)) =
            tokio::join!(read_metadata(&files), self.image_assets(&files));

        let mut warnings = meta_warnings;
        warnings.extend(image_warnings);

        let work = build_work(
            work_path,
            creator_dir,
            work_dir,
            image_assets,
            novel_asset(&files),
            metadata,
        );

        AssembledWork { work: Some(work), warnings }
    }

    /// Ordered image assets with probed dimensions / 排序后的图片（含尺寸）
    async fn image_assets(&self, files: &[WorkFile]) -> (Vec<ImageAsset>, Vec<String>) {
        let probes = order_image_files(files).into_iter().map(|file| {
            let probe = self.probe.clone();
            let path = file.path.clone();
            async move {
                let result = tokio::task::spawn_blocking(move || probe.dimensions(&path))
                    .await
                    .unwrap_or_else(|e| Err(e.to_string()));
                (file, result)
            }
        });

        let mut assets = Vec::new();
        let mut warnings = Vec::new();
        for (file, result) in join_all(probes).await {
            let dimensions = match result {
                Ok(dimensions) => Some(dimensions),
                Err(e) => {
                    tracing::debug!("Dimension probe failed for {:?}: {}", file.path, e);
                    warnings.push(format!(
                        "Cannot read image dimensions of '{}'",
                        file.path.display()
                    ));
                    None
                }
            };
            assets.push(ImageAsset {
                name: file.name.clone(),
                path: file.path.clone(),
                dimensions,
            });
        }
        (assets, warnings)
    }
}

/// List regular files of a directory in natural name order / 按自然顺序列出文件
pub async fn list_files(dir: &Path) -> std::io::Result<Vec<WorkFile>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        files.push(WorkFile {
            name: entry.file_name().to_string_lossy().to_string(),
            path: entry.path(),
        });
    }
    files.sort_by(|a, b| natord::compare(&a.name, &b.name));
    Ok(files)
}

/// Read and parse the metadata file, if any / 读取并解析元数据文件
async fn read_metadata(files: &[WorkFile]) -> (Option<Metadata>, Vec<String>) {
    let Some(meta_file) = files.iter().find(|file| is_meta_file(&file.name)) else {
        return (None, Vec::new());
    };

    match tokio::fs::read_to_string(&meta_file.path).await {
        Ok(content) => (Some(parse_metadata(&content)), Vec::new()),
        Err(e) => {
            tracing::debug!("Failed to read meta file {:?}: {}", meta_file.path, e);
            (
                None,
                vec![format!("Cannot read meta file '{}'", meta_file.path.display())],
            )
        }
    }
}

/// Image files ordered by page number / 按页码排序的图片文件
///
/// The page number is the parenthesised number of the file name. The sort is
/// stable, files without a page number keep their listing order after the
/// numbered ones.
pub fn order_image_files(files: &[WorkFile]) -> Vec<&WorkFile> {
    let mut images: Vec<&WorkFile> = files.iter().filter(|f| is_image_file(&f.name)).collect();
    images.sort_by_key(|file| split_name_and_id(&file.name).1.unwrap_or(u64::MAX));
    images
}

/// First novel file in listing order / 第一个小说文件
pub fn novel_asset(files: &[WorkFile]) -> Option<Asset> {
    let mut novels = files.iter().filter(|f| is_novel_file(&f.name));
    let first = novels.next()?;
    if novels.next().is_some() {
        tracing::debug!("Multiple novel files next to {:?}, using the first", first.path);
    }
    Some(Asset {
        name: first.name.clone(),
        path: first.path.clone(),
    })
}

/// Merge directory-derived fields and metadata into a `Work` / 合并目录信息与元数据
///
/// Metadata wins for every field it defines; `relative_path` and `path` always
/// come from the directory structure.
pub fn build_work(
    work_path: PathBuf,
    creator_dir: &str,
    work_dir: &str,
    image_assets: Vec<ImageAsset>,
    novel_asset: Option<Asset>,
    metadata: Option<Metadata>,
) -> Work {
    let (title, id) = split_name_and_id(work_dir);
    let (creator_name, creator_id) = split_name_and_id(creator_dir);
    let metadata = metadata.unwrap_or_default();

    Work {
        relative_path: relative_path(creator_dir, work_dir),
        path: work_path,
        title: metadata.title.unwrap_or(title),
        creator_name: metadata.creator_name.unwrap_or(creator_name),
        id: metadata.id.or(id),
        creator_id: metadata.creator_id.or(creator_id),
        image_assets,
        novel_asset,
        url: metadata.url,
        image_url: metadata.image_url,
        thumbnail_url: metadata.thumbnail_url,
        age_restriction: metadata.age_restriction,
        ai: metadata.ai,
        description: metadata.description,
        tags: metadata.tags,
        dimensions: metadata.dimensions,
        bookmarks: metadata.bookmarks,
        upload_time: metadata.upload_time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file(name: &str) -> WorkFile {
        WorkFile {
            name: name.to_string(),
            path: PathBuf::from("/w").join(name),
        }
    }

    struct FailingProbe;

    impl ImageProbe for FailingProbe {
        fn dimensions(&self, _path: &Path) -> Result<Dimensions, String> {
            Err("unreadable".to_string())
        }
    }

    #[test]
    fn test_order_image_files_by_page() {
        let files = vec![
            file("page (3).png"),
            file("cover.jpg"),
            file("page (1).png"),
            file("notes.txt"),
            file("page (2).png"),
            file("back.jpg"),
        ];
        let names: Vec<&str> = order_image_files(&files).iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["page (1).png", "page (2).png", "page (3).png", "cover.jpg", "back.jpg"]);
    }

    #[test]
    fn test_equal_page_keys_keep_listing_order() {
        let files = vec![file("Sunset (100)_p0.jpg"), file("Sunset (100)_p1.jpg")];
        let names: Vec<&str> = order_image_files(&files).iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Sunset (100)_p0.jpg", "Sunset (100)_p1.jpg"]);
    }

    #[test]
    fn test_novel_asset_first_match_wins() {
        let files = vec![file("a_meta.txt"), file("b.epub"), file("c.txt")];
        let novel = novel_asset(&files).unwrap();
        assert_eq!(novel.name, "b.epub");
        assert!(novel_asset(&[file("only-meta.txt")]).is_none());
    }

    #[test]
    fn test_build_work_metadata_precedence() {
        let metadata = Metadata {
            title: Some("Evening Sunset".to_string()),
            tags: Some(vec!["sky".to_string()]),
            ..Default::default()
        };
        let work = build_work(
            PathBuf::from("/c/Alice (1)/Sunset (100)"),
            "Alice (1)",
            "Sunset (100)",
            Vec::new(),
            None,
            Some(metadata),
        );
        assert_eq!(work.relative_path, "Alice (1)/Sunset (100)");
        assert_eq!(work.title, "Evening Sunset");
        assert_eq!(work.creator_name, "Alice");
        assert_eq!(work.id, Some(100));
        assert_eq!(work.creator_id, Some(1));
        assert_eq!(work.tags, Some(vec!["sky".to_string()]));
    }

    #[test]
    fn test_build_work_without_metadata() {
        let work = build_work(PathBuf::from("/c/Bob/Untitled"), "Bob", "Untitled", Vec::new(), None, None);
        assert_eq!(work.title, "Untitled");
        assert_eq!(work.creator_name, "Bob");
        assert_eq!(work.id, None);
        assert_eq!(work.tags, None);
    }

    #[tokio::test]
    async fn test_assemble_reads_files_and_dimensions() {
        let root = TempDir::new().unwrap();
        let work_dir = root.path().join("Alice (1)").join("Sunset (100)");
        std::fs::create_dir_all(&work_dir).unwrap();
        image::RgbImage::new(4, 3).save(work_dir.join("Sunset (100)_p1.png")).unwrap();
        image::RgbImage::new(2, 5).save(work_dir.join("Sunset (100)_p0.png")).unwrap();
        std::fs::write(
            work_dir.join("Sunset (100)_p0_meta.txt"),
            "Title\nEvening Sunset\n\nTags\nlandscape\nsky\n\n",
        )
        .unwrap();

        let assembled = WorkAssembler::default()
            .assemble(root.path(), "Alice (1)", "Sunset (100)")
            .await;
        assert!(assembled.warnings.is_empty(), "{:?}", assembled.warnings);

        let work = assembled.work.unwrap();
        assert_eq!(work.title, "Evening Sunset");
        assert_eq!(work.image_assets.len(), 2);
        assert_eq!(work.image_assets[0].name, "Sunset (100)_p0.png");
        assert_eq!(work.image_assets[0].dimensions, Some(Dimensions { width: 2, height: 5 }));
        assert_eq!(work.image_assets[1].dimensions, Some(Dimensions { width: 4, height: 3 }));
        assert!(work.novel_asset.is_none());
    }

    #[tokio::test]
    async fn test_probe_failure_is_a_warning() {
        let root = TempDir::new().unwrap();
        let work_dir = root.path().join("Bob").join("Broken");
        std::fs::create_dir_all(&work_dir).unwrap();
        std::fs::write(work_dir.join("page.jpg"), b"not an image").unwrap();

        let assembled = WorkAssembler::new(Arc::new(FailingProbe))
            .assemble(root.path(), "Bob", "Broken")
            .await;
        let work = assembled.work.unwrap();
        assert_eq!(work.image_assets.len(), 1);
        assert_eq!(work.image_assets[0].dimensions, None);
        assert_eq!(assembled.warnings.len(), 1);
        assert!(assembled.warnings[0].starts_with("Cannot read image dimensions"));
    }

    #[tokio::test]
    async fn test_unreadable_metadata_is_a_warning() {
        let root = TempDir::new().unwrap();
        let work_dir = root.path().join("Alice (1)").join("Sunset (100)");
        std::fs::create_dir_all(&work_dir).unwrap();
        let meta = work_dir.join("Sunset (100)_meta.txt");
        // 非 UTF-8 内容
        std::fs::write(&meta, [0x54, 0x69, 0xff, 0xfe, 0x0a]).unwrap();

        let assembled = WorkAssembler::default()
            .assemble(root.path(), "Alice (1)", "Sunset (100)")
            .await;
        assert_eq!(
            assembled.warnings,
            vec![format!("Cannot read meta file '{}'", meta.display())]
        );

        let work = assembled.work.unwrap();
        assert_eq!(work.title, "Sunset");
        assert_eq!(work.id, Some(100));
        assert_eq!(work.creator_name, "Alice");
        assert_eq!(work.creator_id, Some(1));
        assert_eq!(work.tags, None);
        assert!(work.novel_asset.is_none());
    }

    #[tokio::test]
    async fn test_missing_work_directory() {
        let root = TempDir::new().unwrap();
        let assembled = WorkAssembler::default().assemble(root.path(), "Bob", "Gone").await;
        assert!(assembled.work.is_none());
        assert_eq!(assembled.warnings, vec!["Cannot parse work 'Gone' of creator 'Bob'".to_string()]);
    }
}
