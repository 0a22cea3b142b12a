use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::downloader::segment_path;

const FILE_LIST: &str = "filelist.txt";

/// ffmpeg concat 所需的文件列表内容
pub fn build_file_list(segment_count: usize) -> String {
    (0..segment_count)
        .map(|i| {
            let path = segment_path(Path::new(""), i);
            format!("file '{}'\n", path.display())
        })
        .collect()
}

/// 合并下载的分段，只保留音频轨
pub async fn merge_segments(
    segments_dir: &Path,
    output_path: &Path,
    ffmpeg_path: Option<&Path>,
    segment_count: usize,
) -> Result<()> {
    let file_list_path = segments_dir.join(FILE_LIST);
    let mut file_list = fs::File::create(&file_list_path).await?;
    file_list.write_all(build_file_list(segment_count).as_bytes()).await?;
    file_list.flush().await?;

    let ffmpeg = match ffmpeg_path {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from("ffmpeg"), // 默认使用系统PATH中的ffmpeg
    };

    let status = Command::new(&ffmpeg)
        .current_dir(segments_dir) // 设置工作目录为分段目录
        .arg("-f")
        .arg("concat")
        .arg("-safe")
        .arg("0")
        .arg("-i")
        .arg(FILE_LIST)
        .arg("-vn")
        .arg("-c:a")
        .arg("copy")
        .arg("-bsf:a")
        .arg("aac_adtstoasc")
        .arg("-y")
        .arg(output_path)
        .status()
        .await?;

    // 删除临时文件列表
    let _ = fs::remove_file(&file_list_path).await;

    if !status.success() {
        return Err(anyhow!("FFmpeg failed with exit code: {:?}", status.code()));
    }

    Ok(())
}

/// 清理下载的分段文件
pub async fn cleanup_segments(segments_dir: &Path) -> Result<()> {
    let mut read_dir = fs::read_dir(segments_dir).await?;
    let mut errors = Vec::new();

    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "ts") {
            if let Err(e) = fs::remove_file(&path).await {
                errors.push(format!("Failed to remove {:?}: {}", path, e));
            }
        }
    }

    if !errors.is_empty() {
        return Err(anyhow!("Failed to remove some files: {}", errors.join(", ")));
    }

    Ok(())
}
