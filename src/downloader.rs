use anyhow::{anyhow, Result};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// 第 `index` 个分段在输出目录中的文件路径
pub fn segment_path(output_dir: &Path, index: usize) -> PathBuf {
    output_dir.join(format!("segment_{:06}.ts", index))
}

/// 下载所有分段，结果顺序与输入一致
pub async fn download_segments(
    client: Client,
    segments: &[String],
    output_dir: &Path,
    max_concurrency: usize,
) -> Vec<Result<()>> {
    let pb = Arc::new(ProgressBar::new(segments.len() as u64));
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);

    // 收集所有分段信息，避免在异步闭包中使用引用
    let segments_info: Vec<(String, PathBuf)> = segments
        .iter()
        .enumerate()
        .map(|(i, url)| (url.clone(), segment_path(output_dir, i)))
        .collect();

    let fetches = stream::iter(segments_info)
        .map(|(segment_url, output_path)| {
            let client = client.clone();
            let pb_clone = pb.clone();

            tokio::spawn(async move {
                if fs::metadata(&output_path).await.is_ok() {
                    debug!("Segment {:?} already exists. Skipping.", output_path);
                    pb_clone.inc(1);
                    return Ok(());
                }

                let result = download_segment(&client, &segment_url, &output_path).await;
                pb_clone.inc(1);
                result.map_err(|e| anyhow!("Failed to download {}: {}", segment_url, e))
            })
        })
        .buffered(max_concurrency.max(1));

    let results: Vec<_> = fetches.collect().await;
    pb.finish_with_message("downloaded");

    results
        .into_iter()
        .map(|res| match res {
            Ok(inner_res) => inner_res,
            Err(e) => Err(anyhow!("Tokio task failed: {}", e)),
        })
        .collect()
}

/// 下载单个分段
async fn download_segment(client: &Client, url: &str, path: &Path) -> Result<()> {
    let mut response = client.get(url).send().await?.error_for_status()?;

    // 写入 .part 文件，完成后改名
    let partial = path.with_extension("part");
    let mut file = fs::File::create(&partial).await?;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    fs::rename(&partial, path).await?;

    Ok(())
}
