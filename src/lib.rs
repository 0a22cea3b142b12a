pub mod browser;
pub mod cli;
pub mod config;
pub mod downloader;
pub mod error;
pub mod http;
pub mod merger;
pub mod patterns;
pub mod playlist;
pub mod resolver;
pub mod strategy;

use anyhow::Result;
use log::{error, info};
use std::path::Path;
use tokio::fs;

use crate::cli::Args;
use crate::downloader::download_segments;
use crate::merger::{cleanup_segments, merge_segments};

pub use crate::config::ResolverConfig;
pub use crate::error::ResolveError;
pub use crate::http::HttpProbe;
pub use crate::playlist::{PlaylistResolver, ResolvedPlaylist};
pub use crate::resolver::ManifestResolver;

/// 页面地址 -> 清单地址 -> 分段列表
pub struct AudioResolver {
    manifest: ManifestResolver,
    playlist: PlaylistResolver,
}

impl AudioResolver {
    pub fn new(config: &ResolverConfig) -> Result<Self, ResolveError> {
        let http = HttpProbe::new(config)?;
        Ok(Self {
            manifest: ManifestResolver::new(config, http.clone()),
            playlist: PlaylistResolver::new(http, config.max_playlist_depth),
        })
    }

    pub fn from_parts(manifest: ManifestResolver, playlist: PlaylistResolver) -> Self {
        Self { manifest, playlist }
    }

    /// 将页面或清单地址解析为非空的有序分段列表
    pub async fn resolve(&self, input: &str) -> Result<ResolvedPlaylist, ResolveError> {
        let manifest_url = self.manifest.resolve(input.trim()).await?;
        info!("Manifest URL: {}", manifest_url);
        self.playlist.resolve(&manifest_url).await
    }
}

/// 使用给定配置解析音频分段列表
pub async fn resolve_audio(input: &str, config: &ResolverConfig) -> Result<ResolvedPlaylist, ResolveError> {
    AudioResolver::new(config)?.resolve(input).await
}

/// 打印分段信息，供外部播放器使用
fn print_summary(resolved: &ResolvedPlaylist) {
    println!("Manifest: {}", resolved.manifest_url);
    println!("Playlist: {}", resolved.playlist_url);
    println!("Segments: {}", resolved.segments.len());
    for (i, segment) in resolved.segments.iter().take(5).enumerate() {
        println!("  {}. {}", i + 1, segment);
    }
    if resolved.segments.len() > 5 {
        println!("  ... and {} more", resolved.segments.len() - 5);
    }
    println!();
    println!("To listen: open the playlist URL in a player that supports HLS (e.g. VLC),");
    println!("or rerun with --output <dir> to download and merge the audio with ffmpeg.");
}

/// 运行主要逻辑
pub async fn run(args: Args) -> Result<()> {
    let config = args.resolver_config();
    let resolved = resolve_audio(&args.url, &config).await?;

    info!("Resolved {} audio segments.", resolved.segments.len());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
    }

    let Some(output_root) = args.output.as_deref() else {
        if !args.json {
            print_summary(&resolved);
        }
        return Ok(());
    };

    let client = HttpProbe::new(&config)?.client().clone();

    // 按清单地址生成唯一的分段目录，避免冲突
    let url_hash = &sha256::digest(&resolved.manifest_url)[..12];
    let output_dir = std::path::absolute(output_root.join(url_hash))?;
    info!("Segments will be saved to: {:?}", output_dir);
    fs::create_dir_all(&output_dir).await?;

    let download_results = download_segments(client, &resolved.segments, &output_dir, args.threads).await;

    let failures: Vec<_> = download_results.iter().filter_map(|r| r.as_ref().err()).collect();
    if !failures.is_empty() {
        error!(
            "Failed to download {} out of {} segments.",
            failures.len(),
            resolved.segments.len()
        );
        for e in &failures {
            error!(" - {}", e);
        }
        anyhow::bail!("Download failed for some segments. Aborting.");
    }

    info!("All {} segments downloaded successfully.", resolved.segments.len());

    if args.no_merge {
        info!("Skipping merge step as requested.");
        return Ok(());
    }

    let output_audio = std::path::absolute(output_root.join(&args.output_audio))?;
    merge_and_cleanup(&output_dir, &output_audio, &args, resolved.segments.len()).await
}

async fn merge_and_cleanup(output_dir: &Path, output_audio: &Path, args: &Args, segment_count: usize) -> Result<()> {
    info!("Merging segments into: {:?}", output_audio);

    if let Err(e) = merge_segments(output_dir, output_audio, args.ffmpeg_path.as_deref(), segment_count).await {
        error!("Failed to merge segments: {}", e);
        anyhow::bail!("Merging failed. Segments are still available in {:?}", output_dir);
    }
    info!("Successfully merged segments into {:?}", output_audio);

    if !args.keep_segments {
        info!("Cleaning up segment files...");
        match cleanup_segments(output_dir).await {
            Ok(_) => info!("Segment files cleaned up successfully."),
            Err(e) => error!("Failed to clean up some segment files: {}", e),
        }
    }

    Ok(())
}
