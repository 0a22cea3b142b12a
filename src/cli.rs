use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::ResolverConfig;

/// Extract the audio stream of a VOD page and print, download, or merge it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// VOD page URL (containing /player/<id>) or a direct .m3u8 URL.
    pub url: String,

    /// Directory to download segments into. Without it, only the segment list is printed.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Merged audio filename, written inside the output directory.
    #[arg(long, default_value = "audio.m4a")]
    pub output_audio: PathBuf,

    /// Maximum number of concurrent downloads.
    #[arg(short, long, default_value_t = 10)]
    pub threads: usize,

    /// Path to the FFmpeg executable.
    #[arg(long)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Skip the merging step.
    #[arg(long)]
    pub no_merge: bool,

    /// Keep downloaded segments after merging.
    #[arg(long)]
    pub keep_segments: bool,

    /// Custom HTTP header(s). E.g., -H "Cookie: mycookie"
    #[arg(short = 'H', long = "header", action = clap::ArgAction::Append)]
    pub headers: Vec<String>,

    /// Print the resolved playlist as JSON.
    #[arg(long)]
    pub json: bool,

    /// Never fall back to a headless browser.
    #[arg(long)]
    pub no_headless: bool,

    /// Preferred Chrome/Chromium executable for the headless fallback.
    #[arg(long)]
    pub chrome_path: Option<PathBuf>,

    /// HTTP request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Maximum number of nested master playlists to follow.
    #[arg(long, default_value_t = 4)]
    pub max_depth: usize,

    /// Upper bound in seconds for waiting out pre-roll ads in the browser.
    #[arg(long, default_value_t = 30)]
    pub ad_wait: u64,
}

impl Args {
    /// 将命令行参数映射为解析器配置
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            request_timeout: Duration::from_secs(self.timeout),
            extra_headers: self.headers.clone(),
            max_playlist_depth: self.max_depth,
            headless: !self.no_headless,
            chrome_executable: self.chrome_path.clone(),
            ad_wait: Duration::from_secs(self.ad_wait),
            ..ResolverConfig::default()
        }
    }
}

pub fn parse_args() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_flags_onto_config() {
        let args = Args::parse_from([
            "vod-audio",
            "https://vod.sooplive.co.kr/player/1",
            "--no-headless",
            "--max-depth",
            "2",
            "-H",
            "Cookie: a=b",
        ]);
        let config = args.resolver_config();
        assert!(!config.headless);
        assert_eq!(config.max_playlist_depth, 2);
        assert_eq!(config.extra_headers, vec!["Cookie: a=b"]);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }
}
