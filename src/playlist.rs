use log::{debug, info, warn};
use m3u8_rs::{MasterPlaylist, MediaPlaylist, Playlist, VariantStream};
use serde::Serialize;
use url::Url;

use crate::error::ResolveError;
use crate::http::HttpProbe;

/// 主播放列表中的一个变体
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub uri: String,
    pub bandwidth: Option<u64>,
    pub resolution: Option<(u64, u64)>,
    pub codecs: Vec<String>,
    pub audio_group: Option<String>,
    pub i_frame_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRef {
    pub uri: String,
}

/// 解析后的播放列表，主列表或媒体列表
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistDocument {
    Master(Vec<Variant>),
    Media(Vec<SegmentRef>),
}

/// 解析结果：按顺序排列的绝对分段地址
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPlaylist {
    pub manifest_url: String,
    /// 分段地址所基于的媒体列表
    pub playlist_url: String,
    pub segments: Vec<String>,
}

/// 变体被选中的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    AudioCodec,
    AudioGroup,
    NoResolution,
    FirstVariant,
}

const AUDIO_CODEC_PREFIXES: &[&str] = &["mp4a", "ac-3", "ec-3", "opus", "flac", "alac", "mp3", "audio"];

impl From<&VariantStream> for Variant {
    fn from(v: &VariantStream) -> Self {
        Self {
            uri: v.uri.clone(),
            bandwidth: (v.bandwidth > 0).then_some(v.bandwidth),
            resolution: v.resolution.as_ref().map(|r| (r.width, r.height)),
            codecs: v
                .codecs
                .as_deref()
                .map(|c| {
                    c.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            audio_group: v.audio.clone(),
            i_frame_only: v.is_i_frame,
        }
    }
}

impl Variant {
    fn is_audio_only_codec_set(&self) -> bool {
        !self.codecs.is_empty()
            && self.codecs.iter().all(|codec| {
                let codec = codec.to_ascii_lowercase();
                AUDIO_CODEC_PREFIXES.iter().any(|p| codec.starts_with(p))
            })
    }

    fn has_audio_group(&self) -> bool {
        self.audio_group.as_deref().is_some_and(|g| !g.is_empty())
    }
}

/// 将 m3u8 文本解析为播放列表文档
pub fn parse_playlist(content: &str) -> Result<PlaylistDocument, ResolveError> {
    let content = content.trim_start_matches('\u{feff}').trim_start();
    if !content.starts_with("#EXTM3U") {
        return Err(ResolveError::ParseFailed("missing #EXTM3U header".to_string()));
    }

    let playlist = m3u8_rs::parse_playlist_res(content.as_bytes())
        .map_err(|e| ResolveError::ParseFailed(e.to_string()))?;

    match playlist {
        Playlist::MasterPlaylist(pl) => document_from_master(&pl),
        Playlist::MediaPlaylist(pl) => document_from_media(&pl),
    }
}

fn document_from_master(pl: &MasterPlaylist) -> Result<PlaylistDocument, ResolveError> {
    let variants: Vec<Variant> = pl.variants.iter().map(Variant::from).collect();
    if variants.iter().all(|v| v.i_frame_only) {
        return Err(ResolveError::ParseFailed(
            "master playlist has no playable variants".to_string(),
        ));
    }
    Ok(PlaylistDocument::Master(variants))
}

fn document_from_media(pl: &MediaPlaylist) -> Result<PlaylistDocument, ResolveError> {
    if pl.segments.is_empty() {
        return Err(ResolveError::ParseFailed(
            "media playlist has no segments".to_string(),
        ));
    }
    Ok(PlaylistDocument::Media(
        pl.segments
            .iter()
            .map(|s| SegmentRef { uri: s.uri.clone() })
            .collect(),
    ))
}

/// 选择音频变体：音频编码 > 音频组 > 无分辨率 > 第一个
pub fn select_audio_variant(variants: &[Variant]) -> Option<(&Variant, SelectionReason)> {
    let playable: Vec<&Variant> = variants.iter().filter(|v| !v.i_frame_only).collect();

    let audio_codec = playable.iter().copied().find(|v| v.is_audio_only_codec_set());
    let audio_group = playable.iter().copied().find(|v| v.has_audio_group());
    let no_resolution = playable.iter().copied().find(|v| v.resolution.is_none());

    if let Some(v) = audio_codec {
        if v.resolution.is_some() {
            warn!("Variant {} has audio-only codecs but a resolution; needs review", v.uri);
        }
        if audio_group.is_some_and(|g| g.uri != v.uri) || no_resolution.is_some_and(|n| n.uri != v.uri) {
            warn!("Master playlist carries conflicting audio signals; picking by codec");
        }
        return Some((v, SelectionReason::AudioCodec));
    }
    if let Some(v) = audio_group {
        if no_resolution.is_some_and(|n| n.uri != v.uri) {
            warn!("Master playlist carries conflicting audio signals; picking by audio group");
        }
        return Some((v, SelectionReason::AudioGroup));
    }
    if let Some(v) = no_resolution {
        return Some((v, SelectionReason::NoResolution));
    }
    playable.first().map(|v| (*v, SelectionReason::FirstVariant))
}

/// 将相对地址解析为绝对地址，绝对地址原样返回
pub fn resolve_uri(base: &Url, reference: &str) -> String {
    match Url::parse(reference) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => reference.to_string(),
        _ => base
            .join(reference)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| reference.to_string()),
    }
}

/// 获取并解析播放列表，逐层跟随主列表直到媒体列表
pub struct PlaylistResolver {
    http: HttpProbe,
    max_depth: usize,
}

impl PlaylistResolver {
    pub fn new(http: HttpProbe, max_depth: usize) -> Self {
        Self { http, max_depth }
    }

    pub async fn resolve(&self, manifest_url: &str) -> Result<ResolvedPlaylist, ResolveError> {
        let start = Url::parse(manifest_url)
            .map_err(|e| ResolveError::InvalidInput(format!("{manifest_url}: {e}")))?;

        let mut url = start;
        let mut hops = 0;

        loop {
            info!("Fetching playlist from {}", url);
            let (final_url, content) = self.http.fetch_text(&url).await?;

            match parse_playlist(&content)? {
                PlaylistDocument::Master(variants) => {
                    info!("Master playlist found with {} variants.", variants.len());
                    if hops >= self.max_depth {
                        return Err(ResolveError::TooDeep(self.max_depth));
                    }
                    hops += 1;

                    let (variant, reason) = select_audio_variant(&variants).ok_or_else(|| {
                        ResolveError::ParseFailed("no variants found in master playlist".to_string())
                    })?;
                    info!("Selected variant {} ({:?})", variant.uri, reason);

                    let next = resolve_uri(&final_url, &variant.uri);
                    url = Url::parse(&next)
                        .map_err(|e| ResolveError::ParseFailed(format!("bad variant uri {next}: {e}")))?;
                }
                PlaylistDocument::Media(segments) => {
                    info!("Media playlist found with {} segments.", segments.len());
                    let segments: Vec<String> = segments
                        .iter()
                        .map(|s| resolve_uri(&final_url, &s.uri))
                        .collect();
                    debug!("First segment: {:?}", segments.first());
                    return Ok(ResolvedPlaylist {
                        manifest_url: manifest_url.to_string(),
                        playlist_url: final_url.to_string(),
                        segments,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(uri: &str) -> Variant {
        Variant {
            uri: uri.to_string(),
            bandwidth: None,
            resolution: None,
            codecs: Vec::new(),
            audio_group: None,
            i_frame_only: false,
        }
    }

    #[test]
    fn resolves_relative_segment() {
        let base = Url::parse("https://cdn.example/path/a/index.m3u8").unwrap();
        assert_eq!(resolve_uri(&base, "seg0.ts"), "https://cdn.example/path/a/seg0.ts");
    }

    #[test]
    fn resolves_root_relative_segment() {
        let base = Url::parse("https://cdn.example/path/a/index.m3u8").unwrap();
        assert_eq!(resolve_uri(&base, "/abs/seg0.ts"), "https://cdn.example/abs/seg0.ts");
    }

    #[test]
    fn keeps_absolute_segment() {
        let base = Url::parse("https://cdn.example/path/a/index.m3u8").unwrap();
        assert_eq!(
            resolve_uri(&base, "https://other.example/x/seg0.ts?sig=AbC"),
            "https://other.example/x/seg0.ts?sig=AbC"
        );
    }

    #[test]
    fn resolves_against_directory_ignoring_query() {
        let base = Url::parse("https://cdn.example/vod/manifest.m3u8?rp=o00").unwrap();
        assert_eq!(resolve_uri(&base, "chunk_1.ts"), "https://cdn.example/vod/chunk_1.ts");
    }

    #[test]
    fn resolves_protocol_relative_segment() {
        let base = Url::parse("https://cdn.example/a/index.m3u8").unwrap();
        assert_eq!(resolve_uri(&base, "//edge.example/s.ts"), "https://edge.example/s.ts");
    }

    #[test]
    fn prefers_variant_without_resolution() {
        let mut video = variant("1080p/index.m3u8");
        video.resolution = Some((1920, 1080));
        let audio = variant("audio/index.m3u8");
        let variants = vec![video, audio];

        let (chosen, reason) = select_audio_variant(&variants).unwrap();
        assert_eq!(chosen.uri, "audio/index.m3u8");
        assert_eq!(reason, SelectionReason::NoResolution);
    }

    #[test]
    fn audio_codec_beats_audio_group() {
        let mut grouped = variant("grouped.m3u8");
        grouped.resolution = Some((1280, 720));
        grouped.audio_group = Some("aud".to_string());
        let mut aac = variant("aac.m3u8");
        aac.codecs = vec!["mp4a.40.2".to_string()];
        let variants = vec![grouped, aac];

        let (chosen, reason) = select_audio_variant(&variants).unwrap();
        assert_eq!(chosen.uri, "aac.m3u8");
        assert_eq!(reason, SelectionReason::AudioCodec);
    }

    #[test]
    fn muxed_codecs_are_not_audio_only() {
        let mut muxed = variant("muxed.m3u8");
        muxed.codecs = vec!["avc1.64001f".to_string(), "mp4a.40.2".to_string()];
        muxed.resolution = Some((1280, 720));
        let mut grouped = variant("grouped.m3u8");
        grouped.resolution = Some((640, 360));
        grouped.audio_group = Some("aud".to_string());
        let variants = vec![muxed, grouped];

        let (chosen, reason) = select_audio_variant(&variants).unwrap();
        assert_eq!(chosen.uri, "grouped.m3u8");
        assert_eq!(reason, SelectionReason::AudioGroup);
    }

    #[test]
    fn falls_back_to_first_variant() {
        let mut a = variant("a.m3u8");
        a.resolution = Some((1920, 1080));
        let mut b = variant("b.m3u8");
        b.resolution = Some((1280, 720));
        let variants = vec![a, b];

        let (chosen, reason) = select_audio_variant(&variants).unwrap();
        assert_eq!(chosen.uri, "a.m3u8");
        assert_eq!(reason, SelectionReason::FirstVariant);
    }

    #[test]
    fn skips_i_frame_variants() {
        let mut iframe = variant("iframe.m3u8");
        iframe.i_frame_only = true;
        let mut video = variant("video.m3u8");
        video.resolution = Some((1920, 1080));
        let variants = vec![iframe, video];

        let (chosen, _) = select_audio_variant(&variants).unwrap();
        assert_eq!(chosen.uri, "video.m3u8");
    }

    #[test]
    fn parses_master_playlist() {
        let text = "#EXTM3U\n\
#EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080,CODECS=\"avc1.640028,mp4a.40.2\"\n\
hd/index.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=128000,CODECS=\"mp4a.40.2\"\n\
audio/index.m3u8\n";
        match parse_playlist(text).unwrap() {
            PlaylistDocument::Master(variants) => {
                assert_eq!(variants.len(), 2);
                assert_eq!(variants[0].resolution, Some((1920, 1080)));
                assert_eq!(variants[0].codecs, vec!["avc1.640028", "mp4a.40.2"]);
                assert_eq!(variants[1].bandwidth, Some(128000));
                assert_eq!(variants[1].resolution, None);
            }
            other => panic!("expected master playlist, got {other:?}"),
        }
    }

    #[test]
    fn parses_media_playlist_in_order() {
        let text = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n\
#EXTINF:10.0,\nseg0.ts\n#EXTINF:10.0,\nseg1.ts\n#EXTINF:4.5,\nseg2.ts\n#EXT-X-ENDLIST\n";
        match parse_playlist(text).unwrap() {
            PlaylistDocument::Media(segments) => {
                let uris: Vec<&str> = segments.iter().map(|s| s.uri.as_str()).collect();
                assert_eq!(uris, vec!["seg0.ts", "seg1.ts", "seg2.ts"]);
            }
            other => panic!("expected media playlist, got {other:?}"),
        }
    }

    #[test]
    fn rejects_text_without_playlist_tags() {
        let err = parse_playlist("<html><body>not found</body></html>").unwrap_err();
        assert_eq!(err.kind(), "ParseFailed");
    }

    #[test]
    fn rejects_empty_media_playlist() {
        let err = parse_playlist("#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXT-X-ENDLIST\n").unwrap_err();
        assert_eq!(err.kind(), "ParseFailed");
    }
}
