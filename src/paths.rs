use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::config::Config;
use crate::models::MediaKind;

/// Filesystem-safe brand name: spaces become underscores, every other
/// non-word character is dropped.
pub fn safe_brand_name(brand: &str) -> String {
    static NON_WORD: OnceLock<Regex> = OnceLock::new();
    let re = NON_WORD.get_or_init(|| Regex::new(r"\W+").expect("static regex"));
    re.replace_all(&brand.trim().replace(' ', "_"), "").into_owned()
}

/// Every location a run touches for one brand
#[derive(Debug, Clone)]
pub struct BrandPaths {
    pub brand: String,
    pub safe_name: String,
    pub root: PathBuf,
    pub discovered_videos: PathBuf,
    pub raw_comments: PathBuf,
    pub report: PathBuf,
    pub video_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub transcripts_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl BrandPaths {
    pub fn from_config(config: &Config) -> Self {
        let brand = config.crawler.search_terms.trim().to_string();
        let safe_name = safe_brand_name(&brand);
        let root = config.output.base_dir.join(&safe_name);

        Self {
            discovered_videos: root.join(format!("{}_discovered_videos.csv", safe_name)),
            raw_comments: root.join(format!("{}_raw_comments.csv", safe_name)),
            report: root.join(format!(
                "{}_strategic_report.{}",
                safe_name,
                config.analysis.report_format.extension()
            )),
            video_dir: root.join(&config.downloader.video_folder_name),
            audio_dir: root.join(&config.audio.audio_folder_name),
            transcripts_dir: root.join(&config.audio.transcripts_folder_name),
            cache_dir: root.join(&config.analysis.cache_folder_name),
            brand,
            safe_name,
            root,
        }
    }

    pub fn video_file(&self, video_id: &str) -> PathBuf {
        self.video_dir
            .join(media_file_name(video_id, MediaKind::Video))
    }

    pub fn audio_file(&self, video_id: &str) -> PathBuf {
        self.audio_dir
            .join(media_file_name(video_id, MediaKind::Audio))
    }

    pub fn transcript_file(&self, video_id: &str) -> PathBuf {
        self.transcripts_dir
            .join(format!("{}.txt", sanitize_video_id(video_id)))
    }

    /// Directories holding transient artifacts, removed after a successful report
    pub fn transient_dirs(&self) -> [&Path; 4] {
        [
            self.video_dir.as_path(),
            self.audio_dir.as_path(),
            self.transcripts_dir.as_path(),
            self.cache_dir.as_path(),
        ]
    }
}

fn media_file_name(video_id: &str, kind: MediaKind) -> String {
    format!("{}.{}", sanitize_video_id(video_id), kind.extension())
}

/// Strip characters that are unsafe in file names
pub fn sanitize_video_id(video_id: &str) -> String {
    video_id
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|'))
        .collect()
}
