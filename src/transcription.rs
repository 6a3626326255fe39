use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::AudioConfig;
use crate::error::PipelineError;
use crate::tools::run_tool;

/// Plain-text transcription through the `whisper` CLI
pub struct WhisperTranscriber {
    command: PathBuf,
    model: String,
    language: Option<String>,
}

impl WhisperTranscriber {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            command: PathBuf::from(&config.whisper_command),
            model: config.whisper_model.clone(),
            language: config.language.clone(),
        }
    }

    /// Transcribe `audio_path` into `output_dir/<stem>.txt` and return that path.
    ///
    /// Returns `Ok(Err(reason))` when whisper fails on this file.
    pub async fn transcribe(
        &self,
        audio_path: &Path,
        output_dir: &Path,
    ) -> Result<Result<PathBuf, String>, PipelineError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| PipelineError::io(output_dir, e))?;

        let stem = audio_path.file_stem().unwrap_or_default();
        let transcript = output_dir.join(stem).with_extension("txt");

        info!("🗣️  Transcribing with whisper ({}): {}", self.model, audio_path.display());

        match run_tool(self.command.as_os_str(), self.args(audio_path, output_dir)).await? {
            Ok(()) if transcript.exists() => Ok(Ok(transcript)),
            Ok(()) => Ok(Err(format!("whisper did not create {}", transcript.display()))),
            Err(reason) => Ok(Err(reason)),
        }
    }

    fn args(&self, audio_path: &Path, output_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            audio_path.as_os_str().to_os_string(),
            "--model".into(),
            self.model.clone().into(),
            "--output_format".into(),
            "txt".into(),
            "--output_dir".into(),
            output_dir.as_os_str().to_os_string(),
            "--verbose".into(),
            "False".into(),
            "--fp16".into(),
            "False".into(),
        ];

        if let Some(language) = &self.language {
            args.push("--language".into());
            args.push(language.into());
        }

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whisper_args_include_language_when_set() {
        let mut config = AudioConfig::default();
        config.language = Some("pt".to_string());
        let transcriber = WhisperTranscriber::new(&config);

        let args: Vec<String> = transcriber
            .args(Path::new("audio/a.mp3"), Path::new("transcripts"))
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(args[0], "audio/a.mp3");
        assert!(args.join(" ").contains("--model base --output_format txt --output_dir transcripts"));
        assert!(args.ends_with(&["--language".to_string(), "pt".to_string()]));
    }
}
