//! External-command recognizer
//!
//! Runs a user-supplied OCR program once per tile. The tile is written to a
//! temporary PNG that lives exactly as long as the invocation, and the
//! program's stdout is parsed as PaddleOCR-shaped JSON.

use crate::{
    paddle::parse_paddle_json, paddle_language_code, RecognitionConfig, RecognitionError,
    RecognitionOutput, TextRecognizer,
};
use image::{DynamicImage, ImageFormat};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tracing::debug;

/// How often a running OCR command is polled for completion
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A tile image materialized on disk, removed when dropped
pub struct TileArtifact {
    /// Path to the written image
    path: PathBuf,
    /// Temporary file handle (keeps file alive until dropped)
    _temp_file: NamedTempFile,
}

impl TileArtifact {
    /// Encode `image` as PNG into a fresh temporary file
    pub fn write(image: &DynamicImage) -> Result<Self, RecognitionError> {
        let temp_file = tempfile::Builder::new()
            .prefix("bubble_tile_")
            .suffix(".png")
            .tempfile()?;

        let path = temp_file.path().to_path_buf();
        image
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|e| RecognitionError::Artifact(format!("{}: {e}", path.display())))?;

        debug!("Wrote tile artifact {}", path.display());

        Ok(Self {
            path,
            _temp_file: temp_file,
        })
    }

    /// Get the path to the tile image
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsRef<Path> for TileArtifact {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

/// Recognizer backed by an external program
///
/// Arguments may contain the placeholders `{image}`, `{lang}`,
/// `{det_thresh}`, `{box_thresh}`, `{unclip_ratio}` and
/// `{textline_orientation}`.
#[derive(Debug, Clone)]
pub struct CommandRecognizer {
    language: String,
    program: PathBuf,
    args: Vec<String>,
    config: RecognitionConfig,
    timeout: Duration,
}

impl CommandRecognizer {
    pub fn new(
        language: impl Into<String>,
        program: impl Into<PathBuf>,
        args: Vec<String>,
        config: RecognitionConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            language: language.into(),
            program: program.into(),
            args,
            config,
            timeout,
        }
    }

    /// Argument list for one tile, placeholders substituted
    fn expand_args(&self, image_path: &Path) -> Vec<String> {
        let image = image_path.to_string_lossy();
        let lang = paddle_language_code(&self.language);
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{image}", &image)
                    .replace("{lang}", lang)
                    .replace("{det_thresh}", &self.config.det_thresh.to_string())
                    .replace("{box_thresh}", &self.config.box_thresh.to_string())
                    .replace("{unclip_ratio}", &self.config.unclip_ratio.to_string())
                    .replace(
                        "{textline_orientation}",
                        &self.config.use_textline_orientation.to_string(),
                    )
            })
            .collect()
    }

    fn run(&self, image_path: &Path) -> Result<String, RecognitionError> {
        let args = self.expand_args(image_path);
        debug!("Running {} {:?}", self.program.display(), args);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RecognitionError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        // Drain both pipes on their own threads so a chatty engine can't
        // block on a full pipe while we wait for it.
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let status = wait_with_timeout(&mut child, self.timeout)?;
        let stdout = join_reader(stdout)?;
        let stderr = join_reader(stderr)?;

        if !status.success() {
            return Err(RecognitionError::CommandFailed {
                status: status.to_string(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        String::from_utf8(stdout).map_err(|e| {
            RecognitionError::MalformedOutput(format!("OCR output is not valid UTF-8: {e}"))
        })
    }
}

impl TextRecognizer for CommandRecognizer {
    fn language(&self) -> &str {
        &self.language
    }

    fn recognize(&self, tile: &DynamicImage) -> Result<RecognitionOutput, RecognitionError> {
        let artifact = TileArtifact::write(tile)?;
        let stdout = self.run(artifact.path())?;
        parse_paddle_json(&stdout)
    }
}

type PipeReader = thread::JoinHandle<io::Result<Vec<u8>>>;

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> PipeReader {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn join_reader(reader: PipeReader) -> Result<Vec<u8>, RecognitionError> {
    let bytes = reader
        .join()
        .map_err(|_| RecognitionError::Engine("OCR output reader panicked".to_string()))??;
    Ok(bytes)
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<ExitStatus, RecognitionError> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(RecognitionError::Timeout(timeout));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use image::GrayImage;

    fn shell(script: &str) -> CommandRecognizer {
        CommandRecognizer::new(
            "korean",
            "sh",
            vec!["-c".to_string(), script.to_string(), "ocr".to_string(), "{image}".to_string()],
            RecognitionConfig::default(),
            Duration::from_secs(10),
        )
    }

    fn tile() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::new(16, 16))
    }

    #[test]
    fn test_artifact_removed_on_drop() {
        let artifact = TileArtifact::write(&tile()).unwrap();
        let path = artifact.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("png"));
        drop(artifact);
        assert!(!path.exists());
    }

    #[test]
    fn test_expand_args() {
        let recognizer = CommandRecognizer::new(
            "Korean",
            "paddleocr-json",
            vec![
                "--image={image}".to_string(),
                "--lang".to_string(),
                "{lang}".to_string(),
                "{det_thresh}/{box_thresh}/{unclip_ratio}/{textline_orientation}".to_string(),
            ],
            RecognitionConfig::default(),
            Duration::from_secs(1),
        );
        let args = recognizer.expand_args(Path::new("/tmp/tile.png"));
        assert_eq!(
            args,
            vec!["--image=/tmp/tile.png", "--lang", "korean", "0.25/0.55/1.6/true"]
        );
    }

    #[test]
    fn test_recognize_parses_stdout() {
        let recognizer = shell(
            r#"test -f "$1" && echo '[{"rec_texts":["안녕하세요"],"rec_scores":[0.97],"rec_boxes":[[1,2,3,4]]}]'"#,
        );
        let output = recognizer.recognize(&tile()).unwrap();
        assert_eq!(output.len(), 1);
        assert_eq!(output.detections()[0].text, "안녕하세요");
    }

    #[test]
    fn test_nonzero_exit_is_command_failure() {
        let recognizer = shell("echo 'model exploded' >&2; exit 3");
        match recognizer.recognize(&tile()) {
            Err(RecognitionError::CommandFailed { stderr, .. }) => {
                assert_eq!(stderr, "model exploded")
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let recognizer = CommandRecognizer::new(
            "korean",
            "/nonexistent/ocr-binary",
            vec![],
            RecognitionConfig::default(),
            Duration::from_secs(1),
        );
        assert!(matches!(
            recognizer.recognize(&tile()),
            Err(RecognitionError::Spawn { .. })
        ));
    }

    #[test]
    fn test_non_utf8_stdout_is_malformed() {
        let recognizer = shell(
            r#"printf '[{"rec_texts":["\265\310"],"rec_scores":[0.99],"rec_boxes":[[0,0,1,1]]}]'"#,
        );
        assert!(matches!(
            recognizer.recognize(&tile()),
            Err(RecognitionError::MalformedOutput(_))
        ));
    }

    #[test]
    fn test_artifact_removed_after_command_failure() {
        let recognizer = shell(r#"echo "$1" >&2; exit 1"#);
        match recognizer.recognize(&tile()) {
            Err(RecognitionError::CommandFailed { stderr, .. }) => {
                assert!(stderr.contains("bubble_tile_"));
                assert!(!Path::new(stderr.trim()).exists());
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_artifact_removed_after_malformed_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let record = dir.path().join("artifact_path");
        let recognizer = shell(&format!(
            r#"echo "$1" > '{}'; echo 'not json'"#,
            record.display()
        ));
        assert!(matches!(
            recognizer.recognize(&tile()),
            Err(RecognitionError::MalformedOutput(_))
        ));
        let artifact = std::fs::read_to_string(&record).unwrap();
        assert!(artifact.contains("bubble_tile_"));
        assert!(!Path::new(artifact.trim()).exists());
    }

    #[test]
    fn test_artifact_removed_after_timeout() {
        let dir = tempfile::TempDir::new().unwrap();
        let record = dir.path().join("artifact_path");
        let recognizer = CommandRecognizer::new(
            "korean",
            "sh",
            vec![
                "-c".to_string(),
                format!(r#"echo "$1" > '{}'; sleep 5"#, record.display()),
                "ocr".to_string(),
                "{image}".to_string(),
            ],
            RecognitionConfig::default(),
            Duration::from_millis(500),
        );
        assert!(matches!(
            recognizer.recognize(&tile()),
            Err(RecognitionError::Timeout(_))
        ));
        let artifact = std::fs::read_to_string(&record).unwrap();
        assert!(artifact.contains("bubble_tile_"));
        assert!(!Path::new(artifact.trim()).exists());
    }

    #[test]
    fn test_timeout_kills_command() {
        let recognizer = CommandRecognizer::new(
            "korean",
            "sh",
            vec!["-c".to_string(), "sleep 5".to_string()],
            RecognitionConfig::default(),
            Duration::from_millis(200),
        );
        let start = Instant::now();
        assert!(matches!(
            recognizer.recognize(&tile()),
            Err(RecognitionError::Timeout(_))
        ));
        assert!(start.elapsed() < Duration::from_secs(4));
    }
}
