//! Text-to-speech and audio playback through external programs.
//!
//! Platform differences live entirely in [`VoiceCommands::detect`]; the rest
//! of the code only sees the [`SpeechSynthesizer`] and [`AudioPlayer`] traits.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("could not write speech input: {0}")]
    Io(#[from] std::io::Error),
    #[error("{program} exited with {status}")]
    Failed { program: String, status: String },
    #[error("could not start {program}: {reason}")]
    Spawn { program: String, reason: String },
    #[error("speech worker stopped: {0}")]
    Worker(String),
}

/// Turns text into an audio file on disk
pub trait SpeechSynthesizer: Send + Sync {
    /// Blocks until the audio file is written and returns its path
    fn synthesize(&self, text: &str) -> Result<PathBuf, SpeechError>;
}

/// Plays one audio file at a time
pub trait AudioPlayer: Send {
    fn start(&mut self, file: &Path) -> Result<(), SpeechError>;

    /// Stop the current playback. Returns false when nothing was playing.
    fn stop(&mut self) -> bool;

    fn is_playing(&mut self) -> bool;
}

/// A program plus arguments where `{input}` and `{output}` are substituted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandTemplate {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn render(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }

    fn command(&self, input: &Path, output: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(self.render(input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
    }
}

/// Synthesis and playback commands for one platform
#[derive(Debug, Clone)]
pub struct VoiceCommands {
    pub synthesize: CommandTemplate,
    pub play: CommandTemplate,
    pub audio_extension: &'static str,
}

impl VoiceCommands {
    pub fn detect() -> Self {
        if cfg!(target_os = "macos") {
            Self {
                synthesize: CommandTemplate::new("say", &["-f", "{input}", "-o", "{output}"]),
                play: CommandTemplate::new("afplay", &["{input}"]),
                audio_extension: "aiff",
            }
        } else if cfg!(target_os = "windows") {
            Self {
                synthesize: CommandTemplate::new(
                    "powershell",
                    &[
                        "-NoProfile",
                        "-Command",
                        "Add-Type -AssemblyName System.Speech; \
                         $s = New-Object System.Speech.Synthesis.SpeechSynthesizer; \
                         $s.SetOutputToWaveFile('{output}'); \
                         $s.Speak((Get-Content -Raw '{input}')); $s.Dispose()",
                    ],
                ),
                play: CommandTemplate::new(
                    "powershell",
                    &[
                        "-NoProfile",
                        "-Command",
                        "(New-Object Media.SoundPlayer '{input}').PlaySync()",
                    ],
                ),
                audio_extension: "wav",
            }
        } else {
            Self {
                synthesize: CommandTemplate::new("espeak-ng", &["-f", "{input}", "-w", "{output}"]),
                play: CommandTemplate::new("aplay", &["-q", "{input}"]),
                audio_extension: "wav",
            }
        }
    }
}

/// Runs the platform speech program, writing into `work_dir`.
///
/// Every job gets its own input and output files, so overlapping jobs never
/// share a file.
#[derive(Debug)]
pub struct CommandSynthesizer {
    template: CommandTemplate,
    work_dir: PathBuf,
    audio_extension: &'static str,
    next_job: AtomicU64,
}

impl CommandSynthesizer {
    pub fn new(commands: &VoiceCommands, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            template: commands.synthesize.clone(),
            work_dir: work_dir.into(),
            audio_extension: commands.audio_extension,
            next_job: AtomicU64::new(1),
        }
    }

    /// `speech-<pid>-<job>`, unique across jobs and concurrent processes
    fn job_stem(&self) -> String {
        let job = self.next_job.fetch_add(1, Ordering::Relaxed);
        format!("speech-{}-{}", std::process::id(), job)
    }
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn synthesize(&self, text: &str) -> Result<PathBuf, SpeechError> {
        fs::create_dir_all(&self.work_dir)?;
        let stem = self.job_stem();
        let input = self.work_dir.join(format!("{}.txt", stem));
        let output = self.work_dir.join(format!("{}.{}", stem, self.audio_extension));
        fs::write(&input, text)?;

        debug!(program = %self.template.program, file = %output.display(), "synthesizing speech");
        let status = self.template.command(&input, &output).status();
        if let Err(e) = fs::remove_file(&input) {
            debug!("could not remove speech input: {}", e);
        }
        let status = status.map_err(|e| SpeechError::Spawn {
            program: self.template.program.clone(),
            reason: e.to_string(),
        })?;

        if !status.success() {
            return Err(SpeechError::Failed {
                program: self.template.program.clone(),
                status: status.to_string(),
            });
        }
        Ok(output)
    }
}

/// Plays audio by spawning the platform player; stopping kills that process
#[derive(Debug)]
pub struct ProcessAudioPlayer {
    template: CommandTemplate,
    child: Option<Child>,
}

impl ProcessAudioPlayer {
    pub fn new(template: CommandTemplate) -> Self {
        Self {
            template,
            child: None,
        }
    }
}

impl AudioPlayer for ProcessAudioPlayer {
    fn start(&mut self, file: &Path) -> Result<(), SpeechError> {
        self.stop();

        let child = self
            .template
            .command(file, file)
            .spawn()
            .map_err(|e| SpeechError::Spawn {
                program: self.template.program.clone(),
                reason: e.to_string(),
            })?;
        self.child = Some(child);
        Ok(())
    }

    fn stop(&mut self) -> bool {
        match self.child.take() {
            Some(mut child) => {
                let running = matches!(child.try_wait(), Ok(None));
                if running {
                    if let Err(e) = child.kill() {
                        warn!("failed to stop audio player: {}", e);
                    }
                }
                // Reap so no zombie is left behind
                let _ = child.wait();
                running
            }
            None => false,
        }
    }

    fn is_playing(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

impl Drop for ProcessAudioPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}
