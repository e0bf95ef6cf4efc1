use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, bail, Context, Result};
use image::{ImageFormat, RgbaImage};
use log::debug;

const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "m4v", "mov", "mkv", "webm"];

pub fn is_video_path(path: &Path) -> bool {
    output_extension(path)
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn output_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Where rendered frames go: an ffmpeg process or a directory of PNGs.
pub enum FrameWriter {
    Video(FfmpegPipe),
    Png(PngSequence),
}

impl FrameWriter {
    pub fn create(output: &Path, width: u32, height: u32, fps: u32) -> Result<Self> {
        if is_video_path(output) {
            Ok(Self::Video(FfmpegPipe::spawn(width, height, fps, output)?))
        } else {
            Ok(Self::Png(PngSequence::create(output, width, height)?))
        }
    }

    pub fn write_frame(&mut self, index: u64, rgba: &[u8]) -> Result<()> {
        match self {
            Self::Video(pipe) => pipe.write_frame(rgba.to_vec()),
            Self::Png(sequence) => sequence.write_frame(index, rgba).map(|_| ()),
        }
    }

    pub fn finish(self) -> Result<()> {
        match self {
            Self::Video(pipe) => pipe.finish(),
            Self::Png(_) => Ok(()),
        }
    }
}

pub struct PngSequence {
    dir: PathBuf,
    width: u32,
    height: u32,
}

impl PngSequence {
    pub fn create(dir: &Path, width: u32, height: u32) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create frame directory '{}'", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            width,
            height,
        })
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{index:05}.png"))
    }

    pub fn write_frame(&self, index: u64, rgba: &[u8]) -> Result<PathBuf> {
        let path = self.frame_path(index);
        write_png(&path, self.width, self.height, rgba)?;
        Ok(path)
    }
}

pub fn write_png(path: &Path, width: u32, height: u32, rgba: &[u8]) -> Result<()> {
    let image = RgbaImage::from_raw(width, height, rgba.to_vec()).ok_or_else(|| {
        anyhow!(
            "frame buffer is {} bytes, expected {} for {width}x{height}",
            rgba.len(),
            width as usize * height as usize * 4
        )
    })?;
    image
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("failed to write PNG '{}'", path.display()))
}

/// Raw RGBA frames piped into a system `ffmpeg` on a writer thread.
pub struct FfmpegPipe {
    sender: Option<mpsc::SyncSender<Vec<u8>>>,
    worker: Option<JoinHandle<Result<()>>>,
}

impl FfmpegPipe {
    pub fn spawn(width: u32, height: u32, fps: u32, output_path: &Path) -> Result<Self> {
        let args = ffmpeg_args(width, height, fps, output_path)?;
        let (sender, receiver) = mpsc::sync_channel::<Vec<u8>>(4);

        let worker = thread::Builder::new()
            .name("crt-reveal-ffmpeg".to_owned())
            .spawn(move || run_ffmpeg_process(Path::new("ffmpeg"), receiver, &args))
            .context("failed to spawn ffmpeg writer thread")?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    pub fn write_frame(&self, rgba_frame: Vec<u8>) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow!("encoder has already been finalized"))?;
        sender
            .send(rgba_frame)
            .map_err(|_| anyhow!("failed to enqueue frame for ffmpeg"))
    }

    pub fn finish(mut self) -> Result<()> {
        drop(self.sender.take());

        let handle = self
            .worker
            .take()
            .ok_or_else(|| anyhow!("ffmpeg worker thread missing"))?;
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow!("ffmpeg worker thread panicked")),
        }
    }
}

fn run_ffmpeg_process(
    ffmpeg_path: &Path,
    receiver: mpsc::Receiver<Vec<u8>>,
    args: &[String],
) -> Result<()> {
    debug!("spawning {} {}", ffmpeg_path.display(), args.join(" "));
    let mut child = Command::new(ffmpeg_path)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                anyhow!(
                    "ffmpeg executable not found (resolved_path={}). Install ffmpeg or render to a PNG directory instead.",
                    ffmpeg_path.display()
                )
            } else {
                anyhow!(
                    "failed to spawn ffmpeg process (args='{}'): {error}",
                    args.join(" ")
                )
            }
        })?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("failed to capture ffmpeg stdin"))?;
    let mut stderr_pipe = child.stderr.take();

    while let Ok(frame) = receiver.recv() {
        stdin
            .write_all(&frame)
            .context("failed to write frame to ffmpeg stdin")?;
    }

    stdin.flush().context("failed to flush ffmpeg stdin")?;
    drop(stdin);

    let status = child.wait().context("failed waiting for ffmpeg process")?;
    let stderr_tail = read_stderr_tail(&mut stderr_pipe)?;
    if !status.success() {
        return Err(anyhow!(
            "ffmpeg failed with status {status} (args='{}', stderr_tail='{}')",
            args.join(" "),
            stderr_tail
        ));
    }

    Ok(())
}

pub fn ffmpeg_args(width: u32, height: u32, fps: u32, output_path: &Path) -> Result<Vec<String>> {
    let path_str = output_path.to_string_lossy();
    if path_str.chars().any(|c| c.is_control()) {
        bail!("output path contains control characters");
    }

    let mut args = ffmpeg_rawvideo_input_args(&format!("{width}x{height}"), &fps.max(1).to_string());
    args.extend(ffmpeg_codec_args(output_path));
    args.push(path_str.into_owned());
    Ok(args)
}

pub fn ffmpeg_rawvideo_input_args(size: &str, fps: &str) -> Vec<String> {
    vec![
        "-hide_banner".to_owned(),
        "-loglevel".to_owned(),
        "error".to_owned(),
        "-y".to_owned(),
        "-f".to_owned(),
        "rawvideo".to_owned(),
        "-pix_fmt".to_owned(),
        "rgba".to_owned(),
        "-s:v".to_owned(),
        size.to_owned(),
        "-r".to_owned(),
        fps.to_owned(),
        "-i".to_owned(),
        "-".to_owned(),
        "-an".to_owned(),
    ]
}

/// 4:2:0 needs even dimensions, so odd sizes are padded by one pixel.
pub fn ffmpeg_codec_args(output_path: &Path) -> Vec<String> {
    let mut args = vec![
        "-vf".to_owned(),
        "pad=ceil(iw/2)*2:ceil(ih/2)*2".to_owned(),
        "-pix_fmt".to_owned(),
        "yuv420p".to_owned(),
    ];
    match output_extension(output_path).as_deref() {
        Some("webm") => args.extend(
            ["-c:v", "libvpx-vp9", "-b:v", "0", "-crf", "32"].map(str::to_owned),
        ),
        Some("mp4") | Some("m4v") | Some("mov") => args.extend(
            ["-c:v", "libx264", "-crf", "18", "-movflags", "+faststart"].map(str::to_owned),
        ),
        _ => args.extend(["-c:v", "libx264", "-crf", "18"].map(str::to_owned)),
    }
    args
}

fn read_stderr_tail(stderr: &mut Option<std::process::ChildStderr>) -> Result<String> {
    let Some(mut pipe) = stderr.take() else {
        return Ok(String::new());
    };
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf)
        .context("failed reading ffmpeg stderr")?;
    let text = String::from_utf8_lossy(&buf).to_string();
    Ok(last_n_chars(&text, 500))
}

fn last_n_chars(s: &str, max_chars: usize) -> String {
    let chars = s.chars().collect::<Vec<_>>();
    let start = chars.len().saturating_sub(max_chars);
    chars[start..].iter().collect::<String>().trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_extensions_are_case_insensitive() {
        assert!(is_video_path(Path::new("out/reveal.MP4")));
        assert!(is_video_path(Path::new("reveal.webm")));
        assert!(!is_video_path(Path::new("frames")));
        assert!(!is_video_path(Path::new("frames.png")));
    }

    #[test]
    fn webm_uses_vp9_and_mp4_uses_h264() {
        let webm = ffmpeg_codec_args(Path::new("a.webm"));
        assert!(webm.windows(2).any(|pair| pair == ["-c:v", "libvpx-vp9"]));
        let mp4 = ffmpeg_codec_args(Path::new("a.mp4"));
        assert!(mp4.windows(2).any(|pair| pair == ["-c:v", "libx264"]));
        assert!(mp4.contains(&"+faststart".to_owned()));
    }

    #[test]
    fn args_end_with_output_and_carry_geometry() {
        let args = ffmpeg_args(641, 360, 30, Path::new("out.mov")).expect("args");
        assert_eq!(args.last().map(String::as_str), Some("out.mov"));
        assert!(args.windows(2).any(|pair| pair == ["-s:v", "641x360"]));
        assert!(args.windows(2).any(|pair| pair == ["-r", "30"]));
    }

    #[test]
    fn control_characters_are_rejected() {
        assert!(ffmpeg_args(2, 2, 30, Path::new("bad\u{7}.mp4")).is_err());
    }

    #[test]
    fn stderr_tail_keeps_the_end() {
        assert_eq!(last_n_chars("  abcdef ", 4), "def");
        assert_eq!(last_n_chars("ab", 10), "ab");
    }
}
