//! Shelf previews: small PNG thumbnails for images, PDFs and videos.
//!
//! Every failure degrades to `None`; a missing preview is never an error.

use std::future::Future;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use image::{DynamicImage, ImageOutputFormat};

pub const THUMBNAIL_SIZE: u32 = 100;

/// Video frames tried in order; early frames are often black.
const VIDEO_FRAMES: [u32; 2] = [100, 30];
const TOOL_TIMEOUT: Duration = Duration::from_secs(30);

pub type ThumbnailFuture<'a> = Pin<Box<dyn Future<Output = Option<Vec<u8>>> + Send + 'a>>;

pub trait ThumbnailGenerator: Send + Sync {
    fn thumbnail<'a>(&'a self, path: &'a Path, mime_type: &'a str) -> ThumbnailFuture<'a>;
}

/// Images through the `image` crate; PDF pages through `pdftoppm` and video
/// frames through `ffmpeg` when those are installed.
#[derive(Debug, Clone)]
pub struct DefaultThumbnailer {
    size: u32,
    pdftoppm: Option<PathBuf>,
    ffmpeg: Option<PathBuf>,
}

impl Default for DefaultThumbnailer {
    fn default() -> Self {
        Self::detect()
    }
}

impl DefaultThumbnailer {
    #[must_use]
    pub fn detect() -> Self {
        Self {
            size: THUMBNAIL_SIZE,
            pdftoppm: which::which("pdftoppm").ok(),
            ffmpeg: which::which("ffmpeg").ok(),
        }
    }

    /// Image thumbnails only.
    #[must_use]
    pub fn images_only() -> Self {
        Self {
            size: THUMBNAIL_SIZE,
            pdftoppm: None,
            ffmpeg: None,
        }
    }

    #[must_use]
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    async fn generate(&self, path: &Path, mime_type: &str) -> Option<Vec<u8>> {
        if mime_type.contains("image") {
            return self.image_thumbnail(path.to_path_buf()).await;
        }
        if mime_type.contains("pdf") {
            return self.pdf_thumbnail(path).await;
        }
        if mime_type.contains("video") {
            return self.video_thumbnail(path).await;
        }
        None
    }

    async fn image_thumbnail(&self, path: PathBuf) -> Option<Vec<u8>> {
        let size = self.size;
        let result = tokio::task::spawn_blocking(move || {
            let img = image::open(&path)?;
            encode_png(&img, size)
        })
        .await;
        match result {
            Ok(Ok(png)) => Some(png),
            Ok(Err(e)) => {
                tracing::debug!("Thumbnail generation error: {e}");
                None
            }
            Err(e) => {
                tracing::debug!("Thumbnail task failed: {e}");
                None
            }
        }
    }

    async fn pdf_thumbnail(&self, path: &Path) -> Option<Vec<u8>> {
        let binary = self.pdftoppm.as_ref()?;
        let dir = tempfile::tempdir().ok()?;
        let prefix = dir.path().join("page");
        let mut command = tokio::process::Command::new(binary);
        command
            .args(["-png", "-f", "1", "-l", "1", "-singlefile", "-scale-to"])
            .arg((self.size * 4).to_string())
            .arg(path)
            .arg(&prefix);
        if !run_tool(command).await {
            return None;
        }
        self.image_thumbnail(prefix.with_extension("png")).await
    }

    async fn video_thumbnail(&self, path: &Path) -> Option<Vec<u8>> {
        let binary = self.ffmpeg.as_ref()?;
        let dir = tempfile::tempdir().ok()?;
        let frame = dir.path().join("frame.png");
        for index in VIDEO_FRAMES {
            let mut command = tokio::process::Command::new(binary);
            command
                .args(["-v", "error", "-y", "-i"])
                .arg(path)
                .arg("-vf")
                .arg(format!("select=eq(n\\,{index})"))
                .args(["-vframes", "1"])
                .arg(&frame);
            // ffmpeg exits 0 without writing when the frame is past the end
            if run_tool(command).await && frame.exists() {
                return self.image_thumbnail(frame.clone()).await;
            }
        }
        None
    }
}

impl ThumbnailGenerator for DefaultThumbnailer {
    fn thumbnail<'a>(&'a self, path: &'a Path, mime_type: &'a str) -> ThumbnailFuture<'a> {
        Box::pin(self.generate(path, mime_type))
    }
}

fn encode_png(img: &DynamicImage, size: u32) -> Result<Vec<u8>, image::ImageError> {
    let thumb = img.thumbnail(size, size);
    let mut out = Cursor::new(Vec::new());
    thumb.write_to(&mut out, ImageOutputFormat::Png)?;
    Ok(out.into_inner())
}

async fn run_tool(mut command: tokio::process::Command) -> bool {
    command
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true);
    match tokio::time::timeout(TOOL_TIMEOUT, command.status()).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            tracing::debug!("Preview tool failed to start: {e}");
            false
        }
        Err(_) => {
            tracing::debug!("Preview tool timed out");
            false
        }
    }
}
