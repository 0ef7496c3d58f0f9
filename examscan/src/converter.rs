//! Page rendering and diagram cropping through the poppler command line tools.
//!
//! `pdfinfo` and `pdftocairo` must be on `PATH` for PDF scans. Image scans are
//! passed to the model as they are.

use crate::llm::ExtractionError;
use crate::models::{ScanDocument, VisualBoundingBox};
use async_trait::async_trait;
use glob::glob;
use rand::Rng;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;

/// Resolution used when rasterizing pages for the model.
pub const RENDER_DPI: u32 = 100;
/// Resolution used for cropped diagrams.
pub const CROP_DPI: u32 = 150;

static PAGE_SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\d.]+) x ([\d.]+)").unwrap());

/// Page images of one rendered scan, living in a scratch directory that is
/// removed on drop.
#[derive(Debug)]
pub struct PageImages {
    dir: PathBuf,
    paths: Vec<String>,
}

impl PageImages {
    /// Image paths in page order.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl Drop for PageImages {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            tracing::debug!("Could not remove scratch directory {:?}: {}", self.dir, e);
        }
    }
}

/// Creates a fresh scratch directory under the system temp dir.
fn scratch_dir() -> Result<PathBuf, ExtractionError> {
    let suffix: u64 = rand::rng().random();
    let dir = std::env::temp_dir().join(format!("examscan-{:016x}", suffix));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "application/pdf" => "pdf",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "bin",
    }
}

fn path_str(path: &Path) -> Result<&str, ExtractionError> {
    path.to_str()
        .ok_or_else(|| ExtractionError::Conversion(format!("Invalid path encoding: {:?}", path)))
}

/// Writes the document to a scratch directory and returns its page images.
///
/// PDF scans are rasterized with `pdftocairo -jpeg`; image scans are used
/// as a single page.
///
/// # Arguments
///
/// * `document` - The scan to render.
///
/// # Returns
///
/// The page images, or `ExtractionError::Conversion` when nothing could be
/// rendered.
pub fn render_pages(document: &ScanDocument) -> Result<PageImages, ExtractionError> {
    let dir = scratch_dir()?;
    let source = dir.join(format!("scan.{}", extension_for(&document.mime_type)));
    std::fs::write(&source, &document.bytes)?;

    if !document.is_pdf() {
        let paths = vec![path_str(&source)?.to_string()];
        return Ok(PageImages { dir, paths });
    }

    let stem = dir.join("page");
    let dpi = RENDER_DPI.to_string();
    let output = Command::new("pdftocairo")
        .args([
            "-jpeg",
            "-r",
            dpi.as_str(),
            path_str(&source)?,
            path_str(&stem)?,
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;
    if !output.status.success() {
        return Err(ExtractionError::Conversion(format!(
            "pdftocairo failed on {}: {}",
            document.name,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let query = format!("{}-*.jpg", path_str(&stem)?);
    let mut pages: Vec<(u32, String)> = Vec::new();
    for entry in glob(&query).map_err(|e| ExtractionError::Conversion(e.to_string()))? {
        let path = entry.map_err(|e| ExtractionError::Conversion(e.to_string()))?;
        let page_number = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.rsplit('-').next())
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(|| {
                ExtractionError::Conversion(format!("Invalid page image name: {:?}", path))
            })?;
        pages.push((page_number, path_str(&path)?.to_string()));
    }
    if pages.is_empty() {
        return Err(ExtractionError::Conversion(format!(
            "No pages rendered from {}",
            document.name
        )));
    }
    pages.sort_by_key(|(n, _)| *n);

    tracing::info!("Rendered {} page(s) from {}", pages.len(), document.name);
    let paths = pages.into_iter().map(|(_, p)| p).collect();
    Ok(PageImages { dir, paths })
}

/// Reads the page size of a PDF in points with `pdfinfo`.
pub fn pdf_page_size(pdf_path: &Path) -> Result<(f64, f64), ExtractionError> {
    let output = Command::new("pdfinfo")
        .arg(pdf_path)
        .stdout(Stdio::piped())
        .output()?;
    let text = String::from_utf8_lossy(&output.stdout);
    parse_page_size(&text).ok_or_else(|| {
        ExtractionError::Conversion(format!("pdfinfo reported no page size for {:?}", pdf_path))
    })
}

fn parse_page_size(pdfinfo: &str) -> Option<(f64, f64)> {
    let line = pdfinfo
        .lines()
        .find(|line| line.trim_start().to_lowercase().starts_with("page size"))?;
    let caps = PAGE_SIZE.captures(line)?;
    let width = caps.get(1)?.as_str().parse().ok()?;
    let height = caps.get(2)?.as_str().parse().ok()?;
    Some((width, height))
}

/// Pixel crop rectangle `(x, y, width, height)` for a percentage box on a page
/// of `page_size` points rendered at `dpi`.
pub fn crop_rect(bbox: &VisualBoundingBox, page_size: (f64, f64), dpi: u32) -> (u32, u32, u32, u32) {
    let scale = dpi as f64 / 72.0;
    let (page_w, page_h) = (page_size.0 * scale, page_size.1 * scale);
    let px = |percent: f64, total: f64| (percent.clamp(0.0, 100.0) / 100.0 * total).round() as u32;
    (
        px(bbox.x, page_w),
        px(bbox.y, page_h),
        px(bbox.width, page_w).max(1),
        px(bbox.height, page_h).max(1),
    )
}

/// Crops a diagram out of a scan given a percentage bounding box.
#[async_trait]
pub trait DiagramCropper: Send + Sync {
    /// Returns a reference to the cropped image (a path or URL).
    async fn crop(
        &self,
        document: &ScanDocument,
        bbox: &VisualBoundingBox,
        question_id: &str,
    ) -> Result<String, ExtractionError>;
}

/// Crops PDF scans with `pdftocairo` and writes JPEG files to `output_dir`.
#[derive(Debug, Clone)]
pub struct PopplerCropper {
    output_dir: PathBuf,
    dpi: u32,
}

impl PopplerCropper {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        PopplerCropper {
            output_dir: output_dir.into(),
            dpi: CROP_DPI,
        }
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    fn crop_blocking(
        &self,
        document: &ScanDocument,
        bbox: &VisualBoundingBox,
        question_id: &str,
    ) -> Result<String, ExtractionError> {
        let dir = scratch_dir()?;
        let source = dir.join("scan.pdf");
        std::fs::write(&source, &document.bytes)?;
        std::fs::create_dir_all(&self.output_dir)?;

        let result = (|| -> Result<String, ExtractionError> {
            let (x, y, w, h) = crop_rect(bbox, pdf_page_size(&source)?, self.dpi);
            let page = bbox.page_number.max(1).to_string();
            let dpi = self.dpi.to_string();
            let (x, y, w, h) = (x.to_string(), y.to_string(), w.to_string(), h.to_string());
            let stem = self.output_dir.join(crop_stem(&document.name, question_id));
            let output = Command::new("pdftocairo")
                .args([
                    "-jpeg",
                    "-singlefile",
                    "-r",
                    dpi.as_str(),
                    "-f",
                    page.as_str(),
                    "-l",
                    page.as_str(),
                    "-x",
                    x.as_str(),
                    "-y",
                    y.as_str(),
                    "-W",
                    w.as_str(),
                    "-H",
                    h.as_str(),
                    path_str(&source)?,
                    path_str(&stem)?,
                ])
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()?;
            if !output.status.success() {
                return Err(ExtractionError::Conversion(format!(
                    "pdftocairo crop failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
            Ok(format!("{}.jpg", path_str(&stem)?))
        })();

        remove_scratch(&dir);
        result
    }
}

fn remove_scratch(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        tracing::warn!("Could not remove scratch directory {:?}: {}", dir, e);
    }
}

#[async_trait]
impl DiagramCropper for PopplerCropper {
    async fn crop(
        &self,
        document: &ScanDocument,
        bbox: &VisualBoundingBox,
        question_id: &str,
    ) -> Result<String, ExtractionError> {
        if !document.is_pdf() {
            return Err(ExtractionError::Conversion(format!(
                "Cannot crop diagrams from {} scans",
                document.mime_type
            )));
        }

        let cropper = self.clone();
        let (document, bbox, id) = (document.clone(), bbox.clone(), question_id.to_string());
        let path = tokio::task::spawn_blocking(move || cropper.crop_blocking(&document, &bbox, &id))
            .await
            .map_err(|e| ExtractionError::Conversion(format!("Crop task failed: {}", e)))??;
        tracing::debug!("Cropped diagram for {} to {}", question_id, path);
        Ok(path)
    }
}

/// File stem for a cropped diagram: document stem plus question id, limited to
/// characters safe in file names.
fn crop_stem(document_name: &str, question_id: &str) -> String {
    let stem = Path::new(document_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    format!("{}-{}", stem, question_id)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Reports whether the poppler tools answer on this machine.
pub fn poppler_available() -> bool {
    ["pdfinfo", "pdftocairo"].iter().all(|cmd| {
        Command::new(cmd)
            .arg("-v")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    })
}
