use crate::chunking::normalize_whitespace;
use crate::error::IngestError;
use crate::models::{RawDocument, SOURCE_KEY};
use lopdf::Document as PdfDocument;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let parse_error = |error: lopdf::Error| IngestError::PdfParse {
            path: path.display().to_string(),
            reason: error.to_string(),
        };

        let document = PdfDocument::load(path).map_err(parse_error)?;

        let mut pages = Vec::new();
        // get_pages is keyed by page number, so iteration is in page order.
        for (page_no, _page_id) in document.get_pages() {
            let text = document.extract_text(&[page_no]).map_err(parse_error)?;
            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        Ok(pages)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    pub recursive: bool,
    /// Record unparsable PDFs in the report instead of failing the load.
    pub skip_unreadable: bool,
}

#[derive(Debug, Clone)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<RawDocument>,
    pub files: usize,
    pub skipped_files: Vec<SkippedPdf>,
}

pub fn discover_pdf_files(folder: &Path, recursive: bool) -> Result<Vec<PathBuf>, IngestError> {
    if !folder.exists() {
        return Err(IngestError::SourceDirMissing(folder.display().to_string()));
    }
    if !folder.is_dir() {
        return Err(IngestError::NotADirectory(folder.display().to_string()));
    }

    let walker = WalkDir::new(folder).min_depth(1);
    let walker = if recursive { walker } else { walker.max_depth(1) };

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|error| {
            IngestError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                error.to_string(),
            ))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    Ok(files)
}

/// Load every PDF in `folder` into one record per page that has text.
///
/// An empty folder is not an error here: the report simply has no
/// documents, and the caller decides whether that is fatal.
pub fn load_pdf_directory(
    folder: &Path,
    options: LoadOptions,
) -> Result<LoadReport, IngestError> {
    load_with(&LopdfExtractor, folder, options)
}

pub fn load_with<E: PdfExtractor>(
    extractor: &E,
    folder: &Path,
    options: LoadOptions,
) -> Result<LoadReport, IngestError> {
    let files = discover_pdf_files(folder, options.recursive)?;
    let mut report = LoadReport {
        files: files.len(),
        ..LoadReport::default()
    };

    for path in files {
        match load_file(extractor, &path) {
            Ok(pages) => report.documents.extend(pages),
            Err(error) if options.skip_unreadable => {
                tracing::warn!(path = %path.display(), %error, "skipping unreadable pdf");
                report.skipped_files.push(SkippedPdf {
                    path,
                    reason: error.to_string(),
                });
            }
            Err(error) => return Err(error),
        }
    }

    tracing::info!(
        folder = %folder.display(),
        files = report.files,
        pages = report.documents.len(),
        skipped = report.skipped_files.len(),
        "loaded pdf directory"
    );

    Ok(report)
}

fn load_file<E: PdfExtractor>(extractor: &E, path: &Path) -> Result<Vec<RawDocument>, IngestError> {
    let pages = extractor.extract_pages(path)?;
    let source = path.to_string_lossy().to_string();

    let documents = pages
        .into_iter()
        .filter_map(|page| {
            let text = normalize_whitespace(&page.text);
            if text.is_empty() {
                return None;
            }

            let mut metadata = BTreeMap::new();
            metadata.insert(SOURCE_KEY.to_string(), source.clone());
            metadata.insert("page".to_string(), page.number.to_string());
            Some(RawDocument { text, metadata })
        })
        .collect();

    Ok(documents)
}
