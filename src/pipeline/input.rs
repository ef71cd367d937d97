//! Input: turn one quiz PDF into a [`RawDocument`].
//!
//! ## Why truncate at a sentinel?
//!
//! The quiz export prints the question, its answers and the explanation,
//! then a "NEXT" button followed by navigation chrome and sometimes the
//! first lines of the following question. Everything from the first
//! sentinel on is noise, including images on later pages.
//!
//! ## Why spawn_blocking?
//!
//! pdfium keeps thread-local state and does CPU-heavy work on every call.
//! Loading runs on Tokio's blocking pool so the async workers never stall.

use crate::config::ExtractionConfig;
use crate::error::QbankError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One source document: concatenated text up to the sentinel, plus images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub filename: String,
    pub text: String,
    pub images: Vec<ImageBlob>,
}

/// An embedded image, PNG-encoded, with the name the asset store should use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub suggested_name: String,
    pub bytes: Vec<u8>,
}

/// What the extractor pulled from one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContent {
    pub text: String,
    /// PNG bytes of each image object, in page order.
    pub images: Vec<Vec<u8>>,
}

/// Join pages into a [`RawDocument`], stopping at the first `sentinel`.
///
/// Pages are joined on a line break so an item at the top of a page still
/// starts a line. The page holding the sentinel contributes only its text
/// before the sentinel; neither its images nor anything on later pages are
/// kept.
pub fn assemble_document(filename: &str, pages: Vec<PageContent>, sentinel: &str) -> RawDocument {
    let mut text = String::new();
    let mut images = Vec::new();

    for (page_idx, page) in pages.into_iter().enumerate() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        if !sentinel.is_empty() {
            if let Some(pos) = page.text.find(sentinel) {
                text.push_str(&page.text[..pos]);
                debug!("{}: sentinel on page {}", filename, page_idx + 1);
                break;
            }
        }
        text.push_str(&page.text);
        for (img_idx, bytes) in page.images.into_iter().enumerate() {
            images.push(ImageBlob {
                suggested_name: format!(
                    "{}_image_page{}_img{}.png",
                    filename,
                    page_idx + 1,
                    img_idx + 1
                ),
                bytes,
            });
        }
    }

    RawDocument {
        filename: filename.to_string(),
        text,
        images,
    }
}

/// List `.pdf` files (any case) directly inside `dir`, sorted by name.
pub fn list_pdfs(dir: &Path) -> Result<Vec<PathBuf>, QbankError> {
    if !dir.exists() {
        return Err(QbankError::FileNotFound {
            path: dir.to_path_buf(),
        });
    }
    if !dir.is_dir() {
        return Err(QbankError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|e| io_to_error(dir, e))?;
    let mut pdfs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_pdf_extension(p))
        .collect();
    pdfs.sort();

    info!("Found {} PDF files in {}", pdfs.len(), dir.display());
    Ok(pdfs)
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Load a PDF into a [`RawDocument`].
pub async fn load_pdf(path: &Path, config: &ExtractionConfig) -> Result<RawDocument, QbankError> {
    check_magic(path)?;

    let owned = path.to_path_buf();
    let password = config.password.clone();
    let pages = tokio::task::spawn_blocking(move || read_pages_blocking(&owned, password.as_deref()))
        .await
        .map_err(|e| QbankError::Internal(format!("PDF load task panicked: {}", e)))??;

    Ok(assemble_document(
        &file_name(path),
        pages,
        &config.stop_sentinel,
    ))
}

/// Final path component as a string, or the whole path if it has none.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn check_magic(path: &Path) -> Result<(), QbankError> {
    let mut file = std::fs::File::open(path).map_err(|e| io_to_error(path, e))?;
    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
        return Err(QbankError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

fn io_to_error(path: &Path, e: std::io::Error) -> QbankError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => QbankError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => QbankError::FileNotFound {
            path: path.to_path_buf(),
        },
    }
}

fn read_pages_blocking(path: &Path, password: Option<&str>) -> Result<Vec<PageContent>, QbankError> {
    let pdfium = Pdfium::default();

    let document = pdfium.load_pdf_from_file(path, password).map_err(|e| {
        let detail = format!("{:?}", e);
        if detail.to_lowercase().contains("password") {
            if password.is_some() {
                QbankError::WrongPassword {
                    path: path.to_path_buf(),
                }
            } else {
                QbankError::PasswordRequired {
                    path: path.to_path_buf(),
                }
            }
        } else {
            QbankError::CorruptPdf {
                path: path.to_path_buf(),
                detail,
            }
        }
    })?;

    let mut pages = Vec::new();
    for (idx, page) in document.pages().iter().enumerate() {
        let text = match page.text() {
            Ok(t) => t.all(),
            Err(e) => {
                warn!("{}: no text layer on page {}: {:?}", path.display(), idx + 1, e);
                String::new()
            }
        };

        let mut images = Vec::new();
        for object in page.objects().iter() {
            let Some(image_object) = object.as_image_object() else {
                continue;
            };
            match image_object.get_raw_image() {
                Ok(img) => match encode_png(&img) {
                    Ok(bytes) => images.push(bytes),
                    Err(e) => warn!("Page {}: image encoding failed: {}", idx + 1, e),
                },
                Err(e) => warn!("Page {}: image extraction failed: {:?}", idx + 1, e),
            }
        }

        debug!(
            "Page {}: {} chars, {} images",
            idx + 1,
            text.len(),
            images.len()
        );
        pages.push(PageContent { text, images });
    }

    Ok(pages)
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Write;

    fn page(text: &str, images: usize) -> PageContent {
        PageContent {
            text: text.to_string(),
            images: (0..images).map(|i| vec![i as u8]).collect(),
        }
    }

    #[test]
    fn concatenates_until_sentinel() {
        let doc = assemble_document(
            "q1.pdf",
            vec![page("Stem ", 1), page("1. A\nNEXT 2. Question", 1), page("later", 2)],
            "NEXT",
        );
        assert_eq!(doc.text, "Stem \n1. A\n");
        assert_eq!(doc.images.len(), 1);
        assert_eq!(doc.images[0].suggested_name, "q1.pdf_image_page1_img1.png");
    }

    #[test]
    fn no_sentinel_keeps_everything() {
        let doc = assemble_document("q.pdf", vec![page("a", 0), page("b", 2)], "NEXT");
        assert_eq!(doc.text, "a\nb");
        let names: Vec<_> = doc.images.iter().map(|i| i.suggested_name.as_str()).collect();
        assert_eq!(names, vec!["q.pdf_image_page2_img1.png", "q.pdf_image_page2_img2.png"]);
    }

    #[test]
    fn choice_at_top_of_page_keeps_its_line_start() {
        let doc = assemble_document(
            "q.pdf",
            vec![page("1. Question Stem\n1. A", 0), page("2. B\n", 0), page("CORRECT", 0)],
            "NEXT",
        );
        assert_eq!(doc.text, "1. Question Stem\n1. A\n2. B\nCORRECT");
    }

    #[test]
    fn sentinel_on_first_page() {
        let doc = assemble_document("q.pdf", vec![page("NEXT", 3)], "NEXT");
        assert_eq!(doc.text, "");
        assert!(doc.images.is_empty());
    }

    #[test]
    fn lists_pdfs_sorted_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.PDF", "notes.txt"] {
            std::fs::File::create(dir.path().join(name)).unwrap();
        }
        let found = list_pdfs(dir.path()).unwrap();
        let names: Vec<_> = found.iter().map(|p| file_name(p)).collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);
    }

    #[test]
    fn list_pdfs_rejects_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.pdf");
        std::fs::File::create(&file).unwrap();
        assert!(matches!(list_pdfs(&file), Err(QbankError::NotADirectory { .. })));
        assert!(matches!(
            list_pdfs(&dir.path().join("missing")),
            Err(QbankError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn load_rejects_non_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"hello world")
            .unwrap();
        let err = load_pdf(&path, &ExtractionConfig::default()).await.unwrap_err();
        assert!(matches!(err, QbankError::NotAPdf { .. }));
    }

    #[test]
    fn encodes_png() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255])));
        let bytes = encode_png(&img).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
    }
}
