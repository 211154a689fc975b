use crate::extractor::{render_markdown, LopdfExtractor, PdfExtractor};
use crate::markdown::{build_section_map, clean_markdown, split_markdown};
use crate::metadata::{digest_file, save_metadata};
use crate::models::{TocEntry, TocSection};
use crate::toc_match::match_toc;
use crate::IngestError;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Markdown exported by an external renderer, used instead of the
    /// built-in page text export.
    pub markdown_override: Option<PathBuf>,
    /// Directory for the generated files; defaults to the PDF's directory.
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ConvertedManual {
    pub sections: Vec<TocSection>,
    pub content_path: PathBuf,
    pub text_path: PathBuf,
    pub meta_path: PathBuf,
}

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
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
    files
}

/// Cleans and splits the markdown export, then reconciles it with the ToC.
pub fn sections_from_markdown(markdown: &str, toc: Vec<TocEntry>) -> Result<Vec<TocSection>, IngestError> {
    let cleaned = clean_markdown(markdown);
    let pieces = split_markdown(&cleaned);
    let sections = build_section_map(&pieces);
    tracing::debug!(sections = sections.len(), toc_entries = toc.len(), "matching sections to toc");
    match_toc(toc, sections)
}

fn output_path(pdf: &Path, options: &ConvertOptions, suffix: &str) -> Result<PathBuf, IngestError> {
    let stem = pdf
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| IngestError::MissingFileName(pdf.display().to_string()))?;
    let dir = match &options.output_dir {
        Some(dir) => dir.clone(),
        None => pdf.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    Ok(dir.join(format!("{stem}{suffix}")))
}

pub fn convert_pdf(pdf: &Path, options: &ConvertOptions) -> Result<ConvertedManual, IngestError> {
    convert_pdf_with(&LopdfExtractor, pdf, options)
}

pub fn convert_pdf_with(
    extractor: &impl PdfExtractor,
    pdf: &Path,
    options: &ConvertOptions,
) -> Result<ConvertedManual, IngestError> {
    let extracted = extractor.extract(pdf)?;
    if let Some(dir) = &options.output_dir {
        fs::create_dir_all(dir)?;
    }

    let meta_path = output_path(pdf, options, "_meta.json")?;
    let mut metadata = extracted.metadata;
    metadata.checksum = Some(digest_file(pdf)?);
    save_metadata(&metadata, &meta_path)?;

    let markdown = match &options.markdown_override {
        Some(path) => fs::read_to_string(path)?,
        None => render_markdown(&extracted.pages, &extracted.toc),
    };

    let sections = sections_from_markdown(&markdown, extracted.toc)?;

    let text_path = output_path(pdf, options, ".txt")?;
    let joined = sections
        .iter()
        .filter_map(|section| section.content.as_deref())
        .collect::<Vec<_>>()
        .join("\n\n");
    fs::write(&text_path, joined)?;

    let content_path = output_path(pdf, options, "_content.json")?;
    fs::write(&content_path, serde_json::to_string_pretty(&sections)?)?;

    tracing::info!(
        pdf = %pdf.display(),
        sections = sections.len(),
        content = %content_path.display(),
        "manual converted"
    );

    Ok(ConvertedManual {
        sections,
        content_path,
        text_path,
        meta_path,
    })
}

pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

pub struct ConversionReport {
    pub converted: Vec<ConvertedManual>,
    pub skipped_files: Vec<SkippedPdf>,
}

pub fn convert_folder_best_effort(folder: &Path, options: &ConvertOptions) -> Result<ConversionReport, IngestError> {
    let files = discover_pdf_files(folder);

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no pdf files found in {}",
            folder.display()
        )));
    }

    let mut converted = Vec::new();
    let mut skipped_files = Vec::new();

    for path in files {
        match convert_pdf(&path, options) {
            Ok(manual) => converted.push(manual),
            Err(error) => skipped_files.push(SkippedPdf {
                path,
                reason: error.to_string(),
            }),
        }
    }

    Ok(ConversionReport {
        converted,
        skipped_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{ExtractedPdf, PageText};
    use crate::models::DocumentMetadata;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    struct FakeExtractor;

    impl PdfExtractor for FakeExtractor {
        fn extract(&self, _path: &Path) -> Result<ExtractedPdf, IngestError> {
            let toc = vec![
                TocEntry {
                    level: 1,
                    title: "1. Safety".to_string(),
                    page: 2,
                },
                TocEntry {
                    level: 2,
                    title: "1.1 Wiring".to_string(),
                    page: 2,
                },
            ];
            Ok(ExtractedPdf {
                pages: vec![
                    PageText {
                        number: 1,
                        text: "Front cover".to_string(),
                    },
                    PageText {
                        number: 2,
                        text: "1. Safety\n★ Read all warnings.\n1.1 Wiring\nUse 2 mm² cable."
                            .to_string(),
                    },
                ],
                metadata: DocumentMetadata {
                    title: Some("Inverter Manual".to_string()),
                    page_count: 2,
                    toc: toc.clone(),
                    ..DocumentMetadata::default()
                },
                toc,
            })
        }
    }

    #[test]
    fn discover_pdf_files_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.PDF"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(base.join("notes.txt"))?;

        let files = discover_pdf_files(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn conversion_writes_all_artifacts() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let pdf = dir.path().join("inverter.pdf");
        fs::write(&pdf, b"%PDF-1.4\n%fake")?;

        let manual = convert_pdf_with(&FakeExtractor, &pdf, &ConvertOptions::default())?;

        assert_eq!(manual.sections.len(), 2);
        assert_eq!(
            manual.sections[0].content.as_deref(),
            Some("1. Safety\n Read all warnings.")
        );
        assert_eq!(manual.content_path, dir.path().join("inverter_content.json"));
        assert!(manual.text_path.exists());

        let stored: Vec<TocSection> = serde_json::from_str(&fs::read_to_string(&manual.content_path)?)?;
        assert_eq!(stored, manual.sections);

        let meta: DocumentMetadata = serde_json::from_str(&fs::read_to_string(&manual.meta_path)?)?;
        assert_eq!(meta.title.as_deref(), Some("Inverter Manual"));
        assert!(meta.checksum.is_some());
        Ok(())
    }

    #[test]
    fn markdown_override_replaces_rendering() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let pdf = dir.path().join("inverter.pdf");
        let markdown = dir.path().join("export.md");
        fs::write(&pdf, b"%PDF")?;
        fs::write(&markdown, "# 1 Safety\nexternal text\n## 1.1 Wiring\ncables")?;

        let options = ConvertOptions {
            markdown_override: Some(markdown),
            output_dir: None,
        };
        let manual = convert_pdf_with(&FakeExtractor, &pdf, &options)?;

        assert_eq!(
            manual.sections[0].content.as_deref(),
            Some("1 Safety\nexternal text")
        );
        Ok(())
    }

    #[test]
    fn conversion_fails_without_pdfs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = convert_folder_best_effort(dir.path(), &ConvertOptions::default());
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn best_effort_skips_unreadable_pdfs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("unreadable.pdf"), b"%PDF-1.4\n%broken")?;

        let report = convert_folder_best_effort(dir.path(), &ConvertOptions::default())?;

        assert_eq!(report.converted.len(), 0);
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(
            report.skipped_files[0]
                .path
                .file_name()
                .and_then(|name| name.to_str()),
            Some("unreadable.pdf")
        );
        Ok(())
    }
}
