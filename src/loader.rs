use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::process::Command;

/// Document loading failures are fatal to the session.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("document not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to decode document: {0}")]
    ParseFailure(String),
}

/// Extract the text of a PDF, up to `max_pages` pages.
///
/// Prefers poppler's `pdftotext` page by page when available, falling back to
/// the pure-Rust `pdf-extract` crate otherwise.
pub async fn load_pdf_text(path: &Path, max_pages: usize) -> Result<String, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }

    tracing::info!(path = %path.display(), "loading document");

    let mut text = String::new();
    if has_command("pdftotext").await {
        if let Ok(page_count) = pdf_page_count(path).await {
            for page in 1..=page_count.min(max_pages) {
                let output = Command::new("pdftotext")
                    .arg("-f")
                    .arg(page.to_string())
                    .arg("-l")
                    .arg(page.to_string())
                    .arg("-nopgbrk")
                    .arg(path)
                    .arg("-")
                    .output()
                    .await
                    .map_err(|err| LoadError::ParseFailure(err.to_string()))?;

                if !output.status.success() {
                    continue;
                }
                text.push_str(&String::from_utf8_lossy(&output.stdout));
                text.push('\n');
            }
        }
    }

    if text.trim().is_empty() {
        let owned = path.to_path_buf();
        text = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&owned))
            .await
            .map_err(|err| LoadError::ParseFailure(format!("extraction task panicked: {err}")))?
            .map_err(|err| LoadError::ParseFailure(err.to_string()))?;
    }

    Ok(normalize_text(&text))
}

async fn pdf_page_count(path: &Path) -> Result<usize, LoadError> {
    let output = Command::new("pdfinfo")
        .arg(path)
        .output()
        .await
        .map_err(|err| LoadError::ParseFailure(err.to_string()))?;

    if !output.status.success() {
        return Err(LoadError::ParseFailure(
            "pdfinfo exited with non-zero status".to_string(),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|rest| rest.trim().parse::<usize>().ok())
        .ok_or_else(|| LoadError::ParseFailure("unable to parse page count".to_string()))
}

async fn has_command(binary: &str) -> bool {
    Command::new("which")
        .arg(binary)
        .output()
        .await
        .map(|out| out.status.success() && !out.stdout.is_empty())
        .unwrap_or(false)
}

/// Replace fullwidth spaces with ASCII spaces and drop blank lines, keeping
/// one logical line per extracted text row.
fn normalize_text(raw: &str) -> String {
    raw.replace('\u{3000}', " ")
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
