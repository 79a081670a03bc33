pub mod file;
pub mod stdin;

use serde::de::DeserializeOwned;

/// Load a document from `--<flag> <file>` or, failing that, piped stdin.
/// `None` when neither is available.
pub fn read_optional<T: DeserializeOwned>(
    path: Option<&str>,
) -> Result<Option<T>, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        tracing::info!(path, "loading input file");
        return Ok(Some(file::read_document(path)?));
    }
    let document = stdin::read_stdin()?;
    if document.is_some() {
        tracing::info!("loading input from stdin");
    }
    Ok(document)
}
