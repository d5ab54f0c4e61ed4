use std::path::{Path, PathBuf};

use crate::codec::DOCX_MIME;
use crate::error::WizardError;

/// Nome usado quando o serviço não sugere um.
pub const DEFAULT_DOCUMENT_NAME: &str = "termo_referencia_modificado.docx";

/// Arquivo final oferecido para download no passo de resultado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl Download {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: DOCX_MIME,
            bytes,
        }
    }

    /// Grava o arquivo em `dir`, devolvendo o caminho completo.
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf, WizardError> {
        std::fs::create_dir_all(dir).map_err(|source| WizardError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.bytes).map_err(|source| WizardError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

/// Nome final do documento processado: sem diretórios e sempre `.docx`.
pub fn document_name(suggested: Option<&str>) -> String {
    let base = suggested
        .map(|name| name.rsplit(['/', '\\']).next().unwrap_or(name).trim())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..");
    match base {
        None => DEFAULT_DOCUMENT_NAME.to_string(),
        Some(name) if name.to_ascii_lowercase().ends_with(".docx") => name.to_string(),
        Some(name) => format!("{name}.docx"),
    }
}
