//! Codec de trânsito binário.
//!
//! Converte arquivos em memória ([`RawFile`]) para uma forma textual
//! ([`TransitFile`]) que pode ser guardada no ledger da sessão e embutida em
//! strings JSON, e de volta para bytes prontos para envio ([`UploadPart`]).
//! A forma textual é base64 padrão; a decodificação também aceita o formato
//! data-URL (`data:<mime>;base64,<payload>`) produzido por navegadores.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// MIME de documentos Word (.docx).
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// MIME de planilhas Excel (.xlsx).
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Erros ao decodificar um payload textual.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed transit payload for {name}: {source}")]
    Malformed {
        name: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("data URL for {0} is not base64-encoded")]
    UnsupportedDataUrl(String),
}

/// Arquivo binário em memória, como entregue pelo seletor de arquivos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl RawFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Tamanho em bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Tamanho arredondado em KB, como exibido ao lado do arquivo carregado.
    pub fn size_kb(&self) -> u64 {
        (self.bytes.len() as f64 / 1024.0).round() as u64
    }

    /// Extensão do nome do arquivo em minúsculas, sem o ponto.
    pub fn extension(&self) -> Option<String> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}

/// Representação textual de um arquivo, segura para JSON e para o ledger.
///
/// Serializado como `{ "name", "mimeType"?, "content" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransitFile {
    pub name: String,
    #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(rename = "content")]
    pub payload: String,
}

/// Payload binário pronto para ser anexado a um upload multipart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPart {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Codifica um arquivo em memória na forma de trânsito.
pub fn encode(file: &RawFile) -> TransitFile {
    TransitFile {
        name: file.name.clone(),
        mime_type: None,
        payload: STANDARD.encode(&file.bytes),
    }
}

/// Codifica bytes arbitrários já associados a um MIME conhecido.
pub fn encode_bytes(name: &str, mime_type: &str, bytes: &[u8]) -> TransitFile {
    TransitFile {
        name: name.to_string(),
        mime_type: Some(mime_type.to_string()),
        payload: STANDARD.encode(bytes),
    }
}

/// Inverso exato de [`encode`]: nunca altera tamanho nem ordem dos bytes.
pub fn decode(file: &TransitFile) -> Result<Vec<u8>, CodecError> {
    let (_, payload) = split_data_url(file)?;
    STANDARD
        .decode(payload.trim())
        .map_err(|source| CodecError::Malformed {
            name: file.name.clone(),
            source,
        })
}

/// Decodifica para um [`UploadPart`].
///
/// O MIME vem do contexto de uso (`mime_type`) a menos que o próprio payload
/// o carregue (campo `mimeType` ou prefixo data-URL).
pub fn to_part(file: &TransitFile, mime_type: &str) -> Result<UploadPart, CodecError> {
    let (embedded_mime, _) = split_data_url(file)?;
    let bytes = decode(file)?;
    let mime_type = embedded_mime
        .or(file.mime_type.as_deref())
        .filter(|m| !m.is_empty())
        .unwrap_or(mime_type)
        .to_string();
    Ok(UploadPart {
        file_name: file.name.clone(),
        mime_type,
        bytes,
    })
}

// Separa um eventual prefixo `data:<mime>;base64,` do payload.
fn split_data_url(file: &TransitFile) -> Result<(Option<&str>, &str), CodecError> {
    let Some(rest) = file.payload.strip_prefix("data:") else {
        return Ok((None, file.payload.as_str()));
    };
    let Some((header, payload)) = rest.split_once(',') else {
        return Err(CodecError::UnsupportedDataUrl(file.name.clone()));
    };
    let Some(mime) = header.strip_suffix(";base64") else {
        return Err(CodecError::UnsupportedDataUrl(file.name.clone()));
    };
    Ok((Some(mime), payload))
}
