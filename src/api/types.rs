//! Tipos de dados trocados com os endpoints de documentos.

use serde::{Deserialize, Serialize};

use crate::model::TableCandidate;

/// Tabela descrita pelo endpoint `/identificar-tabelas/`.
///
/// O serviço também envia `selected`, que é ignorado: a seleção sempre
/// começa desmarcada no cliente.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub id: u32,
    pub title: String,
    #[serde(default)]
    pub preview: String,
}

impl From<TableInfo> for TableCandidate {
    fn from(info: TableInfo) -> Self {
        TableCandidate {
            id: info.id,
            title: info.title,
            preview: info.preview,
            selected: false,
        }
    }
}

/// Corpo de erro estruturado (`{ "detail": ... }`).
///
/// `detail` costuma ser texto, mas erros de validação de formulário chegam
/// como lista de objetos; por isso é mantido como JSON genérico.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub detail: serde_json::Value,
}

impl ErrorBody {
    /// Mensagem legível, quando o `detail` traz uma.
    pub fn message(&self) -> Option<String> {
        match &self.detail {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            serde_json::Value::Array(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                    .map(str::to_string)
                    .collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join("; "))
                }
            }
            _ => None,
        }
    }
}

/// Documento devolvido pelo endpoint `/substituir-tabelas/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutedDocument {
    /// Nome sugerido via `Content-Disposition`, se houver.
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}
