use std::collections::HashSet;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, header};
use tracing::{debug, instrument, warn};

use super::error::ApiError;
use super::types::{ErrorBody, SubstitutedDocument, TableInfo};
use crate::codec::UploadPart;
use crate::config::EditaisConfig;
use crate::model::{ValidationFailure, ValidationOutcome};

const VALIDATE_PATH: &str = "/validar-excel/";
const DISCOVER_PATH: &str = "/identificar-tabelas/";
const SUBSTITUTE_PATH: &str = "/substituir-tabelas/";

/// Operações remotas de que o assistente depende.
///
/// Implementado por [`EditaisClient`]; testes podem fornecer dublês.
#[allow(async_fn_in_trait)]
pub trait DocumentService {
    /// Validação estrutural da tabela de itens. Nunca falha: falhas viram
    /// [`ValidationOutcome::Invalid`].
    async fn validate_items_table(&self, items: &UploadPart) -> ValidationOutcome;

    /// Lista as tabelas encontradas no termo de referência, em ordem.
    async fn discover_tables(&self, reference: &UploadPart) -> Result<Vec<TableInfo>, ApiError>;

    /// Substitui as tabelas escolhidas e devolve o documento resultante.
    async fn substitute_tables(
        &self,
        reference: &UploadPart,
        items: &UploadPart,
        selected_ids: &[u32],
    ) -> Result<SubstitutedDocument, ApiError>;
}

impl<S: DocumentService + ?Sized> DocumentService for &S {
    async fn validate_items_table(&self, items: &UploadPart) -> ValidationOutcome {
        (**self).validate_items_table(items).await
    }

    async fn discover_tables(&self, reference: &UploadPart) -> Result<Vec<TableInfo>, ApiError> {
        (**self).discover_tables(reference).await
    }

    async fn substitute_tables(
        &self,
        reference: &UploadPart,
        items: &UploadPart,
        selected_ids: &[u32],
    ) -> Result<SubstitutedDocument, ApiError> {
        (**self).substitute_tables(reference, items, selected_ids).await
    }
}

/// Cliente HTTP dos três endpoints de processamento de documentos.
pub struct EditaisClient {
    client: Client,
    base_url: String,
}

impl EditaisClient {
    pub fn new(config: &EditaisConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Cria um cliente apontando para uma URL base específica (útil em testes).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let config = EditaisConfig {
            api_url: base_url.into(),
            ..EditaisConfig::default()
        };
        Self::new(&config)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn file_part(upload: &UploadPart) -> Result<Part, ApiError> {
    let part = Part::bytes(upload.bytes.clone())
        .file_name(upload.file_name.clone())
        .mime_str(&upload.mime_type)?;
    Ok(part)
}

// Converte uma resposta fora de 2xx em `ApiError::Status`.
async fn status_error(response: Response) -> ApiError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.message())
        .unwrap_or_else(|| {
            if text.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                text
            }
        });
    ApiError::Status {
        status: status.as_u16(),
        message,
    }
}

/// Extrai o nome do arquivo de um cabeçalho `Content-Disposition`.
///
/// A forma estendida `filename*=UTF-8''...` (usada para nomes não ASCII)
/// tem precedência sobre `filename`.
pub fn attachment_filename(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;
    for param in value.split(';').map(str::trim) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.eq_ignore_ascii_case("filename*") {
            extended = extended.or_else(|| extended_filename(raw));
        } else if key.eq_ignore_ascii_case("filename") {
            let name = raw.trim().trim_matches('"').trim();
            if !name.is_empty() && plain.is_none() {
                plain = Some(name.to_string());
            }
        }
    }
    extended.or(plain)
}

// `charset'lang'valor-percent-encoded`; só UTF-8 e ASCII são aceitos.
fn extended_filename(raw: &str) -> Option<String> {
    let mut pieces = raw.trim().trim_matches('"').splitn(3, '\'');
    let charset = pieces.next()?;
    let _language = pieces.next()?;
    let encoded = pieces.next()?;
    if !charset.eq_ignore_ascii_case("utf-8") && !charset.eq_ignore_ascii_case("us-ascii") {
        return None;
    }
    let decoded = urlencoding::decode(encoded).ok()?;
    let name = decoded.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

impl DocumentService for EditaisClient {
    #[instrument(skip_all, fields(file = %items.file_name, bytes = items.bytes.len()))]
    async fn validate_items_table(&self, items: &UploadPart) -> ValidationOutcome {
        let form = match file_part(items) {
            Ok(part) => Form::new().part("tabela_itens", part),
            Err(e) => return ValidationOutcome::Invalid(ValidationFailure::Rejected(e.to_string())),
        };

        let response = match self
            .client
            .post(self.endpoint(VALIDATE_PATH))
            .multipart(form)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "validation service unreachable");
                return ValidationOutcome::Invalid(ValidationFailure::Unreachable(e.to_string()));
            }
        };

        if response.status().is_success() {
            debug!("items table accepted");
            return ValidationOutcome::Valid;
        }

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let reason = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|body| body.message())
            .unwrap_or_else(|| format!("O arquivo não passou na validação (HTTP {status})."));
        debug!(status, %reason, "items table rejected");
        ValidationOutcome::Invalid(ValidationFailure::Rejected(reason))
    }

    #[instrument(skip_all, fields(file = %reference.file_name, bytes = reference.bytes.len()))]
    async fn discover_tables(&self, reference: &UploadPart) -> Result<Vec<TableInfo>, ApiError> {
        let form = Form::new().part("termo_referencia", file_part(reference)?);
        let response = self
            .client
            .post(self.endpoint(DISCOVER_PATH))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let text = response.text().await?;
        let tables: Vec<TableInfo> = serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("table list: {e}")))?;

        let mut seen = HashSet::new();
        if let Some(dup) = tables.iter().find(|t| !seen.insert(t.id)) {
            return Err(ApiError::InvalidResponse(format!(
                "duplicate table id {}",
                dup.id
            )));
        }

        debug!(count = tables.len(), "tables discovered");
        Ok(tables)
    }

    #[instrument(skip_all, fields(reference = %reference.file_name, items = %items.file_name, selected = ?selected_ids))]
    async fn substitute_tables(
        &self,
        reference: &UploadPart,
        items: &UploadPart,
        selected_ids: &[u32],
    ) -> Result<SubstitutedDocument, ApiError> {
        let selected = serde_json::to_string(selected_ids)
            .map_err(|e| ApiError::InvalidResponse(format!("selected tables: {e}")))?;
        let form = Form::new()
            .part("termo_referencia", file_part(reference)?)
            .part("tabela_itens", file_part(items)?)
            .text("selected_tables", selected);

        let response = self
            .client
            .post(self.endpoint(SUBSTITUTE_PATH))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let file_name = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(attachment_filename);
        let bytes = response.bytes().await?.to_vec();
        debug!(bytes = bytes.len(), ?file_name, "merged document received");

        Ok(SubstitutedDocument { file_name, bytes })
    }
}
