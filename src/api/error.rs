//! Tipos de erro para o cliente dos serviços de documentos.
//!
//! Define [`ApiError`] com variantes para respostas HTTP fora da faixa 2xx,
//! falhas de rede e respostas com formato inesperado.

use thiserror::Error;

/// Erros que podem ocorrer ao chamar os serviços de identificação e
/// substituição de tabelas.
#[derive(Debug, Error)]
pub enum ApiError {
    /// O serviço respondeu com status fora de 2xx.
    /// `message` vem do campo `detail` do corpo quando presente.
    #[error("service error (status {status}): {message}")]
    Status { status: u16, message: String },

    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Resposta 2xx com corpo que não respeita o contrato.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Indica se o serviço chegou a responder.
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}
