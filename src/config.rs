//! Configuração do assistente carregada a partir de `editais.toml`.
//!
//! A struct [`EditaisConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `EDITAIS_API_URL` tem precedência sobre o arquivo.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Nome do arquivo de configuração procurado no diretório atual.
pub const CONFIG_FILE: &str = "editais.toml";

/// Variável de ambiente que sobrescreve a URL da API.
pub const API_URL_ENV: &str = "EDITAIS_API_URL";

/// Configuração de nível superior carregada de `editais.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct EditaisConfig {
    /// URL base do serviço de processamento de documentos.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Tempo máximo para estabelecer conexão, em segundos.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Tempo máximo de cada requisição, em segundos.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Diretório onde o documento final é gravado.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

// Valor padrão para a URL da API: servidor local.
fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

// A substituição de tabelas pode demorar em documentos grandes.
fn default_timeout_secs() -> u64 {
    120
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for EditaisConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            timeout_secs: default_timeout_secs(),
            output_dir: default_output_dir(),
        }
    }
}

impl EditaisConfig {
    /// Carrega a configuração de `editais.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(Path::new(CONFIG_FILE))?;

        // Variável de ambiente tem precedência sobre o arquivo de configuração.
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                config.api_url = url;
            }
        }

        Ok(config)
    }

    /// Carrega a configuração de um caminho específico, sem consultar o ambiente.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "config file not found, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = toml::from_str::<EditaisConfig>(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }
}
