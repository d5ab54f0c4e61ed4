//! Interface de linha de comando do assistente de editais baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (criar, validar,
//! identificar) e flags globais (--api-url, --verbose, --log-format).

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use gestor_editais::model::Modalidade;

/// Gestor de Editais: gera o edital a partir do termo de referência e da
/// tabela de itens.
#[derive(Debug, Parser)]
#[command(name = "editais", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// URL base do serviço de documentos (sobrescreve editais.toml e EDITAIS_API_URL).
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Habilita logs detalhados (debug).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Formato dos logs em stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa o assistente completo e grava o edital gerado.
    Criar(CriarArgs),

    /// Valida a estrutura de uma tabela de itens.
    Validar {
        /// Planilha .xlsx com os itens.
        tabela: PathBuf,
    },

    /// Lista as tabelas encontradas em um termo de referência.
    Identificar {
        /// Documento .docx do termo de referência.
        termo: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct CriarArgs {
    /// Nome do edital.
    #[arg(long)]
    pub nome: String,

    /// Número do edital (ex.: 010/2025).
    #[arg(long)]
    pub numero: String,

    /// Modalidade: pregao_eletronico, pregao_presencial, concorrencia,
    /// tomada_precos, convite, leilao ou concurso.
    #[arg(long)]
    pub modalidade: Modalidade,

    /// Data do edital no formato AAAA-MM-DD.
    #[arg(long)]
    pub data: NaiveDate,

    /// Objeto da licitação.
    #[arg(long)]
    pub objeto: String,

    /// Termo de referência (.docx ou .doc).
    #[arg(long)]
    pub termo: PathBuf,

    /// Tabela de itens (.xlsx ou .xls).
    #[arg(long)]
    pub tabela: PathBuf,

    /// Ids das tabelas a substituir, separados por vírgula. Sem esta opção
    /// a escolha é feita interativamente.
    #[arg(long, value_delimiter = ',')]
    pub tabelas: Vec<u32>,

    /// Diretório de saída (padrão: output_dir da configuração).
    #[arg(long)]
    pub saida: Option<PathBuf>,
}
