//! Tipos de domínio do assistente de editais.
//!
//! [`EditalForm`] é o formulário já validado do passo 1, [`FormDraft`] o
//! rascunho editável que o precede. [`TableCandidate`] e
//! [`ValidationOutcome`] representam o estado de trabalho dos passos 1 e 2.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::codec::TransitFile;

/// Modalidade da licitação.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modalidade {
    PregaoEletronico,
    PregaoPresencial,
    Concorrencia,
    TomadaPrecos,
    Convite,
    Leilao,
    Concurso,
}

impl Modalidade {
    pub const ALL: [Modalidade; 7] = [
        Modalidade::PregaoEletronico,
        Modalidade::PregaoPresencial,
        Modalidade::Concorrencia,
        Modalidade::TomadaPrecos,
        Modalidade::Convite,
        Modalidade::Leilao,
        Modalidade::Concurso,
    ];

    /// Identificador usado no armazenamento (`pregao_eletronico`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Modalidade::PregaoEletronico => "pregao_eletronico",
            Modalidade::PregaoPresencial => "pregao_presencial",
            Modalidade::Concorrencia => "concorrencia",
            Modalidade::TomadaPrecos => "tomada_precos",
            Modalidade::Convite => "convite",
            Modalidade::Leilao => "leilao",
            Modalidade::Concurso => "concurso",
        }
    }

    /// Rótulo exibido ao usuário.
    pub fn label(&self) -> &'static str {
        match self {
            Modalidade::PregaoEletronico => "Pregão Eletrônico",
            Modalidade::PregaoPresencial => "Pregão Presencial",
            Modalidade::Concorrencia => "Concorrência",
            Modalidade::TomadaPrecos => "Tomada de Preços",
            Modalidade::Convite => "Convite",
            Modalidade::Leilao => "Leilão",
            Modalidade::Concurso => "Concurso",
        }
    }
}

impl fmt::Display for Modalidade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Modalidade {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Modalidade::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| format!("modalidade desconhecida: {wanted}"))
    }
}

/// Campos obrigatórios do formulário do passo 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormField {
    Nome,
    Numero,
    Modalidade,
    Data,
    Objeto,
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormField::Nome => "nome",
            FormField::Numero => "numero",
            FormField::Modalidade => "modalidade",
            FormField::Data => "data",
            FormField::Objeto => "objeto",
        };
        f.write_str(name)
    }
}

/// Formulário completo do edital, imutável depois do passo 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditalForm {
    pub nome: String,
    pub numero: String,
    pub modalidade: Modalidade,
    pub data: NaiveDate,
    pub objeto: String,
}

/// Rascunho editável do formulário antes da submissão.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormDraft {
    pub nome: String,
    pub numero: String,
    pub modalidade: Option<Modalidade>,
    pub data: Option<NaiveDate>,
    pub objeto: String,
}

impl FormDraft {
    /// Campos ainda vazios, na ordem em que aparecem no formulário.
    pub fn missing_fields(&self) -> Vec<FormField> {
        let mut missing = Vec::new();
        if self.nome.trim().is_empty() {
            missing.push(FormField::Nome);
        }
        if self.numero.trim().is_empty() {
            missing.push(FormField::Numero);
        }
        if self.modalidade.is_none() {
            missing.push(FormField::Modalidade);
        }
        if self.data.is_none() {
            missing.push(FormField::Data);
        }
        if self.objeto.trim().is_empty() {
            missing.push(FormField::Objeto);
        }
        missing
    }

    /// Converte o rascunho em formulário, ou devolve os campos faltantes.
    pub fn complete(&self) -> Result<EditalForm, Vec<FormField>> {
        let missing = self.missing_fields();
        match (self.modalidade, self.data) {
            (Some(modalidade), Some(data)) if missing.is_empty() => Ok(EditalForm {
                nome: self.nome.trim().to_string(),
                numero: self.numero.trim().to_string(),
                modalidade,
                data,
                objeto: self.objeto.trim().to_string(),
            }),
            _ => Err(missing),
        }
    }
}

/// Motivo de uma validação de planilha sem sucesso.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    /// O serviço respondeu e recusou a estrutura do arquivo.
    Rejected(String),
    /// Não houve resposta do serviço de validação.
    Unreachable(String),
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationFailure::Rejected(reason) => write!(f, "{reason}"),
            ValidationFailure::Unreachable(reason) => write!(
                f,
                "não foi possível contatar o serviço de validação: {reason}"
            ),
        }
    }
}

/// Resultado da validação remota da tabela de itens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ValidationOutcome {
    #[default]
    Pending,
    Valid,
    Invalid(ValidationFailure),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid)
    }
}

/// Tabela encontrada no termo de referência, candidata à substituição.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCandidate {
    pub id: u32,
    pub title: String,
    pub preview: String,
    #[serde(default)]
    pub selected: bool,
}

/// Documento final devolvido pelo serviço de substituição.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessedDocument {
    pub name: String,
    #[serde(rename = "content")]
    pub payload: String,
}

impl ProcessedDocument {
    /// Forma de trânsito equivalente, para decodificação pelo codec.
    pub fn as_transit(&self) -> TransitFile {
        TransitFile {
            name: self.name.clone(),
            mime_type: None,
            payload: self.payload.clone(),
        }
    }
}

/// Resumo exibido no passo de resultado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSummary {
    pub nome: String,
    pub numero: String,
    pub modalidade: String,
    pub data: String,
    pub document_name: String,
}

impl ResultSummary {
    pub fn new(form: &EditalForm, document: &ProcessedDocument) -> Self {
        Self {
            nome: form.nome.clone(),
            numero: form.numero.clone(),
            modalidade: form.modalidade.label().to_string(),
            data: form.data.format("%d/%m/%Y").to_string(),
            document_name: document.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_draft() -> FormDraft {
        FormDraft {
            nome: "Compra de canetas".into(),
            numero: "010/2025".into(),
            modalidade: Some(Modalidade::PregaoEletronico),
            data: NaiveDate::from_ymd_opt(2025, 6, 1),
            objeto: "Aquisição de material".into(),
        }
    }

    #[test]
    fn modalidade_serializes_as_snake_case() {
        let json = serde_json::to_string(&Modalidade::TomadaPrecos).unwrap();
        assert_eq!(json, r#""tomada_precos""#);
        let back: Modalidade = serde_json::from_str(r#""pregao_eletronico""#).unwrap();
        assert_eq!(back, Modalidade::PregaoEletronico);
    }

    #[test]
    fn modalidade_from_str_matches_storage_names() {
        for m in Modalidade::ALL {
            assert_eq!(m.as_str().parse::<Modalidade>().unwrap(), m);
        }
        assert!("dispensa".parse::<Modalidade>().is_err());
    }

    #[test]
    fn complete_draft_builds_form() {
        let form = filled_draft().complete().unwrap();
        assert_eq!(form.numero, "010/2025");
        assert_eq!(form.modalidade, Modalidade::PregaoEletronico);
    }

    #[test]
    fn blank_fields_are_reported_in_order() {
        let draft = FormDraft {
            nome: "   ".into(),
            data: None,
            ..filled_draft()
        };
        assert_eq!(
            draft.complete().unwrap_err(),
            vec![FormField::Nome, FormField::Data]
        );
    }

    #[test]
    fn empty_draft_misses_everything() {
        assert_eq!(FormDraft::default().missing_fields().len(), 5);
    }

    #[test]
    fn form_json_uses_iso_date() {
        let form = filled_draft().complete().unwrap();
        let value = serde_json::to_value(&form).unwrap();
        assert_eq!(value["data"], "2025-06-01");
        assert_eq!(value["modalidade"], "pregao_eletronico");
    }

    #[test]
    fn form_rejects_unknown_modalidade() {
        let json = r#"{"nome":"a","numero":"1","modalidade":"dispensa","data":"2025-06-01","objeto":"x"}"#;
        assert!(serde_json::from_str::<EditalForm>(json).is_err());
    }

    #[test]
    fn unreachable_reason_is_distinguishable() {
        let rejected = ValidationFailure::Rejected("Colunas obrigatórias faltando: N".into());
        let unreachable = ValidationFailure::Unreachable("connection refused".into());
        assert_eq!(rejected.to_string(), "Colunas obrigatórias faltando: N");
        assert!(unreachable.to_string().starts_with("não foi possível contatar"));
    }

    #[test]
    fn result_summary_formats_for_display() {
        let form = filled_draft().complete().unwrap();
        let doc = ProcessedDocument {
            name: "edital.docx".into(),
            payload: String::new(),
        };
        let summary = ResultSummary::new(&form, &doc);
        assert_eq!(summary.modalidade, "Pregão Eletrônico");
        assert_eq!(summary.data, "01/06/2025");
        assert_eq!(summary.document_name, "edital.docx");
    }
}
