//! Ledger da sessão: armazenamento chave/valor de texto entre os passos.
//!
//! Cada chave tem um tipo de registro próprio ([`LedgerEntry`]); a leitura
//! valida o JSON guardado contra esse tipo e qualquer falha é tratada pelo
//! navegador como perda de sessão. Escritas são last-write-wins por chave.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use uuid::Uuid;

use crate::codec::TransitFile;
use crate::model::{EditalForm, ProcessedDocument};

/// Chaves conhecidas do ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerKey {
    EditalFormData,
    TermoReferencia,
    TabelaItens,
    DocumentoProcessado,
}

impl LedgerKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKey::EditalFormData => "editalFormData",
            LedgerKey::TermoReferencia => "termoReferencia",
            LedgerKey::TabelaItens => "tabelaItens",
            LedgerKey::DocumentoProcessado => "documentoProcessado",
        }
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("missing ledger entry `{0}`")]
    Missing(LedgerKey),

    #[error("malformed ledger entry `{key}`: {reason}")]
    Malformed { key: LedgerKey, reason: String },

    #[error("failed to serialize ledger entry `{key}`: {source}")]
    Serialize {
        key: LedgerKey,
        #[source]
        source: serde_json::Error,
    },
}

/// Registro tipado associado a uma chave do ledger.
pub trait LedgerEntry: Serialize + DeserializeOwned {
    const KEY: LedgerKey;

    /// Checagens além do schema JSON. O padrão aceita tudo.
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Termo de referência guardado pelo passo 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceDocument(pub TransitFile);

/// Tabela de itens guardada pelo passo 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemsTable(pub TransitFile);

fn check_named(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        Err("file name is empty".to_string())
    } else {
        Ok(())
    }
}

impl LedgerEntry for EditalForm {
    const KEY: LedgerKey = LedgerKey::EditalFormData;

    fn check(&self) -> Result<(), String> {
        let blank = [
            ("nome", &self.nome),
            ("numero", &self.numero),
            ("objeto", &self.objeto),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty());
        match blank {
            Some((field, _)) => Err(format!("field `{field}` is blank")),
            None => Ok(()),
        }
    }
}

impl LedgerEntry for ReferenceDocument {
    const KEY: LedgerKey = LedgerKey::TermoReferencia;

    fn check(&self) -> Result<(), String> {
        check_named(&self.0.name)
    }
}

impl LedgerEntry for ItemsTable {
    const KEY: LedgerKey = LedgerKey::TabelaItens;

    fn check(&self) -> Result<(), String> {
        check_named(&self.0.name)
    }
}

impl LedgerEntry for ProcessedDocument {
    const KEY: LedgerKey = LedgerKey::DocumentoProcessado;

    fn check(&self) -> Result<(), String> {
        check_named(&self.name)
    }
}

/// Armazenamento da sessão do assistente.
///
/// Os valores são texto puro; o acesso tipado passa por [`SessionLedger::put`]
/// e [`SessionLedger::get`].
#[derive(Debug, Clone)]
pub struct SessionLedger {
    id: Uuid,
    entries: HashMap<String, String>,
}

impl Default for SessionLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLedger {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            entries: HashMap::new(),
        }
    }

    /// Identificador da sessão, usado para correlacionar logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn set_raw(&mut self, key: &str, value: impl Into<String>) {
        self.entries.insert(key.to_string(), value.into());
    }

    pub fn get_raw(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: LedgerKey) -> Option<String> {
        self.entries.remove(key.as_str())
    }

    pub fn contains(&self, key: LedgerKey) -> bool {
        self.entries.contains_key(key.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descarta todas as entradas e inicia uma nova sessão.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.id = Uuid::new_v4();
    }

    /// Grava um registro tipado como JSON.
    pub fn put<T: LedgerEntry>(&mut self, entry: &T) -> Result<(), LedgerError> {
        let text = serde_json::to_string(entry).map_err(|source| LedgerError::Serialize {
            key: T::KEY,
            source,
        })?;
        self.set_raw(T::KEY.as_str(), text);
        Ok(())
    }

    /// Lê e valida um registro tipado.
    pub fn get<T: LedgerEntry>(&self) -> Result<T, LedgerError> {
        let raw = self.get_raw(T::KEY.as_str()).ok_or(LedgerError::Missing(T::KEY))?;
        let entry: T = serde_json::from_str(raw).map_err(|e| LedgerError::Malformed {
            key: T::KEY,
            reason: e.to_string(),
        })?;
        entry.check().map_err(|reason| LedgerError::Malformed {
            key: T::KEY,
            reason,
        })?;
        Ok(entry)
    }
}
