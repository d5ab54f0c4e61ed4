//! Navegador do assistente: sequencia os passos, aplica as condições de
//! entrada e saída de cada um e chama o codec, o ledger e os serviços remotos
//! nas transições certas.
//!
//! Todo o estado mutável da sessão vive em um único [`WizardSession`]
//! protegido por mutex; o lock nunca é mantido através de um `.await`.
//! Cada navegação incrementa uma época; operações assíncronas capturam um
//! [`StepToken`] e descartam o resultado se a época mudou enquanto
//! aguardavam.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, instrument, warn};

use super::download::{Download, document_name};
use super::notice::{NoticeLevel, Notifier};
use super::step::{Precondition, Step, Transition};
use crate::api::DocumentService;
use crate::codec::{self, DOCX_MIME, RawFile, UploadPart, XLSX_MIME};
use crate::error::WizardError;
use crate::ledger::{ItemsTable, LedgerError, LedgerKey, ReferenceDocument, SessionLedger};
use crate::model::{
    EditalForm, FormDraft, ProcessedDocument, ResultSummary, TableCandidate, ValidationOutcome,
};

pub const SESSION_LOST_FORM: &str =
    "Dados não encontrados. Por favor, preencha o formulário novamente.";
pub const SESSION_LOST_RESULT: &str =
    "Dados não encontrados. O processo não foi concluído corretamente.";
pub const MISSING_INPUT: &str =
    "Por favor, preencha todos os campos e faça o upload dos arquivos necessários.";
pub const VALIDATION_PENDING: &str = "Aguarde a validação da tabela de itens.";
pub const NO_TABLE_SELECTED: &str = "Selecione pelo menos uma tabela para substituir";
pub const TABLES_FOUND: &str = "Tabelas identificadas com sucesso!";
pub const NO_TABLES_FOUND: &str = "Nenhuma tabela encontrada no termo de referência.";
pub const EDITAL_READY: &str = "Edital gerado com sucesso!";

/// Os dois arquivos pedidos no passo 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSlot {
    ReferenceDocument,
    ItemsTable,
}

impl FileSlot {
    pub fn accepted_extensions(&self) -> &'static [&'static str] {
        match self {
            FileSlot::ReferenceDocument => &["docx", "doc"],
            FileSlot::ItemsTable => &["xlsx", "xls"],
        }
    }

    /// MIME usado no upload quando o arquivo não traz um.
    pub fn mime_type(&self) -> &'static str {
        match self {
            FileSlot::ReferenceDocument => DOCX_MIME,
            FileSlot::ItemsTable => XLSX_MIME,
        }
    }

    pub fn accepts(&self, file: &RawFile) -> bool {
        file.extension()
            .is_some_and(|ext| self.accepted_extensions().contains(&ext.as_str()))
    }

    fn accepted_list(&self) -> String {
        self.accepted_extensions()
            .iter()
            .map(|ext| ext.to_ascii_uppercase())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn check(&self, file: &RawFile) -> Result<(), WizardError> {
        if self.accepts(file) {
            return Ok(());
        }
        Err(WizardError::UnsupportedFile {
            file: file.name.clone(),
            accepted: self.accepted_list(),
        })
    }

    /// Aviso exibido quando um arquivo é recusado.
    pub fn rejection_notice(&self, file: &RawFile) -> String {
        format!(
            "Arquivo não suportado: {}. Formatos aceitos: {}",
            file.name,
            self.accepted_list()
        )
    }
}

/// Marca a época em que uma operação assíncrona começou.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepToken {
    epoch: u64,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    ticket: u64,
    epoch: u64,
}

/// Contexto explícito de uma execução do assistente.
#[derive(Debug)]
struct WizardSession {
    step: Step,
    history: Vec<Step>,
    epoch: u64,
    ledger: SessionLedger,
    draft: FormDraft,
    reference: Option<RawFile>,
    items: Option<RawFile>,
    items_revision: u64,
    validation: ValidationOutcome,
    candidates: Vec<TableCandidate>,
    discovery_error: Option<String>,
    pending: Option<Pending>,
    next_ticket: u64,
}

impl WizardSession {
    fn new(ledger: SessionLedger) -> Self {
        Self {
            step: Step::Home,
            history: Vec::new(),
            epoch: 0,
            ledger,
            draft: FormDraft::default(),
            reference: None,
            items: None,
            items_revision: 0,
            validation: ValidationOutcome::Pending,
            candidates: Vec::new(),
            discovery_error: None,
            pending: None,
            next_ticket: 0,
        }
    }

    fn move_to(&mut self, to: Step) {
        let from = self.step;
        // Candidates belong to a single visit of TABLE_SELECTION.
        if from == Step::TableSelection || to == Step::TableSelection {
            self.candidates.clear();
            self.discovery_error = None;
        }
        self.history.push(from);
        self.step = to;
        self.epoch += 1;
        info!(session = %self.ledger.id(), %from, %to, "step changed");
    }

    /// Descarta tudo que a execução acumulou e começa uma sessão nova.
    fn reset(&mut self) {
        self.ledger.clear();
        self.history.clear();
        self.draft = FormDraft::default();
        self.reference = None;
        self.items = None;
        self.items_revision += 1;
        self.validation = ValidationOutcome::Pending;
    }

    fn token(&self) -> StepToken {
        StepToken { epoch: self.epoch }
    }

    fn is_current(&self, token: StepToken) -> bool {
        self.epoch == token.epoch
    }

    fn selected_ids(&self) -> Vec<u32> {
        self.candidates
            .iter()
            .filter(|c| c.selected)
            .map(|c| c.id)
            .collect()
    }

    fn form_blockers(&self) -> Vec<Precondition> {
        let mut blockers: Vec<Precondition> = self
            .draft
            .missing_fields()
            .into_iter()
            .map(Precondition::MissingField)
            .collect();
        if self.reference.is_none() {
            blockers.push(Precondition::MissingReferenceDocument);
        }
        if self.items.is_none() {
            blockers.push(Precondition::MissingItemsTable);
        } else {
            match &self.validation {
                ValidationOutcome::Valid => {}
                ValidationOutcome::Pending => blockers.push(Precondition::ItemsTableNotValidated),
                ValidationOutcome::Invalid(failure) => {
                    blockers.push(Precondition::ItemsTableInvalid(failure.clone()))
                }
            }
        }
        blockers
    }
}

/// Mantém a transição em andamento registrada até ser descartado.
struct TransitionGuard<'a> {
    session: &'a Mutex<WizardSession>,
    ticket: u64,
}

impl TransitionGuard<'_> {
    // A transição que navega continua dona do passo de destino.
    fn rearm(&self, session: &mut WizardSession) {
        if let Some(pending) = session.pending.as_mut() {
            if pending.ticket == self.ticket {
                pending.epoch = session.epoch;
            }
        }
    }
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if session.pending.is_some_and(|p| p.ticket == self.ticket) {
            session.pending = None;
        }
    }
}

fn store_submission(
    ledger: &mut SessionLedger,
    form: &EditalForm,
    reference: ReferenceDocument,
    items: ItemsTable,
) -> Result<(), LedgerError> {
    // Same order in which the next steps consume them.
    ledger.put(form)?;
    ledger.put(&reference)?;
    ledger.put(&items)?;
    ledger.remove(LedgerKey::DocumentoProcessado);
    Ok(())
}

fn load_sources(ledger: &SessionLedger) -> Result<(UploadPart, UploadPart), WizardError> {
    ledger
        .get::<EditalForm>()
        .map_err(WizardError::SessionLost)?;
    let reference = ledger
        .get::<ReferenceDocument>()
        .map_err(WizardError::SessionLost)?;
    let items = ledger.get::<ItemsTable>().map_err(WizardError::SessionLost)?;
    let reference = codec::to_part(&reference.0, FileSlot::ReferenceDocument.mime_type())?;
    let items = codec::to_part(&items.0, FileSlot::ItemsTable.mime_type())?;
    Ok((reference, items))
}

fn load_download(ledger: &SessionLedger) -> Result<Download, WizardError> {
    ledger
        .get::<EditalForm>()
        .map_err(WizardError::SessionLost)?;
    let document = ledger
        .get::<ProcessedDocument>()
        .map_err(|e| match e {
            LedgerError::Missing(_) => WizardError::NothingToDownload,
            other => WizardError::SessionLost(other),
        })?;
    let bytes = codec::decode(&document.as_transit())?;
    Ok(Download::new(document.name, bytes))
}

/// Máquina de estados do assistente de editais.
pub struct WizardNavigator<S, N> {
    service: S,
    notifier: N,
    session: Mutex<WizardSession>,
}

impl<S: DocumentService, N: Notifier> WizardNavigator<S, N> {
    pub fn new(service: S, notifier: N) -> Self {
        Self::with_ledger(service, notifier, SessionLedger::new())
    }

    /// Retoma um assistente a partir de um ledger existente.
    pub fn with_ledger(service: S, notifier: N, ledger: SessionLedger) -> Self {
        Self {
            service,
            notifier,
            session: Mutex::new(WizardSession::new(ledger)),
        }
    }

    fn session(&self) -> MutexGuard<'_, WizardSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, level: NoticeLevel, message: &str) {
        self.notifier.notify(level, message);
    }

    // Registra uma transição guardada, ou `None` se já houver outra pendente
    // para o passo atual.
    fn begin(&self) -> Option<TransitionGuard<'_>> {
        let mut s = self.session();
        if s.pending.is_some_and(|p| p.epoch == s.epoch) {
            return None;
        }
        s.next_ticket += 1;
        let ticket = s.next_ticket;
        s.pending = Some(Pending {
            ticket,
            epoch: s.epoch,
        });
        Some(TransitionGuard {
            session: &self.session,
            ticket,
        })
    }

    fn session_lost(&self, error: &WizardError, message: &str) -> Transition {
        warn!(%error, kind = %error.kind(), "session data unavailable, redirecting to form");
        self.session().move_to(Step::FormEntry);
        self.notify(NoticeLevel::Error, message);
        Transition::Redirected {
            to: Step::FormEntry,
            reason: error.to_string(),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn step(&self) -> Step {
        self.session().step
    }

    /// Passos visitados antes do atual, em ordem.
    pub fn history(&self) -> Vec<Step> {
        self.session().history.clone()
    }

    pub fn draft(&self) -> FormDraft {
        self.session().draft.clone()
    }

    pub fn validation(&self) -> ValidationOutcome {
        self.session().validation.clone()
    }

    pub fn reference_document(&self) -> Option<RawFile> {
        self.session().reference.clone()
    }

    pub fn items_table(&self) -> Option<RawFile> {
        self.session().items.clone()
    }

    pub fn candidates(&self) -> Vec<TableCandidate> {
        self.session().candidates.clone()
    }

    pub fn discovery_error(&self) -> Option<String> {
        self.session().discovery_error.clone()
    }

    /// Ids marcados, na ordem da lista de candidatas.
    pub fn selected_ids(&self) -> Vec<u32> {
        self.session().selected_ids()
    }

    /// Cópia do ledger atual.
    pub fn ledger(&self) -> SessionLedger {
        self.session().ledger.clone()
    }

    /// Acesso direto ao ledger, para restaurar ou inspecionar uma sessão.
    pub fn with_ledger_mut<R>(&self, f: impl FnOnce(&mut SessionLedger) -> R) -> R {
        f(&mut self.session().ledger)
    }

    /// Navega para uma rota, executando o trabalho de entrada do passo.
    pub async fn visit(&self, route: &str) -> Transition {
        match Step::from_route(route) {
            Step::TableSelection => self.enter_table_selection().await,
            Step::Result => self.enter_result(),
            other => {
                self.session().move_to(other);
                Transition::Advanced(other)
            }
        }
    }

    /// Inicia um novo edital: sessão limpa e formulário vazio.
    pub fn start_new(&self) -> Transition {
        let mut s = self.session();
        s.reset();
        s.move_to(Step::FormEntry);
        Transition::Advanced(Step::FormEntry)
    }

    /// Ação terminal: volta ao início e encerra a sessão.
    pub fn go_home(&self) -> Transition {
        let mut s = self.session();
        s.reset();
        s.move_to(Step::Home);
        Transition::Advanced(Step::Home)
    }

    /// Volta um passo, como o botão do cabeçalho de cada tela.
    pub async fn go_back(&self) -> Transition {
        let current = self.step();
        match current {
            Step::Result => self.enter_table_selection().await,
            Step::TableSelection => {
                self.session().move_to(Step::FormEntry);
                Transition::Advanced(Step::FormEntry)
            }
            _ => {
                self.session().move_to(Step::Home);
                Transition::Advanced(Step::Home)
            }
        }
    }

    pub fn set_draft(&self, draft: FormDraft) {
        self.session().draft = draft;
    }

    pub fn update_draft(&self, f: impl FnOnce(&mut FormDraft)) {
        f(&mut self.session().draft);
    }

    /// Recebe o termo de referência escolhido pelo usuário.
    pub fn select_reference_document(&self, file: RawFile) -> Result<(), WizardError> {
        if let Err(e) = FileSlot::ReferenceDocument.check(&file) {
            self.session().reference = None;
            self.notify(
                NoticeLevel::Error,
                &FileSlot::ReferenceDocument.rejection_notice(&file),
            );
            return Err(e);
        }
        let message = format!("Arquivo carregado: {}", file.name);
        debug!(file = %file.name, size_kb = file.size_kb(), "reference document selected");
        self.session().reference = Some(file);
        self.notify(NoticeLevel::Success, &message);
        Ok(())
    }

    pub fn clear_reference_document(&self) {
        self.session().reference = None;
    }

    /// Recebe a tabela de itens e a envia para validação remota.
    ///
    /// O resultado só é aplicado se o arquivo não foi trocado nem removido
    /// enquanto a validação estava em andamento.
    #[instrument(skip_all, fields(file = %file.name))]
    pub async fn select_items_table(&self, file: RawFile) -> Result<ValidationOutcome, WizardError> {
        if let Err(e) = FileSlot::ItemsTable.check(&file) {
            self.clear_items_table();
            self.notify(NoticeLevel::Error, &FileSlot::ItemsTable.rejection_notice(&file));
            return Err(e);
        }
        let part = UploadPart {
            file_name: file.name.clone(),
            mime_type: FileSlot::ItemsTable.mime_type().to_string(),
            bytes: file.bytes.clone(),
        };
        let message = format!("Arquivo carregado: {}", file.name);
        let revision = {
            let mut s = self.session();
            s.items = Some(file);
            s.items_revision += 1;
            s.validation = ValidationOutcome::Pending;
            s.items_revision
        };
        self.notify(NoticeLevel::Success, &message);

        let outcome = self.service.validate_items_table(&part).await;

        {
            let mut s = self.session();
            if s.items_revision != revision {
                debug!("items table changed during validation, result dropped");
                return Ok(outcome);
            }
            s.validation = outcome.clone();
        }

        match &outcome {
            ValidationOutcome::Valid => {
                self.notify(NoticeLevel::Success, "Tabela de itens validada com sucesso.")
            }
            ValidationOutcome::Invalid(failure) => self.notify(
                NoticeLevel::Error,
                &format!("Tabela de itens inválida: {failure}"),
            ),
            ValidationOutcome::Pending => {}
        }
        Ok(outcome)
    }

    pub fn clear_items_table(&self) {
        let mut s = self.session();
        s.items = None;
        s.items_revision += 1;
        s.validation = ValidationOutcome::Pending;
    }

    fn notify_blocked(&self, blockers: &[Precondition]) {
        let missing_input = blockers.iter().any(|b| {
            matches!(
                b,
                Precondition::MissingField(_)
                    | Precondition::MissingReferenceDocument
                    | Precondition::MissingItemsTable
            )
        });
        if missing_input {
            self.notify(NoticeLevel::Error, MISSING_INPUT);
            return;
        }
        for blocker in blockers {
            match blocker {
                Precondition::ItemsTableNotValidated => {
                    self.notify(NoticeLevel::Error, VALIDATION_PENDING)
                }
                Precondition::ItemsTableInvalid(failure) => self.notify(
                    NoticeLevel::Error,
                    &format!("A tabela de itens não passou na validação: {failure}"),
                ),
                Precondition::NoTableSelected => self.notify(NoticeLevel::Error, NO_TABLE_SELECTED),
                other => self.notify(NoticeLevel::Error, &other.to_string()),
            }
        }
    }

    /// FORM_ENTRY → TABLE_SELECTION.
    ///
    /// Grava formulário e arquivos codificados no ledger e entra na seleção
    /// de tabelas, que dispara a identificação remota.
    #[instrument(skip(self))]
    pub async fn submit_form(&self) -> Transition {
        let Some(guard) = self.begin() else {
            debug!("form submission already in flight");
            return Transition::Ignored;
        };

        let token = {
            let mut s = self.session();
            if s.step != Step::FormEntry {
                return Transition::Blocked(vec![Precondition::WrongStep {
                    expected: Step::FormEntry,
                    actual: s.step,
                }]);
            }

            let blockers = s.form_blockers();
            let ready = match (s.draft.complete(), s.reference.as_ref(), s.items.as_ref()) {
                (Ok(form), Some(reference), Some(items)) if blockers.is_empty() => Some((
                    form,
                    ReferenceDocument(codec::encode(reference)),
                    ItemsTable(codec::encode(items)),
                )),
                _ => None,
            };
            let Some((form, reference, items)) = ready else {
                drop(s);
                debug!(?blockers, "form submission blocked");
                self.notify_blocked(&blockers);
                return Transition::Blocked(blockers);
            };

            if let Err(e) = store_submission(&mut s.ledger, &form, reference, items) {
                drop(s);
                let error = WizardError::Storage(e);
                self.notify(NoticeLevel::Error, &error.to_string());
                return Transition::Failed {
                    at: Step::FormEntry,
                    error,
                };
            }

            s.move_to(Step::TableSelection);
            guard.rearm(&mut s);
            s.token()
        };

        self.discover(token).await
    }

    /// Entra em TABLE_SELECTION, sempre refazendo a identificação.
    #[instrument(skip(self))]
    pub async fn enter_table_selection(&self) -> Transition {
        let Some(guard) = self.begin() else {
            debug!("table discovery already in flight");
            return Transition::Ignored;
        };
        let token = {
            let mut s = self.session();
            s.move_to(Step::TableSelection);
            guard.rearm(&mut s);
            s.token()
        };
        self.discover(token).await
    }

    async fn discover(&self, token: StepToken) -> Transition {
        let sources = load_sources(&self.session().ledger);
        let (reference, _) = match sources {
            Ok(parts) => parts,
            Err(e) => return self.session_lost(&e, SESSION_LOST_FORM),
        };

        let result = self.service.discover_tables(&reference).await;

        let mut s = self.session();
        if !s.is_current(token) {
            debug!("stale discovery response dropped");
            return Transition::Discarded;
        }
        match result {
            Ok(tables) => {
                s.candidates = tables.into_iter().map(TableCandidate::from).collect();
                s.discovery_error = None;
                let count = s.candidates.len();
                drop(s);
                info!(count, "tables discovered");
                if count == 0 {
                    self.notify(NoticeLevel::Info, NO_TABLES_FOUND);
                } else {
                    self.notify(NoticeLevel::Success, TABLES_FOUND);
                }
                Transition::Advanced(Step::TableSelection)
            }
            Err(e) => {
                s.candidates.clear();
                s.discovery_error = Some(e.to_string());
                drop(s);
                warn!(error = %e, "table discovery failed");
                self.notify(
                    NoticeLevel::Error,
                    &format!("Não foi possível identificar as tabelas: {e}"),
                );
                Transition::Failed {
                    at: Step::TableSelection,
                    error: WizardError::Discovery(e),
                }
            }
        }
    }

    /// Inverte a seleção de uma candidata. Devolve `false` para ids
    /// desconhecidos ou fora de TABLE_SELECTION.
    pub fn toggle_table(&self, id: u32) -> bool {
        let mut s = self.session();
        if s.step != Step::TableSelection {
            return false;
        }
        match s.candidates.iter_mut().find(|c| c.id == id) {
            Some(candidate) => {
                candidate.selected = !candidate.selected;
                true
            }
            None => false,
        }
    }

    pub fn set_all_selected(&self, selected: bool) {
        let mut s = self.session();
        if s.step != Step::TableSelection {
            return;
        }
        for candidate in &mut s.candidates {
            candidate.selected = selected;
        }
    }

    /// TABLE_SELECTION → RESULT.
    ///
    /// O documento processado é gravado no ledger antes da navegação; se o
    /// usuário sair do passo durante a chamada, a resposta é descartada.
    #[instrument(skip(self))]
    pub async fn submit_selection(&self) -> Transition {
        let Some(_guard) = self.begin() else {
            debug!("substitution already in flight");
            return Transition::Ignored;
        };

        let (token, ids, sources) = {
            let s = self.session();
            if s.step != Step::TableSelection {
                return Transition::Blocked(vec![Precondition::WrongStep {
                    expected: Step::TableSelection,
                    actual: s.step,
                }]);
            }
            (s.token(), s.selected_ids(), load_sources(&s.ledger))
        };
        if ids.is_empty() {
            self.notify(NoticeLevel::Error, NO_TABLE_SELECTED);
            return Transition::Blocked(vec![Precondition::NoTableSelected]);
        }
        let (reference, items) = match sources {
            Ok(parts) => parts,
            Err(e) => return self.session_lost(&e, SESSION_LOST_FORM),
        };

        info!(selected = ?ids, "requesting table substitution");
        let result = self
            .service
            .substitute_tables(&reference, &items, &ids)
            .await;

        let mut s = self.session();
        if !s.is_current(token) {
            debug!("stale substitution response dropped");
            return Transition::Discarded;
        }
        let merged = match result {
            Ok(merged) => merged,
            Err(e) => {
                drop(s);
                warn!(error = %e, "table substitution failed");
                self.notify(
                    NoticeLevel::Error,
                    &format!("Não foi possível gerar o edital: {e}"),
                );
                return Transition::Failed {
                    at: Step::TableSelection,
                    error: WizardError::Substitution(e),
                };
            }
        };

        let name = document_name(merged.file_name.as_deref());
        let transit = codec::encode_bytes(&name, DOCX_MIME, &merged.bytes);
        let processed = ProcessedDocument {
            name,
            payload: transit.payload,
        };
        if let Err(e) = s.ledger.put(&processed) {
            drop(s);
            let error = WizardError::Storage(e);
            self.notify(NoticeLevel::Error, &error.to_string());
            return Transition::Failed {
                at: Step::TableSelection,
                error,
            };
        }
        s.move_to(Step::Result);
        drop(s);
        self.check_result_entry()
    }

    /// Entra em RESULT; sem formulário e documento processado, redireciona.
    pub fn enter_result(&self) -> Transition {
        self.session().move_to(Step::Result);
        self.check_result_entry()
    }

    fn check_result_entry(&self) -> Transition {
        let loaded = load_download(&self.session().ledger);
        match loaded {
            Ok(_) => {
                self.notify(NoticeLevel::Success, EDITAL_READY);
                Transition::Advanced(Step::Result)
            }
            Err(e) => self.session_lost(&e, SESSION_LOST_RESULT),
        }
    }

    /// Resumo do edital para a tela de resultado.
    pub fn summary(&self) -> Option<ResultSummary> {
        let s = self.session();
        let form = s.ledger.get::<EditalForm>().ok()?;
        let document = s.ledger.get::<ProcessedDocument>().ok()?;
        Some(ResultSummary::new(&form, &document))
    }

    /// Decodifica o documento processado para download.
    ///
    /// Falhas de leitura ou decodificação são tratadas como perda de sessão.
    pub fn download(&self) -> Result<Download, WizardError> {
        let loaded = load_download(&self.session().ledger);
        match loaded {
            Ok(download) => {
                self.notify(
                    NoticeLevel::Info,
                    &format!("Iniciando download: {}", download.file_name),
                );
                Ok(download)
            }
            Err(e) => {
                self.session_lost(&e, SESSION_LOST_RESULT);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::NaiveDate;

    use super::*;
    use crate::api::{ApiError, SubstitutedDocument, TableInfo};
    use crate::model::{FormField, Modalidade, ValidationFailure};
    use crate::wizard::notice::NoticeLog;

    struct FakeService {
        validation: Mutex<ValidationOutcome>,
        tables: Vec<TableInfo>,
        failing_discoveries: AtomicUsize,
        fail_substitution: bool,
        merged: Vec<u8>,
        delay: Duration,
        discover_calls: AtomicUsize,
        substitute_calls: AtomicUsize,
        last_selected: Mutex<Vec<u32>>,
        last_reference: Mutex<Option<UploadPart>>,
    }

    impl FakeService {
        fn new() -> Self {
            Self {
                validation: Mutex::new(ValidationOutcome::Valid),
                tables: vec![
                    table(1, "Tabela 1"),
                    table(2, "Tabela 2"),
                    table(3, "Tabela 3"),
                ],
                failing_discoveries: AtomicUsize::new(0),
                fail_substitution: false,
                merged: b"BBBBBBBBBB".to_vec(),
                delay: Duration::ZERO,
                discover_calls: AtomicUsize::new(0),
                substitute_calls: AtomicUsize::new(0),
                last_selected: Mutex::new(Vec::new()),
                last_reference: Mutex::new(None),
            }
        }

        fn with_delay(mut self, millis: u64) -> Self {
            self.delay = Duration::from_millis(millis);
            self
        }

        fn discoveries(&self) -> usize {
            self.discover_calls.load(Ordering::SeqCst)
        }

        fn substitutions(&self) -> usize {
            self.substitute_calls.load(Ordering::SeqCst)
        }
    }

    fn table(id: u32, title: &str) -> TableInfo {
        TableInfo {
            id,
            title: title.into(),
            preview: "...".into(),
        }
    }

    impl DocumentService for FakeService {
        async fn validate_items_table(&self, _items: &UploadPart) -> ValidationOutcome {
            tokio::time::sleep(self.delay).await;
            self.validation.lock().unwrap().clone()
        }

        async fn discover_tables(&self, reference: &UploadPart) -> Result<Vec<TableInfo>, ApiError> {
            self.discover_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_reference.lock().unwrap() = Some(reference.clone());
            tokio::time::sleep(self.delay).await;
            let failing = self.failing_discoveries.load(Ordering::SeqCst);
            if failing > 0 {
                self.failing_discoveries.store(failing - 1, Ordering::SeqCst);
                return Err(ApiError::Status {
                    status: 500,
                    message: "falha ao ler documento".into(),
                });
            }
            Ok(self.tables.clone())
        }

        async fn substitute_tables(
            &self,
            _reference: &UploadPart,
            _items: &UploadPart,
            selected_ids: &[u32],
        ) -> Result<SubstitutedDocument, ApiError> {
            self.substitute_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_selected.lock().unwrap() = selected_ids.to_vec();
            tokio::time::sleep(self.delay).await;
            if self.fail_substitution {
                return Err(ApiError::Status {
                    status: 400,
                    message: "Tabela de itens deve ser um arquivo .xlsx".into(),
                });
            }
            Ok(SubstitutedDocument {
                file_name: Some("termo_referencia_modificado.docx".into()),
                bytes: self.merged.clone(),
            })
        }
    }

    fn draft() -> FormDraft {
        FormDraft {
            nome: "Compra de canetas".into(),
            numero: "010/2025".into(),
            modalidade: Some(Modalidade::PregaoEletronico),
            data: NaiveDate::from_ymd_opt(2025, 6, 1),
            objeto: "Aquisição de material".into(),
        }
    }

    fn reference() -> RawFile {
        RawFile::new("ref.docx", b"AAAAAAAAAA".to_vec())
    }

    fn items() -> RawFile {
        RawFile::new("itens.xlsx", b"planilha".to_vec())
    }

    async fn filled_form(fake: &FakeService) -> WizardNavigator<&FakeService, NoticeLog> {
        let nav = WizardNavigator::new(fake, NoticeLog::new());
        nav.start_new();
        nav.set_draft(draft());
        nav.select_reference_document(reference()).unwrap();
        nav.select_items_table(items()).await.unwrap();
        nav
    }

    async fn at_table_selection(fake: &FakeService) -> WizardNavigator<&FakeService, NoticeLog> {
        let nav = filled_form(fake).await;
        assert!(nav.submit_form().await.is_advanced_to(Step::TableSelection));
        nav
    }

    #[tokio::test]
    async fn happy_path_reaches_result_with_download() {
        let fake = FakeService::new();
        let log = NoticeLog::new();
        let nav = WizardNavigator::new(&fake, log.clone());
        nav.start_new();
        nav.set_draft(draft());
        nav.select_reference_document(reference()).unwrap();
        assert_eq!(
            nav.select_items_table(items()).await.unwrap(),
            ValidationOutcome::Valid
        );

        let t = nav.submit_form().await;
        assert!(t.is_advanced_to(Step::TableSelection));
        let candidates = nav.candidates();
        assert_eq!(candidates.len(), 3);
        assert!(candidates.iter().all(|c| !c.selected));
        assert_eq!(
            fake.last_reference.lock().unwrap().as_ref().unwrap().bytes,
            b"AAAAAAAAAA"
        );

        assert!(nav.toggle_table(2));
        let t = nav.submit_selection().await;
        assert!(t.is_advanced_to(Step::Result));
        assert_eq!(nav.step(), Step::Result);

        let download = nav.download().unwrap();
        assert_eq!(download.bytes, b"BBBBBBBBBB");
        assert_eq!(download.file_name, "termo_referencia_modificado.docx");
        assert_eq!(download.mime_type, DOCX_MIME);

        assert_eq!(
            nav.history(),
            vec![Step::Home, Step::FormEntry, Step::TableSelection]
        );
        assert!(log.messages(NoticeLevel::Success).contains(&TABLES_FOUND.to_string()));
        assert!(log.messages(NoticeLevel::Success).contains(&EDITAL_READY.to_string()));
    }

    #[tokio::test]
    async fn each_missing_form_field_blocks_submission() {
        let fake = FakeService::new();
        let clears: [(FormField, fn(&mut FormDraft)); 5] = [
            (FormField::Nome, |d| d.nome.clear()),
            (FormField::Numero, |d| d.numero = "  ".into()),
            (FormField::Modalidade, |d| d.modalidade = None),
            (FormField::Data, |d| d.data = None),
            (FormField::Objeto, |d| d.objeto.clear()),
        ];
        for (field, clear) in clears {
            let nav = filled_form(&fake).await;
            nav.update_draft(clear);
            match nav.submit_form().await {
                Transition::Blocked(blockers) => {
                    assert_eq!(blockers, vec![Precondition::MissingField(field)]);
                }
                other => panic!("expected blocked for {field}, got {other:?}"),
            }
            assert_eq!(nav.step(), Step::FormEntry);
            assert!(nav.ledger().is_empty());
        }
        assert_eq!(fake.discoveries(), 0);
    }

    #[tokio::test]
    async fn missing_files_block_submission() {
        let fake = FakeService::new();

        let nav = filled_form(&fake).await;
        nav.clear_reference_document();
        assert!(matches!(
            nav.submit_form().await,
            Transition::Blocked(b) if b == vec![Precondition::MissingReferenceDocument]
        ));

        let log = NoticeLog::new();
        let nav = WizardNavigator::new(&fake, log.clone());
        nav.start_new();
        nav.set_draft(draft());
        nav.select_reference_document(reference()).unwrap();
        assert!(matches!(
            nav.submit_form().await,
            Transition::Blocked(b) if b == vec![Precondition::MissingItemsTable]
        ));
        assert_eq!(log.last().unwrap().message, MISSING_INPUT);
    }

    #[tokio::test]
    async fn invalid_items_table_blocks_submission() {
        let fake = FakeService::new();
        let failure = ValidationFailure::Rejected("Colunas obrigatórias faltando: N".into());
        *fake.validation.lock().unwrap() = ValidationOutcome::Invalid(failure.clone());

        let nav = filled_form(&fake).await;
        assert_eq!(nav.validation(), ValidationOutcome::Invalid(failure.clone()));
        match nav.submit_form().await {
            Transition::Blocked(blockers) => {
                assert_eq!(blockers, vec![Precondition::ItemsTableInvalid(failure)]);
            }
            other => panic!("expected blocked, got {other:?}"),
        }
        assert!(!nav.ledger().contains(LedgerKey::EditalFormData));
    }

    #[tokio::test]
    async fn pending_validation_blocks_submission() {
        let fake = FakeService::new().with_delay(20);
        let nav = WizardNavigator::new(&fake, NoticeLog::new());
        nav.start_new();
        nav.set_draft(draft());
        nav.select_reference_document(reference()).unwrap();

        let (outcome, blocked) = tokio::join!(nav.select_items_table(items()), nav.submit_form());
        assert_eq!(outcome.unwrap(), ValidationOutcome::Valid);
        assert!(matches!(
            blocked,
            Transition::Blocked(b) if b == vec![Precondition::ItemsTableNotValidated]
        ));

        nav.clear_items_table();
        assert_eq!(nav.validation(), ValidationOutcome::Pending);
        assert!(matches!(
            nav.submit_form().await,
            Transition::Blocked(b) if b == vec![Precondition::MissingItemsTable]
        ));
    }

    #[tokio::test]
    async fn unreachable_validation_is_reported_distinctly() {
        let fake = FakeService::new();
        *fake.validation.lock().unwrap() =
            ValidationOutcome::Invalid(ValidationFailure::Unreachable("connection refused".into()));
        let log = NoticeLog::new();
        let nav = WizardNavigator::new(&fake, log.clone());
        nav.start_new();
        let outcome = nav.select_items_table(items()).await.unwrap();
        assert!(matches!(
            outcome,
            ValidationOutcome::Invalid(ValidationFailure::Unreachable(_))
        ));
        let errors = log.messages(NoticeLevel::Error);
        assert!(errors[0].contains("não foi possível contatar o serviço de validação"));
    }

    #[tokio::test]
    async fn unsupported_extensions_are_rejected() {
        let fake = FakeService::new();
        let log = NoticeLog::new();
        let nav = WizardNavigator::new(&fake, log.clone());
        nav.start_new();
        assert!(matches!(
            nav.select_reference_document(RawFile::new("ref.pdf", vec![1])),
            Err(WizardError::UnsupportedFile { .. })
        ));
        assert!(nav.reference_document().is_none());
        assert_eq!(
            log.last().unwrap().message,
            "Arquivo não suportado: ref.pdf. Formatos aceitos: DOCX, DOC"
        );
        assert!(nav.select_items_table(RawFile::new("itens.csv", vec![1])).await.is_err());
        assert!(nav.items_table().is_none());
        assert_eq!(
            log.last().unwrap().message,
            "Arquivo não suportado: itens.csv. Formatos aceitos: XLSX, XLS"
        );

        nav.select_reference_document(RawFile::new("REF.DOC", vec![1]))
            .unwrap();
        assert!(nav.reference_document().is_some());
    }

    #[tokio::test]
    async fn rejected_pick_empties_a_filled_slot() {
        let fake = FakeService::new();
        let nav = filled_form(&fake).await;
        assert_eq!(nav.validation(), ValidationOutcome::Valid);

        assert!(nav.select_items_table(RawFile::new("itens.csv", vec![1])).await.is_err());
        assert!(nav.select_reference_document(RawFile::new("ref.pdf", vec![1])).is_err());

        assert!(nav.items_table().is_none());
        assert!(nav.reference_document().is_none());
        assert_eq!(nav.validation(), ValidationOutcome::Pending);
        match nav.submit_form().await {
            Transition::Blocked(blockers) => assert_eq!(
                blockers,
                vec![
                    Precondition::MissingReferenceDocument,
                    Precondition::MissingItemsTable
                ]
            ),
            other => panic!("expected blocked, got {other:?}"),
        }
        assert!(nav.ledger().is_empty());
        assert_eq!(fake.discoveries(), 0);
    }

    #[tokio::test]
    async fn zero_selected_tables_blocks_substitution() {
        let fake = FakeService::new();
        let log = NoticeLog::new();
        let first = at_table_selection(&fake).await;
        let nav = WizardNavigator::with_ledger(&fake, log.clone(), first.ledger());
        assert!(nav.enter_table_selection().await.is_advanced_to(Step::TableSelection));

        assert!(matches!(
            nav.submit_selection().await,
            Transition::Blocked(b) if b == vec![Precondition::NoTableSelected]
        ));
        assert_eq!(nav.step(), Step::TableSelection);
        assert_eq!(log.last().unwrap().message, NO_TABLE_SELECTED);
        assert_eq!(fake.substitutions(), 0);
    }

    #[tokio::test]
    async fn selection_is_sent_in_list_order() {
        let fake = FakeService::new();
        let nav = at_table_selection(&fake).await;
        nav.toggle_table(3);
        nav.toggle_table(1);
        nav.toggle_table(2);
        nav.toggle_table(2);
        assert!(!nav.toggle_table(99));
        assert_eq!(nav.selected_ids(), vec![1, 3]);

        assert!(nav.submit_selection().await.is_advanced_to(Step::Result));
        assert_eq!(*fake.last_selected.lock().unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn select_all_submits_every_table() {
        let fake = FakeService::new();
        let nav = at_table_selection(&fake).await;
        nav.set_all_selected(true);
        assert!(nav.submit_selection().await.is_advanced_to(Step::Result));
        assert_eq!(*fake.last_selected.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn failed_discovery_stays_and_reentry_retries() {
        let fake = FakeService::new();
        fake.failing_discoveries.store(1, Ordering::SeqCst);
        let nav = filled_form(&fake).await;

        match nav.submit_form().await {
            Transition::Failed { at, error } => {
                assert_eq!(at, Step::TableSelection);
                assert!(matches!(error, WizardError::Discovery(_)));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(nav.step(), Step::TableSelection);
        assert!(nav.candidates().is_empty());
        assert!(nav.discovery_error().is_some());

        assert!(nav.enter_table_selection().await.is_advanced_to(Step::TableSelection));
        assert_eq!(fake.discoveries(), 2);
        assert_eq!(nav.candidates().len(), 3);
        assert!(nav.discovery_error().is_none());
    }

    #[tokio::test]
    async fn missing_reference_redirects_to_form() {
        let fake = FakeService::new();
        let log = NoticeLog::new();
        let first = at_table_selection(&fake).await;
        let nav = WizardNavigator::with_ledger(&fake, log.clone(), first.ledger());
        nav.with_ledger_mut(|ledger| ledger.remove(LedgerKey::TermoReferencia));

        let t = nav.visit("/identificar-tabelas").await;
        assert!(matches!(t, Transition::Redirected { to: Step::FormEntry, .. }));
        assert_eq!(nav.step(), Step::FormEntry);
        assert_eq!(log.last().unwrap().message, SESSION_LOST_FORM);
        assert_eq!(fake.discoveries(), 1);
    }

    #[tokio::test]
    async fn malformed_payload_is_session_loss() {
        let fake = FakeService::new();
        let first = at_table_selection(&fake).await;
        let nav = WizardNavigator::with_ledger(&fake, NoticeLog::new(), first.ledger());
        nav.with_ledger_mut(|ledger| {
            ledger.set_raw("termoReferencia", r#"{"name":"ref.docx","content":"@@@"}"#)
        });

        let t = nav.enter_table_selection().await;
        match t {
            Transition::Redirected { to, reason } => {
                assert_eq!(to, Step::FormEntry);
                assert!(reason.contains("decoded"));
            }
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn result_without_document_redirects() {
        let fake = FakeService::new();
        let log = NoticeLog::new();
        let first = at_table_selection(&fake).await;
        let nav = WizardNavigator::with_ledger(&fake, log.clone(), first.ledger());

        let t = nav.visit("/resultado").await;
        assert!(t.is_redirect());
        assert_eq!(nav.step(), Step::FormEntry);
        assert_eq!(log.last().unwrap().message, SESSION_LOST_RESULT);
        assert!(nav.summary().is_none());
    }

    #[tokio::test]
    async fn substitution_failure_stays_on_selection() {
        let mut fake = FakeService::new();
        fake.fail_substitution = true;
        let nav = at_table_selection(&fake).await;
        nav.toggle_table(1);

        assert!(matches!(
            nav.submit_selection().await,
            Transition::Failed {
                at: Step::TableSelection,
                error: WizardError::Substitution(_)
            }
        ));
        assert_eq!(nav.step(), Step::TableSelection);
        assert!(!nav.ledger().contains(LedgerKey::DocumentoProcessado));
        assert_eq!(nav.selected_ids(), vec![1]);
    }

    #[tokio::test]
    async fn duplicate_submit_is_ignored() {
        let fake = FakeService::new().with_delay(30);
        let nav = at_table_selection(&fake).await;
        nav.toggle_table(1);

        let (first, second) = tokio::join!(nav.submit_selection(), nav.submit_selection());
        assert!(first.is_advanced_to(Step::Result));
        assert!(matches!(second, Transition::Ignored));
        assert_eq!(fake.substitutions(), 1);
    }

    #[tokio::test]
    async fn duplicate_form_submit_is_ignored() {
        let fake = FakeService::new().with_delay(30);
        let nav = filled_form(&fake).await;

        let (first, second) = tokio::join!(nav.submit_form(), nav.submit_form());
        assert!(first.is_advanced_to(Step::TableSelection));
        assert!(matches!(second, Transition::Ignored));
        assert_eq!(fake.discoveries(), 1);
    }

    #[tokio::test]
    async fn reentry_during_form_submit_is_ignored() {
        let fake = FakeService::new().with_delay(30);
        let nav = filled_form(&fake).await;

        let (submitted, reentered) =
            tokio::join!(nav.submit_form(), nav.enter_table_selection());
        assert!(submitted.is_advanced_to(Step::TableSelection));
        assert!(matches!(reentered, Transition::Ignored));
        assert_eq!(fake.discoveries(), 1);
        assert_eq!(nav.candidates().len(), 3);
    }

    #[tokio::test]
    async fn navigating_away_discards_pending_substitution() {
        let fake = FakeService::new().with_delay(50);
        let nav = at_table_selection(&fake).await;
        nav.toggle_table(1);

        let (outcome, back) = tokio::join!(nav.submit_selection(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            nav.go_back().await
        });
        assert!(back.is_advanced_to(Step::FormEntry));
        assert!(matches!(outcome, Transition::Discarded));
        assert_eq!(nav.step(), Step::FormEntry);
        assert!(!nav.ledger().contains(LedgerKey::DocumentoProcessado));
    }

    #[tokio::test]
    async fn go_home_clears_the_session() {
        let fake = FakeService::new();
        let nav = at_table_selection(&fake).await;
        nav.toggle_table(1);
        nav.submit_selection().await;
        let before = nav.ledger().id();

        assert!(nav.go_home().is_advanced_to(Step::Home));
        assert_eq!(nav.history(), vec![Step::Result]);
        assert!(nav.ledger().is_empty());
        assert_ne!(nav.ledger().id(), before);
        assert!(nav.reference_document().is_none());
        assert_eq!(nav.draft(), FormDraft::default());
    }

    #[tokio::test]
    async fn result_summary_and_back_navigation() {
        let fake = FakeService::new();
        let nav = at_table_selection(&fake).await;
        nav.toggle_table(1);
        nav.submit_selection().await;

        let summary = nav.summary().unwrap();
        assert_eq!(summary.modalidade, "Pregão Eletrônico");
        assert_eq!(summary.data, "01/06/2025");

        assert!(nav.go_back().await.is_advanced_to(Step::TableSelection));
        assert_eq!(fake.discoveries(), 2);
        assert!(nav.selected_ids().is_empty());
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let fake = FakeService::new();
        let nav = WizardNavigator::new(&fake, NoticeLog::new());
        assert!(nav.visit("/visualizar-editais").await.is_advanced_to(Step::NotFound));
        assert!(nav.visit("/criar-edital").await.is_advanced_to(Step::FormEntry));
    }

    #[tokio::test]
    async fn resubmitting_form_drops_previous_result() {
        let fake = FakeService::new();
        let nav = at_table_selection(&fake).await;
        nav.toggle_table(1);
        nav.submit_selection().await;
        assert!(nav.ledger().contains(LedgerKey::DocumentoProcessado));

        nav.go_back().await;
        nav.go_back().await;
        assert_eq!(nav.step(), Step::FormEntry);
        assert!(nav.submit_form().await.is_advanced_to(Step::TableSelection));
        assert!(!nav.ledger().contains(LedgerKey::DocumentoProcessado));
    }

    #[test]
    fn file_slot_acceptance() {
        assert!(FileSlot::ItemsTable.accepts(&RawFile::new("a.XLS", vec![])));
        assert!(!FileSlot::ItemsTable.accepts(&RawFile::new("a.docx", vec![])));
        assert_eq!(FileSlot::ReferenceDocument.mime_type(), DOCX_MIME);
    }
}
