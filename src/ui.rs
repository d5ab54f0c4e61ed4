//! Interface de terminal do assistente: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. [`TerminalUi`] é o [`Notifier`] do binário.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use console::Style;
use gestor_editais::model::{ResultSummary, TableCandidate};
use gestor_editais::wizard::{NoticeLevel, Notifier};
use indicatif::{ProgressBar, ProgressStyle};

const PREVIEW_WIDTH: usize = 72;

/// Saída do assistente no terminal.
///
/// Avisos emitidos enquanto um spinner está ativo são impressos acima dele.
pub struct TerminalUi {
    green: Style,
    red: Style,
    cyan: Style,
    dim: Style,
    spinner: Mutex<Option<ProgressBar>>,
}

impl Default for TerminalUi {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalUi {
    pub fn new() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            cyan: Style::new().cyan(),
            dim: Style::new().dim(),
            spinner: Mutex::new(None),
        }
    }

    /// Mostra um spinner até o [`Activity`] retornado ser descartado.
    pub fn activity(&self, message: &str) -> Activity<'_> {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        *self.spinner.lock().unwrap_or_else(PoisonError::into_inner) = Some(pb);
        Activity { ui: self }
    }

    fn print(&self, line: String) {
        let spinner = self.spinner.lock().unwrap_or_else(PoisonError::into_inner);
        match spinner.as_ref() {
            Some(pb) => pb.println(line),
            None => eprintln!("{line}"),
        }
    }

    /// Lista as tabelas candidatas com id, título e início da prévia.
    pub fn print_candidates(&self, candidates: &[TableCandidate]) {
        println!();
        for candidate in candidates {
            let mark = if candidate.selected { "[x]" } else { "[ ]" };
            println!(
                "  {mark} {} {}",
                self.cyan.apply_to(format!("#{}", candidate.id)),
                candidate.title
            );
            let preview = preview_line(&candidate.preview);
            if !preview.is_empty() {
                println!("        {}", self.dim.apply_to(preview));
            }
        }
        println!();
    }

    pub fn print_summary(&self, summary: &ResultSummary) {
        println!();
        println!("{}", self.green.apply_to("─── Edital gerado ───"));
        println!("  Nome:       {}", summary.nome);
        println!("  Número:     {}", summary.numero);
        println!("  Modalidade: {}", summary.modalidade);
        println!("  Data:       {}", summary.data);
        println!("  Documento:  {}", summary.document_name);
    }
}

impl Notifier for TerminalUi {
    fn notify(&self, level: NoticeLevel, message: &str) {
        let line = match level {
            NoticeLevel::Success => format!("  {} {message}", self.green.apply_to("✓")),
            NoticeLevel::Error => format!("  {} {message}", self.red.apply_to("✗")),
            NoticeLevel::Info => format!("  {} {message}", self.cyan.apply_to("•")),
        };
        self.print(line);
    }
}

/// Spinner ativo; limpa o terminal ao ser descartado.
pub struct Activity<'a> {
    ui: &'a TerminalUi,
}

impl Drop for Activity<'_> {
    fn drop(&mut self) {
        let taken = self
            .ui
            .spinner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pb) = taken {
            pb.finish_and_clear();
        }
    }
}

/// Escolha feita no prompt interativo de tabelas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableChoice {
    All,
    Ids(Vec<u32>),
}

/// Interpreta a resposta do prompt: `todas`, ou ids separados por vírgula
/// ou espaço. Ids que não estão na lista são recusados.
pub fn parse_table_choice(input: &str, candidates: &[TableCandidate]) -> Result<TableChoice, String> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("todas") || input == "*" {
        return Ok(TableChoice::All);
    }
    let mut ids = Vec::new();
    for token in input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        let id: u32 = token
            .parse()
            .map_err(|_| format!("id inválido: {token}"))?;
        if !candidates.iter().any(|c| c.id == id) {
            return Err(format!("tabela {id} não está na lista"));
        }
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    if ids.is_empty() {
        return Err("nenhuma tabela informada".to_string());
    }
    Ok(TableChoice::Ids(ids))
}

/// Pergunta ao usuário quais tabelas substituir, repetindo até uma resposta válida.
pub fn prompt_tables(ui: &TerminalUi, candidates: &[TableCandidate]) -> std::io::Result<TableChoice> {
    loop {
        eprint!("Tabelas a substituir (ids separados por vírgula, ou 'todas'): ");
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line)? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "entrada encerrada antes da escolha das tabelas",
            ));
        }
        match parse_table_choice(&line, candidates) {
            Ok(choice) => return Ok(choice),
            Err(reason) => ui.notify(NoticeLevel::Error, &reason),
        }
    }
}

fn preview_line(preview: &str) -> String {
    let flat = preview.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_WIDTH {
        return flat;
    }
    let cut: String = flat.chars().take(PREVIEW_WIDTH).collect();
    format!("{cut}…")
}
