mod cli;
mod ui;

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Command, CriarArgs, LogFormat};
use gestor_editais::api::{DocumentService, EditaisClient};
use gestor_editais::codec::{RawFile, UploadPart};
use gestor_editais::config::EditaisConfig;
use gestor_editais::model::{FormDraft, TableCandidate, ValidationOutcome};
use gestor_editais::wizard::{
    FileSlot, NoticeLevel, Notifier, Step, Transition, WizardNavigator,
};
use tracing::info;
use ui::{TableChoice, TerminalUi};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let mut config = EditaisConfig::load()?;
    if let Some(url) = cli.api_url {
        config.api_url = url;
    }
    info!(api_url = %config.api_url, "configuration loaded");

    let client = EditaisClient::new(&config).context("failed to build HTTP client")?;
    let ui = TerminalUi::new();

    match cli.command {
        Command::Criar(args) => criar(client, &ui, &config, args).await,
        Command::Validar { tabela } => validar(&client, &ui, &tabela).await,
        Command::Identificar { termo } => identificar(&client, &ui, &termo).await,
    }
}

fn init_tracing(verbose: bool, format: LogFormat) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = if verbose {
        "gestor_editais=debug,editais=debug"
    } else {
        "gestor_editais=warn,editais=info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

fn read_file(path: &Path) -> Result<RawFile> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("{} is not a file path", path.display()))?;
    Ok(RawFile::new(name, bytes))
}

// Converte o resultado de uma transição em erro quando o passo esperado não
// foi alcançado.
fn expect_step(transition: Transition, step: Step) -> Result<()> {
    match transition {
        Transition::Advanced(reached) if reached == step => Ok(()),
        Transition::Blocked(blockers) => {
            let reasons = blockers
                .iter()
                .map(|b| b.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            bail!("transition to {step} blocked: {reasons}")
        }
        Transition::Failed { at, error } => {
            tracing::warn!(step = %at, kind = %error.kind(), "wizard step failed");
            Err(error.into())
        }
        Transition::Redirected { reason, .. } => bail!("session lost: {reason}"),
        other => bail!("unexpected transition while moving to {step}: {other:?}"),
    }
}

async fn criar(
    client: EditaisClient,
    ui: &TerminalUi,
    config: &EditaisConfig,
    args: CriarArgs,
) -> Result<()> {
    let nav = WizardNavigator::new(client, ui);
    nav.start_new();
    nav.set_draft(FormDraft {
        nome: args.nome,
        numero: args.numero,
        modalidade: Some(args.modalidade),
        data: Some(args.data),
        objeto: args.objeto,
    });

    nav.select_reference_document(read_file(&args.termo)?)?;
    let items = read_file(&args.tabela)?;
    {
        let _activity = ui.activity("Validando tabela de itens...");
        nav.select_items_table(items).await?;
    }

    let transition = {
        let _activity = ui.activity("Identificando tabelas...");
        nav.submit_form().await
    };
    expect_step(transition, Step::TableSelection)?;

    let candidates = nav.candidates();
    if candidates.is_empty() {
        bail!("no tables found in the reference document");
    }
    if args.tabelas.is_empty() {
        ui.print_candidates(&candidates);
        match ui::prompt_tables(ui, &candidates)? {
            TableChoice::All => nav.set_all_selected(true),
            TableChoice::Ids(ids) => {
                for id in ids {
                    nav.toggle_table(id);
                }
            }
        }
    } else {
        for id in &args.tabelas {
            if nav.selected_ids().contains(id) {
                continue;
            }
            if !nav.toggle_table(*id) {
                ui.notify(
                    NoticeLevel::Error,
                    &format!("Tabela {id} não encontrada; ignorada."),
                );
            }
        }
    }

    let transition = {
        let _activity = ui.activity("Gerando edital...");
        nav.submit_selection().await
    };
    expect_step(transition, Step::Result)?;

    if let Some(summary) = nav.summary() {
        ui.print_summary(&summary);
    }
    let download = nav.download()?;
    let dir = args.saida.unwrap_or_else(|| config.output_dir.clone());
    let path = download.save_to(&dir)?;
    ui.notify(
        NoticeLevel::Success,
        &format!("Documento salvo em {}", path.display()),
    );

    nav.go_home();
    Ok(())
}

async fn validar(client: &EditaisClient, ui: &TerminalUi, path: &Path) -> Result<()> {
    let file = read_file(path)?;
    if !FileSlot::ItemsTable.accepts(&file) {
        bail!("{} is not an .xlsx/.xls spreadsheet", file.name);
    }
    let part = UploadPart {
        file_name: file.name,
        mime_type: FileSlot::ItemsTable.mime_type().to_string(),
        bytes: file.bytes,
    };
    let outcome = {
        let _activity = ui.activity("Validando tabela de itens...");
        client.validate_items_table(&part).await
    };
    match outcome {
        ValidationOutcome::Invalid(failure) => bail!("{failure}"),
        _ => {
            ui.notify(NoticeLevel::Success, "Tabela de itens validada com sucesso.");
            Ok(())
        }
    }
}

async fn identificar(client: &EditaisClient, ui: &TerminalUi, path: &Path) -> Result<()> {
    let file = read_file(path)?;
    if !FileSlot::ReferenceDocument.accepts(&file) {
        bail!("{} is not a .docx/.doc document", file.name);
    }
    let part = UploadPart {
        file_name: file.name,
        mime_type: FileSlot::ReferenceDocument.mime_type().to_string(),
        bytes: file.bytes,
    };
    let tables = {
        let _activity = ui.activity("Identificando tabelas...");
        client.discover_tables(&part).await?
    };
    let candidates: Vec<TableCandidate> = tables.into_iter().map(TableCandidate::from).collect();
    if candidates.is_empty() {
        ui.notify(
            NoticeLevel::Info,
            "Nenhuma tabela encontrada no termo de referência.",
        );
    } else {
        ui.print_candidates(&candidates);
    }
    Ok(())
}
