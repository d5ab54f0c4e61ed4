use std::fmt;

use crate::error::WizardError;
use crate::model::{FormField, ValidationFailure};

/// The screens of the edital wizard.
///
/// The happy path flows: HOME → FORM_ENTRY → TABLE_SELECTION → RESULT → HOME
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Home,
    FormEntry,
    TableSelection,
    Result,
    NotFound,
}

impl Step {
    /// Route path associated with the step.
    pub fn route(&self) -> &'static str {
        match self {
            Step::Home => "/",
            Step::FormEntry => "/criar-edital",
            Step::TableSelection => "/identificar-tabelas",
            Step::Result => "/resultado",
            Step::NotFound => "/404",
        }
    }

    /// Resolves a route path. Anything unknown (including the listing
    /// screen, which this crate does not provide) is `NotFound`.
    pub fn from_route(path: &str) -> Step {
        let trimmed = path.trim();
        let normalized = if trimmed.len() > 1 {
            trimmed.trim_end_matches('/')
        } else {
            trimmed
        };
        match normalized {
            "/" | "" => Step::Home,
            "/criar-edital" => Step::FormEntry,
            "/identificar-tabelas" => Step::TableSelection,
            "/resultado" => Step::Result,
            _ => Step::NotFound,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Home => write!(f, "HOME"),
            Step::FormEntry => write!(f, "FORM_ENTRY"),
            Step::TableSelection => write!(f, "TABLE_SELECTION"),
            Step::Result => write!(f, "RESULT"),
            Step::NotFound => write!(f, "NOT_FOUND"),
        }
    }
}

/// A gate that kept a transition from happening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    MissingField(FormField),
    MissingReferenceDocument,
    MissingItemsTable,
    /// The items table was picked but its validation has not finished.
    ItemsTableNotValidated,
    ItemsTableInvalid(ValidationFailure),
    NoTableSelected,
    WrongStep { expected: Step, actual: Step },
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precondition::MissingField(field) => write!(f, "missing field `{field}`"),
            Precondition::MissingReferenceDocument => write!(f, "missing reference document"),
            Precondition::MissingItemsTable => write!(f, "missing items table"),
            Precondition::ItemsTableNotValidated => write!(f, "items table not validated yet"),
            Precondition::ItemsTableInvalid(reason) => write!(f, "items table invalid: {reason}"),
            Precondition::NoTableSelected => write!(f, "no table selected"),
            Precondition::WrongStep { expected, actual } => {
                write!(f, "expected step {expected}, currently at {actual}")
            }
        }
    }
}

/// The result of attempting a guarded transition or a step entry.
#[derive(Debug)]
pub enum Transition {
    /// The wizard is now at the given step with its entry work done.
    Advanced(Step),
    /// One or more preconditions failed; nothing changed.
    Blocked(Vec<Precondition>),
    /// Required session data was missing or unreadable.
    Redirected { to: Step, reason: String },
    /// A remote call or local processing failed; the wizard stays at `at`.
    Failed { at: Step, error: WizardError },
    /// Another transition is still pending for the current step.
    Ignored,
    /// The user navigated away before the pending work finished; its result
    /// was dropped.
    Discarded,
}

impl Transition {
    pub fn is_advanced_to(&self, step: Step) -> bool {
        matches!(self, Transition::Advanced(s) if *s == step)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self, Transition::Redirected { .. })
    }
}
