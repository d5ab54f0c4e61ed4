//! Assistente de criação de editais em três passos.

pub mod download;
pub mod navigator;
pub mod notice;
pub mod step;

pub use download::{DEFAULT_DOCUMENT_NAME, Download, document_name};
pub use navigator::{FileSlot, StepToken, WizardNavigator};
pub use notice::{Notice, NoticeLevel, NoticeLog, Notifier};
pub use step::{Precondition, Step, Transition};
