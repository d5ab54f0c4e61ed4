//! Gestor de editais: assistente que combina o termo de referência com a
//! tabela de itens e gera o documento final do edital.

pub mod api;
pub mod codec;
pub mod config;
pub mod error;
pub mod ledger;
pub mod model;
pub mod wizard;
