//! # Linha Core
//!
//! Crate compartilhada do monitor da linha de produção: modelo de dados,
//! protocolo JSON por linha, motor de alarmes, store de telemetria
//! compartilhado e configuração TOML.
//!
//! ## Módulos
//! - [`types`] – Leituras, limites, alarmes e comandos
//! - [`protocol`] – Encode/decode do JSON delimitado por `\n`
//! - [`alarms`] – Avaliação de limites com disparo por borda
//! - [`store`] – Estado compartilhado (um escritor, N leitores)
//! - [`query`] – Views serializáveis para o serviço de consulta
//! - [`config`] – Configuração unificada via TOML
//! - [`auth`] – Comparação de senha em tempo constante

pub mod types;
pub mod protocol;
pub mod alarms;
pub mod store;
pub mod query;
pub mod config;
pub mod auth;

// Re-exports convenientes
pub use types::{AlarmEntry, Command, CommandKind, Reading, SensorLimits, SensorStatus};
pub use protocol::{DecodeError, decode_reading, encode_command};
pub use store::{StoreSnapshot, TelemetryStore};
pub use config::AppConfig;
