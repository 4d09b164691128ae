//! Definição de tipos/structs do modelo de dados da linha de produção.
//!
//! Leituras chegam do simulador, alarmes são gerados pelo motor de
//! alarmes e comandos de manutenção voltam para o simulador.

use serde::{Deserialize, Serialize};
use std::fmt;

// ──────────────────────────────────────────────
// Status
// ──────────────────────────────────────────────

/// Status de um sensor em relação aos seus limites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SensorStatus {
    #[default]
    Ok,
    Low,
    High,
}

impl SensorStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SensorStatus::Ok => "OK",
            SensorStatus::Low => "LOW",
            SensorStatus::High => "HIGH",
        }
    }

    /// `true` para LOW e HIGH.
    pub fn is_alarm(self) -> bool {
        !matches!(self, SensorStatus::Ok)
    }

    /// Interpreta o status vindo do fio (sem diferenciar maiúsculas).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OK" => Some(SensorStatus::Ok),
            "LOW" => Some(SensorStatus::Low),
            "HIGH" => Some(SensorStatus::High),
            _ => None,
        }
    }
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────────────────────────────────
// Leituras e limites
// ──────────────────────────────────────────────

/// Uma leitura de sensor recebida do simulador. Imutável após o parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Nome do sensor (ex: "Temp_C")
    pub sensor: String,
    pub value: f64,
    /// Timestamp ISO-8601 com milissegundos, como enviado pelo par
    #[serde(rename = "ts")]
    pub timestamp: String,
    /// Status informado pelo simulador (não é usado para alarmes)
    pub status: SensorStatus,
}

/// Limites de operação de um sensor. Invariante: `low < high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorLimits {
    pub low: f64,
    pub high: f64,
}

impl SensorLimits {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn is_valid(&self) -> bool {
        self.low.is_finite() && self.high.is_finite() && self.low < self.high
    }
}

/// Estado vivo de um sensor configurado.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorState {
    pub name: String,
    /// Última leitura processada (`None` até a primeira chegar)
    pub latest: Option<Reading>,
    pub limits: SensorLimits,
    /// Status avaliado pelo motor de alarmes
    pub status: SensorStatus,
}

impl SensorState {
    pub fn new(name: impl Into<String>, limits: SensorLimits) -> Self {
        Self {
            name: name.into(),
            latest: None,
            limits,
            status: SensorStatus::Ok,
        }
    }
}

// ──────────────────────────────────────────────
// Alarmes
// ──────────────────────────────────────────────

/// Tipo de violação de limite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmKind {
    LowLimit,
    HighLimit,
}

impl AlarmKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlarmKind::LowLimit => "LOW_LIMIT",
            AlarmKind::HighLimit => "HIGH_LIMIT",
        }
    }
}

impl fmt::Display for AlarmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entrada do log de alarmes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmEntry {
    pub time: String,
    pub sensor: String,
    pub value: f64,
    #[serde(rename = "type")]
    pub kind: AlarmKind,
}

/// Status global do sistema: `ALARM` se algum sensor está fora dos limites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SystemStatus {
    #[default]
    Ok,
    Alarm,
}

impl SystemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SystemStatus::Ok => "OK",
            SystemStatus::Alarm => "ALARM",
        }
    }
}

/// Estado da conexão com o simulador.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl LinkState {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkState::Disconnected => "DISCONNECTED",
            LinkState::Connecting => "CONNECTING",
            LinkState::Connected => "CONNECTED",
        }
    }
}

// ──────────────────────────────────────────────
// Comandos de manutenção
// ──────────────────────────────────────────────

/// Comandos aceitos pelo simulador.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    RestartSim,
    ClearAlarms,
    SnapshotDetail,
}

impl CommandKind {
    pub const ALL: [CommandKind; 3] = [
        CommandKind::RestartSim,
        CommandKind::ClearAlarms,
        CommandKind::SnapshotDetail,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::RestartSim => "RESTART_SIM",
            CommandKind::ClearAlarms => "CLEAR_ALARMS",
            CommandKind::SnapshotDetail => "SNAPSHOT_DETAIL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == raw.trim())
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comando de operador. Transitório, nunca armazenado.
#[derive(Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub auth: String,
}

impl Command {
    pub fn new(kind: CommandKind, auth: impl Into<String>) -> Self {
        Self {
            kind,
            auth: auth.into(),
        }
    }
}

// A senha nunca aparece em logs.
impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("kind", &self.kind)
            .field("auth", &"<redacted>")
            .finish()
    }
}

/// Confirmação enviada pelo simulador em resposta a um comando.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotAck {
    pub command: CommandKind,
    pub ok: bool,
    /// Conteúdo livre (ex: detalhe por sensor no SNAPSHOT_DETAIL)
    pub detail: Option<serde_json::Value>,
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(SensorStatus::parse("ok"), Some(SensorStatus::Ok));
        assert_eq!(SensorStatus::parse(" High "), Some(SensorStatus::High));
        assert_eq!(SensorStatus::parse("FAULT"), None);
    }

    #[test]
    fn limits_validity() {
        assert!(SensorLimits::new(0.0, 10.0).is_valid());
        assert!(!SensorLimits::new(10.0, 10.0).is_valid());
        assert!(!SensorLimits::new(f64::NAN, 10.0).is_valid());
    }

    #[test]
    fn command_kind_wire_names() {
        for kind in CommandKind::ALL {
            assert_eq!(CommandKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(CommandKind::parse("SELF_DESTRUCT"), None);
    }

    #[test]
    fn command_debug_hides_secret() {
        let cmd = Command::new(CommandKind::RestartSim, "hunter2");
        let dbg = format!("{cmd:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("RestartSim"));
    }

    #[test]
    fn alarm_entry_serializes_type_field() {
        let entry = AlarmEntry {
            time: "t".into(),
            sensor: "Temp_C".into(),
            value: 99.0,
            kind: AlarmKind::HighLimit,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "HIGH_LIMIT");
        assert_eq!(json["sensor"], "Temp_C");
    }
}
