//! Console do operador (stdin).
//!
//! ```text
//! restart <senha>    → RESTART_SIM
//! clear <senha>      → CLEAR_ALARMS
//! snapshot <senha>   → SNAPSHOT_DETAIL
//! alarms [n]         → log de alarmes em JSON
//! status             → sensores em JSON
//! help | quit
//! ```

use crate::commands::CommandDispatcher;
use linha_core::query::{AlarmsView, SensorsView};
use linha_core::store::TelemetryStore;
use linha_core::types::CommandKind;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

const HELP: &str = "Comandos: restart <senha> | clear <senha> | snapshot <senha> | alarms [n] | status | quit";

/// Linha do console interpretada.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Submit(CommandKind, String),
    Alarms(Option<usize>),
    Status,
    Help,
    Quit,
}

/// Interpreta uma linha; `Err` com mensagem para o operador.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(None);
    };

    let submit = |kind: CommandKind, secret: Option<&str>| match secret {
        Some(s) => Ok(Some(ConsoleCommand::Submit(kind, s.to_string()))),
        None => Err(format!("Uso: {verb} <senha>")),
    };

    match verb.to_ascii_lowercase().as_str() {
        "restart" => submit(CommandKind::RestartSim, parts.next()),
        "clear" => submit(CommandKind::ClearAlarms, parts.next()),
        "snapshot" => submit(CommandKind::SnapshotDetail, parts.next()),
        "alarms" => match parts.next() {
            None => Ok(Some(ConsoleCommand::Alarms(None))),
            Some(n) => n
                .parse()
                .map(|n| Some(ConsoleCommand::Alarms(Some(n))))
                .map_err(|_| format!("Número inválido: {n}")),
        },
        "status" => Ok(Some(ConsoleCommand::Status)),
        "help" | "?" => Ok(Some(ConsoleCommand::Help)),
        "quit" | "exit" => Ok(Some(ConsoleCommand::Quit)),
        other => Err(format!("Comando desconhecido: {other}. {HELP}")),
    }
}

pub struct Console {
    dispatcher: Arc<CommandDispatcher>,
    store: Arc<TelemetryStore>,
    alarm_view_limit: usize,
}

impl Console {
    pub fn new(
        dispatcher: Arc<CommandDispatcher>,
        store: Arc<TelemetryStore>,
        alarm_view_limit: usize,
    ) -> Self {
        Self {
            dispatcher,
            store,
            alarm_view_limit,
        }
    }

    /// Lê comandos até `quit`/EOF e então derruba `running`.
    pub fn run(&self, input: impl BufRead, mut output: impl Write, running: &AtomicBool) {
        for line in input.lines() {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    warn!("Erro ao ler stdin: {e}");
                    break;
                }
            };

            let reply = match parse_line(&line) {
                Ok(Some(ConsoleCommand::Quit)) => break,
                Ok(Some(cmd)) => self.execute(cmd),
                Ok(None) => continue,
                Err(msg) => msg,
            };
            let _ = writeln!(output, "{reply}");
            let _ = output.flush();
        }

        info!("Console encerrado, sinalizando shutdown");
        running.store(false, Ordering::SeqCst);
    }

    /// Executa um comando e devolve o texto para o operador.
    pub fn execute(&self, cmd: ConsoleCommand) -> String {
        match cmd {
            ConsoleCommand::Submit(kind, secret) => match self.dispatcher.submit(kind, &secret) {
                Ok(ack) if ack.forwarded => format!("✔ {} enviado", ack.command),
                Ok(ack) => format!("✔ {} aplicado localmente (simulador offline)", ack.command),
                Err(e) => format!("✘ {kind}: {e}"),
            },
            ConsoleCommand::Alarms(limit) => {
                let view = AlarmsView::from_store(&self.store, limit.unwrap_or(self.alarm_view_limit));
                view.to_json().unwrap_or_else(|e| format!("✘ {e}"))
            }
            ConsoleCommand::Status => SensorsView::from_store(&self.store)
                .to_json()
                .unwrap_or_else(|e| format!("✘ {e}")),
            ConsoleCommand::Help | ConsoleCommand::Quit => HELP.to_string(),
        }
    }
}
