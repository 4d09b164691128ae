//! Display de console – consome a fila de notificações e redesenha a
//! tabela de sensores a partir de `snapshot()` no próprio ritmo.

use crate::notify::ChangeNotice;
use crossbeam_channel::Receiver;
use linha_core::store::{StoreSnapshot, TelemetryStore};
use linha_core::types::SystemStatus;
use std::fmt::Write as _;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

pub struct ConsoleDisplay {
    store: Arc<TelemetryStore>,
    rx: Receiver<ChangeNotice>,
    interval: Duration,
    dropped: Arc<AtomicU64>,
}

impl ConsoleDisplay {
    pub fn new(
        store: Arc<TelemetryStore>,
        rx: Receiver<ChangeNotice>,
        interval: Duration,
        dropped: Arc<AtomicU64>,
    ) -> Self {
        Self {
            store,
            rx,
            interval,
            dropped,
        }
    }

    /// Loop de atualização até `running` ficar falso.
    pub fn run(&self, running: &AtomicBool) {
        let mut first = true;
        while running.load(Ordering::SeqCst) {
            if self.poll() || first {
                first = false;
                let frame = render(&self.store.snapshot(), self.dropped.load(Ordering::Relaxed));
                let mut out = std::io::stdout().lock();
                let _ = out.write_all(frame.as_bytes());
                let _ = out.flush();
            }
            std::thread::sleep(self.interval);
        }
        debug!("Display encerrado");
    }

    /// Drena as notificações pendentes; `true` se alguma chegou.
    fn poll(&self) -> bool {
        self.rx.try_iter().count() > 0
    }
}

/// Renderiza o snapshot como tabela de texto.
pub fn render(snap: &StoreSnapshot, dropped: u64) -> String {
    let mut out = String::new();
    let status = match snap.system_status {
        SystemStatus::Ok => "OK",
        SystemStatus::Alarm => "ALARM ⚠",
    };
    let _ = writeln!(
        out,
        "── Sistema: {status} | Link: {} | Alarmes: {} | Notificações descartadas: {dropped}",
        snap.link.as_str(),
        snap.alarms_count
    );
    let _ = writeln!(
        out,
        "{:<16} {:>12} {:<25} {:<6} {:>10} {:>10}",
        "Sensor", "Valor", "Timestamp", "Status", "Low", "High"
    );

    for s in &snap.sensors {
        let (value, ts) = match &s.latest {
            Some(r) => (format!("{:.3}", r.value), r.timestamp.as_str()),
            None => ("-".to_string(), "-"),
        };
        let marker = if s.status.is_alarm() { " ◀" } else { "" };
        let _ = writeln!(
            out,
            "{:<16} {:>12} {:<25} {:<6} {:>10} {:>10}{marker}",
            s.name,
            value,
            ts,
            s.status.as_str(),
            s.limits.low,
            s.limits.high
        );
    }

    if let Some(ack) = &snap.last_response {
        let _ = writeln!(out, "Última resposta: {} (ok={})", ack.command, ack.ok);
    }
    out
}
