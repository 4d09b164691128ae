//! Thread de ingestão: conecta ao simulador via TCP, lê linhas JSON e
//! alimenta o store.
//!
//! ```text
//! Disconnected → Connecting → Connected ─(erro/EOF)→ Disconnected
//!                    │
//!                    └─(falha)→ backoff → Connecting
//! ```
//!
//! - Linha inválida: log + descarta, a conexão continua.
//! - Erro de socket: volta para `Disconnected` e reconecta com backoff.
//! - Shutdown: o flag é checado a cada timeout de leitura (também entre as
//!   tentativas de conexão) e o socket é fechado na hora; nenhuma leitura é
//!   processada depois disso.

use crate::notify::{NoticeKind, NotifySender};
use linha_core::config::AppConfig;
use linha_core::protocol::{FRAME_DELIMITER, Inbound, MAX_LINE_BYTES, decode_inbound};
use linha_core::store::TelemetryStore;
use linha_core::types::{LinkState, Reading};
use parking_lot::Mutex;
use std::io::{self, BufRead, BufReader, Read};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Granularidade das esperas de backoff (checagem do shutdown).
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Parâmetros da ingestão.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub addr: String,
    pub read_timeout: Duration,
    pub connect_timeout: Duration,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

impl From<&AppConfig> for IngestSettings {
    fn from(config: &AppConfig) -> Self {
        let m = &config.monitor;
        Self {
            addr: config.simulator_addr(),
            read_timeout: m.read_timeout(),
            connect_timeout: m.connect_timeout(),
            reconnect_initial: m.reconnect_initial(),
            reconnect_max: m.reconnect_max(),
        }
    }
}

// ──────────────────────────────────────────────
// Link compartilhado com o despachante de comandos
// ──────────────────────────────────────────────

/// Lado de escrita da conexão ativa. A thread de ingestão instala e remove;
/// o despachante só pega um clone para escrever.
#[derive(Clone, Default)]
pub struct LinkSlot {
    stream: Arc<Mutex<Option<TcpStream>>>,
}

impl LinkSlot {
    pub(crate) fn install(&self, stream: &TcpStream) -> io::Result<()> {
        let writer = stream.try_clone()?;
        *self.stream.lock() = Some(writer);
        Ok(())
    }

    pub(crate) fn clear(&self) {
        self.stream.lock().take();
    }

    /// Fecha o socket ativo, acordando a leitura bloqueada.
    fn close(&self) {
        if let Some(s) = self.stream.lock().as_ref() {
            let _ = s.shutdown(Shutdown::Both);
        }
    }

    #[cfg(test)]
    pub fn is_connected(&self) -> bool {
        self.stream.lock().is_some()
    }

    /// Clone do socket para escrita; `None` sem conexão. O lock é liberado
    /// antes de qualquer escrita.
    pub fn writer(&self) -> Option<io::Result<TcpStream>> {
        self.stream.lock().as_ref().map(TcpStream::try_clone)
    }
}

// ──────────────────────────────────────────────
// Backoff
// ──────────────────────────────────────────────

/// Backoff exponencial com teto.
#[derive(Debug)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            current: initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}

// ──────────────────────────────────────────────
// Worker
// ──────────────────────────────────────────────

/// Contadores da ingestão.
#[derive(Debug, Default)]
pub struct IngestCounters {
    pub connections: AtomicU64,
    pub lines: AtomicU64,
    pub decode_errors: AtomicU64,
    pub oversized: AtomicU64,
}

/// Handle da thread de ingestão. `Drop` faz o shutdown.
pub struct IngestWorker {
    shutdown: Arc<AtomicBool>,
    link: LinkSlot,
    counters: Arc<IngestCounters>,
    handle: Option<JoinHandle<()>>,
}

impl IngestWorker {
    /// Inicia a thread de ingestão.
    pub fn spawn(
        settings: IngestSettings,
        store: Arc<TelemetryStore>,
        notify: NotifySender,
    ) -> io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let link = LinkSlot::default();
        let counters = Arc::new(IngestCounters::default());

        let ctx = WorkerContext {
            settings,
            store,
            notify,
            link: link.clone(),
            shutdown: Arc::clone(&shutdown),
            counters: Arc::clone(&counters),
        };

        let handle = std::thread::Builder::new()
            .name("tcp-ingest".into())
            .spawn(move || ctx.run())?;

        Ok(Self {
            shutdown,
            link,
            counters,
            handle: Some(handle),
        })
    }

    /// Link para o despachante de comandos.
    pub fn link(&self) -> LinkSlot {
        self.link.clone()
    }

    pub fn counters(&self) -> Arc<IngestCounters> {
        Arc::clone(&self.counters)
    }

    /// Sinaliza o shutdown, fecha o socket e espera a thread sair.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.link.close();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Thread de ingestão terminou com panic");
            }
        }
    }
}

impl Drop for IngestWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Como terminou uma sessão conectada.
#[derive(Debug)]
enum SessionEnd {
    Shutdown,
    Closed,
    Failed(io::Error),
}

struct WorkerContext {
    settings: IngestSettings,
    store: Arc<TelemetryStore>,
    notify: NotifySender,
    link: LinkSlot,
    shutdown: Arc<AtomicBool>,
    counters: Arc<IngestCounters>,
}

impl WorkerContext {
    fn stopped(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn set_link(&self, state: LinkState) {
        if self.store.link_state() != state {
            self.store.set_link_state(state);
            self.notify.publish(NoticeKind::Link(state));
        }
    }

    fn run(self) {
        let addr = self.settings.addr.clone();
        let mut backoff = Backoff::new(self.settings.reconnect_initial, self.settings.reconnect_max);
        info!("Ingestão iniciada – simulador em {addr}");

        while !self.stopped() {
            self.set_link(LinkState::Connecting);

            match self.connect() {
                Ok(stream) => {
                    backoff.reset();
                    self.counters.connections.fetch_add(1, Ordering::Relaxed);
                    info!("Conectado ao simulador em {addr}");

                    let end = self.run_session(stream);
                    self.link.clear();
                    self.set_link(LinkState::Disconnected);
                    match end {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Closed => info!("Simulador encerrou a conexão"),
                        SessionEnd::Failed(e) => warn!("Erro de leitura do simulador: {e}"),
                    }
                }
                Err(_) if self.stopped() => break,
                Err(e) => {
                    self.set_link(LinkState::Disconnected);
                    warn!(
                        "Falha ao conectar em {addr}: {e}. Tentando novamente em {:?}...",
                        backoff.current
                    );
                }
            }

            if !self.sleep_unless_stopped(backoff.next_delay()) {
                break;
            }
        }

        self.link.clear();
        self.set_link(LinkState::Disconnected);
        info!("Ingestão encerrada");
    }

    /// Conecta em tentativas de no máximo `read_timeout` cada, até esgotar
    /// `connect_timeout`, checando o shutdown entre elas.
    fn connect(&self) -> io::Result<TcpStream> {
        let deadline = Instant::now() + self.settings.connect_timeout;
        let slice = self.settings.read_timeout.min(self.settings.connect_timeout);
        let mut last_err = None;

        for addr in self.settings.addr.to_socket_addrs()? {
            loop {
                if self.stopped() {
                    return Err(io::Error::new(io::ErrorKind::Interrupted, "shutdown"));
                }
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                match TcpStream::connect_timeout(&addr, slice.min(remaining)) {
                    Ok(stream) => {
                        stream.set_read_timeout(Some(self.settings.read_timeout))?;
                        stream.set_nodelay(true)?;
                        return Ok(stream);
                    }
                    Err(e) if is_timeout(&e) => last_err = Some(e),
                    Err(e) => {
                        last_err = Some(e);
                        break;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "endereço não resolvido")
        }))
    }

    /// Dorme em fatias curtas; retorna `false` se o shutdown chegou.
    fn sleep_unless_stopped(&self, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        while !self.stopped() {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
        false
    }

    fn run_session(&self, stream: TcpStream) -> SessionEnd {
        if let Err(e) = self.link.install(&stream) {
            return SessionEnd::Failed(e);
        }
        // Shutdown pode ter chegado antes do link existir para ser fechado
        if self.stopped() {
            return SessionEnd::Shutdown;
        }
        self.set_link(LinkState::Connected);

        let mut reader = BufReader::new(stream);
        let mut pending: Vec<u8> = Vec::with_capacity(512);
        // Descartando o resto de uma linha grande demais
        let mut discarding = false;

        loop {
            if self.stopped() {
                return SessionEnd::Shutdown;
            }

            // pending nunca passa de MAX_LINE_BYTES aqui, então budget ≥ 1
            let budget = (MAX_LINE_BYTES + 1 - pending.len()) as u64;
            match (&mut reader).take(budget).read_until(FRAME_DELIMITER, &mut pending) {
                Ok(0) => return self.session_end(None),
                Ok(_) if pending.last() == Some(&FRAME_DELIMITER) => {
                    if discarding {
                        discarding = false;
                    } else if self.stopped() {
                        return SessionEnd::Shutdown;
                    } else {
                        self.handle_line(&pending);
                    }
                    pending.clear();
                    continue;
                }
                // Sem delimitador: linha estourou o budget ou EOF no meio da linha
                Ok(_) => {}
                Err(e) if is_timeout(&e) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return self.session_end(Some(e)),
            }

            if pending.len() > MAX_LINE_BYTES {
                if !discarding {
                    warn!("Linha maior que {MAX_LINE_BYTES} bytes descartada");
                    self.counters.oversized.fetch_add(1, Ordering::Relaxed);
                }
                discarding = true;
                pending.clear();
            }
        }
    }

    /// Socket fechado pelo próprio shutdown não conta como erro.
    fn session_end(&self, err: Option<io::Error>) -> SessionEnd {
        match err {
            _ if self.stopped() => SessionEnd::Shutdown,
            Some(e) => SessionEnd::Failed(e),
            None => SessionEnd::Closed,
        }
    }

    fn handle_line(&self, raw: &[u8]) {
        self.counters.lines.fetch_add(1, Ordering::Relaxed);

        let Ok(line) = std::str::from_utf8(raw) else {
            self.counters.decode_errors.fetch_add(1, Ordering::Relaxed);
            debug!("Linha não UTF-8 descartada ({} bytes)", raw.len());
            return;
        };
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        match decode_inbound(line) {
            Ok(Inbound::Reading(reading)) => self.apply(reading),
            Ok(Inbound::Ack(ack)) => {
                info!("Resposta do simulador: {} (ok={})", ack.command, ack.ok);
                let command = ack.command;
                self.store.set_last_response(ack);
                self.notify.publish(NoticeKind::Response(command));
            }
            Err(e) => {
                self.counters.decode_errors.fetch_add(1, Ordering::Relaxed);
                debug!("Linha inválida descartada: {e}");
            }
        }
    }

    fn apply(&self, reading: Reading) {
        let name = reading.sensor.clone();
        let Some(applied) = self.store.apply_reading(reading) else {
            return; // Sensor desconhecido, já logado pelo store
        };

        if let Some(entry) = &applied.alarm {
            warn!(
                "ALARME {} – {} = {:.3} em {}",
                entry.kind, entry.sensor, entry.value, entry.time
            );
        } else if applied.status_changed() {
            info!("{name} voltou para {}", applied.status);
        }

        self.notify.publish(NoticeKind::Sensor {
            name,
            status: applied.status,
            alarm: applied.alarm.map(|a| a.kind),
        });
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
