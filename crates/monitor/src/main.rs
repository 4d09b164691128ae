//! # Linha Monitor
//!
//! Monitor da linha de produção: conecta ao simulador via TCP, avalia
//! cada leitura contra os limites configurados, mantém o log de alarmes
//! e repassa comandos de manutenção ao simulador.
//!
//! ## Uso
//! ```bash
//! linha_monitor                 # config.toml ao lado do executável
//! linha_monitor ./config.toml   # caminho explícito
//! ```
//!
//! Comandos do operador chegam pelo stdin (`help` lista); `quit` ou
//! Ctrl-C encerram.

mod commands;
mod console;
mod display;
mod ingest;
mod notify;

use commands::CommandDispatcher;
use console::Console;
use display::ConsoleDisplay;
use ingest::{IngestSettings, IngestWorker};
use linha_core::config::AppConfig;
use linha_core::store::TelemetryStore;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Config ──
    let config_path = AppConfig::resolve_path();
    let config = match AppConfig::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    // ── Sinal de shutdown ──
    let running = Arc::new(AtomicBool::new(true));
    {
        let r = Arc::clone(&running);
        if let Err(e) = ctrlc::set_handler(move || r.store(false, Ordering::SeqCst)) {
            warn!("Falha ao instalar handler de Ctrl-C: {e}");
        }
    }

    // ── Store + ingestão ──
    let monitor_cfg = &config.monitor;
    let store = Arc::new(TelemetryStore::new(
        config.sensor_limits(),
        monitor_cfg.alarm_log_max,
    ));
    let (notify_tx, notify_rx) = notify::bounded_queue(monitor_cfg.notify_capacity);
    let dropped = notify_tx.dropped_counter();

    let mut worker = match IngestWorker::spawn(
        IngestSettings::from(&config),
        Arc::clone(&store),
        notify_tx,
    ) {
        Ok(w) => w,
        Err(e) => {
            error!("Falha ao criar thread de ingestão: {e}");
            return ExitCode::FAILURE;
        }
    };

    let dispatcher = Arc::new(CommandDispatcher::new(
        config.maintenance.password.clone(),
        worker.link(),
        Arc::clone(&store),
        monitor_cfg.write_timeout(),
    ));

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ⚡ LINHA MONITOR – ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  Simulador: {}", config.simulator_addr());
    println!("  Sensores:  {}", store.sensor_names().join(", "));
    println!("  Display:   {:.1} Hz", monitor_cfg.update_hz);
    println!("  Alarmes:   até {} entradas", store.alarm_capacity());
    println!("══════════════════════════════════════════════");
    println!();

    // ── Display ──
    let display = ConsoleDisplay::new(
        Arc::clone(&store),
        notify_rx,
        monitor_cfg.display_interval(),
        Arc::clone(&dropped),
    );
    let display_running = Arc::clone(&running);
    let display_thread = match std::thread::Builder::new()
        .name("display".into())
        .spawn(move || display.run(&display_running))
    {
        Ok(h) => Some(h),
        Err(e) => {
            warn!("Falha ao criar thread de display: {e}. Seguindo sem display.");
            None
        }
    };

    // ── Console do operador ──
    // Fica solto: stdin bloqueado não deve segurar o shutdown.
    let console = Console::new(
        dispatcher,
        Arc::clone(&store),
        monitor_cfg.alarm_view_limit,
    );
    let console_running = Arc::clone(&running);
    if let Err(e) = std::thread::Builder::new()
        .name("console".into())
        .spawn(move || console.run(std::io::stdin().lock(), std::io::stdout(), &console_running))
    {
        warn!("Falha ao criar console do operador: {e}");
    }

    // ── Espera o shutdown ──
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    info!("Encerrando...");
    let counters = worker.counters();
    worker.shutdown();
    if let Some(h) = display_thread {
        let _ = h.join();
    }

    let stats = store.stats();
    info!(
        "Leituras aplicadas: {} | rejeitadas: {} | alarmes: {} ({} descartados do log)",
        stats.readings_applied, stats.unknown_rejected, stats.alarms_recorded, stats.alarms_evicted
    );
    info!(
        "Conexões: {} | linhas: {} | inválidas: {} | grandes demais: {} | notificações descartadas: {}",
        counters.connections.load(Ordering::Relaxed),
        counters.lines.load(Ordering::Relaxed),
        counters.decode_errors.load(Ordering::Relaxed),
        counters.oversized.load(Ordering::Relaxed),
        dropped.load(Ordering::Relaxed)
    );
    ExitCode::SUCCESS
}
