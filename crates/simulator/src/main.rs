//! # Linha Simulator
//!
//! Simula os sensores da linha de produção e envia uma leitura por sensor
//! a cada intervalo, em JSON por linha, para o monitor conectado.
//! Recebe comandos de manutenção pela mesma conexão.
//!
//! ## Uso
//! ```bash
//! linha_simulator                 # config.toml ao lado do executável
//! linha_simulator ./config.toml   # mesmo arquivo usado pelo monitor
//! ```

mod sim;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use linha_core::config::AppConfig;
use linha_core::protocol::{decode_command, encode_ack, encode_reading};
use linha_core::types::CommandKind;
use sim::Simulator;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
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

    let sim_cfg = &config.simulator;
    let addr = config.simulator_addr();
    let interval = Duration::from_millis(sim_cfg.interval_ms.max(1));

    // ── Socket TCP ──
    let listener = match TcpListener::bind(&addr) {
        Ok(l) => l,
        Err(e) => {
            error!("Falha ao escutar em {addr}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut sim = Simulator::new(
        sim::default_profiles(&config.sensor_limits()),
        sim_cfg.spike_probability,
    );

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ⚡ LINHA SIMULATOR – ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  Escutando: {addr}");
    println!("  Intervalo: {} ms", sim_cfg.interval_ms);
    println!("  Picos:     {:.1}%", sim_cfg.spike_probability * 100.0);
    println!("══════════════════════════════════════════════");
    println!();

    // ── Um monitor por vez ──
    for incoming in listener.incoming() {
        let stream = match incoming {
            Ok(s) => s,
            Err(e) => {
                warn!("Erro no accept: {e}");
                continue;
            }
        };
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "?".into());
        info!("Monitor conectado: {peer}");

        match serve(stream, &mut sim, interval) {
            Ok(()) => info!("Monitor {peer} desconectou"),
            Err(e) => info!("Monitor {peer} desconectado: {e}"),
        }
    }
    ExitCode::SUCCESS
}

/// Envia leituras até a conexão cair; comandos chegam por uma thread leitora.
fn serve(mut stream: TcpStream, sim: &mut Simulator, interval: Duration) -> io::Result<()> {
    let _ = stream.set_nodelay(true);
    let reader = stream.try_clone()?;
    let (tx, rx) = crossbeam_channel::unbounded();

    let reader_thread = std::thread::Builder::new()
        .name("sim-commands".into())
        .spawn(move || read_commands(reader, tx))?;

    let result = stream_readings(&mut stream, sim, &rx, interval);

    let _ = stream.shutdown(Shutdown::Both);
    let _ = reader_thread.join();
    result
}

fn stream_readings(
    stream: &mut TcpStream,
    sim: &mut Simulator,
    commands: &Receiver<CommandKind>,
    interval: Duration,
) -> io::Result<()> {
    loop {
        let cycle_start = Instant::now();

        // Sender solto = monitor fechou a conexão
        loop {
            match commands.try_recv() {
                Ok(kind) => {
                    let ack = sim.handle(kind);
                    stream.write_all(encode_ack(&ack).as_bytes())?;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }

        for reading in sim.tick(chrono::Local::now()) {
            stream.write_all(encode_reading(&reading).as_bytes())?;
        }
        stream.flush()?;

        if sim.tick_count() % 100 == 0 {
            debug!("{} rodadas enviadas", sim.tick_count());
        }

        let elapsed = cycle_start.elapsed();
        if elapsed < interval {
            std::thread::sleep(interval - elapsed);
        }
    }
}

fn read_commands(stream: TcpStream, tx: Sender<CommandKind>) {
    for line in BufReader::new(stream).lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                debug!("Leitura de comandos encerrada: {e}");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match decode_command(&line) {
            Ok(kind) => {
                info!("Comando recebido: {kind}");
                if tx.send(kind).is_err() {
                    return;
                }
            }
            Err(e) => warn!("Comando ignorado ({e}): {line}"),
        }
    }
}
