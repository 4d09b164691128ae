//! Despachante de comandos de manutenção.
//!
//! Valida a senha (tempo constante), codifica o comando e escreve no lado
//! de saída da conexão ativa da ingestão. `CLEAR_ALARMS` também limpa o
//! log local, com ou sem simulador.

use crate::ingest::LinkSlot;
use linha_core::auth::secrets_match;
use linha_core::protocol::encode_command;
use linha_core::store::TelemetryStore;
use linha_core::types::{Command, CommandKind};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::net::Shutdown;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Erros de envio de comando, devolvidos a quem submeteu.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Senha de manutenção inválida")]
    Unauthorized,

    #[error("Sem conexão com o simulador")]
    NotConnected,

    #[error("Timeout ao enviar comando")]
    WriteTimeout,

    #[error("Erro de I/O ao enviar comando: {0}")]
    Io(#[from] io::Error),
}

/// Confirmação local de um comando aceito.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub command: CommandKind,
    /// `false` quando só a parte local foi executada (CLEAR_ALARMS offline)
    pub forwarded: bool,
}

pub struct CommandDispatcher {
    secret: String,
    link: LinkSlot,
    store: Arc<TelemetryStore>,
    write_timeout: Duration,
    // Serializa escritas concorrentes para não intercalar linhas
    write_gate: Mutex<()>,
}

impl CommandDispatcher {
    pub fn new(
        secret: impl Into<String>,
        link: LinkSlot,
        store: Arc<TelemetryStore>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            secret: secret.into(),
            link,
            store,
            write_timeout,
            write_gate: Mutex::new(()),
        }
    }

    /// Valida e envia um comando.
    pub fn submit(&self, kind: CommandKind, provided_secret: &str) -> Result<Ack, CommandError> {
        if !secrets_match(&self.secret, provided_secret) {
            warn!("Comando {kind} rejeitado: senha inválida");
            return Err(CommandError::Unauthorized);
        }

        let command = Command::new(kind, provided_secret);

        if kind == CommandKind::ClearAlarms {
            self.store.clear_alarms();
            info!("Log de alarmes limpo pelo operador");
        }

        match self.send(&command) {
            Ok(()) => {
                info!("Comando {kind} enviado ao simulador");
                Ok(Ack {
                    command: kind,
                    forwarded: true,
                })
            }
            Err(CommandError::NotConnected) if kind == CommandKind::ClearAlarms => {
                info!("Simulador offline: {kind} aplicado só localmente");
                Ok(Ack {
                    command: kind,
                    forwarded: false,
                })
            }
            Err(e) => {
                warn!("Falha ao enviar {kind}: {e}");
                Err(e)
            }
        }
    }

    fn send(&self, command: &Command) -> Result<(), CommandError> {
        let line = encode_command(command);
        let mut stream = self.link.writer().ok_or(CommandError::NotConnected)??;
        stream.set_write_timeout(Some(self.write_timeout))?;

        let _gate = self.write_gate.lock();
        if let Err(e) = stream.write_all(line.as_bytes()).and_then(|()| stream.flush()) {
            // Parte da linha pode ter ido para o fio: derruba a conexão para a
            // ingestão reconectar com o enquadramento limpo
            let _ = stream.shutdown(Shutdown::Both);
            return Err(write_error(e));
        }
        Ok(())
    }
}

fn write_error(e: io::Error) -> CommandError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => CommandError::WriteTimeout,
        _ => CommandError::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linha_core::types::{AlarmEntry, AlarmKind, SensorLimits};
    use std::io::{BufRead, BufReader, Read};
    use std::net::{TcpListener, TcpStream};

    const SECRET: &str = "s3nha";

    fn store_with_alarm() -> Arc<TelemetryStore> {
        let store = Arc::new(TelemetryStore::new(
            [("Temp_C", SensorLimits::new(15.0, 35.0))],
            10,
        ));
        store.append_alarm(AlarmEntry {
            time: "t".into(),
            sensor: "Temp_C".into(),
            value: 99.0,
            kind: AlarmKind::HighLimit,
        });
        store
    }

    /// Par conectado: (lado do monitor instalado no link, lado do simulador).
    fn connected_link() -> (LinkSlot, TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let local = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (peer, _) = listener.accept().unwrap();
        let link = LinkSlot::default();
        link.install(&local).unwrap();
        (link, local, peer)
    }

    fn dispatcher(link: LinkSlot, store: Arc<TelemetryStore>) -> CommandDispatcher {
        CommandDispatcher::new(SECRET, link, store, Duration::from_millis(200))
    }

    #[test]
    fn wrong_secret_is_rejected_without_writing() {
        let (link, _local, mut peer) = connected_link();
        let store = store_with_alarm();
        let d = dispatcher(link, Arc::clone(&store));

        for kind in CommandKind::ALL {
            assert!(matches!(d.submit(kind, "errada"), Err(CommandError::Unauthorized)));
        }
        // CLEAR_ALARMS com senha errada não limpa nada
        assert_eq!(store.alarm_count(), 1);

        peer.set_read_timeout(Some(Duration::from_millis(100))).unwrap();
        let mut buf = [0u8; 64];
        let err = peer.read(&mut buf).unwrap_err();
        assert!(matches!(
            err.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
        ));
    }

    #[test]
    fn forwards_command_line() {
        let (link, _local, peer) = connected_link();
        let d = dispatcher(link, store_with_alarm());

        let ack = d.submit(CommandKind::SnapshotDetail, SECRET).unwrap();
        assert_eq!(
            ack,
            Ack {
                command: CommandKind::SnapshotDetail,
                forwarded: true
            }
        );

        let mut line = String::new();
        BufReader::new(peer).read_line(&mut line).unwrap();
        assert_eq!(line, "{\"cmd\":\"SNAPSHOT_DETAIL\"}\n");
    }

    #[test]
    fn restart_without_link_is_not_connected() {
        let d = dispatcher(LinkSlot::default(), store_with_alarm());
        assert!(matches!(
            d.submit(CommandKind::RestartSim, SECRET),
            Err(CommandError::NotConnected)
        ));
    }

    #[test]
    fn clear_alarms_is_local_even_offline() {
        let store = store_with_alarm();
        let d = dispatcher(LinkSlot::default(), Arc::clone(&store));

        let ack = d.submit(CommandKind::ClearAlarms, SECRET).unwrap();
        assert!(!ack.forwarded);
        assert_eq!(store.alarm_count(), 0);
    }

    #[test]
    fn clear_alarms_online_also_forwards() {
        let (link, _local, peer) = connected_link();
        let store = store_with_alarm();
        let d = dispatcher(link, Arc::clone(&store));

        assert!(d.submit(CommandKind::ClearAlarms, SECRET).unwrap().forwarded);
        assert_eq!(store.alarm_count(), 0);

        let mut line = String::new();
        BufReader::new(peer).read_line(&mut line).unwrap();
        assert_eq!(line.trim_end(), "{\"cmd\":\"CLEAR_ALARMS\"}");
    }

    #[test]
    fn stalled_peer_times_out_and_link_is_dropped() {
        let (link, _local, mut peer) = connected_link();
        let d = CommandDispatcher::new(SECRET, link, store_with_alarm(), Duration::from_millis(50));

        // O par nunca lê: os buffers do kernel enchem até a escrita expirar
        let mut result = Ok(Ack {
            command: CommandKind::SnapshotDetail,
            forwarded: true,
        });
        for _ in 0..5_000_000 {
            result = d.submit(CommandKind::SnapshotDetail, SECRET);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(CommandError::WriteTimeout)), "{result:?}");

        // Nenhum comando é aceito na conexão com a linha pela metade
        assert!(matches!(
            d.submit(CommandKind::SnapshotDetail, SECRET),
            Err(CommandError::Io(_) | CommandError::WriteTimeout)
        ));

        // O par drena o que chegou e vê o fim da conexão
        peer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut received = Vec::new();
        peer.read_to_end(&mut received).unwrap();
        let frame = "{\"cmd\":\"SNAPSHOT_DETAIL\"}\n".len();
        assert!(received.len() >= frame);
    }

    #[test]
    fn timeout_kinds_map_to_write_timeout() {
        assert!(matches!(
            write_error(io::Error::from(io::ErrorKind::WouldBlock)),
            CommandError::WriteTimeout
        ));
        assert!(matches!(
            write_error(io::Error::from(io::ErrorKind::TimedOut)),
            CommandError::WriteTimeout
        ));
        assert!(matches!(
            write_error(io::Error::from(io::ErrorKind::BrokenPipe)),
            CommandError::Io(_)
        ));
    }
}
