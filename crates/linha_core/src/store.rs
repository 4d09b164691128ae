//! Store de telemetria compartilhado.
//!
//! Um escritor (thread de ingestão) e N leitores (display, serviço de
//! consulta). Todo o estado fica atrás de um único `RwLock`, então um
//! snapshot nunca enxerga uma leitura pela metade. O `RwLock` do
//! `parking_lot` é justo com o escritor: leitores contínuos não impedem a
//! ingestão de avançar.
//!
//! Só existem dois caminhos de mutação: a ingestão (`apply_reading`,
//! `append_alarm`, estado do link) e o `clear_alarms` do despachante de
//! comandos.

use crate::alarms;
use crate::types::{
    AlarmEntry, LinkState, Reading, SensorLimits, SensorState, SensorStatus, SnapshotAck,
    SystemStatus,
};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

/// Capacidade padrão do log de alarmes.
pub const DEFAULT_ALARM_CAPACITY: usize = 500;

/// Resultado de aplicar uma leitura.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub previous: SensorStatus,
    pub status: SensorStatus,
    /// Entrada gerada pela transição (já anexada ao log)
    pub alarm: Option<AlarmEntry>,
}

impl Applied {
    pub fn status_changed(&self) -> bool {
        self.previous != self.status
    }
}

/// Cópia consistente do estado em um instante.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub system_status: SystemStatus,
    pub link: LinkState,
    /// Na ordem da configuração
    pub sensors: Vec<SensorState>,
    pub alarms_count: usize,
    pub last_response: Option<SnapshotAck>,
}

/// Contadores do store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub readings_applied: u64,
    pub unknown_rejected: u64,
    pub alarms_recorded: u64,
    pub alarms_evicted: u64,
}

struct StoreInner {
    sensors: Vec<SensorState>,
    index: HashMap<String, usize>,
    alarms: VecDeque<AlarmEntry>,
    link: LinkState,
    last_response: Option<SnapshotAck>,
    stats: StoreStats,
}

impl StoreInner {
    fn push_alarm(&mut self, entry: AlarmEntry, capacity: usize) {
        while self.alarms.len() >= capacity {
            self.alarms.pop_front();
            self.stats.alarms_evicted += 1;
        }
        self.alarms.push_back(entry);
        self.stats.alarms_recorded += 1;
    }
}

/// Store com um [`SensorState`] por sensor configurado e o log de alarmes.
///
/// O conjunto de sensores é fixo após a construção.
pub struct TelemetryStore {
    inner: RwLock<StoreInner>,
    alarm_capacity: usize,
}

impl TelemetryStore {
    /// Cria o store. Nomes duplicados são ignorados (vale o primeiro);
    /// capacidade zero vira 1.
    pub fn new<I, S>(sensors: I, alarm_capacity: usize) -> Self
    where
        I: IntoIterator<Item = (S, SensorLimits)>,
        S: Into<String>,
    {
        let mut states = Vec::new();
        let mut index = HashMap::new();
        for (name, limits) in sensors {
            let name = name.into();
            if index.contains_key(&name) {
                warn!("Sensor duplicado ignorado: {name}");
                continue;
            }
            index.insert(name.clone(), states.len());
            states.push(SensorState::new(name, limits));
        }

        let alarm_capacity = alarm_capacity.max(1);
        Self {
            inner: RwLock::new(StoreInner {
                sensors: states,
                index,
                alarms: VecDeque::with_capacity(alarm_capacity.min(DEFAULT_ALARM_CAPACITY)),
                link: LinkState::Disconnected,
                last_response: None,
                stats: StoreStats::default(),
            }),
            alarm_capacity,
        }
    }

    pub fn alarm_capacity(&self) -> usize {
        self.alarm_capacity
    }

    /// Nomes dos sensores na ordem da configuração.
    pub fn sensor_names(&self) -> Vec<String> {
        self.inner.read().sensors.iter().map(|s| s.name.clone()).collect()
    }

    /// Aplica uma leitura: avalia contra os limites usando o status
    /// armazenado como anterior, atualiza o sensor e anexa o alarme gerado.
    ///
    /// Sensor desconhecido é rejeitado (log + `None`), nunca admitido.
    pub fn apply_reading(&self, reading: Reading) -> Option<Applied> {
        let mut inner = self.inner.write();

        let idx = inner.index.get(&reading.sensor).copied();
        let Some(idx) = idx else {
            inner.stats.unknown_rejected += 1;
            drop(inner);
            warn!("Leitura de sensor desconhecido rejeitada: {}", reading.sensor);
            return None;
        };

        let state = &mut inner.sensors[idx];
        let previous = state.status;
        let (status, alarm) = alarms::evaluate(&reading, &state.limits, previous);
        state.status = status;
        state.latest = Some(reading);
        inner.stats.readings_applied += 1;

        if let Some(entry) = &alarm {
            inner.push_alarm(entry.clone(), self.alarm_capacity);
        }

        Some(Applied {
            previous,
            status,
            alarm,
        })
    }

    /// Anexa uma entrada ao log, descartando as mais antigas se cheio.
    pub fn append_alarm(&self, entry: AlarmEntry) {
        self.inner.write().push_alarm(entry, self.alarm_capacity);
    }

    /// Snapshot consistente de todo o estado.
    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.read();
        let system_status = if inner.sensors.iter().any(|s| s.status.is_alarm()) {
            SystemStatus::Alarm
        } else {
            SystemStatus::Ok
        };
        StoreSnapshot {
            system_status,
            link: inner.link,
            sensors: inner.sensors.clone(),
            alarms_count: inner.alarms.len(),
            last_response: inner.last_response.clone(),
        }
    }

    /// Log de alarmes do mais antigo para o mais recente.
    ///
    /// Com `limit`, retorna só as `limit` entradas mais recentes (ainda
    /// em ordem de inserção).
    pub fn alarm_log(&self, limit: Option<usize>) -> Vec<AlarmEntry> {
        self.alarm_log_with_total(limit).1
    }

    /// Como [`alarm_log`](Self::alarm_log), junto com o total no log
    /// lido sob o mesmo lock.
    pub fn alarm_log_with_total(&self, limit: Option<usize>) -> (usize, Vec<AlarmEntry>) {
        let inner = self.inner.read();
        let total = inner.alarms.len();
        let skip = limit.map_or(0, |n| total.saturating_sub(n));
        (total, inner.alarms.iter().skip(skip).cloned().collect())
    }

    pub fn alarm_count(&self) -> usize {
        self.inner.read().alarms.len()
    }

    /// Esvazia o log. Não altera o status atual dos sensores.
    pub fn clear_alarms(&self) {
        let cleared = {
            let mut inner = self.inner.write();
            let n = inner.alarms.len();
            inner.alarms.clear();
            n
        };
        debug!("Log de alarmes limpo ({cleared} entradas)");
    }

    pub fn set_link_state(&self, link: LinkState) {
        self.inner.write().link = link;
    }

    pub fn link_state(&self) -> LinkState {
        self.inner.read().link
    }

    pub fn set_last_response(&self, ack: SnapshotAck) {
        self.inner.write().last_response = Some(ack);
    }

    pub fn last_response(&self) -> Option<SnapshotAck> {
        self.inner.read().last_response.clone()
    }

    pub fn stats(&self) -> StoreStats {
        self.inner.read().stats
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
