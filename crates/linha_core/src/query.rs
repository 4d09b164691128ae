//! Formatos de resposta para o serviço de consulta remota.
//!
//! O serviço em si fica fora deste crate; aqui só os views serializáveis
//! montados a partir do [`TelemetryStore`].

use crate::store::{StoreSnapshot, TelemetryStore};
use crate::types::{AlarmEntry, LinkState, SensorStatus, SystemStatus};
use serde::Serialize;

/// Limite padrão de entradas no view de alarmes.
pub const DEFAULT_ALARM_VIEW_LIMIT: usize = 200;

/// Linha de sensor: `{name, value, ts, status, low, high}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorRow {
    pub name: String,
    pub value: Option<f64>,
    pub ts: Option<String>,
    pub status: SensorStatus,
    pub low: f64,
    pub high: f64,
}

/// `{system_status, sensors, alarms_count}` (mais o estado do link).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorsView {
    pub system_status: SystemStatus,
    pub link: LinkState,
    pub sensors: Vec<SensorRow>,
    pub alarms_count: usize,
}

impl From<&StoreSnapshot> for SensorsView {
    fn from(snap: &StoreSnapshot) -> Self {
        let sensors = snap
            .sensors
            .iter()
            .map(|s| SensorRow {
                name: s.name.clone(),
                value: s.latest.as_ref().map(|r| r.value),
                ts: s.latest.as_ref().map(|r| r.timestamp.clone()),
                status: s.status,
                low: s.limits.low,
                high: s.limits.high,
            })
            .collect();

        Self {
            system_status: snap.system_status,
            link: snap.link,
            sensors,
            alarms_count: snap.alarms_count,
        }
    }
}

impl SensorsView {
    pub fn from_store(store: &TelemetryStore) -> Self {
        Self::from(&store.snapshot())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// `{count, alarms:[{time, sensor, value, type}]}`, do mais antigo ao mais recente.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmsView {
    /// Total no log, não só as retornadas
    pub count: usize,
    pub alarms: Vec<AlarmEntry>,
}

impl AlarmsView {
    pub fn from_store(store: &TelemetryStore, limit: usize) -> Self {
        let (count, alarms) = store.alarm_log_with_total(Some(limit));
        Self { count, alarms }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlarmKind, Reading, SensorLimits};
    use serde_json::Value;

    fn store() -> TelemetryStore {
        TelemetryStore::new(
            [
                ("Temp_C", SensorLimits::new(0.0, 100.0)),
                ("Speed_rpm", SensorLimits::new(1000.0, 1400.0)),
            ],
            500,
        )
    }

    #[test]
    fn sensors_view_shape() {
        let s = store();
        s.apply_reading(Reading {
            sensor: "Temp_C".into(),
            value: 25.0,
            timestamp: "t".into(),
            status: SensorStatus::Ok,
        });

        let json: Value = serde_json::from_str(&SensorsView::from_store(&s).to_json().unwrap()).unwrap();
        assert_eq!(json["system_status"], "OK");
        assert_eq!(json["alarms_count"], 0);
        assert_eq!(json["link"], "DISCONNECTED");

        let sensors = json["sensors"].as_array().unwrap();
        assert_eq!(sensors.len(), 2);
        assert_eq!(sensors[0]["name"], "Temp_C");
        assert_eq!(sensors[0]["value"], 25.0);
        assert_eq!(sensors[0]["low"], 0.0);
        assert_eq!(sensors[0]["high"], 100.0);
        // Sem leitura ainda
        assert!(sensors[1]["value"].is_null());
        assert!(sensors[1]["ts"].is_null());
    }

    #[test]
    fn alarms_view_shape() {
        let s = store();
        s.append_alarm(AlarmEntry {
            time: "t".into(),
            sensor: "Temp_C".into(),
            value: 999.0,
            kind: AlarmKind::HighLimit,
        });

        let json: Value =
            serde_json::from_str(&AlarmsView::from_store(&s, DEFAULT_ALARM_VIEW_LIMIT).to_json().unwrap()).unwrap();
        assert_eq!(json["count"], 1);
        assert_eq!(json["alarms"][0]["sensor"], "Temp_C");
        assert_eq!(json["alarms"][0]["type"], "HIGH_LIMIT");
    }

    #[test]
    fn alarms_view_count_is_total() {
        let s = store();
        for i in 0..5 {
            s.append_alarm(AlarmEntry {
                time: format!("t{i}"),
                sensor: "Speed_rpm".into(),
                value: 0.0,
                kind: AlarmKind::LowLimit,
            });
        }
        let view = AlarmsView::from_store(&s, 2);
        assert_eq!(view.count, 5);
        assert_eq!(view.alarms.len(), 2);
        assert_eq!(view.alarms[1].time, "t4");
    }
}
