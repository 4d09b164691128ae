//! Motor de alarmes – avaliação de limites com disparo por borda.
//!
//! Só a transição para fora da faixa gera entrada no log. Um sensor que
//! continua fora da faixa não inunda o log; voltar para OK rearma o alarme.
//! Valores exatamente iguais a um limite contam como dentro da faixa.

use crate::types::{AlarmEntry, AlarmKind, Reading, SensorLimits, SensorStatus};

/// Retorna o [`SensorStatus`] de um valor dados os limites.
pub fn status_for_value(value: f64, limits: &SensorLimits) -> SensorStatus {
    if value < limits.low {
        SensorStatus::Low
    } else if value > limits.high {
        SensorStatus::High
    } else {
        SensorStatus::Ok
    }
}

/// Avalia uma leitura contra os limites do sensor.
///
/// `previous` é o status atualmente armazenado para o sensor. Retorna o
/// novo status e, se houve transição para LOW ou HIGH, a entrada de alarme.
pub fn evaluate(
    reading: &Reading,
    limits: &SensorLimits,
    previous: SensorStatus,
) -> (SensorStatus, Option<AlarmEntry>) {
    let status = status_for_value(reading.value, limits);

    let kind = match status {
        SensorStatus::Low => AlarmKind::LowLimit,
        SensorStatus::High => AlarmKind::HighLimit,
        SensorStatus::Ok => return (status, None),
    };

    if previous == status {
        return (status, None); // Mesma excursão, já registrada
    }

    let entry = AlarmEntry {
        time: reading.timestamp.clone(),
        sensor: reading.sensor.clone(),
        value: reading.value,
        kind,
    };
    (status, Some(entry))
}
