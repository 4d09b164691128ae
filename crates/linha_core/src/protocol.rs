//! Protocolo de comunicação com o simulador.
//!
//! JSON delimitado por `\n`, um objeto por linha, nos dois sentidos:
//!
//! ```text
//! simulador → monitor   {"sensor":"Temp_C","value":25.3,"ts":"2026-01-02T13:12:30.123","status":"OK"}
//! simulador → monitor   {"ack":"SNAPSHOT_DETAIL","ok":true,"detail":{...}}
//! monitor → simulador   {"cmd":"RESTART_SIM"}
//! ```
//!
//! Todas as funções são puras: sem I/O e sem estado.

use crate::types::{Command, CommandKind, Reading, SensorStatus, SnapshotAck};
use serde_json::{Map, Value, json};

/// Delimitador de frame do protocolo.
pub const FRAME_DELIMITER: u8 = b'\n';

/// Tamanho máximo de uma linha aceita pelo monitor.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Campos obrigatórios de uma leitura, na ordem em que são verificados.
const READING_FIELDS: [&str; 4] = ["sensor", "value", "ts", "status"];

/// Erros de decodificação de uma linha recebida.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("JSON malformado: {0}")]
    MalformedJson(String),

    #[error("Campo obrigatório ausente: {0}")]
    MissingField(&'static str),

    #[error("Valor inválido em '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl DecodeError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        DecodeError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Mensagem recebida do simulador.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Reading(Reading),
    Ack(SnapshotAck),
}

// ──────────────────────────────────────────────
// Decode
// ──────────────────────────────────────────────

/// Decodifica uma leitura de sensor.
pub fn decode_reading(line: &str) -> Result<Reading, DecodeError> {
    let obj = parse_object(line)?;
    reading_from_object(&obj)
}

/// Decodifica a confirmação de um comando enviada pelo simulador.
pub fn decode_snapshot_response(line: &str) -> Result<SnapshotAck, DecodeError> {
    let obj = parse_object(line)?;
    ack_from_object(&obj)
}

/// Classifica uma linha: objetos com `"ack"` são confirmações, o resto é leitura.
pub fn decode_inbound(line: &str) -> Result<Inbound, DecodeError> {
    let obj = parse_object(line)?;
    if obj.contains_key("ack") {
        ack_from_object(&obj).map(Inbound::Ack)
    } else {
        reading_from_object(&obj).map(Inbound::Reading)
    }
}

/// Decodifica um comando (lado do simulador).
pub fn decode_command(line: &str) -> Result<CommandKind, DecodeError> {
    let obj = parse_object(line)?;
    let raw = obj.get("cmd").ok_or(DecodeError::MissingField("cmd"))?;
    let name = raw
        .as_str()
        .ok_or_else(|| DecodeError::invalid("cmd", "esperado string"))?;
    CommandKind::parse(name).ok_or_else(|| DecodeError::invalid("cmd", format!("comando desconhecido: {name}")))
}

fn parse_object(line: &str) -> Result<Map<String, Value>, DecodeError> {
    let value: Value = serde_json::from_str(line.trim())
        .map_err(|e| DecodeError::MalformedJson(e.to_string()))?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DecodeError::MalformedJson(format!(
            "esperado objeto JSON, recebido {}",
            json_kind(&other)
        ))),
    }
}

fn reading_from_object(obj: &Map<String, Value>) -> Result<Reading, DecodeError> {
    if let Some(missing) = READING_FIELDS.into_iter().find(|f| !obj.contains_key(*f)) {
        return Err(DecodeError::MissingField(missing));
    }

    let sensor = non_empty_str(obj, "sensor")?;
    let value = numeric(&obj["value"])?;
    let timestamp = non_empty_str(obj, "ts")?;

    let raw_status = obj["status"]
        .as_str()
        .ok_or_else(|| DecodeError::invalid("status", "esperado string"))?;
    let status = SensorStatus::parse(raw_status)
        .ok_or_else(|| DecodeError::invalid("status", format!("status desconhecido: {raw_status}")))?;

    Ok(Reading {
        sensor,
        value,
        timestamp,
        status,
    })
}

fn ack_from_object(obj: &Map<String, Value>) -> Result<SnapshotAck, DecodeError> {
    let raw = obj.get("ack").ok_or(DecodeError::MissingField("ack"))?;
    let name = raw
        .as_str()
        .ok_or_else(|| DecodeError::invalid("ack", "esperado string"))?;
    let command = CommandKind::parse(name)
        .ok_or_else(|| DecodeError::invalid("ack", format!("comando desconhecido: {name}")))?;

    let ok = obj
        .get("ok")
        .ok_or(DecodeError::MissingField("ok"))?
        .as_bool()
        .ok_or_else(|| DecodeError::invalid("ok", "esperado booleano"))?;

    let detail = obj.get("detail").filter(|d| !d.is_null()).cloned();

    Ok(SnapshotAck {
        command,
        ok,
        detail,
    })
}

fn non_empty_str(obj: &Map<String, Value>, field: &'static str) -> Result<String, DecodeError> {
    let s = obj[field]
        .as_str()
        .ok_or_else(|| DecodeError::invalid(field, "esperado string"))?
        .trim();
    if s.is_empty() {
        return Err(DecodeError::invalid(field, "string vazia"));
    }
    Ok(s.to_string())
}

/// Aceita número JSON ou string numérica; o resultado precisa ser finito.
fn numeric(raw: &Value) -> Result<f64, DecodeError> {
    let value = match raw {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| DecodeError::invalid("value", format!("número fora de faixa: {n}")))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| DecodeError::invalid("value", format!("não numérico: {s:?}")))?,
        other => {
            return Err(DecodeError::invalid(
                "value",
                format!("esperado número, recebido {}", json_kind(other)),
            ));
        }
    };
    if !value.is_finite() {
        return Err(DecodeError::invalid("value", "valor não finito"));
    }
    Ok(value)
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "booleano",
        Value::Number(_) => "número",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "objeto",
    }
}

// ──────────────────────────────────────────────
// Encode
// ──────────────────────────────────────────────

/// Codifica um comando para o simulador. A senha não vai para o fio.
pub fn encode_command(command: &Command) -> String {
    frame(json!({ "cmd": command.kind.as_str() }))
}

/// Codifica uma leitura (lado do simulador).
pub fn encode_reading(reading: &Reading) -> String {
    frame(json!({
        "sensor": reading.sensor,
        "value": reading.value,
        "ts": reading.timestamp,
        "status": reading.status.as_str(),
    }))
}

/// Codifica a confirmação de um comando (lado do simulador).
pub fn encode_ack(ack: &SnapshotAck) -> String {
    let mut obj = json!({
        "ack": ack.command.as_str(),
        "ok": ack.ok,
    });
    if let Some(detail) = &ack.detail {
        obj["detail"] = detail.clone();
    }
    frame(obj)
}

fn frame(value: Value) -> String {
    let mut line = value.to_string();
    line.push(FRAME_DELIMITER as char);
    line
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_valid_reading() {
        let line = r#"{"sensor":"Temp_C","value":25.3,"ts":"2026-01-02T13:12:30.123","status":"OK"}"#;
        let r = decode_reading(line).unwrap();
        assert_eq!(r.sensor, "Temp_C");
        assert_eq!(r.value, 25.3);
        assert_eq!(r.timestamp, "2026-01-02T13:12:30.123");
        assert_eq!(r.status, SensorStatus::Ok);
    }

    #[test]
    fn lowercase_status_is_accepted() {
        let line = r#"{"sensor":"Temp_C","value":25.5,"ts":"t","status":"low"}"#;
        assert_eq!(decode_reading(line).unwrap().status, SensorStatus::Low);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            decode_reading("{bad json"),
            Err(DecodeError::MalformedJson(_))
        ));
        assert!(matches!(
            decode_reading("[1,2,3]"),
            Err(DecodeError::MalformedJson(_))
        ));
    }

    #[test]
    fn reports_missing_fields() {
        assert_eq!(
            decode_reading(r#"{"sensor":"Temp_C"}"#),
            Err(DecodeError::MissingField("value"))
        );
        assert_eq!(
            decode_reading(r#"{"sensor":"Temp_C","value":25.5}"#),
            Err(DecodeError::MissingField("ts"))
        );
        assert_eq!(
            decode_reading(r#"{"value":1,"ts":"t","status":"OK"}"#),
            Err(DecodeError::MissingField("sensor"))
        );
    }

    #[test]
    fn rejects_invalid_values() {
        let bad_value = r#"{"sensor":"Temp_C","value":"NaNxx","ts":"t","status":"OK"}"#;
        assert!(matches!(
            decode_reading(bad_value),
            Err(DecodeError::InvalidValue { field: "value", .. })
        ));

        let bad_status = r#"{"sensor":"Temp_C","value":1,"ts":"t","status":"UNKNOWN"}"#;
        assert!(matches!(
            decode_reading(bad_status),
            Err(DecodeError::InvalidValue { field: "status", .. })
        ));

        let empty_sensor = r#"{"sensor":"  ","value":1,"ts":"t","status":"OK"}"#;
        assert!(matches!(
            decode_reading(empty_sensor),
            Err(DecodeError::InvalidValue { field: "sensor", .. })
        ));

        let bool_value = r#"{"sensor":"Temp_C","value":true,"ts":"t","status":"OK"}"#;
        assert!(matches!(
            decode_reading(bool_value),
            Err(DecodeError::InvalidValue { field: "value", .. })
        ));
    }

    #[test]
    fn numeric_string_value_is_accepted() {
        let line = r#"{"sensor":"Speed_rpm","value":"1200.5","ts":"t","status":"OK"}"#;
        assert_eq!(decode_reading(line).unwrap().value, 1200.5);
    }

    #[test]
    fn command_is_single_framed_line() {
        let encoded = encode_command(&Command::new(CommandKind::RestartSim, "secret"));
        assert_eq!(encoded, "{\"cmd\":\"RESTART_SIM\"}\n");
        assert!(!encoded.contains("secret"));
        assert_eq!(encoded.matches('\n').count(), 1);
        assert_eq!(decode_command(&encoded), Ok(CommandKind::RestartSim));
    }

    #[test]
    fn decodes_ack_with_detail() {
        let line = r#"{"ack":"SNAPSHOT_DETAIL","ok":true,"detail":{"uptime_s":12}}"#;
        let ack = decode_snapshot_response(line).unwrap();
        assert_eq!(ack.command, CommandKind::SnapshotDetail);
        assert!(ack.ok);
        assert_eq!(ack.detail.unwrap()["uptime_s"], 12);
    }

    #[test]
    fn ack_requires_known_command_and_ok_flag() {
        assert!(matches!(
            decode_snapshot_response(r#"{"ack":"NOPE","ok":true}"#),
            Err(DecodeError::InvalidValue { field: "ack", .. })
        ));
        assert_eq!(
            decode_snapshot_response(r#"{"ack":"RESTART_SIM"}"#),
            Err(DecodeError::MissingField("ok"))
        );
    }

    #[test]
    fn inbound_classifies_lines() {
        let reading = encode_reading(&Reading {
            sensor: "Pressure_bar".into(),
            value: 1.7,
            timestamp: "2026-01-02T13:12:30.123".into(),
            status: SensorStatus::Ok,
        });
        assert!(matches!(decode_inbound(&reading), Ok(Inbound::Reading(_))));

        let ack = encode_ack(&SnapshotAck {
            command: CommandKind::ClearAlarms,
            ok: true,
            detail: None,
        });
        assert!(matches!(decode_inbound(&ack), Ok(Inbound::Ack(a)) if a.command == CommandKind::ClearAlarms));
    }
}
