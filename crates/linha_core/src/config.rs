//! Configuração unificada via TOML.
//!
//! Um único `config.toml` alimenta o monitor e o simulador: endereço do
//! simulador, limites por sensor, senha de manutenção e parâmetros de
//! ingestão/display.

use crate::query::DEFAULT_ALARM_VIEW_LIMIT;
use crate::store::DEFAULT_ALARM_CAPACITY;
use crate::types::SensorLimits;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Erros de configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro ao ler {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Erro ao parsear {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Erro ao serializar configuração: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Erro ao salvar {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Configuração inválida: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Endereço do simulador e parâmetros de geração.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Host do simulador (o monitor conecta, o simulador escuta)
    pub host: String,
    /// Porta TCP
    pub port: u16,
    /// Intervalo entre rodadas de leituras (ms)
    pub interval_ms: u64,
    /// Probabilidade de pico fora da faixa por leitura
    pub spike_probability: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 9000,
            interval_ms: 100,
            spike_probability: 0.02,
        }
    }
}

/// Parâmetros do monitor (ingestão, display, comandos).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Taxa de atualização do display (Hz)
    pub update_hz: f64,
    /// Capacidade do log de alarmes (FIFO)
    pub alarm_log_max: usize,
    /// Entradas retornadas pelo view de alarmes
    pub alarm_view_limit: usize,
    /// Capacidade da fila de notificações para o display
    pub notify_capacity: usize,
    /// Timeout de leitura do socket (ms) – também a latência do shutdown
    pub read_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Backoff inicial de reconexão (ms), dobra a cada falha
    pub reconnect_initial_ms: u64,
    /// Teto do backoff de reconexão (ms)
    pub reconnect_max_ms: u64,
    /// Timeout de escrita de comandos (ms)
    pub write_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            update_hz: 2.0,
            alarm_log_max: DEFAULT_ALARM_CAPACITY,
            alarm_view_limit: DEFAULT_ALARM_VIEW_LIMIT,
            notify_capacity: 64,
            read_timeout_ms: 500,
            connect_timeout_ms: 3000,
            reconnect_initial_ms: 500,
            reconnect_max_ms: 5000,
            write_timeout_ms: 1000,
        }
    }
}

impl MonitorConfig {
    pub fn display_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.update_hz.max(2.0))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms.max(1))
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms.max(self.reconnect_initial_ms))
    }
}

/// Console de manutenção.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub password: String,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            password: "admin".into(),
        }
    }
}

/// Um sensor configurado e seus limites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    pub name: String,
    pub low: f64,
    pub high: f64,
}

impl SensorConfig {
    fn new(name: &str, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            low,
            high,
        }
    }

    pub fn limits(&self) -> SensorLimits {
        SensorLimits::new(self.low, self.high)
    }
}

fn default_sensors() -> Vec<SensorConfig> {
    vec![
        SensorConfig::new("Temp_C", 15.0, 35.0),
        SensorConfig::new("Pressure_bar", 1.2, 2.2),
        SensorConfig::new("Vibration_mm_s", 0.0, 4.5),
        SensorConfig::new("Speed_rpm", 1000.0, 1400.0),
        SensorConfig::new("Optical_count", 40.0, 80.0),
    ]
}

/// Configuração raiz do aplicativo.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub simulator: SimulatorConfig,
    pub monitor: MonitorConfig,
    pub maintenance: MaintenanceConfig,
    /// Fica por último: array de tabelas no TOML
    pub sensors: Vec<SensorConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            simulator: SimulatorConfig::default(),
            monitor: MonitorConfig::default(),
            maintenance: MaintenanceConfig::default(),
            sensors: default_sensors(),
        }
    }
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML. Sem arquivo, usa o padrão;
    /// arquivo ilegível ou inválido é erro, nunca trocado pelo padrão.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("{} não existe, usando configuração padrão", path.display());
            return Ok(AppConfig::default());
        }

        let config = Self::try_load(path)?;
        info!("Configuração carregada de {}", path.display());
        Ok(config)
    }

    /// Carrega e valida, sem fallback.
    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: AppConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let errors = config.validate();
        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors));
        }
        Ok(config)
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Caminho da configuração: primeiro argumento da linha de comando ou
    /// `config.toml` ao lado do executável.
    pub fn resolve_path() -> PathBuf {
        std::env::args_os()
            .nth(1)
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_path)
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Endereço `host:port` do simulador.
    pub fn simulator_addr(&self) -> String {
        format!("{}:{}", self.simulator.host, self.simulator.port)
    }

    /// Pares (nome, limites) na ordem da configuração.
    pub fn sensor_limits(&self) -> Vec<(String, SensorLimits)> {
        self.sensors
            .iter()
            .map(|s| (s.name.clone(), s.limits()))
            .collect()
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.simulator.port == 0 {
            errors.push("Porta do simulador não pode ser 0".into());
        }
        if self.simulator.host.trim().is_empty() {
            errors.push("Host do simulador vazio".into());
        }
        if self.simulator.interval_ms == 0 {
            errors.push("Intervalo do simulador não pode ser 0".into());
        }
        if !(0.0..=1.0).contains(&self.simulator.spike_probability) {
            errors.push(format!(
                "Probabilidade de pico inválida: {} (0.0–1.0)",
                self.simulator.spike_probability
            ));
        }

        let m = &self.monitor;
        if !(2.0..=60.0).contains(&m.update_hz) {
            errors.push(format!("update_hz inválido: {} (2–60)", m.update_hz));
        }
        if m.alarm_log_max == 0 {
            errors.push("alarm_log_max deve ser ≥ 1".into());
        }
        if m.notify_capacity == 0 {
            errors.push("notify_capacity deve ser ≥ 1".into());
        }
        if m.read_timeout_ms == 0 || m.write_timeout_ms == 0 || m.connect_timeout_ms == 0 {
            errors.push("Timeouts do monitor não podem ser 0".into());
        }

        if self.maintenance.password.is_empty() {
            errors.push("Senha de manutenção vazia".into());
        }

        if self.sensors.is_empty() {
            errors.push("Nenhum sensor configurado".into());
        }
        let mut seen = HashSet::new();
        for s in &self.sensors {
            if s.name.trim().is_empty() {
                errors.push("Sensor com nome vazio".into());
            } else if !seen.insert(s.name.as_str()) {
                errors.push(format!("Sensor duplicado: {}", s.name));
            }
            if !s.limits().is_valid() {
                errors.push(format!(
                    "Limites inválidos para {}: low={} high={} (low < high)",
                    s.name, s.low, s.high
                ));
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
        assert_eq!(config.sensors.len(), 5);
    }

    #[test]
    fn roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.simulator.port, parsed.simulator.port);
        assert_eq!(parsed.sensors.len(), 5);
        assert_eq!(parsed.sensors[3].name, "Speed_rpm");
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[simulator]
port = 9999

[[sensors]]
name = "Temp_C"
low = 10.0
high = 30.0
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.simulator.port, 9999);
        // Outros campos devem ter valor padrão
        assert_eq!(config.simulator.host, "127.0.0.1");
        assert_eq!(config.monitor.alarm_log_max, 500);
        assert_eq!(config.sensors.len(), 1);
        assert_eq!(config.sensor_limits()[0].1, SensorLimits::new(10.0, 30.0));
    }

    #[test]
    fn rejects_duplicates_and_bad_limits() {
        let mut config = AppConfig::default();
        config.sensors.push(SensorConfig::new("Temp_C", 0.0, 1.0));
        config.sensors.push(SensorConfig::new("Flow", 5.0, 5.0));
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("duplicado")));
        assert!(errors.iter().any(|e| e.contains("Flow")));
    }

    #[test]
    fn rejects_slow_display() {
        let mut config = AppConfig::default();
        config.monitor.update_hz = 0.5;
        assert_eq!(config.validate().len(), 1);
    }

    #[test]
    fn display_interval_has_floor() {
        let m = MonitorConfig {
            update_hz: 0.1,
            ..Default::default()
        };
        assert_eq!(m.display_interval(), Duration::from_millis(500));
    }

    #[test]
    fn try_load_reports_invalid_file() {
        let path = std::env::temp_dir().join(format!("linha-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[maintenance]\npassword = \"\"\n").unwrap();
        let result = AppConfig::try_load(&path);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(result, Err(ConfigError::Invalid(e)) if e.len() == 1));
    }

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("linha-config-{tag}-{}.toml", std::process::id()))
    }

    #[test]
    fn load_never_replaces_invalid_file_with_defaults() {
        let path = temp_path("invalid");
        let content = r#"
[maintenance]
password = "very-secret"

[[sensors]]
name = "Temp_C"
low = 40.0
high = 10.0
"#;
        std::fs::write(&path, content).unwrap();
        let result = AppConfig::load(&path);
        let _ = std::fs::remove_file(&path);

        match result {
            Err(ConfigError::Invalid(errors)) => {
                assert!(errors.iter().any(|e| e.contains("Temp_C")));
            }
            other => panic!("esperado Invalid, recebido {other:?}"),
        }
    }

    #[test]
    fn load_rejects_unparseable_file() {
        let path = temp_path("garbage");
        std::fs::write(&path, "[[sensors]\nname = ").unwrap();
        let result = AppConfig::load(&path);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn load_keeps_valid_file_and_defaults_when_missing() {
        let path = temp_path("valid");
        let mut config = AppConfig::default();
        config.maintenance.password = "very-secret".into();
        config.save(&path).unwrap();
        let loaded = AppConfig::load(&path);
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded.unwrap().maintenance.password, "very-secret");

        let missing = AppConfig::load(&temp_path("missing")).unwrap();
        assert_eq!(missing.maintenance.password, "admin");
        assert_eq!(missing.sensors.len(), 5);
    }
}
