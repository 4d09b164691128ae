//! Gerador de leituras da linha de produção.
//!
//! Cada sensor tem um valor base, ruído gaussiano e uma deriva lenta
//! (passeio aleatório limitado). Com probabilidade configurável a leitura
//! vira um pico fora da faixa; o status é calculado contra os limites
//! configurados, como um CLP faria.

use chrono::{DateTime, Local};
use linha_core::alarms::status_for_value;
use linha_core::types::{CommandKind, Reading, SensorLimits, SensorStatus, SnapshotAck};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::time::Instant;
use tracing::info;

/// Amplitude máxima da deriva acumulada, em desvios de ruído.
const DRIFT_LIMIT: f64 = 1.5;

/// Passo da deriva por tick, em desvios de ruído.
const DRIFT_STEP: f64 = 0.05;

/// (nome, base, ruído) dos sensores da linha.
pub const DEFAULT_PROFILES: [(&str, f64, f64); 5] = [
    ("Temp_C", 25.0, 0.4),
    ("Pressure_bar", 1.7, 0.05),
    ("Vibration_mm_s", 2.0, 0.3),
    ("Speed_rpm", 1200.0, 25.0),
    ("Optical_count", 60.0, 6.0),
];

#[derive(Debug, Clone, PartialEq)]
pub struct SensorProfile {
    pub name: String,
    pub base: f64,
    pub noise: f64,
    /// Limites usados para o status reportado; `None` → sempre OK
    pub limits: Option<SensorLimits>,
}

impl SensorProfile {
    pub fn new(name: impl Into<String>, base: f64, noise: f64, limits: Option<SensorLimits>) -> Self {
        Self {
            name: name.into(),
            base,
            noise,
            limits,
        }
    }
}

/// Perfis padrão com os limites encontrados em `limits` (por nome).
pub fn default_profiles(limits: &[(String, SensorLimits)]) -> Vec<SensorProfile> {
    DEFAULT_PROFILES
        .iter()
        .map(|&(name, base, noise)| {
            let l = limits.iter().find(|(n, _)| n == name).map(|(_, l)| *l);
            SensorProfile::new(name, base, noise, l)
        })
        .collect()
}

#[derive(Debug)]
struct Channel {
    profile: SensorProfile,
    drift: f64,
    last: Option<f64>,
}

pub struct Simulator {
    channels: Vec<Channel>,
    spike_probability: f64,
    rng: StdRng,
    tick: u64,
    started: Instant,
}

impl Simulator {
    pub fn new(profiles: Vec<SensorProfile>, spike_probability: f64) -> Self {
        Self::with_rng(profiles, spike_probability, StdRng::from_os_rng())
    }

    /// Gerador determinístico (testes, reprodução de cenários).
    pub fn with_seed(profiles: Vec<SensorProfile>, spike_probability: f64, seed: u64) -> Self {
        Self::with_rng(profiles, spike_probability, StdRng::seed_from_u64(seed))
    }

    fn with_rng(profiles: Vec<SensorProfile>, spike_probability: f64, rng: StdRng) -> Self {
        Self {
            channels: profiles
                .into_iter()
                .map(|profile| Channel {
                    profile,
                    drift: 0.0,
                    last: None,
                })
                .collect(),
            spike_probability: spike_probability.clamp(0.0, 1.0),
            rng,
            tick: 0,
            started: Instant::now(),
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Uma rodada: uma leitura por sensor, todas com o mesmo timestamp.
    pub fn tick(&mut self, now: DateTime<Local>) -> Vec<Reading> {
        self.tick += 1;
        let ts = iso_millis(now);

        let mut readings = Vec::with_capacity(self.channels.len());
        for i in 0..self.channels.len() {
            let value = self.sample(i);
            let ch = &mut self.channels[i];
            ch.last = Some(value);

            let status = match &ch.profile.limits {
                Some(limits) => status_for_value(value, limits),
                None => SensorStatus::Ok,
            };
            readings.push(Reading {
                sensor: ch.profile.name.clone(),
                value,
                timestamp: ts.clone(),
                status,
            });
        }
        readings
    }

    fn sample(&mut self, idx: usize) -> f64 {
        let step = self.rng.random_range(-DRIFT_STEP..=DRIFT_STEP);
        let gauss = gaussian(&mut self.rng);
        let spike = self.rng.random::<f64>() < self.spike_probability;
        let low_spike = self.rng.random::<bool>();

        let ch = &mut self.channels[idx];
        let noise = ch.profile.noise;
        ch.drift = (ch.drift + step * noise).clamp(-DRIFT_LIMIT * noise, DRIFT_LIMIT * noise);

        let value = ch.profile.base + ch.drift + gauss * noise;
        match (spike, low_spike) {
            (false, _) => value,
            (true, true) => value * 0.3,
            (true, false) => value * 1.8 + 10.0,
        }
    }

    /// Executa um comando recebido do monitor e monta a confirmação.
    pub fn handle(&mut self, kind: CommandKind) -> SnapshotAck {
        match kind {
            CommandKind::RestartSim => {
                info!("RESTART_SIM: zerando contador ({} ticks) e deriva", self.tick);
                self.tick = 0;
                self.started = Instant::now();
                for ch in &mut self.channels {
                    ch.drift = 0.0;
                    ch.last = None;
                }
                SnapshotAck {
                    command: kind,
                    ok: true,
                    detail: None,
                }
            }
            CommandKind::ClearAlarms => {
                info!("CLEAR_ALARMS recebido");
                SnapshotAck {
                    command: kind,
                    ok: true,
                    detail: None,
                }
            }
            CommandKind::SnapshotDetail => SnapshotAck {
                command: kind,
                ok: true,
                detail: Some(self.detail()),
            },
        }
    }

    fn detail(&self) -> serde_json::Value {
        let sensors: Vec<_> = self
            .channels
            .iter()
            .map(|ch| {
                json!({
                    "name": ch.profile.name,
                    "base": ch.profile.base,
                    "noise": ch.profile.noise,
                    "last": ch.last,
                })
            })
            .collect();
        json!({
            "sensors": sensors,
            "tick": self.tick,
            "uptime_s": self.started.elapsed().as_secs_f64(),
        })
    }
}

/// Amostra N(0, 1) via Box-Muller.
fn gaussian(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.random_range(f64::EPSILON..1.0);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// `2026-01-02T13:12:30.123`
pub fn iso_millis(dt: DateTime<Local>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
