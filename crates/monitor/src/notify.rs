//! Fila limitada de notificações da ingestão para o display.
//!
//! O produtor nunca bloqueia: com a fila cheia, a notificação mais antiga
//! é descartada. O display só precisa do estado mais recente.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use linha_core::types::{AlarmKind, CommandKind, LinkState, SensorStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// O que mudou.
#[derive(Debug, Clone, PartialEq)]
pub enum NoticeKind {
    Sensor {
        name: String,
        status: SensorStatus,
        alarm: Option<AlarmKind>,
    },
    Link(LinkState),
    Response(CommandKind),
}

/// Notificação leve; o display lê o estado completo via `snapshot()`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotice {
    pub seq: u64,
    pub kind: NoticeKind,
}

/// Lado produtor da fila (thread de ingestão).
pub struct NotifySender {
    tx: Sender<ChangeNotice>,
    // Clone do receiver usado só para descartar a mais antiga
    evict: Receiver<ChangeNotice>,
    seq: AtomicU64,
    dropped: Arc<AtomicU64>,
}

/// Cria a fila com capacidade `capacity` (mínimo 1).
pub fn bounded_queue(capacity: usize) -> (NotifySender, Receiver<ChangeNotice>) {
    let (tx, rx) = bounded::<ChangeNotice>(capacity.max(1));
    let sender = NotifySender {
        tx,
        evict: rx.clone(),
        seq: AtomicU64::new(0),
        dropped: Arc::new(AtomicU64::new(0)),
    };
    (sender, rx)
}

impl NotifySender {
    /// Publica sem bloquear, descartando a notificação pendente mais antiga
    /// se a fila estiver cheia.
    pub fn publish(&self, kind: NoticeKind) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut notice = ChangeNotice { seq, kind };

        // Produtor único: depois de um descarte sempre há espaço, mas o
        // display pode estar drenando ao mesmo tempo.
        for _ in 0..3 {
            match self.tx.try_send(notice) {
                Ok(()) => return,
                Err(TrySendError::Full(n)) => {
                    if self.evict.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    notice = n;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
        debug!("Fila de notificações cheia, descartando #{seq}");
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Contador compartilhado de descartes (para quem não tem o sender).
    pub fn dropped_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(state: LinkState) -> NoticeKind {
        NoticeKind::Link(state)
    }

    #[test]
    fn delivers_in_order() {
        let (tx, rx) = bounded_queue(4);
        tx.publish(link(LinkState::Connecting));
        tx.publish(link(LinkState::Connected));
        let got: Vec<_> = rx.try_iter().map(|n| n.kind).collect();
        assert_eq!(got, vec![link(LinkState::Connecting), link(LinkState::Connected)]);
        assert_eq!(tx.dropped_counter().load(Ordering::Relaxed), 0);
    }

    #[test]
    fn full_queue_drops_oldest() {
        let (tx, rx) = bounded_queue(3);
        for i in 0..10 {
            tx.publish(NoticeKind::Sensor {
                name: format!("s{i}"),
                status: SensorStatus::Ok,
                alarm: None,
            });
        }
        let seqs: Vec<_> = rx.try_iter().map(|n| n.seq).collect();
        assert_eq!(seqs, vec![7, 8, 9]);
        assert_eq!(tx.dropped_counter().load(Ordering::Relaxed), 7);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (tx, rx) = bounded_queue(0);
        tx.publish(link(LinkState::Connected));
        tx.publish(link(LinkState::Disconnected));
        let got: Vec<_> = rx.try_iter().map(|n| n.kind).collect();
        assert_eq!(got, vec![link(LinkState::Disconnected)]);
    }

    #[test]
    fn publish_never_blocks_without_consumer() {
        let (tx, rx) = bounded_queue(1);
        drop(rx);
        // O sender mantém um receiver interno: continua descartando, sem bloquear
        for _ in 0..100 {
            tx.publish(link(LinkState::Connecting));
        }
        assert_eq!(tx.dropped_counter().load(Ordering::Relaxed), 99);
    }
}
