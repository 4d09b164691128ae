//! Comparação da senha de manutenção em tempo constante.

use std::hint::black_box;

/// Compara duas senhas sem sair cedo no primeiro byte diferente.
///
/// O tempo depende só do tamanho da senha fornecida, nunca de quantos
/// bytes batem.
pub fn secrets_match(expected: &str, provided: &str) -> bool {
    let expected = expected.as_bytes();
    let provided = provided.as_bytes();

    let mut diff = (expected.len() ^ provided.len()) as u64;
    for (i, &b) in provided.iter().enumerate() {
        // Índice fora do esperado compara contra 0; o tamanho já marcou a diferença
        let e = expected.get(i).copied().unwrap_or(0);
        diff |= u64::from(black_box(e ^ b));
    }
    black_box(diff) == 0
}
