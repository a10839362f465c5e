use std::sync::Arc;

use minechain::{InMemoryStorage, Ledger, MiningEvent, RawMiningEvent};

use crate::anchor::PlaceholderAnchor;
use crate::backend::LocalBackend;
use crate::config::AppConfig;
use crate::state::{AppState, SharedState};

pub fn memory_state(batch_limit: usize) -> SharedState {
    let config = AppConfig {
        batch_limit,
        commit_loop: false,
        ..AppConfig::default()
    };
    let ledger = Ledger::open(InMemoryStorage::new())
        .unwrap()
        .with_batch_limit(batch_limit);
    Arc::new(AppState::new(
        config,
        Arc::new(LocalBackend::new(ledger)),
        Arc::new(PlaceholderAnchor),
    ))
}

pub fn event(id: &str, points: u64) -> MiningEvent {
    MiningEvent {
        id: id.into(),
        wallet_address: "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU".into(),
        challenge_id: format!("challenge-{id}"),
        solution_hash: format!("0000{id}"),
        points_awarded: points,
        difficulty: 4,
        timestamp: 1_700_000_000_000,
    }
}

pub fn raw(e: &MiningEvent) -> RawMiningEvent {
    RawMiningEvent {
        id: Some(e.id.clone()),
        wallet_address: Some(e.wallet_address.clone()),
        challenge_id: Some(e.challenge_id.clone()),
        solution_hash: Some(e.solution_hash.clone()),
        points_awarded: Some(e.points_awarded),
        difficulty: Some(e.difficulty),
        timestamp: Some(e.timestamp),
    }
}
