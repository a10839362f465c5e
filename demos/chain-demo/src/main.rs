//! Chain demo
//!
//! Shows:
//! 1. Miners submit solved challenges
//! 2. The committer seals two blocks
//! 3. A miner fetches a receipt for their event
//! 4. An operator inflates the points, the proof catches it
//! 5. The audit reconciles minted supply

use minechain::{verify_event, InMemoryStorage, Ledger, MiningEvent};

fn solved(n: u64, wallet: &str, points: u64, difficulty: u32) -> MiningEvent {
    MiningEvent {
        id: format!("evt-{n:04}"),
        wallet_address: wallet.to_string(),
        challenge_id: format!("challenge-{n}"),
        solution_hash: format!("{}{n:x}", "0".repeat(difficulty as usize)),
        points_awarded: points,
        difficulty,
        timestamp: 1_700_000_000_000 + n * 1_000,
    }
}

fn main() {
    println!("╔════════════════════════════════════════════════╗");
    println!("║  Minechain - Demo                              ║");
    println!("║  Merkle commitments for mining rewards         ║");
    println!("╚════════════════════════════════════════════════╝\n");

    // 1. Miners submit events
    println!("⛏  Step 1: Miners submit solved challenges");
    println!("   ────────────────────────────────────────");

    let mut ledger = Ledger::open(InMemoryStorage::new()).unwrap().with_batch_limit(3);
    let wallets = ["AliceWallet111", "BobWallet2222", "CarolWallet33"];
    for n in 0..5u64 {
        let wallet = wallets[n as usize % wallets.len()];
        let event = solved(n, wallet, 10 * (n + 1), 4 + (n % 2) as u32);
        println!("   {} by {} for {} points", event.id, event.wallet_address, event.points_awarded);
        ledger.record_event(event).unwrap();
    }
    println!("   Mempool: {} events\n", ledger.mempool_size().unwrap());

    // 2. Seal blocks
    println!("🔗 Step 2: Committer seals blocks (3 events per block)");
    println!("   ───────────────────────────────────────────────────");

    let mut mined_at = 1_700_000_100_000;
    while let Some(outcome) = ledger.commit_pending_at(mined_at).unwrap() {
        let b = &outcome.block;
        println!("   Block #{}  events={}  reward={}  difficulty={}", b.block_height, b.transaction_count, b.block_reward, b.difficulty);
        println!("      root: {}", b.merkle_root);
        println!("      hash: {}", b.block_hash);
        println!("      prev: {}", b.previous_hash);
        mined_at += 12_345;
    }
    println!();

    // 3. Receipt
    println!("🧾 Step 3: Bob asks for a receipt");
    println!("   ──────────────────────────────");

    let receipt = ledger.receipt("evt-0004").unwrap().unwrap();
    println!("   Event {} in block #{}", receipt.event.id, receipt.block_height);
    println!("   Leaf index: {}", receipt.proof.leaf_index);
    println!("   Proof size: {} sibling hashes", receipt.proof.siblings.len());
    let ok = verify_event(&receipt.event, &receipt.proof, &receipt.merkle_root);
    println!("   {} proof against block root\n", if ok { "✓ Valid" } else { "✗ Invalid" });

    // 4. Tampering
    println!("😈 Step 4: Operator inflates Bob's points");
    println!("   ──────────────────────────────────────");

    let mut inflated = receipt.event.clone();
    inflated.points_awarded *= 100;
    println!("   Original: {} points", receipt.event.points_awarded);
    println!("   Claimed:  {} points", inflated.points_awarded);

    if ledger.verify_inclusion(&inflated, &receipt.proof, receipt.block_height) {
        println!("   ✓ Data is valid");
    } else {
        println!("   ✗ TAMPERING DETECTED");
        println!("   ✗ Inflated event does not hash to the committed root");
    }
    println!();

    // 5. Audit
    println!("📊 Step 5: Audit the chain");
    println!("   ───────────────────────");

    let report = ledger.audit().unwrap();
    println!("   Blocks:          {}", ledger.blocks().len());
    println!("   Minted supply:   {}", report.minted_supply);
    println!("   Included points: {}", report.included_points);
    println!("   {}", if report.balanced() { "✓ Supply reconciles" } else { "✗ Supply mismatch" });
    println!();

    println!("╔════════════════════════════════════════════════╗");
    println!("║  Summary                                       ║");
    println!("╠════════════════════════════════════════════════╣");
    println!("║  ✓ Every event carries a Merkle proof          ║");
    println!("║  ✓ Blocks link back to genesis                 ║");
    println!("║  ✓ Edited rewards fail verification            ║");
    println!("╚════════════════════════════════════════════════╝");
}
