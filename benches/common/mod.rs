//! Common utilities for benchmarks.
//!
//! Comment bodies are generated from fixed seeds so runs are comparable.

use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Fixed seed for reproducible benchmark data
const SEED: u64 = 42;

pub fn seeded_rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(SEED)
}

const PROSE: [&str; 8] = [
    "Consider handling the error case here.",
    "This allocation could be avoided.",
    "- a list item that looks like a removal",
    "+1, agreed with the above",
    "See the docs for details.",
    "```rust",
    "fn helper() {}",
    "```",
];

/// A unified diff touching one file, `hunk_lines` lines long.
pub fn generate_patch(rng: &mut ChaCha8Rng, file: usize, hunk_lines: usize) -> String {
    let mut lines = vec![
        format!("--- a/src/file_{}.rs", file),
        format!("+++ b/src/file_{}.rs", file),
        format!("@@ -1,{} +1,{} @@", hunk_lines, hunk_lines),
    ];
    for i in 0..hunk_lines {
        let prefix = match rng.random_range(0..10) {
            0..=1 => "+",
            2..=3 => "-",
            _ => " ",
        };
        lines.push(format!("{}    let value_{} = compute({});", prefix, i, i));
    }
    lines.join("\n")
}

/// A review comment with `blocks` diff blocks separated by prose.
pub fn generate_comment(blocks: usize, hunk_lines: usize) -> String {
    let mut rng = seeded_rng();
    let mut parts = Vec::new();
    for block in 0..blocks {
        for _ in 0..rng.random_range(1..6) {
            parts.push(PROSE[rng.random_range(0..PROSE.len())].to_string());
        }
        parts.push("```diff".to_string());
        parts.push(generate_patch(&mut rng, block, hunk_lines));
        parts.push("```".to_string());
    }
    parts.join("\n")
}

/// A long comment with no patch fences at all.
pub fn generate_prose(line_count: usize) -> String {
    let mut rng = seeded_rng();
    (0..line_count)
        .map(|_| PROSE[rng.random_range(0..PROSE.len())])
        .collect::<Vec<_>>()
        .join("\n")
}
