//! Formatted dump of the counter trie.
//!
//! Rows come out depth first in byte order. A Counter whose rates have both
//! decayed to zero is skipped together with everything below it.

use std::fmt::Write;

use serde::Serialize;

use crate::clock::Tick;
use crate::core::trie::{CounterTrie, NodeId};
use crate::error::Result;

/// One populated prefix and its rates at the time of the dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterRow {
    /// Dotted prefix, e.g. `10.0.0.1`.
    pub prefix: String,
    /// Trie level, 0 for a single-byte prefix.
    pub depth: usize,
    pub fwd: u64,
    pub rev: u64,
}

impl CounterTrie {
    /// Decay every Counter up to `now` and collect the ones still active.
    pub fn snapshot(&mut self, now: Tick) -> Vec<CounterRow> {
        let mut rows = Vec::new();
        self.collect_rows(self.root(), "", 0, now, &mut rows);
        rows
    }

    fn collect_rows(
        &mut self,
        node: NodeId,
        prefix: &str,
        depth: usize,
        now: Tick,
        rows: &mut Vec<CounterRow>,
    ) {
        let populated: Vec<_> = self.node(node).populated().collect();
        for (byte, cid) in populated {
            let counter = self.counter_mut(cid);
            counter.touch(now);
            let (fwd, rev) = (counter.fwd.average(), counter.rev.average());
            if fwd == 0 && rev == 0 {
                continue;
            }
            let child = counter.child();

            let this = if prefix.is_empty() {
                byte.to_string()
            } else {
                format!("{prefix}.{byte}")
            };
            rows.push(CounterRow {
                prefix: this.clone(),
                depth,
                fwd,
                rev,
            });
            if let Some(child) = child {
                self.collect_rows(child, &this, depth + 1, now, rows);
            }
        }
    }
}

/// Text layout: `prefix<TAB>fwd<TAB>rev`, indented one tab per level.
pub fn render(rows: &[CounterRow]) -> String {
    let mut out = String::new();
    for row in rows {
        for _ in 0..row.depth {
            out.push('\t');
        }
        let _ = writeln!(out, "{}\t{}\t{}", row.prefix, row.fwd, row.rev);
    }
    out
}

pub fn render_json(rows: &[CounterRow]) -> Result<String> {
    Ok(serde_json::to_string(rows)?)
}
