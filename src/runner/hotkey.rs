//! Terminal debugging hotkey.
//!
//! A debugging aid, not part of correctness: while the pool runs, pressing
//! `d` + Enter prints how to attach an external inspector to the live
//! connection. Reads stdin line-wise so it composes with whatever terminal
//! the host framework owns.

// ============================================================================
// Imports
// ============================================================================

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::info;

// ============================================================================
// Hotkey Task
// ============================================================================

/// Spawns the stdin listener for the current connection.
pub(crate) fn spawn(url: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            match line.trim() {
                "d" => {
                    info!(
                        url = %url,
                        "Live debugging: attach an inspector (chrome://inspect or \
                         devtools) to this endpoint; the test context is the one \
                         exposing globalThis.__CDP_POOL__"
                    );
                }
                "q" => break,
                _ => {}
            }
        }
    })
}
