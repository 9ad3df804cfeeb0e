//! External command handling via stdin.
//!
//! The dispatcher can be driven over stdin with JSONL commands, one JSON
//! object per line. Used for automation and testing.
//!
//! # Protocol
//!
//! ```json
//! {"type": "activate"}
//! {"type": "deactivate"}
//! {"type": "reload"}
//! {"type": "navigate", "target": "os"}
//! {"type": "simulateKey", "key": "s", "modifiers": ["shift"]}
//! {"type": "getValidationErrors"}
//! ```
//!
//! # Example
//!
//! ```bash
//! echo '{"type": "navigate", "target": "o"}' | keychord
//! ```

use crate::logging;

/// Commands accepted on stdin. `navigate` takes a key path from the root,
/// one character per level; a single character navigates by key.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ExternalCommand {
    /// Open the overlay at the root of the current context's tree.
    Activate,
    /// Close the overlay and clear navigation state.
    Deactivate,
    /// Re-discover config files and rebuild the resolved state.
    Reload,
    /// Open the overlay at the group reached by `target`.
    Navigate { target: String },
    /// Inject a key press as if it had been captured (for testing).
    SimulateKey {
        key: String,
        #[serde(default)]
        modifiers: Vec<String>,
    },
    /// Print current validation diagnostics to the log.
    GetValidationErrors,
}

/// Start a thread that reads stdin line-by-line for JSONL commands.
///
/// Bounded channel: stdin commands arrive at human rates, a capacity of 100
/// prevents unbounded growth if the consumer stalls. The thread exits when
/// stdin closes or the receiver is dropped.
pub fn start_stdin_listener() -> async_channel::Receiver<ExternalCommand> {
    use std::io::BufRead;

    let (tx, rx) = async_channel::bounded(100);

    std::thread::spawn(move || {
        logging::log("STDIN", "External command listener started");
        let stdin = std::io::stdin();
        let reader = stdin.lock();

        for line in reader.lines() {
            match line {
                Ok(line) if !line.trim().is_empty() => {
                    match serde_json::from_str::<ExternalCommand>(&line) {
                        Ok(cmd) => {
                            logging::log("STDIN", &format!("Parsed command: {:?}", cmd));
                            if tx.send_blocking(cmd).is_err() {
                                logging::log("STDIN", "Command channel closed, exiting");
                                break;
                            }
                        }
                        Err(e) => {
                            logging::log("STDIN", &format!("Failed to parse command: {}", e));
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    logging::log("STDIN", &format!("Error reading stdin: {}", e));
                    break;
                }
            }
        }
        logging::log("STDIN", "External command listener exiting");
    });

    rx
}
