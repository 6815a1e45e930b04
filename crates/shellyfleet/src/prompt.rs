//! Interactive terminal prompts: search confirmation and password entry.
//!
//! Both run on the blocking thread pool; serialization across concurrent
//! search drivers is the confirmation gate's job, one layer up.

use std::io::{IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal;

use shelly_discovery::{ConfirmDecision, DiscoveryError, SearchConfirm};
use shelly_rpc::auth::AuthCallback;
use shelly_rpc::RpcError;

/// `a` answers apply to every later candidate in the process.
static ADD_ALL: AtomicBool = AtomicBool::new(false);

pub fn stdin_is_terminal() -> bool {
    std::io::stdin().is_terminal()
}

/// One-keystroke confirmation for a discovered device.
pub fn search_confirm() -> SearchConfirm {
    Arc::new(|description| {
        Box::pin(async move {
            if ADD_ALL.load(Ordering::Acquire) {
                return Ok(ConfirmDecision {
                    approve: true,
                    continue_search: true,
                });
            }
            tokio::task::spawn_blocking(move || confirm_blocking(&description))
                .await
                .map_err(|e| DiscoveryError::Prompt(format!("prompt task failed: {e}")))?
        })
    })
}

fn confirm_blocking(description: &str) -> Result<ConfirmDecision, DiscoveryError> {
    println!();
    println!("Found {description}");
    println!("y - Add device and continue search");
    println!("n - Skip this device and continue search");
    println!("a - Add this device and all other devices found");
    println!("u - Use this device and stop searching for additional devices");
    println!("s - Stop search without this device");
    println!("q - Quit without acting on this device or any others");
    println!("Use this device [y,n,a,u,s,q]?");

    loop {
        let key = read_key().map_err(|e| DiscoveryError::Prompt(e.to_string()))?;
        match key {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                return Ok(ConfirmDecision {
                    approve: true,
                    continue_search: true,
                })
            }
            KeyCode::Char('a') | KeyCode::Char('A') => {
                ADD_ALL.store(true, Ordering::Release);
                return Ok(ConfirmDecision {
                    approve: true,
                    continue_search: true,
                });
            }
            KeyCode::Char('n') | KeyCode::Char('N') => {
                return Ok(ConfirmDecision {
                    approve: false,
                    continue_search: true,
                })
            }
            KeyCode::Char('u') | KeyCode::Char('U') => {
                return Ok(ConfirmDecision {
                    approve: true,
                    continue_search: false,
                })
            }
            KeyCode::Char('s') | KeyCode::Char('S') => {
                return Ok(ConfirmDecision {
                    approve: false,
                    continue_search: false,
                })
            }
            // The user walks away clean; nothing has been mutated yet.
            KeyCode::Char('q') | KeyCode::Char('Q') => std::process::exit(0),
            KeyCode::Enter => continue,
            other => println!("Unexpected response {other:?}"),
        }
    }
}

/// Read one key event in raw mode, restoring the terminal after.
fn read_key() -> std::io::Result<KeyCode> {
    terminal::enable_raw_mode()?;
    let result = loop {
        match crossterm::event::read() {
            Ok(Event::Key(KeyEvent {
                code, modifiers, ..
            })) => {
                if code == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL) {
                    let _ = terminal::disable_raw_mode();
                    std::process::exit(1);
                }
                break Ok(code);
            }
            Ok(_) => continue,
            Err(e) => break Err(e),
        }
    };
    let _ = terminal::disable_raw_mode();
    result
}

/// Interactive password entry, echoing `*` per keystroke.
///
/// Used as the default credential source when `--interactive` is set and
/// `--auth` is not; the device layer memoizes the result so each device
/// prompts at most once.
pub fn password_prompt() -> AuthCallback {
    Arc::new(|description| {
        Box::pin(async move {
            tokio::task::spawn_blocking(move || password_blocking(&description))
                .await
                .map_err(|e| RpcError::AuthFailed(format!("prompt task failed: {e}")))?
        })
    })
}

fn password_blocking(description: &str) -> Result<String, RpcError> {
    println!();
    println!("Device {description} requires authentication. Please enter a password:");

    let map_err = |e: std::io::Error| RpcError::AuthFailed(format!("reading password: {e}"));
    terminal::enable_raw_mode().map_err(map_err)?;
    let mut password = String::new();
    let result = loop {
        let event = match crossterm::event::read() {
            Ok(event) => event,
            Err(e) => break Err(map_err(e)),
        };
        let Event::Key(KeyEvent { code, modifiers, .. }) = event else {
            continue;
        };
        match code {
            KeyCode::Enter => break Ok(password.clone()),
            KeyCode::Backspace => {
                password.pop();
            }
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                let _ = terminal::disable_raw_mode();
                std::process::exit(1);
            }
            KeyCode::Char(c) => {
                password.push(c);
                print!("*");
                let _ = std::io::stdout().flush();
            }
            _ => continue,
        }
    };
    let _ = terminal::disable_raw_mode();
    println!();
    println!();
    result
}
