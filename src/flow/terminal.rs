// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Terminal rendering of the sign-in flow, used by the `kpr-auth` binary.

use super::{Button, CredentialFlow, Message, MessageKind, Screen, Slot, Step, View};
use crate::bootstrap::{BootOutcome, Bootstrapper};
use crate::error::{AuthError, Result};
use crate::launch::LaunchGate;
use crate::validate::sanitize_code;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

const TITLE: &str = "Sign In to KPR Monitoring";

/// Writes screens and messages to stdout.
#[derive(Default)]
pub struct TerminalView;

impl TerminalView {
    pub fn new() -> Self {
        Self
    }
}

impl View for TerminalView {
    fn render(&self, screen: &Screen) {
        println!();
        println!("== {} ==", TITLE);
        match screen {
            Screen::MethodSelection { offline_user } => {
                if let Some(name) = offline_user {
                    println!("  [0] Continue as {} (Offline)", name);
                }
                println!("  [1] Sign in with Email");
                println!("  [2] Sign in with Phone");
                println!("  [q] Quit");
            }
            Screen::EmailForm => println!("Email sign-in (leave name blank to go back)"),
            Screen::EmailPinEntry { email } => {
                println!("Enter the 6-digit PIN sent to {}", email);
                println!("  [r] Resend PIN   [b] Back");
            }
            Screen::PhoneForm => println!("Phone sign-in (leave name blank to go back)"),
            Screen::PhoneOtpEntry { phone } => {
                println!("Enter the 6-digit code sent to {}", phone);
                println!("  [b] Back");
            }
        }
    }

    fn show_message(&self, _slot: Slot, message: &Message) {
        match message.kind {
            MessageKind::Error => println!("  ! {}", message.text),
            MessageKind::Success => println!("  ✓ {}", message.text),
        }
    }

    fn set_busy(&self, button: Button, busy: bool) {
        if busy {
            println!("  {} ... Please wait...", button.label());
        }
    }

    fn show_offline_notice(&self) {
        println!();
        println!("== KPR Monitoring App ==");
        println!("You're currently offline. This app requires an internet connection");
        println!("for initial setup and authentication.");
        println!("  [r] Retry Connection   [q] Quit");
    }

    fn hide_overlay(&self) {
        println!("Signed in. Starting KPR Monitoring...");
    }
}

/// Drive the flow from stdin until the app launches or the user quits.
pub async fn run(boot: &Bootstrapper, flow: &CredentialFlow, gate: &LaunchGate) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match boot.run().await {
            BootOutcome::ProviderUnavailable => {
                match prompt(&mut lines, "> ").await?.as_deref() {
                    Some("r") => continue,
                    _ => return Ok(()),
                }
            }
            BootOutcome::OfflineResume(_) | BootOutcome::SessionResume(_) => return Ok(()),
            BootOutcome::SignInRequired => break,
        }
    }

    while !gate.is_launched() {
        let step = flow.step().unwrap_or(Step::MethodSelection);
        let keep_going = match step {
            Step::MethodSelection => match prompt(&mut lines, "> ").await?.as_deref() {
                Some("0") => {
                    if let Err(e) = flow.continue_offline() {
                        println!("  ! {}", e.user_message());
                    }
                    true
                }
                Some("1") => {
                    flow.show_email_form();
                    true
                }
                Some("2") => {
                    flow.show_phone_form();
                    true
                }
                Some("q") | None => false,
                Some(_) => true,
            },
            Step::EmailForm => {
                let Some(name) = prompt(&mut lines, "Full Name: ").await? else {
                    return Ok(());
                };
                if name.is_empty() {
                    flow.back();
                } else if let Some(email) = prompt(&mut lines, "Email Address: ").await? {
                    let _ = flow.submit_email(&name, &email).await;
                }
                true
            }
            Step::EmailPin => match prompt(&mut lines, "PIN Code: ").await? {
                Some(cmd) if cmd == "b" => {
                    flow.back();
                    true
                }
                Some(cmd) if cmd == "r" => {
                    let _ = flow.resend_pin().await;
                    true
                }
                Some(pin) => {
                    let _ = flow.submit_pin(&sanitize_code(&pin)).await;
                    true
                }
                None => false,
            },
            Step::PhoneForm => {
                let Some(name) = prompt(&mut lines, "Full Name: ").await? else {
                    return Ok(());
                };
                if name.is_empty() {
                    flow.back();
                } else if let Some(phone) = prompt(&mut lines, "Phone Number: ").await? {
                    let _ = flow.submit_phone(&name, &phone).await;
                }
                true
            }
            Step::PhoneOtp => match prompt(&mut lines, "SMS Code: ").await? {
                Some(cmd) if cmd == "b" => {
                    flow.back();
                    true
                }
                Some(otp) => {
                    let _ = flow.submit_otp(&sanitize_code(&otp)).await;
                    true
                }
                None => false,
            },
        };

        if !keep_going {
            break;
        }
    }
    Ok(())
}

/// Print `label` and read one trimmed line; `None` on end of input.
async fn prompt(lines: &mut Lines<BufReader<Stdin>>, label: &str) -> Result<Option<String>> {
    print!("{}", label);
    std::io::stdout()
        .flush()
        .map_err(|e| AuthError::Internal(e.into()))?;

    let line = lines
        .next_line()
        .await
        .map_err(|e| AuthError::Internal(e.into()))?;
    Ok(line.map(|l| l.trim().to_string()))
}
