// src/client/console.rs
//
// Terminal rendering of inbound traffic. One line per event, timestamped;
// whispers and server notices are visually distinct from broadcast chat.

use colored::Colorize;

fn stamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

pub fn chat(sender: &str, message: &str) {
    println!("{} {} {}", stamp().dimmed(), format!("<{sender}>").bold(), message);
}

pub fn whisper_in(sender: &str, message: &str) {
    println!(
        "{} {} {}",
        stamp().dimmed(),
        format!("[{sender} → you]").magenta().bold(),
        message.magenta()
    );
}

pub fn whisper_out(target: &str, message: &str) {
    println!(
        "{} {} {}",
        stamp().dimmed(),
        format!("[you → {target}]").magenta(),
        message.magenta()
    );
}

pub fn notice(message: &str) {
    println!("{} {}", stamp().dimmed(), message.yellow());
}

pub fn event(message: &str) {
    println!("{} {}", stamp().dimmed(), message.dimmed());
}

pub fn error(message: &str) {
    eprintln!("{} {}", stamp().dimmed(), message.red());
}

pub fn file_event(message: &str) {
    println!("{} {}", stamp().dimmed(), message.cyan());
}
