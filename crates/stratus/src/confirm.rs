use colored::Colorize;
use std::io::{self, BufRead, Write};
use stratus_cloud::Confirm;

/// Asks on the terminal; `--yes` skips the question
pub struct TerminalConfirm {
    assume_yes: bool,
}

impl TerminalConfirm {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        println!();
        println!("{}", prompt.yellow());
        if self.assume_yes {
            println!("{}", "--yes given, continuing".dimmed());
            return true;
        }

        print!("[y/N] ");
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            // EOF counts as "no"
            Ok(0) | Err(_) => false,
            Ok(_) => is_yes(&answer),
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes("  YES "));
        assert!(!is_yes("\n"));
        assert!(!is_yes("n"));
        assert!(!is_yes("yep"));
    }

    #[test]
    fn test_assume_yes_never_reads_stdin() {
        assert!(TerminalConfirm::new(true).confirm("Adopt?"));
    }
}
