//! Typed-confirmation gate for destructive operations.

use std::io::{self, BufRead, Write};

/// Require the operator to type `phrase` before a destructive action.
/// `--yes` bypasses the prompt for non-interactive use.
pub fn require_confirmation(phrase: &str, yes: bool, warning: &str) -> anyhow::Result<()> {
    if yes {
        return Ok(());
    }
    println!("{warning}");
    print!("Type {phrase} to continue: ");
    io::stdout().flush()?;

    let mut stdin = io::stdin().lock();
    confirm_from(&mut stdin, phrase)
}

fn confirm_from(reader: &mut impl BufRead, phrase: &str) -> anyhow::Result<()> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim() == phrase {
        Ok(())
    } else {
        Err(anyhow::anyhow!("aborted: confirmation '{phrase}' not typed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn exact_phrase_confirms() {
        let mut input = Cursor::new(b"RESTORE\n".to_vec());
        assert!(confirm_from(&mut input, "RESTORE").is_ok());
    }

    #[test]
    fn wrong_phrase_aborts() {
        let mut input = Cursor::new(b"yes\n".to_vec());
        assert!(confirm_from(&mut input, "RESTORE").is_err());
    }

    #[test]
    fn empty_input_aborts() {
        let mut input = Cursor::new(Vec::new());
        assert!(confirm_from(&mut input, "ROTATE").is_err());
    }

    #[test]
    fn yes_flag_bypasses_prompt() {
        assert!(require_confirmation("RESTORE", true, "unused").is_ok());
    }
}
