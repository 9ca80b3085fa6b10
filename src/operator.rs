//! Operator interaction: prompts, selections, confirmations and messages.
//!
//! The sync engine only talks to the [`Operator`] trait so that it can run
//! without a terminal.

use anyhow::{Context, Result};
use std::io::{BufRead, Write, stdin, stdout};

use crate::config::{EndpointSelection, EnvironmentTable};

pub trait Operator: Send + Sync {
    /// Free-text prompt; an empty answer selects `default`.
    fn input(&self, message: &str, default: &str) -> Result<String>;

    /// Single choice from `choices`; an empty answer selects `default`.
    fn choose(&self, message: &str, choices: &[&str], default: &str) -> Result<String>;

    /// Yes/no question. Anything but an explicit yes is a no.
    fn confirm(&self, message: &str) -> Result<bool>;

    fn show(&self, message: &str);
}

/// Reads answers from stdin and writes prompts to stdout.
#[derive(Debug, Default)]
pub struct TerminalOperator;

impl TerminalOperator {
    fn read_answer(&self, prompt: &str) -> Result<Option<String>> {
        print!("{}", prompt);
        stdout().flush().context("Failed to flush stdout")?;

        let mut input = String::new();
        let read = stdin()
            .lock()
            .read_line(&mut input)
            .context("Failed to read user input")?;
        if read == 0 {
            // EOF: behave as if the default was accepted.
            println!();
            return Ok(None);
        }
        Ok(Some(input.trim().to_string()))
    }
}

impl Operator for TerminalOperator {
    fn input(&self, message: &str, default: &str) -> Result<String> {
        let prompt = if default.is_empty() {
            format!("{} ", message)
        } else {
            format!("{} ({}) ", message, default)
        };
        Ok(match self.read_answer(&prompt)? {
            Some(answer) if !answer.is_empty() => answer,
            _ => default.to_string(),
        })
    }

    fn choose(&self, message: &str, choices: &[&str], default: &str) -> Result<String> {
        if choices.is_empty() {
            anyhow::bail!("No choices available for prompt: {}", message);
        }
        println!("{}", message);
        for (index, choice) in choices.iter().enumerate() {
            let marker = if *choice == default { " (default)" } else { "" };
            println!("{}. {}{}", index + 1, choice, marker);
        }

        loop {
            let Some(answer) = self.read_answer("Enter your choice: ")? else {
                return Ok(default.to_string());
            };
            if answer.is_empty() {
                return Ok(default.to_string());
            }
            if let Some(choice) = match_choice(&answer, choices) {
                return Ok(choice.to_string());
            }
            println!(
                "❌ Invalid choice '{}'. Enter a number between 1 and {} or a name.",
                answer,
                choices.len()
            );
        }
    }

    fn confirm(&self, message: &str) -> Result<bool> {
        let answer = self.read_answer(&format!("{} [y/N] ", message))?;
        Ok(answer.as_deref().is_some_and(is_yes))
    }

    fn show(&self, message: &str) {
        println!("{}", message);
    }
}

/// Accepts a 1-based index or a case-insensitive choice name.
pub fn match_choice<'a>(answer: &str, choices: &[&'a str]) -> Option<&'a str> {
    let answer = answer.trim();
    if let Ok(index) = answer.parse::<usize>() {
        return index.checked_sub(1).and_then(|i| choices.get(i)).copied();
    }
    choices
        .iter()
        .find(|choice| choice.eq_ignore_ascii_case(answer))
        .copied()
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Fills the environment and profile of one endpoint, prompting only for what
/// the configuration left open.
pub fn complete_selection(
    operator: &dyn Operator,
    label: &str,
    selection: &EndpointSelection,
    environments: &EnvironmentTable,
    default_profile: &str,
) -> Result<(String, String)> {
    let environment = match &selection.environment {
        Some(environment) => environment.clone(),
        None => operator.choose(
            &format!("{} environment:", label),
            &environments.names(),
            environments.default_environment(),
        )?,
    };
    let profile = match &selection.profile {
        Some(profile) => profile.clone(),
        None => operator.input(&format!("{} AWS profile:", label), default_profile)?,
    };
    Ok((environment, profile))
}

/// Table name from the configuration, or asked for.
pub fn complete_table_name(operator: &dyn Operator, configured: &Option<String>, default: &str) -> Result<String> {
    match configured {
        Some(name) => Ok(name.clone()),
        None => operator.input("Table name:", default),
    }
}
