//! Parseo mínimo de `--flag valor`.

use std::collections::HashMap;

use crate::error::CliError;

#[derive(Debug, Default)]
pub struct Flags {
    values: HashMap<String, String>,
}

impl Flags {
    pub fn parse(args: &[String]) -> Result<Self, CliError> {
        let mut values = HashMap::new();
        let mut i = 0;
        while i < args.len() {
            let Some(name) = args[i].strip_prefix("--") else {
                return Err(CliError::Usage(format!("argumento inesperado: {}", args[i])));
            };
            i += 1;
            let value = args.get(i).ok_or_else(|| CliError::Usage(format!("falta valor para --{name}")))?;
            values.insert(name.to_string(), value.clone());
            i += 1;
        }
        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn require(&self, name: &str, usage: &str) -> Result<&str, CliError> {
        self.get(name).ok_or_else(|| CliError::Usage(usage.to_string()))
    }
}
